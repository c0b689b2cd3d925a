//!
//! src/config.rs
//!
//! Builds the configuration for both jobs once at program start from
//! the environment (and a .env file if present)
//!

use std::{path::PathBuf, time};

use chrono::{FixedOffset, Offset, Utc};
use url::Url;

use crate::errors::PipelineError;

/// Constants for HTTP Config
pub const HTTP_TIMEOUT: u64 = 8000;
pub const HTTP_CONNECT_TIMEOUT: u64 = 2000;
pub const HTTP_POOL_MAX_IDLE: usize = 4;
pub const HTTP_POOL_IDLE_TIMEOUT: u64 = 90000;
pub const HTTP_MAX_REDIRECTS: u8 = 4;

pub const DEFAULT_PLAYLIST_ID: &str = "37i9dQZEVXbMnz8KIWsvf9";
pub const DEFAULT_STORAGE_ROOT: &str = "./data/buckets";
// Asia/Bangkok, no daylight saving
pub const DEFAULT_UTC_OFFSET_HOURS: i32 = 7;

/// Variable source; the process environment in production, a map in tests
pub type Lookup<'a> = &'a dyn Fn(&str) -> Option<String>;

/// Which job the process is about to run; decides which variables are required
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Extract,
    Normalize,
}

/// Wrapper over the lookup to return an invalid environment var error
fn env_check(env: Lookup, s: &str) -> Result<String, PipelineError> {
    match env(s) {
        Some(v) if !v.trim().is_empty() => Ok(v),
        _ => Err(PipelineError::Config(format!("{s} was not set"))),
    }
}

/// Ensures that url is https
fn ensure_https(url: &Url) -> Result<(), String> {
    if url.scheme() == "https" {
        Ok(())
    } else {
        Err(format!("URL must be https: {url}"))
    }
}

fn ensure_host(url: &Url, expected_host: &str) -> Result<(), String> {
    match url.host_str() {
        Some(h) if h.eq_ignore_ascii_case(expected_host) => Ok(()),
        Some(h) => Err(
            format!("Unexpected host for {url} (got {h}, expected {expected_host})")
        ),
        None => Err(format!("URL missing host: {url}"))
    }
}

fn parse_url(env: Lookup, key: &str, default: &str) -> Result<Url, PipelineError> {
    let raw = env(key).unwrap_or_else(|| default.to_string());
    Url::parse(&raw).map_err(|e| PipelineError::Config(format!("{key} invalid {e}")))
}

/// Configuration that Spotify expects when hitting endpoints
#[derive(Debug, Clone)]
pub struct SpotifyConfig {
    pub client_id: String,
    pub client_secret: String,
    pub token_url: Url,
    pub api_base: Url,
    pub playlist_id: String,
}

fn build_spotify(env: Lookup) -> Result<SpotifyConfig, PipelineError> {
    let client_id     = env_check(env, "CLIENT_ID")?;
    let client_secret = env_check(env, "CLIENT_SECRET")?;

    let token_url = parse_url(
        env, "SPOTIFY_TOKEN_URL", "https://accounts.spotify.com/api/token"
    )?;
    let mut api_base = parse_url(
        env, "SPOTIFY_API_BASE", "https://api.spotify.com/v1/"
    )?;

    // ensure valid https and hostname for both urls
    ensure_https(&token_url).map_err(PipelineError::Config)?;
    ensure_https(&api_base).map_err(PipelineError::Config)?;
    ensure_host(&token_url, "accounts.spotify.com")
        .map_err(PipelineError::Config)?;
    ensure_host(&api_base, "api.spotify.com")
        .map_err(PipelineError::Config)?;

    if !api_base.path().ends_with('/') {
        let mut path = api_base.path().to_string();
        path.push('/');
        api_base.set_path(&path);
    }

    let playlist_id = env("PLAYLIST_ID")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_PLAYLIST_ID.to_string());

    Ok( SpotifyConfig { client_id, client_secret, token_url, api_base, playlist_id } )
}

///
/// Buckets live as directories beneath `root`
///
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub root: PathBuf,
    pub raw_bucket: String,
    pub transformed_bucket: Option<String>,
}

fn build_storage(env: Lookup, stage: Stage) -> Result<StorageConfig, PipelineError> {
    let raw_bucket = env_check(env, "RAW_DATA_BUCKET")?;
    let transformed_bucket = match stage {
        Stage::Normalize => Some(env_check(env, "TRANSFORMED_DATA_BUCKET")?),
        Stage::Extract => env("TRANSFORMED_DATA_BUCKET"),
    };
    let root = env("STORAGE_ROOT")
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_STORAGE_ROOT.to_string());

    Ok( StorageConfig { root: PathBuf::from(root), raw_bucket, transformed_bucket } )
}

#[derive(Debug, Clone)]
pub struct NotifyConfig {
    pub webhook_url: Url,
}

pub fn build_notify(env: Lookup) -> Result<NotifyConfig, PipelineError> {
    let raw = env_check(env, "SLACK_URL")?;
    let webhook_url = Url::parse(&raw)
        .map_err(|e| PipelineError::Config(format!("SLACK_URL invalid {e}")))?;
    ensure_https(&webhook_url).map_err(PipelineError::Config)?;
    Ok( NotifyConfig { webhook_url } )
}

/// Offset the run timestamps in object keys are rendered in
#[derive(Debug, Clone, Copy)]
pub struct ClockConfig {
    pub utc_offset: FixedOffset,
}

impl Default for ClockConfig {
    fn default() -> Self {
        Self {
            utc_offset: FixedOffset::east_opt(DEFAULT_UTC_OFFSET_HOURS * 3600)
                .unwrap_or_else(|| Utc.fix()),
        }
    }
}

fn build_clock(env: Lookup) -> Result<ClockConfig, PipelineError> {
    let Some(raw) = env("TIMESTAMP_UTC_OFFSET_HOURS") else {
        return Ok(ClockConfig::default());
    };
    let hours = raw.trim().parse::<i32>().map_err(|e| PipelineError::Config(
        format!("TIMESTAMP_UTC_OFFSET_HOURS invalid {e}")
    ))?;
    let utc_offset = FixedOffset::east_opt(hours * 3600).ok_or_else(|| PipelineError::Config(
        format!("TIMESTAMP_UTC_OFFSET_HOURS out of range: {hours}")
    ))?;
    Ok( ClockConfig { utc_offset } )
}

///
/// Configuration for Http timeouts etc.
///
#[derive(Debug, Clone)]
pub struct HttpConfig {
    pub timeout: time::Duration,
    pub connect_timeout: time::Duration,
    pub pool_max_idle_per_host: usize,
    pub pool_idle_timeout: time::Duration,
    pub max_redirects: u8,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: time::Duration::from_millis(HTTP_TIMEOUT),
            connect_timeout: time::Duration::from_millis(HTTP_CONNECT_TIMEOUT),
            pool_max_idle_per_host: HTTP_POOL_MAX_IDLE,
            pool_idle_timeout: time::Duration::from_millis(HTTP_POOL_IDLE_TIMEOUT),
            max_redirects: HTTP_MAX_REDIRECTS,
        }
    }
}

///
/// Configuration for Logger
///
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json
}

#[derive(Debug, Clone)]
pub struct LoggingConfig {
    pub filter_directives: String,
    pub format: LogFormat,
    pub with_ansi: bool,
    pub include_file_line: bool,
    pub include_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter_directives: "info,playlist_etl=debug,reqwest=warn".to_string(),
            format: LogFormat::Json,
            with_ansi: false,
            include_file_line: true,
            include_target: true,
        }
    }
}

pub fn build_logging(env: Lookup) -> LoggingConfig {
    let mut logging = LoggingConfig::default();
    if let Some(format) = env("LOG_FORMAT") {
        if format.trim().eq_ignore_ascii_case("pretty") {
            logging.format = LogFormat::Pretty;
            logging.with_ansi = true;
        }
    }
    logging
}

///
/// AppConfig holds everything the jobs need, built once by the entry point
///
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub spotify: Option<SpotifyConfig>,
    pub storage: StorageConfig,
    pub notify: NotifyConfig,
    pub clock: ClockConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

/// Builds the config for `stage` from an arbitrary variable lookup
pub fn build_config(env: Lookup, stage: Stage) -> Result<AppConfig, PipelineError> {
    let spotify = match stage {
        Stage::Extract => Some(build_spotify(env)?),
        Stage::Normalize => None,
    };
    let storage = build_storage(env, stage)?;
    let notify  = build_notify(env)?;
    let clock   = build_clock(env)?;
    let http    = HttpConfig::default();
    let logging = build_logging(env);

    Ok( AppConfig { spotify, storage, notify, clock, http, logging } )
}

///
/// Return all environment variables to caller at program start.
///
pub fn load_config(stage: Stage) -> Result<AppConfig, PipelineError> {
    dotenvy::dotenv().ok();
    build_config(&process_env, stage)
}

/// Process environment lookup, `.env` already applied by the caller
pub fn process_env(key: &str) -> Option<String> {
    std::env::var(key).ok()
}
