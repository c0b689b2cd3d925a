//!
//! src/fetch.rs
//!
//! Client for the Spotify Web API: the client-credentials token exchange and
//! a single playlist lookup. One request each, no retries.
//!

use async_trait::async_trait;
use base64::{Engine, engine::general_purpose::STANDARD};
use reqwest::{Client, RequestBuilder, StatusCode, header, redirect};
use serde::Deserialize;

use crate::config::{HttpConfig, SpotifyConfig};
use crate::errors::PipelineError;

/// Client building functionality
fn client_helper(http: &HttpConfig) -> reqwest::ClientBuilder {
    Client::builder()
        .timeout(http.timeout)
        .connect_timeout(http.connect_timeout)
        .pool_max_idle_per_host(http.pool_max_idle_per_host)
        .pool_idle_timeout(Some(http.pool_idle_timeout))
        .redirect(redirect::Policy::limited(http.max_redirects as usize))
}

pub fn base_client(http: &HttpConfig) -> Result<Client, PipelineError> {
    let mut h = header::HeaderMap::new();
    h.insert(header::ACCEPT, header::HeaderValue::from_static("application/json"));
    client_helper(http)
        .default_headers(h)
        .build()
        .map_err(|e| PipelineError::Http(format!("build client: {e}")))
}

/// `Basic base64(client_id:client_secret)`
pub fn basic_credentials(client_id: &str, client_secret: &str) -> String {
    let encoded = STANDARD.encode(format!("{client_id}:{client_secret}"));
    format!("Basic {encoded}")
}

/// Bearer token handed out by the token endpoint, valid for this run only
#[derive(Clone, Deserialize)]
pub struct Credential {
    pub access_token: String,
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential").field("access_token", &"<redacted>").finish()
    }
}

/// Where the extract job gets its playlist from
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn authenticate(&self) -> Result<Credential, PipelineError>;

    /// Response body exactly as the API returned it
    async fn fetch_playlist(
        &self,
        credential: &Credential,
        playlist_id: &str
    ) -> Result<Vec<u8>, PipelineError>;
}

#[derive(Clone, Debug)]
pub struct SpotifyClient {
    pub http: Client,
    pub cfg: SpotifyConfig
}

impl SpotifyClient {
    pub fn new(http_config: &HttpConfig, cfg: &SpotifyConfig) ->
        Result<Self, PipelineError> {

        let http = base_client(http_config)?;
        Ok( Self {
            http,
            cfg: cfg.clone()
        })
    }

    /// POST {token_url}, grant_type=client_credentials
    pub fn token_request(&self) -> RequestBuilder {
        self.http
            .post(self.cfg.token_url.clone())
            .header(
                header::AUTHORIZATION,
                basic_credentials(&self.cfg.client_id, &self.cfg.client_secret)
            )
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body("grant_type=client_credentials")
    }

    /// GET /v1/playlists/{id}
    pub fn playlist(&self, playlist_id: &str, bearer: &str) ->
        Result<RequestBuilder, PipelineError> {
        let url = self.cfg.api_base.join(&format!("playlists/{playlist_id}"))
            .map_err(|e| PipelineError::Config(format!("playlist url: {e}")))?;
        Ok(self.http.get(url).bearer_auth(bearer))
    }
}

#[async_trait]
impl PlaylistSource for SpotifyClient {
    async fn authenticate(&self) -> Result<Credential, PipelineError> {
        let response = self.token_request().send().await?;
        let status = response.status();
        if status != StatusCode::OK {
            tracing::warn!(status = status.as_u16(), "spotify.token.rejected");
            return Err(PipelineError::UpstreamAuth { status: status.as_u16() });
        }
        let credential: Credential = response.json().await?;
        tracing::debug!("spotify.token.ok");
        Ok(credential)
    }

    async fn fetch_playlist(
        &self,
        credential: &Credential,
        playlist_id: &str
    ) -> Result<Vec<u8>, PipelineError> {
        let response = self.playlist(playlist_id, &credential.access_token)?
            .send()
            .await?;
        let status = response.status();
        if status != StatusCode::OK {
            tracing::warn!(status = status.as_u16(), playlist_id, "spotify.playlist.rejected");
            return Err(PipelineError::UpstreamFetch { status: status.as_u16() });
        }
        let body = response.bytes().await?.to_vec();
        // must be JSON, but is kept byte for byte
        serde_json::from_slice::<serde::de::IgnoredAny>(&body)?;
        tracing::debug!(playlist_id, bytes = body.len(), "spotify.playlist.ok");
        Ok(body)
    }
}
