//!
//! src/pipeline.rs
//!
//! The two batch jobs. Each run is one linear sequence of steps; any error
//! ends the run, is logged in full and reported to the notification channel
//! as a single coarse message. Nothing is retried or rolled back, so a
//! normalize run that fails between writes leaves partial output behind.
//!

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Utc};
use serde::Serialize;
use tracing::{Instrument, error, info, info_span};
use uuid::Uuid;

use crate::errors::PipelineError;
use crate::fetch::PlaylistSource;
use crate::notify::Notifier;
use crate::store::ObjectStore;
use crate::tabular::to_csv;
use crate::transform::transform;

pub const STAGING_PREFIX: &str = "processing/";
pub const ARCHIVE_PREFIX: &str = "processed/";

pub const EXTRACT_OK: &str = "Extracted data from Spotify API and loaded to S3 successfully";
pub const EXTRACT_FAILED: &str = "THERE IS AN ERROR WITH EXTRACT DATA FROM SPOTIFY API!!";
pub const NORMALIZE_OK: &str = "Transformed and Loaded data to S3 successfully";
pub const NORMALIZE_FAILED: &str = "THERE IS AN ERROR WITH TRANSFORM AND LOAD PART!!";

/// `YYYYMMDD_HHMMSS` in the given offset
pub fn run_timestamp(now: DateTime<Utc>, offset: FixedOffset) -> String {
    now.with_timezone(&offset).format("%Y%m%d_%H%M%S").to_string()
}

pub fn staging_key(timestamp: &str) -> String {
    format!("{STAGING_PREFIX}{timestamp}.json")
}

/// `processing/x/y.json` archives to `processed/y.json`
pub fn archive_key(staging_key: &str) -> String {
    let basename = staging_key.rsplit('/').next().unwrap_or(staging_key);
    format!("{ARCHIVE_PREFIX}{basename}")
}

fn is_json_key(key: &str) -> bool {
    key.rsplit('.').next() == Some("json")
}

/// What the process hands back to its caller. The status is always 200 and
/// the body always the success message, even when the run failed; callers
/// that need the outcome must look at the notification channel or the logs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct JobResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: String,
}

impl JobResponse {
    pub fn fixed(message: &str) -> Self {
        // a plain string always serializes
        let body = serde_json::to_string(message).unwrap_or_else(|_| format!("\"{message}\""));
        Self { status_code: 200, body }
    }
}

/// Shared tail of both jobs: log, notify, build the fixed response
pub(crate) async fn report(
    outcome: &Result<(), PipelineError>,
    notifier: &dyn Notifier,
    ok_message: &str,
    failed_message: &str,
) -> JobResponse {
    match outcome {
        Ok(()) => notifier.notify(ok_message).await,
        Err(e) => {
            error!(error = %e, debug = ?e, "job.failed");
            if let Some(notice) = e.upstream_notice() {
                notifier.notify(&notice).await;
            }
            notifier.notify(failed_message).await;
        }
    }
    JobResponse::fixed(ok_message)
}

/// Fetches the playlist and stages the raw response
pub struct ExtractJob {
    source: Arc<dyn PlaylistSource>,
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    raw_bucket: String,
    playlist_id: String,
    timestamp: String,
}

impl ExtractJob {
    pub fn new(
        source: Arc<dyn PlaylistSource>,
        store: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        raw_bucket: impl Into<String>,
        playlist_id: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            source,
            store,
            notifier,
            raw_bucket: raw_bucket.into(),
            playlist_id: playlist_id.into(),
            timestamp: timestamp.into(),
        }
    }

    /// One pass without reporting; returns the staged key
    pub async fn execute(&self) -> Result<String, PipelineError> {
        info!(playlist_id = %self.playlist_id, "extract.start");

        let credential = self.source.authenticate().await?;
        let body = self.source.fetch_playlist(&credential, &self.playlist_id).await?;

        let key = staging_key(&self.timestamp);
        let bytes = body.len();
        self.store.put(&self.raw_bucket, &key, body).await?;

        info!(bucket = %self.raw_bucket, key = %key, bytes, "extract.staged");
        Ok(key)
    }

    pub async fn run(&self) -> JobResponse {
        let span = info_span!("extract", run_id = %Uuid::new_v4());
        async {
            let outcome = self.execute().await.map(|_| ());
            report(&outcome, self.notifier.as_ref(), EXTRACT_OK, EXTRACT_FAILED).await
        }
        .instrument(span)
        .await
    }
}

/// Turns the first staged payload into three CSV files and archives it
pub struct NormalizeJob {
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    raw_bucket: String,
    output_bucket: String,
    timestamp: String,
}

/// Keys written by one successful normalize run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizeOutput {
    pub source_key: String,
    pub archived_key: String,
    pub album_key: String,
    pub artist_key: String,
    pub track_key: String,
}

impl NormalizeJob {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        raw_bucket: impl Into<String>,
        output_bucket: impl Into<String>,
        timestamp: impl Into<String>,
    ) -> Self {
        Self {
            store,
            notifier,
            raw_bucket: raw_bucket.into(),
            output_bucket: output_bucket.into(),
            timestamp: timestamp.into(),
        }
    }

    /// First key under the staging prefix with a `.json` extension
    async fn locate_staged(&self) -> Result<(String, serde_json::Value), PipelineError> {
        let keys = self.store.list(&self.raw_bucket, STAGING_PREFIX).await?;
        let key = keys.into_iter()
            .find(|k| is_json_key(k))
            .ok_or_else(|| PipelineError::NotFound(
                format!("no staged json under {}/{STAGING_PREFIX}", self.raw_bucket)
            ))?;

        let body = self.store.get(&self.raw_bucket, &key).await?;
        let payload = serde_json::from_slice(&body)?;
        Ok((key, payload))
    }

    pub async fn execute(&self) -> Result<NormalizeOutput, PipelineError> {
        info!(bucket = %self.raw_bucket, "normalize.start");

        let (source_key, payload) = self.locate_staged().await?;
        info!(key = %source_key, "normalize.located");

        let sets = transform(&payload)?;

        let album_key  = format!("album/{}.csv", self.timestamp);
        let artist_key = format!("artist/{}.csv", self.timestamp);
        let track_key  = format!("track/{}.csv", self.timestamp);

        self.store.put(&self.output_bucket, &album_key, to_csv(&sets.albums)?).await?;
        self.store.put(&self.output_bucket, &artist_key, to_csv(&sets.artists)?).await?;
        self.store.put(&self.output_bucket, &track_key, to_csv(&sets.tracks)?).await?;
        info!(
            bucket = %self.output_bucket,
            albums = sets.albums.len(),
            artists = sets.artists.len(),
            tracks = sets.tracks.len(),
            "normalize.written"
        );

        let archived_key = archive_key(&source_key);
        self.store.copy(&self.raw_bucket, &source_key, &archived_key).await?;
        self.store.delete(&self.raw_bucket, &source_key).await?;
        info!(from = %source_key, to = %archived_key, "normalize.archived");

        Ok( NormalizeOutput { source_key, archived_key, album_key, artist_key, track_key } )
    }

    pub async fn run(&self) -> JobResponse {
        let span = info_span!("normalize", run_id = %Uuid::new_v4());
        async {
            let outcome = self.execute().await.map(|_| ());
            report(&outcome, self.notifier.as_ref(), NORMALIZE_OK, NORMALIZE_FAILED).await
        }
        .instrument(span)
        .await
    }
}
