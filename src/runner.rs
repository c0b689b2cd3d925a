//!
//! src/runner.rs
//!
//! Builds one job from the environment and runs it. Setup failures (missing
//! variables, a client that will not build) are reported like any failed
//! run: failure notification, then the fixed 200 response.
//!

use std::{path::PathBuf, sync::Arc};

use chrono::{DateTime, Utc};
use tracing::{Instrument, info_span};
use uuid::Uuid;

use crate::config::{self, AppConfig, Lookup, Stage};
use crate::errors::PipelineError;
use crate::fetch::SpotifyClient;
use crate::notify::Notifier;
use crate::pipeline::{
    self, EXTRACT_FAILED, EXTRACT_OK, ExtractJob, JobResponse, NORMALIZE_FAILED, NORMALIZE_OK,
    NormalizeJob, report,
};
use crate::store::{DiskStore, ObjectStore};

/// Command line values that win over the environment
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    pub storage_root: Option<PathBuf>,
    pub playlist_id: Option<String>,
}

enum PreparedJob {
    Extract(ExtractJob),
    Normalize(NormalizeJob),
}

/// (success, failure) notification texts of a stage
pub fn stage_messages(stage: Stage) -> (&'static str, &'static str) {
    match stage {
        Stage::Extract => (EXTRACT_OK, EXTRACT_FAILED),
        Stage::Normalize => (NORMALIZE_OK, NORMALIZE_FAILED),
    }
}

fn prepare(
    cfg: AppConfig,
    stage: Stage,
    options: RunOptions,
    notifier: Arc<dyn Notifier>,
    now: DateTime<Utc>,
) -> Result<PreparedJob, PipelineError> {
    let root = options.storage_root.unwrap_or(cfg.storage.root);
    let store: Arc<dyn ObjectStore> = Arc::new(DiskStore::new(root));
    let timestamp = pipeline::run_timestamp(now, cfg.clock.utc_offset);

    match stage {
        Stage::Extract => {
            let spotify_cfg = cfg.spotify
                .ok_or_else(|| PipelineError::Config("spotify config missing".to_string()))?;
            let spotify = SpotifyClient::new(&cfg.http, &spotify_cfg)?;
            let playlist_id = options.playlist_id.unwrap_or(spotify_cfg.playlist_id);

            Ok(PreparedJob::Extract(ExtractJob::new(
                Arc::new(spotify), store, notifier, cfg.storage.raw_bucket, playlist_id, timestamp
            )))
        }
        Stage::Normalize => {
            let output_bucket = cfg.storage.transformed_bucket.ok_or_else(||
                PipelineError::Config("TRANSFORMED_DATA_BUCKET was not set".to_string())
            )?;

            Ok(PreparedJob::Normalize(NormalizeJob::new(
                store, notifier, cfg.storage.raw_bucket, output_bucket, timestamp
            )))
        }
    }
}

/// Loads the stage config from `env`, builds the job and runs it
pub async fn run_stage(
    env: Lookup<'_>,
    stage: Stage,
    options: RunOptions,
    notifier: Arc<dyn Notifier>,
    now: DateTime<Utc>,
) -> JobResponse {
    let prepared = config::build_config(env, stage)
        .and_then(|cfg| prepare(cfg, stage, options, notifier.clone(), now));

    match prepared {
        Ok(PreparedJob::Extract(job)) => job.run().await,
        Ok(PreparedJob::Normalize(job)) => job.run().await,
        Err(e) => {
            let (ok_message, failed_message) = stage_messages(stage);
            let outcome: Result<(), PipelineError> = Err(e);
            let span = info_span!("setup", run_id = %Uuid::new_v4(), ?stage);
            report(&outcome, notifier.as_ref(), ok_message, failed_message)
                .instrument(span)
                .await
        }
    }
}
