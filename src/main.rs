//!
//! src/main.rs
//!
//! Entry point: sets up logging and the notifier, runs the chosen job and
//! prints the job response
//!

use std::{path::PathBuf, sync::Arc};

use chrono::Utc;
use clap::{Parser, Subcommand};

use playlist_etl::config::{self, HttpConfig, Stage};
use playlist_etl::logging;
use playlist_etl::notify::{Notifier, WebhookNotifier};
use playlist_etl::pipeline::JobResponse;
use playlist_etl::runner::{self, RunOptions};
use playlist_etl::PipelineError;

/// Stage a playlist from the Spotify API or normalize a staged one
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Directory holding one sub-directory per bucket
    #[arg(long, env = "STORAGE_ROOT", global = true)]
    storage_root: Option<PathBuf>,

    #[command(subcommand)]
    job: Job,
}

#[derive(Subcommand, Debug)]
enum Job {
    /// Fetch the playlist and write the raw response to the staging area
    Extract {
        /// Playlist to fetch instead of the configured one
        #[arg(long)]
        playlist_id: Option<String>,
    },
    /// Flatten the first staged response into album, artist and track CSVs
    Normalize,
}

impl Job {
    fn stage(&self) -> Stage {
        match self {
            Job::Extract { .. } => Stage::Extract,
            Job::Normalize => Stage::Normalize,
        }
    }
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), PipelineError> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    let _logger = logging::init_logging(&config::build_logging(&config::process_env))?;

    tracing::info!(
        service = "playlist-etl",
        version = %env!("CARGO_PKG_VERSION"),
        job = ?args.job,
        "starting"
    );

    let stage = args.job.stage();
    let options = match args.job {
        Job::Extract { playlist_id } => RunOptions { storage_root: args.storage_root, playlist_id },
        Job::Normalize => RunOptions { storage_root: args.storage_root, playlist_id: None },
    };

    // without a notifier the only trace of a failure is the log
    let notifier = config::build_notify(&config::process_env)
        .and_then(|cfg| WebhookNotifier::new(&HttpConfig::default(), &cfg));
    let response = match notifier {
        Ok(notifier) => {
            let notifier: Arc<dyn Notifier> = Arc::new(notifier);
            runner::run_stage(&config::process_env, stage, options, notifier, Utc::now()).await
        }
        Err(e) => {
            tracing::error!(error = %e, "notify.config.failed");
            JobResponse::fixed(runner::stage_messages(stage).0)
        }
    };

    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}
