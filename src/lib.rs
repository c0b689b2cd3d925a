//!
//! src/lib.rs
//!
//! Two batch jobs around one playlist: `extract` stages the raw catalog
//! response in object storage, `normalize` flattens a staged response into
//! album, artist and track CSV files and archives it.
//!

pub mod config;
pub mod errors;
pub mod logging;

pub mod fetch;
pub mod notify;
pub mod pipeline;
pub mod runner;
pub mod store;
pub mod tabular;
pub mod transform;
pub mod types;

pub use errors::PipelineError;
