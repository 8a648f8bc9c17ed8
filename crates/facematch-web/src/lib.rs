//! facematch-web: upload two photos, see whether they show the same person.
//!
//! Serves the upload form, validates and stages the uploads, and hands them to
//! the verification engine running on its own thread.

pub mod config;
pub mod engine;
pub mod handlers;
pub mod page;
pub mod routes;

use config::Config;
use engine::EngineHandle;
use facematch_core::{DistanceMetric, UploadLimits};
use std::path::PathBuf;

/// Shared state for all request handlers.
pub struct AppState {
    pub engine: EngineHandle,
    pub limits: UploadLimits,
    /// Parent directory for staged uploads; `None` uses the system temp dir.
    pub temp_dir: Option<PathBuf>,
    pub metric: DistanceMetric,
    pub threshold: f32,
    pub enforce_detection: bool,
}

impl AppState {
    pub fn new(config: &Config, engine: EngineHandle) -> Self {
        Self {
            engine,
            limits: config.upload_limits(),
            temp_dir: config.temp_dir.clone(),
            metric: config.metric,
            threshold: config.threshold(),
            enforce_detection: config.enforce_detection,
        }
    }
}
