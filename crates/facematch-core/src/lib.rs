//! facematch-core: decide whether two uploaded photos show the same person.
//!
//! Validates and decodes uploads, stages them as temporary files, then runs
//! SCRFD face detection and ArcFace recognition via ONNX Runtime to compare
//! the two faces.

pub mod alignment;
pub mod detector;
pub mod frame;
pub mod recognizer;
pub mod staging;
pub mod types;
pub mod upload;
pub mod verifier;

use std::path::PathBuf;

pub use detector::FaceDetector;
pub use frame::Frame;
pub use recognizer::FaceRecognizer;
pub use staging::StagedPair;
pub use types::{BoundingBox, DistanceMetric, Embedding, Side, Verification, Verifier};
pub use upload::{ImageKind, UploadError, UploadLimits, ValidatedImage};
pub use verifier::{FaceVerifier, VerifierConfig, VerifyError};

/// File name of the SCRFD detection model inside the model directory.
pub const SCRFD_MODEL_FILE: &str = "det_10g.onnx";

/// File name of the ArcFace recognition model inside the model directory.
pub const ARCFACE_MODEL_FILE: &str = "w600k_r50.onnx";

/// Default directory holding the ONNX models: `$XDG_DATA_HOME/facematch/models`,
/// falling back to `~/.local/share/facematch/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facematch")
        .join("models")
}
