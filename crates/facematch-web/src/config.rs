use facematch_core::{DistanceMetric, UploadLimits, VerifierConfig};
use std::net::SocketAddr;
use std::path::PathBuf;

const DEFAULT_MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;
const DEFAULT_MAX_PIXELS: u64 = 40_000_000;
const DEFAULT_QUEUE_DEPTH: usize = 8;

/// Server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address (default: 127.0.0.1:8501).
    pub bind: SocketAddr,
    /// Directory containing ONNX model files.
    pub model_dir: PathBuf,
    pub metric: DistanceMetric,
    /// Distance threshold override; `None` uses the metric default.
    pub threshold: Option<f32>,
    /// Reject images without a detectable face instead of comparing whole images.
    pub enforce_detection: bool,
    /// Maximum size of a single uploaded file.
    pub max_upload_bytes: usize,
    /// Maximum decoded pixel count of a single upload.
    pub max_pixels: u64,
    /// Parent directory for staged uploads (default: system temp dir).
    pub temp_dir: Option<PathBuf>,
    /// Verification requests allowed to wait for the engine thread.
    pub queue_depth: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Load configuration from `FACEMATCH_*` environment variables with defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary key lookup. Unparseable values
    /// fall back to the default and are logged.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let model_dir = lookup("FACEMATCH_MODEL_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(facematch_core::default_model_dir);

        let metric = parse_or(&lookup, "FACEMATCH_METRIC", DistanceMetric::default());

        let threshold = lookup("FACEMATCH_THRESHOLD").and_then(|v| match v.parse::<f32>() {
            Ok(t) if t.is_finite() && t >= 0.0 => Some(t),
            _ => {
                tracing::warn!(value = %v, "ignoring invalid FACEMATCH_THRESHOLD");
                None
            }
        });

        Self {
            bind: parse_or(&lookup, "FACEMATCH_BIND", default_bind()),
            model_dir,
            metric,
            threshold,
            enforce_detection: lookup("FACEMATCH_ENFORCE_DETECTION")
                .map(|v| v != "0" && !v.eq_ignore_ascii_case("false"))
                .unwrap_or(false),
            max_upload_bytes: parse_or(&lookup, "FACEMATCH_MAX_UPLOAD_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
            max_pixels: parse_or(&lookup, "FACEMATCH_MAX_PIXELS", DEFAULT_MAX_PIXELS),
            temp_dir: lookup("FACEMATCH_TEMP_DIR").map(PathBuf::from),
            queue_depth: parse_or(&lookup, "FACEMATCH_QUEUE_DEPTH", DEFAULT_QUEUE_DEPTH).max(1),
        }
    }

    pub fn verifier_config(&self) -> VerifierConfig {
        VerifierConfig {
            model_dir: self.model_dir.clone(),
            metric: self.metric,
            threshold: self.threshold,
            enforce_detection: self.enforce_detection,
        }
    }

    pub fn upload_limits(&self) -> UploadLimits {
        UploadLimits {
            max_bytes: self.max_upload_bytes,
            max_pixels: self.max_pixels,
        }
    }

    /// Threshold in effect: the override if set, else the metric default.
    pub fn threshold(&self) -> f32 {
        self.threshold.unwrap_or_else(|| self.metric.default_threshold())
    }
}

fn default_bind() -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], 8501))
}

fn parse_or<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> T {
    match lookup(key) {
        None => default,
        Some(v) => v.trim().parse().unwrap_or_else(|_| {
            tracing::warn!(key, value = %v, "ignoring unparseable setting");
            default
        }),
    }
}
