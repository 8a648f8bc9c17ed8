//! Two-image face verification: detect, embed, measure, threshold.

use crate::detector::{DetectorError, FaceDetector};
use crate::frame::{Frame, FrameError};
use crate::recognizer::{FaceRecognizer, RecognizerError, ARCFACE_MODEL_VERSION};
use crate::types::{is_same_person, BoundingBox, DistanceMetric, Embedding, Side, Verification, Verifier};
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VerifyError {
    #[error("cannot read {side}: {source}")]
    Decode {
        side: Side,
        #[source]
        source: FrameError,
    },
    #[error("no face detected in the {0}")]
    NoFace(Side),
    #[error("detector error: {0}")]
    Detector(#[from] DetectorError),
    #[error("recognizer error: {0}")]
    Recognizer(#[from] RecognizerError),
    #[error("invalid threshold {0}: must be a finite, non-negative number")]
    InvalidThreshold(f32),
}

impl VerifyError {
    /// Errors caused by the submitted images rather than by the engine.
    pub fn is_input_error(&self) -> bool {
        matches!(self, VerifyError::NoFace(_) | VerifyError::Decode { .. })
    }
}

/// Settings for [`FaceVerifier`].
#[derive(Debug, Clone)]
pub struct VerifierConfig {
    /// Directory containing `det_10g.onnx` and `w600k_r50.onnx`.
    pub model_dir: PathBuf,
    pub metric: DistanceMetric,
    /// Overrides the metric's default threshold.
    pub threshold: Option<f32>,
    /// Fail when an image has no detectable face instead of using the whole
    /// image.
    pub enforce_detection: bool,
}

impl Default for VerifierConfig {
    fn default() -> Self {
        Self {
            model_dir: crate::default_model_dir(),
            metric: DistanceMetric::default(),
            threshold: None,
            enforce_detection: false,
        }
    }
}

impl VerifierConfig {
    /// Threshold in effect: the override if set, else the metric default.
    pub fn effective_threshold(&self) -> Result<f32, VerifyError> {
        match self.threshold {
            Some(t) if !t.is_finite() || t < 0.0 => Err(VerifyError::InvalidThreshold(t)),
            Some(t) => Ok(t),
            None => Ok(self.metric.default_threshold()),
        }
    }

    pub fn scrfd_model_path(&self) -> PathBuf {
        self.model_dir.join(crate::SCRFD_MODEL_FILE)
    }

    pub fn arcface_model_path(&self) -> PathBuf {
        self.model_dir.join(crate::ARCFACE_MODEL_FILE)
    }
}

/// Verifier backed by the SCRFD and ArcFace ONNX models.
pub struct FaceVerifier {
    detector: FaceDetector,
    recognizer: FaceRecognizer,
    metric: DistanceMetric,
    threshold: f32,
    enforce_detection: bool,
}

impl FaceVerifier {
    /// Load both models. Fails fast if either model file is missing.
    pub fn load(config: &VerifierConfig) -> Result<Self, VerifyError> {
        let threshold = config.effective_threshold()?;
        let detector = FaceDetector::load(&config.scrfd_model_path())?;
        let recognizer = FaceRecognizer::load(&config.arcface_model_path())?;

        tracing::info!(
            model_dir = %config.model_dir.display(),
            metric = %config.metric,
            threshold,
            enforce_detection = config.enforce_detection,
            "face verifier ready"
        );

        Ok(Self {
            detector,
            recognizer,
            metric: config.metric,
            threshold,
            enforce_detection: config.enforce_detection,
        })
    }

    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    pub fn threshold(&self) -> f32 {
        self.threshold
    }

    /// Embed the most confident face of one image, or the whole image when
    /// no face is found and detection is not enforced.
    fn represent(&mut self, path: &Path, side: Side) -> Result<(Embedding, Option<BoundingBox>), VerifyError> {
        let frame = Frame::open(path).map_err(|source| VerifyError::Decode { side, source })?;
        let faces = self.detector.detect(&frame)?;

        match select_face(&faces) {
            Some(face) => {
                tracing::debug!(%side, confidence = face.confidence, faces = faces.len(), "face selected");
                let embedding = self.recognizer.extract(&frame, face)?;
                Ok((embedding, Some(face.clone())))
            }
            None if self.enforce_detection => Err(VerifyError::NoFace(side)),
            None => {
                tracing::info!(
                    %side,
                    brightness = frame.avg_brightness(),
                    "no face detected; using whole image"
                );
                let embedding = self.recognizer.extract_whole(&frame)?;
                Ok((embedding, None))
            }
        }
    }
}

impl Verifier for FaceVerifier {
    fn verify(&mut self, source: &Path, comparison: &Path) -> Result<Verification, VerifyError> {
        let started = Instant::now();

        let (source_emb, source_face) = self.represent(source, Side::Source)?;
        let (comparison_emb, comparison_face) = self.represent(comparison, Side::Comparison)?;

        let (distance, verified) = compare(self.metric, self.threshold, &source_emb, &comparison_emb);
        let elapsed_ms = started.elapsed().as_millis() as u64;

        tracing::info!(
            verified,
            distance,
            threshold = self.threshold,
            metric = %self.metric,
            elapsed_ms,
            "verification complete"
        );

        Ok(Verification {
            verified,
            distance,
            threshold: self.threshold,
            metric: self.metric,
            model: ARCFACE_MODEL_VERSION.to_string(),
            source_face,
            comparison_face,
            elapsed_ms,
        })
    }
}

/// Highest-confidence face that carries landmarks. Detector output is
/// already sorted by confidence.
fn select_face(faces: &[BoundingBox]) -> Option<&BoundingBox> {
    faces.iter().find(|f| f.landmarks.is_some())
}

/// Distance between two embeddings and the resulting decision.
fn compare(metric: DistanceMetric, threshold: f32, a: &Embedding, b: &Embedding) -> (f32, bool) {
    let distance = metric.distance(a, b);
    (distance, is_same_person(distance, threshold))
}
