use crate::verifier::VerifyError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::str::FromStr;

/// Bounding box for a detected face, with optional facial landmarks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
    pub confidence: f32,
    /// Five-point facial landmarks: [left_eye, right_eye, nose, left_mouth, right_mouth].
    pub landmarks: Option<[(f32, f32); 5]>,
}

/// Face embedding vector (512-dimensional for ArcFace).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Embedding {
    pub values: Vec<f32>,
    /// Model version that produced this embedding (e.g., "w600k_r50").
    pub model_version: Option<String>,
}

impl Embedding {
    /// Cosine similarity in [-1, 1]. Higher = more similar.
    pub fn similarity(&self, other: &Embedding) -> f32 {
        let mut dot = 0.0f32;
        let mut norm_a = 0.0f32;
        let mut norm_b = 0.0f32;

        for (a, b) in self.values.iter().zip(other.values.iter()) {
            dot += a * b;
            norm_a += a * a;
            norm_b += b * b;
        }

        let denom = norm_a.sqrt() * norm_b.sqrt();
        if denom > 0.0 { dot / denom } else { 0.0 }
    }

    /// Euclidean distance between the raw vectors.
    pub fn euclidean_distance(&self, other: &Embedding) -> f32 {
        self.values
            .iter()
            .zip(other.values.iter())
            .map(|(a, b)| (a - b).powi(2))
            .sum::<f32>()
            .sqrt()
    }

    /// Copy of this embedding scaled to unit length. A zero vector stays zero.
    pub fn l2_normalized(&self) -> Embedding {
        let norm: f32 = self.values.iter().map(|x| x * x).sum::<f32>().sqrt();
        let values = if norm > 0.0 {
            self.values.iter().map(|x| x / norm).collect()
        } else {
            self.values.clone()
        };
        Embedding {
            values,
            model_version: self.model_version.clone(),
        }
    }
}

/// How the distance between two embeddings is measured.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistanceMetric {
    /// `1 - cosine_similarity`, in [0, 2].
    #[default]
    Cosine,
    /// Euclidean distance between the raw, unnormalised embeddings.
    Euclidean,
    /// Euclidean distance after L2-normalizing both vectors, in [0, 2].
    EuclideanL2,
}

impl DistanceMetric {
    pub fn distance(&self, a: &Embedding, b: &Embedding) -> f32 {
        match self {
            DistanceMetric::Cosine => 1.0 - a.similarity(b),
            DistanceMetric::Euclidean => a.euclidean_distance(b),
            DistanceMetric::EuclideanL2 => a.l2_normalized().euclidean_distance(&b.l2_normalized()),
        }
    }

    /// Same-person threshold for raw ArcFace embeddings under this metric.
    pub fn default_threshold(&self) -> f32 {
        match self {
            DistanceMetric::Cosine => 0.68,
            DistanceMetric::Euclidean => 4.15,
            DistanceMetric::EuclideanL2 => 1.13,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            DistanceMetric::Cosine => "cosine",
            DistanceMetric::Euclidean => "euclidean",
            DistanceMetric::EuclideanL2 => "euclidean_l2",
        }
    }
}

impl fmt::Display for DistanceMetric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DistanceMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "cosine" => Ok(DistanceMetric::Cosine),
            "euclidean" => Ok(DistanceMetric::Euclidean),
            "euclidean_l2" | "euclidean-l2" => Ok(DistanceMetric::EuclideanL2),
            other => Err(format!(
                "unknown distance metric {other:?} (expected cosine, euclidean or euclidean_l2)"
            )),
        }
    }
}

/// Which of the two uploads a value refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Source,
    Comparison,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Source => f.write_str("source image"),
            Side::Comparison => f.write_str("comparison image"),
        }
    }
}

/// Outcome of comparing two face images.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Verification {
    pub verified: bool,
    pub distance: f32,
    pub threshold: f32,
    pub metric: DistanceMetric,
    /// Recognition model that produced the embeddings.
    pub model: String,
    /// Face used from the source image; `None` when the whole image was used.
    pub source_face: Option<BoundingBox>,
    pub comparison_face: Option<BoundingBox>,
    pub elapsed_ms: u64,
}

/// Same person iff the distance does not exceed the threshold.
pub fn is_same_person(distance: f32, threshold: f32) -> bool {
    distance <= threshold
}

/// Compares the faces in two image files.
///
/// Implementations may hold inference sessions that need exclusive access,
/// hence `&mut self`.
pub trait Verifier {
    fn verify(&mut self, source: &Path, comparison: &Path) -> Result<Verification, VerifyError>;
}
