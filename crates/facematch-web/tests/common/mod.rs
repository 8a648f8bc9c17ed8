#![allow(dead_code)]

use facematch_core::{DistanceMetric, Side, Verification, Verifier, VerifyError};
use facematch_web::config::Config;
use facematch_web::{engine, routes, AppState};
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::net::TcpListener;

/// What the stub verifier answers.
#[derive(Clone, Copy)]
pub enum Answer {
    Distance(f32),
    NoFace,
}

/// Verifier that records the staged paths it was given and answers with a
/// fixed result.
pub struct StubVerifier {
    pub answer: Answer,
    pub seen: Arc<Mutex<Vec<PathBuf>>>,
}

impl Verifier for StubVerifier {
    fn verify(&mut self, source: &Path, comparison: &Path) -> Result<Verification, VerifyError> {
        // Staged files must exist and decode while the engine runs.
        assert!(image::open(source).is_ok(), "source not staged: {}", source.display());
        assert!(image::open(comparison).is_ok(), "comparison not staged: {}", comparison.display());
        {
            let mut seen = self.seen.lock().unwrap();
            seen.push(source.to_path_buf());
            seen.push(comparison.to_path_buf());
        }

        match self.answer {
            Answer::NoFace => Err(VerifyError::NoFace(Side::Comparison)),
            Answer::Distance(distance) => Ok(Verification {
                verified: distance <= 0.68,
                distance,
                threshold: 0.68,
                metric: DistanceMetric::Cosine,
                model: "stub".into(),
                source_face: None,
                comparison_face: None,
                elapsed_ms: 1,
            }),
        }
    }
}

pub struct TestServer {
    pub base: String,
    pub seen: Arc<Mutex<Vec<PathBuf>>>,
    pub staging: TempDir,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Files left in the staging directory.
    pub fn staged_leftovers(&self) -> usize {
        std::fs::read_dir(self.staging.path()).unwrap().count()
    }
}

/// Start a server on an ephemeral port backed by a stub verifier.
pub async fn start(answer: Answer) -> TestServer {
    start_with(answer, 10 * 1024 * 1024).await
}

pub async fn start_with(answer: Answer, max_upload_bytes: usize) -> TestServer {
    start_configured(answer, |config| config.max_upload_bytes = max_upload_bytes).await
}

/// Start a server after adjusting the default test configuration, which
/// stages uploads under [`TestServer::staging`].
pub async fn start_configured(answer: Answer, configure: impl FnOnce(&mut Config)) -> TestServer {
    let staging = TempDir::new().unwrap();
    let seen = Arc::new(Mutex::new(Vec::new()));

    let mut config = Config {
        temp_dir: Some(staging.path().to_path_buf()),
        ..Config::default()
    };
    configure(&mut config);
    let verifier = StubVerifier {
        answer,
        seen: seen.clone(),
    };
    let engine = engine::spawn_engine(Box::new(verifier), config.queue_depth).unwrap();
    let app = routes::router(Arc::new(AppState::new(&config, engine)));

    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0))).await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer {
        base: format!("http://127.0.0.1:{port}"),
        seen,
        staging,
    }
}

/// Encode a small solid-colour image.
pub fn image_bytes(width: u32, height: u32, format: ImageFormat) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([180, 140, 110]));
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), format)
        .unwrap();
    buf
}

/// Encode a PNG of pseudo-random noise, which PNG cannot compress much.
pub fn noise_png(width: u32, height: u32) -> Vec<u8> {
    let mut state = 0x2545_f491u32;
    let img = RgbImage::from_fn(width, height, |_, _| {
        let mut next = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state & 0xff) as u8
        };
        Rgb([next(), next(), next()])
    });
    let mut buf = Vec::new();
    DynamicImage::ImageRgb8(img)
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .unwrap();
    buf
}

pub fn part(bytes: Vec<u8>, file_name: &str, mime: &str) -> reqwest::multipart::Part {
    reqwest::multipart::Part::bytes(bytes)
        .file_name(file_name.to_string())
        .mime_str(mime)
        .unwrap()
}

/// A form carrying a PNG source and a JPEG comparison.
pub fn valid_form() -> reqwest::multipart::Form {
    reqwest::multipart::Form::new()
        .part("source", part(image_bytes(24, 24, ImageFormat::Png), "me.png", "image/png"))
        .part(
            "comparison",
            part(image_bytes(32, 20, ImageFormat::Jpeg), "id.jpg", "image/jpeg"),
        )
}
