use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facematch_core::upload::{self, UploadLimits};
use facematch_core::{DistanceMetric, FaceVerifier, Verifier, VerifierConfig};
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Parser)]
#[command(name = "facematch", version, about = "Check whether two photos show the same person")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compare the faces in two images
    Verify {
        /// Source image (jpg, jpeg or png)
        source: PathBuf,
        /// Comparison image (jpg, jpeg or png)
        comparison: PathBuf,
        /// Distance metric: cosine, euclidean or euclidean_l2
        #[arg(long, default_value = "cosine")]
        metric: DistanceMetric,
        /// Override the metric's default distance threshold
        #[arg(long)]
        threshold: Option<f32>,
        /// Fail if either image has no detectable face
        #[arg(long)]
        enforce_detection: bool,
        /// Directory containing det_10g.onnx and w600k_r50.onnx
        #[arg(long, env = "FACEMATCH_MODEL_DIR")]
        model_dir: Option<PathBuf>,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Check that files would be accepted as uploads
    Check {
        #[arg(required = true)]
        images: Vec<PathBuf>,
    },
}

fn main() -> Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Verify {
            source,
            comparison,
            metric,
            threshold,
            enforce_detection,
            model_dir,
            json,
        } => {
            let config = VerifierConfig {
                model_dir: model_dir.unwrap_or_else(facematch_core::default_model_dir),
                metric,
                threshold,
                enforce_detection,
            };
            let mut verifier = FaceVerifier::load(&config).context("loading face models")?;
            tracing::info!(
                metric = %verifier.metric(),
                threshold = verifier.threshold(),
                source = %source.display(),
                comparison = %comparison.display(),
                "comparing images"
            );
            let result = verifier
                .verify(&source, &comparison)
                .context("face verification failed")?;

            tracing::debug!(verified = result.verified, distance = result.distance, "verdict");

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else if result.verified {
                println!("The images are of the same person!");
            } else {
                println!("The images are NOT of the same person!");
            }
            if !json {
                println!(
                    "Confidence Score: {:.4} ({} distance, threshold {:.4})",
                    result.distance, result.metric, result.threshold
                );
            }

            Ok(if result.verified { ExitCode::SUCCESS } else { ExitCode::from(1) })
        }
        Commands::Check { images } => {
            let limits = UploadLimits::default();
            let mut all_ok = true;
            for path in &images {
                let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
                let name = path.file_name().and_then(|n| n.to_str());
                match upload::validate(&bytes, name, &limits) {
                    Ok(img) => println!(
                        "{}: ok ({:?}, {}x{})",
                        path.display(),
                        img.kind,
                        img.width,
                        img.height
                    ),
                    Err(e) => {
                        all_ok = false;
                        println!("{}: invalid: {e}", path.display());
                    }
                }
            }
            Ok(if all_ok { ExitCode::SUCCESS } else { ExitCode::from(1) })
        }
    }
}
