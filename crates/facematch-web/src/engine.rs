use facematch_core::{Verification, Verifier, VerifyError};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Verify(#[from] VerifyError),
    #[error("verification engine crashed while processing the request")]
    Panicked,
    #[error("engine thread exited")]
    ChannelClosed,
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
}

impl EngineError {
    /// Errors caused by the submitted images rather than by the engine.
    pub fn is_input_error(&self) -> bool {
        matches!(self, EngineError::Verify(e) if e.is_input_error())
    }
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Verify {
        source: PathBuf,
        comparison: PathBuf,
        reply: oneshot::Sender<Result<Verification, EngineError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Compare the faces in two image files.
    pub async fn verify(&self, source: PathBuf, comparison: PathBuf) -> Result<Verification, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Verify {
                source,
                comparison,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        reply_rx.await.map_err(|_| EngineError::ChannelClosed)?
    }
}

/// Run the verifier on a dedicated OS thread.
///
/// Inference sessions need exclusive access, so requests are served one at a
/// time; at most `queue_depth` further requests wait in the channel.
pub fn spawn_engine(
    mut verifier: Box<dyn Verifier + Send>,
    queue_depth: usize,
) -> Result<EngineHandle, EngineError> {
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(queue_depth.max(1));

    std::thread::Builder::new()
        .name("facematch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Verify {
                        source,
                        comparison,
                        reply,
                    } => {
                        let result = match catch_unwind(AssertUnwindSafe(|| {
                            verifier.verify(&source, &comparison)
                        })) {
                            Ok(r) => r.map_err(EngineError::from),
                            Err(_) => {
                                tracing::error!(source = %source.display(), "verifier panicked");
                                Err(EngineError::Panicked)
                            }
                        };
                        if reply.send(result).is_err() {
                            tracing::debug!("verify requester went away before the reply");
                        }
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}

#[cfg(test)]
mod tests {
    use super::*;
    use facematch_core::{DistanceMetric, Side};
    use std::path::Path;

    struct FixedVerifier {
        distance: f32,
    }

    impl Verifier for FixedVerifier {
        fn verify(&mut self, source: &Path, _comparison: &Path) -> Result<Verification, VerifyError> {
            if source.ends_with("noface.jpg") {
                return Err(VerifyError::NoFace(Side::Source));
            }
            if source.ends_with("panic.jpg") {
                panic!("boom");
            }
            Ok(Verification {
                verified: self.distance <= 0.68,
                distance: self.distance,
                threshold: 0.68,
                metric: DistanceMetric::Cosine,
                model: "fixed".into(),
                source_face: None,
                comparison_face: None,
                elapsed_ms: 0,
            })
        }
    }

    fn engine(distance: f32) -> EngineHandle {
        spawn_engine(Box::new(FixedVerifier { distance }), 2).unwrap()
    }

    #[tokio::test]
    async fn test_verify_roundtrip() {
        let handle = engine(0.2);
        let v = handle.verify("a.jpg".into(), "b.jpg".into()).await.unwrap();
        assert!(v.verified);
        assert!((v.distance - 0.2).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_verify_error_is_forwarded() {
        let handle = engine(0.2);
        let err = handle.verify("noface.jpg".into(), "b.jpg".into()).await.unwrap_err();
        assert!(err.is_input_error());
        assert_eq!(err.to_string(), "no face detected in the source image");
    }

    #[tokio::test]
    async fn test_engine_survives_panic() {
        let handle = engine(0.9);
        let err = handle.verify("panic.jpg".into(), "b.jpg".into()).await.unwrap_err();
        assert!(matches!(err, EngineError::Panicked));
        assert!(!err.is_input_error());

        let v = handle.verify("a.jpg".into(), "b.jpg".into()).await.unwrap();
        assert!(!v.verified);
    }

    #[tokio::test]
    async fn test_handles_share_one_engine() {
        let handle = engine(0.1);
        let other = handle.clone();
        let (a, b) = tokio::join!(
            handle.verify("a.jpg".into(), "b.jpg".into()),
            other.verify("c.jpg".into(), "d.jpg".into()),
        );
        assert!(a.unwrap().verified);
        assert!(b.unwrap().verified);
    }
}
