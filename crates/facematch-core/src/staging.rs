//! Temporary on-disk copies of an upload pair.
//!
//! Each request gets its own directory holding `source.jpg` and
//! `comparison.jpg`. The directory is removed when the [`StagedPair`] is
//! dropped, whichever way the request ends.

use crate::upload::ValidatedImage;
use image::{DynamicImage, ImageFormat};
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use thiserror::Error;

const SOURCE_FILE: &str = "source.jpg";
const COMPARISON_FILE: &str = "comparison.jpg";
const STAGING_PREFIX: &str = "facematch-";

#[derive(Error, Debug)]
pub enum StagingError {
    #[error("cannot create staging directory: {0}")]
    CreateDir(#[source] std::io::Error),
    #[error("cannot write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: image::ImageError,
    },
    #[error("cannot remove staging directory {path}: {source}")]
    Cleanup {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Two uploads written to a private temporary directory as JPEG.
#[derive(Debug)]
pub struct StagedPair {
    dir: TempDir,
    source: PathBuf,
    comparison: PathBuf,
}

impl StagedPair {
    /// Write both images into a fresh directory under `parent`
    /// (or the system temp directory).
    pub fn stage(
        source: &ValidatedImage,
        comparison: &ValidatedImage,
        parent: Option<&Path>,
    ) -> Result<Self, StagingError> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(STAGING_PREFIX);
        let dir = match parent {
            Some(p) => builder.tempdir_in(p),
            None => builder.tempdir(),
        }
        .map_err(StagingError::CreateDir)?;

        let source_path = dir.path().join(SOURCE_FILE);
        let comparison_path = dir.path().join(COMPARISON_FILE);

        write_jpeg(&source.image, &source_path)?;
        write_jpeg(&comparison.image, &comparison_path)?;

        tracing::debug!(dir = %dir.path().display(), "staged upload pair");

        Ok(Self {
            dir,
            source: source_path,
            comparison: comparison_path,
        })
    }

    pub fn source_path(&self) -> &Path {
        &self.source
    }

    pub fn comparison_path(&self) -> &Path {
        &self.comparison
    }

    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Remove the staged files now and report failure. Dropping the pair
    /// removes them too, but silently.
    pub fn close(self) -> Result<(), StagingError> {
        let path = self.dir.path().display().to_string();
        self.dir
            .close()
            .map_err(|source| StagingError::Cleanup { path, source })
    }
}

/// Remove a staged pair, logging instead of failing. Cleanup problems never
/// change the outcome of a request.
pub fn discard(staged: StagedPair) {
    if let Err(err) = staged.close() {
        tracing::warn!(error = %err, "failed to clean up staged uploads");
    }
}

fn write_jpeg(image: &DynamicImage, path: &Path) -> Result<(), StagingError> {
    // The JPEG encoder rejects alpha channels.
    DynamicImage::ImageRgb8(image.to_rgb8())
        .save_with_format(path, ImageFormat::Jpeg)
        .map_err(|source| StagingError::Write {
            path: path.display().to_string(),
            source,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::upload::ImageKind;
    use image::{Rgba, RgbaImage};

    fn validated(width: u32, height: u32) -> ValidatedImage {
        let img = RgbaImage::from_pixel(width, height, Rgba([90, 160, 220, 128]));
        ValidatedImage {
            kind: ImageKind::Png,
            width,
            height,
            image: DynamicImage::ImageRgba8(img),
        }
    }

    #[test]
    fn test_stage_writes_decodable_jpegs() {
        let parent = TempDir::new().unwrap();
        let staged = StagedPair::stage(&validated(10, 8), &validated(4, 4), Some(parent.path())).unwrap();

        assert!(staged.dir().starts_with(parent.path()));
        let a = image::open(staged.source_path()).unwrap();
        let b = image::open(staged.comparison_path()).unwrap();
        assert_eq!((a.width(), a.height()), (10, 8));
        assert_eq!((b.width(), b.height()), (4, 4));
        assert_eq!(
            image::ImageFormat::from_path(staged.source_path()).unwrap(),
            ImageFormat::Jpeg
        );
    }

    #[test]
    fn test_drop_removes_files() {
        let parent = TempDir::new().unwrap();
        let staged = StagedPair::stage(&validated(2, 2), &validated(2, 2), Some(parent.path())).unwrap();
        let dir = staged.dir().to_path_buf();
        let source = staged.source_path().to_path_buf();
        assert!(source.exists());

        drop(staged);
        assert!(!source.exists());
        assert!(!dir.exists());
    }

    #[test]
    fn test_close_removes_files() {
        let parent = TempDir::new().unwrap();
        let staged = StagedPair::stage(&validated(2, 2), &validated(2, 2), Some(parent.path())).unwrap();
        let dir = staged.dir().to_path_buf();
        staged.close().unwrap();
        assert!(!dir.exists());
    }

    #[test]
    fn test_concurrent_pairs_do_not_collide() {
        let parent = TempDir::new().unwrap();
        let a = StagedPair::stage(&validated(2, 2), &validated(2, 2), Some(parent.path())).unwrap();
        let b = StagedPair::stage(&validated(3, 3), &validated(3, 3), Some(parent.path())).unwrap();
        assert_ne!(a.source_path(), b.source_path());
        discard(a);
        assert!(b.source_path().exists());
    }

    #[test]
    fn test_missing_parent_fails() {
        let result = StagedPair::stage(
            &validated(2, 2),
            &validated(2, 2),
            Some(Path::new("/nonexistent/facematch/staging")),
        );
        assert!(matches!(result, Err(StagingError::CreateDir(_))));
    }
}
