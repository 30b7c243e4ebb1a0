//! Still-image video link.
//!
//! Serves a single decoded image file as the live feed, so the analysis path
//! can be exercised without a drone attached.

use crate::frame::{Frame, FrameError};
use crate::link::{FrameCallback, ProductInfo, ProductModel, VideoFeed, VideoLink};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StillImageError {
    #[error("failed to load image {path}: {source}")]
    Load {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },
    #[error(transparent)]
    Frame(#[from] FrameError),
}

/// Feed that hands the same frame to every registered callback.
pub struct StillImageFeed {
    frame: Frame,
}

impl VideoFeed for StillImageFeed {
    fn set_callback(&self, callback: Option<FrameCallback>) {
        if let Some(cb) = callback {
            cb(self.frame.clone());
        }
    }
}

/// A link whose single "product" is an image on disk.
pub struct StillImageLink {
    name: String,
    feed: Arc<StillImageFeed>,
}

impl StillImageLink {
    /// Decode `path` into an RGB frame.
    pub fn open(path: &Path) -> Result<Self, StillImageError> {
        let rgb = image::open(path)
            .map_err(|source| StillImageError::Load {
                path: path.to_path_buf(),
                source,
            })?
            .to_rgb8();
        let (width, height) = rgb.dimensions();
        let frame = Frame::from_rgb(rgb.into_raw(), width, height, 0)?;

        tracing::info!(path = %path.display(), width, height, "loaded still image");

        Ok(Self {
            name: path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "still image".to_string()),
            feed: Arc::new(StillImageFeed { frame }),
        })
    }
}

impl VideoLink for StillImageLink {
    fn product(&self) -> Option<ProductInfo> {
        Some(ProductInfo {
            model: ProductModel::Known(self.name.clone()),
            connected: true,
        })
    }

    fn video_feeds(&self) -> Vec<Arc<dyn VideoFeed>> {
        vec![self.feed.clone() as Arc<dyn VideoFeed>]
    }
}
