//! Video link abstraction.
//!
//! A `VideoLink` stands in for the connected aircraft: it reports whether a
//! product is present and which video feeds it exposes. Feeds deliver frames
//! through a registered callback until the callback is cleared.

use crate::frame::Frame;
use std::sync::Arc;

/// Callback invoked for every frame a feed delivers.
pub type FrameCallback = Arc<dyn Fn(Frame) + Send + Sync>;

/// Model reported by the connected product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProductModel {
    /// A recognised product, with its human-readable name.
    Known(String),
    /// The product answered but could not identify its airframe.
    UnknownAircraft,
}

/// Snapshot of the product on the other end of a link.
#[derive(Debug, Clone)]
pub struct ProductInfo {
    pub model: ProductModel,
    pub connected: bool,
}

/// A single source of frames.
pub trait VideoFeed: Send + Sync {
    /// Register (`Some`) or clear (`None`) the frame callback.
    ///
    /// Registering replaces any previous callback.
    fn set_callback(&self, callback: Option<FrameCallback>);
}

/// The injected replacement for global product/feeder lookups.
pub trait VideoLink: Send + Sync {
    /// The product currently attached, if any.
    fn product(&self) -> Option<ProductInfo>;

    /// Video feeds exposed by the product, primary feed first.
    fn video_feeds(&self) -> Vec<Arc<dyn VideoFeed>>;
}
