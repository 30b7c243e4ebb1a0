//! dronesight-hw — Video link abstraction and frame capture.
//!
//! Replaces global product/feeder lookups with an injected [`VideoLink`],
//! binds its primary feed to a latest-frame slot, and provides V4L2 and
//! still-image links.

pub mod camera;
pub mod frame;
pub mod link;
pub mod preview;
pub mod still;

pub use camera::{Camera, CameraError, PixelFormat, UvcLink};
pub use frame::{Frame, FrameError};
pub use link::{FrameCallback, ProductInfo, ProductModel, VideoFeed, VideoLink};
pub use preview::{BindOutcome, FrameSlot, Previewer};
pub use still::{StillImageError, StillImageLink};
