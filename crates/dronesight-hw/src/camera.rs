//! V4L2 video link via the `v4l` crate.
//!
//! Drone remote controllers and HDMI grabbers commonly expose the live feed
//! as a UVC device; this link treats such a device as the connected product.

use crate::frame::{self, Frame};
use crate::link::{FrameCallback, ProductInfo, ProductModel, VideoFeed, VideoLink};
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use thiserror::Error;
use v4l::buffer::Type as BufType;
use v4l::io::traits::CaptureStream;
use v4l::prelude::*;
use v4l::video::Capture;
use v4l::FourCC;

const REQUESTED_WIDTH: u32 = 1280;
const REQUESTED_HEIGHT: u32 = 720;
const STREAM_BUFFERS: u32 = 4;

#[derive(Error, Debug)]
pub enum CameraError {
    #[error("device not found: {0}")]
    DeviceNotFound(String),
    #[error("capture failed: {0}")]
    CaptureFailed(String),
    #[error("device busy")]
    DeviceBusy,
    #[error("format negotiation failed: {0}")]
    FormatNegotiationFailed(String),
    #[error("streaming not supported")]
    StreamingNotSupported,
}

/// Info about a discovered V4L2 device.
#[derive(Debug, Clone)]
pub struct DeviceInfo {
    pub path: String,
    pub name: String,
    pub driver: String,
    pub bus: String,
}

/// Negotiated pixel format for the capture device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// YUYV 4:2:2 packed (2 bytes/pixel).
    Yuyv,
    /// Packed 24-bit RGB.
    Rgb3,
    /// 8-bit grayscale.
    Grey,
}

impl PixelFormat {
    fn from_fourcc(fourcc: FourCC) -> Option<Self> {
        if fourcc == FourCC::new(b"YUYV") {
            Some(Self::Yuyv)
        } else if fourcc == FourCC::new(b"RGB3") {
            Some(Self::Rgb3)
        } else if fourcc == FourCC::new(b"GREY") {
            Some(Self::Grey)
        } else {
            None
        }
    }
}

/// Convert a raw capture buffer to RGB8 according to the negotiated format.
pub fn buf_to_rgb(
    format: PixelFormat,
    buf: &[u8],
    width: u32,
    height: u32,
) -> Result<Vec<u8>, frame::FrameError> {
    match format {
        PixelFormat::Yuyv => frame::yuyv_to_rgb(buf, width, height),
        PixelFormat::Grey => frame::grey_to_rgb(buf, width, height),
        PixelFormat::Rgb3 => {
            let expected = width as usize * height as usize * 3;
            if buf.len() < expected {
                return Err(frame::FrameError::InvalidLength {
                    expected,
                    actual: buf.len(),
                });
            }
            Ok(buf[..expected].to_vec())
        }
    }
}

/// Background capture thread state.
struct Worker {
    stop: Arc<AtomicBool>,
    handle: JoinHandle<()>,
}

/// V4L2 capture device handle.
pub struct Camera {
    device: Arc<Device>,
    pub width: u32,
    pub height: u32,
    pub device_path: String,
    pub card: String,
    pub fourcc: FourCC,
    pixel_format: PixelFormat,
    worker: Mutex<Option<Worker>>,
}

impl Camera {
    /// Open a V4L2 device by path (e.g., "/dev/video0") and negotiate a format.
    pub fn open(device_path: &str) -> Result<Self, CameraError> {
        if !Path::new(device_path).exists() {
            return Err(CameraError::DeviceNotFound(device_path.to_string()));
        }

        let device = Device::with_path(device_path).map_err(|e| {
            if e.to_string().contains("busy") || e.to_string().contains("EBUSY") {
                CameraError::DeviceBusy
            } else {
                CameraError::DeviceNotFound(format!("{device_path}: {e}"))
            }
        })?;

        let caps = device.query_caps().map_err(|e| {
            CameraError::CaptureFailed(format!("failed to query capabilities: {e}"))
        })?;

        tracing::info!(
            device = device_path,
            driver = %caps.driver,
            card = %caps.card,
            "opened capture device"
        );

        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(CameraError::StreamingNotSupported);
        }

        // Ask for 720p YUYV; accept whatever supported format the driver settles on.
        let mut fmt = device.format().map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to get format: {e}"))
        })?;

        fmt.fourcc = FourCC::new(b"YUYV");
        fmt.width = REQUESTED_WIDTH;
        fmt.height = REQUESTED_HEIGHT;

        let negotiated = device.set_format(&fmt).map_err(|e| {
            CameraError::FormatNegotiationFailed(format!("failed to set format: {e}"))
        })?;

        let fourcc = negotiated.fourcc;
        let pixel_format = PixelFormat::from_fourcc(fourcc).ok_or_else(|| {
            CameraError::FormatNegotiationFailed(format!(
                "unsupported pixel format: {fourcc:?} (need YUYV, RGB3, or GREY)"
            ))
        })?;

        tracing::info!(
            width = negotiated.width,
            height = negotiated.height,
            fourcc = ?fourcc,
            "negotiated format"
        );

        Ok(Self {
            device: Arc::new(device),
            width: negotiated.width,
            height: negotiated.height,
            device_path: device_path.to_string(),
            card: caps.card,
            fourcc,
            pixel_format,
            worker: Mutex::new(None),
        })
    }

    fn start_streaming(&self, callback: FrameCallback) -> Result<(), CameraError> {
        self.stop_streaming();

        let stop = Arc::new(AtomicBool::new(false));
        let device = Arc::clone(&self.device);
        let (width, height, format) = (self.width, self.height, self.pixel_format);
        let thread_stop = Arc::clone(&stop);
        let path = self.device_path.clone();

        let handle = std::thread::Builder::new()
            .name("dronesight-capture".into())
            .spawn(move || {
                let mut stream =
                    match MmapStream::with_buffers(&device, BufType::VideoCapture, STREAM_BUFFERS) {
                        Ok(s) => s,
                        Err(e) => {
                            tracing::error!(device = %path, error = %e, "failed to create mmap stream");
                            return;
                        }
                    };
                tracing::debug!(device = %path, "capture thread started");

                while !thread_stop.load(Ordering::Relaxed) {
                    let (buf, meta) = match stream.next() {
                        Ok(next) => next,
                        Err(e) => {
                            tracing::error!(device = %path, error = %e, "failed to dequeue buffer");
                            break;
                        }
                    };
                    match buf_to_rgb(format, buf, width, height)
                        .and_then(|rgb| Frame::from_rgb(rgb, width, height, meta.sequence))
                    {
                        Ok(frame) => callback(frame),
                        Err(e) => tracing::debug!(seq = meta.sequence, error = %e, "dropping frame"),
                    }
                }
                tracing::debug!(device = %path, "capture thread exiting");
            })
            .map_err(|e| CameraError::CaptureFailed(format!("failed to spawn capture thread: {e}")))?;

        *self.worker.lock().unwrap_or_else(|e| e.into_inner()) = Some(Worker { stop, handle });
        Ok(())
    }

    fn stop_streaming(&self) {
        let worker = self.worker.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(worker) = worker {
            worker.stop.store(true, Ordering::Relaxed);
            if worker.handle.join().is_err() {
                tracing::warn!(device = %self.device_path, "capture thread panicked");
            }
        }
    }

    /// List available V4L2 video capture devices.
    pub fn list_devices() -> Vec<DeviceInfo> {
        let mut devices = Vec::new();

        for i in 0..16 {
            let path = format!("/dev/video{i}");
            if !Path::new(&path).exists() {
                continue;
            }
            let Ok(dev) = Device::with_path(&path) else {
                continue;
            };
            let Ok(caps) = dev.query_caps() else {
                continue;
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }
            devices.push(DeviceInfo {
                path,
                name: caps.card.clone(),
                driver: caps.driver.clone(),
                bus: caps.bus.clone(),
            });
        }

        devices
    }
}

impl VideoFeed for Camera {
    fn set_callback(&self, callback: Option<FrameCallback>) {
        match callback {
            Some(cb) => {
                if let Err(e) = self.start_streaming(cb) {
                    tracing::error!(device = %self.device_path, error = %e, "failed to start streaming");
                }
            }
            None => self.stop_streaming(),
        }
    }
}

impl Drop for Camera {
    fn drop(&mut self) {
        self.stop_streaming();
    }
}

/// A V4L2 device presented as a connected product with a single feed.
///
/// If the device cannot be opened the link reports no product.
pub struct UvcLink {
    camera: Option<Arc<Camera>>,
}

impl UvcLink {
    pub fn open(device_path: &str) -> Self {
        match Camera::open(device_path) {
            Ok(camera) => Self {
                camera: Some(Arc::new(camera)),
            },
            Err(e) => {
                tracing::warn!(device = device_path, error = %e, "capture device unavailable");
                Self { camera: None }
            }
        }
    }
}

impl VideoLink for UvcLink {
    fn product(&self) -> Option<ProductInfo> {
        let camera = self.camera.as_ref()?;
        let model = if camera.card.trim().is_empty() {
            ProductModel::UnknownAircraft
        } else {
            ProductModel::Known(camera.card.clone())
        };
        Some(ProductInfo {
            model,
            connected: Path::new(&camera.device_path).exists(),
        })
    }

    fn video_feeds(&self) -> Vec<Arc<dyn VideoFeed>> {
        self.camera
            .iter()
            .map(|c| Arc::clone(c) as Arc<dyn VideoFeed>)
            .collect()
    }
}
