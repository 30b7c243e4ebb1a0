//! Preview binder: attaches a frame callback to the primary video feed
//! while the preview is visible and detaches it when hidden.

use crate::frame::Frame;
use crate::link::{FrameCallback, ProductModel, VideoFeed, VideoLink};
use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

/// Result of a [`Previewer::bind`] attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindOutcome {
    /// Callback registered on the primary feed.
    Bound,
    /// No product, or the product is not connected.
    Disconnected,
    /// The product could not identify its model; feeds are not trusted.
    UnknownModel,
    /// The product exposes no video feeds.
    NoFeed,
}

/// Latest-frame holder shared between the feed callback and the capture side.
#[derive(Clone, Default)]
pub struct FrameSlot {
    inner: Arc<(Mutex<Option<Frame>>, Condvar)>,
}

impl FrameSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the held frame and wake any waiter.
    pub fn store(&self, frame: Frame) {
        let (lock, cvar) = &*self.inner;
        let mut slot = lock.lock().unwrap_or_else(|e| e.into_inner());
        *slot = Some(frame);
        cvar.notify_all();
    }

    /// Clone of the most recent frame.
    pub fn latest(&self) -> Option<Frame> {
        let (lock, _) = &*self.inner;
        lock.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drop the held frame.
    pub fn clear(&self) {
        let (lock, _) = &*self.inner;
        *lock.lock().unwrap_or_else(|e| e.into_inner()) = None;
    }

    /// Block until a frame is available or `timeout` elapses.
    ///
    /// A timeout too large to represent as a deadline waits indefinitely.
    pub fn wait(&self, timeout: Duration) -> Option<Frame> {
        let deadline = Instant::now().checked_add(timeout);
        let (lock, cvar) = &*self.inner;
        let mut slot = lock.lock().unwrap_or_else(|e| e.into_inner());
        loop {
            if let Some(frame) = slot.as_ref() {
                return Some(frame.clone());
            }
            slot = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return None;
                    }
                    cvar.wait_timeout(slot, deadline - now)
                        .unwrap_or_else(|e| e.into_inner())
                        .0
                }
                None => cvar.wait(slot).unwrap_or_else(|e| e.into_inner()),
            };
        }
    }
}

/// Binds a [`VideoLink`]'s primary feed to a [`FrameSlot`].
pub struct Previewer {
    link: Arc<dyn VideoLink>,
    slot: FrameSlot,
    bound: Option<Arc<dyn VideoFeed>>,
}

impl Previewer {
    pub fn new(link: Arc<dyn VideoLink>) -> Self {
        Self {
            link,
            slot: FrameSlot::new(),
            bound: None,
        }
    }

    /// Register the frame callback on the primary feed if the product allows it.
    ///
    /// Any previous binding is released first, so a failed rebind leaves the
    /// preview unbound.
    pub fn bind(&mut self) -> BindOutcome {
        self.unbind();

        let Some(product) = self.link.product().filter(|p| p.connected) else {
            tracing::warn!("product disconnected; preview not bound");
            return BindOutcome::Disconnected;
        };

        if product.model == ProductModel::UnknownAircraft {
            tracing::warn!("product model unknown; preview not bound");
            return BindOutcome::UnknownModel;
        }

        let Some(feed) = self.link.video_feeds().into_iter().next() else {
            tracing::warn!(model = ?product.model, "product exposes no video feeds");
            return BindOutcome::NoFeed;
        };

        let slot = self.slot.clone();
        let callback: FrameCallback = Arc::new(move |frame| slot.store(frame));
        feed.set_callback(Some(callback));
        self.bound = Some(feed);

        tracing::info!(model = ?product.model, "preview bound to primary feed");
        BindOutcome::Bound
    }

    /// Clear the callback on the bound feed and drop the held frame.
    pub fn unbind(&mut self) {
        if let Some(feed) = self.bound.take() {
            feed.set_callback(None);
            tracing::info!("preview unbound");
        }
        self.slot.clear();
    }

    pub fn is_bound(&self) -> bool {
        self.bound.is_some()
    }

    /// The most recently delivered frame.
    pub fn snapshot(&self) -> Option<Frame> {
        self.slot.latest()
    }

    /// Block until a frame has been delivered, up to `timeout`.
    pub fn wait_for_frame(&self, timeout: Duration) -> Option<Frame> {
        self.slot.wait(timeout)
    }
}

impl Drop for Previewer {
    fn drop(&mut self) {
        self.unbind();
    }
}
