//! camlink-renderer — the display side of the frame pump.
//!
//! The render sink is owned by a single-threaded UI context. The pump worker
//! never touches it; it submits [`RenderTask`]s through a [`RenderDispatcher`]
//! and the UI context drains them from its [`RenderQueue`] on its own loop:
//!
//! ```text
//! pump worker ──dispatch(frame)──► mpsc (FIFO, 8 deep) ──► RenderQueue::drain(sink)
//!      │                                                         │
//!      └──── wake() ─► UI event loop repaint ────────────────────┘
//! ```

mod dispatch;

pub use dispatch::{
    render_channel, RenderDispatcher, RenderObserver, RenderQueue, RenderTask, RENDER_QUEUE_DEPTH,
};

use camlink_core::Frame;
use thiserror::Error;

// MARK: - RenderSink trait

/// A display surface that shows one frame at a time.
///
/// Implementations are only ever called from the UI context that owns the
/// matching [`RenderQueue`].
pub trait RenderSink {
    /// Show `frame`, or clear the surface when `None`.
    fn set_current_frame(&mut self, frame: Option<&Frame>) -> Result<(), RendererError>;
}

// MARK: - RendererError

#[derive(Error, Debug)]
pub enum RendererError {
    #[error("Failed to present frame: {0}")]
    PresentFailed(String),

    #[error("Unsupported frame: {0}")]
    Unsupported(String),
}

// MARK: - CountingSink

/// Headless sink that only counts what it was asked to show.
#[derive(Debug, Default)]
pub struct CountingSink {
    presented: u64,
}

impl CountingSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `set_current_frame` calls so far.
    pub fn presented(&self) -> u64 {
        self.presented
    }
}

impl RenderSink for CountingSink {
    fn set_current_frame(&mut self, _frame: Option<&Frame>) -> Result<(), RendererError> {
        self.presented += 1;
        Ok(())
    }
}
