//! camlink-capture — capture device abstraction for the Camlink viewer.
//!
//! # Backends
//!
//! | Backend | Source | Status |
//! |---------|--------|--------|
//! | [`TestPatternDriver`] | synthetic moving bars | always available |
//! | `V4l2Driver` (GStreamer `v4l2src`) | USB / CSI cameras | `v4l2` feature |
//!
//! # Contract
//!
//! ```text
//! CaptureDriver::enumerate() ──► Vec<DeviceInfo>
//!        │ select_device(preferred)
//!        ▼
//! CaptureDriver::create_source() ──► Arc<dyn CaptureSource>
//!        │ open()            (may block; run off the UI thread)
//!        ▼
//! fetch_latest_frame() ──► Some(frame) | None      (polled by the frame pump)
//!        │ close()
//!        ▼
//! CaptureEvent::{Opened, ImageObtained, Closed, Disposed} ──► listeners
//! ```
//!
//! Sources return the *same* [`Frame`] (same identity) from
//! `fetch_latest_frame` until the device produces a new one.

pub mod events;
pub mod test_pattern;
#[cfg(feature = "v4l2")]
pub mod v4l2;

use std::sync::Arc;

use camlink_core::{CamlinkError, DeviceError, Frame, Resolution};
use tracing::{info, warn};

pub use events::{CaptureEvent, CaptureListener, ListenerRegistry, LoggingListener};
pub use test_pattern::{TestPatternDriver, TestPatternSource};
#[cfg(feature = "v4l2")]
pub use v4l2::{V4l2Driver, V4l2Source};

// ── DeviceInfo ────────────────────────────────────────────────────────────────

/// A device reported by [`CaptureDriver::enumerate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// Zero-based position in the enumeration order.
    pub index: usize,
    pub name:  String,
    /// Backend-specific locator, e.g. `/dev/video0`.
    pub path:  Option<String>,
}

// ── Traits ────────────────────────────────────────────────────────────────────

/// An opened-or-openable capture device.
///
/// All methods may be called from any thread. `fetch_latest_frame` is never
/// called concurrently with itself by the frame pump.
pub trait CaptureSource: Send + Sync {
    /// Human readable device name, used for diagnostics and thread names.
    fn name(&self) -> &str;

    /// Open the device. Blocks until the device is streaming or has failed.
    /// `Ok(false)` means the driver declined without a specific error.
    fn open(&self) -> Result<bool, DeviceError>;

    fn is_open(&self) -> bool;

    fn close(&self);

    /// Latest available frame, `None` if the device has not produced one yet.
    fn fetch_latest_frame(&self) -> Result<Option<Frame>, DeviceError>;

    /// Register an observer for device lifecycle events.
    fn add_listener(&self, listener: Arc<dyn CaptureListener>);
}

/// Enumerates devices of one backend and creates sources for them.
pub trait CaptureDriver: Send + Sync {
    fn name(&self) -> &str;

    fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError>;

    fn create_source(
        &self,
        device: &DeviceInfo,
        view_size: Resolution,
    ) -> Result<Arc<dyn CaptureSource>, DeviceError>;
}

// ── Device selection ──────────────────────────────────────────────────────────

/// Pick `preferred` if the driver lists it, otherwise the default (first)
/// device.
pub fn select_device(
    driver: &dyn CaptureDriver,
    preferred: Option<usize>,
) -> Result<DeviceInfo, CamlinkError> {
    let devices = driver.enumerate().map_err(CamlinkError::DeviceOpen)?;
    info!("[{}] {} device(s) found", driver.name(), devices.len());

    if let Some(index) = preferred {
        if let Some(device) = devices.iter().find(|d| d.index == index) {
            return Ok(device.clone());
        }
        warn!(
            "[{}] device #{} not present, falling back to default device",
            driver.name(),
            index
        );
    }
    devices.into_iter().next().ok_or(CamlinkError::NoDevice)
}

/// Enumerate, select and create a source in one step.
pub fn open_source(
    driver: &dyn CaptureDriver,
    preferred: Option<usize>,
    view_size: Resolution,
) -> Result<Arc<dyn CaptureSource>, CamlinkError> {
    let device = select_device(driver, preferred)?;
    info!("[{}] using device #{} '{}'", driver.name(), device.index, device.name);
    driver
        .create_source(&device, view_size)
        .map_err(CamlinkError::DeviceOpen)
}
