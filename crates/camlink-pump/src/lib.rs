//! camlink-pump — the scheduler between a capture device and a render sink.
//!
//! # Threads
//!
//! ```text
//! caller thread           worker thread "repaint-scheduler-<device>"     UI thread
//! ─────────────           ─────────────────────────────────────────      ─────────
//! LifecycleController
//!   arm open gate
//!   FramePump::start ───► Starting: wait on open gate (condvar)
//!   CaptureSource::open       │
//!   release open gate ──────► Running:
//!                               sleep per PacingPolicy
//!                               fetch_latest_frame()
//!                               FrameBuffer dedup
//!                               RenderDispatcher::dispatch ──mpsc──► RenderQueue::drain(sink)
//!   FramePump::stop  ───────► Stopping: finish current cycle, exit
//!   (joins worker)
//!   CaptureSource::close
//! ```
//!
//! At most one fetch cycle is in flight per pump, and none once `stop()` has
//! returned.

pub mod buffer;
pub mod lifecycle;
pub mod pacing;
pub mod pump;
pub mod signal;
pub mod state;
pub mod worker;

#[cfg(test)]
mod mock;

pub use buffer::FrameBuffer;
pub use lifecycle::{DeviceState, LifecycleController};
pub use pacing::{PacingPolicy, Schedule};
pub use pump::{FramePump, PumpConfig};
pub use state::{ErrorFlag, PumpState, PumpStats, StatsSnapshot};
pub use worker::{UncaughtError, UncaughtHandler, WorkerConfig};
