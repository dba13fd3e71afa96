//! Device lifecycle around a [`FramePump`].
//!
//! ```text
//! Closed ──open_and_start──► Opening ──open ok──► Open ──close_and_stop──► Closing ──► Closed
//!                               │                   │
//!                               └──open failed──►  Errored ◄──device closed unexpectedly
//! ```
//!
//! `Errored` is absorbing: `close_and_stop` still releases the pump and the
//! device but the state stays `Errored`.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};

use camlink_capture::{CaptureEvent, CaptureSource, LoggingListener};
use camlink_core::{CamlinkError, DeviceError};
use tracing::{debug, error, info, warn};

use crate::pump::FramePump;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    Closed,
    Opening,
    Open,
    Closing,
    Errored,
}

impl fmt::Display for DeviceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Closed  => "closed",
            Self::Opening => "opening",
            Self::Open    => "open",
            Self::Closing => "closing",
            Self::Errored => "errored",
        };
        f.write_str(s)
    }
}

type SharedState = Arc<Mutex<DeviceState>>;

fn lock(state: &SharedState) -> MutexGuard<'_, DeviceState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

pub struct LifecycleController {
    pump:  FramePump,
    state: SharedState,
}

impl LifecycleController {
    pub fn new(pump: FramePump) -> Self {
        let state: SharedState = Arc::new(Mutex::new(DeviceState::Closed));

        let source = pump.source();
        source.add_listener(Arc::new(LoggingListener));
        let watched = Arc::clone(&state);
        source.add_listener(Arc::new(move |device: &str, event: CaptureEvent| {
            if event != CaptureEvent::Closed {
                return;
            }
            let mut state = lock(&watched);
            if *state == DeviceState::Open {
                warn!("[{}] device closed while streaming", device);
                *state = DeviceState::Errored;
            }
        }));

        Self { pump, state }
    }

    pub fn state(&self) -> DeviceState {
        *lock(&self.state)
    }

    pub fn pump(&self) -> &FramePump {
        &self.pump
    }

    fn source(&self) -> &Arc<dyn CaptureSource> {
        self.pump.source()
    }

    /// Open the device and start pumping frames. Blocks while the device
    /// opens; call it off the UI thread.
    ///
    /// The pump is started first and held in `Starting` until the open
    /// completes, so it never fetches from a device that is not open yet.
    pub fn open_and_start(&self) -> Result<(), CamlinkError> {
        {
            let mut state = lock(&self.state);
            if *state != DeviceState::Closed {
                return Err(CamlinkError::InvalidTransition {
                    from: state.to_string(),
                    to:   DeviceState::Opening.to_string(),
                });
            }
            *state = DeviceState::Opening;
        }
        let name = self.source().name().to_string();
        info!("[{}] opening device", name);

        self.pump.arm_open_gate();
        if let Err(e) = self.pump.start() {
            self.pump.release_open_gate(false);
            *lock(&self.state) = DeviceState::Errored;
            return Err(e);
        }

        let opened = if self.source().is_open() {
            debug!("[{}] device already open", name);
            Ok(true)
        } else {
            self.source().open()
        };

        match opened {
            Ok(true) => {
                self.pump.release_open_gate(true);
                let mut state = lock(&self.state);
                if *state == DeviceState::Opening {
                    *state = DeviceState::Open;
                    info!("[{}] device open, pump running", name);
                    return Ok(());
                }
                // close_and_stop ran while the device was opening.
                let current = *state;
                drop(state);
                debug!("[{}] device opened after close ({}), closing again", name, current);
                self.source().close();
                Err(CamlinkError::InvalidTransition {
                    from: current.to_string(),
                    to:   DeviceState::Open.to_string(),
                })
            }
            outcome => {
                let err = match outcome {
                    Err(e) => e,
                    _ => DeviceError::OpenRejected { device: name.clone() },
                };
                self.pump.release_open_gate(false);
                self.pump.stop();
                *lock(&self.state) = DeviceState::Errored;
                error!("[{}] {}", name, err);
                Err(CamlinkError::DeviceOpen(err))
            }
        }
    }

    /// Stop the pump (waiting for the in-flight cycle), then close the device.
    pub fn close_and_stop(&self) {
        let previous = {
            let mut state = lock(&self.state);
            let previous = *state;
            match previous {
                DeviceState::Closed | DeviceState::Closing => return,
                DeviceState::Errored => {}
                _ => *state = DeviceState::Closing,
            }
            previous
        };

        self.pump.stop();
        self.source().close();

        if previous != DeviceState::Errored {
            *lock(&self.state) = DeviceState::Closed;
        }
        info!("[{}] device closed ({} before)", self.source().name(), previous);
    }
}

impl Drop for LifecycleController {
    fn drop(&mut self) {
        self.close_and_stop();
    }
}
