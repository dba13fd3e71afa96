//! Shared pump state: lifecycle phase, error flag, counters.
//!
//! Everything here is lock-free and shared between the worker thread, the
//! lifecycle controller and the UI.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};

// ── PumpState ─────────────────────────────────────────────────────────────────

/// ```text
/// Idle ──start──► Starting ──gate open──► Running
///                    │                       │
///                    └──────stop─────────────┴──stop──► Stopping ──► Stopped
///
/// Stopped ──start──► Starting
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum PumpState {
    Idle     = 0,
    Starting = 1,
    Running  = 2,
    Stopping = 3,
    Stopped  = 4,
}

impl PumpState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => Self::Starting,
            2 => Self::Running,
            3 => Self::Stopping,
            4 => Self::Stopped,
            _ => Self::Idle,
        }
    }

    /// A worker thread exists (or is about to) for this state.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Starting | Self::Running)
    }
}

impl fmt::Display for PumpState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Idle     => "idle",
            Self::Starting => "starting",
            Self::Running  => "running",
            Self::Stopping => "stopping",
            Self::Stopped  => "stopped",
        };
        f.write_str(s)
    }
}

/// Atomic cell holding a [`PumpState`].
#[derive(Debug)]
pub struct AtomicPumpState(AtomicU8);

impl AtomicPumpState {
    pub fn new(state: PumpState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> PumpState {
        PumpState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn store(&self, state: PumpState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Compare-and-set. Returns `true` if this call performed the transition.
    pub fn transition(&self, from: PumpState, to: PumpState) -> bool {
        self.0
            .compare_exchange(from as u8, to as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

// ── ErrorFlag ─────────────────────────────────────────────────────────────────

/// Set by a failed cycle, cleared by the next cycle that gets a frame.
#[derive(Debug, Default)]
pub struct ErrorFlag(AtomicBool);

impl ErrorFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn clear(&self) {
        self.0.store(false, Ordering::SeqCst);
    }

    pub fn is_set(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

// ── PumpStats ─────────────────────────────────────────────────────────────────

#[derive(Debug, Default)]
pub struct PumpStats {
    fetches:    AtomicU64,
    renders:    AtomicU64,
    duplicates: AtomicU64,
    errors:     AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub fetches:    u64,
    pub renders:    u64,
    pub duplicates: u64,
    pub errors:     u64,
}

impl PumpStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_fetch(&self) {
        self.fetches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_render(&self) {
        self.renders.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_duplicate(&self) {
        self.duplicates.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns the total error count including this one.
    pub fn record_error(&self) -> u64 {
        self.errors.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            fetches:    self.fetches.load(Ordering::Relaxed),
            renders:    self.renders.load(Ordering::Relaxed),
            duplicates: self.duplicates.load(Ordering::Relaxed),
            errors:     self.errors.load(Ordering::Relaxed),
        }
    }
}
