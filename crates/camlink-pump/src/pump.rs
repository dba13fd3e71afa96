//! The frame pump: one worker thread polling a capture source and handing
//! changed frames to the render context.

use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

use camlink_capture::CaptureSource;
use camlink_core::{CamlinkError, DedupStrategy, Frame, PacingConfig, ViewerConfig};
use camlink_renderer::RenderDispatcher;
use tracing::{debug, info, trace, warn};

use crate::buffer::FrameBuffer;
use crate::pacing::PacingPolicy;
use crate::signal::{Control, GateWait};
use crate::state::{AtomicPumpState, ErrorFlag, PumpState, PumpStats, StatsSnapshot};
use crate::worker::{UncaughtError, WorkerConfig};

/// Back-off while the device reports not open.
pub const DEVICE_RETRY_DELAY: Duration = Duration::from_millis(500);

// ── PumpConfig ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Default)]
pub struct PumpConfig {
    pub pacing: PacingConfig,
    pub dedup:  DedupStrategy,
    pub worker: WorkerConfig,
}

impl From<&ViewerConfig> for PumpConfig {
    fn from(config: &ViewerConfig) -> Self {
        Self {
            pacing: config.pacing,
            dedup:  config.dedup,
            worker: WorkerConfig::default(),
        }
    }
}

// ── Shared ────────────────────────────────────────────────────────────────────

/// State shared between the pump handle and its worker thread.
struct Shared {
    source:      Arc<dyn CaptureSource>,
    dispatcher:  RenderDispatcher,
    policy:      PacingPolicy,
    dedup:       DedupStrategy,
    worker:      WorkerConfig,
    thread_name: String,
    state:       AtomicPumpState,
    control:     Control,
    error:       ErrorFlag,
    paused:      AtomicBool,
    stats:       PumpStats,
    /// Written by the worker itself before it runs any cycle.
    worker_id:   Mutex<Option<ThreadId>>,
}

// ── FramePump ─────────────────────────────────────────────────────────────────

pub struct FramePump {
    shared: Arc<Shared>,
    /// Worker handle. Held across start/stop so they serialize.
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl FramePump {
    pub fn new(
        source: Arc<dyn CaptureSource>,
        dispatcher: RenderDispatcher,
        config: PumpConfig,
    ) -> Result<Self, CamlinkError> {
        let policy = PacingPolicy::new(&config.pacing)?;
        let thread_name = config.worker.thread_name(source.name());
        Ok(Self {
            shared: Arc::new(Shared {
                source,
                dispatcher,
                policy,
                dedup: config.dedup,
                worker: config.worker,
                thread_name,
                state: AtomicPumpState::new(PumpState::Idle),
                control: Control::new(),
                error: ErrorFlag::new(),
                paused: AtomicBool::new(false),
                stats: PumpStats::new(),
                worker_id: Mutex::new(None),
            }),
            handle: Mutex::new(None),
        })
    }

    fn lock_handle(&self) -> MutexGuard<'_, Option<JoinHandle<()>>> {
        self.handle.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn on_worker_thread(&self) -> bool {
        let id = *self.shared.worker_id.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        id == Some(thread::current().id())
    }

    /// Spawn the worker. Returns `Ok(false)` if a worker is already active.
    /// Never blocks on the device.
    pub fn start(&self) -> Result<bool, CamlinkError> {
        let mut handle = self.lock_handle();

        let from = self.shared.state.load();
        if !matches!(from, PumpState::Idle | PumpState::Stopped)
            || !self.shared.state.transition(from, PumpState::Starting)
        {
            debug!("[{}] start ignored, pump is {}", self.shared.source.name(), from);
            return Ok(false);
        }

        // A worker that died on its own leaves its handle behind.
        if let Some(old) = handle.take() {
            let _ = old.join();
        }
        self.shared.control.reset_stop();

        let shared = Arc::clone(&self.shared);
        let spawned = thread::Builder::new()
            .name(self.shared.thread_name.clone())
            .spawn(move || run_worker(shared));
        let worker = match spawned {
            Ok(worker) => worker,
            Err(e) => {
                self.shared.state.store(from);
                return Err(CamlinkError::Io(e));
            }
        };

        *handle = Some(worker);
        info!("[{}] pump started ({})", self.shared.source.name(), self.shared.thread_name);
        Ok(true)
    }

    /// Stop the worker and wait for it to exit. Returns `true` for the call
    /// that performed the teardown, `false` if the pump was not active.
    ///
    /// Called from the worker thread itself, this only signals the loop to
    /// exit after the current cycle.
    pub fn stop(&self) -> bool {
        if self.on_worker_thread() {
            if !self.begin_stopping() {
                return false;
            }
            self.shared.control.request_stop();
            debug!("[{}] stop requested from worker thread", self.shared.source.name());
            return true;
        }

        let mut handle = self.lock_handle();
        if !self.begin_stopping() {
            return false;
        }
        self.shared.control.request_stop();

        if let Some(worker) = handle.take() {
            if worker.join().is_err() {
                warn!("[{}] pump worker exited abnormally", self.shared.source.name());
            }
        }
        self.shared.state.store(PumpState::Stopped);
        info!("[{}] pump stopped", self.shared.source.name());
        true
    }

    fn begin_stopping(&self) -> bool {
        loop {
            let current = self.shared.state.load();
            if !current.is_active() {
                return false;
            }
            if self.shared.state.transition(current, PumpState::Stopping) {
                return true;
            }
        }
    }

    /// Hold the next worker in `Starting` until [`FramePump::release_open_gate`].
    /// Call before [`FramePump::start`].
    pub fn arm_open_gate(&self) {
        self.shared.control.arm_gate();
    }

    /// Report the device open outcome to a worker waiting in `Starting`.
    pub fn release_open_gate(&self, opened: bool) {
        self.shared.control.release_gate(opened);
    }

    pub fn state(&self) -> PumpState {
        self.shared.state.load()
    }

    pub fn is_running(&self) -> bool {
        self.state() == PumpState::Running
    }

    pub fn has_error(&self) -> bool {
        self.shared.error.is_set()
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.shared.stats.snapshot()
    }

    /// While paused the loop keeps its pacing but neither fetches nor renders.
    pub fn set_paused(&self, paused: bool) {
        self.shared.paused.store(paused, Ordering::SeqCst);
        debug!("[{}] paused = {}", self.shared.source.name(), paused);
    }

    pub fn is_paused(&self) -> bool {
        self.shared.paused.load(Ordering::SeqCst)
    }

    /// Register a callback run on the render context after each frame lands.
    pub fn on_frame_rendered(&self, observer: impl Fn(Option<&Frame>) + Send + Sync + 'static) {
        self.shared.dispatcher.add_observer(Arc::new(observer));
    }

    pub fn source(&self) -> &Arc<dyn CaptureSource> {
        &self.shared.source
    }
}

impl Drop for FramePump {
    fn drop(&mut self) {
        self.stop();
    }
}

// ── Worker ────────────────────────────────────────────────────────────────────

fn run_worker(shared: Arc<Shared>) {
    *shared.worker_id.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) =
        Some(thread::current().id());
    match panic::catch_unwind(AssertUnwindSafe(|| shared.run())) {
        Ok(()) => {
            shared.state.transition(PumpState::Stopping, PumpState::Stopped);
        }
        Err(payload) => {
            shared.error.set();
            let err = UncaughtError::from_panic(&shared.thread_name, payload.as_ref());
            (shared.worker.uncaught_handler)(&err);
            shared.state.store(PumpState::Stopped);
        }
    }
}

impl Shared {
    fn run(&self) {
        let name = self.source.name();
        match self.control.wait_for_gate() {
            GateWait::Open => {}
            GateWait::Stopped => return,
            GateWait::Failed => {
                debug!("[{}] device failed to open, worker idle until stop", name);
                self.error.set();
                self.control.wait_for_stop();
                return;
            }
        }
        if !self.state.transition(PumpState::Starting, PumpState::Running) {
            return;
        }
        info!(
            "[{}] pump running ({}, dedup {:?})",
            name,
            if self.policy.is_fixed_rate() {
                format!("fixed rate, {:?} period", self.policy.next_delay())
            } else {
                "unlimited".to_string()
            },
            self.dedup
        );

        let mut buffer = FrameBuffer::new(self.dedup);
        let mut schedule = self.policy.schedule(Instant::now());
        let mut deadline = schedule.first_deadline();

        loop {
            if self.control.sleep_until(deadline) {
                break;
            }
            if !self.source.is_open() {
                debug!("[{}] device not open, re-checking in {:?}", name, DEVICE_RETRY_DELAY);
                if self.control.sleep_for(DEVICE_RETRY_DELAY) {
                    break;
                }
                let now = Instant::now();
                schedule.rebase(now);
                deadline = now;
                continue;
            }
            if !self.paused.load(Ordering::SeqCst) {
                let cycle = panic::catch_unwind(AssertUnwindSafe(|| self.cycle(&mut buffer)));
                if let Err(payload) = cycle {
                    self.error.set();
                    self.stats.record_error();
                    let err = UncaughtError::from_panic(&self.thread_name, payload.as_ref());
                    (self.worker.uncaught_handler)(&err);
                }
            }
            deadline = schedule.next_deadline(Instant::now());
        }
        debug!("[{}] pump worker exiting", name);
    }

    /// One fetch, dedup, dispatch.
    fn cycle(&self, buffer: &mut FrameBuffer) {
        self.stats.record_fetch();
        let frame = match self.source.fetch_latest_frame() {
            Ok(Some(frame)) => frame,
            Ok(None) => return,
            Err(e) => {
                self.report(CamlinkError::Fetch(e));
                return;
            }
        };
        self.error.clear();

        let Some(snapshot) = buffer.replace_if_changed(frame) else {
            self.stats.record_duplicate();
            return;
        };
        let id = snapshot.id();
        match self.dispatcher.dispatch(Some(snapshot)) {
            Ok(seq) => {
                self.stats.record_render();
                trace!("[{}] dispatched frame {} as render #{}", self.source.name(), id, seq);
            }
            Err(CamlinkError::RejectedAfterStop) => {
                trace!("[{}] render context gone, frame {} dropped", self.source.name(), id);
            }
            Err(e) => self.report(e),
        }
    }

    fn report(&self, err: CamlinkError) {
        self.error.set();
        let count = self.stats.record_error();
        if count <= 20 || count % 120 == 0 {
            warn!("[{}] cycle error #{}: {}", self.source.name(), count, err);
        }
    }
}
