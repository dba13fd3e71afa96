use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use camlink_core::{CamlinkError, Frame};
use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{trace, warn};

use crate::RenderSink;

/// Render tasks the UI may fall behind by before dispatches start failing.
pub const RENDER_QUEUE_DEPTH: usize = 8;

/// Called on the UI context after a task has been handed to the sink.
pub type RenderObserver = Arc<dyn Fn(Option<&Frame>) + Send + Sync>;

type Observers = Arc<Mutex<Vec<RenderObserver>>>;

/// One "show this frame" request. Carries its own snapshot of the frame, so
/// the UI side never reads the pump's buffer.
#[derive(Debug, Clone)]
pub struct RenderTask {
    pub seq:           u64,
    pub frame:         Option<Frame>,
    pub dispatched_at: Instant,
}

/// Create a connected dispatcher / queue pair.
///
/// `wake` is invoked after every successful dispatch so the UI event loop
/// knows to drain (e.g. `egui::Context::request_repaint`). It must not block.
pub fn render_channel(
    wake: impl Fn() + Send + Sync + 'static,
) -> (RenderDispatcher, RenderQueue) {
    let (tx, rx) = mpsc::channel::<RenderTask>(RENDER_QUEUE_DEPTH);
    let observers: Observers = Arc::new(Mutex::new(Vec::new()));
    let dispatcher = RenderDispatcher {
        tx,
        wake: Arc::new(wake),
        observers: Arc::clone(&observers),
        next_seq: Arc::new(AtomicU64::new(0)),
    };
    let queue = RenderQueue { rx, observers };
    (dispatcher, queue)
}

// ── RenderDispatcher ──────────────────────────────────────────────────────────

/// Worker-side handle. Dispatching never blocks on the UI context.
#[derive(Clone)]
pub struct RenderDispatcher {
    tx:        mpsc::Sender<RenderTask>,
    wake:      Arc<dyn Fn() + Send + Sync>,
    observers: Observers,
    next_seq:  Arc<AtomicU64>,
}

impl RenderDispatcher {
    /// Queue `frame` for the UI context.
    ///
    /// Fails with [`CamlinkError::Dispatch`] while [`RENDER_QUEUE_DEPTH`]
    /// tasks are still waiting to be drained, and with
    /// [`CamlinkError::RejectedAfterStop`] once the queue has been closed or
    /// dropped. A rejected frame is not retried.
    pub fn dispatch(&self, frame: Option<Frame>) -> Result<u64, CamlinkError> {
        let seq = self.next_seq.fetch_add(1, Ordering::Relaxed);
        let task = RenderTask { seq, frame, dispatched_at: Instant::now() };
        match self.tx.try_send(task) {
            Ok(()) => {}
            Err(TrySendError::Full(task)) => {
                return Err(CamlinkError::Dispatch {
                    reason: format!("render queue full, frame #{} dropped", task.seq),
                });
            }
            Err(TrySendError::Closed(_)) => return Err(CamlinkError::RejectedAfterStop),
        }
        (self.wake)();
        Ok(seq)
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Register a post-render observer.
    pub fn add_observer(&self, observer: RenderObserver) {
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(observer);
    }
}

// ── RenderQueue ───────────────────────────────────────────────────────────────

/// UI-side end of the channel. Not `Clone`: exactly one context consumes it.
pub struct RenderQueue {
    rx:        mpsc::Receiver<RenderTask>,
    observers: Observers,
}

impl RenderQueue {
    /// Apply every pending task to `sink` in dispatch order. Returns the
    /// number of tasks applied.
    pub fn drain(&mut self, sink: &mut dyn RenderSink) -> usize {
        let mut applied = 0;
        while let Ok(task) = self.rx.try_recv() {
            trace!(
                "render #{} (queued {:?}, frame age {:?})",
                task.seq,
                task.dispatched_at.elapsed(),
                task.frame.as_ref().map(|f| f.captured_at().elapsed())
            );
            if let Err(e) = sink.set_current_frame(task.frame.as_ref()) {
                warn!("render #{} dropped: {}", task.seq, e);
                continue;
            }
            applied += 1;

            let observers = self
                .observers
                .lock()
                .unwrap_or_else(|poisoned| poisoned.into_inner())
                .clone();
            for observer in observers {
                observer(task.frame.as_ref());
            }
        }
        applied
    }

    /// Shut the UI side down. Pending and future dispatches are dropped.
    pub fn close(&mut self) {
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
    }
}
