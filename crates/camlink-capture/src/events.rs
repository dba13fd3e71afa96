//! Device lifecycle events.
//!
//! Events carry no frame payload. Consumers that need "a new frame was shown"
//! notifications subscribe to the frame pump's render observers instead.

use std::sync::{Arc, Mutex};

use tracing::{info, trace};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureEvent {
    Opened,
    Closed,
    Disposed,
    /// The device produced a new image. Fired from the device's own thread.
    ImageObtained,
}

pub trait CaptureListener: Send + Sync {
    fn on_event(&self, device: &str, event: CaptureEvent);
}

impl<F> CaptureListener for F
where
    F: Fn(&str, CaptureEvent) + Send + Sync,
{
    fn on_event(&self, device: &str, event: CaptureEvent) {
        self(device, event)
    }
}

// ── ListenerRegistry ──────────────────────────────────────────────────────────

/// Listener list embedded by capture sources.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Mutex<Vec<Arc<dyn CaptureListener>>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn CaptureListener>) {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(listener);
    }

    /// Deliver `event` to every listener. The list is cloned first so a
    /// listener may register further listeners without deadlocking.
    pub fn emit(&self, device: &str, event: CaptureEvent) {
        let listeners = self
            .listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone();
        for listener in listeners {
            listener.on_event(device, event);
        }
    }

    pub fn len(&self) -> usize {
        self.listeners
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ── LoggingListener ───────────────────────────────────────────────────────────

/// Routes device events to the log and nowhere else.
pub struct LoggingListener;

impl CaptureListener for LoggingListener {
    fn on_event(&self, device: &str, event: CaptureEvent) {
        match event {
            CaptureEvent::Opened        => info!("[{}] webcam open", device),
            CaptureEvent::Closed        => info!("[{}] webcam closed", device),
            CaptureEvent::Disposed      => info!("[{}] webcam disposed", device),
            CaptureEvent::ImageObtained => trace!("[{}] image obtained", device),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn delivers_to_every_listener_in_order() {
        let registry = ListenerRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b"] {
            let seen = Arc::clone(&seen);
            registry.add(Arc::new(move |device: &str, event: CaptureEvent| {
                seen.lock().unwrap().push(format!("{tag}:{device}:{event:?}"));
            }));
        }
        registry.emit("cam0", CaptureEvent::Opened);

        assert_eq!(
            *seen.lock().unwrap(),
            vec!["a:cam0:Opened".to_string(), "b:cam0:Opened".to_string()]
        );
    }

    #[test]
    fn listener_may_register_during_emit() {
        let registry = Arc::new(ListenerRegistry::new());
        let calls = Arc::new(AtomicUsize::new(0));

        let inner_registry = Arc::clone(&registry);
        let inner_calls = Arc::clone(&calls);
        registry.add(Arc::new(move |_: &str, _: CaptureEvent| {
            inner_calls.fetch_add(1, Ordering::SeqCst);
            inner_registry.add(Arc::new(LoggingListener));
        }));

        registry.emit("cam0", CaptureEvent::Closed);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(registry.len(), 2);
    }
}
