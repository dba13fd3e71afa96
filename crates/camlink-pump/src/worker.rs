use std::any::Any;
use std::fmt;
use std::sync::Arc;

use tracing::error;

pub const DEFAULT_THREAD_PREFIX: &str = "repaint-scheduler";

/// A panic caught inside the pump worker.
#[derive(Debug, Clone)]
pub struct UncaughtError {
    pub thread:  String,
    pub message: String,
}

impl UncaughtError {
    pub fn from_panic(thread: &str, payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self { thread: thread.to_string(), message }
    }
}

impl fmt::Display for UncaughtError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic in thread '{}': {}", self.thread, self.message)
    }
}

pub type UncaughtHandler = Arc<dyn Fn(&UncaughtError) + Send + Sync>;

/// How the pump names its worker thread and where worker panics go.
#[derive(Clone)]
pub struct WorkerConfig {
    pub name_prefix:      String,
    pub uncaught_handler: UncaughtHandler,
}

impl WorkerConfig {
    pub fn with_handler(mut self, handler: impl Fn(&UncaughtError) + Send + Sync + 'static) -> Self {
        self.uncaught_handler = Arc::new(handler);
        self
    }

    pub fn thread_name(&self, device: &str) -> String {
        format!("{}-{}", self.name_prefix, device)
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            name_prefix:      DEFAULT_THREAD_PREFIX.to_string(),
            uncaught_handler: Arc::new(|e: &UncaughtError| error!("{}", e)),
        }
    }
}

impl fmt::Debug for WorkerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WorkerConfig")
            .field("name_prefix", &self.name_prefix)
            .finish_non_exhaustive()
    }
}
