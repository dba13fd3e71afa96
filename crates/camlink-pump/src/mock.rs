//! Counting fake capture source for pump and lifecycle tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use camlink_capture::{CaptureEvent, CaptureListener, CaptureSource, ListenerRegistry};
use camlink_core::{DeviceError, Frame, Resolution, Rgba};

/// What `fetch_latest_frame` hands back.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    /// A new frame every call.
    Fresh,
    /// The same frame instance every call.
    Same,
    /// No frame yet.
    Empty,
    Fail,
    Panic,
    /// The device dies mid-fetch: it closes itself and reports the loss.
    Disconnect,
}

pub struct MockSource {
    name:          String,
    open:          AtomicBool,
    open_result:   Mutex<Result<bool, DeviceError>>,
    open_delay:    Mutex<Duration>,
    mode:          Mutex<FetchMode>,
    fetch_delay:   Mutex<Duration>,
    slow_every:    Mutex<Option<(usize, Duration)>>,
    same_frame:    Frame,
    fetches:       AtomicUsize,
    fetch_times:   Mutex<Vec<Instant>>,
    fetch_thread:  Mutex<Option<String>>,
    in_flight:     AtomicUsize,
    max_in_flight: AtomicUsize,
    open_calls:    AtomicUsize,
    close_calls:   AtomicUsize,
    listeners:     ListenerRegistry,
}

impl MockSource {
    pub fn new(mode: FetchMode) -> Arc<Self> {
        Arc::new(Self {
            name:          "mock".to_string(),
            open:          AtomicBool::new(false),
            open_result:   Mutex::new(Ok(true)),
            open_delay:    Mutex::new(Duration::ZERO),
            mode:          Mutex::new(mode),
            fetch_delay:   Mutex::new(Duration::ZERO),
            slow_every:    Mutex::new(None),
            same_frame:    Frame::solid(Resolution::new(4, 4), Rgba::BLACK),
            fetches:       AtomicUsize::new(0),
            fetch_times:   Mutex::new(Vec::new()),
            fetch_thread:  Mutex::new(None),
            in_flight:     AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            open_calls:    AtomicUsize::new(0),
            close_calls:   AtomicUsize::new(0),
            listeners:     ListenerRegistry::new(),
        })
    }

    /// A source that is already open.
    pub fn opened(mode: FetchMode) -> Arc<Self> {
        let source = Self::new(mode);
        source.set_open(true);
        source
    }

    pub fn as_source(self: &Arc<Self>) -> Arc<dyn CaptureSource> {
        Arc::clone(self) as Arc<dyn CaptureSource>
    }

    pub fn set_open(&self, open: bool) {
        self.open.store(open, Ordering::SeqCst);
    }

    pub fn set_mode(&self, mode: FetchMode) {
        *self.mode.lock().unwrap() = mode;
    }

    pub fn set_open_result(&self, result: Result<bool, DeviceError>) {
        *self.open_result.lock().unwrap() = result;
    }

    pub fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.lock().unwrap() = delay;
    }

    pub fn set_fetch_delay(&self, delay: Duration) {
        *self.fetch_delay.lock().unwrap() = delay;
    }

    /// Every `n`th fetch takes `delay`.
    pub fn set_slow_every(&self, n: usize, delay: Duration) {
        *self.slow_every.lock().unwrap() = Some((n, delay));
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn fetch_times(&self) -> Vec<Instant> {
        self.fetch_times.lock().unwrap().clone()
    }

    /// Name of the thread that performed the last fetch.
    pub fn fetch_thread(&self) -> Option<String> {
        self.fetch_thread.lock().unwrap().clone()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn open_calls(&self) -> usize {
        self.open_calls.load(Ordering::SeqCst)
    }

    pub fn close_calls(&self) -> usize {
        self.close_calls.load(Ordering::SeqCst)
    }
}

impl CaptureSource for MockSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> Result<bool, DeviceError> {
        self.open_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.open_delay.lock().unwrap();
        thread::sleep(delay);
        let result = self.open_result.lock().unwrap().clone();
        if let Ok(true) = result {
            self.set_open(true);
            self.listeners.emit(&self.name, CaptureEvent::Opened);
        }
        result
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.set_open(false);
        self.listeners.emit(&self.name, CaptureEvent::Closed);
    }

    fn fetch_latest_frame(&self) -> Result<Option<Frame>, DeviceError> {
        let concurrent = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(concurrent, Ordering::SeqCst);
        let n = self.fetches.fetch_add(1, Ordering::SeqCst) + 1;
        self.fetch_times.lock().unwrap().push(Instant::now());
        *self.fetch_thread.lock().unwrap() = thread::current().name().map(str::to_string);

        let mut delay = *self.fetch_delay.lock().unwrap();
        if let Some((every, slow)) = *self.slow_every.lock().unwrap() {
            if n % every == 0 {
                delay = slow;
            }
        }
        thread::sleep(delay);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let mode = *self.mode.lock().unwrap();
        match mode {
            FetchMode::Fresh => Ok(Some(Frame::solid(Resolution::new(4, 4), Rgba::BLACK))),
            FetchMode::Same => Ok(Some(self.same_frame.clone())),
            FetchMode::Empty => Ok(None),
            FetchMode::Fail => Err(DeviceError::FetchFailed { reason: "mock failure".into() }),
            FetchMode::Panic => panic!("mock fetch panicked"),
            FetchMode::Disconnect => {
                if self.open.swap(false, Ordering::SeqCst) {
                    self.listeners.emit(&self.name, CaptureEvent::Closed);
                }
                Err(DeviceError::Disconnected)
            }
        }
    }

    fn add_listener(&self, listener: Arc<dyn CaptureListener>) {
        self.listeners.add(listener);
    }
}
