//! Synthetic capture device: scrolling colour bars with a bouncing marker.
//!
//! The device "produces" a new image every `1 / native_fps` seconds of
//! wall-clock time since open. Between two productions `fetch_latest_frame`
//! keeps handing back the same [`Frame`], like a real driver that has not
//! received a new buffer yet.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use camlink_core::{DeviceError, Frame, PixelFormat, Resolution};
use tracing::debug;

use crate::events::{CaptureEvent, CaptureListener, ListenerRegistry};
use crate::{CaptureDriver, CaptureSource, DeviceInfo};

const BARS: [[u8; 3]; 7] = [
    [192, 192, 192],
    [192, 192, 0],
    [0, 192, 192],
    [0, 192, 0],
    [192, 0, 192],
    [192, 0, 0],
    [0, 0, 192],
];

// ── TestPatternDriver ─────────────────────────────────────────────────────────

/// Driver exposing `device_count` synthetic cameras.
pub struct TestPatternDriver {
    device_count: usize,
    native_fps:   u32,
    open_delay:   Duration,
}

impl TestPatternDriver {
    pub fn new(device_count: usize) -> Self {
        Self { device_count, native_fps: 30, open_delay: Duration::from_millis(200) }
    }

    pub fn with_native_fps(mut self, fps: u32) -> Self {
        self.native_fps = fps.max(1);
        self
    }

    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }
}

impl Default for TestPatternDriver {
    fn default() -> Self {
        Self::new(2)
    }
}

impl CaptureDriver for TestPatternDriver {
    fn name(&self) -> &str {
        "test-pattern"
    }

    fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        Ok((0..self.device_count)
            .map(|index| DeviceInfo {
                index,
                name: format!("Test Pattern {index}"),
                path: None,
            })
            .collect())
    }

    fn create_source(
        &self,
        device: &DeviceInfo,
        view_size: Resolution,
    ) -> Result<Arc<dyn CaptureSource>, DeviceError> {
        Ok(Arc::new(
            TestPatternSource::new(device.name.clone(), view_size)
                .with_native_fps(self.native_fps)
                .with_open_delay(self.open_delay),
        ))
    }
}

// ── TestPatternSource ─────────────────────────────────────────────────────────

pub struct TestPatternSource {
    name:       String,
    size:       Resolution,
    period:     Duration,
    open_delay: Duration,
    open:       AtomicBool,
    state:      Mutex<PatternState>,
    listeners:  ListenerRegistry,
}

#[derive(Default)]
struct PatternState {
    opened_at: Option<Instant>,
    /// Last produced image and its sequence number.
    latest:    Option<(u64, Frame)>,
}

impl TestPatternSource {
    pub fn new(name: impl Into<String>, size: Resolution) -> Self {
        Self {
            name:       name.into(),
            size,
            period:     Duration::from_secs(1) / 30,
            open_delay: Duration::ZERO,
            open:       AtomicBool::new(false),
            state:      Mutex::new(PatternState::default()),
            listeners:  ListenerRegistry::new(),
        }
    }

    pub fn with_native_fps(mut self, fps: u32) -> Self {
        self.period = Duration::from_secs(1) / fps.max(1);
        self
    }

    /// Simulated time `open()` spends negotiating with the device.
    pub fn with_open_delay(mut self, delay: Duration) -> Self {
        self.open_delay = delay;
        self
    }

    fn state(&self) -> std::sync::MutexGuard<'_, PatternState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn render(&self, seq: u64) -> Frame {
        let (w, h) = (self.size.width as usize, self.size.height as usize);
        let mut data = vec![0u8; w * h * 4];
        let bar_width = (w / BARS.len()).max(1);
        let shift = seq as usize;

        let marker = 16.min(w).min(h).max(1);
        let mx = (seq as usize * 3) % (w.saturating_sub(marker) + 1);
        let my = (seq as usize * 2) % (h.saturating_sub(marker) + 1);

        for y in 0..h {
            for x in 0..w {
                let inside = x >= mx && x < mx + marker && y >= my && y < my + marker;
                let rgb = if inside {
                    [255, 255, 255]
                } else {
                    BARS[((x + shift) / bar_width) % BARS.len()]
                };
                let o = (y * w + x) * 4;
                data[o..o + 3].copy_from_slice(&rgb);
                data[o + 3] = 255;
            }
        }

        // Length always matches width * height * 4.
        Frame::new(self.size.width, self.size.height, PixelFormat::Rgba, data)
            .unwrap_or_else(|_| Frame::solid(self.size, camlink_core::Rgba::BLACK))
    }
}

impl CaptureSource for TestPatternSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> Result<bool, DeviceError> {
        if self.is_open() {
            return Ok(true);
        }
        if !self.open_delay.is_zero() {
            std::thread::sleep(self.open_delay);
        }
        {
            let mut state = self.state();
            state.opened_at = Some(Instant::now());
            state.latest = None;
        }
        self.open.store(true, Ordering::SeqCst);
        debug!("[{}] test pattern streaming at {}", self.name, self.size);
        self.listeners.emit(&self.name, CaptureEvent::Opened);
        Ok(true)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        if self.open.swap(false, Ordering::SeqCst) {
            *self.state() = PatternState::default();
            self.listeners.emit(&self.name, CaptureEvent::Closed);
        }
    }

    fn fetch_latest_frame(&self) -> Result<Option<Frame>, DeviceError> {
        if !self.is_open() {
            return Err(DeviceError::NotOpen { device: self.name.clone() });
        }
        let mut state = self.state();
        let Some(opened_at) = state.opened_at else {
            return Err(DeviceError::NotOpen { device: self.name.clone() });
        };
        let seq = (opened_at.elapsed().as_nanos() / self.period.as_nanos().max(1)) as u64;

        if let Some((latest_seq, frame)) = &state.latest {
            if *latest_seq == seq {
                return Ok(Some(frame.clone()));
            }
        }

        let frame = self.render(seq);
        state.latest = Some((seq, frame.clone()));
        drop(state);
        self.listeners.emit(&self.name, CaptureEvent::ImageObtained);
        Ok(Some(frame))
    }

    fn add_listener(&self, listener: Arc<dyn CaptureListener>) {
        self.listeners.add(listener);
    }
}

impl Drop for TestPatternSource {
    fn drop(&mut self) {
        self.close();
        self.listeners.emit(&self.name, CaptureEvent::Disposed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fetch_before_open_is_not_open_error() {
        let source = TestPatternSource::new("cam", Resolution::new(8, 8));
        assert!(matches!(
            source.fetch_latest_frame(),
            Err(DeviceError::NotOpen { .. })
        ));
    }

    #[test]
    fn returns_same_frame_until_next_production() {
        let source = TestPatternSource::new("cam", Resolution::new(8, 8)).with_native_fps(1);
        assert!(source.open().unwrap());

        let a = source.fetch_latest_frame().unwrap().unwrap();
        let b = source.fetch_latest_frame().unwrap().unwrap();
        assert!(a.same_instance(&b));
        assert_eq!(a.resolution(), Resolution::new(8, 8));
    }

    #[test]
    fn produces_new_frames_over_time() {
        let source = TestPatternSource::new("cam", Resolution::new(8, 8)).with_native_fps(100);
        source.open().unwrap();

        let a = source.fetch_latest_frame().unwrap().unwrap();
        std::thread::sleep(Duration::from_millis(30));
        let b = source.fetch_latest_frame().unwrap().unwrap();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn lifecycle_events_reach_listeners() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        {
            let source = TestPatternSource::new("cam", Resolution::new(4, 4));
            let sink = Arc::clone(&seen);
            source.add_listener(Arc::new(move |_: &str, event: CaptureEvent| {
                if event != CaptureEvent::ImageObtained {
                    sink.lock().unwrap().push(event);
                }
            }));
            source.open().unwrap();
            source.fetch_latest_frame().unwrap();
            source.close();
            source.close();
        }
        assert_eq!(
            *seen.lock().unwrap(),
            vec![CaptureEvent::Opened, CaptureEvent::Closed, CaptureEvent::Disposed]
        );
    }

    #[test]
    fn driver_enumerates_configured_devices() {
        let driver = TestPatternDriver::new(3);
        let devices = driver.enumerate().unwrap();
        assert_eq!(devices.len(), 3);
        assert_eq!(devices[2].name, "Test Pattern 2");
    }
}
