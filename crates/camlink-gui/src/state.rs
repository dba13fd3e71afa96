use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Instant;

use camlink_pump::DeviceState;

/// Status dot colour for a device state.
pub fn device_color(state: DeviceState) -> egui::Color32 {
    match state {
        DeviceState::Closed  => egui::Color32::from_rgb(160, 160, 160),
        DeviceState::Opening => egui::Color32::from_rgb(230, 185, 50),
        DeviceState::Open    => egui::Color32::from_rgb(60, 200, 80),
        DeviceState::Closing => egui::Color32::from_rgb(50, 180, 230),
        DeviceState::Errored => egui::Color32::from_rgb(220, 60, 60),
    }
}

// ── ViewerState ───────────────────────────────────────────────────────────────

/// Viewer-side counters. Written by the render observer and the open thread,
/// read by the status bar.
#[derive(Default)]
pub struct ViewerState {
    pub fps:          f64,
    pub frames_shown: u64,
    /// Error reported by `open_and_start`, shown instead of the feed.
    pub open_error:   Option<String>,
    // Rolling-window helper (private)
    last_frame_times: VecDeque<Instant>,
}

impl ViewerState {
    /// Call once per frame handed to the texture.
    pub fn tick_frame(&mut self) {
        self.tick_frame_at(Instant::now());
    }

    fn tick_frame_at(&mut self, now: Instant) {
        self.frames_shown += 1;
        self.last_frame_times.push_back(now);

        // Evict entries older than 1 second
        while self
            .last_frame_times
            .front()
            .map_or(false, |t| now.duration_since(*t).as_secs_f64() > 1.0)
        {
            self.last_frame_times.pop_front();
        }
        self.fps = self.last_frame_times.len() as f64;
    }
}

/// Shared handle passed between the UI thread and the open thread.
pub type SharedState = Arc<Mutex<ViewerState>>;
