mod gui_app;
mod state;
mod texture;

use std::sync::{Arc, Mutex};

use anyhow::Context as _;
use camlink_capture::{open_source, CaptureDriver, TestPatternDriver};
use camlink_core::{SourceKind, ViewerConfig};
use camlink_pump::{FramePump, LifecycleController, PumpConfig};
use camlink_renderer::render_channel;
use tracing::{error, info};

use state::{SharedState, ViewerState};

fn build_driver(kind: SourceKind) -> anyhow::Result<Box<dyn CaptureDriver>> {
    match kind {
        SourceKind::TestPattern => Ok(Box::new(TestPatternDriver::default())),
        #[cfg(feature = "v4l2")]
        SourceKind::V4l2 => Ok(Box::new(camlink_capture::V4l2Driver::new()?)),
        #[cfg(not(feature = "v4l2"))]
        SourceKind::V4l2 => anyhow::bail!("camlink-viewer was built without the `v4l2` feature"),
    }
}

fn main() -> anyhow::Result<()> {
    // ── Logging ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .compact()
        .init();

    // ── Config + device ───────────────────────────────────────────────────
    let config = ViewerConfig::load().context("loading viewer config")?;
    info!("Config: {:?}", config);

    let driver = build_driver(config.source)?;
    let source = open_source(driver.as_ref(), config.device_index, config.view_size)
        .context("selecting capture device")?;

    let shared_state: SharedState = Arc::new(Mutex::new(ViewerState::default()));

    // ── Window options ────────────────────────────────────────────────────
    let size = config.window_size;
    let window_options = eframe::NativeOptions {
        viewport: egui::ViewportBuilder::default()
            .with_title(&config.window_title)
            .with_inner_size([size.width as f32, size.height as f32])
            .with_resizable(true),
        ..Default::default()
    };

    let title = config.window_title.clone();
    eframe::run_native(
        &title,
        window_options,
        Box::new(move |cc| {
            // The pump wakes the UI after every dispatch; the UI drains on repaint.
            let ctx = cc.egui_ctx.clone();
            let (dispatcher, queue) = render_channel(move || ctx.request_repaint());

            let pump = FramePump::new(source, dispatcher, PumpConfig::from(&config))?;
            let state_ui = Arc::clone(&shared_state);
            pump.on_frame_rendered(move |frame| {
                if frame.is_some() {
                    state_ui.lock().unwrap_or_else(|p| p.into_inner()).tick_frame();
                }
            });
            let controller = Arc::new(LifecycleController::new(pump));

            // Opening may block for a while; keep it off the UI thread.
            let opener   = Arc::clone(&controller);
            let state_bg = Arc::clone(&shared_state);
            let ctx_bg   = cc.egui_ctx.clone();
            std::thread::Builder::new()
                .name("camlink-open".into())
                .spawn(move || {
                    if let Err(e) = opener.open_and_start() {
                        error!("Failed to start camera: {}", e);
                        state_bg.lock().unwrap_or_else(|p| p.into_inner()).open_error =
                            Some(e.to_string());
                    }
                    ctx_bg.request_repaint();
                })?;

            Ok(Box::new(gui_app::CamlinkApp::new(cc, controller, queue, shared_state)))
        }),
    )
    .map_err(|e| anyhow::anyhow!("eframe: {e}"))
}
