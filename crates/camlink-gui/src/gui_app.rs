use std::sync::Arc;

use camlink_pump::{DeviceState, LifecycleController};
use camlink_renderer::RenderQueue;
use egui::{Align, Color32, FontFamily, FontId, Frame, Layout, RichText, Stroke, Vec2};

use crate::state::{device_color, SharedState};
use crate::texture::TextureSink;

// ── Colours ───────────────────────────────────────────────────────────────────

const BG_PANEL:  Color32 = Color32::from_rgb(28,  30,  36);
const BG_INSET:  Color32 = Color32::from_rgb(20,  22,  28);
const BG_CARD:   Color32 = Color32::from_rgb(36,  38,  46);
const TEXT_DIM:  Color32 = Color32::from_rgb(130, 135, 148);
const TEXT_NORM: Color32 = Color32::from_rgb(210, 215, 230);
const ERROR:     Color32 = Color32::from_rgb(220, 60, 60);

// ── App struct ────────────────────────────────────────────────────────────────

pub struct CamlinkApp {
    controller: Arc<LifecycleController>,
    queue:      RenderQueue,
    sink:       TextureSink,
    state:      SharedState,
}

impl CamlinkApp {
    pub fn new(
        cc: &eframe::CreationContext<'_>,
        controller: Arc<LifecycleController>,
        queue: RenderQueue,
        state: SharedState,
    ) -> Self {
        let mut visuals = egui::Visuals::dark();
        visuals.window_fill      = BG_PANEL;
        visuals.panel_fill       = BG_PANEL;
        visuals.extreme_bg_color = BG_INSET;
        visuals.faint_bg_color   = BG_CARD;
        visuals.widgets.inactive.bg_fill = BG_CARD;
        cc.egui_ctx.set_visuals(visuals);

        Self {
            controller,
            queue,
            sink: TextureSink::new(cc.egui_ctx.clone()),
            state,
        }
    }
}

/// Everything the status bar shows, copied out once per frame.
struct StatusSnapshot {
    device:     DeviceState,
    pump:       String,
    has_error:  bool,
    paused:     bool,
    fps:        f64,
    shown:      u64,
    fetches:    u64,
    duplicates: u64,
    errors:     u64,
    open_error: Option<String>,
}

// ── eframe::App implementation ────────────────────────────────────────────────

impl eframe::App for CamlinkApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        // Apply every frame the pump dispatched since the last repaint.
        self.queue.drain(&mut self.sink);

        let pump = self.controller.pump();
        let stats = pump.stats();
        let snap = {
            let s = self.state.lock().unwrap_or_else(|p| p.into_inner());
            StatusSnapshot {
                device:     self.controller.state(),
                pump:       pump.state().to_string(),
                has_error:  pump.has_error(),
                paused:     pump.is_paused(),
                fps:        s.fps,
                shown:      s.frames_shown,
                fetches:    stats.fetches,
                duplicates: stats.duplicates,
                errors:     stats.errors,
                open_error: s.open_error.clone(),
            }
        };

        egui::TopBottomPanel::bottom("status")
            .frame(Frame::none().fill(BG_CARD).inner_margin(6.0))
            .show(ctx, |ui| {
                if let Some(paused) = render_status_bar(ui, &snap) {
                    pump.set_paused(paused);
                }
            });

        egui::CentralPanel::default()
            .frame(Frame::none().fill(BG_INSET))
            .show(ctx, |ui| {
                ui.centered_and_justified(|ui| match (self.sink.texture(), &snap.open_error) {
                    (_, Some(err)) => {
                        ui.label(RichText::new(format!("Camera unavailable: {err}")).color(ERROR));
                    }
                    (Some(texture), None) => {
                        ui.add(egui::Image::new(texture).shrink_to_fit());
                    }
                    (None, None) => {
                        ui.label(RichText::new("Waiting for camera…").color(TEXT_DIM));
                    }
                });
            });
    }

    fn on_exit(&mut self, _gl: Option<&eframe::glow::Context>) {
        self.controller.close_and_stop();
        self.queue.close();
    }
}

// ── Rendering helpers ─────────────────────────────────────────────────────────

/// Returns the new paused value when the Pause/Resume button was clicked.
fn render_status_bar(ui: &mut egui::Ui, snap: &StatusSnapshot) -> Option<bool> {
    let mut toggled = None;
    ui.horizontal(|ui| {
        let (rect, _) = ui.allocate_exact_size(Vec2::splat(12.0), egui::Sense::hover());
        ui.painter()
            .circle_filled(rect.center(), 5.0, device_color(snap.device));

        ui.label(RichText::new(format!("device {}", snap.device)).strong().color(TEXT_NORM));
        ui.label(RichText::new(format!("pump {}", snap.pump)).color(TEXT_DIM));
        if snap.has_error {
            ui.label(RichText::new("⚠ capture error").color(ERROR));
        }

        ui.with_layout(Layout::right_to_left(Align::Center), |ui| {
            let label = if snap.paused { "Resume" } else { "Pause" };
            if ui
                .add(egui::Button::new(label).stroke(Stroke::new(1.0, TEXT_DIM)))
                .clicked()
            {
                toggled = Some(!snap.paused);
            }
            ui.label(
                RichText::new(format!(
                    "{:.0} fps · {} shown · {} fetched · {} dup · {} err",
                    snap.fps, snap.shown, snap.fetches, snap.duplicates, snap.errors
                ))
                .font(FontId::new(11.5, FontFamily::Monospace))
                .color(TEXT_DIM),
            );
        });
    });
    toggled
}
