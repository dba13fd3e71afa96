//! V4L2 camera capture through GStreamer.
//!
//! ```text
//! v4l2src device=/dev/videoN
//!   → videoconvert → videoscale
//!   → video/x-raw,format=RGBA,width=W,height=H
//!   → appsink (max-buffers=1, drop=true) ──► latest-frame slot
//! ```
//!
//! The appsink callback replaces the slot on every new sample; the frame pump
//! reads the slot. Until the next sample arrives the pump sees the same
//! [`Frame`] again, so identity dedup is meaningful for this backend.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use camlink_core::{DeviceError, Frame, PixelFormat, Resolution};
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app::{AppSink, AppSinkCallbacks};
use tracing::{debug, error, info, warn};

use crate::events::{CaptureEvent, CaptureListener, ListenerRegistry};
use crate::{CaptureDriver, CaptureSource, DeviceInfo};

fn backend_err(e: impl std::fmt::Display) -> DeviceError {
    DeviceError::Backend(e.to_string())
}

// ── V4l2Driver ────────────────────────────────────────────────────────────────

pub struct V4l2Driver;

impl V4l2Driver {
    pub fn new() -> Result<Self, DeviceError> {
        gst::init().map_err(backend_err)?;
        Ok(Self)
    }
}

impl CaptureDriver for V4l2Driver {
    fn name(&self) -> &str {
        "v4l2"
    }

    fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceError> {
        let monitor = gst::DeviceMonitor::new();
        monitor.add_filter(Some("Video/Source"), None);
        monitor.start().map_err(backend_err)?;

        let devices = monitor
            .devices()
            .into_iter()
            .enumerate()
            .map(|(index, device)| {
                let path = device.properties().and_then(|props| {
                    props
                        .get::<String>("api.v4l2.path")
                        .or_else(|_| props.get::<String>("device.path"))
                        .ok()
                });
                DeviceInfo { index, name: device.display_name().to_string(), path }
            })
            .collect::<Vec<_>>();

        monitor.stop();
        for d in &devices {
            debug!("[v4l2] #{} {} ({:?})", d.index, d.name, d.path);
        }
        Ok(devices)
    }

    fn create_source(
        &self,
        device: &DeviceInfo,
        view_size: Resolution,
    ) -> Result<Arc<dyn CaptureSource>, DeviceError> {
        let path = device
            .path
            .clone()
            .unwrap_or_else(|| format!("/dev/video{}", device.index));
        Ok(Arc::new(V4l2Source::new(device.name.clone(), path, view_size)))
    }
}

// ── V4l2Source ────────────────────────────────────────────────────────────────

pub struct V4l2Source {
    name:      String,
    path:      String,
    size:      Resolution,
    open:      AtomicBool,
    pipeline:  Mutex<Option<gst::Pipeline>>,
    latest:    Arc<Mutex<Option<Frame>>>,
    listeners: Arc<ListenerRegistry>,
}

impl V4l2Source {
    pub fn new(name: String, path: String, size: Resolution) -> Self {
        Self {
            name,
            path,
            size,
            open:      AtomicBool::new(false),
            pipeline:  Mutex::new(None),
            latest:    Arc::new(Mutex::new(None)),
            listeners: Arc::new(ListenerRegistry::new()),
        }
    }

    fn build_pipeline(&self) -> Result<gst::Pipeline, DeviceError> {
        let (w, h) = (self.size.width, self.size.height);
        let desc = format!(
            "v4l2src device={path} \
             ! videoconvert \
             ! videoscale \
             ! video/x-raw,format=RGBA,width={w},height={h} \
             ! appsink name=sink max-buffers=1 drop=true sync=false emit-signals=false",
            path = self.path,
        );
        debug!("GStreamer pipeline: {}", desc);

        let pipeline = gst::parse::launch(&desc)
            .map_err(backend_err)?
            .downcast::<gst::Pipeline>()
            .map_err(|_| DeviceError::Backend("Expected Pipeline element".into()))?;

        let appsink = pipeline
            .by_name("sink")
            .and_then(|element| element.downcast::<AppSink>().ok())
            .ok_or_else(|| DeviceError::Backend("No appsink".into()))?;

        let latest = Arc::clone(&self.latest);
        let listeners = Arc::clone(&self.listeners);
        let name = self.name.clone();
        appsink.set_callbacks(
            AppSinkCallbacks::builder()
                .new_sample(move |sink| {
                    let sample = sink.pull_sample().map_err(|_| gst::FlowError::Eos)?;
                    let caps = sample.caps().ok_or(gst::FlowError::Error)?;
                    let info = gstreamer_video::VideoInfo::from_caps(caps)
                        .map_err(|_| gst::FlowError::NotNegotiated)?;
                    let buffer = sample.buffer().ok_or(gst::FlowError::Error)?;
                    let map = buffer.map_readable().map_err(|_| gst::FlowError::Error)?;

                    let (width, height) = (info.width(), info.height());
                    let row = width as usize * 4;
                    let stride = info.stride()[0] as usize;
                    let data = if stride == row {
                        map.as_slice().to_vec()
                    } else {
                        map.as_slice()
                            .chunks(stride)
                            .take(height as usize)
                            .flat_map(|line| line[..row].iter().copied())
                            .collect()
                    };

                    match Frame::new(width, height, PixelFormat::Rgba, data) {
                        Ok(frame) => {
                            *latest.lock().unwrap_or_else(|p| p.into_inner()) = Some(frame);
                            listeners.emit(&name, CaptureEvent::ImageObtained);
                        }
                        Err(e) => warn!("[{}] dropped sample: {}", name, e),
                    }
                    Ok(gst::FlowSuccess::Ok)
                })
                .build(),
        );

        Ok(pipeline)
    }

    /// Surface pipeline errors / EOS posted since the last check.
    fn check_bus(&self, pipeline: &gst::Pipeline) -> Result<(), DeviceError> {
        let Some(bus) = pipeline.bus() else { return Ok(()) };
        while let Some(msg) =
            bus.pop_filtered(&[gst::MessageType::Error, gst::MessageType::Eos])
        {
            match msg.view() {
                gst::MessageView::Error(e) => {
                    error!("[{}] GStreamer error: {}", self.name, e.error());
                    return Err(DeviceError::FetchFailed { reason: e.error().to_string() });
                }
                gst::MessageView::Eos(_) => {
                    info!("[{}] GStreamer pipeline EOS", self.name);
                    return Err(DeviceError::Disconnected);
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl CaptureSource for V4l2Source {
    fn name(&self) -> &str {
        &self.name
    }

    fn open(&self) -> Result<bool, DeviceError> {
        let mut slot = self.pipeline.lock().unwrap_or_else(|p| p.into_inner());
        if slot.is_some() {
            return Ok(true);
        }
        let pipeline = self.build_pipeline()?;
        pipeline
            .set_state(gst::State::Playing)
            .map_err(|e| DeviceError::OpenFailed {
                device: self.name.clone(),
                reason: e.to_string(),
            })?;
        // Block until the device has actually negotiated and is streaming.
        let (result, state, _) = pipeline.state(gst::ClockTime::from_seconds(5));
        if result.is_err() || state != gst::State::Playing {
            let _ = pipeline.set_state(gst::State::Null);
            return Ok(false);
        }
        info!("[{}] streaming from {} at {}", self.name, self.path, self.size);
        *slot = Some(pipeline);
        drop(slot);

        self.open.store(true, Ordering::SeqCst);
        self.listeners.emit(&self.name, CaptureEvent::Opened);
        Ok(true)
    }

    fn is_open(&self) -> bool {
        self.open.load(Ordering::SeqCst)
    }

    fn close(&self) {
        let pipeline = self.pipeline.lock().unwrap_or_else(|p| p.into_inner()).take();
        if let Some(pipeline) = pipeline {
            self.open.store(false, Ordering::SeqCst);
            let _ = pipeline.set_state(gst::State::Null);
            *self.latest.lock().unwrap_or_else(|p| p.into_inner()) = None;
            self.listeners.emit(&self.name, CaptureEvent::Closed);
        }
    }

    fn fetch_latest_frame(&self) -> Result<Option<Frame>, DeviceError> {
        let failed = {
            let slot = self.pipeline.lock().unwrap_or_else(|p| p.into_inner());
            let Some(pipeline) = slot.as_ref() else {
                return Err(DeviceError::NotOpen { device: self.name.clone() });
            };
            self.check_bus(pipeline).err()
        };
        if let Some(e) = failed {
            // A dead pipeline never recovers; tear it down so listeners see the close.
            warn!("[{}] pipeline failed, closing device", self.name);
            self.close();
            return Err(e);
        }
        Ok(self.latest.lock().unwrap_or_else(|p| p.into_inner()).clone())
    }

    fn add_listener(&self, listener: Arc<dyn CaptureListener>) {
        self.listeners.add(listener);
    }
}

impl Drop for V4l2Source {
    fn drop(&mut self) {
        self.close();
        self.listeners.emit(&self.name, CaptureEvent::Disposed);
    }
}
