use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::errors::CamlinkError;

// MARK: - Resolution

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub const QVGA: Self = Self { width: 320, height: 240 };
    pub const VGA: Self = Self { width: 640, height: 480 };

    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn total_pixels(&self) -> u64 {
        self.width as u64 * self.height as u64
    }
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}×{}", self.width, self.height)
    }
}

// MARK: - PixelFormat

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// 4 bytes per pixel: Red, Green, Blue, Alpha.
    Rgba,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            Self::Rgba => 4,
        }
    }
}

// MARK: - Rgba

/// A single decoded pixel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba {
    pub const BLACK: Self = Self::opaque(0, 0, 0);

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

// MARK: - FrameId

static NEXT_FRAME_ID: AtomicU64 = AtomicU64::new(1);

/// Identity of a produced frame. Clones of a [`Frame`] share it; every call
/// to a `Frame` constructor mints a new one, even for identical pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FrameId(u64);

impl FrameId {
    fn next() -> Self {
        Self(NEXT_FRAME_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl std::fmt::Display for FrameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

// MARK: - Frame

/// Immutable 2-D pixel buffer. Cheap to clone; clones are the same frame.
#[derive(Clone)]
pub struct Frame {
    inner: Arc<FrameInner>,
}

struct FrameInner {
    id: FrameId,
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Bytes,
    captured_at: Instant,
}

impl Frame {
    /// Wrap raw pixel bytes. `data` must hold exactly `width * height` pixels
    /// in `format`.
    pub fn new(
        width: u32,
        height: u32,
        format: PixelFormat,
        data: impl Into<Bytes>,
    ) -> Result<Self, CamlinkError> {
        let data = data.into();
        let expected = width as usize * height as usize * format.bytes_per_pixel();
        if data.len() != expected {
            return Err(CamlinkError::InvalidFrame {
                reason: format!(
                    "{}×{} {:?} needs {} bytes, got {}",
                    width,
                    height,
                    format,
                    expected,
                    data.len()
                ),
            });
        }
        Ok(Self {
            inner: Arc::new(FrameInner {
                id: FrameId::next(),
                width,
                height,
                format,
                data,
                captured_at: Instant::now(),
            }),
        })
    }

    /// Frame filled with a single colour.
    pub fn solid(resolution: Resolution, color: Rgba) -> Self {
        let px = [color.r, color.g, color.b, color.a];
        let data: Vec<u8> = px
            .iter()
            .copied()
            .cycle()
            .take(resolution.total_pixels() as usize * 4)
            .collect();
        Self {
            inner: Arc::new(FrameInner {
                id: FrameId::next(),
                width: resolution.width,
                height: resolution.height,
                format: PixelFormat::Rgba,
                data: Bytes::from(data),
                captured_at: Instant::now(),
            }),
        }
    }

    pub fn id(&self) -> FrameId {
        self.inner.id
    }

    pub fn width(&self) -> u32 {
        self.inner.width
    }

    pub fn height(&self) -> u32 {
        self.inner.height
    }

    pub fn resolution(&self) -> Resolution {
        Resolution::new(self.inner.width, self.inner.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.inner.format
    }

    pub fn data(&self) -> &Bytes {
        &self.inner.data
    }

    pub fn captured_at(&self) -> Instant {
        self.inner.captured_at
    }

    /// True when both handles point at the same produced frame.
    pub fn same_instance(&self, other: &Frame) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Colour at `(x, y)`, or `None` outside the frame.
    pub fn pixel(&self, x: u32, y: u32) -> Option<Rgba> {
        if x >= self.inner.width || y >= self.inner.height {
            return None;
        }
        let bpp = self.inner.format.bytes_per_pixel();
        let offset = (y as usize * self.inner.width as usize + x as usize) * bpp;
        let p = &self.inner.data[offset..offset + bpp];
        Some(match self.inner.format {
            PixelFormat::Rgba => Rgba { r: p[0], g: p[1], b: p[2], a: p[3] },
        })
    }

    /// Hash of dimensions, format and pixel bytes.
    pub fn content_hash(&self) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.inner.width.hash(&mut hasher);
        self.inner.height.hash(&mut hasher);
        self.inner.format.hash(&mut hasher);
        self.inner.data.hash(&mut hasher);
        hasher.finish()
    }
}

impl std::fmt::Debug for Frame {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Frame")
            .field("id", &self.inner.id)
            .field("width", &self.inner.width)
            .field("height", &self.inner.height)
            .field("format", &self.inner.format)
            .field("bytes", &self.inner.data.len())
            .finish()
    }
}
