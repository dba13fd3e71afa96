use camlink_core::{DedupStrategy, Frame};

/// Holds the most recently fetched frame. Owned by the pump worker; the UI
/// only ever sees the snapshots returned by [`FrameBuffer::replace_if_changed`].
#[derive(Debug)]
pub struct FrameBuffer {
    strategy: DedupStrategy,
    current:  Option<(u64, Frame)>,
}

impl FrameBuffer {
    pub fn new(strategy: DedupStrategy) -> Self {
        Self { strategy, current: None }
    }

    /// Store `frame` unless it is the one already held. Returns the snapshot
    /// to render when it changed, `None` when it is a duplicate.
    pub fn replace_if_changed(&mut self, frame: Frame) -> Option<Frame> {
        let key = self.strategy.key(&frame);
        if matches!(&self.current, Some((current_key, _)) if *current_key == key) {
            return None;
        }
        self.current = Some((key, frame.clone()));
        Some(frame)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use camlink_core::{Resolution, Rgba};

    fn solid(v: u8) -> Frame {
        Frame::solid(Resolution::new(4, 4), Rgba::opaque(v, v, v))
    }

    #[test]
    fn identity_skips_same_instance_only() {
        let mut buffer = FrameBuffer::new(DedupStrategy::Identity);
        let a = solid(1);

        assert!(buffer.replace_if_changed(a.clone()).is_some());
        assert!(buffer.replace_if_changed(a.clone()).is_none());
        // Same pixels, new frame: identity treats it as new.
        assert!(buffer.replace_if_changed(solid(1)).is_some());
        // The previous instance is no longer held, so it counts as new again.
        assert!(buffer.replace_if_changed(a).is_some());
    }

    #[test]
    fn content_hash_skips_identical_pixels() {
        let mut buffer = FrameBuffer::new(DedupStrategy::ContentHash);

        assert!(buffer.replace_if_changed(solid(1)).is_some());
        assert!(buffer.replace_if_changed(solid(1)).is_none());
        assert!(buffer.replace_if_changed(solid(2)).is_some());
    }
}
