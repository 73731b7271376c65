use crate::features::FeatureVector;
use tracing::warn;

/// Bounded, ordered buffer of feature vectors accumulated during a capture.
///
/// Append-only while a capture runs; consumed wholesale via [`take`] when
/// the capture completes. Length never exceeds the configured capacity.
///
/// [`take`]: FrameWindow::take
pub struct FrameWindow {
    frames: Vec<FeatureVector>,
    capacity: usize,
}

impl FrameWindow {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "frame window capacity must be greater than 0");
        Self {
            frames: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a frame, returning whether the window is now full.
    ///
    /// A push against an already-full window is dropped; the state machine
    /// consumes the window on the frame that fills it, so reaching this
    /// path means an upstream ordering bug worth logging.
    pub fn push(&mut self, frame: FeatureVector) -> bool {
        if self.frames.len() == self.capacity {
            warn!(
                "Dropping frame pushed into a full capture window ({} frames)",
                self.capacity
            );
            return true;
        }
        self.frames.push(frame);
        self.is_full()
    }

    pub fn len(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.frames.len() == self.capacity
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn frames(&self) -> &[FeatureVector] {
        &self.frames
    }

    /// Consume the buffered frames wholesale, leaving the window empty
    pub fn take(&mut self) -> Vec<FeatureVector> {
        std::mem::take(&mut self.frames)
    }

    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fills_to_capacity() {
        let mut window = FrameWindow::new(3);
        assert!(!window.push(FeatureVector::zeroed()));
        assert!(!window.push(FeatureVector::zeroed()));
        assert!(window.push(FeatureVector::zeroed()));
        assert!(window.is_full());
        assert_eq!(window.len(), 3);
    }

    #[test]
    fn test_push_on_full_is_dropped() {
        let mut window = FrameWindow::new(2);
        window.push(FeatureVector::zeroed());
        window.push(FeatureVector::zeroed());
        assert!(window.push(FeatureVector::zeroed()));
        assert_eq!(window.len(), 2);
    }

    #[test]
    fn test_take_consumes_wholesale() {
        let mut window = FrameWindow::new(4);
        window.push(FeatureVector::zeroed());
        window.push(FeatureVector::zeroed());

        let frames = window.take();
        assert_eq!(frames.len(), 2);
        assert!(window.is_empty());
        assert_eq!(window.capacity(), 4);
    }

    #[test]
    #[should_panic(expected = "capacity must be greater than 0")]
    fn test_zero_capacity_rejected() {
        let _ = FrameWindow::new(0);
    }
}
