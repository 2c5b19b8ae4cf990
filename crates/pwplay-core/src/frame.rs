//! Frame buffers and the shared frame slot
//!
//! [`FrameBuffer`] and [`BufferQueue`] are the transport-side view of a
//! captured frame. [`SharedFrame`] is the single lock-protected slot that
//! the capture context writes and the render pacer reads.

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use crate::format::StreamFormat;

/// Sub-rectangle of the negotiated frame
///
/// Doubles as the crop region reported by the transport, which uses the
/// same signed position / unsigned size layout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DisplayRect {
    /// X coordinate of top-left corner
    pub x: i32,
    /// Y coordinate of top-left corner
    pub y: i32,
    /// Region width
    pub width: u32,
    /// Region height
    pub height: u32,
}

impl DisplayRect {
    /// Create a rectangle
    pub const fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }

    /// Rectangle covering a whole frame
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// A crop region is valid when it has a non-zero size
    pub const fn is_valid(&self) -> bool {
        self.width != 0 && self.height != 0
    }

    /// Clip to frame bounds
    ///
    /// Returns `None` when nothing of the rectangle lies inside the frame.
    #[must_use]
    pub fn clip(&self, frame_width: u32, frame_height: u32) -> Option<Self> {
        let x0 = i64::from(self.x).max(0);
        let y0 = i64::from(self.y).max(0);
        let x1 = (i64::from(self.x) + i64::from(self.width)).min(i64::from(frame_width));
        let y1 = (i64::from(self.y) + i64::from(self.height)).min(i64::from(frame_height));

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(Self {
            x: x0 as i32,
            y: y0 as i32,
            width: (x1 - x0) as u32,
            height: (y1 - y0) as u32,
        })
    }
}

/// A raw buffer borrowed from the transport for one conversion
pub trait FrameBuffer {
    /// Mapped memory of the first data block, `None` if unmapped
    fn data(&mut self) -> Option<&[u8]>;

    /// Number of valid bytes in the data block
    fn chunk_size(&self) -> usize;

    /// Row stride reported by the transport, 0 when unknown
    fn chunk_stride(&self) -> usize;

    /// Crop region metadata, if the buffer carries any
    fn crop(&self) -> Option<DisplayRect>;
}

/// Non-blocking access to the transport's queue of filled buffers
pub trait BufferQueue {
    /// Buffer handle type
    type Buffer: FrameBuffer;

    /// Take the next filled buffer, `None` when nothing is queued
    fn dequeue(&mut self) -> Option<Self::Buffer>;

    /// Give a buffer back to the transport
    fn requeue(&mut self, buffer: Self::Buffer);
}

/// Drain every queued buffer and keep only the newest
///
/// Older buffers go straight back to the transport unconverted. Returns the
/// newest buffer and the number of buffers skipped.
pub fn drain_latest<Q: BufferQueue>(queue: &mut Q) -> (Option<Q::Buffer>, usize) {
    let mut latest = None;
    let mut skipped = 0;

    while let Some(buffer) = queue.dequeue() {
        if let Some(older) = latest.replace(buffer) {
            queue.requeue(older);
            skipped += 1;
        }
    }

    (latest, skipped)
}

/// Contents of the shared frame slot
#[derive(Debug)]
pub struct FrameState<S> {
    surface: Option<S>,
    format: Option<StreamFormat>,
    rect: DisplayRect,
    ready: bool,
}

impl<S> FrameState<S> {
    fn new() -> Self {
        Self {
            surface: None,
            format: None,
            rect: DisplayRect::default(),
            ready: false,
        }
    }

    /// Destination surface, if one was allocated
    pub fn surface(&self) -> Option<&S> {
        self.surface.as_ref()
    }

    /// Currently negotiated format
    pub fn format(&self) -> Option<&StreamFormat> {
        self.format.as_ref()
    }

    /// Region to present
    pub fn rect(&self) -> DisplayRect {
        self.rect
    }

    /// Whether at least one frame was converted
    pub fn is_ready(&self) -> bool {
        self.ready
    }

    /// Install a newly negotiated format
    ///
    /// `surface` replaces the current surface when `Some`; `None` keeps the
    /// existing one (same geometry). The display rectangle is reset to the
    /// full frame.
    pub fn install(&mut self, format: StreamFormat, surface: Option<S>) {
        if let Some(surface) = surface {
            self.surface = Some(surface);
        }
        self.rect = format.full_rect();
        self.format = Some(format);
    }

    /// Apply a crop region reported by the transport
    ///
    /// Invalid (zero-sized) regions leave the rectangle unchanged. Returns
    /// whether the rectangle was updated.
    pub fn apply_crop(&mut self, crop: DisplayRect) -> bool {
        if !crop.is_valid() {
            return false;
        }
        self.rect = crop;
        true
    }

    /// Record a successful conversion
    pub fn mark_ready(&mut self) {
        self.ready = true;
    }

    /// Format and surface together, for writing a frame
    pub fn conversion_target(&mut self) -> Option<(&StreamFormat, &mut S)> {
        match (&self.format, &mut self.surface) {
            (Some(format), Some(surface)) => Some((format, surface)),
            _ => None,
        }
    }

    /// Surface and display rectangle clipped to it, for presenting
    pub fn presentation(&self) -> Option<(&S, DisplayRect)> {
        let format = self.format.as_ref()?;
        let surface = self.surface.as_ref()?;
        let rect = self.rect.clip(format.width, format.height)?;
        Some((surface, rect))
    }

    fn teardown(&mut self) -> Option<S> {
        self.ready = false;
        self.format = None;
        self.rect = DisplayRect::default();
        self.surface.take()
    }
}

/// The lock-protected frame slot shared by capture and render contexts
///
/// Cloning yields another handle to the same slot.
#[derive(Debug)]
pub struct SharedFrame<S> {
    inner: Arc<Mutex<FrameState<S>>>,
}

impl<S> Clone for SharedFrame<S> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<S> Default for SharedFrame<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> SharedFrame<S> {
    /// Create an empty slot
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(FrameState::new())),
        }
    }

    /// Acquire the slot for one critical section
    ///
    /// The guard releases the lock on every exit path.
    pub fn lock(&self) -> MutexGuard<'_, FrameState<S>> {
        self.inner.lock()
    }

    /// Snapshot of the ready flag
    pub fn is_ready(&self) -> bool {
        self.inner.lock().is_ready()
    }

    /// Snapshot of the negotiated format
    pub fn format(&self) -> Option<StreamFormat> {
        self.inner.lock().format().copied()
    }

    /// Snapshot of the display rectangle
    pub fn rect(&self) -> DisplayRect {
        self.inner.lock().rect()
    }

    /// Clear the slot and hand back the surface for release
    ///
    /// Only call once the render pacer has been joined.
    pub fn teardown(&self) -> Option<S> {
        self.inner.lock().teardown()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{SourceEncoding, SurfaceFormat, VideoGeometry};

    struct TestBuffer(u32);

    impl FrameBuffer for TestBuffer {
        fn data(&mut self) -> Option<&[u8]> {
            None
        }
        fn chunk_size(&self) -> usize {
            0
        }
        fn chunk_stride(&self) -> usize {
            0
        }
        fn crop(&self) -> Option<DisplayRect> {
            None
        }
    }

    #[derive(Default)]
    struct TestQueue {
        pending: Vec<u32>,
        returned: Vec<u32>,
    }

    impl BufferQueue for TestQueue {
        type Buffer = TestBuffer;

        fn dequeue(&mut self) -> Option<TestBuffer> {
            if self.pending.is_empty() {
                None
            } else {
                Some(TestBuffer(self.pending.remove(0)))
            }
        }

        fn requeue(&mut self, buffer: TestBuffer) {
            self.returned.push(buffer.0);
        }
    }

    fn format(width: u32, height: u32) -> StreamFormat {
        StreamFormat::from_geometry(
            &VideoGeometry {
                encoding: SourceEncoding::PackedBgra,
                surface_format: SurfaceFormat::Bgra32,
                width,
                height,
                multiplier: 1,
                framerate: None,
            },
            width as usize * 4,
        )
    }

    #[test]
    fn test_drain_latest() {
        let mut queue = TestQueue {
            pending: vec![1, 2, 3],
            ..Default::default()
        };

        let (latest, skipped) = drain_latest(&mut queue);
        assert_eq!(latest.map(|b| b.0), Some(3));
        assert_eq!(skipped, 2);
        assert_eq!(queue.returned, vec![1, 2]);
    }

    #[test]
    fn test_drain_empty() {
        let mut queue = TestQueue::default();
        let (latest, skipped) = drain_latest(&mut queue);
        assert!(latest.is_none());
        assert_eq!(skipped, 0);
    }

    #[test]
    fn test_rect_clip() {
        let rect = DisplayRect::new(-10, 20, 100, 50);
        assert_eq!(rect.clip(1920, 1080), Some(DisplayRect::new(0, 20, 90, 50)));

        let rect = DisplayRect::new(1900, 1000, 100, 100);
        assert_eq!(rect.clip(1920, 1080), Some(DisplayRect::new(1900, 1000, 20, 80)));

        let rect = DisplayRect::new(2000, 0, 10, 10);
        assert!(rect.clip(1920, 1080).is_none());
    }

    #[test]
    fn test_install_resets_rect() {
        let frame: SharedFrame<()> = SharedFrame::new();
        {
            let mut state = frame.lock();
            state.install(format(640, 480), Some(()));
            assert!(state.apply_crop(DisplayRect::new(10, 20, 100, 50)));
        }
        assert_eq!(frame.rect(), DisplayRect::new(10, 20, 100, 50));

        frame.lock().install(format(800, 600), None);
        assert_eq!(frame.rect(), DisplayRect::full(800, 600));
    }

    #[test]
    fn test_invalid_crop_ignored() {
        let frame: SharedFrame<()> = SharedFrame::new();
        let mut state = frame.lock();
        state.install(format(640, 480), Some(()));
        assert!(!state.apply_crop(DisplayRect::new(5, 5, 0, 10)));
        assert_eq!(state.rect(), DisplayRect::full(640, 480));
    }

    #[test]
    fn test_teardown() {
        let frame: SharedFrame<u8> = SharedFrame::new();
        {
            let mut state = frame.lock();
            state.install(format(2, 2), Some(7));
            state.mark_ready();
        }
        assert!(frame.is_ready());

        assert_eq!(frame.teardown(), Some(7));
        assert!(!frame.is_ready());
        assert!(frame.format().is_none());
    }
}
