//! Renderer collaborator interface
//!
//! The display toolkit is external. It is reached through three small
//! traits:
//!
//! - [`SurfaceAllocator`] creates destination surfaces during negotiation
//! - [`Surface`] exposes a locked write view of one surface
//! - [`Presenter`] draws a surface region to the screen
//!
//! [`MemoryRenderer`] implements all three on the heap. It backs the
//! headless player and the tests.

use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::error::RenderError;
use crate::format::SurfaceFormat;
use crate::frame::DisplayRect;

/// A display-backed pixel surface
pub trait Surface: Send {
    /// Pixel layout
    fn format(&self) -> SurfaceFormat;

    /// Width in pixels
    fn width(&self) -> u32;

    /// Height in pixels
    fn height(&self) -> u32;

    /// Actual row stride in bytes, padding included
    fn stride(&self) -> usize;

    /// Acquire the write view
    fn lock(&mut self) -> Result<(), RenderError>;

    /// Surface memory; only meaningful between `lock` and `unlock`
    fn pixels_mut(&mut self) -> &mut [u8];

    /// Release the write view
    fn unlock(&mut self);
}

/// Scoped write access to a [`Surface`]
///
/// The surface is unlocked when the writer is dropped, on every exit path.
pub struct SurfaceWriter<'a, S: Surface + ?Sized> {
    surface: &'a mut S,
}

impl<'a, S: Surface + ?Sized> SurfaceWriter<'a, S> {
    /// Lock `surface` for writing
    pub fn acquire(surface: &'a mut S) -> Result<Self, RenderError> {
        surface.lock()?;
        Ok(Self { surface })
    }

    /// Row stride of the locked surface
    pub fn stride(&self) -> usize {
        self.surface.stride()
    }

    /// Writable surface memory
    pub fn pixels(&mut self) -> &mut [u8] {
        self.surface.pixels_mut()
    }
}

impl<S: Surface + ?Sized> Drop for SurfaceWriter<'_, S> {
    fn drop(&mut self) {
        self.surface.unlock();
    }
}

/// Creates destination surfaces
pub trait SurfaceAllocator {
    /// Surface type produced
    type Surface: Surface;

    /// Allocate a `width` x `height` surface in `format`
    fn create_surface(
        &mut self,
        width: u32,
        height: u32,
        format: SurfaceFormat,
    ) -> Result<Self::Surface, RenderError>;
}

/// Draws surfaces to the display
pub trait Presenter<S>: Send {
    /// Present the `rect` region of `surface`, scaled to the output
    fn present(&mut self, surface: &S, rect: DisplayRect) -> Result<(), RenderError>;
}

/// Heap-backed surface
#[derive(Debug, Clone)]
pub struct MemorySurface {
    format: SurfaceFormat,
    width: u32,
    height: u32,
    stride: usize,
    pixels: Vec<u8>,
    locked: bool,
    fail_lock: bool,
}

impl MemorySurface {
    /// Allocate a zeroed surface with the given row stride
    pub fn new(width: u32, height: u32, format: SurfaceFormat, stride: usize) -> Self {
        Self {
            format,
            width,
            height,
            stride,
            pixels: vec![0; format.frame_size(stride, height)],
            locked: false,
            fail_lock: false,
        }
    }

    /// Make every subsequent lock attempt fail
    pub fn set_fail_lock(&mut self, fail: bool) {
        self.fail_lock = fail;
    }

    /// Whether a writer currently holds the surface
    pub fn is_locked(&self) -> bool {
        self.locked
    }

    /// Surface memory for inspection
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// One row of the first plane, `None` past the last row
    pub fn row(&self, y: u32) -> Option<&[u8]> {
        if y >= self.height {
            return None;
        }
        let start = y as usize * self.stride;
        self.pixels.get(start..start + self.stride)
    }
}

impl Surface for MemorySurface {
    fn format(&self) -> SurfaceFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.width
    }

    fn height(&self) -> u32 {
        self.height
    }

    fn stride(&self) -> usize {
        self.stride
    }

    fn lock(&mut self) -> Result<(), RenderError> {
        if self.fail_lock {
            return Err(RenderError::Lock("surface lock refused".to_string()));
        }
        if self.locked {
            return Err(RenderError::Lock("surface already locked".to_string()));
        }
        self.locked = true;
        Ok(())
    }

    fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.pixels
    }

    fn unlock(&mut self) {
        self.locked = false;
    }
}

/// Counters kept by [`MemoryRenderer`]
#[derive(Debug, Clone, Default)]
pub struct RendererStats {
    /// Surfaces allocated
    pub surfaces_created: u64,

    /// Presents performed
    pub presents: u64,

    /// Region of the last present
    pub last_rect: Option<DisplayRect>,

    /// Size of the surface of the last present
    pub last_surface_size: Option<(u32, u32)>,
}

/// Heap-backed renderer
///
/// Clones share statistics, so one clone can allocate on the capture
/// context while another presents on the render thread.
#[derive(Debug, Clone)]
pub struct MemoryRenderer {
    row_alignment: usize,
    stats: Arc<Mutex<RendererStats>>,
}

impl MemoryRenderer {
    /// Renderer without row padding
    pub fn new() -> Self {
        Self::with_row_alignment(1)
    }

    /// Renderer that pads every row to a multiple of `alignment` bytes
    pub fn with_row_alignment(alignment: usize) -> Self {
        Self {
            row_alignment: alignment.max(1),
            stats: Arc::new(Mutex::new(RendererStats::default())),
        }
    }

    /// Snapshot of the counters
    pub fn stats(&self) -> RendererStats {
        self.stats.lock().clone()
    }

    fn stride_for(&self, width: u32, format: SurfaceFormat) -> usize {
        let min = format.min_stride(width);
        let mut stride = (min + self.row_alignment - 1) / self.row_alignment * self.row_alignment;
        // chroma rows are half the luma stride
        if format.is_planar() && stride % 2 != 0 {
            stride += 1;
        }
        stride
    }
}

impl Default for MemoryRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl SurfaceAllocator for MemoryRenderer {
    type Surface = MemorySurface;

    fn create_surface(
        &mut self,
        width: u32,
        height: u32,
        format: SurfaceFormat,
    ) -> Result<MemorySurface, RenderError> {
        if width == 0 || height == 0 {
            return Err(RenderError::SurfaceCreation(format!(
                "invalid surface size {}x{}",
                width, height
            )));
        }

        let stride = self.stride_for(width, format);
        debug!("Allocating {:?} surface {}x{} (stride {})", format, width, height, stride);

        self.stats.lock().surfaces_created += 1;
        Ok(MemorySurface::new(width, height, format, stride))
    }
}

impl Presenter<MemorySurface> for MemoryRenderer {
    fn present(&mut self, surface: &MemorySurface, rect: DisplayRect) -> Result<(), RenderError> {
        if rect.clip(surface.width, surface.height) != Some(rect) {
            return Err(RenderError::Present(format!(
                "rect {:?} outside {}x{} surface",
                rect, surface.width, surface.height
            )));
        }

        trace!("Presenting {:?}", rect);

        let mut stats = self.stats.lock();
        stats.presents += 1;
        stats.last_rect = Some(rect);
        stats.last_surface_size = Some((surface.width, surface.height));
        Ok(())
    }
}
