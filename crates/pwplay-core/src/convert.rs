//! Frame conversion
//!
//! Writes one raw transport buffer into the destination surface. Three
//! paths exist, picked by the negotiated surface format:
//!
//! - **Planar YUV**: plane-by-plane strided copy, no pixel transform
//! - **BGRA**: row copy of `min(source stride, surface stride)` bytes
//! - **RGBA from float**: per-channel `clamp(v * 255, 0, 255)`
//!
//! All paths are bounded by both the source buffer and the surface: short
//! buffers copy the rows they hold, and no row read crosses into the next
//! row.

use tracing::trace;

use crate::error::ConversionError;
use crate::format::{StreamFormat, SurfaceFormat};
use crate::frame::{FrameBuffer, FrameState};
use crate::render::{Surface, SurfaceWriter};

const FLOAT_PIXEL_BYTES: usize = 16;
const RGBA_PIXEL_BYTES: usize = 4;

/// Row stride of a source buffer
///
/// Transports may report 0, in which case it is derived from the chunk size.
pub fn resolve_source_stride(chunk_stride: usize, chunk_size: usize, height: u32) -> usize {
    if chunk_stride != 0 || height == 0 {
        chunk_stride
    } else {
        chunk_size / height as usize
    }
}

/// Scale a linear float channel to a byte
///
/// Out-of-range values clamp, the fractional part truncates, NaN maps to 0.
#[inline]
pub fn float_to_byte(value: f32) -> u8 {
    (value * 255.0).clamp(0.0, 255.0) as u8
}

/// Copy `rows` rows of packed pixels
///
/// Copies `min(src_stride, dst_stride)` bytes per row. Returns the number of
/// rows fully copied.
pub fn copy_packed(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    rows: usize,
) -> usize {
    let row_bytes = src_stride.min(dst_stride);
    if row_bytes == 0 {
        return 0;
    }

    for y in 0..rows {
        let s = y * src_stride;
        let d = y * dst_stride;
        let (Some(src_row), Some(dst_row)) =
            (src.get(s..s + row_bytes), dst.get_mut(d..d + row_bytes))
        else {
            return y;
        };
        dst_row.copy_from_slice(src_row);
    }

    rows
}

/// Convert `rows` rows of float RGBA pixels to byte RGBA
///
/// Each source pixel is four native-endian `f32` (r, g, b, a). At most
/// `width` pixels are converted per row, fewer if either stride cannot
/// hold them. Returns the number of rows converted.
pub fn convert_float_rgba(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    width: u32,
    rows: usize,
) -> usize {
    let pixels = (width as usize)
        .min(src_stride / FLOAT_PIXEL_BYTES)
        .min(dst_stride / RGBA_PIXEL_BYTES);
    if pixels == 0 {
        return 0;
    }

    let src_bytes = pixels * FLOAT_PIXEL_BYTES;
    let dst_bytes = pixels * RGBA_PIXEL_BYTES;

    for y in 0..rows {
        let s = y * src_stride;
        let d = y * dst_stride;
        let (Some(src_row), Some(dst_row)) =
            (src.get(s..s + src_bytes), dst.get_mut(d..d + dst_bytes))
        else {
            return y;
        };

        for (p, out) in src_row
            .chunks_exact(FLOAT_PIXEL_BYTES)
            .zip(dst_row.chunks_exact_mut(RGBA_PIXEL_BYTES))
        {
            for (channel, byte) in p.chunks_exact(4).zip(out.iter_mut()) {
                let value = f32::from_ne_bytes([channel[0], channel[1], channel[2], channel[3]]);
                *byte = float_to_byte(value);
            }
        }
    }

    rows
}

/// Copy a three-plane 4:2:0 frame
///
/// Both sides use the same layout: the luma plane at 0 with `stride` bytes
/// per row, then two chroma planes of `ceil(height / 2)` rows, each
/// `stride / 2` bytes wide. For even heights the second chroma plane starts
/// at `5 * stride * height / 4`.
pub fn copy_planar(
    src: &[u8],
    src_stride: usize,
    dst: &mut [u8],
    dst_stride: usize,
    height: u32,
) -> usize {
    let h = height as usize;
    let chroma_rows = h.div_ceil(2);
    let plane_offsets = |stride: usize| {
        let luma = stride * h;
        [0, luma, luma + stride / 2 * chroma_rows]
    };

    let src_offsets = plane_offsets(src_stride);
    let dst_offsets = plane_offsets(dst_stride);
    let mut copied = 0;

    for plane in 0..3 {
        let (rows, s_stride, d_stride) = if plane == 0 {
            (h, src_stride, dst_stride)
        } else {
            (chroma_rows, src_stride / 2, dst_stride / 2)
        };

        let (Some(src_plane), Some(dst_plane)) =
            (src.get(src_offsets[plane]..), dst.get_mut(dst_offsets[plane]..))
        else {
            break;
        };
        copied += copy_packed(src_plane, s_stride, dst_plane, d_stride, rows);
    }

    copied
}

/// Write one buffer into a surface
///
/// Fails with [`ConversionError::EmptyBuffer`] when the buffer is unmapped
/// and [`ConversionError::LockAcquisitionFailed`] when the surface refuses
/// the write lock. The lock is held only for the copy.
pub fn convert_frame<B, S>(
    buffer: &mut B,
    format: &StreamFormat,
    surface: &mut S,
) -> Result<(), ConversionError>
where
    B: FrameBuffer + ?Sized,
    S: Surface + ?Sized,
{
    let chunk_size = buffer.chunk_size();
    let chunk_stride = buffer.chunk_stride();
    let src = buffer.data().ok_or(ConversionError::EmptyBuffer)?;

    let mut writer = SurfaceWriter::acquire(surface)
        .map_err(|e| ConversionError::LockAcquisitionFailed(e.to_string()))?;
    let dst_stride = writer.stride();
    let dst = writer.pixels();
    let rows = format.height as usize;

    let copied = match format.surface_format {
        SurfaceFormat::Iyuv | SurfaceFormat::Yv12 => {
            copy_planar(src, format.target_stride, dst, dst_stride, format.height)
        }
        SurfaceFormat::Bgra32 => {
            let src_stride = resolve_source_stride(chunk_stride, chunk_size, format.height);
            copy_packed(src, src_stride, dst, dst_stride, rows)
        }
        SurfaceFormat::Rgba32 => {
            let src_stride = resolve_source_stride(chunk_stride, chunk_size, format.height);
            convert_float_rgba(src, src_stride, dst, dst_stride, format.width, rows)
        }
    };

    trace!("Converted {} rows into {:?} surface", copied, format.surface_format);
    Ok(())
}

/// Convert a buffer into the shared frame state
///
/// Applies the buffer's crop region, writes the pixels and marks the state
/// ready. Unmapped buffers are rejected before the crop is looked at. The
/// caller holds the frame lock for the whole call.
pub fn convert_into_state<B, S>(
    buffer: &mut B,
    state: &mut FrameState<S>,
) -> Result<(), ConversionError>
where
    B: FrameBuffer + ?Sized,
    S: Surface,
{
    if buffer.data().is_none() {
        return Err(ConversionError::EmptyBuffer);
    }

    if let Some(crop) = buffer.crop() {
        if state.apply_crop(crop) {
            trace!("Crop region {:?}", crop);
        }
    }

    let (format, surface) = state
        .conversion_target()
        .ok_or(ConversionError::NotNegotiated)?;
    let format = *format;
    convert_frame(buffer, &format, surface)?;

    state.mark_ready();
    Ok(())
}
