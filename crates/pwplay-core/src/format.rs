//! Stream format types
//!
//! Transport-neutral descriptions of what the capture source proposes
//! ([`FormatProposal`]) and of what was finally agreed on ([`StreamFormat`]).

use std::fmt;

use crate::frame::DisplayRect;

/// Top-level media category of a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    /// Video frames
    Video,
    /// Audio samples
    Audio,
    /// Anything else, carrying the transport's raw id
    Other(u32),
}

/// Media subtype of a video proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaSubtype {
    /// Raw pixel data as produced by a capture device
    Raw,
    /// Linear float channels, typically from a processing graph
    Dsp,
    /// Anything else (encoded streams and the like)
    Other(u32),
}

/// Inner pixel format of a proposal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VideoFormat {
    /// 32-bit BGR with padding byte
    BGRx,
    /// 32-bit BGRA
    BGRA,
    /// 32-bit RGB with padding byte
    RGBx,
    /// 32-bit RGBA
    RGBA,
    /// Planar YUV 4:2:0, U before V
    I420,
    /// Planar YUV 4:2:0, V before U
    YV12,
    /// Four 32-bit floats per pixel
    RGBAF32,
    /// Unrecognized transport format id
    Other(u32),
}

impl VideoFormat {
    /// Whether this is a planar YUV layout
    pub const fn is_planar_yuv(self) -> bool {
        matches!(self, Self::I420 | Self::YV12)
    }
}

/// Frame dimensions in pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VideoSize {
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
}

impl VideoSize {
    /// Create a size
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Whether either dimension is zero
    pub const fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

impl fmt::Display for VideoSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Rational frame rate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fraction {
    /// Numerator
    pub num: u32,
    /// Denominator
    pub denom: u32,
}

impl Fraction {
    /// Frames per second as a float, 0 for a zero denominator
    pub fn as_f64(&self) -> f64 {
        if self.denom == 0 {
            0.0
        } else {
            f64::from(self.num) / f64::from(self.denom)
        }
    }
}

/// A concrete format offered by the transport
///
/// Only the fields the negotiator looks at are kept. `size` is absent for
/// float proposals, whose geometry travels out of band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatProposal {
    /// Top-level category
    pub media_type: MediaType,
    /// Subtype
    pub media_subtype: MediaSubtype,
    /// Inner pixel format
    pub format: Option<VideoFormat>,
    /// Frame size, when carried by the proposal
    pub size: Option<VideoSize>,
    /// Frame rate, when carried by the proposal
    pub framerate: Option<Fraction>,
}

impl FormatProposal {
    /// Raw video proposal
    pub const fn raw(format: VideoFormat, width: u32, height: u32) -> Self {
        Self {
            media_type: MediaType::Video,
            media_subtype: MediaSubtype::Raw,
            format: Some(format),
            size: Some(VideoSize::new(width, height)),
            framerate: None,
        }
    }

    /// Float ("dsp") video proposal
    pub const fn dsp(format: VideoFormat) -> Self {
        Self {
            media_type: MediaType::Video,
            media_subtype: MediaSubtype::Dsp,
            format: Some(format),
            size: None,
            framerate: None,
        }
    }

    /// Attach a frame rate
    #[must_use]
    pub const fn with_framerate(mut self, num: u32, denom: u32) -> Self {
        self.framerate = Some(Fraction { num, denom });
        self
    }
}

/// A parameter notification from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamUpdate {
    /// A format was proposed (`Some`) or cleared (`None`)
    Format(Option<FormatProposal>),
    /// Stream tag update, ignored
    Tag,
    /// Any other parameter id, ignored
    Other(u32),
}

/// Layout of the incoming frames
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEncoding {
    /// 32 bits per pixel, byte-copied as is
    PackedBgra,
    /// Three planes, copied plane by plane
    PlanarYuv,
    /// Four floats per pixel, scaled to bytes
    FloatRgba,
}

/// Pixel layout of the destination surface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceFormat {
    /// B, G, R, A bytes
    Bgra32,
    /// R, G, B, A bytes
    Rgba32,
    /// Planar Y, U, V
    Iyuv,
    /// Planar Y, V, U
    Yv12,
}

impl SurfaceFormat {
    /// Whether the surface is laid out as three YUV planes
    pub const fn is_planar(self) -> bool {
        matches!(self, Self::Iyuv | Self::Yv12)
    }

    /// Bytes per pixel of the first (or only) plane
    pub const fn bytes_per_pixel(self) -> usize {
        match self {
            Self::Bgra32 | Self::Rgba32 => 4,
            Self::Iyuv | Self::Yv12 => 1,
        }
    }

    /// Smallest row stride able to hold `width` pixels
    pub const fn min_stride(self, width: u32) -> usize {
        width as usize * self.bytes_per_pixel()
    }

    /// Total surface bytes for a given stride and height
    ///
    /// Planar chroma planes hold `ceil(height / 2)` rows of `stride / 2`.
    pub const fn frame_size(self, stride: usize, height: u32) -> usize {
        let luma = stride * height as usize;
        if self.is_planar() {
            luma + 2 * (stride / 2) * (height as usize).div_ceil(2)
        } else {
            luma
        }
    }
}

/// Result of negotiation before a surface exists
///
/// Everything the negotiator can derive from the proposal alone. The
/// destination stride is only known once the renderer allocated the
/// surface, see [`StreamFormat::from_geometry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VideoGeometry {
    /// Source layout
    pub encoding: SourceEncoding,
    /// Destination layout
    pub surface_format: SurfaceFormat,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Source bytes per destination byte (4 for float sources)
    pub multiplier: usize,
    /// Proposed frame rate
    pub framerate: Option<Fraction>,
}

impl VideoGeometry {
    /// Frame size
    pub const fn size(&self) -> VideoSize {
        VideoSize::new(self.width, self.height)
    }
}

/// The negotiated stream format
///
/// Replaced as a whole on every accepted format change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamFormat {
    /// Source layout
    pub encoding: SourceEncoding,
    /// Destination layout
    pub surface_format: SurfaceFormat,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Destination row stride in bytes, as reported by the renderer
    pub target_stride: usize,
    /// Source bytes per destination byte
    pub multiplier: usize,
    /// Raw buffer size requested from the transport
    pub buffer_size: usize,
    /// Raw buffer stride requested from the transport
    pub buffer_stride: usize,
    /// Proposed frame rate
    pub framerate: Option<Fraction>,
}

impl StreamFormat {
    /// Finalize a geometry with the stride of the allocated surface
    pub const fn from_geometry(geometry: &VideoGeometry, target_stride: usize) -> Self {
        let buffer_size =
            geometry.surface_format.frame_size(target_stride, geometry.height) * geometry.multiplier;

        Self {
            encoding: geometry.encoding,
            surface_format: geometry.surface_format,
            width: geometry.width,
            height: geometry.height,
            target_stride,
            multiplier: geometry.multiplier,
            buffer_size,
            buffer_stride: target_stride * geometry.multiplier,
            framerate: geometry.framerate,
        }
    }

    /// Whether conversion goes through the planar copy path
    pub const fn is_yuv(&self) -> bool {
        self.surface_format.is_planar()
    }

    /// Frame size
    pub const fn size(&self) -> VideoSize {
        VideoSize::new(self.width, self.height)
    }

    /// Rectangle covering the whole frame
    pub const fn full_rect(&self) -> DisplayRect {
        DisplayRect::full(self.width, self.height)
    }
}
