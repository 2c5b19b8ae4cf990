//! Format negotiation
//!
//! Turns a [`FormatProposal`] into a [`VideoGeometry`] and describes the
//! buffers the transport has to allocate for it.
//!
//! # Dispatch
//!
//! | Subtype | Inner format | Geometry from | Surface | Multiplier |
//! |---------|--------------|---------------|---------|------------|
//! | raw | I420 / YV12 | proposal | Iyuv / Yv12 | 1 |
//! | raw | anything else | proposal | Bgra32 | 1 |
//! | dsp | RGBA f32 | position context | Rgba32 | 4 |
//!
//! Raw formats are latched: once one has been accepted, later raw
//! proposals are ignored, since reallocating the surface of a live stream
//! is not supported. Float proposals are never latched.

use tracing::{debug, info};

use crate::config::PlayerConfig;
use crate::error::NegotiationError;
use crate::format::{
    FormatProposal, MediaSubtype, MediaType, SourceEncoding, StreamFormat, SurfaceFormat,
    VideoFormat, VideoGeometry, VideoSize,
};

/// Inclusive range with a preferred value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range<T> {
    /// Preferred value
    pub default: T,
    /// Smallest acceptable value
    pub min: T,
    /// Largest acceptable value
    pub max: T,
}

/// Per-buffer metadata the transport is asked to attach
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetaRequest {
    /// Timing header
    Header,
    /// Crop region
    VideoCrop,
    /// Cursor position and bitmap, sized for bitmaps in the given range
    Cursor(Range<VideoSize>),
}

/// Backing memory the buffers may use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryType {
    /// Memory mapped into our address space
    MemPtr,
}

/// Buffer parameters requested from the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferRequirements {
    /// Number of buffers
    pub buffers: Range<u32>,
    /// Data blocks per buffer
    pub blocks: u32,
    /// Bytes per buffer
    pub size: usize,
    /// Bytes per row
    pub stride: usize,
    /// Allowed backing memory
    pub memory: MemoryType,
    /// Metadata to attach to every buffer
    pub metas: Vec<MetaRequest>,
}

impl BufferRequirements {
    /// Requirements for a negotiated format
    pub fn for_format(format: &StreamFormat, config: &PlayerConfig) -> Self {
        let mut metas = vec![MetaRequest::Header, MetaRequest::VideoCrop];
        if config.request_cursor_meta {
            metas.push(MetaRequest::Cursor(Range {
                default: config.cursor_size_default,
                min: config.cursor_size_min,
                max: config.cursor_size_max,
            }));
        }

        Self {
            buffers: Range {
                default: config.preferred_buffers,
                min: config.min_buffers,
                max: config.max_buffers,
            },
            blocks: 1,
            size: format.buffer_size,
            stride: format.buffer_stride,
            memory: MemoryType::MemPtr,
            metas,
        }
    }
}

/// Format negotiation state machine
#[derive(Debug, Default)]
pub struct Negotiator {
    raw_latched: bool,
}

impl Negotiator {
    /// Create a negotiator for a fresh stream
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a raw format was already accepted
    pub fn is_latched(&self) -> bool {
        self.raw_latched
    }

    /// Derive the geometry of a proposal
    ///
    /// `position` is the out-of-band frame size used by float proposals.
    /// Returns `Ok(None)` when the proposal is ignored because a raw format
    /// is already latched.
    pub fn negotiate(
        &self,
        proposal: &FormatProposal,
        position: Option<VideoSize>,
    ) -> Result<Option<VideoGeometry>, NegotiationError> {
        if proposal.media_type != MediaType::Video {
            return Err(NegotiationError::UnsupportedMediaType(proposal.media_type));
        }

        let (encoding, surface_format, size, multiplier) = match proposal.media_subtype {
            MediaSubtype::Raw => {
                if self.raw_latched {
                    debug!("Raw format already negotiated, ignoring {:?}", proposal.format);
                    return Ok(None);
                }

                let (encoding, surface_format) = match proposal.format {
                    Some(VideoFormat::I420) => (SourceEncoding::PlanarYuv, SurfaceFormat::Iyuv),
                    Some(VideoFormat::YV12) => (SourceEncoding::PlanarYuv, SurfaceFormat::Yv12),
                    _ => (SourceEncoding::PackedBgra, SurfaceFormat::Bgra32),
                };
                (encoding, surface_format, proposal.size.unwrap_or_default(), 1)
            }
            MediaSubtype::Dsp => {
                if proposal.format != Some(VideoFormat::RGBAF32) {
                    return Err(NegotiationError::UnsupportedEncoding {
                        subtype: proposal.media_subtype,
                        format: proposal.format,
                    });
                }
                let size = position.ok_or(NegotiationError::DeferredMissingContext)?;
                (SourceEncoding::FloatRgba, SurfaceFormat::Rgba32, size, 4)
            }
            MediaSubtype::Other(_) => {
                return Err(NegotiationError::UnsupportedEncoding {
                    subtype: proposal.media_subtype,
                    format: proposal.format,
                });
            }
        };

        if size.is_empty() {
            return Err(NegotiationError::InvalidGeometry {
                width: size.width,
                height: size.height,
            });
        }

        info!(
            "Negotiated {:?} {:?} -> {:?} surface, size {}",
            proposal.media_subtype, proposal.format, surface_format, size
        );

        Ok(Some(VideoGeometry {
            encoding,
            surface_format,
            width: size.width,
            height: size.height,
            multiplier,
            framerate: proposal.framerate,
        }))
    }

    /// Record that a geometry was installed
    ///
    /// Latches raw formats.
    pub fn mark_accepted(&mut self, geometry: &VideoGeometry) {
        if geometry.encoding != SourceEncoding::FloatRgba {
            self.raw_latched = true;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_raw_packed() {
        let negotiator = Negotiator::new();
        let geometry = negotiator
            .negotiate(&FormatProposal::raw(VideoFormat::BGRx, 1920, 1080), None)
            .expect("accepted")
            .expect("not latched");

        assert_eq!(geometry.encoding, SourceEncoding::PackedBgra);
        assert_eq!(geometry.surface_format, SurfaceFormat::Bgra32);
        assert_eq!(geometry.size(), VideoSize::new(1920, 1080));
        assert_eq!(geometry.multiplier, 1);
    }

    #[test]
    fn test_raw_planar() {
        let negotiator = Negotiator::new();
        let geometry = negotiator
            .negotiate(&FormatProposal::raw(VideoFormat::YV12, 640, 480), None)
            .expect("accepted")
            .expect("not latched");

        assert_eq!(geometry.encoding, SourceEncoding::PlanarYuv);
        assert_eq!(geometry.surface_format, SurfaceFormat::Yv12);
    }

    #[test]
    fn test_raw_latch() {
        let mut negotiator = Negotiator::new();
        let proposal = FormatProposal::raw(VideoFormat::BGRA, 800, 600);

        let geometry = negotiator.negotiate(&proposal, None).expect("ok").expect("geometry");
        assert!(!negotiator.is_latched());
        negotiator.mark_accepted(&geometry);
        assert!(negotiator.is_latched());

        assert_eq!(negotiator.negotiate(&proposal, None), Ok(None));
    }

    #[test]
    fn test_dsp_uses_position() {
        let mut negotiator = Negotiator::new();
        let proposal = FormatProposal::dsp(VideoFormat::RGBAF32);

        assert_eq!(
            negotiator.negotiate(&proposal, None),
            Err(NegotiationError::DeferredMissingContext)
        );

        let geometry = negotiator
            .negotiate(&proposal, Some(VideoSize::new(320, 240)))
            .expect("ok")
            .expect("geometry");
        assert_eq!(geometry.surface_format, SurfaceFormat::Rgba32);
        assert_eq!(geometry.size(), VideoSize::new(320, 240));
        assert_eq!(geometry.multiplier, 4);

        // Float formats never latch
        negotiator.mark_accepted(&geometry);
        assert!(!negotiator.is_latched());
    }

    #[test]
    fn test_dsp_requires_float() {
        let negotiator = Negotiator::new();
        let result = negotiator.negotiate(
            &FormatProposal::dsp(VideoFormat::BGRA),
            Some(VideoSize::new(320, 240)),
        );
        assert!(matches!(result, Err(NegotiationError::UnsupportedEncoding { .. })));
    }

    #[test]
    fn test_rejections() {
        let negotiator = Negotiator::new();

        let mut audio = FormatProposal::raw(VideoFormat::BGRA, 10, 10);
        audio.media_type = MediaType::Audio;
        assert_eq!(
            negotiator.negotiate(&audio, None),
            Err(NegotiationError::UnsupportedMediaType(MediaType::Audio))
        );

        let mut encoded = FormatProposal::raw(VideoFormat::BGRA, 10, 10);
        encoded.media_subtype = MediaSubtype::Other(0x20001);
        assert!(matches!(
            negotiator.negotiate(&encoded, None),
            Err(NegotiationError::UnsupportedEncoding { .. })
        ));

        assert_eq!(
            negotiator.negotiate(&FormatProposal::raw(VideoFormat::BGRA, 0, 1080), None),
            Err(NegotiationError::InvalidGeometry { width: 0, height: 1080 })
        );
    }

    #[test]
    fn test_buffer_requirements() {
        let geometry = VideoGeometry {
            encoding: SourceEncoding::PackedBgra,
            surface_format: SurfaceFormat::Bgra32,
            width: 1920,
            height: 1080,
            multiplier: 1,
            framerate: None,
        };
        let format = StreamFormat::from_geometry(&geometry, 7680);

        let reqs = BufferRequirements::for_format(&format, &PlayerConfig::default());
        assert_eq!(reqs.buffers, Range { default: 8, min: 2, max: 64 });
        assert_eq!(reqs.blocks, 1);
        assert_eq!(reqs.size, 7680 * 1080);
        assert_eq!(reqs.stride, 7680);
        assert_eq!(reqs.memory, MemoryType::MemPtr);
        assert_eq!(reqs.metas.len(), 3);
        assert!(matches!(reqs.metas[2], MetaRequest::Cursor(r) if r.max == VideoSize::new(256, 256)));

        let config = PlayerConfig::builder().request_cursor_meta(false).build();
        let reqs = BufferRequirements::for_format(&format, &config);
        assert_eq!(reqs.metas, vec![MetaRequest::Header, MetaRequest::VideoCrop]);
    }
}
