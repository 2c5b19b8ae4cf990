//! Capture session
//!
//! [`CaptureSession`] owns everything the capture context mutates: the
//! negotiator, the surface allocator and the writing side of the shared
//! frame. The transport adapter translates its callbacks into
//! [`TransportEvent`]s, feeds them to [`CaptureSession::handle`] and
//! executes the [`TransportRequest`]s that come back.
//!
//! # Lifecycle
//!
//! ```text
//! Connecting -> Paused --(SetActive(true))--> Streaming
//!                   \                             |
//!                    +------> Unconnected / Error <+  => Shutdown
//! ```
//!
//! # Example
//!
//! ```rust
//! use pwplay_core::{
//!     CaptureSession, FormatProposal, MemoryRenderer, ParamUpdate, PlayerConfig,
//!     TransportEvent, TransportRequest, VideoFormat,
//! };
//!
//! let mut session = CaptureSession::new(PlayerConfig::default(), MemoryRenderer::new());
//! let requests = session.handle(TransportEvent::ParamChanged(ParamUpdate::Format(Some(
//!     FormatProposal::raw(VideoFormat::BGRx, 1280, 720),
//! ))));
//!
//! assert!(matches!(requests.as_slice(), [TransportRequest::UpdateParams(_)]));
//! ```

use tracing::{debug, error, info, trace, warn};

use crate::config::PlayerConfig;
use crate::convert::convert_into_state;
use crate::error::{ConversionError, NegotiationError, RenderError, TransportFatal};
use crate::format::{FormatProposal, ParamUpdate, StreamFormat, VideoGeometry, VideoSize};
use crate::frame::{drain_latest, BufferQueue, SharedFrame};
use crate::negotiate::{BufferRequirements, Negotiator};
use crate::render::{Surface, SurfaceAllocator};

/// Error code attached to rejected formats (`-EINVAL`)
pub const INVALID_ARGUMENT: i32 = -22;

/// Stream lifecycle states reported by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamState {
    /// The stream failed
    Error(String),
    /// Not connected to a node
    Unconnected,
    /// Connection in progress
    Connecting,
    /// Connected, not moving buffers
    Paused,
    /// Buffers are flowing
    Streaming,
}

/// Transport callbacks, as seen by the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// The stream changed state
    StateChanged {
        /// Previous state
        old: StreamState,
        /// New state
        new: StreamState,
    },

    /// A stream parameter changed
    ParamChanged(ParamUpdate),

    /// The position IO area changed; carries the current video size
    PositionChanged(Option<VideoSize>),
}

/// Actions the adapter must perform on behalf of the session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportRequest {
    /// Publish buffer parameters for the accepted format
    UpdateParams(BufferRequirements),

    /// Activate or deactivate the stream
    SetActive(bool),

    /// Report a rejected format to the transport
    ReportError {
        /// Negative errno
        code: i32,
        /// Short description
        message: String,
    },

    /// Quit the main loop and tear down
    Shutdown(TransportFatal),
}

/// Session counters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Formats installed
    pub formats_accepted: u64,
    /// Raw proposals ignored because a format is latched
    pub proposals_ignored: u64,
    /// Proposals rejected
    pub proposals_rejected: u64,
    /// Float proposals parked until the position context arrives
    pub proposals_deferred: u64,
    /// Surfaces allocated
    pub surfaces_allocated: u64,
    /// Buffers converted
    pub frames_converted: u64,
    /// Buffers requeued unconverted by the latest-wins drain
    pub frames_skipped: u64,
    /// Buffers whose conversion failed
    pub frames_dropped: u64,
}

/// Capture-side state of one playback session
pub struct CaptureSession<A: SurfaceAllocator> {
    config: PlayerConfig,
    negotiator: Negotiator,
    allocator: A,
    frame: SharedFrame<A::Surface>,
    position: Option<VideoSize>,
    deferred: Option<FormatProposal>,
    stats: SessionStats,
}

impl<A: SurfaceAllocator> CaptureSession<A> {
    /// Create a session for a fresh stream
    pub fn new(config: PlayerConfig, allocator: A) -> Self {
        Self {
            config,
            negotiator: Negotiator::new(),
            allocator,
            frame: SharedFrame::new(),
            position: None,
            deferred: None,
            stats: SessionStats::default(),
        }
    }

    /// Handle to the shared frame, for the render pacer
    pub fn frame(&self) -> SharedFrame<A::Surface> {
        self.frame.clone()
    }

    /// Session configuration
    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    /// Session counters
    pub fn stats(&self) -> &SessionStats {
        &self.stats
    }

    /// Whether a float proposal waits for the position context
    pub fn has_deferred(&self) -> bool {
        self.deferred.is_some()
    }

    /// Handle one transport event
    pub fn handle(&mut self, event: TransportEvent) -> Vec<TransportRequest> {
        match event {
            TransportEvent::StateChanged { old, new } => self.on_state_changed(&old, new),
            TransportEvent::ParamChanged(update) => self.on_param_changed(update),
            TransportEvent::PositionChanged(size) => self.on_position_changed(size),
        }
    }

    /// Convert the newest queued buffer
    ///
    /// Every dequeued buffer is given back to the transport, converted or
    /// not.
    pub fn process<Q: BufferQueue>(&mut self, queue: &mut Q) -> Result<(), ConversionError> {
        let (latest, skipped) = drain_latest(queue);
        self.stats.frames_skipped += skipped as u64;

        let Some(mut buffer) = latest else {
            return Err(ConversionError::OutOfBuffers);
        };

        let result = {
            let mut state = self.frame.lock();
            convert_into_state(&mut buffer, &mut state)
        };
        queue.requeue(buffer);

        match result {
            Ok(()) => {
                self.stats.frames_converted += 1;
                trace!("Converted frame ({} skipped)", skipped);
            }
            Err(_) => self.stats.frames_dropped += 1,
        }
        result
    }

    fn on_state_changed(&mut self, old: &StreamState, new: StreamState) -> Vec<TransportRequest> {
        info!("Stream state changed: {:?} -> {:?}", old, new);

        match new {
            StreamState::Unconnected => {
                vec![TransportRequest::Shutdown(TransportFatal::Unconnected)]
            }
            StreamState::Error(msg) => {
                error!("Stream error: {}", msg);
                vec![TransportRequest::Shutdown(TransportFatal::StreamError(msg))]
            }
            StreamState::Paused => vec![TransportRequest::SetActive(true)],
            StreamState::Connecting | StreamState::Streaming => Vec::new(),
        }
    }

    fn on_param_changed(&mut self, update: ParamUpdate) -> Vec<TransportRequest> {
        match update {
            ParamUpdate::Format(Some(proposal)) => self.negotiate(proposal),
            ParamUpdate::Format(None) => {
                debug!("Format cleared");
                Vec::new()
            }
            other => {
                debug!("Ignoring param {:?}", other);
                Vec::new()
            }
        }
    }

    fn on_position_changed(&mut self, size: Option<VideoSize>) -> Vec<TransportRequest> {
        self.position = size.filter(|s| !s.is_empty());
        debug!("Position context: {:?}", self.position);

        match (self.position, self.deferred.take()) {
            (Some(_), Some(proposal)) => {
                debug!("Retrying deferred format");
                self.negotiate(proposal)
            }
            (None, deferred) => {
                self.deferred = deferred;
                Vec::new()
            }
            (Some(_), None) => Vec::new(),
        }
    }

    fn negotiate(&mut self, proposal: FormatProposal) -> Vec<TransportRequest> {
        self.deferred = None;

        let geometry = match self.negotiator.negotiate(&proposal, self.position) {
            Ok(Some(geometry)) => geometry,
            Ok(None) => {
                self.stats.proposals_ignored += 1;
                return Vec::new();
            }
            Err(NegotiationError::DeferredMissingContext) => {
                debug!("No position context yet, deferring {:?}", proposal.format);
                self.stats.proposals_deferred += 1;
                self.deferred = Some(proposal);
                return Vec::new();
            }
            Err(e) => return self.reject(&e),
        };

        match self.install(&geometry) {
            Ok(format) => {
                self.negotiator.mark_accepted(&geometry);
                self.stats.formats_accepted += 1;
                vec![TransportRequest::UpdateParams(BufferRequirements::for_format(
                    &format,
                    &self.config,
                ))]
            }
            Err(e) => {
                error!("Failed to create surface: {}", e);
                self.stats.proposals_rejected += 1;
                vec![TransportRequest::ReportError {
                    code: INVALID_ARGUMENT,
                    message: "can't create surface".to_string(),
                }]
            }
        }
    }

    fn reject(&mut self, e: &NegotiationError) -> Vec<TransportRequest> {
        self.stats.proposals_rejected += 1;

        if !e.should_report() {
            debug!("Skipping proposal: {}", e);
            return Vec::new();
        }

        warn!("Rejecting proposal: {}", e);
        vec![TransportRequest::ReportError {
            code: INVALID_ARGUMENT,
            message: e.transport_message().to_string(),
        }]
    }

    /// Install `geometry` into the shared frame, under one lock
    ///
    /// The current surface is kept when it already has the right size and
    /// layout. On failure nothing is changed.
    fn install(&mut self, geometry: &VideoGeometry) -> Result<StreamFormat, RenderError> {
        let mut state = self.frame.lock();

        let reusable = state.surface().is_some_and(|s| {
            s.width() == geometry.width
                && s.height() == geometry.height
                && s.format() == geometry.surface_format
        });

        let (surface, stride) = if reusable {
            let stride = state.surface().map_or(0, |s| s.stride());
            debug!("Reusing {}x{} surface", geometry.width, geometry.height);
            (None, stride)
        } else {
            let surface = self.allocator.create_surface(
                geometry.width,
                geometry.height,
                geometry.surface_format,
            )?;
            self.stats.surfaces_allocated += 1;
            let stride = surface.stride();
            (Some(surface), stride)
        };

        let format = StreamFormat::from_geometry(geometry, stride);
        state.install(format, surface);

        info!(
            "Installed {:?} format {}x{}, buffer size {} stride {}",
            format.surface_format, format.width, format.height, format.buffer_size, format.buffer_stride
        );
        Ok(format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{MediaType, SurfaceFormat, VideoFormat};
    use crate::render::{MemoryRenderer, MemorySurface};

    fn session() -> CaptureSession<MemoryRenderer> {
        CaptureSession::new(PlayerConfig::default(), MemoryRenderer::new())
    }

    fn format_event(proposal: FormatProposal) -> TransportEvent {
        TransportEvent::ParamChanged(ParamUpdate::Format(Some(proposal)))
    }

    fn state_event(new: StreamState) -> TransportEvent {
        TransportEvent::StateChanged {
            old: StreamState::Connecting,
            new,
        }
    }

    struct FailingAllocator;

    impl SurfaceAllocator for FailingAllocator {
        type Surface = MemorySurface;

        fn create_surface(
            &mut self,
            _width: u32,
            _height: u32,
            _format: SurfaceFormat,
        ) -> Result<MemorySurface, RenderError> {
            Err(RenderError::SurfaceCreation("out of memory".to_string()))
        }
    }

    #[test]
    fn test_state_transitions() {
        let mut session = session();

        assert_eq!(
            session.handle(state_event(StreamState::Paused)),
            vec![TransportRequest::SetActive(true)]
        );
        assert!(session.handle(state_event(StreamState::Streaming)).is_empty());
        assert_eq!(
            session.handle(state_event(StreamState::Unconnected)),
            vec![TransportRequest::Shutdown(TransportFatal::Unconnected)]
        );
        assert_eq!(
            session.handle(state_event(StreamState::Error("node gone".to_string()))),
            vec![TransportRequest::Shutdown(TransportFatal::StreamError(
                "node gone".to_string()
            ))]
        );
    }

    #[test]
    fn test_accept_raw_format() {
        let mut session = session();
        let requests = session.handle(format_event(FormatProposal::raw(VideoFormat::BGRx, 640, 480)));

        let [TransportRequest::UpdateParams(reqs)] = requests.as_slice() else {
            panic!("expected buffer params, got {:?}", requests);
        };
        assert_eq!(reqs.size, 640 * 4 * 480);
        assert_eq!(reqs.stride, 640 * 4);

        let format = session.frame().format().expect("format installed");
        assert_eq!(format.surface_format, SurfaceFormat::Bgra32);
        assert_eq!(session.stats().formats_accepted, 1);
        assert_eq!(session.stats().surfaces_allocated, 1);
    }

    #[test]
    fn test_non_video_is_silent() {
        let mut session = session();
        let mut proposal = FormatProposal::raw(VideoFormat::BGRx, 640, 480);
        proposal.media_type = MediaType::Audio;

        assert!(session.handle(format_event(proposal)).is_empty());
        assert_eq!(session.stats().proposals_rejected, 1);
    }

    #[test]
    fn test_unsupported_dsp_reported() {
        let mut session = session();
        session.handle(TransportEvent::PositionChanged(Some(VideoSize::new(64, 64))));

        let requests = session.handle(format_event(FormatProposal::dsp(VideoFormat::BGRA)));
        assert_eq!(
            requests,
            vec![TransportRequest::ReportError {
                code: INVALID_ARGUMENT,
                message: "unknown pixel format".to_string(),
            }]
        );
        assert!(session.frame().format().is_none());
    }

    #[test]
    fn test_deferred_float_retried_on_position() {
        let mut session = session();

        assert!(session
            .handle(format_event(FormatProposal::dsp(VideoFormat::RGBAF32)))
            .is_empty());
        assert!(session.has_deferred());

        // An empty size is no context
        assert!(session
            .handle(TransportEvent::PositionChanged(Some(VideoSize::new(0, 0))))
            .is_empty());
        assert!(session.has_deferred());

        let requests = session.handle(TransportEvent::PositionChanged(Some(VideoSize::new(320, 200))));
        let [TransportRequest::UpdateParams(reqs)] = requests.as_slice() else {
            panic!("expected buffer params, got {:?}", requests);
        };
        assert_eq!(reqs.stride, 320 * 4 * 4);
        assert_eq!(reqs.size, 320 * 4 * 200 * 4);
        assert!(!session.has_deferred());
        assert_eq!(session.stats().proposals_deferred, 1);
    }

    #[test]
    fn test_float_renegotiation_reuses_surface() {
        let mut session = session();
        session.handle(TransportEvent::PositionChanged(Some(VideoSize::new(32, 32))));

        let proposal = FormatProposal::dsp(VideoFormat::RGBAF32);
        assert_eq!(session.handle(format_event(proposal)).len(), 1);
        assert_eq!(session.handle(format_event(proposal)).len(), 1);
        assert_eq!(session.stats().surfaces_allocated, 1);

        session.handle(TransportEvent::PositionChanged(Some(VideoSize::new(64, 32))));
        assert_eq!(session.handle(format_event(proposal)).len(), 1);
        assert_eq!(session.stats().surfaces_allocated, 2);
    }

    #[test]
    fn test_allocation_failure_keeps_state() {
        let mut session = CaptureSession::new(PlayerConfig::default(), FailingAllocator);
        let requests = session.handle(format_event(FormatProposal::raw(VideoFormat::BGRx, 64, 64)));

        assert!(matches!(requests.as_slice(), [TransportRequest::ReportError { .. }]));
        assert!(session.frame().format().is_none());

        // Not latched, so the next proposal is negotiated again
        let requests = session.handle(format_event(FormatProposal::raw(VideoFormat::BGRx, 64, 64)));
        assert!(matches!(requests.as_slice(), [TransportRequest::ReportError { .. }]));
        assert_eq!(session.stats().proposals_ignored, 0);
    }

    #[test]
    fn test_ignored_params() {
        let mut session = session();
        assert!(session.handle(TransportEvent::ParamChanged(ParamUpdate::Tag)).is_empty());
        assert!(session
            .handle(TransportEvent::ParamChanged(ParamUpdate::Format(None)))
            .is_empty());
        assert!(session
            .handle(TransportEvent::ParamChanged(ParamUpdate::Other(15)))
            .is_empty());
    }
}
