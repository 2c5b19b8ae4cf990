//! Error types for capture playback
//!
//! Errors are split by the context that raises them. Negotiation and
//! conversion errors are per-event: the offending proposal or buffer is
//! discarded and playback continues. [`TransportFatal`] ends the session.

use thiserror::Error;

use crate::format::{MediaSubtype, MediaType, VideoFormat};

/// Reasons a format proposal could not be turned into a [`StreamFormat`].
///
/// [`StreamFormat`]: crate::format::StreamFormat
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NegotiationError {
    /// The proposal is not a video format
    ///
    /// Not reported back to the transport, the proposal is simply skipped.
    #[error("Unsupported media type: {0:?}")]
    UnsupportedMediaType(MediaType),

    /// No destination surface format exists for the proposed encoding
    #[error("Unsupported encoding: {subtype:?} / {format:?}")]
    UnsupportedEncoding {
        /// Proposed media subtype
        subtype: MediaSubtype,
        /// Proposed inner video format, if any was present
        format: Option<VideoFormat>,
    },

    /// The proposal resolved to a zero width or height
    #[error("Invalid geometry: {width}x{height}")]
    InvalidGeometry {
        /// Resolved width
        width: u32,
        /// Resolved height
        height: u32,
    },

    /// A float proposal arrived before the position context
    ///
    /// The proposal is kept and retried once the context is known.
    #[error("Format deferred until the position context is available")]
    DeferredMissingContext,
}

impl NegotiationError {
    /// Whether the transport should be told that negotiation failed
    pub fn should_report(&self) -> bool {
        matches!(
            self,
            Self::UnsupportedEncoding { .. } | Self::InvalidGeometry { .. }
        )
    }

    /// Message passed to the transport alongside the error code
    pub fn transport_message(&self) -> &'static str {
        match self {
            Self::UnsupportedEncoding { .. } => "unknown pixel format",
            Self::InvalidGeometry { .. } => "invalid size",
            Self::UnsupportedMediaType(_) => "unsupported media type",
            Self::DeferredMissingContext => "missing position",
        }
    }
}

/// Reasons a single buffer was dropped instead of converted
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConversionError {
    /// The buffer carries no mapped memory
    #[error("Buffer has no mapped data")]
    EmptyBuffer,

    /// The destination surface refused the write lock
    #[error("Failed to lock destination surface: {0}")]
    LockAcquisitionFailed(String),

    /// The transport had no queued buffer
    #[error("Out of buffers")]
    OutOfBuffers,

    /// A buffer arrived before any format was accepted
    #[error("No format negotiated yet")]
    NotNegotiated,
}

/// Errors raised by the renderer collaborator
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RenderError {
    /// Surface allocation failed
    #[error("Surface creation failed: {0}")]
    SurfaceCreation(String),

    /// The surface could not be locked for writing
    #[error("Surface lock failed: {0}")]
    Lock(String),

    /// Presentation to the display failed
    #[error("Present failed: {0}")]
    Present(String),
}

/// Conditions that terminate the session
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportFatal {
    /// The stream went back to the unconnected state
    #[error("Stream disconnected")]
    Unconnected,

    /// The stream reported an error state
    #[error("Stream error: {0}")]
    StreamError(String),

    /// The process received a termination signal
    #[error("Terminated by signal {0}")]
    Signal(i32),
}

/// Umbrella error for playback operations
#[derive(Error, Debug)]
pub enum PwPlayError {
    /// Format negotiation failed
    #[error(transparent)]
    Negotiation(#[from] NegotiationError),

    /// Frame conversion failed
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Renderer failure
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Transport terminated
    #[error(transparent)]
    Transport(#[from] TransportFatal),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Render thread could not be started or joined
    #[error("Render thread failed: {0}")]
    Thread(String),
}

impl PwPlayError {
    /// Create an invalid config error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a thread error
    pub(crate) fn thread(msg: impl Into<String>) -> Self {
        Self::Thread(msg.into())
    }

    /// Whether playback can continue after this error
    ///
    /// Per-event negotiation and conversion failures are transient,
    /// everything else ends the session.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Negotiation(_) | Self::Conversion(_))
    }
}

/// Result type for playback operations
pub type Result<T> = std::result::Result<T, PwPlayError>;
