//! # pwplay-core
//!
//! Transport-independent core of a live screen capture player: format
//! negotiation, frame conversion into display surfaces, and fixed-rate
//! presentation on a render thread.
//!
//! This crate is part of the pwplay workspace. The PipeWire bindings live in
//! `pwplay-pipewire`, which translates stream callbacks into
//! [`TransportEvent`]s and drives a [`CaptureSession`]. Keeping them apart
//! means everything here builds and tests without PipeWire installed.
//!
//! # Features
//!
//! - **Format Negotiation**: Raw packed, raw planar YUV and float (dsp) formats
//! - **Latest-Wins Delivery**: Only the newest queued buffer is converted
//! - **Stride Tolerance**: Source and surface row padding may differ
//! - **Crop Metadata**: Presentation follows the producer's crop region
//! - **Drift-Free Pacing**: Deadlines advance from the previous deadline
//!
//! # Quick Start
//!
//! ```rust
//! use pwplay_core::{
//!     CaptureSession, MemoryRenderer, PacerHandle, PlayerConfig, RenderPacer,
//! };
//!
//! # fn example() -> pwplay_core::Result<()> {
//! let config = PlayerConfig::default();
//! let renderer = MemoryRenderer::new();
//!
//! let session = CaptureSession::new(config.clone(), renderer.clone());
//! let pacer = RenderPacer::new(session.frame(), renderer, config.frame_interval());
//! let handle = PacerHandle::spawn(pacer)?;
//!
//! // ... feed transport events to the session ...
//!
//! let stats = handle.shutdown()?;
//! println!("Presented {} frames", stats.presents);
//! # Ok(())
//! # }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────┐         ┌────────────────────────────┐
//! │  Transport thread          │         │  Render thread             │
//! │                            │         │  (current-thread runtime)  │
//! │  callbacks                 │         │                            │
//! │     │                      │         │  FrameClock                │
//! │     ▼                      │         │     │ sleep_until          │
//! │  CaptureSession            │         │     ▼                      │
//! │   ├─ Negotiator            │         │  RenderPacer::tick         │
//! │   ├─ SurfaceAllocator      │         │     │                      │
//! │   └─ convert_into_state ───┼── lock ─┼─────┘ Presenter::present   │
//! │                            │  Shared │                            │
//! │                            │  Frame  │                            │
//! └────────────────────────────┘         └────────────────────────────┘
//! ```
//!
//! [`SharedFrame`] is the only state both threads touch. Every access holds
//! its mutex for the whole critical section.

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod config;
pub mod convert;
pub mod error;
pub mod format;
pub mod frame;
pub mod negotiate;
pub mod pacer;
pub mod render;
pub mod session;

// =============================================================================
// RE-EXPORTS - PRIMARY API
// =============================================================================

// Session (primary entry point)
pub use session::{
    CaptureSession, SessionStats, StreamState, TransportEvent, TransportRequest,
    INVALID_ARGUMENT,
};

// Configuration
pub use config::{PlayerConfig, PlayerConfigBuilder};

// Errors
pub use error::{ConversionError, NegotiationError, PwPlayError, RenderError, Result, TransportFatal};

// Format types
pub use format::{
    FormatProposal, Fraction, MediaSubtype, MediaType, ParamUpdate, SourceEncoding, StreamFormat,
    SurfaceFormat, VideoFormat, VideoGeometry, VideoSize,
};

// Frame types
pub use frame::{drain_latest, BufferQueue, DisplayRect, FrameBuffer, FrameState, SharedFrame};

// Render pacing
pub use pacer::{FrameClock, PacerHandle, PacerStats, RenderPacer, TickOutcome};

// =============================================================================
// RE-EXPORTS - ADVANCED API
// =============================================================================

// Negotiation
pub use negotiate::{BufferRequirements, MemoryType, MetaRequest, Negotiator, Range};

// Conversion
pub use convert::{
    convert_float_rgba, convert_frame, convert_into_state, copy_packed, copy_planar,
    float_to_byte, resolve_source_stride,
};

// Renderer
pub use render::{
    MemoryRenderer, MemorySurface, Presenter, RendererStats, Surface, SurfaceAllocator,
    SurfaceWriter,
};

// =============================================================================
// CRATE-LEVEL ITEMS
// =============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default presentation rate in Hz
pub const DEFAULT_FPS: u32 = 60;
