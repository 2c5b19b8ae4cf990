//! # pwplay
//!
//! Live playback of PipeWire video streams.
//!
//! This crate provides a unified interface to the pwplay libraries:
//!
//! - **[`capture`]** - Format negotiation, frame conversion and render pacing
//! - **[`pipewire`]** - PipeWire stream transport and the capture main loop
//!
//! # Features
//!
//! The PipeWire transport links against the system PipeWire libraries, so it
//! is opt-in:
//!
//! ```toml
//! # Core only (no system libraries needed)
//! pwplay = "0.1"
//!
//! # With the PipeWire transport
//! pwplay = { version = "0.1", features = ["pipewire"] }
//! ```
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `pipewire` | No | PipeWire stream transport |
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use pwplay::prelude::*;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     pwplay::pipewire::init();
//!
//!     let player = Player::new(PlayerConfig::builder().target_fps(60).build())?;
//!     let renderer = MemoryRenderer::new();
//!     let report = player.run(None, renderer.clone(), renderer)?;
//!
//!     println!("Presented {} frames", report.pacer.presents);
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                        pwplay                         │
//! ├──────────────────────────┬────────────────────────────┤
//! │      pwplay-pipewire     │        pwplay-core         │
//! │                          │                            │
//! │  Player                  │  CaptureSession            │
//! │  StreamQueue / RawBuffer │  Negotiator / convert      │
//! │  pod                     │  RenderPacer / PacerHandle │
//! └────────────┬─────────────┴──────────────┬─────────────┘
//!              │                            │
//!              ▼                            ▼
//!         PipeWire API            Surface / Presenter traits
//! ```
//!
//! # Platform Support
//!
//! - **Linux only** for the `pipewire` feature
//! - The core builds anywhere

#![cfg_attr(docsrs, feature(doc_cfg))]

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// =============================================================================
// RE-EXPORTS
// =============================================================================

/// Transport-independent playback core.
///
/// See [`pwplay_core`] documentation for details.
pub use pwplay_core as capture;

/// PipeWire stream transport.
///
/// See [`pwplay_pipewire`] documentation for details.
#[cfg(feature = "pipewire")]
#[cfg_attr(docsrs, doc(cfg(feature = "pipewire")))]
pub use pwplay_pipewire as pipewire;

// =============================================================================
// PRELUDE - Common types for convenience
// =============================================================================

/// Prelude module with commonly used types.
///
/// ```rust
/// use pwplay::prelude::*;
/// ```
pub mod prelude {
    pub use pwplay_core::{
        CaptureSession, MemoryRenderer, PacerHandle, PlayerConfig, PwPlayError, RenderPacer,
        TransportEvent, TransportRequest,
    };

    #[cfg(feature = "pipewire")]
    pub use pwplay_pipewire::{PipeWireError, PlaybackReport, Player};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }

    #[test]
    fn test_capture_reexport() {
        let config = capture::PlayerConfig::default();
        assert_eq!(config.target_fps, capture::DEFAULT_FPS);
    }

    #[test]
    fn test_prelude() {
        use prelude::*;
        let _session = CaptureSession::new(PlayerConfig::default(), MemoryRenderer::new());
    }
}
