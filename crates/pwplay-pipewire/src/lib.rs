//! # pwplay-pipewire
//!
//! PipeWire transport for [`pwplay_core`]: connects an input video stream,
//! negotiates raw or float formats, converts the newest buffer of every
//! `process` callback into a display surface and presents it at a fixed
//! rate.
//!
//! # Requirements
//!
//! - **Linux** with PipeWire installed and running
//! - **PipeWire development libraries**: `libpipewire-0.3-dev` (Debian/Ubuntu) or `pipewire-devel` (Fedora)
//!
//! # Quick Start
//!
//! ```rust,ignore
//! use pwplay_core::{MemoryRenderer, PlayerConfig};
//! use pwplay_pipewire::Player;
//!
//! pwplay_pipewire::init();
//!
//! let player = Player::new(PlayerConfig::default())?;
//! let renderer = MemoryRenderer::new();
//! let report = player.run(None, renderer.clone(), renderer)?;
//! println!("Stopped: {}", report.exit);
//!
//! pwplay_pipewire::deinit();
//! ```
//!
//! # Offered Formats
//!
//! | Subtype | Formats | Size |
//! |---------|---------|------|
//! | raw | BGRx, BGRA, I420, YV12 | negotiated, 1x1 to 8192x8192 |
//! | dsp | RGBA f32 | from the position IO area |

// =============================================================================
// CORE MODULES
// =============================================================================

pub mod buffer;
pub mod error;
pub mod player;
pub mod pod;

// =============================================================================
// RE-EXPORTS
// =============================================================================

pub use buffer::{RawBuffer, StreamQueue};
pub use error::{PipeWireError, Result};
pub use player::{stream_state, PlaybackReport, Player};

// =============================================================================
// CRATE-LEVEL ITEMS
// =============================================================================

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Initialize the PipeWire library
///
/// Call once at startup, before [`Player::run`].
pub fn init() {
    pipewire::init();
}

/// Deinitialize the PipeWire library
///
/// Call at shutdown once every player has returned.
pub fn deinit() {
    // SAFETY: callers only deinit after all PipeWire objects were dropped;
    // Player::run drops everything it creates before returning.
    unsafe {
        pipewire::deinit();
    }
}
