//! Player Configuration
//!
//! Buffer negotiation limits, render pacing and stream identity, with a
//! builder pattern for ergonomic construction.
//!
//! # Examples
//!
//! ```rust
//! use pwplay_core::PlayerConfig;
//!
//! // Using builder pattern
//! let config = PlayerConfig::builder()
//!     .preferred_buffers(4)
//!     .target_fps(120)
//!     .request_cursor_meta(false)
//!     .build();
//!
//! // Using struct literal with defaults
//! let config = PlayerConfig {
//!     target_fps: 30,
//!     ..Default::default()
//! };
//! ```

use std::time::Duration;

use crate::error::{PwPlayError, Result};
use crate::format::VideoSize;

/// Configuration for capture playback
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    /// Minimum number of buffers the transport may allocate (default: 2)
    pub min_buffers: u32,

    /// Preferred number of buffers (default: 8)
    ///
    /// More buffers absorb bursts from the source; only the newest is ever
    /// converted, so extra buffers do not add latency.
    pub preferred_buffers: u32,

    /// Maximum number of buffers (default: 64)
    pub max_buffers: u32,

    /// Presentation rate in Hz (default: 60)
    pub target_fps: u32,

    /// Ask the transport for cursor metadata (default: true)
    ///
    /// The cursor bitmap is negotiated but not composited.
    pub request_cursor_meta: bool,

    /// Smallest cursor bitmap accepted (default: 1x1)
    pub cursor_size_min: VideoSize,

    /// Preferred cursor bitmap size (default: 64x64)
    pub cursor_size_default: VideoSize,

    /// Largest cursor bitmap accepted (default: 256x256)
    pub cursor_size_max: VideoSize,

    /// Stream name announced to the transport (default: "pwplay")
    pub stream_name: String,

    /// Media role announced to the transport (default: "Screen")
    pub media_role: String,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        Self {
            min_buffers: 2,
            preferred_buffers: 8,
            max_buffers: 64,
            target_fps: crate::DEFAULT_FPS,
            request_cursor_meta: true,
            cursor_size_min: VideoSize::new(1, 1),
            cursor_size_default: VideoSize::new(64, 64),
            cursor_size_max: VideoSize::new(256, 256),
            stream_name: "pwplay".to_string(),
            media_role: "Screen".to_string(),
        }
    }
}

impl PlayerConfig {
    /// Create a new configuration builder
    #[must_use]
    pub fn builder() -> PlayerConfigBuilder {
        PlayerConfigBuilder::default()
    }

    /// Interval between two presents
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.target_fps.max(1)
    }

    /// Validate configuration and return any issues
    ///
    /// Returns `Ok(())` if configuration is valid, or a list of issues.
    pub fn validate(&self) -> std::result::Result<(), Vec<String>> {
        let mut issues = Vec::new();

        if self.min_buffers == 0 {
            issues.push("min_buffers must be at least 1".to_string());
        }

        if self.preferred_buffers < self.min_buffers || self.preferred_buffers > self.max_buffers {
            issues.push("preferred_buffers must lie between min_buffers and max_buffers".to_string());
        }

        if self.target_fps == 0 || self.target_fps > 1000 {
            issues.push("target_fps must be between 1 and 1000".to_string());
        }

        if self.request_cursor_meta {
            let ordered = |a: VideoSize, b: VideoSize| a.width <= b.width && a.height <= b.height;
            if self.cursor_size_min.is_empty()
                || !ordered(self.cursor_size_min, self.cursor_size_default)
                || !ordered(self.cursor_size_default, self.cursor_size_max)
            {
                issues.push("cursor sizes must be non-empty and ordered min <= default <= max".to_string());
            }
        }

        if self.stream_name.is_empty() {
            issues.push("stream_name cannot be empty".to_string());
        }

        if issues.is_empty() {
            Ok(())
        } else {
            Err(issues)
        }
    }

    /// Validate, folding every issue into one [`PwPlayError::InvalidConfig`]
    pub fn check(&self) -> Result<()> {
        self.validate()
            .map_err(|issues| PwPlayError::invalid_config(issues.join("; ")))
    }
}

/// Builder for [`PlayerConfig`]
///
/// Provides a fluent interface for constructing configuration.
#[derive(Debug, Clone, Default)]
pub struct PlayerConfigBuilder {
    min_buffers: Option<u32>,
    preferred_buffers: Option<u32>,
    max_buffers: Option<u32>,
    target_fps: Option<u32>,
    request_cursor_meta: Option<bool>,
    cursor_size_default: Option<VideoSize>,
    stream_name: Option<String>,
    media_role: Option<String>,
}

impl PlayerConfigBuilder {
    /// Set minimum buffer count
    #[must_use]
    pub fn min_buffers(mut self, count: u32) -> Self {
        self.min_buffers = Some(count);
        self
    }

    /// Set preferred buffer count
    #[must_use]
    pub fn preferred_buffers(mut self, count: u32) -> Self {
        self.preferred_buffers = Some(count);
        self
    }

    /// Set maximum buffer count
    #[must_use]
    pub fn max_buffers(mut self, count: u32) -> Self {
        self.max_buffers = Some(count);
        self
    }

    /// Set presentation rate
    #[must_use]
    pub fn target_fps(mut self, fps: u32) -> Self {
        self.target_fps = Some(fps);
        self
    }

    /// Set whether cursor metadata is requested
    #[must_use]
    pub fn request_cursor_meta(mut self, enable: bool) -> Self {
        self.request_cursor_meta = Some(enable);
        self
    }

    /// Set preferred cursor bitmap size
    #[must_use]
    pub fn cursor_size(mut self, width: u32, height: u32) -> Self {
        self.cursor_size_default = Some(VideoSize::new(width, height));
        self
    }

    /// Set stream name
    #[must_use]
    pub fn stream_name(mut self, name: impl Into<String>) -> Self {
        self.stream_name = Some(name.into());
        self
    }

    /// Set media role
    #[must_use]
    pub fn media_role(mut self, role: impl Into<String>) -> Self {
        self.media_role = Some(role.into());
        self
    }

    /// Build the configuration
    ///
    /// Returns a [`PlayerConfig`] with builder values overriding defaults.
    #[must_use]
    pub fn build(self) -> PlayerConfig {
        let defaults = PlayerConfig::default();

        PlayerConfig {
            min_buffers: self.min_buffers.unwrap_or(defaults.min_buffers),
            preferred_buffers: self.preferred_buffers.unwrap_or(defaults.preferred_buffers),
            max_buffers: self.max_buffers.unwrap_or(defaults.max_buffers),
            target_fps: self.target_fps.unwrap_or(defaults.target_fps),
            request_cursor_meta: self
                .request_cursor_meta
                .unwrap_or(defaults.request_cursor_meta),
            cursor_size_min: defaults.cursor_size_min,
            cursor_size_default: self
                .cursor_size_default
                .unwrap_or(defaults.cursor_size_default),
            cursor_size_max: defaults.cursor_size_max,
            stream_name: self.stream_name.unwrap_or(defaults.stream_name),
            media_role: self.media_role.unwrap_or(defaults.media_role),
        }
    }
}
