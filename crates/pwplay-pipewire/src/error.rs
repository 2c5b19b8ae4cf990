//! Error types for the PipeWire adapter

use thiserror::Error;

use pwplay_core::{PwPlayError, TransportFatal};

/// PipeWire adapter errors
#[derive(Error, Debug)]
pub enum PipeWireError {
    /// PipeWire main loop, context or core setup failed
    #[error("PipeWire initialization failed: {0}")]
    InitializationFailed(String),

    /// Stream creation, listener registration or connection failed
    #[error("Stream setup failed: {0}")]
    StreamSetup(String),

    /// A parameter pod could not be built
    #[error("Failed to serialize pod: {0}")]
    PodSerialization(String),

    /// A parameter pod could not be read
    #[error("Failed to parse pod: {0}")]
    PodParse(String),

    /// The stream ended abnormally
    #[error("Stream terminated: {0}")]
    Terminated(TransportFatal),

    /// Core playback error
    #[error(transparent)]
    Core(#[from] PwPlayError),
}

impl From<pipewire::Error> for PipeWireError {
    fn from(e: pipewire::Error) -> Self {
        Self::StreamSetup(e.to_string())
    }
}

/// Result type for adapter operations
pub type Result<T> = std::result::Result<T, PipeWireError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PipeWireError::PodParse("missing media type".to_string());
        assert_eq!(err.to_string(), "Failed to parse pod: missing media type");

        let err = PipeWireError::Terminated(TransportFatal::Signal(15));
        assert_eq!(err.to_string(), "Stream terminated: Terminated by signal 15");
    }

    #[test]
    fn test_core_error_is_transparent() {
        let err: PipeWireError = PwPlayError::invalid_config("stream_name cannot be empty").into();
        assert_eq!(
            err.to_string(),
            "Invalid configuration: stream_name cannot be empty"
        );
    }
}
