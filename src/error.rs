//! Error types for guidecast.

use thiserror::Error;

/// Capture-device failures, kept apart so callers can prompt for permission
/// differently from a missing or busy device.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeviceError {
    #[error("Device permission denied: {message}")]
    PermissionDenied { message: String },

    #[error("Device unavailable: {message}")]
    Unavailable { message: String },
}

#[derive(Error, Debug)]
pub enum GuidecastError {
    // Configuration errors
    #[error("Invalid configuration value for {key}: {message}")]
    ConfigInvalidValue { key: String, message: String },

    #[error("Audio output target missing: {message}")]
    MissingOutputTarget { message: String },

    #[error("Invalid language code: {code:?}")]
    InvalidLanguage { code: String },

    // Upload validation errors
    #[error("Validation failed: {message}")]
    Validation { message: String },

    // Translation, synthesis, storage and network errors
    #[error("Transport error: {message}")]
    Transport { message: String },

    // Capture device errors
    #[error(transparent)]
    Device(#[from] DeviceError),

    // Clip playback state errors
    #[error("Invalid clip state: {message}")]
    State { message: String },

    // Audio decoding errors
    #[error("Audio decode failed: {message}")]
    Decode { message: String },

    // Transcript event errors
    #[error("Malformed transcript event: {message}")]
    Transcript { message: String },

    // Conferencing session errors
    #[error("Session error: {message}")]
    Session { message: String },

    #[error("Session store error: {message}")]
    Store { message: String },

    // General I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // Generic error for cases not covered above
    #[error("{0}")]
    Other(String),
}

impl GuidecastError {
    /// True when the error is a device permission denial.
    pub fn is_permission_denied(&self) -> bool {
        matches!(
            self,
            GuidecastError::Device(DeviceError::PermissionDenied { .. })
        )
    }
}

// Type alias for convenience
pub type Result<T> = std::result::Result<T, GuidecastError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_config_invalid_value_display() {
        let error = GuidecastError::ConfigInvalidValue {
            key: "bridge.gain".to_string(),
            message: "must be positive".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid configuration value for bridge.gain: must be positive"
        );
    }

    #[test]
    fn test_missing_output_target_display() {
        let error = GuidecastError::MissingOutputTarget {
            message: "no playback element bound".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Audio output target missing: no playback element bound"
        );
    }

    #[test]
    fn test_invalid_language_display() {
        let error = GuidecastError::InvalidLanguage {
            code: "e1".to_string(),
        };
        assert_eq!(error.to_string(), "Invalid language code: \"e1\"");
    }

    #[test]
    fn test_validation_display() {
        let error = GuidecastError::Validation {
            message: "file exceeds 20 MB".to_string(),
        };
        assert_eq!(error.to_string(), "Validation failed: file exceeds 20 MB");
    }

    #[test]
    fn test_transport_display() {
        let error = GuidecastError::Transport {
            message: "connection reset".to_string(),
        };
        assert_eq!(error.to_string(), "Transport error: connection reset");
    }

    #[test]
    fn test_device_permission_denied_display() {
        let error: GuidecastError = DeviceError::PermissionDenied {
            message: "NotAllowedError".to_string(),
        }
        .into();
        assert_eq!(
            error.to_string(),
            "Device permission denied: NotAllowedError"
        );
        assert!(error.is_permission_denied());
    }

    #[test]
    fn test_device_unavailable_display() {
        let error: GuidecastError = DeviceError::Unavailable {
            message: "device busy".to_string(),
        }
        .into();
        assert_eq!(error.to_string(), "Device unavailable: device busy");
        assert!(!error.is_permission_denied());
    }

    #[test]
    fn test_state_display() {
        let error = GuidecastError::State {
            message: "no clip uploaded for instruction".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Invalid clip state: no clip uploaded for instruction"
        );
    }

    #[test]
    fn test_decode_display() {
        let error = GuidecastError::Decode {
            message: "unsupported encoding audio/mpeg".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Audio decode failed: unsupported encoding audio/mpeg"
        );
    }

    #[test]
    fn test_transcript_display() {
        let error = GuidecastError::Transcript {
            message: "missing LanguageCode".to_string(),
        };
        assert_eq!(
            error.to_string(),
            "Malformed transcript event: missing LanguageCode"
        );
    }

    #[test]
    fn test_session_and_store_display() {
        let session = GuidecastError::Session {
            message: "meeting ended".to_string(),
        };
        assert_eq!(session.to_string(), "Session error: meeting ended");

        let store = GuidecastError::Store {
            message: "lock poisoned".to_string(),
        };
        assert_eq!(store.to_string(), "Session store error: lock poisoned");
    }

    #[test]
    fn test_other_display() {
        let error = GuidecastError::Other("unexpected error".to_string());
        assert_eq!(error.to_string(), "unexpected error");
    }

    #[test]
    fn test_from_io_error() {
        let io_error = io::Error::new(io::ErrorKind::NotFound, "file not found");
        let error: GuidecastError = io_error.into();
        assert!(error.to_string().contains("file not found"));
    }

    #[test]
    fn test_from_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("{broken").unwrap_err();
        let error: GuidecastError = json_error.into();
        assert!(error.to_string().starts_with("JSON error"));
    }

    #[test]
    fn test_error_source_chain_io() {
        let io_error = io::Error::new(io::ErrorKind::PermissionDenied, "access denied");
        let error: GuidecastError = io_error.into();

        let error_trait: &dyn std::error::Error = &error;
        assert!(error_trait.source().is_some());
    }

    #[test]
    fn test_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<GuidecastError>();
        assert_sync::<GuidecastError>();
    }

    #[test]
    fn test_error_debug_format() {
        let error = GuidecastError::State {
            message: "closing is empty".to_string(),
        };
        let debug_str = format!("{:?}", error);
        assert!(debug_str.contains("State"));
        assert!(debug_str.contains("closing is empty"));
    }
}
