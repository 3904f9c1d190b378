//! guidecast - Live narrated event relay
//!
//! Captions a guide's speech, translates it for the audience and plays the
//! synthesized translation and pre-recorded clips into the live session.

#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]
#![warn(clippy::let_underscore_must_use)]

pub mod audio;
pub mod bridge;
pub mod config;
pub mod defaults;
pub mod error;
pub mod language;
pub mod pipeline;
pub mod session;
pub mod transcript;
pub mod translate;

// Collaborator seams
pub use bridge::ObjectStorage;
pub use session::{ConferencingSession, SessionFactory, SessionStore, VoiceIsolation};
pub use translate::SpeechTranslator;

// Core components
pub use bridge::{AudioBridge, ClipCategory, ClipFile, ClipState, SpeechPlayback, UploadedClip};
pub use session::{LifecycleManager, MicState};
pub use transcript::{SequenceTracker, TranscriptEvent, TranscriptProcessor, TranslationRequest};
pub use translate::{Orchestrator, SynthesizedSpeech, TranslationOutcome};

// Relay
pub use pipeline::{RelayEvent, RelayHandle, RelayPipeline};

// Error handling
pub use error::{GuidecastError, Result};

// Config
pub use config::Config;
pub use language::LanguageCode;

/// Build version string with optional git commit hash.
///
/// Returns `"0.1.0+abc1234"` when the git hash is known, `"0.1.0"` otherwise.
pub fn version_string() -> String {
    let version = env!("CARGO_PKG_VERSION");
    match option_env!("GIT_HASH") {
        Some(hash) if !hash.is_empty() => format!("{}+{}", version, hash),
        _ => version.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn version_string_starts_with_cargo_version() {
        let ver = version_string();
        assert!(
            ver.starts_with(env!("CARGO_PKG_VERSION")),
            "version_string should start with CARGO_PKG_VERSION, got: {}",
            ver
        );
    }

    #[test]
    fn version_string_contains_plus_when_git_hash_present() {
        let ver = version_string();
        // GIT_HASH set: "0.1.0+<hash>"
        // No git: plain "0.1.0"
        if option_env!("GIT_HASH").is_some_and(|h| !h.is_empty()) {
            assert!(
                ver.contains('+'),
                "With GIT_HASH set, version should contain '+', got: {}",
                ver
            );
            let hash_part = ver.split('+').nth(1).unwrap_or("");
            assert_eq!(
                hash_part.len(),
                7,
                "Git hash should be 7 chars, got: {}",
                hash_part
            );
        } else {
            assert_eq!(ver, env!("CARGO_PKG_VERSION"));
        }
    }
}
