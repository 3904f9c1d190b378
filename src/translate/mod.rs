//! Translation and speech synthesis.

#[cfg(feature = "http")]
pub mod http;
pub mod orchestrator;
pub mod translator;

#[cfg(feature = "http")]
pub use http::HttpSpeechTranslator;
pub use orchestrator::{Orchestrator, SynthesizedSpeech, TranslationOutcome};
pub use translator::{
    MockSpeechTranslator, SpeechAudio, SpeechTranslator, TranslatedSpeech, TranslatorCall,
};
