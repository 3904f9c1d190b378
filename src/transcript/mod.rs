//! Transcript stream processing: event parsing, source-language tracking,
//! and utterance sequencing.

pub mod event;
pub mod processor;

pub use event::{Alternative, TranscriptEvent, TranscriptResult, parse_language_code};
pub use processor::{
    ProcessedEvent, SequenceTracker, TranscriptProcessor, TranscriptionSession,
    TranslationRequest,
};
