//! Turns transcript events into translation requests.

use crate::language::LanguageCode;
use crate::transcript::event::{TranscriptEvent, parse_language_code};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Latest-issued utterance sequence number, shared between the processor
/// that issues numbers and the bridge that discards stale results.
#[derive(Debug, Clone, Default)]
pub struct SequenceTracker(Arc<AtomicU64>);

impl SequenceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Most recently issued number; 0 before the first utterance.
    pub fn current(&self) -> u64 {
        self.0.load(Ordering::SeqCst)
    }

    /// Issue the next number.
    pub fn advance(&self) -> u64 {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn is_latest(&self, sequence: u64) -> bool {
        self.current() == sequence
    }
}

/// Per-session transcription state.
#[derive(Debug, Clone, Default)]
pub struct TranscriptionSession {
    source_language: Option<LanguageCode>,
    sequence: SequenceTracker,
}

impl TranscriptionSession {
    pub fn new(sequence: SequenceTracker) -> Self {
        Self {
            source_language: None,
            sequence,
        }
    }

    pub fn source_language(&self) -> Option<&LanguageCode> {
        self.source_language.as_ref()
    }

    pub fn set_source_language(&mut self, code: LanguageCode) {
        self.source_language = Some(code);
    }

    pub fn sequence(&self) -> u64 {
        self.sequence.current()
    }

    pub fn tracker(&self) -> &SequenceTracker {
        &self.sequence
    }
}

/// One finalized utterance to translate and speak.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslationRequest {
    pub utterance_text: String,
    pub source_language: LanguageCode,
    pub target_language: LanguageCode,
    pub sequence: u64,
}

impl TranslationRequest {
    pub fn is_same_language(&self) -> bool {
        self.source_language == self.target_language
    }
}

/// What processing one event produced.
#[derive(Debug, Clone, PartialEq)]
pub enum ProcessedEvent {
    /// Partial results, unparseable configuration and unrelated events.
    Ignored,
    /// The session's source language was set.
    SourceLanguage(LanguageCode),
    /// A final utterance. `request` is `None` when nothing needs translating.
    Final {
        text: String,
        sequence: u64,
        request: Option<TranslationRequest>,
    },
}

/// Interprets the transcript stream in arrival order.
#[derive(Debug)]
pub struct TranscriptProcessor {
    session: TranscriptionSession,
    target_language: LanguageCode,
    fallback_source: Option<LanguageCode>,
}

impl TranscriptProcessor {
    pub fn new(target_language: LanguageCode, sequence: SequenceTracker) -> Self {
        Self {
            session: TranscriptionSession::new(sequence),
            target_language,
            fallback_source: None,
        }
    }

    /// Source language assumed for final utterances that arrive before
    /// the started event.
    pub fn with_fallback_source(mut self, code: Option<LanguageCode>) -> Self {
        self.fallback_source = code;
        self
    }

    pub fn target_language(&self) -> &LanguageCode {
        &self.target_language
    }

    /// Switch the listener language; applies from the next utterance.
    pub fn set_target_language(&mut self, code: LanguageCode) {
        self.target_language = code;
    }

    pub fn session(&self) -> &TranscriptionSession {
        &self.session
    }

    pub fn process(&mut self, event: &TranscriptEvent) -> ProcessedEvent {
        match event {
            TranscriptEvent::Started { configuration } => {
                match parse_language_code(configuration) {
                    Ok(code) => {
                        debug!(source_language = %code, "Transcription started");
                        self.session.set_source_language(code.clone());
                        ProcessedEvent::SourceLanguage(code)
                    }
                    Err(e) => {
                        warn!(error = %e, "Ignoring transcription configuration");
                        ProcessedEvent::Ignored
                    }
                }
            }
            TranscriptEvent::Result { results } => {
                let Some(first) = results.first() else {
                    return ProcessedEvent::Ignored;
                };
                if first.is_partial {
                    return ProcessedEvent::Ignored;
                }

                let text = first
                    .alternatives
                    .first()
                    .map(|a| a.transcript.clone())
                    .unwrap_or_default();
                let sequence = self.session.sequence.advance();
                let request = self.request_for(&text, sequence);

                ProcessedEvent::Final {
                    text,
                    sequence,
                    request,
                }
            }
            TranscriptEvent::Other { kind } => {
                debug!(kind = %kind, "Ignoring transcript event");
                ProcessedEvent::Ignored
            }
        }
    }

    fn request_for(&self, text: &str, sequence: u64) -> Option<TranslationRequest> {
        if text.trim().is_empty() {
            debug!(sequence, "Final utterance is empty");
            return None;
        }

        let source = match self
            .session
            .source_language()
            .or(self.fallback_source.as_ref())
        {
            Some(code) => code.clone(),
            None => {
                warn!(sequence, "Source language unknown, skipping translation");
                return None;
            }
        };

        if source == self.target_language {
            debug!(sequence, language = %source, "Source matches target, not translating");
            return None;
        }

        Some(TranslationRequest {
            utterance_text: text.to_string(),
            source_language: source,
            target_language: self.target_language.clone(),
            sequence,
        })
    }
}
