//! Translation/synthesis orchestration.
//!
//! Converts one [`TranslationRequest`] into playable speech tagged with the
//! request's sequence number. Calls may overlap and finish out of order;
//! nothing here decides whether a result is still current. The audio bridge
//! does that when the result is applied.

use crate::config::TranslationConfig;
use crate::error::{GuidecastError, Result};
use crate::transcript::TranslationRequest;
use crate::translate::translator::{SpeechTranslator, TranslatedSpeech};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Validated speech ready for playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SynthesizedSpeech {
    pub audio_bytes: Vec<u8>,
    pub content_type: String,
    pub sequence: u64,
    pub translated_text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TranslationOutcome {
    /// Source and target match; no service call was made.
    SameLanguage { sequence: u64 },
    Speech(SynthesizedSpeech),
}

pub struct Orchestrator {
    translator: Arc<dyn SpeechTranslator>,
    timeout: Option<Duration>,
    retry_on_timeout: bool,
}

impl Orchestrator {
    /// No timeout, no retry.
    pub fn new(translator: Arc<dyn SpeechTranslator>) -> Self {
        Self {
            translator,
            timeout: None,
            retry_on_timeout: false,
        }
    }

    pub fn from_config(
        translator: Arc<dyn SpeechTranslator>,
        config: &TranslationConfig,
    ) -> Result<Self> {
        Ok(Self::new(translator)
            .with_timeout(config.timeout()?)
            .with_retry_on_timeout(config.retry_on_timeout))
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_retry_on_timeout(mut self, retry: bool) -> Self {
        self.retry_on_timeout = retry;
        self
    }

    pub async fn translate_and_speak(
        &self,
        request: &TranslationRequest,
    ) -> Result<TranslationOutcome> {
        if request.is_same_language() {
            return Ok(TranslationOutcome::SameLanguage {
                sequence: request.sequence,
            });
        }

        debug!(
            sequence = request.sequence,
            source = %request.source_language,
            target = %request.target_language,
            "Requesting translation"
        );

        let speech = self.call_with_retry(request).await?;
        validate(speech, request.sequence).map(TranslationOutcome::Speech)
    }

    async fn call_with_retry(&self, request: &TranslationRequest) -> Result<TranslatedSpeech> {
        let Some(timeout) = self.timeout else {
            return self.call(request).await;
        };

        match tokio::time::timeout(timeout, self.call(request)).await {
            Ok(result) => result,
            Err(_) if self.retry_on_timeout => {
                warn!(
                    sequence = request.sequence,
                    timeout = %humantime::format_duration(timeout),
                    "Translation timed out, retrying once"
                );
                tokio::time::timeout(timeout, self.call(request))
                    .await
                    .unwrap_or_else(|_| Err(timed_out(timeout)))
            }
            Err(_) => Err(timed_out(timeout)),
        }
    }

    async fn call(&self, request: &TranslationRequest) -> Result<TranslatedSpeech> {
        self.translator
            .translate_and_speak(
                &request.utterance_text,
                &request.source_language,
                &request.target_language,
            )
            .await
    }
}

fn timed_out(timeout: Duration) -> GuidecastError {
    GuidecastError::Transport {
        message: format!(
            "translation timed out after {}",
            humantime::format_duration(timeout)
        ),
    }
}

fn validate(speech: TranslatedSpeech, sequence: u64) -> Result<SynthesizedSpeech> {
    if speech.audio.bytes.is_empty() {
        return Err(GuidecastError::Transport {
            message: "response has no audio payload".to_string(),
        });
    }

    let content_type = match speech.audio.content_type {
        Some(ct) if !ct.trim().is_empty() => ct,
        _ => {
            return Err(GuidecastError::Transport {
                message: "response has no audio content type".to_string(),
            });
        }
    };

    Ok(SynthesizedSpeech {
        audio_bytes: speech.audio.bytes,
        content_type,
        sequence,
        translated_text: speech.translated_text,
    })
}
