use crate::error::{GuidecastError, Result};
use crate::language::LanguageCode;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Raw synthesized audio as returned by the service.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SpeechAudio {
    pub bytes: Vec<u8>,
    pub content_type: Option<String>,
}

/// Response of one translate-and-speak call.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TranslatedSpeech {
    pub translated_text: String,
    pub audio: SpeechAudio,
}

/// External translation + speech-synthesis capability.
///
/// Implementations report network failures and malformed responses as
/// [`GuidecastError::Transport`].
#[async_trait]
pub trait SpeechTranslator: Send + Sync {
    async fn translate_and_speak(
        &self,
        text: &str,
        source: &LanguageCode,
        target: &LanguageCode,
    ) -> Result<TranslatedSpeech>;
}

/// Implement SpeechTranslator for Arc<T> to allow sharing across tasks.
#[async_trait]
impl<T: SpeechTranslator + ?Sized> SpeechTranslator for Arc<T> {
    async fn translate_and_speak(
        &self,
        text: &str,
        source: &LanguageCode,
        target: &LanguageCode,
    ) -> Result<TranslatedSpeech> {
        (**self).translate_and_speak(text, source, target).await
    }
}

/// A recorded call to [`MockSpeechTranslator`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TranslatorCall {
    pub text: String,
    pub source: LanguageCode,
    pub target: LanguageCode,
}

/// Mock translator for testing
///
/// Returns 16 kHz raw PCM so the bridge can decode it. Clones share the
/// call log.
#[derive(Debug, Clone, Default)]
pub struct MockSpeechTranslator {
    calls: Arc<Mutex<Vec<TranslatorCall>>>,
    responses: HashMap<String, String>,
    delays: HashMap<String, Duration>,
    failing: Vec<String>,
    fail_all: bool,
    empty_audio: bool,
    missing_content_type: bool,
    mp3_audio: bool,
}

impl MockSpeechTranslator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Translate `text` to `translation` instead of the default echo.
    pub fn with_response(mut self, text: &str, translation: &str) -> Self {
        self.responses
            .insert(text.to_string(), translation.to_string());
        self
    }

    /// Sleep for `delay` before answering calls for `text`.
    pub fn with_delay_for(mut self, text: &str, delay: Duration) -> Self {
        self.delays.insert(text.to_string(), delay);
        self
    }

    /// Fail every call
    pub fn with_failure(mut self) -> Self {
        self.fail_all = true;
        self
    }

    /// Fail calls for `text` only.
    pub fn with_failure_for(mut self, text: &str) -> Self {
        self.failing.push(text.to_string());
        self
    }

    /// Answer with zero audio bytes.
    pub fn with_empty_audio(mut self) -> Self {
        self.empty_audio = true;
        self
    }

    /// Answer without a content type.
    pub fn with_missing_content_type(mut self) -> Self {
        self.missing_content_type = true;
        self
    }

    /// Answer with MP3 speech, as the hosted speech service does.
    pub fn with_mp3_audio(mut self) -> Self {
        self.mp3_audio = true;
        self
    }

    pub fn calls(&self) -> Vec<TranslatorCall> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    /// MP3 payload: 20 silent MPEG-1 Layer III frames, mono 44.1kHz 128kbps.
    pub fn mp3_payload() -> Vec<u8> {
        const FRAME_LEN: usize = 417;
        let mut frame = vec![0u8; FRAME_LEN];
        frame[..4].copy_from_slice(&[0xFF, 0xFB, 0x90, 0xC0]);
        frame.repeat(20)
    }

    /// PCM payload the mock returns: 100ms of a constant tone.
    pub fn pcm_payload() -> Vec<u8> {
        std::iter::repeat_n(1000i16, 1600)
            .flat_map(|s| s.to_le_bytes())
            .collect()
    }
}

#[async_trait]
impl SpeechTranslator for MockSpeechTranslator {
    async fn translate_and_speak(
        &self,
        text: &str,
        source: &LanguageCode,
        target: &LanguageCode,
    ) -> Result<TranslatedSpeech> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(TranslatorCall {
                text: text.to_string(),
                source: source.clone(),
                target: target.clone(),
            });

        if let Some(delay) = self.delays.get(text) {
            tokio::time::sleep(*delay).await;
        }

        if self.fail_all || self.failing.iter().any(|t| t == text) {
            return Err(GuidecastError::Transport {
                message: "mock translation failure".to_string(),
            });
        }

        let translated_text = self
            .responses
            .get(text)
            .cloned()
            .unwrap_or_else(|| format!("[{}] {}", target, text));

        Ok(TranslatedSpeech {
            translated_text,
            audio: SpeechAudio {
                bytes: if self.empty_audio {
                    Vec::new()
                } else if self.mp3_audio {
                    Self::mp3_payload()
                } else {
                    Self::pcm_payload()
                },
                content_type: if self.missing_content_type {
                    None
                } else if self.mp3_audio {
                    Some("audio/mpeg".to_string())
                } else {
                    Some("audio/pcm;rate=16000".to_string())
                },
            },
        })
    }
}
