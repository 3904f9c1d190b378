//! HTTP client for a translate-and-speak endpoint.

use crate::config::TranslationConfig;
use crate::error::{GuidecastError, Result};
use crate::language::LanguageCode;
use crate::translate::translator::{SpeechAudio, SpeechTranslator, TranslatedSpeech};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TranslateSpeechRequest<'a> {
    text: &'a str,
    source_language_code: &'a str,
    target_language_code: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TranslateSpeechResponse {
    #[serde(default)]
    translated_text: String,
    speech: Option<SpeechPayload>,
}

#[derive(Debug, Deserialize)]
struct SpeechPayload {
    #[serde(rename = "AudioStream")]
    audio_stream: Option<AudioStream>,
    #[serde(rename = "ContentType")]
    content_type: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AudioStream {
    #[serde(default)]
    data: Vec<u8>,
}

/// Calls a JSON endpoint that translates text and returns synthesized speech.
///
/// Request: `{text, sourceLanguageCode, targetLanguageCode}`.
/// Response: `{translatedText, speech: {AudioStream: {data: [..]}, ContentType}}`.
pub struct HttpSpeechTranslator {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
}

impl HttpSpeechTranslator {
    pub fn new(endpoint: impl Into<String>, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| GuidecastError::Transport {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: endpoint.into(),
            api_key,
        })
    }

    /// Build from configuration; `None` when no endpoint is configured.
    pub fn from_config(config: &TranslationConfig) -> Result<Option<Self>> {
        config
            .endpoint
            .as_ref()
            .map(|endpoint| Self::new(endpoint.clone(), config.api_key.clone()))
            .transpose()
    }
}

#[async_trait]
impl SpeechTranslator for HttpSpeechTranslator {
    async fn translate_and_speak(
        &self,
        text: &str,
        source: &LanguageCode,
        target: &LanguageCode,
    ) -> Result<TranslatedSpeech> {
        let body = TranslateSpeechRequest {
            text,
            source_language_code: source.as_str(),
            target_language_code: target.as_str(),
        };

        let mut request = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(|e| GuidecastError::Transport {
            message: format!("Failed to reach translation service: {}", e),
        })?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(GuidecastError::Transport {
                message: format!("Translation service returned {} {}", status, error_text),
            });
        }

        let parsed: TranslateSpeechResponse =
            response.json().await.map_err(|e| GuidecastError::Transport {
                message: format!("Malformed translation response: {}", e),
            })?;

        Ok(parsed.into_speech())
    }
}

impl TranslateSpeechResponse {
    fn into_speech(self) -> TranslatedSpeech {
        let (bytes, content_type) = match self.speech {
            Some(speech) => (
                speech.audio_stream.map(|s| s.data).unwrap_or_default(),
                speech.content_type,
            ),
            None => (Vec::new(), None),
        };

        TranslatedSpeech {
            translated_text: self.translated_text,
            audio: SpeechAudio {
                bytes,
                content_type,
            },
        }
    }
}
