//! Transcript events as delivered by the conferencing session.

use crate::error::{GuidecastError, Result};
use crate::language::LanguageCode;
use serde::Deserialize;
use serde_json::Value;

/// One push from the live transcript stream.
#[derive(Debug, Clone, PartialEq)]
pub enum TranscriptEvent {
    /// Transcription began. Carries the raw configuration blob the source
    /// language is read from.
    Started { configuration: String },
    /// A batch of transcription results. Only the first result and its
    /// first alternative are ever consulted.
    Result { results: Vec<TranscriptResult> },
    /// Any other lifecycle event (stopped, interrupted, ...).
    Other { kind: String },
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct TranscriptResult {
    pub is_partial: bool,
    pub alternatives: Vec<Alternative>,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Alternative {
    pub transcript: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireEvent {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(default)]
    transcription_configuration: Option<Value>,
    #[serde(default)]
    results: Option<Vec<WireResult>>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireResult {
    #[serde(default)]
    is_partial: bool,
    #[serde(default)]
    alternatives: Vec<WireAlternative>,
}

#[derive(Deserialize)]
struct WireAlternative {
    #[serde(default)]
    transcript: String,
}

impl TranscriptEvent {
    /// Build a final result with a single alternative.
    pub fn final_text(text: impl Into<String>) -> Self {
        Self::single_result(text, false)
    }

    /// Build a partial result with a single alternative.
    pub fn partial_text(text: impl Into<String>) -> Self {
        Self::single_result(text, true)
    }

    /// Build a started event whose configuration names `language_code`.
    pub fn started(language_code: &str) -> Self {
        let configuration = serde_json::json!({
            "EngineTranscribeSettings": { "LanguageCode": language_code }
        });
        Self::Started {
            configuration: configuration.to_string(),
        }
    }

    fn single_result(text: impl Into<String>, is_partial: bool) -> Self {
        Self::Result {
            results: vec![TranscriptResult {
                is_partial,
                alternatives: vec![Alternative {
                    transcript: text.into(),
                }],
            }],
        }
    }

    /// Parse the JSON wire shape.
    pub fn from_json(json: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(json).map_err(|e| GuidecastError::Transcript {
            message: e.to_string(),
        })?;
        Self::from_value(value)
    }

    /// Convert an already-parsed JSON value.
    ///
    /// `transcriptionConfiguration` may arrive either as an embedded JSON
    /// string or as an object; both are kept as text.
    pub fn from_value(value: Value) -> Result<Self> {
        let wire: WireEvent =
            serde_json::from_value(value).map_err(|e| GuidecastError::Transcript {
                message: e.to_string(),
            })?;

        if wire.kind.as_deref() == Some("started") {
            let configuration = match wire.transcription_configuration {
                Some(Value::String(text)) => text,
                Some(other) => other.to_string(),
                None => String::new(),
            };
            return Ok(Self::Started { configuration });
        }

        if let Some(results) = wire.results {
            let results = results
                .into_iter()
                .map(|r| TranscriptResult {
                    is_partial: r.is_partial,
                    alternatives: r
                        .alternatives
                        .into_iter()
                        .map(|a| Alternative {
                            transcript: a.transcript,
                        })
                        .collect(),
                })
                .collect();
            return Ok(Self::Result { results });
        }

        Ok(Self::Other {
            kind: wire.kind.unwrap_or_default(),
        })
    }
}

/// Extract the source language from a started event's configuration blob.
///
/// Reads `EngineTranscribeSettings.LanguageCode`, falling back to a
/// top-level `languageCode` or `LanguageCode`.
pub fn parse_language_code(configuration: &str) -> Result<LanguageCode> {
    let blob: Value =
        serde_json::from_str(configuration).map_err(|e| GuidecastError::Transcript {
            message: format!("configuration is not JSON: {}", e),
        })?;

    let code = blob
        .get("EngineTranscribeSettings")
        .and_then(|settings| settings.get("LanguageCode"))
        .or_else(|| blob.get("languageCode"))
        .or_else(|| blob.get("LanguageCode"))
        .and_then(Value::as_str)
        .ok_or_else(|| GuidecastError::Transcript {
            message: "configuration has no LanguageCode".to_string(),
        })?;

    LanguageCode::parse(code)
}
