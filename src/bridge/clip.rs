//! Uploaded clips and their per-category playback state.

use crate::audio::MediaType;
use crate::error::{GuidecastError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Slot a clip is uploaded into. Each category holds at most one clip.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum ClipCategory {
    Instruction,
    Closing,
    Custom(String),
}

impl ClipCategory {
    pub fn as_str(&self) -> &str {
        match self {
            ClipCategory::Instruction => "instruction",
            ClipCategory::Closing => "closing",
            ClipCategory::Custom(name) => name,
        }
    }
}

impl fmt::Display for ClipCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<String> for ClipCategory {
    fn from(value: String) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "instruction" => ClipCategory::Instruction,
            "closing" => ClipCategory::Closing,
            other => ClipCategory::Custom(other.to_string()),
        }
    }
}

impl From<&str> for ClipCategory {
    fn from(value: &str) -> Self {
        Self::from(value.to_string())
    }
}

impl FromStr for ClipCategory {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(Self::from(s))
    }
}

impl From<ClipCategory> for String {
    fn from(category: ClipCategory) -> Self {
        category.as_str().to_string()
    }
}

/// A file the operator picked for upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipFile {
    pub name: String,
    pub mime_type: String,
    pub bytes: Vec<u8>,
}

impl ClipFile {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes,
        }
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// A stored clip reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedClip {
    pub category: ClipCategory,
    pub display_name: String,
    pub remote_url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClipState {
    Empty,
    Ready,
    Playing,
    Paused,
}

/// Reject files that are not audio or exceed `max_bytes`.
///
/// Runs before any network transfer.
pub fn validate_clip(file: &ClipFile, max_bytes: u64) -> Result<()> {
    if !MediaType::parse(&file.mime_type).is_audio() {
        return Err(GuidecastError::Validation {
            message: format!(
                "unsupported file type {:?}, expected an audio file",
                file.mime_type
            ),
        });
    }

    if file.size() > max_bytes {
        return Err(GuidecastError::Validation {
            message: format!(
                "file {:?} is {} bytes, limit is {} bytes",
                file.name,
                file.size(),
                max_bytes
            ),
        });
    }

    Ok(())
}

/// Per-category clip data held by the bridge.
#[derive(Debug, Clone)]
pub(crate) struct ClipSlot {
    pub clip: UploadedClip,
    pub file: ClipFile,
    pub decoded: Option<Arc<Vec<i16>>>,
    pub state: ClipState,
    /// Resume point in graph-rate samples.
    pub position: usize,
}

impl ClipSlot {
    pub fn new(clip: UploadedClip, file: ClipFile) -> Self {
        Self {
            clip,
            file,
            decoded: None,
            state: ClipState::Ready,
            position: 0,
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct ClipBoard {
    slots: HashMap<ClipCategory, ClipSlot>,
}

impl ClipBoard {
    pub fn state(&self, category: &ClipCategory) -> ClipState {
        self.slots
            .get(category)
            .map(|slot| slot.state)
            .unwrap_or(ClipState::Empty)
    }

    pub fn get(&self, category: &ClipCategory) -> Option<&ClipSlot> {
        self.slots.get(category)
    }

    pub fn get_mut(&mut self, category: &ClipCategory) -> Option<&mut ClipSlot> {
        self.slots.get_mut(category)
    }

    pub fn insert(&mut self, category: ClipCategory, slot: ClipSlot) -> Option<ClipSlot> {
        self.slots.insert(category, slot)
    }

    pub fn remove(&mut self, category: &ClipCategory) -> Option<ClipSlot> {
        self.slots.remove(category)
    }

    /// Pause every playing slot other than `except`.
    pub fn pause_others(&mut self, except: &ClipCategory) {
        for (category, slot) in self.slots.iter_mut() {
            if category != except && slot.state == ClipState::Playing {
                slot.state = ClipState::Paused;
            }
        }
    }

    /// Record that `category` was interrupted at `position`.
    pub fn mark_interrupted(&mut self, category: &ClipCategory, position: usize) {
        if let Some(slot) = self.slots.get_mut(category)
            && slot.state == ClipState::Playing
        {
            slot.state = ClipState::Paused;
            slot.position = position;
        }
    }

    /// `category` played through to its end: back to Ready, rewound.
    pub fn mark_finished(&mut self, category: &ClipCategory) {
        if let Some(slot) = self.slots.get_mut(category)
            && slot.state == ClipState::Playing
        {
            slot.state = ClipState::Ready;
            slot.position = 0;
        }
    }

    pub fn clips(&self) -> Vec<UploadedClip> {
        let mut clips: Vec<_> = self.slots.values().map(|s| s.clip.clone()).collect();
        clips.sort_by(|a, b| a.category.as_str().cmp(b.category.as_str()));
        clips
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(category: ClipCategory) -> ClipSlot {
        ClipSlot::new(
            UploadedClip {
                category: category.clone(),
                display_name: "intro.wav".to_string(),
                remote_url: "mock://intro.wav".to_string(),
            },
            ClipFile::new("intro.wav", "audio/wav", vec![0; 4]),
        )
    }

    #[test]
    fn test_category_parse_and_display() {
        assert_eq!(ClipCategory::from("Instruction"), ClipCategory::Instruction);
        assert_eq!(ClipCategory::from("closing"), ClipCategory::Closing);
        assert_eq!(
            ClipCategory::from("intermission"),
            ClipCategory::Custom("intermission".to_string())
        );
        assert_eq!(ClipCategory::Closing.to_string(), "closing");
    }

    #[test]
    fn test_category_serde_as_string() {
        let json = serde_json::to_string(&ClipCategory::Instruction).unwrap();
        assert_eq!(json, "\"instruction\"");
        let parsed: ClipCategory = serde_json::from_str("\"closing\"").unwrap();
        assert_eq!(parsed, ClipCategory::Closing);
    }

    #[test]
    fn test_validate_accepts_audio_within_limit() {
        let file = ClipFile::new("a.mp3", "audio/mpeg", vec![0; 100]);
        assert!(validate_clip(&file, 100).is_ok());
    }

    #[test]
    fn test_validate_rejects_non_audio() {
        let file = ClipFile::new("a.mp4", "video/mp4", vec![0; 10]);
        match validate_clip(&file, 100) {
            Err(GuidecastError::Validation { message }) => assert!(message.contains("video/mp4")),
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_oversize() {
        let file = ClipFile::new("a.wav", "audio/wav", vec![0; 101]);
        match validate_clip(&file, 100) {
            Err(GuidecastError::Validation { message }) => assert!(message.contains("limit")),
            other => panic!("Expected Validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_validate_rejects_both_violations() {
        let file = ClipFile::new("a.txt", "text/plain", vec![0; 101]);
        assert!(matches!(
            validate_clip(&file, 100),
            Err(GuidecastError::Validation { .. })
        ));
    }

    #[test]
    fn test_clipboard_defaults_to_empty() {
        let board = ClipBoard::default();
        assert_eq!(board.state(&ClipCategory::Instruction), ClipState::Empty);
    }

    #[test]
    fn test_pause_others_leaves_target() {
        let mut board = ClipBoard::default();
        let mut a = slot(ClipCategory::Instruction);
        a.state = ClipState::Playing;
        let mut b = slot(ClipCategory::Closing);
        b.state = ClipState::Playing;
        board.insert(ClipCategory::Instruction, a);
        board.insert(ClipCategory::Closing, b);

        board.pause_others(&ClipCategory::Closing);

        assert_eq!(board.state(&ClipCategory::Instruction), ClipState::Paused);
        assert_eq!(board.state(&ClipCategory::Closing), ClipState::Playing);
    }

    #[test]
    fn test_mark_interrupted_saves_position() {
        let mut board = ClipBoard::default();
        let mut a = slot(ClipCategory::Instruction);
        a.state = ClipState::Playing;
        board.insert(ClipCategory::Instruction, a);

        board.mark_interrupted(&ClipCategory::Instruction, 640);

        let slot = board.get(&ClipCategory::Instruction).unwrap();
        assert_eq!(slot.state, ClipState::Paused);
        assert_eq!(slot.position, 640);
    }

    #[test]
    fn test_mark_finished_rewinds_playing_clip_only() {
        let mut board = ClipBoard::default();
        let mut a = slot(ClipCategory::Instruction);
        a.state = ClipState::Playing;
        a.position = 3200;
        let mut b = slot(ClipCategory::Closing);
        b.state = ClipState::Paused;
        b.position = 800;
        board.insert(ClipCategory::Instruction, a);
        board.insert(ClipCategory::Closing, b);

        board.mark_finished(&ClipCategory::Instruction);
        board.mark_finished(&ClipCategory::Closing);

        let a = board.get(&ClipCategory::Instruction).unwrap();
        assert_eq!((a.state, a.position), (ClipState::Ready, 0));
        let b = board.get(&ClipCategory::Closing).unwrap();
        assert_eq!((b.state, b.position), (ClipState::Paused, 800));
    }
}
