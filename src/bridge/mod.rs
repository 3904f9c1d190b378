//! Audio injection bridge: uploaded clips and synthesized speech played
//! through one shared graph into the live session.

pub mod audio_bridge;
pub mod clip;
pub mod graph;
pub mod storage;

pub use audio_bridge::{AudioBridge, SpeechPlayback};
pub use clip::{ClipCategory, ClipFile, ClipState, UploadedClip, validate_clip};
pub use graph::{AudioGraph, CapturedStream, Displaced, GainStage, MediaId};
#[cfg(feature = "http")]
pub use storage::HttpObjectStorage;
pub use storage::{MockObjectStorage, ObjectStorage, StoredObject};
