//! Default configuration constants for guidecast.
//!
//! Shared by the configuration types and the components that fall back to
//! them when constructed without a [`Config`](crate::config::Config).

use std::time::Duration;

/// Largest clip accepted for upload, in bytes (20 MiB).
pub const MAX_CLIP_BYTES: u64 = 20 * 1024 * 1024;

/// MIME type prefix every uploaded clip must carry.
pub const AUDIO_MIME_PREFIX: &str = "audio";

/// Amplification applied by the bridge's gain stage.
///
/// Pre-recorded clips tend to sit below live microphone level; 1.2× brings
/// them in line without clipping typical speech recordings.
pub const CLIP_GAIN: f32 = 1.2;

/// Sample rate of the bridge's processing graph in Hz.
pub const SAMPLE_RATE: u32 = 16000;

/// Length of one render quantum in milliseconds.
pub const RENDER_QUANTUM_MS: u32 = 20;

/// Number of rendered frames the captured stream buffers before dropping.
pub const CAPTURE_BUFFER_FRAMES: usize = 256;

/// Fallback language code when nothing else is configured.
pub const DEFAULT_LANGUAGE: &str = "en-US";

/// Grace period before reporting that no microphone was detected.
///
/// Device labels may populate only after the permission prompt is accepted,
/// so an empty or unlabeled list is re-checked once after this delay.
pub const MIC_GRACE_PERIOD: Duration = Duration::from_secs(5);

/// Timeout for a single translation/synthesis call.
pub const TRANSLATION_TIMEOUT: Duration = Duration::from_secs(15);

/// Voice-isolation model requested from the platform (noise and echo suppression).
pub const VOICE_ISOLATION_MODEL: &str = "ns_es";

/// Session store key under which the guide session record is kept.
pub const SESSION_RECORD_KEY: &str = "Main-Guide";

/// How long a stored guide session record stays valid.
pub const SESSION_RECORD_TTL: Duration = Duration::from_secs(24 * 60 * 60);

/// Capacity of the relay event broadcast channel.
pub const RELAY_EVENT_CAPACITY: usize = 64;

/// Capacity of the bridge's playback-finished channel.
pub const PLAYBACK_EVENT_CAPACITY: usize = 16;
