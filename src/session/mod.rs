//! Conferencing session boundary and the guide's session lifecycle.

pub mod adapter;
pub mod device;
pub mod lifecycle;
pub mod presence;
pub mod store;

pub use adapter::{
    AudioInput, ConferencingSession, Device, DeviceChangeCallback, DeviceKind, InputKind,
    MeetingInfo, MockConferencingSession, MockSessionFactory, OutputTarget, PresenceCallback,
    PresenceChange, SessionCall, SessionFactory, Subscription, TranscriptCallback,
    TransformedDevice,
};
pub use device::{MockVoiceIsolation, NoVoiceIsolation, VoiceIsolation};
pub use lifecycle::{
    DeviceChanges, InitReport, LifecycleManager, MicState, MicrophoneStatus, OutputSelection,
};
pub use presence::PresenceTracker;
pub use store::{FileSessionStore, GuideSessionRecord, MemorySessionStore, SessionStore};
