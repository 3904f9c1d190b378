//! Conferencing session boundary.
//!
//! The live meeting, its devices and its transcript stream come from an
//! external conferencing SDK. [`ConferencingSession`] is the slice of that
//! SDK the relay consumes; [`MockConferencingSession`] stands in for it in
//! tests and records every call in order.

use crate::bridge::CapturedStream;
use crate::error::{DeviceError, GuidecastError, Result};
use crate::transcript::TranscriptEvent;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeviceKind {
    AudioInput,
    AudioOutput,
}

/// An enumerated audio device. Labels may be blank until the user grants
/// device permission.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub id: String,
    pub label: String,
    pub kind: DeviceKind,
}

impl Device {
    pub fn input(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            kind: DeviceKind::AudioInput,
        }
    }

    pub fn output(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
            kind: DeviceKind::AudioOutput,
        }
    }

    pub fn has_label(&self) -> bool {
        !self.label.trim().is_empty()
    }
}

/// A capture device wrapped by the platform's voice-isolation transform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransformedDevice {
    pub inner: Device,
    pub model: String,
}

/// What the session captures as the outbound microphone.
#[derive(Debug, Clone)]
pub enum AudioInput {
    Device(Device),
    Transformed(TransformedDevice),
    /// The audio bridge's captured stream, substituting the microphone.
    Stream(CapturedStream),
}

impl AudioInput {
    pub fn kind(&self) -> InputKind {
        match self {
            AudioInput::Device(d) => InputKind::Device(d.id.clone()),
            AudioInput::Transformed(t) => InputKind::Transformed(t.inner.id.clone()),
            AudioInput::Stream(_) => InputKind::Stream,
        }
    }
}

/// [`AudioInput`] without its payload, for logs and assertions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputKind {
    Device(String),
    Transformed(String),
    Stream,
}

/// Element the session renders remote audio into. Session initialization
/// fails when it is missing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputTarget {
    pub element_id: String,
}

/// Identity of a joined meeting, as handed out by the provisioning service.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeetingInfo {
    pub meeting_id: String,
    pub attendee_id: String,
    #[serde(default)]
    pub external_meeting_id: Option<String>,
}

/// A participant joined or left.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceChange {
    pub attendee_id: String,
    pub present: bool,
    pub external_user_id: Option<String>,
}

pub type TranscriptCallback = Box<dyn Fn(TranscriptEvent) + Send + Sync>;
pub type PresenceCallback = Box<dyn Fn(PresenceChange) + Send + Sync>;
pub type DeviceChangeCallback = Box<dyn Fn() + Send + Sync>;

/// Handle for a registered callback. Unsubscribes on [`unsubscribe`] or drop.
///
/// [`unsubscribe`]: Subscription::unsubscribe
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send + Sync>>,
}

impl Subscription {
    pub fn new(cancel: impl FnOnce() + Send + Sync + 'static) -> Self {
        Self {
            cancel: Some(Box::new(cancel)),
        }
    }

    /// A handle with nothing to cancel.
    pub fn noop() -> Self {
        Self { cancel: None }
    }

    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// Live audio session supplied by the conferencing SDK.
#[async_trait]
pub trait ConferencingSession: Send + Sync {
    fn meeting(&self) -> &MeetingInfo;

    async fn bind_audio_element(&self, target: &OutputTarget) -> Result<()>;
    async fn choose_audio_output(&self, device: &Device) -> Result<()>;
    async fn start(&self) -> Result<()>;
    async fn stop(&self) -> Result<()>;

    /// Start capturing `input` as the outbound microphone.
    async fn start_audio_input(&self, input: AudioInput) -> Result<()>;
    async fn stop_audio_input(&self) -> Result<()>;
    fn mute_local_audio(&self);
    fn unmute_local_audio(&self);

    async fn list_audio_input_devices(&self) -> Result<Vec<Device>>;
    async fn list_audio_output_devices(&self) -> Result<Vec<Device>>;

    fn subscribe_transcript_events(&self, callback: TranscriptCallback) -> Subscription;
    fn subscribe_attendance_presence(&self, callback: PresenceCallback) -> Subscription;
    fn subscribe_device_changes(&self, callback: DeviceChangeCallback) -> Subscription;
}

/// Creates sessions for a meeting.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn create_session(&self, meeting: &MeetingInfo) -> Result<Arc<dyn ConferencingSession>>;
}

/// Everything [`MockConferencingSession`] was asked to do, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCall {
    BindAudioElement(String),
    ChooseAudioOutput(String),
    Start,
    Stop,
    StartAudioInput(InputKind),
    StopAudioInput,
    Mute,
    Unmute,
}

#[derive(Default)]
struct MockState {
    calls: Vec<SessionCall>,
    muted: bool,
    capturing: Option<InputKind>,
    captured_stream: Option<CapturedStream>,
    input_devices: Vec<Device>,
    output_devices: Vec<Device>,
    input_error: Option<DeviceError>,
    bind_fails: bool,
    transcript_subscribers: BTreeMap<u64, Arc<TranscriptCallback>>,
    presence_subscribers: BTreeMap<u64, Arc<PresenceCallback>>,
    device_subscribers: BTreeMap<u64, Arc<DeviceChangeCallback>>,
}

/// Mock conferencing session for testing
///
/// Clones share state, so a test can keep one handle while the relay owns
/// another.
#[derive(Clone, Default)]
pub struct MockConferencingSession {
    meeting: MeetingInfo,
    state: Arc<Mutex<MockState>>,
    next_id: Arc<AtomicU64>,
}

impl MockConferencingSession {
    pub fn new() -> Self {
        Self {
            meeting: MeetingInfo {
                meeting_id: "mock-meeting".to_string(),
                attendee_id: "mock-attendee".to_string(),
                external_meeting_id: None,
            },
            ..Self::default()
        }
    }

    pub fn with_meeting(mut self, meeting: MeetingInfo) -> Self {
        self.meeting = meeting;
        self
    }

    pub fn with_input_devices(self, devices: Vec<Device>) -> Self {
        self.set_input_devices(devices);
        self
    }

    pub fn with_output_devices(self, devices: Vec<Device>) -> Self {
        self.lock().output_devices = devices;
        self
    }

    /// Make `start_audio_input` fail with `error`.
    pub fn with_input_error(self, error: DeviceError) -> Self {
        self.lock().input_error = Some(error);
        self
    }

    /// Make `bind_audio_element` fail.
    pub fn with_bind_failure(self) -> Self {
        self.lock().bind_fails = true;
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn record(&self, call: SessionCall) {
        self.lock().calls.push(call);
    }

    /// Replace the enumerated input devices, e.g. once labels populate.
    pub fn set_input_devices(&self, devices: Vec<Device>) {
        self.lock().input_devices = devices;
    }

    pub fn set_input_error(&self, error: Option<DeviceError>) {
        self.lock().input_error = error;
    }

    pub fn calls(&self) -> Vec<SessionCall> {
        self.lock().calls.clone()
    }

    pub fn is_muted(&self) -> bool {
        self.lock().muted
    }

    pub fn capturing(&self) -> Option<InputKind> {
        self.lock().capturing.clone()
    }

    /// The last stream passed to `start_audio_input`.
    pub fn captured_stream(&self) -> Option<CapturedStream> {
        self.lock().captured_stream.clone()
    }

    pub fn transcript_subscriber_count(&self) -> usize {
        self.lock().transcript_subscribers.len()
    }

    pub fn presence_subscriber_count(&self) -> usize {
        self.lock().presence_subscribers.len()
    }

    /// Deliver a transcript event to every subscriber.
    pub fn emit_transcript(&self, event: TranscriptEvent) {
        let subscribers: Vec<_> = self.lock().transcript_subscribers.values().cloned().collect();
        for callback in subscribers {
            (*callback)(event.clone());
        }
    }

    pub fn emit_presence(&self, change: PresenceChange) {
        let subscribers: Vec<_> = self.lock().presence_subscribers.values().cloned().collect();
        for callback in subscribers {
            (*callback)(change.clone());
        }
    }

    pub fn emit_device_change(&self) {
        let subscribers: Vec<_> = self.lock().device_subscribers.values().cloned().collect();
        for callback in subscribers {
            (*callback)();
        }
    }

    fn subscription(
        &self,
        id: u64,
        remove: impl FnOnce(&mut MockState, u64) + Send + Sync + 'static,
    ) -> Subscription {
        let state = Arc::clone(&self.state);
        Subscription::new(move || {
            let mut guard = state.lock().unwrap_or_else(|e| e.into_inner());
            remove(&mut guard, id);
        })
    }
}

#[async_trait]
impl ConferencingSession for MockConferencingSession {
    fn meeting(&self) -> &MeetingInfo {
        &self.meeting
    }

    async fn bind_audio_element(&self, target: &OutputTarget) -> Result<()> {
        if self.lock().bind_fails {
            return Err(GuidecastError::MissingOutputTarget {
                message: format!("element {:?} not found", target.element_id),
            });
        }
        self.record(SessionCall::BindAudioElement(target.element_id.clone()));
        Ok(())
    }

    async fn choose_audio_output(&self, device: &Device) -> Result<()> {
        self.record(SessionCall::ChooseAudioOutput(device.id.clone()));
        Ok(())
    }

    async fn start(&self) -> Result<()> {
        self.record(SessionCall::Start);
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.record(SessionCall::Stop);
        Ok(())
    }

    async fn start_audio_input(&self, input: AudioInput) -> Result<()> {
        let mut state = self.lock();
        if let Some(error) = state.input_error.clone() {
            return Err(error.into());
        }
        let kind = input.kind();
        state.calls.push(SessionCall::StartAudioInput(kind.clone()));
        state.capturing = Some(kind);
        if let AudioInput::Stream(stream) = input {
            state.captured_stream = Some(stream);
        }
        Ok(())
    }

    async fn stop_audio_input(&self) -> Result<()> {
        let mut state = self.lock();
        state.calls.push(SessionCall::StopAudioInput);
        state.capturing = None;
        Ok(())
    }

    fn mute_local_audio(&self) {
        let mut state = self.lock();
        state.calls.push(SessionCall::Mute);
        state.muted = true;
    }

    fn unmute_local_audio(&self) {
        let mut state = self.lock();
        state.calls.push(SessionCall::Unmute);
        state.muted = false;
    }

    async fn list_audio_input_devices(&self) -> Result<Vec<Device>> {
        Ok(self.lock().input_devices.clone())
    }

    async fn list_audio_output_devices(&self) -> Result<Vec<Device>> {
        Ok(self.lock().output_devices.clone())
    }

    fn subscribe_transcript_events(&self, callback: TranscriptCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock()
            .transcript_subscribers
            .insert(id, Arc::new(callback));
        self.subscription(id, |s, id| {
            s.transcript_subscribers.remove(&id);
        })
    }

    fn subscribe_attendance_presence(&self, callback: PresenceCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().presence_subscribers.insert(id, Arc::new(callback));
        self.subscription(id, |s, id| {
            s.presence_subscribers.remove(&id);
        })
    }

    fn subscribe_device_changes(&self, callback: DeviceChangeCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.lock().device_subscribers.insert(id, Arc::new(callback));
        self.subscription(id, |s, id| {
            s.device_subscribers.remove(&id);
        })
    }
}

/// Hands out clones of one [`MockConferencingSession`].
#[derive(Clone, Default)]
pub struct MockSessionFactory {
    session: MockConferencingSession,
    created: Arc<AtomicU64>,
}

impl MockSessionFactory {
    pub fn new(session: MockConferencingSession) -> Self {
        Self {
            session,
            created: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SessionFactory for MockSessionFactory {
    async fn create_session(&self, meeting: &MeetingInfo) -> Result<Arc<dyn ConferencingSession>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.session.clone().with_meeting(meeting.clone())))
    }
}
