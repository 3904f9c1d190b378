//! Device selection, microphone control and session start/resume.

use crate::config::{Config, VoiceIsolationConfig};
use crate::error::{DeviceError, GuidecastError, Result};
use crate::language::LanguageCode;
use crate::session::adapter::{
    AudioInput, ConferencingSession, Device, MeetingInfo, OutputTarget, SessionFactory,
    Subscription,
};
use crate::session::device::VoiceIsolation;
use crate::session::store::{GuideSessionRecord, SessionStore};
use std::sync::Arc;
use std::time::{Duration, SystemTime};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicState {
    Off,
    On,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSelection {
    Selected(Device),
    NoOutputDevice,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MicrophoneStatus {
    Available(Vec<Device>),
    /// Still no usable microphone after the grace period.
    NotDetected,
}

/// What [`LifecycleManager::initialize`] found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitReport {
    pub output: OutputSelection,
    pub microphones: MicrophoneStatus,
    pub voice_isolation: bool,
}

/// Device-change notifications from the session.
pub struct DeviceChanges {
    receiver: mpsc::UnboundedReceiver<()>,
    _subscription: Subscription,
}

impl DeviceChanges {
    /// Wait for the next change. Returns `false` once the session is gone.
    pub async fn changed(&mut self) -> bool {
        self.receiver.recv().await.is_some()
    }
}

fn no_session() -> GuidecastError {
    GuidecastError::Session {
        message: "no active session".to_string(),
    }
}

fn microphones_missing(devices: &[Device]) -> bool {
    devices.iter().all(|d| !d.has_label())
}

/// Owns the conferencing session and the guide's device choices.
pub struct LifecycleManager {
    factory: Arc<dyn SessionFactory>,
    store: Arc<dyn SessionStore>,
    isolation: Arc<dyn VoiceIsolation>,
    isolation_config: VoiceIsolationConfig,
    grace_period: Duration,
    target_language: LanguageCode,
    session: Option<Arc<dyn ConferencingSession>>,
    isolation_supported: bool,
    selected_input: Option<Device>,
    selected_output: Option<Device>,
    mic: MicState,
}

impl LifecycleManager {
    pub fn new(
        config: &Config,
        factory: Arc<dyn SessionFactory>,
        store: Arc<dyn SessionStore>,
        isolation: Arc<dyn VoiceIsolation>,
    ) -> Result<Self> {
        Ok(Self {
            factory,
            store,
            isolation,
            isolation_config: config.voice_isolation.clone(),
            grace_period: config.session.mic_grace_period()?,
            target_language: config.session.target_language()?,
            session: None,
            isolation_supported: false,
            selected_input: None,
            selected_output: None,
            mic: MicState::Off,
        })
    }

    pub fn session(&self) -> Option<Arc<dyn ConferencingSession>> {
        self.session.clone()
    }

    fn active(&self) -> Result<&Arc<dyn ConferencingSession>> {
        self.session.as_ref().ok_or_else(no_session)
    }

    pub fn target_language(&self) -> &LanguageCode {
        &self.target_language
    }

    pub fn mic_state(&self) -> MicState {
        self.mic
    }

    pub fn selected_input(&self) -> Option<&Device> {
        self.selected_input.as_ref()
    }

    pub fn selected_output(&self) -> Option<&Device> {
        self.selected_output.as_ref()
    }

    pub fn voice_isolation_supported(&self) -> bool {
        self.isolation_supported
    }

    /// Start a fresh session for `meeting`, replacing any stored record.
    pub async fn start(&mut self, meeting: MeetingInfo) -> Result<Arc<dyn ConferencingSession>> {
        GuideSessionRecord::clear(self.store.as_ref())?;

        let session = self.factory.create_session(&meeting).await?;
        GuideSessionRecord::new(meeting.clone(), self.target_language.clone(), SystemTime::now())
            .save(self.store.as_ref())?;

        info!(meeting_id = %meeting.meeting_id, "Session created");
        self.session = Some(Arc::clone(&session));
        Ok(session)
    }

    /// Rejoin the stored session, if one is still valid.
    pub async fn resume(&mut self) -> Result<Option<Arc<dyn ConferencingSession>>> {
        let Some(record) = GuideSessionRecord::load(self.store.as_ref(), SystemTime::now())? else {
            return Ok(None);
        };

        let session = self.factory.create_session(&record.meeting).await?;
        info!(meeting_id = %record.meeting.meeting_id, "Session resumed");
        self.target_language = record.target_language;
        self.session = Some(Arc::clone(&session));
        Ok(Some(session))
    }

    /// Bind playback, pick devices and start the session.
    ///
    /// A missing output target aborts initialization.
    pub async fn initialize(&mut self, target: Option<&OutputTarget>) -> Result<InitReport> {
        let session = Arc::clone(self.active()?);

        let target = target.ok_or_else(|| GuidecastError::MissingOutputTarget {
            message: "no audio element to bind session playback to".to_string(),
        })?;
        session.bind_audio_element(target).await?;

        let voice_isolation = self.probe_voice_isolation().await;
        let output = self.select_output().await?;
        session.start().await?;
        let microphones = self.detect_microphones().await?;

        Ok(InitReport {
            output,
            microphones,
            voice_isolation,
        })
    }

    /// Probe voice isolation. Failures count as unsupported.
    pub async fn probe_voice_isolation(&mut self) -> bool {
        self.isolation_supported = if !self.isolation_config.enabled {
            false
        } else {
            match self.isolation.is_supported().await {
                Ok(supported) => supported,
                Err(e) => {
                    warn!(error = %e, "Voice isolation probe failed, using raw devices");
                    false
                }
            }
        };
        debug!(supported = self.isolation_supported, "Voice isolation probed");
        self.isolation_supported
    }

    pub async fn list_input_devices(&self) -> Result<Vec<Device>> {
        self.active()?.list_audio_input_devices().await
    }

    pub async fn list_output_devices(&self) -> Result<Vec<Device>> {
        self.active()?.list_audio_output_devices().await
    }

    /// Route session playback to the first output device, if any.
    pub async fn select_output(&mut self) -> Result<OutputSelection> {
        let devices = self.list_output_devices().await?;
        let Some(first) = devices.into_iter().next() else {
            warn!("No output device");
            self.selected_output = None;
            return Ok(OutputSelection::NoOutputDevice);
        };

        self.active()?.choose_audio_output(&first).await?;
        info!(device = %first.label, "Output device selected");
        self.selected_output = Some(first.clone());
        Ok(OutputSelection::Selected(first))
    }

    /// Enumerate microphones, waiting out the grace period once if the list
    /// is empty or unlabeled.
    pub async fn detect_microphones(&mut self) -> Result<MicrophoneStatus> {
        let mut devices = self.list_input_devices().await?;
        if microphones_missing(&devices) {
            debug!(
                grace = %humantime::format_duration(self.grace_period),
                "No labeled microphones yet, waiting"
            );
            tokio::time::sleep(self.grace_period).await;
            devices = self.list_input_devices().await?;
        }

        if microphones_missing(&devices) {
            warn!("No microphone detected");
            return Ok(MicrophoneStatus::NotDetected);
        }

        let still_present = self
            .selected_input
            .as_ref()
            .is_some_and(|selected| devices.iter().any(|d| d.id == selected.id));
        if !still_present {
            self.selected_input = devices.iter().find(|d| d.has_label()).cloned();
        }

        Ok(MicrophoneStatus::Available(devices))
    }

    /// Choose the capture device. Takes effect immediately if the
    /// microphone is on.
    pub async fn select_input(&mut self, device_id: &str) -> Result<Device> {
        let device = self
            .list_input_devices()
            .await?
            .into_iter()
            .find(|d| d.id == device_id)
            .ok_or_else(|| DeviceError::Unavailable {
                message: format!("no input device with id {:?}", device_id),
            })?;

        self.selected_input = Some(device.clone());
        if self.mic == MicState::On {
            let input = self.build_input(&device).await;
            if let Err(e) = self.active()?.start_audio_input(input).await {
                self.turn_off().await;
                return Err(e);
            }
        }
        Ok(device)
    }

    /// Wrap `device` in voice isolation when supported, else use it raw.
    async fn build_input(&self, device: &Device) -> AudioInput {
        if !self.isolation_supported {
            return AudioInput::Device(device.clone());
        }
        match self
            .isolation
            .transform(device, &self.isolation_config.model)
            .await
        {
            Ok(transformed) => AudioInput::Transformed(transformed),
            Err(e) => {
                warn!(error = %e, device = %device.id, "Voice isolation failed, using raw device");
                AudioInput::Device(device.clone())
            }
        }
    }

    /// Turn the microphone off (mute, then stop capture) or on (start
    /// capture, then unmute).
    ///
    /// If turning on fails the microphone stays off and the error is
    /// returned; permission denials are reported as
    /// [`DeviceError::PermissionDenied`].
    pub async fn toggle_microphone(&mut self) -> Result<MicState> {
        match self.mic {
            MicState::On => {
                let session = Arc::clone(self.active()?);
                session.mute_local_audio();
                self.mic = MicState::Off;
                session.stop_audio_input().await?;
                info!("Microphone off");
                Ok(MicState::Off)
            }
            MicState::Off => {
                let session = Arc::clone(self.active()?);
                let device = self.selected_input.clone().ok_or_else(|| DeviceError::Unavailable {
                    message: "no microphone selected".to_string(),
                })?;

                let input = self.build_input(&device).await;
                if let Err(e) = session.start_audio_input(input).await {
                    if e.is_permission_denied() {
                        warn!(error = %e, "Microphone permission denied");
                    } else {
                        warn!(error = %e, "Microphone could not start");
                    }
                    self.mic = MicState::Off;
                    return Err(e);
                }

                session.unmute_local_audio();
                self.mic = MicState::On;
                info!(device = %device.label, "Microphone on");
                Ok(MicState::On)
            }
        }
    }

    async fn turn_off(&mut self) {
        if let Some(session) = self.session.clone() {
            session.mute_local_audio();
            if let Err(e) = session.stop_audio_input().await {
                warn!(error = %e, "Failed to stop capture");
            }
        }
        self.mic = MicState::Off;
    }

    /// Notify on device plug/unplug so microphones can be re-detected.
    pub fn watch_device_changes(&self) -> Result<DeviceChanges> {
        let (tx, receiver) = mpsc::unbounded_channel();
        let subscription = self.active()?.subscribe_device_changes(Box::new(move || {
            if tx.send(()).is_err() {
                debug!("Device change receiver dropped");
            }
        }));
        Ok(DeviceChanges {
            receiver,
            _subscription: subscription,
        })
    }

    /// Stop capture and leave the session. The stored record is kept so the
    /// session can be resumed.
    pub async fn stop(&mut self) -> Result<()> {
        if self.mic == MicState::On {
            self.turn_off().await;
        }
        if let Some(session) = self.session.take() {
            session.stop().await?;
            info!("Session stopped");
        }
        Ok(())
    }

    /// End the session for good and forget it.
    pub async fn end(&mut self) -> Result<()> {
        self.stop().await?;
        GuideSessionRecord::clear(self.store.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::adapter::{
        InputKind, MockConferencingSession, MockSessionFactory, SessionCall,
    };
    use crate::session::device::MockVoiceIsolation;
    use crate::session::store::MemorySessionStore;

    fn meeting() -> MeetingInfo {
        MeetingInfo {
            meeting_id: "m-1".to_string(),
            attendee_id: "a-1".to_string(),
            external_meeting_id: None,
        }
    }

    fn target() -> OutputTarget {
        OutputTarget {
            element_id: "audioElementListener".to_string(),
        }
    }

    fn manager_with(
        session: &MockConferencingSession,
        isolation: MockVoiceIsolation,
        store: &MemorySessionStore,
    ) -> LifecycleManager {
        LifecycleManager::new(
            &Config::default(),
            Arc::new(MockSessionFactory::new(session.clone())),
            Arc::new(store.clone()),
            Arc::new(isolation),
        )
        .unwrap()
    }

    fn mics() -> Vec<Device> {
        vec![Device::input("mic-1", "USB Mic"), Device::input("mic-2", "Built-in")]
    }

    async fn started(
        session: &MockConferencingSession,
        isolation: MockVoiceIsolation,
    ) -> LifecycleManager {
        let store = MemorySessionStore::new();
        let mut manager = manager_with(session, isolation, &store);
        manager.start(meeting()).await.unwrap();
        manager
    }

    #[tokio::test]
    async fn test_start_writes_record() {
        let session = MockConferencingSession::new();
        let store = MemorySessionStore::new();
        store.set("Main-Guide", "stale").unwrap();
        let mut manager = manager_with(&session, MockVoiceIsolation::unsupported(), &store);

        let created = manager.start(meeting()).await.unwrap();

        assert_eq!(created.meeting(), &meeting());
        let record = GuideSessionRecord::load(&store, SystemTime::now()).unwrap().unwrap();
        assert_eq!(record.meeting, meeting());
        assert_eq!(record.target_language.as_str(), "en-US");
    }

    #[tokio::test]
    async fn test_resume_uses_stored_meeting() {
        let session = MockConferencingSession::new();
        let store = MemorySessionStore::new();
        GuideSessionRecord::new(meeting(), LanguageCode::parse("ja-JP").unwrap(), SystemTime::now())
            .save(&store)
            .unwrap();
        let mut manager = manager_with(&session, MockVoiceIsolation::unsupported(), &store);

        let resumed = manager.resume().await.unwrap().unwrap();

        assert_eq!(resumed.meeting().meeting_id, "m-1");
        assert_eq!(manager.target_language().as_str(), "ja-JP");
    }

    #[tokio::test]
    async fn test_resume_without_record() {
        let session = MockConferencingSession::new();
        let store = MemorySessionStore::new();
        let mut manager = manager_with(&session, MockVoiceIsolation::unsupported(), &store);
        assert!(manager.resume().await.unwrap().is_none());
        assert!(manager.session().is_none());
    }

    #[tokio::test]
    async fn test_initialize_without_target_is_fatal() {
        let session = MockConferencingSession::new().with_output_devices(vec![Device::output("spk", "Speaker")]);
        let mut manager = started(&session, MockVoiceIsolation::unsupported()).await;

        assert!(matches!(
            manager.initialize(None).await,
            Err(GuidecastError::MissingOutputTarget { .. })
        ));
        assert!(!session.calls().contains(&SessionCall::Start));
    }

    #[tokio::test]
    async fn test_initialize_with_unbindable_target_is_fatal() {
        let session = MockConferencingSession::new().with_bind_failure();
        let mut manager = started(&session, MockVoiceIsolation::unsupported()).await;

        assert!(matches!(
            manager.initialize(Some(&target())).await,
            Err(GuidecastError::MissingOutputTarget { .. })
        ));
        assert!(session.calls().is_empty());
    }

    #[tokio::test]
    async fn test_initialize_selects_first_output() {
        let session = MockConferencingSession::new()
            .with_output_devices(vec![Device::output("spk-1", "Speaker"), Device::output("spk-2", "HDMI")])
            .with_input_devices(mics());
        let mut manager = started(&session, MockVoiceIsolation::supported()).await;

        let report = manager.initialize(Some(&target())).await.unwrap();

        assert_eq!(report.output, OutputSelection::Selected(Device::output("spk-1", "Speaker")));
        assert_eq!(report.microphones, MicrophoneStatus::Available(mics()));
        assert!(report.voice_isolation);
        assert_eq!(manager.selected_input().map(|d| d.id.as_str()), Some("mic-1"));
        assert_eq!(
            session.calls(),
            vec![
                SessionCall::BindAudioElement("audioElementListener".to_string()),
                SessionCall::ChooseAudioOutput("spk-1".to_string()),
                SessionCall::Start,
            ]
        );
    }

    #[tokio::test]
    async fn test_no_output_device_is_reported() {
        let session = MockConferencingSession::new();
        let mut manager = started(&session, MockVoiceIsolation::unsupported()).await;
        assert_eq!(manager.select_output().await.unwrap(), OutputSelection::NoOutputDevice);
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_microphone_after_grace_period() {
        let session = MockConferencingSession::new().with_input_devices(vec![Device::input("x", "")]);
        let mut manager = started(&session, MockVoiceIsolation::unsupported()).await;

        let before = tokio::time::Instant::now();
        let status = manager.detect_microphones().await.unwrap();

        assert_eq!(status, MicrophoneStatus::NotDetected);
        assert!(before.elapsed() >= Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_labels_populating_during_grace_period() {
        let session = MockConferencingSession::new();
        let mut manager = started(&session, MockVoiceIsolation::unsupported()).await;

        let updater = session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(2)).await;
            updater.set_input_devices(mics());
        });

        let status = manager.detect_microphones().await.unwrap();
        assert_eq!(status, MicrophoneStatus::Available(mics()));
    }

    #[tokio::test]
    async fn test_probe_failure_falls_back_to_raw_device() {
        let session = MockConferencingSession::new().with_input_devices(mics());
        let mut manager = started(&session, MockVoiceIsolation::supported().with_probe_failure()).await;

        assert!(!manager.probe_voice_isolation().await);
        manager.detect_microphones().await.unwrap();
        manager.toggle_microphone().await.unwrap();

        assert_eq!(session.capturing(), Some(InputKind::Device("mic-1".to_string())));
    }

    #[tokio::test]
    async fn test_disabled_isolation_is_not_probed() {
        let session = MockConferencingSession::new();
        let store = MemorySessionStore::new();
        let mut config = Config::default();
        config.voice_isolation.enabled = false;
        let mut manager = LifecycleManager::new(
            &config,
            Arc::new(MockSessionFactory::new(session.clone())),
            Arc::new(store),
            Arc::new(MockVoiceIsolation::supported()),
        )
        .unwrap();
        assert!(!manager.probe_voice_isolation().await);
    }

    #[tokio::test]
    async fn test_toggle_uses_transformed_device() {
        let session = MockConferencingSession::new().with_input_devices(mics());
        let isolation = MockVoiceIsolation::supported();
        let mut manager = started(&session, isolation.clone()).await;
        manager.probe_voice_isolation().await;
        manager.detect_microphones().await.unwrap();

        manager.toggle_microphone().await.unwrap();

        assert_eq!(session.capturing(), Some(InputKind::Transformed("mic-1".to_string())));
        assert_eq!(isolation.transform_count(), 1);
    }

    #[tokio::test]
    async fn test_transform_failure_falls_back_to_raw_device() {
        let session = MockConferencingSession::new().with_input_devices(mics());
        let mut manager = started(&session, MockVoiceIsolation::supported().with_transform_failure()).await;
        manager.probe_voice_isolation().await;
        manager.detect_microphones().await.unwrap();

        manager.toggle_microphone().await.unwrap();

        assert_eq!(session.capturing(), Some(InputKind::Device("mic-1".to_string())));
    }

    #[tokio::test]
    async fn test_toggle_ordering() {
        let session = MockConferencingSession::new().with_input_devices(mics());
        let mut manager = started(&session, MockVoiceIsolation::unsupported()).await;
        manager.detect_microphones().await.unwrap();

        assert_eq!(manager.toggle_microphone().await.unwrap(), MicState::On);
        assert_eq!(manager.toggle_microphone().await.unwrap(), MicState::Off);
        assert_eq!(manager.toggle_microphone().await.unwrap(), MicState::On);

        assert_eq!(
            session.calls(),
            vec![
                SessionCall::StartAudioInput(InputKind::Device("mic-1".to_string())),
                SessionCall::Unmute,
                SessionCall::Mute,
                SessionCall::StopAudioInput,
                SessionCall::StartAudioInput(InputKind::Device("mic-1".to_string())),
                SessionCall::Unmute,
            ]
        );
        assert!(!session.is_muted());
        assert!(session.capturing().is_some());
    }

    #[tokio::test]
    async fn test_permission_denied_reverts_to_off() {
        let session = MockConferencingSession::new()
            .with_input_devices(mics())
            .with_input_error(DeviceError::PermissionDenied {
                message: "NotAllowedError".to_string(),
            });
        let mut manager = started(&session, MockVoiceIsolation::unsupported()).await;
        manager.detect_microphones().await.unwrap();

        let err = manager.toggle_microphone().await.unwrap_err();

        assert!(err.is_permission_denied());
        assert_eq!(manager.mic_state(), MicState::Off);
        assert!(!session.calls().contains(&SessionCall::Unmute));
    }

    #[tokio::test]
    async fn test_unavailable_device_reverts_to_off() {
        let session = MockConferencingSession::new()
            .with_input_devices(mics())
            .with_input_error(DeviceError::Unavailable {
                message: "busy".to_string(),
            });
        let mut manager = started(&session, MockVoiceIsolation::unsupported()).await;
        manager.detect_microphones().await.unwrap();

        let err = manager.toggle_microphone().await.unwrap_err();

        assert!(matches!(err, GuidecastError::Device(DeviceError::Unavailable { .. })));
        assert_eq!(manager.mic_state(), MicState::Off);
    }

    #[tokio::test]
    async fn test_toggle_without_microphone() {
        let session = MockConferencingSession::new();
        let mut manager = started(&session, MockVoiceIsolation::unsupported()).await;
        assert!(matches!(
            manager.toggle_microphone().await,
            Err(GuidecastError::Device(DeviceError::Unavailable { .. }))
        ));
        assert_eq!(manager.mic_state(), MicState::Off);
    }

    #[tokio::test]
    async fn test_select_input_while_on_switches_capture() {
        let session = MockConferencingSession::new().with_input_devices(mics());
        let mut manager = started(&session, MockVoiceIsolation::unsupported()).await;
        manager.detect_microphones().await.unwrap();
        manager.toggle_microphone().await.unwrap();

        manager.select_input("mic-2").await.unwrap();

        assert_eq!(session.capturing(), Some(InputKind::Device("mic-2".to_string())));
        assert!(manager.select_input("nope").await.is_err());
    }

    #[tokio::test]
    async fn test_device_change_notifications() {
        let session = MockConferencingSession::new();
        let manager = started(&session, MockVoiceIsolation::unsupported()).await;
        let mut changes = manager.watch_device_changes().unwrap();

        session.emit_device_change();

        assert!(changes.changed().await);
    }

    #[tokio::test]
    async fn test_stop_keeps_record_and_end_clears_it() {
        let session = MockConferencingSession::new().with_input_devices(mics());
        let store = MemorySessionStore::new();
        let mut manager = manager_with(&session, MockVoiceIsolation::unsupported(), &store);
        manager.start(meeting()).await.unwrap();
        manager.detect_microphones().await.unwrap();
        manager.toggle_microphone().await.unwrap();

        manager.stop().await.unwrap();

        assert_eq!(manager.mic_state(), MicState::Off);
        assert!(session.calls().ends_with(&[
            SessionCall::Mute,
            SessionCall::StopAudioInput,
            SessionCall::Stop
        ]));
        assert!(store.get("Main-Guide").unwrap().is_some());

        manager.resume().await.unwrap();
        manager.end().await.unwrap();
        assert!(store.get("Main-Guide").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_operations_require_session() {
        let session = MockConferencingSession::new();
        let store = MemorySessionStore::new();
        let mut manager = manager_with(&session, MockVoiceIsolation::unsupported(), &store);
        assert!(matches!(
            manager.initialize(Some(&target())).await,
            Err(GuidecastError::Session { .. })
        ));
        assert!(manager.list_input_devices().await.is_err());
    }
}
