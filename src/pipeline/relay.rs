//! The live relay: transcript stream → translation → speech playback.
//!
//! Transcript events are handled one at a time, in arrival order. Each
//! final utterance that needs translating is dispatched as its own task so
//! a slow call never holds up the next utterance; the bridge drops results
//! that are no longer the latest.

use crate::audio::{MonitorOutput, NullMonitor};
use crate::bridge::{AudioBridge, ObjectStorage, SpeechPlayback};
use crate::config::Config;
use crate::defaults;
use crate::error::Result;
use crate::language::LanguageCode;
use crate::pipeline::error::{ErrorReporter, StageError, TracingReporter};
use crate::pipeline::events::{RelayEvent, publish};
use crate::session::{ConferencingSession, PresenceTracker, Subscription};
use crate::transcript::{
    ProcessedEvent, SequenceTracker, TranscriptEvent, TranscriptProcessor, TranslationRequest,
};
use crate::translate::{Orchestrator, SpeechTranslator, TranslationOutcome};
use std::sync::{Arc, Mutex};
use tokio::sync::{broadcast, mpsc};
use tokio::task::{JoinHandle, JoinSet};
use tracing::{debug, info, warn};

/// Builds and starts the relay for one live session.
pub struct RelayPipeline {
    config: Config,
    translator: Arc<dyn SpeechTranslator>,
    storage: Arc<dyn ObjectStorage>,
    monitor: Arc<dyn MonitorOutput>,
    reporter: Arc<dyn ErrorReporter>,
    events: broadcast::Sender<RelayEvent>,
}

impl RelayPipeline {
    pub fn new(
        config: Config,
        translator: Arc<dyn SpeechTranslator>,
        storage: Arc<dyn ObjectStorage>,
    ) -> Self {
        let (events, _) = broadcast::channel(defaults::RELAY_EVENT_CAPACITY);
        Self {
            config,
            translator,
            storage,
            monitor: Arc::new(NullMonitor),
            reporter: Arc::new(TracingReporter),
            events,
        }
    }

    /// Use the HTTP translator and storage named in `config`.
    #[cfg(feature = "http")]
    pub fn from_config(config: Config) -> Result<Self> {
        use crate::bridge::HttpObjectStorage;
        use crate::error::GuidecastError;
        use crate::translate::HttpSpeechTranslator;

        let translator = HttpSpeechTranslator::from_config(&config.translation)?.ok_or_else(|| {
            GuidecastError::ConfigInvalidValue {
                key: "translation.endpoint".to_string(),
                message: "required".to_string(),
            }
        })?;
        let storage = HttpObjectStorage::from_config(&config.storage)?.ok_or_else(|| {
            GuidecastError::ConfigInvalidValue {
                key: "storage.endpoint".to_string(),
                message: "required".to_string(),
            }
        })?;

        Ok(Self::new(config, Arc::new(translator), Arc::new(storage)))
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn MonitorOutput>) -> Self {
        self.monitor = monitor;
        self
    }

    /// Sets a custom error reporter.
    pub fn with_error_reporter(mut self, reporter: Arc<dyn ErrorReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    /// Subscribe to `session` and start relaying.
    pub fn start(self, session: Arc<dyn ConferencingSession>) -> Result<RelayHandle> {
        self.config.validate()?;

        let sequence = SequenceTracker::new();
        let bridge = Arc::new(
            AudioBridge::new(
                self.config.bridge.clone(),
                Arc::clone(&session),
                Arc::clone(&self.storage),
                sequence.clone(),
            )
            .with_monitor(Arc::clone(&self.monitor)),
        );
        let orchestrator = Arc::new(Orchestrator::from_config(
            Arc::clone(&self.translator),
            &self.config.translation,
        )?);
        let processor = TranscriptProcessor::new(self.config.session.target_language()?, sequence.clone())
            .with_fallback_source(self.config.session.fallback_source_language()?);

        let (transcript_tx, transcript_rx) = mpsc::unbounded_channel();
        let transcripts = session.subscribe_transcript_events(Box::new(move |event| {
            if transcript_tx.send(event).is_err() {
                debug!("Relay stopped, dropping transcript event");
            }
        }));

        let presence = Arc::new(Mutex::new(PresenceTracker::new()));
        let presence_events = self.events.clone();
        let tracker = Arc::clone(&presence);
        let attendance = session.subscribe_attendance_presence(Box::new(move |change| {
            let attendees = match tracker.lock() {
                Ok(mut tracker) => tracker.apply(&change),
                Err(_) => return,
            };
            debug!(attendee = %change.attendee_id, present = change.present, attendees, "Presence changed");
            publish(&presence_events, RelayEvent::Presence { attendees });
        }));

        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let relay_loop = RelayLoop {
            processor,
            orchestrator,
            bridge: Arc::clone(&bridge),
            reporter: Arc::clone(&self.reporter),
            events: self.events.clone(),
            dispatches: JoinSet::new(),
        };
        let task = tokio::spawn(relay_loop.run(transcript_rx, control_rx));

        info!(
            meeting_id = %session.meeting().meeting_id,
            target_language = %self.config.session.target_language,
            "Relay started"
        );

        Ok(RelayHandle {
            bridge,
            sequence,
            presence,
            events: self.events,
            control: control_tx,
            subscriptions: vec![transcripts, attendance],
            task,
        })
    }
}

struct RelayLoop {
    processor: TranscriptProcessor,
    orchestrator: Arc<Orchestrator>,
    bridge: Arc<AudioBridge>,
    reporter: Arc<dyn ErrorReporter>,
    events: broadcast::Sender<RelayEvent>,
    dispatches: JoinSet<()>,
}

impl RelayLoop {
    async fn run(
        mut self,
        mut transcripts: mpsc::UnboundedReceiver<TranscriptEvent>,
        mut control: mpsc::UnboundedReceiver<LanguageCode>,
    ) {
        loop {
            tokio::select! {
                Some(event) = transcripts.recv() => self.handle(event),
                Some(code) = control.recv() => {
                    info!(language = %code, "Target language changed");
                    self.processor.set_target_language(code);
                }
                Some(joined) = self.dispatches.join_next(), if !self.dispatches.is_empty() => {
                    if let Err(e) = joined
                        && e.is_panic()
                    {
                        self.reporter.report("dispatch", &StageError::Recoverable(e.to_string()));
                    }
                }
                else => break,
            }
        }
        debug!("Relay loop finished");
    }

    fn handle(&mut self, event: TranscriptEvent) {
        match self.processor.process(&event) {
            ProcessedEvent::Ignored => {}
            ProcessedEvent::SourceLanguage(code) => {
                publish(&self.events, RelayEvent::SourceLanguage { code });
            }
            ProcessedEvent::Final {
                text,
                sequence,
                request,
            } => {
                publish(&self.events, RelayEvent::Caption { sequence, text });
                if let Some(request) = request {
                    self.dispatches.spawn(dispatch(
                        request,
                        Arc::clone(&self.orchestrator),
                        Arc::clone(&self.bridge),
                        Arc::clone(&self.reporter),
                        self.events.clone(),
                    ));
                }
            }
        }
    }
}

/// Translate, synthesize and play one utterance. Errors end here.
async fn dispatch(
    request: TranslationRequest,
    orchestrator: Arc<Orchestrator>,
    bridge: Arc<AudioBridge>,
    reporter: Arc<dyn ErrorReporter>,
    events: broadcast::Sender<RelayEvent>,
) {
    let fail = |stage: &str, message: String| {
        reporter.report(stage, &StageError::Recoverable(message.clone()));
        publish(
            &events,
            RelayEvent::Error {
                stage: stage.to_string(),
                message,
            },
        );
    };

    let speech = match orchestrator.translate_and_speak(&request).await {
        Ok(TranslationOutcome::Speech(speech)) => speech,
        Ok(TranslationOutcome::SameLanguage { .. }) => return,
        Err(e) => {
            fail("translate", e.to_string());
            return;
        }
    };

    let sequence = speech.sequence;
    publish(
        &events,
        RelayEvent::Translated {
            sequence,
            text: speech.translated_text.clone(),
        },
    );

    match bridge.play_synthesized_speech(speech).await {
        Ok(SpeechPlayback::Played { sequence }) => {
            publish(&events, RelayEvent::SpeechPlayed { sequence });
        }
        Ok(SpeechPlayback::Discarded { sequence, latest }) => {
            publish(&events, RelayEvent::SpeechDiscarded { sequence, latest });
        }
        Err(e) => fail("playback", e.to_string()),
    }
}

/// Handle to a running relay.
pub struct RelayHandle {
    bridge: Arc<AudioBridge>,
    sequence: SequenceTracker,
    presence: Arc<Mutex<PresenceTracker>>,
    events: broadcast::Sender<RelayEvent>,
    control: mpsc::UnboundedSender<LanguageCode>,
    subscriptions: Vec<Subscription>,
    task: JoinHandle<()>,
}

impl RelayHandle {
    /// The session's audio bridge, for clip upload and playback.
    pub fn bridge(&self) -> &Arc<AudioBridge> {
        &self.bridge
    }

    pub fn latest_sequence(&self) -> u64 {
        self.sequence.current()
    }

    pub fn attendee_count(&self) -> usize {
        self.presence
            .lock()
            .map(|tracker| tracker.count())
            .unwrap_or_default()
    }

    pub fn subscribe_events(&self) -> broadcast::Receiver<RelayEvent> {
        self.events.subscribe()
    }

    /// Switch the listener language from the next utterance on.
    pub fn set_target_language(&self, code: LanguageCode) -> Result<()> {
        self.control
            .send(code)
            .map_err(|_| crate::error::GuidecastError::Session {
                message: "relay is not running".to_string(),
            })
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Unsubscribe from the session, abandon in-flight translations and stop
    /// the bridge's render loop.
    pub async fn stop(self) {
        for subscription in self.subscriptions {
            subscription.unsubscribe();
        }
        self.task.abort();
        match self.task.await {
            Ok(()) => {}
            Err(e) if e.is_cancelled() => {}
            Err(e) => warn!(error = %e, "Relay loop ended abnormally"),
        }
        self.bridge.shutdown();
        info!("Relay stopped");
    }
}
