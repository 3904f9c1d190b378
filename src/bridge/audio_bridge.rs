//! Clip injection and speech playback over one shared graph.

use crate::audio::{self, MonitorOutput, NullMonitor};
use crate::bridge::clip::{
    ClipBoard, ClipCategory, ClipFile, ClipSlot, ClipState, UploadedClip, validate_clip,
};
use crate::bridge::graph::{AudioGraph, CapturedStream, Displaced, MediaId};
use crate::bridge::storage::ObjectStorage;
use crate::config::BridgeConfig;
use crate::defaults;
use crate::error::{GuidecastError, Result};
use crate::session::{AudioInput, ConferencingSession};
use crate::transcript::SequenceTracker;
use crate::translate::SynthesizedSpeech;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, OnceCell, broadcast};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

/// Result of handing synthesized speech to the bridge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SpeechPlayback {
    Played { sequence: u64 },
    /// A newer utterance was issued before this one could play.
    Discarded { sequence: u64, latest: u64 },
}

/// Owns the session's audio graph and the uploaded clips.
///
/// The graph is built on first use by whichever of clip playback or speech
/// playback gets there first, and never again for the life of the bridge.
pub struct AudioBridge {
    config: BridgeConfig,
    session: Arc<dyn ConferencingSession>,
    storage: Arc<dyn ObjectStorage>,
    monitor: Arc<dyn MonitorOutput>,
    latest: SequenceTracker,
    graph: OnceCell<Arc<AudioGraph>>,
    graph_builds: AtomicUsize,
    clips: Mutex<ClipBoard>,
    renderer: StdMutex<Option<JoinHandle<()>>>,
    finished: broadcast::Sender<MediaId>,
}

impl AudioBridge {
    pub fn new(
        config: BridgeConfig,
        session: Arc<dyn ConferencingSession>,
        storage: Arc<dyn ObjectStorage>,
        latest: SequenceTracker,
    ) -> Self {
        Self {
            config,
            session,
            storage,
            monitor: Arc::new(NullMonitor),
            latest,
            graph: OnceCell::new(),
            graph_builds: AtomicUsize::new(0),
            clips: Mutex::new(ClipBoard::default()),
            renderer: StdMutex::new(None),
            finished: broadcast::channel(defaults::PLAYBACK_EVENT_CAPACITY).0,
        }
    }

    /// Route the graph's monitor branch to `monitor`. Takes effect when the
    /// graph is built.
    pub fn with_monitor(mut self, monitor: Arc<dyn MonitorOutput>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn sequence(&self) -> &SequenceTracker {
        &self.latest
    }

    /// Validate, upload and store a clip for `category`.
    ///
    /// Replaces any clip already in the category, stopping it if it was
    /// playing. On any error the category is left as it was.
    pub async fn upload(&self, category: ClipCategory, file: ClipFile) -> Result<UploadedClip> {
        validate_clip(&file, self.config.max_clip_bytes)?;

        let object_name = format!("{}/{}", category, file.name);
        let stored = self
            .storage
            .upload(&object_name, &file.bytes, &file.mime_type)
            .await?;

        let clip = UploadedClip {
            category: category.clone(),
            display_name: file.name.clone(),
            remote_url: stored.url,
        };

        let mut clips = self.clips.lock().await;
        if let Some(previous) = clips.insert(category.clone(), ClipSlot::new(clip.clone(), file))
            && previous.state == ClipState::Playing
            && let Some(graph) = self.graph.get()
        {
            graph.stop(&MediaId::Clip(category.clone()));
        }

        info!(category = %category, url = %clip.remote_url, "Clip uploaded");
        Ok(clip)
    }

    /// Toggle playback of `category`.
    ///
    /// Ready or Paused starts playing (pausing any other category); Playing
    /// pauses. Fails with [`GuidecastError::State`] on an empty category
    /// without touching anything.
    pub async fn play_pause(&self, category: &ClipCategory) -> Result<ClipState> {
        let mut clips = self.clips.lock().await;
        self.settle_finished(&mut clips);
        let media = MediaId::Clip(category.clone());

        let slot = match clips.get_mut(category) {
            Some(slot) => slot,
            None => {
                return Err(GuidecastError::State {
                    message: format!("no clip uploaded for {}", category),
                });
            }
        };

        if slot.state == ClipState::Playing {
            if let Some(graph) = self.graph.get()
                && let Some(position) = graph.pause(&media)
            {
                slot.position = position;
            }
            slot.state = ClipState::Paused;
            debug!(category = %category, position = slot.position, "Clip paused");
            return Ok(ClipState::Paused);
        }

        let samples = match &slot.decoded {
            Some(samples) => Arc::clone(samples),
            None => {
                let pcm = audio::decode(&slot.file.bytes, &slot.file.mime_type, self.config.sample_rate)?;
                let samples = Arc::new(pcm.samples);
                slot.decoded = Some(Arc::clone(&samples));
                samples
            }
        };
        let start_at = if slot.position >= samples.len() {
            0
        } else {
            slot.position
        };

        let graph = self.ensure_graph().await?;

        if let Some(displaced) = graph.load(media, samples, start_at) {
            record_displaced(&mut clips, displaced);
        }
        clips.pause_others(category);
        if let Some(slot) = clips.get_mut(category) {
            slot.state = ClipState::Playing;
            slot.position = start_at;
        }

        debug!(category = %category, start_at, "Clip playing");
        Ok(ClipState::Playing)
    }

    /// Drop the clip in `category`, stopping it if it is the current source.
    /// The graph itself stays.
    pub async fn remove(&self, category: &ClipCategory) {
        let mut clips = self.clips.lock().await;
        if clips.remove(category).is_some() {
            if let Some(graph) = self.graph.get() {
                graph.stop(&MediaId::Clip(category.clone()));
            }
            info!(category = %category, "Clip removed");
        }
    }

    /// Play speech if it is still the latest utterance.
    ///
    /// Staleness is checked on arrival and again right before the source is
    /// swapped, since building the graph can suspend.
    pub async fn play_synthesized_speech(&self, speech: SynthesizedSpeech) -> Result<SpeechPlayback> {
        let sequence = speech.sequence;
        if let Some(discarded) = self.discard_if_stale(sequence) {
            return Ok(discarded);
        }

        let pcm = audio::decode(&speech.audio_bytes, &speech.content_type, self.config.sample_rate)?;
        let graph = self.ensure_graph().await?;

        let mut clips = self.clips.lock().await;
        if let Some(discarded) = self.discard_if_stale(sequence) {
            return Ok(discarded);
        }
        if let Some(displaced) = graph.load(MediaId::Speech(sequence), Arc::new(pcm.samples), 0) {
            record_displaced(&mut clips, displaced);
        }

        debug!(sequence, "Playing synthesized speech");
        Ok(SpeechPlayback::Played { sequence })
    }

    fn discard_if_stale(&self, sequence: u64) -> Option<SpeechPlayback> {
        let latest = self.latest.current();
        (latest != sequence).then(|| {
            debug!(sequence, latest, "Discarding stale speech");
            SpeechPlayback::Discarded { sequence, latest }
        })
    }

    /// Build the graph on first call; later calls return the same graph.
    ///
    /// Building registers the graph's captured stream as the session's
    /// audio input and starts the render loop.
    pub async fn ensure_graph(&self) -> Result<Arc<AudioGraph>> {
        self.graph
            .get_or_try_init(|| async {
                let graph = Arc::new(
                    AudioGraph::new(&self.config, Arc::clone(&self.monitor))
                        .with_finish_notifier(self.finished.clone()),
                );
                self.session
                    .start_audio_input(AudioInput::Stream(graph.captured_stream()))
                    .await?;

                let handle = spawn_renderer(Arc::clone(&graph), self.config.quantum_duration());
                if let Ok(mut renderer) = self.renderer.lock() {
                    *renderer = Some(handle);
                }

                let builds = self.graph_builds.fetch_add(1, Ordering::SeqCst) + 1;
                info!(
                    builds,
                    gain = self.config.gain,
                    monitor = self.monitor.name(),
                    "Audio graph built"
                );
                Ok::<_, GuidecastError>(graph)
            })
            .await
            .cloned()
    }

    pub fn graph_builds(&self) -> usize {
        self.graph_builds.load(Ordering::SeqCst)
    }

    pub fn is_graph_built(&self) -> bool {
        self.graph.initialized()
    }

    pub fn captured_stream(&self) -> Option<CapturedStream> {
        self.graph.get().map(|g| g.captured_stream())
    }

    /// Media currently producing sound.
    pub fn active_media(&self) -> Option<MediaId> {
        self.graph.get().and_then(|g| g.active())
    }

    pub async fn state(&self, category: &ClipCategory) -> ClipState {
        let mut clips = self.clips.lock().await;
        self.settle_finished(&mut clips);
        clips.state(category)
    }

    /// Media that played through to its end. A finished clip returns to
    /// [`ClipState::Ready`].
    pub fn subscribe_finished(&self) -> broadcast::Receiver<MediaId> {
        self.finished.subscribe()
    }

    fn settle_finished(&self, clips: &mut ClipBoard) {
        if let Some(graph) = self.graph.get()
            && let Some(MediaId::Clip(category)) = graph.finished()
        {
            clips.mark_finished(&category);
        }
    }

    pub async fn clip(&self, category: &ClipCategory) -> Option<UploadedClip> {
        self.clips.lock().await.get(category).map(|s| s.clip.clone())
    }

    pub async fn clips(&self) -> Vec<UploadedClip> {
        self.clips.lock().await.clips()
    }

    /// Stop the render loop. Clips and the graph stay in place.
    pub fn shutdown(&self) {
        if let Some(graph) = self.graph.get() {
            graph.halt();
        }
        if let Ok(mut renderer) = self.renderer.lock()
            && let Some(handle) = renderer.take()
        {
            handle.abort();
        }
    }
}

impl Drop for AudioBridge {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn record_displaced(clips: &mut ClipBoard, displaced: Displaced) {
    if let MediaId::Clip(category) = displaced.media
        && displaced.was_playing
    {
        clips.mark_interrupted(&category, displaced.position);
    }
}

fn spawn_renderer(graph: Arc<AudioGraph>, quantum: std::time::Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(quantum);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            graph.render_quantum();
        }
    })
}
