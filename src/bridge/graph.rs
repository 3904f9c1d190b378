//! The shared audio processing graph.
//!
//! source → gain → fan-out { local monitor, captured stream }
//!
//! The graph is built once per session. Switching between clips and
//! synthesized speech only swaps what the source stage reads; gain and
//! fan-out stay in place.

use crate::audio::MonitorOutput;
use crate::bridge::clip::ClipCategory;
use crate::config::BridgeConfig;
use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::broadcast;
use tracing::{debug, trace};

/// What the source stage is reading.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum MediaId {
    Clip(ClipCategory),
    Speech(u64),
}

/// Media that lost the source stage to a new load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Displaced {
    pub media: MediaId,
    pub position: usize,
    pub was_playing: bool,
}

#[derive(Debug, Default)]
struct SourceStage {
    media: Option<MediaId>,
    samples: Arc<Vec<i16>>,
    position: usize,
    playing: bool,
    /// Rendered through to the end since the last load.
    finished: bool,
}

/// Fixed amplification with saturation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainStage {
    factor: f32,
}

impl GainStage {
    pub fn new(factor: f32) -> Self {
        Self { factor }
    }

    pub fn factor(&self) -> f32 {
        self.factor
    }

    pub fn apply(&self, samples: &mut [i16]) {
        for sample in samples.iter_mut() {
            let scaled = (*sample as f32 * self.factor).round();
            *sample = scaled.clamp(i16::MIN as f32, i16::MAX as f32) as i16;
        }
    }
}

/// Receiving end of the graph's captured stream.
///
/// Registered with the conferencing session as the outbound microphone.
/// Each message is one rendered quantum.
#[derive(Debug, Clone)]
pub struct CapturedStream {
    receiver: Receiver<Vec<i16>>,
    sample_rate: u32,
}

impl CapturedStream {
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn try_recv(&self) -> Option<Vec<i16>> {
        self.receiver.try_recv().ok()
    }

    pub fn recv_timeout(&self, timeout: Duration) -> Option<Vec<i16>> {
        self.receiver.recv_timeout(timeout).ok()
    }

    /// Take every quantum buffered so far, concatenated.
    pub fn drain(&self) -> Vec<i16> {
        self.receiver.try_iter().flatten().collect()
    }
}

struct FanOut {
    monitor: Arc<dyn MonitorOutput>,
    capture: Sender<Vec<i16>>,
}

impl FanOut {
    fn send(&self, frame: Vec<i16>) {
        self.monitor.write(&frame);
        match self.capture.try_send(frame) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => trace!("Captured stream full, dropping quantum"),
            Err(TrySendError::Disconnected(_)) => {}
        }
    }
}

pub struct AudioGraph {
    source: Mutex<SourceStage>,
    gain: GainStage,
    fan_out: FanOut,
    captured: CapturedStream,
    quantum_samples: usize,
    finish_notifier: Option<broadcast::Sender<MediaId>>,
}

impl AudioGraph {
    pub fn new(config: &BridgeConfig, monitor: Arc<dyn MonitorOutput>) -> Self {
        let (capture, receiver) = bounded(config.capture_buffer_frames);
        Self {
            source: Mutex::new(SourceStage::default()),
            gain: GainStage::new(config.gain),
            fan_out: FanOut { monitor, capture },
            captured: CapturedStream {
                receiver,
                sample_rate: config.sample_rate,
            },
            quantum_samples: config.quantum_samples().max(1),
            finish_notifier: None,
        }
    }

    /// Announce on `sender` every media that plays through to its end.
    pub fn with_finish_notifier(mut self, sender: broadcast::Sender<MediaId>) -> Self {
        self.finish_notifier = Some(sender);
        self
    }

    fn source(&self) -> std::sync::MutexGuard<'_, SourceStage> {
        self.source.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn captured_stream(&self) -> CapturedStream {
        self.captured.clone()
    }

    pub fn gain(&self) -> GainStage {
        self.gain
    }

    pub fn quantum_samples(&self) -> usize {
        self.quantum_samples
    }

    /// Point the source stage at `samples` and start playing from `start_at`.
    ///
    /// Returns the media previously loaded, if it was something else.
    pub fn load(&self, media: MediaId, samples: Arc<Vec<i16>>, start_at: usize) -> Option<Displaced> {
        let mut source = self.source();
        let displaced = source
            .media
            .take()
            .filter(|previous| *previous != media)
            .map(|previous| Displaced {
                media: previous,
                position: source.position,
                was_playing: source.playing,
            });

        debug!(?media, start_at, len = samples.len(), "Loading source");
        source.position = start_at.min(samples.len());
        source.samples = samples;
        source.media = Some(media);
        source.playing = true;
        source.finished = false;
        displaced
    }

    /// Stop playing `media` and return where it stopped.
    pub fn pause(&self, media: &MediaId) -> Option<usize> {
        let mut source = self.source();
        if source.media.as_ref() != Some(media) {
            return None;
        }
        source.playing = false;
        Some(source.position)
    }

    /// Unload `media` if it is the current source.
    pub fn stop(&self, media: &MediaId) -> bool {
        let mut source = self.source();
        if source.media.as_ref() != Some(media) {
            return false;
        }
        *source = SourceStage::default();
        true
    }

    /// Stop whatever is playing.
    pub fn halt(&self) {
        self.source().playing = false;
    }

    /// The media currently producing sound.
    pub fn active(&self) -> Option<MediaId> {
        let source = self.source();
        source.playing.then(|| source.media.clone()).flatten()
    }

    /// The loaded media, if it has played through to its end.
    pub fn finished(&self) -> Option<MediaId> {
        let source = self.source();
        source.finished.then(|| source.media.clone()).flatten()
    }

    /// The loaded media and its position, playing or not.
    pub fn loaded(&self) -> Option<(MediaId, usize)> {
        let source = self.source();
        source.media.clone().map(|m| (m, source.position))
    }

    /// Render one quantum through gain and fan-out.
    ///
    /// Produces nothing while idle. The final quantum of a buffer is padded
    /// with silence, after which the source stops.
    pub fn render_quantum(&self) -> Option<Vec<i16>> {
        let mut finished = None;
        let mut frame = {
            let mut source = self.source();
            if !source.playing {
                return None;
            }
            let start = source.position;
            let end = (start + self.quantum_samples).min(source.samples.len());
            let mut frame = source.samples[start..end].to_vec();
            frame.resize(self.quantum_samples, 0);
            source.position = end;
            if end >= source.samples.len() {
                debug!(media = ?source.media, "Source finished");
                source.playing = false;
                source.finished = true;
                finished = source.media.clone();
            }
            frame
        };

        if let Some(media) = finished
            && let Some(notifier) = &self.finish_notifier
            && notifier.send(media).is_err()
        {
            trace!("No playback listeners");
        }

        self.gain.apply(&mut frame);
        self.fan_out.send(frame.clone());
        Some(frame)
    }
}
