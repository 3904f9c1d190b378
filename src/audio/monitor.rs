//! Local monitoring output for the bridge graph.

use std::sync::{Arc, Mutex};

/// Receives every rendered quantum so the operator hears what listeners hear.
///
/// Called from the render loop; implementations must not block.
pub trait MonitorOutput: Send + Sync {
    fn write(&self, samples: &[i16]);

    fn name(&self) -> &str;
}

impl<T: MonitorOutput + ?Sized> MonitorOutput for Arc<T> {
    fn write(&self, samples: &[i16]) {
        (**self).write(samples)
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}

/// Discards everything.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullMonitor;

impl MonitorOutput for NullMonitor {
    fn write(&self, _samples: &[i16]) {}

    fn name(&self) -> &str {
        "null"
    }
}

/// Collects rendered samples in memory. Clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferMonitor {
    samples: Arc<Mutex<Vec<i16>>>,
}

impl BufferMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> Vec<i16> {
        self.samples
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    pub fn len(&self) -> usize {
        self.samples.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl MonitorOutput for BufferMonitor {
    fn write(&self, samples: &[i16]) {
        if let Ok(mut buf) = self.samples.lock() {
            buf.extend_from_slice(samples);
        }
    }

    fn name(&self) -> &str {
        "buffer"
    }
}

#[cfg(feature = "cpal-audio")]
pub use self::cpal_output::CpalMonitor;

#[cfg(feature = "cpal-audio")]
mod cpal_output {
    use super::MonitorOutput;
    use crate::error::{GuidecastError, Result};
    use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use tracing::warn;

    /// Wrapper for cpal::Stream to make it Send.
    ///
    /// SAFETY: The stream is only touched through the Mutex in CpalMonitor and
    /// never used from the audio callback thread.
    struct SendableStream(cpal::Stream);

    unsafe impl Send for SendableStream {}

    /// Plays rendered quanta on the default output device.
    ///
    /// Samples are queued and drained by the device callback; underruns play
    /// silence. The queue is capped at one second to keep latency bounded.
    pub struct CpalMonitor {
        queue: Arc<Mutex<VecDeque<i16>>>,
        capacity: usize,
        _stream: Mutex<SendableStream>,
    }

    impl CpalMonitor {
        pub fn new(sample_rate: u32) -> Result<Self> {
            let host = cpal::default_host();
            let device = host
                .default_output_device()
                .ok_or_else(|| GuidecastError::Other("No output device available".to_string()))?;

            let config = cpal::StreamConfig {
                channels: 1,
                sample_rate: cpal::SampleRate(sample_rate),
                buffer_size: cpal::BufferSize::Default,
            };

            let queue = Arc::new(Mutex::new(VecDeque::new()));
            let reader = Arc::clone(&queue);
            let stream = device
                .build_output_stream(
                    &config,
                    move |data: &mut [i16], _: &cpal::OutputCallbackInfo| {
                        if let Ok(mut queue) = reader.lock() {
                            for sample in data.iter_mut() {
                                *sample = queue.pop_front().unwrap_or(0);
                            }
                        }
                    },
                    |err| warn!(error = %err, "Monitor stream error"),
                    None,
                )
                .map_err(|e| GuidecastError::Other(format!("Failed to open monitor output: {}", e)))?;

            stream
                .play()
                .map_err(|e| GuidecastError::Other(format!("Failed to start monitor output: {}", e)))?;

            Ok(Self {
                queue,
                capacity: sample_rate as usize,
                _stream: Mutex::new(SendableStream(stream)),
            })
        }
    }

    impl MonitorOutput for CpalMonitor {
        fn write(&self, samples: &[i16]) {
            if let Ok(mut queue) = self.queue.lock() {
                queue.extend(samples.iter().copied());
                let overflow = queue.len().saturating_sub(self.capacity);
                queue.drain(..overflow);
            }
        }

        fn name(&self) -> &str {
            "cpal"
        }
    }
}
