//! Decoding of clips and synthesized speech into graph-rate PCM.
//!
//! WAV containers go through hound. Raw `audio/pcm` / `audio/L16` payloads
//! are read as signed 16-bit little-endian with `rate` and `channels` taken
//! from the content-type parameters. Compressed audio (MP3 from the speech
//! service, uploaded MP3/OGG/FLAC clips) goes through symphonia.

use crate::error::{GuidecastError, Result};
use std::io::Cursor;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use tracing::debug;

/// Mono 16-bit PCM at a known sample rate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct PcmBuffer {
    pub samples: Vec<i16>,
    pub sample_rate: u32,
}

impl PcmBuffer {
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Parsed `type/subtype; key=value` content type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaType {
    pub essence: String,
    params: Vec<(String, String)>,
}

impl MediaType {
    pub fn parse(content_type: &str) -> Self {
        let mut parts = content_type.split(';');
        let essence = parts.next().unwrap_or_default().trim().to_ascii_lowercase();
        let params = parts
            .filter_map(|p| p.split_once('='))
            .map(|(k, v)| {
                (
                    k.trim().to_ascii_lowercase(),
                    v.trim().trim_matches('"').to_string(),
                )
            })
            .collect();
        Self { essence, params }
    }

    pub fn param(&self, key: &str) -> Option<&str> {
        self.params
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// True for any `audio/*` type.
    pub fn is_audio(&self) -> bool {
        self.essence
            .split_once('/')
            .is_some_and(|(top, sub)| top == crate::defaults::AUDIO_MIME_PREFIX && !sub.is_empty())
    }

    fn is_wav(&self) -> bool {
        matches!(
            self.essence.as_str(),
            "audio/wav" | "audio/x-wav" | "audio/wave" | "audio/vnd.wave"
        )
    }

    fn is_raw_pcm(&self) -> bool {
        matches!(
            self.essence.as_str(),
            "audio/pcm" | "audio/l16" | "audio/x-raw"
        )
    }
}

/// Decode `bytes` and resample to `target_rate` mono.
pub fn decode(bytes: &[u8], content_type: &str, target_rate: u32) -> Result<PcmBuffer> {
    let media = MediaType::parse(content_type);

    let (samples, rate, channels) = if bytes.starts_with(b"RIFF") || media.is_wav() {
        decode_wav(bytes)?
    } else if media.is_raw_pcm() {
        decode_raw(bytes, &media, target_rate)?
    } else {
        decode_compressed(bytes, &media)?
    };

    let mono = mix_to_mono(samples, channels);
    Ok(PcmBuffer {
        samples: resample(&mono, rate, target_rate),
        sample_rate: target_rate,
    })
}

fn decode_wav(bytes: &[u8]) -> Result<(Vec<i16>, u32, u16)> {
    let mut reader =
        hound::WavReader::new(Cursor::new(bytes)).map_err(|e| GuidecastError::Decode {
            message: format!("Failed to parse WAV data: {}", e),
        })?;

    let spec = reader.spec();
    let read_err = |e: hound::Error| GuidecastError::Decode {
        message: format!("Failed to read WAV samples: {}", e),
    };

    let samples: Vec<i16> = match (spec.sample_format, spec.bits_per_sample) {
        (hound::SampleFormat::Int, bits) if bits <= 16 => reader
            .samples::<i16>()
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(read_err)?,
        (hound::SampleFormat::Int, bits) => {
            let shift = bits.saturating_sub(16);
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| (v >> shift) as i16))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(read_err)?
        }
        (hound::SampleFormat::Float, _) => reader
            .samples::<f32>()
            .map(|s| s.map(|v| (v.clamp(-1.0, 1.0) * i16::MAX as f32) as i16))
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(read_err)?,
    };

    Ok((samples, spec.sample_rate, spec.channels))
}

fn decode_raw(bytes: &[u8], media: &MediaType, default_rate: u32) -> Result<(Vec<i16>, u32, u16)> {
    let rate = parse_param(media, "rate")?.unwrap_or(default_rate);
    let channels = parse_param(media, "channels")?.unwrap_or(1);
    if rate == 0 || channels == 0 {
        return Err(GuidecastError::Decode {
            message: "rate and channels must be positive".to_string(),
        });
    }
    let channels = u16::try_from(channels).map_err(|_| GuidecastError::Decode {
        message: format!("unsupported channel count {}", channels),
    })?;

    if bytes.len() % 2 != 0 {
        return Err(GuidecastError::Decode {
            message: format!("raw PCM payload has odd length {}", bytes.len()),
        });
    }

    let samples = bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect();

    Ok((samples, rate, channels))
}

fn decode_compressed(bytes: &[u8], media: &MediaType) -> Result<(Vec<i16>, u32, u16)> {
    let decode_err = |context: &str, e: SymphoniaError| GuidecastError::Decode {
        message: format!("{} {}: {}", context, media.essence, e),
    };

    let stream = MediaSourceStream::new(Box::new(Cursor::new(bytes.to_vec())), Default::default());
    let mut hint = Hint::new();
    hint.mime_type(&media.essence);
    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            stream,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| decode_err("Unrecognized", e))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| GuidecastError::Decode {
            message: format!("no audio track in {}", media.essence),
        })?;
    let track_id = track.id;
    let mut rate = track.codec_params.sample_rate.unwrap_or(0);
    let mut channels = track
        .codec_params
        .channels
        .map(|c| c.count() as u16)
        .unwrap_or(1);
    let mut decoder = symphonia::default::get_codecs()
        .make(&track.codec_params, &DecoderOptions::default())
        .map_err(|e| decode_err("No decoder for", e))?;

    let mut samples = Vec::new();
    loop {
        let packet = match format.next_packet() {
            Ok(packet) => packet,
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                break;
            }
            Err(e) if !samples.is_empty() => {
                debug!(error = %e, "Stopping at unreadable packet");
                break;
            }
            Err(e) => return Err(decode_err("Failed to read", e)),
        };
        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(decoded) => {
                let spec = *decoded.spec();
                rate = spec.rate;
                channels = spec.channels.count() as u16;
                let mut buffer = SampleBuffer::<i16>::new(decoded.capacity() as u64, spec);
                buffer.copy_interleaved_ref(decoded);
                samples.extend_from_slice(buffer.samples());
            }
            Err(SymphoniaError::DecodeError(e)) => debug!(error = e, "Skipping corrupt packet"),
            Err(e) => return Err(decode_err("Failed to decode", e)),
        }
    }

    if samples.is_empty() || rate == 0 {
        return Err(GuidecastError::Decode {
            message: format!("{} payload decoded to no audio", media.essence),
        });
    }
    Ok((samples, rate, channels.max(1)))
}

fn parse_param(media: &MediaType, key: &str) -> Result<Option<u32>> {
    media
        .param(key)
        .map(|v| {
            v.parse::<u32>().map_err(|_| GuidecastError::Decode {
                message: format!("invalid {} parameter {:?}", key, v),
            })
        })
        .transpose()
}

fn mix_to_mono(samples: Vec<i16>, channels: u16) -> Vec<i16> {
    if channels <= 1 {
        return samples;
    }
    samples
        .chunks_exact(channels as usize)
        .map(|frame| {
            let sum: i32 = frame.iter().map(|&s| s as i32).sum();
            (sum / channels as i32) as i16
        })
        .collect()
}

/// Simple linear interpolation resampling.
pub fn resample(samples: &[i16], from_rate: u32, to_rate: u32) -> Vec<i16> {
    if from_rate == to_rate || samples.is_empty() {
        return samples.to_vec();
    }

    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let source_pos = i as f64 * ratio;
            let source_idx = (source_pos.floor() as usize).min(samples.len() - 1);
            let fraction = source_pos - source_idx as f64;

            match samples.get(source_idx + 1) {
                Some(&right) => {
                    let left = samples[source_idx] as f64;
                    (left + (right as f64 - left) * fraction) as i16
                }
                None => samples[source_idx],
            }
        })
        .collect()
}
