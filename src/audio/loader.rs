use std::io::Cursor;
use std::path::Path;
use std::time::Duration;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{CODEC_TYPE_NULL, DecoderOptions};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

use crate::audio::types::{AudioData, AudioFormat};
use crate::error::{AnalysisError, CompositorError, Result};

/// Soundtrack loader: fetches encoded audio and decodes it to PCM
pub struct AudioLoader;

impl AudioLoader {
    /// Download the raw bytes of a soundtrack
    pub async fn fetch_bytes(client: &reqwest::Client, url: &str, timeout: Duration) -> Result<Vec<u8>> {
        let parsed = url::Url::parse(url).map_err(|e| AnalysisError::FetchFailed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(AnalysisError::FetchFailed {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", parsed.scheme()),
            }.into());
        }

        tracing::debug!("Fetching soundtrack from {}", url);

        let download = async {
            let response = client
                .get(parsed)
                .send()
                .await
                .map_err(|e| AnalysisError::FetchFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                })?;

            if !response.status().is_success() {
                return Err(AnalysisError::FetchFailed {
                    url: url.to_string(),
                    reason: format!("HTTP {}", response.status()),
                });
            }

            response
                .bytes()
                .await
                .map(|bytes| bytes.to_vec())
                .map_err(|e| AnalysisError::FetchFailed {
                    url: url.to_string(),
                    reason: e.to_string(),
                })
        };

        match tokio::time::timeout(timeout, download).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CompositorError::Timeout {
                operation: format!("soundtrack download from {}", url),
                seconds: timeout.as_secs_f64(),
            }),
        }
    }

    /// Read and decode a local audio file
    pub async fn load<P: AsRef<Path>>(path: P) -> Result<AudioData> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        Self::decode(bytes, &path.display().to_string())
    }

    /// Decode an in-memory audio file
    ///
    /// WAV goes through `hound`; everything else through Symphonia's probe.
    pub fn decode(bytes: Vec<u8>, source: &str) -> Result<AudioData> {
        if bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE" {
            return Self::decode_wav(bytes, source);
        }
        Self::decode_with_symphonia(bytes, source)
    }

    fn decode_wav(bytes: Vec<u8>, source: &str) -> Result<AudioData> {
        let undecodable = |reason: String| AnalysisError::Undecodable {
            source_name: source.to_string(),
            reason,
        };

        let reader = hound::WavReader::new(Cursor::new(bytes))
            .map_err(|e| undecodable(e.to_string()))?;

        let spec = reader.spec();
        let sample_rate = spec.sample_rate;
        let channels = spec.channels;

        let samples: Vec<f32> = match spec.sample_format {
            hound::SampleFormat::Float => reader
                .into_samples::<f32>()
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(|e| undecodable(e.to_string()))?,
            hound::SampleFormat::Int => {
                let bit_depth = spec.bits_per_sample;
                reader
                    .into_samples::<i32>()
                    .collect::<std::result::Result<Vec<_>, _>>()
                    .map_err(|e| undecodable(e.to_string()))?
                    .into_iter()
                    .map(|sample| Self::int_to_float(sample, bit_depth))
                    .collect()
            }
        };

        Self::finish(samples, sample_rate, channels, source, AudioFormat {
            extension: "wav".to_string(),
            bit_depth: Some(spec.bits_per_sample),
            compression: None,
        })
    }

    fn decode_with_symphonia(bytes: Vec<u8>, source: &str) -> Result<AudioData> {
        let undecodable = |reason: String| AnalysisError::Undecodable {
            source_name: source.to_string(),
            reason,
        };

        let mss = MediaSourceStream::new(Box::new(Cursor::new(bytes)), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = Self::detect_format(source) {
            hint.with_extension(&extension);
        }

        let meta_opts: MetadataOptions = Default::default();
        let fmt_opts: FormatOptions = Default::default();

        let probed = symphonia::default::get_probe()
            .format(&hint, mss, &fmt_opts, &meta_opts)
            .map_err(|e| undecodable(e.to_string()))?;

        let mut format = probed.format;

        // First track with a decodable codec
        let track = format
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| undecodable("no decodable audio track".to_string()))?;

        let track_id = track.id;
        let codec_params = track.codec_params.clone();
        let sample_rate = codec_params
            .sample_rate
            .ok_or_else(|| undecodable("no sample rate found".to_string()))?;
        let channels = codec_params
            .channels
            .map(|c| c.count() as u16)
            .unwrap_or(1);

        let dec_opts: DecoderOptions = Default::default();
        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &dec_opts)
            .map_err(|e| undecodable(e.to_string()))?;

        let mut samples = Vec::new();

        loop {
            let packet = match format.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    decoder.reset();
                    continue;
                }
                // End of stream
                Err(SymphoniaError::IoError(_)) => break,
                Err(e) => return Err(undecodable(e.to_string()).into()),
            };

            if packet.track_id() != track_id {
                continue;
            }

            match decoder.decode(&packet) {
                Ok(decoded) => {
                    let mut buffer = SampleBuffer::<f32>::new(decoded.capacity() as u64, *decoded.spec());
                    buffer.copy_interleaved_ref(decoded);
                    samples.extend_from_slice(buffer.samples());
                }
                Err(SymphoniaError::DecodeError(reason)) => {
                    tracing::debug!("Skipping corrupt packet in {}: {}", source, reason);
                    continue;
                }
                Err(SymphoniaError::IoError(_)) => break,
                Err(e) => return Err(undecodable(e.to_string()).into()),
            }
        }

        Self::finish(samples, sample_rate, channels, source, AudioFormat {
            extension: Self::detect_format(source).unwrap_or_else(|| "unknown".to_string()),
            bit_depth: codec_params.bits_per_sample.map(|b| b as u16),
            compression: Some(format!("{:?}", codec_params.codec)),
        })
    }

    fn finish(
        samples: Vec<f32>,
        sample_rate: u32,
        channels: u16,
        source: &str,
        format: AudioFormat,
    ) -> Result<AudioData> {
        if samples.is_empty() || sample_rate == 0 || channels == 0 {
            return Err(AnalysisError::Undecodable {
                source_name: source.to_string(),
                reason: "no audio samples decoded".to_string(),
            }.into());
        }

        let duration = samples.len() as f64 / (sample_rate as f64 * channels as f64);

        Ok(AudioData {
            samples,
            sample_rate,
            channels,
            duration,
            source: source.to_string(),
            format,
        })
    }

    /// Convert integer sample to float (-1.0 to 1.0)
    fn int_to_float(sample: i32, bit_depth: u16) -> f32 {
        match bit_depth {
            // hound already centres unsigned 8-bit PCM on zero
            8 => sample as f32 / 128.0,
            16 => sample as f32 / 32768.0,
            24 => sample as f32 / 8388608.0,
            32 => sample as f32 / 2147483648.0,
            _ => sample as f32 / 32768.0,
        }
    }

    /// Detect audio format from the extension of a path or URL
    pub fn detect_format(source: &str) -> Option<String> {
        let path = url::Url::parse(source)
            .map(|u| u.path().to_string())
            .unwrap_or_else(|_| source.to_string());

        Path::new(&path)
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_lowercase())
    }
}
