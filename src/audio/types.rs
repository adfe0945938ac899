use serde::{Deserialize, Serialize};

/// Decoded soundtrack samples with metadata
#[derive(Debug, Clone)]
pub struct AudioData {
    /// Audio samples (interleaved for stereo, mono for single channel)
    pub samples: Vec<f32>,

    /// Sample rate in Hz
    pub sample_rate: u32,

    /// Number of channels (1 = mono, 2 = stereo)
    pub channels: u16,

    /// Duration in seconds
    pub duration: f64,

    /// URL or path the audio came from
    pub source: String,

    /// Audio format information
    pub format: AudioFormat,
}

impl AudioData {
    /// Build mono audio directly from samples
    pub fn from_mono(samples: Vec<f32>, sample_rate: u32, source: impl Into<String>) -> Self {
        let duration = samples.len() as f64 / sample_rate.max(1) as f64;
        Self {
            samples,
            sample_rate,
            channels: 1,
            duration,
            source: source.into(),
            format: AudioFormat {
                extension: "pcm".to_string(),
                bit_depth: Some(32),
                compression: None,
            },
        }
    }

    /// Get mono mix of all channels
    pub fn mono_samples(&self) -> Vec<f32> {
        if self.channels <= 1 {
            return self.samples.clone();
        }

        let mut mono = Vec::with_capacity(self.samples.len() / self.channels as usize);

        for chunk in self.samples.chunks(self.channels as usize) {
            let sum: f32 = chunk.iter().sum();
            mono.push(sum / self.channels as f32);
        }

        mono
    }
}

/// Audio file format information
#[derive(Debug, Clone)]
pub struct AudioFormat {
    /// File extension or container hint
    pub extension: String,

    /// Bit depth (for PCM formats)
    pub bit_depth: Option<u16>,

    /// Codec name for compressed formats
    pub compression: Option<String>,
}

/// Complete analysis of a soundtrack
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MusicAnalysis {
    /// Overall BPM (beats per minute), always > 0
    pub bpm: f64,

    /// Confidence in BPM detection (0.0-1.0)
    pub bpm_confidence: f64,

    /// Normalized mean RMS energy (0.0-1.0)
    pub energy: f64,

    /// Coarse tempo description derived from the BPM
    pub tempo: TempoDescriptor,

    /// Analyzed duration in seconds
    pub duration: f64,

    /// Ordered, gap-free sections covering `[0, duration]`
    pub sections: Vec<Section>,

    /// Ordered beat markers
    pub beats: Vec<BeatMarker>,
}

impl MusicAnalysis {
    /// Beat period in seconds
    pub fn beat_period(&self) -> f64 {
        60.0 / self.bpm
    }

    /// Section containing `time`, if it falls inside the analyzed track
    pub fn section_at(&self, time: f64) -> Option<&Section> {
        if time < 0.0 || time >= self.duration {
            return None;
        }
        self.sections
            .iter()
            .find(|section| time >= section.start_sec && time < section.end_sec)
    }

    /// Energy at `time`: the containing section's energy, or the track's mean
    /// section energy outside the track
    pub fn energy_at(&self, time: f64) -> f64 {
        self.section_at(time)
            .map(|section| section.energy)
            .unwrap_or_else(|| self.mean_section_energy())
    }

    /// Duration-weighted mean of the section energies.
    ///
    /// Same peak-relative scale as [`Section::energy`]; falls back to the overall
    /// energy when there are no sections.
    pub fn mean_section_energy(&self) -> f64 {
        let covered: f64 = self.sections.iter().map(Section::duration).sum();
        if covered <= 0.0 {
            return self.energy;
        }
        self.sections
            .iter()
            .map(|section| section.energy * section.duration())
            .sum::<f64>()
            / covered
    }
}

/// Contiguous time range of consistent energy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Section {
    pub start_sec: f64,
    pub end_sec: f64,
    /// Mean energy relative to the loudest frame of the track (0.0-1.0)
    pub energy: f64,
}

impl Section {
    pub fn duration(&self) -> f64 {
        self.end_sec - self.start_sec
    }
}

/// Timestamp of a detected rhythmic pulse
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BeatMarker {
    pub time_sec: f64,
    /// Onset strength at the marker relative to the strongest onset (0.0-1.0)
    pub strength: f64,
}

/// Coarse tempo classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TempoDescriptor {
    Slow,
    Moderate,
    Upbeat,
    Fast,
}

impl TempoDescriptor {
    pub fn from_bpm(bpm: f64) -> Self {
        if bpm < 90.0 {
            Self::Slow
        } else if bpm < 115.0 {
            Self::Moderate
        } else if bpm < 140.0 {
            Self::Upbeat
        } else {
            Self::Fast
        }
    }
}

/// Configuration for soundtrack loading and analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Window size for energy and FFT analysis (samples, power of two)
    pub window_size: usize,

    /// Hop size between analysis windows (samples)
    pub hop_size: usize,

    /// Minimum BPM to detect
    pub min_bpm: f64,

    /// Maximum BPM to detect
    pub max_bpm: f64,

    /// BPM reported when no tempo can be estimated
    pub default_bpm: f64,

    /// Peak normalized frame energy below which the track counts as silence
    pub silence_threshold: f64,

    /// Moving-average length applied to the energy envelope before sectioning (seconds)
    pub section_smoothing_sec: f64,

    /// Length of each side of the step-change detector (seconds)
    pub section_window_sec: f64,

    /// Minimum relative energy step that opens a new section (0.0-1.0)
    pub section_change_threshold: f64,

    /// Minimum section length (seconds)
    pub min_section_sec: f64,

    /// Audio past this point is ignored (seconds)
    pub max_duration_sec: f64,

    /// Upper bound for downloading the soundtrack (seconds)
    pub fetch_timeout_sec: f64,

    /// Upper bound for decoding plus analysis (seconds)
    pub analysis_timeout_sec: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            window_size: 1024,
            hop_size: 512,
            min_bpm: 60.0,
            max_bpm: 200.0,
            default_bpm: 120.0,
            silence_threshold: 1e-3,
            section_smoothing_sec: 1.0,
            section_window_sec: 4.0,
            section_change_threshold: 0.2,
            min_section_sec: 4.0,
            max_duration_sec: 900.0,
            fetch_timeout_sec: 30.0,
            analysis_timeout_sec: 60.0,
        }
    }
}

impl AnalysisConfig {
    /// Create a fast analysis config (coarser grid, quicker analysis)
    pub fn fast() -> Self {
        Self {
            window_size: 2048,
            hop_size: 1024,
            ..Default::default()
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.window_size == 0 || !self.window_size.is_power_of_two() {
            return Err("Window size must be a power of two".to_string());
        }

        if self.hop_size == 0 || self.hop_size > self.window_size {
            return Err("Hop size must be non-zero and no larger than window size".to_string());
        }

        if !(self.min_bpm > 0.0) || !self.max_bpm.is_finite() || self.min_bpm >= self.max_bpm {
            return Err("Minimum BPM must be positive and less than maximum BPM".to_string());
        }

        if !(self.default_bpm > 0.0 && self.default_bpm.is_finite()) {
            return Err("Default BPM must be positive".to_string());
        }

        if !(0.0..=1.0).contains(&self.section_change_threshold) {
            return Err("Section change threshold must be between 0.0 and 1.0".to_string());
        }

        let limits = [self.max_duration_sec, self.analysis_timeout_sec, self.fetch_timeout_sec];
        if !limits.iter().all(|v| v.is_finite() && *v > 0.0) {
            return Err("Durations and timeouts must be positive and finite".to_string());
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_audio_data_mono_conversion() {
        let audio_data = AudioData {
            samples: vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], // L, R, L, R, L, R
            sample_rate: 44100,
            channels: 2,
            duration: 3.0 / 44100.0,
            source: "test.wav".to_string(),
            format: AudioFormat {
                extension: "wav".to_string(),
                bit_depth: Some(16),
                compression: None,
            },
        };

        assert_eq!(audio_data.mono_samples(), vec![1.5, 3.5, 5.5]);
    }

    #[test]
    fn test_analysis_config_validation() {
        assert!(AnalysisConfig::default().validate().is_ok());
        assert!(AnalysisConfig::fast().validate().is_ok());

        let invalid_config = AnalysisConfig {
            window_size: 1000,
            ..Default::default()
        };
        assert!(invalid_config.validate().unwrap_err().contains("power of two"));
    }

    #[test]
    fn test_section_lookup_and_energy() {
        let analysis = MusicAnalysis {
            bpm: 120.0,
            bpm_confidence: 0.9,
            energy: 0.4,
            tempo: TempoDescriptor::Upbeat,
            duration: 10.0,
            sections: vec![
                Section { start_sec: 0.0, end_sec: 4.0, energy: 0.2 },
                Section { start_sec: 4.0, end_sec: 10.0, energy: 0.9 },
            ],
            beats: vec![
                BeatMarker { time_sec: 1.0, strength: 0.8 },
                BeatMarker { time_sec: 2.5, strength: 0.9 },
                BeatMarker { time_sec: 4.0, strength: 0.7 },
            ],
        };

        assert_eq!(analysis.energy_at(1.0), 0.2);
        assert_eq!(analysis.energy_at(4.0), 0.9);
        assert_eq!(analysis.beat_period(), 0.5);

        // Outside the track: weighted section mean, not the absolute RMS energy
        assert!((analysis.energy_at(12.0) - 0.62).abs() < 1e-9);
        assert!((analysis.mean_section_energy() - 0.62).abs() < 1e-9);

        let bare = MusicAnalysis { sections: Vec::new(), ..analysis };
        assert_eq!(bare.energy_at(12.0), 0.4);
    }

    #[test]
    fn test_tempo_descriptor() {
        assert_eq!(TempoDescriptor::from_bpm(72.0), TempoDescriptor::Slow);
        assert_eq!(TempoDescriptor::from_bpm(100.0), TempoDescriptor::Moderate);
        assert_eq!(TempoDescriptor::from_bpm(128.0), TempoDescriptor::Upbeat);
        assert_eq!(TempoDescriptor::from_bpm(174.0), TempoDescriptor::Fast);
    }
}
