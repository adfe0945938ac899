use std::f64::consts::SQRT_2;

use rayon::prelude::*;
use realfft::RealFftPlanner;
use rustfft::num_complex::Complex;

use crate::audio::types::{
    AnalysisConfig, AudioData, BeatMarker, MusicAnalysis, Section, TempoDescriptor,
};
use crate::error::{AnalysisError, Result};

/// Width of the log-Gaussian tempo prior, in octaves
const TEMPO_PRIOR_OCTAVES: f64 = 1.0;

/// Centre of the tempo prior (BPM)
const TEMPO_PRIOR_CENTER: f64 = 120.0;

/// Beats may move this fraction of a period toward a stronger onset
const BEAT_SNAP_FRACTION: f64 = 0.1;

/// Soundtrack analyzer: energy envelope, spectral-flux onsets, autocorrelation tempo,
/// phase-aligned beat grid and energy step sections.
///
/// Analysis is deterministic and bounded by the length of the input, which is capped at
/// `max_duration_sec`.
pub struct AudioAnalyzer {
    config: AnalysisConfig,
}

/// Frame grid shared by the energy and onset envelopes
#[derive(Debug, Clone, Copy)]
struct FrameGrid {
    frames: usize,
    frame_rate: f64,
    /// Seconds from a frame's first sample to its centre
    center_offset: f64,
}

impl FrameGrid {
    fn time(&self, frame: f64) -> f64 {
        frame / self.frame_rate + self.center_offset
    }
}

impl AudioAnalyzer {
    /// Create a new analyzer with default configuration
    pub fn new() -> Self {
        Self::with_config(AnalysisConfig::default())
    }

    /// Create a new analyzer with custom configuration
    pub fn with_config(config: AnalysisConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Analyze decoded audio
    pub fn analyze(&self, audio_data: &AudioData) -> Result<MusicAnalysis> {
        self.config.validate()
            .map_err(|e| AnalysisError::InvalidParameters { details: e })?;

        if audio_data.sample_rate == 0 {
            return Err(AnalysisError::InvalidParameters {
                details: "sample rate must be non-zero".to_string(),
            }.into());
        }

        let sample_rate = audio_data.sample_rate as f64;
        let mut samples = audio_data.mono_samples();

        let max_samples = (self.config.max_duration_sec * sample_rate) as usize;
        if samples.len() > max_samples {
            tracing::warn!(
                "Soundtrack {} is {:.1}s long, analyzing the first {:.1}s",
                audio_data.source,
                samples.len() as f64 / sample_rate,
                self.config.max_duration_sec
            );
            samples.truncate(max_samples);
        }

        if samples.is_empty() {
            return Err(AnalysisError::AnalysisFailed {
                reason: "soundtrack contains no samples".to_string(),
            }.into());
        }
        if samples.iter().any(|s| !s.is_finite()) {
            return Err(AnalysisError::AnalysisFailed {
                reason: "soundtrack contains non-finite samples".to_string(),
            }.into());
        }

        let duration = samples.len() as f64 / sample_rate;
        tracing::info!("Starting audio analysis for {:.1} seconds of audio", duration);

        let grid = self.frame_grid(samples.len(), sample_rate);

        // Step 1: energy envelope
        let envelope = self.energy_envelope(&samples, grid.frames);
        let peak = envelope.iter().cloned().fold(0.0f64, f64::max);
        let overall_energy = mean(&envelope);

        if peak < self.config.silence_threshold {
            tracing::debug!("Peak energy {:.5} below silence threshold", peak);
            return Ok(self.fallback_analysis(duration, 0.0, 0.0));
        }

        let longest_period = 60.0 / self.config.min_bpm;
        if duration < longest_period {
            tracing::debug!(
                "Track of {:.2}s is shorter than one beat period at {} BPM",
                duration, self.config.min_bpm
            );
            return Ok(self.fallback_analysis(duration, overall_energy, overall_energy / peak));
        }

        // Step 2: onset strength
        tracing::debug!("Computing spectral flux over {} frames...", grid.frames);
        let onsets = self.onset_envelope(&samples, grid.frames)?;

        // Step 3: tempo
        let (bpm, bpm_confidence) = match self.estimate_tempo(&onsets, grid.frame_rate) {
            Some(estimate) => estimate,
            None => {
                tracing::debug!("No periodicity found, using default BPM");
                (self.config.default_bpm, 0.0)
            }
        };

        // Step 4: beats
        let period_frames = grid.frame_rate * 60.0 / bpm;
        let beats = if bpm_confidence > 0.0 {
            self.track_beats(&onsets, period_frames, grid, duration)
        } else {
            Vec::new()
        };

        // Step 5: sections
        let sections = self.detect_sections(&envelope, peak, grid, duration, &beats, 60.0 / bpm);

        tracing::info!(
            "Analysis complete: {} beats, BPM: {:.1} (confidence {:.2}), {} sections, energy {:.2}",
            beats.len(),
            bpm,
            bpm_confidence,
            sections.len(),
            overall_energy
        );

        Ok(MusicAnalysis {
            bpm,
            bpm_confidence,
            energy: overall_energy,
            tempo: TempoDescriptor::from_bpm(bpm),
            duration,
            sections,
            beats,
        })
    }

    /// Default-tempo analysis with one section and no beats
    fn fallback_analysis(&self, duration: f64, energy: f64, section_energy: f64) -> MusicAnalysis {
        MusicAnalysis {
            bpm: self.config.default_bpm,
            bpm_confidence: 0.0,
            energy,
            tempo: TempoDescriptor::from_bpm(self.config.default_bpm),
            duration,
            sections: vec![Section {
                start_sec: 0.0,
                end_sec: duration,
                energy: section_energy.clamp(0.0, 1.0),
            }],
            beats: Vec::new(),
        }
    }

    fn frame_grid(&self, len: usize, sample_rate: f64) -> FrameGrid {
        let window = self.config.window_size;
        let hop = self.config.hop_size;
        let frames = if len <= window { 1 } else { (len - window) / hop + 1 };

        FrameGrid {
            frames,
            frame_rate: sample_rate / hop as f64,
            center_offset: (window.min(len) as f64 / 2.0) / sample_rate,
        }
    }

    /// Normalized RMS per frame: 1.0 is a full-scale sine
    fn energy_envelope(&self, samples: &[f32], frames: usize) -> Vec<f64> {
        let window = self.config.window_size;
        let hop = self.config.hop_size;

        (0..frames)
            .into_par_iter()
            .map(|i| {
                let start = i * hop;
                let end = (start + window).min(samples.len());
                let frame = &samples[start..end];
                let sum_sq: f64 = frame.iter().map(|&x| x as f64 * x as f64).sum();
                let rms = (sum_sq / frame.len().max(1) as f64).sqrt();
                (rms * SQRT_2).min(1.0)
            })
            .collect()
    }

    /// Spectral flux: summed positive change of log-compressed magnitudes
    fn onset_envelope(&self, samples: &[f32], frames: usize) -> Result<Vec<f64>> {
        let window = self.config.window_size;
        let hop = self.config.hop_size;

        let mut planner = RealFftPlanner::<f32>::new();
        let fft = planner.plan_fft_forward(window);
        let mut input = fft.make_input_vec();
        let mut spectrum = fft.make_output_vec();

        let hann: Vec<f32> = (0..window)
            .map(|i| 0.5 * (1.0 - (2.0 * std::f32::consts::PI * i as f32 / (window - 1) as f32).cos()))
            .collect();

        let mut previous = vec![0.0f32; spectrum.len()];
        let mut flux = Vec::with_capacity(frames);

        for frame in 0..frames {
            let start = frame * hop;
            for (j, slot) in input.iter_mut().enumerate() {
                *slot = samples.get(start + j).map(|&s| s * hann[j]).unwrap_or(0.0);
            }

            fft.process(&mut input, &mut spectrum)
                .map_err(|e| AnalysisError::AnalysisFailed {
                    reason: format!("FFT processing failed: {}", e),
                })?;

            let mut value = 0.0f64;
            for (bin, c) in spectrum.iter().enumerate() {
                let magnitude = (1.0 + c.norm()).ln();
                value += (magnitude - previous[bin]).max(0.0) as f64;
                previous[bin] = magnitude;
            }

            // The first frame has no predecessor
            flux.push(if frame == 0 { 0.0 } else { value });
        }

        Ok(flux)
    }

    /// Tempo from the FFT autocorrelation of the onset envelope.
    ///
    /// Returns `(bpm, confidence)` or `None` when the envelope has no periodic content
    /// in the configured BPM range.
    fn estimate_tempo(&self, onsets: &[f64], frame_rate: f64) -> Option<(f64, f64)> {
        let n = onsets.len();
        let min_lag = ((frame_rate * 60.0 / self.config.max_bpm).floor() as usize).max(1);
        let max_lag = ((frame_rate * 60.0 / self.config.min_bpm).ceil() as usize).min(n.saturating_sub(2));
        if max_lag <= min_lag {
            return None;
        }

        let acf = autocorrelation(onsets)?;
        if acf[0] <= f64::EPSILON {
            return None;
        }

        let weighted = |lag: usize| {
            let bpm = frame_rate * 60.0 / lag as f64;
            let octaves = (bpm / TEMPO_PRIOR_CENTER).log2() / TEMPO_PRIOR_OCTAVES;
            acf[lag] * (-0.5 * octaves * octaves).exp()
        };

        let is_peak = |lag: usize| acf[lag] >= acf[lag - 1] && acf[lag] >= acf[lag + 1];

        let strongest = |lags: &mut dyn Iterator<Item = usize>| {
            lags.fold(None, |best: Option<usize>, lag| match best {
                Some(b) if weighted(b) >= weighted(lag) => Some(b),
                _ => Some(lag),
            })
        };

        // Prefer local maxima; fall back to the best weighted lag
        let best = strongest(&mut (min_lag..=max_lag).filter(|&lag| is_peak(lag) && acf[lag] > 0.0))
            .or_else(|| strongest(&mut (min_lag..=max_lag)))?;

        if acf[best] <= 0.0 {
            return None;
        }

        // Parabolic interpolation around the peak
        let (a, b, c) = (acf[best - 1], acf[best], acf[best + 1]);
        let denom = a - 2.0 * b + c;
        let delta = if denom.abs() > f64::EPSILON {
            (0.5 * (a - c) / denom).clamp(-0.5, 0.5)
        } else {
            0.0
        };

        let lag = best as f64 + delta;
        let bpm = (frame_rate * 60.0 / lag).clamp(self.config.min_bpm, self.config.max_bpm);
        let confidence = (acf[best] / acf[0]).clamp(0.0, 1.0);

        tracing::debug!(
            "Tempo estimation: lag {:.2} frames -> {:.1} BPM (confidence {:.2})",
            lag, bpm, confidence
        );

        Some((bpm, confidence))
    }

    /// Lay a beat grid through the strongest onset and nudge each grid point
    /// onto a nearby onset peak.
    fn track_beats(&self, onsets: &[f64], period_frames: f64, grid: FrameGrid, duration: f64) -> Vec<BeatMarker> {
        let n = onsets.len();
        let max_onset = onsets.iter().cloned().fold(0.0f64, f64::max);
        if n == 0 || max_onset <= 0.0 || !(period_frames > 0.0) {
            return Vec::new();
        }

        let threshold = mean(onsets);
        let anchor = argmax(onsets, 0, n - 1).0 as f64;
        let phase = anchor.rem_euclid(period_frames);
        let tolerance = (period_frames * BEAT_SNAP_FRACTION).max(1.0);

        let mut beats: Vec<BeatMarker> = Vec::new();
        let mut k = 0usize;

        loop {
            let expected = phase + k as f64 * period_frames;
            if expected > (n - 1) as f64 {
                break;
            }
            k += 1;

            let lo = (expected - tolerance).floor().max(0.0) as usize;
            let hi = ((expected + tolerance).ceil() as usize).min(n - 1);
            let (peak_idx, peak_val) = argmax(onsets, lo, hi);

            let (frame, strength) = if peak_val > threshold {
                (peak_idx as f64, peak_val / max_onset)
            } else {
                let idx = (expected.round() as usize).min(n - 1);
                (expected, onsets[idx] / max_onset)
            };

            let time_sec = grid.time(frame);
            if time_sec >= duration {
                break;
            }
            if beats.last().map_or(true, |last| time_sec > last.time_sec + 1e-6) {
                beats.push(BeatMarker {
                    time_sec,
                    strength: strength.clamp(0.0, 1.0),
                });
            }
        }

        tracing::debug!("Tracked {} beats at {:.2} frames per beat", beats.len(), period_frames);
        beats
    }

    /// Split the track where smoothed energy changes in a sustained step.
    fn detect_sections(
        &self,
        envelope: &[f64],
        peak: f64,
        grid: FrameGrid,
        duration: f64,
        beats: &[BeatMarker],
        beat_period: f64,
    ) -> Vec<Section> {
        let relative: Vec<f64> = envelope.iter().map(|&e| (e / peak).clamp(0.0, 1.0)).collect();
        let n = relative.len();

        let smoothing = ((self.config.section_smoothing_sec * grid.frame_rate).round() as usize).max(1);
        let smoothed = moving_average(&relative, smoothing);

        let window = ((self.config.section_window_sec * grid.frame_rate).round() as usize).max(1);
        let min_gap = ((self.config.min_section_sec * grid.frame_rate).round() as usize).max(1);

        let mut boundaries: Vec<usize> = Vec::new();
        if n >= 2 * window {
            let prefix = prefix_sums(&smoothed);
            let window_mean = |from: usize, to: usize| (prefix[to] - prefix[from]) / (to - from) as f64;

            let mut candidates: Vec<(usize, f64)> = (window..=n - window)
                .map(|i| (i, (window_mean(i, i + window) - window_mean(i - window, i)).abs()))
                .filter(|&(_, novelty)| novelty >= self.config.section_change_threshold)
                .collect();

            // Strongest steps first; ties resolved toward the earlier frame
            candidates.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));

            for (frame, _) in candidates {
                let clear_of_edges = frame >= min_gap && n - frame >= min_gap;
                let clear_of_others = boundaries.iter().all(|&b| b.abs_diff(frame) >= min_gap);
                if clear_of_edges && clear_of_others {
                    boundaries.push(frame);
                }
            }
            boundaries.sort_unstable();
        }

        let mut edges = vec![0.0];
        for frame in boundaries {
            let time = snap_to_beat(grid.time(frame as f64), beats, beat_period / 2.0);
            let last = *edges.last().unwrap_or(&0.0);
            if time > last + 1e-6 && time < duration - 1e-6 {
                edges.push(time);
            }
        }
        edges.push(duration);

        let prefix = prefix_sums(&relative);
        let sections: Vec<Section> = edges
            .windows(2)
            .map(|pair| {
                let (start_sec, end_sec) = (pair[0], pair[1]);
                let first = frame_at(start_sec, grid, n);
                let last = frame_at(end_sec, grid, n).max(first + 1).min(n);
                let energy = if last > first {
                    (prefix[last] - prefix[first]) / (last - first) as f64
                } else {
                    relative.get(first).copied().unwrap_or(0.0)
                };
                Section { start_sec, end_sec, energy: energy.clamp(0.0, 1.0) }
            })
            .collect();

        tracing::debug!("Detected {} sections", sections.len());
        sections
    }
}

impl Default for AudioAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// First index of the maximum in `values[lo..=hi]`
fn argmax(values: &[f64], lo: usize, hi: usize) -> (usize, f64) {
    let mut best = (lo, values[lo]);
    for (i, &v) in values.iter().enumerate().take(hi + 1).skip(lo + 1) {
        if v > best.1 {
            best = (i, v);
        }
    }
    best
}

fn prefix_sums(values: &[f64]) -> Vec<f64> {
    let mut prefix = Vec::with_capacity(values.len() + 1);
    prefix.push(0.0);
    for &v in values {
        let last = *prefix.last().unwrap_or(&0.0);
        prefix.push(last + v);
    }
    prefix
}

/// Centred moving average, shrinking at the edges
fn moving_average(values: &[f64], length: usize) -> Vec<f64> {
    let prefix = prefix_sums(values);
    let half = length / 2;
    (0..values.len())
        .map(|i| {
            let from = i.saturating_sub(half);
            let to = (i + half + 1).min(values.len());
            (prefix[to] - prefix[from]) / (to - from) as f64
        })
        .collect()
}

/// Frame whose centre is the first at or after `time`
fn frame_at(time: f64, grid: FrameGrid, frames: usize) -> usize {
    let frame = ((time - grid.center_offset) * grid.frame_rate).ceil();
    (frame.max(0.0) as usize).min(frames)
}

/// Nearest beat within `max_distance`, earlier beat on ties
fn snap_to_beat(time: f64, beats: &[BeatMarker], max_distance: f64) -> f64 {
    let idx = beats.partition_point(|b| b.time_sec < time);
    let before = idx.checked_sub(1).map(|i| beats[i].time_sec);
    let after = beats.get(idx).map(|b| b.time_sec);

    let nearest = match (before, after) {
        (Some(b), Some(a)) => {
            if time - b <= a - time { Some(b) } else { Some(a) }
        }
        (Some(b), None) => Some(b),
        (None, Some(a)) => Some(a),
        (None, None) => None,
    };

    match nearest {
        Some(beat) if (beat - time).abs() <= max_distance => beat,
        _ => time,
    }
}

/// Autocorrelation of the mean-removed signal via zero-padded real FFT
fn autocorrelation(signal: &[f64]) -> Option<Vec<f64>> {
    let n = signal.len();
    if n < 2 {
        return None;
    }
    let mean = mean(signal);
    let size = (2 * n).next_power_of_two();

    let mut planner = RealFftPlanner::<f64>::new();
    let forward = planner.plan_fft_forward(size);
    let inverse = planner.plan_fft_inverse(size);

    let mut input = forward.make_input_vec();
    for (slot, &value) in input.iter_mut().zip(signal) {
        *slot = value - mean;
    }
    let mut spectrum = forward.make_output_vec();
    forward.process(&mut input, &mut spectrum).ok()?;

    for bin in spectrum.iter_mut() {
        *bin = Complex::new(bin.norm_sqr(), 0.0);
    }

    let mut output = inverse.make_output_vec();
    inverse.process(&mut spectrum, &mut output).ok()?;

    let scale = size as f64;
    Some(output.into_iter().take(n).map(|v| v / scale).collect())
}
