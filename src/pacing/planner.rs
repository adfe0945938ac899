use crate::audio::{BeatMarker, MusicAnalysis};
use crate::error::{Result, ValidationError};
use crate::pacing::types::{PacingConfig, PacingEntry};

/// Slack used when comparing boundaries (seconds)
const EPSILON: f64 = 1e-9;

/// Fastest tempo the planner accepts
pub const MAX_BPM: f64 = 400.0;

/// Beat-aware segmentation of an edit timeline
///
/// Edit time maps one-to-one onto soundtrack time. Past the end of the track the
/// mean section energy applies and no beats are available for snapping.
pub struct PacingPlanner {
    config: PacingConfig,
}

impl PacingPlanner {
    pub fn new(config: PacingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PacingConfig {
        &self.config
    }

    /// Split `total_duration` seconds into contiguous segments.
    ///
    /// The returned entries start at 0, never overlap, and their durations sum to
    /// `total_duration`.
    pub fn plan(&self, analysis: &MusicAnalysis, total_duration: f64) -> Result<Vec<PacingEntry>> {
        if !total_duration.is_finite() || total_duration <= 0.0 {
            return Err(ValidationError::new(
                "total_duration",
                format!("must be a positive number of seconds, got {}", total_duration),
            ).into());
        }
        if !analysis.bpm.is_finite() || analysis.bpm <= 0.0 || analysis.bpm > MAX_BPM {
            return Err(ValidationError::new(
                "analysis.bpm",
                format!("must be in (0, {}], got {}", MAX_BPM, analysis.bpm),
            ).into());
        }
        self.config.validate().map_err(|reason| ValidationError::new("pacing", reason))?;

        let period = analysis.beat_period();
        let base = self.config.beats_per_segment as f64 * period;

        let entries = if total_duration < base {
            tracing::debug!(
                "Duration {:.2}s is shorter than one {:.2}s segment, using a single entry",
                total_duration, base
            );
            let energy = analysis.mean_section_energy().clamp(0.0, 1.0);
            vec![PacingEntry {
                segment_index: 0,
                start_sec: 0.0,
                duration_sec: total_duration,
                speed_multiplier: self.config.speed_for(energy),
                source_energy: energy,
            }]
        } else if analysis.beats.is_empty() {
            self.plan_uniform(analysis, total_duration, base, period)
        } else {
            self.plan_on_beats(analysis, total_duration, period)
        };

        tracing::debug!(
            "Planned {} segments over {:.2}s at {:.1} BPM",
            entries.len(), total_duration, analysis.bpm
        );

        Ok(entries)
    }

    /// Fixed-length segments for tracks without beat markers
    fn plan_uniform(&self, analysis: &MusicAnalysis, total: f64, base: f64, period: f64) -> Vec<PacingEntry> {
        let min_len = self.config.min_segment_beats * period;
        self.walk(analysis, total, min_len, |cursor, _energy| cursor + base)
    }

    fn plan_on_beats(&self, analysis: &MusicAnalysis, total: f64, period: f64) -> Vec<PacingEntry> {
        let min_len = self.config.min_segment_beats * period;
        let window = self.config.snap_window_beats * period;

        self.walk(analysis, total, min_len, |cursor, energy| {
            let target = cursor + self.config.beats_for(energy) as f64 * period;
            snap_boundary(&analysis.beats, target, window, cursor + min_len).unwrap_or(target)
        })
    }

    /// Walk from 0 to `total`, asking `next_boundary` where each segment ends
    fn walk<F>(&self, analysis: &MusicAnalysis, total: f64, min_len: f64, next_boundary: F) -> Vec<PacingEntry>
    where
        F: Fn(f64, f64) -> f64,
    {
        let mut entries = Vec::new();
        let mut cursor = 0.0;

        while total - cursor > EPSILON {
            let energy = analysis.energy_at(cursor).clamp(0.0, 1.0);
            let mut boundary = next_boundary(cursor, energy).max(cursor + min_len);

            // Pad: a leftover shorter than the minimum joins this segment
            if total - boundary < min_len - EPSILON {
                boundary = total;
            }

            entries.push(PacingEntry {
                segment_index: entries.len(),
                start_sec: cursor,
                duration_sec: boundary - cursor,
                speed_multiplier: self.config.speed_for(energy),
                source_energy: energy,
            });
            cursor = boundary;
        }

        entries
    }
}

impl Default for PacingPlanner {
    fn default() -> Self {
        Self::new(PacingConfig::default())
    }
}

/// Nearest beat to `target` within `window` that is not before `earliest`.
/// Equidistant beats resolve to the earlier one.
fn snap_boundary(beats: &[BeatMarker], target: f64, window: f64, earliest: f64) -> Option<f64> {
    let lower = (target - window).max(earliest - EPSILON);
    let first = beats.partition_point(|b| b.time_sec < lower);

    beats[first..]
        .iter()
        .take_while(|b| b.time_sec <= target + window + EPSILON)
        .map(|b| b.time_sec)
        .fold(None, |best: Option<f64>, time| match best {
            // Strictly closer wins; beats are ascending so ties keep the earlier one
            Some(b) if (b - target).abs() <= (time - target).abs() + EPSILON => Some(b),
            _ => Some(time),
        })
}
