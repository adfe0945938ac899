use serde::{Deserialize, Serialize};

/// Duration and speed instruction for one segment of the edit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PacingEntry {
    pub segment_index: usize,

    /// Segment start in edit time (seconds)
    pub start_sec: f64,

    /// Segment length (seconds), always > 0
    pub duration_sec: f64,

    /// Playback speed applied to the segment's media
    pub speed_multiplier: f64,

    /// Soundtrack energy the segment was derived from (0.0-1.0)
    pub source_energy: f64,
}

impl PacingEntry {
    pub fn end_sec(&self) -> f64 {
        self.start_sec + self.duration_sec
    }
}

/// Pacing planner settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    /// Beats in a segment of medium energy
    pub beats_per_segment: u32,

    /// Playback speed at zero energy
    pub min_speed: f64,

    /// Playback speed at full energy
    pub max_speed: f64,

    /// How far a boundary may move to land on a beat (in beats)
    pub snap_window_beats: f64,

    /// Shortest allowed segment (in beats)
    pub min_segment_beats: f64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            beats_per_segment: 4,
            min_speed: 0.8,
            max_speed: 1.5,
            snap_window_beats: 0.5,
            min_segment_beats: 1.0,
        }
    }
}

impl PacingConfig {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<(), String> {
        if self.beats_per_segment == 0 {
            return Err("Beats per segment must be at least 1".to_string());
        }

        if !(self.min_speed > 0.0) || !self.max_speed.is_finite() || self.min_speed > self.max_speed {
            return Err("Speed range must be positive with min_speed <= max_speed".to_string());
        }

        if !(self.snap_window_beats >= 0.0 && self.snap_window_beats.is_finite()) {
            return Err("Snap window must be a finite, non-negative number of beats".to_string());
        }

        if !(self.min_segment_beats > 0.0) || self.min_segment_beats > self.beats_per_segment as f64 {
            return Err("Minimum segment must be positive and no longer than a base segment".to_string());
        }

        Ok(())
    }

    /// Speed for a segment of the given energy
    pub fn speed_for(&self, energy: f64) -> f64 {
        let speed = self.min_speed + (self.max_speed - self.min_speed) * energy.clamp(0.0, 1.0);
        speed.clamp(self.min_speed, self.max_speed)
    }

    /// Beats spanned by a segment of the given energy: low energy lingers, high energy cuts fast
    pub fn beats_for(&self, energy: f64) -> u32 {
        let scale = 2f64.powf(1.0 - 2.0 * energy.clamp(0.0, 1.0));
        ((self.beats_per_segment as f64 * scale).round() as u32).max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(PacingConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_configs() {
        let config = PacingConfig { beats_per_segment: 0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = PacingConfig { min_segment_beats: 6.0, ..Default::default() };
        assert!(config.validate().is_err());

        let config = PacingConfig { min_speed: 0.0, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_energy_mapping() {
        let config = PacingConfig::default();
        assert_eq!(config.beats_for(0.0), 8);
        assert_eq!(config.beats_for(0.5), 4);
        assert_eq!(config.beats_for(1.0), 2);

        assert_eq!(config.speed_for(0.0), 0.8);
        assert!((config.speed_for(1.0) - 1.5).abs() < 1e-12);
        assert_eq!(config.speed_for(7.0), 1.5);
    }
}
