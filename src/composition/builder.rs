use std::collections::{HashMap, HashSet};

use crate::composition::types::{
    Asset, AssetKind, Clip, Edit, MediaAsset, Output, Timeline, Track, Transition, TransitionKind,
};
use crate::composition::validate::validate;
use crate::config::CompositionConfig;
use crate::error::{Result, ValidationError};
use crate::pacing::PacingEntry;

const EPSILON: f64 = 1e-9;

/// Soundtrack laid under the whole edit
#[derive(Debug, Clone, PartialEq)]
pub struct Soundtrack {
    pub src: String,
    pub volume: f64,
    pub alias: Option<String>,
}

/// Per-request composition choices
#[derive(Debug, Clone, PartialEq)]
pub struct BuildOptions {
    /// Transition between consecutive clips
    pub transition: Option<TransitionKind>,
    /// Incoming transition of the first clip
    pub intro: Option<TransitionKind>,
    /// Outgoing transition of the last clip
    pub outro: Option<TransitionKind>,
    pub output: Output,
    pub soundtrack: Option<Soundtrack>,
    /// Slow videos down to fill a segment instead of cutting them short
    pub allow_variable_rate: bool,
}

impl BuildOptions {
    pub fn from_config(config: &CompositionConfig) -> Self {
        Self {
            transition: config.transition,
            intro: config.transition,
            outro: config.transition,
            output: Output {
                format: Some(config.output_format),
                width: Some(config.output_width),
                height: Some(config.output_height),
                fps: Some(config.output_fps),
            },
            soundtrack: None,
            allow_variable_rate: true,
        }
    }

    pub fn with_soundtrack(mut self, src: impl Into<String>, volume: f64) -> Self {
        self.soundtrack = Some(Soundtrack {
            src: src.into(),
            volume,
            alias: None,
        });
        self
    }
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self::from_config(&CompositionConfig::default())
    }
}

/// Assembles pacing segments and media assets into a declarative edit
pub struct CompositionBuilder {
    config: CompositionConfig,
}

impl CompositionBuilder {
    pub fn new(config: CompositionConfig) -> Self {
        Self { config }
    }

    /// Build and validate an edit.
    ///
    /// Visual assets are assigned to pacing entries in order, cycling when there
    /// are more entries than assets. Identical inputs always produce identical edits.
    pub fn build(&self, assets: &[MediaAsset], pacing: &[PacingEntry], options: &BuildOptions) -> Result<Edit> {
        if pacing.is_empty() {
            return Err(ValidationError::new("pacing", "at least one segment is required").into());
        }

        let visual: Vec<&MediaAsset> = assets
            .iter()
            .filter(|asset| {
                if asset.kind == AssetKind::Audio {
                    tracing::warn!("Skipping audio asset {} in the visual sequence", asset.id);
                }
                asset.is_visual()
            })
            .collect();

        if visual.is_empty() {
            return Err(ValidationError::new("assets", "at least one image or video asset is required").into());
        }

        let mut placer = VideoPlacer::new(&self.config, options.allow_variable_rate);

        let mut clips: Vec<Clip> = pacing
            .iter()
            .enumerate()
            .map(|(i, entry)| {
                let asset = visual[i % visual.len()];
                match asset.kind {
                    AssetKind::Video => placer.place(asset, entry),
                    _ => Clip {
                        asset: Asset::Image { src: asset.src.clone() },
                        start: entry.start_sec,
                        length: entry.duration_sec,
                        transition: None,
                        alias: Some(asset.id.clone()),
                    },
                }
            })
            .collect();

        apply_transitions(&mut clips, options);

        let total = pacing
            .last()
            .map(|entry| entry.end_sec())
            .unwrap_or_default();

        let mut tracks = vec![Track { clips }];
        if let Some(soundtrack) = &options.soundtrack {
            tracks.push(Track {
                clips: vec![Clip {
                    asset: Asset::Audio {
                        src: soundtrack.src.clone(),
                        trim: None,
                        volume: Some(soundtrack.volume),
                    },
                    start: 0.0,
                    length: total,
                    transition: None,
                    alias: soundtrack.alias.clone(),
                }],
            });
        }

        let edit = Edit {
            timeline: Timeline { tracks },
            output: options.output.clone(),
        };

        tracing::debug!(
            "Built edit with {} clips over {:.2}s from {} visual assets",
            pacing.len(), total, visual.len()
        );

        validate(edit)
    }
}

impl Default for CompositionBuilder {
    fn default() -> Self {
        Self::new(CompositionConfig::default())
    }
}

/// Places video clips, fitting playback rate to the source and advancing
/// each source's trim offset between uses
struct VideoPlacer<'a> {
    config: &'a CompositionConfig,
    allow_variable_rate: bool,
    offsets: HashMap<String, f64>,
    substituted: HashSet<String>,
}

impl<'a> VideoPlacer<'a> {
    fn new(config: &'a CompositionConfig, allow_variable_rate: bool) -> Self {
        Self {
            config,
            allow_variable_rate,
            offsets: HashMap::new(),
            substituted: HashSet::new(),
        }
    }

    fn natural_duration(&mut self, asset: &MediaAsset) -> f64 {
        asset.natural_duration().unwrap_or_else(|| {
            if self.substituted.insert(asset.id.clone()) {
                tracing::warn!(
                    "Duration of {} unknown, assuming {:.1}s",
                    asset.id, self.config.default_video_duration
                );
            }
            self.config.default_video_duration
        })
    }

    fn place(&mut self, asset: &MediaAsset, entry: &PacingEntry) -> Clip {
        let natural = self.natural_duration(asset);
        let mut length = entry.duration_sec;
        let mut speed = entry.speed_multiplier;

        if length * speed > natural + EPSILON {
            if self.allow_variable_rate {
                speed = (natural / length).max(self.config.min_playback_rate);
            }
            if length * speed > natural + EPSILON {
                // Even the slowest rate runs out of footage
                length = natural / speed;
                tracing::debug!(
                    "Clip from {} shortened to {:.2}s of a {:.2}s segment",
                    asset.id, length, entry.duration_sec
                );
            }
        }

        let consumed = length * speed;
        let previous = self.offsets.get(&asset.id).copied().unwrap_or(0.0);
        let offset = if previous + consumed > natural + EPSILON { 0.0 } else { previous };
        let next = offset + consumed;
        self.offsets.insert(asset.id.clone(), if next >= natural - EPSILON { 0.0 } else { next });

        Clip {
            asset: Asset::Video {
                src: asset.src.clone(),
                trim: (offset > EPSILON).then_some(offset),
                speed: Some(speed),
                volume: None,
            },
            start: entry.start_sec,
            length,
            transition: None,
            alias: Some(asset.id.clone()),
        }
    }
}

fn apply_transitions(clips: &mut [Clip], options: &BuildOptions) {
    let last = clips.len().saturating_sub(1);
    for (i, clip) in clips.iter_mut().enumerate() {
        let incoming = if i == 0 { options.intro } else { options.transition };
        let outgoing = if i == last { options.outro } else { options.transition };
        if incoming.is_some() || outgoing.is_some() {
            clip.transition = Some(Transition { incoming, outgoing });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{BeatMarker, MusicAnalysis, Section, TempoDescriptor};
    use crate::composition::types::OutputFormat;
    use crate::error::CompositorError;
    use crate::pacing::PacingPlanner;

    fn entry(index: usize, start: f64, duration: f64, speed: f64) -> PacingEntry {
        PacingEntry {
            segment_index: index,
            start_sec: start,
            duration_sec: duration,
            speed_multiplier: speed,
            source_energy: 0.5,
        }
    }

    fn uniform(count: usize, duration: f64, speed: f64) -> Vec<PacingEntry> {
        (0..count).map(|i| entry(i, i as f64 * duration, duration, speed)).collect()
    }

    fn video(id: &str) -> MediaAsset {
        MediaAsset::new(id, format!("https://cdn.example.com/{}.mp4", id), AssetKind::Video)
    }

    fn image(id: &str) -> MediaAsset {
        MediaAsset::new(id, format!("https://cdn.example.com/{}.jpg", id), AssetKind::Image)
    }

    fn video_params(clip: &Clip) -> (Option<f64>, Option<f64>) {
        match clip.asset {
            Asset::Video { trim, speed, .. } => (trim, speed),
            _ => panic!("expected a video clip"),
        }
    }

    fn rising_analysis() -> MusicAnalysis {
        let period = 60.0 / 128.0;
        MusicAnalysis {
            bpm: 128.0,
            bpm_confidence: 0.9,
            energy: 0.5,
            tempo: TempoDescriptor::Upbeat,
            duration: 60.0,
            sections: vec![
                Section { start_sec: 0.0, end_sec: 20.0, energy: 0.2 },
                Section { start_sec: 20.0, end_sec: 40.0, energy: 0.5 },
                Section { start_sec: 40.0, end_sec: 60.0, energy: 0.9 },
            ],
            beats: (0..128)
                .map(|i| BeatMarker { time_sec: i as f64 * period, strength: 1.0 })
                .collect(),
        }
    }

    #[test]
    fn test_scenario_six_assets_over_thirty_seconds() {
        let pacing = PacingPlanner::default().plan(&rising_analysis(), 30.0).unwrap();
        let assets: Vec<MediaAsset> = (0..6)
            .map(|i| {
                if i % 2 == 0 {
                    video(&format!("v{}", i)).with_duration(12.0)
                } else {
                    image(&format!("i{}", i))
                }
            })
            .collect();
        let options = BuildOptions::default().with_soundtrack("https://cdn.example.com/song.mp3", 0.8);

        let edit = CompositionBuilder::default().build(&assets, &pacing, &options).unwrap();

        assert_eq!(edit.timeline.tracks.len(), 2);
        let visual = &edit.timeline.tracks[0].clips;
        assert_eq!(visual.len(), pacing.len());

        for (i, (clip, segment)) in visual.iter().zip(&pacing).enumerate() {
            assert_eq!(clip.alias.as_deref(), Some(assets[i % 6].id.as_str()));
            assert_eq!(clip.start, segment.start_sec);
            assert!(clip.length > 0.0);
        }

        let soundtrack = &edit.timeline.tracks[1].clips;
        assert_eq!(soundtrack.len(), 1);
        assert_eq!(soundtrack[0].start, 0.0);
        assert!((soundtrack[0].length - 30.0).abs() < 1e-9);
        assert!(matches!(soundtrack[0].asset, Asset::Audio { volume: Some(v), .. } if v == 0.8));
    }

    #[test]
    fn test_build_is_deterministic() {
        let pacing = PacingPlanner::default().plan(&rising_analysis(), 45.0).unwrap();
        let assets = vec![video("a"), image("b"), video("c").with_duration(3.0)];
        let options = BuildOptions::default().with_soundtrack("https://cdn.example.com/song.mp3", 1.0);
        let builder = CompositionBuilder::default();

        let first = builder.build(&assets, &pacing, &options).unwrap().to_json().unwrap();
        let second = builder.build(&assets, &pacing, &options).unwrap().to_json().unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_transitions_between_clips() {
        let options = BuildOptions {
            transition: Some(TransitionKind::Fade),
            intro: Some(TransitionKind::Zoom),
            outro: None,
            ..Default::default()
        };
        let edit = CompositionBuilder::default()
            .build(&[image("a")], &uniform(3, 2.0, 1.0), &options)
            .unwrap();
        let clips = &edit.timeline.tracks[0].clips;

        let t = |i: usize| clips[i].transition.clone().unwrap();
        assert_eq!(t(0).incoming, Some(TransitionKind::Zoom));
        assert_eq!(t(0).outgoing, Some(TransitionKind::Fade));
        assert_eq!(t(1).incoming, Some(TransitionKind::Fade));
        assert_eq!(t(1).outgoing, Some(TransitionKind::Fade));
        assert_eq!(t(2).incoming, Some(TransitionKind::Fade));
        assert_eq!(t(2).outgoing, None);
    }

    #[test]
    fn test_unknown_duration_uses_default_and_advances_trim() {
        // Default natural duration is 10s; four 3s uses wrap on the fourth
        let edit = CompositionBuilder::default()
            .build(&[video("clip")], &uniform(4, 3.0, 1.0), &BuildOptions::default())
            .unwrap();
        let trims: Vec<Option<f64>> = edit.timeline.tracks[0]
            .clips
            .iter()
            .map(|c| video_params(c).0)
            .collect();

        assert_eq!(trims, vec![None, Some(3.0), Some(6.0), None]);
    }

    #[test]
    fn test_short_video_slowed_to_fill_segment() {
        let assets = [video("short").with_duration(2.0)];
        let edit = CompositionBuilder::default()
            .build(&assets, &uniform(1, 3.0, 1.2), &BuildOptions::default())
            .unwrap();
        let clip = &edit.timeline.tracks[0].clips[0];

        let (_, speed) = video_params(clip);
        assert!((speed.unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(clip.length, 3.0);
    }

    #[test]
    fn test_rate_floor_shortens_clip() {
        let assets = [video("tiny").with_duration(1.0)];
        let edit = CompositionBuilder::default()
            .build(&assets, &uniform(1, 3.0, 1.0), &BuildOptions::default())
            .unwrap();
        let clip = &edit.timeline.tracks[0].clips[0];

        assert_eq!(video_params(clip).1, Some(0.5));
        assert!((clip.length - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_fixed_rate_cuts_clip_short() {
        let assets = [video("short").with_duration(2.0)];
        let options = BuildOptions { allow_variable_rate: false, ..Default::default() };
        let edit = CompositionBuilder::default()
            .build(&assets, &uniform(1, 3.0, 1.0), &options)
            .unwrap();
        let clip = &edit.timeline.tracks[0].clips[0];

        assert_eq!(video_params(clip).1, Some(1.0));
        assert!((clip.length - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_audio_assets_are_not_visuals() {
        let assets = vec![
            MediaAsset::new("song", "https://cdn.example.com/song.mp3", AssetKind::Audio),
            image("a"),
        ];
        let edit = CompositionBuilder::default()
            .build(&assets, &uniform(2, 2.0, 1.0), &BuildOptions::default())
            .unwrap();
        assert!(edit.timeline.tracks[0]
            .clips
            .iter()
            .all(|c| c.alias.as_deref() == Some("a")));

        let only_audio = vec![MediaAsset::new("song", "https://cdn.example.com/song.mp3", AssetKind::Audio)];
        let result = CompositionBuilder::default().build(&only_audio, &uniform(2, 2.0, 1.0), &BuildOptions::default());
        assert!(matches!(result, Err(CompositorError::Validation(ref e)) if e.field == "assets"));
    }

    #[test]
    fn test_missing_output_format_is_rejected() {
        let mut options = BuildOptions::default();
        options.output.format = None;
        let result = CompositionBuilder::default().build(&[image("a")], &uniform(1, 2.0, 1.0), &options);
        assert!(matches!(result, Err(CompositorError::Validation(ref e)) if e.field == "output.format"));

        options.output.format = Some(OutputFormat::Gif);
        assert!(CompositionBuilder::default().build(&[image("a")], &uniform(1, 2.0, 1.0), &options).is_ok());
    }
}
