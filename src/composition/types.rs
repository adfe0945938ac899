use serde::{Deserialize, Serialize};

use crate::probe::MediaMetadata;

/// Kind of a media asset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssetKind {
    Image,
    Video,
    Audio,
}

/// A piece of source media referenced by a composition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAsset {
    pub id: String,
    pub src: String,
    pub kind: AssetKind,

    /// Natural duration in seconds, when the caller knows it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,

    /// Stream metadata filled in by the prober
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probe: Option<MediaMetadata>,

    /// Probe failures on a required asset abort the composition
    #[serde(default)]
    pub required: bool,
}

impl MediaAsset {
    pub fn new(id: impl Into<String>, src: impl Into<String>, kind: AssetKind) -> Self {
        Self {
            id: id.into(),
            src: src.into(),
            kind,
            duration: None,
            width: None,
            height: None,
            probe: None,
            required: false,
        }
    }

    pub fn with_duration(mut self, duration: f64) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn is_visual(&self) -> bool {
        matches!(self.kind, AssetKind::Image | AssetKind::Video)
    }

    /// Known natural duration: the declared one first, then the probed one
    pub fn natural_duration(&self) -> Option<f64> {
        self.duration
            .filter(|d| d.is_finite() && *d > 0.0)
            .or_else(|| self.probe.as_ref().and_then(|p| p.duration()))
    }
}

/// Declarative timeline submitted for rendering
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edit {
    pub timeline: Timeline,
    #[serde(default)]
    pub output: Output,
}

impl Edit {
    /// End of the last clip across all tracks (seconds)
    pub fn duration(&self) -> f64 {
        self.timeline
            .tracks
            .iter()
            .flat_map(|t| t.clips.iter())
            .map(|c| c.start + c.length)
            .fold(0.0, f64::max)
    }

    /// Canonical JSON; identical edits serialize to identical bytes
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Timeline {
    #[serde(default)]
    pub tracks: Vec<Track>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Track {
    #[serde(default)]
    pub clips: Vec<Clip>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Clip {
    pub asset: Asset,
    /// Position on the timeline (seconds)
    pub start: f64,
    /// Time on screen (seconds)
    pub length: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transition: Option<Transition>,
    /// Id of the media asset this clip came from
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

/// Media reference inside a clip
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Asset {
    Video {
        src: String,
        /// Seconds skipped at the start of the source
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trim: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        speed: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        volume: Option<f64>,
    },
    Image {
        src: String,
    },
    Audio {
        src: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        trim: Option<f64>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        volume: Option<f64>,
    },
}

impl Asset {
    pub fn src(&self) -> &str {
        match self {
            Self::Video { src, .. } | Self::Image { src } | Self::Audio { src, .. } => src,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    #[serde(rename = "in", default, skip_serializing_if = "Option::is_none")]
    pub incoming: Option<TransitionKind>,
    #[serde(rename = "out", default, skip_serializing_if = "Option::is_none")]
    pub outgoing: Option<TransitionKind>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TransitionKind {
    Fade,
    Reveal,
    WipeLeft,
    WipeRight,
    SlideLeft,
    SlideRight,
    SlideUp,
    SlideDown,
    Zoom,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Output {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<OutputFormat>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fps: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    Mp4,
    Mov,
    Webm,
    Gif,
}
