use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ProbeError;

pub type ProbeResult<T> = std::result::Result<T, ProbeError>;

/// Normalized metadata plus the prober's own JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeOutput {
    pub metadata: MediaMetadata,
    pub raw: Value,
}

/// Container and stream description of a media asset
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaMetadata {
    pub format: FormatInfo,
    pub streams: Vec<StreamInfo>,
}

impl MediaMetadata {
    /// Container duration in seconds, if known and positive
    pub fn duration(&self) -> Option<f64> {
        self.format.duration.filter(|d| d.is_finite() && *d > 0.0)
    }

    /// First video stream
    pub fn video_stream(&self) -> Option<&StreamInfo> {
        self.streams.iter().find(|s| s.stream_type == StreamType::Video)
    }

    /// Width and height of the first video stream
    pub fn dimensions(&self) -> Option<(u32, u32)> {
        let video = self.video_stream()?;
        Some((video.width?, video.height?))
    }

    pub fn has_audio(&self) -> bool {
        self.streams.iter().any(|s| s.stream_type == StreamType::Audio)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormatInfo {
    /// Seconds
    pub duration: Option<f64>,
    /// Bytes
    pub size: Option<u64>,
    /// Bits per second
    pub bit_rate: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamInfo {
    #[serde(rename = "type")]
    pub stream_type: StreamType,
    pub codec: Option<String>,
    pub width: Option<u32>,
    pub height: Option<u32>,
    /// Frames per second
    pub frame_rate: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamType {
    Video,
    Audio,
    Subtitle,
    Data,
    Other,
}

impl StreamType {
    pub fn from_codec_type(codec_type: &str) -> Self {
        match codec_type {
            "video" => Self::Video,
            "audio" => Self::Audio,
            "subtitle" => Self::Subtitle,
            "data" => Self::Data,
            _ => Self::Other,
        }
    }
}
