//! # Metadata Probe Module
//!
//! Reads container and stream metadata from remote media with `ffprobe`, after a
//! cheap reachability check. Failures come back as a typed [`ProbeError`] with a
//! stable kind (`not_found`, `forbidden`, `timeout`, `unknown`).
//!
//! [`ProbeError`]: crate::error::ProbeError

pub mod prober;
pub mod types;

pub use prober::{normalize, MetadataProber};
pub use types::{FormatInfo, MediaMetadata, ProbeOutput, ProbeResult, StreamInfo, StreamType};
