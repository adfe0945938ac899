//! # Tempo-Compositor
//!
//! Turn a soundtrack and a set of media assets into a beat-synchronized video edit,
//! then hand that edit to an external renderer and follow the job to completion.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tempo_compositor::{
//!     composition::{AssetKind, CompositionEngine, CompositionRequest, MediaAsset},
//!     config::Config,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let engine = CompositionEngine::new(Config::default());
//!
//! let plan = engine.compose(CompositionRequest {
//!     soundtrack_url: "https://cdn.example.com/song.mp3".to_string(),
//!     assets: vec![
//!         MediaAsset::new("intro", "https://cdn.example.com/intro.mp4", AssetKind::Video),
//!         MediaAsset::new("cover", "https://cdn.example.com/cover.jpg", AssetKind::Image),
//!     ],
//!     duration: Some(30.0),
//!     output_format: None,
//!     transition: None,
//! }).await?;
//!
//! println!("{}", plan.edit.to_json()?);
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! - [`audio`] - Soundtrack decoding, tempo, beats, energy and sections
//! - [`pacing`] - Beat-aligned segment planning driven by section energy
//! - [`probe`] - Remote media metadata through `ffprobe`
//! - [`composition`] - Edit types, the builder, validation and the pipeline engine
//! - [`render`] - Render submission, webhook and poll reconciliation, job storage
//! - [`server`] - HTTP endpoints for webhooks, probing and job status
//! - [`config`] - Configuration management

pub mod audio;
pub mod composition;
pub mod config;
pub mod error;
pub mod pacing;
pub mod probe;
pub mod render;
pub mod server;

// Re-export commonly used types for convenience
pub use crate::{
    composition::CompositionEngine,
    config::Config,
    error::{CompositorError, Result},
};
