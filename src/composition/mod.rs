//! # Composition
//!
//! Declarative edit types, the builder that fills them from pacing segments and
//! media assets, the validation every edit passes before submission, and the engine
//! that runs the whole pipeline for one request.

pub mod builder;
pub mod engine;
pub mod types;
pub mod validate;

// Re-exports for convenience
pub use builder::{BuildOptions, CompositionBuilder, Soundtrack};
pub use engine::{CompositionEngine, CompositionPlan, CompositionRequest, ProbeFailure};
pub use types::{
    Asset, AssetKind, Clip, Edit, MediaAsset, Output, OutputFormat,
    Timeline, Track, Transition, TransitionKind
};
pub use validate::validate;
