//! # Pacing Module
//!
//! Converts a soundtrack analysis into an ordered list of edit segments. Segment
//! boundaries follow the beat grid; louder sections cut faster and play faster.

pub mod planner;
pub mod types;

pub use planner::PacingPlanner;
pub use types::{PacingConfig, PacingEntry};
