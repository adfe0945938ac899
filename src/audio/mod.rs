//! # Audio Analysis Module
//!
//! Turns a soundtrack into the tempo, energy, beat and section description the
//! pacing planner cuts against.
//!
//! ## Core Features
//!
//! - **Loading**: HTTP(S) download with a bounded timeout, WAV via `hound`, everything else via Symphonia
//! - **Tempo Analysis**: spectral-flux onset envelope and FFT autocorrelation with a tempo prior
//! - **Beat Tracking**: phase-aligned beat grid snapped onto onset peaks
//! - **Sections**: energy step detection over the smoothed RMS envelope
//! - **Caching**: analyses are reused per soundtrack URL
//!
//! ## Usage
//!
//! ```rust,no_run
//! use tempo_compositor::audio::{AudioAnalyzer, AudioLoader};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let audio_data = AudioLoader::load("song.wav").await?;
//!
//! let analyzer = AudioAnalyzer::new();
//! let analysis = analyzer.analyze(&audio_data)?;
//!
//! println!("Detected BPM: {:.1} ({:?})", analysis.bpm, analysis.tempo);
//! println!("Found {} beats in {} sections", analysis.beats.len(), analysis.sections.len());
//! # Ok(())
//! # }
//! ```

pub mod analyzer;
pub mod loader;
pub mod soundtrack;
pub mod types;
pub use analyzer::AudioAnalyzer;
pub use loader::AudioLoader;
pub use soundtrack::{AnalysisCache, SoundtrackAnalyzer};
pub use types::{
    AudioData, AudioFormat, AnalysisConfig, BeatMarker,
    MusicAnalysis, Section, TempoDescriptor
};
