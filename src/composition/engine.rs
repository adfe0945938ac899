use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::{
    audio::{MusicAnalysis, SoundtrackAnalyzer},
    composition::builder::{BuildOptions, CompositionBuilder},
    composition::types::{AssetKind, Edit, MediaAsset, OutputFormat, TransitionKind},
    config::Config,
    error::Result,
    pacing::{PacingEntry, PacingPlanner},
    probe::MetadataProber,
    render::{JobRepository, RenderBackend, RenderJob, RenderOrchestrator},
};

/// A soundtrack and the media to cut against it
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionRequest {
    pub soundtrack_url: String,
    pub assets: Vec<MediaAsset>,

    /// Edit length in seconds; the soundtrack's length when absent
    #[serde(default)]
    pub duration: Option<f64>,

    #[serde(default)]
    pub output_format: Option<OutputFormat>,

    #[serde(default)]
    pub transition: Option<TransitionKind>,
}

/// An asset whose metadata could not be read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeFailure {
    pub asset_id: String,
    pub kind: String,
    pub message: String,
}

/// Everything the pipeline produced for one request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompositionPlan {
    pub analysis: MusicAnalysis,
    pub pacing: Vec<PacingEntry>,
    pub edit: Edit,
    pub probe_failures: Vec<ProbeFailure>,
}

/// Main composition engine that turns a soundtrack and media into a render-ready edit
///
/// The engine follows a clear pipeline:
/// 1. Probing and soundtrack analysis, run concurrently
/// 2. Pacing - beat-aware segments from the analysis
/// 3. Building - clips, transitions and soundtrack assembled and validated
/// 4. Submission - optional hand-off to the render orchestrator
pub struct CompositionEngine {
    config: Config,
    prober: MetadataProber,
    soundtrack: SoundtrackAnalyzer,
    planner: PacingPlanner,
    builder: CompositionBuilder,
}

impl CompositionEngine {
    /// Create a new composition engine with the given configuration
    pub fn new(config: Config) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Create an engine sharing an existing HTTP client
    pub fn with_client(config: Config, client: reqwest::Client) -> Self {
        Self {
            prober: MetadataProber::new(config.probe.clone(), client.clone()),
            soundtrack: SoundtrackAnalyzer::new(config.analysis.clone(), client),
            planner: PacingPlanner::new(config.pacing.clone()),
            builder: CompositionBuilder::new(config.composition.clone()),
            config,
        }
    }

    pub fn prober(&self) -> &MetadataProber {
        &self.prober
    }

    pub fn soundtrack_analyzer(&self) -> &SoundtrackAnalyzer {
        &self.soundtrack
    }

    /// Main composition method - orchestrates the pipeline up to a validated edit
    pub async fn compose(&self, request: CompositionRequest) -> Result<CompositionPlan> {
        info!("🎬 Starting composition");
        info!("   Soundtrack: {}", request.soundtrack_url);
        info!("   Assets: {}", request.assets.len());

        // Pipeline Step 1: probing and analysis side by side
        let (probed, analysis) = tokio::join!(
            self.probe_assets(request.assets),
            self.soundtrack.analyze_url(&request.soundtrack_url),
        );
        let analysis = analysis?;
        let (assets, probe_failures) = probed?;

        info!("   ✅ Analysis: {:.1} BPM ({:?}), energy {:.2}, {} beats, {} sections",
              analysis.bpm, analysis.tempo, analysis.energy, analysis.beats.len(), analysis.sections.len());

        // Pipeline Step 2: pacing
        let duration = request.duration.unwrap_or(analysis.duration);
        info!("⏱️  Planning {:.1}s of edit...", duration);
        let pacing = self.planner.plan(&analysis, duration)?;
        debug!("   {} segments planned", pacing.len());

        // Pipeline Step 3: building
        info!("🧩 Building timeline...");
        let mut options = BuildOptions::from_config(&self.config.composition)
            .with_soundtrack(&request.soundtrack_url, self.config.composition.soundtrack_volume);
        if let Some(format) = request.output_format {
            options.output.format = Some(format);
        }
        if let Some(transition) = request.transition {
            options.transition = Some(transition);
        }
        let edit = self.builder.build(&assets, &pacing, &options)?;

        info!("🎉 Composition ready: {} clips over {:.1}s",
              edit.timeline.tracks.first().map(|t| t.clips.len()).unwrap_or(0), edit.duration());

        Ok(CompositionPlan {
            analysis: (*analysis).clone(),
            pacing,
            edit,
            probe_failures,
        })
    }

    /// Compose and hand the edit to the render orchestrator
    pub async fn compose_and_submit<B: RenderBackend, R: JobRepository>(
        &self,
        orchestrator: &RenderOrchestrator<B, R>,
        owner_id: &str,
        request: CompositionRequest,
    ) -> Result<(CompositionPlan, RenderJob)> {
        let plan = self.compose(request).await?;
        info!("🚀 Submitting edit for rendering...");
        let job = orchestrator.submit(owner_id, plan.edit.clone()).await?;
        Ok((plan, job))
    }

    // ==========================================
    // PIPELINE STEP 1: PROBING
    // ==========================================

    /// Probe every asset that needs metadata. Failures on required assets abort;
    /// any other failure is recorded and the builder's defaults take over.
    async fn probe_assets(&self, assets: Vec<MediaAsset>) -> Result<(Vec<MediaAsset>, Vec<ProbeFailure>)> {
        info!("🔎 Probing assets...");

        let probes = assets.iter().map(|asset| async move {
            if needs_probe(asset) {
                Some(self.prober.probe(&asset.src).await)
            } else {
                None
            }
        });
        let results = futures::future::join_all(probes).await;

        let mut failures = Vec::new();
        let mut probed = Vec::with_capacity(assets.len());

        for (mut asset, result) in assets.into_iter().zip(results) {
            match result {
                Some(Ok(output)) => {
                    if let Some((width, height)) = output.metadata.dimensions() {
                        asset.width.get_or_insert(width);
                        asset.height.get_or_insert(height);
                    }
                    asset.probe = Some(output.metadata);
                }
                Some(Err(e)) if asset.required => {
                    warn!("Required asset {} could not be probed: {}", asset.id, e);
                    return Err(e.into());
                }
                Some(Err(e)) => {
                    warn!("Probe of {} failed ({}), continuing with defaults", asset.id, e.kind());
                    failures.push(ProbeFailure {
                        asset_id: asset.id.clone(),
                        kind: e.kind().to_string(),
                        message: e.to_string(),
                    });
                }
                None => {}
            }
            probed.push(asset);
        }

        Ok((probed, failures))
    }
}

fn needs_probe(asset: &MediaAsset) -> bool {
    asset.probe.is_none()
        && (asset.required || (asset.kind == AssetKind::Video && asset.duration.is_none()))
}
