use std::collections::{HashMap, VecDeque};
use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::audio::{AnalysisConfig, AudioAnalyzer, AudioLoader, MusicAnalysis};
use crate::config::seconds;
use crate::error::{AnalysisError, CompositorError, Result};

/// Bounded map of soundtrack URL to finished analysis, oldest entry evicted first
#[derive(Clone)]
pub struct AnalysisCache {
    inner: Arc<Mutex<CacheInner>>,
    capacity: usize,
}

struct CacheInner {
    entries: HashMap<String, Arc<MusicAnalysis>>,
    order: VecDeque<String>,
}

impl AnalysisCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(CacheInner {
                entries: HashMap::new(),
                order: VecDeque::new(),
            })),
            capacity: capacity.max(1),
        }
    }

    pub fn get(&self, url: &str) -> Option<Arc<MusicAnalysis>> {
        self.inner.lock().entries.get(url).cloned()
    }

    pub fn insert(&self, url: &str, analysis: Arc<MusicAnalysis>) {
        let mut inner = self.inner.lock();
        if inner.entries.insert(url.to_string(), analysis).is_none() {
            inner.order.push_back(url.to_string());
        }
        while inner.order.len() > self.capacity {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for AnalysisCache {
    fn default() -> Self {
        Self::new(64)
    }
}

/// Fetch, decode and analyze soundtracks with bounded time and per-URL caching
#[derive(Clone)]
pub struct SoundtrackAnalyzer {
    config: AnalysisConfig,
    client: reqwest::Client,
    cache: AnalysisCache,
}

impl SoundtrackAnalyzer {
    pub fn new(config: AnalysisConfig, client: reqwest::Client) -> Self {
        Self::with_cache(config, client, AnalysisCache::default())
    }

    pub fn with_cache(config: AnalysisConfig, client: reqwest::Client, cache: AnalysisCache) -> Self {
        Self { config, client, cache }
    }

    pub fn cache(&self) -> &AnalysisCache {
        &self.cache
    }

    /// Analyze the soundtrack at `url`, reusing a cached result when present
    pub async fn analyze_url(&self, url: &str) -> Result<Arc<MusicAnalysis>> {
        if let Some(hit) = self.cache.get(url) {
            tracing::debug!("Analysis cache hit for {}", url);
            return Ok(hit);
        }

        tracing::info!("🎵 Analyzing soundtrack: {}", url);
        let fetch_timeout = seconds(self.config.fetch_timeout_sec);
        let bytes = AudioLoader::fetch_bytes(&self.client, url, fetch_timeout).await?;

        let analysis = Arc::new(self.decode_and_analyze(bytes, url.to_string()).await?);
        self.cache.insert(url, analysis.clone());
        Ok(analysis)
    }

    /// Analyze a local audio file
    pub async fn analyze_file<P: AsRef<Path>>(&self, path: P) -> Result<MusicAnalysis> {
        let path = path.as_ref();
        let bytes = tokio::fs::read(path).await?;
        self.decode_and_analyze(bytes, path.display().to_string()).await
    }

    async fn decode_and_analyze(&self, bytes: Vec<u8>, source: String) -> Result<MusicAnalysis> {
        let config = self.config.clone();
        let limit = seconds(self.config.analysis_timeout_sec);

        let task = tokio::task::spawn_blocking(move || {
            let audio = AudioLoader::decode(bytes, &source)?;
            tracing::debug!(
                "Decoded {}: {:.1}s at {} Hz, {} channels",
                source, audio.duration, audio.sample_rate, audio.channels
            );
            AudioAnalyzer::with_config(config).analyze(&audio)
        });

        match tokio::time::timeout(limit, task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_error)) => Err(AnalysisError::AnalysisFailed {
                reason: join_error.to_string(),
            }.into()),
            Err(_) => Err(CompositorError::Timeout {
                operation: "soundtrack analysis".to_string(),
                seconds: limit.as_secs_f64(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::{Section, TempoDescriptor};
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn analysis(bpm: f64) -> Arc<MusicAnalysis> {
        Arc::new(MusicAnalysis {
            bpm,
            bpm_confidence: 1.0,
            energy: 0.5,
            tempo: TempoDescriptor::from_bpm(bpm),
            duration: 1.0,
            sections: vec![Section { start_sec: 0.0, end_sec: 1.0, energy: 0.5 }],
            beats: Vec::new(),
        })
    }

    fn tone_wav(seconds: f64) -> Vec<u8> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut writer = hound::WavWriter::new(&mut cursor, spec).unwrap();
            for i in 0..(seconds * 8000.0) as usize {
                let t = i as f64 / 8000.0;
                writer.write_sample(((2.0 * std::f64::consts::PI * 330.0 * t).sin() * 12000.0) as i16).unwrap();
            }
            writer.finalize().unwrap();
        }
        cursor.into_inner()
    }

    #[test]
    fn test_cache_evicts_oldest() {
        let cache = AnalysisCache::new(2);
        cache.insert("a", analysis(100.0));
        cache.insert("b", analysis(110.0));
        cache.insert("a", analysis(101.0));
        cache.insert("c", analysis(120.0));

        assert_eq!(cache.len(), 2);
        assert!(cache.get("a").is_none());
        assert_eq!(cache.get("b").unwrap().bpm, 110.0);
        assert_eq!(cache.get("c").unwrap().bpm, 120.0);
    }

    #[tokio::test]
    async fn test_analyze_url_caches_by_url() {
        let hits = Arc::new(AtomicUsize::new(0));
        let body = tone_wav(3.0);

        let counter = hits.clone();
        let app = axum::Router::new().route(
            "/track.wav",
            axum::routing::get(move || {
                let counter = counter.clone();
                let body = body.clone();
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    body
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        let analyzer = SoundtrackAnalyzer::new(AnalysisConfig::default(), reqwest::Client::new());
        let url = format!("http://{}/track.wav", addr);

        let first = analyzer.analyze_url(&url).await.unwrap();
        let second = analyzer.analyze_url(&url).await.unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&first, &second));
        assert!((first.duration - 3.0).abs() < 1e-6);
        assert!(first.energy > 0.0);
    }

    #[tokio::test]
    async fn test_analyze_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.mp3");
        std::fs::write(&path, b"not really an mp3").unwrap();

        let analyzer = SoundtrackAnalyzer::new(AnalysisConfig::default(), reqwest::Client::new());
        let result = analyzer.analyze_file(&path).await;
        assert!(matches!(result, Err(CompositorError::Analysis(_))));
    }
}
