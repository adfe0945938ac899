//! Benchmarks for soundtrack analysis and pacing

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tempo_compositor::{
    audio::{AnalysisConfig, AudioAnalyzer, AudioData, BeatMarker, MusicAnalysis, Section, TempoDescriptor},
    pacing::{PacingConfig, PacingPlanner},
};

/// Decaying clicks at `bpm` over a quiet tone
fn click_track(bpm: f64, seconds: f64, sample_rate: u32) -> AudioData {
    let period = (60.0 / bpm * sample_rate as f64) as usize;
    let samples = (0..(seconds * sample_rate as f64) as usize)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            let click = (-((i % period) as f32) / 200.0).exp();
            click * 0.8 + (t * 220.0 * 2.0 * std::f32::consts::PI).sin() * 0.05
        })
        .collect();
    AudioData::from_mono(samples, sample_rate, "bench")
}

fn bench_analyze(c: &mut Criterion) {
    let audio = click_track(124.0, 30.0, 22050);

    let analyzer = AudioAnalyzer::new();
    c.bench_function("analyze_30s_default", |b| {
        b.iter(|| analyzer.analyze(black_box(&audio)))
    });

    let fast = AudioAnalyzer::with_config(AnalysisConfig::fast());
    c.bench_function("analyze_30s_fast", |b| {
        b.iter(|| fast.analyze(black_box(&audio)))
    });
}

fn bench_plan(c: &mut Criterion) {
    let duration = 180.0;
    let period = 60.0 / 128.0;
    let beats = (0..(duration / period) as usize)
        .map(|i| BeatMarker { time_sec: i as f64 * period, strength: 1.0 })
        .collect();
    let sections = (0..9)
        .map(|i| Section {
            start_sec: i as f64 * 20.0,
            end_sec: (i + 1) as f64 * 20.0,
            energy: (i % 3) as f64 * 0.4 + 0.1,
        })
        .collect();
    let analysis = MusicAnalysis {
        bpm: 128.0,
        bpm_confidence: 1.0,
        energy: 0.5,
        tempo: TempoDescriptor::from_bpm(128.0),
        duration,
        sections,
        beats,
    };

    let planner = PacingPlanner::new(PacingConfig::default());
    c.bench_function("plan_3min_128bpm", |b| {
        b.iter(|| planner.plan(black_box(&analysis), black_box(duration)))
    });
}

criterion_group!(benches, bench_analyze, bench_plan);
criterion_main!(benches);
