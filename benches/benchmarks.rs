// benches/benchmarks.rs — Performance benchmarks (criterion)
//
// Hot paths on every ingested event and on every training pass:
//   1. Feature extraction + codebook assignment
//   2. Pattern mining over a full history window
//   3. Context-table prediction
//   4. Codebook re-clustering

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use synapse::core::{Event, EventKind};
use synapse::features::FeatureExtractor;
use synapse::patterns::mine_patterns;
use synapse::predictor::SequencePredictor;
use synapse::quantizer::{Codebook, Rng, TokenId};

// ─── Helpers ────────────────────────────────────────────────────────────────

/// A mixed stream with a recurring click → type → submit routine.
fn build_events(n: usize) -> Vec<Event> {
    (0..n)
        .map(|i| {
            let ts = 1_700_000_000_000 + i as i64 * 750;
            match i % 7 {
                0 => Event::new(EventKind::Click, ts)
                    .with_feature("element_role", "button")
                    .with_position(120.0, 340.0),
                1 => Event::new(EventKind::TextInput, ts).with_value("hello"),
                2 => Event::new(EventKind::Keydown, ts).with_key("enter", &[]),
                3 => Event::new(EventKind::FormSubmit, ts),
                4 => Event::new(EventKind::Scroll, ts).with_feature("direction", "down"),
                5 => Event::new(EventKind::Keydown, ts).with_key("c", &["ctrl"]),
                _ => Event::new(EventKind::TabActivated, ts).with_tab(i as i64 % 4),
            }
        })
        .collect()
}

// ─── Benchmarks ─────────────────────────────────────────────────────────────

fn bench_quantize(c: &mut Criterion) {
    let extractor = FeatureExtractor::new(18);
    let codebook = Codebook::random(256, 18, &mut Rng::seeded(42));
    let events = build_events(100);

    let mut group = c.benchmark_group("quantize");
    group.bench_function("extract_100", |b| {
        b.iter(|| {
            for e in &events {
                black_box(extractor.extract(e));
            }
        })
    });
    group.bench_function("extract_assign_100", |b| {
        b.iter(|| {
            for e in &events {
                black_box(codebook.assign(&extractor.extract(e)));
            }
        })
    });
    group.finish();
}

fn bench_mining(c: &mut Criterion) {
    let extractor = FeatureExtractor::new(18);
    let tokens: Vec<String> = build_events(1000)
        .iter()
        .map(|e| extractor.base_token(e))
        .collect();

    let mut group = c.benchmark_group("mining");
    group.bench_function("mine_1000_len_2_3", |b| {
        b.iter(|| black_box(mine_patterns(&tokens, 2, 3, 3)))
    });
    group.bench_function("mine_50_len_3_10", |b| {
        b.iter(|| black_box(mine_patterns(&tokens[..50], 3, 10, 2)))
    });
    group.finish();
}

fn bench_predict(c: &mut Criterion) {
    let extractor = FeatureExtractor::new(18);
    let codebook = Codebook::random(256, 18, &mut Rng::seeded(7));
    let ids: Vec<TokenId> = build_events(1000)
        .iter()
        .map(|e| codebook.assign(&extractor.extract(e)))
        .collect();
    let mut table = SequencePredictor::new(5, 10_000);
    table.observe(&ids);
    let recent = &ids[ids.len() - 5..];

    c.bench_function("predict_context_5", |b| {
        b.iter(|| black_box(table.predict(black_box(recent))))
    });
    c.bench_function("observe_1000", |b| {
        b.iter(|| {
            let mut t = SequencePredictor::new(5, 10_000);
            t.observe(black_box(&ids));
            t
        })
    });
}

fn bench_rebuild(c: &mut Criterion) {
    let extractor = FeatureExtractor::new(18);
    let vectors: Vec<Vec<f32>> = build_events(1000)
        .iter()
        .map(|e| extractor.extract(e))
        .collect();
    let mut rng = Rng::seeded(3);
    let codebook = Codebook::random(64, 18, &mut rng);

    c.bench_function("rebuild_64x1000_10_iter", |b| {
        b.iter(|| codebook.rebuild(black_box(&vectors), 10, &mut rng))
    });
}

criterion_group!(benches, bench_quantize, bench_mining, bench_predict, bench_rebuild);
criterion_main!(benches);
