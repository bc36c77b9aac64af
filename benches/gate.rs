//! Benchmarks for the fast-path authenticator.
//!
//! Run with: cargo bench --bench gate

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use meshgate::{
    siphash24, Authenticator, FrameBuilder, GateConfig, GateStats, MacKey, SessionId,
    SessionRecord, SessionStore,
};
use std::sync::Arc;

const NOW: u64 = 1_000;

/// Authenticator with one installed session, its record and a builder for it.
fn setup() -> (Authenticator, SessionRecord, FrameBuilder) {
    let store = Arc::new(SessionStore::new());
    let stats = Arc::new(GateStats::new(1));
    let gate = Authenticator::new(store, stats, &GateConfig::default());

    let id = SessionId::generate();
    let key = MacKey::generate();
    let record = SessionRecord::established(id, key.clone(), NOW);
    gate.store().install(&record).unwrap();
    (gate, record, FrameBuilder::new(id, key))
}

// ===== SipHash Benchmarks =====

fn bench_siphash(c: &mut Criterion) {
    let mut group = c.benchmark_group("siphash24");
    let key = MacKey::generate();

    for len in [0usize, 64, 512, 1400] {
        let msg = vec![0xA5u8; len];
        group.bench_with_input(BenchmarkId::from_parameter(len), &msg, |b, msg| {
            b.iter(|| siphash24(black_box(&key), black_box(msg)))
        });
    }

    group.finish();
}

// ===== Authenticator Benchmarks =====

fn bench_admit(c: &mut Criterion) {
    let mut group = c.benchmark_group("gate_admit");

    for len in [64usize, 1400] {
        let (gate, record, builder) = setup();
        // Pre-build a strictly increasing run; reset the watermark when exhausted.
        let frames: Vec<Vec<u8>> = (0..10_000u32)
            .map(|seq| builder.build(seq, &vec![0u8; len]).unwrap())
            .collect();
        let mut i = 0;

        group.bench_function(BenchmarkId::from_parameter(len), |b| {
            b.iter(|| {
                if i == frames.len() {
                    gate.store().replace(&record).unwrap();
                    i = 0;
                }
                let admission = gate.process(black_box(&frames[i]), NOW, 0);
                i += 1;
                admission
            })
        });
    }

    group.finish();
}

fn bench_reject(c: &mut Criterion) {
    let mut group = c.benchmark_group("gate_reject");
    let (gate, _, builder) = setup();

    // Replay: stopped by the pre-check, no MAC computed
    let frame = builder.build(10, &[0u8; 1400]).unwrap();
    gate.process(&frame, NOW, 0);
    group.bench_function("replay", |b| b.iter(|| gate.process(black_box(&frame), NOW, 0)));

    // MAC failure: full tag computed
    let mut forged = builder.build(1_000_000, &[0u8; 1400]).unwrap();
    let last = forged.len() - 1;
    forged[last] ^= 1;
    group.bench_function("mac_failure", |b| {
        b.iter(|| gate.process(black_box(&forged), NOW, 0))
    });

    // Unknown session
    let stranger = FrameBuilder::new(SessionId::generate(), MacKey::generate())
        .build(1, &[0u8; 64])
        .unwrap();
    group.bench_function("no_session", |b| {
        b.iter(|| gate.process(black_box(&stranger), NOW, 0))
    });

    // Not mesh traffic
    let other = builder.clone().with_dst_port(53).build(1, &[0u8; 64]).unwrap();
    group.bench_function("pass_through", |b| {
        b.iter(|| gate.process(black_box(&other), NOW, 0))
    });

    group.finish();
}

criterion_group!(benches, bench_siphash, bench_admit, bench_reject);
criterion_main!(benches);
