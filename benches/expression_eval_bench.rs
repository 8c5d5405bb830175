use comtrade_view::api::{Reconciler, ViewerConfig};
use comtrade_view::core::{ChannelKind, ChannelRow, ChannelState, DataState};
use comtrade_view::expression::ExpressionEngine;
use comtrade_view::planner::MaxAxesStore;
use comtrade_view::reactive::ChannelStore;
use comtrade_view::render::NullChartFactory;
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

const SAMPLES: usize = 50_000;

fn fixture(channels: usize) -> (ChannelState, DataState) {
    let rows = (0..channels)
        .map(|i| {
            ChannelRow::new(format!("CH{i}"))
                .with_group(format!("G{}", i % 4))
                .with_unit("V")
        })
        .collect();
    let state = ChannelState::from_rows(rows, Vec::new()).expect("valid state");
    let data = DataState {
        time: Some((0..SAMPLES).map(|i| i as f64 / 4_000.0).collect()),
        analog: (0..channels)
            .map(|c| {
                (0..SAMPLES)
                    .map(|i| ((i as f64) * 0.01 + c as f64).sin() * 100.0)
                    .collect()
            })
            .collect(),
        ..DataState::default()
    };
    (state, data)
}

fn bench_three_phase_sum_50k(c: &mut Criterion) {
    let (state, data) = fixture(3);
    let mut engine = ExpressionEngine::new(ExpressionEngine::DEFAULT_CAPACITY);

    c.bench_function("three_phase_sum_50k", |b| {
        b.iter(|| {
            let _ = engine
                .evaluate(black_box("a0 + a1 + a2"), &state, &data)
                .expect("evaluate");
        })
    });
}

fn bench_rms_style_expression_50k(c: &mut Criterion) {
    let (state, data) = fixture(3);
    let mut engine = ExpressionEngine::new(ExpressionEngine::DEFAULT_CAPACITY);

    c.bench_function("sqrt_of_squares_50k", |b| {
        b.iter(|| {
            let _ = engine
                .evaluate(black_box("sqrt(CH0^2 + CH1^2 + CH2^2) / 3"), &state, &data)
                .expect("evaluate");
        })
    });
}

fn bench_color_patch_across_groups(c: &mut Criterion) {
    let (state, data) = fixture(64);
    let store = ChannelStore::new(state, data).expect("valid store");
    let engine = Reconciler::attach(
        &store,
        NullChartFactory::new(),
        ViewerConfig::default(),
        MaxAxesStore::new(),
    )
    .expect("attach");
    let colors = ["#ff0000", "#00ff00"];
    let mut flip = 0usize;

    c.bench_function("color_patch_and_flush", |b| {
        b.iter(|| {
            flip ^= 1;
            store
                .set_line_color(ChannelKind::Analog, black_box(17), colors[flip])
                .expect("color");
            engine.flush().expect("flush");
        })
    });
}

criterion_group!(
    benches,
    bench_three_phase_sum_50k,
    bench_rms_style_expression_50k,
    bench_color_patch_across_groups
);
criterion_main!(benches);
