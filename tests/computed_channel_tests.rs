use approx::assert_relative_eq;

use comtrade_view::api::{Reconciler, ViewerConfig};
use comtrade_view::computed::{
    BusMessage, COMPUTED_CFG, COMPUTED_DATA, COMPUTED_META, ComputeRequest, ComputedChannelMeta,
    ComputedChannelStore, ComputedPipeline, KeyValueStorage, MemoryStorage, PersistOutcome,
    RecordingPeer, StoredMeta,
};
use comtrade_view::core::{ChannelKey, ChannelKind, ChannelRow, ChannelState, DataState};
use comtrade_view::expression::ExpressionEngine;
use comtrade_view::planner::MaxAxesStore;
use comtrade_view::reactive::ChannelStore;
use comtrade_view::render::NullChartFactory;

const SAMPLES: usize = 1000;

fn constant_phases() -> ChannelStore {
    let state = ChannelState::from_rows(
        vec![
            ChannelRow::new("IA").with_group("G0").with_unit("A"),
            ChannelRow::new("IB").with_group("G0").with_unit("A"),
            ChannelRow::new("IC").with_group("G1").with_unit("A"),
        ],
        Vec::new(),
    )
    .expect("state");
    let data = DataState {
        time: Some((0..SAMPLES).map(|i| i as f64 / 1000.0).collect()),
        analog: vec![vec![1.0; SAMPLES], vec![2.0; SAMPLES], vec![3.0; SAMPLES]],
        ..DataState::default()
    };
    ChannelStore::new(state, data).expect("store")
}

fn pipeline_over(live: &ChannelStore, storage: &MemoryStorage) -> ComputedPipeline {
    let store = ComputedChannelStore::open(Box::new(storage.clone()), live.clone());
    ComputedPipeline::new(ExpressionEngine::new(ExpressionEngine::DEFAULT_CAPACITY), store)
}

fn stored<T: serde::de::DeserializeOwned>(storage: &MemoryStorage, key: &str) -> T {
    let raw = storage.get(key).expect("record present");
    serde_json::from_str(&raw).expect("record parses")
}

#[test]
fn sum_of_three_phases_is_saved_with_stats_and_aligned_records() {
    let live = constant_phases();
    let storage = MemoryStorage::new();
    let mut pipeline = pipeline_over(&live, &storage);

    let saved = pipeline
        .create(ComputeRequest::new("a0 + a1 + a2").with_name("sum"))
        .expect("create");
    assert!(saved.created);
    assert_eq!(saved.group, "G2");

    let channel = pipeline.store().get(&saved.id).expect("in memory");
    assert_eq!(channel.values.len(), SAMPLES);
    assert!(channel.values.iter().all(|value| *value == 6.0));
    assert_relative_eq!(channel.meta.stats.mean, 6.0);
    assert_relative_eq!(channel.meta.stats.rms, 6.0);
    assert_relative_eq!(channel.meta.stats.std_dev, 0.0);
    assert_eq!(channel.meta.made_from, ChannelKind::Analog);

    let metas: Vec<ComputedChannelMeta> = stored(&storage, COMPUTED_CFG);
    let values: Vec<Vec<f64>> = stored(&storage, COMPUTED_DATA);
    let bookkeeping: StoredMeta = stored(&storage, COMPUTED_META);
    assert_eq!(metas.len(), values.len());
    assert_eq!(metas[0].id, saved.id);
    assert_eq!(values[0].len(), SAMPLES);
    assert_eq!(bookkeeping.channel_count, 1);

    assert_eq!(live.len(ChannelKind::Computed), 1);
    let row = live.channel_row(ChannelKind::Computed, 0).expect("mirrored");
    assert_eq!(row.equation.as_deref(), Some("a0 + a1 + a2"));
    assert_eq!(row.y_label, "sum");
}

#[test]
fn channel_ids_alias_positional_names() {
    let live = constant_phases();
    let mut pipeline = pipeline_over(&live, &MemoryStorage::new());
    let by_id = pipeline.preview("IA * 10").expect("by id");
    let by_position = pipeline.preview("a0 * 10").expect("by position");
    assert_eq!(by_id.values, by_position.values);
    assert!(pipeline.preview("IZ + 1").is_err());
}

#[test]
fn saved_channels_survive_a_reopen() {
    let live = constant_phases();
    let storage = MemoryStorage::new();
    let mut pipeline = pipeline_over(&live, &storage);
    pipeline
        .create(ComputeRequest::new("a0 - a1").with_unit("A").with_color("#123456"))
        .expect("first");
    pipeline
        .create(ComputeRequest::new("abs(a2) * 2").with_group("G0"))
        .expect("second");
    let before = pipeline.store().channels().to_vec();

    let reopened = ComputedChannelStore::open(Box::new(storage.clone()), constant_phases());
    assert_eq!(reopened.channels(), before.as_slice());
    assert!(!reopened.legacy_pending());
}

#[test]
fn resaving_an_equation_updates_in_place() {
    let live = constant_phases();
    let mut pipeline = pipeline_over(&live, &MemoryStorage::new());
    let first = pipeline
        .create(ComputeRequest::new("a0 * 3").with_name("triple"))
        .expect("first");
    let second = pipeline
        .create(ComputeRequest::new("a0 * 3").with_scaling(0.5))
        .expect("second");

    assert!(!second.created);
    assert_eq!(second.id, first.id);
    assert_eq!(pipeline.store().len(), 1);
    assert_eq!(live.len(ChannelKind::Computed), 1);
    let channel = pipeline.store().get(&first.id).expect("channel");
    assert_eq!(channel.meta.name, "triple");
    assert_relative_eq!(channel.meta.scaling_factor, 0.5);
}

#[test]
fn full_quota_keeps_channel_in_memory() {
    let live = constant_phases();
    let storage = MemoryStorage::with_quota(64);
    let mut pipeline = pipeline_over(&live, &storage);

    let saved = pipeline.create(ComputeRequest::new("a1")).expect("create");
    assert_eq!(pipeline.store().last_persist(), Some(PersistOutcome::MemoryOnly));
    assert!(pipeline.store().get(&saved.id).is_some());
    assert_eq!(live.len(ChannelKind::Computed), 1);
}

#[test]
fn peers_hear_updates_and_deletions() {
    let live = constant_phases();
    let mut pipeline = pipeline_over(&live, &MemoryStorage::new());
    let peer = RecordingPeer::new("popout");
    pipeline
        .store_mut()
        .bus_mut()
        .connect(Box::new(peer.clone()))
        .expect("connect");

    let saved = pipeline.create(ComputeRequest::new("a0 + 1")).expect("create");
    assert!(pipeline.delete(&saved.id).expect("delete"));
    assert!(!pipeline.delete(&saved.id).expect("already gone"));

    let received = peer.received();
    assert_eq!(received.len(), 3);
    assert!(matches!(
        &received[0],
        BusMessage::ComputedChannelsUpdated { computed_channels } if computed_channels.len() == 1
    ));
    assert_eq!(
        received[1],
        BusMessage::ComputedChannelDeleted {
            id: saved.id.clone()
        }
    );
    assert!(matches!(
        &received[2],
        BusMessage::ComputedChannelsUpdated { computed_channels } if computed_channels.is_empty()
    ));
    assert_eq!(live.len(ChannelKind::Computed), 0);
}

#[test]
fn refresh_reevaluates_after_new_samples() {
    let live = constant_phases();
    let mut pipeline = pipeline_over(&live, &MemoryStorage::new());
    let saved = pipeline
        .create(ComputeRequest::new("a0 * 2").with_scaling(3.0))
        .expect("create");

    live.set_channel_samples(ChannelKind::Analog, 0, vec![5.0; SAMPLES])
        .expect("samples");
    assert_eq!(pipeline.refresh_all().expect("refresh"), 1);

    let channel = pipeline.store().get(&saved.id).expect("channel");
    assert!(channel.values.iter().all(|value| *value == 10.0));
    assert_relative_eq!(channel.meta.scaling_factor, 3.0);
}

#[test]
fn saved_channel_reaches_the_charts() {
    let live = constant_phases();
    let factory = NullChartFactory::new();
    let engine = Reconciler::attach(&live, factory, ViewerConfig::default(), MaxAxesStore::new())
        .expect("attach");
    let mut pipeline = pipeline_over(&live, &MemoryStorage::new());

    pipeline
        .create(ComputeRequest::new("a0 + a1").with_group("G1").with_unit("A"))
        .expect("create");

    let engine = engine.borrow();
    let owners = engine
        .registry()
        .charts_for(ChannelKey::new(ChannelKind::Computed, 0));
    assert_eq!(owners.len(), 1);
    assert_eq!(
        engine.registry().find_group(ChannelKind::Analog, "G1"),
        Some(owners[0])
    );
}
