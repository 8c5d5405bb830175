use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use comtrade_view::api::{
    ChannelUpdate, InstanceId, Reconciler, ReconcilerHandle, UpdateStage, ViewerConfig,
    handle_channel_update,
};
use comtrade_view::core::{ChannelKey, ChannelKind, ChannelRow, ChannelState, DataState};
use comtrade_view::extensions::{ChartPlugin, PluginEvent};
use comtrade_view::planner::MaxAxesStore;
use comtrade_view::reactive::ChannelStore;
use comtrade_view::render::{ChartOp, NullChartFactory, stroke_color};

const GROUP_SETTLE: Duration = Duration::from_millis(200);

fn analog_rows(colors: &[&str], groups: &[&str], units: &[&str]) -> Vec<ChannelRow> {
    ["IA", "IB", "IC", "VA", "VB"]
        .iter()
        .zip(colors.iter().zip(groups.iter().zip(units)))
        .map(|(id, (color, (group, unit)))| {
            ChannelRow::new(*id)
                .with_color(*color)
                .with_group(*group)
                .with_unit(*unit)
        })
        .collect()
}

fn samples(channels: usize, len: usize) -> DataState {
    DataState {
        time: Some((0..len).map(|i| i as f64 * 0.001).collect()),
        analog: (0..channels)
            .map(|c| (0..len).map(|i| (c * 100 + i) as f64).collect())
            .collect(),
        ..DataState::default()
    }
}

fn three_phase() -> ChannelStore {
    let state = ChannelState::from_rows(
        analog_rows(
            &["#111111", "#222222", "#333333"],
            &["G0", "G0", "G0"],
            &["A", "A", "A"],
        ),
        Vec::new(),
    )
    .expect("state");
    ChannelStore::new(state, samples(3, 16)).expect("store")
}

fn attach(store: &ChannelStore) -> (ReconcilerHandle, NullChartFactory, MaxAxesStore) {
    let _ = comtrade_view::telemetry::init_default_tracing();
    let factory = NullChartFactory::new();
    let max_axes = MaxAxesStore::new();
    let engine = Reconciler::attach(
        store,
        factory.clone(),
        ViewerConfig::default(),
        max_axes.clone(),
    )
    .expect("attach");
    (engine, factory, max_axes)
}

fn only_chart(engine: &ReconcilerHandle) -> InstanceId {
    let ids = engine.borrow().registry().ids();
    assert_eq!(ids.len(), 1, "expected a single chart");
    ids[0]
}

#[test]
fn single_color_patch_updates_stroke_and_schedules_one_redraw() {
    let store = three_phase();
    let (engine, factory, _) = attach(&store);
    let chart = only_chart(&engine);
    let index_before = engine.borrow().registry().reverse_index();
    factory.clear_log();

    store
        .set_line_color(ChannelKind::Analog, 1, "#abcdef")
        .expect("color");

    {
        let engine = engine.borrow();
        assert_eq!(engine.registry().len(), 1);
        let entry = engine.registry().get(chart).expect("chart");
        let stroke = entry.surface().series_stroke(1).expect("stroke");
        assert_eq!(stroke_color(&stroke), "#abcdef");
        assert_eq!(entry.colors()[1], "#abcdef");
        assert_eq!(engine.registry().reverse_index(), index_before);
        assert_eq!(engine.pending_redraws(), 1);
        assert_eq!(engine.stats().structural(), 1);
    }

    engine.flush().expect("flush");
    assert_eq!(factory.redraw_count(), 1);
    assert_eq!(engine.borrow().pending_redraws(), 0);
}

#[test]
fn writing_the_same_color_twice_keeps_the_closure_and_skips_the_redraw() {
    let store = three_phase();
    let (engine, factory, _) = attach(&store);
    let key = ChannelKey::new(ChannelKind::Analog, 0);

    store.set_line_color(ChannelKind::Analog, 0, "#00ff00").expect("first");
    engine.flush().expect("flush");
    let first = engine.borrow().strokes().get(key).expect("cached");
    factory.clear_log();

    store.set_line_color(ChannelKind::Analog, 0, "#00ff00").expect("second");
    let second = engine.borrow().strokes().get(key).expect("cached");
    assert!(Rc::ptr_eq(&first, &second));
    assert_eq!(engine.borrow().pending_redraws(), 0);
    engine.flush().expect("flush");
    assert_eq!(factory.redraw_count(), 0);
}

#[test]
fn group_split_settles_after_debounce() {
    let store = three_phase();
    let (engine, _factory, _) = attach(&store);

    store
        .replace_groups(ChannelKind::Analog, &["G0", "G1", "G0"])
        .expect("groups");
    assert_eq!(engine.borrow().registry().len(), 1, "debounced");

    engine.tick(GROUP_SETTLE).expect("tick");
    let engine = engine.borrow();
    let registry = engine.registry();
    assert_eq!(registry.len(), 2);

    let g0 = registry.find_group(ChannelKind::Analog, "G0").expect("G0");
    let g1 = registry.find_group(ChannelKind::Analog, "G1").expect("G1");
    assert_eq!(registry.get(g0).expect("G0").membership().channel_indices, vec![0, 2]);
    assert_eq!(registry.get(g1).expect("G1").membership().channel_indices, vec![1]);
    assert_eq!(
        registry.reverse_index().get("analog-1"),
        Some(&vec![g1])
    );
    assert_eq!(engine.stats().smart_merges, 1);
}

#[test]
fn rapid_group_edits_collapse_into_one_reconciliation() {
    let store = three_phase();
    let (engine, _factory, _) = attach(&store);

    store.set_group(ChannelKind::Analog, 2, "G1").expect("first");
    engine.tick(Duration::from_millis(120)).expect("tick");
    store.set_group(ChannelKind::Analog, 1, "G1").expect("second");
    engine.tick(Duration::from_millis(120)).expect("tick");
    assert_eq!(engine.borrow().registry().len(), 1, "re-armed debounce");

    engine.tick(Duration::from_millis(80)).expect("tick");
    let engine = engine.borrow();
    assert_eq!(engine.registry().len(), 2);
    let stats = engine.stats();
    assert_eq!(stats.smart_merges + stats.super_fast + stats.reuses, 1);
}

#[test]
fn group_swap_round_trip_restores_membership_and_index() {
    let store = three_phase();
    let (engine, _factory, _) = attach(&store);
    let metas_before: Vec<_> = engine
        .borrow()
        .registry()
        .metas()
        .into_iter()
        .map(|meta| (meta.group_id, meta.channel_indices))
        .collect();
    let index_before = engine.borrow().registry().reverse_index();

    store.set_group(ChannelKind::Analog, 1, "G1").expect("away");
    engine.tick(GROUP_SETTLE).expect("tick");
    assert_eq!(engine.borrow().registry().len(), 2);

    store.set_group(ChannelKind::Analog, 1, "G0").expect("back");
    engine.tick(GROUP_SETTLE).expect("tick");
    engine.flush().expect("idle destroy");

    let engine = engine.borrow();
    let metas_after: Vec<_> = engine
        .registry()
        .metas()
        .into_iter()
        .map(|meta| (meta.group_id, meta.channel_indices))
        .collect();
    assert_eq!(metas_after, metas_before);
    assert_eq!(engine.registry().reverse_index(), index_before);
    assert_eq!(engine.retired_count(), 0);
}

#[test]
fn global_max_axes_pads_every_chart() {
    let state = ChannelState::from_rows(
        analog_rows(
            &["#111111", "#222222", "#333333"],
            &["G0", "G0", "G1"],
            &["V", "A", "V"],
        ),
        Vec::new(),
    )
    .expect("state");
    let store = ChannelStore::new(state, samples(3, 8)).expect("store");
    let (engine, factory, max_axes) = attach(&store);

    assert_eq!(max_axes.get(), 2);
    let engine = engine.borrow();
    let registry = engine.registry();
    let g0 = registry.find_group(ChannelKind::Analog, "G0").expect("G0");
    let g1 = registry.find_group(ChannelKind::Analog, "G1").expect("G1");
    assert_eq!(registry.get(g0).expect("G0").axis_count(), 2);
    assert_eq!(registry.get(g1).expect("G1").axis_count(), 1);
    let created_axes: Vec<usize> = factory
        .log()
        .into_iter()
        .filter_map(|entry| match entry.op {
            ChartOp::Created { axes, .. } => Some(axes),
            _ => None,
        })
        .collect();
    assert_eq!(created_axes, vec![2, 2]);
}

#[test]
fn label_edits_patch_in_place() {
    let store = three_phase();
    let (engine, factory, _) = attach(&store);
    let chart = only_chart(&engine);
    factory.clear_log();

    store.set_label(ChannelKind::Analog, 2, "Phase C").expect("label");
    engine.flush().expect("flush");

    let engine = engine.borrow();
    let entry = engine.registry().get(chart).expect("chart");
    assert_eq!(entry.surface().series_label(2).as_deref(), Some("Phase C"));
    assert_eq!(engine.stats().attribute_patches, 1);
    assert_eq!(factory.count_ops(|op| matches!(op, ChartOp::Created { .. })), 0);
}

#[test]
fn window_edit_sets_x_scale_and_retries_once() {
    let store = three_phase();
    let (engine, factory, _) = attach(&store);
    factory.clear_log();

    store.set_start(ChannelKind::Analog, 0, Some(4.0)).expect("start");
    store.set_duration(ChannelKind::Analog, 0, Some(8.0)).expect("duration");

    let scale_ops = |factory: &NullChartFactory| {
        factory
            .log()
            .into_iter()
            .filter_map(|entry| match entry.op {
                ChartOp::SetScale { scale, min, max } if scale == "x" => Some((min, max)),
                _ => None,
            })
            .collect::<Vec<_>>()
    };
    let applied = scale_ops(&factory);
    let (min, max) = *applied.last().expect("x scale set");
    assert!((min - 0.004).abs() < 1e-12);
    assert!((max - 0.012).abs() < 1e-12);

    engine.tick(Duration::from_millis(50)).expect("retry");
    assert_eq!(scale_ops(&factory).len(), applied.len() + 1);
}

#[test]
fn invert_replaces_chart_data() {
    let store = three_phase();
    let (engine, _factory, _) = attach(&store);
    let chart = only_chart(&engine);

    store.set_invert(ChannelKind::Analog, 0, true).expect("invert");
    let engine = engine.borrow();
    let entry = engine.registry().get(chart).expect("chart");
    let data = entry.surface().data();
    assert_eq!(data.series[0][1], -1.0);
    assert_eq!(data.series[1][1], 101.0);
    assert_eq!(engine.stats().data_patches, 1);
}

#[test]
fn unit_edit_that_adds_an_axis_rebuilds_every_chart() {
    let store = three_phase();
    let (engine, _factory, max_axes) = attach(&store);
    assert_eq!(max_axes.get(), 1);

    store.set_unit(ChannelKind::Analog, 1, "kA").expect("unit");
    let engine = engine.borrow();
    assert_eq!(max_axes.get(), 2);
    assert_eq!(engine.stats().full_rebuilds, 2);
    let chart = engine.registry().ids()[0];
    assert_eq!(engine.registry().get(chart).expect("chart").axis_count(), 2);
}

#[test]
fn axis_scale_edit_recreates_only_its_scope() {
    let store = three_phase();
    let (engine, _factory, _) = attach(&store);

    store.set_axes_scale(ChannelKind::Analog, 0, 2.0).expect("scale");
    let engine = engine.borrow();
    assert_eq!(engine.stats().full_rebuilds, 1);
    assert_eq!(engine.stats().recreates, 1);
    assert_eq!(engine.registry().len(), 1);
}

#[test]
fn removing_a_channel_rebuilds_everything() {
    let store = three_phase();
    let (engine, factory, _) = attach(&store);
    let created_before = factory.created_count();

    let removed = store.remove_channel(ChannelKind::Analog, 0).expect("remove");
    assert_eq!(removed.channel_id, "IA");

    let engine = engine.borrow();
    assert_eq!(engine.stats().full_rebuilds, 2);
    assert_eq!(factory.created_count(), created_before + 1);
    let chart = engine.registry().ids()[0];
    assert_eq!(
        engine.registry().get(chart).expect("chart").membership().channel_indices,
        vec![0, 1]
    );
    assert!(!engine.is_rebuilding());
}

#[test]
fn computed_channel_joins_owning_analog_chart() {
    let store = three_phase();
    let (engine, factory, _) = attach(&store);
    let chart = only_chart(&engine);
    let created_before = factory.created_count();

    store
        .push_channel(
            ChannelKind::Computed,
            ChannelRow::new("computed_0")
                .with_group("G0")
                .with_unit("A")
                .with_equation("a0 + a1"),
            (0..16).map(|i| (100 + 2 * i) as f64).collect(),
        )
        .expect("computed");

    let engine = engine.borrow();
    let entry = engine.registry().get(chart).expect("chart");
    assert_eq!(entry.membership().computed_indices, vec![0]);
    assert_eq!(entry.membership().computed_channel_ids, vec!["computed_0".to_owned()]);
    assert_eq!(entry.surface().series_count(), 4);
    assert_eq!(factory.created_count(), created_before);
    assert_eq!(
        engine
            .registry()
            .charts_for(ChannelKey::new(ChannelKind::Computed, 0)),
        &[chart]
    );
    assert_eq!(engine.stats().attachments, 1);
}

#[test]
fn computed_channel_with_fresh_group_gets_standalone_chart() {
    let store = three_phase();
    let (engine, _factory, _) = attach(&store);

    store
        .push_channel(
            ChannelKind::Computed,
            ChannelRow::new("computed_0")
                .with_group("G7")
                .with_equation("a2 * 2"),
            vec![0.0; 16],
        )
        .expect("computed");

    let engine = engine.borrow();
    assert_eq!(engine.registry().len(), 2);
    let standalone = engine
        .registry()
        .find_group(ChannelKind::Computed, "G7")
        .expect("standalone chart");
    assert_eq!(
        engine.registry().charts_for(ChannelKey::new(ChannelKind::Computed, 0)),
        &[standalone]
    );
}

#[test]
fn failed_patch_falls_back_to_recreate() {
    let store = three_phase();
    let (engine, factory, _) = attach(&store);

    factory.fail_operation("set_series_label");
    store.set_label(ChannelKind::Analog, 0, "Phase A").expect("label");
    factory.clear_failures();

    let engine = engine.borrow();
    assert_eq!(engine.stats().recreates, 1);
    assert!(engine.failures().is_empty());
    let chart = engine.registry().ids()[0];
    let entry = engine.registry().get(chart).expect("chart");
    assert_eq!(entry.surface().series_label(0).as_deref(), Some("Phase A"));
}

#[test]
fn failed_recreate_is_recorded_and_keeps_previous_chart() {
    let store = three_phase();
    let (engine, factory, _) = attach(&store);
    let chart = only_chart(&engine);

    factory.fail_operation("set_series_label");
    factory.fail_next_creates(1);
    store.set_label(ChannelKind::Analog, 0, "Phase A").expect("label");

    let engine = engine.borrow();
    assert_eq!(engine.failures().len(), 1);
    assert_eq!(engine.failures()[0].instance, Some(chart));
    assert!(engine.registry().get(chart).is_some());
}

#[test]
fn channel_update_entry_point_reports_cheap_and_structural_paths() {
    let store = three_phase();
    let (engine, _factory, _) = attach(&store);
    let mut rebuilds = 0;
    let mut stages = Vec::new();

    let cheap = {
        let mut on_progress = |stage: UpdateStage| stages.push(stage);
        handle_channel_update(
            ChannelKind::Analog,
            ChannelUpdate::Color {
                index: 0,
                color: "#123456".to_owned(),
            },
            &store,
            &engine,
            &mut || rebuilds += 1,
            Some(&mut on_progress),
        )
        .expect("color update")
    };
    assert!(cheap);
    assert_eq!(stages, vec![UpdateStage::Applying, UpdateStage::Reconciled]);

    let cheap = handle_channel_update(
        ChannelKind::Analog,
        ChannelUpdate::Unit {
            index: 0,
            unit: "V".to_owned(),
        },
        &store,
        &engine,
        &mut || rebuilds += 1,
        None,
    )
    .expect("unit update");
    assert!(!cheap);
    assert_eq!(rebuilds, 1);
}

#[derive(Clone, Default)]
struct EventLog {
    events: Rc<RefCell<Vec<PluginEvent>>>,
}

impl ChartPlugin for EventLog {
    fn id(&self) -> &str {
        "event-log"
    }

    fn on_event(&mut self, event: &PluginEvent) {
        self.events.borrow_mut().push(event.clone());
    }
}

#[test]
fn plugins_observe_redraw_flushes_and_duplicate_ids_are_rejected() {
    let store = three_phase();
    let (engine, _factory, _) = attach(&store);
    let log = EventLog::default();
    engine.register_plugin(Box::new(log.clone())).expect("register");
    assert!(engine.register_plugin(Box::new(EventLog::default())).is_err());

    store.set_line_color(ChannelKind::Analog, 2, "#fefefe").expect("color");
    engine.flush().expect("flush");

    assert!(
        log.events
            .borrow()
            .iter()
            .any(|event| matches!(event, PluginEvent::RedrawFlushed { charts: 1 }))
    );
    assert!(engine.unregister_plugin("event-log").expect("unregister"));
}

#[test]
fn detach_destroys_charts_and_stops_listening() {
    let store = three_phase();
    let (engine, factory, _) = attach(&store);
    engine.detach().expect("detach");
    assert_eq!(factory.count_ops(|op| matches!(op, ChartOp::Destroyed)), 1);

    factory.clear_log();
    store.set_line_color(ChannelKind::Analog, 0, "#000000").expect("color");
    engine.flush().expect("flush");
    assert!(factory.log().is_empty());
    assert!(engine.borrow().registry().is_empty());
}

#[test]
fn replacing_digital_colors_pushes_fill_and_clears_on_redraw() {
    let state = ChannelState::from_rows(
        analog_rows(&["#111111"], &["G0"], &["A"]),
        vec![
            ChannelRow::new("TRIP").with_color("#101010"),
            ChannelRow::new("CLOSE").with_color("#202020"),
        ],
    )
    .expect("state");
    let data = DataState {
        digital: vec![vec![0.0; 16], vec![1.0; 16]],
        ..samples(1, 16)
    };
    let store = ChannelStore::new(state, data).expect("store");
    let (engine, factory, _) = attach(&store);
    let digital = engine
        .borrow()
        .registry()
        .find_group(ChannelKind::Digital, "digital")
        .expect("digital chart");
    factory.clear_log();

    store
        .replace_line_colors(ChannelKind::Digital, &["#ff0000", "#00ff00"])
        .expect("colors");

    assert_eq!(factory.count_ops(|op| matches!(op, ChartOp::SetStroke { .. })), 2);
    assert_eq!(
        factory.count_ops(|op| matches!(op, ChartOp::PluginState { plugin: "digital_fill" })),
        1
    );
    assert_eq!(
        engine.borrow().registry().get(digital).expect("chart").colors(),
        &["#ff0000".to_owned(), "#00ff00".to_owned()]
    );

    engine.flush().expect("flush");
    assert_eq!(factory.count_ops(|op| matches!(op, ChartOp::Redraw { clear: true })), 1);
    assert_eq!(factory.count_ops(|op| matches!(op, ChartOp::Redraw { clear: false })), 0);
}

fn four_channels_in_two_groups() -> ChannelStore {
    let state = ChannelState::from_rows(
        analog_rows(
            &["#111111", "#222222", "#333333", "#444444"],
            &["G0", "G0", "G1", "G1"],
            &["A", "A", "A", "A"],
        ),
        Vec::new(),
    )
    .expect("state");
    ChannelStore::new(state, samples(4, 16)).expect("store")
}

#[test]
fn growing_by_two_charts_reuses_existing_ones_by_position() {
    let store = four_channels_in_two_groups();
    let (engine, factory, _) = attach(&store);
    let originals = engine.borrow().registry().ids();
    assert_eq!(originals.len(), 2);
    let created_before = factory.created_count();

    store
        .replace_groups(ChannelKind::Analog, &["G5", "G6", "G7", "G8"])
        .expect("groups");
    engine.tick(GROUP_SETTLE).expect("tick");

    let engine = engine.borrow();
    let registry = engine.registry();
    assert_eq!(engine.stats().reuses, 1);
    assert_eq!(engine.stats().smart_merges, 0);
    assert_eq!(engine.stats().full_rebuilds, 1);
    assert_eq!(registry.len(), 4);
    assert_eq!(factory.created_count(), created_before + 2);

    for (position, group) in ["G5", "G6", "G7", "G8"].into_iter().enumerate() {
        let chart = registry.find_group(ChannelKind::Analog, group).expect("chart per group");
        assert_eq!(
            registry.get(chart).expect("entry").membership().channel_indices,
            vec![position]
        );
        assert_eq!(
            registry.charts_for(ChannelKey::new(ChannelKind::Analog, position)),
            &[chart]
        );
    }
    assert_eq!(registry.find_group(ChannelKind::Analog, "G5"), Some(originals[0]));
    assert_eq!(registry.find_group(ChannelKind::Analog, "G6"), Some(originals[1]));
}

#[test]
fn reused_chart_is_recreated_in_its_original_container() {
    let store = four_channels_in_two_groups();
    let (engine, factory, _) = attach(&store);
    let first = engine.borrow().registry().ids()[0];

    store
        .replace_groups(ChannelKind::Analog, &["G5", "G6", "G7", "G8"])
        .expect("groups");
    engine.tick(GROUP_SETTLE).expect("tick");
    let container = |engine: &ReconcilerHandle| {
        engine
            .borrow()
            .registry()
            .get(first)
            .expect("reused chart")
            .surface()
            .container_id()
            .to_owned()
    };
    assert_eq!(container(&engine), "analog-G0");

    factory.fail_operation("set_series_label");
    store.set_label(ChannelKind::Analog, 0, "Phase A").expect("label");
    factory.clear_failures();

    assert_eq!(engine.borrow().stats().recreates, 1);
    assert_eq!(container(&engine), "analog-G0");
    assert_eq!(
        engine.borrow().registry().get(first).expect("entry").group_id(),
        "G5"
    );
}
