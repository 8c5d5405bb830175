use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

use approx::assert_relative_eq;

use comtrade_view::api::{InstanceId, Reconciler, ReconcilerHandle, ViewerConfig};
use comtrade_view::core::{ChannelKey, ChannelKind, ChannelRow, ChannelState, DataState};
use comtrade_view::error::ViewerResult;
use comtrade_view::interaction::{
    CursorAction, CursorCore, DeltaTable, DeltaTableSink, ReactiveDeltaSink,
};
use comtrade_view::planner::MaxAxesStore;
use comtrade_view::reactive::ChannelStore;
use comtrade_view::render::{ChartOp, DEFAULT_WIDTH, NullChartFactory};
use comtrade_view::state_path;

#[derive(Clone, Default)]
struct TableLog {
    tables: Rc<RefCell<Vec<DeltaTable>>>,
}

impl DeltaTableSink for TableLog {
    fn publish(&mut self, table: &DeltaTable) -> ViewerResult<()> {
        self.tables.borrow_mut().push(table.clone());
        Ok(())
    }
}

fn ramp_store() -> ChannelStore {
    let state = ChannelState::from_rows(
        vec![
            ChannelRow::new("IA").with_group("G0").with_unit("A"),
            ChannelRow::new("IB").with_group("G0").with_unit("A"),
            ChannelRow::new("VA").with_group("G1").with_unit("A"),
        ],
        Vec::new(),
    )
    .expect("state");
    let data = DataState {
        time: Some(vec![0.0, 1.0, 2.0, 3.0, 4.0]),
        analog: vec![
            vec![10.0, 20.0, 30.0, 40.0, 50.0],
            vec![0.0; 5],
            vec![5.0; 5],
        ],
        ..DataState::default()
    };
    ChannelStore::new(state, data).expect("store")
}

fn attach(store: &ChannelStore) -> (ReconcilerHandle, NullChartFactory) {
    let factory = NullChartFactory::new();
    let engine = Reconciler::attach(
        store,
        factory.clone(),
        ViewerConfig::default(),
        MaxAxesStore::new(),
    )
    .expect("attach");
    (engine, factory)
}

fn first_chart(engine: &ReconcilerHandle) -> InstanceId {
    engine.borrow().registry().ids()[0]
}

fn analog(position: usize) -> ChannelKey {
    ChannelKey::new(ChannelKind::Analog, position)
}

#[test]
fn two_lines_publish_values_deltas_and_percentages_after_debounce() {
    let store = ramp_store();
    let (engine, _factory) = attach(&store);
    let log = TableLog::default();
    let mut core = CursorCore::new(engine, Box::new(log.clone()), &ViewerConfig::default());

    core.set_lines(&[1.0, 3.0]).expect("lines");
    assert!(core.publish_pending());
    assert_eq!(core.tick(Duration::from_millis(99)).expect("tick"), 0);
    assert_eq!(core.tick(Duration::from_millis(1)).expect("tick"), 1);

    let tables = log.tables.borrow();
    assert_eq!(tables.len(), 1);
    let row = tables[0].row(analog(0)).expect("IA row");
    assert_eq!(row.values, vec![Some(20.0), Some(40.0)]);
    assert_eq!(row.deltas, vec![Some(20.0)]);
    assert_relative_eq!(row.percentages[0].expect("pct"), 100.0);

    let zero = tables[0].row(analog(1)).expect("IB row");
    assert_eq!(zero.percentages, vec![None]);
    assert_eq!(tables[0].row_count(), 4);
    assert_eq!(core.published_count(), 1);
}

#[test]
fn rapid_edits_publish_once() {
    let store = ramp_store();
    let (engine, _factory) = attach(&store);
    let log = TableLog::default();
    let mut core = CursorCore::new(engine, Box::new(log.clone()), &ViewerConfig::default());

    for (step, line) in [0.5, 1.0, 1.5, 2.0].into_iter().enumerate() {
        core.set_lines(&[line]).expect("lines");
        core.tick(Duration::from_millis(40)).expect("tick");
        assert!(log.tables.borrow().is_empty(), "published early at step {step}");
    }
    core.tick(Duration::from_millis(60)).expect("settle");

    let tables = log.tables.borrow();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].time.lines, vec![2.0]);
    assert_eq!(tables[0].row(analog(0)).expect("IA").values, vec![Some(30.0)]);
}

#[test]
fn clicks_toggle_lines_and_every_chart_redraws_in_the_same_call() {
    let store = ramp_store();
    let (engine, factory) = attach(&store);
    let chart = first_chart(&engine);
    let charts = engine.borrow().registry().len();
    assert_eq!(charts, 2);
    let mut core = CursorCore::new(engine, Box::new(TableLog::default()), &ViewerConfig::default());
    factory.clear_log();

    let added = core.click(chart, 2.0).expect("click");
    assert_eq!(added, CursorAction::Added { index: 0, x: 2.0 });
    assert_eq!(
        factory.count_ops(|op| matches!(op, ChartOp::PluginState { plugin: "vertical_lines" })),
        charts
    );
    assert_eq!(factory.redraw_count(), charts);

    let removed = core.click(chart, 2.05).expect("click");
    assert_eq!(removed, CursorAction::Removed { index: 0, x: 2.0 });
    assert!(core.lines().is_empty());
    assert_eq!(factory.redraw_count(), 2 * charts);
}

#[test]
fn pixel_clicks_map_through_the_visible_range() {
    let store = ramp_store();
    let (engine, _factory) = attach(&store);
    let chart = first_chart(&engine);
    let mut core = CursorCore::new(engine, Box::new(TableLog::default()), &ViewerConfig::default());

    core.click_pixel(chart, DEFAULT_WIDTH / 4.0).expect("click");
    assert_eq!(core.lines(), vec![1.0]);
    assert!(core.click(InstanceId::from_raw(999), 1.0).is_err());
}

#[test]
fn drag_redraws_immediately_and_publishes_on_release() {
    let store = ramp_store();
    let (engine, factory) = attach(&store);
    let chart = first_chart(&engine);
    let log = TableLog::default();
    let mut core = CursorCore::new(engine, Box::new(log.clone()), &ViewerConfig::default());
    core.set_lines(&[1.0, 3.0]).expect("lines");
    core.tick(Duration::from_millis(100)).expect("tick");
    factory.clear_log();

    assert_eq!(core.begin_drag(chart, 3.02).expect("begin"), Some(1));
    assert!(core.drag_to(4.0).expect("drag"));
    assert_eq!(factory.redraw_count(), 2);
    assert!(core.publish_pending());

    assert_eq!(core.end_drag().expect("end"), Some(1));
    assert!(!core.publish_pending());
    let tables = log.tables.borrow();
    assert_eq!(tables.len(), 2);
    assert_eq!(
        tables[1].row(analog(0)).expect("IA").values,
        vec![Some(20.0), Some(50.0)]
    );
    assert_eq!(tables[1].time.time_deltas, vec!["3000.000 ms".to_owned()]);
}

#[test]
fn lines_outside_the_record_leave_empty_cells() {
    let store = ramp_store();
    let (engine, _factory) = attach(&store);
    let log = TableLog::default();
    let mut core = CursorCore::new(engine, Box::new(log.clone()), &ViewerConfig::default());

    core.set_lines(&[2.0, 9.0]).expect("lines");
    core.publish_now().expect("publish");
    let row = core.last_table().expect("table").row(analog(2)).cloned().expect("VA");
    assert_eq!(row.values, vec![Some(5.0), None]);
    assert_eq!(row.deltas, vec![None]);
}

#[test]
fn engine_lines_match_cursor_lines_after_every_edit() {
    let store = ramp_store();
    let (engine, _factory) = attach(&store);
    let probe = engine.clone();
    let chart = first_chart(&engine);
    let mut core = CursorCore::new(engine, Box::new(TableLog::default()), &ViewerConfig::default());

    core.click(chart, 0.5).expect("add");
    assert_eq!(probe.borrow().cursor_lines(), core.lines().as_slice());
    core.click(chart, 3.5).expect("add");
    assert_eq!(probe.borrow().cursor_lines(), core.lines().as_slice());
    core.click(chart, 0.52).expect("remove");
    assert_eq!(probe.borrow().cursor_lines(), &[3.5]);
    core.clear().expect("clear");
    assert!(probe.borrow().cursor_lines().is_empty());
}

#[test]
fn reactive_sink_exposes_the_published_table() {
    let store = ramp_store();
    let (engine, _factory) = attach(&store);
    let sink = ReactiveDeltaSink::new();
    let mut core = CursorCore::new(engine, Box::new(sink.clone()), &ViewerConfig::default());

    core.set_lines(&[1.0, 3.0]).expect("lines");
    core.tick(Duration::from_millis(100)).expect("tick");

    assert_eq!(sink.row_count(), 3);
    let percentage = sink
        .tree()
        .get(&state_path!["rows", 0usize, "percentage0"])
        .and_then(|value| value.as_f64());
    assert_eq!(percentage, Some(100.0));
}

#[test]
fn rebuilt_charts_receive_current_lines() {
    let store = ramp_store();
    let (engine, factory) = attach(&store);
    let probe = engine.clone();
    let mut core = CursorCore::new(engine, Box::new(TableLog::default()), &ViewerConfig::default());
    core.set_lines(&[1.0]).expect("lines");
    factory.clear_log();

    probe.rebuild().expect("rebuild");
    assert_eq!(probe.borrow().cursor_lines(), &[1.0]);
    assert!(factory.created_count() >= 2);
}
