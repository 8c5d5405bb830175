use std::cell::{Ref, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};
use std::time::{Duration, Instant};

use indexmap::IndexMap;
use serde::Serialize;
use tracing::{debug, error, trace, warn};

use crate::core::{ChannelKey, ChannelKind};
use crate::error::{ViewerError, ViewerResult};
use crate::extensions::{ChartPlugin, PluginEvent, PluginRegistry, PluginState};
use crate::planner::{ChartPlan, LayoutPlan, MaxAxesStore, plan_layout};
use crate::reactive::{ChangeRecord, ChannelStore, PropertyOptions, SubscriptionId};
use crate::render::{ChartFactory, ChartSurface};

use super::change::{EngineChange, classify, handled_by_property, property_names};
use super::chart_builder::blueprint;
use super::{
    ChartEntry, ChartRegistry, InstanceId, RedrawLevel, RedrawQueue, Scheduler, StrokeCache,
    ViewerConfig,
};

/// Keyed work items run by the engine scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineTask {
    FlushRedraws,
    GroupChange(ChannelKind),
    ScaleRetry(ChannelKey),
    DestroyChart(InstanceId),
}

/// Counters per reconciliation strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileStats {
    pub attribute_patches: u64,
    pub scale_patches: u64,
    pub data_patches: u64,
    pub attachments: u64,
    pub super_fast: u64,
    pub smart_merges: u64,
    pub reuses: u64,
    pub full_rebuilds: u64,
    pub recreates: u64,
    pub redraws: u64,
    pub skipped: u64,
}

impl ReconcileStats {
    /// Charts destroyed and created again, one way or another.
    #[must_use]
    pub fn structural(&self) -> u64 {
        self.full_rebuilds + self.recreates
    }
}

/// Chart operation that failed even after the recreate fallback.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcileFailure {
    pub instance: Option<InstanceId>,
    pub operation: &'static str,
    pub error: ViewerError,
}

/// Samples of one rendered series, read back from its chart.
#[derive(Debug, Clone, PartialEq)]
pub struct SeriesSnapshot {
    pub instance: InstanceId,
    pub key: ChannelKey,
    pub label: String,
    pub unit: String,
    pub color: String,
    pub x: Vec<f64>,
    pub samples: Vec<f64>,
}

/// Translates store changes into chart mutations.
///
/// The engine owns every chart surface and never writes the store. It is
/// shared with its store subscriptions as `Rc<RefCell<_>>`; subscriptions hold
/// weak handles.
pub struct Reconciler {
    pub(super) config: ViewerConfig,
    pub(super) store: ChannelStore,
    pub(super) factory: Box<dyn ChartFactory>,
    pub(super) registry: ChartRegistry,
    pub(super) strokes: StrokeCache,
    pub(super) redraws: RedrawQueue,
    pub(super) scheduler: Scheduler<EngineTask>,
    pub(super) max_axes: MaxAxesStore,
    pub(super) plugins: PluginRegistry,
    pub(super) retired: IndexMap<InstanceId, Box<dyn ChartSurface>>,
    pub(super) cursor_lines: Vec<f64>,
    pub(super) known_lengths: [usize; 3],
    pub(super) rebuilding: bool,
    pub(super) stats: ReconcileStats,
    pub(super) failures: Vec<ReconcileFailure>,
    subscriptions: Vec<SubscriptionId>,
}

impl fmt::Debug for Reconciler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reconciler")
            .field("registry", &self.registry)
            .field("pending_redraws", &self.redraws.len())
            .field("rebuilding", &self.rebuilding)
            .field("stats", &self.stats)
            .finish()
    }
}

pub(super) const fn kind_slot(kind: ChannelKind) -> usize {
    match kind {
        ChannelKind::Analog => 0,
        ChannelKind::Digital => 1,
        ChannelKind::Computed => 2,
    }
}

impl Reconciler {
    /// Builds the initial charts and subscribes to `store`.
    pub fn attach(
        store: &ChannelStore,
        factory: impl ChartFactory + 'static,
        config: ViewerConfig,
        max_axes: MaxAxesStore,
    ) -> ViewerResult<ReconcilerHandle> {
        config.validate()?;
        store
            .dispatcher()
            .set_slow_callback_threshold(config.slow_callback());

        let mut engine = Self {
            config,
            store: store.clone(),
            factory: Box::new(factory),
            registry: ChartRegistry::new(),
            strokes: StrokeCache::default(),
            redraws: RedrawQueue::default(),
            scheduler: Scheduler::new(),
            max_axes,
            plugins: PluginRegistry::default(),
            retired: IndexMap::new(),
            cursor_lines: Vec::new(),
            known_lengths: [0; 3],
            rebuilding: false,
            stats: ReconcileStats::default(),
            failures: Vec::new(),
            subscriptions: Vec::new(),
        };
        engine.full_rebuild("initial load");

        let inner = Rc::new(RefCell::new(engine));
        let mut subscriptions = Vec::new();
        for name in property_names() {
            let options = PropertyOptions {
                descendants: name == crate::reactive::DATA_KEY,
            };
            let id = store.subscribe_property(name, options, forward(Rc::downgrade(&inner)));
            subscriptions.push(id);
        }
        let mut tree = forward(Rc::downgrade(&inner));
        subscriptions.push(store.subscribe(move |record| {
            if handled_by_property(record) {
                return Ok(());
            }
            tree(record)
        }));
        inner.borrow_mut().subscriptions = subscriptions;

        Ok(ReconcilerHandle { inner })
    }

    #[must_use]
    pub fn config(&self) -> ViewerConfig {
        self.config
    }

    #[must_use]
    pub fn registry(&self) -> &ChartRegistry {
        &self.registry
    }

    #[must_use]
    pub fn stats(&self) -> ReconcileStats {
        self.stats
    }

    #[must_use]
    pub fn failures(&self) -> &[ReconcileFailure] {
        &self.failures
    }

    #[must_use]
    pub fn pending_redraws(&self) -> usize {
        self.redraws.len()
    }

    #[must_use]
    pub fn scheduler(&self) -> &Scheduler<EngineTask> {
        &self.scheduler
    }

    #[must_use]
    pub fn strokes(&self) -> &StrokeCache {
        &self.strokes
    }

    #[must_use]
    pub fn is_rebuilding(&self) -> bool {
        self.rebuilding
    }

    #[must_use]
    pub fn cursor_lines(&self) -> &[f64] {
        &self.cursor_lines
    }

    /// Charts retired by a merge and awaiting idle destruction.
    #[must_use]
    pub fn retired_count(&self) -> usize {
        self.retired.len()
    }

    pub(super) fn on_change(&mut self, record: &ChangeRecord) {
        let Some(change) = classify(record) else {
            trace!(path = %record.path, "change has no chart effect");
            return;
        };
        if self.rebuilding {
            self.stats.skipped += 1;
            debug!(path = %record.path, "change skipped during rebuild");
            return;
        }
        let started = Instant::now();
        self.apply(change);
        trace!(
            path = %record.path,
            strategy = change.strategy(),
            elapsed_us = started.elapsed().as_micros() as u64,
            "change reconciled"
        );
    }

    fn apply(&mut self, change: EngineChange) {
        match change {
            EngineChange::Color { kind, index } => self.apply_color(kind, index),
            EngineChange::Label { kind, index } => self.apply_label(kind, index),
            EngineChange::Window { kind, index } => self.apply_window(kind, index),
            EngineChange::Invert { kind, index } => self.apply_invert(kind, index),
            EngineChange::Groups { kind } => self.request_group_change(kind),
            EngineChange::ChannelInserted { kind, index } => self.attach_channel(kind, index),
            EngineChange::ChannelsRemoved { kind } => self.on_channels_removed(kind),
            EngineChange::Renamed { kind } => {
                if kind == ChannelKind::Computed {
                    self.refresh_computed_ids();
                }
            }
            EngineChange::Equation { kind, index } => {
                trace!(%kind, ?index, "equation edit; samples arrive separately");
            }
            EngineChange::Structural { kind, field } => {
                self.recreate_scope(kind, field.as_str());
            }
            EngineChange::Samples { kind, index } => self.apply_samples(kind, index),
            EngineChange::DataReplaced { kind } => self.recreate_scope(kind, "data replaced"),
            EngineChange::AxisMeta(field) => self.full_rebuild(field.as_str()),
            EngineChange::TimeReplaced => self.full_rebuild("time replaced"),
            EngineChange::Reloaded => self.full_rebuild("state reloaded"),
        }
    }

    /// Runs due timers, then frame work, then idle work.
    pub(super) fn tick(&mut self, elapsed: Duration) -> usize {
        let mut ran = 0;
        for task in self.scheduler.advance(elapsed) {
            self.run_task(task);
            ran += 1;
        }
        ran += self.run_frame();
        for task in self.scheduler.take_idle() {
            self.run_task(task);
            ran += 1;
        }
        ran
    }

    fn run_frame(&mut self) -> usize {
        let mut ran = 0;
        // Frame tasks may queue a redraw flush; drain those in the same frame.
        for _ in 0..4 {
            let tasks = self.scheduler.take_frame();
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                self.run_task(task);
                ran += 1;
            }
        }
        ran
    }

    fn run_task(&mut self, task: EngineTask) {
        match task {
            EngineTask::FlushRedraws => self.flush_redraws(),
            EngineTask::GroupChange(kind) => self.apply_group_change(kind),
            EngineTask::ScaleRetry(key) => self.retry_window(key),
            EngineTask::DestroyChart(instance) => {
                if let Some(mut surface) = self.retired.shift_remove(&instance) {
                    surface.destroy();
                    self.plugins
                        .dispatch(&PluginEvent::ChartDestroyed { instance });
                }
            }
        }
    }

    pub(super) fn request_redraw(&mut self, instance: InstanceId, level: RedrawLevel) {
        self.redraws.request(instance, level);
        self.scheduler.schedule(EngineTask::FlushRedraws);
    }

    fn flush_redraws(&mut self) {
        let started = Instant::now();
        let mut flushed = 0usize;
        for (instance, level) in self.redraws.take() {
            if self.patch_or_recreate(instance, "redraw", |entry| {
                entry.surface_mut().redraw(level.clears())
            }) {
                flushed += 1;
            }
        }
        self.stats.redraws += flushed as u64;
        let elapsed = started.elapsed();
        if elapsed > self.config.redraw_log_threshold() {
            debug!(
                charts = flushed,
                elapsed_ms = elapsed.as_secs_f64() * 1_000.0,
                "slow redraw flush"
            );
        }
        self.plugins
            .dispatch(&PluginEvent::RedrawFlushed { charts: flushed });
    }

    /// Plans the layout and publishes its axis maximum.
    ///
    /// Returns the plan and whether the published maximum changed.
    pub(super) fn plan(&self) -> (LayoutPlan, bool) {
        let layout = plan_layout(&self.store.state(), self.config.max_axes);
        let changed = self.max_axes.publish(layout.max_axes);
        (layout, changed)
    }

    pub(super) fn create_chart(&mut self, plan: &ChartPlan) -> ViewerResult<InstanceId> {
        let axis_count = self.max_axes.get();
        let print = {
            let state = self.store.state();
            let data = self.store.data();
            blueprint(plan, &state, &data, &mut self.strokes, axis_count, &self.cursor_lines)
        };
        let mut surface = self.factory.create(print.spec)?;
        if let Some(window) = print.window {
            if let Err(err) = surface.set_scale("x", window.min, window.max) {
                warn!(error = %err, group = %plan.key, "initial window not applied");
            }
        }
        let instance = self.registry.allocate_id();
        let entry = ChartEntry::new(instance, plan.key.clone(), plan.kind, print.membership, surface)
            .with_colors(print.colors)
            .with_axes(print.units, plan.axis_count);
        self.registry.insert(entry)?;
        debug!(%instance, kind = %plan.kind, group = %plan.key, "chart created");
        self.plugins.dispatch(&PluginEvent::ChartCreated {
            instance,
            group_id: plan.key.clone(),
        });
        Ok(instance)
    }

    /// Creates the chart for `plan`, recording a failure instead of returning it.
    pub(super) fn create_or_record(&mut self, plan: &ChartPlan) -> Option<InstanceId> {
        match self.create_chart(plan) {
            Ok(instance) => Some(instance),
            Err(err) => {
                error!(error = %err, kind = %plan.kind, group = %plan.key, "chart creation failed");
                self.failures.push(ReconcileFailure {
                    instance: None,
                    operation: "create",
                    error: err,
                });
                None
            }
        }
    }

    /// Replaces one chart by a freshly created one for its current group.
    ///
    /// On failure the previous surface stays in place and the error is recorded.
    pub(super) fn recreate_chart(&mut self, instance: InstanceId, reason: &'static str) {
        let Some(entry) = self.registry.get(instance) else {
            return;
        };
        let (kind, group) = (entry.kind(), entry.group_id().to_owned());
        // Charts re-keyed by position keep the container they were created in.
        let container = entry.surface().container_id().to_owned();
        let (layout, _) = self.plan();
        let Some(plan) = layout.find(kind, &group).cloned() else {
            debug!(%instance, %group, "group vanished; dropping chart");
            self.retire_chart(instance, false);
            return;
        };

        let axis_count = self.max_axes.get();
        let mut print = {
            let state = self.store.state();
            let data = self.store.data();
            blueprint(&plan, &state, &data, &mut self.strokes, axis_count, &self.cursor_lines)
        };
        print.spec.container_id = container;
        let created = self.factory.create(print.spec);
        match created {
            Ok(mut surface) => {
                if let Some(window) = print.window {
                    if let Err(err) = surface.set_scale("x", window.min, window.max) {
                        warn!(error = %err, %instance, "initial window not applied");
                    }
                }
                if let Some(entry) = self.registry.get_mut(instance) {
                    let mut old = entry.replace_surface(surface);
                    old.destroy();
                }
                if let Err(err) =
                    self.registry
                        .set_membership(instance, print.membership, print.colors)
                {
                    warn!(error = %err, %instance, "membership not updated");
                }
                self.registry.set_axes(instance, print.units, plan.axis_count);
                self.redraws.forget(instance);
                self.stats.recreates += 1;
                debug!(%instance, reason, "chart recreated");
            }
            Err(err) => {
                error!(error = %err, %instance, reason, "chart recreation failed");
                self.failures.push(ReconcileFailure {
                    instance: Some(instance),
                    operation: reason,
                    error: err,
                });
            }
        }
    }

    /// Applies an in-place mutation; a failure falls back to recreating the chart.
    ///
    /// Returns `true` when the in-place path succeeded.
    pub(super) fn patch_or_recreate<F>(
        &mut self,
        instance: InstanceId,
        operation: &'static str,
        patch: F,
    ) -> bool
    where
        F: FnOnce(&mut ChartEntry) -> ViewerResult<()>,
    {
        let Some(entry) = self.registry.get_mut(instance) else {
            return false;
        };
        match patch(entry) {
            Ok(()) => true,
            Err(err) if err.is_missing_state() => {
                warn!(error = %err, %instance, operation, "skipping update");
                false
            }
            Err(err) => {
                warn!(error = %err, %instance, operation, "in-place update failed; recreating chart");
                self.recreate_chart(instance, operation);
                false
            }
        }
    }

    /// Removes a chart from the registry; its surface is destroyed now or on
    /// the idle queue.
    pub(super) fn retire_chart(&mut self, instance: InstanceId, deferred: bool) {
        let Some(entry) = self.registry.remove(instance) else {
            return;
        };
        self.redraws.forget(instance);
        let mut surface = entry.into_surface();
        if deferred {
            self.retired.insert(instance, surface);
            self.scheduler.schedule_idle(EngineTask::DestroyChart(instance));
        } else {
            surface.destroy();
            self.plugins
                .dispatch(&PluginEvent::ChartDestroyed { instance });
        }
    }

    /// Pushes cursor positions to every chart and redraws them together.
    pub(super) fn set_cursor_lines(&mut self, lines: &[f64]) {
        lines.clone_into(&mut self.cursor_lines);
        for instance in self.registry.ids() {
            let state = PluginState::VerticalLines {
                lines: lines.to_vec(),
            };
            if self.patch_or_recreate(instance, "cursor", |entry| {
                let surface = entry.surface_mut();
                surface.set_plugin_state(state)?;
                surface.redraw(false)
            }) {
                self.redraws.forget(instance);
                self.stats.redraws += 1;
            }
        }
        self.plugins.dispatch(&PluginEvent::CursorsChanged {
            lines: lines.to_vec(),
        });
    }

    /// Series currently drawn by every chart, in registry order.
    #[must_use]
    pub fn series_snapshots(&self) -> Vec<SeriesSnapshot> {
        let state = self.store.state();
        let mut snapshots = Vec::new();
        for entry in self.registry.iter() {
            let surface = entry.surface();
            let data = surface.data();
            for (local, key) in entry.members().enumerate() {
                let channels = state.kind(key.kind);
                snapshots.push(SeriesSnapshot {
                    instance: entry.instance(),
                    key,
                    label: surface.series_label(local).unwrap_or_default(),
                    unit: channels.y_units.get(key.position).cloned().unwrap_or_default(),
                    color: entry.colors().get(local).cloned().unwrap_or_default(),
                    x: data.x.clone(),
                    samples: data.series.get(local).cloned().unwrap_or_default(),
                });
            }
        }
        snapshots
    }

    pub(super) fn record_known_lengths(&mut self) {
        let state = self.store.state();
        for kind in ChannelKind::ALL {
            self.known_lengths[kind_slot(kind)] = state.kind(kind).len();
        }
    }
}

fn forward(
    engine: Weak<RefCell<Reconciler>>,
) -> impl FnMut(&ChangeRecord) -> ViewerResult<()> + 'static {
    move |record| {
        let Some(engine) = engine.upgrade() else {
            return Ok(());
        };
        let Ok(mut engine) = engine.try_borrow_mut() else {
            return Err(ViewerError::Reentrant("reconciler"));
        };
        engine.on_change(record);
        Ok(())
    }
}

/// Shared handle to an attached [`Reconciler`].
///
/// Cloning yields another handle to the same engine.
#[derive(Clone)]
pub struct ReconcilerHandle {
    inner: Rc<RefCell<Reconciler>>,
}

impl fmt::Debug for ReconcilerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.inner.try_borrow() {
            Ok(engine) => engine.fmt(f),
            Err(_) => f.write_str("ReconcilerHandle(<busy>)"),
        }
    }
}

impl ReconcilerHandle {
    fn engine_mut(&self) -> ViewerResult<std::cell::RefMut<'_, Reconciler>> {
        self.inner
            .try_borrow_mut()
            .map_err(|_| ViewerError::Reentrant("reconciler"))
    }

    /// Read access for inspection; do not hold it across store mutations.
    #[must_use]
    pub fn borrow(&self) -> Ref<'_, Reconciler> {
        self.inner.borrow()
    }

    /// Advances the scheduler clock and runs everything that became due.
    pub fn tick(&self, elapsed: Duration) -> ViewerResult<usize> {
        Ok(self.engine_mut()?.tick(elapsed))
    }

    /// Runs pending frame and idle work without advancing the clock.
    pub fn flush(&self) -> ViewerResult<usize> {
        self.tick(Duration::ZERO)
    }

    pub fn set_cursor_lines(&self, lines: &[f64]) -> ViewerResult<()> {
        self.engine_mut()?.set_cursor_lines(lines);
        Ok(())
    }

    pub fn register_plugin(&self, plugin: Box<dyn ChartPlugin>) -> ViewerResult<()> {
        self.engine_mut()?.plugins.register(plugin)
    }

    pub fn unregister_plugin(&self, plugin_id: &str) -> ViewerResult<bool> {
        Ok(self.engine_mut()?.plugins.unregister(plugin_id))
    }

    /// Destroys and recreates every chart.
    pub fn rebuild(&self) -> ViewerResult<()> {
        self.engine_mut()?.full_rebuild("requested");
        Ok(())
    }

    /// Visible x range of one chart.
    #[must_use]
    pub fn visible_range(&self, instance: InstanceId) -> Option<(f64, f64)> {
        self.inner
            .borrow()
            .registry
            .get(instance)
            .and_then(|entry| entry.surface().x_range())
    }

    /// Converts a horizontal pixel position of one chart to an x value.
    pub fn pos_to_val(&self, instance: InstanceId, pixel_x: f64) -> ViewerResult<f64> {
        let engine = self.inner.borrow();
        let entry = engine.registry.get(instance).ok_or_else(|| {
            ViewerError::MissingState(format!("{instance} is not registered"))
        })?;
        entry.surface().pos_to_val(pixel_x, "x")
    }

    #[must_use]
    pub fn series_snapshots(&self) -> Vec<SeriesSnapshot> {
        self.inner.borrow().series_snapshots()
    }

    /// Unsubscribes from the store and destroys every chart.
    pub fn detach(&self) -> ViewerResult<()> {
        let mut engine = self.engine_mut()?;
        let subscriptions = std::mem::take(&mut engine.subscriptions);
        for id in subscriptions {
            engine.store.unsubscribe(id);
        }
        for entry in engine.registry.drain() {
            let mut surface = entry.into_surface();
            surface.destroy();
        }
        let retired: Vec<_> = engine.retired.drain(..).collect();
        for (_, mut surface) in retired {
            surface.destroy();
        }
        Ok(())
    }

    /// Forwards a host-side event to the registered plugins.
    pub fn notify_plugins(&self, event: &PluginEvent) -> ViewerResult<()> {
        self.engine_mut()?.plugins.dispatch(event);
        Ok(())
    }
}
