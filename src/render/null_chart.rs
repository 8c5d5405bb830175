use std::cell::RefCell;
use std::collections::HashSet;
use std::rc::Rc;

use indexmap::IndexMap;

use crate::core::LinearScale;
use crate::error::{ViewerError, ViewerResult};
use crate::extensions::PluginState;

use super::{ChartData, ChartFactory, ChartSpec, ChartSurface, SeriesSpec, StrokeFn, stroke_color};

/// Default pixel width of headless charts.
pub const DEFAULT_WIDTH: f64 = 1_000.0;

/// Operation recorded by a [`NullChart`].
#[derive(Debug, Clone, PartialEq)]
pub enum ChartOp {
    Created { series: usize, axes: usize },
    SetData { series: usize, samples: usize },
    SetLabel { series: usize, label: String },
    SetStroke { series: usize, color: String },
    SetShow { series: usize, show: bool },
    AddSeries { label: String },
    RemoveSeries { series: usize },
    SetScale { scale: String, min: f64, max: f64 },
    BeginBatch,
    EndBatch,
    Redraw { clear: bool },
    InvalidatePath { series: usize },
    PluginState { plugin: &'static str },
    Destroyed,
}

/// Entry of the shared operation log.
#[derive(Debug, Clone, PartialEq)]
pub struct LoggedOp {
    pub container_id: String,
    pub op: ChartOp,
}

type SharedLog = Rc<RefCell<Vec<LoggedOp>>>;
type FailureSet = Rc<RefCell<HashSet<&'static str>>>;

/// Headless recording chart used by tests and hosts without a drawing backend.
///
/// Every call is appended to the factory's shared log. Operation names added
/// through [`NullChartFactory::fail_operation`] return a chart error instead.
pub struct NullChart {
    container_id: String,
    series: Vec<SeriesSpec>,
    data: ChartData,
    scales: IndexMap<String, (f64, f64)>,
    plugins: Vec<PluginState>,
    batch_depth: usize,
    destroyed: bool,
    width: f64,
    log: SharedLog,
    failures: FailureSet,
}

impl std::fmt::Debug for NullChart {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NullChart")
            .field("container_id", &self.container_id)
            .field("series", &self.series)
            .field("scales", &self.scales)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl NullChart {
    fn record(&self, op: ChartOp) {
        self.log.borrow_mut().push(LoggedOp {
            container_id: self.container_id.clone(),
            op,
        });
    }

    fn guard(&self, operation: &'static str) -> ViewerResult<()> {
        if self.destroyed {
            return Err(ViewerError::chart(operation, "chart was destroyed"));
        }
        if self.failures.borrow().contains(operation) {
            return Err(ViewerError::chart(operation, "injected failure"));
        }
        Ok(())
    }

    fn check_series(&self, operation: &'static str, series: usize) -> ViewerResult<()> {
        if series >= self.series.len() {
            return Err(ViewerError::chart(
                operation,
                format!("series {series} out of range ({})", self.series.len()),
            ));
        }
        Ok(())
    }

    #[must_use]
    pub fn plugin_states(&self) -> &[PluginState] {
        &self.plugins
    }

    #[must_use]
    pub fn scale(&self, key: &str) -> Option<(f64, f64)> {
        self.scales.get(key).copied()
    }

    fn linear(&self, scale: &str) -> ViewerResult<LinearScale> {
        let (min, max) = if scale == "x" {
            self.x_range()
        } else {
            self.scales.get(scale).copied()
        }
        .ok_or_else(|| ViewerError::chart("scale", format!("scale `{scale}` has no range")))?;
        LinearScale::new(min, max)
    }
}

impl ChartSurface for NullChart {
    fn container_id(&self) -> &str {
        &self.container_id
    }

    fn set_data(&mut self, data: ChartData) -> ViewerResult<()> {
        self.guard("set_data")?;
        let samples = data.x.len();
        let series = data.series.len();
        self.data = data;
        self.record(ChartOp::SetData { series, samples });
        Ok(())
    }

    fn set_series_label(&mut self, series: usize, label: &str) -> ViewerResult<()> {
        self.guard("set_series_label")?;
        self.check_series("set_series_label", series)?;
        self.series[series].label = label.to_owned();
        self.record(ChartOp::SetLabel {
            series,
            label: label.to_owned(),
        });
        Ok(())
    }

    fn set_series_stroke(&mut self, series: usize, stroke: StrokeFn) -> ViewerResult<()> {
        self.guard("set_series_stroke")?;
        self.check_series("set_series_stroke", series)?;
        let color = stroke_color(&stroke);
        self.series[series].stroke = stroke;
        self.record(ChartOp::SetStroke { series, color });
        Ok(())
    }

    fn set_series_show(&mut self, series: usize, show: bool) -> ViewerResult<()> {
        self.guard("set_series_show")?;
        self.check_series("set_series_show", series)?;
        self.series[series].show = show;
        self.record(ChartOp::SetShow { series, show });
        Ok(())
    }

    fn add_series(&mut self, series: SeriesSpec, samples: Vec<f64>) -> ViewerResult<usize> {
        self.guard("add_series")?;
        self.record(ChartOp::AddSeries {
            label: series.label.clone(),
        });
        self.series.push(series);
        self.data.series.push(samples);
        Ok(self.series.len() - 1)
    }

    fn remove_series(&mut self, series: usize) -> ViewerResult<()> {
        self.guard("remove_series")?;
        self.check_series("remove_series", series)?;
        self.series.remove(series);
        if series < self.data.series.len() {
            self.data.series.remove(series);
        }
        self.record(ChartOp::RemoveSeries { series });
        Ok(())
    }

    fn set_scale(&mut self, scale: &str, min: f64, max: f64) -> ViewerResult<()> {
        self.guard("set_scale")?;
        if !min.is_finite() || !max.is_finite() || min > max {
            return Err(ViewerError::chart(
                "set_scale",
                format!("invalid range [{min}, {max}] for `{scale}`"),
            ));
        }
        self.scales.insert(scale.to_owned(), (min, max));
        self.record(ChartOp::SetScale {
            scale: scale.to_owned(),
            min,
            max,
        });
        Ok(())
    }

    fn begin_batch(&mut self) {
        self.batch_depth += 1;
        self.record(ChartOp::BeginBatch);
    }

    fn end_batch(&mut self) -> ViewerResult<()> {
        self.batch_depth = self.batch_depth.saturating_sub(1);
        self.record(ChartOp::EndBatch);
        self.guard("end_batch")
    }

    fn redraw(&mut self, clear: bool) -> ViewerResult<()> {
        self.guard("redraw")?;
        self.record(ChartOp::Redraw { clear });
        Ok(())
    }

    fn invalidate_series_path(&mut self, series: usize) {
        self.record(ChartOp::InvalidatePath { series });
    }

    fn set_plugin_state(&mut self, state: PluginState) -> ViewerResult<()> {
        self.guard("set_plugin_state")?;
        self.record(ChartOp::PluginState { plugin: state.id() });
        match self
            .plugins
            .iter_mut()
            .find(|existing| existing.id() == state.id())
        {
            Some(existing) => *existing = state,
            None => self.plugins.push(state),
        }
        Ok(())
    }

    fn destroy(&mut self) {
        if !self.destroyed {
            self.destroyed = true;
            self.record(ChartOp::Destroyed);
        }
    }

    fn pos_to_val(&self, pos: f64, scale: &str) -> ViewerResult<f64> {
        self.linear(scale)?.pixel_to_domain(pos, self.width)
    }

    fn val_to_pos(&self, val: f64, scale: &str) -> ViewerResult<f64> {
        self.linear(scale)?.domain_to_pixel(val, self.width)
    }

    fn pos_to_idx(&self, pos: f64) -> ViewerResult<usize> {
        let value = self.pos_to_val(pos, "x")?;
        let x = &self.data.x;
        if x.is_empty() {
            return Err(ViewerError::MissingState("chart has no samples".to_owned()));
        }
        let upper = x.partition_point(|sample| *sample < value).min(x.len() - 1);
        if upper > 0 && (value - x[upper - 1]).abs() <= (x[upper] - value).abs() {
            return Ok(upper - 1);
        }
        Ok(upper)
    }

    fn x_range(&self) -> Option<(f64, f64)> {
        self.scales
            .get("x")
            .copied()
            .or_else(|| self.data.x_bounds())
    }

    fn series_count(&self) -> usize {
        self.series.len()
    }

    fn series_label(&self, series: usize) -> Option<String> {
        self.series.get(series).map(|spec| spec.label.clone())
    }

    fn series_stroke(&self, series: usize) -> Option<StrokeFn> {
        self.series.get(series).map(|spec| Rc::clone(&spec.stroke))
    }

    fn data(&self) -> &ChartData {
        &self.data
    }
}

/// Factory of [`NullChart`]s sharing one operation log.
///
/// Cloning yields another handle to the same log and failure knobs, so tests
/// can keep a probe after moving the factory into the engine.
#[derive(Debug, Clone, Default)]
pub struct NullChartFactory {
    log: SharedLog,
    failures: FailureSet,
    fail_creates: Rc<RefCell<usize>>,
    created: Rc<RefCell<usize>>,
}

impl NullChartFactory {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every chart fail `operation` (e.g. `"set_series_stroke"`) until cleared.
    pub fn fail_operation(&self, operation: &'static str) {
        self.failures.borrow_mut().insert(operation);
    }

    pub fn clear_failures(&self) {
        self.failures.borrow_mut().clear();
        *self.fail_creates.borrow_mut() = 0;
    }

    /// Makes the next `count` creations fail.
    pub fn fail_next_creates(&self, count: usize) {
        *self.fail_creates.borrow_mut() = count;
    }

    #[must_use]
    pub fn created_count(&self) -> usize {
        *self.created.borrow()
    }

    #[must_use]
    pub fn log(&self) -> Vec<LoggedOp> {
        self.log.borrow().clone()
    }

    pub fn clear_log(&self) {
        self.log.borrow_mut().clear();
    }

    /// Logged operations matching `predicate`.
    #[must_use]
    pub fn count_ops(&self, predicate: impl Fn(&ChartOp) -> bool) -> usize {
        self.log.borrow().iter().filter(|entry| predicate(&entry.op)).count()
    }

    #[must_use]
    pub fn redraw_count(&self) -> usize {
        self.count_ops(|op| matches!(op, ChartOp::Redraw { .. }))
    }
}

impl ChartFactory for NullChartFactory {
    fn create(&mut self, spec: ChartSpec) -> ViewerResult<Box<dyn ChartSurface>> {
        {
            let mut remaining = self.fail_creates.borrow_mut();
            if *remaining > 0 {
                *remaining -= 1;
                return Err(ViewerError::chart("create", "injected failure"));
            }
        }
        *self.created.borrow_mut() += 1;
        let chart = NullChart {
            container_id: spec.container_id,
            data: spec.data,
            scales: IndexMap::new(),
            plugins: spec.plugins,
            batch_depth: 0,
            destroyed: false,
            width: DEFAULT_WIDTH,
            log: Rc::clone(&self.log),
            failures: Rc::clone(&self.failures),
            series: spec.series,
        };
        chart.record(ChartOp::Created {
            series: chart.series.len(),
            axes: spec.axis_count,
        });
        Ok(Box::new(chart))
    }
}
