//! Chart library boundary.
//!
//! The reconciliation engine drives charts only through [`ChartSurface`] and
//! creates them through a [`ChartFactory`], so drawing stays outside the core.

mod chart_spec;
mod null_chart;

pub use chart_spec::{ChartData, ChartSpec, SeriesSpec, StrokeFn, stroke_color};
pub use null_chart::{ChartOp, DEFAULT_WIDTH, LoggedOp, NullChart, NullChartFactory};

use crate::error::ViewerResult;
use crate::extensions::PluginState;

/// Operations the core needs from one live chart instance.
///
/// Series indices are local to the chart (`0..series_count()`); series `0`
/// never represents the x axis.
pub trait ChartSurface {
    fn container_id(&self) -> &str;

    fn set_data(&mut self, data: ChartData) -> ViewerResult<()>;
    fn set_series_label(&mut self, series: usize, label: &str) -> ViewerResult<()>;
    fn set_series_stroke(&mut self, series: usize, stroke: StrokeFn) -> ViewerResult<()>;
    fn set_series_show(&mut self, series: usize, show: bool) -> ViewerResult<()>;
    fn add_series(&mut self, series: SeriesSpec, samples: Vec<f64>) -> ViewerResult<usize>;
    fn remove_series(&mut self, series: usize) -> ViewerResult<()>;

    /// Sets one axis range; `"x"` is the shared time axis.
    fn set_scale(&mut self, scale: &str, min: f64, max: f64) -> ViewerResult<()>;
    fn begin_batch(&mut self);
    fn end_batch(&mut self) -> ViewerResult<()>;
    fn redraw(&mut self, clear: bool) -> ViewerResult<()>;
    /// Drops the cached path of one series so the next redraw restrokes it.
    fn invalidate_series_path(&mut self, series: usize);
    fn set_plugin_state(&mut self, state: PluginState) -> ViewerResult<()>;
    fn destroy(&mut self);

    fn pos_to_val(&self, pos: f64, scale: &str) -> ViewerResult<f64>;
    fn val_to_pos(&self, val: f64, scale: &str) -> ViewerResult<f64>;
    /// Nearest sample index to a horizontal pixel position.
    fn pos_to_idx(&self, pos: f64) -> ViewerResult<usize>;
    /// Currently visible x range.
    fn x_range(&self) -> Option<(f64, f64)>;

    fn series_count(&self) -> usize;
    fn series_label(&self, series: usize) -> Option<String>;
    fn series_stroke(&self, series: usize) -> Option<StrokeFn>;
    /// Current x values and per-series samples.
    fn data(&self) -> &ChartData;
}

/// Creates chart instances for the reconciliation engine.
pub trait ChartFactory {
    fn create(&mut self, spec: ChartSpec) -> ViewerResult<Box<dyn ChartSurface>>;
}
