use std::fmt;
use std::rc::Rc;

use serde::Serialize;

use crate::core::ChannelKind;
use crate::extensions::PluginState;

/// Stroke callback handed to the chart; it is re-invoked on every redraw.
pub type StrokeFn = Rc<dyn Fn() -> String>;

/// Current color of a stroke callback.
#[must_use]
pub fn stroke_color(stroke: &StrokeFn) -> String {
    stroke()
}

/// X values plus one sample sequence per series.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct ChartData {
    pub x: Vec<f64>,
    pub series: Vec<Vec<f64>>,
}

impl ChartData {
    #[must_use]
    pub fn new(x: Vec<f64>, series: Vec<Vec<f64>>) -> Self {
        Self { x, series }
    }

    #[must_use]
    pub fn x_bounds(&self) -> Option<(f64, f64)> {
        Some((*self.x.first()?, *self.x.last()?))
    }
}

#[derive(Clone)]
pub struct SeriesSpec {
    pub label: String,
    pub stroke: StrokeFn,
    pub unit: String,
    /// Y scale key, `"y"` (left) or `"y2"` (right).
    pub scale: &'static str,
    pub show: bool,
}

impl fmt::Debug for SeriesSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeriesSpec")
            .field("label", &self.label)
            .field("stroke", &stroke_color(&self.stroke))
            .field("unit", &self.unit)
            .field("scale", &self.scale)
            .field("show", &self.show)
            .finish()
    }
}

/// Everything a factory needs to build one chart.
#[derive(Debug, Clone)]
pub struct ChartSpec {
    pub container_id: String,
    pub group_id: String,
    pub kind: ChannelKind,
    pub series: Vec<SeriesSpec>,
    pub data: ChartData,
    /// Rendered Y axes; padded to the global max so charts align.
    pub axis_count: usize,
    pub x_label: String,
    pub x_unit: String,
    pub plugins: Vec<PluginState>,
}
