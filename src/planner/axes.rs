use std::cell::Cell;
use std::rc::Rc;

use tracing::debug;

/// Scale key of the left axis.
pub const PRIMARY_SCALE: &str = "y";
/// Scale key of the right axis.
pub const SECONDARY_SCALE: &str = "y2";

/// Distinct units in first-appearance order.
#[must_use]
pub fn distinct_units<'a>(units: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut seen: Vec<String> = Vec::new();
    for unit in units {
        let unit = unit.trim();
        if !seen.iter().any(|known| known == unit) {
            seen.push(unit.to_owned());
        }
    }
    seen
}

/// Distinct units capped at `max_axes`, never below one.
#[must_use]
pub fn axis_count<'a>(units: impl IntoIterator<Item = &'a str>, max_axes: usize) -> usize {
    distinct_units(units).len().clamp(1, max_axes.max(1))
}

/// Scale key for `unit` given the chart's distinct units.
///
/// The first unit owns the left axis; every other unit shares the right one.
#[must_use]
pub fn scale_key_for(unit: &str, distinct: &[String]) -> &'static str {
    match distinct.iter().position(|known| known == unit.trim()) {
        Some(0) | None => PRIMARY_SCALE,
        Some(_) => SECONDARY_SCALE,
    }
}

/// Process-wide maximum Y-axis count shared by every chart creator.
///
/// Cloning yields another handle to the same value. Only the planner publishes.
#[derive(Debug, Clone)]
pub struct MaxAxesStore {
    value: Rc<Cell<usize>>,
}

impl Default for MaxAxesStore {
    fn default() -> Self {
        Self {
            value: Rc::new(Cell::new(1)),
        }
    }
}

impl MaxAxesStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self) -> usize {
        self.value.get()
    }

    /// Stores `count` (at least one). Returns `true` when the value changed.
    pub fn publish(&self, count: usize) -> bool {
        let count = count.max(1);
        let previous = self.value.replace(count);
        if previous != count {
            debug!(previous, count, "global max axes changed");
        }
        previous != count
    }
}
