use std::collections::HashSet;

use indexmap::IndexMap;
use serde::Serialize;
use tracing::trace;

use crate::api::SeriesSnapshot;
use crate::core::ChannelKey;
use crate::error::ViewerResult;
use crate::reactive::{ReactiveTree, StateValue};
use crate::state_path;

/// Linear interpolation of `samples` over ascending `x` at `at`.
///
/// `None` outside the sampled range or when the sequences are empty.
#[must_use]
pub fn interpolate(x: &[f64], samples: &[f64], at: f64) -> Option<f64> {
    let len = x.len().min(samples.len());
    if len == 0 || !at.is_finite() {
        return None;
    }
    let (x, samples) = (&x[..len], &samples[..len]);
    if at < x[0] || at > x[len - 1] {
        return None;
    }
    let upper = x.partition_point(|value| *value < at);
    if upper == 0 || x[upper] == at {
        return Some(samples[upper]);
    }
    let (x0, x1) = (x[upper - 1], x[upper]);
    let (y0, y1) = (samples[upper - 1], samples[upper]);
    if x1 == x0 {
        return Some(y0);
    }
    Some(y0 + (y1 - y0) * (at - x0) / (x1 - x0))
}

/// Relative change in percent; `None` when the reference value is zero.
#[must_use]
pub fn percentage(v0: f64, v1: f64) -> Option<f64> {
    if v0 == 0.0 {
        return None;
    }
    Some((v1 - v0) / v0.abs() * 100.0)
}

#[must_use]
pub fn format_timestamp(seconds: f64) -> String {
    format!("{seconds:.6} s")
}

#[must_use]
pub fn format_time_delta(seconds: f64) -> String {
    format!("{:.3} ms", seconds * 1000.0)
}

/// Row 0 of the table: line positions and the spacing between consecutive lines.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeRow {
    pub lines: Vec<f64>,
    pub timestamps: Vec<String>,
    pub time_deltas: Vec<String>,
}

/// Values of one channel at every line.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeltaRow {
    pub key: ChannelKey,
    pub label: String,
    pub unit: String,
    pub color: String,
    pub values: Vec<Option<f64>>,
    pub deltas: Vec<Option<f64>>,
    pub percentages: Vec<Option<f64>>,
}

impl DeltaRow {
    /// Flat column view: `v0..`, `delta0..`, `percentage0..`.
    #[must_use]
    pub fn columns(&self) -> IndexMap<String, Option<f64>> {
        let mut columns = IndexMap::new();
        for (index, value) in self.values.iter().enumerate() {
            columns.insert(format!("v{index}"), *value);
        }
        for (index, delta) in self.deltas.iter().enumerate() {
            columns.insert(format!("delta{index}"), *delta);
        }
        for (index, percent) in self.percentages.iter().enumerate() {
            columns.insert(format!("percentage{index}"), *percent);
        }
        columns
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct DeltaTable {
    pub time: TimeRow,
    pub rows: Vec<DeltaRow>,
}

impl DeltaTable {
    /// Rows including the time row.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len() + 1
    }

    #[must_use]
    pub fn row(&self, key: ChannelKey) -> Option<&DeltaRow> {
        self.rows.iter().find(|row| row.key == key)
    }
}

/// Builds the delta table for `lines` over the drawn series.
///
/// A channel drawn by several charts contributes one row, taken from the first
/// chart in registry order.
#[must_use]
pub fn collect_deltas(snapshots: &[SeriesSnapshot], lines: &[f64]) -> DeltaTable {
    let time = TimeRow {
        lines: lines.to_vec(),
        timestamps: lines.iter().copied().map(format_timestamp).collect(),
        time_deltas: lines
            .windows(2)
            .map(|pair| format_time_delta(pair[1] - pair[0]))
            .collect(),
    };
    if lines.is_empty() {
        return DeltaTable { time, rows: Vec::new() };
    }
    let mut seen = HashSet::new();
    let rows: Vec<DeltaRow> = snapshots
        .iter()
        .filter(|snapshot| seen.insert(snapshot.key))
        .map(|snapshot| {
            let values: Vec<Option<f64>> = lines
                .iter()
                .map(|line| interpolate(&snapshot.x, &snapshot.samples, *line))
                .collect();
            let pairs: Vec<(Option<f64>, Option<f64>)> =
                values.windows(2).map(|pair| (pair[0], pair[1])).collect();
            DeltaRow {
                key: snapshot.key,
                label: snapshot.label.clone(),
                unit: snapshot.unit.clone(),
                color: snapshot.color.clone(),
                deltas: pairs
                    .iter()
                    .map(|(v0, v1)| Some((*v1)? - (*v0)?))
                    .collect(),
                percentages: pairs
                    .iter()
                    .map(|(v0, v1)| percentage((*v0)?, (*v1)?))
                    .collect(),
                values,
            }
        })
        .collect();
    trace!(rows = rows.len(), lines = lines.len(), "delta table collected");
    DeltaTable { time, rows }
}

/// Receiver of finished delta tables (the table renderer).
pub trait DeltaTableSink {
    fn publish(&mut self, table: &DeltaTable) -> ViewerResult<()>;
}

/// Sink that mirrors each table into a [`ReactiveTree`] as
/// `{time: {...}, rows: [...]}`.
#[derive(Debug, Clone)]
pub struct ReactiveDeltaSink {
    tree: ReactiveTree,
}

impl Default for ReactiveDeltaSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ReactiveDeltaSink {
    #[must_use]
    pub fn new() -> Self {
        let mut root = IndexMap::new();
        root.insert("time".to_owned(), StateValue::record());
        root.insert("rows".to_owned(), StateValue::List(Vec::new()));
        Self {
            tree: ReactiveTree::new(StateValue::Record(root)),
        }
    }

    #[must_use]
    pub fn tree(&self) -> &ReactiveTree {
        &self.tree
    }

    /// Published channel rows, excluding the time row.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.tree
            .get(&state_path!["rows"])
            .and_then(|rows| rows.len())
            .unwrap_or(0)
    }
}

impl DeltaTableSink for ReactiveDeltaSink {
    fn publish(&mut self, table: &DeltaTable) -> ViewerResult<()> {
        let time = StateValue::from_serialize(&table.time)?;
        let rows = table
            .rows
            .iter()
            .map(|row| {
                let mut entry = IndexMap::new();
                entry.insert("key".to_owned(), StateValue::Text(row.key.to_string()));
                entry.insert("label".to_owned(), StateValue::Text(row.label.clone()));
                entry.insert("unit".to_owned(), StateValue::Text(row.unit.clone()));
                entry.insert("color".to_owned(), StateValue::Text(row.color.clone()));
                for (column, value) in row.columns() {
                    entry.insert(column, StateValue::optional_number(value));
                }
                StateValue::Record(entry)
            })
            .collect();
        self.tree.set(&state_path!["time"], time)?;
        self.tree.replace_list(&state_path!["rows"], rows)
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::{
        DeltaTableSink, ReactiveDeltaSink, collect_deltas, interpolate, percentage,
    };
    use crate::api::{InstanceId, SeriesSnapshot};
    use crate::core::{ChannelKey, ChannelKind};
    use crate::state_path;

    fn snapshot(instance: u64, position: usize, samples: Vec<f64>) -> SeriesSnapshot {
        SeriesSnapshot {
            instance: InstanceId::from_raw(instance),
            key: ChannelKey::new(ChannelKind::Analog, position),
            label: format!("ch{position}"),
            unit: "V".to_owned(),
            color: "#111111".to_owned(),
            x: vec![0.0, 1.0, 2.0, 3.0, 4.0],
            samples,
        }
    }

    #[test]
    fn interpolates_between_adjacent_samples() {
        let x = [0.0, 1.0, 2.0];
        let y = [0.0, 10.0, 30.0];
        assert_relative_eq!(interpolate(&x, &y, 1.5).expect("inside"), 20.0);
        assert_relative_eq!(interpolate(&x, &y, 0.0).expect("first"), 0.0);
        assert_relative_eq!(interpolate(&x, &y, 2.0).expect("last"), 30.0);
        assert_eq!(interpolate(&x, &y, 2.5), None);
        assert_eq!(interpolate(&[], &[], 0.0), None);
    }

    #[test]
    fn percentage_is_absent_for_zero_reference() {
        assert_eq!(percentage(0.0, 5.0), None);
        assert_relative_eq!(percentage(-10.0, -5.0).expect("pct"), 50.0);
    }

    #[test]
    fn two_lines_produce_one_delta_column() {
        let snapshots = vec![snapshot(1, 0, vec![10.0, 20.0, 30.0, 40.0, 50.0])];
        let table = collect_deltas(&snapshots, &[1.0, 3.0]);
        let row = &table.rows[0];
        assert_eq!(row.values, vec![Some(20.0), Some(40.0)]);
        assert_eq!(row.deltas, vec![Some(20.0)]);
        assert_eq!(row.percentages, vec![Some(100.0)]);
        assert_eq!(table.time.time_deltas, vec!["2000.000 ms".to_owned()]);
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn single_line_has_values_only_and_duplicates_collapse() {
        let snapshots = vec![
            snapshot(1, 0, vec![1.0; 5]),
            snapshot(2, 0, vec![9.0; 5]),
            snapshot(2, 1, vec![2.0; 5]),
        ];
        let table = collect_deltas(&snapshots, &[2.0]);
        assert_eq!(table.rows.len(), 2);
        assert_eq!(table.rows[0].values, vec![Some(1.0)]);
        assert!(table.rows[0].deltas.is_empty());
        let columns = table.rows[1].columns();
        assert_eq!(columns.keys().collect::<Vec<_>>(), vec!["v0"]);
    }

    #[test]
    fn reactive_sink_mirrors_rows() {
        let snapshots = vec![snapshot(1, 0, vec![10.0, 20.0, 30.0, 40.0, 50.0])];
        let table = collect_deltas(&snapshots, &[1.0, 3.0]);
        let mut sink = ReactiveDeltaSink::new();
        sink.publish(&table).expect("publish");
        assert_eq!(sink.row_count(), 1);
        let delta = sink
            .tree()
            .get(&state_path!["rows", 0usize, "delta0"])
            .and_then(|value| value.as_f64());
        assert_eq!(delta, Some(20.0));
    }
}
