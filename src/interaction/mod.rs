//! Vertical-line cursors and the delta table computed between them.

mod cursor;
mod cursor_core;
mod delta;

pub use cursor::{CursorAction, CursorModel, LINES_KEY, snap_tolerance};
pub use cursor_core::CursorCore;
pub use delta::{
    DeltaRow, DeltaTable, DeltaTableSink, ReactiveDeltaSink, TimeRow, collect_deltas,
    format_time_delta, format_timestamp, interpolate, percentage,
};
