use std::time::Duration;

use tracing::{debug, warn};

use crate::api::{InstanceId, ReconcilerHandle, Scheduler, ViewerConfig};
use crate::error::{ViewerError, ViewerResult};
use crate::extensions::PluginEvent;

use super::cursor::{CursorAction, CursorModel};
use super::delta::{DeltaTable, DeltaTableSink, collect_deltas};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum CursorTask {
    PublishDeltas,
}

/// Vertical-line cursors shared by every chart, plus the debounced delta table.
///
/// Line edits are pushed to all charts immediately; the table is recomputed
/// once the lines have been still for the configured debounce window.
pub struct CursorCore {
    cursor: CursorModel,
    engine: ReconcilerHandle,
    sink: Box<dyn DeltaTableSink>,
    scheduler: Scheduler<CursorTask>,
    debounce: Duration,
    snap_fraction: f64,
    last_table: Option<DeltaTable>,
    published: u64,
}

impl std::fmt::Debug for CursorCore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CursorCore")
            .field("lines", &self.cursor.lines())
            .field("debounce", &self.debounce)
            .field("published", &self.published)
            .finish()
    }
}

impl CursorCore {
    #[must_use]
    pub fn new(engine: ReconcilerHandle, sink: Box<dyn DeltaTableSink>, config: &ViewerConfig) -> Self {
        Self {
            cursor: CursorModel::new(),
            engine,
            sink,
            scheduler: Scheduler::new(),
            debounce: config.delta_debounce(),
            snap_fraction: config.cursor_snap_fraction,
            last_table: None,
            published: 0,
        }
    }

    #[must_use]
    pub fn cursor(&self) -> &CursorModel {
        &self.cursor
    }

    #[must_use]
    pub fn lines(&self) -> Vec<f64> {
        self.cursor.lines()
    }

    #[must_use]
    pub fn last_table(&self) -> Option<&DeltaTable> {
        self.last_table.as_ref()
    }

    #[must_use]
    pub fn published_count(&self) -> u64 {
        self.published
    }

    #[must_use]
    pub fn publish_pending(&self) -> bool {
        self.scheduler.is_pending(&CursorTask::PublishDeltas)
    }

    /// Click at data position `x` on chart `instance`.
    pub fn click(&mut self, instance: InstanceId, x: f64) -> ViewerResult<CursorAction> {
        let visible = self.visible(instance)?;
        let action = self.cursor.click_at(x, visible, self.snap_fraction)?;
        self.lines_changed()?;
        Ok(action)
    }

    /// Click at a horizontal pixel offset of chart `instance`.
    pub fn click_pixel(&mut self, instance: InstanceId, pixel_x: f64) -> ViewerResult<CursorAction> {
        let x = self.engine.pos_to_val(instance, pixel_x)?;
        self.click(instance, x)
    }

    pub fn begin_drag(&mut self, instance: InstanceId, x: f64) -> ViewerResult<Option<usize>> {
        let visible = self.visible(instance)?;
        Ok(self.cursor.begin_drag(x, visible, self.snap_fraction))
    }

    /// Moves the dragged line and redraws every chart in the same call.
    pub fn drag_to(&mut self, x: f64) -> ViewerResult<bool> {
        if !self.cursor.drag_to(x)? {
            return Ok(false);
        }
        self.lines_changed()?;
        Ok(true)
    }

    /// Ends a drag and publishes the table without waiting for the debounce.
    pub fn end_drag(&mut self) -> ViewerResult<Option<usize>> {
        let released = self.cursor.end_drag();
        if released.is_some() {
            self.scheduler.cancel(&CursorTask::PublishDeltas);
            self.publish_now()?;
        }
        Ok(released)
    }

    pub fn set_lines(&mut self, lines: &[f64]) -> ViewerResult<()> {
        self.cursor.set_lines(lines)?;
        self.lines_changed()
    }

    pub fn clear(&mut self) -> ViewerResult<()> {
        self.set_lines(&[])
    }

    /// Advances the debounce clock; returns the number of tables published.
    pub fn tick(&mut self, elapsed: Duration) -> ViewerResult<usize> {
        let due = self.scheduler.advance(elapsed);
        let mut published = 0;
        for task in due {
            match task {
                CursorTask::PublishDeltas => {
                    self.publish_now()?;
                    published += 1;
                }
            }
        }
        Ok(published)
    }

    /// Collects and publishes the delta table for the current lines.
    pub fn publish_now(&mut self) -> ViewerResult<usize> {
        let lines = self.cursor.lines();
        let table = collect_deltas(&self.engine.series_snapshots(), &lines);
        let rows = table.row_count();
        self.sink.publish(&table)?;
        self.published += 1;
        if let Err(error) = self.engine.notify_plugins(&PluginEvent::DeltasPublished { rows }) {
            warn!(%error, "delta publication not forwarded to plugins");
        }
        debug!(rows, lines = lines.len(), "delta table published");
        self.last_table = Some(table);
        Ok(rows)
    }

    fn visible(&self, instance: InstanceId) -> ViewerResult<(f64, f64)> {
        self.engine.visible_range(instance).ok_or_else(|| {
            ViewerError::MissingState(format!("{instance} has no visible x range"))
        })
    }

    fn lines_changed(&mut self) -> ViewerResult<()> {
        self.engine.set_cursor_lines(&self.cursor.lines())?;
        self.scheduler
            .debounce(CursorTask::PublishDeltas, self.debounce);
        Ok(())
    }
}
