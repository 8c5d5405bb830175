use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ViewerError, ViewerResult};
use crate::reactive::{ReactiveTree, StatePath, StateValue};
use crate::state_path;

/// Member of the cursor tree holding the ordered line positions.
pub const LINES_KEY: &str = "lines";

/// Outcome of a click on the plot area.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum CursorAction {
    Added { index: usize, x: f64 },
    Removed { index: usize, x: f64 },
}

/// Click tolerance for a visible range.
#[must_use]
pub fn snap_tolerance(range: (f64, f64), snap_fraction: f64) -> f64 {
    (range.1 - range.0).abs() * snap_fraction
}

/// Vertical cursor lines, kept in insertion order in a [`ReactiveTree`].
///
/// Consecutive lines form the pairs the delta table is computed over, so a
/// drag moves a line in place instead of reordering.
#[derive(Debug, Clone)]
pub struct CursorModel {
    tree: ReactiveTree,
    dragging: Option<usize>,
}

impl Default for CursorModel {
    fn default() -> Self {
        Self::new()
    }
}

impl CursorModel {
    #[must_use]
    pub fn new() -> Self {
        let mut root = indexmap::IndexMap::new();
        root.insert(LINES_KEY.to_owned(), StateValue::List(Vec::new()));
        Self {
            tree: ReactiveTree::new(StateValue::Record(root)),
            dragging: None,
        }
    }

    /// Reactive view for hosts that render the lines or persist them.
    #[must_use]
    pub fn tree(&self) -> &ReactiveTree {
        &self.tree
    }

    #[must_use]
    pub fn lines(&self) -> Vec<f64> {
        self.tree.numbers_at(&lines_path())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lines().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lines().is_empty()
    }

    pub fn set_lines(&mut self, lines: &[f64]) -> ViewerResult<()> {
        if let Some(bad) = lines.iter().find(|x| !x.is_finite()) {
            return Err(ViewerError::InvalidData(format!("cursor position {bad} is not finite")));
        }
        self.dragging = None;
        self.tree.replace_list(
            &lines_path(),
            lines.iter().copied().map(StateValue::Number).collect(),
        )
    }

    pub fn clear(&mut self) -> ViewerResult<()> {
        self.set_lines(&[])
    }

    /// Index of the line closest to `x`, if it lies within `tolerance`.
    #[must_use]
    pub fn nearest(&self, x: f64, tolerance: f64) -> Option<usize> {
        self.lines()
            .iter()
            .enumerate()
            .map(|(index, line)| (index, (line - x).abs()))
            .filter(|(_, distance)| *distance <= tolerance)
            .min_by_key(|(_, distance)| OrderedFloat(*distance))
            .map(|(index, _)| index)
    }

    /// Removes the line within snapping distance of `x`, or appends a new one.
    pub fn click_at(
        &mut self,
        x: f64,
        visible: (f64, f64),
        snap_fraction: f64,
    ) -> ViewerResult<CursorAction> {
        if !x.is_finite() {
            return Err(ViewerError::InvalidData(format!("cursor position {x} is not finite")));
        }
        let tolerance = snap_tolerance(visible, snap_fraction);
        if let Some(index) = self.nearest(x, tolerance) {
            let removed = self.tree.remove_index(&lines_path(), index)?;
            self.dragging = None;
            let removed = removed.as_f64().unwrap_or(x);
            debug!(index, x = removed, "cursor line removed");
            return Ok(CursorAction::Removed { index, x: removed });
        }
        let index = self.tree.push(&lines_path(), StateValue::Number(x))?;
        debug!(index, x, "cursor line added");
        Ok(CursorAction::Added { index, x })
    }

    /// Starts dragging the line near `x`; returns its index.
    pub fn begin_drag(&mut self, x: f64, visible: (f64, f64), snap_fraction: f64) -> Option<usize> {
        self.dragging = self.nearest(x, snap_tolerance(visible, snap_fraction));
        self.dragging
    }

    /// Moves the dragged line; `false` when no drag is active.
    pub fn drag_to(&mut self, x: f64) -> ViewerResult<bool> {
        let Some(index) = self.dragging else {
            return Ok(false);
        };
        if !x.is_finite() {
            return Err(ViewerError::InvalidData(format!("cursor position {x} is not finite")));
        }
        self.tree.set_index(&lines_path(), index, StateValue::Number(x))?;
        Ok(true)
    }

    pub fn end_drag(&mut self) -> Option<usize> {
        self.dragging.take()
    }

    #[must_use]
    pub fn dragging(&self) -> Option<usize> {
        self.dragging
    }
}

fn lines_path() -> StatePath {
    state_path![LINES_KEY]
}

#[cfg(test)]
mod tests {
    use std::cell::RefCell;
    use std::rc::Rc;

    use super::{CursorAction, CursorModel};
    use crate::reactive::ChangeKind;

    #[test]
    fn click_near_existing_line_removes_it_and_far_click_appends() {
        let mut cursor = CursorModel::new();
        cursor.set_lines(&[1.0, 3.0]).expect("lines");

        let action = cursor.click_at(1.05, (0.0, 5.0), 0.02).expect("click");
        assert_eq!(action, CursorAction::Removed { index: 0, x: 1.0 });
        assert_eq!(cursor.lines(), vec![3.0]);

        let action = cursor.click_at(1.5, (0.0, 5.0), 0.02).expect("click");
        assert_eq!(action, CursorAction::Added { index: 1, x: 1.5 });
        assert_eq!(cursor.lines(), vec![3.0, 1.5]);
    }

    #[test]
    fn drag_moves_line_in_place_and_emits_element_sets() {
        let mut cursor = CursorModel::new();
        cursor.set_lines(&[1.0, 2.0]).expect("lines");
        let kinds = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&kinds);
        cursor.tree().subscribe(move |record| {
            sink.borrow_mut().push(record.kind);
            Ok(())
        });

        assert_eq!(cursor.begin_drag(2.01, (0.0, 10.0), 0.02), Some(1));
        assert!(cursor.drag_to(0.5).expect("drag"));
        assert_eq!(cursor.end_drag(), Some(1));
        assert!(!cursor.drag_to(4.0).expect("no drag"));
        assert_eq!(cursor.lines(), vec![1.0, 0.5]);
        assert_eq!(*kinds.borrow(), vec![ChangeKind::ElementSet]);
    }

    #[test]
    fn non_finite_positions_are_rejected() {
        let mut cursor = CursorModel::new();
        assert!(cursor.click_at(f64::NAN, (0.0, 1.0), 0.02).is_err());
        assert!(cursor.set_lines(&[f64::INFINITY]).is_err());
        assert!(cursor.is_empty());
    }
}
