use indexmap::IndexMap;
use serde::Serialize;

use super::InstanceId;

/// Ordered redraw classes; requests for one chart merge to the highest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Default)]
pub enum RedrawLevel {
    #[default]
    None,
    /// Repaint over the current canvas.
    Light,
    /// Clear the canvas first (digital fill changes).
    Clear,
}

impl RedrawLevel {
    #[must_use]
    pub const fn max(self, other: Self) -> Self {
        if self as u8 >= other as u8 {
            self
        } else {
            other
        }
    }

    #[must_use]
    pub const fn clears(self) -> bool {
        matches!(self, Self::Clear)
    }
}

/// Charts awaiting a redraw in the next frame flush.
#[derive(Debug, Default)]
pub struct RedrawQueue {
    pending: IndexMap<InstanceId, RedrawLevel>,
}

impl RedrawQueue {
    /// Marks a chart dirty. Returns `true` when it was not queued yet.
    pub fn request(&mut self, instance: InstanceId, level: RedrawLevel) -> bool {
        if level == RedrawLevel::None {
            return false;
        }
        match self.pending.get_mut(&instance) {
            Some(current) => {
                *current = (*current).max(level);
                false
            }
            None => {
                self.pending.insert(instance, level);
                true
            }
        }
    }

    pub fn forget(&mut self, instance: InstanceId) {
        self.pending.shift_remove(&instance);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    #[must_use]
    pub fn level_of(&self, instance: InstanceId) -> RedrawLevel {
        self.pending.get(&instance).copied().unwrap_or_default()
    }

    pub fn take(&mut self) -> Vec<(InstanceId, RedrawLevel)> {
        self.pending.drain(..).collect()
    }
}
