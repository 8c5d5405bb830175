use tracing::debug;

use crate::core::{ChannelKind, ChannelRow};
use crate::error::ViewerResult;
use crate::reactive::ChannelStore;

use super::ReconcilerHandle;

/// One edit coming from the tabular channel editor.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelUpdate {
    Color { index: usize, color: String },
    Label { index: usize, label: String },
    Unit { index: usize, unit: String },
    AxesScale { index: usize, scale: f64 },
    Window {
        index: usize,
        start: Option<f64>,
        duration: Option<f64>,
    },
    Invert { index: usize, invert: bool },
    Group { index: usize, group: String },
    Row { index: usize, row: ChannelRow },
    Remove { index: usize },
}

impl ChannelUpdate {
    /// Whether the edit has an in-place strategy at all.
    #[must_use]
    pub const fn has_cheap_path(&self) -> bool {
        matches!(
            self,
            Self::Color { .. }
                | Self::Label { .. }
                | Self::Window { .. }
                | Self::Invert { .. }
                | Self::Group { .. }
                | Self::Row { .. }
        )
    }
}

/// Progress notifications of [`handle_channel_update`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStage {
    Applying,
    Reconciled,
    Rebuilding,
}

/// Applies one editor edit to the store and reports how the charts followed.
///
/// Returns `Ok(true)` when the change was absorbed by an in-place strategy.
/// Otherwise `on_full_rebuild` runs once and `Ok(false)` is returned. Group
/// edits are debounced; they count as cheap once scheduled.
pub fn handle_channel_update(
    kind: ChannelKind,
    update: ChannelUpdate,
    store: &ChannelStore,
    engine: &ReconcilerHandle,
    on_full_rebuild: &mut dyn FnMut(),
    mut on_progress: Option<&mut dyn FnMut(UpdateStage)>,
) -> ViewerResult<bool> {
    let mut report = |stage: UpdateStage| {
        if let Some(progress) = on_progress.as_deref_mut() {
            progress(stage);
        }
    };
    report(UpdateStage::Applying);

    let (before, failures_before) = {
        let engine = engine.borrow();
        (engine.stats(), engine.failures().len())
    };
    let cheap_candidate = update.has_cheap_path();

    match update {
        ChannelUpdate::Color { index, color } => store.set_line_color(kind, index, &color)?,
        ChannelUpdate::Label { index, label } => store.set_label(kind, index, &label)?,
        ChannelUpdate::Unit { index, unit } => store.set_unit(kind, index, &unit)?,
        ChannelUpdate::AxesScale { index, scale } => store.set_axes_scale(kind, index, scale)?,
        ChannelUpdate::Window {
            index,
            start,
            duration,
        } => {
            store.set_start(kind, index, start)?;
            store.set_duration(kind, index, duration)?;
        }
        ChannelUpdate::Invert { index, invert } => store.set_invert(kind, index, invert)?,
        ChannelUpdate::Group { index, group } => store.set_group(kind, index, &group)?,
        ChannelUpdate::Row { index, row } => store.update_channel(kind, index, &row)?,
        ChannelUpdate::Remove { index } => {
            store.remove_channel(kind, index)?;
        }
    }

    let (after, failures_after) = {
        let engine = engine.borrow();
        (engine.stats(), engine.failures().len())
    };
    let cheap = cheap_candidate
        && after.structural() == before.structural()
        && failures_after == failures_before;
    debug!(%kind, cheap, "channel update handled");

    if cheap {
        report(UpdateStage::Reconciled);
    } else {
        report(UpdateStage::Rebuilding);
        on_full_rebuild();
    }
    Ok(cheap)
}
