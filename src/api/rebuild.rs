use tracing::{debug, info};

use crate::core::{ChannelKey, ChannelKind};
use crate::extensions::PluginEvent;
use crate::planner::ChartPlan;

use super::{ChartEntry, Reconciler};

/// Charts affected by a structural change of `kind`: charts of that kind, plus
/// any chart with computed members when computed channels change.
fn entry_in_scope(entry: &ChartEntry, kind: ChannelKind) -> bool {
    entry.kind() == kind
        || (kind == ChannelKind::Computed && !entry.membership().computed_indices.is_empty())
}

fn plan_in_scope(plan: &ChartPlan, kind: ChannelKind) -> bool {
    plan.kind == kind || (kind == ChannelKind::Computed && !plan.computed_indices.is_empty())
}

impl Reconciler {
    /// Destroys every chart and creates one per non-empty planned group.
    ///
    /// Changes arriving meanwhile are skipped through the `rebuilding` flag.
    pub(super) fn full_rebuild(&mut self, reason: &'static str) {
        self.rebuilding = true;
        let started = std::time::Instant::now();
        for entry in self.registry.drain() {
            let instance = entry.instance();
            self.redraws.forget(instance);
            let mut surface = entry.into_surface();
            surface.destroy();
            self.plugins
                .dispatch(&PluginEvent::ChartDestroyed { instance });
        }

        let (layout, _) = self.plan();
        for plan in &layout.charts {
            self.create_or_record(plan);
        }
        self.record_known_lengths();
        self.prune_strokes();
        self.stats.full_rebuilds += 1;
        self.rebuilding = false;

        info!(
            reason,
            charts = self.registry.len(),
            max_axes = layout.max_axes,
            elapsed_ms = started.elapsed().as_secs_f64() * 1_000.0,
            "charts rebuilt"
        );
        self.plugins.dispatch(&PluginEvent::Rebuilt {
            charts: self.registry.len(),
        });
    }

    /// Recreates the charts one kind's structural change touches.
    pub(super) fn recreate_scope(&mut self, kind: ChannelKind, reason: &'static str) {
        let (layout, axes_changed) = self.plan();
        if axes_changed {
            self.full_rebuild(reason);
            return;
        }
        let doomed: Vec<_> = self
            .registry
            .iter()
            .filter(|entry| entry_in_scope(entry, kind))
            .map(ChartEntry::instance)
            .collect();
        for instance in doomed {
            self.retire_chart(instance, false);
        }
        for plan in layout.charts.iter().filter(|plan| plan_in_scope(plan, kind)) {
            if self.create_or_record(plan).is_some() {
                self.stats.recreates += 1;
            }
        }
        self.record_known_lengths();
        self.prune_strokes();
        self.order_like(&layout);
        debug!(%kind, reason, "charts recreated");
    }

    fn prune_strokes(&mut self) {
        let lengths = {
            let state = self.store.state();
            ChannelKind::ALL.map(|kind| state.kind(kind).len())
        };
        self.strokes.retain(|key: ChannelKey| {
            let slot = super::reconciler::kind_slot(key.kind);
            key.position < lengths[slot]
        });
    }
}
