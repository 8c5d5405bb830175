use std::collections::HashSet;

use tracing::debug;

use crate::core::{ChannelKey, ChannelKind};
use crate::error::ViewerResult;
use crate::extensions::PluginState;
use crate::planner::{ChartPlan, LayoutPlan, plan_units};
use crate::render::{ChartData, ChartSurface, SeriesSpec};

use super::chart_builder::{chart_data, member_color, membership_of, plan_members, series_specs};
use super::{EngineTask, InstanceId, RedrawLevel, Reconciler};

/// Kinds whose charts depend on the groups of `kind`. Computed channels attach
/// to analog groups, so analog and computed groups move together.
#[must_use]
pub fn group_scope(kind: ChannelKind) -> &'static [ChannelKind] {
    match kind {
        ChannelKind::Digital => &[ChannelKind::Digital],
        ChannelKind::Analog | ChannelKind::Computed => {
            &[ChannelKind::Analog, ChannelKind::Computed]
        }
    }
}

/// Replaces every series of a surface and its data, inside one batch.
fn swap_series(
    surface: &mut dyn ChartSurface,
    series: Vec<SeriesSpec>,
    data: ChartData,
) -> ViewerResult<()> {
    surface.begin_batch();
    let swapped = (|| {
        for local in (0..surface.series_count()).rev() {
            surface.remove_series(local)?;
        }
        for spec in series {
            surface.add_series(spec, Vec::new())?;
        }
        surface.set_data(data)
    })();
    let closed = surface.end_batch();
    swapped.and(closed)
}

impl Reconciler {
    pub(super) fn request_group_change(&mut self, kind: ChannelKind) {
        let delay = self.config.group_debounce();
        if self.scheduler.debounce(EngineTask::GroupChange(kind), delay) {
            debug!(%kind, "group change re-armed");
        }
    }

    /// Debounced group reconciliation, cheapest strategy first.
    pub(super) fn apply_group_change(&mut self, kind: ChannelKind) {
        let (layout, axes_changed) = self.plan();
        if axes_changed {
            self.full_rebuild("max axes changed");
            return;
        }
        let scope = group_scope(kind);
        let targets: Vec<ChartPlan> = layout
            .charts
            .iter()
            .filter(|plan| scope.contains(&plan.kind))
            .cloned()
            .collect();
        let current: Vec<InstanceId> = scope
            .iter()
            .flat_map(|&kind| self.registry.ids_of(kind))
            .collect();

        if self.try_super_fast(&targets, &current) {
            self.stats.super_fast += 1;
            debug!(%kind, charts = targets.len(), "groups reconciled in place");
        } else if self.try_smart_merge(&targets, &current) {
            self.stats.smart_merges += 1;
            debug!(%kind, charts = targets.len(), "groups merged");
        } else if self.try_reuse(&targets, &current) {
            self.stats.reuses += 1;
            debug!(%kind, charts = targets.len(), "charts reused by position");
        } else {
            self.full_rebuild("group change");
            return;
        }
        self.order_like(&layout);
    }

    /// Same charts and axis counts: only memberships move.
    fn try_super_fast(&mut self, targets: &[ChartPlan], current: &[InstanceId]) -> bool {
        if targets.len() != current.len() {
            return false;
        }
        let mut matched = Vec::with_capacity(targets.len());
        for plan in targets {
            let Some(instance) = self.registry.find_group(plan.kind, &plan.key) else {
                return false;
            };
            let Some(entry) = self.registry.get(instance) else {
                return false;
            };
            if entry.axis_count() != plan.axis_count {
                return false;
            }
            matched.push(instance);
        }
        for (instance, plan) in matched.into_iter().zip(targets) {
            if self.membership_differs(instance, plan) {
                self.rebind_chart(instance, plan);
            }
        }
        true
    }

    /// Keeps charts whose group survives, creates at most the configured number
    /// of new ones and retires emptied charts on the idle queue.
    fn try_smart_merge(&mut self, targets: &[ChartPlan], current: &[InstanceId]) -> bool {
        let growth = targets.len() as i64 - current.len() as i64;
        if growth > self.config.smart_merge_max_growth as i64 {
            return false;
        }
        let mut kept = HashSet::with_capacity(targets.len());
        for plan in targets {
            match self.registry.find_group(plan.kind, &plan.key) {
                Some(instance) => {
                    kept.insert(instance);
                    if self.membership_differs(instance, plan) {
                        self.rebind_chart(instance, plan);
                    }
                }
                None => {
                    if let Some(instance) = self.create_or_record(plan) {
                        kept.insert(instance);
                    }
                }
            }
        }
        for &instance in current {
            if !kept.contains(&instance) {
                self.retire_chart(instance, true);
            }
        }
        true
    }

    /// Pairs existing charts with target groups by position within each kind.
    fn try_reuse(&mut self, targets: &[ChartPlan], current: &[InstanceId]) -> bool {
        let mut pairs: Vec<(Option<InstanceId>, &ChartPlan)> = Vec::new();
        let mut leftovers = Vec::new();
        let mut created = 0usize;
        for kind in ChannelKind::ALL {
            let existing: Vec<InstanceId> = current
                .iter()
                .copied()
                .filter(|&instance| {
                    self.registry
                        .get(instance)
                        .is_some_and(|entry| entry.kind() == kind)
                })
                .collect();
            let wanted: Vec<&ChartPlan> = targets.iter().filter(|plan| plan.kind == kind).collect();
            for (position, plan) in wanted.iter().enumerate() {
                let reused = existing.get(position).copied();
                if reused.is_none() {
                    created += 1;
                }
                pairs.push((reused, plan));
            }
            leftovers.extend(existing.into_iter().skip(wanted.len()));
        }
        if created > self.config.reuse_max_created {
            return false;
        }

        for (reused, plan) in pairs {
            match reused {
                Some(instance) => {
                    if let Err(err) = self.registry.set_group(instance, &plan.key) {
                        debug!(error = %err, %instance, "chart vanished before reuse");
                        continue;
                    }
                    self.rebind_chart(instance, plan);
                }
                None => {
                    self.create_or_record(plan);
                }
            }
        }
        for instance in leftovers {
            self.retire_chart(instance, true);
        }
        true
    }

    fn membership_differs(&self, instance: InstanceId, plan: &ChartPlan) -> bool {
        self.registry.get(instance).is_none_or(|entry| {
            entry.membership().channel_indices != plan.channel_indices
                || entry.membership().computed_indices != plan.computed_indices
                || entry.axis_count() != plan.axis_count
        })
    }

    /// Swaps a chart's series and data to a new membership without recreating it.
    pub(super) fn rebind_chart(&mut self, instance: InstanceId, plan: &ChartPlan) {
        let (series, data, membership, colors, units) = {
            let state = self.store.state();
            let data = self.store.data();
            let members: Vec<ChannelKey> = plan_members(plan).collect();
            let units = plan_units(&state, plan);
            let series = series_specs(&members, &units, &state, &mut self.strokes);
            let colors: Vec<String> = members.iter().map(|&key| member_color(key, &state)).collect();
            (
                series,
                chart_data(members, &state, &data),
                membership_of(plan, &state),
                colors,
                units,
            )
        };
        let digital = plan.kind == ChannelKind::Digital;
        let fill = colors.clone();
        let patched = self.patch_or_recreate(instance, "rebind", |entry| {
            swap_series(entry.surface_mut(), series, data)?;
            if digital {
                entry
                    .surface_mut()
                    .set_plugin_state(PluginState::DigitalFill { colors: fill })?;
            }
            Ok(())
        });
        if patched {
            if let Err(err) = self.registry.set_membership(instance, membership, colors) {
                debug!(error = %err, %instance, "membership not updated");
            }
            self.registry.set_axes(instance, units, plan.axis_count);
            self.stats.data_patches += 1;
            let level = if digital {
                RedrawLevel::Clear
            } else {
                RedrawLevel::Light
            };
            self.request_redraw(instance, level);
        }
    }

    /// Orders the registry like the layout plan.
    pub(super) fn order_like(&mut self, layout: &LayoutPlan) {
        let order: Vec<InstanceId> = layout
            .charts
            .iter()
            .filter_map(|plan| self.registry.find_group(plan.kind, &plan.key))
            .collect();
        self.registry.reorder(&order);
    }
}
