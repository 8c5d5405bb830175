use tracing::{debug, trace};

use crate::core::{ChannelKey, ChannelKind};
use crate::planner::plan_units;

use super::chart_builder::{chart_data, display_samples, member_color, membership_of, series_specs};
use super::reconciler::kind_slot;
use super::{InstanceId, RedrawLevel, Reconciler};

impl Reconciler {
    /// Re-sends the full data of one chart.
    pub(super) fn refresh_chart_data(&mut self, instance: InstanceId) -> bool {
        let Some(entry) = self.registry.get(instance) else {
            return false;
        };
        let members: Vec<ChannelKey> = entry.members().collect();
        let data = {
            let state = self.store.state();
            let data = self.store.data();
            chart_data(members, &state, &data)
        };
        let patched = self.patch_or_recreate(instance, "set_data", |entry| {
            entry.surface_mut().set_data(data)
        });
        if patched {
            self.stats.data_patches += 1;
            self.request_redraw(instance, RedrawLevel::Light);
        }
        patched
    }

    pub(super) fn apply_invert(&mut self, kind: ChannelKind, index: Option<usize>) {
        let targets: Vec<InstanceId> = match index {
            Some(position) => self.registry.charts_for(ChannelKey::new(kind, position)).to_vec(),
            None => self
                .members_of_kind(kind)
                .into_iter()
                .map(|(instance, _)| instance)
                .collect(),
        };
        for instance in targets {
            self.refresh_chart_data(instance);
        }
    }

    pub(super) fn apply_samples(&mut self, kind: ChannelKind, index: usize) {
        let owners = self.registry.charts_for(ChannelKey::new(kind, index)).to_vec();
        if owners.is_empty() {
            trace!(%kind, index, "samples of an unrendered channel");
        }
        for instance in owners {
            self.refresh_chart_data(instance);
        }
    }

    /// A channel was appended. Computed channels join their owning chart in
    /// place; other kinds recreate their charts.
    pub(super) fn attach_channel(&mut self, kind: ChannelKind, index: usize) {
        self.known_lengths[kind_slot(kind)] = self.store.len(kind);
        if kind != ChannelKind::Computed {
            self.recreate_scope(kind, "channel inserted");
            return;
        }

        let (layout, axes_changed) = self.plan();
        if axes_changed {
            self.full_rebuild("max axes changed");
            return;
        }
        let Some(plan) = layout
            .charts
            .iter()
            .find(|plan| plan.computed_indices.contains(&index))
            .cloned()
        else {
            trace!(index, "hidden computed channel");
            return;
        };

        let Some(instance) = self.registry.find_group(plan.kind, &plan.key) else {
            if self.create_or_record(&plan).is_some() {
                self.stats.attachments += 1;
                self.order_like(&layout);
            }
            return;
        };

        let key = ChannelKey::new(ChannelKind::Computed, index);
        let (series, samples, membership, colors, units, appendable) = {
            let state = self.store.state();
            let data = self.store.data();
            let units = plan_units(&state, &plan);
            let entry = self.registry.get(instance);
            let mut expected = entry
                .map(|entry| entry.membership().computed_indices.clone())
                .unwrap_or_default();
            expected.push(index);
            let appendable = entry.is_some_and(|entry| {
                entry.units() == units.as_slice()
                    && entry.membership().channel_indices == plan.channel_indices
            }) && expected == plan.computed_indices;
            let series = series_specs(&[key], &units, &state, &mut self.strokes);
            let colors: Vec<String> = super::chart_builder::plan_members(&plan)
                .map(|member| member_color(member, &state))
                .collect();
            (
                series,
                display_samples(key, &state, &data),
                membership_of(&plan, &state),
                colors,
                units,
                appendable,
            )
        };

        if !appendable {
            debug!(%instance, index, "membership diverged; rebinding chart");
            self.rebind_chart(instance, &plan);
            self.stats.attachments += 1;
            return;
        }

        let Some(spec) = series.into_iter().next() else {
            return;
        };
        let patched = self.patch_or_recreate(instance, "add_series", |entry| {
            entry.surface_mut().add_series(spec, samples).map(|_| ())
        });
        if patched {
            if let Err(err) = self.registry.set_membership(instance, membership, colors) {
                debug!(error = %err, %instance, "membership not updated");
            }
            self.registry.set_axes(instance, units, plan.axis_count);
            self.stats.attachments += 1;
            self.request_redraw(instance, RedrawLevel::Light);
        }
    }

    pub(super) fn on_channels_removed(&mut self, kind: ChannelKind) {
        let current = self.store.len(kind);
        if current < self.known_lengths[kind_slot(kind)] {
            self.full_rebuild("channels removed");
        } else {
            trace!(%kind, current, "channel id sequence rewritten in place");
        }
    }

    /// Copies renamed computed ids into chart metadata.
    pub(super) fn refresh_computed_ids(&mut self) {
        let ids = self.store.state().computed.channel_ids.clone();
        let updates: Vec<_> = self
            .registry
            .iter()
            .filter(|entry| !entry.membership().computed_indices.is_empty())
            .map(|entry| {
                let mut membership = entry.membership().clone();
                membership.computed_channel_ids = membership
                    .computed_indices
                    .iter()
                    .filter_map(|&i| ids.get(i).cloned())
                    .collect();
                (entry.instance(), membership, entry.colors().to_vec())
            })
            .collect();
        for (instance, membership, colors) in updates {
            if let Err(err) = self.registry.set_membership(instance, membership, colors) {
                debug!(error = %err, %instance, "membership not updated");
            }
        }
    }
}
