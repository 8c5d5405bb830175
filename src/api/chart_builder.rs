use tracing::debug;

use crate::core::{ChannelKey, ChannelKind, ChannelState, DataState, TimeWindow, resolve_time_window};
use crate::extensions::PluginState;
use crate::planner::{ChartPlan, plan_units, scale_key_for};
use crate::render::{ChartData, ChartSpec, SeriesSpec};

use super::{Membership, StrokeCache};

/// Spec plus registry metadata for one chart about to be created.
#[derive(Debug)]
pub struct ChartBlueprint {
    pub spec: ChartSpec,
    pub membership: Membership,
    pub colors: Vec<String>,
    pub units: Vec<String>,
    pub axis_count: usize,
    pub window: Option<TimeWindow>,
}

/// Host container identifier of a chart.
#[must_use]
pub fn container_id(kind: ChannelKind, group_id: &str) -> String {
    format!("{kind}-{group_id}")
}

/// Member keys of a plan in local series order.
pub fn plan_members(plan: &ChartPlan) -> impl Iterator<Item = ChannelKey> + '_ {
    plan.channel_indices
        .iter()
        .map(|&i| ChannelKey::new(plan.kind, i))
        .chain(
            plan.computed_indices
                .iter()
                .map(|&i| ChannelKey::new(ChannelKind::Computed, i)),
        )
}

#[must_use]
pub fn membership_of(plan: &ChartPlan, state: &ChannelState) -> Membership {
    Membership {
        channel_indices: plan.channel_indices.clone(),
        computed_indices: plan.computed_indices.clone(),
        computed_channel_ids: plan
            .computed_indices
            .iter()
            .filter_map(|&i| state.computed.channel_ids.get(i).cloned())
            .collect(),
    }
}

/// Samples of one channel as displayed: scaled by the axis factor and
/// negated when inverted. Missing sequences render empty.
#[must_use]
pub fn display_samples(key: ChannelKey, state: &ChannelState, data: &DataState) -> Vec<f64> {
    let channels = state.kind(key.kind);
    let Some(raw) = data.channel(key.kind, key.position) else {
        debug!(channel = %key, "no samples for channel");
        return Vec::new();
    };
    let scale = channels.axes_scales.get(key.position).copied().unwrap_or(1.0);
    let sign = if channels.inverts.get(key.position).copied().unwrap_or(false) {
        -1.0
    } else {
        1.0
    };
    let factor = scale * sign;
    if factor == 1.0 {
        return raw.to_vec();
    }
    raw.iter().map(|value| value * factor).collect()
}

/// X values and member samples of a chart.
pub fn chart_data<I>(members: I, state: &ChannelState, data: &DataState) -> ChartData
where
    I: IntoIterator<Item = ChannelKey>,
{
    ChartData::new(
        data.x_values(),
        members
            .into_iter()
            .map(|key| display_samples(key, state, data))
            .collect(),
    )
}

#[must_use]
pub fn member_color(key: ChannelKey, state: &ChannelState) -> String {
    state
        .kind(key.kind)
        .line_colors
        .get(key.position)
        .cloned()
        .unwrap_or_default()
}

/// Series attributes for every member, strokes taken from the cache.
pub fn series_specs(
    members: &[ChannelKey],
    units: &[String],
    state: &ChannelState,
    strokes: &mut StrokeCache,
) -> Vec<SeriesSpec> {
    members
        .iter()
        .map(|&key| {
            let channels = state.kind(key.kind);
            let unit = channels.y_units.get(key.position).cloned().unwrap_or_default();
            let (stroke, _) = strokes.stroke_for(key, &member_color(key, state));
            SeriesSpec {
                label: channels.y_labels.get(key.position).cloned().unwrap_or_default(),
                stroke,
                scale: scale_key_for(&unit, units),
                unit,
                show: true,
            }
        })
        .collect()
}

/// First explicit window among the members, if any member sets one.
#[must_use]
pub fn member_window(
    members: &[ChannelKey],
    state: &ChannelState,
    data: &DataState,
) -> Option<TimeWindow> {
    let time = data.time()?;
    members.iter().find_map(|&key| {
        let channels = state.kind(key.kind);
        let start = channels.starts.get(key.position).copied().flatten();
        let duration = channels.durations.get(key.position).copied().flatten();
        if start.is_none() && duration.is_none() {
            return None;
        }
        resolve_time_window(start, duration, time).ok()
    })
}

/// Everything needed to create the chart for `plan`.
pub fn blueprint(
    plan: &ChartPlan,
    state: &ChannelState,
    data: &DataState,
    strokes: &mut StrokeCache,
    axis_count: usize,
    cursor_lines: &[f64],
) -> ChartBlueprint {
    let members: Vec<ChannelKey> = plan_members(plan).collect();
    let units = plan_units(state, plan);
    let colors: Vec<String> = members.iter().map(|&key| member_color(key, state)).collect();
    let series = series_specs(&members, &units, state, strokes);

    let mut plugins = Vec::new();
    if plan.kind == ChannelKind::Digital {
        plugins.push(PluginState::DigitalFill {
            colors: colors.clone(),
        });
    }
    if !cursor_lines.is_empty() {
        plugins.push(PluginState::VerticalLines {
            lines: cursor_lines.to_vec(),
        });
    }

    ChartBlueprint {
        spec: ChartSpec {
            container_id: container_id(plan.kind, &plan.key),
            group_id: plan.key.clone(),
            kind: plan.kind,
            series,
            data: chart_data(members.iter().copied(), state, data),
            axis_count,
            x_label: state.x_label.clone(),
            x_unit: state.x_unit.clone(),
            plugins,
        },
        membership: membership_of(plan, state),
        window: member_window(&members, state, data),
        colors,
        units,
        axis_count,
    }
}
