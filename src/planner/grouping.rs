use indexmap::IndexMap;
use serde::Serialize;

use crate::core::group::{group_key, is_hidden, is_unassigned, next_group_index};
use crate::core::{ChannelKind, ChannelState, KindChannels};

use super::axes::{axis_count, distinct_units};

/// Group key given to digital channels without an explicit group.
pub const DIGITAL_DEFAULT_GROUP: &str = "digital";
/// Group key given to computed channels without an explicit group.
pub const COMPUTED_DEFAULT_GROUP: &str = "computed";

/// Channels of one kind sharing a group key, in channel index order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct GroupBucket {
    pub key: String,
    pub channel_indices: Vec<usize>,
}

/// Buckets analog-style channels by group.
///
/// When any entry is assigned, assigned channels are bucketed by key in
/// first-appearance order. Unassigned channels are then auto-grouped: a run of
/// consecutive channels with the same unit shares a fresh `G{n}` key numbered
/// after the highest existing key. Hidden channels (`-1`) are skipped.
#[must_use]
pub fn bucket_by_group(groups: &[String], units: &[String]) -> Vec<GroupBucket> {
    let mut buckets: IndexMap<String, Vec<usize>> = IndexMap::new();
    for (index, group) in groups.iter().enumerate() {
        if is_unassigned(group) || is_hidden(group) {
            continue;
        }
        buckets.entry(group.trim().to_owned()).or_default().push(index);
    }

    let mut next = next_group_index(groups.iter().map(String::as_str));
    let mut run: Option<(String, &str)> = None;
    for (index, group) in groups.iter().enumerate() {
        if !is_unassigned(group) {
            continue;
        }
        let unit = units.get(index).map_or("", |unit| unit.trim());
        let key = match &run {
            Some((key, run_unit)) if *run_unit == unit => key.clone(),
            _ => {
                let key = group_key(next);
                next = next.saturating_add(1);
                run = Some((key.clone(), unit));
                key
            }
        };
        buckets.entry(key).or_default().push(index);
    }

    buckets
        .into_iter()
        .filter(|(_, indices)| !indices.is_empty())
        .map(|(key, channel_indices)| GroupBucket {
            key,
            channel_indices,
        })
        .collect()
}

/// Effective group key of every channel of `kind`; `None` for hidden channels.
#[must_use]
pub fn effective_groups(kind: ChannelKind, channels: &KindChannels) -> Vec<Option<String>> {
    match kind {
        ChannelKind::Analog => {
            let mut resolved = vec![None; channels.len()];
            for bucket in bucket_by_group(&channels.groups, &channels.y_units) {
                for index in bucket.channel_indices {
                    resolved[index] = Some(bucket.key.clone());
                }
            }
            resolved
        }
        ChannelKind::Digital | ChannelKind::Computed => channels
            .groups
            .iter()
            .map(|group| fixed_group(kind, group))
            .collect(),
    }
}

fn fixed_group(kind: ChannelKind, group: &str) -> Option<String> {
    if is_hidden(group) {
        return None;
    }
    if is_unassigned(group) {
        let fallback = match kind {
            ChannelKind::Computed => COMPUTED_DEFAULT_GROUP,
            _ => DIGITAL_DEFAULT_GROUP,
        };
        return Some(fallback.to_owned());
    }
    Some(group.trim().to_owned())
}

/// Writes load-time groups: auto-groups for unassigned analog channels and the
/// shared default group for unassigned digital channels.
pub fn fill_auto_groups(state: &mut ChannelState) {
    for bucket in bucket_by_group(&state.analog.groups, &state.analog.y_units) {
        for index in bucket.channel_indices {
            if is_unassigned(&state.analog.groups[index]) {
                state.analog.groups[index] = bucket.key.clone();
            }
        }
    }
    for group in &mut state.digital.groups {
        if is_unassigned(group) {
            *group = DIGITAL_DEFAULT_GROUP.to_owned();
        }
    }
}

/// One chart to create: its kind, group, members and axis count.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChartPlan {
    pub kind: ChannelKind,
    pub key: String,
    pub channel_indices: Vec<usize>,
    /// Computed channel positions rendered inside this chart.
    pub computed_indices: Vec<usize>,
    pub axis_count: usize,
}

impl ChartPlan {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channel_indices.is_empty() && self.computed_indices.is_empty()
    }
}

/// Ordered chart layout: analog charts, then digital, then standalone computed.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct LayoutPlan {
    pub charts: Vec<ChartPlan>,
    pub max_axes: usize,
}

impl LayoutPlan {
    #[must_use]
    pub fn charts_of(&self, kind: ChannelKind) -> impl Iterator<Item = &ChartPlan> {
        self.charts.iter().filter(move |plan| plan.kind == kind)
    }

    #[must_use]
    pub fn find(&self, kind: ChannelKind, key: &str) -> Option<&ChartPlan> {
        self.charts
            .iter()
            .find(|plan| plan.kind == kind && plan.key == key)
    }
}

/// Plans every chart for the current state.
///
/// A computed channel whose group names an analog chart is attached to it;
/// otherwise computed channels sharing a group form a standalone chart.
#[must_use]
pub fn plan_layout(state: &ChannelState, max_axes_cap: usize) -> LayoutPlan {
    let mut charts = Vec::new();

    let analog_buckets = bucket_by_group(&state.analog.groups, &state.analog.y_units);
    let computed_groups = effective_groups(ChannelKind::Computed, &state.computed);
    let mut standalone: IndexMap<String, Vec<usize>> = IndexMap::new();
    let mut attached: IndexMap<String, Vec<usize>> = IndexMap::new();
    for (position, group) in computed_groups.iter().enumerate() {
        let Some(group) = group else {
            continue;
        };
        let target = if analog_buckets.iter().any(|bucket| &bucket.key == group) {
            &mut attached
        } else {
            &mut standalone
        };
        target.entry(group.clone()).or_default().push(position);
    }

    for bucket in analog_buckets {
        let computed_indices = attached.shift_remove(&bucket.key).unwrap_or_default();
        let units = bucket
            .channel_indices
            .iter()
            .filter_map(|&i| state.analog.y_units.get(i))
            .chain(
                computed_indices
                    .iter()
                    .filter_map(|&i| state.computed.y_units.get(i)),
            )
            .map(String::as_str);
        charts.push(ChartPlan {
            kind: ChannelKind::Analog,
            axis_count: axis_count(units, max_axes_cap),
            key: bucket.key,
            channel_indices: bucket.channel_indices,
            computed_indices,
        });
    }

    let mut digital: IndexMap<String, Vec<usize>> = IndexMap::new();
    for (index, group) in effective_groups(ChannelKind::Digital, &state.digital)
        .into_iter()
        .enumerate()
    {
        if let Some(group) = group {
            digital.entry(group).or_default().push(index);
        }
    }
    for (key, channel_indices) in digital {
        charts.push(ChartPlan {
            kind: ChannelKind::Digital,
            key,
            channel_indices,
            computed_indices: Vec::new(),
            axis_count: 1,
        });
    }

    for (key, computed_indices) in standalone {
        let units = computed_indices
            .iter()
            .filter_map(|&i| state.computed.y_units.get(i))
            .map(String::as_str);
        charts.push(ChartPlan {
            kind: ChannelKind::Computed,
            axis_count: axis_count(units, max_axes_cap),
            key,
            channel_indices: Vec::new(),
            computed_indices,
        });
    }

    charts.retain(|plan| !plan.is_empty());
    let max_axes = charts
        .iter()
        .map(|plan| plan.axis_count)
        .max()
        .unwrap_or(1);
    LayoutPlan { charts, max_axes }
}

/// Units of a chart plan's members, in first-appearance order.
#[must_use]
pub fn plan_units(state: &ChannelState, plan: &ChartPlan) -> Vec<String> {
    let own = state.kind(plan.kind);
    let units = plan
        .channel_indices
        .iter()
        .filter_map(|&i| own.y_units.get(i))
        .chain(
            plan.computed_indices
                .iter()
                .filter_map(|&i| state.computed.y_units.get(i)),
        )
        .map(String::as_str);
    distinct_units(units)
}

#[cfg(test)]
mod tests {
    use super::{bucket_by_group, fill_auto_groups, plan_layout};
    use crate::core::{ChannelKind, ChannelRow, ChannelState, KindChannels};

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|value| (*value).to_owned()).collect()
    }

    #[test]
    fn auto_grouping_splits_on_unit_change() {
        let buckets = bucket_by_group(&strings(&["", "", "", ""]), &strings(&["V", "V", "A", "V"]));
        let keys: Vec<_> = buckets.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["G0", "G1", "G2"]);
        assert_eq!(buckets[0].channel_indices, vec![0, 1]);
        assert_eq!(buckets[2].channel_indices, vec![3]);
    }

    #[test]
    fn user_grouping_preserves_first_appearance_and_hides() {
        let buckets = bucket_by_group(
            &strings(&["G1", "G0", "-1", "G1", ""]),
            &strings(&["V", "V", "V", "A", "A"]),
        );
        let keys: Vec<_> = buckets.iter().map(|b| b.key.as_str()).collect();
        assert_eq!(keys, vec!["G1", "G0", "G2"]);
        assert_eq!(buckets[0].channel_indices, vec![0, 3]);
        assert_eq!(buckets[2].channel_indices, vec![4]);
    }

    #[test]
    fn fill_auto_groups_assigns_digital_default() {
        let mut state = ChannelState {
            analog: KindChannels::from_rows(
                ChannelKind::Analog,
                vec![ChannelRow::new("VA").with_unit("V"), ChannelRow::new("IA").with_unit("A")],
            )
            .expect("analog"),
            digital: KindChannels::from_rows(ChannelKind::Digital, vec![ChannelRow::new("TRIP")])
                .expect("digital"),
            ..ChannelState::default()
        };
        fill_auto_groups(&mut state);
        assert_eq!(state.analog.groups, vec!["G0", "G1"]);
        assert_eq!(state.digital.groups, vec!["digital"]);
    }

    #[test]
    fn computed_attaches_to_matching_analog_group() {
        let mut state = ChannelState::from_rows(
            vec![
                ChannelRow::new("VA").with_unit("V").with_group("G0"),
                ChannelRow::new("IA").with_unit("A").with_group("G1"),
            ],
            Vec::new(),
        )
        .expect("state");
        state
            .computed
            .push_row(ChannelRow::new("P").with_unit("W").with_group("G0").with_equation("a0*a1"))
            .expect("attached");
        state
            .computed
            .push_row(ChannelRow::new("Q").with_unit("var").with_group("G7").with_equation("a0"))
            .expect("standalone");

        let plan = plan_layout(&state, 2);
        let g0 = plan.find(ChannelKind::Analog, "G0").expect("G0");
        assert_eq!(g0.computed_indices, vec![0]);
        assert_eq!(g0.axis_count, 2);
        let standalone = plan.find(ChannelKind::Computed, "G7").expect("G7");
        assert_eq!(standalone.computed_indices, vec![1]);
        assert_eq!(plan.max_axes, 2);
    }

    #[test]
    fn largest_group_key_still_leaves_room_for_auto_groups() {
        let top = format!("G{}", usize::MAX);
        let state = ChannelState::from_rows(
            vec![
                ChannelRow::new("IA").with_unit("A").with_group(top.clone()),
                ChannelRow::new("IB").with_unit("A"),
            ],
            Vec::new(),
        )
        .expect("state");
        assert_eq!(state.analog.groups, vec![top.clone(), "G0".to_owned()]);

        let plan = plan_layout(&state, 1);
        assert!(plan.find(ChannelKind::Analog, &top).is_some());
        assert!(plan.find(ChannelKind::Analog, "G0").is_some());
    }
}
