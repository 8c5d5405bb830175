use std::collections::{BTreeMap, HashMap};
use std::fmt;

use indexmap::IndexMap;
use serde::Serialize;
use smallvec::SmallVec;

use crate::core::{ChannelKey, ChannelKind};
use crate::error::{ViewerError, ViewerResult};
use crate::render::ChartSurface;

/// Stable chart handle; never reused within one registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct InstanceId(u64);

impl InstanceId {
    /// Rebuilds an id previously obtained from [`InstanceId::raw`].
    #[must_use]
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    #[must_use]
    pub const fn raw(self) -> u64 {
        self.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "chart#{}", self.0)
    }
}

/// Channels rendered by one chart.
///
/// Own-kind series come first (`channel_indices`), attached computed series
/// follow (`computed_indices`). A standalone computed chart has only the latter.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Membership {
    pub channel_indices: Vec<usize>,
    pub computed_indices: Vec<usize>,
    pub computed_channel_ids: Vec<String>,
}

impl Membership {
    #[must_use]
    pub fn series_count(&self) -> usize {
        self.channel_indices.len() + self.computed_indices.len()
    }
}

/// Metadata view of one live chart.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartMeta {
    pub instance_id: InstanceId,
    pub group_id: String,
    pub kind: ChannelKind,
    pub channel_indices: Vec<usize>,
    pub colors: Vec<String>,
    pub analog_series_count: usize,
    pub computed_channel_ids: Vec<String>,
    pub computed_indices: Vec<usize>,
    pub axis_count: usize,
}

/// Registry record: metadata plus the owned chart surface.
pub struct ChartEntry {
    instance: InstanceId,
    group_id: String,
    kind: ChannelKind,
    membership: Membership,
    colors: Vec<String>,
    units: Vec<String>,
    axis_count: usize,
    surface: Box<dyn ChartSurface>,
}

impl fmt::Debug for ChartEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChartEntry")
            .field("instance", &self.instance)
            .field("group_id", &self.group_id)
            .field("kind", &self.kind)
            .field("membership", &self.membership)
            .field("container", &self.surface.container_id())
            .finish()
    }
}

impl ChartEntry {
    #[must_use]
    pub fn new(
        instance: InstanceId,
        group_id: impl Into<String>,
        kind: ChannelKind,
        membership: Membership,
        surface: Box<dyn ChartSurface>,
    ) -> Self {
        Self {
            instance,
            group_id: group_id.into(),
            kind,
            membership,
            colors: Vec::new(),
            units: Vec::new(),
            axis_count: 1,
            surface,
        }
    }

    #[must_use]
    pub fn with_colors(mut self, colors: Vec<String>) -> Self {
        self.colors = colors;
        self
    }

    #[must_use]
    pub fn with_axes(mut self, units: Vec<String>, axis_count: usize) -> Self {
        self.units = units;
        self.axis_count = axis_count;
        self
    }

    #[must_use]
    pub fn instance(&self) -> InstanceId {
        self.instance
    }

    #[must_use]
    pub fn group_id(&self) -> &str {
        &self.group_id
    }

    #[must_use]
    pub fn kind(&self) -> ChannelKind {
        self.kind
    }

    #[must_use]
    pub fn membership(&self) -> &Membership {
        &self.membership
    }

    #[must_use]
    pub fn colors(&self) -> &[String] {
        &self.colors
    }

    /// Distinct member units in series order.
    #[must_use]
    pub fn units(&self) -> &[String] {
        &self.units
    }

    #[must_use]
    pub fn axis_count(&self) -> usize {
        self.axis_count
    }

    #[must_use]
    pub fn surface(&self) -> &dyn ChartSurface {
        self.surface.as_ref()
    }

    pub fn surface_mut(&mut self) -> &mut dyn ChartSurface {
        self.surface.as_mut()
    }

    /// Channel keys in local series order.
    pub fn members(&self) -> impl Iterator<Item = ChannelKey> + '_ {
        let own_kind = self.kind;
        self.membership
            .channel_indices
            .iter()
            .map(move |&i| ChannelKey::new(own_kind, i))
            .chain(
                self.membership
                    .computed_indices
                    .iter()
                    .map(|&i| ChannelKey::new(ChannelKind::Computed, i)),
            )
    }

    /// Local series index of a member channel.
    #[must_use]
    pub fn local_index(&self, key: ChannelKey) -> Option<usize> {
        if key.kind == ChannelKind::Computed {
            if let Some(offset) = self
                .membership
                .computed_indices
                .iter()
                .position(|&i| i == key.position)
            {
                return Some(self.membership.channel_indices.len() + offset);
            }
            if self.kind != ChannelKind::Computed {
                return None;
            }
        }
        if key.kind != self.kind {
            return None;
        }
        self.membership
            .channel_indices
            .iter()
            .position(|&i| i == key.position)
    }

    pub fn set_color(&mut self, local: usize, color: &str) {
        if let Some(slot) = self.colors.get_mut(local) {
            color.clone_into(slot);
        }
    }

    #[must_use]
    pub fn meta(&self) -> ChartMeta {
        let analog_series_count = if self.kind == ChannelKind::Computed {
            0
        } else {
            self.membership.channel_indices.len()
        };
        ChartMeta {
            instance_id: self.instance,
            group_id: self.group_id.clone(),
            kind: self.kind,
            channel_indices: self.membership.channel_indices.clone(),
            colors: self.colors.clone(),
            analog_series_count,
            computed_channel_ids: self.membership.computed_channel_ids.clone(),
            computed_indices: self.membership.computed_indices.clone(),
            axis_count: self.axis_count,
        }
    }

    pub(crate) fn replace_surface(&mut self, surface: Box<dyn ChartSurface>) -> Box<dyn ChartSurface> {
        std::mem::replace(&mut self.surface, surface)
    }

    pub(crate) fn into_surface(self) -> Box<dyn ChartSurface> {
        self.surface
    }
}

/// Live charts in creation order plus the channel-to-chart reverse index.
///
/// The index is rebuilt on insert, remove and membership replacement only.
#[derive(Default)]
pub struct ChartRegistry {
    charts: IndexMap<InstanceId, ChartEntry>,
    reverse: HashMap<ChannelKey, SmallVec<[InstanceId; 2]>>,
    next_id: u64,
}

impl fmt::Debug for ChartRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChartRegistry")
            .field("charts", &self.charts.len())
            .field("indexed_keys", &self.reverse.len())
            .finish()
    }
}

impl ChartRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate_id(&mut self) -> InstanceId {
        self.next_id += 1;
        InstanceId(self.next_id)
    }

    pub fn insert(&mut self, entry: ChartEntry) -> ViewerResult<()> {
        let instance = entry.instance;
        if self.charts.contains_key(&instance) {
            return Err(ViewerError::chart(
                "register",
                format!("{instance} is already registered"),
            ));
        }
        self.charts.insert(instance, entry);
        self.rebuild_index();
        Ok(())
    }

    pub fn remove(&mut self, instance: InstanceId) -> Option<ChartEntry> {
        let entry = self.charts.shift_remove(&instance)?;
        self.rebuild_index();
        Some(entry)
    }

    /// Replaces a chart's members and rebuilds the reverse index.
    pub fn set_membership(
        &mut self,
        instance: InstanceId,
        membership: Membership,
        colors: Vec<String>,
    ) -> ViewerResult<()> {
        let entry = self.charts.get_mut(&instance).ok_or_else(|| {
            ViewerError::MissingState(format!("{instance} is not registered"))
        })?;
        entry.membership = membership;
        entry.colors = colors;
        self.rebuild_index();
        Ok(())
    }

    /// Re-keys a chart to another group (reuse by position). The surface keeps
    /// its container, and so does any later recreation of it.
    pub fn set_group(&mut self, instance: InstanceId, group_id: &str) -> ViewerResult<()> {
        let entry = self.charts.get_mut(&instance).ok_or_else(|| {
            ViewerError::MissingState(format!("{instance} is not registered"))
        })?;
        group_id.clone_into(&mut entry.group_id);
        Ok(())
    }

    pub fn set_axes(&mut self, instance: InstanceId, units: Vec<String>, axis_count: usize) {
        if let Some(entry) = self.charts.get_mut(&instance) {
            entry.units = units;
            entry.axis_count = axis_count;
        }
    }

    /// Moves charts so that `order` comes first, in that order.
    pub fn reorder(&mut self, order: &[InstanceId]) {
        let mut rank: HashMap<InstanceId, usize> = HashMap::with_capacity(order.len());
        for (position, instance) in order.iter().enumerate() {
            rank.entry(*instance).or_insert(position);
        }
        let fallback = order.len();
        self.charts.sort_by(|a, _, b, _| {
            let rank_a = rank.get(a).copied().unwrap_or(fallback);
            let rank_b = rank.get(b).copied().unwrap_or(fallback);
            rank_a.cmp(&rank_b)
        });
    }

    #[must_use]
    pub fn get(&self, instance: InstanceId) -> Option<&ChartEntry> {
        self.charts.get(&instance)
    }

    pub fn get_mut(&mut self, instance: InstanceId) -> Option<&mut ChartEntry> {
        self.charts.get_mut(&instance)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.charts.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.charts.is_empty()
    }

    #[must_use]
    pub fn ids(&self) -> Vec<InstanceId> {
        self.charts.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChartEntry> {
        self.charts.values()
    }

    #[must_use]
    pub fn ids_of(&self, kind: ChannelKind) -> Vec<InstanceId> {
        self.charts
            .values()
            .filter(|entry| entry.kind == kind)
            .map(|entry| entry.instance)
            .collect()
    }

    #[must_use]
    pub fn find_group(&self, kind: ChannelKind, group_id: &str) -> Option<InstanceId> {
        self.charts
            .values()
            .find(|entry| entry.kind == kind && entry.group_id == group_id)
            .map(|entry| entry.instance)
    }

    /// Charts containing the channel; O(1).
    #[must_use]
    pub fn charts_for(&self, key: ChannelKey) -> &[InstanceId] {
        self.reverse.get(&key).map_or(&[], |owners| owners.as_slice())
    }

    #[must_use]
    pub fn metas(&self) -> Vec<ChartMeta> {
        self.charts.values().map(ChartEntry::meta).collect()
    }

    /// Reverse index keyed by `"{kind}-{position}"`, sorted for comparison.
    #[must_use]
    pub fn reverse_index(&self) -> BTreeMap<String, Vec<InstanceId>> {
        self.reverse
            .iter()
            .map(|(key, owners)| (key.to_string(), owners.to_vec()))
            .collect()
    }

    /// Removes every chart, returning them in creation order.
    pub fn drain(&mut self) -> Vec<ChartEntry> {
        let drained = self.charts.drain(..).map(|(_, entry)| entry).collect();
        self.reverse.clear();
        drained
    }

    fn rebuild_index(&mut self) {
        self.reverse.clear();
        for entry in self.charts.values() {
            for key in entry.members() {
                self.reverse.entry(key).or_default().push(entry.instance);
            }
        }
    }
}
