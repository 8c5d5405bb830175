use chrono::Utc;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::core::{ChannelKind, validate_hex_color};
use crate::core::group::next_group_key;
use crate::error::{ViewerError, ViewerResult};
use crate::reactive::ChannelStore;

use super::bus::{BusMessage, MessageBus};
use super::model::{
    ComputedChannel, ComputedChannelMeta, ComputedSave, LegacyComputedRecord, STRUCTURE_VERSION,
    SavedChannel, StoredMeta,
};
use super::storage::{COMPUTED_CFG, COMPUTED_CHANNELS, COMPUTED_DATA, COMPUTED_META, KeyValueStorage};

/// Default series colors, assigned by channel position.
pub const COMPUTED_PALETTE: [&str; 5] = ["#3b82f6", "#10b981", "#f59300", "#ef4444", "#8b5cff"];

#[must_use]
pub fn palette_color(index: usize) -> &'static str {
    COMPUTED_PALETTE[index % COMPUTED_PALETTE.len()]
}

/// Where the last write ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PersistOutcome {
    /// Split arrays and bookkeeping were written.
    Full,
    /// Full write failed; only the touched record was appended to what is stored.
    SingleRecord,
    /// Nothing could be written; the channel lives in memory only.
    MemoryOnly,
}

/// Computed channels with split persistence and a reactive mirror.
///
/// Every write is persisted first, then mirrored into the `computed` sequences of
/// the live [`ChannelStore`], then broadcast to peer windows.
pub struct ComputedChannelStore {
    storage: Box<dyn KeyValueStorage>,
    live: ChannelStore,
    bus: MessageBus,
    channels: Vec<ComputedChannel>,
    legacy_pending: bool,
    last_persist: Option<PersistOutcome>,
}

impl std::fmt::Debug for ComputedChannelStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComputedChannelStore")
            .field("channels", &self.channels.len())
            .field("legacy_pending", &self.legacy_pending)
            .field("last_persist", &self.last_persist)
            .field("bus", &self.bus)
            .finish()
    }
}

impl ComputedChannelStore {
    /// Opens the store and loads whatever is persisted.
    pub fn open(storage: Box<dyn KeyValueStorage>, live: ChannelStore) -> Self {
        let mut store = Self {
            storage,
            live,
            bus: MessageBus::new(),
            channels: Vec::new(),
            legacy_pending: false,
            last_persist: None,
        };
        store.load();
        store
    }

    /// Reads the split keys, or the legacy combined key when they are absent.
    ///
    /// Unreadable records are logged and treated as empty.
    pub fn load(&mut self) -> usize {
        self.channels.clear();
        self.legacy_pending = false;
        if let Some(raw_cfg) = self.storage.get(COMPUTED_CFG) {
            let metas: Vec<ComputedChannelMeta> = match parse_record(COMPUTED_CFG, &raw_cfg) {
                Ok(metas) => metas,
                Err(error) => {
                    warn!(%error, "computed channel metadata unreadable");
                    return 0;
                }
            };
            let mut values: Vec<Vec<f64>> = match self.storage.get(COMPUTED_DATA) {
                Some(raw) => parse_record(COMPUTED_DATA, &raw).unwrap_or_else(|error| {
                    warn!(%error, "computed channel values unreadable");
                    Vec::new()
                }),
                None => Vec::new(),
            };
            values.resize(metas.len(), Vec::new());
            self.channels = metas
                .into_iter()
                .zip(values)
                .map(|(meta, values)| ComputedChannel { meta, values })
                .collect();
        } else if let Some(raw_legacy) = self.storage.get(COMPUTED_CHANNELS) {
            match parse_record::<Vec<LegacyComputedRecord>>(COMPUTED_CHANNELS, &raw_legacy) {
                Ok(records) => {
                    self.channels = records.into_iter().map(ComputedChannel::from).collect();
                    self.legacy_pending = true;
                    info!(channels = self.channels.len(), "legacy computed channels loaded");
                }
                Err(error) => warn!(%error, "legacy computed channels unreadable"),
            }
        }
        debug!(channels = self.channels.len(), "computed channels loaded");
        self.channels.len()
    }

    /// Drops the in-memory copy and reads storage again.
    pub fn reload(&mut self) -> usize {
        self.load()
    }

    pub fn clear_memory(&mut self) {
        self.channels.clear();
    }

    #[must_use]
    pub fn channels(&self) -> &[ComputedChannel] {
        &self.channels
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&ComputedChannel> {
        self.channels.iter().find(|channel| channel.id() == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    #[must_use]
    pub fn metas(&self) -> Vec<ComputedChannelMeta> {
        self.channels.iter().map(|channel| channel.meta.clone()).collect()
    }

    /// True while the data still sits in the legacy combined key.
    #[must_use]
    pub fn legacy_pending(&self) -> bool {
        self.legacy_pending
    }

    #[must_use]
    pub fn last_persist(&self) -> Option<PersistOutcome> {
        self.last_persist
    }

    #[must_use]
    pub fn live(&self) -> &ChannelStore {
        &self.live
    }

    #[must_use]
    pub fn bus(&self) -> &MessageBus {
        &self.bus
    }

    pub fn bus_mut(&mut self) -> &mut MessageBus {
        &mut self.bus
    }

    /// Saves a channel, updating in place when one matches by id, then name,
    /// then equation.
    pub fn save(&mut self, request: ComputedSave) -> ViewerResult<SavedChannel> {
        if request.equation.trim().is_empty() {
            return Err(ViewerError::InvalidData(
                "computed channel needs an equation".to_owned(),
            ));
        }
        if let Some(color) = request.color.as_deref() {
            validate_hex_color(color)?;
        }
        let position = self.find_match(&request);
        let created = position.is_none();
        let position = match position {
            Some(position) => {
                let group = requested_group(&request);
                let channel = &mut self.channels[position];
                merge_into(&mut channel.meta, &request, group);
                channel.values = request.values;
                position
            }
            None => {
                let group = match requested_group(&request) {
                    Some(group) => group,
                    None => self.next_group(),
                };
                let meta = self.new_meta(&request, group);
                self.channels.push(ComputedChannel {
                    meta,
                    values: request.values,
                });
                self.channels.len() - 1
            }
        };

        self.persist(position);
        let meta = self.channels[position].meta.clone();
        self.mirror(position)?;
        self.broadcast_updated()?;
        info!(id = %meta.id, group = %meta.group, created, "computed channel saved");
        Ok(SavedChannel {
            id: meta.id,
            group: meta.group,
            index: meta.index,
            created,
        })
    }

    /// Removes a channel from memory, storage, and the live state.
    pub fn delete(&mut self, id: &str) -> ViewerResult<bool> {
        let Some(position) = self.channels.iter().position(|channel| channel.id() == id) else {
            return Ok(false);
        };
        self.channels.remove(position);
        for channel in self.channels.iter_mut().skip(position) {
            channel.meta.index = channel.meta.index.saturating_sub(1);
        }
        self.last_persist = Some(match self.persist_all() {
            Ok(()) => PersistOutcome::Full,
            Err(error) => {
                warn!(%error, id, "computed channel removal not persisted");
                PersistOutcome::MemoryOnly
            }
        });
        if let Some(live_position) = self.live.position_of(ChannelKind::Computed, id) {
            self.live.remove_channel(ChannelKind::Computed, live_position)?;
        }
        self.bus.broadcast(&BusMessage::ComputedChannelDeleted { id: id.to_owned() })?;
        self.broadcast_updated()?;
        info!(id, "computed channel deleted");
        Ok(true)
    }

    /// Mirrors every stored channel into the live state; returns the count.
    pub fn sync_to_store(&mut self) -> ViewerResult<usize> {
        for position in 0..self.channels.len() {
            self.mirror(position)?;
        }
        Ok(self.channels.len())
    }

    fn find_match(&self, request: &ComputedSave) -> Option<usize> {
        let position_where = |pick: &dyn Fn(&ComputedChannelMeta) -> bool| {
            self.channels.iter().position(|channel| pick(&channel.meta))
        };
        if let Some(id) = request.id.as_deref() {
            if let Some(position) = position_where(&|meta| meta.id == id) {
                return Some(position);
            }
        }
        if let Some(name) = request.name.as_deref() {
            if let Some(position) = position_where(&|meta| meta.name == name) {
                return Some(position);
            }
        }
        position_where(&|meta| meta.equation == request.equation)
    }

    fn next_group(&self) -> String {
        let state = self.live.state();
        let live_groups = state.all_groups();
        next_group_key(
            self.channels
                .iter()
                .map(|channel| channel.meta.group.as_str())
                .chain(live_groups),
        )
    }

    fn next_id(&self) -> String {
        let next = self
            .channels
            .iter()
            .filter_map(|channel| channel.id().strip_prefix("computed_"))
            .filter_map(|suffix| suffix.parse::<usize>().ok())
            .filter_map(|index| index.checked_add(1))
            .max()
            .map_or(self.channels.len(), |next| next.max(self.channels.len()));
        format!("computed_{next}")
    }

    fn new_meta(&self, request: &ComputedSave, group: String) -> ComputedChannelMeta {
        let index = self.channels.len();
        let id = request.id.clone().unwrap_or_else(|| self.next_id());
        ComputedChannelMeta {
            index,
            name: request.name.clone().unwrap_or_else(|| id.clone()),
            id,
            unit: request.unit.clone().unwrap_or_default(),
            channel_type: ChannelKind::Computed.as_str().to_owned(),
            group,
            equation: request.equation.clone(),
            color: request
                .color
                .clone()
                .unwrap_or_else(|| palette_color(index).to_owned()),
            stats: request.stats,
            sample_count: request.values.len(),
            created_at: Utc::now().timestamp_millis(),
            made_from: request.made_from.unwrap_or(ChannelKind::Analog),
            scaling_factor: request.scaling_factor,
        }
    }

    fn persist(&mut self, position: usize) {
        let outcome = match self.persist_all() {
            Ok(()) => {
                if self.legacy_pending {
                    self.storage.remove(COMPUTED_CHANNELS);
                    self.legacy_pending = false;
                    info!("legacy computed channels migrated");
                }
                PersistOutcome::Full
            }
            Err(error) => {
                warn!(%error, "computed channels not persisted, appending single record");
                match self.persist_single(position) {
                    Ok(()) => PersistOutcome::SingleRecord,
                    Err(error) => {
                        warn!(%error, "computed channel kept in memory only");
                        PersistOutcome::MemoryOnly
                    }
                }
            }
        };
        self.last_persist = Some(outcome);
    }

    fn persist_all(&self) -> ViewerResult<()> {
        let metas = self.metas();
        let values: Vec<&[f64]> = self.channels.iter().map(|channel| channel.values.as_slice()).collect();
        self.storage.set(COMPUTED_CFG, &serde_json::to_string(&metas)?)?;
        self.storage.set(COMPUTED_DATA, &serde_json::to_string(&values)?)?;
        self.write_bookkeeping(metas.len())
    }

    fn persist_single(&self, position: usize) -> ViewerResult<()> {
        let channel = self.channels.get(position).ok_or_else(|| {
            ViewerError::MissingState(format!("no computed channel at position {position}"))
        })?;
        let mut metas: Vec<ComputedChannelMeta> = self
            .storage
            .get(COMPUTED_CFG)
            .map(|raw| parse_record(COMPUTED_CFG, &raw))
            .transpose()?
            .unwrap_or_default();
        let mut values: Vec<Vec<f64>> = self
            .storage
            .get(COMPUTED_DATA)
            .map(|raw| parse_record(COMPUTED_DATA, &raw))
            .transpose()?
            .unwrap_or_default();
        values.resize(metas.len(), Vec::new());
        match metas.iter().position(|meta| meta.id == channel.meta.id) {
            Some(stored) => {
                metas[stored] = channel.meta.clone();
                values[stored] = channel.values.clone();
            }
            None => {
                metas.push(channel.meta.clone());
                values.push(channel.values.clone());
            }
        }
        self.storage.set(COMPUTED_CFG, &serde_json::to_string(&metas)?)?;
        self.storage.set(COMPUTED_DATA, &serde_json::to_string(&values)?)?;
        self.write_bookkeeping(metas.len())
    }

    fn write_bookkeeping(&self, channel_count: usize) -> ViewerResult<()> {
        let meta = StoredMeta {
            saved_at: Utc::now().timestamp_millis(),
            channel_count,
            structure_version: STRUCTURE_VERSION,
        };
        self.storage.set(COMPUTED_META, &serde_json::to_string(&meta)?)
    }

    fn mirror(&self, position: usize) -> ViewerResult<()> {
        let channel = self.channels.get(position).ok_or_else(|| {
            ViewerError::MissingState(format!("no computed channel at position {position}"))
        })?;
        let row = channel.meta.to_row();
        match self.live.position_of(ChannelKind::Computed, channel.id()) {
            Some(live_position) => {
                self.live.update_channel(ChannelKind::Computed, live_position, &row)?;
                self.live
                    .set_channel_samples(ChannelKind::Computed, live_position, channel.values.clone())?;
            }
            None => {
                self.live
                    .push_channel(ChannelKind::Computed, row, channel.values.clone())?;
            }
        }
        Ok(())
    }

    fn broadcast_updated(&mut self) -> ViewerResult<()> {
        let message = BusMessage::ComputedChannelsUpdated {
            computed_channels: self.metas(),
        };
        self.bus.broadcast(&message)?;
        Ok(())
    }
}

fn requested_group(request: &ComputedSave) -> Option<String> {
    request
        .group
        .as_deref()
        .map(str::trim)
        .filter(|group| !group.is_empty())
        .map(str::to_owned)
}

fn merge_into(meta: &mut ComputedChannelMeta, request: &ComputedSave, group: Option<String>) {
    meta.equation.clone_from(&request.equation);
    meta.stats = request.stats;
    meta.sample_count = request.values.len();
    meta.scaling_factor = request.scaling_factor;
    if let Some(group) = group {
        meta.group = group;
    }
    if let Some(color) = &request.color {
        meta.color.clone_from(color);
    }
    if let Some(unit) = &request.unit {
        meta.unit.clone_from(unit);
    }
    if let Some(name) = &request.name {
        meta.name.clone_from(name);
    }
    if let Some(kind) = request.made_from {
        meta.made_from = kind;
    }
}

fn parse_record<T: DeserializeOwned>(key: &str, raw: &str) -> ViewerResult<T> {
    serde_json::from_str(raw).map_err(|error| ViewerError::Storage {
        key: key.to_owned(),
        message: error.to_string(),
    })
}
