use serde::{Deserialize, Serialize};

use crate::core::{ChannelKind, ChannelRow};
use crate::expression::ChannelStats;

/// Current layout of the split persistence records.
pub const STRUCTURE_VERSION: u32 = 2;

/// Persisted metadata of one computed channel, aligned by position with its values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputedChannelMeta {
    pub index: usize,
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub unit: String,
    #[serde(rename = "type", default = "computed_type")]
    pub channel_type: String,
    #[serde(default)]
    pub group: String,
    pub equation: String,
    pub color: String,
    #[serde(default)]
    pub stats: ChannelStats,
    #[serde(default)]
    pub sample_count: usize,
    /// Unix milliseconds.
    #[serde(default)]
    pub created_at: i64,
    #[serde(default = "default_made_from")]
    pub made_from: ChannelKind,
    #[serde(default = "unit_scale")]
    pub scaling_factor: f64,
}

fn computed_type() -> String {
    ChannelKind::Computed.as_str().to_owned()
}

const fn default_made_from() -> ChannelKind {
    ChannelKind::Analog
}

const fn unit_scale() -> f64 {
    1.0
}

impl ComputedChannelMeta {
    /// Channel-state row mirroring this record.
    #[must_use]
    pub fn to_row(&self) -> ChannelRow {
        ChannelRow::new(self.id.as_str())
            .with_label(self.name.as_str())
            .with_color(self.color.as_str())
            .with_unit(self.unit.as_str())
            .with_group(self.group.as_str())
            .with_scale(self.scaling_factor)
            .with_equation(self.equation.as_str())
    }
}

/// Metadata plus values, the in-memory unit of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct ComputedChannel {
    pub meta: ComputedChannelMeta,
    pub values: Vec<f64>,
}

impl ComputedChannel {
    #[must_use]
    pub fn id(&self) -> &str {
        &self.meta.id
    }
}

/// Bookkeeping stored next to the split arrays.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredMeta {
    pub saved_at: i64,
    pub channel_count: usize,
    pub structure_version: u32,
}

/// Single-array record written by older builds: metadata and values together.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LegacyComputedRecord {
    #[serde(flatten)]
    pub meta: ComputedChannelMeta,
    #[serde(default)]
    pub data: Vec<f64>,
}

impl From<LegacyComputedRecord> for ComputedChannel {
    fn from(record: LegacyComputedRecord) -> Self {
        let mut meta = record.meta;
        meta.sample_count = record.data.len();
        Self {
            meta,
            values: record.data,
        }
    }
}

/// A save request; absent optionals are resolved by the store.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ComputedSave {
    pub equation: String,
    pub values: Vec<f64>,
    pub stats: ChannelStats,
    pub scaling_factor: f64,
    pub color: Option<String>,
    pub group: Option<String>,
    pub unit: Option<String>,
    pub name: Option<String>,
    pub id: Option<String>,
    pub made_from: Option<ChannelKind>,
}

impl ComputedSave {
    #[must_use]
    pub fn new(equation: impl Into<String>, values: Vec<f64>) -> Self {
        let stats = ChannelStats::from_values(&values);
        Self {
            equation: equation.into(),
            values,
            stats,
            scaling_factor: 1.0,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_stats(mut self, stats: ChannelStats) -> Self {
        self.stats = stats;
        self
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = Some(unit.into());
        self
    }

    #[must_use]
    pub fn with_color(mut self, color: impl Into<String>) -> Self {
        self.color = Some(color.into());
        self
    }

    #[must_use]
    pub fn with_scaling(mut self, scaling_factor: f64) -> Self {
        self.scaling_factor = scaling_factor;
        self
    }

    #[must_use]
    pub fn made_from(mut self, kind: ChannelKind) -> Self {
        self.made_from = Some(kind);
        self
    }
}

/// Result of a save: the resolved identity and group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedChannel {
    pub id: String,
    pub group: String,
    pub index: usize,
    pub created: bool,
}

#[cfg(test)]
mod tests {
    use super::{ComputedChannel, ComputedChannelMeta, LegacyComputedRecord};
    use crate::core::ChannelKind;

    #[test]
    fn meta_serializes_with_camel_case_and_type_tag() {
        let json = r##"{"index":0,"id":"computed_0","name":"sum","equation":"a0+a1","color":"#3b82f6","sampleCount":3,"createdAt":5}"##;
        let meta: ComputedChannelMeta = serde_json::from_str(json).expect("meta");
        assert_eq!(meta.channel_type, "computed");
        assert_eq!(meta.made_from, ChannelKind::Analog);
        assert_eq!(meta.scaling_factor, 1.0);

        let value = serde_json::to_value(&meta).expect("value");
        assert_eq!(value["type"], "computed");
        assert_eq!(value["madeFrom"], "analog");
        assert_eq!(value["sampleCount"], 3);
    }

    #[test]
    fn legacy_record_keeps_values_alongside_metadata() {
        let json = r##"{"index":1,"id":"computed_1","name":"x","equation":"a0*2","color":"#10b981","data":[1.0,2.0]}"##;
        let record: LegacyComputedRecord = serde_json::from_str(json).expect("legacy");
        let channel = ComputedChannel::from(record);
        assert_eq!(channel.values, vec![1.0, 2.0]);
        assert_eq!(channel.meta.sample_count, 2);
        assert_eq!(channel.meta.to_row().y_label, "x");
    }
}
