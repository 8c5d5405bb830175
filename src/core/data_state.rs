use serde::{Deserialize, Serialize};

use super::ChannelKind;

/// Sample sequences per kind, aligned with channel positions.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DataState {
    #[serde(default)]
    pub time: Option<Vec<f64>>,
    #[serde(default)]
    pub analog: Vec<Vec<f64>>,
    #[serde(default)]
    pub digital: Vec<Vec<f64>>,
    #[serde(default)]
    pub computed: Vec<Vec<f64>>,
}

impl DataState {
    #[must_use]
    pub fn kind(&self, kind: ChannelKind) -> &[Vec<f64>] {
        match kind {
            ChannelKind::Analog => &self.analog,
            ChannelKind::Digital => &self.digital,
            ChannelKind::Computed => &self.computed,
        }
    }

    pub fn kind_mut(&mut self, kind: ChannelKind) -> &mut Vec<Vec<f64>> {
        match kind {
            ChannelKind::Analog => &mut self.analog,
            ChannelKind::Digital => &mut self.digital,
            ChannelKind::Computed => &mut self.computed,
        }
    }

    #[must_use]
    pub fn channel(&self, kind: ChannelKind, position: usize) -> Option<&[f64]> {
        self.kind(kind).get(position).map(Vec::as_slice)
    }

    /// Common sample count: the time length when present, else the longest channel.
    #[must_use]
    pub fn sample_count(&self) -> usize {
        if let Some(time) = &self.time {
            return time.len();
        }
        ChannelKind::ALL
            .into_iter()
            .flat_map(|kind| self.kind(kind).iter().map(Vec::len))
            .max()
            .unwrap_or(0)
    }

    #[must_use]
    pub fn time(&self) -> Option<&[f64]> {
        self.time.as_deref().filter(|time| !time.is_empty())
    }

    /// First and last time value.
    #[must_use]
    pub fn time_bounds(&self) -> Option<(f64, f64)> {
        let time = self.time()?;
        Some((*time.first()?, *time.last()?))
    }

    /// X values for charts: the time sequence, or sample indices when absent.
    #[must_use]
    pub fn x_values(&self) -> Vec<f64> {
        match self.time() {
            Some(time) => time.to_vec(),
            None => (0..self.sample_count()).map(|i| i as f64).collect(),
        }
    }
}
