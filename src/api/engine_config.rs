use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ViewerError, ViewerResult};

/// Public engine bootstrap configuration.
///
/// This type is serializable so host applications can persist/load viewer
/// tuning without inventing their own ad-hoc format. Delays are tuned for an
/// interactive host and are expected to be re-tuned elsewhere.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ViewerConfig {
    #[serde(default = "default_group_debounce_ms")]
    pub group_debounce_ms: u64,
    #[serde(default = "default_delta_debounce_ms")]
    pub delta_debounce_ms: u64,
    #[serde(default = "default_scale_retry_ms")]
    pub scale_retry_ms: u64,
    #[serde(default = "default_redraw_log_threshold_ms")]
    pub redraw_log_threshold_ms: u64,
    #[serde(default = "default_slow_callback_ms")]
    pub slow_callback_ms: u64,
    /// Click tolerance as a fraction of the visible x range.
    #[serde(default = "default_cursor_snap_fraction")]
    pub cursor_snap_fraction: f64,
    #[serde(default = "default_expression_cache_capacity")]
    pub expression_cache_capacity: usize,
    /// Largest allowed growth in group count for a smart merge.
    #[serde(default = "default_smart_merge_max_growth")]
    pub smart_merge_max_growth: usize,
    /// Largest number of new charts the reuse strategy may create.
    #[serde(default = "default_reuse_max_created")]
    pub reuse_max_created: usize,
    #[serde(default = "default_max_axes")]
    pub max_axes: usize,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            group_debounce_ms: default_group_debounce_ms(),
            delta_debounce_ms: default_delta_debounce_ms(),
            scale_retry_ms: default_scale_retry_ms(),
            redraw_log_threshold_ms: default_redraw_log_threshold_ms(),
            slow_callback_ms: default_slow_callback_ms(),
            cursor_snap_fraction: default_cursor_snap_fraction(),
            expression_cache_capacity: default_expression_cache_capacity(),
            smart_merge_max_growth: default_smart_merge_max_growth(),
            reuse_max_created: default_reuse_max_created(),
            max_axes: default_max_axes(),
        }
    }
}

impl ViewerConfig {
    /// Sets the group-change debounce window.
    #[must_use]
    pub fn with_group_debounce_ms(mut self, ms: u64) -> Self {
        self.group_debounce_ms = ms;
        self
    }

    /// Sets the delta-table debounce window.
    #[must_use]
    pub fn with_delta_debounce_ms(mut self, ms: u64) -> Self {
        self.delta_debounce_ms = ms;
        self
    }

    #[must_use]
    pub fn with_cursor_snap_fraction(mut self, fraction: f64) -> Self {
        self.cursor_snap_fraction = fraction;
        self
    }

    #[must_use]
    pub fn with_smart_merge_max_growth(mut self, growth: usize) -> Self {
        self.smart_merge_max_growth = growth;
        self
    }

    #[must_use]
    pub fn group_debounce(self) -> Duration {
        Duration::from_millis(self.group_debounce_ms)
    }

    #[must_use]
    pub fn delta_debounce(self) -> Duration {
        Duration::from_millis(self.delta_debounce_ms)
    }

    #[must_use]
    pub fn scale_retry(self) -> Duration {
        Duration::from_millis(self.scale_retry_ms)
    }

    #[must_use]
    pub fn redraw_log_threshold(self) -> Duration {
        Duration::from_millis(self.redraw_log_threshold_ms)
    }

    #[must_use]
    pub fn slow_callback(self) -> Duration {
        Duration::from_millis(self.slow_callback_ms)
    }

    pub fn validate(self) -> ViewerResult<()> {
        if !self.cursor_snap_fraction.is_finite()
            || self.cursor_snap_fraction < 0.0
            || self.cursor_snap_fraction >= 0.5
        {
            return Err(ViewerError::InvalidData(format!(
                "cursor snap fraction must be in [0, 0.5), got {}",
                self.cursor_snap_fraction
            )));
        }
        if self.expression_cache_capacity == 0 {
            return Err(ViewerError::InvalidData(
                "expression cache capacity must be > 0".to_owned(),
            ));
        }
        if !(1..=2).contains(&self.max_axes) {
            return Err(ViewerError::InvalidData(format!(
                "max axes must be 1 or 2, got {}",
                self.max_axes
            )));
        }
        Ok(())
    }

    /// Serializes config to pretty JSON.
    pub fn to_json_pretty(self) -> ViewerResult<String> {
        serde_json::to_string_pretty(&self)
            .map_err(|e| ViewerError::Serialization(format!("failed to serialize config: {e}")))
    }

    /// Deserializes and validates config from JSON.
    pub fn from_json_str(input: &str) -> ViewerResult<Self> {
        let config: Self = serde_json::from_str(input)
            .map_err(|e| ViewerError::Serialization(format!("failed to parse config: {e}")))?;
        config.validate()?;
        Ok(config)
    }
}

fn default_group_debounce_ms() -> u64 {
    200
}

fn default_delta_debounce_ms() -> u64 {
    100
}

fn default_scale_retry_ms() -> u64 {
    50
}

fn default_redraw_log_threshold_ms() -> u64 {
    5
}

fn default_slow_callback_ms() -> u64 {
    20
}

fn default_cursor_snap_fraction() -> f64 {
    0.02
}

fn default_expression_cache_capacity() -> usize {
    256
}

fn default_smart_merge_max_growth() -> usize {
    1
}

fn default_reuse_max_created() -> usize {
    4
}

fn default_max_axes() -> usize {
    2
}
