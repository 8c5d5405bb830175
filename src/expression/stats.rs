use serde::{Deserialize, Serialize};

/// Summary statistics of an evaluated channel.
///
/// Every field is zero when no sample is valid.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelStats {
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    pub rms: f64,
    pub std_dev: f64,
    pub sum: f64,
    pub sum_squares: f64,
    pub valid_count: usize,
}

impl ChannelStats {
    /// Statistics over the finite entries of `values`.
    #[must_use]
    pub fn from_values(values: &[f64]) -> Self {
        Self::compute(values, |_, value| value.is_finite())
    }

    /// Statistics over the entries whose `valid` flag is set.
    #[must_use]
    pub fn from_masked(values: &[f64], valid: &[bool]) -> Self {
        Self::compute(values, |index, _| valid.get(index).copied().unwrap_or(false))
    }

    fn compute(values: &[f64], is_valid: impl Fn(usize, f64) -> bool) -> Self {
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut sum = 0.0;
        let mut sum_squares = 0.0;
        let mut valid_count = 0usize;
        for (index, &value) in values.iter().enumerate() {
            if !is_valid(index, value) {
                continue;
            }
            min = min.min(value);
            max = max.max(value);
            sum += value;
            sum_squares += value * value;
            valid_count += 1;
        }
        if valid_count == 0 {
            return Self::default();
        }

        let count = valid_count as f64;
        let mean = sum / count;
        let mut squared_deviation = 0.0;
        for (index, &value) in values.iter().enumerate() {
            if is_valid(index, value) {
                let deviation = value - mean;
                squared_deviation += deviation * deviation;
            }
        }

        Self {
            min,
            max,
            mean,
            rms: (sum_squares / count).sqrt(),
            std_dev: (squared_deviation / count).sqrt(),
            sum,
            sum_squares,
            valid_count,
        }
    }
}
