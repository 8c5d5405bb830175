//! Resolution of per-channel `start`/`duration` into an absolute x window.

use serde::{Deserialize, Serialize};

use crate::error::{ViewerError, ViewerResult};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub min: f64,
    pub max: f64,
}

impl TimeWindow {
    #[must_use]
    pub fn span(self) -> f64 {
        self.max - self.min
    }
}

/// Resolves a window over `time`.
///
/// Either bound may be a sample index or an absolute time. An integral value in
/// `0..time.len()` is read as an index and mapped with
/// `dt = (last - first) / (N - 1)`. The start is clamped to `[first, last]` and
/// the duration so that `start + duration <= last`.
pub fn resolve_time_window(
    start: Option<f64>,
    duration: Option<f64>,
    time: &[f64],
) -> ViewerResult<TimeWindow> {
    let (Some(&first), Some(&last)) = (time.first(), time.last()) else {
        return Err(ViewerError::MissingState(
            "no time array to resolve a window against".to_owned(),
        ));
    };
    if !first.is_finite() || !last.is_finite() {
        return Err(ViewerError::InvalidData(
            "time array bounds must be finite".to_owned(),
        ));
    }

    let count = time.len();
    let dt = if count > 1 {
        (last - first) / (count - 1) as f64
    } else {
        0.0
    };

    let start = match start.filter(|value| value.is_finite()) {
        Some(value) if is_sample_index(value, count) => first + value * dt,
        Some(value) => value,
        None => first,
    }
    .clamp(first.min(last), last.max(first));

    let duration = match duration.filter(|value| value.is_finite()) {
        Some(value) if is_sample_index(value, count) => value * dt,
        Some(value) => value.max(0.0),
        None => last - start,
    };
    let duration = duration.min(last - start).max(0.0);

    Ok(TimeWindow {
        min: start,
        max: start + duration,
    })
}

fn is_sample_index(value: f64, count: usize) -> bool {
    value >= 0.0 && value.fract() == 0.0 && value < count as f64
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::resolve_time_window;

    const TIME: [f64; 5] = [0.0, 0.25, 0.5, 0.75, 1.0];

    #[test]
    fn integral_values_map_through_sample_spacing() {
        let window = resolve_time_window(Some(1.0), Some(2.0), &TIME).expect("window");
        assert_relative_eq!(window.min, 0.25);
        assert_relative_eq!(window.max, 0.75);
    }

    #[test]
    fn fractional_values_are_absolute_times() {
        let window = resolve_time_window(Some(0.3), Some(0.2), &TIME).expect("window");
        assert_relative_eq!(window.min, 0.3);
        assert_relative_eq!(window.max, 0.5);
    }

    #[test]
    fn duration_is_clamped_to_last_sample() {
        let window = resolve_time_window(Some(0.6), Some(0.9), &TIME).expect("window");
        assert_relative_eq!(window.min, 0.6);
        assert_relative_eq!(window.max, 1.0);
    }

    #[test]
    fn start_outside_the_record_is_clamped() {
        let window = resolve_time_window(Some(-3.5), None, &TIME).expect("window");
        assert_relative_eq!(window.min, 0.0);
        assert_relative_eq!(window.max, 1.0);
    }

    #[test]
    fn missing_time_is_missing_state() {
        let error = resolve_time_window(Some(0.0), None, &[]).expect_err("no time");
        assert!(error.is_missing_state());
    }
}
