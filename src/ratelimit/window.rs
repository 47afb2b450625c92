//! Window boundaries and previous-window weighting.

use std::time::Duration;

use crate::error::{Result, WardenError};

/// Where a point in time falls relative to the fixed window grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WindowPosition {
    /// Start of the window containing `now`, in epoch seconds
    pub current_start: u64,
    /// Start of the window before it, in epoch seconds
    pub previous_start: u64,
    /// Time since the current window started
    pub elapsed: Duration,
    /// Contribution of the previous window's count, in `[0, 1]`
    pub weight: f64,
}

impl WindowPosition {
    /// Locate `now` (time since the Unix epoch) on a grid of `window`-sized
    /// buckets. `window` must already be validated.
    pub fn at(now: Duration, window: Duration) -> Self {
        let size = window.as_secs().max(1);
        let current_start = now.as_secs() / size * size;
        let elapsed = now.saturating_sub(Duration::from_secs(current_start));

        Self {
            current_start,
            previous_start: current_start.saturating_sub(size),
            elapsed,
            weight: previous_weight(elapsed, window),
        }
    }
}

/// Weight of the previous window after `elapsed` time in the current one.
///
/// Decays linearly from 1 at the window start to 0 at its end and is
/// clamped to `[0, 1]` for any input, including elapsed times past the
/// window caused by clock skew.
pub fn previous_weight(elapsed: Duration, window: Duration) -> f64 {
    if window.is_zero() {
        return 0.0;
    }
    let weight = 1.0 - elapsed.as_secs_f64() / window.as_secs_f64();
    weight.clamp(0.0, 1.0)
}

/// Windows must be a whole number of seconds, at least one.
pub fn validate_window(window: Duration) -> Result<()> {
    if window < Duration::from_secs(1) || window.subsec_nanos() != 0 {
        return Err(WardenError::InvalidArgument(format!(
            "window size must be a whole number of seconds, got {:?}",
            window
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weight_at_window_start_is_one() {
        assert_eq!(previous_weight(Duration::ZERO, Duration::from_secs(60)), 1.0);
    }

    #[test]
    fn test_weight_decays_linearly() {
        let window = Duration::from_secs(1);
        let weight = previous_weight(Duration::from_millis(250), window);
        assert!((weight - 0.75).abs() < 1e-9);

        let weight = previous_weight(Duration::from_millis(900), window);
        assert!((weight - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_weight_clamped_past_window_end() {
        let window = Duration::from_secs(1);
        assert_eq!(previous_weight(Duration::from_secs(1), window), 0.0);
        assert_eq!(previous_weight(Duration::from_secs(30), window), 0.0);
        assert_eq!(previous_weight(Duration::from_secs(5), Duration::ZERO), 0.0);
    }

    #[test]
    fn test_weight_always_in_unit_interval() {
        let window = Duration::from_secs(7);
        for ms in (0..20_000).step_by(37) {
            let weight = previous_weight(Duration::from_millis(ms), window);
            assert!((0.0..=1.0).contains(&weight), "weight {} at {}ms", weight, ms);
        }
    }

    #[test]
    fn test_position_floors_to_window() {
        let position = WindowPosition::at(Duration::from_millis(125_250), Duration::from_secs(60));

        assert_eq!(position.current_start, 120);
        assert_eq!(position.previous_start, 60);
        assert_eq!(position.elapsed, Duration::from_millis(5_250));
        assert!((position.weight - (1.0 - 5.25 / 60.0)).abs() < 1e-9);
    }

    #[test]
    fn test_position_on_boundary() {
        let position = WindowPosition::at(Duration::from_secs(3), Duration::from_secs(1));

        assert_eq!(position.current_start, 3);
        assert_eq!(position.previous_start, 2);
        assert_eq!(position.elapsed, Duration::ZERO);
        assert_eq!(position.weight, 1.0);
    }

    #[test]
    fn test_position_near_epoch_has_no_underflow() {
        let position = WindowPosition::at(Duration::from_millis(500), Duration::from_secs(60));
        assert_eq!(position.current_start, 0);
        assert_eq!(position.previous_start, 0);
    }

    #[test]
    fn test_validate_window() {
        assert!(validate_window(Duration::from_secs(1)).is_ok());
        assert!(validate_window(Duration::from_secs(3600)).is_ok());
        assert!(validate_window(Duration::ZERO).is_err());
        assert!(validate_window(Duration::from_millis(500)).is_err());
        assert!(validate_window(Duration::from_millis(1500)).is_err());
    }
}
