use crate::models::BarInterval;
use chrono::{DateTime, Duration, Utc};
use std::sync::Mutex;

// --- Time Abstraction ---

pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually driven clock for tests and replays
#[derive(Debug)]
pub struct FixedClock {
    now: Mutex<DateTime<Utc>>,
}

impl FixedClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(|e| e.into_inner()) = now;
    }

    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += by;
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Distance from `now` to the next epoch-aligned `interval` boundary
///
/// Zero when `now` sits exactly on a boundary (millisecond precision).
pub fn time_to_boundary(now: DateTime<Utc>, interval: BarInterval) -> Duration {
    let period_ms = i64::from(interval.minutes()) * 60_000;
    let into_period = now.timestamp_millis().rem_euclid(period_ms);
    if into_period == 0 {
        Duration::zero()
    } else {
        Duration::milliseconds(period_ms - into_period)
    }
}

/// Next epoch-aligned boundary at or after `now`
pub fn next_aligned_boundary(now: DateTime<Utc>, interval: BarInterval) -> DateTime<Utc> {
    now + time_to_boundary(now, interval)
}

/// True when the interval closes within `threshold` of `now`
pub fn is_near_boundary(now: DateTime<Utc>, interval: BarInterval, threshold: Duration) -> bool {
    time_to_boundary(now, interval) <= threshold
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(h: u32, m: u32, s: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 1, h, m, s).unwrap()
    }

    #[test]
    fn test_next_boundary_five_minutes() {
        let five = BarInterval::from_minutes(5).unwrap();
        assert_eq!(next_aligned_boundary(at(10, 2, 30), five), at(10, 5, 0));
        assert_eq!(next_aligned_boundary(at(10, 4, 59), five), at(10, 5, 0));
        assert_eq!(time_to_boundary(at(10, 2, 30), five), Duration::seconds(150));
    }

    #[test]
    fn test_on_boundary_is_zero_distance() {
        let hour = BarInterval::from_minutes(60).unwrap();
        assert_eq!(time_to_boundary(at(11, 0, 0), hour), Duration::zero());
        assert_eq!(next_aligned_boundary(at(11, 0, 0), hour), at(11, 0, 0));
    }

    #[test]
    fn test_daily_boundary_aligns_to_midnight_utc() {
        let day = BarInterval::from_minutes(1440).unwrap();
        assert_eq!(
            next_aligned_boundary(at(18, 30, 0), day),
            Utc.with_ymd_and_hms(2024, 3, 2, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_near_boundary_threshold() {
        let five = BarInterval::from_minutes(5).unwrap();
        let threshold = Duration::seconds(60);

        assert!(is_near_boundary(at(10, 4, 0), five, threshold));
        assert!(is_near_boundary(at(10, 4, 30), five, threshold));
        assert!(!is_near_boundary(at(10, 3, 59), five, threshold));
        // Just after a boundary is far from the next one
        assert!(!is_near_boundary(at(10, 5, 1), five, threshold));
    }

    #[test]
    fn test_fixed_clock_moves_only_when_told() {
        let clock = FixedClock::new(at(9, 0, 0));
        assert_eq!(clock.now(), at(9, 0, 0));

        clock.advance(Duration::minutes(5));
        assert_eq!(clock.now(), at(9, 5, 0));

        clock.set(at(12, 0, 0));
        assert_eq!(clock.now(), at(12, 0, 0));
    }
}
