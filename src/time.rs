//! Time arithmetic and ordering for virtual schedulers.
//!
//! A [`TimeDomain`] supplies everything the scheduler needs to know about
//! its time-value type: a total order, addition of a relative delta, a
//! conversion from real [`Duration`]s into the domain's relative unit, and a
//! wall-clock-like rendering for reporting. The scheduler itself never
//! inspects time values directly, so swapping the domain swaps the clock's
//! unit and ordering wholesale.

use chrono::{DateTime, Utc};
use std::cmp::Ordering;
use std::fmt;
use std::time::Duration;

/// Unit conversions and the total order over a scheduler's time values.
pub trait TimeDomain: 'static {
    /// Absolute virtual time (the clock's value type).
    type Absolute: Clone + fmt::Debug + 'static;
    /// Relative delta between two absolute times.
    type Relative: Clone + fmt::Debug + 'static;

    /// Total order over absolute times. All of the scheduler's ordering
    /// decisions go through this single comparator.
    fn compare(&self, a: &Self::Absolute, b: &Self::Absolute) -> Ordering;

    /// `time + delta`. A negative delta yields an earlier time; the
    /// scheduler rejects the results that would move its clock backward.
    fn add(&self, time: &Self::Absolute, delta: &Self::Relative) -> Self::Absolute;

    /// Convert a real duration into this domain's relative unit.
    fn to_relative(&self, duration: Duration) -> Self::Relative;

    /// Render an absolute time as a wall-clock-like value for reporting.
    fn to_wall(&self, time: &Self::Absolute) -> DateTime<Utc>;
}

/// The default domain: absolute time is `u64` milliseconds, deltas are
/// signed `i64` milliseconds. Absolute values are interpreted as
/// milliseconds since the Unix epoch when rendered for reporting.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MillisDomain;

impl TimeDomain for MillisDomain {
    type Absolute = u64;
    type Relative = i64;

    fn compare(&self, a: &u64, b: &u64) -> Ordering {
        a.cmp(b)
    }

    fn add(&self, time: &u64, delta: &i64) -> u64 {
        // Saturate at the u64 bounds; a saturated backward result still
        // fails the caller's comparator check.
        if *delta >= 0 {
            time.saturating_add(delta.unsigned_abs())
        } else {
            time.saturating_sub(delta.unsigned_abs())
        }
    }

    fn to_relative(&self, duration: Duration) -> i64 {
        i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
    }

    fn to_wall(&self, time: &u64) -> DateTime<Utc> {
        i64::try_from(*time)
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }
}
