//! Reference-day arithmetic.
//!
//! Quotas reset at midnight in a fixed reference timezone. The offset is a
//! plain `FixedOffset`: daylight saving is NOT applied, so with the default
//! UTC-4 the boundary is one hour off for US Eastern during standard time.
//! All day computations go through this type so that limitation stays in one
//! place.

use chrono::{DateTime, Days, FixedOffset, NaiveDate, NaiveTime, Utc};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceCalendar {
    offset: FixedOffset,
}

impl ReferenceCalendar {
    pub fn new(offset: FixedOffset) -> Self {
        Self { offset }
    }

    /// Returns `None` when the offset is outside ±23 hours.
    pub fn from_offset_hours(hours: i32) -> Option<Self> {
        hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
            .map(Self::new)
    }

    /// Calendar day at `now` in the reference timezone.
    pub fn current_reference_day(&self, now: DateTime<Utc>) -> NaiveDate {
        now.with_timezone(&self.offset).date_naive()
    }

    /// First reference-timezone midnight strictly after `now`, as UTC.
    pub fn next_midnight_after(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        let tomorrow = self.current_reference_day(now) + Days::new(1);
        let local_midnight = tomorrow.and_time(NaiveTime::MIN).and_utc();

        local_midnight - chrono::Duration::seconds(i64::from(self.offset.local_minus_utc()))
    }
}
