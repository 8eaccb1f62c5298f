//! Business-date resolution.
//!
//! A business day may not match the calendar day: a restaurant that closes at
//! 02:00 still books those sales on the previous day. The calendar shifts the
//! local time back by the rollover hour before taking the date.

use chrono::{Duration, FixedOffset, NaiveDate};

use tablepos_core::{Clock, DomainError, DomainResult};

/// Maps "now" to the current business date.
pub trait BusinessCalendar: Send + Sync {
    fn business_date(&self) -> NaiveDate;
}

impl<B> BusinessCalendar for std::sync::Arc<B>
where
    B: BusinessCalendar + ?Sized,
{
    fn business_date(&self) -> NaiveDate {
        (**self).business_date()
    }
}

/// Calendar with a fixed UTC offset and a daily rollover hour.
#[derive(Debug, Clone)]
pub struct RolloverCalendar<C> {
    clock: C,
    offset: FixedOffset,
    rollover: Duration,
}

impl<C: Clock> RolloverCalendar<C> {
    /// `utc_offset_minutes` is the store's local offset, `rollover_hour` the
    /// local hour (0..=23) at which a new business day starts.
    pub fn new(clock: C, utc_offset_minutes: i32, rollover_hour: u32) -> DomainResult<Self> {
        if rollover_hour > 23 {
            return Err(DomainError::validation(format!(
                "rollover hour must be within 0..=23, got {rollover_hour}"
            )));
        }
        let offset = FixedOffset::east_opt(utc_offset_minutes.saturating_mul(60)).ok_or_else(|| {
            DomainError::validation(format!("invalid utc offset: {utc_offset_minutes} minutes"))
        })?;

        Ok(Self {
            clock,
            offset,
            rollover: Duration::hours(i64::from(rollover_hour)),
        })
    }
}

impl<C: Clock> BusinessCalendar for RolloverCalendar<C> {
    fn business_date(&self) -> NaiveDate {
        let local = self.clock.now().with_timezone(&self.offset);
        (local - self.rollover).date_naive()
    }
}

/// Calendar pinned to one date.
#[derive(Debug, Clone, Copy)]
pub struct FixedCalendar(pub NaiveDate);

impl BusinessCalendar for FixedCalendar {
    fn business_date(&self) -> NaiveDate {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use std::sync::Arc;
    use tablepos_core::ManualClock;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn hours_before_rollover_belong_to_previous_day() {
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 22, 2, 59, 59).unwrap(),
        ));
        let calendar = RolloverCalendar::new(clock.clone(), 0, 3).unwrap();
        assert_eq!(calendar.business_date(), date(2024, 5, 21));

        clock.set(Utc.with_ymd_and_hms(2024, 5, 22, 3, 0, 0).unwrap());
        assert_eq!(calendar.business_date(), date(2024, 5, 22));
    }

    #[test]
    fn offset_is_applied_before_rollover() {
        // 17:30 UTC is 01:30 the next day at UTC+8.
        let clock = Arc::new(ManualClock::new(
            Utc.with_ymd_and_hms(2024, 5, 21, 17, 30, 0).unwrap(),
        ));
        let midnight = RolloverCalendar::new(clock.clone(), 8 * 60, 0).unwrap();
        assert_eq!(midnight.business_date(), date(2024, 5, 22));

        let late_close = RolloverCalendar::new(clock, 8 * 60, 3).unwrap();
        assert_eq!(late_close.business_date(), date(2024, 5, 21));
    }

    #[test]
    fn rejects_out_of_range_settings() {
        let clock = Arc::new(ManualClock::new(Utc::now()));
        assert!(RolloverCalendar::new(clock.clone(), 0, 24).is_err());
        assert!(RolloverCalendar::new(clock, 24 * 60, 0).is_err());
    }
}
