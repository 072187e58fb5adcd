//! Cleaner working-hours slots.

use cb_common::{
    ids::{AvailabilitySlotId, CleanerId},
    time::TimestampMs,
};
use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The three slot shapes. Exactly one of (day_of_week, specific_date) is
/// populated per type, enforced by the constructors below (mirroring the
/// store's `check_schedule_type` constraint).
#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ScheduleType {
    Recurring,
    OneTime,
    Blocked,
}

/// A contiguous interval of a cleaner's working hours: recurring weekly,
/// date-specific, or a blocking window.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AvailabilitySlot {
    pub id: AvailabilitySlotId,
    pub cleaner_id: CleanerId,
    pub schedule_type: ScheduleType,
    /// 0 = Sunday .. 6 = Saturday. Populated iff `schedule_type` is
    /// `Recurring`.
    pub day_of_week: Option<u8>,
    /// Populated iff `schedule_type` is `OneTime` or `Blocked`.
    pub specific_date: Option<NaiveDate>,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub created_at: TimestampMs,
}

impl AvailabilitySlot {
    /// A weekly recurring working window.
    pub fn recurring(
        cleaner_id: CleanerId,
        day_of_week: u8,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Self, Error> {
        if day_of_week > 6 {
            return Err(Error::InvalidInput(format!(
                "day_of_week out of range: {day_of_week}"
            )));
        }
        Self::validate_times(start_time, end_time)?;
        Ok(Self {
            id: AvailabilitySlotId::generate(),
            cleaner_id,
            schedule_type: ScheduleType::Recurring,
            day_of_week: Some(day_of_week),
            specific_date: None,
            start_time,
            end_time,
            created_at: TimestampMs::now(),
        })
    }

    /// A date-specific working window.
    pub fn one_time(
        cleaner_id: CleanerId,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Self, Error> {
        Self::validate_times(start_time, end_time)?;
        Ok(Self {
            id: AvailabilitySlotId::generate(),
            cleaner_id,
            schedule_type: ScheduleType::OneTime,
            day_of_week: None,
            specific_date: Some(date),
            start_time,
            end_time,
            created_at: TimestampMs::now(),
        })
    }

    /// A date-specific blocking window (vacation, appointment).
    pub fn blocked(
        cleaner_id: CleanerId,
        date: NaiveDate,
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<Self, Error> {
        Self::validate_times(start_time, end_time)?;
        Ok(Self {
            id: AvailabilitySlotId::generate(),
            cleaner_id,
            schedule_type: ScheduleType::Blocked,
            day_of_week: None,
            specific_date: Some(date),
            start_time,
            end_time,
            created_at: TimestampMs::now(),
        })
    }

    fn validate_times(
        start_time: NaiveTime,
        end_time: NaiveTime,
    ) -> Result<(), Error> {
        if start_time >= end_time {
            return Err(Error::InvalidInput(
                "slot start_time must be before end_time".to_owned(),
            ));
        }
        Ok(())
    }

    /// Whether this slot covers the given instant.
    ///
    /// - `Recurring` slots cover matching weekdays within the time range.
    /// - `OneTime` and `Blocked` slots cover the matching date within the
    ///   time range.
    ///
    /// The instant's own timezone handling is the caller's concern; the
    /// engine schedules in UTC throughout.
    pub fn covers(&self, when: DateTime<Utc>) -> bool {
        let time = when.time();
        let in_window = self.start_time <= time && time < self.end_time;
        if !in_window {
            return false;
        }

        match self.schedule_type {
            ScheduleType::Recurring => {
                let dow = when.weekday().num_days_from_sunday() as u8;
                self.day_of_week == Some(dow)
            }
            ScheduleType::OneTime | ScheduleType::Blocked => {
                self.specific_date == Some(when.date_naive())
            }
        }
    }
}

#[cfg(test)]
mod test {
    use chrono::TimeZone;

    use super::*;

    fn t(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    #[test]
    fn constructors_enforce_shape() {
        let cleaner = CleanerId::generate();
        assert!(
            AvailabilitySlot::recurring(cleaner, 7, t(9, 0), t(13, 0))
                .is_err()
        );
        assert!(
            AvailabilitySlot::recurring(cleaner, 3, t(13, 0), t(9, 0))
                .is_err()
        );
        let slot =
            AvailabilitySlot::recurring(cleaner, 3, t(9, 0), t(13, 0))
                .unwrap();
        assert_eq!(slot.day_of_week, Some(3));
        assert_eq!(slot.specific_date, None);
    }

    #[test]
    fn recurring_covers_matching_weekday_and_window() {
        let cleaner = CleanerId::generate();
        // Wednesday = 3 days from Sunday.
        let slot =
            AvailabilitySlot::recurring(cleaner, 3, t(9, 0), t(13, 0))
                .unwrap();

        // 2026-08-05 is a Wednesday.
        let wed_10 = Utc.with_ymd_and_hms(2026, 8, 5, 10, 0, 0).unwrap();
        let wed_13 = Utc.with_ymd_and_hms(2026, 8, 5, 13, 0, 0).unwrap();
        let thu_10 = Utc.with_ymd_and_hms(2026, 8, 6, 10, 0, 0).unwrap();

        assert!(slot.covers(wed_10));
        // End bound is exclusive.
        assert!(!slot.covers(wed_13));
        assert!(!slot.covers(thu_10));
    }

    #[test]
    fn one_time_covers_only_its_date() {
        let cleaner = CleanerId::generate();
        let date = NaiveDate::from_ymd_opt(2026, 8, 5).unwrap();
        let slot =
            AvailabilitySlot::one_time(cleaner, date, t(9, 0), t(17, 0))
                .unwrap();

        let same_day = Utc.with_ymd_and_hms(2026, 8, 5, 9, 0, 0).unwrap();
        let next_day = Utc.with_ymd_and_hms(2026, 8, 6, 9, 0, 0).unwrap();
        assert!(slot.covers(same_day));
        assert!(!slot.covers(next_day));
    }
}
