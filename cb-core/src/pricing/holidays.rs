//! The Romanian public holiday calendar.
//!
//! Fixed-rule dates plus the Orthodox movable feasts. Orthodox Easter is
//! computed with the Meeus/Jones/Butcher algorithm for the Julian
//! calendar, then shifted +13 days to the Gregorian calendar (exact for
//! 1900 through 2099, which comfortably covers the scheduling horizon).

use chrono::{Datelike, Days, NaiveDate};

/// Orthodox Easter Sunday in the Gregorian calendar.
pub fn orthodox_easter(year: i32) -> NaiveDate {
    let a = year % 4;
    let b = year % 7;
    let c = year % 19;
    let d = (19 * c + 15) % 30;
    let e = (2 * a + 4 * b - d + 34) % 7;
    let month = (d + e + 114) / 31;
    let day = (d + e + 114) % 31 + 1;

    let julian = NaiveDate::from_ymd_opt(year, month as u32, day as u32)
        .expect("The algorithm only yields valid dates");

    // Julian -> Gregorian shift for 1900-03-14 .. 2100-02-28.
    julian + Days::new(13)
}

/// Whether `date` is a Romanian public holiday.
pub fn is_public_holiday(date: NaiveDate) -> bool {
    // Fixed-rule dates.
    let fixed = matches!(
        (date.month(), date.day()),
        (1, 1)      // New Year's Day
        | (1, 2)    // Day after New Year
        | (1, 24)   // Unification Day
        | (5, 1)    // Labour Day
        | (6, 1)    // Children's Day
        | (8, 15)   // Assumption of Mary
        | (11, 30)  // St. Andrew's Day
        | (12, 1)   // National Day
        | (12, 25)  // Christmas Day
        | (12, 26)  // Second day of Christmas
    );
    if fixed {
        return true;
    }

    // Movable feasts anchored on Orthodox Easter: Good Friday, Easter
    // Sunday and Monday, Pentecost Sunday and Monday.
    let easter = orthodox_easter(date.year());
    [
        easter - Days::new(2),
        easter,
        easter + Days::new(1),
        easter + Days::new(49),
        easter + Days::new(50),
    ]
    .contains(&date)
}

#[cfg(test)]
mod test {
    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn orthodox_easter_known_dates() {
        assert_eq!(orthodox_easter(2023), ymd(2023, 4, 16));
        assert_eq!(orthodox_easter(2024), ymd(2024, 5, 5));
        assert_eq!(orthodox_easter(2025), ymd(2025, 4, 20));
        assert_eq!(orthodox_easter(2026), ymd(2026, 4, 12));
        assert_eq!(orthodox_easter(2027), ymd(2027, 5, 2));
    }

    #[test]
    fn fixed_holidays() {
        assert!(is_public_holiday(ymd(2026, 1, 1)));
        assert!(is_public_holiday(ymd(2026, 1, 24)));
        assert!(is_public_holiday(ymd(2026, 5, 1)));
        assert!(is_public_holiday(ymd(2026, 6, 1)));
        assert!(is_public_holiday(ymd(2026, 8, 15)));
        assert!(is_public_holiday(ymd(2026, 11, 30)));
        assert!(is_public_holiday(ymd(2026, 12, 1)));
        assert!(is_public_holiday(ymd(2026, 12, 25)));
        assert!(is_public_holiday(ymd(2026, 12, 26)));

        assert!(!is_public_holiday(ymd(2026, 3, 17)));
        assert!(!is_public_holiday(ymd(2026, 12, 27)));
    }

    #[test]
    fn movable_feasts_2026() {
        // Easter 2026-04-12.
        assert!(is_public_holiday(ymd(2026, 4, 10))); // Good Friday
        assert!(is_public_holiday(ymd(2026, 4, 12))); // Easter Sunday
        assert!(is_public_holiday(ymd(2026, 4, 13))); // Easter Monday
        assert!(is_public_holiday(ymd(2026, 5, 31))); // Pentecost
        assert!(is_public_holiday(ymd(2026, 6, 1))); // Pentecost Monday
        assert!(!is_public_holiday(ymd(2026, 4, 14)));
    }
}
