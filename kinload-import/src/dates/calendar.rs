//! Calendar arithmetic
//!
//! Every supported calendar reduces a (year, month, day) triple to a Julian
//! Day Number so dates from different calendars share one linear scale.
//! Years passed to the `*_to_jdn` functions are astronomical (1 B.C.E. = 0).
//!
//! Hebrew arithmetic follows the molad-based rules (19-year leap cycle,
//! postponements) in the fixed-day formulation; French Republican dates use
//! the arithmetic four-year rule.

use super::Calendar;

/// Julian Day Number of fixed day 0 (the day before 1 Jan 1 Gregorian)
const JDN_OF_FIXED_ZERO: i64 = 1_721_425;

/// Fixed day number of 1 Tishri AM 1
const HEBREW_EPOCH_FIXED: i64 = -1_373_427;

/// Julian Day Number of the day before 1 Vendémiaire an I, less one year
const FRENCH_JDN_OFFSET: i64 = 2_375_474;

pub const GREGORIAN_MONTHS: [&str; 12] = [
    "JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC",
];

/// Hebrew months in interchange-file order (starting at Tishri)
pub const HEBREW_MONTHS: [&str; 13] = [
    "TSH", "CSH", "KSL", "TVT", "SHV", "ADR", "ADS", "NSN", "IYR", "SVN", "TMZ", "AAV", "ELL",
];

pub const FRENCH_MONTHS: [&str; 13] = [
    "VEND", "BRUM", "FRIM", "NIVO", "PLUV", "VENT", "GERM", "FLOR", "PRAI", "MESS", "THER",
    "FRUC", "COMP",
];

/// Month names valid for a calendar
pub fn month_names(calendar: Calendar) -> &'static [&'static str] {
    match calendar {
        Calendar::Gregorian | Calendar::Julian => &GREGORIAN_MONTHS,
        Calendar::Hebrew => &HEBREW_MONTHS,
        Calendar::FrenchRepublican => &FRENCH_MONTHS,
    }
}

/// 1-based month number for a month name in the given calendar
pub fn month_from_name(calendar: Calendar, name: &str) -> Option<u8> {
    month_names(calendar)
        .iter()
        .position(|m| *m == name)
        .map(|i| i as u8 + 1)
}

pub fn month_name(calendar: Calendar, month: u8) -> Option<&'static str> {
    month_names(calendar).get(usize::from(month).checked_sub(1)?).copied()
}

pub fn is_gregorian_leap(year: i64) -> bool {
    (year % 4 == 0 && year % 100 != 0) || year % 400 == 0
}

pub fn is_julian_leap(year: i64) -> bool {
    year.rem_euclid(4) == 0
}

pub fn is_hebrew_leap(year: i64) -> bool {
    (7 * year + 1).rem_euclid(19) < 7
}

pub fn is_french_sextile(year: i64) -> bool {
    year.rem_euclid(4) == 3
}

/// Number of days in a month; `year` is astronomical, None means "any year"
pub fn days_in_month(calendar: Calendar, year: Option<i64>, month: u8) -> u8 {
    match calendar {
        Calendar::Gregorian | Calendar::Julian => match month {
            1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
            4 | 6 | 9 | 11 => 30,
            2 => {
                let leap = match (calendar, year) {
                    (_, None) => true,
                    (Calendar::Julian, Some(y)) => is_julian_leap(y),
                    (_, Some(y)) => is_gregorian_leap(y),
                };
                if leap {
                    29
                } else {
                    28
                }
            }
            _ => 0,
        },
        Calendar::Hebrew => match year {
            Some(y) => {
                if month == 7 && !is_hebrew_leap(y) {
                    // Adar II only exists in leap years
                    0
                } else {
                    hebrew_last_day_of_month(hebrew_arith_month(month), y) as u8
                }
            }
            None => 30,
        },
        Calendar::FrenchRepublican => match month {
            1..=12 => 30,
            13 => match year {
                Some(y) if !is_french_sextile(y) => 5,
                _ => 6,
            },
            _ => 0,
        },
    }
}

pub fn gregorian_to_jdn(year: i64, month: i64, day: i64) -> i64 {
    let a = (14 - month) / 12;
    let y = year + 4800 - a;
    let m = month + 12 * a - 3;
    day + (153 * m + 2) / 5 + 365 * y + y.div_euclid(4) - y.div_euclid(100) + y.div_euclid(400)
        - 32045
}

pub fn julian_to_jdn(year: i64, month: i64, day: i64) -> i64 {
    let a = (14 - month) / 12;
    let y = year + 4800 - a;
    let m = month + 12 * a - 3;
    day + (153 * m + 2) / 5 + 365 * y + y.div_euclid(4) - 32083
}

/// Interchange month index (Tishri = 1 … Elul = 13) to arithmetic month (Nisan = 1, Tishri = 7)
fn hebrew_arith_month(month: u8) -> i64 {
    let m = i64::from(month);
    if m <= 7 {
        m + 6
    } else {
        m - 7
    }
}

fn hebrew_elapsed_days(year: i64) -> i64 {
    let months_elapsed = (235 * year - 234).div_euclid(19);
    let parts_elapsed = 12084 + 13753 * months_elapsed;
    let days = 29 * months_elapsed + parts_elapsed.div_euclid(25920);
    if (3 * (days + 1)).rem_euclid(7) < 3 {
        days + 1
    } else {
        days
    }
}

fn hebrew_year_length_correction(year: i64) -> i64 {
    let ny0 = hebrew_elapsed_days(year - 1);
    let ny1 = hebrew_elapsed_days(year);
    let ny2 = hebrew_elapsed_days(year + 1);
    if ny2 - ny1 == 356 {
        2
    } else if ny1 - ny0 == 382 {
        1
    } else {
        0
    }
}

fn hebrew_new_year(year: i64) -> i64 {
    HEBREW_EPOCH_FIXED + hebrew_elapsed_days(year) + hebrew_year_length_correction(year)
}

fn days_in_hebrew_year(year: i64) -> i64 {
    hebrew_new_year(year + 1) - hebrew_new_year(year)
}

fn hebrew_last_month(year: i64) -> i64 {
    if is_hebrew_leap(year) {
        13
    } else {
        12
    }
}

fn hebrew_last_day_of_month(month: i64, year: i64) -> i64 {
    let year_length = days_in_hebrew_year(year);
    let long_marheshvan = year_length == 355 || year_length == 385;
    let short_kislev = year_length == 353 || year_length == 383;
    if matches!(month, 2 | 4 | 6 | 10 | 13)
        || (month == 12 && !is_hebrew_leap(year))
        || (month == 8 && !long_marheshvan)
        || (month == 9 && short_kislev)
    {
        29
    } else {
        30
    }
}

/// `month` uses interchange order (Tishri = 1)
pub fn hebrew_to_jdn(year: i64, month: u8, day: i64) -> i64 {
    let month = hebrew_arith_month(month);
    let mut fixed = hebrew_new_year(year) + day - 1;
    if month < 7 {
        for m in 7..=hebrew_last_month(year) {
            fixed += hebrew_last_day_of_month(m, year);
        }
        for m in 1..month {
            fixed += hebrew_last_day_of_month(m, year);
        }
    } else {
        for m in 7..month {
            fixed += hebrew_last_day_of_month(m, year);
        }
    }
    fixed + JDN_OF_FIXED_ZERO
}

pub fn french_to_jdn(year: i64, month: i64, day: i64) -> i64 {
    (year * 1461).div_euclid(4) + (month - 1) * 30 + day + FRENCH_JDN_OFFSET
}

/// Julian Day Number for a calendar date; `year` is astronomical
pub fn to_jdn(calendar: Calendar, year: i64, month: u8, day: u8) -> i64 {
    let (m, d) = (i64::from(month), i64::from(day));
    match calendar {
        Calendar::Gregorian => gregorian_to_jdn(year, m, d),
        Calendar::Julian => julian_to_jdn(year, m, d),
        Calendar::Hebrew => hebrew_to_jdn(year, month, d),
        Calendar::FrenchRepublican => french_to_jdn(year, m, d),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gregorian_reference_days() {
        assert_eq!(gregorian_to_jdn(2000, 1, 1), 2_451_545);
        assert_eq!(gregorian_to_jdn(1582, 10, 15), 2_299_161);
        assert_eq!(gregorian_to_jdn(1970, 1, 1), 2_440_588);
    }

    #[test]
    fn test_julian_reference_days() {
        // Day before the Gregorian reform
        assert_eq!(julian_to_jdn(1582, 10, 4), 2_299_160);
        assert_eq!(julian_to_jdn(2000, 1, 1), gregorian_to_jdn(2000, 1, 14));
        // Epoch of the Julian Day count: 1 Jan 4713 B.C.E. (astronomical -4712)
        assert_eq!(julian_to_jdn(-4712, 1, 1), 0);
    }

    #[test]
    fn test_hebrew_new_years() {
        // 1 Tishri 5784 = 16 Sep 2023, 1 Tishri 5785 = 3 Oct 2024
        assert_eq!(hebrew_to_jdn(5784, 1, 1), gregorian_to_jdn(2023, 9, 16));
        assert_eq!(hebrew_to_jdn(5785, 1, 1), gregorian_to_jdn(2024, 10, 3));
        // 15 Nisan 5784 (Passover) = 23 Apr 2024
        assert_eq!(hebrew_to_jdn(5784, 8, 15), gregorian_to_jdn(2024, 4, 23));
    }

    #[test]
    fn test_hebrew_year_lengths_are_valid() {
        for year in 5700..5800 {
            let len = days_in_hebrew_year(year);
            assert!(
                matches!(len, 353 | 354 | 355 | 383 | 384 | 385),
                "year {} has {} days",
                year,
                len
            );
            assert_eq!(len > 360, is_hebrew_leap(year));
        }
    }

    #[test]
    fn test_french_republican_epoch() {
        // 1 Vendémiaire an I = 22 Sep 1792; 18 Brumaire an VIII = 9 Nov 1799
        assert_eq!(french_to_jdn(1, 1, 1), gregorian_to_jdn(1792, 9, 22));
        assert_eq!(french_to_jdn(8, 2, 18), gregorian_to_jdn(1799, 11, 9));
    }

    #[test]
    fn test_days_in_month() {
        assert_eq!(days_in_month(Calendar::Gregorian, Some(1900), 2), 28);
        assert_eq!(days_in_month(Calendar::Julian, Some(1900), 2), 29);
        assert_eq!(days_in_month(Calendar::Gregorian, None, 2), 29);
        assert_eq!(days_in_month(Calendar::FrenchRepublican, Some(3), 13), 6);
        assert_eq!(days_in_month(Calendar::FrenchRepublican, Some(4), 13), 5);
        // 5784 is a leap year, 5785 is not
        assert_eq!(days_in_month(Calendar::Hebrew, Some(5784), 7), 29);
        assert_eq!(days_in_month(Calendar::Hebrew, Some(5785), 7), 0);
    }

    #[test]
    fn test_month_names() {
        assert_eq!(month_from_name(Calendar::Julian, "MAR"), Some(3));
        assert_eq!(month_from_name(Calendar::Hebrew, "NSN"), Some(8));
        assert_eq!(month_from_name(Calendar::Hebrew, "MAR"), None);
        assert_eq!(month_name(Calendar::FrenchRepublican, 13), Some("COMP"));
        assert_eq!(month_name(Calendar::Gregorian, 0), None);
    }
}
