//! Calendar-aware date normalization
//!
//! Free-form date values are parsed into a [`StructuredDate`] (see
//! [`parse_date`] for the order in which cues are applied) and can be reduced
//! to a Julian Day Number so dates in different calendars compare on one
//! scale.
//!
//! Equality of structured dates is structural: calendar, modifier and every
//! present field must match. Chronological comparison goes through
//! [`StructuredDate::chronological_cmp`]; values without a knowable ordinal
//! sort after every value that has one.

pub mod calendar;
mod parse;

pub use parse::parse_date;

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;
use thiserror::Error;

/// Calendar system a date is expressed in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Calendar {
    Gregorian,
    Julian,
    Hebrew,
    FrenchRepublican,
}

impl Calendar {
    /// In-line calendar escape
    pub fn escape(self) -> &'static str {
        match self {
            Calendar::Gregorian => "@#DGREGORIAN@",
            Calendar::Julian => "@#DJULIAN@",
            Calendar::Hebrew => "@#DHEBREW@",
            Calendar::FrenchRepublican => "@#DFRENCH R@",
        }
    }

    /// Parse an upper-cased escape; the French escape may use `_` for its inner space
    pub fn from_escape(escape: &str) -> Option<Self> {
        match escape {
            "@#DGREGORIAN@" => Some(Calendar::Gregorian),
            "@#DJULIAN@" => Some(Calendar::Julian),
            "@#DHEBREW@" => Some(Calendar::Hebrew),
            "@#DFRENCH R@" | "@#DFRENCH_R@" => Some(Calendar::FrenchRepublican),
            _ => None,
        }
    }

    /// Whether B.C.E. years and seasons are meaningful
    fn is_civil(self) -> bool {
        matches!(self, Calendar::Gregorian | Calendar::Julian)
    }
}

/// Qualifier applied to a date
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DateModifier {
    Exact,
    About,
    Before,
    After,
    /// `BET x AND y`; the end lives in `range_end`
    Between,
    Calculated,
    Estimated,
    From,
    To,
    /// `FROM x TO y`; the end lives in `range_end`
    Period,
    /// `INT x (phrase)`
    Interpreted,
}

impl DateModifier {
    fn keyword(self) -> Option<&'static str> {
        match self {
            DateModifier::Exact | DateModifier::Between | DateModifier::Period => None,
            DateModifier::About => Some("ABT"),
            DateModifier::Before => Some("BEF"),
            DateModifier::After => Some("AFT"),
            DateModifier::Calculated => Some("CAL"),
            DateModifier::Estimated => Some("EST"),
            DateModifier::From => Some("FROM"),
            DateModifier::To => Some("TO"),
            DateModifier::Interpreted => Some("INT"),
        }
    }

    pub fn is_range(self) -> bool {
        matches!(self, DateModifier::Between | DateModifier::Period)
    }
}

/// Season keywords usable in place of a month; stored as their first month
pub(crate) const SEASONS: [(&str, u8); 4] =
    [("SPRING", 3), ("SUMMER", 6), ("AUTUMN", 9), ("WINTER", 12)];

/// Parsed date value
///
/// Fields finer than the source supplied stay `None`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StructuredDate {
    pub calendar: Calendar,
    /// Calendar year as written (always positive; see `is_bce`)
    pub year: Option<i32>,
    pub month: Option<u8>,
    pub day: Option<u8>,
    pub modifier: DateModifier,
    pub range_end: Option<Box<StructuredDate>>,
    pub is_bce: bool,
    pub is_season: bool,
    pub phrase: Option<String>,
}

impl StructuredDate {
    /// Exact date with the given parts
    pub fn new(calendar: Calendar, year: Option<i32>, month: Option<u8>, day: Option<u8>) -> Self {
        Self {
            calendar,
            year,
            month,
            day,
            modifier: DateModifier::Exact,
            range_end: None,
            is_bce: false,
            is_season: false,
            phrase: None,
        }
    }

    /// Year on the astronomical scale (1 B.C.E. = 0)
    fn astronomical_year(&self) -> Option<i64> {
        let year = i64::from(self.year?);
        Some(if self.is_bce { 1 - year } else { year })
    }

    /// Julian Day Number of the first day this date names
    ///
    /// Partial dates reduce to the start of their period; ranges to their
    /// start. None when the year is unknown.
    pub fn ordinal(&self) -> Option<i64> {
        let year = self.astronomical_year()?;
        let month = self.month.unwrap_or(1);
        let day = self.day.unwrap_or(1);
        Some(calendar::to_jdn(self.calendar, year, month, day))
    }

    /// Julian Day Number of a range's end (the start for non-range dates)
    pub fn end_ordinal(&self) -> Option<i64> {
        match &self.range_end {
            Some(end) => end.ordinal(),
            None => self.ordinal(),
        }
    }

    /// Order by ordinal; unknown ordinals sort last
    pub fn chronological_cmp(&self, other: &StructuredDate) -> Ordering {
        compare_ordinals(self.ordinal(), other.ordinal())
    }

    /// Same day on the shared scale, regardless of calendar or qualifiers
    pub fn chronologically_equal(&self, other: &StructuredDate) -> bool {
        match (self.ordinal(), other.ordinal()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    fn write_simple(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts: Vec<String> = Vec::new();
        if let Some(day) = self.day {
            parts.push(day.to_string());
        }
        if let Some(month) = self.month {
            let name = if self.is_season {
                SEASONS
                    .iter()
                    .find(|(_, m)| *m == month)
                    .map(|(name, _)| *name)
            } else {
                calendar::month_name(self.calendar, month)
            };
            parts.push(name.unwrap_or("?").to_string());
        }
        if let Some(year) = self.year {
            parts.push(year.to_string());
        }
        if self.is_bce {
            parts.push("B.C.".to_string());
        }
        f.write_str(&parts.join(" "))
    }
}

fn compare_ordinals(a: Option<i64>, b: Option<i64>) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => x.cmp(&y),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

/// Canonical interchange text; `parse_date(&d.to_string()) == Ok(d)`
impl fmt::Display for StructuredDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.calendar != Calendar::Gregorian {
            write!(f, "{} ", self.calendar.escape())?;
        }

        let (open, close) = match self.modifier {
            DateModifier::Between => (Some("BET"), Some("AND")),
            DateModifier::Period => (Some("FROM"), Some("TO")),
            other => (other.keyword(), None),
        };

        if let Some(keyword) = open {
            write!(f, "{} ", keyword)?;
        }
        self.write_simple(f)?;

        if let (Some(keyword), Some(end)) = (close, &self.range_end) {
            write!(f, " {} ", keyword)?;
            if end.calendar != self.calendar {
                write!(f, "{} ", end.calendar.escape())?;
            }
            end.write_simple(f)?;
        }

        if let Some(phrase) = &self.phrase {
            write!(f, " ({})", phrase)?;
        }
        Ok(())
    }
}

/// Why a date value could not be parsed
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("empty date")]
    Empty,

    #[error("date phrase without a date: {0:?}")]
    PhraseOnly(String),

    #[error("unsupported calendar escape {0}")]
    UnknownCalendar(String),

    #[error("unrecognized date token {0:?}")]
    UnrecognizedToken(String),

    #[error("range is missing its second date")]
    MissingRangeEnd,

    #[error("day {day} out of range for month {month}")]
    DayOutOfRange { day: u8, month: u8 },

    #[error("year {0} out of range")]
    YearOutOfRange(i64),

    #[error("month {month} does not exist in year {year}")]
    MonthNotInYear { month: String, year: i32 },

    #[error("{0} is only valid in the Gregorian or Julian calendar")]
    NotCivilCalendar(&'static str),
}

/// A date-bearing field after normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DateValue {
    Parsed(StructuredDate),
    /// Raw text kept when parsing fails
    Unparseable(String),
}

impl DateValue {
    pub fn parse(raw: &str) -> Self {
        match parse_date(raw) {
            Ok(date) => DateValue::Parsed(date),
            Err(_) => DateValue::Unparseable(raw.trim().to_owned()),
        }
    }

    pub fn ordinal(&self) -> Option<i64> {
        match self {
            DateValue::Parsed(date) => date.ordinal(),
            DateValue::Unparseable(_) => None,
        }
    }

    /// Order by ordinal; unparseable values sort after all parseable ones
    pub fn chronological_cmp(&self, other: &DateValue) -> Ordering {
        compare_ordinals(self.ordinal(), other.ordinal())
    }

    /// Text for the destination column (canonical form when parsed)
    pub fn display_text(&self) -> String {
        match self {
            DateValue::Parsed(date) => date.to_string(),
            DateValue::Unparseable(raw) => raw.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parsed(s: &str) -> StructuredDate {
        parse_date(s).unwrap_or_else(|e| panic!("{:?} failed: {}", s, e))
    }

    #[test]
    fn test_round_trip_for_each_calendar_and_modifier() {
        let samples = [
            "15 MAR 1990",
            "MAR 1990",
            "1990",
            "ABT 1850",
            "BEF 2 FEB 1901",
            "AFT 1700",
            "CAL 1820",
            "EST 1799",
            "BET 1 JAN 1991 AND 1 FEB 1991",
            "FROM 1901",
            "TO 1902",
            "FROM 1 JAN 1901 TO 31 DEC 1905",
            "INT 12 JUN 1850 (twelfth of June)",
            "44 B.C.",
            "15 MAR 44 B.C.",
            "SPRING 1850",
            "ABT WINTER 1777",
            "@#DJULIAN@ 11 FEB 1731",
            "@#DJULIAN@ BET 1700 AND @#DGREGORIAN@ 1750",
            "@#DHEBREW@ 15 NSN 5784",
            "@#DHEBREW@ ADS 5784",
            "@#DFRENCH R@ 18 BRUM 8",
            "@#DFRENCH R@ ABT COMP 3",
        ];
        for sample in samples {
            let date = parsed(sample);
            assert_eq!(date.to_string(), sample, "canonical form of {:?}", sample);
            assert_eq!(parsed(&date.to_string()), date, "round trip of {:?}", sample);
        }
    }

    #[test]
    fn test_ordering_matches_calendar_arithmetic() {
        let a = parsed("15 MAR 1990");
        let b = parsed("1 APR 1990");
        let c = parsed("BET 1 JAN 1991 AND 1 FEB 1991");
        assert_eq!(a.chronological_cmp(&b), Ordering::Less);
        assert_eq!(b.chronological_cmp(&c), Ordering::Less);
        assert_eq!(a.chronological_cmp(&c), Ordering::Less);
        assert_eq!(b.ordinal().unwrap() - a.ordinal().unwrap(), 17);
    }

    #[test]
    fn test_cross_calendar_equality() {
        let julian = parsed("@#DJULIAN@ 1 JAN 2000");
        let gregorian = parsed("14 JAN 2000");
        assert_ne!(julian, gregorian);
        assert!(julian.chronologically_equal(&gregorian));
        assert_eq!(julian.chronological_cmp(&gregorian), Ordering::Equal);

        let revolution = parsed("@#DFRENCH R@ 1 VEND 1");
        assert!(revolution.chronologically_equal(&parsed("22 SEP 1792")));
    }

    #[test]
    fn test_equality_requires_same_modifier() {
        let exact = parsed("1900");
        let about = parsed("ABT 1900");
        assert_ne!(exact, about);
        assert!(exact.chronologically_equal(&about));
    }

    #[test]
    fn test_partial_dates_leave_finer_fields_unset() {
        let year_only = parsed("1900");
        assert_eq!(year_only.month, None);
        assert_eq!(year_only.day, None);
        let month_year = parsed("FEB 1900");
        assert_eq!(month_year.month, Some(2));
        assert_eq!(month_year.day, None);
    }

    #[test]
    fn test_bce_ordering() {
        let caesar = parsed("15 MAR 44 B.C.");
        let augustus = parsed("14 AUG 14");
        assert_eq!(caesar.chronological_cmp(&augustus), Ordering::Less);
        assert!(parsed("1 BC").ordinal().unwrap() < parsed("1").ordinal().unwrap());
    }

    #[test]
    fn test_unparseable_sorts_last() {
        let good = DateValue::parse("1 JAN 1800");
        let bad = DateValue::parse("sometime in spring");
        assert!(matches!(bad, DateValue::Unparseable(_)));
        assert_eq!(good.chronological_cmp(&bad), Ordering::Less);
        assert_eq!(bad.chronological_cmp(&good), Ordering::Greater);
        assert_eq!(bad.ordinal(), None);
        assert_eq!(bad.display_text(), "sometime in spring");
    }

    #[test]
    fn test_range_compares_by_start() {
        let range = parsed("BET 1900 AND 1950");
        assert_eq!(range.ordinal(), parsed("1900").ordinal());
        assert_eq!(range.end_ordinal(), parsed("1950").ordinal());
        assert_eq!(range.chronological_cmp(&parsed("1920")), Ordering::Less);
    }
}
