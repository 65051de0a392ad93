//! Date value parsing
//!
//! Cues are applied in a fixed order:
//!
//! 1. a parenthesized phrase is set aside (its case is preserved)
//! 2. a leading calendar escape selects the calendar
//! 3. range forms `BET x AND y` and `FROM x TO y`
//! 4. single modifiers (`ABT`, `BEF`, `AFT`, `CAL`, `EST`, `INT`, lone `FROM`/`TO`)
//! 5. a trailing era marker (`B.C.`, `BC`, `BCE`, `B.C.E.`)
//! 6. season keywords in place of a month
//! 7. the positional `[day] [month] [year]` layout
//!
//! Each side of a range may carry its own calendar escape.

use super::calendar;
use super::{Calendar, DateError, DateModifier, StructuredDate, SEASONS};

const BCE_MARKERS: [&str; 4] = ["B.C.", "BC", "BCE", "B.C.E."];

/// Parse a date value into its structured form
pub fn parse_date(raw: &str) -> Result<StructuredDate, DateError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(DateError::Empty);
    }

    let (text, phrase) = split_phrase(raw);
    if text.trim().is_empty() {
        return Err(DateError::PhraseOnly(phrase.unwrap_or_default()));
    }

    let normalized = text.to_uppercase().replace("@#DFRENCH R@", "@#DFRENCH_R@");
    let mut tokens: Vec<&str> = normalized.split_whitespace().collect();

    let mut calendar = Calendar::Gregorian;
    if let Some(&first) = tokens.first() {
        if first.starts_with("@#") {
            calendar = Calendar::from_escape(first)
                .ok_or_else(|| DateError::UnknownCalendar(first.to_owned()))?;
            tokens.remove(0);
        }
    }

    let (keyword, rest) = match tokens.split_first() {
        Some((keyword, rest)) => (*keyword, rest),
        None => return Err(DateError::Empty),
    };

    let mut date = match keyword {
        "BET" | "BETWEEN" => parse_range(calendar, rest, "AND", DateModifier::Between)?,
        "FROM" => match rest.iter().position(|t| *t == "TO") {
            Some(_) => parse_range(calendar, rest, "TO", DateModifier::Period)?,
            None => with_modifier(parse_simple(calendar, rest)?, DateModifier::From),
        },
        "TO" => with_modifier(parse_simple(calendar, rest)?, DateModifier::To),
        other => match single_modifier(other) {
            Some(modifier) => with_modifier(parse_simple(calendar, rest)?, modifier),
            None => parse_simple(calendar, &tokens)?,
        },
    };

    date.phrase = phrase;
    Ok(date)
}

/// Split `text (phrase)` into its date text and phrase
fn split_phrase(raw: &str) -> (String, Option<String>) {
    match (raw.find('('), raw.rfind(')')) {
        (Some(open), Some(close)) if close > open => {
            let phrase = raw[open + 1..close].trim().to_owned();
            let mut text = raw[..open].to_owned();
            text.push(' ');
            text.push_str(&raw[close + 1..]);
            (text, Some(phrase))
        }
        _ => (raw.to_owned(), None),
    }
}

fn single_modifier(keyword: &str) -> Option<DateModifier> {
    match keyword {
        "ABT" | "ABOUT" => Some(DateModifier::About),
        "BEF" | "BEFORE" => Some(DateModifier::Before),
        "AFT" | "AFTER" => Some(DateModifier::After),
        "CAL" | "CALCULATED" => Some(DateModifier::Calculated),
        "EST" | "ESTIMATED" => Some(DateModifier::Estimated),
        "INT" | "INTERPRETED" => Some(DateModifier::Interpreted),
        _ => None,
    }
}

fn with_modifier(mut date: StructuredDate, modifier: DateModifier) -> StructuredDate {
    date.modifier = modifier;
    date
}

fn parse_range(
    calendar: Calendar,
    tokens: &[&str],
    separator: &str,
    modifier: DateModifier,
) -> Result<StructuredDate, DateError> {
    let split = tokens
        .iter()
        .position(|t| *t == separator)
        .ok_or(DateError::MissingRangeEnd)?;
    let (start, end) = (&tokens[..split], &tokens[split + 1..]);
    if end.is_empty() {
        return Err(DateError::MissingRangeEnd);
    }

    let mut date = parse_simple(calendar, start)?;
    // The end inherits the start's calendar unless it names its own
    let end = parse_simple(date.calendar, end)?;
    date.modifier = modifier;
    date.range_end = Some(Box::new(end));
    Ok(date)
}

fn season_month(token: &str) -> Option<u8> {
    let canonical = match token {
        "SPR" => "SPRING",
        "SUM" => "SUMMER",
        "AUT" | "FALL" => "AUTUMN",
        "WIN" => "WINTER",
        other => other,
    };
    SEASONS
        .iter()
        .find(|(name, _)| *name == canonical)
        .map(|(_, month)| *month)
}

fn parse_year(token: &str) -> Result<i32, DateError> {
    if token.is_empty() || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DateError::UnrecognizedToken(token.to_owned()));
    }
    let year: i64 = token
        .parse()
        .map_err(|_| DateError::UnrecognizedToken(token.to_owned()))?;
    if year < 1 || year > i64::from(i32::MAX) {
        return Err(DateError::YearOutOfRange(year));
    }
    Ok(year as i32)
}

fn parse_day(token: &str) -> Result<u8, DateError> {
    if token.is_empty() || token.len() > 2 || !token.bytes().all(|b| b.is_ascii_digit()) {
        return Err(DateError::UnrecognizedToken(token.to_owned()));
    }
    token
        .parse()
        .map_err(|_| DateError::UnrecognizedToken(token.to_owned()))
}

fn is_numeric(token: &str) -> bool {
    !token.is_empty() && token.bytes().all(|b| b.is_ascii_digit())
}

/// Month or season position; returns (month, is_season)
fn parse_month(calendar: Calendar, token: &str) -> Result<(u8, bool), DateError> {
    if let Some(month) = calendar::month_from_name(calendar, token) {
        return Ok((month, false));
    }
    if let Some(month) = season_month(token) {
        if !calendar.is_civil() {
            return Err(DateError::NotCivilCalendar("season"));
        }
        return Ok((month, true));
    }
    Err(DateError::UnrecognizedToken(token.to_owned()))
}

/// Parse one date without range keywords
fn parse_simple(default_calendar: Calendar, tokens: &[&str]) -> Result<StructuredDate, DateError> {
    let mut tokens = tokens.to_vec();

    let mut calendar = default_calendar;
    if let Some(&first) = tokens.first() {
        if first.starts_with("@#") {
            calendar = Calendar::from_escape(first)
                .ok_or_else(|| DateError::UnknownCalendar(first.to_owned()))?;
            tokens.remove(0);
        }
    }

    let mut is_bce = false;
    if let Some(&last) = tokens.last() {
        if BCE_MARKERS.contains(&last) {
            if !calendar.is_civil() {
                return Err(DateError::NotCivilCalendar("B.C.E."));
            }
            is_bce = true;
            tokens.pop();
        }
    }

    let mut date = StructuredDate::new(calendar, None, None, None);
    date.is_bce = is_bce;

    match tokens.as_slice() {
        [] => return Err(DateError::Empty),
        [single] => {
            if is_numeric(single) {
                date.year = Some(parse_year(single)?);
            } else {
                let (month, season) = parse_month(calendar, single)?;
                date.month = Some(month);
                date.is_season = season;
            }
        }
        [first, second] => {
            if is_numeric(first) {
                date.day = Some(parse_day(first)?);
                let (month, season) = parse_month(calendar, second)?;
                if season {
                    return Err(DateError::UnrecognizedToken((*second).to_owned()));
                }
                date.month = Some(month);
            } else {
                let (month, season) = parse_month(calendar, first)?;
                date.month = Some(month);
                date.is_season = season;
                date.year = Some(parse_year(second)?);
            }
        }
        [day, month, year] => {
            date.day = Some(parse_day(day)?);
            let (month_number, season) = parse_month(calendar, month)?;
            if season {
                return Err(DateError::UnrecognizedToken((*month).to_owned()));
            }
            date.month = Some(month_number);
            date.year = Some(parse_year(year)?);
        }
        _ => return Err(DateError::UnrecognizedToken(tokens.join(" "))),
    }

    if is_bce && date.year.is_none() {
        return Err(DateError::UnrecognizedToken("B.C.".to_owned()));
    }

    validate(&date)?;
    Ok(date)
}

fn validate(date: &StructuredDate) -> Result<(), DateError> {
    let Some(month) = date.month else {
        return Ok(());
    };
    if date.is_season {
        return Ok(());
    }

    let astronomical = date
        .year
        .map(|y| if date.is_bce { 1 - i64::from(y) } else { i64::from(y) });
    let length = calendar::days_in_month(date.calendar, astronomical, month);

    if length == 0 {
        let name = calendar::month_name(date.calendar, month).unwrap_or("?");
        return Err(DateError::MonthNotInYear {
            month: name.to_owned(),
            year: date.year.unwrap_or_default(),
        });
    }

    if let Some(day) = date.day {
        if day == 0 || day > length {
            return Err(DateError::DayOutOfRange { day, month });
        }
    }
    Ok(())
}
