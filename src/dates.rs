//! Date and time parsing for the free text found in incident reports.
//!
//! Every parser distinguishes three results: a value, an explicit "absent"
//! (`Ok(None)`, for empty or placeholder text such as "unknown"), and a parse
//! error.

use std::ops::Range;
use std::sync::LazyLock;

use chrono::{Datelike as _, Duration, NaiveDate, NaiveTime};
use regex::{Captures, Regex};
use thiserror::Error;

use crate::model::DobCheck;

/// Largest |stated age - computed age| still treated as consistent.
pub const DOB_TOLERANCE_YEARS: i64 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DateError {
    #[error("date has no year: {0:?}")]
    MissingYear(String),
    #[error("unrecognized date: {0:?}")]
    Unrecognized(String),
    #[error("no such calendar date: {0:?}")]
    InvalidDate(String),
    #[error("unrecognized time: {0:?}")]
    UnrecognizedTime(String),
    #[error("time out of range: {0:?}")]
    TimeOutOfRange(String),
    #[error("birth date {birth} is after {as_of}")]
    BirthAfterReference { birth: NaiveDate, as_of: NaiveDate },
}

static DATE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)
        \b(?P<nm>\d{1,2})[/-](?P<nd>\d{1,2})[/-](?P<ny>\d{4}|\d{2})\b
        |
        \b(?P<iy>\d{4})-(?P<im>\d{1,2})-(?P<id>\d{1,2})\b
        |
        \b(?P<mon>jan(?:uary)?|feb(?:ruary)?|mar(?:ch)?|apr(?:il)?|may|june?|july?
             |aug(?:ust)?|sep(?:t(?:ember)?)?|oct(?:ober)?|nov(?:ember)?|dec(?:ember)?)
        \.?\s+
        (?:
            (?P<day>\d{1,2})(?:st|nd|rd|th)?,?\s+(?P<year>\d{4}|\d{2})\b
            |
            (?P<monthyear>\d{4})\b
        )",
    )
    .expect("date regex")
});

static MISSING_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?ix)^(?:
            (?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec)[a-z]*\.?\s+\d{1,2}(?:st|nd|rd|th)?
            |
            \d{1,2}[/-]\d{1,2}
        )$",
    )
    .expect("missing year regex")
});

static WEEKDAY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?:mon|tues|wednes|thurs|fri|satur|sun)day\b\.?,?\s*").expect("weekday regex")
});

static TIME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(?P<h>\d{1,2})(?::?(?P<m>\d{2}))?\s*(?:(?P<ap>[ap])\.?\s*m\.?)?$")
        .expect("time regex")
});

static TIME_SEARCH_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(?:\d{1,2}:\d{2}(?:\s*[ap]\.?\s*m\.?)?|\d{1,4}\s*[ap]\.?\s*m\.?)")
        .expect("time search regex")
});

const PLACEHOLDERS: &[&str] = &[
    "", "unknown", "unk", "n/a", "na", "none", "-", "--", "tbd", "not available",
    "not released", "withheld",
];

/// Year, month and an optional day, before defaulting the day.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct DateParts {
    year: i32,
    month: u32,
    day: Option<u32>,
}

/// Returns true for empty text and the usual "no value" markers.
pub fn is_placeholder(text: &str) -> bool {
    let cleaned = text
        .trim()
        .trim_matches(|c: char| c == '.' || c == ',' || c == ';' || c == '(' || c == ')')
        .trim()
        .to_ascii_lowercase();
    PLACEHOLDERS.contains(&cleaned.as_str())
}

/// Parses a whole string as a date.
///
/// Accepts numeric `MM/DD/YYYY` (or `-` separated, two- or four-digit year),
/// ISO `YYYY-MM-DD`, and month-name forms such as "January 16, 2018",
/// "Jan. 5 2019" or "Tuesday, January 16, 2018". A missing day defaults to the
/// first of the month; a missing year is an error. Two-digit years are resolved
/// against `reference_year` with [`infer_century`].
pub fn parse_date(text: &str, reference_year: i32) -> Result<Option<NaiveDate>, DateError> {
    let Some(parts) = parse_parts(text, reference_year)? else {
        return Ok(None);
    };
    to_date(parts, parts.day.unwrap_or(1), text).map(Some)
}

/// Parses a lower listing boundary; a missing day becomes the first of the month.
pub fn parse_lower_bound(text: &str, reference_year: i32) -> Result<Option<NaiveDate>, DateError> {
    parse_date(text, reference_year)
}

/// Parses an upper listing boundary; a missing day becomes the last of the month.
pub fn parse_upper_bound(text: &str, reference_year: i32) -> Result<Option<NaiveDate>, DateError> {
    let Some(parts) = parse_parts(text, reference_year)? else {
        return Ok(None);
    };
    match parts.day {
        Some(day) => to_date(parts, day, text).map(Some),
        None => {
            let first = to_date(parts, 1, text)?;
            let next_month = first
                .checked_add_months(chrono::Months::new(1))
                .ok_or_else(|| DateError::InvalidDate(text.to_owned()))?;
            Ok(Some(next_month - Duration::days(1)))
        }
    }
}

/// Returns the first date found anywhere in `text`.
pub fn search_date(text: &str, reference_year: i32) -> Option<NaiveDate> {
    find_dates(text, reference_year).into_iter().next()
}

/// Returns every date found in `text`, in order of appearance.
pub fn find_dates(text: &str, reference_year: i32) -> Vec<NaiveDate> {
    DATE_RE
        .captures_iter(text)
        .filter_map(|caps| {
            let parts = parts_from_captures(&caps, reference_year).ok()?;
            to_date(parts, parts.day.unwrap_or(1), text).ok()
        })
        .collect()
}

/// Byte range of the first date-like text in `text`, whether or not it names
/// a real calendar day.
pub fn first_date_span(text: &str) -> Option<Range<usize>> {
    DATE_RE.find(text).map(|found| found.range())
}

/// Byte ranges of every date in `text` that carries a day, month and year.
pub fn full_date_spans(text: &str) -> Vec<Range<usize>> {
    DATE_RE
        .captures_iter(text)
        .filter(|caps| caps.name("monthyear").is_none())
        .filter_map(|caps| caps.get(0))
        .map(|found| found.range())
        .collect()
}

/// Resolves a two-digit year. The year lands in the reference year's century
/// unless that would put it in the future, in which case the prior century is
/// used.
pub fn infer_century(two_digit_year: i32, reference_year: i32) -> i32 {
    let candidate = reference_year - reference_year.rem_euclid(100) + two_digit_year;
    if candidate > reference_year {
        candidate - 100
    } else {
        candidate
    }
}

/// Parses a time of day: "5:14 p.m.", "5:14PM", "0514", "514 pm", "17:30",
/// "noon", "midnight".
pub fn parse_time(text: &str) -> Result<Option<NaiveTime>, DateError> {
    let trimmed = text.trim().trim_end_matches([',', ';']).trim();
    if is_placeholder(trimmed) {
        return Ok(None);
    }
    match trimmed.to_ascii_lowercase().as_str() {
        "noon" => return Ok(NaiveTime::from_hms_opt(12, 0, 0)),
        "midnight" => return Ok(NaiveTime::from_hms_opt(0, 0, 0)),
        _ => {}
    }

    let caps = TIME_RE
        .captures(trimmed)
        .ok_or_else(|| DateError::UnrecognizedTime(text.to_owned()))?;
    let out_of_range = || DateError::TimeOutOfRange(text.to_owned());

    let hour: u32 = caps["h"].parse().map_err(|_| out_of_range())?;
    let minute: u32 = match caps.name("m") {
        Some(m) => m.as_str().parse().map_err(|_| out_of_range())?,
        None => 0,
    };
    if minute > 59 {
        return Err(out_of_range());
    }

    let hour = match caps.name("ap").map(|m| m.as_str().to_ascii_lowercase()) {
        Some(marker) => {
            if hour == 0 || hour > 12 {
                return Err(out_of_range());
            }
            let base = hour % 12;
            if marker == "p" { base + 12 } else { base }
        }
        None => {
            if hour > 23 {
                return Err(out_of_range());
            }
            hour
        }
    };

    NaiveTime::from_hms_opt(hour, minute, 0)
        .map(Some)
        .ok_or_else(out_of_range)
}

/// Returns the first parseable time found anywhere in `text`.
pub fn search_time(text: &str) -> Option<NaiveTime> {
    TIME_SEARCH_RE
        .find_iter(text)
        .find_map(|m| parse_time(m.as_str()).ok().flatten())
}

/// Closed-interval containment; `None` leaves that side unbounded.
pub fn is_between(date: NaiveDate, lower: Option<NaiveDate>, upper: Option<NaiveDate>) -> bool {
    lower.is_none_or(|lower| lower <= date) && upper.is_none_or(|upper| date <= upper)
}

pub fn is_before(a: NaiveDate, b: NaiveDate) -> bool {
    a < b
}

/// Age in whole years on `as_of`, counting a birthday only once it has passed.
pub fn compute_age(birth: NaiveDate, as_of: NaiveDate) -> Result<u32, DateError> {
    if birth > as_of {
        return Err(DateError::BirthAfterReference { birth, as_of });
    }
    u32::try_from(signed_age(birth, as_of))
        .map_err(|_| DateError::BirthAfterReference { birth, as_of })
}

/// Compares a stated age against the age computed from the birth date.
pub fn check_dob(birth: NaiveDate, as_of: NaiveDate, claimed_age: u32) -> DobCheck {
    let delta = i64::from(claimed_age) - signed_age(birth, as_of);
    if delta.abs() <= DOB_TOLERANCE_YEARS {
        DobCheck::Consistent
    } else {
        DobCheck::Inconsistent { delta }
    }
}

fn signed_age(birth: NaiveDate, as_of: NaiveDate) -> i64 {
    let mut years = i64::from(as_of.year()) - i64::from(birth.year());
    if (as_of.month(), as_of.day()) < (birth.month(), birth.day()) {
        years -= 1;
    }
    years
}

fn parse_parts(text: &str, reference_year: i32) -> Result<Option<DateParts>, DateError> {
    if is_placeholder(text) {
        return Ok(None);
    }
    let trimmed = text.trim().trim_end_matches(['.', ',', ';']).trim();
    let cleaned = WEEKDAY_RE.replace(trimmed, "");
    let cleaned = cleaned.trim();

    if let Some(caps) = DATE_RE.captures(cleaned)
        && let Some(whole) = caps.get(0)
        && whole.start() == 0
        && whole.end() == cleaned.len()
    {
        return parts_from_captures(&caps, reference_year).map(Some);
    }

    if MISSING_YEAR_RE.is_match(cleaned) {
        return Err(DateError::MissingYear(text.to_owned()));
    }
    Err(DateError::Unrecognized(text.to_owned()))
}

fn parts_from_captures(caps: &Captures<'_>, reference_year: i32) -> Result<DateParts, DateError> {
    let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
    let number = |name: &str| -> Result<u32, DateError> {
        caps.name(name)
            .and_then(|m| m.as_str().parse().ok())
            .ok_or_else(|| DateError::Unrecognized(whole.to_owned()))
    };
    let year = |name: &str| -> Result<i32, DateError> {
        let raw = caps
            .name(name)
            .map(|m| m.as_str())
            .ok_or_else(|| DateError::Unrecognized(whole.to_owned()))?;
        let value: i32 = raw
            .parse()
            .map_err(|_| DateError::Unrecognized(whole.to_owned()))?;
        Ok(if raw.len() == 2 {
            infer_century(value, reference_year)
        } else {
            value
        })
    };

    if caps.name("nm").is_some() {
        return Ok(DateParts {
            year: year("ny")?,
            month: number("nm")?,
            day: Some(number("nd")?),
        });
    }
    if caps.name("iy").is_some() {
        return Ok(DateParts {
            year: year("iy")?,
            month: number("im")?,
            day: Some(number("id")?),
        });
    }

    let month = caps
        .name("mon")
        .and_then(|m| month_number(m.as_str()))
        .ok_or_else(|| DateError::Unrecognized(whole.to_owned()))?;
    if caps.name("day").is_some() {
        Ok(DateParts {
            year: year("year")?,
            month,
            day: Some(number("day")?),
        })
    } else {
        Ok(DateParts {
            year: year("monthyear")?,
            month,
            day: None,
        })
    }
}

fn month_number(name: &str) -> Option<u32> {
    let prefix = name.get(..3)?.to_ascii_lowercase();
    let month = match prefix.as_str() {
        "jan" => 1,
        "feb" => 2,
        "mar" => 3,
        "apr" => 4,
        "may" => 5,
        "jun" => 6,
        "jul" => 7,
        "aug" => 8,
        "sep" => 9,
        "oct" => 10,
        "nov" => 11,
        "dec" => 12,
        _ => return None,
    };
    Some(month)
}

fn to_date(parts: DateParts, day: u32, original: &str) -> Result<NaiveDate, DateError> {
    NaiveDate::from_ymd_opt(parts.year, parts.month, day)
        .ok_or_else(|| DateError::InvalidDate(original.to_owned()))
}
