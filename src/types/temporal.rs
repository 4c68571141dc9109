//! Temporal value parsing.
//!
//! Dates are `yyyy-MM-dd`; timestamps are
//! `YYYY-MM-DD HH:MM:SS[.fff][±HH[:MM[:SS]]|Z]`, both with an optional
//! ` BC` suffix that negates the year. The backend also sends the special
//! strings `infinity` and `-infinity`.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta, Utc};

use crate::error::{Error, Result};

/// A decoded date column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PgDate {
    /// A finite calendar date.
    Date(NaiveDate),
    /// The special value `infinity`.
    PositiveInfinity,
    /// The special value `-infinity`.
    NegativeInfinity,
}

/// A decoded timestamp or timestamptz column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PgTimestamp {
    /// A timestamp that carried an offset, normalized to UTC.
    DateTime(DateTime<Utc>),
    /// A timestamp without an offset, kept in wall-clock form.
    Naive(NaiveDateTime),
    /// The special value `infinity`.
    PositiveInfinity,
    /// The special value `-infinity`.
    NegativeInfinity,
}

pub(crate) fn decode_date(text: &str) -> Result<PgDate> {
    match text {
        "infinity" => Ok(PgDate::PositiveInfinity),
        "-infinity" => Ok(PgDate::NegativeInfinity),
        _ => {
            let (text, bc) = strip_bc(text);
            parse_ymd(text, bc).map(PgDate::Date)
        }
    }
}

pub(crate) fn decode_timestamp(text: &str) -> Result<PgTimestamp> {
    match text {
        "infinity" => return Ok(PgTimestamp::PositiveInfinity),
        "-infinity" => return Ok(PgTimestamp::NegativeInfinity),
        _ => {}
    }

    let (text, bc) = strip_bc(text);
    let (date_part, time_part) = text
        .split_once(' ')
        .ok_or_else(|| invalid("timestamp", text))?;

    // Anything after the seconds (and optional fraction) is the offset; the
    // date separator '-' cannot appear inside HH:MM:SS[.fff]
    let (hms_part, offset_part) = match time_part.find(['+', '-', 'Z', 'z']) {
        Some(idx) => (&time_part[..idx], Some(&time_part[idx..])),
        None => (time_part, None),
    };

    let date = parse_ymd(date_part, bc)?;
    let time = parse_hms(hms_part)?;
    let wall_clock = NaiveDateTime::new(date, time);

    match offset_part {
        None => Ok(PgTimestamp::Naive(wall_clock)),
        Some(offset) => {
            let seconds = parse_offset(offset)?;
            let utc = wall_clock - TimeDelta::seconds(seconds);
            Ok(PgTimestamp::DateTime(DateTime::from_naive_utc_and_offset(
                utc, Utc,
            )))
        }
    }
}

fn strip_bc(text: &str) -> (&str, bool) {
    match text.strip_suffix(" BC") {
        Some(rest) => (rest, true),
        None => (text, false),
    }
}

fn parse_ymd(text: &str, bc: bool) -> Result<NaiveDate> {
    let mut parts = text.splitn(3, '-');
    let year: i32 = next_number(&mut parts, "date", text)?;
    let month: u32 = next_number(&mut parts, "date", text)?;
    let day: u32 = next_number(&mut parts, "date", text)?;

    let year = if bc { -year } else { year };
    NaiveDate::from_ymd_opt(year, month, day).ok_or_else(|| invalid("date", text))
}

fn parse_hms(text: &str) -> Result<NaiveTime> {
    let (clock, fraction) = match text.split_once('.') {
        Some((clock, fraction)) => (clock, Some(fraction)),
        None => (text, None),
    };

    let mut parts = clock.splitn(3, ':');
    let hour: u32 = next_number(&mut parts, "time", text)?;
    let minute: u32 = next_number(&mut parts, "time", text)?;
    let second: u32 = next_number(&mut parts, "time", text)?;

    let nanos = match fraction {
        Some(digits) if !digits.is_empty() && digits.len() <= 9 => {
            let value: u32 = digits.parse().map_err(|_| invalid("time", text))?;
            value * 10_u32.pow(9 - digits.len() as u32)
        }
        Some(_) => return Err(invalid("time", text)),
        None => 0,
    };

    NaiveTime::from_hms_nano_opt(hour, minute, second, nanos).ok_or_else(|| invalid("time", text))
}

/// Parse `±HH[:MM[:SS]]` or `Z` into signed seconds east of UTC.
fn parse_offset(text: &str) -> Result<i64> {
    if text == "Z" || text == "z" {
        return Ok(0);
    }
    let (sign, rest) = match text.split_at(1) {
        ("+", rest) => (1, rest),
        ("-", rest) => (-1, rest),
        _ => return Err(invalid("timezone offset", text)),
    };

    let mut seconds = 0_i64;
    let mut scale = 3600;
    for part in rest.splitn(3, ':') {
        let value: i64 = part.parse().map_err(|_| invalid("timezone offset", text))?;
        seconds += value * scale;
        scale /= 60;
    }
    Ok(sign * seconds)
}

fn next_number<'a, T: std::str::FromStr>(
    parts: &mut impl Iterator<Item = &'a str>,
    what: &str,
    whole: &str,
) -> Result<T> {
    parts
        .next()
        .and_then(|part| part.parse().ok())
        .ok_or_else(|| invalid(what, whole))
}

fn invalid(what: &str, text: &str) -> Error {
    Error::Decode(format!("Invalid {what}: \"{text}\""))
}
