//! Publish-date resolution for feed items.
//!
//! Feeds write `<pubDate>` in several textual forms. Each accepted form is
//! tried in a fixed order and the first that parses wins; text matching none
//! of them resolves to the Unix epoch instead of failing the item.

use chrono::{DateTime, FixedOffset, NaiveDateTime, TimeZone, Utc};

/// Accepted `<pubDate>` layouts, in the order they are tried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateFormat {
    /// `Mon, 02 Jan 2006 15:04:05 MST`
    Rfc1123,
    /// `02 Jan 06 15:04 -0700`
    Rfc822,
    /// `2006-01-02T15:04:05-07:00`
    IsoOffset,
}

pub const PUBLISHED_FORMATS: [DateFormat; 3] =
    [DateFormat::Rfc1123, DateFormat::Rfc822, DateFormat::IsoOffset];

impl DateFormat {
    pub fn parse(self, raw: &str) -> Option<DateTime<FixedOffset>> {
        match self {
            DateFormat::Rfc1123 => parse_rfc1123(raw),
            DateFormat::Rfc822 => parse_rfc822(raw),
            DateFormat::IsoOffset => {
                DateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f%:z").ok()
            }
        }
    }
}

/// Parse `raw` with the first matching [`PUBLISHED_FORMATS`] entry.
pub fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    PUBLISHED_FORMATS
        .iter()
        .find_map(|format| format.parse(raw))
        .map(|dt| dt.with_timezone(&Utc))
}

/// Like [`parse_published`], with the Unix epoch as the unparseable sentinel.
pub fn resolve_published(raw: &str) -> DateTime<Utc> {
    parse_published(raw).unwrap_or_else(|| {
        if !raw.trim().is_empty() {
            tracing::debug!(raw = %raw, "Unrecognised publish date, using epoch");
        }
        DateTime::UNIX_EPOCH
    })
}

fn parse_rfc1123(raw: &str) -> Option<DateTime<FixedOffset>> {
    // The weekday is not cross-checked against the date
    let (weekday, rest) = raw.split_once(',')?;
    if weekday.len() != 3 || !weekday.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let [day, month, year, time, zone] = tokens(rest)?;
    if year.len() != 4 {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(
        &format!("{day} {month} {year} {time}"),
        "%d %b %Y %H:%M:%S",
    )
    .ok()?;
    localize(naive, parse_zone(zone)?)
}

fn parse_rfc822(raw: &str) -> Option<DateTime<FixedOffset>> {
    let [day, month, year, time, zone] = tokens(raw)?;
    if year.len() != 2 {
        return None;
    }
    let naive = NaiveDateTime::parse_from_str(
        &format!("{day} {month} {year} {time}"),
        "%d %b %y %H:%M",
    )
    .ok()?;
    localize(naive, parse_zone(zone)?)
}

fn tokens(s: &str) -> Option<[&str; 5]> {
    let mut parts = s.split_whitespace();
    let out = [parts.next()?, parts.next()?, parts.next()?, parts.next()?, parts.next()?];
    match parts.next() {
        Some(_) => None,
        None => Some(out),
    }
}

fn localize(naive: NaiveDateTime, offset: FixedOffset) -> Option<DateTime<FixedOffset>> {
    offset.from_local_datetime(&naive).single()
}

/// Numeric `±hhmm` offsets, or a zone abbreviation.
///
/// RFC 822 names map to their offsets; any other all-caps abbreviation is
/// treated as UTC.
fn parse_zone(zone: &str) -> Option<FixedOffset> {
    if let Some(digits) = zone.strip_prefix('+') {
        return numeric_offset(digits, 1);
    }
    if let Some(digits) = zone.strip_prefix('-') {
        return numeric_offset(digits, -1);
    }

    let hours = match zone {
        "GMT" | "UT" | "UTC" | "Z" => 0,
        "EST" => -5,
        "EDT" => -4,
        "CST" => -6,
        "CDT" => -5,
        "MST" => -7,
        "MDT" => -6,
        "PST" => -8,
        "PDT" => -7,
        other
            if (3..=5).contains(&other.len()) && other.chars().all(|c| c.is_ascii_uppercase()) =>
        {
            0
        }
        _ => return None,
    };
    FixedOffset::east_opt(hours * 3600)
}

fn numeric_offset(digits: &str, sign: i32) -> Option<FixedOffset> {
    if digits.len() != 4 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    let hours: i32 = digits[..2].parse().ok()?;
    let minutes: i32 = digits[2..].parse().ok()?;
    if minutes >= 60 {
        return None;
    }
    FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))
}
