use std::time::Duration;
use thiserror::Error;

/// Errors from parsing a poll interval such as `"30s"` or `"1h30m"`.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum IntervalError {
    #[error("Interval is empty")]
    Empty,
    #[error("Invalid interval {0:?}")]
    Invalid(String),
    #[error("Missing unit in interval {0:?}")]
    MissingUnit(String),
    #[error("Unknown unit {unit:?} in interval {input:?}")]
    UnknownUnit { unit: String, input: String },
    #[error("Interval {0:?} is out of range")]
    Overflow(String),
    #[error("Interval must be positive, got {0:?}")]
    NotPositive(String),
}

const NANOS_PER_SEC: u128 = 1_000_000_000;

fn unit_nanos(unit: &str) -> Option<u128> {
    Some(match unit {
        "ns" => 1,
        "us" | "µs" | "μs" => 1_000,
        "ms" => 1_000_000,
        "s" => NANOS_PER_SEC,
        "m" => 60 * NANOS_PER_SEC,
        "h" => 3600 * NANOS_PER_SEC,
        _ => return None,
    })
}

/// Parse a duration string made of decimal numbers with unit suffixes.
///
/// Accepts sequences such as `500ms`, `1.5h` or `2h45m10s`; valid units are
/// `ns`, `us` (or `µs`), `ms`, `s`, `m` and `h`. The result must be strictly
/// positive, so `0s` and anything with a leading `-` are rejected.
pub fn parse_interval(input: &str) -> Result<Duration, IntervalError> {
    let s = input.trim();
    if s.is_empty() {
        return Err(IntervalError::Empty);
    }
    if s.starts_with('-') {
        return Err(IntervalError::NotPositive(input.to_string()));
    }
    let mut rest = s.strip_prefix('+').unwrap_or(s);
    if rest.is_empty() {
        return Err(IntervalError::Invalid(input.to_string()));
    }
    let overflow = || IntervalError::Overflow(input.to_string());

    let mut total: u128 = 0;
    while !rest.is_empty() {
        let number_len = rest
            .find(|c: char| !(c.is_ascii_digit() || c == '.'))
            .unwrap_or(rest.len());
        let (number, tail) = rest.split_at(number_len);
        let (whole, frac) = number.split_once('.').unwrap_or((number, ""));
        if (whole.is_empty() && frac.is_empty()) || frac.contains('.') {
            return Err(IntervalError::Invalid(input.to_string()));
        }

        let unit_len = tail
            .find(|c: char| c.is_ascii_digit() || c == '.')
            .unwrap_or(tail.len());
        let (unit, tail) = tail.split_at(unit_len);
        if unit.is_empty() {
            return Err(IntervalError::MissingUnit(input.to_string()));
        }
        let scale = unit_nanos(unit).ok_or_else(|| IntervalError::UnknownUnit {
            unit: unit.to_string(),
            input: input.to_string(),
        })?;

        let whole: u128 = if whole.is_empty() {
            0
        } else {
            whole.parse().map_err(|_| overflow())?
        };
        let mut nanos = whole.checked_mul(scale).ok_or_else(overflow)?;

        // Fractional digits beyond nanosecond precision are truncated
        let mut place = scale;
        for digit in frac.bytes() {
            place /= 10;
            if place == 0 {
                break;
            }
            nanos = nanos
                .checked_add(u128::from(digit - b'0') * place)
                .ok_or_else(overflow)?;
        }

        total = total.checked_add(nanos).ok_or_else(overflow)?;
        rest = tail;
    }

    if total == 0 {
        return Err(IntervalError::NotPositive(input.to_string()));
    }
    let secs = u64::try_from(total / NANOS_PER_SEC).map_err(|_| overflow())?;
    // Remainder is always below one second
    let subsec = (total % NANOS_PER_SEC) as u32;
    Ok(Duration::new(secs, subsec))
}
