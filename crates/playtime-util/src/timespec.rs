//! Human-written duration strings ("1d12h", "90m", "2w3d")
//!
//! Grammar: a run of `(digits, unit)` pairs with no separators. Units are
//! case-sensitive: `y` (365d), `M` (30d), `w`, `d`, `h`, `m` (minute), `s`.
//! Pairs are summed. The empty string is a valid zero duration.

use thiserror::Error;

use crate::{MILLIS_PER_HOUR, MILLIS_PER_MINUTE, MILLIS_PER_SECOND};

const MILLIS_PER_DAY: u64 = 24 * MILLIS_PER_HOUR;

/// Duration parse errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TimeSpecError {
    #[error("Missing number before unit: {0}")]
    MissingNumber(char),

    #[error("Unknown time unit: {0}")]
    UnknownUnit(char),

    #[error("Dangling number without unit at end")]
    TrailingNumber,

    #[error("Duration is too large")]
    Overflow,
}

/// Milliseconds represented by one of a unit letter
fn unit_millis(unit: char) -> Option<u64> {
    match unit {
        'y' => Some(365 * MILLIS_PER_DAY),
        'M' => Some(30 * MILLIS_PER_DAY),
        'w' => Some(7 * MILLIS_PER_DAY),
        'd' => Some(MILLIS_PER_DAY),
        'h' => Some(MILLIS_PER_HOUR),
        'm' => Some(MILLIS_PER_MINUTE),
        's' => Some(MILLIS_PER_SECOND),
        _ => None,
    }
}

/// Parse a duration string into milliseconds
pub fn parse_timespec(input: &str) -> Result<u64, TimeSpecError> {
    let mut total: u64 = 0;
    let mut number: Option<u64> = None;

    for c in input.chars() {
        if let Some(digit) = c.to_digit(10) {
            let value = number
                .unwrap_or(0)
                .checked_mul(10)
                .and_then(|v| v.checked_add(u64::from(digit)))
                .ok_or(TimeSpecError::Overflow)?;
            number = Some(value);
            continue;
        }

        let value = number.take().ok_or(TimeSpecError::MissingNumber(c))?;
        let unit = unit_millis(c).ok_or(TimeSpecError::UnknownUnit(c))?;

        total = value
            .checked_mul(unit)
            .and_then(|part| total.checked_add(part))
            .ok_or(TimeSpecError::Overflow)?;
    }

    if number.is_some() {
        return Err(TimeSpecError::TrailingNumber);
    }

    Ok(total)
}
