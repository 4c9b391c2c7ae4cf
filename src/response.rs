//! Decoding of radio replies.
//!
//! Replies arrive from the link with the terminator already stripped. A
//! missing or malformed reply never becomes an error here: each decoder
//! resolves it to the sentinel the caller documents (0 Hz, no mode, 0).

use log::debug;

use crate::command::op;
use crate::frequency::Frequency;
use crate::mode::OperatingMode;

/// Width of the numeric field carried by `SM0`, `RM1`, `RM6` and `PC` replies.
const FIELD_WIDTH: usize = 3;

/// Number of digits in an `FA` reply.
const FREQ_DIGITS: usize = 9;

/// Decode `FAhhhhhhhhh`. Returns `Frequency::ZERO` for anything else.
pub fn parse_frequency(reply: Option<&str>) -> Frequency {
    let Some(reply) = reply else {
        return Frequency::ZERO;
    };
    let digits = match reply.strip_prefix(op::FREQUENCY_A) {
        Some(d) if d.len() == FREQ_DIGITS => d,
        _ => {
            debug!("malformed frequency reply: {reply:?}");
            return Frequency::ZERO;
        }
    };
    Frequency::from_cat_digits(digits).unwrap_or_else(|e| {
        debug!("bad frequency digits in {reply:?}: {e}");
        Frequency::ZERO
    })
}

/// Decode `MD0c`. `None` means no mode known.
pub fn parse_mode(reply: Option<&str>) -> Option<OperatingMode> {
    let reply = reply?;
    if !reply.starts_with(op::MODE_SHORT) || reply.len() < op::MODE.len() + 1 {
        debug!("malformed mode reply: {reply:?}");
        return None;
    }
    let code = reply.chars().last()?;
    let mode = OperatingMode::from_cat_code(code);
    if mode.is_none() {
        debug!("unknown mode code {code:?} in {reply:?}");
    }
    mode
}

/// Decode the 3-digit field that follows `opcode` in a reply such as
/// `SM0123` or `PC050`. Short, mismatched or non-numeric replies yield 0.
pub fn parse_field(reply: Option<&str>, opcode: &str) -> u16 {
    let Some(reply) = reply else {
        return 0;
    };
    let field = reply
        .strip_prefix(opcode)
        .and_then(|rest| rest.get(..FIELD_WIDTH));
    match field {
        Some(digits) if digits.bytes().all(|b| b.is_ascii_digit()) => {
            digits.parse().unwrap_or(0)
        }
        _ => {
            debug!("malformed {opcode} reply: {reply:?}");
            0
        }
    }
}
