//! Parsing and formatting of the decimal amounts that appear in fragments and in grid cells.
//!
//! Fragments are typed by hand or forwarded from chats, so a decimal separator may be either `.`
//! or `,`, and thousands may be separated by spaces (`5 000`). Grid cells are always written with
//! a `.` separator and without trailing zeros.

use rust_decimal::{Decimal, RoundingStrategy};
use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

/// An error that can occur when parsing fragment text into a `Decimal`.
pub struct AmountError {
    text: String,
    source: rust_decimal::Error,
}

impl Debug for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "AmountError({:?}: {:?})", self.text, self.source)
    }
}

impl Display for AmountError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "'{}' is not an amount: {}", self.text, self.source)
    }
}

impl std::error::Error for AmountError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}

/// Parses an amount written in a fragment, accepting `,` as a decimal separator and ignoring
/// spaces and a leading `+`.
///
/// ```
/// # use sheet_ledger::parse_amount;
/// # use rust_decimal::Decimal;
/// assert_eq!(parse_amount("0,008").unwrap(), Decimal::new(8, 3));
/// assert_eq!(parse_amount("5 000").unwrap(), Decimal::from(5000));
/// ```
pub fn parse_amount(text: &str) -> Result<Decimal, AmountError> {
    let cleaned: String = text
        .trim()
        .trim_start_matches('+')
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    Decimal::from_str(&cleaned).map_err(|source| AmountError {
        text: text.to_string(),
        source,
    })
}

/// Formats an amount for writing into a grid cell, e.g. `1234.50` -> `1234.5`.
pub fn format_amount(value: Decimal) -> String {
    value.normalize().to_string()
}

/// Rounds to the nearest integer, halves away from zero.
pub fn round_to_integer(value: Decimal) -> Decimal {
    value.round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
}
