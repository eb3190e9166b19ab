//! Exact two-place decimal amounts stored as integer cents.

use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MoneyError {
    #[error("'{0}' is not a valid amount")]
    Invalid(String),
    #[error("'{0}' has more than two decimal places")]
    TooPrecise(String),
    #[error("amount must not be negative")]
    Negative,
    #[error("'{0}' is too large")]
    Overflow(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Money(i64);

impl Money {
    pub const ZERO: Money = Money(0);

    pub const fn from_cents(cents: i64) -> Self {
        Money(cents)
    }

    pub const fn cents(self) -> i64 {
        self.0
    }

    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// Parses a Brazilian-formatted amount such as `R$ 1.500,50`.
    ///
    /// Currency markers and whitespace are dropped. When a comma is present
    /// it is the decimal separator and dots are thousands separators. Without
    /// a comma, dots followed by groups of exactly three digits (`1.500`,
    /// `1.500.000`) are thousands separators too; any other dot is the decimal
    /// separator. Blank input is zero.
    pub fn parse_brl(input: &str) -> Result<Money, MoneyError> {
        let mut cleaned: String = input
            .replace("R$", "")
            .replace('$', "")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if cleaned.is_empty() {
            return Ok(Money::ZERO);
        }
        if cleaned.contains(',') || is_dot_grouped(&cleaned) {
            cleaned = cleaned.replace('.', "").replace(',', ".");
        }
        let value = Money::parse_decimal(&cleaned)
            .map_err(|e| relabel(e, input.trim()))?;
        if value.is_negative() {
            return Err(MoneyError::Negative);
        }
        Ok(value)
    }

    /// Parses a plain `-?digits(.digits)?` decimal with at most two places.
    pub fn parse_decimal(s: &str) -> Result<Money, MoneyError> {
        let invalid = || MoneyError::Invalid(s.to_string());
        let (negative, body) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s.strip_prefix('+').unwrap_or(s)),
        };
        let (int_part, frac_part) = match body.split_once('.') {
            Some((i, f)) => (i, f),
            None => (body, ""),
        };
        if int_part.is_empty() && frac_part.is_empty() {
            return Err(invalid());
        }
        if !int_part.chars().all(|c| c.is_ascii_digit())
            || !frac_part.chars().all(|c| c.is_ascii_digit())
        {
            return Err(invalid());
        }
        if frac_part.len() > 2 {
            return Err(MoneyError::TooPrecise(s.to_string()));
        }

        let overflow = || MoneyError::Overflow(s.to_string());
        let whole: i64 = if int_part.is_empty() {
            0
        } else {
            int_part.parse().map_err(|_| overflow())?
        };
        let frac: i64 = match frac_part.len() {
            0 => 0,
            1 => frac_part.parse::<i64>().map_err(|_| invalid())? * 10,
            _ => frac_part.parse().map_err(|_| invalid())?,
        };
        let cents = whole
            .checked_mul(100)
            .and_then(|c| c.checked_add(frac))
            .ok_or_else(overflow)?;
        Ok(Money(if negative { -cents } else { cents }))
    }
}

fn is_dot_grouped(s: &str) -> bool {
    let mut groups = s.trim_start_matches(['-', '+']).split('.');
    let lead = groups.next().unwrap_or_default();
    let rest: Vec<&str> = groups.collect();
    !rest.is_empty()
        && (1..=3).contains(&lead.len())
        && lead.chars().all(|c| c.is_ascii_digit())
        && rest
            .iter()
            .all(|g| g.len() == 3 && g.chars().all(|c| c.is_ascii_digit()))
}

fn relabel(e: MoneyError, original: &str) -> MoneyError {
    match e {
        MoneyError::Invalid(_) => MoneyError::Invalid(original.to_string()),
        MoneyError::TooPrecise(_) => MoneyError::TooPrecise(original.to_string()),
        MoneyError::Overflow(_) => MoneyError::Overflow(original.to_string()),
        other => other,
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        write!(f, "{}{}.{:02}", sign, abs / 100, abs % 100)
    }
}

impl Serialize for Money {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}
