//! Currency pair and cache key domain models.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::RateError;

/// Ordered `(from, to)` pair of currency codes, normalized to uppercase.
///
/// A rate for the pair answers "how many `to` units does one `from` unit buy".
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CurrencyPair {
    from: String,
    to: String,
}

impl CurrencyPair {
    /// Creates a pair, trimming and uppercasing both codes.
    pub fn new(from: &str, to: &str) -> Result<Self, RateError> {
        Ok(Self {
            from: normalize_code(from)?,
            to: normalize_code(to)?,
        })
    }

    pub fn from_code(&self) -> &str {
        &self.from
    }

    pub fn to_code(&self) -> &str {
        &self.to
    }

    /// Returns the pair with both sides swapped.
    pub fn inverse(&self) -> Self {
        Self {
            from: self.to.clone(),
            to: self.from.clone(),
        }
    }

    /// True when both sides are the same currency; such pairs always rate at 1.
    pub fn is_identity(&self) -> bool {
        self.from == self.to
    }

    /// Concatenated code, e.g. `USDTRY`.
    pub fn code(&self) -> String {
        format!("{}{}", self.from, self.to)
    }
}

impl fmt::Display for CurrencyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.from, self.to)
    }
}

impl std::str::FromStr for CurrencyPair {
    type Err = RateError;

    /// Accepts `USD/TRY`, `USD-TRY` and six-letter `USDTRY`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if let Some((from, to)) = s.split_once(['/', '-']) {
            return Self::new(from, to);
        }
        if s.len() == 6 && s.is_ascii() {
            let (from, to) = s.split_at(3);
            return Self::new(from, to);
        }
        Err(RateError::InvalidPair(s.to_string()))
    }
}

fn normalize_code(code: &str) -> Result<String, RateError> {
    let code = code.trim();
    let valid = (2..=10).contains(&code.len()) && code.chars().all(|c| c.is_ascii_alphanumeric());
    if !valid {
        return Err(RateError::InvalidCurrency(code.to_string()));
    }
    Ok(code.to_ascii_uppercase())
}

/// Key under which a resolved rate is cached: a pair plus a date, or "current".
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub pair: CurrencyPair,
    pub date: Option<NaiveDate>,
}

impl CacheKey {
    pub fn new(pair: CurrencyPair, date: Option<NaiveDate>) -> Self {
        Self { pair, date }
    }

    pub fn current(pair: CurrencyPair) -> Self {
        Self { pair, date: None }
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.date {
            Some(date) => write!(f, "{}:{}:{}", self.pair.from, self.pair.to, date),
            None => write!(f, "{}:{}:current", self.pair.from, self.pair.to),
        }
    }
}
