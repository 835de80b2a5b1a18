//! Static Exchange Rate Definitions with Macro-Based Generation
//!
//! This library holds the process-wide constant rate configuration used when
//! every live provider is down: the currencies the business tracks and the
//! last-known-good fallback table.
//!
//! # Adding a New Currency
//! Add a line to the `define_currencies!` invocation:
//! ```ignore
//! define_currencies! {
//!     // ... existing currencies ...
//!     JPY => ("JPY", "¥", "Japanese Yen"),
//! }
//! ```
//!
//! # Adding a Fallback Pair
//! Add a line to `define_fallback_rates!`; the inverse is derived for you:
//! ```ignore
//! define_fallback_rates! {
//!     JPY / TRY => dec!(0.23),
//! }
//! ```
//!
//! # Example
//! ```
//! use exchange_rates::{fallback_rate, CurrencyCode};
//! use rust_decimal_macros::dec;
//!
//! assert_eq!(fallback_rate("USD", "TRY"), Some(dec!(34.50)));
//! assert!(fallback_rate("TRY", "USD").is_some());
//! assert_eq!("eur".parse::<CurrencyCode>().unwrap(), CurrencyCode::EUR);
//! ```

use std::collections::HashMap;
use std::sync::LazyLock;

use rust_decimal::Decimal;
use rust_decimal_macros::dec;

/// Decimal places kept for derived inverse rates.
pub const INVERSE_PRECISION: u32 = 10;

/// Rate returned for USD/TRY when nothing else is available.
pub const ULTIMATE_FALLBACK_RATE: Decimal = dec!(34.50);

// ─────────────────────────────────────────────────────────────────────────────
// THE MACROS: currency enum and fallback table
// ─────────────────────────────────────────────────────────────────────────────

/// Defines the tracked currencies as a `CurrencyCode` enum with runtime helpers.
///
/// # Syntax
/// ```ignore
/// define_currencies! {
///     CurrencyName => ("CODE", "SYMBOL", "display name"),
/// }
/// ```
#[macro_export]
macro_rules! define_currencies {
    (
        $(
            $name:ident => ($code:literal, $symbol:literal, $display:literal)
        ),* $(,)?
    ) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
        #[serde(rename_all = "UPPERCASE")]
        pub enum CurrencyCode {
            $($name),*
        }

        impl CurrencyCode {
            pub fn code(&self) -> &'static str {
                match self {
                    $(CurrencyCode::$name => $code),*
                }
            }

            pub fn symbol(&self) -> &'static str {
                match self {
                    $(CurrencyCode::$name => $symbol),*
                }
            }

            pub fn display_name(&self) -> &'static str {
                match self {
                    $(CurrencyCode::$name => $display),*
                }
            }

            pub fn all() -> &'static [CurrencyCode] {
                &[$(CurrencyCode::$name),*]
            }
        }

        impl std::fmt::Display for CurrencyCode {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.code())
            }
        }

        impl std::str::FromStr for CurrencyCode {
            type Err = String;
            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s.trim().to_uppercase().as_str() {
                    $($code => Ok(CurrencyCode::$name),)*
                    _ => Err(format!("Unknown currency: {}", s)),
                }
            }
        }
    };
}

/// Builds the fallback table from `FROM / TO => rate` entries.
///
/// Each declared pair also receives its precomputed inverse unless the
/// inverse is declared explicitly.
macro_rules! define_fallback_rates {
    (
        $(
            $from:ident / $to:ident => $rate:expr
        ),* $(,)?
    ) => {
        fn build_fallback_table() -> HashMap<&'static str, Decimal> {
            let mut table = HashMap::new();
            $(
                table.insert(concat!(stringify!($from), stringify!($to)), $rate);
            )*
            $(
                if let Some(inverse) = Decimal::ONE.checked_div($rate) {
                    table
                        .entry(concat!(stringify!($to), stringify!($from)))
                        .or_insert(inverse.round_dp(INVERSE_PRECISION));
                }
            )*
            table
        }

        /// Pairs declared directly in the fallback table (inverses excluded).
        pub fn declared_fallback_pairs() -> &'static [(&'static str, &'static str)] {
            &[$((stringify!($from), stringify!($to))),*]
        }
    };
}

// ─────────────────────────────────────────────────────────────────────────────
// DEFINITIONS - Add new currencies and fallback pairs here!
// ─────────────────────────────────────────────────────────────────────────────

define_currencies! {
    USD => ("USD", "$", "US Dollar"),
    EUR => ("EUR", "€", "Euro"),
    GBP => ("GBP", "£", "British Pound"),
    TRY => ("TRY", "₺", "Turkish Lira"),
}

define_fallback_rates! {
    USD / TRY => ULTIMATE_FALLBACK_RATE,
    EUR / TRY => dec!(37.20),
    GBP / TRY => dec!(43.80),
    EUR / USD => dec!(1.08),
    GBP / USD => dec!(1.27),
}

static FALLBACK_TABLE: LazyLock<HashMap<&'static str, Decimal>> =
    LazyLock::new(build_fallback_table);

// ─────────────────────────────────────────────────────────────────────────────
// Lookup Functions
// ─────────────────────────────────────────────────────────────────────────────

/// Looks up a fallback rate by concatenated pair code, e.g. `USDTRY`.
pub fn fallback_rate_by_code(pair_code: &str) -> Option<Decimal> {
    FALLBACK_TABLE.get(pair_code).copied()
}

/// Looks up a fallback rate for `from -> to`. Codes are case-insensitive.
pub fn fallback_rate(from: &str, to: &str) -> Option<Decimal> {
    let code = format!("{}{}", from.trim(), to.trim()).to_uppercase();
    fallback_rate_by_code(&code)
}

/// Number of entries in the fallback table, inverses included.
pub fn fallback_table_len() -> usize {
    FALLBACK_TABLE.len()
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
