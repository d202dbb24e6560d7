//! Ticker value object for equity instruments.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::OnceLock;

/// Maximum ticker length after the exchange prefix is removed.
pub const MAX_TICKER_LEN: usize = 10;

/// Errors from ticker validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TickerError {
    /// Nothing left after trimming and prefix removal.
    #[error("ticker is empty")]
    Empty,

    /// Longer than [`MAX_TICKER_LEN`] characters.
    #[error("ticker '{symbol}' is {len} characters, max is {MAX_TICKER_LEN}")]
    TooLong {
        /// Offending symbol.
        symbol: String,
        /// Its length.
        len: usize,
    },

    /// Contains characters outside letters, digits, dot, dash and space.
    #[error("ticker '{symbol}' contains invalid characters")]
    InvalidCharacters {
        /// Offending symbol.
        symbol: String,
    },
}

/// A validated, canonical equity ticker.
///
/// Canonical form is upper-case with any `EXCHANGE:` prefix removed,
/// so `"nasdaq:aapl"` and `"AAPL"` are the same ticker. A space between
/// the root and the share class becomes a dot, so `"BRK B"` and `"BRK.B"`
/// are the same ticker.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Ticker(String);

impl Ticker {
    /// Parse and canonicalize a raw ticker.
    pub fn parse(raw: &str) -> Result<Self, TickerError> {
        let upper = raw.trim().to_uppercase();
        let symbol = match upper.split_once(':') {
            Some((_exchange, rest)) => rest.trim(),
            None => upper.as_str(),
        };

        if symbol.is_empty() {
            return Err(TickerError::Empty);
        }

        let len = symbol.chars().count();
        if len > MAX_TICKER_LEN {
            return Err(TickerError::TooLong {
                symbol: symbol.to_string(),
                len,
            });
        }

        if !ticker_regex().is_match(symbol) {
            return Err(TickerError::InvalidCharacters {
                symbol: symbol.to_string(),
            });
        }

        Ok(Self(symbol.split_whitespace().collect::<Vec<_>>().join(".")))
    }

    /// Canonical form of a broker-reported symbol, or the symbol unchanged
    /// when it is not a valid ticker.
    #[must_use]
    pub fn canonical(raw: &str) -> String {
        Self::parse(raw).map_or_else(|_| raw.to_string(), Self::into_inner)
    }

    /// Get the ticker string.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consume the ticker, returning the owned string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

#[allow(clippy::expect_used)] // Pattern is a compile-time constant
fn ticker_regex() -> &'static regex::Regex {
    static TICKER_REGEX: OnceLock<regex::Regex> = OnceLock::new();
    TICKER_REGEX.get_or_init(|| {
        regex::Regex::new(r"^[A-Z0-9.\- ]+$").expect("ticker regex is valid")
    })
}

impl fmt::Display for Ticker {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Ticker {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Ticker {
    type Error = TickerError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Ticker> for String {
    fn from(value: Ticker) -> Self {
        value.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("AAPL", "AAPL" ; "plain")]
    #[test_case("aapl", "AAPL" ; "lower case")]
    #[test_case("NASDAQ:AAPL", "AAPL" ; "exchange prefix")]
    #[test_case("  nyse:brk.b ", "BRK.B" ; "prefix with whitespace and share class")]
    #[test_case("BF-B", "BF-B" ; "dash")]
    #[test_case("BRK B", "BRK.B" ; "inner space")]
    #[test_case("NYSE:BRK  b", "BRK.B" ; "prefix with repeated space")]
    #[test_case("ABCDEFGHIJ", "ABCDEFGHIJ" ; "ten characters")]
    fn parses_valid_tickers(raw: &str, expected: &str) {
        assert_eq!(Ticker::parse(raw).unwrap().as_str(), expected);
    }

    #[test_case("" ; "empty")]
    #[test_case("   " ; "blank")]
    #[test_case("NASDAQ:" ; "prefix only")]
    fn rejects_empty(raw: &str) {
        assert_eq!(Ticker::parse(raw), Err(TickerError::Empty));
    }

    #[test]
    fn rejects_too_long() {
        let err = Ticker::parse("ABCDEFGHIJK").unwrap_err();
        assert!(matches!(err, TickerError::TooLong { len: 11, .. }));
    }

    #[test_case("AAPL$" ; "dollar")]
    #[test_case("A/B" ; "slash")]
    #[test_case("AAPL;DROP" ; "semicolon")]
    fn rejects_invalid_characters(raw: &str) {
        assert!(matches!(
            Ticker::parse(raw),
            Err(TickerError::InvalidCharacters { .. })
        ));
    }

    #[test]
    fn share_class_spellings_are_one_ticker() {
        assert_eq!(
            Ticker::parse("NYSE:BRK B").unwrap(),
            Ticker::parse("BRK.B").unwrap()
        );
        assert_eq!(Ticker::canonical("BF B"), "BF.B");
        assert_eq!(Ticker::canonical("$$$"), "$$$");
    }

    #[test]
    fn deserialization_validates() {
        let ok: Ticker = serde_json::from_str("\"amex:spy\"").unwrap();
        assert_eq!(ok.as_str(), "SPY");
        assert!(serde_json::from_str::<Ticker>("\"$$$\"").is_err());
    }
}
