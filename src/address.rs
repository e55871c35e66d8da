//! Player and contract identities.
//!
//! A 20-byte account identity with a canonical lowercase `0x…` hex form.
//! The all-zero address is representable but rejected wherever a real
//! contract or submitter identity is required.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::GameError;

/// A 20-byte ledger account identity (player or contract).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct Address(pub [u8; 20]);

impl Address {
    /// The all-zero address. Never a valid contract or submitter identity.
    pub const ZERO: Address = Address([0u8; 20]);

    /// Whether this is the all-zero sentinel.
    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 20]
    }

    /// Access the raw bytes.
    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Parse a `0x`-prefixed 40-digit hex string.
    pub fn parse(text: &str) -> Result<Self, GameError> {
        let stripped = text
            .strip_prefix("0x")
            .or_else(|| text.strip_prefix("0X"))
            .ok_or_else(|| {
                GameError::InvalidInput(format!("address missing 0x prefix: {text:?}"))
            })?;
        if stripped.len() != 40 {
            return Err(GameError::InvalidInput(format!(
                "address must be 40 hex digits, got {}",
                stripped.len()
            )));
        }
        let mut bytes = [0u8; 20];
        decode_hex(stripped, &mut bytes)
            .map_err(|c| GameError::InvalidInput(format!("invalid hex digit {c:?} in address")))?;
        Ok(Address(bytes))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("0x")?;
        for b in &self.0 {
            write!(f, "{b:02x}")?;
        }
        Ok(())
    }
}

/// Decode hex digits into `out`; `text` must be exactly `2 * out.len()`
/// digits. Returns the offending character on failure.
pub(crate) fn decode_hex(text: &str, out: &mut [u8]) -> Result<(), char> {
    debug_assert_eq!(text.len(), out.len() * 2);
    let digits = text.as_bytes();
    for (i, slot) in out.iter_mut().enumerate() {
        let hi = hex_value(digits[2 * i]).ok_or(digits[2 * i] as char)?;
        let lo = hex_value(digits[2 * i + 1]).ok_or(digits[2 * i + 1] as char)?;
        *slot = (hi << 4) | lo;
    }
    Ok(())
}

fn hex_value(digit: u8) -> Option<u8> {
    match digit {
        b'0'..=b'9' => Some(digit - b'0'),
        b'a'..=b'f' => Some(digit - b'a' + 10),
        b'A'..=b'F' => Some(digit - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_round_trips_through_parse() {
        let addr = Address([0xAB; 20]);
        let text = addr.to_string();
        assert_eq!(text, format!("0x{}", "ab".repeat(20)));
        assert_eq!(Address::parse(&text).unwrap(), addr);
    }

    #[test]
    fn parse_accepts_uppercase_digits() {
        let text = format!("0x{}", "AB".repeat(20));
        assert_eq!(Address::parse(&text).unwrap(), Address([0xAB; 20]));
    }

    #[test]
    fn parse_rejects_missing_prefix_and_bad_length() {
        assert!(matches!(
            Address::parse(&"ab".repeat(20)),
            Err(GameError::InvalidInput(_))
        ));
        assert!(matches!(
            Address::parse("0x1234"),
            Err(GameError::InvalidInput(_))
        ));
    }

    #[test]
    fn parse_rejects_non_hex_digit() {
        let text = format!("0x{}zz", "ab".repeat(19));
        assert!(matches!(
            Address::parse(&text),
            Err(GameError::InvalidInput(_))
        ));
    }

    #[test]
    fn zero_sentinel() {
        assert!(Address::ZERO.is_zero());
        assert!(!Address([1; 20]).is_zero());
    }
}
