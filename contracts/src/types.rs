//! # Shared Primitive Types
//!
//! Identifiers, amounts and timestamps used by every contract in the crate.
//! Amounts are `u128` so that 18-decimal supplies (e.g. `100 * 10^18`) fit
//! without resorting to a big-integer type. Nothing in this crate uses
//! floating point.

/// Opaque account identifier. Callers, owners, grantors, recipients and the
/// vault itself are all plain addresses.
pub type Address = String;

/// Unique identifier of a deployed token ledger.
pub type AssetId = String;

/// Token amount in the smallest denomination.
pub type Amount = u128;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Number of smallest units in one whole token at the given precision.
///
/// Returns `None` when `10^decimals` does not fit in an [`Amount`].
pub fn unit(decimals: u8) -> Option<Amount> {
    10u128.checked_pow(u32::from(decimals))
}

/// Converts a whole-token quantity into smallest units, checked.
///
/// `to_base_units(100, 18)` is the equivalent of `parseEther("100")`.
pub fn to_base_units(whole: u128, decimals: u8) -> Option<Amount> {
    unit(decimals)?.checked_mul(whole)
}

/// Serde adapter that carries an [`Amount`] as a decimal string.
///
/// JSON numbers above 2^53 are not safe in most consumers, and a `u128`
/// routinely exceeds that. Use with `#[serde(with = "amount_string")]`.
pub mod amount_string {
    use serde::{de::Error, Deserialize, Deserializer, Serializer};

    use super::Amount;

    pub fn serialize<S: Serializer>(amount: &Amount, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(amount)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Amount, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse::<Amount>()
            .map_err(|e| D::Error::custom(format!("invalid amount '{}': {}", raw, e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unit_matches_decimal_precision() {
        assert_eq!(unit(0), Some(1));
        assert_eq!(unit(8), Some(100_000_000));
        assert_eq!(unit(18), Some(1_000_000_000_000_000_000));
    }

    #[test]
    fn base_units_overflow_is_detected() {
        assert_eq!(to_base_units(100, 18), Some(100 * 10u128.pow(18)));
        assert_eq!(to_base_units(u128::MAX, 18), None);
        assert_eq!(unit(39), None);
    }

    #[derive(serde::Serialize, serde::Deserialize, Debug, PartialEq)]
    struct Wrapper {
        #[serde(with = "amount_string")]
        amount: Amount,
    }

    #[test]
    fn amount_string_keeps_full_precision() {
        let w = Wrapper { amount: u128::MAX };
        let json = serde_json::to_string(&w).unwrap();
        assert_eq!(json, format!("{{\"amount\":\"{}\"}}", u128::MAX));
        let back: Wrapper = serde_json::from_str(&json).unwrap();
        assert_eq!(back, w);
    }

    #[test]
    fn amount_string_rejects_garbage() {
        let result: Result<Wrapper, _> = serde_json::from_str(r#"{"amount":"-5"}"#);
        assert!(result.is_err());
    }
}
