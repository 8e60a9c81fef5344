//! Arbitrary-precision token amounts.
//!
//! Balances are integers in the token's smallest unit. They cross JSON as
//! canonical decimal strings so no consumer ever sees a float or a truncated
//! 64-bit value.

use std::fmt;

use num_bigint::BigUint;
use num_traits::Zero;
use serde::{Deserialize, Serialize};

/// An integer amount of smallest units tagged with its decimal scale.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TokenAmount {
    #[serde(with = "biguint_string")]
    raw: BigUint,
    decimals: u8,
}

impl TokenAmount {
    pub fn new(raw: BigUint, decimals: u8) -> Self {
        Self { raw, decimals }
    }

    pub fn raw(&self) -> &BigUint {
        &self.raw
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }

    pub fn is_zero(&self) -> bool {
        self.raw.is_zero()
    }

    /// Sum amounts at the widest scale among `floor` and the inputs.
    ///
    /// Every input is lifted, never truncated, so the result is exact.
    pub fn sum<'a, I>(floor: u8, amounts: I) -> Self
    where
        I: IntoIterator<Item = &'a TokenAmount>,
    {
        let amounts: Vec<&TokenAmount> = amounts.into_iter().collect();
        let decimals = amounts
            .iter()
            .map(|amount| amount.decimals)
            .fold(floor, u8::max);

        let raw = amounts.iter().fold(BigUint::zero(), |acc, amount| {
            acc + &amount.raw * pow10(decimals - amount.decimals)
        });
        Self::new(raw, decimals)
    }

    /// Decimal rendering with trailing fractional zeros trimmed.
    ///
    /// `1500750000` at 6 decimals formats as `"1500.75"`.
    pub fn format_units(&self) -> String {
        if self.decimals == 0 {
            return self.raw.to_str_radix(10);
        }

        let scale = pow10(self.decimals);
        let whole = &self.raw / &scale;
        let frac = &self.raw % &scale;
        if frac.is_zero() {
            return whole.to_str_radix(10);
        }

        let frac = format!(
            "{:0>width$}",
            frac.to_str_radix(10),
            width = self.decimals as usize
        );
        format!("{}.{}", whole, frac.trim_end_matches('0'))
    }
}

impl fmt::Display for TokenAmount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.format_units())
    }
}

fn pow10(exp: u8) -> BigUint {
    BigUint::from(10u32).pow(u32::from(exp))
}

/// Serde adapter for `BigUint` as a decimal string.
///
/// Serializes to a string; deserializes from a string or a JSON integer.
pub mod biguint_string {
    use std::fmt;

    use num_bigint::BigUint;
    use serde::de::{self, Visitor};
    use serde::{Deserializer, Serializer};

    pub fn serialize<S>(value: &BigUint, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&value.to_str_radix(10))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<BigUint, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_any(BigUintVisitor)
    }

    struct BigUintVisitor;

    impl<'de> Visitor<'de> for BigUintVisitor {
        type Value = BigUint;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a non-negative integer or decimal string")
        }

        fn visit_u64<E: de::Error>(self, v: u64) -> Result<BigUint, E> {
            Ok(BigUint::from(v))
        }

        fn visit_i64<E: de::Error>(self, v: i64) -> Result<BigUint, E> {
            u64::try_from(v)
                .map(BigUint::from)
                .map_err(|_| E::custom(format!("negative amount {v}")))
        }

        fn visit_str<E: de::Error>(self, v: &str) -> Result<BigUint, E> {
            if v.is_empty() || !v.bytes().all(|b| b.is_ascii_digit()) {
                return Err(E::custom(format!("invalid integer string {v:?}")));
            }
            BigUint::parse_bytes(v.as_bytes(), 10)
                .ok_or_else(|| E::custom(format!("invalid integer string {v:?}")))
        }
    }
}
