//! Validated identifiers: EVM addresses and transfer (transaction) hashes.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha3::{Digest, Keccak256};

use crate::error::ParseError;

const ADDRESS_HEX_LEN: usize = 40;
const HASH_HEX_LEN: usize = 64;

// ═══════════════════════════════════════════════════════════════════════════════
// EVM ADDRESS
// ═══════════════════════════════════════════════════════════════════════════════

/// A 20-byte EVM address.
///
/// All-lowercase and all-uppercase input is accepted as is; mixed-case input
/// must carry a valid EIP-55 checksum. Displayed in checksummed form.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EvmAddress([u8; 20]);

impl EvmAddress {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let digits = strip_prefix(input.trim())?;
        if digits.len() != ADDRESS_HEX_LEN {
            return Err(ParseError::Length {
                expected: ADDRESS_HEX_LEN,
                found: digits.len(),
            });
        }

        let mut bytes = [0u8; 20];
        hex::decode_to_slice(digits, &mut bytes)?;
        let address = Self(bytes);

        let has_lower = digits.chars().any(|c| c.is_ascii_lowercase());
        let has_upper = digits.chars().any(|c| c.is_ascii_uppercase());
        if has_lower && has_upper && address.to_checksum()[2..] != *digits {
            return Err(ParseError::Checksum);
        }

        Ok(address)
    }

    /// Compile-time constructor for built-in addresses. Case is not checked.
    ///
    /// Panics (at compile time when used in a `const`) on malformed input.
    pub const fn from_static(input: &'static str) -> Self {
        let s = input.as_bytes();
        assert!(
            s.len() == 2 + ADDRESS_HEX_LEN && s[0] == b'0' && (s[1] == b'x' || s[1] == b'X'),
            "address literal must be 0x + 40 hex characters"
        );

        let mut bytes = [0u8; 20];
        let mut i = 0;
        while i < 20 {
            bytes[i] = (hex_nibble(s[2 + 2 * i]) << 4) | hex_nibble(s[3 + 2 * i]);
            i += 1;
        }
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// EIP-55 mixed-case representation.
    pub fn to_checksum(&self) -> String {
        let lower = hex::encode(self.0);
        let hash = Keccak256::digest(lower.as_bytes());

        let mut out = String::with_capacity(2 + ADDRESS_HEX_LEN);
        out.push_str("0x");
        for (i, c) in lower.chars().enumerate() {
            let byte = hash[i / 2];
            let nibble = if i % 2 == 0 { byte >> 4 } else { byte & 0x0f };
            if c.is_ascii_alphabetic() && nibble >= 8 {
                out.push(c.to_ascii_uppercase());
            } else {
                out.push(c);
            }
        }
        out
    }

    /// Left-padded 32-byte ABI word.
    pub fn to_abi_word(&self) -> [u8; 32] {
        let mut word = [0u8; 32];
        word[12..].copy_from_slice(&self.0);
        word
    }
}

impl FromStr for EvmAddress {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for EvmAddress {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<EvmAddress> for String {
    fn from(address: EvmAddress) -> Self {
        address.to_checksum()
    }
}

impl fmt::Display for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_checksum())
    }
}

impl fmt::Debug for EvmAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EvmAddress({})", self.to_checksum())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFER ID
// ═══════════════════════════════════════════════════════════════════════════════

/// Hash of the source-chain transaction that burned USDC.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TransferId([u8; 32]);

impl TransferId {
    pub fn parse(input: &str) -> Result<Self, ParseError> {
        let digits = strip_prefix(input.trim())?;
        if digits.len() != HASH_HEX_LEN {
            return Err(ParseError::Length {
                expected: HASH_HEX_LEN,
                found: digits.len(),
            });
        }

        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes)?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Lowercase 0x-prefixed hex.
    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for TransferId {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for TransferId {
    type Error = ParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<TransferId> for String {
    fn from(id: TransferId) -> Self {
        id.to_hex()
    }
}

impl fmt::Display for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for TransferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TransferId({})", self.to_hex())
    }
}

const fn hex_nibble(c: u8) -> u8 {
    match c {
        b'0'..=b'9' => c - b'0',
        b'a'..=b'f' => c - b'a' + 10,
        b'A'..=b'F' => c - b'A' + 10,
        _ => panic!("invalid hex digit in address literal"),
    }
}

fn strip_prefix(input: &str) -> Result<&str, ParseError> {
    input
        .strip_prefix("0x")
        .or_else(|| input.strip_prefix("0X"))
        .ok_or(ParseError::MissingPrefix)
}
