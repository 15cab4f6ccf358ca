//! Identifiers shared across the Validator, the Processor and the chain feed.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An unbounded non-negative integer minted by the on-chain registry.
///
/// Printed in SQL-bound form as `t` followed by a 16-hex-digit zero-padded
/// representation (`t0x%016x` on the wire; see SPEC_FULL.md §6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TableId(pub u64);

impl TableId {
    /// The relation name this id is bound to in canonical SQL: `t<16 hex>`.
    pub fn sql_name(&self) -> String {
        format!("t0x{:016x}", self.0)
    }

    /// The relation name this id is stored under on disk: `_<16 hex>`.
    pub fn stored_name(&self) -> String {
        format!("_{:016x}", self.0)
    }
}

impl fmt::Display for TableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TableId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<u64>().map(TableId)
    }
}

/// A 64-bit signed chain identifier, per EIP-155.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ChainId(pub i64);

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for ChainId {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.parse::<i64>().map(ChainId)
    }
}

/// A 20-byte EVM account identifier, stored and compared in lower-case hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Address(pub [u8; 20]);

impl Address {
    pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
        let s = s.strip_prefix("0x").unwrap_or(s);
        let bytes = hex::decode(s)?;
        let mut arr = [0u8; 20];
        if bytes.len() != 20 {
            return Err(hex::FromHexError::InvalidStringLength);
        }
        arr.copy_from_slice(&bytes);
        Ok(Address(arr))
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}
