use ethers::types::{Address, H256, I256, U256};
use std::str::FromStr;

// Addresses as used in graph keys
pub fn checksum(addr: Address) -> String {
    ethers::utils::to_checksum(&addr, None)
}

pub fn string_to_address(s: &str) -> Result<Address, ConversionError> {
    Address::from_str(s.trim()).map_err(|e| ConversionError::InvalidAddress(e.to_string()))
}

pub fn parse_h256(value: &str) -> Result<H256, ConversionError> {
    let normalized = value.trim().trim_start_matches("0x");
    let bytes = hex::decode(normalized).map_err(|e| ConversionError::InvalidHex(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(ConversionError::InvalidHex(format!(
            "expected 32 bytes, got {} ({})",
            bytes.len(),
            value
        )));
    }
    Ok(H256::from_slice(&bytes))
}

// V3 ticks are int24 on chain but arrive as int256 words
pub fn i256_to_i32(value: I256) -> Result<i32, ConversionError> {
    let as_i128: i128 = value.try_into().map_err(|_| ConversionError::Overflow)?;

    i32::try_from(as_i128).map_err(|_| ConversionError::Overflow)
}

pub fn u256_to_u128(value: U256) -> Result<u128, ConversionError> {
    if value > U256::from(u128::MAX) {
        return Err(ConversionError::Overflow);
    }
    Ok(value.as_u128())
}

/// 32-byte ABI word `index` of a log's data section.
pub fn data_word(data: &[u8], index: usize) -> Result<U256, ConversionError> {
    let start = index * 32;
    let word = data
        .get(start..start + 32)
        .ok_or(ConversionError::ShortData {
            needed: start + 32,
            got: data.len(),
        })?;
    Ok(U256::from_big_endian(word))
}

/// Sign-extended ABI word (int24/int128 etc.) read as two's complement.
pub fn signed_data_word(data: &[u8], index: usize) -> Result<I256, ConversionError> {
    Ok(I256::from_raw(data_word(data, index)?))
}

/// serde helpers rendering U256 amounts as decimal strings
pub mod u256_dec {
    use ethers::types::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        let raw = String::deserialize(deserializer)?;
        U256::from_dec_str(&raw).map_err(serde::de::Error::custom)
    }
}

/// Same as `u256_dec` for u128 values (liquidity), which JSON numbers cannot hold.
pub mod u128_dec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &u128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

/// Signed counterpart of `u128_dec` (liquidity net).
pub mod i128_dec {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &i128, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<i128, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    #[error("Overflow in conversion")]
    Overflow,
    #[error("Invalid address: {0}")]
    InvalidAddress(String),
    #[error("Invalid hex: {0}")]
    InvalidHex(String),
    #[error("Log data too short: needed {needed} bytes, got {got}")]
    ShortData { needed: usize, got: usize },
    #[error("Tick {0} outside the valid tick range")]
    TickOutOfRange(i32),
}
