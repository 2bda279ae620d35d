//! Identifier newtypes shared by the graph, the edges and the collaborators.
//!
//! Graph keys are opaque strings: EVM tokens and pools use their EIP-55 checksummed
//! address, synthetic entries (bridge legs, test fixtures) use any label.

pub mod conversions;

use std::fmt;

use ethers::types::Address;
use serde::{Deserialize, Serialize};

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(value: impl Into<String>) -> Self {
                Self(value.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }

            pub fn is_empty(&self) -> bool {
                self.0.is_empty()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }

        impl From<String> for $name {
            fn from(value: String) -> Self {
                Self(value)
            }
        }

        impl From<Address> for $name {
            fn from(value: Address) -> Self {
                Self(conversions::checksum(value))
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

string_id!(
    /// Token identity in the graph. The same asset on two chains is two tokens.
    TokenId
);
string_id!(
    /// Pool (pair) identity; edges of one pool share it across both directions.
    PoolId
);
string_id!(
    /// Lower-case chain name as used in edge keys, e.g. `avalanche`.
    ChainId
);

impl TokenId {
    /// Normalizes configured token strings: valid addresses are checksummed, labels kept.
    pub fn from_config(raw: &str) -> Self {
        match conversions::string_to_address(raw) {
            Ok(address) => Self::from(address),
            Err(_) => Self::new(raw.trim()),
        }
    }

    /// Parses the identifier back into an address when it is one.
    pub fn to_address(&self) -> Option<Address> {
        conversions::string_to_address(&self.0).ok()
    }

    /// Pool token order: by address bytes when both are addresses, by label otherwise.
    pub fn sorts_before(&self, other: &TokenId) -> bool {
        match (self.to_address(), other.to_address()) {
            (Some(a), Some(b)) => a < b,
            _ => self.0 < other.0,
        }
    }
}

impl PoolId {
    pub fn to_address(&self) -> Option<Address> {
        conversions::string_to_address(&self.0).ok()
    }
}

impl ChainId {
    /// Chain ids are compared lower-case; configuration sections are upper-case.
    pub fn normalized(raw: &str) -> Self {
        Self(raw.trim().to_ascii_lowercase())
    }

    /// Configuration key for this chain (`AVALANCHE` for `avalanche`).
    pub fn config_key(&self) -> String {
        self.0.to_ascii_uppercase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn address_ids_are_checksummed() {
        let address = Address::from_str("0xb97ef9ef8734c71904d8002f8b6bc66dd9c48a6e").unwrap();
        let token = TokenId::from(address);
        assert_eq!(token.as_str(), "0xB97EF9Ef8734C71904D8002F8b6Bc66Dd9c48a6E");
        assert_eq!(token.to_address(), Some(address));
        assert_eq!(
            TokenId::from_config("0xb97ef9ef8734c71904d8002f8b6bc66dd9c48a6e"),
            token
        );
    }

    #[test]
    fn labels_are_kept_verbatim() {
        let token = TokenId::from_config("USDC_AVAX");
        assert_eq!(token.as_str(), "USDC_AVAX");
        assert!(token.to_address().is_none());
    }

    #[test]
    fn address_order_ignores_checksum_case() {
        // checksum casing can invert plain text order
        let low = TokenId::from(Address::from_str("0x0a00000000000000000000000000000000000000").unwrap());
        let high = TokenId::from(Address::from_str("0x0b00000000000000000000000000000000000000").unwrap());
        assert!(low.sorts_before(&high));
        assert!(!high.sorts_before(&low));
        assert!(TokenId::from("A").sorts_before(&TokenId::from("B")));
    }

    #[test]
    fn chain_ids_normalize_case() {
        let chain = ChainId::normalized("AVALANCHE");
        assert_eq!(chain.as_str(), "avalanche");
        assert_eq!(chain.config_key(), "AVALANCHE");
    }
}
