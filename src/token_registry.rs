//! Configured tokens per chain and their bridge home/remote contracts.

use std::collections::HashMap;

use tracing::debug;

use crate::router::TokenMappings;
use crate::settings::{Settings, TokenSettings};
use crate::types::{ChainId, TokenId};

#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    // keyed by upper-case chain name
    chains: HashMap<String, Vec<TokenSettings>>,
}

impl TokenRegistry {
    pub fn from_settings(settings: &Settings) -> Self {
        let chains = settings
            .chains
            .iter()
            .map(|(name, chain)| (name.to_uppercase(), chain.tokens.clone()))
            .collect();
        Self { chains }
    }

    pub fn insert(&mut self, chain: &str, token: TokenSettings) {
        self.chains.entry(chain.to_uppercase()).or_default().push(token);
    }

    /// Token ids configured for `chain`, in configuration order.
    pub fn tokens(&self, chain: &str) -> Vec<TokenId> {
        self.chains
            .get(&chain.to_uppercase())
            .map(|tokens| {
                tokens
                    .iter()
                    .map(|t| TokenId::from_config(&t.address))
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn chain_names(&self) -> impl Iterator<Item = &str> {
        self.chains.keys().map(String::as_str)
    }

    pub fn lookup(&self, token: &str, chain: &str) -> Option<&TokenSettings> {
        self.chains
            .get(&chain.to_uppercase())?
            .iter()
            .find(|t| t.address.eq_ignore_ascii_case(token))
    }
}

impl TokenMappings for TokenRegistry {
    fn token_mappings(&self, token: &TokenId, chain: &ChainId) -> (String, String) {
        match self.lookup(token.as_str(), chain.as_str()) {
            Some(found) => (found.token_home.clone(), found.token_remote.clone()),
            None => {
                debug!(
                    "[TokenRegistry] No mapping for {} on {}",
                    token,
                    chain.config_key()
                );
                (String::new(), String::new())
            }
        }
    }
}
