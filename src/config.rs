use crate::domain::types::ChainKind;
use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

pub const DEFAULT_REGISTRY_URL: &str =
    "https://raw.githubusercontent.com/Hats-Protocol/modules-registry/main/modules.json";
pub const DEFAULT_FACTORY_ADDRESS: Address = address!("0xfe661c01891172046fee16d3a57c3cf456729efa");
pub const DEFAULT_MULTICALL_ADDRESS: Address =
    address!("0xca11bde05977b3631167028862be2a173976ca11");
pub const DEFAULT_MAX_RESPONSE_BYTES: u64 = 2 * 1024 * 1024;

const CHAIN_ID_ENV: &str = "RULE_MODULES_CHAIN_ID";
const RPC_URL_ENV: &str = "RULE_MODULES_RPC_URL";
const REGISTRY_URL_ENV: &str = "RULE_MODULES_REGISTRY_URL";

/// Implementation identities recognised as chain modules, per rule category.
///
/// Several equivalent deployments of one logical chain implementation may be
/// listed under the same category. The default is empty: the prepared registry
/// contributes the chain implementations it indexes, and these lists add to
/// that set (for example unlisted deployments).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ChainIdentities {
    #[serde(default)]
    pub eligibility: Vec<Address>,
    #[serde(default)]
    pub toggle: Vec<Address>,
}

impl ChainIdentities {
    pub fn kind_of(&self, identity: &Address) -> Option<ChainKind> {
        if self.eligibility.contains(identity) {
            Some(ChainKind::Eligibility)
        } else if self.toggle.contains(identity) {
            Some(ChainKind::Toggle)
        } else {
            None
        }
    }

    pub fn contains(&self, identity: &Address) -> bool {
        self.kind_of(identity).is_some()
    }

    pub fn is_empty(&self) -> bool {
        self.eligibility.is_empty() && self.toggle.is_empty()
    }

    pub fn insert(&mut self, kind: ChainKind, identity: Address) {
        let list = match kind {
            ChainKind::Eligibility => &mut self.eligibility,
            ChainKind::Toggle => &mut self.toggle,
        };
        if !list.contains(&identity) {
            list.push(identity);
        }
    }

    /// Union of both lists; entries of `self` come first.
    pub fn merged_with(&self, other: &ChainIdentities) -> ChainIdentities {
        let mut merged = self.clone();
        for identity in &other.eligibility {
            merged.insert(ChainKind::Eligibility, *identity);
        }
        for identity in &other.toggle {
            merged.insert(ChainKind::Toggle, *identity);
        }
        merged
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ClientConfig {
    /// Network whose deployments the registry index is filtered to.
    pub chain_id: u64,
    pub registry_url: String,
    pub factory_address: Address,
    pub multicall_address: Address,
    pub chain_identities: ChainIdentities,
    pub rpc_url: String,
    pub rpc_fallback_url: Option<String>,
    pub max_response_bytes: u64,
    pub receipt_poll_attempts: u32,
    pub receipt_poll_interval_ms: u64,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            chain_id: 1,
            registry_url: DEFAULT_REGISTRY_URL.to_string(),
            factory_address: DEFAULT_FACTORY_ADDRESS,
            multicall_address: DEFAULT_MULTICALL_ADDRESS,
            chain_identities: ChainIdentities::default(),
            rpc_url: String::new(),
            rpc_fallback_url: None,
            max_response_bytes: DEFAULT_MAX_RESPONSE_BYTES,
            receipt_poll_attempts: 60,
            receipt_poll_interval_ms: 1_000,
        }
    }
}

impl ClientConfig {
    /// Defaults overridden by `RULE_MODULES_*` environment variables.
    pub fn from_env() -> Result<Self, String> {
        let mut config = Self::default();
        config.apply_env()?;
        Ok(config)
    }

    pub fn apply_env(&mut self) -> Result<(), String> {
        if let Some(raw) = env_value(CHAIN_ID_ENV) {
            self.chain_id = raw
                .parse::<u64>()
                .map_err(|error| format!("{CHAIN_ID_ENV} must be a decimal chain id: {error}"))?;
        }
        if let Some(raw) = env_value(RPC_URL_ENV) {
            self.rpc_url = raw;
        }
        if let Some(raw) = env_value(REGISTRY_URL_ENV) {
            self.registry_url = raw;
        }
        Ok(())
    }

    pub fn with_chain_identities(mut self, identities: ChainIdentities) -> Self {
        self.chain_identities = identities;
        self
    }
}

fn env_value(name: &str) -> Option<String> {
    std::env::var(name)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Parse a comma separated address list, e.g. for identity allow-lists in env files.
pub fn parse_address_list(raw: &str) -> Result<Vec<Address>, String> {
    raw.split(',')
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .map(|entry| {
            Address::from_str(entry).map_err(|error| format!("invalid address {entry}: {error}"))
        })
        .collect()
}
