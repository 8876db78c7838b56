use crate::error::WatchError;
use alloy_primitives::Address;
use heirloom_types::{defaults, limits, EntityType, Network, PairId};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

const SEPOLIA_ATTESTERS_PROXY: &str = "0xd40C18eFfD79d28D16ffBEbB8Cb059825376dA7D";
const SEPOLIA_SAFES_PROXY: &str = "0x354Ca87d709fBB8Afc853A7AF6EFB6C865023163";
const SEPOLIA_CLAIMS_PROXY: &str = "0xc9a15ECc6AB6dA17E8EaF9177d31Ef55b0a50Ede";
const MAINNET_CLAIMS_PROXY: &str = "0xCBED2362c00587720aC216C37E4b62bCAB2F53E1";

/// Which networks the process watches.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NetworkSelection {
    Mainnet,
    Testnet,
    Both,
}

impl NetworkSelection {
    /// `mainnet` wins over `testnet`; neither set means both.
    pub fn from_flags(mainnet: bool, testnet: bool) -> Self {
        if mainnet {
            NetworkSelection::Mainnet
        } else if testnet {
            NetworkSelection::Testnet
        } else {
            NetworkSelection::Both
        }
    }

    pub fn networks(&self) -> Vec<Network> {
        match self {
            NetworkSelection::Mainnet => vec![Network::Mainnet],
            NetworkSelection::Testnet => vec![Network::Testnet],
            NetworkSelection::Both => vec![Network::Testnet, Network::Mainnet],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub network: Network,
    pub rpc_url: Option<String>,
    pub ws_url: Option<String>,
    pub attesters_address: Option<String>,
    pub safes_address: Option<String>,
    pub claims_address: Option<String>,
    pub start_block: Option<u64>,
    pub confirmations: u64,
}

impl NetworkConfig {
    pub fn from_lookup<F>(network: Network, lookup: &F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let prefix = network.env_prefix();
        let var = |name: &str| non_empty(lookup(&format!("{}_{}", prefix, name)));
        let fallback = |value: &str| match network {
            Network::Testnet if !value.is_empty() => Some(value.to_string()),
            _ => None,
        };

        Self {
            network,
            rpc_url: var("RPC_URL"),
            ws_url: var("RPC_WS"),
            attesters_address: var("ATTESTERS_PROXY").or_else(|| fallback(SEPOLIA_ATTESTERS_PROXY)),
            safes_address: var("SAFES_PROXY").or_else(|| fallback(SEPOLIA_SAFES_PROXY)),
            claims_address: var("CLAIMS_PROXY").or_else(|| match network {
                Network::Mainnet => Some(MAINNET_CLAIMS_PROXY.to_string()),
                Network::Testnet => Some(SEPOLIA_CLAIMS_PROXY.to_string()),
            }),
            start_block: var("START_BLOCK").and_then(|v| v.parse().ok()),
            confirmations: var("CONFIRMATIONS")
                .and_then(|v| v.parse().ok())
                .or_else(|| non_empty(lookup("CONFIRMATIONS")).and_then(|v| v.parse().ok()))
                .unwrap_or(defaults::CONFIRMATIONS),
        }
    }

    pub fn contract_address(&self, entity: EntityType) -> Option<&str> {
        match entity {
            EntityType::Attester => self.attesters_address.as_deref(),
            EntityType::Safe => self.safes_address.as_deref(),
            EntityType::Claim => self.claims_address.as_deref(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RpcSettings {
    pub timeout_seconds: u64,
    pub max_retries: u32,
    pub retry_delay_seconds: u64,
    pub poll_interval_seconds: u64,
}

impl Default for RpcSettings {
    fn default() -> Self {
        Self {
            timeout_seconds: defaults::RPC_TIMEOUT_SECONDS,
            max_retries: defaults::MAX_RETRIES,
            retry_delay_seconds: defaults::RETRY_DELAY_SECONDS,
            poll_interval_seconds: defaults::POLL_INTERVAL_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct BackoffConfig {
    pub base_ms: u64,
    pub max_seconds: u64,
}

impl BackoffConfig {
    pub fn base(&self) -> Duration {
        Duration::from_millis(self.base_ms)
    }

    pub fn max(&self) -> Duration {
        Duration::from_secs(self.max_seconds)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_ms: defaults::BACKOFF_BASE_MS,
            max_seconds: defaults::BACKOFF_MAX_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WatcherConfig {
    pub networks: Vec<NetworkConfig>,
    pub entities: Vec<EntityType>,
    pub rpc: RpcSettings,
    pub backoff: BackoffConfig,
    pub log_chunk_size: u64,
    pub bootstrap_page_size: u64,
    pub resume_from_checkpoint: bool,
}

impl WatcherConfig {
    pub fn from_env(selection: NetworkSelection) -> Self {
        Self::from_lookup(selection, |name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(selection: NetworkSelection, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let parsed = |name: &str| non_empty(lookup(name)).and_then(|v| v.parse::<u64>().ok());

        let entities = non_empty(lookup("WATCH_ENTITIES"))
            .map(|list| parse_entities(&list))
            .filter(|entities| !entities.is_empty())
            .unwrap_or_else(|| EntityType::ALL.to_vec());

        Self {
            networks: selection
                .networks()
                .into_iter()
                .map(|network| NetworkConfig::from_lookup(network, &lookup))
                .collect(),
            entities,
            rpc: RpcSettings {
                timeout_seconds: parsed("RPC_TIMEOUT_SECONDS")
                    .unwrap_or(defaults::RPC_TIMEOUT_SECONDS),
                max_retries: non_empty(lookup("MAX_RETRIES"))
                    .and_then(|v| v.parse().ok())
                    .unwrap_or(defaults::MAX_RETRIES),
                retry_delay_seconds: parsed("RETRY_DELAY_SECONDS")
                    .unwrap_or(defaults::RETRY_DELAY_SECONDS),
                poll_interval_seconds: parsed("POLL_INTERVAL_SECONDS")
                    .unwrap_or(defaults::POLL_INTERVAL_SECONDS),
            },
            backoff: BackoffConfig {
                base_ms: parsed("BACKOFF_BASE_MS").unwrap_or(defaults::BACKOFF_BASE_MS),
                max_seconds: parsed("BACKOFF_MAX_SECONDS").unwrap_or(defaults::BACKOFF_MAX_SECONDS),
            },
            log_chunk_size: parsed("LOG_CHUNK_SIZE")
                .filter(|size| *size > 0)
                .unwrap_or(limits::LOG_CHUNK_SIZE),
            bootstrap_page_size: parsed("BOOTSTRAP_PAGE_SIZE")
                .filter(|size| *size > 0)
                .unwrap_or(limits::BOOTSTRAP_PAGE_SIZE),
            resume_from_checkpoint: non_empty(lookup("RESUME_FROM_CHECKPOINT"))
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false),
        }
    }

    /// Every selected `(entity, network)` combination, valid or not.
    pub fn pairs(&self) -> Vec<PairId> {
        self.networks
            .iter()
            .flat_map(|network| {
                self.entities
                    .iter()
                    .map(move |entity| PairId::new(*entity, network.network))
            })
            .collect()
    }

    /// Resolves the settings for one pair, failing when its endpoint or
    /// contract address is missing or malformed.
    pub fn pair_config(&self, pair: PairId) -> Result<PairConfig, WatchError> {
        let network = self
            .networks
            .iter()
            .find(|n| n.network == pair.network)
            .ok_or_else(|| {
                WatchError::Config(format!("{} is not a selected network", pair.network))
            })?;

        // A WebSocket-only network carries its JSON-RPC requests over the socket.
        let rpc_url = network
            .rpc_url
            .clone()
            .or_else(|| network.ws_url.clone())
            .ok_or_else(|| {
                let prefix = pair.network.env_prefix();
                WatchError::Config(format!("neither {0}_RPC_URL nor {0}_RPC_WS is set", prefix))
            })?;

        let raw_address = network.contract_address(pair.entity).ok_or_else(|| {
            WatchError::Config(format!("no {} contract address for {}", pair.entity, pair.network))
        })?;
        let contract = Address::from_str(raw_address).map_err(|e| {
            WatchError::Config(format!(
                "invalid {} contract address {}: {}",
                pair.entity, raw_address, e
            ))
        })?;

        Ok(PairConfig {
            pair,
            rpc_url,
            ws_url: network.ws_url.clone(),
            contract,
            start_block: network.start_block,
            confirmations: network.confirmations,
            log_chunk_size: self.log_chunk_size,
            bootstrap_page_size: self.bootstrap_page_size,
            rpc: self.rpc.clone(),
            backoff: self.backoff,
            resume_from_checkpoint: self.resume_from_checkpoint,
        })
    }
}

/// Fully resolved settings for one watched pair.
#[derive(Debug, Clone)]
pub struct PairConfig {
    pub pair: PairId,
    pub rpc_url: String,
    pub ws_url: Option<String>,
    pub contract: Address,
    pub start_block: Option<u64>,
    pub confirmations: u64,
    pub log_chunk_size: u64,
    pub bootstrap_page_size: u64,
    pub rpc: RpcSettings,
    pub backoff: BackoffConfig,
    pub resume_from_checkpoint: bool,
}

pub fn parse_entities(list: &str) -> Vec<EntityType> {
    let mut entities = Vec::new();
    for entity in list.split(',').filter_map(|item| item.parse::<EntityType>().ok()) {
        if !entities.contains(&entity) {
            entities.push(entity);
        }
    }
    entities
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
