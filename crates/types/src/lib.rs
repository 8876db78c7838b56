mod constants;

pub use constants::*;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type BlockNumber = u64;
pub type ClaimId = u64;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ParseError {
    #[error("unknown network: {0}")]
    UnknownNetwork(String),
    #[error("unknown entity type: {0}")]
    UnknownEntityType(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
}

impl Network {
    /// Segment used in store keys.
    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
        }
    }

    /// Prefix of the per-network environment variables.
    pub fn env_prefix(&self) -> &'static str {
        match self {
            Network::Mainnet => "MAINNET",
            Network::Testnet => "SEPOLIA",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mainnet" => Ok(Network::Mainnet),
            "testnet" | "sepolia" => Ok(Network::Testnet),
            other => Err(ParseError::UnknownNetwork(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityType {
    Attester,
    Safe,
    Claim,
}

impl EntityType {
    pub const ALL: [EntityType; 3] = [EntityType::Attester, EntityType::Safe, EntityType::Claim];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Attester => "attester",
            EntityType::Safe => "safe",
            EntityType::Claim => "claim",
        }
    }

    /// Plural name used by the read API's `module` parameter.
    pub fn module_name(&self) -> &'static str {
        match self {
            EntityType::Attester => "attesters",
            EntityType::Safe => "safes",
            EntityType::Claim => "claims",
        }
    }

    pub fn from_module(module: &str) -> Option<Self> {
        EntityType::ALL
            .into_iter()
            .find(|entity| entity.module_name() == module)
    }
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityType {
    type Err = ParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        EntityType::ALL
            .into_iter()
            .find(|entity| entity.as_str() == normalized || entity.module_name() == normalized)
            .ok_or(ParseError::UnknownEntityType(normalized))
    }
}

/// One independently watched `(entity type, network)` stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PairId {
    pub entity: EntityType,
    pub network: Network,
}

impl PairId {
    pub fn new(entity: EntityType, network: Network) -> Self {
        Self { entity, network }
    }

    pub fn snapshot_prefix(&self) -> String {
        snapshot_prefix(self.entity, self.network)
    }

    pub fn checkpoint_key(&self) -> String {
        checkpoint_key(self.entity, self.network)
    }
}

impl fmt::Display for PairId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity, self.network)
    }
}

pub fn snapshot_prefix(entity: EntityType, network: Network) -> String {
    format!("{}{sep}{}{sep}", entity, network, sep = keys::SEPARATOR)
}

pub fn snapshot_key(entity: EntityType, network: Network, id: &str) -> String {
    format!("{}{}", snapshot_prefix(entity, network), id)
}

pub fn checkpoint_key(entity: EntityType, network: Network) -> String {
    format!(
        "{}{sep}{}{sep}{}",
        keys::CHECKPOINT_PREFIX,
        entity,
        network,
        sep = keys::SEPARATOR
    )
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttesterRecord {
    pub address: String,
    pub public_key: String,
    pub name: String,
    pub meta: String,
    pub updated_at: String,
    #[serde(rename = "_blockNumber", default, skip_serializing_if = "Option::is_none")]
    pub block_number: Option<BlockNumber>,
    #[serde(rename = "_txHash", default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafeRecord {
    pub id: String,
    pub safe_address: String,
    pub waiting_period: u8,
    pub death_certificate: bool,
    pub attesters: Vec<String>,
    #[serde(rename = "encryptedPhones")]
    pub encrypted_phones: Vec<String>,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimRecord {
    pub id: ClaimId,
    pub claimer: String,
    pub safe: String,
    pub attestor: String,
    #[serde(rename = "encryptedPhone")]
    pub encrypted_phone: String,
    #[serde(rename = "createdAt")]
    pub created_at: u64,
    pub status: u8,
}

/// Latest known state of one on-chain record. Serializes to the bare record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum Snapshot {
    Attester(AttesterRecord),
    Safe(SafeRecord),
    Claim(ClaimRecord),
}

impl Snapshot {
    pub fn entity_type(&self) -> EntityType {
        match self {
            Snapshot::Attester(_) => EntityType::Attester,
            Snapshot::Safe(_) => EntityType::Safe,
            Snapshot::Claim(_) => EntityType::Claim,
        }
    }

    pub fn entity_id(&self) -> String {
        match self {
            Snapshot::Attester(record) => record.address.clone(),
            Snapshot::Safe(record) => record.id.clone(),
            Snapshot::Claim(record) => record.id.to_string(),
        }
    }

    pub fn key(&self, network: Network) -> String {
        snapshot_key(self.entity_type(), network, &self.entity_id())
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Decodes a stored value back into the snapshot shape for `entity`.
    pub fn from_json(entity: EntityType, raw: &str) -> Result<Self, serde_json::Error> {
        Ok(match entity {
            EntityType::Attester => Snapshot::Attester(serde_json::from_str(raw)?),
            EntityType::Safe => Snapshot::Safe(serde_json::from_str(raw)?),
            EntityType::Claim => Snapshot::Claim(serde_json::from_str(raw)?),
        })
    }
}
