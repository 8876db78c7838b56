//! ABI bindings of the attesters, safes and claims proxies and conversion of
//! their outputs into snapshot records.

use crate::rpc_client::LogEntry;
use alloy_primitives::{Address, Bytes, B256};
use alloy_sol_types::sol;
use heirloom_types::{AttesterRecord, ClaimId, ClaimRecord, SafeRecord};

sol! {
    interface Attesters {
        event AttesterUpserted(address indexed attester, string publicKey, string name, string meta, uint64 updatedAt);

        function getAttesters(uint256 offset, uint256 max) external view returns (address[] wallets, string[] publicKeys, string[] names, string[] metas, uint64[] updatedAts, bool[] existences, bool[] slashed);
    }

    interface Safes {
        event RowInserted(bytes32 indexed id, address safe_address, uint8 waiting_period, bool death_certificate, address[] attesters, bytes[] encryptedPhones, uint64 createdAt);
        event RowUpdated(bytes32 indexed id, uint8 waiting_period, bool death_certificate, address[] attesters, bytes[] encryptedPhones);

        function idsLength() external view returns (uint256);
        function ids(uint256 index) external view returns (bytes32);
        function get(bytes32 id) external view returns (address safe_address, uint8 waiting_period, bool death_certificate, address[] attesters, uint64 createdAt);
        function getEncryptedPhones(bytes32 id) external view returns (bytes[]);
    }

    interface Claims {
        event ClaimCreated(uint256 indexed id, address indexed claimer, address indexed safe, address attestor, string encryptedPhone, uint64 createdAt);
        event StatusChanged(uint256 indexed id, uint8 fromStatus, uint8 toStatus);
        event PhoneUpdated(uint256 indexed id, string oldEncryptedPhone, string newEncryptedPhone);
        event AttestorUpdated(uint256 indexed id, address oldAttestor, address newAttestor);

        function idsLength() external view returns (uint256);
        function ids(uint256 index) external view returns (uint256);
        function getClaim(uint256 id) external view returns (address claimer, address safe, address attestor, string encryptedPhone, uint64 createdAt, uint8 status);
    }
}

pub fn lowercase_address(address: &Address) -> String {
    format!("0x{}", hex::encode(address.as_slice()))
}

pub fn checksum_address(address: &Address) -> String {
    address.to_checksum(None)
}

pub fn hex_string(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

pub fn attester_from_event(event: &Attesters::AttesterUpserted, log: &LogEntry) -> AttesterRecord {
    AttesterRecord {
        address: lowercase_address(&event.attester),
        public_key: event.publicKey.clone(),
        name: event.name.clone(),
        meta: event.meta.clone(),
        updated_at: event.updatedAt.to_string(),
        block_number: Some(log.block_number),
        tx_hash: log.transaction_hash.map(|hash| hex_string(hash.as_slice())),
    }
}

/// One record per returned wallet. Columns shorter than `wallets` fill with
/// empty values.
pub fn attesters_from_page(page: Attesters::getAttestersReturn) -> Vec<AttesterRecord> {
    page.wallets
        .iter()
        .enumerate()
        .map(|(i, wallet)| AttesterRecord {
            address: lowercase_address(wallet),
            public_key: page.publicKeys.get(i).cloned().unwrap_or_default(),
            name: page.names.get(i).cloned().unwrap_or_default(),
            meta: page.metas.get(i).cloned().unwrap_or_default(),
            updated_at: page.updatedAts.get(i).copied().unwrap_or(0).to_string(),
            block_number: None,
            tx_hash: None,
        })
        .collect()
}

pub fn safe_record(id: B256, row: Safes::getReturn, encrypted_phones: &[Bytes]) -> SafeRecord {
    SafeRecord {
        id: hex_string(id.as_slice()),
        safe_address: checksum_address(&row.safe_address),
        waiting_period: row.waiting_period,
        death_certificate: row.death_certificate,
        attesters: row.attesters.iter().map(checksum_address).collect(),
        encrypted_phones: encrypted_phones.iter().map(|phone| hex_string(phone)).collect(),
        created_at: row.createdAt,
    }
}

pub fn claim_record(id: ClaimId, row: Claims::getClaimReturn) -> ClaimRecord {
    ClaimRecord {
        id,
        claimer: checksum_address(&row.claimer),
        safe: checksum_address(&row.safe),
        attestor: checksum_address(&row.attestor),
        encrypted_phone: row.encryptedPhone,
        created_at: row.createdAt,
        status: row.status,
    }
}
