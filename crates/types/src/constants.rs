pub mod keys {
    pub const CHECKPOINT_PREFIX: &str = "lastBlock";
    pub const SEPARATOR: char = ':';
}

pub mod limits {
    /// Widest block range requested in a single `eth_getLogs` call.
    pub const LOG_CHUNK_SIZE: u64 = 100;
    /// Rows requested from a bulk view call during bootstrap.
    pub const BOOTSTRAP_PAGE_SIZE: u64 = 1000;
}

pub mod defaults {
    pub const CONFIRMATIONS: u64 = 5;
    pub const STORE_URL: &str = "redis://localhost:6379";
    pub const RPC_TIMEOUT_SECONDS: u64 = 30;
    pub const MAX_RETRIES: u32 = 3;
    pub const RETRY_DELAY_SECONDS: u64 = 1;
    pub const POLL_INTERVAL_SECONDS: u64 = 3;
    pub const BACKOFF_BASE_MS: u64 = 500;
    pub const BACKOFF_MAX_SECONDS: u64 = 60;
}
