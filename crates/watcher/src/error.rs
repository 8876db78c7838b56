use heirloom_storage::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    /// The node cannot be reached or the header subscription was lost.
    #[error("connection error: {0}")]
    Connection(String),
    /// A JSON-RPC request was rejected or its result could not be decoded.
    #[error("contract call failed: {0}")]
    Call(String),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("configuration error: {0}")]
    Config(String),
}
