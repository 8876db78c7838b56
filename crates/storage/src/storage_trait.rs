use async_trait::async_trait;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("store backend error: {0}")]
    Backend(String),
    #[error("stored value is not valid: {0}")]
    Encoding(String),
    #[error("unsupported store url: {0}")]
    UnsupportedUrl(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Encoding(e.to_string())
    }
}

/// Flat string key-value map shared by the watcher and the read API.
///
/// Every single-key write is atomic. Nothing spans more than one key, so a
/// caller that writes several keys must tolerate partial application.
#[async_trait]
pub trait KvStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Removes every entry whose key starts with `prefix`, returning how many
    /// entries were removed.
    async fn delete_prefix(&self, prefix: &str) -> Result<usize, StoreError>;

    /// Keys starting with `prefix`, in ascending order.
    async fn list_keys(&self, prefix: &str) -> Result<Vec<String>, StoreError>;

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}
