use async_trait::async_trait;
use std::path::Path;

/// One page of a prefix listing.
///
/// Every listing call returns its own page value; nothing about a listing is
/// kept between calls except the continuation token the caller passes back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListPage {
    pub keys: Vec<String>,
    /// Groups of keys rolled up at the delimiter. They count toward the page size.
    pub common_prefixes: Vec<String>,
    pub is_truncated: bool,
    pub next_continuation_token: Option<String>,
}

/// The slice of an object store the compactor needs.
///
/// Any error is fatal to the stage that issued the call. Retrying, if wanted,
/// belongs inside an implementation.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// List up to `max_keys` entries under `prefix` in ascending lexicographic order.
    ///
    /// With a `delimiter`, keys containing it after the prefix are rolled up
    /// into `common_prefixes` instead of being returned one by one.
    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
        max_keys: i32,
    ) -> Result<ListPage, StoreError>;

    /// Stream an object's body into a local file, returning the bytes written.
    async fn download(&self, key: &str, dest: &Path) -> Result<u64, StoreError>;

    /// Store a local file's contents under `key`.
    async fn upload(&self, key: &str, src: &Path) -> Result<(), StoreError>;

    /// Delete every key in `keys`.
    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError>;

    /// Every key under `prefix`, following continuation tokens to the end.
    async fn list_all(&self, prefix: &str) -> Result<Vec<String>, StoreError> {
        let mut keys = Vec::new();
        let mut token: Option<String> = None;

        loop {
            let page = self.list_page(prefix, None, token.as_deref(), 1000).await?;
            keys.extend(page.keys);

            match (page.is_truncated, page.next_continuation_token) {
                (true, Some(next)) => token = Some(next),
                _ => break,
            }
        }

        Ok(keys)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("list '{prefix}' failed: {message}")]
    List { prefix: String, message: String },

    #[error("get '{key}' failed: {message}")]
    Get { key: String, message: String },

    #[error("object '{0}' not found")]
    NotFound(String),

    #[error("put '{key}' failed: {message}")]
    Put { key: String, message: String },

    #[error("delete of {count} keys failed: {message}")]
    Delete { count: usize, message: String },

    #[error("invalid request: {0}")]
    Request(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}
