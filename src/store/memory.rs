use super::traits::{ListPage, ObjectStore, StoreError};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::ops::Bound;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

/// In-process object store with S3-like listing semantics.
///
/// Keys are kept ordered so listings come back lexicographically, and the
/// continuation token is simply the last key of the previous page.
#[derive(Debug, Default)]
pub struct MemoryStore {
    objects: Mutex<BTreeMap<String, Vec<u8>>>,
    list_calls: AtomicUsize,
    delete_calls: AtomicUsize,
    put_calls: AtomicUsize,
    fail_downloads: Mutex<Vec<String>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&self, key: impl Into<String>, body: impl Into<Vec<u8>>) {
        self.lock().insert(key.into(), body.into());
    }

    pub fn get(&self, key: &str) -> Option<Vec<u8>> {
        self.lock().get(key).cloned()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.lock().contains_key(key)
    }

    pub fn keys(&self) -> Vec<String> {
        self.lock().keys().cloned().collect()
    }

    /// Make every download of `key` fail, to exercise error paths.
    pub fn fail_download_of(&self, key: impl Into<String>) {
        if let Ok(mut failing) = self.fail_downloads.lock() {
            failing.push(key.into());
        }
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> usize {
        self.delete_calls.load(Ordering::SeqCst)
    }

    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<String, Vec<u8>>> {
        // A poisoned map is still structurally valid
        self.objects.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn download_should_fail(&self, key: &str) -> bool {
        self.fail_downloads
            .lock()
            .map(|failing| failing.iter().any(|k| k == key))
            .unwrap_or(false)
    }
}

enum Entry {
    Key(String),
    Prefix(String),
}

#[async_trait]
impl ObjectStore for MemoryStore {
    async fn list_page(
        &self,
        prefix: &str,
        delimiter: Option<&str>,
        continuation_token: Option<&str>,
        max_keys: i32,
    ) -> Result<ListPage, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);

        if max_keys <= 0 {
            return Err(StoreError::Request(format!(
                "max_keys must be positive, got {}",
                max_keys
            )));
        }
        let max_keys = max_keys as usize;
        let delimiter = delimiter.filter(|d| !d.is_empty());

        let objects = self.lock();
        let lower = match continuation_token {
            Some(token) => Bound::Excluded(token.to_string()),
            None => Bound::Included(prefix.to_string()),
        };

        // A token that is itself a rolled-up prefix resumes after everything it covers
        let mut last_rollup: Option<String> = continuation_token
            .filter(|token| delimiter.is_some_and(|d| token.ends_with(d)))
            .map(str::to_string);

        let mut entries = objects
            .range((lower, Bound::Unbounded))
            .map(|(key, _)| key)
            .skip_while(|key| key.as_str() < prefix)
            .take_while(|key| key.starts_with(prefix))
            .filter_map(|key| {
                let rollup = delimiter.and_then(|d| {
                    let rest = &key[prefix.len()..];
                    rest.find(d)
                        .map(|idx| key[..prefix.len() + idx + d.len()].to_string())
                });

                match rollup {
                    Some(common) if last_rollup.as_deref() == Some(common.as_str()) => None,
                    Some(common) => {
                        last_rollup = Some(common.clone());
                        Some(Entry::Prefix(common))
                    }
                    None => Some(Entry::Key(key.clone())),
                }
            });

        let mut page = ListPage::default();
        let mut last = None;
        for entry in entries.by_ref().take(max_keys) {
            match entry {
                Entry::Key(key) => {
                    last = Some(key.clone());
                    page.keys.push(key);
                }
                Entry::Prefix(common) => {
                    last = Some(common.clone());
                    page.common_prefixes.push(common);
                }
            }
        }

        page.is_truncated = entries.next().is_some();
        if page.is_truncated {
            page.next_continuation_token = last;
        }
        Ok(page)
    }

    async fn download(&self, key: &str, dest: &Path) -> Result<u64, StoreError> {
        if self.download_should_fail(key) {
            return Err(StoreError::Get {
                key: key.to_string(),
                message: "injected failure".to_string(),
            });
        }

        let body = self
            .get(key)
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        tokio::fs::write(dest, &body).await?;
        Ok(body.len() as u64)
    }

    async fn upload(&self, key: &str, src: &Path) -> Result<(), StoreError> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);
        let body = tokio::fs::read(src).await?;
        self.insert(key, body);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<(), StoreError> {
        self.delete_calls.fetch_add(1, Ordering::SeqCst);
        let mut objects = self.lock();
        for key in keys {
            objects.remove(key);
        }
        Ok(())
    }
}
