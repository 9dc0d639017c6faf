//! A time-limited, on-disk cache of search results in front of any [`Catalog`].
//!
//! Entries are keyed by catalogue base URL and collection filter and hold the
//! full result set, so a fresh entry answers both `count` and `search`.
use crate::catalog::CatalogItem;
use crate::error::SyncError;
use crate::search::Catalog;
use futures_util::stream::{self, LocalBoxStream, StreamExt, TryStreamExt};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

pub const CACHE_FILE_NAME: &str = ".catalog_cache.json";

#[derive(Deserialize, Serialize, Debug, Default)]
struct CacheFile {
    entries: HashMap<String, CacheEntry>,
}

#[derive(Deserialize, Serialize, Debug)]
struct CacheEntry {
    fetched_at: u64,
    items: Vec<CatalogItem>,
}

pub struct CachedCatalog<C> {
    inner: C,
    base_url: String,
    path: PathBuf,
    ttl: Duration,
}

impl<C: Catalog> CachedCatalog<C> {
    pub fn new(inner: C, base_url: &str, path: impl Into<PathBuf>, ttl: Duration) -> Self {
        Self {
            inner,
            base_url: base_url.trim_end_matches('/').to_owned(),
            path: path.into(),
            ttl,
        }
    }

    /// Cache stored as `.catalog_cache.json` inside `data_dir`.
    pub fn in_data_dir(inner: C, base_url: &str, data_dir: &Path, ttl_mins: u64) -> Self {
        Self::new(
            inner,
            base_url,
            data_dir.join(CACHE_FILE_NAME),
            Duration::from_secs(ttl_mins * 60),
        )
    }

    fn key(&self, collection_ids: &[String]) -> String {
        format!("{}|{}", self.base_url, collection_ids.join(","))
    }

    async fn read(&self) -> Result<CacheFile, SyncError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => Ok(serde_json::from_str(&content)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(CacheFile::default()),
            Err(e) => Err(SyncError::io(&self.path, e)),
        }
    }

    async fn write(&self, cache: &CacheFile) -> Result<(), SyncError> {
        let content = serde_json::to_string_pretty(cache)?;
        tokio::fs::write(&self.path, content)
            .await
            .map_err(|e| SyncError::io(&self.path, e))
    }

    async fn fresh_items(&self, collection_ids: &[String]) -> Result<Option<Vec<CatalogItem>>, SyncError> {
        let mut cache = self.read().await?;
        let now = now_secs();
        let fresh = cache
            .entries
            .remove(&self.key(collection_ids))
            .filter(|entry| now.saturating_sub(entry.fetched_at) < self.ttl.as_secs())
            .map(|entry| entry.items);
        Ok(fresh)
    }

    async fn load_or_fetch(&self, collection_ids: &[String]) -> Result<Vec<CatalogItem>, SyncError> {
        if let Some(items) = self.fresh_items(collection_ids).await? {
            debug!(items = items.len(), "Search cache hit");
            return Ok(items);
        }

        info!(path = %self.path.display(), "Search cache expired, refreshing");
        let items: Vec<CatalogItem> = self.inner.search(collection_ids).try_collect().await?;

        let mut cache = self.read().await?;
        cache.entries.insert(
            self.key(collection_ids),
            CacheEntry {
                fetched_at: now_secs(),
                items: items.clone(),
            },
        );
        self.write(&cache).await?;
        Ok(items)
    }
}

impl<C: Catalog> Catalog for CachedCatalog<C> {
    async fn count(&self, collection_ids: &[String]) -> Result<u64, SyncError> {
        match self.fresh_items(collection_ids).await? {
            Some(items) => Ok(items.len() as u64),
            None => self.inner.count(collection_ids).await,
        }
    }

    fn search<'a>(
        &'a self,
        collection_ids: &'a [String],
    ) -> LocalBoxStream<'a, Result<CatalogItem, SyncError>> {
        stream::once(self.load_or_fetch(collection_ids))
            .map_ok(|items| stream::iter(items.into_iter().map(Ok::<_, SyncError>)))
            .try_flatten()
            .boxed_local()
    }

    async fn list_collections(&self) -> Result<Vec<String>, SyncError> {
        self.inner.list_collections().await
    }

    async fn invalidate(&self, collection_ids: &[String]) -> Result<(), SyncError> {
        let mut cache = self.read().await?;
        if cache.entries.remove(&self.key(collection_ids)).is_some() {
            debug!(collections = ?collection_ids, "Dropped cached search results");
            self.write(&cache).await?;
        }
        self.inner.invalidate(collection_ids).await
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
