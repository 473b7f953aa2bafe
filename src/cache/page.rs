//! Rendered-page cache.
//!
//! Every entry carries its document in three encodings computed once at store
//! time. Lookups treat entries older than the TTL as absent; they are only
//! physically removed by [`PageCache::sweep_expired`] or [`PageCache::clear`].

use std::{
    collections::HashMap,
    sync::{Arc, RwLock},
};

use axum::http::{HeaderName, HeaderValue};
use bytes::Bytes;
use metrics::counter;
use serde::Serialize;
use time::{Duration, OffsetDateTime};
use tracing::{debug, warn};

use super::{
    clock::Clock,
    config::CacheConfig,
    encoding::{ContentEncoding, compress},
    keys::PageKey,
    lock::{rw_read, rw_write},
};

const SOURCE: &str = "cache::page";

/// One document in every encoding the server offers.
#[derive(Debug, Clone)]
pub struct PayloadVariants {
    pub identity: Bytes,
    pub gzip: Option<Bytes>,
    pub brotli: Option<Bytes>,
}

impl PayloadVariants {
    /// Compress `document` with every supported algorithm. A failed
    /// compression leaves that variant empty; identity is always present.
    pub fn build(document: Bytes) -> Self {
        let gzip = compress_variant(&document, ContentEncoding::Gzip);
        let brotli = compress_variant(&document, ContentEncoding::Brotli);
        Self {
            identity: document,
            gzip,
            brotli,
        }
    }

    /// Best available payload for the negotiated encoding.
    pub fn select(&self, wanted: ContentEncoding) -> (ContentEncoding, &Bytes) {
        match wanted {
            ContentEncoding::Brotli => match &self.brotli {
                Some(body) => (ContentEncoding::Brotli, body),
                None => self.select(ContentEncoding::Gzip),
            },
            ContentEncoding::Gzip => match &self.gzip {
                Some(body) => (ContentEncoding::Gzip, body),
                None => (ContentEncoding::Identity, &self.identity),
            },
            ContentEncoding::Identity => (ContentEncoding::Identity, &self.identity),
        }
    }
}

fn compress_variant(document: &[u8], encoding: ContentEncoding) -> Option<Bytes> {
    match compress(document, encoding) {
        Ok(body) => Some(Bytes::from(body)),
        Err(err) => {
            warn!(
                target = "frontgate::cache::page",
                encoding = ?encoding,
                error = %err,
                "failed to compress page variant"
            );
            None
        }
    }
}

#[derive(Debug, Clone)]
pub struct PageCacheEntry {
    pub key: PageKey,
    pub variants: PayloadVariants,
    pub created_at: OffsetDateTime,
    pub headers: Vec<(HeaderName, HeaderValue)>,
}

impl PageCacheEntry {
    pub fn new(
        key: PageKey,
        document: Bytes,
        headers: Vec<(HeaderName, HeaderValue)>,
        created_at: OffsetDateTime,
    ) -> Self {
        Self {
            key,
            variants: PayloadVariants::build(document),
            created_at,
            headers,
        }
    }

    /// The uncompressed rendered document.
    pub fn document(&self) -> &Bytes {
        &self.variants.identity
    }

    fn is_expired(&self, now: OffsetDateTime, ttl: Duration) -> bool {
        now - self.created_at > ttl
    }
}

/// Entry counts classified by age at query time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub total: usize,
    pub valid: usize,
    pub expired: usize,
}

pub struct PageCache {
    entries: RwLock<HashMap<PageKey, Arc<PageCacheEntry>>>,
    ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl PageCache {
    pub fn new(config: &CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            ttl: config.page_ttl_duration(),
            clock,
        }
    }

    pub fn lookup(&self, key: &PageKey) -> Option<Arc<PageCacheEntry>> {
        let now = self.clock.now();
        let entries = rw_read(&self.entries, SOURCE, "lookup");
        match entries.get(key) {
            Some(entry) if !entry.is_expired(now, self.ttl) => {
                counter!("frontgate_page_cache_hit_total").increment(1);
                Some(Arc::clone(entry))
            }
            Some(_) => {
                counter!("frontgate_page_cache_expired_total").increment(1);
                None
            }
            None => {
                counter!("frontgate_page_cache_miss_total").increment(1);
                None
            }
        }
    }

    /// Build an entry stamped with the cache clock without storing it.
    pub fn prepare(
        &self,
        key: PageKey,
        document: Bytes,
        headers: Vec<(HeaderName, HeaderValue)>,
    ) -> PageCacheEntry {
        PageCacheEntry::new(key, document, headers, self.clock.now())
    }

    /// Build the compressed variants for `document` and store them under `key`.
    pub fn store(
        &self,
        key: PageKey,
        document: Bytes,
        headers: Vec<(HeaderName, HeaderValue)>,
    ) -> Arc<PageCacheEntry> {
        let entry = Arc::new(self.prepare(key, document, headers));
        self.insert(Arc::clone(&entry));
        entry
    }

    /// Store a prepared entry, replacing any previous entry for the same key.
    pub fn insert(&self, entry: Arc<PageCacheEntry>) {
        debug!(cache = "page", key = %entry.key, "storing rendered page");
        rw_write(&self.entries, SOURCE, "insert").insert(entry.key.clone(), entry);
    }

    /// Remove every entry, returning how many were present.
    pub fn clear(&self) -> usize {
        let mut entries = rw_write(&self.entries, SOURCE, "clear");
        let removed = entries.len();
        entries.clear();
        removed
    }

    pub fn stats(&self) -> CacheStats {
        let now = self.clock.now();
        let entries = rw_read(&self.entries, SOURCE, "stats");
        let expired = entries
            .values()
            .filter(|entry| entry.is_expired(now, self.ttl))
            .count();
        CacheStats {
            total: entries.len(),
            valid: entries.len() - expired,
            expired,
        }
    }

    /// Drop entries older than the TTL, returning how many were removed.
    pub fn sweep_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = rw_write(&self.entries, SOURCE, "sweep_expired");
        let before = entries.len();
        entries.retain(|_, entry| !entry.is_expired(now, self.ttl));
        let removed = before - entries.len();
        if removed > 0 {
            counter!("frontgate_page_cache_swept_total").increment(removed as u64);
            debug!(cache = "page", removed, "swept expired pages");
        }
        removed
    }

    pub fn len(&self) -> usize {
        rw_read(&self.entries, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
