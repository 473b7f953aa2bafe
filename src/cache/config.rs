//! Cache configuration.
//!
//! Controls page-cache expiry and the `Cache-Control` values attached to
//! rendered pages and static files.

use std::time::Duration;

pub(crate) const DEFAULT_PAGE_TTL_SECS: u64 = 30 * 60;
pub(crate) const DEFAULT_PAGE_CACHE_CONTROL: &str = "public, max-age=900";
pub(crate) const DEFAULT_ASSET_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";
pub(crate) const DEFAULT_STATIC_CACHE_CONTROL: &str = "public, max-age=86400";

#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Maximum age of a rendered page before lookups treat it as absent.
    pub page_ttl: Duration,
    /// `Cache-Control` attached to rendered documents.
    pub page_cache_control: String,
    /// `Cache-Control` for files under the asset prefixes.
    pub asset_cache_control: String,
    /// `Cache-Control` for other files served from the build output.
    pub static_cache_control: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            page_ttl: Duration::from_secs(DEFAULT_PAGE_TTL_SECS),
            page_cache_control: DEFAULT_PAGE_CACHE_CONTROL.to_string(),
            asset_cache_control: DEFAULT_ASSET_CACHE_CONTROL.to_string(),
            static_cache_control: DEFAULT_STATIC_CACHE_CONTROL.to_string(),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        Self {
            page_ttl: settings.page_ttl,
            page_cache_control: settings.page_cache_control.clone(),
            asset_cache_control: settings.asset_cache_control.clone(),
            static_cache_control: settings.static_cache_control.clone(),
        }
    }
}

impl CacheConfig {
    /// TTL in the representation used for timestamp arithmetic.
    pub fn page_ttl_duration(&self) -> time::Duration {
        time::Duration::try_from(self.page_ttl).unwrap_or(time::Duration::MAX)
    }
}
