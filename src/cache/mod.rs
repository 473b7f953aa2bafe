//! Frontgate cache layer
//!
//! Two independent caches sit in front of the renderer:
//!
//! - **Page cache**: rendered documents keyed by route and device class, each
//!   stored once per encoding (identity, gzip, brotli) and bounded by a TTL.
//! - **Static file cache**: file contents and their content hash keyed by
//!   absolute path, revalidated against the file's modification time.
//!
//! ## Configuration
//!
//! ```toml
//! [cache]
//! page_ttl_seconds = 1800
//! page_cache_control = "public, max-age=900"
//! ```

mod clock;
pub(crate) mod config;
mod encoding;
mod keys;
mod lock;
mod page;
mod static_files;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::CacheConfig;
pub use encoding::{ContentEncoding, compress, is_compressible};
pub use keys::PageKey;
pub use page::{CacheStats, PageCache, PageCacheEntry, PayloadVariants};
pub use static_files::{ServedFile, StaticFileCache, StaticFileEntry, StaticRoot, content_etag};
