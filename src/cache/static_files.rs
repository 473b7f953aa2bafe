//! Content-addressed static file cache with conditional-request support.
//!
//! Entries are keyed by absolute path and revalidated against the file's
//! modification time on every lookup, so a rebuilt asset is picked up on the
//! next request without any explicit invalidation.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::SystemTime,
};

use axum::{
    http::{HeaderMap, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use bytes::Bytes;
use dashmap::DashMap;
use metrics::counter;
use percent_encoding::percent_decode_str;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use super::encoding::{ContentEncoding, compress, is_compressible};

/// A URL prefix mapped onto a directory, with the cache policy for its files.
#[derive(Debug, Clone)]
pub struct StaticRoot {
    url_prefix: String,
    directory: PathBuf,
    cache_control: String,
    extensions: Option<Vec<String>>,
}

impl StaticRoot {
    pub fn new(
        url_prefix: impl Into<String>,
        directory: impl Into<PathBuf>,
        cache_control: impl Into<String>,
    ) -> Self {
        Self {
            url_prefix: url_prefix.into(),
            directory: directory.into(),
            cache_control: cache_control.into(),
            extensions: None,
        }
    }

    /// Only serve files whose extension is in `extensions` (case-insensitive).
    pub fn with_extensions(mut self, extensions: &[&str]) -> Self {
        self.extensions = Some(
            extensions
                .iter()
                .map(|extension| extension.to_ascii_lowercase())
                .collect(),
        );
        self
    }

    fn allows(&self, path: &Path) -> bool {
        let Some(allowed) = &self.extensions else {
            return true;
        };
        path.extension()
            .and_then(|extension| extension.to_str())
            .is_some_and(|extension| {
                allowed
                    .iter()
                    .any(|candidate| candidate.eq_ignore_ascii_case(extension))
            })
    }

    pub fn matches(&self, request_path: &str) -> bool {
        request_path.starts_with(&self.url_prefix)
    }

    /// Map a request path to a file below the root. Segments are
    /// percent-decoded before they are checked. Paths outside the prefix,
    /// directory-like paths, disallowed extensions and any traversal attempt
    /// resolve to `None`.
    pub fn resolve(&self, request_path: &str) -> Option<PathBuf> {
        let relative = request_path.strip_prefix(&self.url_prefix)?;
        let relative = relative.trim_start_matches('/');
        if relative.is_empty() || relative.ends_with('/') {
            return None;
        }

        let mut resolved = self.directory.clone();
        for raw in relative.split('/') {
            let segment = percent_decode_str(raw).decode_utf8().ok()?;
            if segment.is_empty()
                || segment == "."
                || segment == ".."
                || segment.contains(['/', '\\', '\0'])
            {
                return None;
            }
            resolved.push(&*segment);
        }
        self.allows(&resolved).then_some(resolved)
    }
}

#[derive(Debug, Clone)]
pub struct StaticFileEntry {
    pub path: PathBuf,
    pub contents: Bytes,
    pub etag: String,
    pub modified: Option<SystemTime>,
}

impl StaticFileEntry {
    fn load(path: PathBuf, contents: Bytes, modified: Option<SystemTime>) -> Self {
        let etag = content_etag(&contents);
        Self {
            path,
            contents,
            etag,
            modified,
        }
    }

    fn is_current(&self, modified: Option<SystemTime>) -> bool {
        modified.is_some() && self.modified == modified
    }
}

/// Quoted hex SHA-256 of the content.
pub fn content_etag(contents: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(contents);
    format!("\"{}\"", hex::encode(hasher.finalize()))
}

/// Response produced for a served (or not-modified) static file.
#[derive(Debug, Clone)]
pub struct ServedFile {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ServedFile {
    pub fn etag(&self) -> Option<&str> {
        self.headers
            .get(header::ETAG)
            .and_then(|value| value.to_str().ok())
    }
}

impl IntoResponse for ServedFile {
    fn into_response(self) -> Response {
        (self.status, self.headers, self.body).into_response()
    }
}

#[derive(Debug, Default)]
pub struct StaticFileCache {
    entries: DashMap<PathBuf, Arc<StaticFileEntry>>,
}

impl StaticFileCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serve `request_path` from `root`. `None` means "not served": the file
    /// is absent, not a regular file, unreadable, or the path was rejected.
    pub async fn serve(
        &self,
        root: &StaticRoot,
        request_path: &str,
        if_none_match: Option<&str>,
        accept_encoding: Option<&str>,
    ) -> Option<ServedFile> {
        let path = root.resolve(request_path)?;
        let entry = self.entry_for(path).await?;

        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(&entry.etag) {
            headers.insert(header::ETAG, value);
        }
        if let Ok(value) = HeaderValue::from_str(&root.cache_control) {
            headers.insert(header::CACHE_CONTROL, value);
        }

        if if_none_match == Some(entry.etag.as_str()) {
            counter!("frontgate_static_not_modified_total").increment(1);
            return Some(ServedFile {
                status: StatusCode::NOT_MODIFIED,
                headers,
                body: Bytes::new(),
            });
        }

        let mime = mime_guess::from_path(&entry.path).first_or_octet_stream();
        if let Ok(value) = HeaderValue::from_str(mime.as_ref()) {
            headers.insert(header::CONTENT_TYPE, value);
        }

        let mut body = entry.contents.clone();
        if is_compressible(mime.essence_str()) {
            headers.insert(header::VARY, HeaderValue::from_static("accept-encoding"));
            let encoding = ContentEncoding::negotiate(accept_encoding);
            if let Some(token) = encoding.header_value() {
                match compress(&entry.contents, encoding) {
                    Ok(compressed) => {
                        body = Bytes::from(compressed);
                        headers.insert(header::CONTENT_ENCODING, HeaderValue::from_static(token));
                    }
                    Err(err) => warn!(
                        target = "frontgate::cache::static_files",
                        path = %entry.path.display(),
                        error = %err,
                        "compression failed; serving identity"
                    ),
                }
            }
        }

        Some(ServedFile {
            status: StatusCode::OK,
            headers,
            body,
        })
    }

    async fn entry_for(&self, path: PathBuf) -> Option<Arc<StaticFileEntry>> {
        let metadata = match tokio::fs::metadata(&path).await {
            Ok(metadata) => metadata,
            Err(err) => {
                debug!(path = %path.display(), error = %err, "static file unavailable");
                return None;
            }
        };
        if !metadata.is_file() {
            return None;
        }
        let modified = metadata.modified().ok();

        let cached = self
            .entries
            .get(&path)
            .map(|entry| Arc::clone(entry.value()));
        if let Some(entry) = cached
            && entry.is_current(modified)
        {
            counter!("frontgate_static_cache_hit_total").increment(1);
            return Some(entry);
        }

        let contents = match tokio::fs::read(&path).await {
            Ok(contents) => Bytes::from(contents),
            Err(err) => {
                warn!(
                    target = "frontgate::cache::static_files",
                    path = %path.display(),
                    error = %err,
                    "failed to read static file"
                );
                return None;
            }
        };

        counter!("frontgate_static_cache_load_total").increment(1);
        let entry = Arc::new(StaticFileEntry::load(path.clone(), contents, modified));
        self.entries.insert(path, Arc::clone(&entry));
        Some(entry)
    }
}
