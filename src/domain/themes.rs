//! Presentation theme descriptors and manifest format.

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Directory-name prefix that marks a theme package.
pub const THEME_DIR_PREFIX: &str = "theme-";
/// Manifest file read from every theme directory.
pub const THEME_MANIFEST: &str = "theme.toml";
const DEFAULT_PREVIEW: &str = "preview.png";

/// Public description of an installed theme.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ThemeDescriptor {
    pub namespace: String,
    pub name: String,
    pub description: String,
    pub author: String,
    pub version: String,
    #[serde(rename = "previewURL")]
    pub preview_url: String,
}

/// Contents of `theme.toml`.
#[derive(Debug, Clone, Deserialize)]
pub struct ThemeManifest {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub author: String,
    pub version: String,
    #[serde(default)]
    pub preview: Option<String>,
}

impl ThemeManifest {
    pub fn into_descriptor(self, namespace: &str, site_url: &str) -> ThemeDescriptor {
        let preview = self.preview.as_deref().unwrap_or(DEFAULT_PREVIEW);
        let preview_url = format!(
            "{}/themes/{namespace}/{}",
            site_url.trim_end_matches('/'),
            preview.trim_start_matches('/')
        );
        ThemeDescriptor {
            namespace: namespace.to_string(),
            name: self.name,
            description: self.description,
            author: self.author,
            version: self.version,
            preview_url,
        }
    }
}

/// Whether a directory name follows the `theme-<slug>` convention.
pub fn is_theme_dir_name(name: &str) -> bool {
    let Some(slug) = name.strip_prefix(THEME_DIR_PREFIX) else {
        return false;
    };
    !slug.is_empty()
        && !slug.starts_with('-')
        && slug
            .chars()
            .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

/// Validate a namespace supplied by a client before looking it up.
pub fn validate_namespace(namespace: &str) -> Result<&str, DomainError> {
    let trimmed = namespace.trim();
    if trimmed.is_empty() {
        return Err(DomainError::validation("theme must not be empty"));
    }
    Ok(trimmed)
}
