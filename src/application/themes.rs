//! Installed theme discovery.

use std::path::Path;

use tracing::{info, warn};

use crate::domain::themes::{THEME_MANIFEST, ThemeDescriptor, ThemeManifest, is_theme_dir_name};

/// Read-only set of themes found at bootstrap, ordered by namespace.
#[derive(Debug, Clone, Default)]
pub struct ThemeRegistry {
    themes: Vec<ThemeDescriptor>,
}

impl ThemeRegistry {
    pub fn from_descriptors(mut themes: Vec<ThemeDescriptor>) -> Self {
        themes.sort_by(|a, b| a.namespace.cmp(&b.namespace));
        themes.dedup_by(|a, b| a.namespace == b.namespace);
        Self { themes }
    }

    /// Scan the immediate subdirectories of `root`. Directories whose manifest
    /// is missing or malformed are logged and left out; an unreadable root
    /// yields an empty registry.
    pub async fn discover(root: &Path, site_url: &str) -> Self {
        let mut entries = match tokio::fs::read_dir(root).await {
            Ok(entries) => entries,
            Err(err) => {
                warn!(
                    target = "frontgate::application::themes",
                    root = %root.display(),
                    error = %err,
                    "theme directory unreadable; no themes registered"
                );
                return Self::default();
            }
        };

        let mut themes = Vec::new();
        loop {
            let entry = match entries.next_entry().await {
                Ok(Some(entry)) => entry,
                Ok(None) => break,
                Err(err) => {
                    warn!(
                        target = "frontgate::application::themes",
                        root = %root.display(),
                        error = %err,
                        "failed to read theme directory entry"
                    );
                    break;
                }
            };

            let Some(namespace) = entry.file_name().to_str().map(str::to_string) else {
                continue;
            };
            if !is_theme_dir_name(&namespace) {
                continue;
            }
            let path = entry.path();
            match tokio::fs::metadata(&path).await {
                Ok(metadata) if metadata.is_dir() => {}
                _ => continue,
            }

            if let Some(descriptor) = load_descriptor(&path, &namespace, site_url).await {
                themes.push(descriptor);
            }
        }

        let registry = Self::from_descriptors(themes);
        info!(
            target = "frontgate::application::themes",
            root = %root.display(),
            count = registry.len(),
            "themes discovered"
        );
        registry
    }

    pub fn list(&self) -> &[ThemeDescriptor] {
        &self.themes
    }

    pub fn get(&self, namespace: &str) -> Option<&ThemeDescriptor> {
        self.themes
            .binary_search_by(|theme| theme.namespace.as_str().cmp(namespace))
            .ok()
            .map(|index| &self.themes[index])
    }

    pub fn exists(&self, namespace: &str) -> bool {
        self.get(namespace).is_some()
    }

    pub fn len(&self) -> usize {
        self.themes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.themes.is_empty()
    }
}

async fn load_descriptor(dir: &Path, namespace: &str, site_url: &str) -> Option<ThemeDescriptor> {
    let manifest_path = dir.join(THEME_MANIFEST);
    let raw = match tokio::fs::read_to_string(&manifest_path).await {
        Ok(raw) => raw,
        Err(err) => {
            warn!(
                target = "frontgate::application::themes",
                manifest = %manifest_path.display(),
                error = %err,
                "skipping theme without readable manifest"
            );
            return None;
        }
    };

    match toml::from_str::<ThemeManifest>(&raw) {
        Ok(manifest) => Some(manifest.into_descriptor(namespace, site_url)),
        Err(err) => {
            warn!(
                target = "frontgate::application::themes",
                manifest = %manifest_path.display(),
                error = %err,
                "skipping theme with malformed manifest"
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn write_theme(root: &Path, dir: &str, manifest: Option<&str>) {
        let path = root.join(dir);
        fs::create_dir_all(&path).expect("create theme dir");
        if let Some(manifest) = manifest {
            fs::write(path.join(THEME_MANIFEST), manifest).expect("write manifest");
        }
    }

    #[tokio::test]
    async fn discovery_skips_invalid_themes() {
        let root = tempfile::tempdir().expect("tempdir");
        write_theme(
            root.path(),
            "theme-dark",
            Some("name = \"Dark\"\nversion = \"0.3.0\"\nauthor = \"Lin\"\n"),
        );
        write_theme(
            root.path(),
            "theme-default",
            Some("name = \"Default\"\nversion = \"1.0.0\"\ndescription = \"Stock\"\n"),
        );
        write_theme(root.path(), "theme-broken", Some("name = [unterminated"));
        write_theme(root.path(), "theme-empty", None);
        write_theme(
            root.path(),
            "shared",
            Some("name = \"Not a theme\"\nversion = \"1\"\n"),
        );
        fs::write(root.path().join("theme-file"), "plain file").expect("write file");

        let registry = ThemeRegistry::discover(root.path(), "https://blog.example").await;

        let namespaces: Vec<&str> = registry
            .list()
            .iter()
            .map(|theme| theme.namespace.as_str())
            .collect();
        assert_eq!(namespaces, vec!["theme-dark", "theme-default"]);
        assert!(registry.exists("theme-default"));
        assert!(!registry.exists("theme-broken"));
        assert_eq!(
            registry.get("theme-dark").map(|t| t.preview_url.as_str()),
            Some("https://blog.example/themes/theme-dark/preview.png")
        );
    }

    #[tokio::test]
    async fn missing_root_yields_empty_registry() {
        let root = tempfile::tempdir().expect("tempdir");
        let registry = ThemeRegistry::discover(&root.path().join("absent"), "http://x").await;
        assert!(registry.is_empty());
    }
}
