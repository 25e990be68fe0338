//! Resolution of extension names to installable descriptors.
//!
//! The index maps a name to an [`ExtensionDescriptor`] (declared package
//! and extension dependencies plus an optional source repository). A
//! custom source repository can be registered for a single name without
//! affecting any other lookup.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use url::Url;

use burrowbot_common::models::extension::ExtensionDescriptor;

use crate::Error;

/// Canonical form of an extension name: trimmed and lowercased. Names
/// with embedded whitespace are rejected.
pub fn normalize_name(raw: &str) -> Result<String, Error> {
    let name = raw.trim();
    if name.is_empty() {
        return Err(Error::Parse("extension name is empty".to_string()));
    }
    if name.contains(char::is_whitespace) {
        return Err(Error::Parse(format!(
            "extension name '{name}' contains whitespace"
        )));
    }
    Ok(name.to_lowercase())
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ExtensionIndex: Send + Sync {
    /// Resolves `name` to its descriptor, or fails with
    /// `ExtensionNotInIndex`. Deterministic for a given (name, source)
    /// pair; repeated calls may re-fetch.
    async fn resolve(&self, name: &str) -> Result<ExtensionDescriptor, Error>;

    /// Overrides the lookup source for `name` only.
    async fn register_source(&self, name: &str, source: Url) -> Result<(), Error>;
}

/// Index backed by a JSON file mapping names to descriptors. The file is
/// re-read on every resolution so edits take effect without a restart.
pub struct FileExtensionIndex {
    path: PathBuf,
    source_overrides: DashMap<String, Url>,
}

impl FileExtensionIndex {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            source_overrides: DashMap::new(),
        }
    }

    fn load_entries(&self) -> Result<HashMap<String, ExtensionDescriptor>, Error> {
        let raw = std::fs::read_to_string(&self.path)?;
        let entries: HashMap<String, ExtensionDescriptor> = serde_json::from_str(&raw)?;
        Ok(entries)
    }
}

#[async_trait]
impl ExtensionIndex for FileExtensionIndex {
    async fn resolve(&self, name: &str) -> Result<ExtensionDescriptor, Error> {
        let name = normalize_name(name)?;
        let entries = self.load_entries()?;
        let mut descriptor = entries
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::ExtensionNotInIndex(name.clone()))?;
        descriptor.name = name.clone();
        if let Some(source) = self.source_overrides.get(&name) {
            descriptor.source_repository = Some(source.value().clone());
        }
        Ok(descriptor)
    }

    async fn register_source(&self, name: &str, source: Url) -> Result<(), Error> {
        let name = normalize_name(name)?;
        self.source_overrides.insert(name, source);
        Ok(())
    }
}

/// Fixed in-memory index, for tests and for a bundled default set.
pub struct StaticExtensionIndex {
    entries: HashMap<String, ExtensionDescriptor>,
    source_overrides: DashMap<String, Url>,
}

impl StaticExtensionIndex {
    pub fn new(descriptors: impl IntoIterator<Item = ExtensionDescriptor>) -> Self {
        let entries = descriptors
            .into_iter()
            .map(|d| (d.name.to_lowercase(), d))
            .collect();
        Self {
            entries,
            source_overrides: DashMap::new(),
        }
    }
}

#[async_trait]
impl ExtensionIndex for StaticExtensionIndex {
    async fn resolve(&self, name: &str) -> Result<ExtensionDescriptor, Error> {
        let name = normalize_name(name)?;
        let mut descriptor = self
            .entries
            .get(&name)
            .cloned()
            .ok_or_else(|| Error::ExtensionNotInIndex(name.clone()))?;
        if let Some(source) = self.source_overrides.get(&name) {
            descriptor.source_repository = Some(source.value().clone());
        }
        Ok(descriptor)
    }

    async fn register_source(&self, name: &str, source: Url) -> Result<(), Error> {
        let name = normalize_name(name)?;
        self.source_overrides.insert(name, source);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;
    use std::io::Write;

    fn descriptor(name: &str, extension_deps: &[&str]) -> ExtensionDescriptor {
        ExtensionDescriptor {
            name: name.to_string(),
            source_repository: None,
            package_deps: BTreeSet::new(),
            extension_deps: extension_deps.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn test_normalize_name() {
        assert_eq!(normalize_name("  Weather ").unwrap(), "weather");
        assert!(normalize_name("two words").is_err());
        assert!(normalize_name("   ").is_err());
    }

    #[tokio::test]
    async fn test_static_index_resolves_case_insensitively() {
        let index = StaticExtensionIndex::new([descriptor("weather", &[])]);

        let resolved = index.resolve("WEATHER").await.unwrap();
        assert_eq!(resolved.name, "weather");

        match index.resolve("nope").await {
            Err(Error::ExtensionNotInIndex(name)) => assert_eq!(name, "nope"),
            other => panic!("expected ExtensionNotInIndex, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_source_override_applies_to_single_name() {
        let index = StaticExtensionIndex::new([
            descriptor("weather", &[]),
            descriptor("music", &[]),
        ]);
        let source = Url::parse("https://example.org/weather.git").unwrap();
        index.register_source("weather", source.clone()).await.unwrap();

        let weather = index.resolve("weather").await.unwrap();
        assert_eq!(weather.source_repository, Some(source));

        let music = index.resolve("music").await.unwrap();
        assert_eq!(music.source_repository, None);
    }

    #[tokio::test]
    async fn test_file_index_reads_descriptors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{
                "weather": {{
                    "name": "weather",
                    "package_deps": ["requests-lib"],
                    "extension_deps": []
                }}
            }}"#
        )
        .unwrap();

        let index = FileExtensionIndex::new(file.path());
        let resolved = index.resolve("weather").await.unwrap();
        assert!(resolved.package_deps.contains("requests-lib"));
        assert!(resolved.extension_deps.is_empty());
    }
}
