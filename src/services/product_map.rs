use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;

use crate::error::Result;

const BUILTIN_PRODUCT_MAP: &str = include_str!("../../config/product_map.json");

/// What the importer does with POS names missing from the product map
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnmappedPolicy {
    /// Log and skip the row
    Drop,
    /// Fail the whole import
    Reject,
}

impl FromStr for UnmappedPolicy {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "drop" => Ok(Self::Drop),
            "reject" => Ok(Self::Reject),
            other => Err(other.to_string()),
        }
    }
}

/// Raw POS product name → canonical ledger name.
///
/// Lookups are exact and case-sensitive; callers trim the raw name first.
#[derive(Debug, Clone, Default)]
pub struct ProductMap {
    entries: HashMap<String, String>,
}

impl ProductMap {
    pub fn from_entries<I, K, V>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            entries: entries
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let entries: HashMap<String, String> = serde_json::from_str(json)?;
        Ok(Self { entries })
    }

    /// The table shipped in `config/product_map.json`
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_PRODUCT_MAP)
    }

    /// Load the map from a file, or the built-in table if the file does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            tracing::warn!(
                "Product map {} not found, using the built-in table",
                path.display()
            );
            return Self::builtin();
        }

        let json = std::fs::read_to_string(path)?;
        let map = Self::from_json(&json)?;
        if map.is_empty() {
            tracing::warn!("Product map {} is empty, no rows will map", path.display());
        }
        tracing::info!("Loaded {} product mappings from {}", map.len(), path.display());
        Ok(map)
    }

    pub fn canonical(&self, raw: &str) -> Option<&str> {
        self.entries.get(raw).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_table_has_twelve_entries() {
        let map = ProductMap::builtin().unwrap();
        assert_eq!(map.len(), 12);
        assert_eq!(map.canonical("ポワレ 750ml"), Some("ポワレ"));
    }

    #[test]
    fn test_lookup_is_exact_and_case_sensitive() {
        let map = ProductMap::from_entries([("Cidre Brut", "シードル ブリュット")]);

        assert_eq!(map.canonical("Cidre Brut"), Some("シードル ブリュット"));
        assert_eq!(map.canonical("cidre brut"), None);
        assert_eq!(map.canonical("Cidre Brut "), None);
    }

    #[test]
    fn test_missing_file_falls_back_to_builtin() {
        let map = ProductMap::load(Path::new("does/not/exist.json")).unwrap();
        assert_eq!(map.len(), 12);
    }

    #[test]
    fn test_policy_parsing() {
        assert_eq!("drop".parse::<UnmappedPolicy>(), Ok(UnmappedPolicy::Drop));
        assert_eq!("Reject".parse::<UnmappedPolicy>(), Ok(UnmappedPolicy::Reject));
        assert!("ignore".parse::<UnmappedPolicy>().is_err());
    }
}
