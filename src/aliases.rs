//! Region-name alias table.
//!
//! Maps alternate spellings found in the statistics spreadsheet onto the
//! canonical spelling used by the boundary file, e.g.
//!
//! ```toml
//! [aliases]
//! "강원특별자치도" = "강원도"
//! "제주특별자치도" = "제주특별자치도"
//! ```

use crate::error::{PipelineError, Result};
use crate::types::RegionStat;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;
use tracing::debug;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable {
    entries: BTreeMap<String, String>,
}

#[derive(Deserialize)]
struct AliasFile {
    #[serde(default)]
    aliases: BTreeMap<String, String>,
}

impl AliasTable {
    /// Builds a table, rejecting chains (`a -> b`, `b -> c`) so that
    /// normalizing an already-normalized name never changes it.
    pub fn new(entries: BTreeMap<String, String>) -> Result<Self> {
        let entries: BTreeMap<String, String> = entries
            .into_iter()
            .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
            .collect();

        for (alias, canonical) in &entries {
            if alias.is_empty() || canonical.is_empty() {
                return Err(PipelineError::config(format!(
                    "alias entry '{}' -> '{}' has an empty side",
                    alias, canonical
                )));
            }
            if let Some(next) = entries.get(canonical) {
                if next != canonical {
                    return Err(PipelineError::config(format!(
                        "alias '{}' -> '{}' chains into '{}' -> '{}'; map '{}' directly to '{}'",
                        alias, canonical, canonical, next, alias, next
                    )));
                }
            }
        }

        Ok(Self { entries })
    }

    /// Loads the `[aliases]` table from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| PipelineError::unavailable(path.display().to_string(), e))?;
        let file: AliasFile = toml::from_str(&content).map_err(|e| {
            PipelineError::config(format!("alias file {}: {}", path.display(), e))
        })?;
        Self::new(file.aliases)
    }

    /// Inline entries overlaid with the entries of `file`, if any.
    pub fn from_config(inline: &BTreeMap<String, String>, file: Option<&Path>) -> Result<Self> {
        let mut merged = inline.clone();
        if let Some(path) = file {
            let from_file = Self::load_from_file(path)?;
            debug!(path = %path.display(), entries = from_file.len(), "loaded alias file");
            merged.extend(from_file.entries);
        }
        Self::new(merged)
    }

    /// Canonical spelling of `name`; unknown names pass through unchanged.
    pub fn normalize<'a>(&'a self, name: &'a str) -> &'a str {
        self.entries.get(name).map(String::as_str).unwrap_or(name)
    }

    /// Rewrites every `region_name` in place.
    pub fn apply(&self, stats: &mut [RegionStat]) {
        for stat in stats.iter_mut() {
            if let Some(canonical) = self.entries.get(&stat.region_name) {
                if canonical != &stat.region_name {
                    debug!(from = %stat.region_name, to = %canonical, "aliased region name");
                    stat.region_name = canonical.clone();
                }
            }
        }
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

    fn korean_defaults() -> AliasTable {
        AliasTable::new(BTreeMap::from([
            ("강원특별자치도".to_string(), "강원도".to_string()),
            ("제주특별자치도".to_string(), "제주특별자치도".to_string()),
        ]))
        .unwrap()
    }

    #[test]
    fn rewrites_legacy_name_and_keeps_identity_entry() {
        let table = korean_defaults();
        assert_eq!(table.normalize("강원특별자치도"), "강원도");
        assert_eq!(table.normalize("제주특별자치도"), "제주특별자치도");
        assert_eq!(table.normalize("서울특별시"), "서울특별시");
    }

    #[test]
    fn normalization_is_idempotent() {
        let table = korean_defaults();
        for name in ["강원특별자치도", "강원도", "제주특별자치도", "부산광역시"] {
            let once = table.normalize(name).to_string();
            assert_eq!(table.normalize(&once), once);
        }

        let mut stats = vec![RegionStat {
            region_name: "강원특별자치도".into(),
            statistic: 0.89,
        }];
        table.apply(&mut stats);
        table.apply(&mut stats);
        assert_eq!(stats[0].region_name, "강원도");
    }

    #[test]
    fn rejects_alias_chains() {
        let err = AliasTable::new(BTreeMap::from([
            ("a".to_string(), "b".to_string()),
            ("b".to_string(), "c".to_string()),
        ]))
        .unwrap_err();
        assert!(matches!(err, PipelineError::Config { .. }));
    }

    #[test]
    fn file_entries_override_inline_entries() {
        let dir = std::env::temp_dir().join("birthmap_alias_override");
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("aliases.toml");
        fs::write(&path, "[aliases]\n\"Old\" = \"FromFile\"\n").unwrap();

        let inline = BTreeMap::from([
            ("Old".to_string(), "Inline".to_string()),
            ("Other".to_string(), "Kept".to_string()),
        ]);
        let table = AliasTable::from_config(&inline, Some(&path)).unwrap();
        assert_eq!(table.normalize("Old"), "FromFile");
        assert_eq!(table.normalize("Other"), "Kept");
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn missing_alias_file_is_source_unavailable() {
        let err = AliasTable::load_from_file(Path::new("/nonexistent/aliases.toml")).unwrap_err();
        assert!(matches!(err, PipelineError::SourceUnavailable { .. }));
    }
}
