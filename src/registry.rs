//! The NGO registry: static configuration loaded once per run.
//!
//! A registry is an ordered list of [`Ngo`] records. It is validated on load
//! and never mutated afterwards, so it is passed around by reference to the
//! matcher and the fetchers.
//!
//! # Sources
//!
//! | Source | Constructor | Format |
//! |--------|-------------|--------|
//! | Bundled list | [`NgoRegistry::builtin`] | YAML compiled into the binary |
//! | File on disk | [`NgoRegistry::load`] | `.json` → JSON, anything else → YAML |
//! | In memory | [`NgoRegistry::from_ngos`] | Already-built records |

use crate::error::{Error, Result};
use crate::models::{Ngo, NgoId};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, instrument, warn};

const BUILTIN_REGISTRY: &str = include_str!("../data/ngos.yaml");

/// Validated, immutable list of NGOs.
#[derive(Debug, Clone, Default)]
pub struct NgoRegistry {
    ngos: Vec<Ngo>,
}

impl NgoRegistry {
    /// Validate and wrap a list of NGOs.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidRegistry`] if an NGO has no keywords or if
    /// two NGOs share an id. Blank keyword strings are only warned about;
    /// the matcher skips them.
    pub fn from_ngos(ngos: Vec<Ngo>) -> Result<Self> {
        let mut seen = HashSet::new();
        for ngo in &ngos {
            if ngo.keywords.is_empty() {
                return Err(Error::InvalidRegistry {
                    reason: format!("NGO {} ('{}') has no keywords", ngo.id, ngo.name),
                });
            }
            if !seen.insert(ngo.id) {
                return Err(Error::InvalidRegistry {
                    reason: format!("duplicate NGO id {}", ngo.id),
                });
            }
            let blank = ngo.keywords.iter().filter(|k| k.trim().is_empty()).count();
            if blank > 0 {
                warn!(ngo_id = ngo.id, blank, "NGO has blank keywords; they will be ignored");
            }
        }
        Ok(Self { ngos })
    }

    /// Parse a YAML document containing a sequence of NGOs.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let ngos: Vec<Ngo> = serde_yaml::from_str(yaml)?;
        Self::from_ngos(ngos)
    }

    /// Parse a JSON array of NGOs.
    pub fn from_json_str(json: &str) -> Result<Self> {
        let ngos: Vec<Ngo> = serde_json::from_str(json)?;
        Self::from_ngos(ngos)
    }

    /// The registry bundled with the binary.
    pub fn builtin() -> Result<Self> {
        Self::from_yaml_str(BUILTIN_REGISTRY)
    }

    /// Load a registry file, choosing the parser from the extension.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|e| e.to_str())
            .is_some_and(|e| e.eq_ignore_ascii_case("json"));
        let registry = if is_json {
            Self::from_json_str(&raw)?
        } else {
            Self::from_yaml_str(&raw)?
        };
        info!(count = registry.len(), "Loaded NGO registry");
        Ok(registry)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Ngo> {
        self.ngos.iter()
    }

    pub fn len(&self) -> usize {
        self.ngos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ngos.is_empty()
    }

    pub fn get(&self, id: NgoId) -> Option<&Ngo> {
        self.ngos.iter().find(|n| n.id == id)
    }

    /// NGOs that list `keyword` verbatim among their keywords.
    pub fn with_keyword(&self, keyword: &str) -> Vec<&Ngo> {
        self.ngos
            .iter()
            .filter(|n| n.keywords.iter().any(|k| k == keyword))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ngo(id: NgoId, name: &str, keywords: &[&str]) -> Ngo {
        Ngo {
            id,
            name: name.to_string(),
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
        }
    }

    #[test]
    fn test_builtin_registry_loads() {
        let registry = NgoRegistry::builtin().unwrap();
        assert_eq!(registry.len(), 125);
        let red_cross = registry.get(1).unwrap();
        assert_eq!(red_cross.name, "American Red Cross");
        assert!(red_cross.keywords.contains(&"ARC".to_string()));
        assert!(registry.iter().all(|n| !n.keywords.is_empty()));
    }

    #[test]
    fn test_rejects_empty_keyword_list() {
        let err = NgoRegistry::from_ngos(vec![ngo(1, "Nobody", &[])]).unwrap_err();
        assert!(matches!(err, Error::InvalidRegistry { .. }));
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let err = NgoRegistry::from_ngos(vec![
            ngo(1, "A", &["A org"]),
            ngo(1, "B", &["B org"]),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("duplicate NGO id 1"));
    }

    #[test]
    fn test_blank_keywords_are_accepted() {
        let registry = NgoRegistry::from_ngos(vec![ngo(1, "A", &["", "A org"])]).unwrap();
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_from_json_and_yaml() {
        let json = r#"[{"id": 12, "name": "CARE", "keywords": ["CARE"]}]"#;
        let yaml = "- id: 12\n  name: CARE\n  keywords:\n    - CARE\n";
        let a = NgoRegistry::from_json_str(json).unwrap();
        let b = NgoRegistry::from_yaml_str(yaml).unwrap();
        assert_eq!(a.get(12), b.get(12));
    }

    #[test]
    fn test_load_picks_parser_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("ngos.json");
        std::fs::write(&path, r#"[{"id": 2, "name": "UNICEF", "keywords": ["UNICEF"]}]"#).unwrap();
        let registry = NgoRegistry::load(&path).unwrap();
        assert_eq!(registry.get(2).unwrap().name, "UNICEF");
    }

    #[test]
    fn test_with_keyword_returns_every_owner() {
        let registry = NgoRegistry::from_ngos(vec![
            ngo(12, "CARE", &["CARE"]),
            ngo(22, "CARE International", &["CARE International", "CARE"]),
            ngo(23, "World Vision", &["World Vision"]),
        ])
        .unwrap();
        let ids: Vec<NgoId> = registry.with_keyword("CARE").iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![12, 22]);
        assert!(registry.with_keyword("care").is_empty());
    }
}
