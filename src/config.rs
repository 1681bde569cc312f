use std::{collections::BTreeMap, path::{Path, PathBuf}, time::Duration};

use serde::{Deserialize, Serialize};

use crate::{
    area::{Granularity, Vintage},
    dataset::nomis::NOMIS_BASE_URL,
    dataset::arcgis::ARCGIS_BASE_URL,
    error::{GeoError, Result},
    resolve::OnUnresolved,
};

/// Engine settings. Every field has a default; unknown fields are rejected.
///
/// ```json
/// { "vintage": "2021", "granularity": "lsoa", "cache_ttl": 3600, "on_unresolved": "skip",
///   "sources": { "imd": "https://example.org/imd2019.csv" } }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub vintage: Vintage,
    pub granularity: Granularity,
    /// Seconds a cached dataset stays valid; forever when absent.
    pub cache_ttl: Option<f64>,
    pub on_unresolved: OnUnresolved,
    /// Seconds to wait for one fetch; unbounded when absent.
    pub fetch_timeout: Option<f64>,
    /// Root of the persisted dataset/catalogue cache.
    pub cache_dir: Option<PathBuf>,
    pub nomis_base_url: String,
    pub arcgis_base_url: String,
    /// Named sources: name to URL or local path.
    pub sources: BTreeMap<String, String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            vintage: Vintage::new("2021"),
            granularity: Granularity::Lsoa,
            cache_ttl: None,
            on_unresolved: OnUnresolved::default(),
            fetch_timeout: None,
            cache_dir: None,
            nomis_base_url: NOMIS_BASE_URL.to_string(),
            arcgis_base_url: ARCGIS_BASE_URL.to_string(),
            sources: BTreeMap::new(),
        }
    }
}

fn seconds(field: &str, value: Option<f64>) -> Result<Option<Duration>> {
    value
        .map(|secs| Duration::try_from_secs_f64(secs)
            .map_err(|_| GeoError::Config(format!("{field} must be a nonnegative number of seconds, got {secs}"))))
        .transpose()
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|err| GeoError::Config(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)
            .map_err(|err| GeoError::Config(format!("cannot read {}: {err}", path.display())))?;
        Self::from_json_str(&json)
    }

    pub fn validate(&self) -> Result<()> {
        if self.vintage.as_str().is_empty() {
            return Err(GeoError::Config("vintage must not be empty".into()));
        }
        self.cache_ttl()?;
        self.fetch_timeout()?;
        for (name, url) in [("nomis_base_url", &self.nomis_base_url), ("arcgis_base_url", &self.arcgis_base_url)] {
            if url.trim().is_empty() {
                return Err(GeoError::Config(format!("{name} must not be empty")));
            }
        }
        Ok(())
    }

    pub fn cache_ttl(&self) -> Result<Option<Duration>> {
        seconds("cache_ttl", self.cache_ttl)
    }

    pub fn fetch_timeout(&self) -> Result<Option<Duration>> {
        seconds("fetch_timeout", self.fetch_timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_take_defaults() {
        let config = EngineConfig::from_json_str(r#"{"granularity": "lad", "cache_ttl": 60}"#).unwrap();
        assert_eq!(config.granularity, Granularity::Lad);
        assert_eq!(config.vintage, Vintage::new("2021"));
        assert_eq!(config.cache_ttl().unwrap(), Some(Duration::from_secs(60)));
        assert_eq!(config.on_unresolved, OnUnresolved::Fail);
        assert_eq!(config.nomis_base_url, NOMIS_BASE_URL);
    }

    #[test]
    fn rejects_unknown_fields_and_bad_values() {
        assert!(matches!(EngineConfig::from_json_str(r#"{"vintag": "2021"}"#), Err(GeoError::Config(_))));
        assert!(EngineConfig::from_json_str(r#"{"fetch_timeout": -1}"#).is_err());
        assert!(EngineConfig::from_json_str(r#"{"on_unresolved": "ignore"}"#).is_err());
    }

    #[test]
    fn reads_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("geostat.json");
        std::fs::write(&path, r#"{"vintage": "2011", "on_unresolved": "null", "sources": {"imd": "imd.csv"}}"#).unwrap();
        let config = EngineConfig::from_json_file(&path).unwrap();
        assert_eq!(config.vintage, Vintage::new("2011"));
        assert_eq!(config.on_unresolved, OnUnresolved::Null);
        assert_eq!(config.sources.get("imd").map(String::as_str), Some("imd.csv"));
    }
}
