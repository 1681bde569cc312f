use std::{collections::BTreeMap, fmt, path::{Path, PathBuf}};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::{
    area::{Granularity, Vintage},
    error::{GeoError, Result},
};

/// Declared payload format of a source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceFormat {
    /// Tabular data, one row per areal unit
    Csv,
    /// GeoJSON FeatureCollection, geometry kept as an opaque reference
    GeoJson,
}

impl SourceFormat {
    /// Guess the format from a file name or URL path.
    pub fn from_extension(path: &str) -> Option<Self> {
        let path = path.split(['?', '#']).next().unwrap_or(path);
        let ext = Path::new(path).extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "csv" => Some(SourceFormat::Csv),
            "geojson" | "json" => Some(SourceFormat::GeoJson),
            _ => None,
        }
    }
}

/// Where a source spec points, in the order the loader honours them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Origin<'a> {
    File(&'a Path),
    Nomis(&'a str),
    Named(&'a str),
}

/// Stable cache key derived from every field of a [`SourceSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifies one loadable dataset: a local file, a NOMIS statistics table or a
/// registered/remote named source, plus the schema needed to key its rows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    /// Dataset name used in provenance; derived from the origin when absent.
    pub name: Option<String>,
    /// Registered source name, or a direct http(s) URL.
    pub source: Option<String>,
    /// NOMIS dataset identifier, e.g. "NM_1_1".
    pub dataset: Option<String>,
    pub filepath: Option<PathBuf>,
    pub format: Option<SourceFormat>,
    pub period: Option<String>,
    pub geography: Option<String>,
    /// Extra query parameters; list values repeat the key.
    pub params: BTreeMap<String, Vec<String>>,
    pub vintage: Vintage,
    pub granularity: Granularity,
    pub code_column: Option<String>,
    /// Columns to keep; every non-code column when empty.
    pub value_columns: Vec<String>,
    /// Output names for loaded columns.
    pub rename: BTreeMap<String, String>,
}

impl SourceSpec {
    pub fn new(vintage: Vintage, granularity: Granularity) -> Self {
        Self {
            name: None,
            source: None,
            dataset: None,
            filepath: None,
            format: None,
            period: None,
            geography: None,
            params: BTreeMap::new(),
            vintage,
            granularity,
            code_column: None,
            value_columns: Vec::new(),
            rename: BTreeMap::new(),
        }
    }

    pub fn file(path: impl Into<PathBuf>, vintage: Vintage, granularity: Granularity) -> Self {
        Self { filepath: Some(path.into()), ..Self::new(vintage, granularity) }
    }

    pub fn nomis(dataset_id: &str, vintage: Vintage, granularity: Granularity) -> Self {
        Self { dataset: Some(dataset_id.to_string()), ..Self::new(vintage, granularity) }
    }

    pub fn named(source: &str, vintage: Vintage, granularity: Granularity) -> Self {
        Self { source: Some(source.to_string()), ..Self::new(vintage, granularity) }
    }

    pub fn with_name(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn with_format(mut self, format: SourceFormat) -> Self {
        self.format = Some(format);
        self
    }

    pub fn with_period(mut self, period: &str) -> Self {
        self.period = Some(period.to_string());
        self
    }

    pub fn with_geography(mut self, geography: &str) -> Self {
        self.geography = Some(geography.to_string());
        self
    }

    pub fn with_param<S: ToString>(mut self, key: &str, values: impl IntoIterator<Item = S>) -> Self {
        self.params.insert(key.to_string(), values.into_iter().map(|v| v.to_string()).collect());
        self
    }

    pub fn with_code_column(mut self, column: &str) -> Self {
        self.code_column = Some(column.to_string());
        self
    }

    pub fn with_value_columns<S: ToString>(mut self, columns: impl IntoIterator<Item = S>) -> Self {
        self.value_columns = columns.into_iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn with_rename(mut self, from: &str, to: &str) -> Self {
        self.rename.insert(from.to_string(), to.to_string());
        self
    }

    /// Which origin the loader will use: file path, then NOMIS dataset, then named source.
    pub(crate) fn origin(&self) -> Result<Origin<'_>> {
        let non_blank = |s: &&String| !s.trim().is_empty();
        if let Some(path) = &self.filepath {
            return Ok(Origin::File(path));
        }
        if let Some(id) = self.dataset.as_ref().filter(non_blank) {
            return Ok(Origin::Nomis(id.trim()));
        }
        if let Some(source) = self.source.as_ref().filter(non_blank) {
            return Ok(Origin::Named(source.trim()));
        }
        Err(GeoError::unavailable(
            self.describe(),
            "either a filepath, a dataset identifier or a source must be provided",
        ))
    }

    /// Name the loaded dataset carries.
    pub fn dataset_name(&self) -> String {
        if let Some(name) = &self.name {
            return name.clone();
        }
        match self.origin() {
            Ok(Origin::File(path)) => path.file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string()),
            Ok(Origin::Nomis(id)) => id.to_string(),
            Ok(Origin::Named(source)) => source.to_string(),
            Err(_) => "unnamed".to_string(),
        }
    }

    /// Human-readable summary used in errors and logs.
    pub fn describe(&self) -> String {
        let mut out = match (&self.filepath, &self.dataset, &self.source) {
            (Some(path), _, _) => format!("file {}", path.display()),
            (None, Some(id), _) => format!("nomis {id}"),
            (None, None, Some(source)) => format!("source {source}"),
            (None, None, None) => "no source".to_string(),
        };
        if let Some(period) = &self.period {
            out.push_str(&format!(" period={period}"));
        }
        if let Some(geography) = &self.geography {
            out.push_str(&format!(" geography={geography}"));
        }
        out.push_str(&format!(" [{} {}]", self.granularity, self.vintage));
        out
    }

    /// SHA-256 over the serialized spec; any differing field (period, vintage, ...) is a miss.
    pub fn cache_key(&self) -> CacheKey {
        let encoded = serde_json::to_string(self).unwrap_or_else(|_| format!("{self:?}"));
        CacheKey(hex::encode(Sha256::digest(encoded.as_bytes())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec() -> SourceSpec {
        SourceSpec::new(Vintage::new("2021"), Granularity::Lad)
    }

    #[test]
    fn empty_spec_is_unavailable() {
        let err = spec().origin().unwrap_err();
        assert!(matches!(err, GeoError::SourceUnavailable { .. }));

        let blank = SourceSpec { dataset: Some("  ".into()), ..spec() };
        assert!(blank.origin().is_err());
    }

    #[test]
    fn filepath_wins_over_source() {
        let s = SourceSpec { source: Some("lad-boundaries".into()), ..SourceSpec::file("a.csv", Vintage::new("2021"), Granularity::Lad) };
        assert_eq!(s.origin().unwrap(), Origin::File(Path::new("a.csv")));
        assert_eq!(s.dataset_name(), "a");
    }

    #[test]
    fn period_changes_the_cache_key() {
        let a = SourceSpec::nomis("NM_1_1", Vintage::new("2021"), Granularity::Lad).with_period("2023");
        let b = a.clone().with_period("2024");
        assert_eq!(a.cache_key(), a.clone().cache_key());
        assert_ne!(a.cache_key(), b.cache_key());

        let c = SourceSpec { vintage: Vintage::new("2011"), ..a.clone() };
        assert_ne!(a.cache_key(), c.cache_key());
    }

    #[test]
    fn formats_from_extensions() {
        assert_eq!(SourceFormat::from_extension("data/pop.CSV"), Some(SourceFormat::Csv));
        assert_eq!(SourceFormat::from_extension("https://x/y.geojson?f=1"), Some(SourceFormat::GeoJson));
        assert_eq!(SourceFormat::from_extension("https://x/query"), None);
    }
}
