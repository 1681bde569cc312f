use std::{path::{Path, PathBuf}, time::Duration};

use anyhow::{Context, Result};
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::{area::Vintage, catalogue::{CatalogueSnapshot, CatalogueVintage}, common};
use super::{dataset::Dataset, source::CacheKey};

const DATASETS_DIR: &str = "datasets";
const CATALOGUE_FILE: &str = "catalogue.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoredKind {
    Dataset,
    Catalogue,
}

/// One file in the persisted store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredEntry {
    /// Vintage label, decoded from the directory the file lives under.
    pub vintage: String,
    pub kind: StoredKind,
    /// Cache key for datasets, "catalogue" for snapshots.
    pub key: String,
    pub path: PathBuf,
}

/// On-disk dataset cache and catalogue snapshots, laid out as
/// `<root>/<vintage>/datasets/<key>.json` and `<root>/<vintage>/catalogue.json`.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

/// Vintage labels become directory names. Bytes outside `[A-Za-z0-9_-]` are written as
/// `%XX`, so distinct labels never share a directory; the empty label is `%`.
fn path_component(label: &str) -> String {
    if label.is_empty() {
        return "%".into();
    }
    let mut out = String::with_capacity(label.len());
    for byte in label.bytes() {
        if byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' {
            out.push(byte as char);
        } else {
            out.push('%');
            out.push_str(&hex::encode_upper([byte]));
        }
    }
    out
}

/// Inverse of [`path_component`]; `None` for names it cannot have produced.
fn decode_component(name: &str) -> Option<String> {
    if name == "%" {
        return Some(String::new());
    }
    let bytes = name.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let byte = hex::decode(bytes.get(i + 1..i + 3)?).ok()?;
            out.extend(byte);
            i += 3;
        } else {
            out.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(out).ok()
}

impl DiskStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn vintage_dir(&self, vintage: &Vintage) -> PathBuf {
        self.root.join(path_component(vintage.as_str()))
    }

    fn dataset_path(&self, vintage: &Vintage, key: &CacheKey) -> PathBuf {
        self.vintage_dir(vintage).join(DATASETS_DIR).join(format!("{key}.json"))
    }

    /// Persisted dataset for `key`, if present, younger than `ttl` and readable.
    /// Unreadable files are treated as misses.
    pub fn read_dataset(&self, vintage: &Vintage, key: &CacheKey, ttl: Option<Duration>) -> Option<Dataset> {
        let path = self.dataset_path(vintage, key);
        let modified = std::fs::metadata(&path).and_then(|m| m.modified()).ok()?;

        if let Some(ttl) = ttl {
            let fresh = modified.elapsed().map(|age| age < ttl).unwrap_or(false);
            if !fresh {
                debug!(path = %path.display(), "persisted dataset expired");
                return None;
            }
        }

        let parsed = std::fs::read(&path)
            .context("read")
            .and_then(|bytes| serde_json::from_slice::<Dataset>(&bytes).context("parse"));
        match parsed {
            Ok(dataset) if dataset.vintage() == vintage => Some(dataset),
            Ok(dataset) => {
                warn!(path = %path.display(), found = %dataset.vintage(), "persisted dataset has the wrong vintage");
                None
            }
            Err(err) => {
                warn!(path = %path.display(), "persisted dataset unreadable: {err:#}");
                None
            }
        }
    }

    pub fn write_dataset(&self, key: &CacheKey, dataset: &Dataset) -> Result<()> {
        let path = self.dataset_path(dataset.vintage(), key);
        let bytes = serde_json::to_vec(dataset).context("serialize dataset")?;
        common::write_atomic(&path, &bytes)
    }

    pub fn write_catalogue(&self, catalogue: &CatalogueVintage) -> Result<()> {
        let path = self.vintage_dir(catalogue.vintage()).join(CATALOGUE_FILE);
        let bytes = serde_json::to_vec(&catalogue.snapshot()).context("serialize catalogue")?;
        common::write_atomic(&path, &bytes)
    }

    /// Catalogue snapshot for `vintage`; `Ok(None)` when none was persisted.
    pub fn read_catalogue(&self, vintage: &Vintage) -> Result<Option<CatalogueVintage>> {
        let path = self.vintage_dir(vintage).join(CATALOGUE_FILE);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = std::fs::read(&path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let snapshot: CatalogueSnapshot = serde_json::from_slice(&bytes)
            .with_context(|| format!("Failed to parse {}", path.display()))?;
        Ok(Some(CatalogueVintage::from_snapshot(snapshot)?))
    }

    /// Every persisted file, sorted by path.
    pub fn entries(&self) -> Result<Vec<StoredEntry>> {
        if !self.root.exists() {
            return Ok(Vec::new());
        }

        let mut out = Vec::new();
        for entry in WalkDir::new(&self.root).min_depth(2).max_depth(3).sort_by_file_name() {
            let entry = entry.with_context(|| format!("Failed to walk {}", self.root.display()))?;
            let path = entry.path();
            if !entry.file_type().is_file() || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            let Ok(rel) = path.strip_prefix(&self.root) else { continue };
            let parts: Vec<String> = rel.iter().map(|p| p.to_string_lossy().into_owned()).collect();
            let Some(vintage) = parts.first().and_then(|dir| decode_component(dir)) else {
                debug!(path = %path.display(), "skipping file outside a vintage directory");
                continue;
            };

            let stored = match parts.as_slice() {
                [_, file] if file == CATALOGUE_FILE => StoredEntry {
                    vintage,
                    kind: StoredKind::Catalogue,
                    key: "catalogue".into(),
                    path: path.to_path_buf(),
                },
                [_, dir, file] if dir == DATASETS_DIR => StoredEntry {
                    vintage,
                    kind: StoredKind::Dataset,
                    key: file.trim_end_matches(".json").to_string(),
                    path: path.to_path_buf(),
                },
                _ => continue,
            };
            out.push(stored);
        }
        Ok(out)
    }

    /// Remove everything persisted for `vintage`. Returns whether anything existed.
    pub fn invalidate_vintage(&self, vintage: &Vintage) -> Result<bool> {
        let dir = self.vintage_dir(vintage);
        if !dir.exists() {
            return Ok(false);
        }
        std::fs::remove_dir_all(&dir)
            .with_context(|| format!("Failed to remove {}", dir.display()))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{area::Granularity, dataset::SourceSpec};

    #[test]
    fn datasets_round_trip_and_enumerate() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());
        let v2021 = Vintage::new("2021");
        let spec = SourceSpec::file("pop.csv", v2021.clone(), Granularity::Lsoa);
        let ds = Dataset::numeric("pop", v2021.clone(), Granularity::Lsoa, "population", [("LSOA001", 1500.0)]).unwrap();

        store.write_dataset(&spec.cache_key(), &ds).unwrap();
        let back = store.read_dataset(&v2021, &spec.cache_key(), None).unwrap();
        assert_eq!(back.numeric_value("population", "LSOA001"), Some(1500.0));

        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].kind, StoredKind::Dataset);
        assert_eq!(entries[0].vintage, "2021");
        assert_eq!(entries[0].key, spec.cache_key().as_str());
    }

    #[test]
    fn invalidation_is_per_vintage() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());
        for label in ["2011", "2021"] {
            let v = Vintage::new(label);
            let spec = SourceSpec::file("pop.csv", v.clone(), Granularity::Lsoa);
            let ds = Dataset::numeric("pop", v, Granularity::Lsoa, "population", [("LSOA001", 1.0)]).unwrap();
            store.write_dataset(&spec.cache_key(), &ds).unwrap();
        }

        assert!(store.invalidate_vintage(&Vintage::new("2011")).unwrap());
        assert!(!store.invalidate_vintage(&Vintage::new("2011")).unwrap());
        let entries = store.entries().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].vintage, "2021");
    }

    #[test]
    fn similar_vintage_labels_get_separate_directories() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());
        for label in ["2021 dec", "2021_dec", "2021/dec"] {
            let v = Vintage::new(label);
            let spec = SourceSpec::file("pop.csv", v.clone(), Granularity::Lsoa);
            let ds = Dataset::numeric("pop", v, Granularity::Lsoa, "population", [("LSOA001", 1.0)]).unwrap();
            store.write_dataset(&spec.cache_key(), &ds).unwrap();
        }
        assert_eq!(store.entries().unwrap().len(), 3);

        assert!(store.invalidate_vintage(&Vintage::new("2021 dec")).unwrap());
        let mut left: Vec<String> = store.entries().unwrap().into_iter().map(|e| e.vintage).collect();
        left.sort();
        assert_eq!(left, ["2021/dec", "2021_dec"]);

        let v = Vintage::new("2021_dec");
        let spec = SourceSpec::file("pop.csv", v.clone(), Granularity::Lsoa);
        assert!(store.read_dataset(&v, &spec.cache_key(), None).is_some());
    }

    #[test]
    fn directory_names_decode_to_labels() {
        for label in ["2021", "2021 dec", "50%", "..", ""] {
            let encoded = path_component(label);
            assert!(!encoded.contains(&['/', '.', ' '][..]), "{encoded}");
            assert_eq!(decode_component(&encoded).as_deref(), Some(label));
        }
        assert_eq!(decode_component("bad%2"), None);
    }

    #[test]
    fn expired_and_corrupt_files_are_misses() {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskStore::new(dir.path());
        let v = Vintage::new("2021");
        let spec = SourceSpec::file("pop.csv", v.clone(), Granularity::Lsoa);
        let ds = Dataset::numeric("pop", v.clone(), Granularity::Lsoa, "population", [("LSOA001", 1.0)]).unwrap();
        store.write_dataset(&spec.cache_key(), &ds).unwrap();

        assert!(store.read_dataset(&v, &spec.cache_key(), Some(Duration::ZERO)).is_none());

        std::fs::write(store.dataset_path(&v, &spec.cache_key()), b"{not json").unwrap();
        assert!(store.read_dataset(&v, &spec.cache_key(), None).is_none());
    }
}
