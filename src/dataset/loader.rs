use std::{collections::BTreeMap, fmt, path::PathBuf, sync::Arc, time::Duration};

use rayon::prelude::*;
use serde_json::Value as Json;
use tracing::{debug, info, warn};

use crate::{
    area::{Granularity, Vintage},
    config::EngineConfig,
    error::{GeoError, Result},
};
use super::{
    arcgis::{self, BoundaryService, ARCGIS_BASE_URL},
    cache::DatasetCache,
    dataset::{Dataset, CODE_COLUMN},
    fetch::{fetch_with_timeout, DefaultFetch, Fetch, Location},
    io::{read_dataset, TableSchema},
    nomis::{self, NomisSource, NomisTable, NOMIS_BASE_URL, NOMIS_CODE_COLUMN, NOMIS_VALUE_COLUMN, SKIPPED_TABLES},
    source::{CacheKey, Origin, SourceFormat, SourceSpec},
    store::DiskStore,
};

/// Resolved fetch plan for one spec.
struct Plan {
    location: Location,
    format: SourceFormat,
    code_column: String,
    value_columns: Vec<String>,
    nomis_id: Option<String>,
}

/// Loads datasets from files, NOMIS and named sources, memoising them per [`SourceSpec`].
pub struct DatasetLoader {
    fetcher: Arc<dyn Fetch>,
    cache: DatasetCache,
    store: Option<DiskStore>,
    sources: BTreeMap<String, String>,
    nomis_base_url: String,
    arcgis_base_url: String,
    timeout: Option<Duration>,
}

impl fmt::Debug for DatasetLoader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatasetLoader")
            .field("cache", &self.cache)
            .field("store", &self.store)
            .field("sources", &self.sources)
            .field("nomis_base_url", &self.nomis_base_url)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl Default for DatasetLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DatasetLoader {
    pub fn new() -> Self {
        Self {
            fetcher: Arc::new(DefaultFetch),
            cache: DatasetCache::new(None),
            store: None,
            sources: BTreeMap::new(),
            nomis_base_url: NOMIS_BASE_URL.to_string(),
            arcgis_base_url: ARCGIS_BASE_URL.to_string(),
            timeout: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        let mut loader = Self::new()
            .with_ttl(config.cache_ttl()?)
            .with_timeout(config.fetch_timeout()?)
            .with_nomis_base_url(&config.nomis_base_url)
            .with_arcgis_base_url(&config.arcgis_base_url);
        if let Some(dir) = &config.cache_dir {
            loader = loader.with_store(DiskStore::new(dir));
        }
        for (name, target) in &config.sources {
            loader = loader.with_source(name, target);
        }
        Ok(loader)
    }

    /// Replace the transport, e.g. with an instrumented or offline fetcher.
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetch>) -> Self {
        self.fetcher = fetcher;
        self
    }

    pub fn with_ttl(mut self, ttl: Option<Duration>) -> Self {
        self.cache = DatasetCache::new(ttl);
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_store(mut self, store: DiskStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Register a named source pointing at a URL or a local path.
    pub fn with_source(mut self, name: &str, target: &str) -> Self {
        self.sources.insert(name.to_string(), target.to_string());
        self
    }

    pub fn with_nomis_base_url(mut self, url: &str) -> Self {
        self.nomis_base_url = url.to_string();
        self
    }

    pub fn with_arcgis_base_url(mut self, url: &str) -> Self {
        self.arcgis_base_url = url.to_string();
        self
    }

    pub fn cache(&self) -> &DatasetCache {
        &self.cache
    }

    pub fn store(&self) -> Option<&DiskStore> {
        self.store.as_ref()
    }

    /// Load the dataset for `spec`. Repeated calls with an identical spec return the same
    /// `Arc` without fetching again; concurrent calls share one fetch.
    pub fn load(&self, spec: &SourceSpec) -> Result<Arc<Dataset>> {
        let origin = spec.origin()?;
        let key = spec.cache_key();
        self.cache.get_or_load(&key, || self.load_uncached(spec, origin, &key))
    }

    fn load_uncached(&self, spec: &SourceSpec, origin: Origin<'_>, key: &CacheKey) -> Result<Dataset> {
        if let Some(dataset) = self.store.as_ref().and_then(|s| s.read_dataset(&spec.vintage, key, self.cache.ttl())) {
            info!(source = %spec.describe(), "loaded dataset from the persisted cache");
            return Ok(dataset);
        }

        let dataset = self.fetch_dataset(spec, origin)?;

        if let Some(store) = &self.store {
            if let Err(err) = store.write_dataset(key, &dataset) {
                warn!(source = %spec.describe(), "could not persist dataset: {err:#}");
            }
        }
        Ok(dataset)
    }

    fn fetch_dataset(&self, spec: &SourceSpec, origin: Origin<'_>) -> Result<Dataset> {
        let describe = spec.describe();
        let plan = self.plan(spec, origin, &describe)?;
        info!(source = %describe, location = %plan.location, "fetching dataset");

        let url = plan.location.to_string();
        let bytes = fetch_with_timeout(self.fetcher.clone(), plan.location, self.timeout, &describe)?;
        if let Some(id) = &plan.nomis_id {
            nomis::check_payload(&bytes, id, &describe)?;
        }

        let name = spec.dataset_name();
        let schema = TableSchema {
            name: &name,
            vintage: &spec.vintage,
            period: spec.period.as_deref(),
            granularity: spec.granularity,
            code_column: &plan.code_column,
            value_columns: &plan.value_columns,
            rename: &spec.rename,
        };
        let dataset = read_dataset(&bytes, plan.format, &schema)?;

        if plan.nomis_id.is_some() {
            nomis::warn_if_truncated(dataset.len(), &url);
        }
        info!(dataset = dataset.name(), rows = dataset.len(), columns = dataset.columns().len(), "dataset loaded");
        Ok(dataset)
    }

    fn plan(&self, spec: &SourceSpec, origin: Origin<'_>, describe: &str) -> Result<Plan> {
        let code_column = |default: &str| spec.code_column.clone().unwrap_or_else(|| default.to_string());

        let plan = match origin {
            Origin::File(path) => Plan {
                format: spec.format
                    .or_else(|| SourceFormat::from_extension(&path.to_string_lossy()))
                    .unwrap_or(SourceFormat::Csv),
                location: Location::Path(path.to_path_buf()),
                code_column: code_column(CODE_COLUMN),
                value_columns: spec.value_columns.clone(),
                nomis_id: None,
            },
            Origin::Nomis(id) => Plan {
                location: Location::Url(nomis::data_url(&self.nomis_base_url, id, &nomis::query_params(spec))),
                format: SourceFormat::Csv,
                code_column: code_column(NOMIS_CODE_COLUMN),
                value_columns: if spec.value_columns.is_empty() {
                    vec![NOMIS_VALUE_COLUMN.to_string()]
                } else {
                    spec.value_columns.clone()
                },
                nomis_id: Some(id.to_string()),
            },
            Origin::Named(source) => {
                let target = self.sources.get(source).map(String::as_str).unwrap_or(source);
                let location = if is_url(target) {
                    Location::Url(target.to_string())
                } else if self.sources.contains_key(source) {
                    Location::Path(PathBuf::from(target))
                } else {
                    return Err(GeoError::unavailable(describe, format!("unknown source {source:?}")));
                };
                let format = spec.format
                    .or_else(|| SourceFormat::from_extension(target))
                    .unwrap_or_else(|| if target.contains("f=geojson") { SourceFormat::GeoJson } else { SourceFormat::Csv });
                Plan {
                    location,
                    format,
                    code_column: code_column(CODE_COLUMN),
                    value_columns: spec.value_columns.clone(),
                    nomis_id: None,
                }
            }
        };
        Ok(plan)
    }

    /// Look up the ArcGIS LAD boundary layer for `vintage` and describe it as a GeoJSON source.
    pub fn boundary_source(&self, vintage: &Vintage, resolution: &str) -> Result<SourceSpec> {
        let year: u16 = vintage.year()
            .ok_or_else(|| GeoError::Config(format!("vintage {vintage} does not start with a year")))?;
        let describe = format!("arcgis LAD boundaries {year} {resolution}");
        let url = format!("{}?f=json", self.arcgis_base_url.trim_end_matches('/'));

        let bytes = fetch_with_timeout(self.fetcher.clone(), Location::Url(url), self.timeout, &describe)?;
        let services = arcgis::parse_service_catalog(&bytes)
            .map_err(|err| GeoError::from_source_error(&describe, err))?;
        let service: &BoundaryService = arcgis::select_service(&services, year, resolution)
            .ok_or_else(|| GeoError::unavailable(&describe, "no matching boundary service"))?;

        Ok(SourceSpec::named(&service.geojson_url(&self.arcgis_base_url), vintage.clone(), Granularity::Lad)
            .with_name(&service.arcgis_id)
            .with_format(SourceFormat::GeoJson)
            .with_code_column(&service.code_column()))
    }

    fn fetch_url(&self, url: String, describe: &str) -> Result<Arc<[u8]>> {
        debug!(url = %url, "fetching {describe}");
        fetch_with_timeout(self.fetcher.clone(), Location::Url(url), self.timeout, describe)
    }

    /// Every table NOMIS publishes, without sources.
    pub fn nomis_tables(&self) -> Result<Vec<NomisTable>> {
        let describe = "nomis table list";
        let bytes = self.fetch_url(nomis::tables_url(&self.nomis_base_url), describe)?;
        nomis::parse_table_list(&bytes).map_err(|err| GeoError::from_source_error(describe, err))
    }

    pub fn nomis_sources(&self) -> Result<Vec<NomisSource>> {
        let describe = "nomis source list";
        let bytes = self.fetch_url(nomis::sources_url(&self.nomis_base_url), describe)?;
        nomis::parse_sources(&bytes).map_err(|err| GeoError::from_source_error(describe, err))
    }

    /// Raw SDMX structure document of one dataset.
    pub fn nomis_overview(&self, dataset_id: &str) -> Result<Json> {
        let describe = format!("nomis {dataset_id} overview");
        let bytes = self.fetch_url(nomis::overview_url(&self.nomis_base_url, dataset_id), &describe)?;
        nomis::check_payload(&bytes, dataset_id, &describe)?;
        serde_json::from_slice(&bytes)
            .map_err(|err| GeoError::unavailable(&describe, format!("invalid JSON: {err}")))
    }

    /// The table list with each table's source read from its overview. Overviews are fetched
    /// on the rayon pool; a table whose overview fails keeps no source.
    pub fn nomis_tables_with_sources(&self) -> Result<Vec<NomisTable>> {
        let mut tables = self.nomis_tables()?;
        info!(tables = tables.len(), "attributing NOMIS tables to sources");

        tables.par_iter_mut()
            .filter(|table| !SKIPPED_TABLES.contains(&table.id.as_str()))
            .for_each(|table| match self.nomis_overview(&table.id) {
                Ok(overview) => table.source = nomis::source_of(&overview),
                Err(err) => warn!(table = %table.id, "no source for NOMIS table: {err}"),
            });
        Ok(tables)
    }

    /// Forget every dataset of `vintage`, in memory and on disk. Returns the in-memory count.
    pub fn invalidate_vintage(&self, vintage: &Vintage) -> usize {
        let removed = self.cache.invalidate_vintage(vintage);
        if let Some(store) = &self.store {
            if let Err(err) = store.invalidate_vintage(vintage) {
                warn!(%vintage, "could not clear the persisted cache: {err:#}");
            }
        }
        info!(%vintage, removed, "invalidated cached datasets");
        removed
    }
}

fn is_url(target: &str) -> bool {
    target.starts_with("http://") || target.starts_with("https://")
}

#[cfg(test)]
mod tests {
    use std::sync::{atomic::{AtomicUsize, Ordering}, Mutex};

    use super::*;

    /// Serves canned payloads and records requested locations.
    #[derive(Default)]
    struct Canned {
        payloads: BTreeMap<String, Vec<u8>>,
        requests: Mutex<Vec<String>>,
        calls: AtomicUsize,
    }

    impl Canned {
        fn with(mut self, location: &str, payload: &[u8]) -> Self {
            self.payloads.insert(location.to_string(), payload.to_vec());
            self
        }
    }

    impl Fetch for Canned {
        fn fetch(&self, location: &Location, _: Option<Duration>) -> anyhow::Result<Arc<[u8]>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let key = location.to_string();
            self.requests.lock().unwrap().push(key.clone());
            let bytes = self.payloads.get(&key).ok_or_else(|| anyhow::anyhow!("404 for {key}"))?;
            Ok(Arc::from(bytes.as_slice()))
        }
    }

    fn v2021() -> Vintage { Vintage::new("2021") }

    #[test]
    fn nomis_defaults_to_obs_value() {
        let url = "http://nomis.test/dataset/NM_2010_1.data.csv?time=latest";
        let fetcher = Arc::new(Canned::default()
            .with(url, b"DATE,GEOGRAPHY_CODE,OBS_VALUE\n2021,E09000013,183000\n2021,E09000023,300000\n"));
        let loader = DatasetLoader::new()
            .with_fetcher(fetcher.clone())
            .with_nomis_base_url("http://nomis.test/");

        let spec = SourceSpec::nomis("NM_2010_1", v2021(), Granularity::Lad)
            .with_period("latest")
            .with_rename("OBS_VALUE", "population");
        let ds = loader.load(&spec).unwrap();
        assert_eq!(ds.name(), "NM_2010_1");
        assert_eq!(ds.period(), Some("latest"));
        assert_eq!(ds.column_names().collect::<Vec<_>>(), vec!["population"]);
        assert_eq!(ds.numeric_value("population", "E09000013"), Some(183000.0));
        assert_eq!(fetcher.requests.lock().unwrap().as_slice(), [url]);
    }

    #[test]
    fn unknown_nomis_id_is_unavailable_and_not_cached() {
        let url = "http://nomis.test/dataset/NM_0.data.csv";
        let fetcher = Arc::new(Canned::default().with(url, b"<!DOCTYPE html><html></html>"));
        let loader = DatasetLoader::new().with_fetcher(fetcher.clone()).with_nomis_base_url("http://nomis.test");

        let spec = SourceSpec::nomis("NM_0", v2021(), Granularity::Lad);
        for _ in 0..2 {
            assert!(matches!(loader.load(&spec), Err(GeoError::SourceUnavailable { .. })));
        }
        assert_eq!(fetcher.calls.load(Ordering::SeqCst), 2);
        assert!(loader.cache().is_empty());
    }

    #[test]
    fn named_sources_use_the_registry() {
        let fetcher = Arc::new(Canned::default().with("https://data.test/imd.csv", b"code,decile\nE01000001,3\n"));
        let loader = DatasetLoader::new()
            .with_fetcher(fetcher)
            .with_source("imd", "https://data.test/imd.csv");

        let ds = loader.load(&SourceSpec::named("imd", v2021(), Granularity::Lsoa)).unwrap();
        assert_eq!(ds.numeric_value("decile", "E01000001"), Some(3.0));

        let err = loader.load(&SourceSpec::named("nope", v2021(), Granularity::Lsoa)).unwrap_err();
        assert!(err.to_string().contains("unknown source"));
    }

    #[test]
    fn nomis_tables_are_joined_with_their_sources() {
        let tables = br#"{"structure": {"keyfamilies": {"keyfamily": [
            {"id": "NM_1_1", "name": {"value": "Jobseeker's Allowance"}},
            {"id": "NM_45_1", "name": {"value": "skipped"}},
            {"id": "NM_17_5", "name": {"value": "annual population survey"}},
            {"id": "NM_9_9", "name": {"value": "withdrawn"}}
        ]}}}"#;
        let annotated = br#"{"structure": {"keyfamilies": {"keyfamily": [{"annotations": {"annotation": [
            {"annotationtitle": "contenttype/sources", "annotationtext": "jsa"}
        ]}}]}}}"#;
        let contact = br#"{"structure": {"header": {"sender": {"contact": {"name": "ONS"}}}, "keyfamilies": {"keyfamily": [{}]}}}"#;

        let fetcher = Arc::new(Canned::default()
            .with("http://nomis.test/dataset/def.sdmx.json", tables)
            .with("http://nomis.test/dataset/NM_1_1/def.sdmx.json", annotated)
            .with("http://nomis.test/dataset/NM_17_5/def.sdmx.json", contact));
        let loader = DatasetLoader::new().with_fetcher(fetcher.clone()).with_nomis_base_url("http://nomis.test/");

        let tables = loader.nomis_tables_with_sources().unwrap();
        let sources: Vec<(&str, Option<&str>)> = tables.iter().map(|t| (t.id.as_str(), t.source.as_deref())).collect();
        assert_eq!(sources, [("NM_1_1", Some("jsa")), ("NM_45_1", None), ("NM_17_5", Some("ONS")), ("NM_9_9", None)]);

        let requests = fetcher.requests.lock().unwrap();
        assert_eq!(requests.len(), 4);
        assert!(!requests.iter().any(|url| url.contains("NM_45_1")));
    }

    #[test]
    fn nomis_source_list_and_failures() {
        let fetcher = Arc::new(Canned::default()
            .with("http://nomis.test/contenttype/sources.json", br#"{"contenttype": {"item": [
                {"id": "jsa", "name": "jobseekers allowance"},
                {"id": "census", "name": "census", "item": [{"id": "census2021", "name": "2021 census"}]}
            ]}}"#));
        let loader = DatasetLoader::new().with_fetcher(fetcher).with_nomis_base_url("http://nomis.test");

        let sources = loader.nomis_sources().unwrap();
        assert_eq!(sources.iter().map(|s| s.id.as_str()).collect::<Vec<_>>(), ["jsa", "census2021"]);
        assert!(matches!(loader.nomis_tables(), Err(GeoError::SourceUnavailable { .. })));
        assert!(matches!(loader.nomis_overview("NM_1_1"), Err(GeoError::SourceUnavailable { .. })));
    }

    #[test]
    fn boundary_source_picks_the_vintage_year() {
        let catalog = br#"{"services": [
            {"name": "LAD_DEC_2021_UK_BGC", "type": "FeatureServer"},
            {"name": "LAD_DEC_2022_UK_BGC", "type": "FeatureServer"}
        ]}"#;
        let fetcher = Arc::new(Canned::default().with("https://arcgis.test/services?f=json", catalog));
        let loader = DatasetLoader::new()
            .with_fetcher(fetcher)
            .with_arcgis_base_url("https://arcgis.test/services/");

        let spec = loader.boundary_source(&v2021(), "BGC").unwrap();
        assert_eq!(spec.code_column.as_deref(), Some("LAD21CD"));
        assert_eq!(spec.format, Some(SourceFormat::GeoJson));
        assert_eq!(spec.name.as_deref(), Some("LAD_DEC_2021_UK_BGC"));
        assert!(spec.source.unwrap().starts_with("https://arcgis.test/services/LAD_DEC_2021_UK_BGC/"));
    }
}
