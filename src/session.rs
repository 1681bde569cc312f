use std::{path::PathBuf, sync::Arc};

use tracing::info;

use crate::{
    area::{GeoIdentifier, Granularity, Vintage},
    catalogue::{Catalogue, CatalogueVintage},
    config::EngineConfig,
    dataset::{Dataset, DatasetLoader, SourceSpec, StoredEntry},
    engine::{JoinEngine, JoinSpec},
    error::{GeoError, Result},
    frame::ResultFrame,
    resolve::{BatchReport, ResolutionResult, Resolver},
};

const STORE: &str = "persisted cache";

/// One configured engine: a catalogue, a dataset loader and the defaults from [`EngineConfig`].
#[derive(Debug)]
pub struct Session {
    config: EngineConfig,
    catalogue: Catalogue,
    loader: DatasetLoader,
}

impl Session {
    pub fn new(config: EngineConfig, catalogue: Catalogue) -> Result<Self> {
        config.validate()?;
        let loader = DatasetLoader::from_config(&config)?;
        Ok(Self { config, catalogue, loader })
    }

    /// Swap in a differently configured loader (e.g. with an instrumented fetcher).
    pub fn with_loader(mut self, loader: DatasetLoader) -> Self {
        self.loader = loader;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn catalogue(&self) -> &Catalogue {
        &self.catalogue
    }

    pub fn loader(&self) -> &DatasetLoader {
        &self.loader
    }

    pub fn vintage(&self) -> &Vintage {
        &self.config.vintage
    }

    pub fn granularity(&self) -> Granularity {
        self.config.granularity
    }

    pub fn resolver(&self) -> Result<Resolver<'_>> {
        Resolver::new(&self.catalogue, &self.config.vintage)
    }

    /// Resolve at the configured granularity.
    pub fn resolve(&self, identifier: &GeoIdentifier) -> ResolutionResult {
        self.resolver()?.resolve(identifier, self.config.granularity)
    }

    pub fn resolve_many(&self, identifiers: &[GeoIdentifier]) -> Result<Vec<ResolutionResult>> {
        Ok(self.resolver()?.par_resolve_many(identifiers, self.config.granularity))
    }

    /// Resolve under the configured `on_unresolved` policy.
    pub fn resolve_batch(&self, identifiers: &[GeoIdentifier]) -> Result<(Vec<Option<Arc<str>>>, BatchReport)> {
        self.resolver()?.resolve_batch(identifiers, self.config.granularity, self.config.on_unresolved)
    }

    /// Sum caller records per resolved code into a dataset at the configured granularity.
    pub fn tally(&self, name: &str, column: &str, records: &[(GeoIdentifier, f64)]) -> Result<(Dataset, BatchReport)> {
        self.resolver()?.tally(name, column, records, self.config.granularity, self.config.on_unresolved)
    }

    pub fn file_source(&self, path: impl Into<PathBuf>) -> SourceSpec {
        SourceSpec::file(path, self.config.vintage.clone(), self.config.granularity)
    }

    pub fn nomis_source(&self, dataset_id: &str) -> SourceSpec {
        SourceSpec::nomis(dataset_id, self.config.vintage.clone(), self.config.granularity)
    }

    pub fn named_source(&self, source: &str) -> SourceSpec {
        SourceSpec::named(source, self.config.vintage.clone(), self.config.granularity)
    }

    pub fn load(&self, spec: &SourceSpec) -> Result<Arc<Dataset>> {
        self.loader.load(spec)
    }

    /// Join spec at the configured granularity and vintage.
    pub fn join_spec(&self) -> JoinSpec {
        JoinSpec::new(self.config.granularity, self.config.vintage.clone())
    }

    pub fn join(&self, datasets: &[&Dataset], spec: &JoinSpec) -> Result<ResultFrame> {
        JoinEngine::new(&self.catalogue).join(datasets, spec)
    }

    /// Switch to another vintage. Everything cached for the old one is dropped, in memory
    /// and on disk. Returns how many in-memory datasets were dropped.
    pub fn set_vintage(&mut self, vintage: Vintage) -> usize {
        if vintage == self.config.vintage {
            return 0;
        }
        let previous = std::mem::replace(&mut self.config.vintage, vintage);
        info!(from = %previous, to = %self.config.vintage, "switching vintage");
        self.loader.invalidate_vintage(&previous)
    }

    /// Write the current vintage's catalogue to the persisted cache. `false` without one.
    pub fn persist_catalogue(&self) -> Result<bool> {
        let Some(store) = self.loader.store() else { return Ok(false) };
        let edition = self.catalogue.vintage(&self.config.vintage)?;
        store.write_catalogue(edition)
            .map_err(|err| GeoError::from_source_error(STORE, err))?;
        Ok(true)
    }

    /// Load a persisted catalogue snapshot for `vintage` into the session.
    pub fn restore_catalogue(&mut self, vintage: &Vintage) -> Result<bool> {
        let Some(store) = self.loader.store() else { return Ok(false) };
        let restored: Option<CatalogueVintage> = store.read_catalogue(vintage)
            .map_err(|err| GeoError::from_source_error(STORE, err))?;
        match restored {
            Some(edition) => {
                self.catalogue.insert(edition);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Files in the persisted cache; empty without one.
    pub fn stored_entries(&self) -> Result<Vec<StoredEntry>> {
        match self.loader.store() {
            Some(store) => store.entries().map_err(|err| GeoError::from_source_error(STORE, err)),
            None => Ok(Vec::new()),
        }
    }
}
