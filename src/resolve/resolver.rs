use std::{collections::BTreeMap, sync::Arc};

use rayon::prelude::*;
use tracing::{debug, warn};

use crate::{
    area::{GeoIdentifier, Granularity, Vintage},
    catalogue::{Catalogue, CatalogueVintage},
    dataset::Dataset,
    error::Result,
};
use super::policy::{apply_policy, BatchReport, OnUnresolved, ResolutionResult};

/// Resolves raw identifiers to canonical codes against one catalogue vintage.
/// Pure: the same identifier, target and vintage always give the same answer.
#[derive(Debug, Clone, Copy)]
pub struct Resolver<'c> {
    edition: &'c CatalogueVintage,
}

impl<'c> Resolver<'c> {
    pub fn new(catalogue: &'c Catalogue, vintage: &Vintage) -> Result<Self> {
        Ok(Self { edition: catalogue.vintage(vintage)? })
    }

    pub fn for_edition(edition: &'c CatalogueVintage) -> Self {
        Self { edition }
    }

    pub fn vintage(&self) -> &Vintage {
        self.edition.vintage()
    }

    pub fn resolve(&self, identifier: &GeoIdentifier, target: Granularity) -> ResolutionResult {
        let result = self.edition.lookup(identifier, target);
        debug!(identifier = identifier.raw(), %target, ok = result.is_ok(), "resolve");
        result
    }

    /// One result per identifier, in input order; failures stay at their position.
    pub fn resolve_many(&self, identifiers: &[GeoIdentifier], target: Granularity) -> Vec<ResolutionResult> {
        identifiers.iter().map(|id| self.resolve(id, target)).collect()
    }

    /// [`Resolver::resolve_many`] spread over the rayon pool; output order matches input order.
    pub fn par_resolve_many(&self, identifiers: &[GeoIdentifier], target: Granularity) -> Vec<ResolutionResult> {
        identifiers.par_iter().map(|id| self.edition.lookup(id, target)).collect()
    }

    /// Resolve a batch under `policy`, returning the surviving codes and a report.
    pub fn resolve_batch(
        &self,
        identifiers: &[GeoIdentifier],
        target: Granularity,
        policy: OnUnresolved,
    ) -> Result<(Vec<Option<Arc<str>>>, BatchReport)> {
        let results = self.par_resolve_many(identifiers, target);
        let report = BatchReport::from_results(&results);
        if report.unresolved() > 0 {
            warn!(%policy, %report, "unresolved identifiers in batch");
        }
        let codes = apply_policy(results, policy)?;
        Ok((codes, report))
    }

    /// Attach caller records to canonical codes: sum `value` per resolved code into a
    /// one-column dataset at `target`. Unresolved records are handled per `policy`;
    /// under `skip` and `null` they contribute nothing.
    pub fn tally(
        &self,
        name: &str,
        column: &str,
        records: &[(GeoIdentifier, f64)],
        target: Granularity,
        policy: OnUnresolved,
    ) -> Result<(Dataset, BatchReport)> {
        let identifiers: Vec<GeoIdentifier> = records.iter().map(|(id, _)| id.clone()).collect();
        let results = self.par_resolve_many(&identifiers, target);
        let report = BatchReport::from_results(&results);

        if policy == OnUnresolved::Fail {
            if let Some(Err(err)) = results.iter().find(|r| r.is_err()) {
                return Err(err.clone());
            }
        } else if report.unresolved() > 0 {
            warn!(dataset = name, %policy, %report, "records left unattached");
        }

        let mut totals: BTreeMap<Arc<str>, f64> = BTreeMap::new();
        for (result, (_, value)) in results.into_iter().zip(records) {
            if let Ok(code) = result {
                *totals.entry(code).or_default() += value;
            }
        }

        let dataset = Dataset::numeric(name, self.vintage().clone(), target, column, totals)?;
        Ok((dataset, report))
    }

    /// [`Resolver::tally`] with every record counting once.
    pub fn count(
        &self,
        name: &str,
        column: &str,
        identifiers: &[GeoIdentifier],
        target: Granularity,
        policy: OnUnresolved,
    ) -> Result<(Dataset, BatchReport)> {
        let records: Vec<(GeoIdentifier, f64)> = identifiers.iter().map(|id| (id.clone(), 1.0)).collect();
        self.tally(name, column, &records, target, policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{area::AreaUnit, catalogue::CatalogueBuilder, error::GeoError};

    fn edition() -> CatalogueVintage {
        CatalogueBuilder::new(Vintage::new("2021"))
            .with_unit(AreaUnit::new(Granularity::Lad, "E09000023").with_name("Lewisham"))
            .with_unit(AreaUnit::new(Granularity::Lsoa, "E01003189").with_parent(Granularity::Lad, "E09000023"))
            .with_unit(AreaUnit::new(Granularity::Postcode, "SE13 5AB").with_parent(Granularity::Lsoa, "E01003189"))
            .with_unit(AreaUnit::new(Granularity::Postcode, "SE13 6CD").with_parent(Granularity::Lsoa, "E01003189"))
            .build()
            .unwrap()
    }

    fn ids(raw: &[&str]) -> Vec<GeoIdentifier> {
        raw.iter().map(|&s| GeoIdentifier::new(s)).collect()
    }

    #[test]
    fn postcodes_are_case_and_space_insensitive() {
        let edition = edition();
        let resolver = Resolver::for_edition(&edition);
        for raw in ["SE13 5AB", "se135ab", " se13  5ab "] {
            assert_eq!(&*resolver.resolve(&GeoIdentifier::new(raw), Granularity::Lsoa).unwrap(), "E01003189");
        }
    }

    #[test]
    fn parallel_matches_sequential() {
        let edition = edition();
        let resolver = Resolver::for_edition(&edition);
        let batch = ids(&["SE13 5AB", "ZZ9 9ZZ", "Lewisham", "SE13"]);
        assert_eq!(
            resolver.resolve_many(&batch, Granularity::Lad),
            resolver.par_resolve_many(&batch, Granularity::Lad)
        );
    }

    #[test]
    fn tally_sums_per_code() {
        let edition = edition();
        let resolver = Resolver::for_edition(&edition);
        let batch = ids(&["SE13 5AB", "SE13 6CD", "SE13 5AB", "ZZ9 9ZZ"]);

        let err = resolver.count("clients", "clients", &batch, Granularity::Lsoa, OnUnresolved::Fail).unwrap_err();
        assert!(matches!(err, GeoError::NotFound { .. }));

        let (ds, report) = resolver.count("clients", "clients", &batch, Granularity::Lsoa, OnUnresolved::Skip).unwrap();
        assert_eq!(ds.numeric_value("clients", "E01003189"), Some(3.0));
        assert_eq!(report.response_rate(), Some(0.75));
    }
}
