mod builder;
mod layer;
mod vintage;

use std::{collections::BTreeMap, sync::Arc};

pub use builder::{CatalogueBuilder, LookupColumns};
pub use layer::CatalogueLayer;
pub use vintage::{CatalogueSnapshot, CatalogueVintage};

use crate::{
    area::{AreaUnit, GeoIdentifier, Granularity, Vintage},
    error::{GeoError, Result},
};

/// Reference catalogue holding any number of vintages side by side.
/// Every query names its vintage explicitly.
#[derive(Debug, Clone, Default)]
pub struct Catalogue {
    vintages: BTreeMap<Vintage, Arc<CatalogueVintage>>,
}

impl Catalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or replace) a vintage, returning the previous one.
    pub fn insert(&mut self, vintage: CatalogueVintage) -> Option<Arc<CatalogueVintage>> {
        self.vintages.insert(vintage.vintage().clone(), Arc::new(vintage))
    }

    pub fn with_vintage(mut self, vintage: CatalogueVintage) -> Self {
        self.insert(vintage);
        self
    }

    pub fn vintages(&self) -> impl Iterator<Item = &Vintage> {
        self.vintages.keys()
    }

    pub fn contains(&self, vintage: &Vintage) -> bool {
        self.vintages.contains_key(vintage)
    }

    /// The tables of `vintage`; asking for one the catalogue does not hold is a vintage mismatch.
    pub fn vintage(&self, vintage: &Vintage) -> Result<&CatalogueVintage> {
        self.vintages.get(vintage)
            .map(|v| &**v)
            .ok_or_else(|| GeoError::VintageMismatch {
                context: "catalogue lookup".into(),
                expected: vintage.clone(),
                found: self.vintages.keys()
                    .next_back()
                    .cloned()
                    .unwrap_or_else(|| Vintage::new("none")),
            })
    }

    pub fn lookup(&self, vintage: &Vintage, identifier: &GeoIdentifier, target: Granularity) -> Result<Arc<str>> {
        self.vintage(vintage)?.lookup(identifier, target)
    }

    pub fn units_of(&self, vintage: &Vintage, ty: Granularity) -> Result<&[AreaUnit]> {
        Ok(self.vintage(vintage)?.units_of(ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn edition(label: &str, lad: &str) -> CatalogueVintage {
        CatalogueBuilder::new(Vintage::new(label))
            .with_unit(AreaUnit::new(Granularity::Lad, lad).with_name("Buckinghamshire"))
            .build()
            .unwrap()
    }

    #[test]
    fn vintages_are_selected_explicitly() {
        let catalogue = Catalogue::new()
            .with_vintage(edition("2011", "E10000002"))
            .with_vintage(edition("2021", "E06000060"));
        let name = GeoIdentifier::with_hint("Buckinghamshire", Granularity::Lad);

        assert_eq!(&*catalogue.lookup(&Vintage::new("2011"), &name, Granularity::Lad).unwrap(), "E10000002");
        assert_eq!(&*catalogue.lookup(&Vintage::new("2021"), &name, Granularity::Lad).unwrap(), "E06000060");

        let err = catalogue.lookup(&Vintage::new("2001"), &name, Granularity::Lad).unwrap_err();
        assert!(matches!(err, GeoError::VintageMismatch { .. }));
    }

    #[test]
    fn units_of_is_ordered_and_restartable() {
        let catalogue = Catalogue::new().with_vintage(
            CatalogueBuilder::new(Vintage::new("2021"))
                .with_unit(AreaUnit::new(Granularity::Lsoa, "E01000003"))
                .with_unit(AreaUnit::new(Granularity::Lsoa, "E01000001"))
                .build()
                .unwrap(),
        );
        let units = catalogue.units_of(&Vintage::new("2021"), Granularity::Lsoa).unwrap();
        let first: Vec<&str> = units.iter().map(|u| &*u.code).collect();
        let second: Vec<&str> = units.iter().map(|u| &*u.code).collect();
        assert_eq!(first, ["E01000001", "E01000003"]);
        assert_eq!(first, second);
    }
}
