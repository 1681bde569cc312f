use std::{collections::BTreeSet, sync::Arc};

use ahash::AHashMap;
use serde::{Deserialize, Serialize};

use crate::{
    area::{normalise_outcode, normalise_postcode, AreaUnit, GeoIdentifier, Granularity, IdentifierKind, Vintage},
    error::{GeoError, Result},
};
use super::{builder::CatalogueBuilder, layer::CatalogueLayer};

/// Serialized form of one catalogue vintage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogueSnapshot {
    pub vintage: Vintage,
    pub units: Vec<AreaUnit>,
}

/// Read-only lookup tables of one vintage, one layer per granularity.
#[derive(Debug, Clone)]
pub struct CatalogueVintage {
    vintage: Vintage,
    postcodes: CatalogueLayer,
    outcodes: CatalogueLayer,
    lsoas: CatalogueLayer,
    lads: CatalogueLayer,
    ccgs: CatalogueLayer,
    custom: CatalogueLayer,
    outcode_members: AHashMap<Arc<str>, Vec<u32>>, // Outcode code to postcode positions.
}

impl CatalogueVintage {
    /// Assemble from validated layers; see [`CatalogueBuilder`].
    pub(crate) fn from_layers(vintage: Vintage, mut layers: Vec<CatalogueLayer>) -> Self {
        let mut take = |ty: Granularity| {
            layers.iter()
                .position(|layer| layer.ty == ty)
                .map(|i| layers.swap_remove(i))
                .unwrap_or_else(|| CatalogueLayer::new(ty))
        };
        let postcodes = take(Granularity::Postcode);
        let outcodes = take(Granularity::Outcode);
        let lsoas = take(Granularity::Lsoa);
        let lads = take(Granularity::Lad);
        let ccgs = take(Granularity::Ccg);
        let custom = take(Granularity::Custom);

        let mut outcode_members: AHashMap<Arc<str>, Vec<u32>> = AHashMap::new();
        for (i, unit) in postcodes.units().iter().enumerate() {
            if let Some(outcode) = unit.parents.get(Granularity::Outcode) {
                outcode_members.entry(outcode.clone()).or_default().push(i as u32);
            }
        }

        Self { vintage, postcodes, outcodes, lsoas, lads, ccgs, custom, outcode_members }
    }

    pub fn from_snapshot(snapshot: CatalogueSnapshot) -> Result<Self> {
        CatalogueBuilder::new(snapshot.vintage)
            .with_units(snapshot.units)
            .build()
    }

    pub fn snapshot(&self) -> CatalogueSnapshot {
        CatalogueSnapshot {
            vintage: self.vintage.clone(),
            units: Granularity::ALL.iter()
                .flat_map(|&ty| self.layer(ty).units().iter().cloned())
                .collect(),
        }
    }

    pub fn vintage(&self) -> &Vintage {
        &self.vintage
    }

    pub fn layer(&self, ty: Granularity) -> &CatalogueLayer {
        match ty {
            Granularity::Postcode => &self.postcodes,
            Granularity::Outcode => &self.outcodes,
            Granularity::Lsoa => &self.lsoas,
            Granularity::Lad => &self.lads,
            Granularity::Ccg => &self.ccgs,
            Granularity::Custom => &self.custom,
        }
    }

    /// Units of `ty` ordered by code. The slice can be walked any number of times.
    pub fn units_of(&self, ty: Granularity) -> &[AreaUnit] {
        self.layer(ty).units()
    }

    pub fn unit(&self, ty: Granularity, code: &str) -> Option<&AreaUnit> {
        self.layer(ty).get(code)
    }

    pub fn population(&self, ty: Granularity, code: &str) -> Option<u64> {
        self.unit(ty, code).and_then(|unit| unit.population)
    }

    /// Units of any granularity carrying `name`, in granularity then code order.
    pub fn units_named(&self, name: &str) -> Vec<&AreaUnit> {
        Granularity::ALL.iter()
            .flat_map(|&ty| self.layer(ty).named(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        Granularity::ALL.iter().map(|&ty| self.layer(ty).len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn not_found(&self, identifier: &GeoIdentifier, target: Granularity) -> GeoError {
        GeoError::NotFound {
            identifier: identifier.raw().to_string(),
            granularity: target,
            vintage: self.vintage.clone(),
        }
    }

    /// Canonical code of `identifier` at `target`.
    pub fn lookup(&self, identifier: &GeoIdentifier, target: Granularity) -> Result<Arc<str>> {
        let unit = self.find(identifier, target)?;
        self.project(unit, target, identifier)
    }

    /// The catalogue unit an identifier names, before any projection.
    pub fn find(&self, identifier: &GeoIdentifier, target: Granularity) -> Result<&AreaUnit> {
        match identifier.kind() {
            IdentifierKind::Postcode => normalise_postcode(identifier.raw())
                .and_then(|code| self.postcodes.get(&code))
                .ok_or_else(|| self.not_found(identifier, target)),
            IdentifierKind::Outcode => normalise_outcode(identifier.raw())
                .and_then(|code| self.outcodes.get(&code))
                .ok_or_else(|| self.not_found(identifier, target)),
            IdentifierKind::Code | IdentifierKind::Name => {
                let layers: Vec<Granularity> = match identifier.granularity() {
                    Some(ty) => vec![ty],
                    None => Granularity::ALL.to_vec(),
                };
                self.match_units(identifier, &layers, target)
            }
        }
    }

    /// Exact code match first, then name match; more than one hit is ambiguous.
    fn match_units(&self, identifier: &GeoIdentifier, layers: &[Granularity], target: Granularity) -> Result<&AreaUnit> {
        let raw = identifier.raw().trim();

        let by_code: Vec<&AreaUnit> = layers.iter()
            .filter_map(|&ty| self.layer(ty).get(raw))
            .collect();
        let hits: Vec<&AreaUnit> = if by_code.is_empty() {
            layers.iter().flat_map(|&ty| self.layer(ty).named(raw)).collect()
        } else {
            by_code
        };

        match hits.as_slice() {
            [] => Err(self.not_found(identifier, target)),
            [unit] => Ok(*unit),
            many => Err(GeoError::AmbiguousIdentifier {
                identifier: identifier.raw().to_string(),
                candidates: many.iter().map(|u| u.code.to_string()).collect(),
            }),
        }
    }

    /// Map a catalogue unit onto `target`: itself, one hop through its ancestor references,
    /// or (for outcodes) through the units its member postcodes fall in.
    pub fn project(&self, unit: &AreaUnit, target: Granularity, identifier: &GeoIdentifier) -> Result<Arc<str>> {
        if unit.granularity == target {
            return Ok(unit.code.clone());
        }

        if unit.granularity.nests_in(target) {
            return unit.parents.get(target)
                .cloned()
                .ok_or_else(|| self.not_found(identifier, target));
        }

        if unit.granularity == Granularity::Outcode && Granularity::Postcode.nests_in(target) {
            let candidates: BTreeSet<Arc<str>> = self.outcode_members.get(&unit.code)
                .into_iter()
                .flatten()
                .filter_map(|&i| self.postcodes.at(i))
                .filter_map(|postcode| postcode.parents.get(target).cloned())
                .collect();
            let mut candidates = candidates.into_iter();
            return match (candidates.next(), candidates.len()) {
                (None, _) => Err(self.not_found(identifier, target)),
                (Some(code), 0) => Ok(code),
                (Some(first), _) => Err(GeoError::AmbiguousIdentifier {
                    identifier: identifier.raw().to_string(),
                    candidates: std::iter::once(first).chain(candidates).map(|c| c.to_string()).collect(),
                }),
            };
        }

        Err(GeoError::GranularityUnsupported {
            identifier: identifier.raw().to_string(),
            from: unit.granularity,
            to: target,
        })
    }
}
