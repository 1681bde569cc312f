use std::{collections::BTreeMap, sync::Arc};

use ahash::{AHashMap, AHashSet};
use tracing::{info, warn};

use crate::{
    area::{normalise_outcode, normalise_postcode, outcode_of, AreaUnit, Granularity, Vintage},
    common::{read_from_csv_bytes, string_values},
    dataset::Dataset,
    error::{GeoError, Result},
};
use super::{layer::CatalogueLayer, vintage::CatalogueVintage};

/// Column names of a postcode lookup file (ONS postcode directory style).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LookupColumns {
    pub postcode: String,
    pub lsoa_code: Option<String>,
    pub lsoa_name: Option<String>,
    pub lad_code: Option<String>,
    pub lad_name: Option<String>,
    pub ccg_code: Option<String>,
    pub ccg_name: Option<String>,
}

impl Default for LookupColumns {
    fn default() -> Self {
        Self {
            postcode: "pcds".into(),
            lsoa_code: Some("lsoa21cd".into()),
            lsoa_name: Some("lsoa21nm".into()),
            lad_code: Some("lad22cd".into()),
            lad_name: Some("lad22nm".into()),
            ccg_code: None,
            ccg_name: None,
        }
    }
}

/// Collects units for one vintage and validates them into a [`CatalogueVintage`].
#[derive(Debug, Clone)]
pub struct CatalogueBuilder {
    vintage: Vintage,
    units: Vec<AreaUnit>,
    populations: Vec<(Granularity, Arc<str>, f64)>,
}

impl CatalogueBuilder {
    pub fn new(vintage: Vintage) -> Self {
        Self { vintage, units: Vec::new(), populations: Vec::new() }
    }

    pub fn vintage(&self) -> &Vintage {
        &self.vintage
    }

    pub fn add_unit(&mut self, unit: AreaUnit) -> &mut Self {
        self.units.push(unit);
        self
    }

    pub fn with_unit(mut self, unit: AreaUnit) -> Self {
        self.units.push(unit);
        self
    }

    pub fn with_units(mut self, units: impl IntoIterator<Item = AreaUnit>) -> Self {
        self.units.extend(units);
        self
    }

    /// Take unit populations from a numeric column of `dataset`, keyed at its granularity.
    pub fn populations_from(mut self, dataset: &Dataset, column: &str) -> Result<Self> {
        if dataset.vintage() != &self.vintage {
            return Err(GeoError::VintageMismatch {
                context: format!("population dataset {:?}", dataset.name()),
                expected: self.vintage.clone(),
                found: dataset.vintage().clone(),
            });
        }
        let values = dataset.column(column)
            .and_then(|c| c.as_numeric())
            .ok_or_else(|| GeoError::InvalidDataset {
                dataset: dataset.name().to_string(),
                reason: format!("no numeric column {column:?}"),
            })?;
        for (code, value) in dataset.codes().iter().zip(values) {
            if let Some(value) = value {
                self.populations.push((dataset.granularity(), code.clone(), *value));
            }
        }
        Ok(self)
    }

    /// Read units from a postcode lookup CSV: one row per postcode with its LSOA, LAD and
    /// (optionally) CCG codes and names. Coarser units are created from the first row naming them.
    pub fn from_lookup_csv(vintage: Vintage, bytes: &[u8], columns: &LookupColumns) -> Result<Self> {
        let invalid = |reason: String| GeoError::InvalidCatalogue { vintage: vintage.clone(), reason };

        let text: Vec<&str> = std::iter::once(columns.postcode.as_str())
            .chain([&columns.lsoa_code, &columns.lsoa_name, &columns.lad_code, &columns.lad_name, &columns.ccg_code, &columns.ccg_name]
                .into_iter()
                .flatten()
                .map(String::as_str))
            .collect();
        let df = read_from_csv_bytes(bytes, &text).map_err(|err| invalid(format!("{err:#}")))?;
        let read = |name: &Option<String>| -> Result<Option<Vec<Option<String>>>> {
            name.as_deref()
                .map(|name| string_values(&df, name).map_err(|err| invalid(format!("{err:#}"))))
                .transpose()
        };

        let postcodes = string_values(&df, &columns.postcode).map_err(|err| invalid(format!("{err:#}")))?;
        let lsoa_codes = read(&columns.lsoa_code)?;
        let lsoa_names = read(&columns.lsoa_name)?;
        let lad_codes = read(&columns.lad_code)?;
        let lad_names = read(&columns.lad_name)?;
        let ccg_codes = read(&columns.ccg_code)?;
        let ccg_names = read(&columns.ccg_name)?;

        let cell = |col: &Option<Vec<Option<String>>>, row: usize| -> Option<String> {
            col.as_ref()
                .and_then(|values| values[row].clone())
                .filter(|s| !s.trim().is_empty())
        };

        let mut builder = Self::new(vintage.clone());
        // Coarser units keyed by (granularity, code), first row wins for names and parents.
        let mut coarse: BTreeMap<(Granularity, String), AreaUnit> = BTreeMap::new();

        for (row, postcode) in postcodes.iter().enumerate() {
            let Some(postcode) = postcode.as_deref().filter(|s| !s.trim().is_empty()) else {
                warn!(row, "lookup row without a postcode skipped");
                continue;
            };
            let lsoa = cell(&lsoa_codes, row);
            let lad = cell(&lad_codes, row);
            let ccg = cell(&ccg_codes, row);

            let mut unit = AreaUnit::new(Granularity::Postcode, postcode);
            for (ty, code, name) in [
                (Granularity::Lsoa, &lsoa, cell(&lsoa_names, row)),
                (Granularity::Lad, &lad, cell(&lad_names, row)),
                (Granularity::Ccg, &ccg, cell(&ccg_names, row)),
            ] {
                let Some(code) = code else { continue };
                unit = unit.with_parent(ty, code);

                let entry = coarse.entry((ty, code.trim().to_string())).or_insert_with(|| AreaUnit::new(ty, code));
                if entry.name.is_none() {
                    if let Some(name) = name {
                        entry.name = Some(Arc::from(name.trim()));
                    }
                }
            }

            // LSOAs carry their LAD/CCG so postcode ancestors stay consistent.
            if let Some(lsoa) = &lsoa {
                if let Some(entry) = coarse.get_mut(&(Granularity::Lsoa, lsoa.trim().to_string())) {
                    for (ty, code) in [(Granularity::Lad, &lad), (Granularity::Ccg, &ccg)] {
                        let Some(code) = code else { continue };
                        match entry.ancestor(ty).map(str::to_string) {
                            None => entry.parents.set(ty, Some(Arc::from(code.trim()))),
                            Some(existing) if existing == code.trim() => {}
                            Some(existing) => return Err(invalid(format!(
                                "lsoa {lsoa} is in {ty} {existing} and {code} (row {row})"
                            ))),
                        }
                    }
                }
            }

            builder.add_unit(unit);
        }

        builder.units.extend(coarse.into_values());
        Ok(builder)
    }

    /// Validate and index. Fails on duplicate codes, malformed postcodes/outcodes, parent
    /// references that are not coarser, point at missing units or contradict each other.
    pub fn build(self) -> Result<CatalogueVintage> {
        let vintage = self.vintage;
        let invalid = |reason: String| GeoError::InvalidCatalogue { vintage: vintage.clone(), reason };

        let mut layers: BTreeMap<Granularity, Vec<AreaUnit>> = BTreeMap::new();
        let mut seen: AHashSet<(Granularity, Arc<str>)> = AHashSet::new();
        for unit in self.units {
            if unit.code.is_empty() {
                return Err(invalid(format!("{} unit with an empty code", unit.granularity)));
            }
            let well_formed = match unit.granularity {
                Granularity::Postcode => normalise_postcode(&unit.code).is_some(),
                Granularity::Outcode => normalise_outcode(&unit.code).is_some(),
                _ => true,
            };
            if !well_formed {
                return Err(invalid(format!("{:?} is not a valid {}", unit.code, unit.granularity)));
            }
            if !seen.insert((unit.granularity, unit.code.clone())) {
                return Err(invalid(format!("duplicate {} code {}", unit.granularity, unit.code)));
            }
            layers.entry(unit.granularity).or_default().push(unit);
        }

        derive_outcodes(&mut layers, &mut seen).map_err(&invalid)?;

        // Parent references must point at coarser, existing units.
        for unit in layers.values().flatten() {
            for (ty, code) in unit.parents.iter() {
                if !unit.granularity.nests_in(ty) {
                    return Err(invalid(format!(
                        "{} {} cannot have a {ty} parent", unit.granularity, unit.code
                    )));
                }
                if !seen.contains(&(ty, code.clone())) {
                    return Err(invalid(format!(
                        "{} {} references missing {ty} {code}", unit.granularity, unit.code
                    )));
                }
            }
        }

        fill_ancestors(&mut layers).map_err(&invalid)?;
        apply_populations(&mut layers, self.populations).map_err(&invalid)?;

        let counts: Vec<String> = layers.iter().map(|(ty, units)| format!("{ty}={}", units.len())).collect();
        info!(%vintage, layers = counts.join(" "), "catalogue built");

        let layers = layers.into_iter()
            .map(|(ty, units)| CatalogueLayer::from_units(ty, units))
            .collect();
        Ok(CatalogueVintage::from_layers(vintage.clone(), layers))
    }
}

/// Every postcode gets an outcode reference and every referenced outcode a unit.
fn derive_outcodes(
    layers: &mut BTreeMap<Granularity, Vec<AreaUnit>>,
    seen: &mut AHashSet<(Granularity, Arc<str>)>,
) -> std::result::Result<(), String> {
    let mut derived = Vec::new();
    for unit in layers.get_mut(&Granularity::Postcode).into_iter().flatten() {
        let outcode = outcode_of(&unit.code)
            .ok_or_else(|| format!("cannot take the outcode of {}", unit.code))?;
        match unit.ancestor(Granularity::Outcode).map(str::to_string) {
            Some(existing) if existing != outcode => {
                return Err(format!("postcode {} references outcode {existing}", unit.code));
            }
            Some(_) => {}
            None => unit.parents.set(Granularity::Outcode, Some(Arc::from(outcode.as_str()))),
        }
        if seen.insert((Granularity::Outcode, Arc::from(outcode.as_str()))) {
            derived.push(AreaUnit::new(Granularity::Outcode, &outcode));
        }
    }
    layers.entry(Granularity::Outcode).or_default().extend(derived);
    Ok(())
}

/// Copy each parent's own ancestors onto its children, coarsest levels first.
/// A child that already names a different ancestor is inconsistent.
fn fill_ancestors(layers: &mut BTreeMap<Granularity, Vec<AreaUnit>>) -> std::result::Result<(), String> {
    let mut order: Vec<Granularity> = layers.keys().copied().collect();
    order.sort_by_key(|ty| ty.ancestors().len());

    for ty in order {
        let Some(mut units) = layers.remove(&ty) else { continue };
        let lookup: AHashMap<(Granularity, Arc<str>), &AreaUnit> = layers.values()
            .flatten()
            .map(|u| ((u.granularity, u.code.clone()), u))
            .collect();

        for unit in &mut units {
            let direct: Vec<(Granularity, Arc<str>)> = unit.parents.iter()
                .map(|(ty, code)| (ty, code.clone()))
                .collect();
            for (parent_ty, parent_code) in direct {
                let Some(parent) = lookup.get(&(parent_ty, parent_code.clone())) else { continue };
                for (ancestor_ty, ancestor_code) in parent.parents.iter() {
                    if !unit.granularity.nests_in(ancestor_ty) {
                        continue;
                    }
                    match unit.parents.get(ancestor_ty).cloned() {
                        None => unit.parents.set(ancestor_ty, Some(ancestor_code.clone())),
                        Some(existing) if &existing == ancestor_code => {}
                        Some(existing) => return Err(format!(
                            "{} {} is in {ancestor_ty} {existing} but its {parent_ty} {parent_code} is in {ancestor_code}",
                            unit.granularity, unit.code
                        )),
                    }
                }
            }
        }
        drop(lookup);
        layers.insert(ty, units);
    }
    Ok(())
}

fn apply_populations(
    layers: &mut BTreeMap<Granularity, Vec<AreaUnit>>,
    populations: Vec<(Granularity, Arc<str>, f64)>,
) -> std::result::Result<(), String> {
    if populations.is_empty() {
        return Ok(());
    }
    let mut positions: AHashMap<(Granularity, Arc<str>), (Granularity, usize)> = AHashMap::new();
    for (&ty, units) in layers.iter() {
        for (i, unit) in units.iter().enumerate() {
            positions.insert((ty, unit.code.clone()), (ty, i));
        }
    }

    let mut unknown = 0usize;
    for (ty, code, value) in populations {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("population of {ty} {code} must be a nonnegative number, got {value}"));
        }
        match positions.get(&(ty, code)) {
            Some(&(layer, i)) => {
                if let Some(unit) = layers.get_mut(&layer).and_then(|units| units.get_mut(i)) {
                    unit.population = Some(value.round() as u64);
                }
            }
            None => unknown += 1,
        }
    }
    if unknown > 0 {
        warn!(unknown, "population rows for units not in the catalogue were ignored");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::area::GeoIdentifier;

    fn v2021() -> Vintage { Vintage::new("2021") }

    #[test]
    fn derives_outcodes_and_fills_ancestors() {
        let catalogue = CatalogueBuilder::new(v2021())
            .with_unit(AreaUnit::new(Granularity::Lad, "E09000023").with_name("Lewisham"))
            .with_unit(AreaUnit::new(Granularity::Lsoa, "E01003189").with_parent(Granularity::Lad, "E09000023"))
            .with_unit(AreaUnit::new(Granularity::Postcode, "se135ab").with_parent(Granularity::Lsoa, "E01003189"))
            .build()
            .unwrap();

        let postcode = catalogue.unit(Granularity::Postcode, "SE13 5AB").unwrap();
        assert_eq!(postcode.ancestor(Granularity::Outcode), Some("SE13"));
        assert_eq!(postcode.ancestor(Granularity::Lad), Some("E09000023"));
        assert_eq!(postcode.parent_code(), Some("E01003189"));
        assert_eq!(catalogue.units_of(Granularity::Outcode).len(), 1);
    }

    #[test]
    fn rejects_bad_references() {
        let missing = CatalogueBuilder::new(v2021())
            .with_unit(AreaUnit::new(Granularity::Lsoa, "E01000001").with_parent(Granularity::Lad, "E09000001"))
            .build();
        assert!(matches!(missing, Err(GeoError::InvalidCatalogue { .. })));

        let finer = CatalogueBuilder::new(v2021())
            .with_unit(AreaUnit::new(Granularity::Lsoa, "E01000001"))
            .with_unit(AreaUnit::new(Granularity::Lad, "E09000001").with_parent(Granularity::Lsoa, "E01000001"))
            .build();
        assert!(finer.is_err());

        let duplicate = CatalogueBuilder::new(v2021())
            .with_unit(AreaUnit::new(Granularity::Lad, "E09000001"))
            .with_unit(AreaUnit::new(Granularity::Lad, "E09000001"))
            .build();
        assert!(duplicate.is_err());
    }

    #[test]
    fn rejects_contradicting_ancestors() {
        let result = CatalogueBuilder::new(v2021())
            .with_unit(AreaUnit::new(Granularity::Lad, "E09000001"))
            .with_unit(AreaUnit::new(Granularity::Lad, "E09000002"))
            .with_unit(AreaUnit::new(Granularity::Lsoa, "E01000001").with_parent(Granularity::Lad, "E09000001"))
            .with_unit(AreaUnit::new(Granularity::Postcode, "SE13 5AB")
                .with_parent(Granularity::Lsoa, "E01000001")
                .with_parent(Granularity::Lad, "E09000002"))
            .build();
        assert!(matches!(result, Err(GeoError::InvalidCatalogue { .. })));
    }

    #[test]
    fn reads_a_postcode_lookup_file() {
        let csv = b"pcds,lsoa21cd,lsoa21nm,lad22cd,lad22nm\n\
SE13 5AB,E01003189,Lewisham 034A,E09000023,Lewisham\n\
SE13 6CD,E01003189,Lewisham 034A,E09000023,Lewisham\n\
W6 9AA,E01001872,Hammersmith and Fulham 018B,E09000013,Hammersmith and Fulham\n";
        let catalogue = CatalogueBuilder::from_lookup_csv(v2021(), csv, &LookupColumns::default())
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(catalogue.units_of(Granularity::Postcode).len(), 3);
        assert_eq!(catalogue.units_of(Granularity::Lsoa).len(), 2);
        assert_eq!(catalogue.unit(Granularity::Lsoa, "E01003189").and_then(|u| u.ancestor(Granularity::Lad)), Some("E09000023"));
        let code = catalogue.lookup(&GeoIdentifier::new("SE13"), Granularity::Lad).unwrap();
        assert_eq!(&*code, "E09000023");
    }

    #[test]
    fn populations_attach_to_units() {
        let pop = Dataset::numeric("pop", v2021(), Granularity::Lsoa, "population",
            [("E01003189", 1500.0), ("E01999999", 10.0)]).unwrap();
        let catalogue = CatalogueBuilder::new(v2021())
            .with_unit(AreaUnit::new(Granularity::Lsoa, "E01003189"))
            .populations_from(&pop, "population")
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(catalogue.population(Granularity::Lsoa, "E01003189"), Some(1500));

        let other = Dataset::numeric("pop", Vintage::new("2011"), Granularity::Lsoa, "population", [("E01003189", 1.0)]).unwrap();
        let err = CatalogueBuilder::new(v2021()).populations_from(&other, "population").unwrap_err();
        assert!(matches!(err, GeoError::VintageMismatch { .. }));
    }
}
