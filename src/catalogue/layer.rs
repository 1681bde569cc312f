use std::sync::Arc;

use ahash::AHashMap;

use crate::area::{canonical_code, AreaUnit, Granularity};

/// Every unit of one granularity in one vintage, ordered by code.
#[derive(Debug, Clone)]
pub struct CatalogueLayer {
    pub ty: Granularity,
    index: AHashMap<Arc<str>, u32>, // Map between codes and positions in `units`.
    names: AHashMap<String, Vec<u32>>, // Lowercased names to positions.
    units: Vec<AreaUnit>,
}

pub(crate) fn name_key(name: &str) -> String {
    name.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

impl CatalogueLayer {
    pub fn new(ty: Granularity) -> Self {
        Self {
            ty,
            index: AHashMap::new(),
            names: AHashMap::new(),
            units: Vec::new(),
        }
    }

    /// Units must already be unique by code and of this layer's granularity.
    pub(crate) fn from_units(ty: Granularity, mut units: Vec<AreaUnit>) -> Self {
        units.sort_by(|a, b| a.code.cmp(&b.code));

        let mut index = AHashMap::with_capacity(units.len());
        let mut names: AHashMap<String, Vec<u32>> = AHashMap::new();
        for (i, unit) in units.iter().enumerate() {
            index.insert(unit.code.clone(), i as u32);
            if let Some(name) = &unit.name {
                names.entry(name_key(name)).or_default().push(i as u32);
            }
        }

        Self { ty, index, names, units }
    }

    pub fn units(&self) -> &[AreaUnit] {
        &self.units
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    pub fn position(&self, code: &str) -> Option<usize> {
        self.index.get(code)
            .or_else(|| self.index.get(canonical_code(self.ty, code).as_str()))
            .map(|&i| i as usize)
    }

    pub fn get(&self, code: &str) -> Option<&AreaUnit> {
        self.position(code).map(|i| &self.units[i])
    }

    pub(crate) fn at(&self, position: u32) -> Option<&AreaUnit> {
        self.units.get(position as usize)
    }

    /// Units whose name matches case- and whitespace-insensitively.
    pub fn named(&self, name: &str) -> impl Iterator<Item = &AreaUnit> {
        self.names.get(&name_key(name))
            .into_iter()
            .flatten()
            .map(|&i| &self.units[i as usize])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn units_are_sorted_and_indexed() {
        let layer = CatalogueLayer::from_units(Granularity::Lad, vec![
            AreaUnit::new(Granularity::Lad, "E09000023").with_name("Lewisham"),
            AreaUnit::new(Granularity::Lad, "E09000013").with_name("Hammersmith  and Fulham"),
        ]);
        let codes: Vec<&str> = layer.units().iter().map(|u| &*u.code).collect();
        assert_eq!(codes, ["E09000013", "E09000023"]);
        assert_eq!(layer.get("E09000023").and_then(|u| u.name.as_deref()), Some("Lewisham"));
        assert_eq!(layer.named("hammersmith and fulham").count(), 1);
        assert_eq!(layer.named("Fulham").count(), 0);
    }
}
