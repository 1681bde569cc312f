use std::{collections::BTreeMap, sync::Arc};

use serde::{Deserialize, Serialize};

use super::{granularity::Granularity, postcode};

/// Quick way to access the containing units of an entity across levels.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParentRefs {
    refs: BTreeMap<Granularity, Arc<str>>,
}

impl ParentRefs {
    pub fn get(&self, ty: Granularity) -> Option<&Arc<str>> {
        self.refs.get(&ty)
    }

    pub fn set(&mut self, ty: Granularity, value: Option<Arc<str>>) {
        match value {
            Some(code) => { self.refs.insert(ty, code); }
            None => { self.refs.remove(&ty); }
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Granularity, &Arc<str>)> {
        self.refs.iter().map(|(&ty, code)| (ty, code))
    }

    pub fn is_empty(&self) -> bool {
        self.refs.is_empty()
    }
}

/// A canonical administrative geography entity within one catalogue vintage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AreaUnit {
    pub code: Arc<str>,
    pub granularity: Granularity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<Arc<str>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub population: Option<u64>,
    #[serde(default, skip_serializing_if = "ParentRefs::is_empty")]
    pub parents: ParentRefs,
}

impl AreaUnit {
    /// Postcode and outcode codes are stored in canonical form; other codes are trimmed.
    pub fn new(granularity: Granularity, code: impl AsRef<str>) -> Self {
        Self {
            code: Arc::from(postcode::canonical_code(granularity, code.as_ref())),
            granularity,
            name: None,
            population: None,
            parents: ParentRefs::default(),
        }
    }

    pub fn with_name(mut self, name: impl AsRef<str>) -> Self {
        self.name = Some(Arc::from(name.as_ref().trim()));
        self
    }

    pub fn with_population(mut self, population: u64) -> Self {
        self.population = Some(population);
        self
    }

    pub fn with_parent(mut self, ty: Granularity, code: impl AsRef<str>) -> Self {
        self.parents.set(ty, Some(Arc::from(postcode::canonical_code(ty, code.as_ref()))));
        self
    }

    /// Code of the containing unit at `ty`, if recorded.
    pub fn ancestor(&self, ty: Granularity) -> Option<&str> {
        self.parents.get(ty).map(|code| &**code)
    }

    /// Nearest recorded containing unit.
    pub fn parent_code(&self) -> Option<&str> {
        self.granularity.ancestors().iter()
            .find_map(|&ty| self.ancestor(ty))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postcode_units_are_canonicalised() {
        let unit = AreaUnit::new(Granularity::Postcode, "se13 5ab");
        assert_eq!(&*unit.code, "SE13 5AB");
    }

    #[test]
    fn parent_code_prefers_nearest_level() {
        let unit = AreaUnit::new(Granularity::Postcode, "SE13 5AB")
            .with_parent(Granularity::Lad, "E09000023")
            .with_parent(Granularity::Lsoa, "E01003189");
        assert_eq!(unit.parent_code(), Some("E01003189"));

        let unit = AreaUnit::new(Granularity::Lsoa, "E01003189");
        assert_eq!(unit.parent_code(), None);
    }
}
