use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::error::GeoError;

/// Level of UK administrative geography an areal-unit code lives at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Granularity {
    Postcode,   // Finest unit
    Outcode,    // Outcode <- Postcode
    Lsoa,       // LSOA <- Postcode
    Lad,        // LAD <- LSOA
    Ccg,        // CCG <- LSOA
    Custom,     // Caller-defined areas, no containment
}

impl Granularity {
    pub const ALL: [Granularity; 6] = [
        Granularity::Postcode,
        Granularity::Outcode,
        Granularity::Lsoa,
        Granularity::Lad,
        Granularity::Ccg,
        Granularity::Custom,
    ];

    pub fn to_str(&self) -> &'static str {
        match self {
            Granularity::Postcode => "postcode",
            Granularity::Outcode => "outcode",
            Granularity::Lsoa => "lsoa",
            Granularity::Lad => "lad",
            Granularity::Ccg => "ccg",
            Granularity::Custom => "custom",
        }
    }

    /// Coarser granularities a unit at this level nests inside, nearest first.
    pub fn ancestors(&self) -> &'static [Granularity] {
        match self {
            Granularity::Postcode => &[Granularity::Lsoa, Granularity::Outcode, Granularity::Lad, Granularity::Ccg],
            Granularity::Lsoa => &[Granularity::Lad, Granularity::Ccg],
            Granularity::Outcode | Granularity::Lad | Granularity::Ccg | Granularity::Custom => &[],
        }
    }

    /// The nearest containing granularity, if any.
    pub fn parent(&self) -> Option<Granularity> {
        self.ancestors().first().copied()
    }

    /// True when every unit at `self` is contained in exactly one unit at `other`.
    pub fn nests_in(&self, other: Granularity) -> bool {
        self.ancestors().contains(&other)
    }

    /// Infer the granularity of a GSS code (e.g. "E01000001") from its entity prefix.
    pub fn from_gss_code(code: &str) -> Option<Granularity> {
        match code.get(..3)? {
            "E01" | "W01" => Some(Granularity::Lsoa),
            "E06" | "E07" | "E08" | "E09" | "W06" | "S12" | "N09" => Some(Granularity::Lad),
            "E38" => Some(Granularity::Ccg),
            _ => None,
        }
    }
}

impl fmt::Display for Granularity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_str())
    }
}

impl FromStr for Granularity {
    type Err = GeoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Granularity::ALL.into_iter()
            .find(|ty| ty.to_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| GeoError::Config(format!(
                "unknown granularity {s:?}, expected one of postcode, outcode, lsoa, lad, ccg, custom"
            )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postcode_nests_in_lsoa_first() {
        assert_eq!(Granularity::Postcode.parent(), Some(Granularity::Lsoa));
        assert!(Granularity::Postcode.nests_in(Granularity::Ccg));
        assert!(Granularity::Lsoa.nests_in(Granularity::Lad));
        assert!(!Granularity::Lad.nests_in(Granularity::Lsoa));
        assert!(!Granularity::Outcode.nests_in(Granularity::Lsoa));
    }

    #[test]
    fn gss_prefixes() {
        assert_eq!(Granularity::from_gss_code("E01000001"), Some(Granularity::Lsoa));
        assert_eq!(Granularity::from_gss_code("E09000023"), Some(Granularity::Lad));
        assert_eq!(Granularity::from_gss_code("E38000098"), Some(Granularity::Ccg));
        assert_eq!(Granularity::from_gss_code("E02000001"), None);
    }

    #[test]
    fn parses_case_insensitively() {
        assert_eq!("LSOA".parse::<Granularity>().unwrap(), Granularity::Lsoa);
        assert!("ward".parse::<Granularity>().is_err());
    }
}
