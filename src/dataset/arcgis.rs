//! ONS Open Geography (ArcGIS REST) boundary services.

use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;
use serde::Deserialize;

use crate::area::Granularity;

pub const ARCGIS_BASE_URL: &str = "https://services1.arcgis.com/ESMARspQHYMw9BZ9/arcgis/rest/services/";

/// Services whose names match the pattern but are not usable LAD boundary layers.
const SKIPPED_SERVICES: [&str; 5] = [
    "LAD_Dec_1961_in_England_and_Wales_BFC_Boundaries_2022",
    "LAD_JUN_1921_EW_BGC",
    "LAD_PT_JUN_1921_EW_BGC",
    "LAD_DEC_2021_EW_BFE_RUC",
    "LAD_DEC_2024_EW_BFE_RUC",
];

// Noise tokens (e.g. BOUNDARIES, IN) may sit between the month/year, region and resolution.
static LAD_SERVICE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(concat!(
        r"(?i)^(?:LAD|LOCAL_AUTHORITY_DISTRICTS).*?_",
        r"(?:(JAN(?:UARY)?|FEB(?:RUARY)?|MAR(?:CH)?|APR(?:IL)?|MAY|JUN(?:E)?|JUL(?:Y)?|AUG(?:UST)?|SEP(?:TEMBER)?|OCT(?:OBER)?|NOV(?:EMBER)?|DEC(?:EMBER)?)_)?",
        r"(\d{2}(?:\d{2})?)_",
        r"(?:[A-Z]+_)*?",
        r"(UK|GB|EW)_",
        r"(?:[A-Z]+_)*?",
        r"(BFC|BFE|BGC|BSC)",
        r"(?:_.*)?$",
    ))
    .expect("LAD service pattern is valid")
});

const MONTHS: [&str; 12] = ["JAN", "FEB", "MAR", "APR", "MAY", "JUN", "JUL", "AUG", "SEP", "OCT", "NOV", "DEC"];

/// A published boundary layer and the edition it describes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundaryService {
    pub arcgis_id: String,
    pub geography: Granularity,
    pub year: u16,
    pub month: Option<u8>,
    /// UK, GB or EW.
    pub region: String,
    /// BFC (full, clipped), BFE (full, extent), BGC (generalised, clipped), BSC (super generalised, clipped).
    pub resolution: String,
}

impl BoundaryService {
    /// Name of the code attribute in this layer, e.g. "LAD21CD".
    pub fn code_column(&self) -> String {
        format!("LAD{:02}CD", self.year % 100)
    }

    /// GeoJSON query returning every feature with all attributes.
    pub fn geojson_url(&self, base_url: &str) -> String {
        let base = base_url.trim_end_matches('/');
        format!("{base}/{}/FeatureServer/0/query?where=1%3D1&outFields=*&f=geojson", self.arcgis_id)
    }
}

/// Parse a LAD boundary service name; `None` for anything else.
pub fn parse_service_name(name: &str) -> Option<BoundaryService> {
    if SKIPPED_SERVICES.contains(&name) {
        return None;
    }
    let caps = LAD_SERVICE.captures(name)?;

    let month = caps.get(1).and_then(|m| {
        let prefix = m.as_str().get(..3)?.to_ascii_uppercase();
        MONTHS.iter().position(|&mon| mon == prefix).map(|i| i as u8 + 1)
    });
    let year: u16 = caps.get(2)?.as_str().parse().ok()?;
    // Two-digit years in service names are all 21st century editions.
    let year = if year < 100 { 2000 + year } else { year };

    Some(BoundaryService {
        arcgis_id: name.to_string(),
        geography: Granularity::Lad,
        year,
        month,
        region: caps.get(3)?.as_str().to_ascii_uppercase(),
        resolution: caps.get(4)?.as_str().to_ascii_uppercase(),
    })
}

#[derive(Deserialize)]
struct ServiceCatalog {
    #[serde(default)]
    services: Vec<ServiceItem>,
}

#[derive(Deserialize)]
struct ServiceItem {
    name: String,
    #[serde(rename = "type")]
    kind: String,
}

/// Parse the REST services directory (`?f=json`) into LAD boundary layers.
pub fn parse_service_catalog(bytes: &[u8]) -> Result<Vec<BoundaryService>> {
    let catalog: ServiceCatalog = serde_json::from_slice(bytes)
        .context("Failed to parse ArcGIS services directory")?;
    Ok(catalog.services.into_iter()
        .filter(|item| item.kind == "FeatureServer")
        .filter_map(|item| parse_service_name(&item.name))
        .collect())
}

/// The service for `year` at `resolution`, preferring the latest month published that year.
pub fn select_service<'a>(services: &'a [BoundaryService], year: u16, resolution: &str) -> Option<&'a BoundaryService> {
    services.iter()
        .filter(|s| s.year == year && s.resolution.eq_ignore_ascii_case(resolution))
        .max_by_key(|s| (s.month.unwrap_or(0), s.region == "UK", s.arcgis_id.clone()))
}
