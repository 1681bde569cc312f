//! NOMIS (ONS labour market and census API) statistics source.
//! API reference: <https://www.nomisweb.co.uk/api/v01/help>

use std::collections::BTreeMap;

use anyhow::Context;
use polars::{frame::DataFrame, prelude::{Column as FrameColumn, NamedFrom}, series::Series};
use serde::Deserialize;
use serde_json::Value as Json;
use tracing::warn;

use crate::{
    common::write_to_csv_bytes,
    error::{GeoError, Result},
};
use super::source::SourceSpec;

pub const NOMIS_BASE_URL: &str = "https://www.nomisweb.co.uk/api/v01";

/// NOMIS silently truncates anonymous queries at this many rows.
pub const NOMIS_ROW_LIMIT: usize = 25_000;

pub const NOMIS_CODE_COLUMN: &str = "GEOGRAPHY_CODE";
pub const NOMIS_VALUE_COLUMN: &str = "OBS_VALUE";

/// Tables whose overview is never requested when attributing sources.
pub const SKIPPED_TABLES: [&str; 2] = ["NM_45_1", "NM_2064_1"];

const SOURCE_ANNOTATION: &str = "contenttype/sources";
const CENSUS_GROUP: &str = "census";

/// "?k=v&k=v2..." with list values repeating their key; empty when there are no parameters.
pub fn build_query_string(params: &BTreeMap<String, Vec<String>>) -> String {
    let parts: Vec<String> = params.iter()
        .flat_map(|(key, values)| values.iter().map(move |value| format!("{key}={value}")))
        .collect();
    if parts.is_empty() {
        String::new()
    } else {
        format!("?{}", parts.join("&"))
    }
}

/// CSV download URL for one dataset.
pub fn data_url(base_url: &str, dataset_id: &str, params: &BTreeMap<String, Vec<String>>) -> String {
    format!("{}/dataset/{dataset_id}.data.csv{}", base_url.trim_end_matches('/'), build_query_string(params))
}

/// Query parameters for a spec: its explicit params plus `time` from the period
/// and `geography` from the geography filter.
pub(crate) fn query_params(spec: &SourceSpec) -> BTreeMap<String, Vec<String>> {
    let mut params = spec.params.clone();
    if let Some(period) = &spec.period {
        params.entry("time".into()).or_insert_with(|| vec![period.clone()]);
    }
    if let Some(geography) = &spec.geography {
        params.entry("geography".into()).or_insert_with(|| vec![geography.clone()]);
    }
    params
}

/// NOMIS answers unknown dataset ids with an HTML error page instead of a status code.
pub(crate) fn check_payload(bytes: &[u8], dataset_id: &str, spec: &str) -> Result<()> {
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(64)]);
    if head.trim_start().to_ascii_lowercase().starts_with("<!doctype html") {
        return Err(GeoError::unavailable(
            spec,
            format!("NOMIS dataset {dataset_id:?} does not exist"),
        ));
    }
    Ok(())
}

pub(crate) fn warn_if_truncated(rows: usize, url: &str) {
    if rows == NOMIS_ROW_LIMIT {
        warn!(
            url,
            "query was truncated to {NOMIS_ROW_LIMIT} rows; pass a NOMIS uid parameter to fetch the full table"
        );
    }
}

/// Every dataset NOMIS publishes.
pub fn tables_url(base_url: &str) -> String {
    format!("{}/dataset/def.sdmx.json", base_url.trim_end_matches('/'))
}

/// The content-type tree of data sources.
pub fn sources_url(base_url: &str) -> String {
    format!("{}/contenttype/sources.json", base_url.trim_end_matches('/'))
}

/// SDMX structure of one dataset.
pub fn overview_url(base_url: &str, dataset_id: &str) -> String {
    format!("{}/dataset/{dataset_id}/def.sdmx.json", base_url.trim_end_matches('/'))
}

/// One published table and, once looked up, the source it is attributed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NomisTable {
    pub id: String,
    pub name: String,
    pub source: Option<String>,
}

/// A data source as listed under `contenttype/sources`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NomisSource {
    pub id: String,
    pub name: String,
    pub description: String,
}

#[derive(Deserialize)]
struct TableList {
    structure: TableStructure,
}

#[derive(Deserialize)]
struct TableStructure {
    keyfamilies: KeyFamilies,
}

#[derive(Deserialize)]
struct KeyFamilies {
    #[serde(default)]
    keyfamily: Vec<KeyFamily>,
}

#[derive(Deserialize)]
struct KeyFamily {
    id: String,
    name: LocalisedText,
}

#[derive(Deserialize)]
struct LocalisedText {
    value: String,
}

pub fn parse_table_list(bytes: &[u8]) -> anyhow::Result<Vec<NomisTable>> {
    let list: TableList = serde_json::from_slice(bytes)
        .context("Failed to parse NOMIS dataset definitions")?;
    Ok(list.structure.keyfamilies.keyfamily.into_iter()
        .map(|family| NomisTable { id: family.id, name: family.name.value, source: None })
        .collect())
}

#[derive(Deserialize)]
struct SourceList {
    contenttype: ContentType,
}

#[derive(Deserialize)]
struct ContentType {
    #[serde(default)]
    item: Vec<SourceItem>,
}

#[derive(Deserialize)]
struct SourceItem {
    id: String,
    name: String,
    description: Option<String>,
    #[serde(default)]
    item: Vec<SourceItem>,
}

/// Flat source list. The census group is replaced by its member censuses.
pub fn parse_sources(bytes: &[u8]) -> anyhow::Result<Vec<NomisSource>> {
    let list: SourceList = serde_json::from_slice(bytes)
        .context("Failed to parse NOMIS source list")?;

    let mut sources = Vec::new();
    for item in list.contenttype.item {
        if item.id == CENSUS_GROUP {
            sources.extend(item.item.into_iter().map(|census| NomisSource {
                id: census.id,
                name: census.name,
                description: census.description.unwrap_or_else(|| "No Description".into()),
            }));
        } else {
            sources.push(NomisSource {
                id: item.id,
                name: item.name,
                description: item.description.unwrap_or_default(),
            });
        }
    }
    Ok(sources)
}

/// Source of a dataset overview: the first key family's `contenttype/sources` annotation,
/// else the sender contact in the header.
pub fn source_of(overview: &Json) -> Option<String> {
    let annotated = overview.pointer("/structure/keyfamilies/keyfamily/0/annotations/annotation")
        .and_then(Json::as_array)
        .and_then(|annotations| annotations.iter()
            .find(|a| a.get("annotationtitle").and_then(Json::as_str) == Some(SOURCE_ANNOTATION)))
        .and_then(|a| a.get("annotationtext"))
        .and_then(Json::as_str)
        .filter(|text| !text.is_empty());

    annotated
        .or_else(|| overview.pointer("/structure/header/sender/contact/name").and_then(Json::as_str))
        .map(str::to_string)
}

/// `id`, `name`, `source` table of NOMIS datasets.
pub fn tables_to_dataframe(tables: &[NomisTable]) -> anyhow::Result<DataFrame> {
    let ids: Vec<&str> = tables.iter().map(|t| t.id.as_str()).collect();
    let names: Vec<&str> = tables.iter().map(|t| t.name.as_str()).collect();
    let sources: Vec<Option<&str>> = tables.iter().map(|t| t.source.as_deref()).collect();

    let columns: Vec<FrameColumn> = vec![
        Series::new("id".into(), ids).into(),
        Series::new("name".into(), names).into(),
        Series::new("source".into(), sources).into(),
    ];
    DataFrame::new(columns).context("Failed to build NOMIS table DataFrame")
}

pub fn tables_to_csv(tables: &[NomisTable]) -> anyhow::Result<Vec<u8>> {
    write_to_csv_bytes(&tables_to_dataframe(tables)?)
}
