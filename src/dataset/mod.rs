pub mod arcgis;
mod cache;
mod column;
#[allow(clippy::module_inception)]
mod dataset;
mod fetch;
mod io;
mod loader;
pub mod nomis;
mod source;
mod store;

pub use cache::{CacheEntryInfo, DatasetCache};
pub use column::{Column, ColumnData, ColumnKind, GeometryRef, Value};
pub use dataset::{Dataset, CODE_COLUMN, GRANULARITY_COLUMN};
pub use fetch::{DefaultFetch, Fetch, Location};
pub use loader::DatasetLoader;
pub use source::{CacheKey, SourceFormat, SourceSpec};
pub use store::{DiskStore, StoredEntry, StoredKind};
