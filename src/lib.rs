#![doc = "geostat: resolve UK geographic identifiers to canonical areal units and join statistics on them"]
pub mod area;
pub mod catalogue;
mod common;
pub mod config;
pub mod dataset;
pub mod engine;
mod error;
pub mod frame;
pub mod resolve;
mod session;

#[doc(inline)]
pub use error::{GeoError, Result};

#[doc(inline)]
pub use area::{AreaUnit, GeoIdentifier, Granularity, Vintage};

#[doc(inline)]
pub use catalogue::{Catalogue, CatalogueBuilder, CatalogueVintage, LookupColumns};

#[doc(inline)]
pub use config::EngineConfig;

#[doc(inline)]
pub use dataset::{Dataset, DatasetLoader, SourceSpec};

#[doc(inline)]
pub use engine::{JoinEngine, JoinSpec};

#[doc(inline)]
pub use frame::ResultFrame;

#[doc(inline)]
pub use resolve::{BatchReport, OnUnresolved, Resolver};

#[doc(inline)]
pub use session::Session;
