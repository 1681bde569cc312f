mod provenance;
mod result;

pub use provenance::{Provenance, SourceInfo};
pub use result::{ResultFrame, Row};
pub use crate::dataset::GRANULARITY_COLUMN;
