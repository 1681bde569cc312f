mod export;
mod policy;
mod resolver;

pub use export::{resolutions_to_csv, resolutions_to_dataframe, IDENTIFIER_COLUMN};
pub use policy::{apply_policy, BatchReport, OnUnresolved, ResolutionResult};
pub use resolver::Resolver;
