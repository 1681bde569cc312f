mod join;
mod rate;
mod rollup;
mod spec;

pub use join::{JoinEngine, POPULATION_COLUMN};
pub use rate::{per_capita, JoinWarning};
pub use spec::{Aggregation, Denominator, JoinSpec};
