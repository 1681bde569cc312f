mod csv;
#[cfg(feature = "download")]
mod download;
mod fs;

pub(crate) use csv::*;
#[cfg(feature = "download")]
pub(crate) use download::*;
pub(crate) use fs::*;
