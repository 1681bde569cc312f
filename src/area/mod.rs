mod granularity;
mod identifier;
mod postcode;
mod unit;
mod vintage;

pub use granularity::Granularity;
pub use identifier::{GeoIdentifier, IdentifierKind};
pub use postcode::{canonical_code, is_gss_code, normalise_outcode, normalise_postcode, outcode_of};
pub use unit::{AreaUnit, ParentRefs};
pub use vintage::Vintage;
