use std::fmt;

use serde::{Deserialize, Serialize};

use super::{granularity::Granularity, postcode};

/// What a raw identifier looks like, before any catalogue lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdentifierKind {
    Postcode,
    Outcode,
    Code,
    Name,
}

/// A raw, possibly ambiguous, user-supplied geographic token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeoIdentifier {
    raw: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hint: Option<Granularity>,
}

impl GeoIdentifier {
    pub fn new(raw: impl Into<String>) -> Self {
        Self { raw: raw.into(), hint: None }
    }

    /// Identifier declared to live at `hint`.
    pub fn with_hint(raw: impl Into<String>, hint: Granularity) -> Self {
        Self { raw: raw.into(), hint: Some(hint) }
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    pub fn hint(&self) -> Option<Granularity> {
        self.hint
    }

    /// Classify the token. A postcode/outcode hint wins; otherwise the shape decides.
    pub fn kind(&self) -> IdentifierKind {
        match self.hint {
            Some(Granularity::Postcode) => IdentifierKind::Postcode,
            Some(Granularity::Outcode) => IdentifierKind::Outcode,
            _ if postcode::is_gss_code(&self.raw) => IdentifierKind::Code,
            Some(_) => IdentifierKind::Code,
            None if postcode::normalise_postcode(&self.raw).is_some() => IdentifierKind::Postcode,
            None if postcode::normalise_outcode(&self.raw).is_some() => IdentifierKind::Outcode,
            None => IdentifierKind::Name,
        }
    }

    /// Granularity declared by the hint, or inferred from the token's shape.
    pub fn granularity(&self) -> Option<Granularity> {
        self.hint.or_else(|| match self.kind() {
            IdentifierKind::Postcode => Some(Granularity::Postcode),
            IdentifierKind::Outcode => Some(Granularity::Outcode),
            IdentifierKind::Code => Granularity::from_gss_code(self.raw.trim()),
            IdentifierKind::Name => None,
        })
    }
}

impl fmt::Display for GeoIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl From<&str> for GeoIdentifier {
    fn from(value: &str) -> Self { Self::new(value) }
}

impl From<String> for GeoIdentifier {
    fn from(value: String) -> Self { Self::new(value) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kinds_are_inferred_from_shape() {
        assert_eq!(GeoIdentifier::new("se13 5ab").kind(), IdentifierKind::Postcode);
        assert_eq!(GeoIdentifier::new("SE13").kind(), IdentifierKind::Outcode);
        assert_eq!(GeoIdentifier::new("E01003189").kind(), IdentifierKind::Code);
        assert_eq!(GeoIdentifier::new("Hammersmith").kind(), IdentifierKind::Name);
    }

    #[test]
    fn hints_override_shape() {
        let id = GeoIdentifier::with_hint("Lewisham", Granularity::Lad);
        assert_eq!(id.kind(), IdentifierKind::Code);
        assert_eq!(id.granularity(), Some(Granularity::Lad));
        assert_eq!(GeoIdentifier::new("E09000023").granularity(), Some(Granularity::Lad));
    }
}
