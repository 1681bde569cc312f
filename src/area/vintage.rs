use std::{fmt, sync::Arc};

use serde::{Deserialize, Serialize};

/// A dated edition of boundary or statistical data, e.g. "2011" or "2021".
/// Codes are only comparable within one vintage.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Vintage(Arc<str>);

impl Vintage {
    pub fn new(label: impl AsRef<str>) -> Self {
        Self(Arc::from(label.as_ref().trim()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Leading four-digit year of the label, if it has one ("2021", "2021-dec").
    pub fn year(&self) -> Option<u16> {
        self.0.get(..4)
            .filter(|s| s.bytes().all(|b| b.is_ascii_digit()))
            .and_then(|s| s.parse().ok())
    }
}

impl fmt::Display for Vintage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Vintage {
    fn from(value: &str) -> Self { Self::new(value) }
}

impl From<String> for Vintage {
    fn from(value: String) -> Self { Self::new(value) }
}
