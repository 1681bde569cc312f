use std::sync::LazyLock;

use regex::Regex;

use super::granularity::Granularity;

static POSTCODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^([A-Z]{1,2}[0-9][A-Z0-9]?)([0-9][A-Z]{2})$").expect("postcode pattern is valid")
});

static OUTCODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Z]{1,2}[0-9][A-Z0-9]?$").expect("outcode pattern is valid")
});

static GSS_CODE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[EWSN][0-9]{8}$").expect("GSS code pattern is valid")
});

/// Upper-case and drop every whitespace character.
fn compact(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

/// Canonical "OUTCODE INCODE" form of a UK postcode, e.g. " se13 5ab" -> "SE13 5AB".
pub fn normalise_postcode(raw: &str) -> Option<String> {
    let compact = compact(raw);
    let caps = POSTCODE.captures(&compact)?;
    Some(format!("{} {}", &caps[1], &caps[2]))
}

/// Canonical outcode, e.g. "se13" -> "SE13".
pub fn normalise_outcode(raw: &str) -> Option<String> {
    let compact = compact(raw);
    OUTCODE.is_match(&compact).then_some(compact)
}

/// Outcode part of a postcode in any spacing.
pub fn outcode_of(postcode: &str) -> Option<String> {
    let compact = compact(postcode);
    POSTCODE.captures(&compact).map(|caps| caps[1].to_string())
}

/// Key form of `raw` at `granularity`: postcodes and outcodes are canonicalised when they
/// parse, everything else is trimmed.
pub fn canonical_code(granularity: Granularity, raw: &str) -> String {
    let raw = raw.trim();
    let normalised = match granularity {
        Granularity::Postcode => normalise_postcode(raw),
        Granularity::Outcode => normalise_outcode(raw),
        _ => None,
    };
    normalised.unwrap_or_else(|| raw.to_string())
}

/// True for nine-character GSS codes such as "E01000001".
pub fn is_gss_code(raw: &str) -> bool {
    GSS_CODE.is_match(raw.trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn postcodes_are_case_folded_and_respaced() {
        assert_eq!(normalise_postcode("se135ab").as_deref(), Some("SE13 5AB"));
        assert_eq!(normalise_postcode("  SE13   5AB ").as_deref(), Some("SE13 5AB"));
        assert_eq!(normalise_postcode("w1a 1aa").as_deref(), Some("W1A 1AA"));
        assert_eq!(normalise_postcode("SE13"), None);
    }

    #[test]
    fn outcodes() {
        assert_eq!(normalise_outcode(" se13 ").as_deref(), Some("SE13"));
        assert_eq!(normalise_outcode("SE13 5AB"), None);
        assert_eq!(outcode_of("se13 5ab").as_deref(), Some("SE13"));
    }

    #[test]
    fn gss_codes_are_not_postcodes() {
        assert!(is_gss_code("E01000001"));
        assert!(normalise_postcode("E01000001").is_none());
        assert!(!is_gss_code("LSOA001"));
    }
}
