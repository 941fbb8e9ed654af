use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::de::{self, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

//////////////////////////////////////////// canonicalize ////////////////////////////////////////////

fn non_slug_runs() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("pattern is a literal"))
}

/// Canonicalizes a display name into slug form.
///
/// Lowercases the input, collapses every run of non-alphanumeric characters
/// into a single hyphen, and trims leading and trailing hyphens. The result
/// is the canonical key under which entity types, schemata, and farms are
/// stored, so `"Air Temp"`, `"air_temp"`, and `"air-temp"` all name the
/// same thing.
///
/// # Examples
///
/// ```
/// assert_eq!(trellis::canonicalize("Air Temp"), "air-temp");
/// assert_eq!(trellis::canonicalize("  Plant Site!  "), "plant-site");
/// ```
pub fn canonicalize(name: &str) -> String {
    let lowered = name.to_lowercase();
    let replaced = non_slug_runs().replace_all(&lowered, "-");
    replaced.trim_matches('-').to_string()
}

/////////////////////////////////////////////// Slug ///////////////////////////////////////////////

/// A canonicalized name.
///
/// Slugs are the identifiers used for schema names, entity-type names, and
/// farm slugs. Construction always canonicalizes, so two slugs built from
/// different spellings of the same name compare equal.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Slug(String);

impl Slug {
    /// Creates a new Slug by canonicalizing the input.
    ///
    /// Returns `None` when the input contains no alphanumeric characters at
    /// all, since the canonical form would be empty.
    pub fn new(name: impl AsRef<str>) -> Option<Slug> {
        let canonical = canonicalize(name.as_ref());
        if canonical.is_empty() {
            None
        } else {
            Some(Slug(canonical))
        }
    }

    /// Returns the canonical form as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the Slug and returns the canonical String.
    pub fn into_string(self) -> String {
        self.0
    }

    /// Renders the slug as a type name, e.g. `plant-site` becomes `PlantSite`.
    ///
    /// This is the presentation form used when naming generated entity types
    /// and when defaulting layout object names.
    pub fn type_name(&self) -> String {
        let mut out = String::with_capacity(self.0.len());
        for segment in self.0.split('-') {
            let mut chars = segment.chars();
            if let Some(first) = chars.next() {
                out.extend(first.to_uppercase());
                out.push_str(chars.as_str());
            }
        }
        out
    }
}

impl AsRef<str> for Slug {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for Slug {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

/// Error returned when parsing a string with no slug-safe characters.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlugParseError {
    input: String,
}

impl SlugParseError {
    /// Returns the input that failed to canonicalize.
    pub fn input(&self) -> &str {
        &self.input
    }
}

impl Display for SlugParseError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "{:?} contains no characters usable in a slug",
            self.input
        )
    }
}

impl std::error::Error for SlugParseError {}

impl FromStr for Slug {
    type Err = SlugParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Slug::new(s).ok_or_else(|| SlugParseError {
            input: s.to_string(),
        })
    }
}

impl Serialize for Slug {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

struct SlugVisitor;

impl Visitor<'_> for SlugVisitor {
    type Value = Slug;

    fn expecting(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "a name with at least one alphanumeric character")
    }

    fn visit_str<E>(self, value: &str) -> Result<Slug, E>
    where
        E: de::Error,
    {
        Slug::new(value).ok_or_else(|| E::custom(format!("{:?} canonicalizes to nothing", value)))
    }
}

impl<'de> Deserialize<'de> for Slug {
    fn deserialize<D>(deserializer: D) -> Result<Slug, D::Error>
    where
        D: Deserializer<'de>,
    {
        deserializer.deserialize_str(SlugVisitor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn canonicalize_lowercases() {
        assert_eq!(canonicalize("Enclosure"), "enclosure");
        assert_eq!(canonicalize("AISLE"), "aisle");
    }

    #[test]
    fn canonicalize_collapses_separator_runs() {
        assert_eq!(canonicalize("air temp"), "air-temp");
        assert_eq!(canonicalize("air_temp"), "air-temp");
        assert_eq!(canonicalize("air -- temp"), "air-temp");
        assert_eq!(canonicalize("plant   site!"), "plant-site");
    }

    #[test]
    fn canonicalize_trims_edges() {
        assert_eq!(canonicalize("  tray  "), "tray");
        assert_eq!(canonicalize("--bay--"), "bay");
    }

    #[test]
    fn canonicalize_preserves_digits() {
        assert_eq!(canonicalize("Bay 12"), "bay-12");
    }

    #[test]
    fn equivalent_spellings_share_a_slug() {
        let a = Slug::new("Air Temp").unwrap();
        let b = Slug::new("air-temp").unwrap();
        let c = Slug::new("AIR_TEMP").unwrap();
        assert_eq!(a, b);
        assert_eq!(b, c);
    }

    #[test]
    fn empty_input_is_rejected() {
        assert_eq!(Slug::new(""), None);
        assert_eq!(Slug::new("   "), None);
        assert_eq!(Slug::new("!!!"), None);
    }

    #[test]
    fn from_str_round_trip() {
        let slug: Slug = "Plant Site".parse().unwrap();
        assert_eq!(slug.as_str(), "plant-site");
        assert_eq!(slug.to_string(), "plant-site");
    }

    #[test]
    fn from_str_rejects_unusable_input() {
        let err = "###".parse::<Slug>().unwrap_err();
        assert_eq!(err.input(), "###");
    }

    #[test]
    fn type_name_camel_cases_segments() {
        assert_eq!(Slug::new("tray").unwrap().type_name(), "Tray");
        assert_eq!(Slug::new("plant site").unwrap().type_name(), "PlantSite");
        assert_eq!(Slug::new("bay-12").unwrap().type_name(), "Bay12");
    }

    #[test]
    fn serde_canonicalizes_on_deserialize() {
        let slug: Slug = serde_json::from_str("\"Air Temp\"").unwrap();
        assert_eq!(slug.as_str(), "air-temp");
        assert_eq!(serde_json::to_string(&slug).unwrap(), "\"air-temp\"");
    }

    #[test]
    fn serde_rejects_empty_canonical_form() {
        let result: Result<Slug, _> = serde_json::from_str("\"***\"");
        assert!(result.is_err());
    }
}
