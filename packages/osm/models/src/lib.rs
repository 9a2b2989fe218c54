#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! `OpenStreetMap` aspect and tag selection types.
//!
//! Defines the TOML schema for the aspect tag catalogue, the caller's tag
//! selection, the Overpass service configuration, and the raw element
//! shapes returned by the Overpass JSON API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use strum_macros::{AsRefStr, Display, EnumIter, EnumString};

/// Wildcard tag value: matches any value of the tag's key.
pub const WILDCARD: &str = "*";

/// A domain category grouping related `OpenStreetMap` tags.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
    AsRefStr,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Aspect {
    Amenity,
    Building,
    Highway,
    Landuse,
    Leisure,
    Natural,
    Power,
    Railway,
    Tourism,
    Waterway,
}

/// One aspect of the tag catalogue, deserialized from TOML.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AspectDefinition {
    /// Which aspect this file defines.
    pub aspect: Aspect,
    /// Human-readable name (e.g., "Roads and paths").
    pub name: String,
    /// Concrete key/value pairs registered for the aspect.
    pub tags: Vec<TagDefinition>,
}

/// A single `key=value` tag, optionally scoped to a bounding box.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TagDefinition {
    pub key: String,
    /// Concrete value, or [`WILDCARD`].
    pub value: String,
    /// Overpass bounding box clause (`"(s,w,n,e)"`), attached per request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bbox: Option<String>,
}

impl TagDefinition {
    #[must_use]
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
            bbox: None,
        }
    }

    /// Returns this tag scoped to `bbox`.
    #[must_use]
    pub fn with_bbox(mut self, bbox: impl Into<String>) -> Self {
        self.bbox = Some(bbox.into());
        self
    }

    #[must_use]
    pub fn is_wildcard(&self) -> bool {
        self.value == WILDCARD
    }

    /// Whether an element carrying `tags` has this tag.
    #[must_use]
    pub fn matches_tags(&self, tags: &BTreeMap<String, String>) -> bool {
        tags.get(&self.key)
            .is_some_and(|value| self.is_wildcard() || *value == self.value)
    }
}

/// The tags a caller asked for: key to the list of acceptable values.
///
/// Absent keys are not selected. A value list containing [`WILDCARD`]
/// accepts every value of the key.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSelection(BTreeMap<String, Vec<String>>);

impl TagSelection {
    #[must_use]
    pub const fn new() -> Self {
        Self(BTreeMap::new())
    }

    /// Returns this selection with `values` added under `key`.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, values: &[&str]) -> Self {
        self.insert(key, values.iter().map(|v| (*v).to_string()));
        self
    }

    /// Adds `values` under `key`, keeping existing values and skipping
    /// duplicates.
    pub fn insert(&mut self, key: impl Into<String>, values: impl IntoIterator<Item = String>) {
        let entry = self.0.entry(key.into()).or_default();
        for value in values {
            if !entry.contains(&value) {
                entry.push(value);
            }
        }
    }

    /// Merges every entry of `other` into this selection.
    pub fn merge(&mut self, other: Self) {
        for (key, values) in other.0 {
            self.insert(key, values);
        }
    }

    /// Whether `key` is selected at all.
    #[must_use]
    pub fn selects_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    /// Whether `value` is an accepted value of `key`.
    #[must_use]
    pub fn contains(&self, key: &str, value: &str) -> bool {
        self.0
            .get(key)
            .is_some_and(|values| values.iter().any(|v| v == value || v == WILDCARD))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Vec<String>)> {
        self.0.iter()
    }

    /// Parses a `key=value[,value...]` selection argument.
    ///
    /// # Errors
    ///
    /// Returns a description of the problem if there is no `=`, the key is
    /// empty, or no value is given.
    pub fn parse_entry(entry: &str) -> Result<(String, Vec<String>), String> {
        let (key, values) = entry
            .split_once('=')
            .ok_or_else(|| format!("Expected key=value, got '{entry}'"))?;
        let key = key.trim();
        if key.is_empty() {
            return Err(format!("Empty tag key in '{entry}'"));
        }

        let values: Vec<String> = values
            .split(',')
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(ToString::to_string)
            .collect();
        if values.is_empty() {
            return Err(format!("No values for tag key '{key}'"));
        }
        Ok((key.to_string(), values))
    }
}

impl FromIterator<(String, Vec<String>)> for TagSelection {
    fn from_iter<T: IntoIterator<Item = (String, Vec<String>)>>(iter: T) -> Self {
        let mut selection = Self::new();
        for (key, values) in iter {
            selection.insert(key, values);
        }
        selection
    }
}

/// Overpass API endpoint configuration, deserialized from TOML.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverpassService {
    /// Interpreter URL the query is POSTed to.
    pub url: String,
    /// Server-side query timeout, emitted as `[timeout:N]`.
    pub timeout_secs: u64,
    /// Worker count for the per-element build stage.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

const fn default_concurrency() -> usize {
    8
}

/// Overpass element discriminator.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ElementType {
    Node,
    Way,
    Relation,
}

/// A latitude/longitude pair as Overpass writes it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LatLon {
    pub lat: f64,
    pub lon: f64,
}

/// Top-level Overpass JSON response.
#[derive(Debug, Clone, Deserialize)]
pub struct OverpassResponse {
    #[serde(default)]
    pub elements: Vec<RawElement>,
}

/// One element of an Overpass response.
///
/// Which coordinate fields are present depends on the element type and
/// the output mode: nodes carry `lat`/`lon`, ways carry `geometry` under
/// `out geom`, and `out center` adds `center`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawElement {
    #[serde(rename = "type")]
    pub element_type: ElementType,
    pub id: i64,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub geometry: Vec<LatLon>,
    #[serde(default)]
    pub center: Option<LatLon>,
    #[serde(default)]
    pub members: Vec<RawMember>,
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// A relation member as returned under `out geom`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawMember {
    #[serde(rename = "type")]
    pub element_type: ElementType,
    #[serde(rename = "ref")]
    pub reference: i64,
    #[serde(default)]
    pub role: String,
    #[serde(default)]
    pub lat: Option<f64>,
    #[serde(default)]
    pub lon: Option<f64>,
    #[serde(default)]
    pub geometry: Vec<LatLon>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr as _;

    #[test]
    fn aspect_names_are_snake_case() {
        assert_eq!(Aspect::Highway.to_string(), "highway");
        assert_eq!(Aspect::from_str("Waterway").unwrap(), Aspect::Waterway);
    }

    #[test]
    fn selection_contains_only_listed_values() {
        let selection = TagSelection::new().with("highway", &["primary"]);
        assert!(selection.contains("highway", "primary"));
        assert!(!selection.contains("highway", "secondary"));
        assert!(!selection.contains("building", "yes"));
        assert!(selection.selects_key("highway"));
    }

    #[test]
    fn wildcard_selection_accepts_any_value() {
        let selection = TagSelection::new().with("building", &[WILDCARD]);
        assert!(selection.contains("building", "house"));
    }

    #[test]
    fn merge_unions_values_without_duplicates() {
        let mut selection = TagSelection::new().with("highway", &["primary"]);
        selection.merge(
            TagSelection::new()
                .with("highway", &["primary", "secondary"])
                .with("railway", &["rail"]),
        );
        assert_eq!(
            selection.iter().map(|(k, v)| (k.as_str(), v.len())).collect::<Vec<_>>(),
            vec![("highway", 2), ("railway", 1)]
        );
    }

    #[test]
    fn parses_selection_entries() {
        assert_eq!(
            TagSelection::parse_entry("highway=primary, secondary").unwrap(),
            (
                "highway".to_string(),
                vec!["primary".to_string(), "secondary".to_string()]
            )
        );
        assert!(TagSelection::parse_entry("highway").is_err());
        assert!(TagSelection::parse_entry("=primary").is_err());
        assert!(TagSelection::parse_entry("highway=").is_err());
    }

    #[test]
    fn tag_matches_element_tags() {
        let tags = BTreeMap::from([("highway".to_string(), "primary".to_string())]);
        assert!(TagDefinition::new("highway", "primary").matches_tags(&tags));
        assert!(TagDefinition::new("highway", WILDCARD).matches_tags(&tags));
        assert!(!TagDefinition::new("highway", "secondary").matches_tags(&tags));
    }
}
