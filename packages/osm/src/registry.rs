//! Compile-time registry of the aspect tag catalogue and the Overpass
//! service configuration.
//!
//! Each aspect is a TOML file in `aspects/` embedded via `include_str!`.
//! Adding an aspect requires a new [`Aspect`] variant, a TOML file, and an
//! entry here.

use mapscope_osm_models::{Aspect, AspectDefinition, OverpassService};

/// Number of registered aspects. Enforced by a test.
#[cfg(test)]
const EXPECTED_ASPECT_COUNT: usize = 10;

/// Embedded TOML aspect definitions.
const ASPECT_TOMLS: &[(&str, &str)] = &[
    ("amenity", include_str!("../aspects/amenity.toml")),
    ("building", include_str!("../aspects/building.toml")),
    ("highway", include_str!("../aspects/highway.toml")),
    ("landuse", include_str!("../aspects/landuse.toml")),
    ("leisure", include_str!("../aspects/leisure.toml")),
    ("natural", include_str!("../aspects/natural.toml")),
    ("power", include_str!("../aspects/power.toml")),
    ("railway", include_str!("../aspects/railway.toml")),
    ("tourism", include_str!("../aspects/tourism.toml")),
    ("waterway", include_str!("../aspects/waterway.toml")),
];

const OVERPASS_TOML: &str = include_str!("../services/overpass.toml");

/// Overrides [`OverpassService::url`].
pub const URL_ENV: &str = "MAPSCOPE_OVERPASS_URL";
/// Overrides [`OverpassService::timeout_secs`].
pub const TIMEOUT_ENV: &str = "MAPSCOPE_OVERPASS_TIMEOUT_SECS";
/// Overrides [`OverpassService::concurrency`].
pub const CONCURRENCY_ENV: &str = "MAPSCOPE_CONCURRENCY";

/// Returns every registered aspect definition.
///
/// # Panics
///
/// Panics if any embedded TOML file fails to parse. Since these are
/// compile-time constants, parse failures indicate a development error
/// and are caught by the tests below.
#[must_use]
pub fn all_aspects() -> Vec<AspectDefinition> {
    ASPECT_TOMLS
        .iter()
        .map(|(name, toml_str)| {
            toml::de::from_str(toml_str)
                .unwrap_or_else(|e| panic!("Failed to parse aspect '{name}': {e}"))
        })
        .collect()
}

/// Returns the definition of a single aspect.
#[must_use]
pub fn aspect(aspect: Aspect) -> Option<AspectDefinition> {
    all_aspects().into_iter().find(|a| a.aspect == aspect)
}

/// Returns the embedded Overpass configuration with environment overrides
/// applied.
///
/// Unparseable numeric overrides are ignored with a warning.
///
/// # Panics
///
/// Panics if the embedded TOML fails to parse.
#[must_use]
pub fn overpass_service() -> OverpassService {
    let service = toml::de::from_str(OVERPASS_TOML)
        .unwrap_or_else(|e| panic!("Failed to parse overpass service config: {e}"));
    apply_overrides(service, |name| std::env::var(name).ok())
}

fn apply_overrides(
    mut service: OverpassService,
    lookup: impl Fn(&str) -> Option<String>,
) -> OverpassService {
    if let Some(url) = lookup(URL_ENV).filter(|u| !u.trim().is_empty()) {
        service.url = url;
    }
    if let Some(raw) = lookup(TIMEOUT_ENV) {
        match raw.trim().parse() {
            Ok(timeout) => service.timeout_secs = timeout,
            Err(e) => log::warn!("Ignoring {TIMEOUT_ENV}={raw}: {e}"),
        }
    }
    if let Some(raw) = lookup(CONCURRENCY_ENV) {
        match raw.trim().parse::<usize>() {
            Ok(n) if n > 0 => service.concurrency = n,
            Ok(_) => log::warn!("Ignoring {CONCURRENCY_ENV}=0"),
            Err(e) => log::warn!("Ignoring {CONCURRENCY_ENV}={raw}: {e}"),
        }
    }
    service
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, BTreeSet};
    use strum::IntoEnumIterator as _;

    #[test]
    fn loads_all_aspects() {
        let aspects = all_aspects();
        assert_eq!(
            aspects.len(),
            EXPECTED_ASPECT_COUNT,
            "Expected {EXPECTED_ASPECT_COUNT} aspects, found {}. \
             Update EXPECTED_ASPECT_COUNT after adding/removing aspects.",
            aspects.len()
        );
    }

    #[test]
    fn every_aspect_variant_is_registered_once() {
        let mut seen = BTreeSet::new();
        for definition in &all_aspects() {
            assert!(
                seen.insert(definition.aspect),
                "Duplicate aspect: {}",
                definition.aspect
            );
        }
        for variant in Aspect::iter() {
            assert!(seen.contains(&variant), "Aspect {variant} has no TOML file");
        }
    }

    #[test]
    fn all_aspects_have_required_fields() {
        for definition in &all_aspects() {
            assert!(
                !definition.name.is_empty(),
                "Aspect {} has empty name",
                definition.aspect
            );
            assert!(
                !definition.tags.is_empty(),
                "Aspect {} has no tags",
                definition.aspect
            );
            for tag in &definition.tags {
                assert!(!tag.key.is_empty(), "Aspect {} has empty key", definition.aspect);
                assert!(
                    !tag.value.is_empty(),
                    "Aspect {} has empty value for {}",
                    definition.aspect,
                    tag.key
                );
                assert!(tag.bbox.is_none(), "Catalogue tags must not carry a bbox");
            }
        }
    }

    #[test]
    fn file_names_match_aspects() {
        for ((name, _), definition) in ASPECT_TOMLS.iter().zip(all_aspects()) {
            assert_eq!(*name, definition.aspect.as_ref());
        }
    }

    #[test]
    fn embedded_service_parses() {
        let service: OverpassService = toml::de::from_str(OVERPASS_TOML).unwrap();
        assert!(service.url.starts_with("https://"));
        assert_eq!(service.timeout_secs, 25);
        assert!(service.concurrency > 0);
    }

    #[test]
    fn environment_overrides_apply() {
        let base: OverpassService = toml::de::from_str(OVERPASS_TOML).unwrap();
        let env = BTreeMap::from([
            (URL_ENV, "http://localhost:12345/api/interpreter"),
            (TIMEOUT_ENV, "90"),
            (CONCURRENCY_ENV, "not-a-number"),
        ]);

        let service = apply_overrides(base.clone(), |name| env.get(name).map(ToString::to_string));
        assert_eq!(service.url, "http://localhost:12345/api/interpreter");
        assert_eq!(service.timeout_secs, 90);
        assert_eq!(service.concurrency, base.concurrency);
    }
}
