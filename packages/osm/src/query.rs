//! Overpass QL query construction.
//!
//! A tag renders as three clauses, one per element type, each scoped to
//! the request's bounding box. Only tags the caller selected contribute a
//! clause; the clauses are then wrapped in the fixed prologue and epilogue
//! the reconciler expects (`out geom`, JSON output).

use std::collections::BTreeMap;

use geo::Rect;
use mapscope_osm_models::{Aspect, AspectDefinition, TagDefinition, TagSelection};

use crate::registry;

/// Returns every tag registered for `aspect`, scoped to `bbox`.
#[must_use]
pub fn tags_for(aspect: Aspect, bbox: &str) -> BTreeMap<Aspect, Vec<TagDefinition>> {
    let tags = registry::aspect(aspect)
        .map(|definition| scoped_tags(&definition, bbox))
        .unwrap_or_default();
    BTreeMap::from([(aspect, tags)])
}

fn scoped_tags(definition: &AspectDefinition, bbox: &str) -> Vec<TagDefinition> {
    definition
        .tags
        .iter()
        .map(|tag| tag.clone().with_bbox(bbox))
        .collect()
}

/// Formats a WGS84 envelope as an Overpass bounding box: `(s,w,n,e)`.
#[must_use]
pub fn bbox_string(envelope: &Rect<f64>) -> String {
    format!(
        "({},{},{},{})",
        envelope.min().y,
        envelope.min().x,
        envelope.max().y,
        envelope.max().x
    )
}

fn quote(text: &str) -> String {
    text.replace('\\', "\\\\").replace('"', "\\\"")
}

/// Renders `tag` as node, way and relation clauses.
///
/// A wildcard value renders a key-only filter.
#[must_use]
pub fn build_query_fragment(tag: &TagDefinition) -> String {
    let filter = if tag.is_wildcard() {
        format!("[\"{}\"]", quote(&tag.key))
    } else {
        format!("[\"{}\"=\"{}\"]", quote(&tag.key), quote(&tag.value))
    };
    let bbox = tag.bbox.as_deref().unwrap_or_default();

    ["node", "way", "relation"]
        .iter()
        .map(|element| format!("{element}{filter}{bbox};"))
        .collect()
}

/// Renders `tag` only if the caller selected it.
///
/// A concrete tag needs its value listed under its key. A wildcard tag only
/// needs its key selected.
#[must_use]
pub fn filter_by_selection(tag: &TagDefinition, selection: &TagSelection) -> String {
    let selected = if tag.is_wildcard() {
        selection.selects_key(&tag.key)
    } else {
        selection.contains(&tag.key, &tag.value)
    };

    if selected {
        build_query_fragment(tag)
    } else {
        String::new()
    }
}

/// Concatenates the selected clauses of one aspect.
#[must_use]
pub fn aspect_clauses(definition: &AspectDefinition, selection: &TagSelection, bbox: &str) -> String {
    scoped_tags(definition, bbox)
        .iter()
        .map(|tag| filter_by_selection(tag, selection))
        .collect()
}

/// Wraps concatenated clauses in the query prologue and epilogue.
#[must_use]
pub fn wrap_clauses(clauses: &str, timeout_secs: u64) -> String {
    format!("[out:json][timeout:{timeout_secs}];({clauses});out geom;>;out skel qt;")
}

/// Builds the complete query for `catalogue` and `selection`.
///
/// Aspects with no selected tags are skipped. Returns `None` if no aspect
/// contributes a clause, in which case there is nothing to fetch.
#[must_use]
pub fn build_payload(
    catalogue: &[AspectDefinition],
    selection: &TagSelection,
    bbox: &str,
    timeout_secs: u64,
) -> Option<String> {
    let mut clauses = String::new();
    for definition in catalogue {
        let aspect = aspect_clauses(definition, selection, bbox);
        if aspect.is_empty() {
            log::trace!("Aspect {} has no selected tags", definition.aspect);
            continue;
        }
        log::debug!("Aspect {} contributes to the query", definition.aspect);
        clauses.push_str(&aspect);
    }

    if clauses.is_empty() {
        None
    } else {
        Some(wrap_clauses(&clauses, timeout_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::coord;

    const BBOX: &str = "(38.8,-77.1,38.9,-77.0)";

    #[test]
    fn selected_tag_renders_and_unselected_is_empty() {
        let selection = TagSelection::new().with("highway", &["primary"]);
        let primary = TagDefinition::new("highway", "primary").with_bbox(BBOX);
        let secondary = TagDefinition::new("highway", "secondary").with_bbox(BBOX);

        assert!(!filter_by_selection(&primary, &selection).is_empty());
        assert_eq!(filter_by_selection(&secondary, &selection), "");
    }

    #[test]
    fn fragment_has_one_clause_per_element_type() {
        let tag = TagDefinition::new("highway", "primary").with_bbox(BBOX);
        assert_eq!(
            build_query_fragment(&tag),
            "node[\"highway\"=\"primary\"](38.8,-77.1,38.9,-77.0);\
             way[\"highway\"=\"primary\"](38.8,-77.1,38.9,-77.0);\
             relation[\"highway\"=\"primary\"](38.8,-77.1,38.9,-77.0);"
        );
    }

    #[test]
    fn fragment_without_bbox_is_unscoped() {
        let tag = TagDefinition::new("amenity", "school");
        assert_eq!(
            build_query_fragment(&tag),
            "node[\"amenity\"=\"school\"];way[\"amenity\"=\"school\"];relation[\"amenity\"=\"school\"];"
        );
    }

    #[test]
    fn wildcard_renders_key_only_and_needs_key_selected() {
        let tag = TagDefinition::new("building", "*").with_bbox(BBOX);
        assert!(build_query_fragment(&tag).starts_with("node[\"building\"](38.8"));

        let selected = TagSelection::new().with("building", &["house"]);
        let other = TagSelection::new().with("highway", &["primary"]);
        assert!(!filter_by_selection(&tag, &selected).is_empty());
        assert!(filter_by_selection(&tag, &other).is_empty());
    }

    #[test]
    fn quotes_are_escaped() {
        let tag = TagDefinition::new("name", "a\"b");
        assert!(build_query_fragment(&tag).contains("[\"name\"=\"a\\\"b\"]"));
    }

    #[test]
    fn tags_for_scopes_every_catalogue_tag() {
        let tags = tags_for(Aspect::Highway, BBOX);
        let highway = &tags[&Aspect::Highway];
        assert!(!highway.is_empty());
        assert!(highway.iter().all(|t| t.key == "highway"));
        assert!(highway.iter().all(|t| t.bbox.as_deref() == Some(BBOX)));
    }

    #[test]
    fn payload_skips_unselected_aspects() {
        let catalogue = registry::all_aspects();
        let selection = TagSelection::new().with("highway", &["primary"]);
        let payload = build_payload(&catalogue, &selection, BBOX, 25).unwrap();

        assert!(payload.starts_with("[out:json][timeout:25];("));
        assert!(payload.ends_with(");out geom;>;out skel qt;"));
        assert_eq!(payload.matches("way[").count(), 1);
        assert!(!payload.contains("building"));
    }

    #[test]
    fn empty_selection_builds_no_payload() {
        let catalogue = registry::all_aspects();
        assert!(build_payload(&catalogue, &TagSelection::new(), BBOX, 25).is_none());
    }

    #[test]
    fn bbox_is_south_west_north_east() {
        let rect = Rect::new(coord! { x: -77.1, y: 38.8 }, coord! { x: -77.0, y: 38.9 });
        assert_eq!(bbox_string(&rect), BBOX);
    }
}
