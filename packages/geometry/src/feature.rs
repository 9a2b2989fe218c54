//! Features, feature collections, and their `GeoJSON` encoding.
//!
//! A [`Feature`] is a geometry plus a JSON attribute map. A
//! [`FeatureCollection`] keeps its members in insertion order along with a
//! bounding box that is *not* maintained automatically: call
//! [`FeatureCollection::recompute_bbox`] after pushing features.

use geo::{BoundingRect, Geometry, Rect, coord};
use geojson::{GeoJson, JsonObject};
use mapscope_geometry_models::{GeometryFamily, SpatialContext, Srid};

use crate::GeometryError;
use crate::classify::family;
use crate::overlay::{area_in_units, length_in_units};

/// Attribute map attached to a feature.
pub type Properties = JsonObject;

/// A geometry with attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub geometry: Geometry<f64>,
    pub properties: Properties,
}

impl Feature {
    /// Creates a feature with no attributes.
    #[must_use]
    pub fn new(geometry: Geometry<f64>) -> Self {
        Self {
            geometry,
            properties: Properties::new(),
        }
    }

    /// Returns this feature with `key` set to `value`.
    #[must_use]
    pub fn with_property(
        mut self,
        key: impl Into<String>,
        value: impl Into<serde_json::Value>,
    ) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    /// Returns this feature with every entry of `properties` merged in.
    #[must_use]
    pub fn with_properties(mut self, properties: Properties) -> Self {
        self.properties.extend(properties);
        self
    }

    #[must_use]
    pub fn property(&self, key: &str) -> Option<&serde_json::Value> {
        self.properties.get(key)
    }

    /// Returns this feature without any null-valued attributes.
    #[must_use]
    pub fn prune_null_properties(mut self) -> Self {
        self.properties.retain(|_, value| !value.is_null());
        self
    }

    #[must_use]
    pub const fn family(&self) -> GeometryFamily {
        family(&self.geometry)
    }

    /// Area in square meters, reading coordinates as `srid`.
    #[must_use]
    pub fn area(&self, srid: Srid) -> f64 {
        area_in_units(&self.geometry, srid)
    }

    /// Length in meters, reading coordinates as `srid`.
    #[must_use]
    pub fn length(&self, srid: Srid) -> f64 {
        length_in_units(&self.geometry, srid)
    }

    /// Encodes this feature as a `GeoJSON` feature.
    #[must_use]
    pub fn to_geojson(&self) -> geojson::Feature {
        geojson::Feature {
            bbox: None,
            geometry: Some(geojson::Geometry::new(geojson::Value::from(&self.geometry))),
            id: None,
            properties: Some(self.properties.clone()),
            foreign_members: None,
        }
    }
}

impl TryFrom<geojson::Feature> for Feature {
    type Error = GeometryError;

    fn try_from(feature: geojson::Feature) -> Result<Self, Self::Error> {
        let geometry = feature.geometry.ok_or_else(|| GeometryError::Conversion {
            message: "Feature has no geometry".to_string(),
        })?;
        let geometry: Geometry<f64> = geometry.try_into()?;

        Ok(Self {
            geometry,
            properties: feature.properties.unwrap_or_default(),
        })
    }
}

/// An ordered set of features with a derived bounding box.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureCollection {
    context: SpatialContext,
    features: Vec<Feature>,
    bbox: Option<Rect<f64>>,
}

impl FeatureCollection {
    /// Creates an empty collection in `context`.
    #[must_use]
    pub const fn new(context: SpatialContext) -> Self {
        Self {
            context,
            features: Vec::new(),
            bbox: None,
        }
    }

    /// Creates a collection from `features` and computes its bounding box.
    #[must_use]
    pub fn from_features(context: SpatialContext, features: Vec<Feature>) -> Self {
        let mut collection = Self {
            context,
            features,
            bbox: None,
        };
        collection.recompute_bbox();
        collection
    }

    /// Appends a feature. The bounding box is left untouched.
    pub fn push(&mut self, feature: Feature) {
        self.features.push(feature);
    }

    /// Recomputes the bounding box as the union of member envelopes.
    pub fn recompute_bbox(&mut self) {
        self.bbox = self
            .features
            .iter()
            .filter_map(|f| f.geometry.bounding_rect())
            .reduce(|acc, rect| {
                Rect::new(
                    coord! {
                        x: acc.min().x.min(rect.min().x),
                        y: acc.min().y.min(rect.min().y),
                    },
                    coord! {
                        x: acc.max().x.max(rect.max().x),
                        y: acc.max().y.max(rect.max().y),
                    },
                )
            });
    }

    #[must_use]
    pub const fn context(&self) -> SpatialContext {
        self.context
    }

    #[must_use]
    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    #[must_use]
    pub fn into_features(self) -> Vec<Feature> {
        self.features
    }

    /// The bounding box as of the last [`Self::recompute_bbox`].
    #[must_use]
    pub const fn bbox(&self) -> Option<Rect<f64>> {
        self.bbox
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.features.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.features.is_empty()
    }

    /// Total area of all members in square meters.
    #[must_use]
    pub fn total_area(&self) -> f64 {
        self.features
            .iter()
            .map(|f| f.area(self.context.srid))
            .sum()
    }

    /// Encodes this collection as a `GeoJSON` feature collection with a
    /// `[minX, minY, maxX, maxY]` bounding box.
    #[must_use]
    pub fn to_geojson(&self) -> geojson::FeatureCollection {
        geojson::FeatureCollection {
            bbox: self
                .bbox
                .map(|r| vec![r.min().x, r.min().y, r.max().x, r.max().y]),
            features: self.features.iter().map(Feature::to_geojson).collect(),
            foreign_members: None,
        }
    }

    #[must_use]
    pub fn to_geojson_string(&self) -> String {
        GeoJson::FeatureCollection(self.to_geojson()).to_string()
    }

    /// Decodes a `GeoJSON` feature collection, recomputing the bounding box
    /// from the decoded members.
    ///
    /// # Errors
    ///
    /// Returns [`GeometryError`] if the text is not a `GeoJSON` feature
    /// collection or a member has no convertible geometry.
    pub fn from_geojson_str(context: SpatialContext, text: &str) -> Result<Self, GeometryError> {
        let GeoJson::FeatureCollection(collection) = text.parse::<GeoJson>()? else {
            return Err(GeometryError::Conversion {
                message: "Expected a GeoJSON FeatureCollection".to_string(),
            });
        };

        let features = collection
            .features
            .into_iter()
            .map(Feature::try_from)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::from_features(context, features))
    }
}

/// Reads a single geometry out of any `GeoJSON` document: a bare geometry,
/// a feature, or the first feature of a collection.
///
/// # Errors
///
/// Returns [`GeometryError`] if the text is not `GeoJSON` or contains no
/// geometry.
pub fn geometry_from_geojson_str(text: &str) -> Result<Geometry<f64>, GeometryError> {
    let geometry = match text.parse::<GeoJson>()? {
        GeoJson::Geometry(geometry) => Some(geometry),
        GeoJson::Feature(feature) => feature.geometry,
        GeoJson::FeatureCollection(collection) => collection
            .features
            .into_iter()
            .find_map(|feature| feature.geometry),
    };

    let geometry = geometry.ok_or_else(|| GeometryError::Conversion {
        message: "GeoJSON document contains no geometry".to_string(),
    })?;
    Ok(geometry.try_into()?)
}
