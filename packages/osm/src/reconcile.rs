//! The fetch, classify, clip and remainder pipeline.
//!
//! One [`FeatureReconciler::reconcile`] call runs a single pass:
//!
//! 1. validate the region (fails before any network call)
//! 2. resolve the final tag selection
//! 3. build the Overpass query for the region's WGS84 envelope
//! 4. fetch, racing the caller's cancellation token
//! 5. classify and clip every element on blocking worker threads
//! 6. subtract every built feature from the region to get the remainder
//! 7. assemble the collection and its bounding box
//!
//! Overlay failures in steps 5 and 6 shrink the result rather than failing
//! the request.

use std::collections::BTreeMap;
use std::sync::Arc;

use futures::stream::{self, StreamExt as _, TryStreamExt as _};
use geo::{BoundingRect, Geometry};
use mapscope_geometry::GeometryFamily;
use mapscope_geometry::classify::family;
use mapscope_geometry::feature::{Feature, FeatureCollection};
use mapscope_geometry::overlay::Overlay;
use mapscope_geometry::projection::{is_supported, project};
use mapscope_geometry::{SpatialContext, Srid};
use mapscope_osm_models::{
    AspectDefinition, OverpassService, RawElement, TagDefinition, TagSelection,
};
use tokio_util::sync::CancellationToken;

use crate::classify::{ClassifiedElement, classify};
use crate::client::{ElementSource, OverpassClient};
use crate::query::{bbox_string, build_payload};
use crate::{OsmError, registry};

/// Property marking the remainder feature.
pub const REMAINDER_PROPERTY: &str = "type";
/// Value of [`REMAINDER_PROPERTY`] on the remainder feature.
pub const REMAINDER_VALUE: &str = "Difference";

/// Produces the final tag selection from the one in the request.
pub type SelectionResolver = Box<dyn FnOnce(TagSelection) -> TagSelection + Send>;

/// Called on every feature after it is built, including the remainder.
pub type FeatureHook = Arc<dyn Fn(Feature) -> Feature + Send + Sync>;

/// Input to one reconciliation pass.
pub struct ReconcileRequest {
    /// Area of interest, in the SRID of `context`.
    pub region: Option<Geometry<f64>>,
    pub context: SpatialContext,
    pub selection: TagSelection,
    /// Buffer applied to points and lines before clipping, in meters. With
    /// no buffer they are clipped as-is and contribute no area.
    pub buffer_units: f64,
    pub resolver: Option<SelectionResolver>,
    pub on_feature: Option<FeatureHook>,
}

impl ReconcileRequest {
    #[must_use]
    pub fn new(context: SpatialContext, region: Option<Geometry<f64>>) -> Self {
        Self {
            region,
            context,
            selection: TagSelection::new(),
            buffer_units: 0.0,
            resolver: None,
            on_feature: None,
        }
    }

    #[must_use]
    pub fn with_selection(mut self, selection: TagSelection) -> Self {
        self.selection = selection;
        self
    }

    #[must_use]
    pub const fn with_buffer(mut self, buffer_units: f64) -> Self {
        self.buffer_units = buffer_units;
        self
    }

    #[must_use]
    pub fn with_resolver(
        mut self,
        resolver: impl FnOnce(TagSelection) -> TagSelection + Send + 'static,
    ) -> Self {
        self.resolver = Some(Box::new(resolver));
        self
    }

    #[must_use]
    pub fn with_hook(mut self, hook: impl Fn(Feature) -> Feature + Send + Sync + 'static) -> Self {
        self.on_feature = Some(Arc::new(hook));
        self
    }
}

/// Read-only state shared by the workers of one request.
struct BuildContext {
    overlay: Overlay,
    region: Geometry<f64>,
    srid: Srid,
    buffer_units: f64,
    catalogue: Arc<[AspectDefinition]>,
    selection: TagSelection,
    selection_json: serde_json::Value,
    hook: Option<FeatureHook>,
}

impl BuildContext {
    fn finish(&self, feature: Feature) -> Feature {
        match &self.hook {
            Some(hook) => hook(feature),
            None => feature,
        }
    }

    /// The aspect an element was fetched for: the first aspect with a
    /// selected tag the element carries, else the first aspect with any
    /// tag it carries.
    fn aspect_of(&self, tags: &BTreeMap<String, String>) -> Option<&AspectDefinition> {
        let selected = |tag: &TagDefinition| {
            if tag.is_wildcard() {
                self.selection.selects_key(&tag.key)
            } else {
                self.selection.contains(&tag.key, &tag.value)
            }
        };
        let carries = |definition: &&AspectDefinition, selected_only: bool| {
            definition
                .tags
                .iter()
                .any(|tag| tag.matches_tags(tags) && (!selected_only || selected(tag)))
        };

        self.catalogue
            .iter()
            .find(|d| carries(d, true))
            .or_else(|| self.catalogue.iter().find(|d| carries(d, false)))
    }

    fn build_feature(&self, element: ClassifiedElement) -> Option<Feature> {
        let buffer_units = if family(&element.geometry) == GeometryFamily::Polygon {
            0.0
        } else {
            self.buffer_units
        };

        let Some(clipped) =
            self.overlay
                .intersection(&element.geometry, &self.region, Some(buffer_units))
        else {
            log::trace!(
                "{} {} does not overlap the region",
                element.osm_type,
                element.osm_id
            );
            return None;
        };

        let tags: serde_json::Map<String, serde_json::Value> = element
            .tags
            .iter()
            .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
            .collect();
        let aspect = self
            .aspect_of(&element.tags)
            .map_or(serde_json::Value::Null, |d| d.aspect.as_ref().into());

        let feature = Feature::new(clipped)
            .with_property("aspect", aspect)
            .with_property("selection", self.selection_json.clone())
            .with_property("tags", tags)
            .with_property("osm_id", element.osm_id)
            .with_property("osm_type", element.osm_type.as_ref())
            .prune_null_properties();
        Some(self.finish(feature))
    }

    fn build_element(&self, element: &RawElement) -> Vec<Feature> {
        classify(element, self.srid)
            .into_iter()
            .filter_map(|classified| self.build_feature(classified))
            .collect()
    }

    fn remainder(&self, features: &[Feature]) -> Option<Feature> {
        let remainder = self
            .overlay
            .difference(features.iter().map(|f| &f.geometry), &self.region)?;
        let feature = Feature::new(remainder).with_property(REMAINDER_PROPERTY, REMAINDER_VALUE);
        Some(self.finish(feature))
    }
}

/// Runs reconciliation passes against one element source.
pub struct FeatureReconciler<S> {
    source: S,
    catalogue: Arc<[AspectDefinition]>,
    timeout_secs: u64,
    concurrency: usize,
}

impl FeatureReconciler<OverpassClient> {
    /// Creates a reconciler for the configured Overpass endpoint and the
    /// registered aspect catalogue.
    ///
    /// # Errors
    ///
    /// Returns [`OsmError::Http`] if the HTTP client cannot be built.
    pub fn overpass() -> Result<Self, OsmError> {
        let service = registry::overpass_service();
        let client = OverpassClient::new(service.clone())?;
        Ok(Self::new(client, &service))
    }
}

impl<S: ElementSource> FeatureReconciler<S> {
    /// Creates a reconciler using the registered aspect catalogue.
    #[must_use]
    pub fn new(source: S, service: &OverpassService) -> Self {
        Self {
            source,
            catalogue: registry::all_aspects().into(),
            timeout_secs: service.timeout_secs,
            concurrency: service.concurrency.max(1),
        }
    }

    /// Replaces the aspect catalogue.
    #[must_use]
    pub fn with_catalogue(mut self, catalogue: Vec<AspectDefinition>) -> Self {
        self.catalogue = catalogue.into();
        self
    }

    #[must_use]
    pub const fn source(&self) -> &S {
        &self.source
    }

    /// Runs one reconciliation pass.
    ///
    /// `cancel` is only observed while fetching.
    ///
    /// # Errors
    ///
    /// Returns [`OsmError::Validation`] for a missing or empty region or an
    /// unsupported SRID, [`OsmError::Cancelled`] if `cancel` fires during
    /// the fetch, and the source's error if the fetch fails.
    pub async fn reconcile(
        &self,
        request: ReconcileRequest,
        cancel: &CancellationToken,
    ) -> Result<FeatureCollection, OsmError> {
        let ReconcileRequest {
            region,
            context,
            selection,
            buffer_units,
            resolver,
            on_feature,
        } = request;

        let region = validate_region(region, context.srid)?;

        let selection = match resolver {
            Some(resolve) => resolve(selection),
            None => selection,
        };

        let envelope = project(&region, context.srid, Srid::WGS84)?
            .bounding_rect()
            .ok_or_else(|| OsmError::Validation {
                message: "Region has no envelope in WGS84".to_string(),
            })?;
        let bbox = bbox_string(&envelope);

        let elements = match build_payload(&self.catalogue, &selection, &bbox, self.timeout_secs)
        {
            Some(payload) => {
                log::info!("Fetching selected tags within {bbox}");
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => return Err(OsmError::Cancelled),
                    fetched = self.source.fetch(&payload) => fetched?,
                }
            }
            None => {
                log::info!("No aspect has selected tags; skipping fetch");
                Vec::new()
            }
        };

        let shared = Arc::new(BuildContext {
            overlay: Overlay::new(context),
            region,
            srid: context.srid,
            buffer_units,
            catalogue: Arc::clone(&self.catalogue),
            selection_json: serde_json::to_value(&selection)?,
            selection,
            hook: on_feature,
        });

        let element_count = elements.len();
        let built: Vec<Vec<Feature>> = stream::iter(elements.into_iter().map(|element| {
            let shared = Arc::clone(&shared);
            tokio::task::spawn_blocking(move || shared.build_element(&element))
        }))
        .buffered(self.concurrency)
        .try_collect()
        .await?;
        let features: Vec<Feature> = built.into_iter().flatten().collect();
        log::info!(
            "Built {} features from {element_count} elements",
            features.len()
        );

        let remainder_ctx = Arc::clone(&shared);
        let (mut features, remainder) = tokio::task::spawn_blocking(move || {
            let remainder = remainder_ctx.remainder(&features);
            (features, remainder)
        })
        .await?;

        if let Some(remainder) = remainder {
            features.push(remainder);
        } else {
            log::info!("Features cover the whole region; no remainder");
        }

        Ok(FeatureCollection::from_features(context, features))
    }
}

fn validate_region(region: Option<Geometry<f64>>, srid: Srid) -> Result<Geometry<f64>, OsmError> {
    let region = region.ok_or_else(|| OsmError::Validation {
        message: "Region geometry is required".to_string(),
    })?;
    if region.bounding_rect().is_none() {
        return Err(OsmError::Validation {
            message: "Region geometry is empty".to_string(),
        });
    }
    if !is_supported(srid) {
        return Err(OsmError::Validation {
            message: format!("Unsupported region SRID {srid}"),
        });
    }
    Ok(region)
}
