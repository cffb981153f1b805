//! The map engine interface driven by the bridge
//!
//! Everything the bridge needs from the native map lives behind [`MapEngine`]: creating and
//! disposing annotation managers, editing the imported style, querying rendered and source
//! features and walking GeoJSON clusters.
//! [`InMemoryEngine`] implements it completely without a renderer.

mod memory;

pub use memory::InMemoryEngine;

use crate::annotation::AnnotationKind;
use crate::cluster::ClusterOptions;
use crate::completion::Completion;
use crate::expression::Expression;
use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Failures reported by the engine itself
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EngineError {
    #[error("Failed to create annotation manager: {0}")]
    ManagerCreation(String),

    #[error("Style update failed: {0}")]
    Style(String),

    #[error("Feature query failed: {0}")]
    Query(String),

    #[error("Failed to serialize engine result: {0}")]
    Serialization(String),
}

/// Opaque engine reference to a live annotation manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ManagerRef(pub u64);

/// Everything the engine needs to create one annotation manager
#[derive(Debug, Clone, PartialEq)]
pub struct ManagerSpec {
    pub id: String,
    pub kind: AnnotationKind,
    /// Only set when the layer exists in the current style
    pub below_layer_id: Option<String>,
    /// Only ever set for point managers
    pub cluster_options: Option<ClusterOptions>,
}

/// Screen-space geometry for a rendered feature query
#[derive(Debug, Clone, PartialEq)]
pub enum RenderedQueryGeometry {
    ScreenBox(Rect<f64>),
    ScreenCoordinate(Coord<f64>),
    ScreenPolygon(Vec<Coord<f64>>),
}

impl RenderedQueryGeometry {
    /// Whether a screen point falls inside this geometry
    pub fn contains(&self, point: Coord<f64>) -> bool {
        use geo::Contains;
        match self {
            RenderedQueryGeometry::ScreenBox(rect) => {
                let (min, max) = (rect.min(), rect.max());
                point.x >= min.x && point.x <= max.x && point.y >= min.y && point.y <= max.y
            }
            RenderedQueryGeometry::ScreenCoordinate(coord) => *coord == point,
            RenderedQueryGeometry::ScreenPolygon(ring) => {
                if ring.len() < 3 {
                    return false;
                }
                let polygon = geo::Polygon::new(geo::LineString::from(ring.clone()), vec![]);
                polygon.contains(&geo::Point::from(point))
            }
        }
    }
}

/// Filters applied to a rendered feature query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RenderedQueryOptions {
    pub layer_ids: Option<Vec<String>>,
    pub filter: Option<Expression>,
}

/// Filters applied to a source feature query
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceQueryOptions {
    pub source_layer_ids: Option<Vec<String>>,
    pub filter: Option<Expression>,
}

/// What to ask about a GeoJSON cluster feature
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClusterQuery {
    /// Original points in the cluster, paged
    Leaves { limit: u64, offset: u64 },
    /// Clusters and points on the next zoom level
    Children,
    /// Zoom level at which the cluster splits
    ExpansionZoom,
}

/// Answer to a [`ClusterQuery`]: a scalar for the expansion zoom, features otherwise
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FeatureExtensionValue {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub feature_collection: Option<Vec<Value>>,
}

/// One rendered feature returned by a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueriedFeature {
    pub source: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_layer: Option<String>,
    /// GeoJSON feature
    pub feature: Value,
    /// Feature state, an empty object when none was set
    pub state: Value,
}

/// The native map as seen by the bridge
///
/// Calls happen on the map's owner thread. Queries may answer later, through the supplied
/// [`Completion`].
pub trait MapEngine {
    /// Whether the current style has a layer with this identifier
    fn layer_exists(&self, layer_id: &str) -> bool;

    fn create_manager(&mut self, spec: &ManagerSpec) -> Result<ManagerRef, EngineError>;

    /// Dispose the manager with this identifier and its layer; no-op if unknown
    fn remove_manager(&mut self, id: &str);

    fn set_style_import_config_property(
        &mut self,
        import_id: &str,
        config: &str,
        value: &Value,
    ) -> Result<(), EngineError>;

    fn query_rendered_features(
        &mut self,
        geometry: RenderedQueryGeometry,
        options: RenderedQueryOptions,
        completion: Completion<Vec<QueriedFeature>>,
    );

    fn query_source_features(
        &mut self,
        source_id: &str,
        options: SourceQueryOptions,
        completion: Completion<Vec<QueriedFeature>>,
    );

    /// `cluster` is the GeoJSON cluster feature, as previously returned by a query
    fn query_cluster(
        &mut self,
        source_id: &str,
        cluster: &Value,
        query: ClusterQuery,
        completion: Completion<FeatureExtensionValue>,
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_screen_box_contains() {
        let geometry = RenderedQueryGeometry::ScreenBox(Rect::new(
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 100.0, y: 50.0 },
        ));
        assert!(geometry.contains(Coord { x: 10.0, y: 10.0 }));
        assert!(geometry.contains(Coord { x: 100.0, y: 50.0 }));
        assert!(!geometry.contains(Coord { x: 101.0, y: 10.0 }));
    }

    #[test]
    fn test_screen_coordinate_contains_only_itself() {
        let geometry = RenderedQueryGeometry::ScreenCoordinate(Coord { x: 5.0, y: 5.0 });
        assert!(geometry.contains(Coord { x: 5.0, y: 5.0 }));
        assert!(!geometry.contains(Coord { x: 5.0, y: 6.0 }));
    }

    #[test]
    fn test_feature_extension_value_wire_shape() {
        let zoom = FeatureExtensionValue {
            value: Some("3".to_string()),
            feature_collection: None,
        };
        assert_eq!(serde_json::to_value(zoom).unwrap(), serde_json::json!({ "value": "3" }));

        let leaves = FeatureExtensionValue {
            value: None,
            feature_collection: Some(vec![serde_json::json!({ "type": "Feature" })]),
        };
        assert_eq!(
            serde_json::to_value(leaves).unwrap(),
            serde_json::json!({ "featureCollection": [{ "type": "Feature" }] })
        );
    }

    #[test]
    fn test_screen_polygon_contains() {
        let geometry = RenderedQueryGeometry::ScreenPolygon(vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 0.0 },
            Coord { x: 10.0, y: 10.0 },
            Coord { x: 0.0, y: 10.0 },
        ]);
        assert!(geometry.contains(Coord { x: 5.0, y: 5.0 }));
        assert!(!geometry.contains(Coord { x: 15.0, y: 5.0 }));

        let degenerate = RenderedQueryGeometry::ScreenPolygon(vec![Coord { x: 0.0, y: 0.0 }]);
        assert!(!degenerate.contains(Coord { x: 0.0, y: 0.0 }));
    }
}
