//! Point clustering configuration
//!
//! Builds [`ClusterOptions`] out of the untyped `clusterOptions` mapping of a point manager
//! creation request. Every field has a default; `<field>Expression` keys may override the five
//! style fields with a decoded expression.

use crate::expression::{self, Expression, StyleColor, StyleValue};
use crate::{BridgeError, Result};
use serde::Serialize;
use serde_json::{Map, Value};

pub const DEFAULT_CIRCLE_RADIUS: f64 = 18.0;
pub const DEFAULT_TEXT_SIZE: f64 = 12.0;
pub const DEFAULT_CLUSTER_RADIUS: f64 = 50.0;
pub const DEFAULT_CLUSTER_MAX_ZOOM: f64 = 14.0;

/// Built-in property holding the number of points in a cluster
pub const POINT_COUNT_PROPERTY: &str = "point_count";

/// Clustering configuration for a point annotation manager
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterOptions {
    pub circle_radius: StyleValue<f64>,
    pub circle_color: StyleValue<StyleColor>,
    pub text_color: StyleValue<StyleColor>,
    pub text_size: StyleValue<f64>,
    pub text_field: StyleValue<String>,
    /// Radius of each cluster in screen pixels
    pub cluster_radius: f64,
    /// Zoom level above which points are no longer clustered
    pub cluster_max_zoom: f64,
}

impl Default for ClusterOptions {
    fn default() -> Self {
        Self {
            circle_radius: StyleValue::Constant(DEFAULT_CIRCLE_RADIUS),
            circle_color: StyleValue::Constant(StyleColor::BLACK),
            text_color: StyleValue::Constant(StyleColor::WHITE),
            text_size: StyleValue::Constant(DEFAULT_TEXT_SIZE),
            text_field: StyleValue::Expression(Expression::get(POINT_COUNT_PROPERTY)),
            cluster_radius: DEFAULT_CLUSTER_RADIUS,
            cluster_max_zoom: DEFAULT_CLUSTER_MAX_ZOOM,
        }
    }
}

impl ClusterOptions {
    /// Build cluster options from the `clusterOptions` argument
    ///
    /// Returns `Ok(None)` when the argument is absent, `null` or an empty mapping, meaning
    /// clustering is disabled. An expression that fails to decode fails the whole build; nothing
    /// partially overridden is ever returned.
    pub fn from_arguments(arguments: Option<&Value>) -> Result<Option<Self>> {
        #[cfg(feature = "profiling")]
        profiling::scope!("cluster::from_arguments");

        let options = match arguments {
            None | Some(Value::Null) => return Ok(None),
            Some(Value::Object(map)) if map.is_empty() => return Ok(None),
            Some(Value::Object(map)) => map,
            Some(_) => return Err(BridgeError::invalid_argument("clusterOptions", "a mapping")),
        };

        let defaults = Self::default();

        let circle_radius = expression_override(options, "circleRadiusExpression")?
            .map_or(defaults.circle_radius, StyleValue::Expression);
        let circle_color = expression_override(options, "circleColorExpression")?
            .map_or(defaults.circle_color, StyleValue::Expression);
        let text_color = expression_override(options, "textColorExpression")?
            .map_or(defaults.text_color, StyleValue::Expression);
        let text_size = expression_override(options, "textSizeExpression")?
            .map_or(defaults.text_size, StyleValue::Expression);
        let text_field = expression_override(options, "textFieldExpression")?
            .map_or(defaults.text_field, StyleValue::Expression);

        Ok(Some(Self {
            circle_radius,
            circle_color,
            text_color,
            text_size,
            text_field,
            cluster_radius: number_or(options, "clusterRadius", defaults.cluster_radius),
            cluster_max_zoom: number_or(options, "clusterMaxZoom", defaults.cluster_max_zoom),
        }))
    }
}

/// Decode `key` if it holds non-empty expression text
fn expression_override(options: &Map<String, Value>, key: &str) -> Result<Option<Expression>> {
    match options.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(text)) if text.is_empty() => Ok(None),
        Some(Value::String(text)) => expression::decode(text)
            .map(Some)
            .map_err(|e| e.for_field(key)),
        Some(_) => Err(BridgeError::invalid_argument(key, "expression JSON text")),
    }
}

/// Non-numeric values fall back to the default silently
fn number_or(options: &Map<String, Value>, key: &str, default: f64) -> f64 {
    options.get(key).and_then(Value::as_f64).unwrap_or(default)
}
