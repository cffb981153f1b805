//! Inbound method calls and their validation into typed commands
//!
//! A [`MethodCall`] is what crosses the boundary: a method name plus an untyped argument bag.
//! [`Command::parse`] checks every argument before anything runs, so a call either becomes a
//! fully-typed [`Command`] or fails without side effects.

use crate::annotation::AnnotationKind;
use crate::cluster::ClusterOptions;
use crate::engine::{ClusterQuery, RenderedQueryGeometry, RenderedQueryOptions, SourceQueryOptions};
use crate::expression::{self, Expression};
use crate::map_events::MapEventKind;
use crate::{BridgeError, Result};
use geo::{Coord, Rect};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

pub const CREATE_MANAGER: &str = "annotation#create_manager";
pub const REMOVE_MANAGER: &str = "annotation#remove_manager";
pub const SUBSCRIBE: &str = "map#subscribe";
pub const SET_STYLE_IMPORT_CONFIG_PROPERTY: &str = "setStyleImportConfigProperty";
pub const QUERY_RENDERED_FEATURES: &str = "queryRenderedFeatures";
pub const QUERY_SOURCE_FEATURES: &str = "querySourceFeatures";
pub const GET_CLUSTER_LEAVES: &str = "getGeoJsonClusterLeaves";
pub const GET_CLUSTER_CHILDREN: &str = "getGeoJsonClusterChildren";
pub const GET_CLUSTER_EXPANSION_ZOOM: &str = "getGeoJsonClusterExpansionZoom";

/// Style import targeted when `importId` is not given
pub const DEFAULT_IMPORT_ID: &str = "basemap";

/// Page size of `getGeoJsonClusterLeaves` when `limit` is not given
pub const DEFAULT_CLUSTER_LEAVES_LIMIT: u64 = 10;

/// A remote invocation from the host
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodCall {
    pub method: String,
    #[serde(default)]
    pub arguments: Value,
}

impl MethodCall {
    pub fn new(method: impl Into<String>, arguments: Value) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }
}

/// Arguments of `annotation#create_manager`
#[derive(Debug, Clone, PartialEq)]
pub struct CreateManager {
    pub kind: AnnotationKind,
    pub id: Option<String>,
    pub below_layer_id: Option<String>,
    /// Only ever set for point managers
    pub cluster_options: Option<ClusterOptions>,
}

/// A validated method call
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CreateManager(CreateManager),
    RemoveManager {
        id: String,
    },
    Subscribe(MapEventKind),
    SetStyleImportConfigProperty {
        import_id: String,
        config: String,
        value: Value,
    },
    QueryRenderedFeatures {
        geometry: RenderedQueryGeometry,
        options: RenderedQueryOptions,
    },
    QuerySourceFeatures {
        source_id: String,
        options: SourceQueryOptions,
    },
    QueryCluster {
        source_id: String,
        /// GeoJSON cluster feature
        cluster: Value,
        query: ClusterQuery,
    },
}

type Parser = fn(&Arguments<'_>) -> Result<Command>;

impl Command {
    /// Validate a method call
    ///
    /// The method name is checked before any argument.
    pub fn parse(call: &MethodCall) -> Result<Self> {
        #[cfg(feature = "profiling")]
        profiling::scope!("Command::parse");

        let parser: Parser = match call.method.as_str() {
            CREATE_MANAGER => parse_create_manager,
            REMOVE_MANAGER => parse_remove_manager,
            SUBSCRIBE => parse_subscribe,
            SET_STYLE_IMPORT_CONFIG_PROPERTY => parse_style_import_config,
            QUERY_RENDERED_FEATURES => parse_rendered_query,
            QUERY_SOURCE_FEATURES => parse_source_query,
            GET_CLUSTER_LEAVES => parse_cluster_leaves,
            GET_CLUSTER_CHILDREN => parse_cluster_children,
            GET_CLUSTER_EXPANSION_ZOOM => parse_cluster_expansion_zoom,
            other => return Err(BridgeError::MethodNotImplemented(other.to_string())),
        };
        parser(&Arguments::new(&call.arguments)?)
    }
}

fn parse_create_manager(arguments: &Arguments<'_>) -> Result<Command> {
    let kind: AnnotationKind = arguments.required_str("type")?.parse()?;
    let id = arguments.optional_str("id")?.map(str::to_string);
    let below_layer_id = arguments.optional_str("belowLayerId")?.map(str::to_string);
    let cluster_options = match kind {
        AnnotationKind::Point => ClusterOptions::from_arguments(arguments.get("clusterOptions"))?,
        _ => None,
    };
    Ok(Command::CreateManager(CreateManager {
        kind,
        id,
        below_layer_id,
        cluster_options,
    }))
}

fn parse_remove_manager(arguments: &Arguments<'_>) -> Result<Command> {
    Ok(Command::RemoveManager {
        id: arguments.required_str("id")?.to_string(),
    })
}

fn parse_subscribe(arguments: &Arguments<'_>) -> Result<Command> {
    Ok(Command::Subscribe(arguments.required_str("event")?.parse()?))
}

fn parse_style_import_config(arguments: &Arguments<'_>) -> Result<Command> {
    let config = arguments.required_str("config")?.to_string();
    let value = arguments.required("value")?.clone();
    let import_id = arguments
        .optional_str("importId")?
        .unwrap_or(DEFAULT_IMPORT_ID)
        .to_string();
    Ok(Command::SetStyleImportConfigProperty {
        import_id,
        config,
        value,
    })
}

fn parse_rendered_query(arguments: &Arguments<'_>) -> Result<Command> {
    Ok(Command::QueryRenderedFeatures {
        geometry: parse_geometry(arguments.required("geometry")?)?,
        options: parse_rendered_query_options(arguments.get("options"))?,
    })
}

fn parse_source_query(arguments: &Arguments<'_>) -> Result<Command> {
    Ok(Command::QuerySourceFeatures {
        source_id: arguments.required_str("sourceId")?.to_string(),
        options: parse_source_query_options(arguments.get("options"))?,
    })
}

fn parse_cluster_leaves(arguments: &Arguments<'_>) -> Result<Command> {
    let query = ClusterQuery::Leaves {
        limit: arguments
            .optional_u64("limit")?
            .unwrap_or(DEFAULT_CLUSTER_LEAVES_LIMIT),
        offset: arguments.optional_u64("offset")?.unwrap_or(0),
    };
    parse_cluster_query(arguments, query)
}

fn parse_cluster_children(arguments: &Arguments<'_>) -> Result<Command> {
    parse_cluster_query(arguments, ClusterQuery::Children)
}

fn parse_cluster_expansion_zoom(arguments: &Arguments<'_>) -> Result<Command> {
    parse_cluster_query(arguments, ClusterQuery::ExpansionZoom)
}

fn parse_cluster_query(arguments: &Arguments<'_>, query: ClusterQuery) -> Result<Command> {
    let source_id = arguments.required_str("sourceIdentifier")?.to_string();
    let cluster = arguments.required("cluster")?;
    if !cluster.is_object() {
        return Err(BridgeError::invalid_argument("cluster", "a GeoJSON feature mapping"));
    }
    Ok(Command::QueryCluster {
        source_id,
        cluster: cluster.clone(),
        query,
    })
}

/// Typed access to an argument mapping; `null` counts as absent
struct Arguments<'a> {
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Arguments<'a> {
    fn new(value: &'a Value) -> Result<Self> {
        match value {
            Value::Null => Ok(Self { map: None }),
            Value::Object(map) => Ok(Self { map: Some(map) }),
            _ => Err(BridgeError::invalid_argument("arguments", "a mapping")),
        }
    }

    fn get(&self, name: &str) -> Option<&'a Value> {
        self.map?.get(name).filter(|value| !value.is_null())
    }

    fn required(&self, name: &str) -> Result<&'a Value> {
        self.get(name)
            .ok_or_else(|| BridgeError::MissingArgument(name.to_string()))
    }

    fn required_str(&self, name: &str) -> Result<&'a str> {
        self.required(name)?
            .as_str()
            .ok_or_else(|| BridgeError::invalid_argument(name, "a string"))
    }

    fn optional_str(&self, name: &str) -> Result<Option<&'a str>> {
        self.get(name)
            .map(|value| {
                value
                    .as_str()
                    .ok_or_else(|| BridgeError::invalid_argument(name, "a string"))
            })
            .transpose()
    }

    fn optional_u64(&self, name: &str) -> Result<Option<u64>> {
        self.get(name)
            .map(|value| {
                value
                    .as_u64()
                    .ok_or_else(|| BridgeError::invalid_argument(name, "a non-negative integer"))
            })
            .transpose()
    }

    /// A list of strings, reported as `qualified` when malformed
    fn optional_str_list(&self, name: &str, qualified: &str) -> Result<Option<Vec<String>>> {
        self.get(name)
            .map(|ids| {
                ids.as_array()
                    .and_then(|ids| {
                        ids.iter()
                            .map(|id| id.as_str().map(str::to_string))
                            .collect::<Option<Vec<_>>>()
                    })
                    .ok_or_else(|| BridgeError::invalid_argument(qualified, "a list of strings"))
            })
            .transpose()
    }

    /// Decoded `filter` expression; an empty string means no filter
    fn optional_filter(&self, qualified: &str) -> Result<Option<Expression>> {
        self.optional_str("filter")
            .map_err(|e| rename_argument(e, qualified))?
            .filter(|text| !text.is_empty())
            .map(|text| expression::decode(text).map_err(|e| e.for_field("filter")))
            .transpose()
    }
}

fn parse_geometry(value: &Value) -> Result<RenderedQueryGeometry> {
    let geometry = Arguments::new(value)
        .map_err(|_| BridgeError::invalid_argument("geometry", "a mapping"))?;
    let kind = geometry
        .required_str("type")
        .map_err(|e| rename_argument(e, "geometry.type"))?;
    let text = geometry
        .required_str("value")
        .map_err(|e| rename_argument(e, "geometry.value"))?;

    let coordinates: Value = serde_json::from_str(text)
        .map_err(|_| BridgeError::invalid_argument("geometry.value", "JSON coordinate text"))?;

    match kind {
        "screenBox" => {
            let [min, max] = as_coords(&coordinates)
                .and_then(|coords| <[Coord<f64>; 2]>::try_from(coords).ok())
                .ok_or_else(|| {
                    BridgeError::invalid_argument("geometry.value", "[[minX, minY], [maxX, maxY]]")
                })?;
            Ok(RenderedQueryGeometry::ScreenBox(Rect::new(min, max)))
        }
        "screenCoordinate" => as_coord(&coordinates)
            .map(RenderedQueryGeometry::ScreenCoordinate)
            .ok_or_else(|| BridgeError::invalid_argument("geometry.value", "[x, y]")),
        "screenPolygon" => as_coords(&coordinates)
            .map(RenderedQueryGeometry::ScreenPolygon)
            .ok_or_else(|| BridgeError::invalid_argument("geometry.value", "[[x, y], ...]")),
        _ => Err(BridgeError::invalid_argument(
            "geometry.type",
            "one of screenBox, screenCoordinate, screenPolygon",
        )),
    }
}

fn rename_argument(error: BridgeError, name: &str) -> BridgeError {
    match error {
        BridgeError::MissingArgument(_) => BridgeError::MissingArgument(name.to_string()),
        BridgeError::InvalidArgument { expected, .. } => BridgeError::invalid_argument(name, expected),
        other => other,
    }
}

fn as_coord(value: &Value) -> Option<Coord<f64>> {
    match value.as_array()?.as_slice() {
        [x, y] => Some(Coord {
            x: x.as_f64()?,
            y: y.as_f64()?,
        }),
        _ => None,
    }
}

fn as_coords(value: &Value) -> Option<Vec<Coord<f64>>> {
    value.as_array()?.iter().map(as_coord).collect()
}

fn parse_rendered_query_options(value: Option<&Value>) -> Result<RenderedQueryOptions> {
    let Some(value) = value else {
        return Ok(RenderedQueryOptions::default());
    };
    let options =
        Arguments::new(value).map_err(|_| BridgeError::invalid_argument("options", "a mapping"))?;
    Ok(RenderedQueryOptions {
        layer_ids: options.optional_str_list("layerIds", "options.layerIds")?,
        filter: options.optional_filter("options.filter")?,
    })
}

fn parse_source_query_options(value: Option<&Value>) -> Result<SourceQueryOptions> {
    let Some(value) = value else {
        return Ok(SourceQueryOptions::default());
    };
    let options =
        Arguments::new(value).map_err(|_| BridgeError::invalid_argument("options", "a mapping"))?;
    Ok(SourceQueryOptions {
        source_layer_ids: options.optional_str_list("sourceLayerIds", "options.sourceLayerIds")?,
        filter: options.optional_filter("options.filter")?,
    })
}
