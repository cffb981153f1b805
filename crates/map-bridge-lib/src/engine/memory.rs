use super::{
    ClusterQuery, EngineError, FeatureExtensionValue, ManagerRef, ManagerSpec, MapEngine,
    QueriedFeature, RenderedQueryGeometry, RenderedQueryOptions, SourceQueryOptions,
};
use crate::completion::Completion;
use crate::expression::Expression;
use geo::Coord;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{HashMap, HashSet};

/// A feature placed on screen, as the in-memory renderer sees it
#[derive(Debug, Clone)]
struct RenderedFeature {
    layer_id: String,
    position: Coord<f64>,
    feature: QueriedFeature,
}

/// A GeoJSON cluster and what it expands into
#[derive(Debug, Clone)]
struct Cluster {
    source_id: String,
    cluster_id: u64,
    expansion_zoom: f64,
    children: Vec<Value>,
    leaves: Vec<Value>,
}

/// Complete engine without a renderer
///
/// Keeps track of layers, live managers, style import configuration, a flat list of rendered
/// features and GeoJSON clusters. Queries answer immediately unless held with
/// [`InMemoryEngine::hold_queries`], which lets callers observe the deferred path.
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    layers: HashSet<String>,
    managers: HashMap<String, (ManagerRef, ManagerSpec)>,
    next_ref: u64,
    style_imports: HashMap<String, Map<String, Value>>,
    sources: HashSet<String>,
    features: Vec<RenderedFeature>,
    clusters: Vec<Cluster>,
    fail_next_create: Option<String>,
    hold_queries: bool,
    pending: Vec<(Completion<Value>, Result<Value, EngineError>)>,
    removed: Vec<String>,
}

impl InMemoryEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a style layer
    pub fn with_layer(mut self, layer_id: impl Into<String>) -> Self {
        self.add_layer(layer_id);
        self
    }

    pub fn add_layer(&mut self, layer_id: impl Into<String>) {
        self.layers.insert(layer_id.into());
    }

    /// Place a rendered feature at a screen position in a layer
    pub fn add_feature(&mut self, layer_id: &str, position: Coord<f64>, feature: QueriedFeature) {
        self.layers.insert(layer_id.to_string());
        self.sources.insert(feature.source.clone());
        self.features.push(RenderedFeature {
            layer_id: layer_id.to_string(),
            position,
            feature,
        });
    }

    /// Register a cluster of a GeoJSON source, addressed by its `cluster_id` property
    pub fn add_cluster(
        &mut self,
        source_id: &str,
        cluster_id: u64,
        expansion_zoom: f64,
        children: Vec<Value>,
        leaves: Vec<Value>,
    ) {
        self.sources.insert(source_id.to_string());
        self.clusters.push(Cluster {
            source_id: source_id.to_string(),
            cluster_id,
            expansion_zoom,
            children,
            leaves,
        });
    }

    /// Make the next `create_manager` call fail with this reason
    pub fn fail_next_create(&mut self, reason: impl Into<String>) {
        self.fail_next_create = Some(reason.into());
    }

    /// Live manager created under `id`
    pub fn manager(&self, id: &str) -> Option<&ManagerSpec> {
        self.managers.get(id).map(|(_, spec)| spec)
    }

    pub fn manager_count(&self) -> usize {
        self.managers.len()
    }

    /// Identifiers of disposed managers, in disposal order
    pub fn removed_ids(&self) -> &[String] {
        &self.removed
    }

    /// Current configuration value of a style import
    pub fn style_import_config(&self, import_id: &str, config: &str) -> Option<&Value> {
        self.style_imports.get(import_id)?.get(config)
    }

    /// Keep query completions pending until [`release_queries`](Self::release_queries)
    pub fn hold_queries(&mut self) {
        self.hold_queries = true;
    }

    /// Answer every held query and stop holding new ones
    pub fn release_queries(&mut self) {
        self.hold_queries = false;
        for (completion, payload) in self.pending.drain(..) {
            completion.complete(payload);
        }
    }

    /// Drop every held query without answering it
    pub fn drop_pending_queries(&mut self) -> usize {
        let count = self.pending.len();
        self.pending.clear();
        count
    }

    pub fn pending_query_count(&self) -> usize {
        self.pending.len()
    }

    fn answer<T: Serialize>(&mut self, completion: Completion<T>, result: Result<T, EngineError>) {
        if !self.hold_queries {
            completion.complete(result);
            return;
        }
        let payload = result.and_then(|value| {
            serde_json::to_value(value).map_err(|e| EngineError::Serialization(e.to_string()))
        });
        self.pending.push((completion.untyped(), payload));
    }

    fn source_features(
        &self,
        source_id: &str,
        options: &SourceQueryOptions,
    ) -> Result<Vec<QueriedFeature>, EngineError> {
        if !self.sources.contains(source_id) {
            return Err(EngineError::Query(format!("no source `{source_id}`")));
        }
        Ok(self
            .features
            .iter()
            .map(|rendered| &rendered.feature)
            .filter(|feature| feature.source == source_id)
            .filter(|feature| {
                options.source_layer_ids.as_ref().is_none_or(|ids| {
                    feature
                        .source_layer
                        .as_ref()
                        .is_some_and(|layer| ids.contains(layer))
                })
            })
            .filter(|feature| {
                options
                    .filter
                    .as_ref()
                    .is_none_or(|filter| matches_filter(filter, &feature.feature))
            })
            .cloned()
            .collect())
    }

    fn cluster(&self, source_id: &str, cluster: &Value) -> Result<&Cluster, EngineError> {
        if !self.sources.contains(source_id) {
            return Err(EngineError::Query(format!("no source `{source_id}`")));
        }
        let cluster_id = feature_property(cluster, "cluster_id")
            .and_then(Value::as_u64)
            .ok_or_else(|| EngineError::Query("feature is not a cluster".to_string()))?;
        self.clusters
            .iter()
            .find(|c| c.source_id == source_id && c.cluster_id == cluster_id)
            .ok_or_else(|| {
                EngineError::Query(format!("no cluster {cluster_id} in source `{source_id}`"))
            })
    }
}

impl MapEngine for InMemoryEngine {
    fn layer_exists(&self, layer_id: &str) -> bool {
        self.layers.contains(layer_id)
    }

    fn create_manager(&mut self, spec: &ManagerSpec) -> Result<ManagerRef, EngineError> {
        if let Some(reason) = self.fail_next_create.take() {
            return Err(EngineError::ManagerCreation(reason));
        }
        if self.managers.contains_key(&spec.id) {
            return Err(EngineError::ManagerCreation(format!(
                "layer for `{}` already exists",
                spec.id
            )));
        }
        if let Some(below) = &spec.below_layer_id
            && !self.layers.contains(below)
        {
            return Err(EngineError::ManagerCreation(format!(
                "no layer `{below}` to insert below"
            )));
        }

        let reference = ManagerRef(self.next_ref);
        self.next_ref += 1;
        self.managers
            .insert(spec.id.clone(), (reference, spec.clone()));
        Ok(reference)
    }

    fn remove_manager(&mut self, id: &str) {
        if self.managers.remove(id).is_some() {
            self.removed.push(id.to_string());
        }
    }

    fn set_style_import_config_property(
        &mut self,
        import_id: &str,
        config: &str,
        value: &Value,
    ) -> Result<(), EngineError> {
        if import_id.is_empty() {
            return Err(EngineError::Style("import id must not be empty".to_string()));
        }
        self.style_imports
            .entry(import_id.to_string())
            .or_default()
            .insert(config.to_string(), value.clone());
        Ok(())
    }

    fn query_rendered_features(
        &mut self,
        geometry: RenderedQueryGeometry,
        options: RenderedQueryOptions,
        completion: Completion<Vec<QueriedFeature>>,
    ) {
        #[cfg(feature = "profiling")]
        profiling::scope!("InMemoryEngine::query_rendered_features");

        let features: Vec<QueriedFeature> = self
            .features
            .iter()
            .filter(|rendered| {
                options
                    .layer_ids
                    .as_ref()
                    .is_none_or(|ids| ids.iter().any(|id| *id == rendered.layer_id))
            })
            .filter(|rendered| geometry.contains(rendered.position))
            .filter(|rendered| {
                options
                    .filter
                    .as_ref()
                    .is_none_or(|filter| matches_filter(filter, &rendered.feature.feature))
            })
            .map(|rendered| rendered.feature.clone())
            .collect();

        self.answer(completion, Ok(features));
    }

    fn query_source_features(
        &mut self,
        source_id: &str,
        options: SourceQueryOptions,
        completion: Completion<Vec<QueriedFeature>>,
    ) {
        let result = self.source_features(source_id, &options);
        self.answer(completion, result);
    }

    fn query_cluster(
        &mut self,
        source_id: &str,
        cluster: &Value,
        query: ClusterQuery,
        completion: Completion<FeatureExtensionValue>,
    ) {
        let result = self.cluster(source_id, cluster).map(|cluster| match query {
            ClusterQuery::Leaves { limit, offset } => FeatureExtensionValue {
                value: None,
                feature_collection: Some(
                    cluster
                        .leaves
                        .iter()
                        .skip(usize::try_from(offset).unwrap_or(usize::MAX))
                        .take(usize::try_from(limit).unwrap_or(usize::MAX))
                        .cloned()
                        .collect(),
                ),
            },
            ClusterQuery::Children => FeatureExtensionValue {
                value: None,
                feature_collection: Some(cluster.children.clone()),
            },
            ClusterQuery::ExpansionZoom => FeatureExtensionValue {
                value: Some(cluster.expansion_zoom.to_string()),
                feature_collection: None,
            },
        });
        self.answer(completion, result);
    }
}

fn feature_property<'a>(feature: &'a Value, name: &str) -> Option<&'a Value> {
    feature.get("properties")?.get(name)
}

/// Evaluate an operand to a concrete value: `get` lookups and literals
fn operand(expression: &Expression, feature: &Value) -> Option<Value> {
    match expression {
        Expression::Literal(value) => Some(value.clone()),
        Expression::Operation {
            operator,
            arguments,
        } => match (operator.as_str(), arguments.as_slice()) {
            ("get", [Expression::Literal(Value::String(name))]) => {
                feature_property(feature, name).cloned()
            }
            ("literal", [Expression::Literal(value)]) => Some(value.clone()),
            _ => None,
        },
    }
}

/// Boolean filters over feature properties
///
/// Supports the comparison and logical subset of the expression language; any other operator
/// lets the feature through.
fn matches_filter(filter: &Expression, feature: &Value) -> bool {
    let Expression::Operation {
        operator,
        arguments,
    } = filter
    else {
        return filter_literal(filter);
    };
    match (operator.as_str(), arguments.as_slice()) {
        ("has", [Expression::Literal(Value::String(name))]) => {
            feature_property(feature, name).is_some()
        }
        ("==", [left, right]) => {
            operand(left, feature).is_some() && operand(left, feature) == operand(right, feature)
        }
        ("!=", [left, right]) => operand(left, feature) != operand(right, feature),
        ("!", [inner]) => !matches_filter(inner, feature),
        ("all", conditions) => conditions.iter().all(|c| matches_filter(c, feature)),
        ("any", conditions) => conditions.iter().any(|c| matches_filter(c, feature)),
        _ => true,
    }
}

fn filter_literal(expression: &Expression) -> bool {
    !matches!(expression, Expression::Literal(Value::Bool(false)))
}
