//! ManagerRegistry - Identifier to annotation manager mapping
//!
//! The registry owns the engine and keeps its map of live managers in lockstep with it: an entry
//! exists exactly while the engine holds the corresponding manager.

use crate::annotation::AnnotationKind;
use crate::cluster::ClusterOptions;
use crate::config::{BridgeConfig, DuplicateIdPolicy};
use crate::engine::{ManagerRef, ManagerSpec, MapEngine};
use crate::{BridgeError, Result};
use std::collections::HashMap;

/// A live annotation manager, tagged with its kind
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AnnotationManagerHandle {
    Circle {
        id: String,
        reference: ManagerRef,
    },
    Point {
        id: String,
        reference: ManagerRef,
        /// Whether the manager was created with cluster options
        clustered: bool,
    },
    Polygon {
        id: String,
        reference: ManagerRef,
    },
    Polyline {
        id: String,
        reference: ManagerRef,
    },
}

impl AnnotationManagerHandle {
    fn new(kind: AnnotationKind, id: String, reference: ManagerRef, clustered: bool) -> Self {
        match kind {
            AnnotationKind::Circle => Self::Circle { id, reference },
            AnnotationKind::Point => Self::Point {
                id,
                reference,
                clustered,
            },
            AnnotationKind::Polygon => Self::Polygon { id, reference },
            AnnotationKind::Polyline => Self::Polyline { id, reference },
        }
    }

    pub fn id(&self) -> &str {
        match self {
            Self::Circle { id, .. }
            | Self::Point { id, .. }
            | Self::Polygon { id, .. }
            | Self::Polyline { id, .. } => id,
        }
    }

    pub fn kind(&self) -> AnnotationKind {
        match self {
            Self::Circle { .. } => AnnotationKind::Circle,
            Self::Point { .. } => AnnotationKind::Point,
            Self::Polygon { .. } => AnnotationKind::Polygon,
            Self::Polyline { .. } => AnnotationKind::Polyline,
        }
    }

    pub fn reference(&self) -> ManagerRef {
        match self {
            Self::Circle { reference, .. }
            | Self::Point { reference, .. }
            | Self::Polygon { reference, .. }
            | Self::Polyline { reference, .. } => *reference,
        }
    }
}

/// Generated identifiers tried at one length before the next, longer length is used
const ATTEMPTS_PER_LENGTH: usize = 8;

/// A simple-form UUID has 32 hex digits
const MAX_ID_LENGTH: usize = 32;

/// A registered manager together with what it was created from
#[derive(Debug)]
struct Entry {
    handle: AnnotationManagerHandle,
    spec: ManagerSpec,
}

/// Registry of live annotation managers for one map
#[derive(Debug)]
pub struct ManagerRegistry<E: MapEngine> {
    engine: E,
    managers: HashMap<String, Entry>,
    policy: DuplicateIdPolicy,
    generated_id_length: usize,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<E: MapEngine> ManagerRegistry<E> {
    pub fn new(engine: E, config: &BridgeConfig) -> Self {
        Self {
            engine,
            managers: HashMap::new(),
            policy: config.duplicate_id_policy,
            generated_id_length: config.generated_id_length.clamp(1, MAX_ID_LENGTH),
        }
    }

    /// Create a manager and register it, returning its identifier
    ///
    /// Without an `id`, a short random identifier is generated. `below_layer_id` is only
    /// forwarded when the layer exists in the current style. If the engine fails, the registry
    /// is left as it was; a manager being replaced is re-created from its original spec.
    pub fn create(
        &mut self,
        kind: AnnotationKind,
        id: Option<String>,
        below_layer_id: Option<&str>,
        cluster_options: Option<ClusterOptions>,
    ) -> Result<String> {
        let id = match id {
            Some(id) => {
                if self.managers.contains_key(&id) && self.policy == DuplicateIdPolicy::Reject {
                    return Err(BridgeError::DuplicateIdentifier(id));
                }
                id
            }
            None => self.generate_id()?,
        };

        let below_layer_id = below_layer_id
            .filter(|layer| {
                let exists = self.engine.layer_exists(layer);
                if !exists {
                    tracing::debug!("Layer `{layer}` not in style, placing `{id}` on top");
                }
                exists
            })
            .map(str::to_string);

        // Clustering only applies to point managers
        let cluster_options = cluster_options.filter(|_| kind == AnnotationKind::Point);

        let spec = ManagerSpec {
            id: id.clone(),
            kind,
            below_layer_id,
            cluster_options,
        };

        // Only reachable under `Replace`: the engine needs the identifier free again
        let replaced = self.managers.remove(&id);
        if let Some(entry) = &replaced {
            tracing::debug!("Replacing {} annotation manager `{id}`", entry.handle.kind());
            self.engine.remove_manager(&id);
        }

        match self.engine.create_manager(&spec) {
            Ok(reference) => {
                tracing::debug!("Created {kind} annotation manager `{id}`");
                self.insert(spec, reference);
                Ok(id)
            }
            Err(e) => {
                if let Some(entry) = replaced {
                    self.restore(entry.spec);
                }
                Err(e.into())
            }
        }
    }

    fn insert(&mut self, spec: ManagerSpec, reference: ManagerRef) {
        let handle = AnnotationManagerHandle::new(
            spec.kind,
            spec.id.clone(),
            reference,
            spec.cluster_options.is_some(),
        );
        self.managers
            .insert(spec.id.clone(), Entry { handle, spec });
    }

    /// Bring back a manager disposed by a replacement that the engine then refused
    fn restore(&mut self, spec: ManagerSpec) {
        match self.engine.create_manager(&spec) {
            Ok(reference) => {
                tracing::debug!("Restored {} annotation manager `{}`", spec.kind, spec.id);
                self.insert(spec, reference);
            }
            Err(e) => tracing::warn!("Could not restore annotation manager `{}`: {e}", spec.id),
        }
    }

    /// Look up a live manager
    pub fn lookup(&self, id: &str) -> Result<&AnnotationManagerHandle> {
        self.managers
            .get(id)
            .map(|entry| &entry.handle)
            .ok_or_else(|| BridgeError::ManagerNotFound(id.to_string()))
    }

    /// Look up a live manager that must be of `kind`
    pub fn lookup_as(&self, id: &str, kind: AnnotationKind) -> Result<&AnnotationManagerHandle> {
        let handle = self.lookup(id)?;
        if handle.kind() != kind {
            return Err(BridgeError::WrongManagerType {
                id: id.to_string(),
                expected: kind,
                actual: handle.kind(),
            });
        }
        Ok(handle)
    }

    /// Whether a manager is registered under `id`
    pub fn contains(&self, id: &str) -> bool {
        self.managers.contains_key(id)
    }

    /// Dispose and unregister a manager; unknown identifiers are ignored
    pub fn remove(&mut self, id: &str) {
        match self.managers.remove(id) {
            Some(entry) => {
                self.engine.remove_manager(id);
                tracing::debug!("Removed {} annotation manager `{id}`", entry.handle.kind());
            }
            None => tracing::debug!("No annotation manager `{id}` to remove"),
        }
    }

    /// Dispose every live manager
    pub fn remove_all(&mut self) {
        let ids: Vec<String> = self.managers.keys().cloned().collect();
        for id in ids {
            self.remove(&id);
        }
    }

    pub fn len(&self) -> usize {
        self.managers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// Identifiers of live managers, sorted
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.managers.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    /// Engine access for state the registry does not track, such as style layers
    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    pub fn into_engine(self) -> E {
        self.engine
    }

    /// A random identifier not in use, growing longer when short ones keep colliding
    fn generate_id(&self) -> Result<String> {
        let lengths = self.generated_id_length..=MAX_ID_LENGTH;
        let attempts = lengths.clone().count() * ATTEMPTS_PER_LENGTH;
        for length in lengths {
            for _ in 0..ATTEMPTS_PER_LENGTH {
                let mut id = uuid::Uuid::new_v4().simple().to_string();
                id.truncate(length);
                if !self.managers.contains_key(&id) {
                    return Ok(id);
                }
            }
        }
        Err(BridgeError::IdSpaceExhausted(attempts))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{EngineError, InMemoryEngine};

    fn registry() -> ManagerRegistry<InMemoryEngine> {
        ManagerRegistry::new(
            InMemoryEngine::new().with_layer("water"),
            &BridgeConfig::default(),
        )
    }

    fn replacing_registry() -> ManagerRegistry<InMemoryEngine> {
        let config = BridgeConfig {
            duplicate_id_policy: DuplicateIdPolicy::Replace,
            ..BridgeConfig::default()
        };
        ManagerRegistry::new(InMemoryEngine::new(), &config)
    }

    #[test]
    fn test_create_with_id() {
        let mut registry = registry();
        let id = registry
            .create(AnnotationKind::Circle, Some("circles".to_string()), None, None)
            .unwrap();
        assert_eq!(id, "circles");

        let handle = registry.lookup("circles").unwrap();
        assert_eq!(handle.kind(), AnnotationKind::Circle);
        assert_eq!(handle.id(), "circles");
        assert_eq!(registry.engine().manager_count(), 1);
    }

    #[test]
    fn test_generated_ids_are_short_and_distinct() {
        let mut registry = registry();
        let first = registry
            .create(AnnotationKind::Polygon, None, None, None)
            .unwrap();
        let second = registry
            .create(AnnotationKind::Polygon, None, None, None)
            .unwrap();

        assert_eq!(first.len(), 5);
        assert_eq!(second.len(), 5);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(first, second);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_generated_id_length_from_config() {
        let config = BridgeConfig {
            generated_id_length: 12,
            ..BridgeConfig::default()
        };
        let mut registry = ManagerRegistry::new(InMemoryEngine::new(), &config);
        let id = registry
            .create(AnnotationKind::Circle, None, None, None)
            .unwrap();
        assert_eq!(id.len(), 12);
    }

    #[test]
    fn test_lookup_unknown_fails() {
        let registry = registry();
        assert_eq!(
            registry.lookup("nope").unwrap_err(),
            BridgeError::ManagerNotFound("nope".to_string())
        );
    }

    #[test]
    fn test_remove_disposes_once() {
        let mut registry = registry();
        registry
            .create(AnnotationKind::Polyline, Some("lines".to_string()), None, None)
            .unwrap();

        registry.remove("lines");
        assert!(registry.lookup("lines").is_err());
        assert_eq!(registry.engine().removed_ids(), ["lines".to_string()]);

        // Second removal is a no-op and never reaches the engine
        registry.remove("lines");
        registry.remove("never-created");
        assert_eq!(registry.engine().removed_ids().len(), 1);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_below_layer_only_when_present() {
        let mut registry = registry();
        registry
            .create(AnnotationKind::Polygon, Some("a".to_string()), Some("water"), None)
            .unwrap();
        registry
            .create(AnnotationKind::Polygon, Some("b".to_string()), Some("labels"), None)
            .unwrap();

        let engine = registry.engine();
        assert_eq!(
            engine.manager("a").unwrap().below_layer_id.as_deref(),
            Some("water")
        );
        assert_eq!(engine.manager("b").unwrap().below_layer_id, None);
    }

    #[test]
    fn test_cluster_options_only_for_points() {
        let mut registry = registry();
        registry
            .create(
                AnnotationKind::Point,
                Some("points".to_string()),
                None,
                Some(ClusterOptions::default()),
            )
            .unwrap();
        registry
            .create(
                AnnotationKind::Circle,
                Some("circles".to_string()),
                None,
                Some(ClusterOptions::default()),
            )
            .unwrap();

        assert!(matches!(
            registry.lookup("points").unwrap(),
            AnnotationManagerHandle::Point {
                clustered: true,
                ..
            }
        ));
        assert!(registry.engine().manager("points").unwrap().cluster_options.is_some());
        assert!(registry.engine().manager("circles").unwrap().cluster_options.is_none());
    }

    #[test]
    fn test_engine_failure_registers_nothing() {
        let mut registry = registry();
        registry.engine_mut().fail_next_create("style not loaded");

        let error = registry
            .create(AnnotationKind::Circle, Some("circles".to_string()), None, None)
            .unwrap_err();
        assert_eq!(
            error,
            BridgeError::Engine(EngineError::ManagerCreation("style not loaded".to_string()))
        );
        assert!(registry.is_empty());
        assert_eq!(registry.engine().manager_count(), 0);
    }

    #[test]
    fn test_duplicate_id_rejected() {
        let mut registry = registry();
        registry
            .create(AnnotationKind::Circle, Some("dup".to_string()), None, None)
            .unwrap();
        let before = registry.lookup("dup").unwrap().clone();

        let error = registry
            .create(AnnotationKind::Polygon, Some("dup".to_string()), None, None)
            .unwrap_err();
        assert_eq!(error, BridgeError::DuplicateIdentifier("dup".to_string()));
        assert_eq!(registry.lookup("dup").unwrap(), &before);
        assert!(registry.engine().removed_ids().is_empty());
    }

    #[test]
    fn test_duplicate_id_replaced() {
        let mut registry = replacing_registry();
        registry
            .create(AnnotationKind::Circle, Some("dup".to_string()), None, None)
            .unwrap();
        let old_reference = registry.lookup("dup").unwrap().reference();

        registry
            .create(AnnotationKind::Polygon, Some("dup".to_string()), None, None)
            .unwrap();
        let handle = registry.lookup("dup").unwrap();
        assert_eq!(handle.kind(), AnnotationKind::Polygon);
        assert_ne!(handle.reference(), old_reference);
        assert_eq!(registry.engine().removed_ids(), ["dup".to_string()]);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_failed_replace_restores_old_manager() {
        let mut registry = replacing_registry();
        registry
            .create(AnnotationKind::Circle, Some("dup".to_string()), None, None)
            .unwrap();
        registry.engine_mut().fail_next_create("style not loaded");

        let error = registry
            .create(AnnotationKind::Polygon, Some("dup".to_string()), None, None)
            .unwrap_err();
        assert_eq!(
            error,
            BridgeError::Engine(EngineError::ManagerCreation("style not loaded".to_string()))
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.lookup("dup").unwrap().kind(), AnnotationKind::Circle);
        assert_eq!(registry.engine().manager_count(), 1);
        assert_eq!(
            registry.engine().manager("dup").unwrap().kind,
            AnnotationKind::Circle
        );
    }

    #[test]
    fn test_short_generated_ids_grow_instead_of_spinning() {
        let config = BridgeConfig {
            generated_id_length: 1,
            ..BridgeConfig::default()
        };
        let mut registry = ManagerRegistry::new(InMemoryEngine::new(), &config);
        // One hex digit only has room for 16 managers
        for _ in 0..40 {
            registry
                .create(AnnotationKind::Circle, None, None, None)
                .unwrap();
        }
        assert_eq!(registry.len(), 40);
        assert_eq!(registry.engine().manager_count(), 40);
        assert!(registry.ids().iter().any(|id| id.len() > 1));
        assert!(registry.ids().iter().all(|id| id.len() <= 32));
    }

    #[test]
    fn test_lookup_as_checks_kind() {
        let mut registry = registry();
        registry
            .create(AnnotationKind::Polygon, Some("zones".to_string()), None, None)
            .unwrap();

        assert_eq!(
            registry
                .lookup_as("zones", AnnotationKind::Polygon)
                .unwrap()
                .id(),
            "zones"
        );
        assert_eq!(
            registry
                .lookup_as("zones", AnnotationKind::Point)
                .unwrap_err(),
            BridgeError::WrongManagerType {
                id: "zones".to_string(),
                expected: AnnotationKind::Point,
                actual: AnnotationKind::Polygon,
            }
        );
        assert_eq!(
            registry
                .lookup_as("missing", AnnotationKind::Point)
                .unwrap_err(),
            BridgeError::ManagerNotFound("missing".to_string())
        );
    }

    #[test]
    fn test_remove_all() {
        let mut registry = registry();
        for kind in AnnotationKind::ALL {
            registry.create(kind, None, None, None).unwrap();
        }
        assert_eq!(registry.ids().len(), 4);

        registry.remove_all();
        assert!(registry.is_empty());
        assert_eq!(registry.engine().manager_count(), 0);
        assert_eq!(registry.engine().removed_ids().len(), 4);
    }
}
