//! Dispatcher - Executes validated commands against the registry and engine

use crate::annotation::AnnotationKind;
use crate::command::{Command, CreateManager, MethodCall};
use crate::completion::{self, PendingReply};
use crate::engine::MapEngine;
use crate::map_events::EventSubscriptions;
use crate::registry::ManagerRegistry;
use crate::Result;
use serde_json::Value;

/// Result of a successful call
#[derive(Debug)]
pub enum Reply {
    /// Answered immediately
    Success(Value),
    /// Answered once the engine completes
    Deferred(PendingReply),
}

impl Reply {
    /// Resolve to the final value, waiting on deferred work
    pub async fn resolve(self) -> Result<Value> {
        match self {
            Reply::Success(value) => Ok(value),
            Reply::Deferred(pending) => pending.wait().await,
        }
    }
}

/// Routes inbound calls for one map
#[derive(Debug)]
pub struct Dispatcher<E: MapEngine> {
    registry: ManagerRegistry<E>,
    subscriptions: EventSubscriptions,
}

#[cfg_attr(feature = "profiling", profiling::all_functions)]
impl<E: MapEngine> Dispatcher<E> {
    pub fn new(registry: ManagerRegistry<E>) -> Self {
        Self {
            registry,
            subscriptions: EventSubscriptions::new(),
        }
    }

    /// Validate and execute one call
    ///
    /// Validation failures return before the registry or engine is touched.
    pub fn dispatch(&mut self, call: &MethodCall) -> Result<Reply> {
        let command = Command::parse(call).inspect_err(|e| {
            tracing::debug!("Rejected `{}`: {e}", call.method);
        })?;
        self.execute(command)
    }

    pub fn execute(&mut self, command: Command) -> Result<Reply> {
        match command {
            Command::CreateManager(CreateManager {
                kind,
                id,
                below_layer_id,
                cluster_options,
            }) => {
                let id =
                    self.registry
                        .create(kind, id, below_layer_id.as_deref(), cluster_options)?;
                Ok(Reply::Success(Value::String(id)))
            }
            Command::RemoveManager { id } => {
                self.registry.remove(&id);
                Ok(Reply::Success(Value::Null))
            }
            Command::Subscribe(kind) => {
                self.subscriptions.subscribe(kind);
                Ok(Reply::Success(Value::Null))
            }
            Command::SetStyleImportConfigProperty {
                import_id,
                config,
                value,
            } => {
                self.registry
                    .engine_mut()
                    .set_style_import_config_property(&import_id, &config, &value)?;
                Ok(Reply::Success(Value::Null))
            }
            Command::QueryRenderedFeatures { geometry, options } => {
                let (completion, pending) = completion::channel();
                self.registry
                    .engine_mut()
                    .query_rendered_features(geometry, options, completion);
                Ok(Reply::Deferred(pending))
            }
            Command::QuerySourceFeatures { source_id, options } => {
                let (completion, pending) = completion::channel();
                self.registry
                    .engine_mut()
                    .query_source_features(&source_id, options, completion);
                Ok(Reply::Deferred(pending))
            }
            Command::QueryCluster {
                source_id,
                cluster,
                query,
            } => {
                // An annotation manager's source shares its identifier; only points cluster
                if self.registry.contains(&source_id) {
                    self.registry.lookup_as(&source_id, AnnotationKind::Point)?;
                }
                let (completion, pending) = completion::channel();
                self.registry
                    .engine_mut()
                    .query_cluster(&source_id, &cluster, query, completion);
                Ok(Reply::Deferred(pending))
            }
        }
    }

    pub fn registry(&self) -> &ManagerRegistry<E> {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ManagerRegistry<E> {
        &mut self.registry
    }

    pub fn subscriptions(&self) -> &EventSubscriptions {
        &self.subscriptions
    }

    pub fn subscriptions_mut(&mut self) -> &mut EventSubscriptions {
        &mut self.subscriptions
    }

    pub fn into_registry(self) -> ManagerRegistry<E> {
        self.registry
    }
}
