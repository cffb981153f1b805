//! Map Bridge Library - Command and Event Bridge for Map Annotation Managers
//!
//! This library sits between a host application and a map engine's native annotation and
//! query subsystems. Inbound, it turns loosely-typed remote invocations (a method name plus a
//! JSON argument bag) into typed commands against a registry of annotation managers. Outbound,
//! it turns engine callbacks (annotation taps, map lifecycle events) into serialized payloads
//! for the host.
//!
//! # Architecture
//!
//! - **[`expression`]**: Decodes JSON style-expression text into an [`Expression`] tree
//! - **[`ClusterOptions`]**: Point clustering configuration built from an untyped option bag
//! - **[`MapEngine`]**: The engine interface the bridge drives, with [`InMemoryEngine`] as a
//!   complete stand-in
//! - **[`ManagerRegistry`]**: Identifier to [`AnnotationManagerHandle`] mapping, kept in sync
//!   with the engine
//! - **[`Dispatcher`]**: Validates a [`MethodCall`] into a [`Command`] and executes it
//! - **[`EventRouter`]**: Sends the topmost tapped annotation to the matching listener
//! - **[`MapSession`]**: One per map instance; owns all of the above
//!
//! # Threading
//!
//! A session lives on the map's owner thread. Nothing in here takes a lock; asynchronous engine
//! work completes through a single-shot [`Completion`].

pub mod annotation;
pub mod cluster;
pub mod command;
pub mod completion;
pub mod config;
pub mod dispatcher;
pub mod engine;
pub mod expression;
pub mod map_events;
pub mod registry;
pub mod router;
pub mod session;
pub mod transport;

// Public API exports
pub use annotation::{Annotation, AnnotationKind, NativeAnnotation};
pub use cluster::ClusterOptions;
pub use command::{Command, CreateManager, MethodCall};
pub use completion::{Completion, PendingReply};
pub use config::{BridgeConfig, DuplicateIdPolicy};
pub use dispatcher::{Dispatcher, Reply};
pub use engine::{
    ClusterQuery, EngineError, FeatureExtensionValue, InMemoryEngine, ManagerRef, ManagerSpec,
    MapEngine,
};
pub use expression::{Expression, StyleColor, StyleValue};
pub use map_events::{EventSubscriptions, MapEvent, MapEventKind};
pub use registry::{AnnotationManagerHandle, ManagerRegistry};
pub use router::{EventRouter, ListenerTable, RouteOutcome};
pub use session::MapSession;
pub use transport::{ChannelMessenger, Messenger, OutboundMessage, RecordingMessenger};

use serde::{Deserialize, Serialize};

/// Error types for the bridge
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BridgeError {
    #[error("Unsupported annotation manager type: {0}")]
    UnsupportedKind(String),

    #[error("No annotation manager registered with id `{0}`")]
    ManagerNotFound(String),

    #[error("Malformed expression{}: {reason}", field_suffix(.field))]
    MalformedExpression {
        field: Option<String>,
        reason: String,
    },

    #[error("Missing required argument `{0}`")]
    MissingArgument(String),

    #[error("Invalid argument `{name}`: expected {expected}")]
    InvalidArgument { name: String, expected: &'static str },

    #[error("An annotation manager with id `{0}` already exists")]
    DuplicateIdentifier(String),

    #[error("Annotation manager `{id}` is a {actual} manager, expected {expected}")]
    WrongManagerType {
        id: String,
        expected: AnnotationKind,
        actual: AnnotationKind,
    },

    #[error("No free manager identifier found after {0} attempts")]
    IdSpaceExhausted(usize),

    #[error("Method not implemented: {0}")]
    MethodNotImplemented(String),

    #[error("Unsupported map event type: {0}")]
    UnsupportedEvent(String),

    #[error("Engine error: {0}")]
    Engine(#[from] EngineError),

    #[error("Engine dropped the completion without replying")]
    CompletionDropped,
}

impl BridgeError {
    pub(crate) fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedExpression {
            field: None,
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_argument(name: impl Into<String>, expected: &'static str) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            expected,
        }
    }

    /// Attach the argument name an expression came from
    pub(crate) fn for_field(self, name: &str) -> Self {
        match self {
            Self::MalformedExpression { reason, .. } => Self::MalformedExpression {
                field: Some(name.to_string()),
                reason,
            },
            other => other,
        }
    }

    /// Stable error code reported to the host
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnsupportedKind(_) => "unsupportedKind",
            Self::ManagerNotFound(_) => "managerNotFound",
            Self::MalformedExpression { .. } => "malformedExpression",
            Self::MissingArgument(_) => "missingArgument",
            Self::InvalidArgument { .. } => "invalidArgument",
            Self::DuplicateIdentifier(_) => "duplicateIdentifier",
            Self::WrongManagerType { .. } => "wrongManagerType",
            Self::IdSpaceExhausted(_) => "idSpaceExhausted",
            Self::MethodNotImplemented(_) => "methodNotImplemented",
            Self::UnsupportedEvent(_) => "unsupportedEvent",
            Self::Engine(_) => "engineError",
            Self::CompletionDropped => "completionDropped",
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;

fn field_suffix(field: &Option<String>) -> String {
    field
        .as_ref()
        .map(|field| format!(" in `{field}`"))
        .unwrap_or_default()
}

/// Error payload sent back across the boundary for a failed call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorReply {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl From<&BridgeError> for ErrorReply {
    fn from(error: &BridgeError) -> Self {
        let details = match error {
            BridgeError::MalformedExpression {
                field: Some(field), ..
            } => Some(serde_json::json!({ "field": field })),
            BridgeError::InvalidArgument { name, .. } => Some(serde_json::json!({ "argument": name })),
            BridgeError::MissingArgument(name) => Some(serde_json::json!({ "argument": name })),
            BridgeError::WrongManagerType { id, actual, .. } => {
                Some(serde_json::json!({ "managerId": id, "type": actual.as_str() }))
            }
            _ => None,
        };
        Self {
            code: error.code().to_string(),
            message: error.to_string(),
            details,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_public_exports() {
        let _: fn(InMemoryEngine, RecordingMessenger, &BridgeConfig) -> MapSession<_, _> =
            MapSession::new;
        let _: fn() -> BridgeConfig = BridgeConfig::default;
    }

    #[test]
    fn test_malformed_expression_message_names_field() {
        let error = BridgeError::malformed("unexpected end of input").for_field("textSizeExpression");
        assert_eq!(
            error.to_string(),
            "Malformed expression in `textSizeExpression`: unexpected end of input"
        );

        let bare = BridgeError::malformed("empty array");
        assert_eq!(bare.to_string(), "Malformed expression: empty array");
    }

    #[test]
    fn test_error_reply_carries_code_and_details() {
        let reply = ErrorReply::from(&BridgeError::MissingArgument("type".to_string()));
        assert_eq!(reply.code, "missingArgument");
        assert_eq!(reply.details, Some(serde_json::json!({ "argument": "type" })));

        let reply = ErrorReply::from(&BridgeError::UnsupportedKind("hexagon".to_string()));
        assert_eq!(reply.code, "unsupportedKind");
        assert!(reply.message.contains("hexagon"));
        assert!(reply.details.is_none());
    }

    #[test]
    fn test_wrong_manager_type_reply() {
        let error = BridgeError::WrongManagerType {
            id: "zones".to_string(),
            expected: AnnotationKind::Point,
            actual: AnnotationKind::Polygon,
        };
        assert_eq!(
            error.to_string(),
            "Annotation manager `zones` is a polygon manager, expected point"
        );
        let reply = ErrorReply::from(&error);
        assert_eq!(reply.code, "wrongManagerType");
        assert_eq!(
            reply.details,
            Some(serde_json::json!({ "managerId": "zones", "type": "polygon" }))
        );
    }

    #[test]
    fn test_for_field_leaves_other_errors_alone() {
        let error = BridgeError::CompletionDropped.for_field("circleColorExpression");
        assert_eq!(error, BridgeError::CompletionDropped);
    }
}
