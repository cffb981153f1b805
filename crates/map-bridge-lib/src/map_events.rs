//! Map lifecycle events forwarded to the host

use crate::transport::Messenger;
use crate::BridgeError;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum MapEventKind {
    StyleLoaded,
    RenderFrameStarted,
}

impl MapEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MapEventKind::StyleLoaded => "style-loaded",
            MapEventKind::RenderFrameStarted => "render-frame-started",
        }
    }

    /// Outbound channel, e.g. `event#style-loaded`
    pub fn channel(&self) -> String {
        format!("event#{}", self.as_str())
    }
}

impl fmt::Display for MapEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MapEventKind {
    type Err = BridgeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "style-loaded" => Ok(MapEventKind::StyleLoaded),
            "render-frame-started" => Ok(MapEventKind::RenderFrameStarted),
            other => Err(BridgeError::UnsupportedEvent(other.to_string())),
        }
    }
}

/// A lifecycle event reported by the engine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MapEvent {
    #[serde(rename = "type")]
    pub kind: MapEventKind,
    /// Unix seconds
    pub begin: i64,
    /// Unix seconds
    pub end: i64,
}

/// Which lifecycle events reach the host
#[derive(Debug, Clone, Default)]
pub struct EventSubscriptions {
    kinds: HashSet<MapEventKind>,
}

impl EventSubscriptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a kind; subscribing twice has no further effect
    pub fn subscribe(&mut self, kind: MapEventKind) {
        if self.kinds.insert(kind) {
            tracing::debug!("Subscribed to `{kind}` events");
        }
    }

    pub fn is_subscribed(&self, kind: MapEventKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Send the event if subscribed, returning whether it was sent
    ///
    /// The payload is a JSON string holding `{"begin":..,"end":..}`.
    pub fn forward(&self, event: &MapEvent, messenger: &impl Messenger) -> bool {
        if !self.is_subscribed(event.kind) {
            tracing::trace!("Dropping unsubscribed `{}` event", event.kind);
            return false;
        }
        let payload = json!({ "begin": event.begin, "end": event.end }).to_string();
        messenger.send(&event.kind.channel(), Value::String(payload));
        true
    }
}
