//! Script replay against an in-memory map
//!
//! A script is JSON lines, one step per line:
//!
//! ```text
//! {"layer": "water"}
//! {"feature": {"layer": "poi", "position": [10, 10], "source": "composite", "feature": {...}, "state": {}}}
//! {"cluster": {"source": "points", "clusterId": 1, "expansionZoom": 9, "children": [...], "leaves": [...]}}
//! {"call": {"method": "annotation#create_manager", "arguments": {"type": "point"}}}
//! {"tap": [{"type": "point", "id": "p1", "managerId": "...", "point": {"x": 2.35, "y": 48.85}}]}
//! {"event": {"type": "style-loaded", "begin": 1700000000, "end": 1700000001}}
//! ```
//!
//! Blank lines and lines starting with `#` are skipped. Every step yields one or more
//! [`ReplayRecord`]s: call replies or errors, tap outcomes, and each message the bridge sent to the
//! host while handling the step.

use geo::Coord;
use map_bridge_lib::engine::QueriedFeature;
use map_bridge_lib::{
    BridgeConfig, ChannelMessenger, InMemoryEngine, MapEvent, MapSession, MethodCall,
    NativeAnnotation, RecordingMessenger, RouteOutcome,
};
use map_bridge_lib::ErrorReply;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::io::BufRead;
use std::path::PathBuf;
use std::rc::Rc;

/// Error types for the replay tool
#[derive(Debug, thiserror::Error)]
pub enum ReplayError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Line {line}: {source}")]
    Script {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid config file {}: {source}", path.display())]
    Config {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// A rendered feature placed on the in-memory map
#[derive(Debug, Deserialize)]
pub struct FeatureStep {
    pub layer: String,
    pub position: [f64; 2],
    #[serde(flatten)]
    pub feature: QueriedFeature,
}

/// A GeoJSON cluster of a source, answering cluster queries
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClusterStep {
    pub source: String,
    pub cluster_id: u64,
    pub expansion_zoom: f64,
    #[serde(default)]
    pub children: Vec<Value>,
    #[serde(default)]
    pub leaves: Vec<Value>,
}

/// One line of a replay script
#[derive(Debug, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScriptStep {
    Layer(String),
    Feature(FeatureStep),
    Cluster(ClusterStep),
    Call(MethodCall),
    Tap(Vec<NativeAnnotation>),
    Event(MapEvent),
}

/// Output of the replay, one JSON object per record
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ReplayRecord {
    Reply {
        line: usize,
        method: String,
        result: Value,
    },
    Error {
        line: usize,
        method: String,
        error: ErrorReply,
    },
    Tap {
        line: usize,
        outcome: String,
    },
    Event {
        line: usize,
        forwarded: bool,
    },
    Message {
        line: usize,
        channel: String,
        payload: Value,
    },
    TearDown {
        disposed: usize,
    },
}

type ReplaySession = MapSession<InMemoryEngine, ChannelMessenger<Rc<RecordingMessenger>>>;

/// Drives one map session through a script
pub struct Replay {
    session: ReplaySession,
    recorder: Rc<RecordingMessenger>,
}

impl Replay {
    pub fn new(config: &BridgeConfig, map_index: u32) -> Self {
        let recorder = Rc::new(RecordingMessenger::new());
        let messenger = ChannelMessenger::new(Rc::clone(&recorder), map_index);
        Self {
            session: MapSession::new(InMemoryEngine::new(), messenger, config),
            recorder,
        }
    }

    /// Replay every line of `reader`, stopping at the first unreadable line
    pub async fn run(&mut self, reader: impl BufRead) -> Result<Vec<ReplayRecord>, ReplayError> {
        let mut records = Vec::new();
        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            records.extend(self.run_line(index + 1, &line).await?);
        }
        Ok(records)
    }

    /// Replay a single script line
    pub async fn run_line(
        &mut self,
        line: usize,
        text: &str,
    ) -> Result<Vec<ReplayRecord>, ReplayError> {
        let text = text.trim();
        if text.is_empty() || text.starts_with('#') {
            return Ok(Vec::new());
        }
        let step: ScriptStep = serde_json::from_str(text)
            .map_err(|source| ReplayError::Script { line, source })?;

        let mut records = self.run_step(line, step).await;
        records.extend(self.recorder.take().into_iter().map(|message| {
            ReplayRecord::Message {
                line,
                channel: message.channel,
                payload: message.payload,
            }
        }));
        Ok(records)
    }

    async fn run_step(&mut self, line: usize, step: ScriptStep) -> Vec<ReplayRecord> {
        match step {
            ScriptStep::Layer(layer_id) => {
                tracing::debug!("Line {line}: adding layer `{layer_id}`");
                self.session.engine_mut().add_layer(layer_id);
                Vec::new()
            }
            ScriptStep::Feature(FeatureStep {
                layer,
                position: [x, y],
                feature,
            }) => {
                self.session
                    .engine_mut()
                    .add_feature(&layer, Coord { x, y }, feature);
                Vec::new()
            }
            ScriptStep::Cluster(ClusterStep {
                source,
                cluster_id,
                expansion_zoom,
                children,
                leaves,
            }) => {
                self.session.engine_mut().add_cluster(
                    &source,
                    cluster_id,
                    expansion_zoom,
                    children,
                    leaves,
                );
                Vec::new()
            }
            ScriptStep::Call(call) => {
                let result = match self.session.handle(&call) {
                    Ok(reply) => reply.resolve().await,
                    Err(e) => Err(e),
                };
                let record = match result {
                    Ok(result) => ReplayRecord::Reply {
                        line,
                        method: call.method,
                        result,
                    },
                    Err(e) => {
                        tracing::info!("Line {line}: `{}` failed: {e}", call.method);
                        ReplayRecord::Error {
                            line,
                            method: call.method,
                            error: ErrorReply::from(&e),
                        }
                    }
                };
                vec![record]
            }
            ScriptStep::Tap(annotations) => {
                let outcome = match self.session.on_annotations_tapped(&annotations) {
                    RouteOutcome::Delivered(kind) => format!("delivered:{kind}"),
                    RouteOutcome::NoListener(kind) => format!("noListener:{kind}"),
                    RouteOutcome::Unrecognized(type_name) => format!("unrecognized:{type_name}"),
                    RouteOutcome::Empty => "empty".to_string(),
                };
                vec![ReplayRecord::Tap { line, outcome }]
            }
            ScriptStep::Event(event) => vec![ReplayRecord::Event {
                line,
                forwarded: self.session.on_map_event(event),
            }],
        }
    }

    /// Tear the session down, disposing every remaining manager
    pub fn finish(self) -> ReplayRecord {
        let before = self.session.registry().len();
        let engine = self.session.tear_down();
        tracing::debug!("{} managers left in engine after teardown", engine.manager_count());
        ReplayRecord::TearDown { disposed: before }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn block_on<F: std::future::Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .unwrap()
            .block_on(future)
    }

    fn replay(script: &str, config: &BridgeConfig) -> Vec<ReplayRecord> {
        let mut replay = Replay::new(config, 0);
        let mut records = block_on(replay.run(script.as_bytes())).unwrap();
        records.push(replay.finish());
        records
    }

    #[test]
    fn test_create_tap_and_remove() {
        let script = r#"
# one clustered point manager
{"call": {"method": "annotation#create_manager", "arguments": {"type": "point", "id": "points", "clusterOptions": {"clusterRadius": 80}}}}
{"tap": [{"type": "point", "id": "p1", "managerId": "points", "point": {"x": 2.35, "y": 48.85}}]}
{"call": {"method": "annotation#remove_manager", "arguments": {"id": "points"}}}
"#;
        let records = replay(script, &BridgeConfig::default());

        assert_eq!(
            records[0],
            ReplayRecord::Reply {
                line: 3,
                method: "annotation#create_manager".to_string(),
                result: json!("points"),
            }
        );
        assert_eq!(
            records[1],
            ReplayRecord::Tap {
                line: 4,
                outcome: "delivered:point".to_string(),
            }
        );
        let ReplayRecord::Message { channel, payload, .. } = &records[2] else {
            panic!("expected the forwarded tap, got {:?}", records[2]);
        };
        assert_eq!(channel, "annotation#on_point_annotation_click/map_0");
        assert_eq!(payload["geometry"], json!([2.35, 48.85]));
        assert_eq!(
            records[3],
            ReplayRecord::Reply {
                line: 5,
                method: "annotation#remove_manager".to_string(),
                result: Value::Null,
            }
        );
        assert_eq!(records[4], ReplayRecord::TearDown { disposed: 0 });
    }

    #[test]
    fn test_errors_are_records() {
        let script = r#"{"call": {"method": "annotation#create_manager", "arguments": {"type": "hexagon"}}}"#;
        let records = replay(script, &BridgeConfig::default());

        let ReplayRecord::Error { error, .. } = &records[0] else {
            panic!("expected an error record");
        };
        assert_eq!(error.code, "unsupportedKind");
    }

    #[test]
    fn test_query_and_events() {
        let script = r#"
{"feature": {"layer": "poi", "position": [10, 10], "source": "composite", "feature": {"type": "Feature", "properties": {"class": "cafe"}}, "state": {}}}
{"call": {"method": "queryRenderedFeatures", "arguments": {"geometry": {"type": "screenCoordinate", "value": "[10, 10]"}}}}
{"event": {"type": "style-loaded", "begin": 1, "end": 2}}
{"event": {"type": "render-frame-started", "begin": 3, "end": 4}}
"#;
        let config = BridgeConfig {
            event_types: vec!["style-loaded".to_string()],
            ..BridgeConfig::default()
        };
        let records = replay(script, &config);

        let ReplayRecord::Reply { result, .. } = &records[0] else {
            panic!("expected a query reply");
        };
        assert_eq!(result[0]["source"], json!("composite"));
        assert_eq!(records[1], ReplayRecord::Event { line: 4, forwarded: true });
        assert_eq!(
            records[2],
            ReplayRecord::Message {
                line: 4,
                channel: "event#style-loaded/map_0".to_string(),
                payload: json!(r#"{"begin":1,"end":2}"#),
            }
        );
        assert_eq!(records[3], ReplayRecord::Event { line: 5, forwarded: false });
    }

    #[test]
    fn test_cluster_queries() {
        let script = r#"
{"cluster": {"source": "stops", "clusterId": 4, "expansionZoom": 12, "leaves": [{"type": "Feature", "id": 1}, {"type": "Feature", "id": 2}]}}
{"call": {"method": "getGeoJsonClusterLeaves", "arguments": {"sourceIdentifier": "stops", "cluster": {"properties": {"cluster_id": 4}}, "offset": 1}}}
{"call": {"method": "getGeoJsonClusterExpansionZoom", "arguments": {"sourceIdentifier": "stops", "cluster": {"properties": {"cluster_id": 5}}}}}
"#;
        let records = replay(script, &BridgeConfig::default());

        let ReplayRecord::Reply { result, .. } = &records[0] else {
            panic!("expected a leaves reply, got {:?}", records[0]);
        };
        assert_eq!(result, &json!({ "featureCollection": [{ "type": "Feature", "id": 2 }] }));

        let ReplayRecord::Error { line, error, .. } = &records[1] else {
            panic!("expected an error record, got {:?}", records[1]);
        };
        assert_eq!(*line, 4);
        assert_eq!(error.code, "engineError");
    }

    #[test]
    fn test_teardown_counts_live_managers() {
        let script = r#"
{"layer": "water"}
{"call": {"method": "annotation#create_manager", "arguments": {"type": "polygon", "belowLayerId": "water"}}}
{"call": {"method": "annotation#create_manager", "arguments": {"type": "circle"}}}
"#;
        let records = replay(script, &BridgeConfig::default());
        assert_eq!(records.last(), Some(&ReplayRecord::TearDown { disposed: 2 }));
    }

    #[test]
    fn test_bad_line_reports_line_number() {
        let mut replay = Replay::new(&BridgeConfig::default(), 0);
        let error = block_on(replay.run("\n{\"call\": 5}\n".as_bytes())).unwrap_err();
        assert!(matches!(error, ReplayError::Script { line: 2, .. }));
    }
}
