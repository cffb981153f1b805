use crate::replay::ReplayError;
use clap::{Parser, ValueEnum};
use map_bridge_lib::{BridgeConfig, DuplicateIdPolicy};
use std::path::PathBuf;

/// Command-line spelling of [`DuplicateIdPolicy`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DuplicateIds {
    Reject,
    Replace,
}

impl From<DuplicateIds> for DuplicateIdPolicy {
    fn from(value: DuplicateIds) -> Self {
        match value {
            DuplicateIds::Reject => DuplicateIdPolicy::Reject,
            DuplicateIds::Replace => DuplicateIdPolicy::Replace,
        }
    }
}

#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
/// Map Bridge - Replays host calls, annotation taps and map events against an in-memory map
pub struct Settings {
    /// JSON-lines script to replay (stdin when omitted)
    #[clap(value_name = "SCRIPT")]
    pub script: Option<PathBuf>,

    /// Bridge configuration JSON file; command-line options override its values
    #[clap(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Map instance index, appended to every outbound channel as `/map_<index>`
    #[clap(long, default_value = "0")]
    pub map_index: u32,

    /// Length of generated manager identifiers (1-32)
    #[clap(long)]
    pub id_length: Option<usize>,

    /// What to do when a caller reuses a live manager identifier
    #[clap(long, value_enum)]
    pub duplicate_ids: Option<DuplicateIds>,

    /// Map events forwarded from the start (style-loaded, render-frame-started)
    #[clap(short, long = "event", value_name = "EVENT")]
    pub events: Vec<String>,

    /// Pretty-print output records
    #[clap(long, default_value = "false")]
    pub pretty: bool,
}

impl Settings {
    pub fn from_cli() -> Self {
        Settings::parse()
    }

    /// Merge the config file (if any) with command-line overrides
    pub fn bridge_config(&self) -> Result<BridgeConfig, ReplayError> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)?;
                serde_json::from_str(&text).map_err(|source| ReplayError::Config {
                    path: path.clone(),
                    source,
                })?
            }
            None => BridgeConfig::default(),
        };

        if let Some(length) = self.id_length {
            config.generated_id_length = length;
        }
        if let Some(policy) = self.duplicate_ids {
            config.duplicate_id_policy = policy.into();
        }
        for event in &self.events {
            if !config.event_types.contains(event) {
                config.event_types.push(event.clone());
            }
        }
        Ok(config)
    }
}
