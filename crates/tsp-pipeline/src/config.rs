//! Declarative pipeline configuration, parsed from JSON. Deliberately does
//! not parse command-line argument syntax itself: `args` is already a
//! vector of strings, handed to each plugin's `configure`.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::error::{PipelineError, PipelineResult};
use crate::plugin::PluginKind;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageConfig {
    pub name: String,
    pub kind: PluginKind,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub packet_timeout_ms: Option<u64>,
    #[serde(default)]
    pub pin_core: Option<usize>,
}

impl StageConfig {
    pub fn packet_timeout(&self) -> Option<Duration> {
        self.packet_timeout_ms.map(Duration::from_millis)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineConfig {
    pub buffer_capacity: usize,
    pub stages: Vec<StageConfig>,
}

impl PipelineConfig {
    pub fn from_json_str(s: &str) -> PipelineResult<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_path(path: impl AsRef<Path>) -> PipelineResult<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Checks stage count and the Input-first/Output-last/Processor-middle
    /// shape before a pipeline is actually built from this config.
    pub fn validate(&self) -> PipelineResult<()> {
        if self.stages.len() < 3 {
            return Err(PipelineError::TooFewStages(self.stages.len()));
        }
        if self.buffer_capacity == 0 {
            return Err(PipelineError::InvalidBufferCapacity);
        }
        let n = self.stages.len();
        for (i, stage) in self.stages.iter().enumerate() {
            let expected = if i == 0 {
                PluginKind::Input
            } else if i == n - 1 {
                PluginKind::Output
            } else {
                PluginKind::Processor
            };
            if stage.kind != expected {
                return Err(PipelineError::StageKindMismatch {
                    index: i,
                    name: stage.name.clone(),
                    found: stage.kind,
                    expected,
                });
            }
        }
        Ok(())
    }
}
