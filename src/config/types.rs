use crate::model::Perspective;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::defaults::*;

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct Config {
    #[serde(default = "default_version")]
    pub version: u32,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    /// SQLite database path.
    #[serde(default = "default_database")]
    pub database: PathBuf,

    /// Heartbeat interval for streaming responses.
    #[serde(default = "default_keepalive_secs")]
    pub keepalive_secs: u64,

    /// Max perspectives in flight at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,

    /// Delay between worker launches, to avoid burst rate limits upstream.
    #[serde(default = "default_launch_delay_ms")]
    pub launch_delay_ms: u64,

    #[serde(default)]
    pub generation: GenerationConfig,

    #[serde(default)]
    pub synthesis: SynthesisConfig,

    #[serde(default = "default_perspectives")]
    pub perspectives: Vec<PerspectiveSlot>,
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct GenerationConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,

    #[serde(default = "default_model")]
    pub model: String,

    /// Name of the environment variable holding the API key, if any.
    #[serde(default)]
    pub api_key_env: Option<String>,

    /// Per-call timeout. A knob, not a contract.
    #[serde(default = "default_timeout_sec")]
    pub timeout_sec: u64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            model: default_model(),
            api_key_env: None,
            timeout_sec: default_timeout_sec(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, JsonSchema)]
pub struct SynthesisConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for SynthesisConfig {
    fn default() -> Self {
        Self {
            enabled: default_true(),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, JsonSchema)]
pub struct PerspectiveSlot {
    pub kind: Perspective,

    #[serde(default = "default_true")]
    pub enabled: bool,
}
