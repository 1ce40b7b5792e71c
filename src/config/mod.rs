mod defaults;
mod types;

pub use types::*;

use crate::error::ConfigError;
use defaults::*;
use std::collections::HashSet;
use std::path::Path;

impl Default for Config {
    fn default() -> Self {
        Self {
            version: default_version(),
            host: default_host(),
            port: default_port(),
            database: default_database(),
            keepalive_secs: default_keepalive_secs(),
            concurrency: default_concurrency(),
            launch_delay_ms: default_launch_delay_ms(),
            generation: GenerationConfig::default(),
            synthesis: SynthesisConfig::default(),
            perspectives: default_perspectives(),
        }
    }
}

impl Config {
    /// Load config from a YAML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Validate the config.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for slot in &self.perspectives {
            if !seen.insert(slot.kind) {
                return Err(ConfigError::DuplicatePerspective(slot.kind.to_string()));
            }
        }

        if !self.perspectives.iter().any(|slot| slot.enabled) {
            return Err(ConfigError::NoPerspectivesEnabled);
        }

        if self.keepalive_secs == 0 {
            return Err(ConfigError::KeepAliveTooShort);
        }

        Ok(())
    }

    /// Perspectives the fan-out will actually run, in declaration order.
    pub fn enabled_perspectives(&self) -> Vec<crate::model::Perspective> {
        self.perspectives
            .iter()
            .filter(|slot| slot.enabled)
            .map(|slot| slot.kind)
            .collect()
    }
}
