//! Engine configuration, loaded from JSON.

use crate::store::{standard_input_instance, standard_output_instance, QName};
use crate::variables::FactoryDefaults;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::warn;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config '{path}': {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("'{0}' is not a valid qualified name")]
    InvalidName(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// External parameter values: Clark name -> lexical value.
    pub parameters: BTreeMap<String, String>,
    pub standard_input_instance: String,
    pub output_instance: String,
    pub parallel_consistency: bool,
    /// Used when a variable set does not state `implicitFiltering`.
    pub implicit_filtering: bool,
    /// Treat every consistency assertion as strict.
    pub strict_consistency: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            parameters: BTreeMap::new(),
            standard_input_instance: standard_input_instance().clark(),
            output_instance: standard_output_instance().clark(),
            parallel_consistency: false,
            implicit_filtering: true,
            strict_consistency: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .map_err(|source| ConfigError::Io { path: path.display().to_string(), source })?;
        Self::from_json_str(&content)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for name in [&self.standard_input_instance, &self.output_instance] {
            QName::parse_clark(name).ok_or_else(|| ConfigError::InvalidName(name.clone()))?;
        }
        Ok(())
    }

    pub fn input_instance(&self) -> QName {
        QName::parse_clark(&self.standard_input_instance).unwrap_or_else(standard_input_instance)
    }

    pub fn output_instance(&self) -> QName {
        QName::parse_clark(&self.output_instance).unwrap_or_else(standard_output_instance)
    }

    /// Parameter values keyed by name. Entries with malformed names are skipped.
    pub fn external_parameters(&self) -> BTreeMap<QName, String> {
        self.parameters
            .iter()
            .filter_map(|(k, v)| match QName::parse_clark(k) {
                Some(name) => Some((name, v.clone())),
                None => {
                    warn!(parameter = %k, "ignoring external parameter with malformed name");
                    None
                }
            })
            .collect()
    }

    pub fn factory_defaults(&self) -> FactoryDefaults {
        FactoryDefaults {
            implicit_filtering: self.implicit_filtering,
            input_instance: self.input_instance(),
            output_instance: self.output_instance(),
        }
    }
}
