//! Layered configuration loading
//!
//! Priority (highest to lowest):
//! 1. Environment variables (`{SERVICE}_` prefix, nested keys split on `__`)
//! 2. Explicit file passed on the command line
//! 3. `config/{service}.yaml`
//! 4. `config/{service}.toml`
//! 5. Default values

use std::path::{Path, PathBuf};

use errors::{ResponderError, ResponderResult};
use figment::{
    providers::{Env, Format, Json, Serialized, Toml, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Where configuration comes from besides the conventional locations
#[derive(Debug, Clone, Default)]
pub struct ConfigSource {
    /// File named with `--config`
    pub explicit_path: Option<PathBuf>,
}

impl ConfigSource {
    pub fn with_file(path: impl Into<PathBuf>) -> Self {
        Self {
            explicit_path: Some(path.into()),
        }
    }
}

/// Load a service configuration from every layer
pub fn load_config<T>(service_name: &str, source: &ConfigSource) -> ResponderResult<T>
where
    T: Serialize + for<'de> Deserialize<'de> + Default,
{
    let mut figment = Figment::from(Serialized::defaults(T::default()))
        .merge(Toml::file(format!("config/{}.toml", service_name)))
        .merge(Yaml::file(format!("config/{}.yaml", service_name)));

    if let Some(path) = &source.explicit_path {
        if !path.exists() {
            return Err(ResponderError::config(format!(
                "Config file not found: {}",
                path.display()
            )));
        }
        debug!("Merging configuration file {}", path.display());
        figment = merge_file(figment, path)?;
    }

    let prefix = format!("{}_", service_name.to_uppercase());
    figment
        .merge(Env::prefixed(&prefix).split("__"))
        .extract()
        .map_err(|e| ResponderError::config(format!("Failed to load configuration: {}", e)))
}

fn merge_file(figment: Figment, path: &Path) -> ResponderResult<Figment> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ResponderError::config("Config file must have an extension"))?;

    match extension {
        "toml" => Ok(figment.merge(Toml::file(path))),
        "yaml" | "yml" => Ok(figment.merge(Yaml::file(path))),
        "json" => Ok(figment.merge(Json::file(path))),
        _ => Err(ResponderError::config(format!(
            "Unsupported config file format: {}",
            extension
        ))),
    }
}
