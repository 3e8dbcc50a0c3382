//! 🔧 app_config.rs: one config, assembled once, passed by value, never touched again.
//!
//! Layers, lowest to highest:
//!
//! ```text
//!   built-in defaults
//!     └─▶ TOML file (--config PATH, else ~/.tport.toml if it exists)
//!           └─▶ env: TPORT_<SECTION>__<KEY>, e.g. TPORT_ELASTICSEARCH__HOST
//!                 └─▶ command-line flags (ConfigOverrides)
//! ```
//!
//! Each backend's section type lives next to the backend that uses it. This
//! file only stitches them together.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::backends::{ElasticsearchConfig, HbaseConfig, KafkaConfig, MongoConfig, S3Config};
use crate::parser::InvalidLinePolicy;
use crate::transforms::IdRule;

/// 🚦 What the parser does with lines that aren't JSON.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ParseConfig {
    pub on_invalid: InvalidLinePolicy,
}

/// 📦 Index-write knobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    pub chunk_size: usize,
    pub id: IdRule,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            id: IdRule::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub elasticsearch: ElasticsearchConfig,
    pub s3: S3Config,
    pub mongo: MongoConfig,
    pub hbase: HbaseConfig,
    pub kafka: KafkaConfig,
    pub parse: ParseConfig,
    pub index: IndexConfig,
}

/// 🎛️ The top layer: values that came in on the command line.
///
/// Keys are dotted paths into `AppConfig` (`"elasticsearch.host"`). `None`
/// means the flag wasn't given and the lower layers keep their say.
#[derive(Debug, Default)]
pub struct ConfigOverrides {
    figment: Figment,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set<T: Serialize>(mut self, key: &str, value: Option<T>) -> Self {
        if let Some(value) = value {
            self.figment = self.figment.merge(Serialized::default(key, value));
        }
        self
    }
}

/// 🏠 `~/.tport.toml`, if there is a home to speak of.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::home_dir().map(|home| home.join(".tport.toml"))
}

/// 🔧 Stack the layers and extract. An explicit `config_file` must exist;
/// the default one is optional.
pub fn load_config(config_file: Option<&Path>, overrides: ConfigOverrides) -> Result<AppConfig> {
    let file = match config_file {
        Some(path) => {
            if !path.is_file() {
                bail!("💀 config file '{}' does not exist", path.display());
            }
            Some(path.to_path_buf())
        }
        None => default_config_path().filter(|p| p.is_file()),
    };

    let mut figment = Figment::from(Serialized::defaults(AppConfig::default()));
    match &file {
        Some(path) => {
            info!("🔧 loading configuration from {}", path.display());
            figment = figment.merge(Toml::file(path));
        }
        None => debug!("🔧 no config file, using defaults + environment"),
    }
    let figment = figment
        .merge(Env::prefixed("TPORT_").split("__"))
        .merge(overrides.figment);

    let context = match &file {
        Some(path) => format!(
            "💀 failed to assemble configuration from '{}' and TPORT_* environment variables",
            path.display()
        ),
        None => "💀 failed to assemble configuration from TPORT_* environment variables".to_string(),
    };
    figment.extract().context(context)
}
