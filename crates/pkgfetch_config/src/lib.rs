//! Global configuration for pkgfetch.
//!
//! Configuration is layered: the system/user config files are merged first,
//! after which values from the command line (and their environment variable
//! counterparts) are merged on top.

mod client;

use std::{
    collections::BTreeSet as Set,
    path::{Path, PathBuf},
    str::FromStr,
};

use clap::{ArgAction, Parser};
use itertools::Itertools;
use miette::IntoDiagnostic;
use pkgfetch_consts::consts;
use serde::{Deserialize, Serialize};
use url::Url;

pub use client::build_reqwest_client;

/// Get pkgfetch home directory, default to `$HOME/.pkgfetch`
///
/// It may be overridden by the `PKGFETCH_HOME` environment variable.
pub fn pkgfetch_home() -> Option<PathBuf> {
    if let Some(path) = std::env::var_os(consts::ENV_HOME) {
        Some(PathBuf::from(path))
    } else {
        dirs::home_dir().map(|path| path.join(consts::PKGFETCH_DIR))
    }
}

/// Returns the cache root to use.
///
/// - The `PKGFETCH_CACHE_DIR` environment variable wins.
/// - Otherwise the `cache-dir` configured in the config files.
/// - Otherwise `pkgfetch` below the system temp directory.
pub fn get_cache_dir(config: &Config) -> PathBuf {
    std::env::var_os(consts::ENV_CACHE_DIR)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .or_else(|| config.cache_dir.clone())
        .unwrap_or_else(|| std::env::temp_dir().join(consts::CACHE_DIR))
}

#[derive(Parser, Debug, Default, Clone)]
pub struct ConfigCli {
    /// Base URL of the repository API, e.g. for a GitHub Enterprise host.
    #[arg(long, env = "PKGFETCH_API_URL", help_heading = consts::CLAP_CONFIG_OPTIONS)]
    api_url: Option<Url>,

    /// Max concurrent downloads, default is `50`
    #[arg(long, help_heading = consts::CLAP_CONFIG_OPTIONS)]
    concurrent_downloads: Option<usize>,

    /// Do not verify the TLS certificate of the server.
    #[arg(long, action = ArgAction::SetTrue, help_heading = consts::CLAP_CONFIG_OPTIONS)]
    tls_no_verify: bool,
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct ConcurrencyConfig {
    /// The maximum number of concurrent archive downloads.
    #[serde(default = "default_max_concurrent_downloads")]
    pub downloads: usize,
}

fn default_max_concurrent_downloads() -> usize {
    consts::DEFAULT_CONCURRENT_DOWNLOADS
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            downloads: default_max_concurrent_downloads(),
        }
    }
}

impl ConcurrencyConfig {
    /// Merge the given ConcurrencyConfig into the current one.
    /// The `other` config will have higher priority
    pub fn merge(self, other: Self) -> Self {
        if other == Self::default() {
            self
        } else {
            other
        }
    }

    pub fn is_default(&self) -> bool {
        self == &Self::default()
    }
}

#[derive(Clone, Default, Debug, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Directory used as the cache root for extracted packages.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cache_dir: Option<PathBuf>,

    /// Base URL of the repository API.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_url: Option<Url>,

    /// If set to true, pkgfetch will not verify the TLS certificate of the
    /// server.
    #[serde(default)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_no_verify: Option<bool>,

    /// Concurrency configuration
    #[serde(default)]
    #[serde(skip_serializing_if = "ConcurrencyConfig::is_default")]
    pub concurrency: ConcurrencyConfig,

    #[serde(skip)]
    pub loaded_from: Vec<PathBuf>,
}

impl From<ConfigCli> for Config {
    fn from(cli: ConfigCli) -> Self {
        Self {
            api_url: cli.api_url,
            tls_no_verify: if cli.tls_no_verify { Some(true) } else { None },
            concurrency: cli
                .concurrent_downloads
                .map(|downloads| ConcurrencyConfig { downloads })
                .unwrap_or_default(),
            ..Default::default()
        }
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("no file was found at {0}")]
    FileNotFound(PathBuf),
    #[error("failed to read config from '{0}'")]
    ReadError(std::io::Error),
    #[error("failed to parse config of {1}: {0}")]
    ParseError(miette::Report, PathBuf),
}

impl Config {
    /// Parse the given toml string and return a Config instance.
    ///
    /// # Returns
    ///
    /// The parsed config, and the unused keys
    pub fn from_toml(toml: &str) -> miette::Result<(Config, Set<String>)> {
        let de = toml_edit::de::Deserializer::from_str(toml).into_diagnostic()?;

        let mut unused_keys = Set::new();
        let config: Config = serde_ignored::deserialize(de, |path| {
            unused_keys.insert(path.to_string());
        })
        .into_diagnostic()?;

        Ok((config, unused_keys))
    }

    /// Load the config from the given path.
    pub fn from_path(path: &Path) -> Result<Config, ConfigError> {
        tracing::debug!("Loading config from {}", path.display());
        let s = match fs_err::read_to_string(path) {
            Ok(content) => content,
            Err(e)
                if e.kind() == std::io::ErrorKind::NotFound
                    || e.kind() == std::io::ErrorKind::NotADirectory =>
            {
                return Err(ConfigError::FileNotFound(path.to_path_buf()));
            }
            Err(e) => return Err(ConfigError::ReadError(e)),
        };

        let (mut config, unused_keys) =
            Config::from_toml(&s).map_err(|e| ConfigError::ParseError(e, path.to_path_buf()))?;

        if !unused_keys.is_empty() {
            tracing::warn!(
                "Ignoring '{}' in at {}",
                console::style(unused_keys.iter().join(", ")).yellow(),
                path.display()
            );
        }

        config.loaded_from.push(path.to_path_buf());
        tracing::debug!("Loaded config from: {}", path.display());

        Ok(config)
    }

    /// Load the global config file from various global paths.
    pub fn load_global() -> Config {
        let mut config = Config::default();

        for p in config_path_global() {
            match Self::from_path(&p) {
                Ok(c) => config = config.merge_config(c),
                Err(ConfigError::FileNotFound(_)) => (),
                Err(e) => tracing::error!(
                    "Failed to load global config '{}' with error: {}",
                    p.display(),
                    e
                ),
            }
        }

        config
    }

    /// Load the global config and layer the given cli config on top of it.
    pub fn with_cli_config(cli: &ConfigCli) -> Config {
        let config = Config::load_global();
        config.merge_config(cli.clone().into())
    }

    /// Merge the `other` config into `self`.
    /// The `other` config will have higher priority
    #[must_use]
    pub fn merge_config(self, mut other: Config) -> Self {
        other.loaded_from.splice(0..0, self.loaded_from);

        Self {
            cache_dir: other.cache_dir.or(self.cache_dir),
            api_url: other.api_url.or(self.api_url),
            tls_no_verify: other.tls_no_verify.or(self.tls_no_verify),
            concurrency: self.concurrency.merge(other.concurrency),
            loaded_from: other.loaded_from,
        }
    }

    /// Retrieve the value for the tls_no_verify field (defaults to false).
    pub fn tls_no_verify(&self) -> bool {
        self.tls_no_verify.unwrap_or(false)
    }

    /// The repository API base URL (defaults to the public GitHub API).
    pub fn api_url(&self) -> Url {
        self.api_url.clone().unwrap_or_else(|| {
            Url::parse(consts::DEFAULT_API_URL).expect("the default api url is valid")
        })
    }

    pub fn max_concurrent_downloads(&self) -> usize {
        self.concurrency.downloads
    }
}

/// Returns the paths of the global configuration files, lowest priority first.
pub fn config_path_global() -> Vec<PathBuf> {
    vec![
        dirs::config_dir().map(|d| d.join(consts::CONFIG_DIR).join(consts::CONFIG_FILE)),
        pkgfetch_home().map(|d| d.join(consts::CONFIG_FILE)),
    ]
    .into_iter()
    .flatten()
    .collect()
}
