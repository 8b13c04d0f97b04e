use std::{path::PathBuf, sync::Arc};

use clap::Parser;
use miette::IntoDiagnostic;
use pkgfetch_auth::CredentialChain;
use pkgfetch_config::{Config, ConfigCli, build_reqwest_client, get_cache_dir};
use pkgfetch_consts::consts;
use pkgfetch_package::{FetchCoordinator, GithubClient};
use url::Url;

/// Options shared by commands that talk to the repository API.
#[derive(Parser, Debug, Default, Clone)]
pub struct RemoteConfig {
    /// Token used to authenticate against the repository API.
    ///
    /// Defaults to `$GH_TOKEN`, `$GITHUB_TOKEN` or a `.netrc` entry for the
    /// API host.
    #[arg(long, env = consts::ENV_TOKEN, hide_env_values = true)]
    pub token: Option<String>,

    #[clap(flatten)]
    pub config: ConfigCli,
}

impl RemoteConfig {
    pub fn config(&self) -> Config {
        Config::with_cli_config(&self.config)
    }

    /// The explicit token, or the first credential known for `api_url`.
    pub fn token(&self, api_url: &Url) -> Option<String> {
        self.token
            .clone()
            .filter(|token| !token.is_empty())
            .or_else(|| CredentialChain::from_env_and_defaults().token_for_url(api_url))
    }
}

/// A coordinator that talks to the configured API host.
pub fn coordinator(config: &Config) -> miette::Result<FetchCoordinator> {
    let client = build_reqwest_client(config).into_diagnostic()?;
    let client = GithubClient::new(client, config.api_url());
    Ok(FetchCoordinator::new(Arc::new(client))
        .with_max_concurrent_downloads(config.max_concurrent_downloads()))
}

/// Selects the directory packages are extracted into.
#[derive(Parser, Debug, Default, Clone)]
pub struct DirectoryConfig {
    /// Directory to use instead of the cache root.
    #[arg(long, short)]
    pub dir: Option<PathBuf>,
}

impl DirectoryConfig {
    pub fn directory(&self, config: &Config) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| get_cache_dir(config))
    }
}
