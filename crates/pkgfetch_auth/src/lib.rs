//! Credential lookup for repository hosts.
//!
//! A [`CredentialChain`] asks a list of [`CredentialProvider`]s for a token
//! for a given host name and returns the first hit. The default chain checks
//! the `GH_TOKEN`/`GITHUB_TOKEN` environment variables first and falls back to
//! the user's `.netrc` file.

mod netrc;

use std::{fmt::Debug, sync::Arc};

use pkgfetch_consts::consts;
use url::Url;

pub use netrc::{NetrcCredentials, NetrcError};

/// A user name and token pair for a single host.
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    user: Option<String>,
    token: String,
}

impl Credentials {
    pub fn new(user: Option<String>, token: impl Into<String>) -> Self {
        Self {
            user: user.filter(|user| !user.is_empty()),
            token: token.into(),
        }
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn into_token(self) -> String {
        self.token
    }
}

impl Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("user", &self.user)
            .field("token", &"****")
            .finish()
    }
}

/// Something that can supply credentials for a host.
pub trait CredentialProvider: Debug + Send + Sync {
    /// Returns the credentials for `host`, if any are known.
    fn lookup(&self, host: &str) -> Option<Credentials>;
}

/// Reads a token from environment variables. The token applies to every host.
#[derive(Debug, Clone)]
pub struct EnvCredentials {
    variables: Vec<String>,
}

impl Default for EnvCredentials {
    fn default() -> Self {
        Self::new(consts::ENV_GITHUB_TOKENS.iter().copied())
    }
}

impl EnvCredentials {
    /// Consult the given variables in order.
    pub fn new<S: Into<String>>(variables: impl IntoIterator<Item = S>) -> Self {
        Self {
            variables: variables.into_iter().map(Into::into).collect(),
        }
    }
}

impl CredentialProvider for EnvCredentials {
    fn lookup(&self, _host: &str) -> Option<Credentials> {
        self.variables.iter().find_map(|var| {
            let token = std::env::var(var).ok().filter(|token| !token.is_empty())?;
            tracing::debug!("using token from ${var}");
            Some(Credentials::new(None, token))
        })
    }
}

/// An ordered list of providers; the first one that knows the host wins.
#[derive(Debug, Clone, Default)]
pub struct CredentialChain {
    providers: Vec<Arc<dyn CredentialProvider>>,
}

impl CredentialChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// The environment variables first, then `$NETRC` or `~/.netrc`.
    pub fn from_env_and_defaults() -> Self {
        let netrc = NetrcCredentials::from_env().unwrap_or_else(|(path, err)| {
            tracing::warn!("error reading netrc file from {}: {}", path.display(), err);
            NetrcCredentials::default()
        });

        Self::new()
            .with_provider(EnvCredentials::default())
            .with_provider(netrc)
    }

    #[must_use]
    pub fn with_provider(mut self, provider: impl CredentialProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    /// Returns the credentials of the first provider that knows `host`.
    pub fn lookup(&self, host: &str) -> Option<Credentials> {
        self.providers
            .iter()
            .find_map(|provider| provider.lookup(host))
    }

    /// Returns the token to use for requests to `url`.
    pub fn token_for_url(&self, url: &Url) -> Option<String> {
        let host = url.host_str()?;
        self.lookup(host).map(Credentials::into_token)
    }
}

impl CredentialProvider for CredentialChain {
    fn lookup(&self, host: &str) -> Option<Credentials> {
        CredentialChain::lookup(self, host)
    }
}
