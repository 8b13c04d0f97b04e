use std::{
    collections::HashMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use pkgfetch_consts::consts;

use crate::{CredentialProvider, Credentials};

#[derive(Debug, thiserror::Error)]
pub enum NetrcError {
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("could not parse .netrc file: {0}")]
    Parse(netrc_rs::Error),
}

/// Credentials read from a `.netrc` file. The `password` of a machine entry
/// is used as the token.
#[derive(Debug, Clone, Default)]
pub struct NetrcCredentials {
    machines: HashMap<String, Credentials>,
    default: Option<Credentials>,
}

impl NetrcCredentials {
    /// Reads `$NETRC`, or `~/.netrc` when the variable is not set. A missing
    /// file yields empty credentials.
    pub fn from_env() -> Result<Self, (PathBuf, NetrcError)> {
        let path = std::env::var_os(consts::ENV_NETRC)
            .map(PathBuf::from)
            .unwrap_or_else(|| {
                dirs::home_dir()
                    .unwrap_or_else(|| PathBuf::from("."))
                    .join(".netrc")
            });

        match Self::from_path(&path) {
            Ok(credentials) => Ok(credentials),
            Err(NetrcError::Io(err)) if err.kind() == ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err((path, err)),
        }
    }

    pub fn from_path(path: &Path) -> Result<Self, NetrcError> {
        let content = fs_err::read_to_string(path)?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self, NetrcError> {
        let netrc = netrc_rs::Netrc::parse(content, false).map_err(NetrcError::Parse)?;

        let mut machines = HashMap::new();
        let mut default = None;
        for machine in netrc.machines {
            let Some(password) = machine.password else {
                continue;
            };
            let credentials = Credentials::new(machine.login, password);
            match machine.name {
                Some(name) => {
                    machines.entry(name).or_insert(credentials);
                }
                None => default = default.or(Some(credentials)),
            }
        }

        Ok(Self { machines, default })
    }
}

impl CredentialProvider for NetrcCredentials {
    fn lookup(&self, host: &str) -> Option<Credentials> {
        // Tokens for the GitHub API are commonly stored under the web host.
        self.machines
            .get(host)
            .or_else(|| {
                host.strip_prefix("api.")
                    .and_then(|web_host| self.machines.get(web_host))
            })
            .or(self.default.as_ref())
            .cloned()
    }
}
