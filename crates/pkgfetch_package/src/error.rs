use std::sync::Arc;

use miette::Diagnostic;
use reqwest::StatusCode;
use thiserror::Error;

/// A failure reported by a [`crate::RepositoryClient`].
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RemoteError {
    /// The server answered with a non-success status.
    #[error("returned with status code: {}", .0.as_u16())]
    Status(StatusCode),

    /// The request could not be completed.
    #[error("{0}")]
    Network(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        match err.status() {
            Some(status) => Self::Status(status),
            None => Self::Network(err.to_string()),
        }
    }
}

impl From<reqwest_middleware::Error> for RemoteError {
    fn from(err: reqwest_middleware::Error) -> Self {
        match err {
            reqwest_middleware::Error::Reqwest(err) => err.into(),
            reqwest_middleware::Error::Middleware(err) => Self::Network(format!("{err:#}")),
        }
    }
}

/// Errors that can occur while resolving or fetching a package.
///
/// Every variant is labelled with `owner-name@ref`, where `ref` is the
/// resolved reference when it is known and the version specifier otherwise.
/// The type is cheap to clone so that one failure can be handed to every
/// caller waiting on the same operation.
#[derive(Debug, Clone, Error, Diagnostic)]
pub enum FetchError {
    #[error("{package}: no tag or branch matches '{version_spec}'")]
    #[diagnostic(help("check the available tags and branches of the repository"))]
    RefNotFound {
        package: String,
        version_spec: String,
    },

    #[error(
        "{package}: returned with status code: {}. {} Make sure you have a ~/.netrc entry or specify $GH_TOKEN=<token>.",
        .status.as_u16(),
        auth_hint(.authenticated)
    )]
    AuthRequired {
        package: String,
        status: StatusCode,
        authenticated: bool,
    },

    #[error("{package}: returned with status code: {}", .status.as_u16())]
    HttpStatus { package: String, status: StatusCode },

    #[error("{package}: {message}")]
    Network { package: String, message: String },

    #[error("{package}: failed to extract archive: {source}")]
    Extraction {
        package: String,
        #[source]
        source: ExtractError,
    },

    #[error("{package}: the operation was aborted before it completed")]
    Cancelled { package: String },
}

fn auth_hint(authenticated: &bool) -> &'static str {
    if *authenticated {
        "The supplied token was rejected or cannot access this repo."
    } else {
        "You have not authenticated and this repo may be private."
    }
}

/// Statuses that mean the request needs (other) credentials.
pub fn is_auth_status(status: StatusCode) -> bool {
    matches!(
        status,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN | StatusCode::NOT_ACCEPTABLE
    )
}

impl FetchError {
    /// Classifies a failure of the repository client.
    pub(crate) fn from_remote(package: String, err: RemoteError, authenticated: bool) -> Self {
        match err {
            RemoteError::Status(status) if is_auth_status(status) => Self::AuthRequired {
                package,
                status,
                authenticated,
            },
            RemoteError::Status(status) => Self::HttpStatus { package, status },
            RemoteError::Network(message) => Self::Network { package, message },
        }
    }

    /// The `owner-name@ref` label of the package that failed.
    pub fn package(&self) -> &str {
        match self {
            Self::RefNotFound { package, .. }
            | Self::AuthRequired { package, .. }
            | Self::HttpStatus { package, .. }
            | Self::Network { package, .. }
            | Self::Extraction { package, .. }
            | Self::Cancelled { package } => package,
        }
    }

    /// The HTTP status that caused the failure, if any.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::AuthRequired { status, .. } | Self::HttpStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Errors emitted while unpacking an archive.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    #[error(transparent)]
    Io(Arc<std::io::Error>),

    #[error("failed to extract tar archive: {0}")]
    TarExtractionError(String),

    #[error("the archive does not contain any files")]
    EmptyArchive,

    #[error("failed to read archive stream: {0}")]
    Stream(RemoteError),
}

impl From<std::io::Error> for ExtractError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(Arc::new(err))
    }
}

impl From<tokio::task::JoinError> for ExtractError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::Io(Arc::new(std::io::Error::other(err)))
    }
}
