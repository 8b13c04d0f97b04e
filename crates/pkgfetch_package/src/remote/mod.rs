//! The interface to the hosting service that lists references and serves
//! archives.

mod github;

use std::collections::HashMap;

use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;

pub use github::GithubClient;

use crate::{error::RemoteError, spec::ResolvedRef};

/// The bytes of an archive as they arrive from the network.
pub type ArchiveStream = BoxStream<'static, Result<Bytes, RemoteError>>;

/// The tags and branches of a repository.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RefListing {
    /// Tag names in the order the host lists them.
    pub tags: Vec<String>,
    /// Branch names mapped to the commit at their head.
    pub branches: HashMap<String, String>,
}

impl RefListing {
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    pub fn branch_head(&self, branch: &str) -> Option<&str> {
        self.branches.get(branch).map(String::as_str)
    }
}

/// Lists references of and downloads archives from a hosted repository.
#[async_trait]
pub trait RepositoryClient: Send + Sync {
    /// Returns the tags and branches of `owner/name`.
    async fn list_refs(
        &self,
        owner: &str,
        name: &str,
        token: Option<&str>,
    ) -> Result<RefListing, RemoteError>;

    /// Starts downloading the archive of `owner/name` at `reference`.
    async fn download(
        &self,
        owner: &str,
        name: &str,
        reference: &ResolvedRef,
        token: Option<&str>,
    ) -> Result<ArchiveStream, RemoteError>;
}
