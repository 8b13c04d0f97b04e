//! Resolves `owner/name@version` package specifiers against a hosted
//! repository, downloads the matching archive and keeps it extracted in an
//! on-disk cache at `<root>/<owner>-<name>@<ref>/`.
//!
//! Concurrent requests for the same package share their work, see
//! [`FetchCoordinator`]. The user facing entry point is [`Package`].

mod cache;
mod coordinator;
mod error;
pub mod extract;
mod inflight;
mod package;
mod progress;
pub mod remote;
mod resolver;
mod spec;

pub use cache::{CacheStore, cache_root, clean_cache};
pub use coordinator::{Fetch, FetchCoordinator};
pub use error::{ExtractError, FetchError, RemoteError, is_auth_status};
pub use inflight::InflightRegistry;
pub use package::Package;
pub use progress::{NoProgressHandler, ProgressHandler, default_bytes_style};
pub use remote::{ArchiveStream, GithubClient, RefListing, RepositoryClient};
pub use resolver::{RefResolver, VersionRange, select_ref, tag_version};
pub use spec::{CacheKey, PackageSpec, ParsePackageSpecError, ResolvedRef};
