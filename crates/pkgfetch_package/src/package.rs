use std::{
    path::{Path, PathBuf},
    sync::Arc,
};

use tokio::sync::OnceCell;

use crate::{
    cache::cache_root,
    coordinator::{Fetch, FetchCoordinator},
    error::FetchError,
    progress::{NoProgressHandler, ProgressHandler},
    spec::{PackageSpec, ParsePackageSpecError, ResolvedRef},
};

/// A single package request: what to fetch, where to put it and how to
/// authenticate.
///
/// Both [`Package::resolve`] and [`Package::fetch`] remember their first
/// successful result, so calling them again never touches the network. This
/// is separate from the sharing of in-flight work between handles, which is
/// the job of the [`FetchCoordinator`].
///
/// ```no_run
/// # async fn run() -> Result<(), Box<dyn std::error::Error>> {
/// let package = pkgfetch_package::Package::parse("component/type@1.0.0")?
///     .with_directory("components");
/// let fetch = package.fetch().await?;
/// println!("{} is at {}", fetch.key, fetch.path.display());
/// # Ok(())
/// # }
/// ```
pub struct Package {
    spec: PackageSpec,
    token: Option<String>,
    directory: PathBuf,
    coordinator: Option<FetchCoordinator>,
    progress: Arc<dyn ProgressHandler>,
    resolved: OnceCell<ResolvedRef>,
    fetched: OnceCell<Fetch>,
}

impl Package {
    /// A handle that extracts into [`cache_root()`] through the global
    /// coordinator.
    pub fn new(spec: PackageSpec) -> Self {
        Self {
            spec,
            token: None,
            directory: cache_root(),
            coordinator: None,
            progress: Arc::new(NoProgressHandler),
            resolved: OnceCell::new(),
            fetched: OnceCell::new(),
        }
    }

    /// Parses `owner/name[@version]`, see [`PackageSpec`].
    pub fn parse(spec: &str) -> Result<Self, ParsePackageSpecError> {
        Ok(Self::new(spec.parse()?))
    }

    /// Authenticate requests with `token`.
    #[must_use]
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    /// Extract into `directory` instead of the cache root.
    #[must_use]
    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.set_directory(directory);
        self
    }

    /// Share in-flight work through `coordinator` instead of the global one.
    #[must_use]
    pub fn with_coordinator(mut self, coordinator: FetchCoordinator) -> Self {
        self.coordinator = Some(coordinator);
        self
    }

    #[must_use]
    pub fn with_progress_handler(mut self, handler: Arc<dyn ProgressHandler>) -> Self {
        self.progress = handler;
        self
    }

    pub fn set_token(&mut self, token: Option<String>) {
        self.token = token;
    }

    /// Changes the target directory. A previous fetch result is forgotten
    /// because it points into the old directory.
    pub fn set_directory(&mut self, directory: impl Into<PathBuf>) {
        self.directory = directory.into();
        self.fetched.take();
    }

    pub fn spec(&self) -> &PackageSpec {
        &self.spec
    }

    /// `owner/name`
    pub fn slug(&self) -> String {
        self.spec.slug()
    }

    pub fn token(&self) -> Option<&str> {
        self.token.as_deref()
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn coordinator(&self) -> FetchCoordinator {
        self.coordinator
            .clone()
            .unwrap_or_else(FetchCoordinator::global)
    }

    /// Resolves the version specifier to a concrete reference.
    pub async fn resolve(&self) -> Result<&ResolvedRef, FetchError> {
        self.resolved
            .get_or_try_init(|| async {
                self.coordinator()
                    .resolve(&self.spec, self.token())
                    .await
            })
            .await
    }

    /// Makes sure the package is extracted in [`Self::directory`], resolving
    /// it first if that has not happened yet.
    pub async fn fetch(&self) -> Result<&Fetch, FetchError> {
        self.fetched
            .get_or_try_init(|| async {
                let coordinator = self.coordinator();
                let fetch = match self.resolved.get() {
                    Some(reference) => {
                        coordinator
                            .fetch_resolved(
                                &self.spec,
                                reference,
                                self.token(),
                                &self.directory,
                                self.progress.clone(),
                            )
                            .await?
                    }
                    None => {
                        coordinator
                            .fetch(
                                &self.spec,
                                self.token(),
                                &self.directory,
                                self.progress.clone(),
                            )
                            .await?
                    }
                };
                // keeps a resolution that finished concurrently
                let _ = self.resolved.set(fetch.reference.clone());
                Ok(fetch)
            })
            .await
    }
}

impl std::fmt::Debug for Package {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Package")
            .field("spec", &self.spec)
            .field("token", &self.token.as_ref().map(|_| "********"))
            .field("directory", &self.directory)
            .field("resolved", &self.resolved.get())
            .finish_non_exhaustive()
    }
}
