use std::{
    path::{Path, PathBuf},
    sync::{Arc, LazyLock},
};

use tokio::sync::Semaphore;
use tracing::{debug, info, instrument};

use crate::{
    cache::CacheStore,
    error::{ExtractError, FetchError},
    inflight::InflightRegistry,
    progress::ProgressHandler,
    remote::{GithubClient, RepositoryClient},
    resolver::RefResolver,
    spec::{CacheKey, PackageSpec, ResolvedRef},
};

static GLOBAL: LazyLock<FetchCoordinator> =
    LazyLock::new(|| FetchCoordinator::new(Arc::new(GithubClient::default())));

/// The outcome of a successful fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetch {
    pub spec: PackageSpec,
    pub reference: ResolvedRef,
    pub key: CacheKey,
    /// The directory holding the extracted package.
    pub path: PathBuf,
    /// True if the package was already on disk and nothing was downloaded.
    pub cache_hit: bool,
}

/// Runs the resolve, cache check, download and extract pipeline, sharing
/// work between concurrent identical requests.
///
/// Clones share their in-flight registries. Coordinators created separately
/// never share work with each other.
#[derive(Clone)]
pub struct FetchCoordinator {
    client: Arc<dyn RepositoryClient>,
    resolver: RefResolver,
    resolutions: InflightRegistry<ResolvedRef>,
    fetches: InflightRegistry<Fetch>,
    materializations: InflightRegistry<PathBuf>,
    download_permits: Option<Arc<Semaphore>>,
}

impl FetchCoordinator {
    pub fn new(client: Arc<dyn RepositoryClient>) -> Self {
        Self {
            resolver: RefResolver::new(client.clone()),
            client,
            resolutions: InflightRegistry::default(),
            fetches: InflightRegistry::default(),
            materializations: InflightRegistry::default(),
            download_permits: None,
        }
    }

    /// The coordinator shared by every [`crate::Package`] that is not given
    /// one explicitly. It talks to the public GitHub API.
    pub fn global() -> Self {
        GLOBAL.clone()
    }

    /// Limits how many archives are downloaded at the same time.
    pub fn with_max_concurrent_downloads(mut self, max: usize) -> Self {
        self.download_permits = Some(Arc::new(Semaphore::new(max.max(1))));
        self
    }

    /// Resolves the version specifier of `spec`. Concurrent calls for the same
    /// spec share one listing request.
    #[instrument(skip_all, fields(package = %spec))]
    pub async fn resolve(
        &self,
        spec: &PackageSpec,
        token: Option<&str>,
    ) -> Result<ResolvedRef, FetchError> {
        let resolver = self.resolver.clone();
        let owned_spec = spec.clone();
        let token = token.map(str::to_owned);
        self.resolutions
            .run(spec.dedup_key(), &spec.dedup_key(), async move {
                resolver.resolve(&owned_spec, token.as_deref()).await
            })
            .await
    }

    /// Makes sure the package `spec` resolves to is extracted below
    /// `base_dir` and returns where.
    ///
    /// Concurrent calls for the same spec and base directory share a single
    /// resolution and at most one download.
    #[instrument(skip_all, fields(package = %spec, base_dir = %base_dir.display()))]
    pub async fn fetch(
        &self,
        spec: &PackageSpec,
        token: Option<&str>,
        base_dir: &Path,
        progress: Arc<dyn ProgressHandler>,
    ) -> Result<Fetch, FetchError> {
        let dedup_key = base_dir.join(spec.dedup_key()).display().to_string();
        let this = self.clone();
        let spec = spec.clone();
        let label = spec.dedup_key();
        let token = token.map(str::to_owned);
        let store = CacheStore::new(base_dir);
        self.fetches
            .run(dedup_key, &label, async move {
                let reference = this.resolve(&spec, token.as_deref()).await?;
                this.place(spec, reference, store, token, progress).await
            })
            .await
    }

    /// Like [`Self::fetch`] for a spec that was already resolved to
    /// `reference`, so no listing request is made.
    #[instrument(skip_all, fields(package = %spec, reference = %reference))]
    pub async fn fetch_resolved(
        &self,
        spec: &PackageSpec,
        reference: &ResolvedRef,
        token: Option<&str>,
        base_dir: &Path,
        progress: Arc<dyn ProgressHandler>,
    ) -> Result<Fetch, FetchError> {
        self.place(
            spec.clone(),
            reference.clone(),
            CacheStore::new(base_dir),
            token.map(str::to_owned),
            progress,
        )
        .await
    }

    /// Returns the cached entry for `reference`, materializing it first if
    /// needed.
    async fn place(
        &self,
        spec: PackageSpec,
        reference: ResolvedRef,
        store: CacheStore,
        token: Option<String>,
        progress: Arc<dyn ProgressHandler>,
    ) -> Result<Fetch, FetchError> {
        let key = CacheKey::new(&spec, &reference);
        if store.exists(&key).await {
            debug!("{key} is already cached");
            return Ok(Fetch {
                path: store.entry_path(&key),
                spec,
                reference,
                key,
                cache_hit: true,
            });
        }

        let path = self
            .materialize(&spec, &reference, &key, store, token, progress)
            .await?;
        Ok(Fetch {
            spec,
            reference,
            key,
            path,
            cache_hit: false,
        })
    }

    /// Downloads and extracts `reference` into `store`. Distinct specs that
    /// resolve to the same entry share one download.
    async fn materialize(
        &self,
        spec: &PackageSpec,
        reference: &ResolvedRef,
        key: &CacheKey,
        store: CacheStore,
        token: Option<String>,
        progress: Arc<dyn ProgressHandler>,
    ) -> Result<PathBuf, FetchError> {
        let dedup_key = store.entry_path(key).display().to_string();
        let client = self.client.clone();
        let permits = self.download_permits.clone();
        let (spec, reference, key) = (spec.clone(), reference.clone(), key.clone());
        let label = key.to_string();
        self.materializations
            .run(dedup_key, &label, async move {
                let package = key.to_string();
                if store.exists(&key).await {
                    return Ok(store.entry_path(&key));
                }

                let _permit = match permits {
                    Some(permits) => Some(permits.acquire_owned().await.map_err(|_| {
                        FetchError::Cancelled {
                            package: package.clone(),
                        }
                    })?),
                    None => None,
                };

                info!("downloading {}", spec.slug());
                let authenticated = token.is_some();
                let stream = client
                    .download(spec.owner(), spec.name(), &reference, token.as_deref())
                    .await
                    .map_err(|err| FetchError::from_remote(package.clone(), err, authenticated))?;

                let path = store
                    .materialize(&key, stream, progress)
                    .await
                    .map_err(|err| match err {
                        ExtractError::Stream(err) => {
                            FetchError::from_remote(package.clone(), err, authenticated)
                        }
                        source => FetchError::Extraction {
                            package: package.clone(),
                            source,
                        },
                    })?;
                info!("extracted {} to {}", key, path.display());
                Ok(path)
            })
            .await
    }
}

impl std::fmt::Debug for FetchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FetchCoordinator")
            .field("resolutions", &self.resolutions.len())
            .field("fetches", &self.fetches.len())
            .field("materializations", &self.materializations.len())
            .finish_non_exhaustive()
    }
}
