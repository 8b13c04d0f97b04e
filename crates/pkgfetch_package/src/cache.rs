//! The on-disk package cache.
//!
//! Every materialized package is a directory `<root>/<owner>-<name>@<ref>/`
//! holding the extracted archive. A directory only ever appears at that path
//! by an atomic rename of a fully extracted staging directory, so its
//! presence means the package is complete.

use std::{
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use fs_err::tokio as async_fs;
use futures::StreamExt;
use pkgfetch_consts::consts;
use tokio::io::AsyncWriteExt;
use tracing::{debug, instrument};

use crate::{
    error::ExtractError,
    extract,
    progress::{ProgressHandler, bytes_progress_bar},
    remote::ArchiveStream,
    spec::CacheKey,
};

/// The cache root used when no other directory is configured:
/// `$PKGFETCH_CACHE_DIR` when set, `<system temp dir>/pkgfetch` otherwise.
pub fn cache_root() -> PathBuf {
    std::env::var_os(consts::ENV_CACHE_DIR)
        .filter(|dir| !dir.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::temp_dir().join(consts::CACHE_DIR))
}

/// Removes the default cache root, see [`CacheStore::clean`].
pub async fn clean_cache() -> std::io::Result<()> {
    CacheStore::new(cache_root()).clean().await
}

/// A directory of materialized packages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStore {
    base_dir: PathBuf,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::new(cache_root())
    }
}

impl CacheStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    /// Where the package identified by `key` lives, whether or not it exists.
    pub fn entry_path(&self, key: &CacheKey) -> PathBuf {
        self.base_dir.join(key.as_str())
    }

    /// Whether the package identified by `key` has been materialized.
    pub async fn exists(&self, key: &CacheKey) -> bool {
        async_fs::metadata(self.entry_path(key))
            .await
            .is_ok_and(|metadata| metadata.is_dir())
    }

    /// Streams an archive to disk and extracts it as the entry for `key`.
    ///
    /// The base directory is created on demand. All intermediate files live
    /// inside it and are removed again whether or not this succeeds. If the
    /// entry appears concurrently, for example from another process, the
    /// existing entry is kept and its path returned.
    #[instrument(skip_all, fields(key = %key))]
    pub async fn materialize(
        &self,
        key: &CacheKey,
        mut stream: ArchiveStream,
        progress: Arc<dyn ProgressHandler>,
    ) -> Result<PathBuf, ExtractError> {
        async_fs::create_dir_all(&self.base_dir).await?;

        let archive = tempfile::Builder::new()
            .prefix(".download-")
            .tempfile_in(&self.base_dir)?;
        let mut file = tokio::fs::File::from_std(archive.as_file().try_clone()?);

        let progress_bar =
            bytes_progress_bar(progress.as_ref(), 0, &format!("Downloading {key}"));
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(ExtractError::Stream)?;
            file.write_all(&chunk).await?;
            progress_bar.inc_length(chunk.len() as u64);
            progress_bar.inc(chunk.len() as u64);
        }
        file.flush().await?;
        drop(file);
        progress_bar.finish_with_message("Downloaded");
        debug!("downloaded {} bytes", progress_bar.position());

        let base_dir = self.base_dir.clone();
        let destination = self.entry_path(key);
        let label = key.to_string();
        tokio::task::spawn_blocking(move || {
            let staging = tempfile::Builder::new()
                .prefix(".staging-")
                .tempdir_in(&base_dir)?;
            let extracted = staging.path().join(&label);
            extract::extract_archive(archive.path(), &extracted, &label, progress.as_ref())?;
            publish(&extracted, &destination)?;
            Ok::<_, ExtractError>(destination)
        })
        .await?
    }

    /// Deletes the cache root with everything below it. Succeeds when there is
    /// nothing to delete.
    #[instrument(skip_all, fields(base_dir = %self.base_dir.display()))]
    pub async fn clean(&self) -> std::io::Result<()> {
        match async_fs::remove_dir_all(&self.base_dir).await {
            Ok(()) => {
                debug!("removed cache");
                Ok(())
            }
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }
}

/// Renames a fully extracted directory to its final location.
fn publish(extracted: &Path, destination: &Path) -> std::io::Result<()> {
    match fs_err::rename(extracted, destination) {
        Ok(()) => Ok(()),
        // somebody else published the same entry first
        Err(_) if destination.is_dir() => {
            debug!("{} already exists, keeping it", destination.display());
            Ok(())
        }
        Err(err) => Err(err),
    }
}
