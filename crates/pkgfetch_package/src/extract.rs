//! Helpers to extract repository archives.
use std::{
    io::{BufRead, BufReader, Read},
    path::Path,
};

use fs_err as fs;
use fs_err::File;

use crate::{
    error::ExtractError,
    progress::{ProgressHandler, bytes_progress_bar},
};

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

/// Handle compression formats internally.
enum TarCompression<'a> {
    PlainTar(Box<dyn BufRead + 'a>),
    Gzip(flate2::read::GzDecoder<Box<dyn BufRead + 'a>>),
}

impl<'a> TarCompression<'a> {
    /// Picks the decoder from the leading bytes of the stream, hosts do not
    /// always name tarballs after their compression.
    fn sniff(mut reader: Box<dyn BufRead + 'a>) -> std::io::Result<Self> {
        let is_gzip = reader.fill_buf()?.starts_with(&GZIP_MAGIC);
        Ok(if is_gzip {
            TarCompression::Gzip(flate2::read::GzDecoder::new(reader))
        } else {
            TarCompression::PlainTar(reader)
        })
    }
}

impl Read for TarCompression<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        match self {
            TarCompression::PlainTar(reader) => reader.read(buf),
            TarCompression::Gzip(reader) => reader.read(buf),
        }
    }
}

/// Moves the directory content from src to dest after stripping root dir, if present.
fn move_extracted_dir(src: &Path, dest: &Path) -> Result<(), ExtractError> {
    let mut entries = fs::read_dir(src)?;
    let src_dir = match entries.next().transpose()? {
        None => return Err(ExtractError::EmptyArchive),
        // a lone directory is the `owner-name-sha` wrapper of the host
        Some(dir) if entries.next().is_none() && dir.file_type()?.is_dir() => {
            src.join(dir.file_name())
        }
        _ => src.to_path_buf(),
    };

    for entry in fs::read_dir(src_dir)? {
        let entry = entry?;
        let destination = dest.join(entry.file_name());
        fs::rename(entry.path(), destination)?;
    }

    Ok(())
}

/// Extracts a (possibly gzipped) tar archive into `target_directory`, which
/// must not exist yet.
///
/// When every entry of the archive lives below one top-level directory, that
/// directory is stripped, so the package files land directly in the target.
pub fn extract_archive(
    archive: impl AsRef<Path>,
    target_directory: impl AsRef<Path>,
    label: &str,
    handler: &dyn ProgressHandler,
) -> Result<(), ExtractError> {
    let archive = archive.as_ref();
    let target_directory = target_directory.as_ref();

    let len = archive.metadata().map(|m| m.len()).unwrap_or(1);
    let progress_bar = bytes_progress_bar(handler, len, &format!("Extracting {label}"));

    let file = File::open(archive)?;
    let buf_reader = BufReader::with_capacity(1024 * 1024, progress_bar.wrap_read(file));
    let mut archive = tar::Archive::new(TarCompression::sniff(Box::new(buf_reader))?);

    // Unpack next to the target so the final moves stay on one filesystem.
    let parent = target_directory.parent().unwrap_or(Path::new("."));
    let tmp_extraction_dir = tempfile::Builder::new()
        .prefix(".extract-")
        .tempdir_in(parent)?;
    archive
        .unpack(&tmp_extraction_dir)
        .map_err(|e| ExtractError::TarExtractionError(e.to_string()))?;

    fs::create_dir(target_directory)?;
    if let Err(err) = move_extracted_dir(tmp_extraction_dir.path(), target_directory) {
        let _ = fs::remove_dir_all(target_directory);
        return Err(err);
    }
    progress_bar.finish_with_message("Extracted");

    Ok(())
}
