use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::{Context, Result};
use log::debug;
use rayon::prelude::*;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DirSummary {
    pub files: u64,
    pub bytes: u64,
}

struct Listing {
    dirs: Vec<PathBuf>,
    files: Vec<PathBuf>,
}

/// Regular files directly inside `dir`. Symlinks are skipped, not followed.
fn list(dir: &Path) -> Result<Listing> {
    let mut listing = Listing {
        dirs: Vec::new(),
        files: Vec::new(),
    };

    let entries =
        fs::read_dir(dir).with_context(|| format!("Failed to read directory: {}", dir.display()))?;
    for entry in entries {
        let entry = entry.with_context(|| format!("Failed to read entry in: {}", dir.display()))?;
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            listing.dirs.push(entry.path());
        } else if file_type.is_file() {
            listing.files.push(entry.path());
        }
    }

    Ok(listing)
}

fn add_file_sizes(files: &[PathBuf], total: &AtomicU64) -> Result<()> {
    files.par_iter().try_for_each(|path| {
        let size = fs::metadata(path)
            .with_context(|| format!("Failed to stat file: {}", path.display()))?
            .len();
        total.fetch_add(size, Ordering::Relaxed);
        Ok(())
    })
}

/// File count and total size of the files directly in `dir`.
pub fn summarize(dir: &Path) -> Result<DirSummary> {
    let listing = list(dir)?;
    let total = AtomicU64::new(0);
    add_file_sizes(&listing.files, &total)?;

    Ok(DirSummary {
        files: listing.files.len() as u64,
        bytes: total.into_inner(),
    })
}

/// Like [`summarize`], but descends into every sub-directory in parallel.
///
/// `files` counts regular files at every level, not only those directly in
/// `dir`, so it always describes the same set of files as `bytes`.
pub fn summarize_recursive(dir: &Path) -> Result<DirSummary> {
    let listing = list(dir)?;
    let files = AtomicU64::new(listing.files.len() as u64);
    let bytes = AtomicU64::new(0);

    listing.dirs.par_iter().try_for_each(|sub| {
        let summary = summarize_recursive(sub)?;
        files.fetch_add(summary.files, Ordering::Relaxed);
        bytes.fetch_add(summary.bytes, Ordering::Relaxed);
        Ok::<_, anyhow::Error>(())
    })?;
    add_file_sizes(&listing.files, &bytes)?;

    let summary = DirSummary {
        files: files.into_inner(),
        bytes: bytes.into_inner(),
    };
    debug!("{}: {:?}", dir.display(), summary);
    Ok(summary)
}
