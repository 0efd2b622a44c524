//! Effect lookup
//!
//! An effect is named by any case-insensitive fragment of its file name in
//! the effects directory. The fragment must pick out exactly one file.

use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Resolve `name` to the one effect file in `dir` whose name contains it
pub async fn resolve_effect(dir: &Path, name: &str) -> Result<PathBuf> {
    let needle = name.trim().to_lowercase();
    if needle.is_empty() {
        return Err(Error::AssetNotFound(name.to_string()));
    }

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!(dir = %dir.display(), error = %e, "Cannot list effects");
            return Err(Error::AssetNotFound(name.to_string()));
        }
    };

    let mut matches: Vec<String> = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name.to_lowercase().contains(&needle) {
            matches.push(file_name);
        }
    }

    match matches.len() {
        0 => Err(Error::AssetNotFound(name.to_string())),
        1 => Ok(dir.join(matches.remove(0))),
        _ => {
            matches.sort();
            Err(Error::AmbiguousAsset {
                name: name.to_string(),
                candidates: matches,
            })
        }
    }
}
