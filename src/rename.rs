use crate::executor::Outcome;
use crate::matcher::SourceFile;
use crate::work::DeriveError;

use std::path::{Path, PathBuf};
use tracing::info;

/// Marks side-by-side 180° footage for headset players.
pub const TAG: &str = "_180x180_3dh";

/// The tagged sibling of `path` (`clip.mp4` -> `clip_180x180_3dh.mp4`), or
/// `None` when the name already carries the tag.
pub fn tagged_path(path: &Path) -> Option<PathBuf> {
    let name = path.file_name()?.to_string_lossy().to_string();
    // `.mp4` is all extension: the stem is empty, not the whole name.
    let (stem, ext) = match name.rfind('.') {
        Some(dot) => name.split_at(dot),
        None => (name.as_str(), ""),
    };
    if stem.ends_with(TAG) {
        return None;
    }
    Some(path.with_file_name(format!("{}{}{}", stem, TAG, ext)))
}

pub fn rename(source: &SourceFile) -> Result<Outcome, DeriveError> {
    let Some(target) = tagged_path(source.path()) else {
        return Ok(Outcome::Skipped);
    };
    // rename(2) replaces silently; a tagged file of the same name is
    // somebody else's data.
    if target.exists() {
        return Err(DeriveError::TargetExists(target));
    }
    std::fs::rename(source.path(), &target)
        .map_err(|e| DeriveError::io("rename", source.path(), e))?;
    info!(from = %source.path().display(), to = %target.display(), "renamed");
    Ok(Outcome::Done)
}
