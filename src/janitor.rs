use crate::matcher::SourceSet;
use crate::thumbnail::THUMB_SUFFIX;

use anyhow::{Context, Result};
use std::collections::HashSet;
use std::path::Path;
use tracing::info;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JanitorReport {
    pub kept: usize,
    pub removed: Vec<String>,
}

/// Deletes every entry of `thumbs_dir` whose name minus `.png` is not the
/// basename of a current source. Sources are compared by basename only, so
/// two videos with the same name in different folders share one thumbnail.
///
/// Any failure is returned: a thumbnail folder we cannot clean is a broken
/// derived state.
pub fn reconcile(thumbs_dir: &Path, sources: &SourceSet) -> Result<JanitorReport> {
    let mut report = JanitorReport::default();
    if !thumbs_dir.exists() {
        return Ok(report);
    }

    let live = sources
        .iter()
        .map(|s| s.file_name())
        .collect::<HashSet<_>>();

    let mut entries = std::fs::read_dir(thumbs_dir)
        .with_context(|| format!("listing {}", thumbs_dir.display()))?
        .collect::<std::io::Result<Vec<_>>>()
        .with_context(|| format!("listing {}", thumbs_dir.display()))?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let name = entry.file_name().to_string_lossy().to_string();
        let stem = name.strip_suffix(THUMB_SUFFIX).unwrap_or(&name);
        if live.contains(stem) {
            report.kept += 1;
            continue;
        }

        let path = entry.path();
        let is_dir = entry
            .file_type()
            .with_context(|| format!("stat {}", path.display()))?
            .is_dir();
        let removed = if is_dir {
            std::fs::remove_dir_all(&path)
        } else {
            std::fs::remove_file(&path)
        };
        removed.with_context(|| format!("removing stale thumbnail {}", path.display()))?;
        info!(path = %path.display(), "removed stale thumbnail");
        report.removed.push(name);
    }
    Ok(report)
}
