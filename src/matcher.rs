use anyhow::{Context, Result};
use regex::Regex;
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;
use walkdir::WalkDir;

const VIDEO_PATTERN: &str = r"(?i)\.(mp4|mov|mpg|mpeg|avi)$";

/// A video discovered by a directory walk. Identity is the path.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceFile {
    path: PathBuf,
}

impl SourceFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last path component, used to name derived artifacts.
    pub fn file_name(&self) -> String {
        self.path
            .file_name()
            .map(|s| s.to_string_lossy().to_string())
            .unwrap_or_default()
    }
}

/// Ordered result of one walk. Re-derive it after anything renames files on
/// disk; never patch it in place.
pub type SourceSet = Vec<SourceFile>;

fn video_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(VIDEO_PATTERN).expect("valid video pattern"))
}

pub fn is_video_name(name: &OsStr) -> bool {
    video_regex().is_match(&name.to_string_lossy())
}

/// Recursively lists every non-directory entry under `root` whose name has a
/// video extension. Entries are visited in file-name order so repeated walks
/// agree. Any traversal error aborts the walk.
pub fn list_videos(root: &Path) -> Result<SourceSet> {
    let mut out = vec![];
    for entry in WalkDir::new(root).sort_by_file_name() {
        let e = entry.with_context(|| format!("walking {}", root.display()))?;
        if e.file_type().is_dir() {
            continue;
        }
        if is_video_name(e.file_name()) {
            out.push(SourceFile::new(e.path()));
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn names(set: &SourceSet, root: &Path) -> Vec<String> {
        set.iter()
            .map(|s| {
                s.path()
                    .strip_prefix(root)
                    .expect("under root")
                    .to_string_lossy()
                    .replace('\\', "/")
            })
            .collect()
    }

    #[test]
    fn matches_video_extensions_case_insensitively() {
        for name in ["a.mp4", "B.MOV", "c.Mpg", "d.mpeg", "e.AVI"] {
            assert!(is_video_name(OsStr::new(name)), "{name} should match");
        }
        for name in ["notes.txt", "a.mp4.png", "mp4", "clip.mkv", "x.mp4 "] {
            assert!(!is_video_name(OsStr::new(name)), "{name} should not match");
        }
    }

    #[test]
    fn walk_is_recursive_and_skips_directories() {
        let tmp = TempDir::new().expect("tempdir");
        let root = tmp.path();
        fs::create_dir_all(root.join("nested/deeper")).expect("mkdir");
        fs::create_dir_all(root.join("folder.mp4")).expect("mkdir video-named dir");
        fs::write(root.join("a.mp4"), b"a").expect("write");
        fs::write(root.join("b.mov"), b"b").expect("write");
        fs::write(root.join("notes.txt"), b"n").expect("write");
        fs::write(root.join("nested/c.AVI"), b"c").expect("write");
        fs::write(root.join("nested/deeper/d.mpeg"), b"d").expect("write");
        fs::write(root.join("folder.mp4/inner.mpg"), b"i").expect("write");

        let found = list_videos(root).expect("walk");
        assert_eq!(
            names(&found, root),
            vec![
                "a.mp4",
                "b.mov",
                "folder.mp4/inner.mpg",
                "nested/c.AVI",
                "nested/deeper/d.mpeg",
            ]
        );

        let again = list_videos(root).expect("walk again");
        assert_eq!(found, again);
    }

    #[test]
    fn missing_root_is_an_error() {
        let tmp = TempDir::new().expect("tempdir");
        assert!(list_videos(&tmp.path().join("absent")).is_err());
    }
}
