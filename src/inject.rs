use crate::executor::Outcome;
use crate::matcher::SourceFile;
use crate::rename::tagged_path;
use crate::tools;
use crate::work::DeriveError;

use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{info, warn};

/// Stereo layout written into every injected file.
pub const STEREO_MODE: &str = "left-right";

/// How to invoke Google's spatial-media injector.
#[derive(Debug, Clone)]
pub struct Injector {
    pub python: PathBuf,
    /// Unpacked spatial-media checkout; its `spatialmedia` package is run as
    /// a script.
    pub checkout: PathBuf,
}

impl Injector {
    fn command(&self, input: &Path, output: &Path) -> Command {
        let mut cmd = Command::new(&self.python);
        cmd.arg(self.checkout.join("spatialmedia"))
            .args(["-i", "-s", STEREO_MODE])
            .arg(input)
            .arg(output);
        cmd
    }
}

/// Rewrites `source` with spherical/stereo metadata into its tagged sibling
/// and removes the original once the tool succeeded.
///
/// The tagged file is the done-marker. If the tool fails the original is kept
/// and any partial output removed, so a later run retries.
pub fn add_spatial_media(source: &SourceFile, injector: &Injector) -> Result<Outcome, DeriveError> {
    let original = source.path();
    let Some(tagged) = tagged_path(original) else {
        return Ok(Outcome::Skipped);
    };
    if tagged.exists() {
        if original.exists() {
            warn!(
                original = %original.display(),
                tagged = %tagged.display(),
                "tagged copy already present, leaving original in place"
            );
        }
        return Ok(Outcome::Skipped);
    }
    if !original.exists() {
        return Err(DeriveError::Missing {
            original: original.to_path_buf(),
            tagged,
        });
    }

    let mut cmd = injector.command(original, &tagged);
    if let Err(err) = tools::run(&mut cmd, &injector.python) {
        if tagged.exists() {
            std::fs::remove_file(&tagged)
                .map_err(|e| DeriveError::io("remove partial output", &tagged, e))?;
        }
        return Err(err);
    }

    std::fs::remove_file(original).map_err(|e| DeriveError::io("remove original", original, e))?;
    info!(path = %tagged.display(), "spatial media metadata written");
    Ok(Outcome::Done)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::fs;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    /// Stands in for the python interpreter: `$1` is the script path, the
    /// last two arguments are input and output.
    fn fake_python(dir: &Path, body: &str) -> PathBuf {
        let path = dir.join("fake-python");
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).expect("write fake");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        path
    }

    fn injector(python: PathBuf, dir: &Path) -> Injector {
        Injector {
            python,
            checkout: dir.join("spatial-media"),
        }
    }

    #[test]
    fn success_replaces_original_with_tagged_copy() {
        let tmp = TempDir::new().expect("tempdir");
        let py = fake_python(
            tmp.path(),
            r#"[ "$3" = "-s" ] && [ "$4" = "left-right" ] || exit 9; cp "$5" "$6""#,
        );
        let clip = tmp.path().join("clip.mp4");
        fs::write(&clip, b"video").expect("write");

        let outcome =
            add_spatial_media(&SourceFile::new(&clip), &injector(py, tmp.path())).expect("inject");
        assert_eq!(outcome, Outcome::Done);
        assert!(!clip.exists());
        assert_eq!(
            fs::read(tmp.path().join("clip_180x180_3dh.mp4")).expect("read"),
            b"video"
        );
    }

    #[test]
    fn failure_keeps_original_and_leaves_no_output() {
        let tmp = TempDir::new().expect("tempdir");
        let py = fake_python(tmp.path(), r#"echo partial > "$6"; echo "bad atom" >&2; exit 3"#);
        let clip = tmp.path().join("clip.mp4");
        fs::write(&clip, b"video").expect("write");

        let err = add_spatial_media(&SourceFile::new(&clip), &injector(py, tmp.path()))
            .expect_err("tool fails");
        match err {
            DeriveError::ToolFailed { stderr, .. } => assert!(stderr.contains("bad atom")),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(fs::read(&clip).expect("read"), b"video");
        assert!(!tmp.path().join("clip_180x180_3dh.mp4").exists());
    }

    #[test]
    fn tagged_marker_means_done() {
        let tmp = TempDir::new().expect("tempdir");
        let py = fake_python(tmp.path(), "exit 1");
        let clip = tmp.path().join("clip.mp4");
        fs::write(&clip, b"video").expect("write");
        fs::write(tmp.path().join("clip_180x180_3dh.mp4"), b"done").expect("write");

        let inj = injector(py, tmp.path());
        assert_eq!(
            add_spatial_media(&SourceFile::new(&clip), &inj).expect("skip"),
            Outcome::Skipped
        );
        assert_eq!(
            add_spatial_media(
                &SourceFile::new(tmp.path().join("clip_180x180_3dh.mp4")),
                &inj
            )
            .expect("skip"),
            Outcome::Skipped
        );
        assert!(clip.exists());
    }

    #[test]
    fn neither_original_nor_marker_is_an_error() {
        let tmp = TempDir::new().expect("tempdir");
        let py = fake_python(tmp.path(), "exit 0");
        let err = add_spatial_media(
            &SourceFile::new(tmp.path().join("gone.mp4")),
            &injector(py, tmp.path()),
        )
        .expect_err("gap");
        assert!(matches!(err, DeriveError::Missing { .. }));
    }
}
