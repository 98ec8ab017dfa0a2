use crate::executor::Outcome;
use crate::matcher::SourceFile;
use crate::tools::MediaTools;
use crate::work::DeriveError;

use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const THUMB_SUFFIX: &str = ".png";

/// `<thumbs_dir>/<basename>.png`
pub fn thumb_path(thumbs_dir: &Path, source: &SourceFile) -> PathBuf {
    thumbs_dir.join(format!("{}{}", source.file_name(), THUMB_SUFFIX))
}

/// Grabs the middle frame of `source` into its thumbnail unless one exists.
///
/// Existence is the only freshness test: a thumbnail is never regenerated
/// for a source that changed in place. A failed probe is tolerated and the
/// first frame is used instead.
pub fn create_thumb(
    source: &SourceFile,
    thumbs_dir: &Path,
    tools: &MediaTools,
) -> Result<Outcome, DeriveError> {
    let thumb = thumb_path(thumbs_dir, source);
    if thumb.exists() {
        return Ok(Outcome::Skipped);
    }
    info!(path = %source.path().display(), "generating thumbnail");

    let duration = tools.probe_duration(source.path()).unwrap_or_else(|err| {
        warn!(
            path = %source.path().display(),
            error = %err,
            "could not read video duration, using first frame"
        );
        0.0
    });

    // A leftover file would pass for a finished thumbnail on the next run.
    if let Err(err) = tools.extract_frame(source.path(), seek_offset(duration), &thumb) {
        if thumb.exists() {
            std::fs::remove_file(&thumb)
                .map_err(|e| DeriveError::io("remove partial thumbnail", &thumb, e))?;
        }
        return Err(err);
    }
    Ok(Outcome::Done)
}

pub fn seek_offset(duration_secs: f64) -> f64 {
    duration_secs / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn thumb_is_named_after_full_basename() {
        let src = SourceFile::new("/videos/nested/a.mp4");
        assert_eq!(
            thumb_path(Path::new("/videos/thumbs"), &src),
            PathBuf::from("/videos/thumbs/a.mp4.png")
        );
    }

    #[test]
    fn seek_is_midpoint_and_zero_when_unknown() {
        assert_eq!(seek_offset(10.0), 5.0);
        assert_eq!(seek_offset(0.0), 0.0);
    }

    #[test]
    fn existing_thumbnail_skips_without_running_tools() {
        let tmp = TempDir::new().expect("tempdir");
        let thumbs = tmp.path().join("thumbs");
        fs::create_dir_all(&thumbs).expect("mkdir");
        fs::write(thumbs.join("a.mp4.png"), b"png").expect("write thumb");

        // Unspawnable tools prove nothing was invoked.
        let tools = MediaTools {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ffprobe: PathBuf::from("/nonexistent/ffprobe"),
        };
        let src = SourceFile::new(tmp.path().join("a.mp4"));
        let outcome = create_thumb(&src, &thumbs, &tools).expect("skip");
        assert_eq!(outcome, Outcome::Skipped);
        assert_eq!(fs::read(thumbs.join("a.mp4.png")).expect("read"), b"png");
    }

    #[test]
    fn transcode_failure_is_a_unit_error() {
        let tmp = TempDir::new().expect("tempdir");
        let tools = MediaTools {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ffprobe: PathBuf::from("/nonexistent/ffprobe"),
        };
        let src = SourceFile::new(tmp.path().join("a.mp4"));
        let err = create_thumb(&src, tmp.path(), &tools).expect_err("no ffmpeg");
        assert!(matches!(err, DeriveError::Spawn { .. }));
        assert!(!tmp.path().join("a.mp4.png").exists());
    }

    /// Fake ffmpeg: logs its arguments next to itself, then runs `body` with
    /// `$last` bound to the output path.
    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, body: &str) -> (PathBuf, PathBuf) {
        use std::os::unix::fs::PermissionsExt;
        let log = dir.join("ffmpeg.log");
        let path = dir.join("fake-ffmpeg");
        let script = format!(
            "#!/bin/sh\necho \"$@\" >> '{}'\nfor last; do :; done\n{}\n",
            log.display(),
            body
        );
        fs::write(&path, script).expect("write fake");
        fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).expect("chmod");
        (path, log)
    }

    #[cfg(unix)]
    fn run_with_fake(body: &str) -> (TempDir, PathBuf, Result<Outcome, DeriveError>) {
        let tmp = TempDir::new().expect("tempdir");
        let (ffmpeg, log) = fake_ffmpeg(tmp.path(), body);
        let thumbs = tmp.path().join("thumbs");
        fs::create_dir_all(&thumbs).expect("mkdir");
        let tools = MediaTools {
            ffmpeg,
            ffprobe: PathBuf::from("/nonexistent/ffprobe"),
        };
        let src = SourceFile::new(tmp.path().join("a.mp4"));
        let result = create_thumb(&src, &thumbs, &tools);
        (tmp, log, result)
    }

    #[cfg(unix)]
    #[test]
    fn failed_probe_still_extracts_the_first_frame() {
        let (tmp, log, result) = run_with_fake("printf png > \"$last\"");

        assert_eq!(result.expect("extract despite probe failure"), Outcome::Done);
        assert!(tmp.path().join("thumbs/a.mp4.png").is_file());
        let args = fs::read_to_string(log).expect("ffmpeg log");
        assert!(args.contains("-ss 0.000000"), "ffmpeg args: {args}");
    }

    #[cfg(unix)]
    #[test]
    fn clean_exit_without_output_is_a_unit_error() {
        let (tmp, _log, result) = run_with_fake("exit 0");

        let err = result.expect_err("nothing written");
        assert!(matches!(err, DeriveError::NoOutput { .. }), "{err}");
        assert!(!tmp.path().join("thumbs/a.mp4.png").exists());
    }

    #[cfg(unix)]
    #[test]
    fn partial_thumbnail_is_removed_after_failure() {
        let (tmp, _log, result) = run_with_fake("printf half > \"$last\"\nexit 1");

        let err = result.expect_err("ffmpeg failed");
        assert!(matches!(err, DeriveError::ToolFailed { .. }), "{err}");
        assert!(!tmp.path().join("thumbs/a.mp4.png").exists());
    }
}
