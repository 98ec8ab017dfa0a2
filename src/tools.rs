use crate::work::DeriveError;

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tracing::debug;

/// Frame width of generated thumbnails; height follows the aspect ratio.
pub const THUMB_WIDTH: u32 = 220;

const STDERR_TAIL_LINES: usize = 20;

/// Program locations for the probe and transcode invocations.
#[derive(Debug, Clone)]
pub struct MediaTools {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
}

impl Default for MediaTools {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
        }
    }
}

impl MediaTools {
    /// Returns the programs that do not answer `-version` successfully.
    pub fn missing(&self) -> Vec<PathBuf> {
        [&self.ffmpeg, &self.ffprobe]
            .into_iter()
            .filter(|p| !answers_version(p))
            .cloned()
            .collect()
    }

    /// Duration of the first video stream in seconds.
    pub fn probe_duration(&self, src: &Path) -> Result<f64, DeriveError> {
        let mut cmd = Command::new(&self.ffprobe);
        cmd.args(["-v", "error", "-select_streams", "v:0", "-show_entries"])
            .arg("stream=duration")
            .args(["-of", "default=noprint_wrappers=1:nokey=1"])
            .arg(src);
        let out = run(&mut cmd, &self.ffprobe)?;
        parse_duration(&String::from_utf8_lossy(&out.stdout))
            .ok_or_else(|| DeriveError::Unparsable {
                program: display_program(&self.ffprobe),
                output: String::from_utf8_lossy(&out.stdout).trim().to_string(),
            })
    }

    /// Writes one PNG frame of `src`, taken at `seek_secs`, to `dst`. A clean
    /// exit that leaves no `dst` (seek past the last frame) is an error.
    pub fn extract_frame(&self, src: &Path, seek_secs: f64, dst: &Path) -> Result<(), DeriveError> {
        let mut cmd = Command::new(&self.ffmpeg);
        cmd.args(["-hide_banner", "-loglevel", "error", "-y", "-i"])
            .arg(src)
            .arg("-vf")
            .arg(format!("scale={}:-1", THUMB_WIDTH))
            .args(["-vframes", "1", "-ss"])
            .arg(format!("{:.6}", seek_secs))
            .arg(dst);
        run(&mut cmd, &self.ffmpeg)?;
        if !dst.is_file() {
            return Err(DeriveError::NoOutput {
                program: display_program(&self.ffmpeg),
                path: dst.to_path_buf(),
            });
        }
        Ok(())
    }
}

/// Spawns `cmd`, waits for it, and turns a non-zero exit into an error
/// carrying the tail of stderr.
pub fn run(cmd: &mut Command, program: &Path) -> Result<Output, DeriveError> {
    debug!(command = ?cmd, "spawning");
    let out = cmd.output().map_err(|source| DeriveError::Spawn {
        program: display_program(program),
        source,
    })?;
    if !out.status.success() {
        return Err(DeriveError::ToolFailed {
            program: display_program(program),
            status: out.status,
            stderr: stderr_tail(&out.stderr),
        });
    }
    Ok(out)
}

fn answers_version(program: &Path) -> bool {
    Command::new(program)
        .arg("-version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn display_program(program: &Path) -> String {
    program
        .file_name()
        .unwrap_or(OsStr::new("?"))
        .to_string_lossy()
        .to_string()
}

pub fn parse_duration(stdout: &str) -> Option<f64> {
    let secs = stdout.lines().next()?.trim().parse::<f64>().ok()?;
    (secs.is_finite() && secs >= 0.0).then_some(secs)
}

fn stderr_tail(stderr: &[u8]) -> String {
    let text = String::from_utf8_lossy(stderr);
    let lines = text
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>();
    let start = lines.len().saturating_sub(STDERR_TAIL_LINES);
    let tail = lines[start..].join(" | ");
    if tail.is_empty() {
        "<no stderr>".to_string()
    } else {
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duration_parsing_accepts_decimal_seconds_only() {
        assert_eq!(parse_duration("12.500000\n"), Some(12.5));
        assert_eq!(parse_duration("3\n4\n"), Some(3.0));
        assert_eq!(parse_duration("N/A\n"), None);
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("-1"), None);
    }

    #[test]
    fn stderr_tail_keeps_last_lines() {
        let noisy = (0..30).map(|i| format!("line{}\n", i)).collect::<String>();
        let tail = stderr_tail(noisy.as_bytes());
        assert!(tail.starts_with("line10"));
        assert!(tail.ends_with("line29"));
        assert_eq!(stderr_tail(b"\n\n"), "<no stderr>");
    }

    #[test]
    fn missing_program_reports_spawn_error() {
        let tools = MediaTools {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg"),
            ffprobe: PathBuf::from("/nonexistent/ffprobe"),
        };
        assert_eq!(tools.missing().len(), 2);
        let err = tools
            .probe_duration(Path::new("a.mp4"))
            .expect_err("spawn must fail");
        assert!(matches!(err, DeriveError::Spawn { .. }), "{err}");
    }
}
