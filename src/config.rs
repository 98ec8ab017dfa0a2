use crate::autotune;
use crate::progress::{ProgressConfig, ProgressMode};
use crate::tools::MediaTools;

use std::path::PathBuf;

pub const THUMBS_DIR: &str = "thumbs";

/// Which optional passes run before serving.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Passes {
    pub rename: bool,
    pub spatial_media: bool,
    pub thumbnails: bool,
}

/// Everything a run needs, resolved from the command line.
#[derive(Debug, Clone)]
pub struct RunConfig {
    pub root: PathBuf,
    pub port: u16,
    pub concurrency: usize,
    pub passes: Passes,
    pub tools: MediaTools,
    pub python: PathBuf,
    pub tool_dir: PathBuf,
    pub serve: bool,
    pub progress: ProgressConfig,
}

/// Raw flag values as parsed.
#[derive(Debug, Clone)]
pub struct RawConfig {
    pub root: PathBuf,
    pub port: u16,
    pub concurrency: usize,
    pub passes: Passes,
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub python: PathBuf,
    pub tool_dir: PathBuf,
    pub no_serve: bool,
    pub progress: ProgressMode,
}

impl RunConfig {
    pub fn resolve(raw: RawConfig) -> Self {
        let concurrency = match raw.concurrency {
            0 => autotune::auto_concurrency(),
            n => n,
        };
        Self {
            root: raw.root,
            port: raw.port,
            concurrency,
            passes: raw.passes,
            tools: MediaTools {
                ffmpeg: raw.ffmpeg,
                ffprobe: raw.ffprobe,
            },
            python: raw.python,
            tool_dir: raw.tool_dir,
            serve: !raw.no_serve,
            progress: ProgressConfig::new(raw.progress),
        }
    }

    pub fn thumbs_dir(&self) -> PathBuf {
        self.root.join(THUMBS_DIR)
    }
}
