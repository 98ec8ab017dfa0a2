mod autotune;
mod bootstrap;
mod config;
mod executor;
mod inject;
mod janitor;
mod manifest;
mod matcher;
mod pipeline;
mod progress;
mod rename;
mod server;
mod thumbnail;
mod tools;
mod work;

use anyhow::{Context, Result};
use clap::Parser;
use config::{Passes, RawConfig, RunConfig};
use pipeline::{ThumbnailJob, ThumbnailReport};
use progress::{format_duration, ProgressMode};
use std::path::PathBuf;
use tracing::{error, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "vidgallery",
    version,
    about = "Scan a folder for videos, build a browsable gallery with thumbnails, and serve it over HTTP"
)]
struct Cli {
    /// Port to serve on
    #[arg(short, long, env = "VIDGALLERY_PORT", default_value_t = 8282)]
    port: u16,

    /// Static file folder to scan and serve
    #[arg(short = 'd', long = "dir", env = "VIDGALLERY_DIR", default_value = ".")]
    dir: PathBuf,

    /// Maximum number of external tools running at once (0 = auto)
    #[arg(short, long, env = "VIDGALLERY_CONCURRENCY", default_value_t = 2)]
    concurrency: usize,

    /// Generate thumbnails into <dir>/thumbs and drop stale ones
    #[arg(short, long, env = "VIDGALLERY_GENERATE", default_value_t = false)]
    generate: bool,

    /// Rename videos, adding the _180x180_3dh suffix
    #[arg(short, long, env = "VIDGALLERY_RENAME", default_value_t = false)]
    rename: bool,

    /// Add spatial media (left-right stereo) metadata to videos
    #[arg(short = 's', long, env = "VIDGALLERY_SPATIAL_MEDIA", default_value_t = false)]
    spatial_media: bool,

    /// ffmpeg binary used to extract thumbnail frames
    #[arg(long, env = "VIDGALLERY_FFMPEG", default_value = "ffmpeg")]
    ffmpeg: PathBuf,

    /// ffprobe binary used to read video durations
    #[arg(long, env = "VIDGALLERY_FFPROBE", default_value = "ffprobe")]
    ffprobe: PathBuf,

    /// Python interpreter that runs the spatial-media injector
    #[arg(long, env = "VIDGALLERY_PYTHON", default_value = "python2.7")]
    python: PathBuf,

    /// Where the spatial-media injector is downloaded to
    #[arg(long, env = "VIDGALLERY_TOOL_DIR", default_value = "tmp")]
    tool_dir: PathBuf,

    /// Run all passes (thumbnails included) in the foreground, then exit
    #[arg(long, env = "VIDGALLERY_NO_SERVE", default_value_t = false)]
    no_serve: bool,

    /// Progress display mode: auto (TTY-aware), rich, plain, quiet.
    #[arg(long, value_enum, env = "VIDGALLERY_PROGRESS", default_value_t = ProgressMode::Auto)]
    progress: ProgressMode,
}

impl Cli {
    fn into_raw(self) -> RawConfig {
        RawConfig {
            root: self.dir,
            port: self.port,
            concurrency: self.concurrency,
            passes: Passes {
                rename: self.rename,
                spatial_media: self.spatial_media,
                thumbnails: self.generate,
            },
            ffmpeg: self.ffmpeg,
            ffprobe: self.ffprobe,
            python: self.python,
            tool_dir: self.tool_dir,
            no_serve: self.no_serve,
            progress: self.progress,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing();

    let cfg = RunConfig::resolve(cli.into_raw());
    if cfg.passes.thumbnails {
        for program in cfg.tools.missing() {
            warn!(program = %program.display(), "not runnable; thumbnails will fail");
        }
    }

    let sources = pipeline::prepare(&cfg)?;

    if !cfg.serve {
        let thumbs = if cfg.passes.thumbnails {
            Some(pipeline::thumbnail_pass(&cfg, &sources)?)
        } else {
            None
        };
        print_summary(&cfg, sources.len(), thumbs.as_ref());
        return Ok(());
    }

    if cfg.passes.thumbnails {
        let job = ThumbnailJob::spawn(cfg.clone(), sources);
        // Serving does not wait for thumbnails, but a janitor failure still
        // takes the whole process down.
        std::thread::spawn(move || {
            if let Err(err) = job.join() {
                error!(error = %format!("{:#}", err), "thumbnail pass failed");
                std::process::exit(1);
            }
        });
    }

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting async runtime")?
        .block_on(server::serve(&cfg.root, cfg.port))
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn print_summary(cfg: &RunConfig, video_count: usize, thumbs: Option<&ThumbnailReport>) {
    match thumbs {
        Some(report) => println!(
            "Gallery summary: root={} videos={} workers={} thumbnails={} done={} skipped={} failed={} removed={} duration={}",
            cfg.root.display(),
            video_count,
            cfg.concurrency,
            report.pass.submitted,
            report.pass.done,
            report.pass.skipped,
            report.pass.failed,
            report.janitor.removed.len(),
            format_duration(report.pass.elapsed),
        ),
        None => println!(
            "Gallery summary: root={} videos={} workers={} thumbnails=off",
            cfg.root.display(),
            video_count,
            cfg.concurrency,
        ),
    }
    for name in thumbs.map(|r| r.janitor.removed.as_slice()).unwrap_or_default() {
        println!("  removed: {}", name);
    }
}
