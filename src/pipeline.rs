use crate::bootstrap;
use crate::config::RunConfig;
use crate::executor::{BoundedExecutor, PassSummary};
use crate::inject::Injector;
use crate::janitor::{self, JanitorReport};
use crate::manifest;
use crate::matcher::{self, SourceSet};
use crate::progress::{format_duration, ProgressConfig, ProgressReporter};
use crate::work::WorkUnit;

use anyhow::{anyhow, Context, Result};
use std::collections::HashSet;
use std::sync::Arc;
use std::thread::JoinHandle;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThumbnailReport {
    pub pass: PassSummary,
    pub janitor: JanitorReport,
}

/// Runs the mutating passes the config asks for and writes the manifest.
/// Returns the final source set, re-walked after every pass that may have
/// changed names on disk.
pub fn prepare(cfg: &RunConfig) -> Result<SourceSet> {
    let mut sources = matcher::list_videos(&cfg.root)?;
    info!(root = %cfg.root.display(), count = sources.len(), "found videos");

    if cfg.passes.rename {
        rename_pass(cfg, sources);
        sources = matcher::list_videos(&cfg.root)?;
    }
    if cfg.passes.spatial_media {
        inject_pass(cfg, sources)?;
        sources = matcher::list_videos(&cfg.root)?;
    }

    let manifest = manifest::write(&cfg.root, &sources)?;
    info!(files = manifest.files.len(), "wrote {}", manifest::VARS_FILE);
    Ok(sources)
}

pub fn rename_pass(cfg: &RunConfig, sources: SourceSet) -> PassSummary {
    let units = sources
        .into_iter()
        .map(|source| WorkUnit::Rename { source })
        .collect();
    run_pass("rename", units, cfg.concurrency, cfg.progress)
}

/// Bootstraps the injector, then tags every source with stereo metadata.
/// Bootstrap failures are fatal; per-file failures are not.
pub fn inject_pass(cfg: &RunConfig, sources: SourceSet) -> Result<PassSummary> {
    let checkout = bootstrap::ensure_spatial_media(&cfg.tool_dir)
        .context("bootstrapping spatial-media")?;
    let injector = Arc::new(Injector {
        python: cfg.python.clone(),
        checkout,
    });
    let units = sources
        .into_iter()
        .map(|source| WorkUnit::InjectMetadata {
            source,
            injector: Arc::clone(&injector),
        })
        .collect();
    Ok(run_pass("spatial-media", units, cfg.concurrency, cfg.progress))
}

/// Generates missing thumbnails, then evicts the ones whose source is gone.
///
/// Sources sharing a basename share a thumbnail; only the first of them gets
/// a unit so no two workers write the same file.
pub fn thumbnail_pass(cfg: &RunConfig, sources: &SourceSet) -> Result<ThumbnailReport> {
    let thumbs_dir = cfg.thumbs_dir();
    std::fs::create_dir_all(&thumbs_dir)
        .with_context(|| format!("creating {}", thumbs_dir.display()))?;

    let tools = Arc::new(cfg.tools.clone());
    let mut seen = HashSet::new();
    let units = sources
        .iter()
        .filter(|source| {
            let first = seen.insert(source.file_name());
            if !first {
                debug!(path = %source.path().display(), "thumbnail shared with an earlier source");
            }
            first
        })
        .cloned()
        .map(|source| WorkUnit::Thumbnail {
            source,
            thumbs_dir: thumbs_dir.clone(),
            tools: Arc::clone(&tools),
        })
        .collect();
    let pass = run_pass("thumbnails", units, cfg.concurrency, cfg.progress);

    let janitor = janitor::reconcile(&thumbs_dir, sources)?;
    info!(kept = janitor.kept, removed = janitor.removed.len(), "thumbnails reconciled");
    Ok(ThumbnailReport { pass, janitor })
}

/// Dispatches every unit through a fresh executor and waits for all of them.
pub fn run_pass(
    label: &str,
    units: Vec<WorkUnit>,
    concurrency: usize,
    progress_cfg: ProgressConfig,
) -> PassSummary {
    let reporter = ProgressReporter::new(label, units.len() as u64, progress_cfg);
    let progress = reporter.handle();
    let mut exec = BoundedExecutor::new(concurrency, progress.clone());
    progress.set_stage(format!("{} files, {} workers", units.len(), exec.limit()));

    for unit in units {
        let path = unit.source().path().to_path_buf();
        exec.submit(unit.label(), move || {
            unit.run().with_context(|| path.display().to_string())
        });
    }
    let summary = exec.wait();
    let outcome = reporter.finish(format!("{} complete", label));

    info!(
        pass = label,
        submitted = summary.submitted,
        done = summary.done,
        skipped = summary.skipped,
        failed = summary.failed,
        duration = %format_duration(summary.elapsed),
        warnings = outcome.warnings.len(),
        "pass finished"
    );
    if outcome.finished_units < outcome.total_units {
        warn!(
            pass = label,
            finished = outcome.finished_units,
            total = outcome.total_units,
            "not every unit reported back"
        );
    }

    summary
}

/// Background thumbnail pass. Production never waits on it; its completion
/// is still observable.
pub struct ThumbnailJob {
    handle: JoinHandle<Result<ThumbnailReport>>,
}

impl ThumbnailJob {
    pub fn spawn(cfg: RunConfig, sources: SourceSet) -> Self {
        let handle = std::thread::spawn(move || thumbnail_pass(&cfg, &sources));
        Self { handle }
    }

    pub fn join(self) -> Result<ThumbnailReport> {
        self.handle
            .join()
            .map_err(|_| anyhow!("thumbnail pass panicked"))?
    }
}
