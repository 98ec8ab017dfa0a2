use crate::executor::Outcome;
use crate::inject::{self, Injector};
use crate::matcher::SourceFile;
use crate::rename;
use crate::thumbnail;
use crate::tools::MediaTools;

use std::io;
use std::path::PathBuf;
use std::process::ExitStatus;
use std::sync::Arc;
use thiserror::Error;

/// Per-unit failure. Logged by the executor; never fails a pass.
#[derive(Debug, Error)]
pub enum DeriveError {
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    ToolFailed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{program} printed no usable duration: {output:?}")]
    Unparsable { program: String, output: String },

    #[error("{program} exited cleanly but wrote no {path}")]
    NoOutput { program: String, path: PathBuf },

    #[error("refusing to overwrite existing {0}")]
    TargetExists(PathBuf),

    #[error("neither {original} nor {tagged} exists")]
    Missing { original: PathBuf, tagged: PathBuf },

    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl DeriveError {
    pub fn io(op: &'static str, path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            op,
            path: path.into(),
            source,
        }
    }
}

/// One derivation to perform on one source file.
#[derive(Debug, Clone)]
pub enum WorkUnit {
    Thumbnail {
        source: SourceFile,
        thumbs_dir: PathBuf,
        tools: Arc<MediaTools>,
    },
    Rename {
        source: SourceFile,
    },
    InjectMetadata {
        source: SourceFile,
        injector: Arc<Injector>,
    },
}

impl WorkUnit {
    pub fn kind(&self) -> &'static str {
        match self {
            WorkUnit::Thumbnail { .. } => "thumbnail",
            WorkUnit::Rename { .. } => "rename",
            WorkUnit::InjectMetadata { .. } => "inject",
        }
    }

    pub fn source(&self) -> &SourceFile {
        match self {
            WorkUnit::Thumbnail { source, .. }
            | WorkUnit::Rename { source }
            | WorkUnit::InjectMetadata { source, .. } => source,
        }
    }

    /// Label shown in progress output and attached to failure logs.
    pub fn label(&self) -> String {
        format!("{} {}", self.kind(), self.source().file_name())
    }

    pub fn run(self) -> Result<Outcome, DeriveError> {
        match self {
            WorkUnit::Thumbnail {
                source,
                thumbs_dir,
                tools,
            } => thumbnail::create_thumb(&source, &thumbs_dir, &tools),
            WorkUnit::Rename { source } => rename::rename(&source),
            WorkUnit::InjectMetadata { source, injector } => {
                inject::add_spatial_media(&source, &injector)
            }
        }
    }
}
