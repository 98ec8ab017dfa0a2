use crate::matcher::SourceSet;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path};

pub const VARS_FILE: &str = "vars.js";
pub const GALLERY_FILE: &str = "gallery.html";
const VARS_PREFIX: &str = "var files = ";

static GALLERY_HTML: &str = include_str!("../assets/gallery.html");

/// Root-relative, `/`-separated video paths in walk order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Manifest {
    pub files: Vec<String>,
}

impl Manifest {
    pub fn from_sources(root: &Path, sources: &SourceSet) -> Self {
        Self {
            files: sources
                .iter()
                .map(|s| relative_path(root, s.path()))
                .collect(),
        }
    }

    pub fn to_script(&self) -> Result<String> {
        Ok(format!("{}{}", VARS_PREFIX, serde_json::to_string(&self.files)?))
    }

    #[cfg(test)]
    pub fn from_script(script: &str) -> Result<Self> {
        let json = script
            .trim()
            .strip_prefix(VARS_PREFIX)
            .context("manifest does not start with `var files = `")?;
        Ok(serde_json::from_str(json.trim_end_matches(';'))?)
    }
}

/// Path of `p` below `root`, joined with `/`. Paths outside `root` are kept
/// as given.
fn relative_path(root: &Path, p: &Path) -> String {
    let Ok(rel) = p.strip_prefix(root) else {
        return p.to_string_lossy().to_string();
    };
    rel.components()
        .filter_map(|c| match c {
            Component::Normal(s) => Some(s.to_string_lossy().to_string()),
            _ => None,
        })
        .collect::<Vec<_>>()
        .join("/")
}

/// Writes `vars.js` and the gallery page into `root`, replacing previous
/// copies.
pub fn write(root: &Path, sources: &SourceSet) -> Result<Manifest> {
    let manifest = Manifest::from_sources(root, sources);
    let vars = root.join(VARS_FILE);
    std::fs::write(&vars, manifest.to_script()?)
        .with_context(|| format!("writing list to {}", vars.display()))?;

    let gallery = root.join(GALLERY_FILE);
    std::fs::write(&gallery, GALLERY_HTML)
        .with_context(|| format!("writing {}", gallery.display()))?;
    Ok(manifest)
}
