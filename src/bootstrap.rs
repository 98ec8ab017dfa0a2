//! One-time fetch of Google's spatial-media injector.
//!
//! The checkout lives in `<tool_dir>/spatial-media`. Its presence is the only
//! marker, and the check-then-create is not guarded against two processes
//! bootstrapping the same directory at once.

use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::info;

pub const SPATIAL_MEDIA_URL: &str =
    "https://github.com/google/spatial-media/archive/refs/tags/v2.1.zip";
const ARCHIVE_NAME: &str = "spatial-media.zip";
const UNPACKED_NAME: &str = "spatial-media-2.1";
const CHECKOUT_NAME: &str = "spatial-media";
const DOWNLOAD_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("download failed: {0}")]
    DownloadFailed(String),

    #[error("extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("archive did not contain {0}")]
    UnexpectedLayout(PathBuf),

    #[error("{op} {path}: {source}")]
    Io {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type BootstrapResult<T> = Result<T, BootstrapError>;

fn io_err(op: &'static str, path: &Path) -> impl FnOnce(std::io::Error) -> BootstrapError {
    let path = path.to_path_buf();
    move |source| BootstrapError::Io { op, path, source }
}

pub fn checkout_dir(tool_dir: &Path) -> PathBuf {
    tool_dir.join(CHECKOUT_NAME)
}

/// Returns the spatial-media checkout, downloading and unpacking it first if
/// it is not there yet.
pub fn ensure_spatial_media(tool_dir: &Path) -> BootstrapResult<PathBuf> {
    ensure_spatial_media_from(tool_dir, SPATIAL_MEDIA_URL)
}

pub fn ensure_spatial_media_from(tool_dir: &Path, url: &str) -> BootstrapResult<PathBuf> {
    let checkout = checkout_dir(tool_dir);
    if checkout.exists() {
        return Ok(checkout);
    }
    std::fs::create_dir_all(tool_dir).map_err(io_err("create", tool_dir))?;

    let archive = tool_dir.join(ARCHIVE_NAME);
    info!(url, dest = %archive.display(), "downloading spatial-media");
    download_file_blocking(url, &archive, DOWNLOAD_TIMEOUT_SECS)?;
    install_from_archive(&archive, tool_dir)?;
    std::fs::remove_file(&archive).map_err(io_err("remove", &archive))?;
    info!(path = %checkout.display(), "spatial-media ready");
    Ok(checkout)
}

/// Unpacks `archive` into `tool_dir` and moves the versioned top-level
/// folder to the checkout location.
pub fn install_from_archive(archive: &Path, tool_dir: &Path) -> BootstrapResult<PathBuf> {
    extract_zip(archive, tool_dir)?;
    let unpacked = tool_dir.join(UNPACKED_NAME);
    if !unpacked.is_dir() {
        return Err(BootstrapError::UnexpectedLayout(unpacked));
    }
    let checkout = checkout_dir(tool_dir);
    std::fs::rename(&unpacked, &checkout).map_err(io_err("rename", &unpacked))?;
    Ok(checkout)
}

fn download_file_blocking(url: &str, output: &Path, timeout_secs: u64) -> BootstrapResult<()> {
    let client = reqwest::blocking::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .map_err(|e| BootstrapError::DownloadFailed(e.to_string()))?;

    let response = client
        .get(url)
        .send()
        .map_err(|e| BootstrapError::DownloadFailed(format!("request failed: {}", e)))?;

    if !response.status().is_success() {
        return Err(BootstrapError::DownloadFailed(format!(
            "HTTP {}: {}",
            response.status(),
            url
        )));
    }

    let bytes = response
        .bytes()
        .map_err(|e| BootstrapError::DownloadFailed(format!("failed to read response: {}", e)))?;

    let mut file = File::create(output).map_err(io_err("create", output))?;
    file.write_all(&bytes).map_err(io_err("write", output))?;
    Ok(())
}

fn extract_zip(archive: &Path, output: &Path) -> BootstrapResult<()> {
    let file = File::open(archive).map_err(io_err("open", archive))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| BootstrapError::ExtractionFailed(format!("failed to open zip: {}", e)))?;

    archive
        .extract(output)
        .map_err(|e| BootstrapError::ExtractionFailed(format!("failed to extract zip: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;
    use zip::write::SimpleFileOptions;

    fn write_archive(path: &Path, top: &str) {
        let file = File::create(path).expect("create zip");
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file(format!("{}/spatialmedia/__main__.py", top), SimpleFileOptions::default())
            .expect("start file");
        zip.write_all(b"print('hi')\n").expect("write entry");
        zip.finish().expect("finish zip");
    }

    #[test]
    fn existing_checkout_needs_no_network() {
        let tmp = TempDir::new().expect("tempdir");
        fs::create_dir_all(tmp.path().join("spatial-media")).expect("mkdir");
        // An unroutable URL proves nothing is fetched.
        let got = ensure_spatial_media_from(tmp.path(), "http://127.0.0.1:9/none.zip")
            .expect("already bootstrapped");
        assert_eq!(got, tmp.path().join("spatial-media"));
    }

    #[test]
    fn archive_is_unpacked_into_checkout() {
        let tmp = TempDir::new().expect("tempdir");
        let archive = tmp.path().join("sm.zip");
        write_archive(&archive, UNPACKED_NAME);

        let checkout = install_from_archive(&archive, tmp.path()).expect("install");
        assert!(checkout.join("spatialmedia/__main__.py").is_file());
        assert!(!tmp.path().join(UNPACKED_NAME).exists());
    }

    #[test]
    fn unexpected_top_folder_is_rejected() {
        let tmp = TempDir::new().expect("tempdir");
        let archive = tmp.path().join("sm.zip");
        write_archive(&archive, "something-else");

        let err = install_from_archive(&archive, tmp.path()).expect_err("wrong layout");
        assert!(matches!(err, BootstrapError::UnexpectedLayout(_)));
    }

    #[test]
    fn failed_download_is_an_error() {
        let tmp = TempDir::new().expect("tempdir");
        let err = ensure_spatial_media_from(&tmp.path().join("tools"), "http://127.0.0.1:9/none.zip")
            .expect_err("nothing listens on the discard port");
        assert!(matches!(err, BootstrapError::DownloadFailed(_)));
    }
}
