//! # pdfium-auto
//!
//! Find a [PDFium](https://pdfium.googlesource.com/pdfium/) library for
//! `pdfium-render`, downloading and caching one on first use so the pdf2zip
//! server and CLI run without a manual install.
//!
//! ## Resolution order
//!
//! 1. A path already resolved in this process. With the `bundled` feature,
//!    `ensure_pdfium_bundled` sets it to the extracted embedded library.
//! 2. `PDFIUM_LIB_PATH`: a library file, or a directory holding the
//!    platform library.
//! 3. `{cache}/pdf2zip/pdfium-{VERSION}/`, see [`pdfium_cache_dir`].
//! 4. Download of the platform `.tgz` from
//!    [bblanchon/pdfium-binaries](https://github.com/bblanchon/pdfium-binaries)
//!    into that cache.
//!
//! ```rust,no_run
//! let path = pdfium_auto::ensure_pdfium_library(Some(&|done, total| {
//!     eprint!("\r{done}/{} bytes", total.unwrap_or(0));
//! }))?;
//! let pdfium = pdfium_auto::bind_pdfium_from_path(&path)?;
//! # Ok::<(), pdfium_auto::PdfiumAutoError>(())
//! ```

use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use pdfium_render::prelude::Pdfium;
use thiserror::Error;

#[cfg(feature = "bundled")]
mod bundled {
    include!(concat!(env!("OUT_DIR"), "/bundled.rs"));
}

/// pdfium-binaries release tag (`chromium/{VERSION}`).
pub const PDFIUM_VERSION: &str = "7690";

const BASE_URL: &str = "https://github.com/bblanchon/pdfium-binaries/releases/download";

/// Download progress: `(bytes_so_far, total_if_known)`.
pub type DownloadProgress<'a> = &'a dyn Fn(u64, Option<u64>);

#[derive(Error, Debug)]
pub enum PdfiumAutoError {
    #[error("Unsupported platform: {os}/{arch}")]
    UnsupportedPlatform { os: String, arch: String },

    #[error("Cache directory error: {0}")]
    CacheDir(#[source] std::io::Error),

    #[error("Download failed: {0}")]
    Download(String),

    #[error("Archive extraction failed: {0}")]
    Extract(String),

    #[error("No PDFium library at '{}'", .0.display())]
    NotFound(PathBuf),

    #[error("Failed to bind PDFium from '{path}': {reason}")]
    Bind { path: PathBuf, reason: String },
}

// ── Platform ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Platform {
    /// Release asset, e.g. `pdfium-linux-x64.tgz`.
    archive: &'static str,
    /// Library path inside the archive.
    member: &'static str,
}

impl Platform {
    fn detect() -> Result<Self, PdfiumAutoError> {
        Self::for_target(std::env::consts::OS, std::env::consts::ARCH)
    }

    fn for_target(os: &str, arch: &str) -> Result<Self, PdfiumAutoError> {
        let archive = match (os, arch) {
            ("macos", "aarch64") => "pdfium-mac-arm64.tgz",
            ("macos", "x86_64") => "pdfium-mac-x64.tgz",
            ("linux", "x86_64") => "pdfium-linux-x64.tgz",
            ("linux", "aarch64") => "pdfium-linux-arm64.tgz",
            ("windows", "x86_64") => "pdfium-win-x64.tgz",
            ("windows", "aarch64") => "pdfium-win-arm64.tgz",
            ("windows", "x86") => "pdfium-win-x86.tgz",
            _ => {
                return Err(PdfiumAutoError::UnsupportedPlatform {
                    os: os.to_string(),
                    arch: arch.to_string(),
                })
            }
        };
        let member = match os {
            "macos" => "lib/libpdfium.dylib",
            "windows" => "bin/pdfium.dll",
            _ => "lib/libpdfium.so",
        };
        Ok(Self { archive, member })
    }

    fn lib_name(&self) -> &'static str {
        self.member.rsplit('/').next().unwrap_or(self.member)
    }
}

// ── Paths ────────────────────────────────────────────────────────────────────

/// Per-version cache directory.
///
/// `PDFIUM_AUTO_CACHE_DIR` replaces the platform cache root
/// (`~/.cache`, `~/Library/Caches`, `%LOCALAPPDATA%`).
pub fn pdfium_cache_dir() -> PathBuf {
    let version_dir = format!("pdfium-{PDFIUM_VERSION}");
    if let Some(root) = std::env::var_os("PDFIUM_AUTO_CACHE_DIR") {
        return PathBuf::from(root).join(version_dir);
    }
    dirs::cache_dir()
        .or_else(|| dirs::home_dir().map(|h| h.join(".cache")))
        .unwrap_or_else(std::env::temp_dir)
        .join("pdf2zip")
        .join(version_dir)
}

/// Resolve a library file, or a directory holding the platform library.
pub fn library_at(path: &Path) -> Result<PathBuf, PdfiumAutoError> {
    let candidate = if path.is_dir() {
        Pdfium::pdfium_platform_library_name_at_path(path)
    } else {
        path.to_path_buf()
    };
    if candidate.is_file() {
        Ok(candidate)
    } else {
        Err(PdfiumAutoError::NotFound(candidate))
    }
}

fn env_library() -> Option<PathBuf> {
    let raw = std::env::var_os("PDFIUM_LIB_PATH")?;
    library_at(Path::new(&raw)).ok()
}

fn cached_library() -> Option<PathBuf> {
    let platform = Platform::detect().ok()?;
    let path = pdfium_cache_dir().join(platform.lib_name());
    path.is_file().then_some(path)
}

/// The library that would be used, if it is already on disk.
pub fn cached_pdfium_path() -> Option<PathBuf> {
    RESOLVED.get().cloned().or_else(env_library).or_else(cached_library)
}

/// `true` when no download is needed.
pub fn is_pdfium_cached() -> bool {
    cached_pdfium_path().is_some()
}

// ── Resolution ───────────────────────────────────────────────────────────────

static RESOLVED: OnceLock<PathBuf> = OnceLock::new();

/// Make sure a library is on disk and return its path, downloading it on
/// first use. Later calls in the process return the same path immediately.
///
/// Blocking; call from `spawn_blocking` or `block_in_place`.
pub fn ensure_pdfium_library(
    on_progress: Option<DownloadProgress<'_>>,
) -> Result<PathBuf, PdfiumAutoError> {
    if let Some(path) = cached_pdfium_path() {
        let _ = RESOLVED.set(path.clone());
        return Ok(path);
    }

    let platform = Platform::detect()?;
    let dir = pdfium_cache_dir();
    let dest = dir.join(platform.lib_name());
    std::fs::create_dir_all(&dir).map_err(PdfiumAutoError::CacheDir)?;

    let url = format!("{BASE_URL}/chromium%2F{PDFIUM_VERSION}/{}", platform.archive);
    let archive = download(&url, on_progress)?;
    extract_member(&archive, platform.member, &dest)?;

    let _ = RESOLVED.set(dest.clone());
    Ok(dest)
}

/// Write the embedded library to the cache (once) and make it the resolved
/// library for this process.
#[cfg(feature = "bundled")]
pub fn ensure_pdfium_bundled() -> Result<PathBuf, PdfiumAutoError> {
    if let Some(path) = RESOLVED.get() {
        return Ok(path.clone());
    }
    let platform = Platform::detect()?;
    let dir = pdfium_cache_dir();
    let dest = dir.join(platform.lib_name());

    let up_to_date = std::fs::metadata(&dest)
        .map(|m| m.len() == bundled::PDFIUM_BYTES.len() as u64)
        .unwrap_or(false);
    if !up_to_date {
        std::fs::create_dir_all(&dir).map_err(PdfiumAutoError::CacheDir)?;
        // Renamed into place; readers never see a partial file.
        let partial = dir.join(format!("{}.partial", platform.lib_name()));
        std::fs::write(&partial, bundled::PDFIUM_BYTES).map_err(PdfiumAutoError::CacheDir)?;
        std::fs::rename(&partial, &dest).map_err(PdfiumAutoError::CacheDir)?;
    }

    let _ = RESOLVED.set(dest.clone());
    Ok(dest)
}

// ── Binding ──────────────────────────────────────────────────────────────────

/// Bind to the library at `path` (file or directory). No download.
pub fn bind_pdfium_from_path(path: &Path) -> Result<Pdfium, PdfiumAutoError> {
    let lib = library_at(path)?;
    Pdfium::bind_to_library(&lib)
        .map(Pdfium::new)
        .map_err(|e| PdfiumAutoError::Bind {
            path: lib,
            reason: e.to_string(),
        })
}

/// Bind, downloading first if needed.
pub fn bind_pdfium(on_progress: Option<DownloadProgress<'_>>) -> Result<Pdfium, PdfiumAutoError> {
    let path = ensure_pdfium_library(on_progress)?;
    bind_pdfium_from_path(&path)
}

pub fn bind_pdfium_silent() -> Result<Pdfium, PdfiumAutoError> {
    bind_pdfium(None)
}

// ── Download + extract ───────────────────────────────────────────────────────

fn download(url: &str, on_progress: Option<DownloadProgress<'_>>) -> Result<Vec<u8>, PdfiumAutoError> {
    let client = reqwest::blocking::Client::builder()
        .user_agent(concat!("pdfium-auto/", env!("CARGO_PKG_VERSION")))
        .redirect(reqwest::redirect::Policy::limited(5))
        .build()
        .map_err(|e| PdfiumAutoError::Download(e.to_string()))?;

    let mut response = client
        .get(url)
        .send()
        .map_err(|e| PdfiumAutoError::Download(format!("GET {url}: {e}")))?;
    if !response.status().is_success() {
        return Err(PdfiumAutoError::Download(format!(
            "HTTP {} for {url}",
            response.status()
        )));
    }

    let total = response.content_length();
    let mut buf = Vec::with_capacity(total.unwrap_or(32 * 1024 * 1024) as usize);
    let mut chunk = vec![0u8; 64 * 1024];
    loop {
        match response.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                buf.extend_from_slice(&chunk[..n]);
                if let Some(cb) = on_progress {
                    cb(buf.len() as u64, total);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PdfiumAutoError::Download(format!("Read error: {e}"))),
        }
    }
    Ok(buf)
}

/// Unpack one `member` of a `.tgz` to `dest`.
fn extract_member(archive: &[u8], member: &str, dest: &Path) -> Result<(), PdfiumAutoError> {
    let extract = |e: std::io::Error| PdfiumAutoError::Extract(e.to_string());
    let mut tar = tar::Archive::new(flate2::read::GzDecoder::new(archive));

    for entry in tar.entries().map_err(extract)? {
        let mut entry = entry.map_err(extract)?;
        if &*entry.path().map_err(extract)? == Path::new(member) {
            entry.unpack(dest).map_err(extract)?;
            return Ok(());
        }
    }
    Err(PdfiumAutoError::Extract(format!(
        "'{member}' not found in archive"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_targets_map_to_release_assets() {
        let linux = Platform::for_target("linux", "x86_64").unwrap();
        assert_eq!(linux.archive, "pdfium-linux-x64.tgz");
        assert_eq!(linux.lib_name(), "libpdfium.so");

        let mac = Platform::for_target("macos", "aarch64").unwrap();
        assert_eq!(mac.member, "lib/libpdfium.dylib");

        let win = Platform::for_target("windows", "x86").unwrap();
        assert_eq!(win.lib_name(), "pdfium.dll");
    }

    #[test]
    fn unknown_target_is_rejected() {
        assert!(matches!(
            Platform::for_target("haiku", "riscv64"),
            Err(PdfiumAutoError::UnsupportedPlatform { .. })
        ));
    }

    #[test]
    fn cache_dir_is_versioned() {
        let dir = pdfium_cache_dir();
        assert_eq!(dir, pdfium_cache_dir());
        assert!(dir.ends_with(format!("pdfium-{PDFIUM_VERSION}")));
    }

    #[test]
    fn library_at_accepts_file_or_directory() {
        let dir = tempfile::tempdir().unwrap();
        let lib = Pdfium::pdfium_platform_library_name_at_path(dir.path());
        std::fs::write(&lib, b"not really a library").unwrap();

        assert_eq!(library_at(dir.path()).unwrap(), lib);
        assert_eq!(library_at(&lib).unwrap(), lib);
    }

    #[test]
    fn library_at_reports_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            library_at(dir.path()),
            Err(PdfiumAutoError::NotFound(_))
        ));
        assert!(matches!(
            bind_pdfium_from_path(&dir.path().join("libpdfium.so")),
            Err(PdfiumAutoError::NotFound(_))
        ));
    }

    #[test]
    fn extract_finds_the_named_member() {
        let mut builder = tar::Builder::new(flate2::write::GzEncoder::new(
            Vec::new(),
            flate2::Compression::fast(),
        ));
        let body = b"pdfium bytes";
        let mut header = tar::Header::new_gnu();
        header.set_size(body.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder
            .append_data(&mut header, "lib/libpdfium.so", &body[..])
            .unwrap();
        let tgz = builder.into_inner().unwrap().finish().unwrap();

        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("libpdfium.so");
        extract_member(&tgz, "lib/libpdfium.so", &dest).unwrap();
        assert_eq!(std::fs::read(&dest).unwrap(), body);

        assert!(matches!(
            extract_member(&tgz, "bin/pdfium.dll", &dest),
            Err(PdfiumAutoError::Extract(_))
        ));
    }
}
