//! # File Management Module
//!
//! Questo modulo gestisce la discovery delle immagini e il layout su disco di una run.
//!
//! ## Responsabilità:
//! - Discovery (non ricorsiva) delle immagini nella directory di lavoro
//! - Riconoscimento formato tramite estensione (PNG, TIFF, TGA, WebP)
//! - Calcolo del base name con mapping esplicito estensione → lunghezza suffisso
//! - Layout della directory di lavoro (`WebPs/`, `xmpdata_tmp/`, `WebpLogs/`)
//! - Creazione/rimozione directory e sostituzione degli originali
//!
//! ## Esempio:
//! ```rust,no_run
//! use cwd_webp_converter::file_manager::{FileManager, WorkDirLayout};
//!
//! let layout = WorkDirLayout::new(".");
//! let files = FileManager::find_images(layout.root(), false).unwrap();
//! for file in &files {
//!     println!("{} -> {}", file.path().display(), layout.output_path_for(file).display());
//! }
//! ```

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::error::ConvertError;

/// Directory holding converted outputs
pub const OUTPUT_DIR: &str = "WebPs";
/// Scratch directory for sidecar XMP files, removed at the end of a run
pub const SCRATCH_DIR: &str = "xmpdata_tmp";
/// Root of the per-run log directories
pub const LOG_ROOT: &str = "WebpLogs";

/// Input formats understood by the converter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceFormat {
    Png,
    Tiff,
    Tga,
    Webp,
}

impl SourceFormat {
    /// Formats collected by default; WebP only when explicitly included
    pub fn accepted(include_webp: bool) -> &'static [SourceFormat] {
        if include_webp {
            &[Self::Png, Self::Tiff, Self::Tga, Self::Webp]
        } else {
            &[Self::Png, Self::Tiff, Self::Tga]
        }
    }

    fn from_image_format(format: image::ImageFormat) -> Option<Self> {
        match format {
            image::ImageFormat::Png => Some(Self::Png),
            image::ImageFormat::Tiff => Some(Self::Tiff),
            image::ImageFormat::Tga => Some(Self::Tga),
            image::ImageFormat::WebP => Some(Self::Webp),
            _ => None,
        }
    }
}

impl fmt::Display for SourceFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Png => "PNG",
            Self::Tiff => "TIFF",
            Self::Tga => "TGA",
            Self::Webp => "WEBP",
        };
        f.write_str(name)
    }
}

/// Known extensions and the format they select. The suffix stripped from a
/// file name is the extension plus its dot, so `tiff`/`webp` strip 5 chars
/// while `png`/`tif`/`tga` strip 4.
const KNOWN_EXTENSIONS: &[&str] = &["png", "tiff", "tif", "tga", "webp"];

/// An image discovered in the working directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageFile {
    path: PathBuf,
    base_name: String,
    format: SourceFormat,
}

impl ImageFile {
    /// Recognise an image from its path. Returns `None` for unknown extensions,
    /// non UTF-8 names and names no longer than their extension suffix.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let name = path.file_name()?.to_str()?;
        let (base_name, format) = split_known_extension(name)?;

        Some(Self {
            base_name: base_name.to_string(),
            format,
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name without its format extension
    pub fn base_name(&self) -> &str {
        &self.base_name
    }

    pub fn format(&self) -> SourceFormat {
        self.format
    }

    /// File name as shown to the operator
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| self.path.display().to_string())
    }
}

/// Split `name` into (base name, format) using the known extension table
fn split_known_extension(name: &str) -> Option<(&str, SourceFormat)> {
    let (stem, ext) = name.rsplit_once('.')?;
    let ext_lower = ext.to_ascii_lowercase();
    if !KNOWN_EXTENSIONS.contains(&ext_lower.as_str()) {
        return None;
    }

    let suffix_len = ext.len() + 1;
    if name.len() <= suffix_len || stem.is_empty() {
        return None;
    }

    let format = image::ImageFormat::from_extension(&ext_lower)
        .and_then(SourceFormat::from_image_format)?;

    Some((&name[..name.len() - suffix_len], format))
}

/// Paths of a working directory used by a run
#[derive(Debug, Clone)]
pub struct WorkDirLayout {
    root: PathBuf,
    output_dir: PathBuf,
    scratch_dir: PathBuf,
    log_root: PathBuf,
}

impl WorkDirLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            output_dir: root.join(OUTPUT_DIR),
            scratch_dir: root.join(SCRATCH_DIR),
            log_root: root.join(LOG_ROOT),
            root,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn scratch_dir(&self) -> &Path {
        &self.scratch_dir
    }

    pub fn log_root(&self) -> &Path {
        &self.log_root
    }

    /// `WebPs/<base>.webp`
    pub fn output_path_for(&self, file: &ImageFile) -> PathBuf {
        self.output_dir.join(format!("{}.webp", file.base_name()))
    }

    /// `xmpdata_tmp/<base>.xmp`
    pub fn sidecar_path_for(&self, file: &ImageFile) -> PathBuf {
        self.scratch_dir.join(format!("{}.xmp", file.base_name()))
    }
}

/// File system helpers for a conversion run
pub struct FileManager;

impl FileManager {
    /// Find the images of the accepted formats directly inside `dir`, sorted by file name
    pub fn find_images(dir: &Path, include_webp: bool) -> Result<Vec<ImageFile>, ConvertError> {
        Self::find_formats(dir, SourceFormat::accepted(include_webp))
    }

    /// Find files of the given formats directly inside `dir`, sorted by file name
    pub fn find_formats(
        dir: &Path,
        formats: &[SourceFormat],
    ) -> Result<Vec<ImageFile>, ConvertError> {
        if !dir.is_dir() {
            return Err(ConvertError::WorkDir(format!("{} is not a directory", dir.display())));
        }

        let files: Vec<ImageFile> = WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_type().is_file())
            .filter_map(|e| ImageFile::from_path(e.into_path()))
            .filter(|f| formats.contains(&f.format()))
            .collect();

        debug!("Found {} images in {}", files.len(), dir.display());
        Ok(files)
    }

    /// Split files into those kept and those whose base name was already taken
    /// by an earlier file. Both would be written to the same `WebPs/<base>.webp`
    /// and `xmpdata_tmp/<base>.xmp`, so only the first one is converted.
    pub fn split_base_name_collisions(
        files: Vec<ImageFile>,
    ) -> (Vec<ImageFile>, Vec<ImageFile>) {
        let mut seen = HashSet::new();
        files
            .into_iter()
            .partition(|f| seen.insert(f.base_name().to_string()))
    }

    /// Create a directory, tolerating one that already exists
    pub async fn make_dir(path: &Path) -> Result<(), ConvertError> {
        match fs::create_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists && path.is_dir() => Ok(()),
            Err(source) => Err(ConvertError::CreateDir {
                path: path.to_path_buf(),
                source,
            }),
        }
    }

    /// Remove a directory tree if present
    pub async fn remove_dir(path: &Path) -> Result<(), ConvertError> {
        match fs::remove_dir_all(path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Number of entries in a directory (0 if it does not exist)
    pub async fn count_entries(path: &Path) -> Result<usize, ConvertError> {
        let mut entries = match fs::read_dir(path).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(e.into()),
        };
        let mut count = 0;
        while entries.next_entry().await?.is_some() {
            count += 1;
        }
        Ok(count)
    }

    /// Put the converted output next to the original and remove the original.
    ///
    /// The output is copied to `<original dir>/<base>.webp`. When that is the
    /// original itself (WebP input) it is overwritten in place. A failed copy
    /// leaves the original untouched.
    pub async fn replace_with_converted(
        original: &ImageFile,
        converted: &Path,
    ) -> Result<PathBuf, ConvertError> {
        let parent = original.path().parent().unwrap_or(Path::new(""));
        let destination = parent.join(format!("{}.webp", original.base_name()));

        if let Err(e) = fs::copy(converted, &destination).await {
            if destination != original.path() {
                Self::remove_partial(&destination).await;
            }
            return Err(e.into());
        }

        if destination != original.path() {
            fs::remove_file(original.path()).await?;
        }
        Ok(destination)
    }

    async fn remove_partial(path: &Path) {
        match fs::remove_file(path).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!("Could not remove partial copy {}: {}", path.display(), e),
        }
    }
}
