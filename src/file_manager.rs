//! # File Management Module
//!
//! Questo modulo gestisce la discovery dei file sorgente e il naming dei file
//! di destinazione.
//!
//! ## Responsabilità:
//! - Discovery NON ricorsiva dei file in una directory (solo figli diretti)
//! - Match case-insensitive dell'estensione (`.heic`, `.HEIC`, `.Heic`)
//! - Ordinamento deterministico per nome, così il planner è riproducibile
//! - Calcolo del nome di destinazione con suffisso di disambiguazione
//!
//! ## Esempio:
//! ```rust,ignore
//! let files = FileManager::find_source_files(Path::new("/photos"), "heic")?;
//! let name = FileManager::destination_file_name(&files[0], "jpg", 0);
//! ```

use std::ffi::OsString;
use std::io;
use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Manages file discovery and naming
pub struct FileManager;

impl FileManager {
    /// Find regular files directly inside `dir` with the given extension, sorted by name.
    ///
    /// Failing to read `dir` itself is an error; an unreadable entry
    /// (e.g. a dangling symlink) is logged and skipped.
    pub fn find_source_files(dir: &Path, extension: &str) -> io::Result<Vec<PathBuf>> {
        let mut files = Vec::new();

        for entry in WalkDir::new(dir)
            .min_depth(1)
            .max_depth(1)
            .follow_links(true)
            .sort_by_file_name()
        {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => return Err(e.into()),
                Err(e) => {
                    warn!("Skipping unreadable entry in {}: {}", dir.display(), e);
                    continue;
                }
            };

            let path = entry.path();
            if entry.file_type().is_file() && Self::has_extension(path, extension) {
                files.push(path.to_path_buf());
            }
        }

        Ok(files)
    }

    /// Case-insensitive extension check
    pub fn has_extension(path: &Path, extension: &str) -> bool {
        path.extension()
            .map(|ext| ext.to_string_lossy().eq_ignore_ascii_case(extension))
            .unwrap_or(false)
    }

    /// `<stem>.<ext>`, or `<stem>_<n>.<ext>` when `n > 0`
    pub fn destination_file_name(source: &Path, extension: &str, n: usize) -> OsString {
        let mut name = source.file_stem().map(OsString::from).unwrap_or_default();
        if n > 0 {
            name.push(format!("_{}", n));
        }
        name.push(".");
        name.push(extension);
        name
    }
}
