//! File I/O.
//!
//! Meshes are read and written as Wavefront OBJ; unwrap parameters as a flat
//! JSON object ([`params`]).
//!
//! # Supported Formats
//!
//! | Format | Extension | Load | Save | Notes |
//! |--------|-----------|------|------|-------|
//! | Wavefront OBJ | `.obj` | ✓ | ✓ | Positions, triangles, per-vertex UVs |
//!
//! # Usage
//!
//! ```no_run
//! use unfold::io::{load, save};
//!
//! let mesh = load("model.obj").unwrap();
//! save(&mesh, "copy.obj").unwrap();
//! ```
//!
//! Every writer goes through a temporary file in the destination directory
//! that is renamed into place once complete, so an interrupted job never
//! leaves a truncated output behind.

pub mod obj;
pub mod params;

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::error::{MeshError, Result};
use crate::mesh::Mesh;

pub use params::{load_params, save_params};

/// Supported mesh file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    /// Wavefront OBJ format.
    Obj,
}

impl Format {
    /// Detect format from file extension.
    pub fn from_extension(ext: &str) -> Option<Format> {
        match ext.to_lowercase().as_str() {
            "obj" => Some(Format::Obj),
            _ => None,
        }
    }

    /// Detect format from file path.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Option<Format> {
        path.as_ref()
            .extension()
            .and_then(|ext| ext.to_str())
            .and_then(Format::from_extension)
    }
}

fn detect(path: &Path) -> Result<Format> {
    Format::from_path(path).ok_or_else(|| MeshError::UnsupportedFormat {
        extension: path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("(none)")
            .to_string(),
    })
}

/// Load a mesh, choosing the format from the file extension.
///
/// # Example
///
/// ```no_run
/// use unfold::io::load;
///
/// let mesh = load("model.obj").unwrap();
/// ```
pub fn load<P: AsRef<Path>>(path: P) -> Result<Mesh> {
    let path = path.as_ref();
    match detect(path)? {
        Format::Obj => obj::load(path),
    }
}

/// Save a mesh, choosing the format from the file extension.
pub fn save<P: AsRef<Path>>(mesh: &Mesh, path: P) -> Result<()> {
    let path = path.as_ref();
    match detect(path)? {
        Format::Obj => obj::save(mesh, path),
    }
}

/// Counter making temporary names unique within the process.
static TEMP_COUNTER: AtomicUsize = AtomicUsize::new(0);

/// A fresh hidden sibling of `path`.
///
/// Two writers targeting the same path never share a temporary file.
fn temp_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
    path.with_file_name(format!(".{}.{}.{}.tmp", name, std::process::id(), n))
}

/// Write a file through a temporary sibling and rename it into place.
///
/// The temporary file is removed if `write` or the rename fails.
pub(crate) fn write_atomic<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut BufWriter<File>) -> Result<()>,
{
    let tmp = temp_path(path);
    let result = File::create(&tmp)
        .map_err(MeshError::from)
        .and_then(|file| {
            let mut w = BufWriter::new(file);
            write(&mut w)?;
            w.flush()?;
            Ok(())
        })
        .and_then(|()| fs::rename(&tmp, path).map_err(MeshError::from));

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}
