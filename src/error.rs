//! Error types for unfold.
//!
//! Every fallible operation in the crate returns [`Result`]. Errors are grouped
//! into a small taxonomy ([`ErrorKind`]) that callers use to decide whether a
//! failure is fatal for one mesh, recoverable for one island, or a
//! configuration mistake.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`MeshError`].
pub type Result<T> = std::result::Result<T, MeshError>;

/// Errors that can occur while loading, unwrapping or reporting on meshes.
#[derive(Error, Debug)]
pub enum MeshError {
    /// The mesh has no triangles.
    #[error("mesh has no triangles")]
    EmptyMesh,

    /// A triangle references a vertex index outside the vertex array.
    #[error("triangle {face} references vertex {vertex}, but the mesh has {vertex_count} vertices")]
    InvalidVertexIndex {
        /// The triangle index.
        face: usize,
        /// The out-of-range vertex index.
        vertex: usize,
        /// Number of vertices in the mesh.
        vertex_count: usize,
    },

    /// A triangle uses the same vertex more than once.
    #[error("triangle {face} is degenerate (repeats a vertex index)")]
    DegenerateFace {
        /// The triangle index.
        face: usize,
    },

    /// A triangle has (numerically) zero area.
    #[error("triangle {face} has zero area ({area:e})")]
    ZeroAreaFace {
        /// The triangle index.
        face: usize,
        /// The computed area.
        area: f64,
    },

    /// UV coordinates do not match the vertex count.
    #[error("mesh has {vertices} vertices but {uvs} UV coordinates")]
    UvCountMismatch {
        /// Number of vertices.
        vertices: usize,
        /// Number of UV coordinates supplied.
        uvs: usize,
    },

    /// The conformal system cannot be pinned into a well-posed problem.
    #[error("singular conformal system: {reason}")]
    SingularSystem {
        /// What made the system rank-deficient.
        reason: String,
    },

    /// The island margin leaves no room for any island.
    #[error("island margin {margin} does not fit in the unit square")]
    PackingOverflow {
        /// The requested margin.
        margin: f64,
    },

    /// Iterative solver did not converge.
    #[error("solver failed to converge after {iterations} iterations")]
    ConvergenceFailed {
        /// Number of iterations attempted.
        iterations: usize,
    },

    /// Invalid parameter value.
    #[error("invalid parameter: {name} = {value} ({reason})")]
    InvalidParameter {
        /// Parameter name.
        name: &'static str,
        /// The invalid value (as string).
        value: String,
        /// Reason the value is invalid.
        reason: &'static str,
    },

    /// File I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error loading a mesh from file.
    #[error("failed to load mesh from {path}: {message}")]
    LoadError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Error saving a mesh to file.
    #[error("failed to save mesh to {path}: {message}")]
    SaveError {
        /// The file path.
        path: PathBuf,
        /// Error message.
        message: String,
    },

    /// Unsupported file format.
    #[error("unsupported file format: {extension}")]
    UnsupportedFormat {
        /// The file extension.
        extension: String,
    },

    /// JSON (de)serialization of reports or parameters failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Coarse classification of a [`MeshError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Bad indices or degenerate geometry. Fatal for that mesh.
    MalformedMesh,
    /// The solver could not produce a well-posed system for an island.
    SingularSystem,
    /// The packing configuration is infeasible.
    PackingOverflow,
    /// Missing input, unwritable output, unparsable file.
    Io,
    /// A parameter is outside its valid range.
    InvalidParameter,
}

impl MeshError {
    /// Create an invalid parameter error.
    pub fn invalid_param<T: std::fmt::Display>(
        name: &'static str,
        value: T,
        reason: &'static str,
    ) -> Self {
        MeshError::InvalidParameter {
            name,
            value: value.to_string(),
            reason,
        }
    }

    /// Create a singular-system error.
    pub fn singular(reason: impl Into<String>) -> Self {
        MeshError::SingularSystem {
            reason: reason.into(),
        }
    }

    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            MeshError::EmptyMesh
            | MeshError::InvalidVertexIndex { .. }
            | MeshError::DegenerateFace { .. }
            | MeshError::ZeroAreaFace { .. }
            | MeshError::UvCountMismatch { .. } => ErrorKind::MalformedMesh,
            MeshError::SingularSystem { .. } | MeshError::ConvergenceFailed { .. } => {
                ErrorKind::SingularSystem
            }
            MeshError::PackingOverflow { .. } => ErrorKind::PackingOverflow,
            MeshError::InvalidParameter { .. } => ErrorKind::InvalidParameter,
            MeshError::Io(_)
            | MeshError::LoadError { .. }
            | MeshError::SaveError { .. }
            | MeshError::UnsupportedFormat { .. }
            | MeshError::Serialization(_) => ErrorKind::Io,
        }
    }

    /// Whether a batch run should record this error and carry on with the
    /// remaining files.
    ///
    /// Configuration errors apply to every job equally, so they are not.
    pub fn is_recoverable_in_batch(&self) -> bool {
        !matches!(
            self.kind(),
            ErrorKind::InvalidParameter | ErrorKind::PackingOverflow
        )
    }
}
