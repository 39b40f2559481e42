//! Error types for speculum.

use thiserror::Error;

/// The main error type for speculum core operations.
///
/// Everything except [`MirrorError::Io`] and [`MirrorError::Json`] is a
/// configuration error: the input was rejected at the call boundary and no
/// render was attempted.
#[derive(Error, Debug)]
pub enum MirrorError {
    /// The mirror transform does not define a usable plane (zero scale,
    /// zero-length normal or a rotation that cannot be normalized).
    #[error("degenerate mirror plane")]
    DegeneratePlane,

    /// A pose, projection or offset contained NaN or infinity.
    #[error("non-finite {0}")]
    NonFinite(&'static str),

    /// The viewer snapshot is malformed (bad field of view or clip range).
    #[error("invalid viewer state: {0}")]
    InvalidViewer(String),

    /// A stereo render was requested but the viewer carries no eye parameters.
    #[error("stereo render requested without per-eye parameters")]
    MissingEyeParameters,

    /// The mirror options failed validation.
    #[error("invalid mirror options: {0}")]
    InvalidOptions(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl MirrorError {
    /// Returns true for errors that reject caller input rather than report an
    /// environmental failure.
    pub fn is_configuration(&self) -> bool {
        !matches!(self, MirrorError::Io(_) | MirrorError::Json(_))
    }
}

/// A specialized Result type for speculum core operations.
pub type Result<T> = std::result::Result<T, MirrorError>;

/// Rejects vectors, quaternions or matrices containing NaN or infinity.
pub(crate) fn ensure_finite(finite: bool, what: &'static str) -> Result<()> {
    if finite {
        Ok(())
    } else {
        Err(MirrorError::NonFinite(what))
    }
}
