//! Rendering error types.

use speculum_core::{CameraId, MirrorError};
use thiserror::Error;

use crate::backend::TextureHandle;

/// Errors that can occur while producing or compositing a reflection.
#[derive(Error, Debug)]
pub enum RenderError {
    /// The request was rejected before anything was rendered.
    #[error("configuration error: {0}")]
    Configuration(#[from] MirrorError),

    /// A render target could not be allocated.
    #[error("render target creation failed: {0}")]
    TargetCreationFailed(String),

    /// Out of memory.
    #[error("out of memory")]
    OutOfMemory,

    /// A texture handle does not refer to a live target.
    #[error("unknown render target {0:?}")]
    UnknownTarget(TextureHandle),

    /// The camera was never created by this backend or has been released.
    #[error("unknown camera {0:?}")]
    UnknownCamera(CameraId),

    /// A target could not be copied back to the CPU.
    #[error("failed to read back render target")]
    ReadbackFailed,

    /// Failed to create wgpu adapter.
    #[error("failed to create graphics adapter")]
    AdapterCreationFailed,

    /// Failed to create wgpu device.
    #[error("failed to create graphics device: {0}")]
    DeviceCreationFailed(#[from] wgpu::RequestDeviceError),
}

impl RenderError {
    /// Returns true for resource failures, after which the mirror keeps
    /// showing its last good image.
    pub fn is_resource(&self) -> bool {
        matches!(
            self,
            RenderError::TargetCreationFailed(_) | RenderError::OutOfMemory
        )
    }
}

/// A specialized Result type for rendering operations.
pub type RenderResult<T> = std::result::Result<T, RenderError>;
