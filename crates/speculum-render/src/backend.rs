//! Interfaces the mirror pipeline needs from the host renderer.
//!
//! The host engine owns cameras, textures, materials and command streams.
//! The mirror pipeline only ever talks to it through these traits, with
//! opaque handles.

use speculum_core::{CameraId, CameraStage, ReflectedState};

use crate::error::RenderResult;

/// Handle to a color render target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TextureHandle(u64);

impl TextureHandle {
    /// Wraps a backend-side texture identifier.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Handle to a material instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MaterialId(u64);

impl MaterialId {
    /// Wraps a backend-side material identifier.
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    pub const fn raw(self) -> u64 {
        self.0
    }
}

/// Capability for a command attached to a camera.
///
/// Not `Clone`: there is exactly one owner per attachment, and
/// [`CommandScheduler::detach`] consumes it.
#[must_use = "an attached command must be detached before the mirror goes away"]
#[derive(Debug, PartialEq, Eq, Hash)]
pub struct CommandHandle {
    id: u64,
    camera: CameraId,
}

impl CommandHandle {
    /// Creates a handle; only backends should call this.
    pub const fn new(id: u64, camera: CameraId) -> Self {
        Self { id, camera }
    }

    /// Returns the backend-side command identifier.
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Returns the camera the command is attached to.
    pub const fn camera(&self) -> CameraId {
        self.camera
    }
}

/// Description of a render target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetDescriptor {
    /// Debug label.
    pub label: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Depth buffer precision, 0 for none.
    pub depth_bits: u32,
}

impl TargetDescriptor {
    /// Creates a descriptor.
    pub fn new(label: impl Into<String>, width: u32, height: u32, depth_bits: u32) -> Self {
        Self {
            label: label.into(),
            width,
            height,
            depth_bits,
        }
    }

    /// Returns whether two descriptors allocate the same kind of target.
    ///
    /// Labels are ignored.
    pub fn is_compatible(&self, other: &TargetDescriptor) -> bool {
        self.width == other.width && self.height == other.height && self.depth_bits == other.depth_bits
    }
}

/// One texture-to-texture copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureCopy {
    /// Texture read from.
    pub source: TextureHandle,
    /// Texture written to.
    pub destination: TextureHandle,
}

/// Work a mirror schedules on a consuming camera's command stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompositeCommand {
    /// Debug label.
    pub label: String,
    /// Copies executed in order.
    pub copies: Vec<TextureCopy>,
}

/// Render target allocation.
pub trait TargetAllocator {
    /// Creates a render target.
    ///
    /// If `reuse` is a live target compatible with `desc` it is returned
    /// unchanged and nothing is allocated.
    fn create_target(
        &mut self,
        desc: &TargetDescriptor,
        reuse: Option<TextureHandle>,
    ) -> RenderResult<TextureHandle>;

    /// Destroys a render target. Unknown handles are ignored.
    fn release_target(&mut self, handle: TextureHandle);

    /// Returns whether `handle` refers to a live target.
    fn is_live(&self, handle: TextureHandle) -> bool;
}

/// Scene rendering from an arbitrary camera.
pub trait SceneRenderer {
    /// Creates an off-screen camera.
    fn create_camera(&mut self, label: &str) -> CameraId;

    /// Destroys a camera created by [`SceneRenderer::create_camera`].
    fn release_camera(&mut self, camera: CameraId);

    /// Returns whether front-face winding is currently inverted.
    fn winding_inverted(&self) -> bool;

    /// Sets the process-wide winding inversion flag.
    ///
    /// Prefer [`crate::winding::InvertedWinding`], which restores the flag.
    fn set_winding_inverted(&mut self, inverted: bool);

    /// Renders the scene from `camera` using `state` into `target`.
    fn render(
        &mut self,
        camera: CameraId,
        state: &ReflectedState,
        target: TextureHandle,
    ) -> RenderResult<()>;
}

/// Material texture binding.
pub trait MaterialSink {
    /// Creates a material instance.
    fn create_material(&mut self, label: &str) -> MaterialId;

    /// Destroys a material instance. Unknown handles are ignored.
    fn release_material(&mut self, material: MaterialId);

    /// Binds `texture` to the slot named `slot` of `material`.
    fn set_texture(&mut self, material: MaterialId, slot: &str, texture: TextureHandle);
}

/// Commands attached to foreign cameras.
pub trait CommandScheduler {
    /// Attaches `command` to `camera`, to run at `stage` every time the
    /// camera renders, until detached.
    fn attach(
        &mut self,
        camera: CameraId,
        stage: CameraStage,
        command: CompositeCommand,
    ) -> RenderResult<CommandHandle>;

    /// Removes an attached command.
    fn detach(&mut self, handle: CommandHandle);
}

/// Everything the mirror pipeline needs from a host renderer.
pub trait RenderBackend: TargetAllocator + SceneRenderer + MaterialSink + CommandScheduler {}

impl<T> RenderBackend for T where T: TargetAllocator + SceneRenderer + MaterialSink + CommandScheduler {}
