//! Draw-notification integration: render, then bind, right before the mirror is drawn.

use speculum_core::{MirrorOptions, ViewerState};

use crate::backend::{MaterialId, MaterialSink, SceneRenderer, TargetAllocator, TextureHandle};
use crate::error::{RenderError, RenderResult};
use crate::reflection_camera::ReflectionCamera;

/// Texture slot layout of a mirror material.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TextureSlots {
    /// One slot shared by both eyes.
    Mono(String),
    /// One slot per eye.
    Stereo { left: String, right: String },
}

impl TextureSlots {
    /// Picks the layout configured in `options`.
    pub fn from_options(options: &MirrorOptions) -> Self {
        if options.stereo {
            TextureSlots::Stereo {
                left: options.slots.left.clone(),
                right: options.slots.right.clone(),
            }
        } else {
            TextureSlots::Mono(options.slots.mono.clone())
        }
    }

    /// Returns true for the per-eye layout.
    pub fn is_stereo(&self) -> bool {
        matches!(self, TextureSlots::Stereo { .. })
    }
}

/// Material the reflection is bound to and its slot layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MaterialBinding {
    pub material: MaterialId,
    pub slots: TextureSlots,
}

/// Textures bound by the last successful update.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoundTextures {
    Mono(TextureHandle),
    /// Left, right.
    Stereo([TextureHandle; 2]),
}

/// Result of a draw notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurfaceUpdate {
    /// The notifying camera is the reflection camera itself.
    Skipped,
    /// The reflection was rendered and bound.
    Bound(BoundTextures),
}

/// A mirror surface that refreshes its material whenever a camera is about to draw it.
#[derive(Debug)]
pub struct MirrorSurface {
    binding: MaterialBinding,
    last_bound: Option<BoundTextures>,
}

impl MirrorSurface {
    pub fn new(binding: MaterialBinding) -> Self {
        Self {
            binding,
            last_bound: None,
        }
    }

    pub fn binding(&self) -> &MaterialBinding {
        &self.binding
    }

    /// Textures bound by the last successful update.
    pub fn last_bound(&self) -> Option<BoundTextures> {
        self.last_bound
    }

    /// Handles "about to be drawn by `viewer`".
    ///
    /// Renders the reflection for the configured slot layout and binds the
    /// result. On failure nothing is bound, so the material keeps the last
    /// good texture.
    pub fn will_render<B>(
        &mut self,
        backend: &mut B,
        reflection: &mut ReflectionCamera,
        viewer: &ViewerState,
    ) -> RenderResult<SurfaceUpdate>
    where
        B: TargetAllocator + SceneRenderer + MaterialSink + ?Sized,
    {
        let material = self.binding.material;
        let bound = match &self.binding.slots {
            TextureSlots::Mono(slot) => match reflection.render_for_viewer(backend, viewer) {
                Ok(Some(texture)) => {
                    backend.set_texture(material, slot, texture);
                    BoundTextures::Mono(texture)
                }
                Ok(None) => return Ok(SurfaceUpdate::Skipped),
                Err(err) => return Err(render_failed(viewer, err)),
            },
            TextureSlots::Stereo { left, right } => {
                match reflection.render_stereo_pair(backend, viewer) {
                    Ok(Some([l, r])) => {
                        backend.set_texture(material, left, l);
                        backend.set_texture(material, right, r);
                        BoundTextures::Stereo([l, r])
                    }
                    Ok(None) => return Ok(SurfaceUpdate::Skipped),
                    Err(err) => return Err(render_failed(viewer, err)),
                }
            }
        };
        self.last_bound = Some(bound);
        Ok(SurfaceUpdate::Bound(bound))
    }
}

fn render_failed(viewer: &ViewerState, err: RenderError) -> RenderError {
    log::warn!(
        "mirror reflection for {:?} failed, keeping previous texture: {}",
        viewer.camera,
        err
    );
    err
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessBackend;
    use speculum_core::{EyeParameters, Mat4, MirrorPlane, Pose, Quat, TargetSizing, Vec3};

    fn setup(stereo: bool) -> (HeadlessBackend, ReflectionCamera, MirrorSurface, ViewerState) {
        let mut backend = HeadlessBackend::new();
        let options = MirrorOptions {
            target_size: TargetSizing::Fixed {
                width: 16,
                height: 16,
            },
            stereo,
            ..MirrorOptions::default()
        };
        let plane = MirrorPlane::new(Vec3::ZERO, Vec3::Z).unwrap();
        let reflection = ReflectionCamera::new(&mut backend, plane, options.clone()).unwrap();
        let material = backend.create_material("mirror");
        let surface = MirrorSurface::new(MaterialBinding {
            material,
            slots: TextureSlots::from_options(&options),
        });
        let camera = backend.create_camera("player");
        let pose = Pose::new(Vec3::new(0.0, 0.0, -4.0), Quat::from_rotation_y(std::f32::consts::PI));
        let viewer = ViewerState::perspective(camera, pose, 1.0, 1.0, 0.1, 50.0)
            .with_eyes(EyeParameters::symmetric(0.064, Mat4::IDENTITY, Mat4::IDENTITY));
        (backend, reflection, surface, viewer)
    }

    #[test]
    fn test_mono_binds_mirror_texture() {
        let (mut backend, mut reflection, mut surface, viewer) = setup(false);
        let update = surface.will_render(&mut backend, &mut reflection, &viewer).unwrap();

        let target = reflection.mono_target().unwrap().handle;
        assert_eq!(update, SurfaceUpdate::Bound(BoundTextures::Mono(target)));
        let material = surface.binding().material;
        assert_eq!(backend.bound_texture(material, "_MirrorTexture"), Some(target));
        assert_eq!(surface.last_bound(), Some(BoundTextures::Mono(target)));
    }

    #[test]
    fn test_stereo_binds_both_eyes() {
        let (mut backend, mut reflection, mut surface, viewer) = setup(true);
        surface.will_render(&mut backend, &mut reflection, &viewer).unwrap();

        let material = surface.binding().material;
        let left = backend.bound_texture(material, "_LeftEyeTexture").unwrap();
        let right = backend.bound_texture(material, "_RightEyeTexture").unwrap();
        assert_ne!(left, right);
        assert_eq!(backend.bound_texture(material, "_MirrorTexture"), None);
        assert_eq!(backend.renders().len(), 2);
    }

    #[test]
    fn test_self_notification_skipped() {
        let (mut backend, mut reflection, mut surface, mut viewer) = setup(false);
        viewer.camera = reflection.hidden_camera();
        let update = surface.will_render(&mut backend, &mut reflection, &viewer).unwrap();
        assert_eq!(update, SurfaceUpdate::Skipped);
        assert!(backend.renders().is_empty());
    }

    #[test]
    fn test_failure_keeps_last_good_texture() {
        let (mut backend, mut reflection, mut surface, viewer) = setup(false);
        surface.will_render(&mut backend, &mut reflection, &viewer).unwrap();
        let good = reflection.mono_target().unwrap().handle;

        backend.fail_next_render();
        assert!(surface.will_render(&mut backend, &mut reflection, &viewer).is_err());
        let material = surface.binding().material;
        assert_eq!(backend.bound_texture(material, "_MirrorTexture"), Some(good));
        assert_eq!(surface.last_bound(), Some(BoundTextures::Mono(good)));
        assert!(!backend.winding_inverted());
    }
}
