//! The hidden camera that renders what a mirror shows.

use speculum_core::{
    reflected_state, CameraId, Eye, MirrorOptions, MirrorPlane, ReflectedState, UVec2,
    ViewerState,
};

use crate::backend::{SceneRenderer, TargetAllocator, TargetDescriptor, TextureHandle};
use crate::error::RenderResult;
use crate::winding::InvertedWinding;

/// A live reflection target and the descriptor it was created with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EyeTarget {
    /// Texture handle.
    pub handle: TextureHandle,
    /// Descriptor used at creation.
    pub descriptor: TargetDescriptor,
}

/// Owns a hidden camera and its reflection targets.
///
/// Targets are created lazily on first use and are reused for every later
/// render, whatever the viewer; they are only recreated after
/// [`ReflectionCamera::invalidate_targets`].
#[derive(Debug)]
pub struct ReflectionCamera {
    hidden: CameraId,
    plane: MirrorPlane,
    options: MirrorOptions,
    mono: Option<EyeTarget>,
    eyes: [Option<EyeTarget>; 2],
}

impl ReflectionCamera {
    /// Creates the hidden camera on `backend`.
    pub fn new<B>(backend: &mut B, plane: MirrorPlane, options: MirrorOptions) -> RenderResult<Self>
    where
        B: SceneRenderer + ?Sized,
    {
        options.validate()?;
        let hidden = backend.create_camera("Mirror reflection camera");
        log::debug!("created reflection camera {:?}", hidden);
        Ok(Self {
            hidden,
            plane,
            options,
            mono: None,
            eyes: [None, None],
        })
    }

    /// Returns the hidden camera.
    pub fn hidden_camera(&self) -> CameraId {
        self.hidden
    }

    /// Returns whether `camera` is this reflection camera's own hidden camera.
    pub fn is_self(&self, camera: CameraId) -> bool {
        camera == self.hidden
    }

    /// Returns the mirror plane.
    pub fn plane(&self) -> &MirrorPlane {
        &self.plane
    }

    /// Moves the mirror. Must not be called between a render and its consuming draw.
    pub fn set_plane(&mut self, plane: MirrorPlane) {
        self.plane = plane;
    }

    /// Returns the options.
    pub fn options(&self) -> &MirrorOptions {
        &self.options
    }

    /// Returns the mono target, if created.
    pub fn mono_target(&self) -> Option<&EyeTarget> {
        self.mono.as_ref()
    }

    /// Returns the target of one eye, if created.
    pub fn eye_target(&self, eye: Eye) -> Option<&EyeTarget> {
        self.eyes[eye.index()].as_ref()
    }

    /// Returns the target used for `eye`, `None` selecting the mono target.
    pub fn target(&self, eye: Option<Eye>) -> Option<&EyeTarget> {
        match eye {
            None => self.mono_target(),
            Some(eye) => self.eye_target(eye),
        }
    }

    /// Computes the reflected state a render for `viewer` would use.
    pub fn reflected_state(
        &self,
        viewer: &ViewerState,
        eye: Option<Eye>,
    ) -> speculum_core::Result<ReflectedState> {
        reflected_state(viewer, eye, &self.plane, &self.options)
    }

    /// Renders the mono reflection for `viewer`.
    ///
    /// Returns `Ok(None)` without rendering when `viewer` is the hidden camera.
    pub fn render_for_viewer<B>(
        &mut self,
        backend: &mut B,
        viewer: &ViewerState,
    ) -> RenderResult<Option<TextureHandle>>
    where
        B: TargetAllocator + SceneRenderer + ?Sized,
    {
        self.render_into(backend, viewer, None)
    }

    /// Renders the reflection seen by one eye of `viewer`.
    ///
    /// Returns `Ok(None)` without rendering when `viewer` is the hidden camera.
    pub fn render_stereo_for_viewer<B>(
        &mut self,
        backend: &mut B,
        viewer: &ViewerState,
        eye: Eye,
    ) -> RenderResult<Option<TextureHandle>>
    where
        B: TargetAllocator + SceneRenderer + ?Sized,
    {
        self.render_into(backend, viewer, Some(eye))
    }

    /// Renders both eyes, left first.
    pub fn render_stereo_pair<B>(
        &mut self,
        backend: &mut B,
        viewer: &ViewerState,
    ) -> RenderResult<Option<[TextureHandle; 2]>>
    where
        B: TargetAllocator + SceneRenderer + ?Sized,
    {
        let Some(left) = self.render_stereo_for_viewer(backend, viewer, Eye::Left)? else {
            return Ok(None);
        };
        let Some(right) = self.render_stereo_for_viewer(backend, viewer, Eye::Right)? else {
            return Ok(None);
        };
        Ok(Some([left, right]))
    }

    fn render_into<B>(
        &mut self,
        backend: &mut B,
        viewer: &ViewerState,
        eye: Option<Eye>,
    ) -> RenderResult<Option<TextureHandle>>
    where
        B: TargetAllocator + SceneRenderer + ?Sized,
    {
        if self.is_self(viewer.camera) {
            log::trace!("reflection camera asked to render itself, skipping");
            return Ok(None);
        }

        let state = self.reflected_state(viewer, eye)?;
        let target = self.ensure_target(backend, eye, viewer.recommended_size)?;

        log::trace!(
            "rendering reflection for {:?} ({}) from {:?}",
            viewer.camera,
            eye.map_or("mono", Eye::name),
            state.pose.position
        );
        {
            let mut scope = InvertedWinding::acquire(backend);
            scope.render(self.hidden, &state, target)?;
        }
        Ok(Some(target))
    }

    fn ensure_target<B>(
        &mut self,
        backend: &mut B,
        eye: Option<Eye>,
        recommended: Option<UVec2>,
    ) -> RenderResult<TextureHandle>
    where
        B: TargetAllocator + ?Sized,
    {
        let slot = match eye {
            None => &mut self.mono,
            Some(eye) => &mut self.eyes[eye.index()],
        };

        if let Some(existing) = slot.as_ref() {
            if backend.is_live(existing.handle) {
                return Ok(existing.handle);
            }
            log::warn!(
                "reflection target {:?} was destroyed externally, recreating",
                existing.handle
            );
        }

        let size = self.options.target_size.resolve(recommended);
        let label = match eye {
            None => "Mirror reflection target".to_string(),
            Some(eye) => format!("Mirror reflection target ({})", eye.name()),
        };
        let descriptor = TargetDescriptor::new(label, size.x, size.y, self.options.depth_bits);
        let handle = backend.create_target(&descriptor, slot.as_ref().map(|t| t.handle))?;
        log::debug!(
            "created {} {}x{} (depth {})",
            descriptor.label,
            descriptor.width,
            descriptor.height,
            descriptor.depth_bits
        );
        *slot = Some(EyeTarget { handle, descriptor });
        Ok(handle)
    }

    /// Destroys every target; the next render recreates them at the size
    /// resolved at that time.
    pub fn invalidate_targets<B>(&mut self, backend: &mut B)
    where
        B: TargetAllocator + ?Sized,
    {
        let targets = self.mono.take().into_iter().chain(self.eyes.iter_mut().filter_map(Option::take));
        for target in targets {
            log::debug!("releasing {}", target.descriptor.label);
            backend.release_target(target.handle);
        }
    }

    /// Releases the targets and the hidden camera.
    pub fn release<B>(mut self, backend: &mut B)
    where
        B: TargetAllocator + SceneRenderer + ?Sized,
    {
        self.invalidate_targets(backend);
        backend.release_camera(self.hidden);
        log::debug!("released reflection camera {:?}", self.hidden);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::headless::HeadlessBackend;
    use crate::RenderError;
    use speculum_core::{EyeParameters, Mat4, Pose, Quat, TargetSizing, Vec3};

    fn options(width: u32, height: u32) -> MirrorOptions {
        MirrorOptions {
            target_size: TargetSizing::Fixed { width, height },
            ..MirrorOptions::default()
        }
    }

    fn viewer(backend: &mut HeadlessBackend) -> ViewerState {
        let camera = backend.create_camera("player");
        let pose = Pose::new(Vec3::new(0.0, 0.0, -5.0), Quat::from_rotation_y(std::f32::consts::PI));
        ViewerState::perspective(camera, pose, 1.0, 1.0, 0.1, 100.0)
    }

    fn mirror() -> MirrorPlane {
        MirrorPlane::new(Vec3::ZERO, Vec3::Z).unwrap()
    }

    #[test]
    fn test_mono_target_created_once() {
        let mut backend = HeadlessBackend::new();
        let mut camera = ReflectionCamera::new(&mut backend, mirror(), options(64, 32)).unwrap();
        let viewer = viewer(&mut backend);

        let first = camera.render_for_viewer(&mut backend, &viewer).unwrap().unwrap();
        let second = camera.render_for_viewer(&mut backend, &viewer).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.allocation_count(), 1);
        assert_eq!(backend.renders().len(), 2);
        let descriptor = &camera.mono_target().unwrap().descriptor;
        assert_eq!((descriptor.width, descriptor.height), (64, 32));
    }

    #[test]
    fn test_render_runs_with_inverted_winding() {
        let mut backend = HeadlessBackend::new();
        let mut camera = ReflectionCamera::new(&mut backend, mirror(), options(8, 8)).unwrap();
        let viewer = viewer(&mut backend);

        camera.render_for_viewer(&mut backend, &viewer).unwrap();
        assert!(backend.renders()[0].winding_inverted);
        assert!(!backend.winding_inverted());
        assert_eq!(backend.renders()[0].camera, camera.hidden_camera());
    }

    #[test]
    fn test_self_render_is_skipped() {
        let mut backend = HeadlessBackend::new();
        let mut camera = ReflectionCamera::new(&mut backend, mirror(), options(8, 8)).unwrap();
        let mut viewer = viewer(&mut backend);
        viewer.camera = camera.hidden_camera();

        assert_eq!(camera.render_for_viewer(&mut backend, &viewer).unwrap(), None);
        assert!(backend.renders().is_empty());
        assert_eq!(backend.allocation_count(), 0);
    }

    #[test]
    fn test_invalid_viewer_rejected_before_allocation() {
        let mut backend = HeadlessBackend::new();
        let mut camera = ReflectionCamera::new(&mut backend, mirror(), options(8, 8)).unwrap();
        let mut viewer = viewer(&mut backend);
        viewer.pose.position = Vec3::splat(f32::NAN);

        let err = camera.render_for_viewer(&mut backend, &viewer).unwrap_err();
        assert!(matches!(err, RenderError::Configuration(_)));
        assert_eq!(backend.allocation_count(), 0);
    }

    #[test]
    fn test_allocation_failure_is_surfaced() {
        let mut backend = HeadlessBackend::new().with_target_budget(0);
        let mut camera = ReflectionCamera::new(&mut backend, mirror(), options(8, 8)).unwrap();
        let viewer = viewer(&mut backend);

        let err = camera.render_for_viewer(&mut backend, &viewer).unwrap_err();
        assert!(err.is_resource());
        assert!(camera.mono_target().is_none());
        assert!(backend.renders().is_empty());
    }

    #[test]
    fn test_huge_recommended_size_fails_as_resource_error() {
        let mut backend = HeadlessBackend::new();
        let sizing = MirrorOptions {
            target_size: TargetSizing::Recommended {
                fallback_width: 16,
                fallback_height: 16,
            },
            ..MirrorOptions::default()
        };
        let mut camera = ReflectionCamera::new(&mut backend, mirror(), sizing).unwrap();
        let viewer = viewer(&mut backend).with_recommended_size(100_000, 100_000);

        let err = camera.render_for_viewer(&mut backend, &viewer).unwrap_err();
        assert!(err.is_resource());
        assert!(camera.mono_target().is_none());
        assert!(!backend.winding_inverted());
    }

    #[test]
    fn test_recommended_size_used_at_creation_only() {
        let mut backend = HeadlessBackend::new();
        let sizing = MirrorOptions {
            target_size: TargetSizing::Recommended {
                fallback_width: 16,
                fallback_height: 16,
            },
            ..MirrorOptions::default()
        };
        let mut camera = ReflectionCamera::new(&mut backend, mirror(), sizing).unwrap();
        let viewer = viewer(&mut backend).with_recommended_size(40, 20);

        let first = camera.render_for_viewer(&mut backend, &viewer).unwrap().unwrap();
        let resized = viewer.clone().with_recommended_size(80, 40);
        let second = camera.render_for_viewer(&mut backend, &resized).unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(backend.descriptor(first).unwrap().width, 40);

        camera.invalidate_targets(&mut backend);
        assert!(!backend.is_live(first));
        let third = camera.render_for_viewer(&mut backend, &resized).unwrap().unwrap();
        assert_ne!(first, third);
        assert_eq!(backend.descriptor(third).unwrap().width, 80);
    }

    #[test]
    fn test_stereo_targets_are_independent() {
        let mut backend = HeadlessBackend::new();
        let mut camera = ReflectionCamera::new(&mut backend, mirror(), options(8, 8)).unwrap();
        let eyes = EyeParameters::symmetric(0.064, Mat4::IDENTITY, Mat4::IDENTITY);
        let viewer = viewer(&mut backend).with_eyes(eyes);

        // Right first: order does not matter.
        let right = camera
            .render_stereo_for_viewer(&mut backend, &viewer, Eye::Right)
            .unwrap()
            .unwrap();
        let left = camera
            .render_stereo_for_viewer(&mut backend, &viewer, Eye::Left)
            .unwrap()
            .unwrap();
        assert_ne!(left, right);
        assert_eq!(camera.eye_target(Eye::Left).unwrap().handle, left);
        assert!(camera.mono_target().is_none());

        let records = backend.renders();
        assert_eq!(records[0].state.eye, Some(Eye::Right));
        assert_eq!(records[1].state.eye, Some(Eye::Left));
        assert!(records.iter().all(|r| r.winding_inverted));
    }

    #[test]
    fn test_stereo_without_eye_parameters() {
        let mut backend = HeadlessBackend::new();
        let mut camera = ReflectionCamera::new(&mut backend, mirror(), options(8, 8)).unwrap();
        let viewer = viewer(&mut backend);

        assert!(matches!(
            camera.render_stereo_pair(&mut backend, &viewer),
            Err(RenderError::Configuration(_))
        ));
    }

    #[test]
    fn test_release_frees_everything() {
        let mut backend = HeadlessBackend::new();
        let mut camera = ReflectionCamera::new(&mut backend, mirror(), options(8, 8)).unwrap();
        let viewer = viewer(&mut backend);
        camera.render_for_viewer(&mut backend, &viewer).unwrap();
        assert_eq!(backend.live_target_count(), 1);

        let hidden = camera.hidden_camera();
        camera.release(&mut backend);
        assert_eq!(backend.live_target_count(), 0);
        assert!(!backend.has_camera(hidden));
    }
}
