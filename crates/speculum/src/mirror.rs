//! The mirror rig: one reflection camera plus the configured integration path.

use speculum_core::{CameraId, FrameIndex, Integration, MirrorOptions, MirrorPlane, ViewerState};
use speculum_render::{
    FrameInjector, InjectOutcome, MaterialBinding, MaterialId, MirrorSurface, ReflectionCamera,
    RenderBackend, SurfaceUpdate, TextureSlots,
};

use crate::Result;

#[derive(Debug)]
enum IntegrationPath {
    Surface(MirrorSurface),
    Injector(FrameInjector),
}

/// What a camera notification did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MirrorUpdate {
    /// The mirror is disabled.
    Disabled,
    Surface(SurfaceUpdate),
    Injection(InjectOutcome),
}

/// A planar mirror wired to a backend.
#[derive(Debug)]
pub struct Mirror {
    reflection: ReflectionCamera,
    path: IntegrationPath,
    enabled: bool,
}

impl Mirror {
    /// Creates the reflection camera and the integration path selected by
    /// `options.integration`. The mirror starts enabled.
    pub fn new<B>(backend: &mut B, plane: MirrorPlane, options: MirrorOptions) -> Result<Self>
    where
        B: RenderBackend + ?Sized,
    {
        let integration = options.integration;
        let slots = TextureSlots::from_options(&options);
        let path = match integration {
            Integration::DrawNotification => {
                let material = backend.create_material(&options.material_label);
                IntegrationPath::Surface(MirrorSurface::new(MaterialBinding { material, slots }))
            }
            Integration::CommandInjection => {
                let mut injector = FrameInjector::new(&options);
                injector.enable(backend);
                IntegrationPath::Injector(injector)
            }
        };
        let reflection = match ReflectionCamera::new(backend, plane, options) {
            Ok(reflection) => reflection,
            Err(err) => {
                Self::release_path(path, backend);
                return Err(err.into());
            }
        };
        log::debug!("created mirror ({:?})", integration);
        Ok(Self {
            reflection,
            path,
            enabled: true,
        })
    }

    pub fn reflection(&self) -> &ReflectionCamera {
        &self.reflection
    }

    pub fn reflection_mut(&mut self) -> &mut ReflectionCamera {
        &mut self.reflection
    }

    /// Moves the mirror; takes effect on the next render.
    pub fn set_plane(&mut self, plane: MirrorPlane) {
        self.reflection.set_plane(plane);
    }

    pub fn integration(&self) -> Integration {
        match self.path {
            IntegrationPath::Surface(_) => Integration::DrawNotification,
            IntegrationPath::Injector(_) => Integration::CommandInjection,
        }
    }

    /// Material the reflection ends up in.
    pub fn material(&self) -> Option<MaterialId> {
        match &self.path {
            IntegrationPath::Surface(surface) => Some(surface.binding().material),
            IntegrationPath::Injector(injector) => injector.material(),
        }
    }

    pub fn surface(&self) -> Option<&MirrorSurface> {
        match &self.path {
            IntegrationPath::Surface(surface) => Some(surface),
            IntegrationPath::Injector(_) => None,
        }
    }

    pub fn injector(&self) -> Option<&FrameInjector> {
        match &self.path {
            IntegrationPath::Injector(injector) => Some(injector),
            IntegrationPath::Surface(_) => None,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Starts a host frame.
    pub fn begin_frame(&mut self, frame: FrameIndex) {
        if let IntegrationPath::Injector(injector) = &mut self.path {
            injector.begin_frame(frame);
        }
    }

    /// Notifies the mirror that `viewer` is about to draw it.
    pub fn on_camera_will_render<B>(&mut self, backend: &mut B, viewer: &ViewerState) -> Result<MirrorUpdate>
    where
        B: RenderBackend + ?Sized,
    {
        if !self.enabled {
            return Ok(MirrorUpdate::Disabled);
        }
        let update = match &mut self.path {
            IntegrationPath::Surface(surface) => {
                MirrorUpdate::Surface(surface.will_render(backend, &mut self.reflection, viewer)?)
            }
            IntegrationPath::Injector(injector) => MirrorUpdate::Injection(
                injector.on_camera_will_render(backend, &mut self.reflection, viewer)?,
            ),
        };
        Ok(update)
    }

    /// Releases the reflection targets; the next render re-creates them at the
    /// current size. Composite commands copying from them are detached.
    pub fn invalidate_targets<B>(&mut self, backend: &mut B)
    where
        B: RenderBackend + ?Sized,
    {
        if let IntegrationPath::Injector(injector) = &mut self.path {
            injector.detach_commands(backend);
        }
        self.reflection.invalidate_targets(backend);
    }

    /// A consuming camera was destroyed.
    pub fn forget_camera<B>(&mut self, backend: &mut B, camera: CameraId)
    where
        B: RenderBackend + ?Sized,
    {
        if let IntegrationPath::Injector(injector) = &mut self.path {
            injector.forget_camera(backend, camera);
        }
    }

    /// Enables or disables the mirror.
    ///
    /// Disabling a command-injection mirror detaches every command, so none
    /// runs afterwards even in the current frame.
    pub fn set_enabled<B>(&mut self, backend: &mut B, enabled: bool)
    where
        B: RenderBackend + ?Sized,
    {
        if self.enabled == enabled {
            return;
        }
        if let IntegrationPath::Injector(injector) = &mut self.path {
            if enabled {
                injector.enable(backend);
            } else {
                injector.disable(backend);
            }
        }
        self.enabled = enabled;
        log::debug!("mirror {}", if enabled { "enabled" } else { "disabled" });
    }

    /// Releases every backend resource the mirror holds.
    pub fn release<B>(self, backend: &mut B)
    where
        B: RenderBackend + ?Sized,
    {
        Self::release_path(self.path, backend);
        self.reflection.release(backend);
    }

    fn release_path<B>(path: IntegrationPath, backend: &mut B)
    where
        B: RenderBackend + ?Sized,
    {
        match path {
            IntegrationPath::Surface(surface) => backend.release_material(surface.binding().material),
            IntegrationPath::Injector(injector) => injector.teardown(backend),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use speculum_core::{Pose, Quat, TargetSizing, Vec3};
    use speculum_render::{HeadlessBackend, SceneRenderer, TargetAllocator};

    fn options(integration: Integration) -> MirrorOptions {
        MirrorOptions {
            target_size: TargetSizing::Fixed {
                width: 8,
                height: 8,
            },
            integration,
            ..MirrorOptions::default()
        }
    }

    fn viewer(backend: &mut HeadlessBackend) -> ViewerState {
        let camera = backend.create_camera("player");
        let pose = Pose::new(Vec3::new(0.0, 0.0, -2.0), Quat::from_rotation_y(std::f32::consts::PI));
        ViewerState::perspective(camera, pose, 1.0, 1.0, 0.1, 20.0)
    }

    fn plane() -> MirrorPlane {
        MirrorPlane::new(Vec3::ZERO, Vec3::Z).unwrap()
    }

    #[test]
    fn test_draw_notification_rig() {
        let mut backend = HeadlessBackend::new();
        let mut mirror = Mirror::new(&mut backend, plane(), options(Integration::DrawNotification)).unwrap();
        let viewer = viewer(&mut backend);

        let update = mirror.on_camera_will_render(&mut backend, &viewer).unwrap();
        assert!(matches!(update, MirrorUpdate::Surface(SurfaceUpdate::Bound(_))));
        assert_eq!(mirror.integration(), Integration::DrawNotification);

        mirror.set_enabled(&mut backend, false);
        assert_eq!(
            mirror.on_camera_will_render(&mut backend, &viewer).unwrap(),
            MirrorUpdate::Disabled
        );

        mirror.release(&mut backend);
        assert_eq!(backend.live_target_count(), 0);
        assert_eq!(backend.material_count(), 0);
    }

    #[test]
    fn test_command_injection_rig() {
        let mut backend = HeadlessBackend::new();
        let mut mirror = Mirror::new(&mut backend, plane(), options(Integration::CommandInjection)).unwrap();
        let viewer = viewer(&mut backend);
        mirror.begin_frame(FrameIndex(1));

        let update = mirror.on_camera_will_render(&mut backend, &viewer).unwrap();
        assert_eq!(
            update,
            MirrorUpdate::Injection(InjectOutcome::Serviced { attached: true })
        );
        assert_eq!(backend.attached_command_count(), 1);

        mirror.set_enabled(&mut backend, false);
        assert_eq!(backend.attached_command_count(), 0);
        assert_eq!(mirror.material(), None);

        mirror.set_enabled(&mut backend, true);
        assert!(mirror.material().is_some());

        mirror.release(&mut backend);
        assert_eq!(backend.live_target_count(), 0);
        assert_eq!(backend.material_count(), 0);
    }

    #[test]
    fn test_invalidate_targets_detaches_composite_commands() {
        use speculum_core::CameraStage;

        let mut backend = HeadlessBackend::new();
        let mut mirror = Mirror::new(&mut backend, plane(), options(Integration::CommandInjection)).unwrap();
        let viewer = viewer(&mut backend);
        mirror.begin_frame(FrameIndex(1));
        mirror.on_camera_will_render(&mut backend, &viewer).unwrap();
        let old = mirror.reflection().mono_target().unwrap().handle;

        mirror.invalidate_targets(&mut backend);
        assert!(!backend.is_live(old));
        assert_eq!(backend.attached_command_count(), 0);
        assert_eq!(
            backend
                .execute_stage(viewer.camera, CameraStage::BeforeImageEffects)
                .unwrap(),
            0
        );

        mirror.begin_frame(FrameIndex(2));
        let update = mirror.on_camera_will_render(&mut backend, &viewer).unwrap();
        assert_eq!(
            update,
            MirrorUpdate::Injection(InjectOutcome::Serviced { attached: true })
        );
        mirror.release(&mut backend);
    }

    #[test]
    fn test_invalid_options_release_partial_state() {
        let mut backend = HeadlessBackend::new();
        let mut bad = options(Integration::DrawNotification);
        bad.depth_bits = 3;
        assert!(Mirror::new(&mut backend, plane(), bad).is_err());
        assert_eq!(backend.material_count(), 0);
    }
}
