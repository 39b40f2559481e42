//! Command-injection integration.
//!
//! Instead of binding the reflection target directly, the injector owns a
//! dynamic material and one composite target per slot. For every consuming
//! camera it renders the reflection and attaches a composite command that
//! copies the reflection into the composite target when that camera reaches
//! its configured stage. Commands stay attached across frames and are only
//! replaced when the reflection targets change.
//!
//! Every attachment is an owned [`CommandHandle`] stored in a
//! [`RenderSchedule`]; [`FrameInjector::disable`] drains the schedule, so no
//! command can outlive the injector's armed state.

use speculum_core::{
    CameraId, CameraStage, Eye, FrameIndex, MirrorOptions, RenderSchedule, ViewerState,
};

use crate::backend::{
    CommandHandle, CompositeCommand, MaterialId, RenderBackend, TargetAllocator, TargetDescriptor,
    TextureCopy, TextureHandle,
};
use crate::error::{RenderError, RenderResult};
use crate::mirror_surface::TextureSlots;
use crate::reflection_camera::{EyeTarget, ReflectionCamera};

/// Lifecycle state of a [`FrameInjector`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectorState {
    Disabled,
    Armed,
}

/// Why a camera notification did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// The injector is disabled.
    Disabled,
    /// The notifying camera is the reflection camera.
    SelfCamera,
}

/// Result of [`FrameInjector::on_camera_will_render`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InjectOutcome {
    Skipped(SkipReason),
    /// The camera was already serviced this frame.
    AlreadyServiced,
    /// The reflection was rendered; `attached` is true when a command was
    /// (re)attached to the camera.
    Serviced { attached: bool },
}

#[derive(Debug)]
struct Attachment {
    handle: CommandHandle,
    copies: Vec<TextureCopy>,
}

/// Per-camera command injection for one mirror.
#[derive(Debug)]
pub struct FrameInjector {
    state: InjectorState,
    schedule: RenderSchedule<Attachment>,
    slots: TextureSlots,
    stage: CameraStage,
    command_label: String,
    material_label: String,
    material: Option<MaterialId>,
    mono: Option<EyeTarget>,
    eyes: [Option<EyeTarget>; 2],
}

impl FrameInjector {
    /// Creates a disabled injector.
    pub fn new(options: &MirrorOptions) -> Self {
        Self {
            state: InjectorState::Disabled,
            schedule: RenderSchedule::new(),
            slots: TextureSlots::from_options(options),
            stage: options.composite_stage,
            command_label: options.command_label.clone(),
            material_label: options.material_label.clone(),
            material: None,
            mono: None,
            eyes: [None, None],
        }
    }

    pub fn state(&self) -> InjectorState {
        self.state
    }

    /// Dynamic material the composite targets are bound to.
    pub fn material(&self) -> Option<MaterialId> {
        self.material
    }

    /// Number of commands currently attached to consuming cameras.
    pub fn attached_command_count(&self) -> usize {
        self.schedule.attached_count()
    }

    /// Composite target of a slot, `None` selecting the mono slot.
    pub fn composite_target(&self, eye: Option<Eye>) -> Option<TextureHandle> {
        match eye {
            None => self.mono.as_ref(),
            Some(eye) => self.eyes[eye.index()].as_ref(),
        }
        .map(|t| t.handle)
    }

    /// Arms the injector.
    ///
    /// Attachments left over from a previous armed period are detached first.
    pub fn enable<B>(&mut self, backend: &mut B)
    where
        B: RenderBackend + ?Sized,
    {
        let frame = self.schedule.frame();
        self.sweep(backend);
        self.schedule = RenderSchedule::new();
        self.schedule.begin_frame(frame);
        if self.material.is_none() {
            let material = backend.create_material(&self.material_label);
            log::debug!("created {} {:?}", self.material_label, material);
            self.material = Some(material);
        }
        if self.state != InjectorState::Armed {
            log::debug!("frame injector armed");
        }
        self.state = InjectorState::Armed;
    }

    /// Advances the frame counter; every camera becomes unserviced.
    pub fn begin_frame(&mut self, frame: FrameIndex) {
        self.schedule.begin_frame(frame);
    }

    /// Handles "camera `viewer` is about to render".
    pub fn on_camera_will_render<B>(
        &mut self,
        backend: &mut B,
        reflection: &mut ReflectionCamera,
        viewer: &ViewerState,
    ) -> RenderResult<InjectOutcome>
    where
        B: RenderBackend + ?Sized,
    {
        if self.state == InjectorState::Disabled {
            return Ok(InjectOutcome::Skipped(SkipReason::Disabled));
        }
        let camera = viewer.camera;
        if reflection.is_self(camera) {
            log::trace!("frame injector ignoring its own reflection camera");
            return Ok(InjectOutcome::Skipped(SkipReason::SelfCamera));
        }
        // A failed render also counts; it is not retried within the frame.
        if !self.schedule.mark_serviced(camera) {
            return Ok(InjectOutcome::AlreadyServiced);
        }

        let sources: Vec<(Option<Eye>, TextureHandle)> = if self.slots.is_stereo() {
            match reflection.render_stereo_pair(backend, viewer)? {
                Some([left, right]) => vec![(Some(Eye::Left), left), (Some(Eye::Right), right)],
                None => return Ok(InjectOutcome::Skipped(SkipReason::SelfCamera)),
            }
        } else {
            match reflection.render_for_viewer(backend, viewer)? {
                Some(mono) => vec![(None, mono)],
                None => return Ok(InjectOutcome::Skipped(SkipReason::SelfCamera)),
            }
        };

        let mut copies = Vec::with_capacity(sources.len());
        for (eye, source) in sources {
            let descriptor = reflection
                .target(eye)
                .map(|t| t.descriptor.clone())
                .ok_or(RenderError::UnknownTarget(source))?;
            let destination = self.ensure_composite(backend, eye, &descriptor)?;
            copies.push(TextureCopy {
                source,
                destination,
            });
        }

        let current = self.schedule.attachment(camera).map(|a| a.copies.as_slice());
        let attached = if current == Some(copies.as_slice()) {
            false
        } else {
            self.detach_stale(backend, camera, &copies);
            let command = CompositeCommand {
                label: self.command_label.clone(),
                copies: copies.clone(),
            };
            let handle = match backend.attach(camera, self.stage, command) {
                Ok(handle) => handle,
                Err(err) => {
                    // The old command may name released targets.
                    if let Some(stale) = self.schedule.take_attachment(camera) {
                        backend.detach(stale.handle);
                    }
                    return Err(err);
                }
            };
            log::debug!(
                "attached {:?} to {:?} at {:?}",
                self.command_label,
                camera,
                self.stage
            );
            let attachment = Attachment {
                handle,
                copies: copies.clone(),
            };
            if let Some(stale) = self.schedule.attach(camera, attachment) {
                backend.detach(stale.handle);
            }
            true
        };

        Ok(InjectOutcome::Serviced { attached })
    }

    /// Detaches commands on other cameras that still copy between handles
    /// other than `current`; those cameras re-attach when next notified.
    fn detach_stale<B>(&mut self, backend: &mut B, serviced: CameraId, current: &[TextureCopy])
    where
        B: RenderBackend + ?Sized,
    {
        let stale = self
            .schedule
            .take_attachments_if(|camera, attachment| camera != serviced && attachment.copies != current);
        for (camera, attachment) in stale {
            log::debug!("detaching stale mirror command from {:?}", camera);
            backend.detach(attachment.handle);
        }
    }

    /// Detaches every command but keeps the injector armed.
    ///
    /// Call after the reflection targets were invalidated, before any
    /// consuming camera executes its stage.
    pub fn detach_commands<B>(&mut self, backend: &mut B) -> usize
    where
        B: RenderBackend + ?Sized,
    {
        let detached = self.schedule.take_attachments_if(|_, _| true);
        let count = detached.len();
        for (camera, attachment) in detached {
            log::debug!("detaching mirror command from {:?}", camera);
            backend.detach(attachment.handle);
        }
        count
    }

    fn ensure_composite<B>(
        &mut self,
        backend: &mut B,
        eye: Option<Eye>,
        source: &TargetDescriptor,
    ) -> RenderResult<TextureHandle>
    where
        B: RenderBackend + ?Sized,
    {
        let material = match self.material {
            Some(material) => material,
            None => {
                let material = backend.create_material(&self.material_label);
                self.material = Some(material);
                material
            }
        };
        let slot_name = match (&self.slots, eye) {
            (TextureSlots::Mono(name), _) => name,
            (TextureSlots::Stereo { left, .. }, Some(Eye::Left) | None) => left,
            (TextureSlots::Stereo { right, .. }, Some(Eye::Right)) => right,
        };
        let slot = match eye {
            None => &mut self.mono,
            Some(eye) => &mut self.eyes[eye.index()],
        };

        let label = match eye {
            None => "Mirror composite target".to_string(),
            Some(eye) => format!("Mirror composite target ({})", eye.name()),
        };
        let descriptor = TargetDescriptor::new(label, source.width, source.height, 0);
        let previous = slot.as_ref().map(|t| t.handle);
        let handle = backend.create_target(&descriptor, previous)?;
        if previous == Some(handle) {
            return Ok(handle);
        }
        if let Some(previous) = previous {
            backend.release_target(previous);
        }

        backend.set_texture(material, slot_name, handle);
        log::debug!(
            "created {} {}x{} bound to {}",
            descriptor.label,
            descriptor.width,
            descriptor.height,
            slot_name
        );
        *slot = Some(EyeTarget { handle, descriptor });
        Ok(handle)
    }

    /// A consuming camera was destroyed: detach its command and drop its slot.
    pub fn forget_camera<B>(&mut self, backend: &mut B, camera: CameraId)
    where
        B: RenderBackend + ?Sized,
    {
        if let Some(attachment) = self.schedule.forget_camera(camera) {
            log::debug!("detaching mirror command from destroyed {:?}", camera);
            backend.detach(attachment.handle);
        }
    }

    fn sweep<B>(&mut self, backend: &mut B) -> usize
    where
        B: RenderBackend + ?Sized,
    {
        let drained = self.schedule.drain_attachments();
        let count = drained.len();
        for (camera, attachment) in drained {
            log::debug!("detaching mirror command from {:?}", camera);
            backend.detach(attachment.handle);
        }
        count
    }

    /// Detaches every command and releases the material and composite targets.
    ///
    /// Commands detached here never execute, even when disabling mid-frame.
    pub fn disable<B>(&mut self, backend: &mut B)
    where
        B: RenderBackend + ?Sized,
    {
        let detached = self.sweep(backend);
        let targets = self.mono.take().into_iter().chain(self.eyes.iter_mut().filter_map(Option::take));
        for target in targets {
            backend.release_target(target.handle);
        }
        if let Some(material) = self.material.take() {
            backend.release_material(material);
        }
        if self.state == InjectorState::Armed {
            log::debug!("frame injector disabled, {} command(s) detached", detached);
        }
        self.state = InjectorState::Disabled;
    }

    /// Disables the injector and consumes it.
    pub fn teardown<B>(mut self, backend: &mut B)
    where
        B: RenderBackend + ?Sized,
    {
        self.disable(backend);
    }
}

impl Drop for FrameInjector {
    fn drop(&mut self) {
        let leaked = self.schedule.attached_count();
        if leaked > 0 {
            log::error!(
                "frame injector dropped with {} attached command(s); call disable() first",
                leaked
            );
        }
    }
}
