//! In-memory backend with a small software rasterizer.
//!
//! Used by tests, the demo, and hosts without a GPU. Triangles are drawn with
//! flat colors into RGBA8 targets, with an optional depth test and back-face
//! culling that honors the winding flag the same way a GPU pipeline would.

use std::collections::HashMap;

use glam::{Mat4, Vec3};
use speculum_core::{CameraId, CameraStage, ReflectedState};

use crate::backend::{
    CommandHandle, CommandScheduler, CompositeCommand, MaterialId, MaterialSink, SceneRenderer,
    TargetAllocator, TargetDescriptor, TextureHandle,
};
use crate::error::{RenderError, RenderResult};

/// RGBA8 color.
pub type Rgba = [u8; 4];

/// A flat-shaded world-space triangle.
///
/// Counter-clockwise vertices, as seen by a camera, face that camera.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Triangle {
    pub positions: [Vec3; 3],
    pub color: Rgba,
}

impl Triangle {
    pub fn new(a: Vec3, b: Vec3, c: Vec3, color: Rgba) -> Self {
        Self {
            positions: [a, b, c],
            color,
        }
    }

    /// Returns the triangle with its winding reversed.
    #[must_use]
    pub fn flipped(self) -> Self {
        let [a, b, c] = self.positions;
        Self {
            positions: [a, c, b],
            color: self.color,
        }
    }
}

/// One call to [`SceneRenderer::render`].
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRecord {
    pub camera: CameraId,
    pub target: TextureHandle,
    pub state: ReflectedState,
    /// Winding flag at the time of the render.
    pub winding_inverted: bool,
}

/// Largest width or height a headless target may have, matching wgpu's
/// default `max_texture_dimension_2d`.
pub const MAX_TARGET_DIMENSION: u32 = 8192;

#[derive(Debug)]
struct Target {
    descriptor: TargetDescriptor,
    color: Vec<Rgba>,
    depth: Option<Vec<f32>>,
}

impl Target {
    fn new(descriptor: TargetDescriptor) -> Self {
        let len = descriptor.width as usize * descriptor.height as usize;
        let depth = (descriptor.depth_bits > 0).then(|| vec![1.0; len]);
        Self {
            descriptor,
            color: vec![[0, 0, 0, 0]; len],
            depth,
        }
    }

    fn clear(&mut self, color: Rgba) {
        self.color.fill(color);
        if let Some(depth) = &mut self.depth {
            depth.fill(1.0);
        }
    }
}

#[derive(Debug)]
struct AttachedCommand {
    id: u64,
    camera: CameraId,
    stage: CameraStage,
    command: CompositeCommand,
}

/// Backend that keeps everything in memory.
#[derive(Debug)]
pub struct HeadlessBackend {
    next_id: u64,
    targets: HashMap<TextureHandle, Target>,
    cameras: HashMap<CameraId, String>,
    materials: HashMap<MaterialId, HashMap<String, TextureHandle>>,
    commands: Vec<AttachedCommand>,
    scene: Vec<Triangle>,
    clear_color: Rgba,
    winding_inverted: bool,
    target_budget: Option<usize>,
    allocations: usize,
    renders: Vec<RenderRecord>,
    fail_next_render: bool,
}

impl Default for HeadlessBackend {
    fn default() -> Self {
        Self {
            next_id: 1,
            targets: HashMap::new(),
            cameras: HashMap::new(),
            materials: HashMap::new(),
            commands: Vec::new(),
            scene: Vec::new(),
            clear_color: [0, 0, 0, 255],
            winding_inverted: false,
            target_budget: None,
            allocations: 0,
            renders: Vec::new(),
            fail_next_render: false,
        }
    }
}

impl HeadlessBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caps the number of live targets; allocations beyond it fail with
    /// [`RenderError::OutOfMemory`].
    #[must_use]
    pub fn with_target_budget(mut self, budget: usize) -> Self {
        self.target_budget = Some(budget);
        self
    }

    /// Sets the color targets are cleared to before each render.
    #[must_use]
    pub fn with_clear_color(mut self, color: Rgba) -> Self {
        self.clear_color = color;
        self
    }

    pub fn clear_color(&self) -> Rgba {
        self.clear_color
    }

    /// Adds a triangle to the scene.
    pub fn add_triangle(&mut self, triangle: Triangle) {
        self.scene.push(triangle);
    }

    /// Replaces the scene.
    pub fn set_scene(&mut self, triangles: Vec<Triangle>) {
        self.scene = triangles;
    }

    pub fn scene(&self) -> &[Triangle] {
        &self.scene
    }

    /// Makes the next render fail with [`RenderError::OutOfMemory`].
    pub fn fail_next_render(&mut self) {
        self.fail_next_render = true;
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Number of targets ever allocated.
    pub fn allocation_count(&self) -> usize {
        self.allocations
    }

    pub fn live_target_count(&self) -> usize {
        self.targets.len()
    }

    pub fn descriptor(&self, handle: TextureHandle) -> Option<&TargetDescriptor> {
        self.targets.get(&handle).map(|t| &t.descriptor)
    }

    /// Row-major pixels of a target, top row first.
    pub fn pixels(&self, handle: TextureHandle) -> Option<&[Rgba]> {
        self.targets.get(&handle).map(|t| t.color.as_slice())
    }

    pub fn pixel(&self, handle: TextureHandle, x: u32, y: u32) -> Option<Rgba> {
        let target = self.targets.get(&handle)?;
        let d = &target.descriptor;
        if x >= d.width || y >= d.height {
            return None;
        }
        Some(target.color[(y * d.width + x) as usize])
    }

    /// Every render performed so far, oldest first.
    pub fn renders(&self) -> &[RenderRecord] {
        &self.renders
    }

    pub fn clear_renders(&mut self) {
        self.renders.clear();
    }

    pub fn has_camera(&self, camera: CameraId) -> bool {
        self.cameras.contains_key(&camera)
    }

    pub fn camera_label(&self, camera: CameraId) -> Option<&str> {
        self.cameras.get(&camera).map(String::as_str)
    }

    pub fn has_material(&self, material: MaterialId) -> bool {
        self.materials.contains_key(&material)
    }

    pub fn material_count(&self) -> usize {
        self.materials.len()
    }

    /// Texture bound to `slot` of `material`, if any.
    pub fn bound_texture(&self, material: MaterialId, slot: &str) -> Option<TextureHandle> {
        self.materials.get(&material)?.get(slot).copied()
    }

    /// Number of commands attached across all cameras.
    pub fn attached_command_count(&self) -> usize {
        self.commands.len()
    }

    /// Commands attached to `camera`, in attachment order.
    pub fn commands_on(&self, camera: CameraId) -> Vec<&CompositeCommand> {
        self.commands
            .iter()
            .filter(|c| c.camera == camera)
            .map(|c| &c.command)
            .collect()
    }

    /// Runs the commands attached to `camera` at `stage`, as the host would
    /// when that camera reaches the stage. Returns how many ran.
    pub fn execute_stage(&mut self, camera: CameraId, stage: CameraStage) -> RenderResult<usize> {
        let copies: Vec<_> = self
            .commands
            .iter()
            .filter(|c| c.camera == camera && c.stage == stage)
            .map(|c| c.command.copies.clone())
            .collect();
        let count = copies.len();
        for copy in copies.into_iter().flatten() {
            self.copy_texture(copy.source, copy.destination)?;
        }
        Ok(count)
    }

    fn copy_texture(&mut self, source: TextureHandle, destination: TextureHandle) -> RenderResult<()> {
        let src = self
            .targets
            .get(&source)
            .ok_or(RenderError::UnknownTarget(source))?;
        let (width, height) = (src.descriptor.width, src.descriptor.height);
        let pixels = src.color.clone();

        let dst = self
            .targets
            .get_mut(&destination)
            .ok_or(RenderError::UnknownTarget(destination))?;
        let rows = height.min(dst.descriptor.height) as usize;
        let cols = width.min(dst.descriptor.width) as usize;
        let dst_width = dst.descriptor.width as usize;
        for row in 0..rows {
            let from = row * width as usize;
            let to = row * dst_width;
            dst.color[to..to + cols].copy_from_slice(&pixels[from..from + cols]);
        }
        Ok(())
    }
}

impl TargetAllocator for HeadlessBackend {
    fn create_target(
        &mut self,
        desc: &TargetDescriptor,
        reuse: Option<TextureHandle>,
    ) -> RenderResult<TextureHandle> {
        if let Some(handle) = reuse {
            if self
                .targets
                .get(&handle)
                .is_some_and(|t| t.descriptor.is_compatible(desc))
            {
                return Ok(handle);
            }
        }
        let max = MAX_TARGET_DIMENSION;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(RenderError::TargetCreationFailed(format!(
                "{} size {}x{} outside 1..={}",
                desc.label, desc.width, desc.height, max
            )));
        }
        if self
            .target_budget
            .is_some_and(|budget| self.targets.len() >= budget)
        {
            return Err(RenderError::OutOfMemory);
        }

        let handle = TextureHandle::from_raw(self.next_id());
        self.targets.insert(handle, Target::new(desc.clone()));
        self.allocations += 1;
        Ok(handle)
    }

    fn release_target(&mut self, handle: TextureHandle) {
        self.targets.remove(&handle);
    }

    fn is_live(&self, handle: TextureHandle) -> bool {
        self.targets.contains_key(&handle)
    }
}

impl SceneRenderer for HeadlessBackend {
    fn create_camera(&mut self, label: &str) -> CameraId {
        let camera = CameraId::new(self.next_id());
        self.cameras.insert(camera, label.to_string());
        camera
    }

    fn release_camera(&mut self, camera: CameraId) {
        self.cameras.remove(&camera);
    }

    fn winding_inverted(&self) -> bool {
        self.winding_inverted
    }

    fn set_winding_inverted(&mut self, inverted: bool) {
        self.winding_inverted = inverted;
    }

    fn render(
        &mut self,
        camera: CameraId,
        state: &ReflectedState,
        target: TextureHandle,
    ) -> RenderResult<()> {
        if !self.cameras.contains_key(&camera) {
            return Err(RenderError::UnknownCamera(camera));
        }
        if std::mem::take(&mut self.fail_next_render) {
            return Err(RenderError::OutOfMemory);
        }
        let surface = self
            .targets
            .get_mut(&target)
            .ok_or(RenderError::UnknownTarget(target))?;

        surface.clear(self.clear_color);
        let view_proj = state.view_projection_matrix();
        for triangle in &self.scene {
            rasterize(surface, triangle, view_proj, self.winding_inverted);
        }

        self.renders.push(RenderRecord {
            camera,
            target,
            state: state.clone(),
            winding_inverted: self.winding_inverted,
        });
        Ok(())
    }
}

impl MaterialSink for HeadlessBackend {
    fn create_material(&mut self, _label: &str) -> MaterialId {
        let material = MaterialId::from_raw(self.next_id());
        self.materials.insert(material, HashMap::new());
        material
    }

    fn release_material(&mut self, material: MaterialId) {
        self.materials.remove(&material);
    }

    fn set_texture(&mut self, material: MaterialId, slot: &str, texture: TextureHandle) {
        match self.materials.get_mut(&material) {
            Some(slots) => {
                slots.insert(slot.to_string(), texture);
            }
            None => log::warn!("set_texture on unknown material {:?}", material),
        }
    }
}

impl CommandScheduler for HeadlessBackend {
    fn attach(
        &mut self,
        camera: CameraId,
        stage: CameraStage,
        command: CompositeCommand,
    ) -> RenderResult<CommandHandle> {
        if !self.cameras.contains_key(&camera) {
            return Err(RenderError::UnknownCamera(camera));
        }
        let id = self.next_id();
        self.commands.push(AttachedCommand {
            id,
            camera,
            stage,
            command,
        });
        Ok(CommandHandle::new(id, camera))
    }

    fn detach(&mut self, handle: CommandHandle) {
        let before = self.commands.len();
        self.commands.retain(|c| c.id != handle.id());
        if self.commands.len() == before {
            log::warn!("detach of unknown command {}", handle.id());
        }
    }
}

/// Signed doubled area of (a, b, p); positive when counter-clockwise.
fn edge(a: Vec3, b: Vec3, p: (f32, f32)) -> f32 {
    (b.x - a.x) * (p.1 - a.y) - (b.y - a.y) * (p.0 - a.x)
}

/// Draws one triangle into `target`.
///
/// Works in normalized device coordinates throughout so that a projection
/// mirrored along x produces an exactly mirrored image. Triangles with a
/// vertex behind the camera are dropped rather than clipped.
fn rasterize(target: &mut Target, triangle: &Triangle, view_proj: Mat4, winding_inverted: bool) {
    let mut ndc = [Vec3::ZERO; 3];
    for (out, position) in ndc.iter_mut().zip(triangle.positions) {
        let clip = view_proj * position.extend(1.0);
        if clip.w <= f32::EPSILON {
            return;
        }
        *out = clip.truncate() / clip.w;
    }
    let [a, b, c] = ndc;

    let area = edge(a, b, (c.x, c.y));
    if area == 0.0 || !area.is_finite() {
        return;
    }
    let front = (area > 0.0) != winding_inverted;
    if !front {
        return;
    }
    let sign = area.signum();

    let width = target.descriptor.width;
    let height = target.descriptor.height;
    for py in 0..height {
        let y = 1.0 - (py as f32 + 0.5) / height as f32 * 2.0;
        for px in 0..width {
            let x = (px as f32 + 0.5) / width as f32 * 2.0 - 1.0;
            let w0 = edge(b, c, (x, y));
            let w1 = edge(c, a, (x, y));
            let w2 = edge(a, b, (x, y));
            if w0 * sign < 0.0 || w1 * sign < 0.0 || w2 * sign < 0.0 {
                continue;
            }
            let z = (w0 * a.z + w1 * b.z + w2 * c.z) / area;
            if !(0.0..=1.0).contains(&z) {
                continue;
            }
            let index = (py * width + px) as usize;
            if let Some(depth) = &mut target.depth {
                if z >= depth[index] {
                    continue;
                }
                depth[index] = z;
            }
            target.color[index] = triangle.color;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::TextureCopy;
    use speculum_core::Pose;

    const RED: Rgba = [255, 0, 0, 255];
    const BLUE: Rgba = [0, 0, 255, 255];

    /// Camera at +5 z looking down -z.
    fn state(projection: Mat4) -> ReflectedState {
        ReflectedState {
            eye: None,
            pose: Pose::new(Vec3::new(0.0, 0.0, 5.0), glam::Quat::IDENTITY),
            fov: 1.0,
            near: 0.1,
            far: 100.0,
            projection,
        }
    }

    fn quad(z: f32, half: f32, color: Rgba) -> [Triangle; 2] {
        let p = |x: f32, y: f32| Vec3::new(x, y, z);
        [
            Triangle::new(p(-half, -half), p(half, -half), p(half, half), color),
            Triangle::new(p(-half, -half), p(half, half), p(-half, half), color),
        ]
    }

    fn setup(depth_bits: u32) -> (HeadlessBackend, CameraId, TextureHandle) {
        let mut backend = HeadlessBackend::new();
        let camera = backend.create_camera("test");
        let target = backend
            .create_target(&TargetDescriptor::new("t", 32, 32, depth_bits), None)
            .unwrap();
        (backend, camera, target)
    }

    #[test]
    fn test_create_target_reuses_compatible() {
        let mut backend = HeadlessBackend::new();
        let desc = TargetDescriptor::new("a", 8, 8, 24);
        let first = backend.create_target(&desc, None).unwrap();
        let again = backend
            .create_target(&TargetDescriptor::new("b", 8, 8, 24), Some(first))
            .unwrap();
        assert_eq!(first, again);
        assert_eq!(backend.allocation_count(), 1);

        let other = backend
            .create_target(&TargetDescriptor::new("c", 4, 8, 24), Some(first))
            .unwrap();
        assert_ne!(first, other);
        assert_eq!(backend.allocation_count(), 2);
    }

    #[test]
    fn test_target_budget() {
        let mut backend = HeadlessBackend::new().with_target_budget(1);
        let desc = TargetDescriptor::new("a", 8, 8, 0);
        let first = backend.create_target(&desc, None).unwrap();
        assert!(matches!(
            backend.create_target(&desc, None),
            Err(RenderError::OutOfMemory)
        ));
        backend.release_target(first);
        assert!(backend.create_target(&desc, None).is_ok());
    }

    #[test]
    fn test_zero_sized_target_rejected() {
        let mut backend = HeadlessBackend::new();
        let err = backend
            .create_target(&TargetDescriptor::new("a", 0, 8, 0), None)
            .unwrap_err();
        assert!(err.is_resource());
    }

    #[test]
    fn test_oversized_target_rejected_without_allocating() {
        let mut backend = HeadlessBackend::new();
        let huge = TargetDescriptor::new("huge", 100_000, 100_000, 24);
        assert!(matches!(
            backend.create_target(&huge, None),
            Err(RenderError::TargetCreationFailed(_))
        ));
        assert_eq!(backend.allocation_count(), 0);

        let largest = TargetDescriptor::new("largest", MAX_TARGET_DIMENSION, 1, 0);
        assert!(backend.create_target(&largest, None).is_ok());
    }

    #[test]
    fn test_front_face_drawn_back_face_culled() {
        let (mut backend, camera, target) = setup(24);
        let projection = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        backend.set_scene(quad(0.0, 1.0, RED).to_vec());

        backend.render(camera, &state(projection), target).unwrap();
        assert_eq!(backend.pixel(target, 16, 16), Some(RED));
        assert_eq!(backend.pixel(target, 0, 0), Some(backend.clear_color()));

        let flipped = quad(0.0, 1.0, RED).map(Triangle::flipped).to_vec();
        backend.set_scene(flipped);
        backend.render(camera, &state(projection), target).unwrap();
        assert_eq!(backend.pixel(target, 16, 16), Some(backend.clear_color()));

        backend.set_winding_inverted(true);
        backend.render(camera, &state(projection), target).unwrap();
        assert_eq!(backend.pixel(target, 16, 16), Some(RED));
    }

    #[test]
    fn test_depth_test_keeps_nearest() {
        let (mut backend, camera, target) = setup(24);
        let projection = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let mut scene = quad(1.0, 0.5, RED).to_vec();
        scene.extend(quad(-1.0, 4.0, BLUE));
        backend.set_scene(scene);

        backend.render(camera, &state(projection), target).unwrap();
        assert_eq!(backend.pixel(target, 16, 16), Some(RED));
        assert_eq!(backend.pixel(target, 2, 16), Some(BLUE));
    }

    #[test]
    fn test_no_depth_draws_in_order() {
        let (mut backend, camera, target) = setup(0);
        let projection = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let mut scene = quad(1.0, 0.5, RED).to_vec();
        scene.extend(quad(-1.0, 4.0, BLUE));
        backend.set_scene(scene);

        backend.render(camera, &state(projection), target).unwrap();
        assert_eq!(backend.pixel(target, 16, 16), Some(BLUE));
    }

    #[test]
    fn test_render_errors() {
        let (mut backend, camera, target) = setup(0);
        let s = state(Mat4::IDENTITY);
        assert!(matches!(
            backend.render(CameraId::new(999), &s, target),
            Err(RenderError::UnknownCamera(_))
        ));
        backend.fail_next_render();
        assert!(backend.render(camera, &s, target).is_err());
        assert!(backend.render(camera, &s, target).is_ok());
        backend.release_target(target);
        assert!(matches!(
            backend.render(camera, &s, target),
            Err(RenderError::UnknownTarget(_))
        ));
        assert_eq!(backend.renders().len(), 1);
    }

    #[test]
    fn test_commands_execute_at_their_stage() {
        let (mut backend, camera, source) = setup(0);
        let destination = backend
            .create_target(&TargetDescriptor::new("d", 32, 32, 0), None)
            .unwrap();
        backend.set_scene(quad(0.0, 1.0, RED).to_vec());
        backend
            .render(camera, &state(Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0)), source)
            .unwrap();

        let command = CompositeCommand {
            label: "copy".to_string(),
            copies: vec![TextureCopy {
                source,
                destination,
            }],
        };
        let handle = backend
            .attach(camera, CameraStage::AfterOpaque, command)
            .unwrap();
        assert_eq!(backend.execute_stage(camera, CameraStage::AfterSkybox).unwrap(), 0);
        assert_ne!(backend.pixels(source), backend.pixels(destination));
        assert_eq!(backend.execute_stage(camera, CameraStage::AfterOpaque).unwrap(), 1);
        assert_eq!(backend.pixels(source), backend.pixels(destination));

        backend.detach(handle);
        assert_eq!(backend.attached_command_count(), 0);
        assert_eq!(backend.execute_stage(camera, CameraStage::AfterOpaque).unwrap(), 0);
    }

    #[test]
    fn test_attach_to_unknown_camera() {
        let mut backend = HeadlessBackend::new();
        let command = CompositeCommand {
            label: "x".to_string(),
            copies: Vec::new(),
        };
        assert!(matches!(
            backend.attach(CameraId::new(5), CameraStage::AfterOpaque, command),
            Err(RenderError::UnknownCamera(_))
        ));
    }

    #[test]
    fn test_material_slots() {
        let mut backend = HeadlessBackend::new();
        let material = backend.create_material("m");
        let texture = TextureHandle::from_raw(77);
        backend.set_texture(material, "_MirrorTexture", texture);
        assert_eq!(backend.bound_texture(material, "_MirrorTexture"), Some(texture));
        assert_eq!(backend.bound_texture(material, "_Other"), None);
        backend.release_material(material);
        assert!(!backend.has_material(material));
        assert_eq!(backend.material_count(), 0);
    }
}
