//! wgpu backend.
//!
//! Owns a device and queue, allocates reflection targets as textures and
//! hands actual scene drawing to a host-supplied [`SceneDrawer`]. The winding
//! flag is translated into the [`wgpu::FrontFace`] the drawer must build its
//! pipelines with.

use std::collections::HashMap;

use glam::Mat4;
use speculum_core::{CameraId, CameraStage, ReflectedState};
use wgpu::util::DeviceExt;

use crate::backend::{
    CommandHandle, CommandScheduler, CompositeCommand, MaterialId, MaterialSink, SceneRenderer,
    TargetAllocator, TargetDescriptor, TextureHandle,
};
use crate::error::{RenderError, RenderResult};

/// Color format of reflection targets.
pub const COLOR_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

/// Depth format used for a given depth precision.
pub fn depth_format(depth_bits: u32) -> Option<wgpu::TextureFormat> {
    match depth_bits {
        0 => None,
        32 => Some(wgpu::TextureFormat::Depth32Float),
        _ => Some(wgpu::TextureFormat::Depth24Plus),
    }
}

/// Front face to use for a given winding flag.
pub fn front_face(winding_inverted: bool) -> wgpu::FrontFace {
    if winding_inverted {
        wgpu::FrontFace::Cw
    } else {
        wgpu::FrontFace::Ccw
    }
}

/// GPU representation of a reflected camera.
#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct ReflectionUniforms {
    pub view: [[f32; 4]; 4],
    pub projection: [[f32; 4]; 4],
    pub view_projection: [[f32; 4]; 4],
    pub camera_position: [f32; 3],
    /// 1 when the reflected render runs with inverted winding.
    pub winding_inverted: u32,
}

impl Default for ReflectionUniforms {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY.to_cols_array_2d(),
            projection: Mat4::IDENTITY.to_cols_array_2d(),
            view_projection: Mat4::IDENTITY.to_cols_array_2d(),
            camera_position: [0.0; 3],
            winding_inverted: 0,
        }
    }
}

impl ReflectionUniforms {
    pub fn new(state: &ReflectedState, winding_inverted: bool) -> Self {
        Self {
            view: state.view_matrix().to_cols_array_2d(),
            projection: state.projection.to_cols_array_2d(),
            view_projection: state.view_projection_matrix().to_cols_array_2d(),
            camera_position: state.pose.position.to_array(),
            winding_inverted: u32::from(winding_inverted),
        }
    }
}

/// Everything a [`SceneDrawer`] needs to draw one reflected view.
pub struct DrawContext<'a> {
    pub device: &'a wgpu::Device,
    pub queue: &'a wgpu::Queue,
    pub encoder: &'a mut wgpu::CommandEncoder,
    /// Cleared color target.
    pub color_view: &'a wgpu::TextureView,
    /// Cleared depth target, when the target has depth.
    pub depth_view: Option<&'a wgpu::TextureView>,
    pub color_format: wgpu::TextureFormat,
    pub depth_format: Option<wgpu::TextureFormat>,
    pub state: &'a ReflectedState,
    pub view: Mat4,
    pub projection: Mat4,
    /// Front face pipelines must use for this render.
    pub front_face: wgpu::FrontFace,
    /// Bind group holding [`ReflectionUniforms`] for this render.
    pub reflection_bind_group: &'a wgpu::BindGroup,
    pub reflection_bind_group_layout: &'a wgpu::BindGroupLayout,
}

/// Host hook that records scene draws into a reflection target.
pub trait SceneDrawer {
    /// Records draws with `LoadOp::Load`; the targets are already cleared.
    fn draw(&mut self, camera: CameraId, ctx: &mut DrawContext<'_>);
}

/// Drawer that draws nothing, leaving targets cleared.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClearOnly;

impl SceneDrawer for ClearOnly {
    fn draw(&mut self, _camera: CameraId, _ctx: &mut DrawContext<'_>) {}
}

struct GpuTarget {
    descriptor: TargetDescriptor,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    depth: Option<(wgpu::Texture, wgpu::TextureView)>,
}

struct AttachedCommand {
    id: u64,
    camera: CameraId,
    stage: CameraStage,
    command: CompositeCommand,
}

/// Backend rendering through wgpu.
pub struct WgpuBackend<D: SceneDrawer> {
    device: wgpu::Device,
    queue: wgpu::Queue,
    drawer: D,
    uniform_buffer: wgpu::Buffer,
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    clear_color: wgpu::Color,
    next_id: u64,
    targets: HashMap<TextureHandle, GpuTarget>,
    cameras: HashMap<CameraId, String>,
    materials: HashMap<MaterialId, HashMap<String, TextureHandle>>,
    commands: Vec<AttachedCommand>,
    winding_inverted: bool,
}

impl<D: SceneDrawer> WgpuBackend<D> {
    /// Wraps an existing device and queue.
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, drawer: D) -> Self {
        let uniform_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Mirror Reflection Uniform Buffer"),
            contents: bytemuck::cast_slice(&[ReflectionUniforms::default()]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Mirror Reflection Bind Group Layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Mirror Reflection Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        Self {
            device,
            queue,
            drawer,
            uniform_buffer,
            bind_group_layout,
            bind_group,
            clear_color: wgpu::Color::BLACK,
            next_id: 1,
            targets: HashMap::new(),
            cameras: HashMap::new(),
            materials: HashMap::new(),
            commands: Vec::new(),
            winding_inverted: false,
        }
    }

    /// Creates a backend on a new device without a surface.
    pub async fn new_headless(drawer: D) -> RenderResult<Self> {
        let instance = wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::AdapterCreationFailed)?;

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    label: Some("speculum device (headless)"),
                    required_features: wgpu::Features::empty(),
                    required_limits: wgpu::Limits::default(),
                    memory_hints: wgpu::MemoryHints::default(),
                },
                None,
            )
            .await?;

        log::debug!("created headless wgpu device on {:?}", adapter.get_info().name);
        Ok(Self::new(device, queue, drawer))
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn drawer_mut(&mut self) -> &mut D {
        &mut self.drawer
    }

    /// Bind group layout of [`ReflectionUniforms`], for host pipelines.
    pub fn reflection_bind_group_layout(&self) -> &wgpu::BindGroupLayout {
        &self.bind_group_layout
    }

    pub fn set_clear_color(&mut self, color: wgpu::Color) {
        self.clear_color = color;
    }

    /// Color view of a live target, for binding to host materials.
    pub fn texture_view(&self, handle: TextureHandle) -> Option<&wgpu::TextureView> {
        self.targets.get(&handle).map(|t| &t.view)
    }

    pub fn descriptor(&self, handle: TextureHandle) -> Option<&TargetDescriptor> {
        self.targets.get(&handle).map(|t| &t.descriptor)
    }

    /// Texture bound to `slot` of `material`, if any.
    pub fn bound_texture(&self, material: MaterialId, slot: &str) -> Option<TextureHandle> {
        self.materials.get(&material)?.get(slot).copied()
    }

    pub fn attached_command_count(&self) -> usize {
        self.commands.len()
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Records the commands attached to `camera` at `stage` into `encoder`.
    /// Returns how many were recorded.
    pub fn execute_stage(
        &self,
        camera: CameraId,
        stage: CameraStage,
        encoder: &mut wgpu::CommandEncoder,
    ) -> RenderResult<usize> {
        let mut count = 0;
        for attached in self
            .commands
            .iter()
            .filter(|c| c.camera == camera && c.stage == stage)
        {
            for copy in &attached.command.copies {
                let source = self
                    .targets
                    .get(&copy.source)
                    .ok_or(RenderError::UnknownTarget(copy.source))?;
                let destination = self
                    .targets
                    .get(&copy.destination)
                    .ok_or(RenderError::UnknownTarget(copy.destination))?;
                encoder.copy_texture_to_texture(
                    wgpu::TexelCopyTextureInfo {
                        texture: &source.texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::TexelCopyTextureInfo {
                        texture: &destination.texture,
                        mip_level: 0,
                        origin: wgpu::Origin3d::ZERO,
                        aspect: wgpu::TextureAspect::All,
                    },
                    wgpu::Extent3d {
                        width: source.descriptor.width.min(destination.descriptor.width),
                        height: source.descriptor.height.min(destination.descriptor.height),
                        depth_or_array_layers: 1,
                    },
                );
            }
            count += 1;
        }
        Ok(count)
    }

    /// Reads a target back as tightly packed RGBA8 rows.
    pub fn read_target(&self, handle: TextureHandle) -> RenderResult<Vec<u8>> {
        let target = self
            .targets
            .get(&handle)
            .ok_or(RenderError::UnknownTarget(handle))?;
        let (width, height) = (target.descriptor.width, target.descriptor.height);
        let bytes_per_row = aligned_bytes_per_row(width);

        let buffer = self.device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("mirror readback buffer"),
            size: u64::from(bytes_per_row) * u64::from(height),
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mirror readback encoder"),
            });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture: &target.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &buffer,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(bytes_per_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        self.queue.submit(std::iter::once(encoder.finish()));

        let slice = buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        let _ = self.device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .map_err(|_| RenderError::ReadbackFailed)?
            .map_err(|_| RenderError::ReadbackFailed)?;

        let data = slice.get_mapped_range();
        let row_bytes = width as usize * 4;
        let mut pixels = Vec::with_capacity(row_bytes * height as usize);
        for row in 0..height as usize {
            let start = row * bytes_per_row as usize;
            pixels.extend_from_slice(&data[start..start + row_bytes]);
        }
        drop(data);
        buffer.unmap();
        Ok(pixels)
    }

    fn allocate(&self, desc: &TargetDescriptor) -> GpuTarget {
        let size = wgpu::Extent3d {
            width: desc.width,
            height: desc.height,
            depth_or_array_layers: 1,
        };
        let texture = self.device.create_texture(&wgpu::TextureDescriptor {
            label: Some(desc.label.as_str()),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: COLOR_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT
                | wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::COPY_SRC
                | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        let depth = depth_format(desc.depth_bits).map(|format| {
            let texture = self.device.create_texture(&wgpu::TextureDescriptor {
                label: Some("mirror depth texture"),
                size,
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format,
                usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
                view_formats: &[],
            });
            let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
            (texture, view)
        });

        GpuTarget {
            descriptor: desc.clone(),
            texture,
            view,
            depth,
        }
    }
}

fn aligned_bytes_per_row(width: u32) -> u32 {
    let unaligned = width * 4;
    let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
    unaligned.div_ceil(align) * align
}

impl<D: SceneDrawer> TargetAllocator for WgpuBackend<D> {
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
        let max = self.device.limits().max_texture_dimension_2d;
        if desc.width == 0 || desc.height == 0 || desc.width > max || desc.height > max {
            return Err(RenderError::TargetCreationFailed(format!(
                "{} size {}x{} outside 1..={}",
                desc.label, desc.width, desc.height, max
            )));
        }

        self.device.push_error_scope(wgpu::ErrorFilter::OutOfMemory);
        self.device.push_error_scope(wgpu::ErrorFilter::Validation);
        let target = self.allocate(desc);
        let validation = pollster::block_on(self.device.pop_error_scope());
        let oom = pollster::block_on(self.device.pop_error_scope());
        if oom.is_some() {
            return Err(RenderError::OutOfMemory);
        }
        if let Some(err) = validation {
            return Err(RenderError::TargetCreationFailed(err.to_string()));
        }

        let handle = TextureHandle::from_raw(self.next_id());
        self.targets.insert(handle, target);
        Ok(handle)
    }

    fn release_target(&mut self, handle: TextureHandle) {
        if let Some(target) = self.targets.remove(&handle) {
            target.texture.destroy();
            if let Some((depth, _)) = target.depth {
                depth.destroy();
            }
        }
    }

    fn is_live(&self, handle: TextureHandle) -> bool {
        self.targets.contains_key(&handle)
    }
}

impl<D: SceneDrawer> SceneRenderer for WgpuBackend<D> {
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
        let surface = self
            .targets
            .get(&target)
            .ok_or(RenderError::UnknownTarget(target))?;

        let uniforms = ReflectionUniforms::new(state, self.winding_inverted);
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::cast_slice(&[uniforms]));

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("mirror reflection encoder"),
            });
        {
            let _clear = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("mirror clear pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &surface.view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear_color),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: surface.depth.as_ref().map(|(_, view)| {
                    wgpu::RenderPassDepthStencilAttachment {
                        view,
                        depth_ops: Some(wgpu::Operations {
                            load: wgpu::LoadOp::Clear(1.0),
                            store: wgpu::StoreOp::Store,
                        }),
                        stencil_ops: None,
                    }
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
        }

        let mut ctx = DrawContext {
            device: &self.device,
            queue: &self.queue,
            encoder: &mut encoder,
            color_view: &surface.view,
            depth_view: surface.depth.as_ref().map(|(_, view)| view),
            color_format: COLOR_FORMAT,
            depth_format: depth_format(surface.descriptor.depth_bits),
            state,
            view: state.view_matrix(),
            projection: state.projection,
            front_face: front_face(self.winding_inverted),
            reflection_bind_group: &self.bind_group,
            reflection_bind_group_layout: &self.bind_group_layout,
        };
        self.drawer.draw(camera, &mut ctx);

        self.queue.submit(std::iter::once(encoder.finish()));
        Ok(())
    }
}

impl<D: SceneDrawer> MaterialSink for WgpuBackend<D> {
    fn create_material(&mut self, _label: &str) -> MaterialId {
        let material = MaterialId::from_raw(self.next_id());
        self.materials.insert(material, HashMap::new());
        material
    }

    fn release_material(&mut self, material: MaterialId) {
        self.materials.remove(&material);
    }

    fn set_texture(&mut self, material: MaterialId, slot: &str, texture: TextureHandle) {
        if let Some(slots) = self.materials.get_mut(&material) {
            slots.insert(slot.to_string(), texture);
        }
    }
}

impl<D: SceneDrawer> CommandScheduler for WgpuBackend<D> {
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
        self.commands.retain(|c| c.id != handle.id());
    }
}
