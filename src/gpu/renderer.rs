//! GPU renderer for the scene graph.
//!
//! Draws every visible entity into the composer's scene target, the outlined
//! entities into the mask target, then composites both into the output view.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use wgpu::util::DeviceExt;

use crate::camera::PerspectiveCamera;
use crate::color::Color;
use crate::gpu::composer::ComposerTargets;
use crate::gpu::mesh::Topology;
use crate::gpu::pipeline::{self, ScenePass};
use crate::post_processing::Composer;
use crate::scene_graph::{EntityId, SceneGraph};

/// Maximum number of entities that can be drawn per frame.
/// Each entity needs its own slot in the dynamic uniform buffer.
const MAX_ENTITIES_PER_FRAME: usize = 256;

/// Uniform buffer alignment (WebGPU minUniformBufferOffsetAlignment is typically 256 bytes)
const UNIFORM_ALIGNMENT: usize = 256;

#[repr(C)]
#[derive(Debug, Copy, Clone, Pod, Zeroable)]
struct Uniforms {
    view_proj: [[f32; 4]; 4],
    model: [[f32; 4]; 4],
    instance_color: [f32; 4],
    // Padding to reach 256-byte alignment (144 bytes of data + 112 bytes padding)
    _padding: [f32; 28],
}

impl Uniforms {
    fn new(view_proj: glam::Mat4, model: glam::Mat4, color: Color) -> Self {
        Self {
            view_proj: view_proj.to_cols_array_2d(),
            model: model.to_cols_array_2d(),
            instance_color: color.to_array(),
            _padding: [0.0; 28],
        }
    }
}

/// Uploaded geometry for one entity.
struct EntityBuffers {
    vertex_buffer: wgpu::Buffer,
    index_buffer: wgpu::Buffer,
    num_indices: u32,
    topology: Topology,
}

/// One entity's draw for this frame.
struct DrawItem {
    id: EntityId,
    slot: usize,
    /// Drawn in the colour pass.
    colored: bool,
    /// Drawn in the mask pass.
    masked: bool,
}

pub struct Renderer {
    device: wgpu::Device,
    queue: wgpu::Queue,
    format: wgpu::TextureFormat,
    color_pipelines: HashMap<Topology, wgpu::RenderPipeline>,
    mask_pipelines: HashMap<Topology, wgpu::RenderPipeline>,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    entity_buffers: HashMap<EntityId, EntityBuffers>,
    targets: ComposerTargets,
    clear_color: wgpu::Color,
}

impl Renderer {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue, format: wgpu::TextureFormat, width: u32, height: u32) -> Self {
        // Create a large uniform buffer for dynamic uniform binding (one slot per entity)
        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Entity Uniform Buffer (Dynamic)"),
            size: (UNIFORM_ALIGNMENT * MAX_ENTITIES_PER_FRAME) as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX_FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: true,
                    min_binding_size: wgpu::BufferSize::new(std::mem::size_of::<Uniforms>() as u64),
                },
                count: None,
            }],
            label: Some("entity_bind_group_layout"),
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &uniform_buffer,
                    offset: 0,
                    size: wgpu::BufferSize::new(std::mem::size_of::<Uniforms>() as u64),
                }),
            }],
            label: Some("entity_bind_group"),
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Scene Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let mut color_pipelines = HashMap::new();
        let mut mask_pipelines = HashMap::new();
        for topology in [Topology::Lines, Topology::Triangles] {
            color_pipelines.insert(
                topology,
                pipeline::create_scene_pipeline(&device, &pipeline_layout, format, topology, ScenePass::Color),
            );
            mask_pipelines.insert(
                topology,
                pipeline::create_scene_pipeline(&device, &pipeline_layout, format, topology, ScenePass::Mask),
            );
        }

        let targets = ComposerTargets::new(&device, format, width, height);

        Self {
            device,
            queue,
            format,
            color_pipelines,
            mask_pipelines,
            uniform_buffer,
            bind_group,
            entity_buffers: HashMap::new(),
            targets,
            clear_color: wgpu::Color::BLACK,
        }
    }

    pub fn device(&self) -> &wgpu::Device {
        &self.device
    }

    pub fn queue(&self) -> &wgpu::Queue {
        &self.queue
    }

    pub fn format(&self) -> wgpu::TextureFormat {
        self.format
    }

    pub fn size(&self) -> (u32, u32) {
        self.targets.size()
    }

    pub fn set_clear_color(&mut self, color: Color) {
        self.clear_color = color.to_wgpu();
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.targets.resize(&self.device, width, height);
        }
    }

    /// Number of entities with uploaded geometry.
    pub fn cached_entities(&self) -> usize {
        self.entity_buffers.len()
    }

    /// Upload geometry for new entities and drop buffers of destroyed ones.
    fn sync_buffers(&mut self, scene: &SceneGraph) {
        self.entity_buffers.retain(|id, _| scene.exists(*id));

        for (id, node) in scene.nodes() {
            if self.entity_buffers.contains_key(&id) {
                continue;
            }
            let geometry = node.renderable.geometry();
            if geometry.indices.is_empty() {
                continue;
            }
            let vertex_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Entity Vertex Buffer"),
                contents: bytemuck::cast_slice(&geometry.vertices),
                usage: wgpu::BufferUsages::VERTEX,
            });
            // index buffers must be a multiple of 4 bytes
            let mut indices = geometry.indices.clone();
            if indices.len() % 2 == 1 {
                indices.push(0);
            }
            let index_buffer = self.device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
                label: Some("Entity Index Buffer"),
                contents: bytemuck::cast_slice(&indices),
                usage: wgpu::BufferUsages::INDEX,
            });
            self.entity_buffers.insert(
                id,
                EntityBuffers {
                    vertex_buffer,
                    index_buffer,
                    num_indices: geometry.indices.len() as u32,
                    topology: geometry.topology,
                },
            );
        }
    }

    /// Render the scene through the composer into `view`.
    pub fn render(
        &mut self,
        view: &wgpu::TextureView,
        scene: &SceneGraph,
        camera: &PerspectiveCamera,
        composer: &Composer,
    ) {
        let (width, height) = composer.size();
        self.resize(width, height);
        self.sync_buffers(scene);

        let outline = composer.outline();
        let view_proj = camera.view_projection_matrix();

        let mut draws = Vec::new();
        for (id, node) in scene.nodes() {
            if !node.visible || !self.entity_buffers.contains_key(&id) {
                continue;
            }
            let color = node.renderable.color();
            let colored = color.a > 0.0;
            let masked = outline.is_active() && outline.is_selected(id);
            if !colored && !masked {
                continue;
            }
            if draws.len() >= MAX_ENTITIES_PER_FRAME {
                log::warn!("Too many entities, only {} will be rendered", MAX_ENTITIES_PER_FRAME);
                break;
            }

            // Pre-write uniforms BEFORE the passes; write_buffer is not recorded in the command stream.
            let slot = draws.len();
            let uniforms = Uniforms::new(view_proj, node.transform.matrix(), color);
            self.queue.write_buffer(
                &self.uniform_buffer,
                (slot * UNIFORM_ALIGNMENT) as u64,
                bytemuck::cast_slice(&[uniforms]),
            );
            draws.push(DrawItem {
                id,
                slot,
                colored,
                masked,
            });
        }

        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Render Encoder"),
        });

        self.draw_pass(
            &mut encoder,
            "Scene Pass",
            self.targets.scene_view(),
            self.clear_color,
            &self.color_pipelines,
            draws.iter().filter(|d| d.colored),
        );
        self.draw_pass(
            &mut encoder,
            "Outline Mask Pass",
            self.targets.mask_view(),
            wgpu::Color::TRANSPARENT,
            &self.mask_pipelines,
            draws.iter().filter(|d| d.masked),
        );
        self.targets.composite(&self.queue, &mut encoder, view, outline);

        self.queue.submit(std::iter::once(encoder.finish()));
    }

    fn draw_pass<'d>(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        label: &str,
        target: &wgpu::TextureView,
        clear: wgpu::Color,
        pipelines: &HashMap<Topology, wgpu::RenderPipeline>,
        draws: impl Iterator<Item = &'d DrawItem>,
    ) {
        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(clear),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        for draw in draws {
            let Some(buffers) = self.entity_buffers.get(&draw.id) else {
                continue;
            };
            let Some(pipeline) = pipelines.get(&buffers.topology) else {
                continue;
            };
            let offset = (draw.slot * UNIFORM_ALIGNMENT) as u32;
            render_pass.set_pipeline(pipeline);
            render_pass.set_bind_group(0, &self.bind_group, &[offset]);
            render_pass.set_vertex_buffer(0, buffers.vertex_buffer.slice(..));
            render_pass.set_index_buffer(buffers.index_buffer.slice(..), wgpu::IndexFormat::Uint16);
            render_pass.draw_indexed(0..buffers.num_indices, 0, 0..1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_uniforms_fill_one_slot() {
        assert_eq!(std::mem::size_of::<Uniforms>(), UNIFORM_ALIGNMENT);
    }

    #[test]
    fn test_uniforms_carry_color() {
        let model = glam::Mat4::from_translation(glam::Vec3::X);
        let uniforms = Uniforms::new(glam::Mat4::IDENTITY, model, Color::WHITE.with_alpha(0.5));
        assert_eq!(uniforms.instance_color[3], 0.5);
        assert_eq!(uniforms.model[3][0], 1.0);
    }
}
