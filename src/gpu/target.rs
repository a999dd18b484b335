//! Render backends backed by a presentable surface or an offscreen texture.

use anyhow::{anyhow, Context, Result};

use crate::camera::PerspectiveCamera;
use crate::color::Color;
use crate::gpu::renderer::Renderer;
use crate::post_processing::Composer;
use crate::runtime::RenderBackend;
use crate::scene_graph::SceneGraph;

fn device_limits(adapter: &wgpu::Adapter) -> wgpu::Limits {
    if cfg!(target_arch = "wasm32") {
        wgpu::Limits::downlevel_webgl2_defaults().using_resolution(adapter.limits())
    } else {
        wgpu::Limits::default()
    }
}

/// Pick an adapter (compatible with `surface` if given) and open a device.
pub async fn request_device(
    instance: &wgpu::Instance,
    surface: Option<&wgpu::Surface<'_>>,
) -> Result<(wgpu::Adapter, wgpu::Device, wgpu::Queue)> {
    let adapter = instance
        .request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::HighPerformance,
            compatible_surface: surface,
            force_fallback_adapter: false,
        })
        .await
        .ok_or_else(|| anyhow!("No adapter found"))?;

    let (device, queue) = adapter
        .request_device(
            &wgpu::DeviceDescriptor {
                label: Some("framescope device"),
                required_features: wgpu::Features::empty(),
                required_limits: device_limits(&adapter),
                memory_hints: Default::default(),
            },
            None,
        )
        .await
        .context("Failed to create device")?;

    log::info!("Using adapter {:?}", adapter.get_info().name);
    Ok((adapter, device, queue))
}

/// Renders into a window or canvas surface.
pub struct SurfaceBackend {
    surface: wgpu::Surface<'static>,
    config: wgpu::SurfaceConfiguration,
    renderer: Renderer,
}

impl SurfaceBackend {
    pub async fn new(
        instance: &wgpu::Instance,
        surface: wgpu::Surface<'static>,
        width: u32,
        height: u32,
        background: Color,
    ) -> Result<Self> {
        let (adapter, device, queue) = request_device(instance, Some(&surface)).await?;

        let caps = surface.get_capabilities(&adapter);
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| anyhow!("Surface has no supported formats"))?;

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode: caps.present_modes.first().copied().unwrap_or(wgpu::PresentMode::Fifo),
            alpha_mode: caps.alpha_modes.first().copied().unwrap_or(wgpu::CompositeAlphaMode::Auto),
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let mut renderer = Renderer::new(device, queue, format, config.width, config.height);
        renderer.set_clear_color(background);

        Ok(Self {
            surface,
            config,
            renderer,
        })
    }

    fn reconfigure(&mut self) {
        self.surface.configure(self.renderer.device(), &self.config);
    }
}

impl RenderBackend for SurfaceBackend {
    fn surface_size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    fn set_size(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        self.config.width = width;
        self.config.height = height;
        self.reconfigure();
        self.renderer.resize(width, height);
    }

    fn render(&mut self, scene: &SceneGraph, camera: &PerspectiveCamera, composer: &Composer) -> Result<()> {
        match self.surface.get_current_texture() {
            Ok(output) => {
                let view = output.texture.create_view(&wgpu::TextureViewDescriptor::default());
                self.renderer.render(&view, scene, camera, composer);
                output.present();
                Ok(())
            }
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                // skip this frame, the next one uses the fresh configuration
                self.reconfigure();
                Ok(())
            }
            Err(wgpu::SurfaceError::Timeout) => {
                log::debug!("Surface timeout, frame skipped");
                Ok(())
            }
            Err(e) => Err(anyhow!("Surface error: {:?}", e)),
        }
    }
}

/// Renders into a texture that can be read back, for headless output.
#[cfg(not(target_arch = "wasm32"))]
pub struct OffscreenBackend {
    renderer: Renderer,
    texture: wgpu::Texture,
    view: wgpu::TextureView,
    width: u32,
    height: u32,
}

#[cfg(not(target_arch = "wasm32"))]
const OFFSCREEN_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba8UnormSrgb;

#[cfg(not(target_arch = "wasm32"))]
fn create_offscreen_texture(device: &wgpu::Device, width: u32, height: u32) -> (wgpu::Texture, wgpu::TextureView) {
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        label: Some("Target Texture"),
        size: wgpu::Extent3d {
            width,
            height,
            depth_or_array_layers: 1,
        },
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: OFFSCREEN_FORMAT,
        usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
        view_formats: &[],
    });
    let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
    (texture, view)
}

#[cfg(not(target_arch = "wasm32"))]
impl OffscreenBackend {
    pub async fn new(width: u32, height: u32, background: Color) -> Result<Self> {
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor::default());
        let (_adapter, device, queue) = request_device(&instance, None).await?;

        let width = width.max(1);
        let height = height.max(1);
        let (texture, view) = create_offscreen_texture(&device, width, height);
        let mut renderer = Renderer::new(device, queue, OFFSCREEN_FORMAT, width, height);
        renderer.set_clear_color(background);

        Ok(Self {
            renderer,
            texture,
            view,
            width,
            height,
        })
    }

    /// Copy the last rendered frame out as tightly packed RGBA8 rows.
    pub fn read_pixels(&self) -> Result<Vec<u8>> {
        let unpadded_bytes_per_row = 4 * self.width;
        let align = wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;
        let padded_bytes_per_row = unpadded_bytes_per_row.div_ceil(align) * align;

        let device = self.renderer.device();
        let output_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Output Buffer"),
            size: (padded_bytes_per_row * self.height) as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::COPY_DST | wgpu::BufferUsages::MAP_READ,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::ImageCopyTexture {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::ImageCopyBuffer {
                buffer: &output_buffer,
                layout: wgpu::ImageDataLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_bytes_per_row),
                    rows_per_image: Some(self.height),
                },
            },
            self.texture.size(),
        );
        self.renderer.queue().submit(Some(encoder.finish()));

        let buffer_slice = output_buffer.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(wgpu::MapMode::Read, move |v| {
            let _ = tx.send(v);
        });
        device.poll(wgpu::Maintain::Wait);
        rx.recv()
            .context("Readback callback dropped")?
            .context("Failed to map readback buffer")?;

        let data = buffer_slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((unpadded_bytes_per_row * self.height) as usize);
        for row in 0..self.height {
            let start = (row * padded_bytes_per_row) as usize;
            let end = start + unpadded_bytes_per_row as usize;
            pixels.extend_from_slice(&data[start..end]);
        }
        drop(data);
        output_buffer.unmap();

        Ok(pixels)
    }

    pub fn renderer(&self) -> &Renderer {
        &self.renderer
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl RenderBackend for OffscreenBackend {
    fn surface_size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn set_size(&mut self, width: u32, height: u32) {
        if width == 0 || height == 0 || (width, height) == (self.width, self.height) {
            return;
        }
        let (texture, view) = create_offscreen_texture(self.renderer.device(), width, height);
        self.texture = texture;
        self.view = view;
        self.width = width;
        self.height = height;
        self.renderer.resize(width, height);
    }

    fn render(&mut self, scene: &SceneGraph, camera: &PerspectiveCamera, composer: &Composer) -> Result<()> {
        self.renderer.render(&self.view, scene, camera, composer);
        Ok(())
    }
}
