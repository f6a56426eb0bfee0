// src/gfx.rs
//
// Instanced cube rasterizer. One draw call: 18 vertices (three faces) per
// instance, all geometry derived from `vertex_index` in the shader.
// Instances arrive sorted back to front, so plain alpha blending is enough.

use std::sync::Arc;

use bytemuck::{Pod, Zeroable};
use isolife::instances::CubeInstance;
use winit::window::Window;

// -----------------------------
// Embedded WGSL shader (no external files)
// -----------------------------
const CUBE_WGSL: &str = r#"
struct Screen {
    size: vec2<f32>,
    tile: vec2<f32>,
};

@group(0) @binding(0) var<uniform> screen: Screen;

struct Inst {
    @location(0) pos: vec2<f32>,
    @location(1) height: f32,
    @location(2) scale: f32,
    @location(3) top: vec4<f32>,
    @location(4) left: vec4<f32>,
    @location(5) right: vec4<f32>,
    @location(6) alpha: f32,
    @location(7) depth: f32,
};

struct VSOut {
    @builtin(position) pos: vec4<f32>,
    @location(0) color: vec4<f32>,
    @location(1) alpha: f32,
    @location(2) depth: f32,
};

@vertex
fn vs_main(@builtin(vertex_index) vi: u32, inst: Inst) -> VSOut {
    // (dx in half-widths, dy in half-heights, lift in cube heights)
    var corners = array<vec3<f32>, 12>(
        // top
        vec3<f32>( 0.0, -1.0, 1.0), vec3<f32>( 1.0, 0.0, 1.0),
        vec3<f32>( 0.0,  1.0, 1.0), vec3<f32>(-1.0, 0.0, 1.0),
        // left
        vec3<f32>(-1.0, 0.0, 0.0), vec3<f32>( 0.0, 1.0, 0.0),
        vec3<f32>( 0.0, 1.0, 1.0), vec3<f32>(-1.0, 0.0, 1.0),
        // right
        vec3<f32>( 0.0, 1.0, 0.0), vec3<f32>( 1.0, 0.0, 0.0),
        vec3<f32>( 1.0, 0.0, 1.0), vec3<f32>( 0.0, 1.0, 1.0),
    );
    var tri = array<u32, 6>(0u, 1u, 2u, 0u, 2u, 3u);

    let face = vi / 6u;
    let c = corners[face * 4u + tri[vi % 6u]];

    let hw = 0.5 * screen.tile.x * inst.scale;
    let hh = 0.5 * screen.tile.y * inst.scale;
    let px = inst.pos.x + c.x * hw;
    let py = inst.pos.y + c.y * hh - c.z * inst.height;

    var out: VSOut;
    out.pos = vec4<f32>(px / screen.size.x * 2.0 - 1.0, 1.0 - py / screen.size.y * 2.0, 0.0, 1.0);
    if (face == 0u) {
        out.color = inst.top;
    } else if (face == 1u) {
        out.color = inst.left;
    } else {
        out.color = inst.right;
    }
    out.alpha = inst.alpha;
    out.depth = inst.depth;
    return out;
}

@fragment
fn fs_main(i: VSOut) -> @location(0) vec4<f32> {
    let shade = mix(0.78, 1.0, i.depth);
    let rgb = i.color.rgb * shade + vec3<f32>(i.color.a * 0.35);
    return vec4<f32>(min(rgb, vec3<f32>(1.0)), clamp(i.alpha, 0.0, 1.0));
}
"#;

const VERTICES_PER_CUBE: u32 = 18;

const INSTANCE_ATTRS: [wgpu::VertexAttribute; 8] = wgpu::vertex_attr_array![
    0 => Float32x2,
    1 => Float32,
    2 => Float32,
    3 => Float32x4,
    4 => Float32x4,
    5 => Float32x4,
    6 => Float32,
    7 => Float32,
];

#[repr(C)]
#[derive(Copy, Clone, Pod, Zeroable)]
struct ScreenUniform {
    size: [f32; 2],
    tile: [f32; 2],
}

#[derive(Debug, thiserror::Error)]
pub enum GfxError {
    #[error("failed to create surface: {0}")]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error("no suitable GPU adapter: {0}")]
    Adapter(#[from] wgpu::RequestAdapterError),
    #[error("request_device failed: {0}")]
    Device(#[from] wgpu::RequestDeviceError),
    #[error("surface reports no supported formats")]
    NoSurfaceFormat,
}

pub struct Gfx {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,

    pipeline: wgpu::RenderPipeline,
    screen_buf: wgpu::Buffer,
    screen_bind: wgpu::BindGroup,
    tile: [f32; 2],

    instance_buf: wgpu::Buffer,
    instance_cap: usize,
    instance_count: u32,

    clear: wgpu::Color,
}

impl Gfx {
    pub async fn new(
        window: Arc<Window>,
        width: u32,
        height: u32,
        background: [f64; 3],
    ) -> Result<Self, GfxError> {
        let instance = wgpu::Instance::default();
        let surface = instance.create_surface(window)?;

        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await?;
        log::info!("adapter: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::default(),
                experimental_features: wgpu::ExperimentalFeatures::default(),
                memory_hints: wgpu::MemoryHints::Performance,
                trace: wgpu::Trace::default(),
            })
            .await?;

        let caps = surface.get_capabilities(&adapter);
        let format = *caps.formats.first().ok_or(GfxError::NoSurfaceFormat)?;
        let present_mode = if caps.present_modes.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            caps.present_modes.first().copied().unwrap_or(wgpu::PresentMode::Fifo)
        };
        let alpha_mode = caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&device, &config);

        let screen_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("screen_uniform"),
            size: std::mem::size_of::<ScreenUniform>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let screen_bgl = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("screen_bgl"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let screen_bind = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("screen_bind"),
            layout: &screen_bgl,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: screen_buf.as_entire_binding(),
            }],
        });

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("cube_shader"),
            source: wgpu::ShaderSource::Wgsl(CUBE_WGSL.into()),
        });

        let pl_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("cube_pl_layout"),
            bind_group_layouts: &[&screen_bgl],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("cube_pipeline"),
            layout: Some(&pl_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: std::mem::size_of::<CubeInstance>() as u64,
                    step_mode: wgpu::VertexStepMode::Instance,
                    attributes: &INSTANCE_ATTRS,
                }],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: wgpu::PipelineCompilationOptions::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        let instance_cap = 1024;
        let instance_buf = Self::make_instance_buffer(&device, instance_cap);

        let gfx = Self {
            surface,
            device,
            queue,
            config,
            pipeline,
            screen_buf,
            screen_bind,
            tile: [1.0, 0.5],
            instance_buf,
            instance_cap,
            instance_count: 0,
            clear: wgpu::Color {
                r: background[0],
                g: background[1],
                b: background[2],
                a: 1.0,
            },
        };
        gfx.write_screen();
        Ok(gfx)
    }

    fn make_instance_buffer(device: &wgpu::Device, cap: usize) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("cube_instances"),
            size: (cap.max(1) * std::mem::size_of::<CubeInstance>()) as u64,
            usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    fn write_screen(&self) {
        let u = ScreenUniform {
            size: [self.config.width as f32, self.config.height as f32],
            tile: self.tile,
        };
        self.queue.write_buffer(&self.screen_buf, 0, bytemuck::bytes_of(&u));
    }

    pub fn size(&self) -> (u32, u32) {
        (self.config.width, self.config.height)
    }

    pub fn set_tile(&mut self, tile_w: f32, tile_h: f32) {
        self.tile = [tile_w, tile_h];
        self.write_screen();
    }

    pub fn resize(&mut self, new_w: u32, new_h: u32) {
        self.config.width = new_w.max(1);
        self.config.height = new_h.max(1);
        self.surface.configure(&self.device, &self.config);
        self.write_screen();
    }

    /// Upload this frame's instances. The buffer only ever grows.
    pub fn upload(&mut self, instances: &[CubeInstance]) {
        if instances.len() > self.instance_cap {
            self.instance_cap = instances.len().next_power_of_two();
            self.instance_buf = Self::make_instance_buffer(&self.device, self.instance_cap);
            log::debug!("instance buffer grown to {}", self.instance_cap);
        }
        if !instances.is_empty() {
            self.queue
                .write_buffer(&self.instance_buf, 0, bytemuck::cast_slice(instances));
        }
        self.instance_count = instances.len() as u32;
    }

    pub fn render(&mut self) {
        let frame = match self.surface.get_current_texture() {
            Ok(f) => f,
            Err(e) => {
                log::warn!("surface: {e}, reconfiguring");
                self.surface.configure(&self.device, &self.config);
                return;
            }
        };
        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut enc = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("enc") });

        {
            let mut rp = enc.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("rp"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear),
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });

            if self.instance_count > 0 {
                rp.set_pipeline(&self.pipeline);
                rp.set_bind_group(0, &self.screen_bind, &[]);
                rp.set_vertex_buffer(0, self.instance_buf.slice(..));
                rp.draw(0..VERTICES_PER_CUBE, 0..self.instance_count);
            }
        }

        self.queue.submit(Some(enc.finish()));
        frame.present();
    }
}
