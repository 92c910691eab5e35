//! Particle render pipeline and its GPU resources
//!
//! Particles are drawn without vertex buffers: a storage buffer window of
//! packed particle records (group 3) is indexed from `vertex_index`, and a
//! shared index buffer turns every four vertices into a quad. Bind groups:
//! - group 0: per-draw `InstanceParams` (dynamic offset), curve atlas, fog image
//! - group 1: per-type `TypeParams` (dynamic offset)
//! - group 2: sprite texture
//! - group 3: particle ring region (dynamic offset)

use std::num::NonZeroU64;

use cinder_particles::atlas::ATLAS_CAPACITY;
use cinder_particles::{
    InstanceParams, TypeParams, UploadConfig, ATLAS_HEIGHT, ATLAS_WIDTH, GPU_PARTICLE_SIZE,
};
use wgpu::util::DeviceExt;

use crate::error::RenderError;

/// Draws that fit in the per-frame instance uniform buffer
pub const DEFAULT_MAX_DRAWS: u32 = 1024;

/// Round `size` up to a multiple of `alignment`
pub fn align_to(size: u64, alignment: u64) -> u64 {
    size.div_ceil(alignment) * alignment
}

/// Index list for `quads` quads: four vertices each, two triangles
pub fn quad_indices(quads: u32) -> Vec<u32> {
    (0..quads)
        .flat_map(|q| {
            let base = q * 4;
            [base, base + 1, base + 2, base + 2, base + 1, base + 3]
        })
        .collect()
}

/// The particle pipeline plus the buffers and textures its draws read
pub struct ParticlePipeline {
    pub pipeline: wgpu::RenderPipeline,
    pub frame_bind_group_layout: wgpu::BindGroupLayout,
    pub type_bind_group_layout: wgpu::BindGroupLayout,
    pub sprite_bind_group_layout: wgpu::BindGroupLayout,
    pub particle_bind_group_layout: wgpu::BindGroupLayout,

    pub quad_index_buffer: wgpu::Buffer,
    pub instance_buffer: wgpu::Buffer,
    pub instance_stride: u64,
    pub max_draws: u32,
    pub type_buffer: wgpu::Buffer,
    pub type_stride: u64,
    pub type_bind_group: wgpu::BindGroup,

    /// One storage buffer per ring slot
    pub ring_buffers: Vec<wgpu::Buffer>,
    pub ring_bind_groups: Vec<wgpu::BindGroup>,

    pub atlas_texture: wgpu::Texture,
    pub atlas_view: wgpu::TextureView,
    pub curve_sampler: wgpu::Sampler,
    pub fog_texture: wgpu::Texture,
    pub frame_bind_group: wgpu::BindGroup,
}

impl ParticlePipeline {
    pub fn new(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        format: wgpu::TextureFormat,
        upload: &UploadConfig,
        max_draws: u32,
    ) -> Result<Self, RenderError> {
        let limits = device.limits();
        let storage_alignment = u64::from(limits.min_storage_buffer_offset_alignment);
        if upload.ring_depth == 0
            || upload.max_particles_per_frame == 0
            || upload.offset_alignment == 0
        {
            return Err(RenderError::Unsupported(
                "ring_depth, max_particles_per_frame and offset_alignment must be positive".into(),
            ));
        }
        if u64::from(upload.offset_alignment) % storage_alignment != 0 {
            return Err(RenderError::Unsupported(format!(
                "offset_alignment {} is not a multiple of the device storage alignment {}",
                upload.offset_alignment, storage_alignment
            )));
        }

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Particle Shader"),
            source: wgpu::ShaderSource::Wgsl(include_str!("particle_shader.wgsl").into()),
        });

        let instance_size = std::mem::size_of::<InstanceParams>() as u64;
        let type_size = std::mem::size_of::<TypeParams>() as u64;
        let window_size = u64::from(upload.max_particles_per_frame) * GPU_PARTICLE_SIZE;

        // Group 0: per-draw instance params + curve atlas + fog
        let frame_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Buffer {
                            ty: wgpu::BufferBindingType::Uniform,
                            has_dynamic_offset: true,
                            min_binding_size: NonZeroU64::new(instance_size),
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::VERTEX,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 2,
                        visibility: wgpu::ShaderStages::VERTEX | wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 3,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                ],
                label: Some("Particle Frame Bind Group Layout"),
            });

        // Group 1: per-type params
        let type_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(type_size),
                    },
                    count: None,
                }],
                label: Some("Particle Type Bind Group Layout"),
            });

        // Group 2: sprite texture + sampler
        let sprite_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[
                    wgpu::BindGroupLayoutEntry {
                        binding: 0,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Texture {
                            sample_type: wgpu::TextureSampleType::Float { filterable: true },
                            view_dimension: wgpu::TextureViewDimension::D2,
                            multisampled: false,
                        },
                        count: None,
                    },
                    wgpu::BindGroupLayoutEntry {
                        binding: 1,
                        visibility: wgpu::ShaderStages::FRAGMENT,
                        ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                        count: None,
                    },
                ],
                label: Some("Particle Sprite Bind Group Layout"),
            });

        // Group 3: particle records (read-only window into a ring region)
        let particle_bind_group_layout =
            device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
                entries: &[wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::VERTEX,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: true,
                        min_binding_size: NonZeroU64::new(GPU_PARTICLE_SIZE),
                    },
                    count: None,
                }],
                label: Some("Particle Storage Bind Group Layout"),
            });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Particle Pipeline Layout"),
            bind_group_layouts: &[
                &frame_bind_group_layout,
                &type_bind_group_layout,
                &sprite_bind_group_layout,
                &particle_bind_group_layout,
            ],
            push_constant_ranges: &[],
        });

        // Depth test enabled, depth write disabled (translucent)
        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Particle Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::PREMULTIPLIED_ALPHA_BLENDING),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: wgpu::TextureFormat::Depth32Float,
                depth_write_enabled: false,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        // Shared quad index buffer covering the largest possible draw
        let quad_index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Particle Quad Index Buffer"),
            contents: bytemuck::cast_slice(&quad_indices(upload.max_particles_per_frame)),
            usage: wgpu::BufferUsages::INDEX,
        });

        let uniform_alignment = u64::from(limits.min_uniform_buffer_offset_alignment);
        let instance_stride = align_to(instance_size, uniform_alignment);
        let instance_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Instance Buffer"),
            size: instance_stride * u64::from(max_draws.max(1)),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // Type ids never exceed the number of atlas slots
        let type_stride = align_to(type_size, uniform_alignment);
        let type_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Particle Type Buffer"),
            size: type_stride * u64::from(ATLAS_CAPACITY),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let type_bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout: &type_bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                    buffer: &type_buffer,
                    offset: 0,
                    size: NonZeroU64::new(type_size),
                }),
            }],
            label: Some("Particle Type Bind Group"),
        });

        // Each region is followed by a full window so any aligned offset inside it can bind
        let ring_size = upload.region_size() + window_size;
        let mut ring_buffers = Vec::with_capacity(upload.ring_depth as usize);
        let mut ring_bind_groups = Vec::with_capacity(upload.ring_depth as usize);
        for slot in 0..upload.ring_depth {
            let buffer = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some(&format!("Particle Ring Buffer {}", slot)),
                size: ring_size,
                usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
                layout: &particle_bind_group_layout,
                entries: &[wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: &buffer,
                        offset: 0,
                        size: NonZeroU64::new(window_size),
                    }),
                }],
                label: Some(&format!("Particle Ring Bind Group {}", slot)),
            });
            ring_buffers.push(buffer);
            ring_bind_groups.push(bind_group);
        }

        let atlas_texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Particle Curve Atlas"),
            size: wgpu::Extent3d {
                width: ATLAS_WIDTH,
                height: ATLAS_HEIGHT,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: wgpu::TextureFormat::Rgba8Unorm,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let atlas_view = atlas_texture.create_view(&wgpu::TextureViewDescriptor::default());
        let curve_sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some("Particle Curve Sampler"),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        // Fully visible until a fog image is supplied
        let fog_texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some("Particle Default Fog"),
                size: wgpu::Extent3d {
                    width: 1,
                    height: 1,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8Unorm,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            &[255, 255, 255, 255],
        );
        let fog_view = fog_texture.create_view(&wgpu::TextureViewDescriptor::default());

        let frame_bind_group = Self::frame_bind_group(
            device,
            &frame_bind_group_layout,
            &instance_buffer,
            &atlas_view,
            &curve_sampler,
            &fog_view,
        );

        Ok(Self {
            pipeline,
            frame_bind_group_layout,
            type_bind_group_layout,
            sprite_bind_group_layout,
            particle_bind_group_layout,
            quad_index_buffer,
            instance_buffer,
            instance_stride,
            max_draws: max_draws.max(1),
            type_buffer,
            type_stride,
            type_bind_group,
            ring_buffers,
            ring_bind_groups,
            atlas_texture,
            atlas_view,
            curve_sampler,
            fog_texture,
            frame_bind_group,
        })
    }

    /// Use `fog` as the visibility image (red channel, sampled in screen space)
    pub fn set_fog_view(&mut self, device: &wgpu::Device, fog: &wgpu::TextureView) {
        self.frame_bind_group = Self::frame_bind_group(
            device,
            &self.frame_bind_group_layout,
            &self.instance_buffer,
            &self.atlas_view,
            &self.curve_sampler,
            fog,
        );
    }

    fn frame_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        instance_buffer: &wgpu::Buffer,
        atlas_view: &wgpu::TextureView,
        curve_sampler: &wgpu::Sampler,
        fog_view: &wgpu::TextureView,
    ) -> wgpu::BindGroup {
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::Buffer(wgpu::BufferBinding {
                        buffer: instance_buffer,
                        offset: 0,
                        size: NonZeroU64::new(std::mem::size_of::<InstanceParams>() as u64),
                    }),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(atlas_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::Sampler(curve_sampler),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::TextureView(fog_view),
                },
            ],
            label: Some("Particle Frame Bind Group"),
        })
    }
}
