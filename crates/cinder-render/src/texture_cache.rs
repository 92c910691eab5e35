//! Sprite texture cache with a white fallback

use std::collections::HashMap;
use std::path::Path;

use tracing::debug;
use wgpu::util::DeviceExt;

use crate::error::RenderError;

/// A GPU-resident texture with its view, sampler, and sprite bind group
pub struct GpuTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub sampler: wgpu::Sampler,
    pub bind_group: wgpu::BindGroup,
}

/// Sprite textures keyed by the name effect configs refer to them by
pub struct SpriteTextures {
    textures: HashMap<String, GpuTexture>,
    /// 1x1 white, used for effects without a texture or with one not loaded yet
    pub default_white: GpuTexture,
}

impl SpriteTextures {
    pub fn new(device: &wgpu::Device, queue: &wgpu::Queue, layout: &wgpu::BindGroupLayout) -> Self {
        let default_white = Self::create(
            device,
            queue,
            layout,
            "Default Sprite",
            1,
            1,
            &[255, 255, 255, 255],
        );
        Self {
            textures: HashMap::new(),
            default_white,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.textures.contains_key(name)
    }

    /// The texture for `name`, or the white fallback
    pub fn get_or_default(&self, name: Option<&str>) -> &GpuTexture {
        name.and_then(|n| self.textures.get(n))
            .unwrap_or(&self.default_white)
    }

    /// Upload tightly-packed RGBA8 pixels under `name`, replacing any previous texture
    #[allow(clippy::too_many_arguments)]
    pub fn insert_rgba(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        name: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) {
        let texture = Self::create(device, queue, layout, name, width, height, rgba);
        self.textures.insert(name.to_string(), texture);
    }

    /// Load a sprite sheet from an image file on disk.
    /// Returns Ok(true) if newly loaded, Ok(false) if already cached.
    pub fn load_file(
        &mut self,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        name: &str,
        path: &Path,
    ) -> Result<bool, RenderError> {
        if self.textures.contains_key(name) {
            return Ok(false);
        }

        let img = image::open(path).map_err(|e| RenderError::TextureLoad {
            name: name.to_string(),
            reason: format!("{}: {}", path.display(), e),
        })?;
        let rgba = img.to_rgba8();
        let (width, height) = rgba.dimensions();
        debug!(target: "particle_render", name, width, height, "loaded sprite texture");

        self.insert_rgba(device, queue, layout, name, width, height, &rgba);
        Ok(true)
    }

    fn create(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        layout: &wgpu::BindGroupLayout,
        label: &str,
        width: u32,
        height: u32,
        rgba: &[u8],
    ) -> GpuTexture {
        let texture = device.create_texture_with_data(
            queue,
            &wgpu::TextureDescriptor {
                label: Some(label),
                size: wgpu::Extent3d {
                    width,
                    height,
                    depth_or_array_layers: 1,
                },
                mip_level_count: 1,
                sample_count: 1,
                dimension: wgpu::TextureDimension::D2,
                format: wgpu::TextureFormat::Rgba8UnormSrgb,
                usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
                view_formats: &[],
            },
            wgpu::util::TextureDataOrder::LayerMajor,
            rgba,
        );

        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        // Frames are packed edge to edge in the sheet
        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            label: Some(&format!("{} Sampler", label)),
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            address_mode_u: wgpu::AddressMode::ClampToEdge,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            ..Default::default()
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: wgpu::BindingResource::TextureView(&view),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::Sampler(&sampler),
                },
            ],
            label: Some(&format!("{} Bind Group", label)),
        });

        GpuTexture {
            texture,
            view,
            sampler,
            bind_group,
        }
    }
}
