//! Hi-Z resources: occluder depth target, R32Float max-depth pyramid, per-level kernel params.

use bytemuck::{Pod, Zeroable};
use wgpu::TextureView;

use crate::buffer::{align_up, create_buffer, BufferRegion};
use crate::error::CullError;
use crate::hiz::{level_count, level_size};

pub const DEPTH_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Depth32Float;
pub const PYRAMID_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::R32Float;

/// Source and destination size of one pyramid pass. Level 0 (the depth copy) uses equal sizes.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct LevelParams {
    pub src_size: [u32; 2],
    pub dst_size: [u32; 2],
}

pub struct HiZResources {
    pub depth: wgpu::Texture,
    pub pyramid: wgpu::Texture,
    level_params: Vec<BufferRegion>,
    width: u32,
    height: u32,
    levels: u32,
}

impl HiZResources {
    pub fn ensure_size(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        existing: Option<Self>,
        width: u32,
        height: u32,
    ) -> Result<Self, CullError> {
        if width == 0 || height == 0 {
            return Err(CullError::InvalidConfig("HiZResources: width and height must be > 0".to_string()));
        }
        if let Some(r) = existing {
            if r.width == width && r.height == height {
                return Ok(r);
            }
        }
        let levels = level_count(width, height);
        let depth = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("hizcull_occluder_depth"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: DEPTH_FORMAT,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            view_formats: &[],
        });
        let pyramid = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("hizcull_hiz_pyramid"),
            size: wgpu::Extent3d { width, height, depth_or_array_layers: 1 },
            mip_level_count: levels,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: PYRAMID_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING
                | wgpu::TextureUsages::STORAGE_BINDING
                | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });

        let stride = align_up(
            std::mem::size_of::<LevelParams>() as u64,
            device.limits().min_uniform_buffer_offset_alignment as u64,
        );
        let params_buf = create_buffer(
            device,
            "hizcull_hiz_level_params",
            stride * levels as u64,
            wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        );
        let mut level_params = Vec::with_capacity(levels as usize);
        for l in 0..levels {
            let src = if l == 0 { level_size(width, height, 0) } else { level_size(width, height, l - 1) };
            let dst = level_size(width, height, l);
            let params = LevelParams { src_size: [src.0, src.1], dst_size: [dst.0, dst.1] };
            let region = BufferRegion::new(
                params_buf.clone(),
                stride * l as u64,
                std::mem::size_of::<LevelParams>() as u64,
            );
            region.write(queue, 0, bytemuck::bytes_of(&params));
            level_params.push(region);
        }
        log::debug!("hi-z pyramid {width}x{height}, {levels} levels");
        Ok(Self { depth, pyramid, level_params, width, height, levels })
    }

    pub fn width(&self) -> u32 { self.width }
    pub fn height(&self) -> u32 { self.height }
    pub fn levels(&self) -> u32 { self.levels }
    pub fn level_size(&self, level: u32) -> (u32, u32) { level_size(self.width, self.height, level) }
    pub fn level_params(&self, level: u32) -> &BufferRegion { &self.level_params[level as usize] }
    pub fn depth_view(&self) -> TextureView { self.depth.create_view(&Default::default()) }
    /// All mips, for sampling by the visibility test or consumers.
    pub fn pyramid_view(&self) -> TextureView { self.pyramid.create_view(&Default::default()) }

    /// Single-mip view for reading one level.
    pub fn level_view(&self, level: u32) -> TextureView {
        self.pyramid.create_view(&wgpu::TextureViewDescriptor {
            label: Some("hizcull_hiz_level"),
            base_mip_level: level,
            mip_level_count: Some(1),
            ..Default::default()
        })
    }
}
