//! Hi-Z builder: occluders -> depth target -> R32Float mip 0 -> max-reduced mip chain.

pub mod reference;

use std::sync::Arc;

use glam::Mat4;
use wgpu::CommandEncoder;

use crate::error::CullError;
use crate::resources::{HiZResources, DEPTH_FORMAT};
use crate::shader::{BindingDecl, BindingKind, Kernel, KernelDescriptor, ShaderService};
use crate::tuning::{resolve_workgroup_size, KernelId, WorkgroupTuner};

const OCCLUDER_SHADER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/occluder.wgsl"));
const HIZ_COPY_SHADER: &str = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/hiz_copy.wgsl"));
const HIZ_DOWNSAMPLE_SHADER: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/hiz_downsample.wgsl"));

const COPY_BINDINGS: &[BindingDecl] = &[
    BindingDecl::buffer("params", BindingKind::Uniform, "LevelParams"),
    BindingDecl::texture("depth", BindingKind::Texture2dUnfilterable),
    BindingDecl::texture("dst", BindingKind::StorageTextureR32FloatWrite),
];

const DOWNSAMPLE_BINDINGS: &[BindingDecl] = &[
    BindingDecl::buffer("params", BindingKind::Uniform, "LevelParams"),
    BindingDecl::texture("src", BindingKind::Texture2dUnfilterable),
    BindingDecl::texture("dst", BindingKind::StorageTextureR32FloatWrite),
];

/// floor(log2(max(w, h))) + 1.
pub fn level_count(width: u32, height: u32) -> u32 {
    let m = width.max(height).max(1);
    32 - m.leading_zeros()
}

/// Size of `level`; each axis halves (rounding down) and stops at 1.
pub fn level_size(width: u32, height: u32, level: u32) -> (u32, u32) {
    ((width >> level).max(1), (height >> level).max(1))
}

pub fn copy_kernel_descriptor() -> KernelDescriptor {
    KernelDescriptor {
        name: "hiz_copy",
        source: HIZ_COPY_SHADER,
        entry_point: "main",
        defines: Vec::new(),
        bindings: COPY_BINDINGS,
    }
}

pub fn downsample_kernel_descriptor() -> KernelDescriptor {
    KernelDescriptor {
        name: "hiz_downsample",
        source: HIZ_DOWNSAMPLE_SHADER,
        entry_point: "main",
        defines: Vec::new(),
        bindings: DOWNSAMPLE_BINDINGS,
    }
}

/// Occluder geometry: positions in the first 12 bytes of each vertex, u32 indices.
#[derive(Clone)]
pub struct OccluderDraw {
    pub vertex_buf: Arc<wgpu::Buffer>,
    pub index_buf: Arc<wgpu::Buffer>,
    pub index_count: u32,
    /// World transform (column-major 4x4).
    pub transform: [f32; 16],
}

pub struct HiZBuilder {
    occluder_pipeline: wgpu::RenderPipeline,
    occluder_bind_group_layout: wgpu::BindGroupLayout,
    mvp_buf: wgpu::Buffer,
    mvp_capacity: u64,
    copy_kernel: Kernel,
    downsample_kernel: Kernel,
}

impl HiZBuilder {
    pub fn new(
        device: &wgpu::Device,
        shaders: &dyn ShaderService,
        tuner: &dyn WorkgroupTuner,
        vertex_stride: u64,
    ) -> Result<Self, CullError> {
        let limits = device.limits();
        let copy_kernel = shaders.compile_kernel(
            device,
            &copy_kernel_descriptor(),
            resolve_workgroup_size(tuner, KernelId::HiZCopy, &limits),
        )?;
        let downsample_kernel = shaders.compile_kernel(
            device,
            &downsample_kernel_descriptor(),
            resolve_workgroup_size(tuner, KernelId::HiZDownsample, &limits),
        )?;

        device.push_error_scope(wgpu::ErrorFilter::Validation);
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("occluder_shader"),
            source: wgpu::ShaderSource::Wgsl(OCCLUDER_SHADER.into()),
        });

        let occluder_bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("occluder_bind_group_layout"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::VERTEX,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Storage { read_only: true },
                    has_dynamic_offset: false,
                    min_binding_size: std::num::NonZeroU64::new(64),
                },
                count: None,
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("occluder_pipeline_layout"),
            bind_group_layouts: &[&occluder_bind_group_layout],
            push_constant_ranges: &[],
        });

        let occluder_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("occluder_pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs"),
                buffers: &[wgpu::VertexBufferLayout {
                    array_stride: vertex_stride,
                    step_mode: wgpu::VertexStepMode::Vertex,
                    attributes: &[wgpu::VertexAttribute {
                        offset: 0,
                        shader_location: 0,
                        format: wgpu::VertexFormat::Float32x3,
                    }],
                }],
                compilation_options: Default::default(),
            },
            fragment: None,
            primitive: wgpu::PrimitiveState {
                cull_mode: None,
                ..Default::default()
            },
            depth_stencil: Some(wgpu::DepthStencilState {
                format: DEPTH_FORMAT,
                depth_write_enabled: true,
                depth_compare: wgpu::CompareFunction::Less,
                stencil: wgpu::StencilState::default(),
                bias: wgpu::DepthBiasState::default(),
            }),
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });
        if let Some(err) = pollster::block_on(device.pop_error_scope()) {
            return Err(CullError::ShaderCompile { descriptor: "occluder".to_string(), message: err.to_string() });
        }

        let mvp_capacity = 64;
        let mvp_buf = Self::create_mvp_buffer(device, mvp_capacity);
        Ok(Self {
            occluder_pipeline,
            occluder_bind_group_layout,
            mvp_buf,
            mvp_capacity,
            copy_kernel,
            downsample_kernel,
        })
    }

    fn create_mvp_buffer(device: &wgpu::Device, capacity: u64) -> wgpu::Buffer {
        device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("occluder_mvps"),
            size: capacity * 64,
            usage: wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        })
    }

    /// Encode occluder depth, copy to mip 0, then one downsample pass per level.
    pub fn encode(
        &mut self,
        encoder: &mut CommandEncoder,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        hiz: &HiZResources,
        view_proj: &Mat4,
        occluders: &[OccluderDraw],
    ) -> Result<(), CullError> {
        if occluders.is_empty() {
            log::debug!("hi-z: no occluders, pyramid stays at background depth");
        }
        let needed = occluders.len().max(1) as u64;
        if needed > self.mvp_capacity {
            self.mvp_capacity = needed.next_power_of_two();
            self.mvp_buf = Self::create_mvp_buffer(device, self.mvp_capacity);
        }
        let mvps: Vec<[f32; 16]> = occluders
            .iter()
            .map(|o| (*view_proj * Mat4::from_cols_array(&o.transform)).to_cols_array())
            .collect();
        if !mvps.is_empty() {
            queue.write_buffer(&self.mvp_buf, 0, bytemuck::cast_slice(&mvps));
        }
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("occluder_bind_group"),
            layout: &self.occluder_bind_group_layout,
            entries: &[wgpu::BindGroupEntry { binding: 0, resource: self.mvp_buf.as_entire_binding() }],
        });

        let depth_view = hiz.depth_view();
        {
            let mut rp = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("occluder_depth_pass"),
                color_attachments: &[],
                depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                    view: &depth_view,
                    depth_ops: Some(wgpu::Operations {
                        load: wgpu::LoadOp::Clear(1.0),
                        store: wgpu::StoreOp::Store,
                    }),
                    stencil_ops: None,
                }),
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            rp.set_pipeline(&self.occluder_pipeline);
            rp.set_viewport(0.0, 0.0, hiz.width() as f32, hiz.height() as f32, 0.0, 1.0);
            rp.set_bind_group(0, &bind_group, &[]);
            for (i, occluder) in occluders.iter().enumerate() {
                let i = i as u32;
                rp.set_vertex_buffer(0, occluder.vertex_buf.slice(..));
                rp.set_index_buffer(occluder.index_buf.slice(..), wgpu::IndexFormat::Uint32);
                rp.draw_indexed(0..occluder.index_count, 0, i..i + 1);
            }
        }

        let max_groups = device.limits().max_compute_workgroups_per_dimension;
        let mip0 = hiz.level_view(0);
        let copy_bg = self.copy_kernel.bind_group(
            device,
            &[
                ("params", hiz.level_params(0).binding()),
                ("depth", wgpu::BindingResource::TextureView(&depth_view)),
                ("dst", wgpu::BindingResource::TextureView(&mip0)),
            ],
        )?;
        {
            let mut cp = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("hiz_copy_pass"),
                timestamp_writes: None,
            });
            cp.set_pipeline(self.copy_kernel.pipeline());
            cp.set_bind_group(0, &copy_bg, &[]);
            self.copy_kernel.dispatch_linear(&mut cp, hiz.width() * hiz.height(), max_groups);
        }

        for level in 1..hiz.levels() {
            let src = hiz.level_view(level - 1);
            let dst = hiz.level_view(level);
            let bg = self.downsample_kernel.bind_group(
                device,
                &[
                    ("params", hiz.level_params(level).binding()),
                    ("src", wgpu::BindingResource::TextureView(&src)),
                    ("dst", wgpu::BindingResource::TextureView(&dst)),
                ],
            )?;
            let (w, h) = hiz.level_size(level);
            // One pass per level so each level's writes are visible to the next read.
            let mut cp = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
                label: Some("hiz_downsample_pass"),
                timestamp_writes: None,
            });
            cp.set_pipeline(self.downsample_kernel.pipeline());
            cp.set_bind_group(0, &bg, &[]);
            self.downsample_kernel.dispatch_linear(&mut cp, w * h, max_groups);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_count_matches_log2() {
        assert_eq!(level_count(1, 1), 1);
        assert_eq!(level_count(2, 1), 2);
        assert_eq!(level_count(256, 256), 9);
        assert_eq!(level_count(512, 256), 10);
        assert_eq!(level_count(640, 360), 10);
        assert_eq!(level_count(3, 7), 3);
    }

    #[test]
    fn level_size_clamps_to_one() {
        assert_eq!(level_size(512, 256, 0), (512, 256));
        assert_eq!(level_size(512, 256, 9), (1, 1));
        assert_eq!(level_size(640, 360, 8), (2, 1));
    }

    #[test]
    fn kernel_sources_declare_named_bindings() {
        let src = downsample_kernel_descriptor().assemble(64);
        assert!(src.contains("var src: texture_2d<f32>;"));
        assert!(src.contains("var dst: texture_storage_2d<r32float, write>;"));
        let src = copy_kernel_descriptor().assemble(64);
        assert!(src.contains("var depth: texture_2d<f32>;"));
    }
}
