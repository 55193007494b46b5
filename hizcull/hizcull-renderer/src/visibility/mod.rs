//! Visibility tester: projects candidate bounding volumes against the Hi-Z pyramid and
//! writes `instance_count` of their indirect commands (or, for instanced groups, the stream).

pub mod reference;

use bytemuck::{Pod, Zeroable};
use wgpu::CommandEncoder;

use crate::buffer::BufferRegion;
use crate::error::CullError;
use crate::shader::{BindingDecl, BindingKind, Kernel, KernelDescriptor, ShaderConstant, ShaderService};

const OCCLUSION_CULL_SHADER: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/occlusion_cull.wgsl"));

const CULL_BINDINGS: &[BindingDecl] = &[
    BindingDecl::buffer("params", BindingKind::Uniform, "CullParams"),
    BindingDecl::buffer("candidate_ids", BindingKind::StorageRead, "array<u32>"),
    BindingDecl::buffer("volumes", BindingKind::StorageRead, "array<BoundingVolume>"),
    BindingDecl::buffer("matrices", BindingKind::StorageRead, "array<MeshMatrices>"),
    BindingDecl::buffer("commands", BindingKind::StorageReadWrite, "array<DrawCommand>"),
    BindingDecl::buffer("stream", BindingKind::StorageReadWrite, "array<InstanceStreamEntry>"),
    BindingDecl::buffer("draw_counter", BindingKind::StorageReadWrite, "DrawCounter"),
    BindingDecl::texture("hiz", BindingKind::Texture2dUnfilterable),
];

/// Per-frame uniform of the cull kernel.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct CullParams {
    pub view_proj: [f32; 16],
    pub hiz_size: [f32; 2],
    pub level_count: u32,
    pub id_count: u32,
    /// Index of the first instanced candidate in `candidate_ids`.
    pub instance_id_offset: u32,
    pub first_group_slot: u32,
    pub frame: u32,
    pub max_instances: u32,
}

pub fn kernel_descriptor(draw_counter_enabled: bool) -> KernelDescriptor {
    KernelDescriptor {
        name: "occlusion_cull",
        source: OCCLUSION_CULL_SHADER,
        entry_point: "main",
        defines: vec![("DRAW_COUNTER_ENABLED", ShaderConstant::Bool(draw_counter_enabled))],
        bindings: CULL_BINDINGS,
    }
}

/// Buffers and views the cull kernel reads and writes.
pub struct CullInputs<'a> {
    pub candidate_ids: &'a BufferRegion,
    pub volumes: &'a BufferRegion,
    pub matrices: &'a BufferRegion,
    pub commands: &'a BufferRegion,
    pub stream: &'a BufferRegion,
    pub draw_counter: &'a BufferRegion,
    pub hiz: &'a wgpu::TextureView,
}

pub struct VisibilityTester {
    kernel: Kernel,
    params_buf: wgpu::Buffer,
    draw_counter_enabled: bool,
}

impl VisibilityTester {
    pub fn new(
        device: &wgpu::Device,
        shaders: &dyn ShaderService,
        workgroup_size: u32,
        draw_counter_enabled: bool,
    ) -> Result<Self, CullError> {
        let kernel = shaders.compile_kernel(device, &kernel_descriptor(draw_counter_enabled), workgroup_size)?;
        let params_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("occlusion_cull_params"),
            size: std::mem::size_of::<CullParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        Ok(Self { kernel, params_buf, draw_counter_enabled })
    }

    pub fn workgroup_size(&self) -> u32 {
        self.kernel.workgroup_size()
    }

    /// Rebuild the kernel with another workgroup size.
    pub fn recompile(
        &mut self,
        device: &wgpu::Device,
        shaders: &dyn ShaderService,
        workgroup_size: u32,
    ) -> Result<(), CullError> {
        self.kernel =
            shaders.compile_kernel(device, &kernel_descriptor(self.draw_counter_enabled), workgroup_size)?;
        Ok(())
    }

    /// Encode one dispatch over `params.id_count` candidates. Nothing is dispatched for an empty list.
    pub fn encode(
        &self,
        encoder: &mut CommandEncoder,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        params: &CullParams,
        inputs: &CullInputs<'_>,
    ) -> Result<(), CullError> {
        queue.write_buffer(&self.params_buf, 0, bytemuck::bytes_of(params));
        if params.id_count == 0 {
            return Ok(());
        }
        let bind_group = self.kernel.bind_group(
            device,
            &[
                ("params", self.params_buf.as_entire_binding()),
                ("candidate_ids", inputs.candidate_ids.binding()),
                ("volumes", inputs.volumes.binding()),
                ("matrices", inputs.matrices.binding()),
                ("commands", inputs.commands.binding()),
                ("stream", inputs.stream.binding()),
                ("draw_counter", inputs.draw_counter.binding()),
                ("hiz", wgpu::BindingResource::TextureView(inputs.hiz)),
            ],
        )?;
        let mut cp = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("occlusion_cull_pass"),
            timestamp_writes: None,
        });
        cp.set_pipeline(self.kernel.pipeline());
        cp.set_bind_group(0, &bind_group, &[]);
        self.kernel
            .dispatch_linear(&mut cp, params.id_count, device.limits().max_compute_workgroups_per_dimension);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cull_params_match_wgsl_layout() {
        assert_eq!(std::mem::size_of::<CullParams>(), 96);
    }

    #[test]
    fn counter_define_follows_config() {
        assert!(kernel_descriptor(true).assemble(64).contains("const DRAW_COUNTER_ENABLED: bool = true;"));
        assert!(kernel_descriptor(false).assemble(64).contains("const DRAW_COUNTER_ENABLED: bool = false;"));
    }
}
