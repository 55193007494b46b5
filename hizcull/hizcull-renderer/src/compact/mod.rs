//! Instance stream compaction: packs this frame's visible instances of each group
//! into `[0, k)` of the group's region in the transform buffer.

use bytemuck::{Pod, Zeroable};
use wgpu::CommandEncoder;

use crate::buffer::{create_buffer, BufferRegion};
use crate::error::CullError;
use crate::shader::{BindingDecl, BindingKind, Kernel, KernelDescriptor, ShaderService};

const STREAM_COMPACT_SHADER: &str =
    include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/shaders/stream_compact.wgsl"));

const COMPACT_BINDINGS: &[BindingDecl] = &[
    BindingDecl::buffer("params", BindingKind::Uniform, "CompactParams"),
    BindingDecl::buffer("visible_groups", BindingKind::StorageRead, "array<u32>"),
    BindingDecl::buffer("stream", BindingKind::StorageRead, "array<InstanceStreamEntry>"),
    BindingDecl::buffer("transforms", BindingKind::StorageReadWrite, "array<InstanceData>"),
];

/// Element of the compacted transform buffer consumed by instanced draws.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceData {
    pub model: [f32; 16],
    pub inv_model: [f32; 16],
}

/// Raw per-frame output of the visibility test. `frame` rejects entries written in earlier frames.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct InstanceStreamEntry {
    pub model: [f32; 16],
    pub inv_model: [f32; 16],
    pub frame: u32,
    pub draw_id: u32,
    pub _pad: [u32; 2],
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct CompactParams {
    pub frame: u32,
    pub max_instances: u32,
    pub group_count: u32,
    pub _pad: u32,
}

pub const INSTANCE_DATA_SIZE: u64 = std::mem::size_of::<InstanceData>() as u64;
pub const STREAM_ENTRY_SIZE: u64 = std::mem::size_of::<InstanceStreamEntry>() as u64;

/// Next frame tag. Zero is skipped so never-written (zeroed) stream slots cannot match.
pub fn next_frame(frame: u32) -> u32 {
    frame.wrapping_add(1).max(1)
}

pub fn kernel_descriptor() -> KernelDescriptor {
    KernelDescriptor {
        name: "stream_compact",
        source: STREAM_COMPACT_SHADER,
        entry_point: "main",
        defines: Vec::new(),
        bindings: COMPACT_BINDINGS,
    }
}

/// Stream and compacted transform buffers. Group `g` owns `[g * max_instances, (g + 1) * max_instances)` of both.
pub struct InstanceBuffers {
    pub stream: BufferRegion,
    pub transforms: BufferRegion,
    max_instances: u32,
    group_count: u32,
}

impl InstanceBuffers {
    pub fn new(device: &wgpu::Device, group_count: u32, max_instances: u32) -> Self {
        let slots = group_count.max(1) as u64 * max_instances as u64;
        let stream = BufferRegion::whole(create_buffer(
            device,
            "hizcull_instance_stream",
            slots * STREAM_ENTRY_SIZE,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_SRC,
        ));
        let transforms = BufferRegion::whole(create_buffer(
            device,
            "hizcull_instance_transforms",
            slots * INSTANCE_DATA_SIZE,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_SRC,
        ));
        Self { stream, transforms, max_instances, group_count }
    }

    pub fn group_count(&self) -> u32 {
        self.group_count
    }

    /// Byte offset of group `group`'s first compacted instance.
    pub fn base_offset(&self, group: u32) -> u64 {
        group as u64 * self.max_instances as u64 * INSTANCE_DATA_SIZE
    }

    /// Compacted transforms of one group (capacity `max_instances`).
    pub fn group_transforms(&self, group: u32) -> BufferRegion {
        self.transforms.sub(self.base_offset(group), self.max_instances as u64 * INSTANCE_DATA_SIZE)
    }
}

pub struct StreamCompactor {
    kernel: Kernel,
    params_buf: wgpu::Buffer,
    group_list: BufferRegion,
    max_instances: u32,
}

impl StreamCompactor {
    /// Workgroup size is `max_instances`: one invocation per stream slot of a group.
    pub fn new(
        device: &wgpu::Device,
        shaders: &dyn ShaderService,
        max_instances: u32,
        group_count: u32,
    ) -> Result<Self, CullError> {
        let kernel = shaders.compile_kernel(device, &kernel_descriptor(), max_instances)?;
        let params_buf = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("stream_compact_params"),
            size: std::mem::size_of::<CompactParams>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });
        let group_list = BufferRegion::whole(create_buffer(
            device,
            "stream_compact_groups",
            group_count.max(1) as u64 * 4,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        ));
        Ok(Self { kernel, params_buf, group_list, max_instances })
    }

    /// One workgroup per entry of `visible_groups`. Does nothing when the list is empty.
    pub fn encode(
        &self,
        encoder: &mut CommandEncoder,
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        buffers: &InstanceBuffers,
        visible_groups: &[u32],
        frame: u32,
    ) -> Result<(), CullError> {
        if visible_groups.is_empty() {
            return Ok(());
        }
        let params = CompactParams {
            frame,
            max_instances: self.max_instances,
            group_count: visible_groups.len() as u32,
            _pad: 0,
        };
        queue.write_buffer(&self.params_buf, 0, bytemuck::bytes_of(&params));
        self.group_list.write(queue, 0, bytemuck::cast_slice(visible_groups));
        let bind_group = self.kernel.bind_group(
            device,
            &[
                ("params", self.params_buf.as_entire_binding()),
                ("visible_groups", self.group_list.binding()),
                ("stream", buffers.stream.binding()),
                ("transforms", buffers.transforms.binding()),
            ],
        )?;
        let (x, y) = crate::shader::split_groups(
            visible_groups.len() as u32,
            device.limits().max_compute_workgroups_per_dimension,
        );
        let mut cp = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("stream_compact_pass"),
            timestamp_writes: None,
        });
        cp.set_pipeline(self.kernel.pipeline());
        cp.set_bind_group(0, &bind_group, &[]);
        cp.dispatch_workgroups(x, y, 1);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gpu_layouts() {
        assert_eq!(INSTANCE_DATA_SIZE, 128);
        assert_eq!(STREAM_ENTRY_SIZE, 144);
        assert_eq!(std::mem::size_of::<CompactParams>(), 16);
    }

    #[test]
    fn frame_tag_never_zero() {
        assert_eq!(next_frame(0), 1);
        assert_eq!(next_frame(41), 42);
        assert_eq!(next_frame(u32::MAX), 1);
    }
}
