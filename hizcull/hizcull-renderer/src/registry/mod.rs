//! Mesh registry: GPU-resident draw tables (matrices, bounding volumes, indirect commands, candidate ids).

mod layout;

pub use layout::{
    BoundingVolume, CandidateList, GroupEntry, IndirectDrawCommand, MeshEntry, MeshKind, MeshMatrices,
    RegistryLayout, VolumeRun, BOUNDING_VOLUME_SIZE, INDIRECT_COMMAND_SIZE, MESH_MATRICES_SIZE,
};

use cull_api::{Aabb, ExtractedScene};

use crate::buffer::{align_up, create_buffer, BufferRegion};
use crate::config::CullConfig;
use crate::error::CullError;

pub struct MeshRegistry {
    layout: RegistryLayout,
    matrices: BufferRegion,
    volumes: BufferRegion,
    indirect: BufferRegion,
    candidate_ids: BufferRegion,
}

impl MeshRegistry {
    /// Assign draw ids and upload the static tables. Actor volumes are filled by `refresh_dynamic_bounds`.
    pub fn build(
        device: &wgpu::Device,
        queue: &wgpu::Queue,
        scene: &ExtractedScene,
        config: &CullConfig,
    ) -> Result<Self, CullError> {
        let layout = RegistryLayout::build(
            scene,
            config.max_draws,
            config.max_instances_per_group,
            config.cull_non_instanced,
        )?;

        let alignment = device.limits().min_storage_buffer_offset_alignment as u64;
        let matrices_size = layout.static_count().max(1) as u64 * MESH_MATRICES_SIZE;
        let volumes_offset = align_up(matrices_size, alignment);
        let volumes_size = layout.draw_count().max(1) as u64 * BOUNDING_VOLUME_SIZE;
        let mesh_buffer = create_buffer(
            device,
            "hizcull_mesh_buffer",
            volumes_offset + volumes_size,
            wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
        );
        let matrices = BufferRegion::new(mesh_buffer.clone(), 0, matrices_size);
        let volumes = BufferRegion::new(mesh_buffer, volumes_offset, volumes_size);

        let indirect_size = layout.command_count().max(1) as u64 * INDIRECT_COMMAND_SIZE;
        let indirect = BufferRegion::new(
            create_buffer(
                device,
                "hizcull_indirect_draw_buffer",
                indirect_size,
                wgpu::BufferUsages::STORAGE
                    | wgpu::BufferUsages::INDIRECT
                    | wgpu::BufferUsages::COPY_DST
                    | wgpu::BufferUsages::COPY_SRC,
            ),
            0,
            indirect_size,
        );
        let ids_size = layout.draw_count().max(1) as u64 * 4;
        let candidate_ids = BufferRegion::new(
            create_buffer(
                device,
                "hizcull_candidate_ids",
                ids_size,
                wgpu::BufferUsages::STORAGE | wgpu::BufferUsages::COPY_DST,
            ),
            0,
            ids_size,
        );

        if !layout.matrices.is_empty() {
            matrices.write(queue, 0, bytemuck::cast_slice(&layout.matrices));
        }
        if !layout.volumes.is_empty() {
            volumes.write(queue, 0, bytemuck::cast_slice(&layout.volumes));
        }
        if !layout.commands.is_empty() {
            indirect.write(queue, 0, bytemuck::cast_slice(&layout.commands));
        }

        log::info!(
            "hizcull registry: {} static, {} dynamic, {} instance groups ({} command slots)",
            layout.static_count(),
            layout.dynamic_count(),
            layout.group_count(),
            layout.command_count()
        );
        Ok(Self { layout, matrices, volumes, indirect, candidate_ids })
    }

    pub fn layout(&self) -> &RegistryLayout {
        &self.layout
    }

    pub fn matrices(&self) -> &BufferRegion {
        &self.matrices
    }

    pub fn volumes(&self) -> &BufferRegion {
        &self.volumes
    }

    pub fn indirect(&self) -> &BufferRegion {
        &self.indirect
    }

    pub fn candidate_ids(&self) -> &BufferRegion {
        &self.candidate_ids
    }

    /// Rewrite the bounding volumes of moved actors. Returns the number of buffer writes issued.
    pub fn refresh_dynamic_bounds(&self, queue: &wgpu::Queue, moved: &[(u64, Aabb)]) -> Result<usize, CullError> {
        let runs = self.layout.dynamic_volume_runs(moved)?;
        for run in &runs {
            self.volumes.write(
                queue,
                run.first_draw_id as u64 * BOUNDING_VOLUME_SIZE,
                bytemuck::cast_slice(&run.volumes),
            );
        }
        Ok(runs.len())
    }

    /// Zero `instance_count` of every instance-group command.
    pub fn reset_group_commands(&self, queue: &wgpu::Queue) {
        let first = self.layout.first_group_slot() as usize;
        let group_commands = &self.layout.commands[first..];
        if !group_commands.is_empty() {
            self.indirect
                .write(queue, first as u64 * INDIRECT_COMMAND_SIZE, bytemuck::cast_slice(group_commands));
        }
    }

    pub fn upload_candidates(&self, queue: &wgpu::Queue, candidates: &CandidateList) {
        if !candidates.ids.is_empty() {
            self.candidate_ids.write(queue, 0, bytemuck::cast_slice(&candidates.ids));
        }
    }

    /// Byte offset of a command slot in the indirect buffer.
    pub fn command_offset(&self, slot: u32) -> u64 {
        self.indirect.offset + slot as u64 * INDIRECT_COMMAND_SIZE
    }
}
