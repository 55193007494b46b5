//! CPU side of the mesh registry: id/slot assignment and the GPU table contents.

use std::collections::{HashMap, HashSet};
use std::ops::Range;

use bytemuck::{Pod, Zeroable};
use cull_api::{Aabb, ExtractedGroupInstances, ExtractedRoomMesh, ExtractedScene, IndexRange};
use glam::{Mat4, Vec3, Vec4};

use crate::error::CullError;

/// Eight world-space corners plus `{index_count, command_slot, group_slot or -1, member}`.
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct BoundingVolume {
    pub corners: [[f32; 4]; 8],
    pub draw_data: [i32; 4],
}

impl BoundingVolume {
    pub fn new(corners: [Vec3; 8], draw_data: [i32; 4]) -> Self {
        let mut out = [[0.0; 4]; 8];
        for (dst, c) in out.iter_mut().zip(corners.iter()) {
            *dst = c.extend(1.0).to_array();
        }
        Self { corners: out, draw_data }
    }

    pub fn from_world_aabb(aabb: &Aabb, draw_data: [i32; 4]) -> Self {
        Self::new(aabb.corners().map(Vec3::from_array), draw_data)
    }

    /// Placeholder for meshes whose bounds have not arrived yet. All corners have w = 0,
    /// which the visibility test treats as straddling the near plane, so the mesh stays visible.
    pub fn unset(draw_data: [i32; 4]) -> Self {
        Self { corners: [[0.0; 4]; 8], draw_data }
    }

    pub fn corner(&self, i: usize) -> Vec4 {
        Vec4::from_array(self.corners[i])
    }
}

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct MeshMatrices {
    pub model: [f32; 16],
    pub inv_model: [f32; 16],
}

impl MeshMatrices {
    pub fn new(model: Mat4) -> Self {
        Self { model: model.to_cols_array(), inv_model: model.inverse().to_cols_array() }
    }
}

/// Same layout as `wgpu::util::DrawIndexedIndirectArgs`.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectDrawCommand {
    pub index_count: u32,
    pub instance_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
    pub first_instance: u32,
}

impl IndirectDrawCommand {
    pub fn new(indices: &IndexRange, instance_count: u32) -> Self {
        Self {
            index_count: indices.index_count,
            instance_count,
            first_index: indices.first_index,
            base_vertex: indices.base_vertex,
            first_instance: 0,
        }
    }
}

pub const BOUNDING_VOLUME_SIZE: u64 = std::mem::size_of::<BoundingVolume>() as u64;
pub const MESH_MATRICES_SIZE: u64 = std::mem::size_of::<MeshMatrices>() as u64;
pub const INDIRECT_COMMAND_SIZE: u64 = std::mem::size_of::<IndirectDrawCommand>() as u64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MeshKind {
    Static,
    Dynamic { actor: u64 },
    /// Member `member` of instance group index `group`.
    InstanceMember { group: u32, member: u32 },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MeshEntry {
    pub draw_id: u32,
    pub index_count: u32,
    pub command_slot: u32,
    pub kind: MeshKind,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupEntry {
    pub key: u32,
    pub index: u32,
    pub command_slot: u32,
    /// First element of the group's region in the stream and transform buffers.
    pub stream_offset: u32,
    pub members: u32,
}

/// Candidate draw ids for one frame: non-instanced first, then instanced.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CandidateList {
    pub ids: Vec<u32>,
    pub instance_id_offset: u32,
    /// Group indices with at least one candidate.
    pub visible_groups: Vec<u32>,
}

impl CandidateList {
    pub fn len(&self) -> u32 {
        self.ids.len() as u32
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// Contiguous run of actor volumes to upload with one write.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeRun {
    pub first_draw_id: u32,
    pub volumes: Vec<BoundingVolume>,
}

#[derive(Debug)]
pub struct RegistryLayout {
    entries: HashMap<u64, MeshEntry>,
    groups: Vec<GroupEntry>,
    group_index: HashMap<u32, u32>,
    actors: HashMap<u64, Range<u32>>,
    static_count: u32,
    dynamic_count: u32,
    max_instances: u32,
    cull_non_instanced: bool,
    pub matrices: Vec<MeshMatrices>,
    pub volumes: Vec<BoundingVolume>,
    pub commands: Vec<IndirectDrawCommand>,
}

fn model_matrix(mesh: &ExtractedRoomMesh) -> Mat4 {
    let world = Mat4::from_cols_array(&mesh.transform);
    if mesh.billboard {
        Mat4::from_translation(world.w_axis.truncate())
    } else {
        world
    }
}

/// World corners of a static mesh. Billboards rotate freely about their origin, so their
/// box is widened to the sphere through the farthest local corner.
fn world_corners(mesh: &ExtractedRoomMesh, model: &Mat4) -> [Vec3; 8] {
    if mesh.billboard {
        let r = mesh
            .local_bounds
            .corners()
            .iter()
            .map(|c| Vec3::from_array(*c).length())
            .fold(0.0f32, f32::max);
        let center = model.w_axis.truncate();
        let bounds = Aabb::new((center - Vec3::splat(r)).to_array(), (center + Vec3::splat(r)).to_array());
        bounds.corners().map(Vec3::from_array)
    } else {
        mesh.local_bounds.corners().map(|c| model.transform_point3(Vec3::from_array(c)))
    }
}

impl RegistryLayout {
    /// Assign ids in fixed order: room meshes, actor meshes, then one command per instance group.
    pub fn build(
        scene: &ExtractedScene,
        max_draws: u32,
        max_instances: u32,
        cull_non_instanced: bool,
    ) -> Result<Self, CullError> {
        let mut group_index = HashMap::new();
        let mut groups = Vec::with_capacity(scene.instance_groups.len());
        for (i, g) in scene.instance_groups.iter().enumerate() {
            if group_index.insert(g.group_key, i as u32).is_some() {
                return Err(CullError::DuplicateGroup(g.group_key));
            }
            groups.push(GroupEntry {
                key: g.group_key,
                index: i as u32,
                command_slot: 0,
                stream_offset: i as u32 * max_instances,
                members: 0,
            });
        }

        let room_meshes: Vec<&ExtractedRoomMesh> = scene
            .rooms
            .iter()
            .flat_map(|r| r.meshes.iter())
            .filter(|m| cull_non_instanced || m.instance_group.is_some())
            .collect();
        let actor_mesh_count: usize = if cull_non_instanced {
            scene.actors.iter().map(|a| a.meshes.len()).sum()
        } else {
            0
        };
        let draw_count = room_meshes.len() + actor_mesh_count;
        if draw_count > max_draws as usize {
            return Err(CullError::CapacityExceeded { requested: draw_count as u32, capacity: max_draws });
        }
        let first_group_slot = draw_count as u32;
        for g in groups.iter_mut() {
            g.command_slot = first_group_slot + g.index;
        }

        let mut entries = HashMap::with_capacity(draw_count);
        let mut matrices = Vec::with_capacity(room_meshes.len());
        let mut volumes = Vec::with_capacity(draw_count);
        let mut commands = Vec::with_capacity(draw_count + groups.len());

        for mesh in &room_meshes {
            let draw_id = volumes.len() as u32;
            let (kind, group_slot, member) = match mesh.instance_group {
                Some(key) => {
                    let gi = *group_index
                        .get(&key)
                        .ok_or(CullError::UnknownGroup { mesh: mesh.mesh_key, group: key })?;
                    let group = &mut groups[gi as usize];
                    let member = group.members;
                    group.members += 1;
                    if group.members > max_instances {
                        return Err(CullError::GroupTooLarge { group: key, members: group.members, max: max_instances });
                    }
                    (MeshKind::InstanceMember { group: gi, member }, group.command_slot as i32, member as i32)
                }
                None => (MeshKind::Static, -1, 0),
            };
            let entry = MeshEntry { draw_id, index_count: mesh.indices.index_count, command_slot: draw_id, kind };
            if entries.insert(mesh.mesh_key, entry).is_some() {
                return Err(CullError::DuplicateMesh(mesh.mesh_key));
            }
            let model = model_matrix(mesh);
            matrices.push(MeshMatrices::new(model));
            volumes.push(BoundingVolume::new(
                world_corners(mesh, &model),
                [mesh.indices.index_count as i32, draw_id as i32, group_slot, member],
            ));
            // Members are drawn through their group's command only.
            let instances = if matches!(kind, MeshKind::InstanceMember { .. }) { 0 } else { 1 };
            commands.push(IndirectDrawCommand::new(&mesh.indices, instances));
        }
        let static_count = volumes.len() as u32;

        let mut actors = HashMap::new();
        if cull_non_instanced {
            for actor in &scene.actors {
                let first = volumes.len() as u32;
                for mesh in &actor.meshes {
                    let draw_id = volumes.len() as u32;
                    let entry = MeshEntry {
                        draw_id,
                        index_count: mesh.indices.index_count,
                        command_slot: draw_id,
                        kind: MeshKind::Dynamic { actor: actor.actor_key },
                    };
                    if entries.insert(mesh.mesh_key, entry).is_some() {
                        return Err(CullError::DuplicateMesh(mesh.mesh_key));
                    }
                    volumes.push(BoundingVolume::unset(dynamic_draw_data(&entry)));
                    commands.push(IndirectDrawCommand::new(&mesh.indices, 1));
                }
                actors.insert(actor.actor_key, first..volumes.len() as u32);
            }
        }
        let dynamic_count = volumes.len() as u32 - static_count;

        for g in &scene.instance_groups {
            commands.push(IndirectDrawCommand::new(&g.indices, 0));
        }

        Ok(Self {
            entries,
            groups,
            group_index,
            actors,
            static_count,
            dynamic_count,
            max_instances,
            cull_non_instanced,
            matrices,
            volumes,
            commands,
        })
    }

    pub fn static_count(&self) -> u32 {
        self.static_count
    }

    pub fn dynamic_count(&self) -> u32 {
        self.dynamic_count
    }

    pub fn draw_count(&self) -> u32 {
        self.static_count + self.dynamic_count
    }

    pub fn group_count(&self) -> u32 {
        self.groups.len() as u32
    }

    pub fn command_count(&self) -> u32 {
        self.draw_count() + self.group_count()
    }

    /// Slot of the first instance-group command.
    pub fn first_group_slot(&self) -> u32 {
        self.draw_count()
    }

    pub fn max_instances(&self) -> u32 {
        self.max_instances
    }

    pub fn entry(&self, mesh_key: u64) -> Option<&MeshEntry> {
        self.entries.get(&mesh_key)
    }

    pub fn groups(&self) -> &[GroupEntry] {
        &self.groups
    }

    pub fn group(&self, group_key: u32) -> Option<&GroupEntry> {
        self.group_index.get(&group_key).map(|i| &self.groups[*i as usize])
    }

    pub fn actor_draw_ids(&self, actor_key: u64) -> Option<Range<u32>> {
        self.actors.get(&actor_key).cloned()
    }

    /// Volumes for moved actors, merged into runs of consecutive draw ids.
    /// Every mesh of an actor takes the actor's world bounds. Actors are untracked (and
    /// moves ignored) when only instanced groups are culled.
    pub fn dynamic_volume_runs(&self, moved: &[(u64, Aabb)]) -> Result<Vec<VolumeRun>, CullError> {
        if !self.cull_non_instanced {
            return Ok(Vec::new());
        }
        let mut updates: Vec<(Range<u32>, Aabb)> = Vec::with_capacity(moved.len());
        for (actor, aabb) in moved {
            let ids = self.actors.get(actor).cloned().ok_or(CullError::UnknownActor(*actor))?;
            updates.push((ids, *aabb));
        }
        updates.sort_by_key(|(ids, _)| ids.start);
        // Later entries for the same actor win.
        updates.dedup_by(|later, earlier| {
            if later.0 == earlier.0 {
                earlier.1 = later.1;
                true
            } else {
                false
            }
        });

        let mut runs: Vec<VolumeRun> = Vec::new();
        for (ids, aabb) in updates {
            if ids.is_empty() {
                continue;
            }
            let volumes = ids.clone().map(|id| {
                let draw_data = self.volumes[id as usize].draw_data;
                BoundingVolume::from_world_aabb(&aabb, draw_data)
            });
            match runs.last_mut() {
                Some(run) if run.first_draw_id + run.volumes.len() as u32 == ids.start => {
                    run.volumes.extend(volumes);
                }
                _ => {
                    let volumes = volumes.collect();
                    runs.push(VolumeRun { first_draw_id: ids.start, volumes });
                }
            }
        }
        Ok(runs)
    }

    /// Resolve the frustum-cull output into candidate ids. Duplicate keys are dropped.
    /// With `cull_non_instanced` off, `visible_meshes` is ignored.
    pub fn candidates(
        &self,
        visible_meshes: &[u64],
        visible_instances: &[ExtractedGroupInstances],
    ) -> Result<CandidateList, CullError> {
        let mut seen = HashSet::new();
        let mut ids = Vec::with_capacity(visible_meshes.len());
        if self.cull_non_instanced {
            for key in visible_meshes {
                let entry = self.entries.get(key).ok_or(CullError::UnknownMesh(*key))?;
                if matches!(entry.kind, MeshKind::InstanceMember { .. }) {
                    return Err(CullError::UnknownMesh(*key));
                }
                if seen.insert(entry.draw_id) {
                    ids.push(entry.draw_id);
                }
            }
        }
        let instance_id_offset = ids.len() as u32;
        let mut visible_groups = Vec::new();
        for group in visible_instances {
            let gi = *self
                .group_index
                .get(&group.group_key)
                .ok_or(CullError::UnknownGroup { mesh: 0, group: group.group_key })?;
            let before = ids.len();
            for key in &group.mesh_keys {
                let entry = self.entries.get(key).ok_or(CullError::UnknownMesh(*key))?;
                match entry.kind {
                    MeshKind::InstanceMember { group, .. } if group == gi => {}
                    _ => return Err(CullError::UnknownMesh(*key)),
                }
                if seen.insert(entry.draw_id) {
                    ids.push(entry.draw_id);
                }
            }
            if ids.len() > before && !visible_groups.contains(&gi) {
                visible_groups.push(gi);
            }
        }
        Ok(CandidateList { ids, instance_id_offset, visible_groups })
    }
}

fn dynamic_draw_data(entry: &MeshEntry) -> [i32; 4] {
    [entry.index_count as i32, entry.command_slot as i32, -1, 0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use cull_api::{ExtractedActor, ExtractedActorMesh, ExtractedInstanceGroup, ExtractedRoom};

    fn identity() -> [f32; 16] {
        Mat4::IDENTITY.to_cols_array()
    }

    fn room_mesh(key: u64, group: Option<u32>) -> ExtractedRoomMesh {
        ExtractedRoomMesh {
            mesh_key: key,
            indices: IndexRange { index_count: 36, first_index: key as u32 * 36, base_vertex: 0 },
            transform: Mat4::from_translation(Vec3::new(key as f32, 0.0, 0.0)).to_cols_array(),
            local_bounds: Aabb::new([-1.0; 3], [1.0; 3]),
            billboard: false,
            instance_group: group,
        }
    }

    fn scene() -> ExtractedScene {
        ExtractedScene {
            rooms: vec![
                ExtractedRoom { meshes: vec![room_mesh(10, None), room_mesh(11, Some(7))] },
                ExtractedRoom { meshes: vec![room_mesh(12, Some(7)), room_mesh(13, None)] },
            ],
            actors: vec![ExtractedActor {
                actor_key: 100,
                meshes: vec![
                    ExtractedActorMesh { mesh_key: 101, indices: IndexRange { index_count: 6, ..Default::default() } },
                    ExtractedActorMesh { mesh_key: 102, indices: IndexRange { index_count: 9, ..Default::default() } },
                ],
            }],
            instance_groups: vec![ExtractedInstanceGroup {
                group_key: 7,
                indices: IndexRange { index_count: 12, first_index: 3, base_vertex: 1 },
            }],
            occluders: vec![],
        }
    }

    #[test]
    fn ids_follow_rooms_then_actors_then_groups() {
        let l = RegistryLayout::build(&scene(), 64, 128, true).unwrap();
        assert_eq!(l.static_count(), 4);
        assert_eq!(l.dynamic_count(), 2);
        assert_eq!(l.command_count(), 7);
        assert_eq!(l.entry(10).unwrap().draw_id, 0);
        assert_eq!(l.entry(13).unwrap().draw_id, 3);
        assert_eq!(l.entry(102).unwrap().draw_id, 5);
        let g = l.group(7).unwrap();
        assert_eq!(g.command_slot, 6);
        assert_eq!(g.members, 2);
        assert_eq!(l.commands[6], IndirectDrawCommand { index_count: 12, instance_count: 0, first_index: 3, base_vertex: 1, first_instance: 0 });
        assert_eq!(l.volumes.len(), 6);
        assert_eq!(l.matrices.len(), 4);
    }

    #[test]
    fn member_draw_data_points_at_group() {
        let l = RegistryLayout::build(&scene(), 64, 128, true).unwrap();
        assert_eq!(l.volumes[1].draw_data, [36, 1, 6, 0]);
        assert_eq!(l.volumes[2].draw_data, [36, 2, 6, 1]);
        assert_eq!(l.volumes[0].draw_data, [36, 0, -1, 0]);
        assert_eq!(l.commands[1].instance_count, 0);
        assert_eq!(l.commands[0].instance_count, 1);
        assert_eq!(l.entry(12).unwrap().kind, MeshKind::InstanceMember { group: 0, member: 1 });
    }

    #[test]
    fn static_corners_are_world_space() {
        let l = RegistryLayout::build(&scene(), 64, 128, true).unwrap();
        // mesh 13 translated by +13 on x
        assert_eq!(l.volumes[3].corners[0], [12.0, -1.0, -1.0, 1.0]);
        assert_eq!(l.volumes[3].corners[7], [14.0, 1.0, 1.0, 1.0]);
        // actor volumes start unset
        assert_eq!(l.volumes[4].corners[0][3], 0.0);
    }

    #[test]
    fn billboard_keeps_translation_only() {
        let mut mesh = room_mesh(1, None);
        mesh.billboard = true;
        mesh.transform = (Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)) * Mat4::from_scale(Vec3::splat(3.0))).to_cols_array();
        let s = ExtractedScene { rooms: vec![ExtractedRoom { meshes: vec![mesh] }], ..Default::default() };
        let l = RegistryLayout::build(&s, 8, 128, true).unwrap();
        let m = Mat4::from_cols_array(&l.matrices[0].model);
        assert_eq!(m, Mat4::from_translation(Vec3::new(5.0, 0.0, 0.0)));
        let r = 3.0f32.sqrt();
        assert!((l.volumes[0].corners[7][0] - (5.0 + r)).abs() < 1e-5);
    }

    #[test]
    fn non_instanced_disabled_keeps_members_only() {
        let l = RegistryLayout::build(&scene(), 64, 128, false).unwrap();
        assert_eq!(l.draw_count(), 2);
        assert_eq!(l.entry(10), None);
        assert_eq!(l.entry(101), None);
        assert_eq!(l.entry(11).unwrap().draw_id, 0);
        assert_eq!(l.group(7).unwrap().command_slot, 2);
        let c = l.candidates(&[10], &[ExtractedGroupInstances { group_key: 7, mesh_keys: vec![12] }]).unwrap();
        assert_eq!(c.ids, vec![1]);
        assert_eq!(c.instance_id_offset, 0);
        let a = Aabb::new([0.0; 3], [1.0; 3]);
        assert!(l.dynamic_volume_runs(&[(100, a)]).unwrap().is_empty());
    }

    #[test]
    fn capacity_and_group_limits() {
        assert!(matches!(
            RegistryLayout::build(&scene(), 5, 128, true),
            Err(CullError::CapacityExceeded { requested: 6, capacity: 5 })
        ));
        assert!(matches!(
            RegistryLayout::build(&scene(), 64, 1, true),
            Err(CullError::GroupTooLarge { group: 7, members: 2, max: 1 })
        ));
        let mut s = scene();
        s.rooms[0].meshes.push(room_mesh(10, None));
        assert!(matches!(RegistryLayout::build(&s, 64, 128, true), Err(CullError::DuplicateMesh(10))));
        let mut s = scene();
        s.rooms[0].meshes.push(room_mesh(50, Some(99)));
        assert!(matches!(RegistryLayout::build(&s, 64, 128, true), Err(CullError::UnknownGroup { mesh: 50, group: 99 })));
    }

    #[test]
    fn duplicate_group_key_is_rejected() {
        let mut s = scene();
        s.instance_groups.push(ExtractedInstanceGroup {
            group_key: 7,
            indices: IndexRange { index_count: 6, first_index: 0, base_vertex: 0 },
        });
        assert!(matches!(RegistryLayout::build(&s, 64, 128, true), Err(CullError::DuplicateGroup(7))));
        assert_eq!(CullError::DuplicateGroup(7).to_string(), "instance group 7 is registered twice");
    }

    #[test]
    fn ids_are_stable_across_builds() {
        let a = RegistryLayout::build(&scene(), 64, 128, true).unwrap();
        let b = RegistryLayout::build(&scene(), 64, 128, true).unwrap();
        for key in [10, 11, 12, 13, 101, 102] {
            assert_eq!(a.entry(key), b.entry(key));
        }
        assert_eq!(a.commands, b.commands);
    }

    #[test]
    fn candidates_split_non_instanced_and_instanced() {
        let l = RegistryLayout::build(&scene(), 64, 128, true).unwrap();
        let c = l
            .candidates(&[13, 101, 13], &[ExtractedGroupInstances { group_key: 7, mesh_keys: vec![12, 11] }])
            .unwrap();
        assert_eq!(c.ids, vec![3, 4, 2, 1]);
        assert_eq!(c.instance_id_offset, 2);
        assert_eq!(c.visible_groups, vec![0]);
        assert!(matches!(l.candidates(&[999], &[]), Err(CullError::UnknownMesh(999))));
        assert!(l.candidates(&[11], &[]).is_err());
        let empty = l.candidates(&[], &[ExtractedGroupInstances { group_key: 7, mesh_keys: vec![] }]).unwrap();
        assert!(empty.is_empty());
        assert!(empty.visible_groups.is_empty());
    }

    #[test]
    fn moved_actors_coalesce_into_runs() {
        let mut s = scene();
        s.actors.push(ExtractedActor {
            actor_key: 200,
            meshes: vec![ExtractedActorMesh { mesh_key: 201, indices: IndexRange::default() }],
        });
        s.actors.push(ExtractedActor {
            actor_key: 300,
            meshes: vec![ExtractedActorMesh { mesh_key: 301, indices: IndexRange::default() }],
        });
        let l = RegistryLayout::build(&s, 64, 128, true).unwrap();
        assert_eq!(l.actor_draw_ids(100), Some(4..6));
        assert_eq!(l.actor_draw_ids(300), Some(7..8));
        assert_eq!(l.actor_draw_ids(1), None);
        let a = Aabb::new([0.0; 3], [1.0; 3]);
        let b = Aabb::new([2.0; 3], [3.0; 3]);
        let runs = l.dynamic_volume_runs(&[(200, b), (100, a)]).unwrap();
        assert_eq!(runs.len(), 1);
        assert_eq!(runs[0].first_draw_id, 4);
        assert_eq!(runs[0].volumes.len(), 3);
        assert_eq!(runs[0].volumes[2].corners[0], [2.0, 2.0, 2.0, 1.0]);
        assert_eq!(runs[0].volumes[1].draw_data, [9, 5, -1, 0]);

        let split = l.dynamic_volume_runs(&[(100, a), (300, b)]).unwrap();
        assert_eq!(split.len(), 2);
        assert_eq!(split[1].first_draw_id, 7);
        assert!(matches!(l.dynamic_volume_runs(&[(5, a)]), Err(CullError::UnknownActor(5))));
    }

    #[test]
    fn identity_transform_helper() {
        let mut mesh = room_mesh(0, None);
        mesh.transform = identity();
        assert_eq!(model_matrix(&mesh), Mat4::IDENTITY);
    }
}
