//! Data types for extraction from the host engine into the culling world.
//! The host fills `ExtractedScene` once at scene load and `ExtractedFrame`/`ExtractedView` every frame.

/// Axis-aligned bounding box, world or model space depending on context.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Aabb {
    pub min: [f32; 3],
    pub max: [f32; 3],
}

impl Aabb {
    pub fn new(min: [f32; 3], max: [f32; 3]) -> Self {
        Self { min, max }
    }

    /// The eight corners, ordered by bit pattern (bit 0 = x, bit 1 = y, bit 2 = z; set = max).
    pub fn corners(&self) -> [[f32; 3]; 8] {
        let mut out = [[0.0; 3]; 8];
        for (i, c) in out.iter_mut().enumerate() {
            c[0] = if i & 1 == 0 { self.min[0] } else { self.max[0] };
            c[1] = if i & 2 == 0 { self.min[1] } else { self.max[1] };
            c[2] = if i & 4 == 0 { self.min[2] } else { self.max[2] };
        }
        out
    }
}

/// Index range of a mesh inside the host's shared index/vertex buffers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct IndexRange {
    pub index_count: u32,
    pub first_index: u32,
    pub base_vertex: i32,
}

/// One static mesh placed in a room.
#[derive(Clone, Debug)]
pub struct ExtractedRoomMesh {
    /// Host-defined mesh id. Must be unique across rooms and actors.
    pub mesh_key: u64,
    pub indices: IndexRange,
    /// World transform: column-major 4x4 matrix (WGSL/wgpu convention).
    pub transform: [f32; 16],
    /// Model-space bounds; the registry expands them to world-space corners.
    pub local_bounds: Aabb,
    /// Billboards keep only the translation of `transform`.
    pub billboard: bool,
    /// Instance group this mesh is a member of, if any.
    pub instance_group: Option<u32>,
}

#[derive(Clone, Debug, Default)]
pub struct ExtractedRoom {
    pub meshes: Vec<ExtractedRoomMesh>,
}

/// A mesh attached to a moving actor. Its bounds arrive every frame through `ExtractedFrame`.
#[derive(Clone, Debug)]
pub struct ExtractedActorMesh {
    pub mesh_key: u64,
    pub indices: IndexRange,
}

#[derive(Clone, Debug, Default)]
pub struct ExtractedActor {
    pub actor_key: u64,
    pub meshes: Vec<ExtractedActorMesh>,
}

/// A set of room meshes drawn with one instanced indirect command.
#[derive(Clone, Debug)]
pub struct ExtractedInstanceGroup {
    pub group_key: u32,
    /// Geometry shared by every member.
    pub indices: IndexRange,
}

/// Occluder geometry: position in the first 12 bytes of every vertex, u32 indices.
#[derive(Clone, Debug)]
pub struct ExtractedOccluder {
    pub entity_id: u64,
    pub vertex_data: Vec<u8>,
    pub index_data: Vec<u8>,
    pub transform: [f32; 16],
}

/// Everything the culling backend needs at scene load.
#[derive(Clone, Debug, Default)]
pub struct ExtractedScene {
    pub rooms: Vec<ExtractedRoom>,
    pub actors: Vec<ExtractedActor>,
    pub instance_groups: Vec<ExtractedInstanceGroup>,
    pub occluders: Vec<ExtractedOccluder>,
}

/// Visible instances of one group after the host's frustum cull.
#[derive(Clone, Debug, Default)]
pub struct ExtractedGroupInstances {
    pub group_key: u32,
    pub mesh_keys: Vec<u64>,
}

/// Per-frame output of the host's frustum cull plus actor movement.
#[derive(Clone, Debug, Default)]
pub struct ExtractedFrame {
    /// Non-instanced meshes (room or actor) that survived the frustum cull.
    pub visible_meshes: Vec<u64>,
    pub visible_instances: Vec<ExtractedGroupInstances>,
    /// World-space bounds of actors that moved since the previous frame.
    pub moved_actors: Vec<(u64, Aabb)>,
}

/// View/camera data for the current frame.
#[derive(Clone, Debug)]
pub struct ExtractedView {
    /// Column-major view-projection with wgpu depth range [0, 1].
    pub view_proj: [f32; 16],
}

impl Default for ExtractedView {
    fn default() -> Self {
        Self {
            view_proj: [
                1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 0.0, 1.0,
            ],
        }
    }
}
