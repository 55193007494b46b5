//! Shared occlusion-cull backend API.
//! Defines extract types and the CullBackend trait so the host can drive culling
//! with the same code path (prepare once + cull_frame every frame).

mod backend;
mod extract;

pub use backend::{BackendError, CullBackend, CullReport};
pub use extract::{
    Aabb, ExtractedActor, ExtractedActorMesh, ExtractedFrame, ExtractedGroupInstances,
    ExtractedInstanceGroup, ExtractedOccluder, ExtractedRoom, ExtractedRoomMesh, ExtractedScene,
    ExtractedView, IndexRange,
};
