//! Error taxonomy for the culling engine. GPU-side logic never fails; everything here is CPU setup or misuse.

#[derive(Debug, thiserror::Error)]
pub enum CullError {
    /// More candidate draws than the configured buffer capacity.
    #[error("registry needs {requested} draw slots but capacity is {capacity}")]
    CapacityExceeded { requested: u32, capacity: u32 },

    #[error("instance group {group} has {members} members, max is {max}")]
    GroupTooLarge { group: u32, members: u32, max: u32 },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("mesh key {0} is registered twice")]
    DuplicateMesh(u64),

    #[error("instance group {0} is registered twice")]
    DuplicateGroup(u32),

    #[error("room mesh {mesh} references unknown instance group {group}")]
    UnknownGroup { mesh: u64, group: u32 },

    #[error("unknown mesh key {0}")]
    UnknownMesh(u64),

    #[error("unknown actor key {0}")]
    UnknownActor(u64),

    /// Shader or pipeline creation failed. Carries the kernel descriptor name.
    #[error("shader compile error in `{descriptor}`: {message}")]
    ShaderCompile { descriptor: String, message: String },

    #[error("kernel `{kernel}` has no binding named `{binding}`")]
    UnboundResource { kernel: String, binding: String },

    #[error("invalid state: expected {expected}, engine is {actual}")]
    InvalidState { expected: &'static str, actual: &'static str },

    #[error("readback failed: {0}")]
    Readback(String),
}
