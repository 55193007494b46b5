//! Trait for culling backends. The host uses this to prepare a scene once and cull every frame.

use crate::{ExtractedFrame, ExtractedScene, ExtractedView};

/// Errors surfaced to the host. Backends flatten their own error types into these.
#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("no suitable GPU adapter")]
    NoAdapter,
    #[error("device request failed: {0}")]
    Device(String),
    #[error("scene preparation failed: {0}")]
    Prepare(String),
    #[error("frame culling failed: {0}")]
    Frame(String),
    #[error("cull_frame called before prepare")]
    NotPrepared,
}

/// Outcome of one culled frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CullReport {
    /// Candidates submitted to the visibility test this frame.
    pub candidates: u32,
    /// Instance groups with at least one frustum-visible instance.
    pub visible_groups: u32,
    /// Visible draws read back from the GPU counter; `None` unless statistics are enabled
    /// and this frame was sampled.
    pub visible_draws: Option<u32>,
}

/// Culling backend the host drives regardless of implementation.
pub trait CullBackend: Send {
    /// Register scene meshes and upload occluder geometry. Ids assigned here stay fixed for the scene.
    fn prepare(&mut self, scene: &ExtractedScene) -> Result<(), BackendError>;

    /// Run one frame of occlusion culling. Submits work internally.
    fn cull_frame(
        &mut self,
        view: &ExtractedView,
        frame: &ExtractedFrame,
    ) -> Result<CullReport, BackendError>;
}
