//! hizcull plugin: implements CullBackend for the host.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use cull_api::{BackendError, CullBackend, CullReport, ExtractedFrame, ExtractedOccluder, ExtractedScene, ExtractedView};
use glam::Mat4;
use hizcull_renderer::{CullConfig, CullEngine, CullError, FrameInput, OccluderDraw};

/// Cached GPU buffers and world transform for one occluder.
struct CachedOccluder {
    vertex_buf: Arc<wgpu::Buffer>,
    index_buf: Arc<wgpu::Buffer>,
    index_count: u32,
    vertex_len: usize,
    index_len: usize,
    transform: [f32; 16],
}

/// Index count of an occluder, or None when its buffers don't fit the vertex stride / u32 indices.
fn occluder_index_count(occluder: &ExtractedOccluder, vertex_stride: u64) -> Option<u32> {
    let (vertex_len, index_len) = (occluder.vertex_data.len(), occluder.index_data.len());
    if vertex_len == 0 || index_len == 0 || vertex_stride == 0 {
        return None;
    }
    if vertex_len as u64 % vertex_stride != 0 || index_len % 12 != 0 {
        return None;
    }
    u32::try_from(index_len / 4).ok()
}

fn prepare_error(e: CullError) -> BackendError {
    BackendError::Prepare(e.to_string())
}

fn frame_error(e: CullError) -> BackendError {
    BackendError::Frame(e.to_string())
}

/// hizcull plugin: owns the wgpu device/queue through its engine; implements CullBackend.
pub struct HizCullPlugin {
    engine: CullEngine,
    /// Cache by entity_id. Updated in prepare() from ExtractedScene.
    occluder_cache: HashMap<u64, CachedOccluder>,
    prepared: bool,
}

impl HizCullPlugin {
    /// Create with wgpu device and queue (default config).
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Result<Self, BackendError> {
        Self::new_with_config(device, queue, CullConfig::default())
    }

    pub fn new_with_config(device: wgpu::Device, queue: wgpu::Queue, config: CullConfig) -> Result<Self, BackendError> {
        let engine = CullEngine::new_with_config(device, queue, config).map_err(|e| BackendError::Device(e.to_string()))?;
        Ok(Self { engine, occluder_cache: HashMap::new(), prepared: false })
    }

    pub fn engine(&self) -> &CullEngine {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut CullEngine {
        &mut self.engine
    }

    pub fn occluder_count(&self) -> usize {
        self.occluder_cache.len()
    }

    fn upload_occluders(&mut self, occluders: &[ExtractedOccluder]) {
        let device = self.engine.device();
        let queue = self.engine.queue();
        let stride = self.engine.config().occluder_vertex_stride;
        let current: HashSet<u64> = occluders.iter().map(|o| o.entity_id).collect();
        self.occluder_cache.retain(|k, _| current.contains(k));
        for occ in occluders {
            let Some(index_count) = occluder_index_count(occ, stride) else {
                log::warn!("occluder {} skipped: malformed vertex or index data", occ.entity_id);
                self.occluder_cache.remove(&occ.entity_id);
                continue;
            };
            let vertex_len = occ.vertex_data.len();
            let index_len = occ.index_data.len();
            if let Some(cached) = self.occluder_cache.get_mut(&occ.entity_id) {
                if cached.vertex_len == vertex_len && cached.index_len == index_len {
                    queue.write_buffer(&cached.vertex_buf, 0, &occ.vertex_data);
                    queue.write_buffer(&cached.index_buf, 0, &occ.index_data);
                    cached.transform = occ.transform;
                    continue;
                }
            }
            let vertex_buf = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("hizcull_occluder_vertex"),
                size: vertex_len as u64,
                usage: wgpu::BufferUsages::VERTEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            queue.write_buffer(&vertex_buf, 0, &occ.vertex_data);
            let index_buf = device.create_buffer(&wgpu::BufferDescriptor {
                label: Some("hizcull_occluder_index"),
                size: index_len as u64,
                usage: wgpu::BufferUsages::INDEX | wgpu::BufferUsages::COPY_DST,
                mapped_at_creation: false,
            });
            queue.write_buffer(&index_buf, 0, &occ.index_data);
            self.occluder_cache.insert(
                occ.entity_id,
                CachedOccluder {
                    vertex_buf: Arc::new(vertex_buf),
                    index_buf: Arc::new(index_buf),
                    index_count,
                    vertex_len,
                    index_len,
                    transform: occ.transform,
                },
            );
        }
    }

    fn occluder_draws(&self) -> Vec<OccluderDraw> {
        self.occluder_cache
            .values()
            .map(|c| OccluderDraw {
                vertex_buf: Arc::clone(&c.vertex_buf),
                index_buf: Arc::clone(&c.index_buf),
                index_count: c.index_count,
                transform: c.transform,
            })
            .collect()
    }

    /// True when this frame's counter copy happened and a blocking read is worthwhile.
    fn samples_stats(&self) -> bool {
        let config = self.engine.config();
        config.draw_statistics && self.engine.frame() % config.stats_interval.max(1) == 0
    }
}

impl CullBackend for HizCullPlugin {
    fn prepare(&mut self, scene: &ExtractedScene) -> Result<(), BackendError> {
        self.engine.build_static_registry(scene).map_err(prepare_error)?;
        self.upload_occluders(&scene.occluders);
        self.prepared = true;
        log::info!(
            "hizcull plugin prepared: {} rooms, {} actors, {} occluders",
            scene.rooms.len(),
            scene.actors.len(),
            self.occluder_cache.len()
        );
        Ok(())
    }

    fn cull_frame(&mut self, view: &ExtractedView, frame: &ExtractedFrame) -> Result<CullReport, BackendError> {
        if !self.prepared {
            return Err(BackendError::NotPrepared);
        }
        let occluders = self.occluder_draws();
        let input = FrameInput {
            view_proj: Mat4::from_cols_array(&view.view_proj),
            occluders: &occluders,
            moved_actors: &frame.moved_actors,
            visible_meshes: &frame.visible_meshes,
            visible_instances: &frame.visible_instances,
        };
        if self.engine.needs_warm_up() {
            let size = self.engine.warm_up(&input).map_err(frame_error)?;
            log::info!("hizcull plugin: occlusion cull workgroup size {size}");
        }
        let (cmd, summary) = self.engine.cull_frame(&input).map_err(frame_error)?;
        self.engine.submit([cmd]);
        let visible_draws = if self.samples_stats() {
            Some(self.engine.read_visible_count().map_err(frame_error)?)
        } else {
            None
        };
        Ok(CullReport { candidates: summary.candidates, visible_groups: summary.visible_groups, visible_draws })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn occluder(vertex_len: usize, index_len: usize) -> ExtractedOccluder {
        ExtractedOccluder {
            entity_id: 1,
            vertex_data: vec![0; vertex_len],
            index_data: vec![0; index_len],
            transform: Mat4::IDENTITY.to_cols_array(),
        }
    }

    #[test]
    fn occluder_validation() {
        assert_eq!(occluder_index_count(&occluder(36, 12), 12), Some(3));
        assert_eq!(occluder_index_count(&occluder(72, 24), 24), Some(6));
        assert_eq!(occluder_index_count(&occluder(0, 12), 12), None);
        assert_eq!(occluder_index_count(&occluder(36, 0), 12), None);
        // stride mismatch
        assert_eq!(occluder_index_count(&occluder(40, 12), 12), None);
        // not whole triangles
        assert_eq!(occluder_index_count(&occluder(36, 8), 12), None);
    }

    #[test]
    fn occluder_validation_uses_configured_stride() {
        let stride = CullConfig { occluder_vertex_stride: 16, ..CullConfig::default() }.occluder_vertex_stride;
        assert_eq!(occluder_index_count(&occluder(48, 12), stride), Some(3));
        assert_eq!(occluder_index_count(&occluder(36, 12), stride), None);
        assert_eq!(occluder_index_count(&occluder(48, 12), 0), None);
    }

    #[test]
    fn errors_keep_their_message() {
        let e = frame_error(CullError::InvalidState { expected: "initialized", actual: "disposed" });
        assert_eq!(e.to_string(), "frame culling failed: invalid state: expected initialized, engine is disposed");
        assert!(matches!(prepare_error(CullError::DuplicateMesh(4)), BackendError::Prepare(_)));
    }
}
