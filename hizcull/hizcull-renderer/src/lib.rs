//! hizcull renderer: GPU Hi-Z occlusion culling and indirect-draw compaction on wgpu.

pub mod buffer;
pub mod compact;
pub mod config;
pub mod error;
pub mod hiz;
pub mod registry;
pub mod resources;
pub mod shader;
pub mod state;
pub mod stats;
pub mod tuning;
pub mod visibility;

pub use buffer::BufferRegion;
pub use compact::{InstanceBuffers, InstanceData, InstanceStreamEntry, StreamCompactor};
pub use config::{CullConfig, DEFAULT_WORKGROUP_SIZE};
pub use error::CullError;
pub use hiz::{HiZBuilder, OccluderDraw};
pub use registry::{BoundingVolume, CandidateList, IndirectDrawCommand, MeshEntry, MeshKind, MeshRegistry};
pub use resources::HiZResources;
pub use shader::{Kernel, KernelDescriptor, ShaderService, WgslShaderService};
pub use state::{EngineState, FramePhase, FrameTracker};
pub use stats::DrawStatistics;
pub use tuning::{FixedWorkgroupSizes, KernelId, WorkgroupTuner};
pub use visibility::{CullParams, VisibilityTester};

use std::time::Instant;

use cull_api::{Aabb, ExtractedGroupInstances, ExtractedScene};
use glam::Mat4;

/// Everything one frame of culling consumes.
pub struct FrameInput<'a> {
    pub view_proj: Mat4,
    pub occluders: &'a [OccluderDraw],
    /// World bounds of actors that moved since the last frame.
    pub moved_actors: &'a [(u64, Aabb)],
    /// Non-instanced meshes that passed the frustum cull.
    pub visible_meshes: &'a [u64],
    pub visible_instances: &'a [ExtractedGroupInstances],
}

/// CPU-side summary of one visibility dispatch.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CullSummary {
    pub candidates: u32,
    pub visible_groups: u32,
    pub frame: u32,
}

struct SceneResources {
    registry: MeshRegistry,
    instances: InstanceBuffers,
    compactor: StreamCompactor,
}

pub struct CullEngine {
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: CullConfig,
    shaders: Box<dyn ShaderService>,
    tuner: Box<dyn WorkgroupTuner>,
    state: EngineState,
    tracker: FrameTracker,
    hiz_builder: HiZBuilder,
    hiz: Option<HiZResources>,
    visibility: VisibilityTester,
    stats: DrawStatistics,
    scene: Option<SceneResources>,
    frame: u32,
    visible_groups: Vec<u32>,
    visible_draw_count: Option<u32>,
}

impl CullEngine {
    pub fn new(device: wgpu::Device, queue: wgpu::Queue) -> Result<Self, CullError> {
        Self::new_with_config(device, queue, CullConfig::default())
    }

    pub fn new_with_config(device: wgpu::Device, queue: wgpu::Queue, config: CullConfig) -> Result<Self, CullError> {
        Self::with_services(
            device,
            queue,
            config,
            Box::new(WgslShaderService),
            Box::new(FixedWorkgroupSizes::new()),
        )
    }

    pub fn with_services(
        device: wgpu::Device,
        queue: wgpu::Queue,
        config: CullConfig,
        shaders: Box<dyn ShaderService>,
        tuner: Box<dyn WorkgroupTuner>,
    ) -> Result<Self, CullError> {
        let limits = device.limits();
        config.validate(&limits)?;
        let cull_size = tuning::resolve_workgroup_size(tuner.as_ref(), KernelId::OcclusionCull, &limits);
        if tuner.workgroup_size(KernelId::OcclusionCull).is_some() {
            log::info!("hizcull: using pre-defined occlusion cull workgroup size {cull_size}");
        }
        let hiz_builder =
            HiZBuilder::new(&device, shaders.as_ref(), tuner.as_ref(), config.occluder_vertex_stride)?;
        let visibility = VisibilityTester::new(&device, shaders.as_ref(), cull_size, config.draw_statistics)?;
        let hiz = HiZResources::ensure_size(&device, &queue, None, config.hiz_width, config.hiz_height)?;
        let stats = DrawStatistics::new(&device, config.draw_statistics, config.stats_interval);
        log::info!(
            "hizcull: hi-z {}x{} ({} levels), max {} draws, {} instances per group",
            config.hiz_width,
            config.hiz_height,
            hiz.levels(),
            config.max_draws,
            config.max_instances_per_group
        );
        Ok(Self {
            device,
            queue,
            config,
            shaders,
            tuner,
            state: EngineState::Uninitialized,
            tracker: FrameTracker::default(),
            hiz_builder,
            hiz: Some(hiz),
            visibility,
            stats,
            scene: None,
            frame: 0,
            visible_groups: Vec::new(),
            visible_draw_count: None,
        })
    }

    pub fn device(&self) -> &wgpu::Device { &self.device }
    pub fn queue(&self) -> &wgpu::Queue { &self.queue }
    pub fn config(&self) -> &CullConfig { &self.config }
    pub fn state(&self) -> EngineState { self.state }
    pub fn frame_phase(&self) -> FramePhase { self.tracker.phase() }
    /// Frame tag of the most recent visibility dispatch (0 before the first).
    pub fn frame(&self) -> u32 { self.frame }
    pub fn tuner(&self) -> &dyn WorkgroupTuner { self.tuner.as_ref() }

    fn check_alive(&self) -> Result<(), CullError> {
        if self.state == EngineState::Disposed {
            return Err(CullError::InvalidState {
                expected: EngineState::Initialized.name(),
                actual: self.state.name(),
            });
        }
        Ok(())
    }

    fn scene(&self) -> Result<&SceneResources, CullError> {
        self.state.expect(EngineState::Initialized)?;
        self.scene.as_ref().ok_or(CullError::InvalidState {
            expected: EngineState::Initialized.name(),
            actual: EngineState::Uninitialized.name(),
        })
    }

    fn hiz(&self) -> Result<&HiZResources, CullError> {
        self.hiz.as_ref().ok_or(CullError::InvalidState {
            expected: EngineState::Initialized.name(),
            actual: self.state.name(),
        })
    }

    /// Assign draw ids for the scene and upload the static tables. Replaces any previous scene.
    pub fn build_static_registry(&mut self, scene: &ExtractedScene) -> Result<(), CullError> {
        self.check_alive()?;
        let registry = MeshRegistry::build(&self.device, &self.queue, scene, &self.config)?;
        let group_count = registry.layout().group_count();
        let instances = InstanceBuffers::new(&self.device, group_count, self.config.max_instances_per_group);
        let compactor = StreamCompactor::new(
            &self.device,
            self.shaders.as_ref(),
            self.config.max_instances_per_group,
            group_count,
        )?;
        self.scene = Some(SceneResources { registry, instances, compactor });
        self.state = EngineState::Initialized;
        self.tracker.reset();
        self.visible_groups.clear();
        Ok(())
    }

    /// Recreate the Hi-Z targets for a new size (e.g. after a viewport resize).
    pub fn resize_hiz(&mut self, width: u32, height: u32) -> Result<(), CullError> {
        self.check_alive()?;
        let limits = self.device.limits();
        let config = CullConfig { hiz_width: width, hiz_height: height, ..self.config.clone() };
        config.validate(&limits)?;
        let existing = self.hiz.take();
        let hiz = HiZResources::ensure_size(&self.device, &self.queue, existing, width, height)?;
        self.hiz = Some(hiz);
        self.config = config;
        Ok(())
    }

    /// First stage of a frame: rewrite bounding volumes of moved actors.
    pub fn refresh_dynamic_bounds(&mut self, moved: &[(u64, Aabb)]) -> Result<(), CullError> {
        self.tracker.check(FramePhase::BoundsRefreshed)?;
        let scene = self.scene()?;
        let writes = scene.registry.refresh_dynamic_bounds(&self.queue, moved)?;
        if writes > 0 {
            log::trace!("refreshed {} moved actors in {writes} writes", moved.len());
        }
        self.tracker.advance(FramePhase::BoundsRefreshed)
    }

    /// Render occluders and build the max-depth pyramid.
    pub fn build_hiz(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        view_proj: &Mat4,
        occluders: &[OccluderDraw],
    ) -> Result<(), CullError> {
        self.tracker.check(FramePhase::HiZBuilt)?;
        self.scene()?;
        self.encode_hiz(encoder, view_proj, occluders)?;
        self.tracker.advance(FramePhase::HiZBuilt)
    }

    fn encode_hiz(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        view_proj: &Mat4,
        occluders: &[OccluderDraw],
    ) -> Result<(), CullError> {
        let hiz = self.hiz.as_ref().ok_or(CullError::InvalidState {
            expected: EngineState::Initialized.name(),
            actual: self.state.name(),
        })?;
        self.hiz_builder.encode(encoder, &self.device, &self.queue, hiz, view_proj, occluders)
    }

    /// Resolve this frame's frustum-visible candidates and encode the occlusion test.
    pub fn test_visibility(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        view_proj: &Mat4,
        visible_meshes: &[u64],
        visible_instances: &[ExtractedGroupInstances],
    ) -> Result<CullSummary, CullError> {
        self.tracker.check(FramePhase::VisibilityTested)?;
        let candidates = self.scene()?.registry.layout().candidates(visible_meshes, visible_instances)?;
        self.encode_cull(encoder, view_proj, &candidates)?;
        self.visible_groups = candidates.visible_groups;
        self.tracker.advance(FramePhase::VisibilityTested)?;
        Ok(CullSummary {
            candidates: candidates.ids.len() as u32,
            visible_groups: self.visible_groups.len() as u32,
            frame: self.frame,
        })
    }

    fn encode_cull(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        view_proj: &Mat4,
        candidates: &CandidateList,
    ) -> Result<(), CullError> {
        self.frame = compact::next_frame(self.frame);
        let scene = self.scene()?;
        let hiz = self.hiz()?;
        let layout = scene.registry.layout();
        scene.registry.reset_group_commands(&self.queue);
        scene.registry.upload_candidates(&self.queue, candidates);
        self.stats.encode_reset(encoder);
        if candidates.is_empty() {
            log::debug!("frame {}: no candidates", self.frame);
        }
        let params = CullParams {
            view_proj: view_proj.to_cols_array(),
            hiz_size: [hiz.width() as f32, hiz.height() as f32],
            level_count: hiz.levels(),
            id_count: candidates.len(),
            instance_id_offset: candidates.instance_id_offset,
            first_group_slot: layout.first_group_slot(),
            frame: self.frame,
            max_instances: layout.max_instances(),
        };
        let hiz_view = hiz.pyramid_view();
        self.visibility.encode(
            encoder,
            &self.device,
            &self.queue,
            &params,
            &visibility::CullInputs {
                candidate_ids: scene.registry.candidate_ids(),
                volumes: scene.registry.volumes(),
                matrices: scene.registry.matrices(),
                commands: scene.registry.indirect(),
                stream: &scene.instances.stream,
                draw_counter: self.stats.counter(),
                hiz: &hiz_view,
            },
        )
    }

    /// Pack visible instances of every visible group, then sample the draw counter if due.
    pub fn compact(&mut self, encoder: &mut wgpu::CommandEncoder) -> Result<(), CullError> {
        self.tracker.check(FramePhase::Compacted)?;
        let scene = self.scene()?;
        scene.compactor.encode(
            encoder,
            &self.device,
            &self.queue,
            &scene.instances,
            &self.visible_groups,
            self.frame,
        )?;
        self.stats.encode_copy(encoder, self.frame);
        self.tracker.advance(FramePhase::Compacted)
    }

    /// Blocking read of the visible-draw counter. Call after the frame's commands were submitted.
    /// On frames that did not sample (see `stats_interval`), returns the last sampled value.
    pub fn read_visible_count(&mut self) -> Result<u32, CullError> {
        self.tracker.check(FramePhase::StatsRead)?;
        self.scene()?;
        let count = self.stats.read_visible_count(&self.device)?;
        self.visible_draw_count = Some(count);
        self.tracker.advance(FramePhase::StatsRead)?;
        Ok(count)
    }

    /// All stages of one frame, in order.
    pub fn encode_frame(
        &mut self,
        encoder: &mut wgpu::CommandEncoder,
        frame: &FrameInput<'_>,
    ) -> Result<CullSummary, CullError> {
        self.refresh_dynamic_bounds(frame.moved_actors)?;
        self.build_hiz(encoder, &frame.view_proj, frame.occluders)?;
        let summary = self.test_visibility(encoder, &frame.view_proj, frame.visible_meshes, frame.visible_instances)?;
        self.compact(encoder)?;
        Ok(summary)
    }

    pub fn cull_frame(&mut self, frame: &FrameInput<'_>) -> Result<(wgpu::CommandBuffer, CullSummary), CullError> {
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("hizcull_frame") });
        let summary = self.encode_frame(&mut encoder, frame)?;
        Ok((encoder.finish(), summary))
    }

    pub fn submit(&self, command_buffers: impl IntoIterator<Item = wgpu::CommandBuffer>) {
        self.queue.submit(command_buffers);
    }

    /// True when the config asks for a sweep and the tuner has no cull workgroup size yet.
    pub fn needs_warm_up(&self) -> bool {
        self.config.warmup_sweep && self.tuner.workgroup_size(KernelId::OcclusionCull).is_none()
    }

    /// Benchmark the cull kernel at every supported workgroup size on `frame`, record the
    /// fastest in the tuner and keep it. Builds the pyramid once; each iteration is one submit.
    pub fn warm_up(&mut self, frame: &FrameInput<'_>) -> Result<u32, CullError> {
        log::info!("warm up occlusion cull...");
        let candidates = self
            .scene()?
            .registry
            .layout()
            .candidates(frame.visible_meshes, frame.visible_instances)?;
        self.scene()?.registry.refresh_dynamic_bounds(&self.queue, frame.moved_actors)?;
        let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("hizcull_warmup_hiz") });
        self.encode_hiz(&mut encoder, &frame.view_proj, frame.occluders)?;
        self.queue.submit(std::iter::once(encoder.finish()));

        let sizes = tuning::sweep_sizes(&self.device.limits());
        let (best, _) = tuning::sweep(&sizes, |size, iterations| {
            self.visibility.recompile(&self.device, self.shaders.as_ref(), size)?;
            let start = Instant::now();
            for _ in 0..iterations {
                let mut encoder = self.device.create_command_encoder(&wgpu::CommandEncoderDescriptor { label: Some("hizcull_warmup") });
                self.encode_cull(&mut encoder, &frame.view_proj, &candidates)?;
                self.queue.submit(std::iter::once(encoder.finish()));
            }
            if !self.device.poll(wgpu::Maintain::Wait).is_queue_empty() {
                log::warn!("warm-up: workgroup size {size} timed before the queue drained");
            }
            Ok(start.elapsed())
        })?;
        self.tuner.record(KernelId::OcclusionCull, best);
        if self.visibility.workgroup_size() != best {
            self.visibility.recompile(&self.device, self.shaders.as_ref(), best)?;
        }
        self.tracker.reset();
        Ok(best)
    }

    /// Release all GPU resources. Every later call fails with `InvalidState`.
    pub fn dispose(&mut self) {
        self.scene = None;
        self.hiz = None;
        self.visible_groups.clear();
        self.tracker.reset();
        self.state = EngineState::Disposed;
    }

    /// Indirect commands: mesh `draw_id` at slot `draw_id`, instance groups after all meshes.
    pub fn indirect_command_buffer(&self) -> Option<&BufferRegion> {
        self.scene.as_ref().map(|s| s.registry.indirect())
    }

    pub fn instance_transform_buffer(&self) -> Option<&BufferRegion> {
        self.scene.as_ref().map(|s| &s.instances.transforms)
    }

    /// Byte offset of a group's compacted transforms in `instance_transform_buffer`.
    pub fn instance_buffer_base_offset(&self, group_key: u32) -> Option<u64> {
        let scene = self.scene.as_ref()?;
        let group = scene.registry.layout().group(group_key)?;
        Some(scene.instances.base_offset(group.index))
    }

    /// Byte offset of a group's instanced command in `indirect_command_buffer`.
    pub fn group_command_offset(&self, group_key: u32) -> Option<u64> {
        let scene = self.scene.as_ref()?;
        let group = scene.registry.layout().group(group_key)?;
        Some(scene.registry.command_offset(group.command_slot))
    }

    pub fn mesh_entry(&self, mesh_key: u64) -> Option<MeshEntry> {
        self.scene.as_ref()?.registry.layout().entry(mesh_key).copied()
    }

    pub fn registry(&self) -> Option<&MeshRegistry> {
        self.scene.as_ref().map(|s| &s.registry)
    }

    pub fn instance_buffers(&self) -> Option<&InstanceBuffers> {
        self.scene.as_ref().map(|s| &s.instances)
    }

    pub fn hiz_texture(&self) -> Option<&wgpu::Texture> {
        self.hiz.as_ref().map(|h| &h.pyramid)
    }

    pub fn hiz_resources(&self) -> Option<&HiZResources> {
        self.hiz.as_ref()
    }

    /// Last value returned by `read_visible_count`.
    pub fn visible_draw_count(&self) -> Option<u32> {
        self.visible_draw_count
    }
}
