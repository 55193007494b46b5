//! hizcull configuration: pyramid size, buffer capacities, statistics.

use crate::error::CullError;

/// Default compute workgroup size when no tuner value is available.
pub const DEFAULT_WORKGROUP_SIZE: u32 = 64;

/// Culling engine configuration.
#[derive(Clone, Debug)]
pub struct CullConfig {
    /// Hi-Z level 0 size. Typically half the viewport.
    pub hiz_width: u32,
    pub hiz_height: u32,
    /// Capacity of the draw tables (room + actor meshes). Registry build fails above this.
    pub max_draws: u32,
    /// Instance slots per group. Also the compaction workgroup size.
    pub max_instances_per_group: u32,
    /// Cull room and actor meshes too; when false only instanced groups are culled.
    pub cull_non_instanced: bool,
    /// Count visible draws on the GPU and allow reading them back.
    pub draw_statistics: bool,
    /// Copy the counter to the readback buffer every N frames.
    pub stats_interval: u32,
    /// Byte stride of occluder vertices; positions are the first 12 bytes.
    pub occluder_vertex_stride: u64,
    /// Run the workgroup-size benchmark when the tuner has no value.
    pub warmup_sweep: bool,
}

impl Default for CullConfig {
    fn default() -> Self {
        Self {
            hiz_width: 512,
            hiz_height: 256,
            max_draws: 16384,
            max_instances_per_group: 128,
            cull_non_instanced: true,
            draw_statistics: false,
            stats_interval: 1,
            occluder_vertex_stride: 12,
            warmup_sweep: false,
        }
    }
}

impl CullConfig {
    /// Check the configuration against device limits.
    pub fn validate(&self, limits: &wgpu::Limits) -> Result<(), CullError> {
        if self.hiz_width == 0 || self.hiz_height == 0 {
            return Err(CullError::InvalidConfig("hi-z size must be > 0".to_string()));
        }
        let max_dim = limits.max_texture_dimension_2d;
        if self.hiz_width > max_dim || self.hiz_height > max_dim {
            return Err(CullError::InvalidConfig(format!(
                "hi-z size {}x{} exceeds device limit {max_dim}",
                self.hiz_width, self.hiz_height
            )));
        }
        if self.max_instances_per_group == 0
            || self.max_instances_per_group > limits.max_compute_invocations_per_workgroup
            || self.max_instances_per_group > limits.max_compute_workgroup_size_x
        {
            return Err(CullError::InvalidConfig(format!(
                "max_instances_per_group {} outside 1..={}",
                self.max_instances_per_group,
                limits
                    .max_compute_invocations_per_workgroup
                    .min(limits.max_compute_workgroup_size_x)
            )));
        }
        if self.stats_interval == 0 {
            return Err(CullError::InvalidConfig("stats_interval must be >= 1".to_string()));
        }
        if self.occluder_vertex_stride < 12 || self.occluder_vertex_stride % 4 != 0 {
            return Err(CullError::InvalidConfig(format!(
                "occluder_vertex_stride {} must be a multiple of 4 and >= 12",
                self.occluder_vertex_stride
            )));
        }
        Ok(())
    }

    /// Number of mip levels of the Hi-Z pyramid.
    pub fn hiz_levels(&self) -> u32 {
        crate::hiz::level_count(self.hiz_width, self.hiz_height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        CullConfig::default().validate(&wgpu::Limits::default()).unwrap();
    }

    #[test]
    fn rejects_group_size_over_invocation_limit() {
        let config = CullConfig { max_instances_per_group: 512, ..CullConfig::default() };
        assert!(matches!(
            config.validate(&wgpu::Limits::default()),
            Err(CullError::InvalidConfig(_))
        ));
    }

    #[test]
    fn rejects_zero_stats_interval() {
        let config = CullConfig { stats_interval: 0, ..CullConfig::default() };
        assert!(config.validate(&wgpu::Limits::default()).is_err());
    }
}
