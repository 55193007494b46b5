//! Workgroup sizes per compute kernel, and the one-time benchmark sweep that picks them.

use std::collections::HashMap;
use std::time::Duration;

use crate::config::DEFAULT_WORKGROUP_SIZE;
use crate::error::CullError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KernelId {
    OcclusionCull,
    HiZCopy,
    HiZDownsample,
}

/// Source of workgroup sizes, typically persisted by the host between runs.
pub trait WorkgroupTuner: Send {
    fn workgroup_size(&self, kernel: KernelId) -> Option<u32>;
    fn record(&mut self, kernel: KernelId, size: u32);
}

/// Map-backed tuner. Absent kernels fall back to the engine default.
#[derive(Clone, Debug, Default)]
pub struct FixedWorkgroupSizes {
    sizes: HashMap<KernelId, u32>,
}

impl FixedWorkgroupSizes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, kernel: KernelId, size: u32) -> Self {
        self.sizes.insert(kernel, size);
        self
    }
}

impl WorkgroupTuner for FixedWorkgroupSizes {
    fn workgroup_size(&self, kernel: KernelId) -> Option<u32> {
        self.sizes.get(&kernel).copied()
    }

    fn record(&mut self, kernel: KernelId, size: u32) {
        self.sizes.insert(kernel, size);
    }
}

/// Tuner value if valid for the device, else the default.
pub fn resolve_workgroup_size(tuner: &dyn WorkgroupTuner, kernel: KernelId, limits: &wgpu::Limits) -> u32 {
    match tuner.workgroup_size(kernel) {
        Some(size) if size_supported(size, limits) => size,
        Some(size) => {
            log::warn!("{kernel:?}: tuned workgroup size {size} not supported, using {DEFAULT_WORKGROUP_SIZE}");
            DEFAULT_WORKGROUP_SIZE
        }
        None => DEFAULT_WORKGROUP_SIZE,
    }
}

pub fn size_supported(size: u32, limits: &wgpu::Limits) -> bool {
    size > 0
        && size <= limits.max_compute_invocations_per_workgroup
        && size <= limits.max_compute_workgroup_size_x
}

pub const SWEEP_SIZES: [u32; 8] = [8, 16, 32, 64, 128, 256, 512, 1024];
pub const SWEEP_INITIAL_ITERATIONS: u32 = 5;
const SWEEP_TARGET_MS: f64 = 200.0;
const SWEEP_EXTEND_BELOW_MS: f64 = 50.0;
const SWEEP_MAX_ITERATIONS: u32 = 200;

pub fn sweep_sizes(limits: &wgpu::Limits) -> Vec<u32> {
    SWEEP_SIZES.iter().copied().filter(|s| size_supported(*s, limits)).collect()
}

/// Iterations for the extended run after a short first run, aiming at ~200 ms.
pub fn extended_iterations(avg_ms: f64) -> u32 {
    let n = if avg_ms > 0.01 { (SWEEP_TARGET_MS / avg_ms) as u32 } else { SWEEP_MAX_ITERATIONS };
    n.clamp(SWEEP_INITIAL_ITERATIONS, SWEEP_MAX_ITERATIONS)
}

/// Time every supported size with `run(size, iterations)` and return the fastest.
/// Sizes whose run fails are skipped with a warning.
pub fn sweep<F>(sizes: &[u32], mut run: F) -> Result<(u32, f64), CullError>
where
    F: FnMut(u32, u32) -> Result<Duration, CullError>,
{
    let mut best: Option<(u32, f64)> = None;
    for &size in sizes {
        log::info!("workgroup size: {size}");
        let total = match run(size, SWEEP_INITIAL_ITERATIONS) {
            Ok(d) => d,
            Err(e) => {
                log::warn!("workgroup size {size} skipped: {e}");
                continue;
            }
        };
        let total_ms = total.as_secs_f64() * 1000.0;
        let mut avg_ms = total_ms / SWEEP_INITIAL_ITERATIONS as f64;
        log::info!(
            "  result after {SWEEP_INITIAL_ITERATIONS} iterations: sum: {total_ms:.3}ms, avg time: {avg_ms:.3}ms"
        );
        if total_ms < SWEEP_EXTEND_BELOW_MS {
            let iterations = extended_iterations(avg_ms);
            log::info!("  warmup {iterations} iterations...");
            match run(size, iterations) {
                Ok(d) => {
                    let total_ms = d.as_secs_f64() * 1000.0;
                    avg_ms = total_ms / iterations as f64;
                    log::info!("  result: sum: {total_ms:.3}ms, avg time: {avg_ms:.3}ms");
                }
                Err(e) => {
                    log::warn!("workgroup size {size} skipped: {e}");
                    continue;
                }
            }
        }
        if best.map_or(true, |(_, t)| avg_ms < t) {
            best = Some((size, avg_ms));
        }
    }
    let (size, avg_ms) = best.ok_or_else(|| CullError::ShaderCompile {
        descriptor: "occlusion_cull".to_string(),
        message: "no workgroup size compiled during warm-up".to_string(),
    })?;
    log::info!("best result: {size} -> {avg_ms:.3}ms (avg)");
    Ok((size, avg_ms))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_when_tuner_empty() {
        let t = FixedWorkgroupSizes::new();
        assert_eq!(resolve_workgroup_size(&t, KernelId::OcclusionCull, &wgpu::Limits::default()), 64);
    }

    #[test]
    fn unsupported_tuned_size_falls_back() {
        let t = FixedWorkgroupSizes::new().with(KernelId::OcclusionCull, 4096).with(KernelId::HiZCopy, 128);
        let limits = wgpu::Limits::default();
        assert_eq!(resolve_workgroup_size(&t, KernelId::OcclusionCull, &limits), 64);
        assert_eq!(resolve_workgroup_size(&t, KernelId::HiZCopy, &limits), 128);
    }

    #[test]
    fn sweep_sizes_respect_limits() {
        let limits = wgpu::Limits::default();
        assert_eq!(sweep_sizes(&limits), vec![8, 16, 32, 64, 128, 256]);
    }

    #[test]
    fn extended_iterations_clamped() {
        assert_eq!(extended_iterations(0.0), 200);
        assert_eq!(extended_iterations(0.5), 200);
        assert_eq!(extended_iterations(4.0), 50);
        assert_eq!(extended_iterations(100.0), 5);
    }

    #[test]
    fn sweep_picks_fastest_average() {
        let cost = |size: u32| match size {
            32 => 1.0,
            64 => 0.5,
            _ => 2.0,
        };
        let (best, avg) = sweep(&[16, 32, 64, 128], |size, iters| {
            Ok(Duration::from_secs_f64(cost(size) * iters as f64 / 1000.0))
        })
        .unwrap();
        assert_eq!(best, 64);
        assert!((avg - 0.5).abs() < 1e-6);
    }

    #[test]
    fn sweep_skips_failing_sizes() {
        let (best, _) = sweep(&[8, 16], |size, _| {
            if size == 8 {
                Err(CullError::InvalidConfig("nope".to_string()))
            } else {
                Ok(Duration::from_millis(100))
            }
        })
        .unwrap();
        assert_eq!(best, 16);
        assert!(sweep(&[], |_, _| Ok(Duration::ZERO)).is_err());
    }
}
