//! CPU evaluation of the occlusion test, mirroring occlusion_cull.wgsl.

use glam::{Mat4, UVec2, Vec2};

use crate::hiz::reference::DepthPyramid;
use crate::registry::BoundingVolume;

/// Screen rectangle (uv, y down), nearest depth and pyramid level of a projected volume.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Footprint {
    pub rect_min: Vec2,
    pub rect_max: Vec2,
    pub nearest: f32,
    pub level: u32,
}

/// `ceil(log2(s))` for `s > 1`, else 0; clamped to the last level.
pub fn select_level(texels: f32, level_count: u32) -> u32 {
    let level = if texels > 1.0 { texels.log2().ceil() as u32 } else { 0 };
    level.min(level_count.saturating_sub(1))
}

/// `None` when a corner is behind the near plane; such volumes are always visible.
pub fn footprint(view_proj: &Mat4, volume: &BoundingVolume, hiz_size: UVec2, level_count: u32) -> Option<Footprint> {
    let mut rect_min = Vec2::splat(f32::MAX);
    let mut rect_max = Vec2::splat(f32::MIN);
    let mut nearest = f32::MAX;
    for i in 0..8 {
        let clip = *view_proj * volume.corner(i);
        if clip.w <= 0.0 || clip.z < 0.0 {
            return None;
        }
        let ndc = clip.truncate() / clip.w;
        let uv = Vec2::new(ndc.x * 0.5 + 0.5, 0.5 - ndc.y * 0.5);
        rect_min = rect_min.min(uv);
        rect_max = rect_max.max(uv);
        nearest = nearest.min(ndc.z);
    }
    let rect_min = rect_min.clamp(Vec2::ZERO, Vec2::ONE);
    let rect_max = rect_max.clamp(Vec2::ZERO, Vec2::ONE);
    let extent = (rect_max - rect_min) * hiz_size.as_vec2();
    Some(Footprint {
        rect_min,
        rect_max,
        nearest: nearest.clamp(0.0, 1.0),
        level: select_level(extent.x.max(extent.y), level_count),
    })
}

/// Max occluder depth over the level texels covering the footprint.
pub fn sample(pyramid: &DepthPyramid, fp: &Footprint) -> f32 {
    let base = pyramid.level(0);
    let size0 = UVec2::new(base.width, base.height);
    let last0 = size0 - UVec2::ONE;
    let px0 = (fp.rect_min * size0.as_vec2()).floor().as_uvec2().min(last0);
    let px1 = (fp.rect_max * size0.as_vec2()).floor().as_uvec2().min(last0);
    let lv = pyramid.level(fp.level);
    let last = UVec2::new(lv.width - 1, lv.height - 1);
    let t0 = (px0 >> fp.level).min(last);
    let t1 = (px1 >> fp.level).min(last);
    let mut d = 0.0f32;
    for y in t0.y..=t1.y {
        for x in t0.x..=t1.x {
            d = d.max(lv.get(x, y));
        }
    }
    d
}

pub fn is_visible(view_proj: &Mat4, volume: &BoundingVolume, pyramid: &DepthPyramid) -> bool {
    let base = pyramid.level(0);
    let size = UVec2::new(base.width, base.height);
    match footprint(view_proj, volume, size, pyramid.level_count()) {
        None => true,
        Some(fp) => fp.nearest <= sample(pyramid, &fp),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hiz::reference::DepthLevel;
    use cull_api::Aabb;

    fn ortho() -> Mat4 {
        // depth = -z over [0, 1]
        Mat4::orthographic_rh(-1.0, 1.0, -1.0, 1.0, 0.0, 1.0)
    }

    fn volume(min: [f32; 3], max: [f32; 3]) -> BoundingVolume {
        BoundingVolume::from_world_aabb(&Aabb::new(min, max), [36, 0, -1, 0])
    }

    /// 256x256 base with a 64x64 block at depth 0.1 over texels [64, 128).
    fn occluded_pyramid() -> DepthPyramid {
        let mut base = DepthLevel::filled(256, 256, 1.0);
        for y in 64..128 {
            for x in 64..128 {
                base.data[(y * 256 + x) as usize] = 0.1;
            }
        }
        DepthPyramid::build(base)
    }

    #[test]
    fn level_selection() {
        assert_eq!(select_level(0.0, 9), 0);
        assert_eq!(select_level(1.0, 9), 0);
        assert_eq!(select_level(1.5, 9), 1);
        assert_eq!(select_level(64.0, 9), 6);
        assert_eq!(select_level(77.0, 9), 7);
        assert_eq!(select_level(10_000.0, 9), 8);
    }

    #[test]
    fn no_occluders_means_visible() {
        let p = DepthPyramid::build(DepthLevel::filled(256, 256, 1.0));
        let v = volume([-0.4, 0.1, -0.6], [-0.1, 0.4, -0.5]);
        assert!(is_visible(&ortho(), &v, &p));
        // beyond the far plane still compares as background
        let far = volume([-0.4, 0.1, -3.0], [-0.1, 0.4, -2.0]);
        assert!(is_visible(&ortho(), &far, &p));
    }

    #[test]
    fn block_hides_candidate_behind_it() {
        let p = occluded_pyramid();
        let v = volume([-0.4, 0.1, -0.6], [-0.1, 0.4, -0.5]);
        let fp = footprint(&ortho(), &v, UVec2::new(256, 256), p.level_count()).unwrap();
        assert!((fp.nearest - 0.5).abs() < 1e-6);
        assert_eq!(fp.level, 6);
        assert!(!is_visible(&ortho(), &v, &p));
    }

    #[test]
    fn candidate_in_front_of_block_is_visible() {
        let p = occluded_pyramid();
        let v = volume([-0.4, 0.1, -0.06], [-0.1, 0.4, -0.05]);
        assert!(is_visible(&ortho(), &v, &p));
    }

    #[test]
    fn candidate_overlapping_open_area_is_visible() {
        let p = occluded_pyramid();
        let v = volume([-0.4, 0.1, -0.6], [0.3, 0.4, -0.5]);
        assert!(is_visible(&ortho(), &v, &p));
    }

    #[test]
    fn corner_behind_near_plane_is_visible() {
        let p = occluded_pyramid();
        let v = volume([-0.4, 0.1, -0.6], [-0.1, 0.4, 0.5]);
        assert!(footprint(&ortho(), &v, UVec2::new(256, 256), p.level_count()).is_none());
        assert!(is_visible(&ortho(), &v, &p));
        let persp = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let behind = volume([-1.0, -1.0, -1.0], [1.0, 1.0, 1.0]);
        assert!(is_visible(&persp, &behind, &p));
    }

    #[test]
    fn straddling_camera_survives_full_occlusion() {
        // Every texel at depth 0: anything with a finite footprint is hidden.
        let p = DepthPyramid::build(DepthLevel::filled(256, 256, 0.0));
        let persp = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let around_eye = volume([-0.5, -0.5, -0.5], [0.5, 0.5, 0.5]);
        assert!(footprint(&persp, &around_eye, UVec2::new(256, 256), p.level_count()).is_none());
        assert!(is_visible(&persp, &around_eye, &p));
        let ahead = volume([-0.5, -0.5, -10.0], [0.5, 0.5, -9.0]);
        assert!(!is_visible(&persp, &ahead, &p));
    }

    #[test]
    fn footprint_level_covers_box_with_two_texels() {
        let p = occluded_pyramid();
        let size = UVec2::new(256, 256);
        for (i, half) in [0.001f32, 0.004, 0.01, 0.03, 0.07, 0.2, 0.45, 0.9].into_iter().enumerate() {
            let c = -0.3 + i as f32 * 0.037;
            let v = volume([c - half, c - half, -0.6], [c + half, c + half, -0.5]);
            let fp = footprint(&ortho(), &v, size, p.level_count()).unwrap();
            let extent = (fp.rect_max - fp.rect_min) * 256.0;
            assert_eq!(fp.level, select_level(extent.x.max(extent.y), p.level_count()), "half extent {half}");
            let px0 = (fp.rect_min * 256.0).floor().as_uvec2().min(UVec2::splat(255));
            let px1 = (fp.rect_max * 256.0).floor().as_uvec2().min(UVec2::splat(255));
            let span = (px1 >> fp.level) - (px0 >> fp.level);
            assert!(span.x <= 1 && span.y <= 1, "half extent {half}: level {} spans {span}", fp.level);
        }
    }

    #[test]
    fn conservative_under_perspective() {
        // 16x16 checkerboard of background (1.0) and occluder (0.5) cells.
        let mut base = DepthLevel::filled(256, 256, 1.0);
        for y in 0..256u32 {
            for x in 0..256u32 {
                if (x / 16 + y / 16) % 2 == 1 {
                    base.data[(y * 256 + x) as usize] = 0.5;
                }
            }
        }
        let p = DepthPyramid::build(base);
        let base = p.level(0);
        let persp = Mat4::perspective_rh(1.0, 1.0, 0.1, 100.0);
        let mut culled = 0;
        for half in [0.02f32, 0.05, 0.2] {
            for i in 0..24 {
                let cx = -1.5 + i as f32 * 0.13;
                let v = volume([cx - half, 0.3 - half, -5.0 - half], [cx + half, 0.3 + half, -5.0 + half]);
                let fp = footprint(&persp, &v, UVec2::new(256, 256), p.level_count()).unwrap();
                let px0 = (fp.rect_min * 256.0).floor().as_uvec2().min(UVec2::splat(255));
                let px1 = (fp.rect_max * 256.0).floor().as_uvec2().min(UVec2::splat(255));
                let mut exposed = false;
                for y in px0.y..=px1.y {
                    for x in px0.x..=px1.x {
                        exposed |= base.get(x, y) >= fp.nearest;
                    }
                }
                let visible = is_visible(&persp, &v, &p);
                if exposed {
                    assert!(visible, "candidate {i} (half {half}) culled while exposed");
                }
                culled += usize::from(!visible);
            }
        }
        assert!(culled > 0, "sweep never exercised the culled path");
    }

    #[test]
    fn unset_volume_is_visible() {
        let p = occluded_pyramid();
        assert!(is_visible(&ortho(), &BoundingVolume::unset([1, 0, -1, 0]), &p));
    }

    #[test]
    fn conservative_against_base_level() {
        // Any candidate whose footprint touches a base texel with depth >= nearest must pass.
        let p = occluded_pyramid();
        let base = p.level(0);
        for i in 0..20 {
            let x0 = -0.9 + i as f32 * 0.085;
            let v = volume([x0, -0.2, -0.6], [x0 + 0.13, 0.37, -0.5]);
            let fp = footprint(&ortho(), &v, UVec2::new(256, 256), p.level_count()).unwrap();
            let px0 = (fp.rect_min * 256.0).floor().as_uvec2().min(UVec2::splat(255));
            let px1 = (fp.rect_max * 256.0).floor().as_uvec2().min(UVec2::splat(255));
            let mut exposed = false;
            for y in px0.y..=px1.y {
                for x in px0.x..=px1.x {
                    exposed |= base.get(x, y) >= fp.nearest;
                }
            }
            if exposed {
                assert!(is_visible(&ortho(), &v, &p), "candidate {i} culled while exposed");
            }
        }
    }
}
