//! CPU max-depth pyramid with the same downsample rule as the GPU kernel.

#[derive(Clone, Debug, PartialEq)]
pub struct DepthLevel {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl DepthLevel {
    pub fn new(width: u32, height: u32, data: Vec<f32>) -> Self {
        debug_assert_eq!(data.len(), (width * height) as usize);
        Self { width, height, data }
    }

    pub fn filled(width: u32, height: u32, depth: f32) -> Self {
        Self::new(width, height, vec![depth; (width * height) as usize])
    }

    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[(y * self.width + x) as usize]
    }

    /// Source texel range `[lo, hi]` covered by destination texel `t` on one axis.
    /// The last destination texel also takes the trailing texel of an odd source.
    pub fn covered(t: u32, src: u32, dst: u32) -> (u32, u32) {
        let last = src - 1;
        let lo = (t * 2).min(last);
        let hi = if t == dst - 1 { last } else { (t * 2 + 1).min(last) };
        (lo, hi)
    }

    pub fn downsample(&self) -> DepthLevel {
        let (w, h) = (next_size(self.width), next_size(self.height));
        let mut data = Vec::with_capacity((w * h) as usize);
        for y in 0..h {
            let (y0, y1) = Self::covered(y, self.height, h);
            for x in 0..w {
                let (x0, x1) = Self::covered(x, self.width, w);
                let mut d = 0.0f32;
                for sy in y0..=y1 {
                    for sx in x0..=x1 {
                        d = d.max(self.get(sx, sy));
                    }
                }
                data.push(d);
            }
        }
        DepthLevel::new(w, h, data)
    }
}

fn next_size(s: u32) -> u32 {
    (s / 2).max(1)
}

#[derive(Clone, Debug, PartialEq)]
pub struct DepthPyramid {
    pub levels: Vec<DepthLevel>,
}

impl DepthPyramid {
    pub fn build(base: DepthLevel) -> Self {
        let count = super::level_count(base.width, base.height) as usize;
        let mut levels = Vec::with_capacity(count);
        levels.push(base);
        while levels.len() < count {
            let next = levels[levels.len() - 1].downsample();
            levels.push(next);
        }
        Self { levels }
    }

    pub fn level(&self, l: u32) -> &DepthLevel {
        &self.levels[l as usize]
    }

    pub fn level_count(&self) -> u32 {
        self.levels.len() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(w: u32, h: u32) -> DepthLevel {
        let data = (0..w * h).map(|i| (i as f32 * 0.37).fract()).collect();
        DepthLevel::new(w, h, data)
    }

    #[test]
    fn odd_axis_last_texel_takes_three() {
        assert_eq!(DepthLevel::covered(0, 5, 2), (0, 1));
        assert_eq!(DepthLevel::covered(1, 5, 2), (2, 4));
        assert_eq!(DepthLevel::covered(0, 1, 1), (0, 0));
        assert_eq!(DepthLevel::covered(0, 3, 1), (0, 2));
        assert_eq!(DepthLevel::covered(3, 8, 4), (6, 7));
    }

    #[test]
    fn level_sizes_reach_one() {
        let p = DepthPyramid::build(DepthLevel::filled(13, 5, 1.0));
        let sizes: Vec<_> = p.levels.iter().map(|l| (l.width, l.height)).collect();
        assert_eq!(sizes, vec![(13, 5), (6, 2), (3, 1), (1, 1)]);
    }

    #[test]
    fn every_texel_is_max_of_covered_texels() {
        let p = DepthPyramid::build(ramp(37, 19));
        for l in 1..p.level_count() {
            let src = p.level(l - 1);
            let dst = p.level(l);
            for y in 0..dst.height {
                for x in 0..dst.width {
                    let (x0, x1) = DepthLevel::covered(x, src.width, dst.width);
                    let (y0, y1) = DepthLevel::covered(y, src.height, dst.height);
                    let mut m = 0.0f32;
                    for sy in y0..=y1 {
                        for sx in x0..=x1 {
                            m = m.max(src.get(sx, sy));
                        }
                    }
                    assert_eq!(dst.get(x, y), m);
                }
            }
        }
    }

    #[test]
    fn coarse_texel_bounds_every_base_texel_under_it() {
        let p = DepthPyramid::build(ramp(23, 11));
        let base = p.level(0);
        for l in 0..p.level_count() {
            let lv = p.level(l);
            for y in 0..base.height {
                for x in 0..base.width {
                    let tx = (x >> l).min(lv.width - 1);
                    let ty = (y >> l).min(lv.height - 1);
                    assert!(lv.get(tx, ty) >= base.get(x, y));
                }
            }
        }
    }

    #[test]
    fn empty_occluders_stay_at_background() {
        let p = DepthPyramid::build(DepthLevel::filled(16, 16, 1.0));
        assert!(p.levels.iter().all(|l| l.data.iter().all(|d| *d == 1.0)));
    }
}
