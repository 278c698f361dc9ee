/// Gaussian reconstruction filter sampled over `q / cutoff^2` in `[0, 1]`.
#[derive(Debug, Clone)]
pub struct FilterLut {
    table: Vec<f32>,
    cutoff_radius: f32,
    cutoff_radius_sq: f32,
    scale: f32,
}

impl FilterLut {
    /// `cutoff_radius` must be positive and `size` non-zero; callers go
    /// through `RenderSettings::validate` first.
    pub fn new(cutoff_radius: f32, size: usize) -> Self {
        let mut lut = Self {
            table: Vec::with_capacity(size),
            cutoff_radius,
            cutoff_radius_sq: cutoff_radius * cutoff_radius,
            scale: 0.0,
        };
        lut.fill(size);
        lut
    }

    pub fn regenerate(&mut self, cutoff_radius: f32) {
        if cutoff_radius == self.cutoff_radius {
            return;
        }
        self.cutoff_radius = cutoff_radius;
        self.cutoff_radius_sq = cutoff_radius * cutoff_radius;
        let size = self.table.len();
        self.fill(size);
    }

    fn fill(&mut self, size: usize) {
        let size = size.max(1);
        self.table.clear();
        self.table.extend((0..size).map(|i| {
            let q = i as f32 / size as f32 * self.cutoff_radius_sq;
            (-q).exp()
        }));
        self.scale = size as f32 / self.cutoff_radius_sq;
    }

    /// Weight for squared distance `q`. Only meaningful for
    /// `0 <= q < cutoff^2`; the index is clamped regardless.
    pub fn lookup(&self, q: f32) -> f32 {
        let idx = (q * self.scale).max(0.0) as usize;
        self.table[idx.min(self.table.len() - 1)]
    }

    pub fn cutoff_radius(&self) -> f32 {
        self.cutoff_radius
    }

    pub fn cutoff_radius_sq(&self) -> f32 {
        self.cutoff_radius_sq
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn center_weight_is_one_and_decreasing() {
        let lut = FilterLut::new(1.5, 256);
        assert_eq!(lut.lookup(0.0), 1.0);
        let mut prev = f32::INFINITY;
        for i in 0..20 {
            let q = i as f32 / 20.0 * lut.cutoff_radius_sq();
            let w = lut.lookup(q);
            assert!(w <= prev);
            assert!(w > 0.0);
            prev = w;
        }
    }

    #[test]
    fn samples_gaussian_of_unnormalized_distance() {
        let lut = FilterLut::new(2.0, 4096);
        let w = lut.lookup(1.0);
        assert!((w - (-1.0f32).exp()).abs() < 2e-3);
    }

    #[test]
    fn out_of_range_queries_are_clamped() {
        let lut = FilterLut::new(1.0, 16);
        assert_eq!(lut.lookup(-5.0), 1.0);
        assert_eq!(lut.lookup(1e9), lut.lookup(0.999));
    }

    #[test]
    fn regenerate_rescales_table() {
        let mut lut = FilterLut::new(1.0, 128);
        lut.regenerate(3.0);
        assert_eq!(lut.len(), 128);
        assert_eq!(lut.cutoff_radius_sq(), 9.0);
        assert!((lut.lookup(4.0) - (-4.0f32).exp()).abs() < 0.01);
    }
}
