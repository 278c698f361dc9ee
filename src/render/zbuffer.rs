use rayon::prelude::*;

use super::{BlendThresholds, RenderSettings};
use crate::error::{SplatError, SplatResult};
use crate::math::Vec3;
use crate::surfel::{Material, SurfelId};

/// Depth sum of a cell that was never written.
pub const Z_EMPTY: f32 = 100_000.0;
/// Depth range bounds of a cell that was never written. Any real splat range
/// compares closer than this, so the first write always replaces.
pub const Z_RANGE_EMPTY: f32 = 1_000_000.0;
/// Remaining weight below which an unsplatted cell counts as empty.
pub const EMPTY_WEIGHT_EPSILON: f32 = 0.001;

/// Per-pixel accumulator: weighted sums plus the depth interval used for the
/// merge/replace decision. Sums are meaningless while `weight == 0`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ZBufferItem {
    pub weight: f32,
    pub z: f32,
    pub z_min: f32,
    pub z_max: f32,
    pub color: [f32; 3],
    pub normal: [f32; 3],
    /// Snapshot for per-pixel lighting; `None` means the color is final.
    pub material: Option<Material>,
    pub user_data: Option<SurfelId>,
}

impl ZBufferItem {
    pub const EMPTY: Self = Self {
        weight: 0.0,
        z: Z_EMPTY,
        z_min: Z_RANGE_EMPTY,
        z_max: Z_RANGE_EMPTY,
        color: [0.0; 3],
        normal: [0.0; 3],
        material: None,
        user_data: None,
    };

    pub fn is_covered(&self) -> bool {
        self.weight > 0.0
    }

    pub fn reset(&mut self) {
        *self = Self::EMPTY;
    }

    pub fn overlaps(&self, z_min: f32, z_max: f32) -> bool {
        z_max >= self.z_min && z_min <= self.z_max
    }

    pub fn normalized_color(&self) -> Option<[f32; 3]> {
        if !self.is_covered() {
            return None;
        }
        let inv = 1.0 / self.weight;
        Some([self.color[0] * inv, self.color[1] * inv, self.color[2] * inv])
    }

    pub fn normalized_depth(&self) -> Option<f32> {
        self.is_covered().then(|| self.z / self.weight)
    }

    /// Weighted mean normal, re-normalized to unit length.
    pub fn normalized_normal(&self) -> Option<Vec3> {
        if !self.is_covered() {
            return None;
        }
        Some(Vec3::from_array(self.normal).normalize())
    }
}

/// Scalar state cached for one warp pass.
#[derive(Debug, Clone, Copy)]
pub struct WriteContext {
    pub cutoff_radius: f32,
    pub cutoff_radius_sq: f32,
    pub inv_cutoff_radius_sq: f32,
    pub thresholds: BlendThresholds,
    pub width: usize,
    pub height: usize,
}

/// Buffer geometry cached for one shading pass.
#[derive(Debug, Clone, Copy)]
pub struct ReadContext {
    pub width: usize,
    pub height: usize,
}

#[derive(Debug, Clone)]
pub struct ZBuffer {
    items: Vec<ZBufferItem>,
    width: usize,
    height: usize,
    capacity_width: usize,
    capacity_height: usize,
}

impl ZBuffer {
    pub fn new(width: usize, height: usize) -> SplatResult<Self> {
        if width == 0 || height == 0 {
            return Err(SplatError::InvalidViewport { width, height });
        }
        tracing::info!("allocating z-buffer {}x{}", width, height);
        Ok(Self {
            items: vec![ZBufferItem::EMPTY; width * height],
            width,
            height,
            capacity_width: width,
            capacity_height: height,
        })
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn capacity(&self) -> (usize, usize) {
        (self.capacity_width, self.capacity_height)
    }

    pub fn clear(&mut self) {
        let len = self.width * self.height;
        self.items[..len]
            .par_iter_mut()
            .for_each(|item| *item = ZBufferItem::EMPTY);
    }

    /// Changes the logical size within the allocated capacity. Used to
    /// render at reduced resolution; contents are cleared.
    pub fn set_size(&mut self, width: usize, height: usize) -> SplatResult<()> {
        if width == 0 || height == 0 {
            return Err(SplatError::InvalidViewport { width, height });
        }
        if width > self.capacity_width || height > self.capacity_height {
            return Err(SplatError::ExceedsCapacity {
                width,
                height,
                capacity_width: self.capacity_width,
                capacity_height: self.capacity_height,
            });
        }
        self.width = width;
        self.height = height;
        self.clear();
        Ok(())
    }

    pub fn prepare_for_writing(&self, settings: &RenderSettings) -> WriteContext {
        let cutoff_radius_sq = settings.cutoff_radius * settings.cutoff_radius;
        WriteContext {
            cutoff_radius: settings.cutoff_radius,
            cutoff_radius_sq,
            inv_cutoff_radius_sq: 1.0 / cutoff_radius_sq,
            thresholds: settings.thresholds,
            width: self.width,
            height: self.height,
        }
    }

    pub fn prepare_for_reading(&self) -> ReadContext {
        ReadContext {
            width: self.width,
            height: self.height,
        }
    }

    /// Multiplies every accumulated sum by `factor`; normalized values stay
    /// unchanged. Cells are not reset even if their weight becomes tiny.
    pub fn scale_all_weights(&mut self, factor: f32) {
        let len = self.width * self.height;
        self.items[..len].par_iter_mut().for_each(|item| {
            if !item.is_covered() {
                return;
            }
            item.weight *= factor;
            item.z *= factor;
            for c in 0..3 {
                item.color[c] *= factor;
                item.normal[c] *= factor;
            }
        });
    }

    #[inline]
    pub fn index(&self, x: usize, y: usize) -> usize {
        y * self.width + x
    }

    /// Cell at buffer coordinates (origin lower-left).
    pub fn item(&self, x: usize, y: usize) -> Option<&ZBufferItem> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.items.get(self.index(x, y))
    }

    pub fn item_mut(&mut self, x: usize, y: usize) -> Option<&mut ZBufferItem> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = self.index(x, y);
        self.items.get_mut(idx)
    }

    /// Active cells, row-major from the bottom row.
    pub fn items(&self) -> &[ZBufferItem] {
        &self.items[..self.width * self.height]
    }

    pub fn items_mut(&mut self) -> &mut [ZBufferItem] {
        let len = self.width * self.height;
        &mut self.items[..len]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn covered_item(weight: f32, color: f32) -> ZBufferItem {
        ZBufferItem {
            weight,
            z: 3.0 * weight,
            z_min: 2.5,
            z_max: 3.5,
            color: [color; 3],
            normal: [0.0, 0.0, weight],
            ..ZBufferItem::EMPTY
        }
    }

    #[test]
    fn clear_restores_sentinels() {
        let mut zb = ZBuffer::new(3, 2).expect("zbuffer");
        *zb.item_mut(1, 1).expect("in range") = covered_item(1.0, 10.0);
        zb.clear();
        let item = zb.item(1, 1).expect("in range");
        assert_eq!(*item, ZBufferItem::EMPTY);
        assert_eq!(item.z_min, Z_RANGE_EMPTY);
        assert!(!item.is_covered());
    }

    #[test]
    fn scale_all_weights_keeps_normalized_color() {
        let mut zb = ZBuffer::new(2, 2).expect("zbuffer");
        *zb.item_mut(0, 0).expect("in range") = covered_item(2.0, 4.0);
        zb.scale_all_weights(0.5);
        let item = zb.item(0, 0).expect("in range");
        assert_eq!(item.weight, 1.0);
        assert_eq!(item.color, [2.0, 2.0, 2.0]);
        assert_eq!(item.normalized_color(), Some([2.0, 2.0, 2.0]));
        assert_eq!(item.normalized_depth(), Some(3.0));
        assert_eq!(*zb.item(1, 1).expect("in range"), ZBufferItem::EMPTY);
    }

    #[test]
    fn set_size_never_exceeds_capacity() {
        let mut zb = ZBuffer::new(8, 4).expect("zbuffer");
        assert!(zb.set_size(4, 2).is_ok());
        assert_eq!((zb.width(), zb.height()), (4, 2));
        assert_eq!(zb.items().len(), 8);
        assert!(matches!(zb.set_size(9, 2), Err(SplatError::ExceedsCapacity { .. })));
        assert!(zb.set_size(8, 4).is_ok());
        assert!(zb.item(7, 3).is_some());
        assert!(zb.item(8, 0).is_none());
    }

    #[test]
    fn sentinel_range_never_overlaps_real_depths() {
        let item = ZBufferItem::EMPTY;
        assert!(!item.overlaps(0.5, 200.0));
        assert!(item.overlaps(0.5, Z_RANGE_EMPTY));
    }

    #[test]
    fn write_context_caches_cutoff() {
        let zb = ZBuffer::new(2, 2).expect("zbuffer");
        let settings = RenderSettings {
            cutoff_radius: 2.0,
            ..RenderSettings::default()
        };
        let ctx = zb.prepare_for_writing(&settings);
        assert_eq!(ctx.cutoff_radius_sq, 4.0);
        assert_eq!(ctx.inv_cutoff_radius_sq, 0.25);
        assert_eq!(zb.prepare_for_reading().width, 2);
    }
}
