//! Attribute-driven frame buffer layered over the z-buffer item store.
//!
//! Every public `(x, y)` accessor uses an upper-left origin; the z-buffer
//! underneath is stored bottom-up. The flip happens once, in
//! [`ExtendedFrameBuffer::cell_index`].

use std::ops::{BitOr, BitOrAssign};

use super::zbuffer::{ZBuffer, ZBufferItem, Z_EMPTY};
use super::BoundingBox;
use crate::error::SplatResult;
use crate::math::Vec3;
use crate::surfel::{ObjectId, SurfelId};

/// Which per-pixel outputs a frame produces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Attributes(u8);

impl Attributes {
    pub const NONE: Self = Self(0);
    /// Weighted color, depth and normal sums. The z-buffer always
    /// accumulates them since the merge test and shading read them; the flag
    /// only reports that they are part of the frame's output.
    pub const COLOR_DEPTH_NORMAL_WEIGHT: Self = Self(1);
    /// Last surfel written per pixel, kept in the cell's `user_data`.
    pub const SINGLE_SURFEL: Self = Self(1 << 1);
    /// Every visible surfel per pixel.
    pub const VISIBLE_SURFELS: Self = Self(1 << 2);
    pub const OBJECT: Self = Self(1 << 3);
    /// Footprint record for every rasterized splat.
    pub const SPLAT_INFO: Self = Self(1 << 4);

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }

    pub fn bits(self) -> u8 {
        self.0
    }
}

impl BitOr for Attributes {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Attributes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.insert(rhs);
    }
}

/// Per-pixel identity lists, only maintained under the matching attributes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PixelEntry {
    pub visible: Vec<SurfelId>,
    pub object: Option<ObjectId>,
}

impl PixelEntry {
    pub fn reset(&mut self) {
        self.visible.clear();
        self.object = None;
    }
}

/// Exact rasterized footprint of one splat: `q = a dx^2 + b dx dy + c dy^2`
/// around `(x0, y0)` in buffer coordinates.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplatInfo {
    pub conic: [f32; 3],
    pub x0: f32,
    pub y0: f32,
    pub z: f32,
    pub z_min: f32,
    pub z_max: f32,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone)]
pub struct ExtendedFrameBuffer {
    zbuffer: ZBuffer,
    entries: Vec<PixelEntry>,
    attributes: Attributes,
    splat_surfels: Vec<SurfelId>,
    splat_tex_coords: Vec<[f32; 2]>,
    splat_infos: Vec<SplatInfo>,
}

impl ExtendedFrameBuffer {
    pub fn new(width: usize, height: usize) -> SplatResult<Self> {
        let zbuffer = ZBuffer::new(width, height)?;
        Ok(Self {
            zbuffer,
            entries: vec![PixelEntry::default(); width * height],
            attributes: Attributes::COLOR_DEPTH_NORMAL_WEIGHT | Attributes::SINGLE_SURFEL,
            splat_surfels: Vec::new(),
            splat_tex_coords: Vec::new(),
            splat_infos: Vec::new(),
        })
    }

    /// Reallocates all storage; every buffer content is lost.
    pub fn set_size(&mut self, width: usize, height: usize) -> SplatResult<()> {
        let zbuffer = ZBuffer::new(width, height)?;
        self.zbuffer = zbuffer;
        self.entries = vec![PixelEntry::default(); width * height];
        self.clear_splat_info();
        Ok(())
    }

    /// Shrinks the logical size inside the allocated capacity.
    pub fn set_logical_size(&mut self, width: usize, height: usize) -> SplatResult<()> {
        self.zbuffer.set_size(width, height)?;
        self.entries.iter_mut().for_each(PixelEntry::reset);
        self.clear_splat_info();
        Ok(())
    }

    pub fn width(&self) -> usize {
        self.zbuffer.width()
    }

    pub fn height(&self) -> usize {
        self.zbuffer.height()
    }

    pub fn zbuffer(&self) -> &ZBuffer {
        &self.zbuffer
    }

    pub fn zbuffer_mut(&mut self) -> &mut ZBuffer {
        &mut self.zbuffer
    }

    pub fn attributes(&self) -> Attributes {
        self.attributes
    }

    pub fn set_attributes(&mut self, attributes: Attributes) {
        self.attributes = attributes;
    }

    /// Clears the z-buffer, per-pixel lists and splat records for a new frame.
    pub fn reset(&mut self) {
        self.zbuffer.clear();
        if self.attributes.contains(Attributes::VISIBLE_SURFELS)
            || self.attributes.contains(Attributes::OBJECT)
        {
            let len = self.width() * self.height();
            self.entries[..len].iter_mut().for_each(PixelEntry::reset);
        }
        self.clear_splat_info();
    }

    fn clear_splat_info(&mut self) {
        self.splat_surfels.clear();
        self.splat_tex_coords.clear();
        self.splat_infos.clear();
    }

    /// Storage index for upper-left `(x, y)`.
    pub fn cell_index(&self, x: usize, y: usize) -> Option<usize> {
        let (w, h) = (self.width(), self.height());
        if x >= w || y >= h {
            return None;
        }
        Some(self.zbuffer.index(x, h - 1 - y))
    }

    fn item(&self, x: usize, y: usize) -> Option<&ZBufferItem> {
        let idx = self.cell_index(x, y)?;
        self.zbuffer.items().get(idx)
    }

    fn item_mut(&mut self, x: usize, y: usize) -> Option<&mut ZBufferItem> {
        let idx = self.cell_index(x, y)?;
        self.zbuffer.items_mut().get_mut(idx)
    }

    fn entry_mut(&mut self, x: usize, y: usize) -> Option<&mut PixelEntry> {
        let idx = self.cell_index(x, y)?;
        self.entries.get_mut(idx)
    }

    /// Split borrow used by the rasterizer: active cells and entries.
    pub(crate) fn cells_mut(&mut self) -> (&mut [ZBufferItem], &mut [PixelEntry]) {
        let len = self.width() * self.height();
        (self.zbuffer.items_mut(), &mut self.entries[..len])
    }

    pub(crate) fn push_splat_info(&mut self, surfel: SurfelId, info: SplatInfo) {
        let u = info.x0 / self.width() as f32;
        let v = 1.0 - info.y0 / self.height() as f32;
        self.splat_surfels.push(surfel);
        self.splat_tex_coords.push([u, v]);
        self.splat_infos.push(info);
    }

    pub fn color(&self, x: usize, y: usize) -> Option<[f32; 3]> {
        self.item(x, y)?.normalized_color()
    }

    /// Stores `rgb` as the normalized color. An uncovered pixel becomes
    /// covered with unit weight.
    pub fn set_color(&mut self, x: usize, y: usize, rgb: [f32; 3]) -> bool {
        let Some(item) = self.item_mut(x, y) else {
            return false;
        };
        let w = ensure_weight(item);
        item.color = [rgb[0] * w, rgb[1] * w, rgb[2] * w];
        true
    }

    pub fn depth(&self, x: usize, y: usize) -> Option<f32> {
        self.item(x, y)?.normalized_depth()
    }

    pub fn set_depth(&mut self, x: usize, y: usize, z: f32) -> bool {
        let Some(item) = self.item_mut(x, y) else {
            return false;
        };
        let w = ensure_weight(item);
        item.z = z * w;
        true
    }

    pub fn normal(&self, x: usize, y: usize) -> Option<Vec3> {
        self.item(x, y)?.normalized_normal()
    }

    pub fn set_normal(&mut self, x: usize, y: usize, n: Vec3) -> bool {
        let Some(item) = self.item_mut(x, y) else {
            return false;
        };
        let w = ensure_weight(item);
        item.normal = (n * w).to_array();
        true
    }

    pub fn weight(&self, x: usize, y: usize) -> Option<f32> {
        self.item(x, y).map(|item| item.weight)
    }

    /// Sets the accumulated weight, rescaling the sums so normalized values
    /// are preserved. A non-positive weight empties the pixel.
    pub fn set_weight(&mut self, x: usize, y: usize, weight: f32) -> bool {
        let Some(item) = self.item_mut(x, y) else {
            return false;
        };
        if weight <= 0.0 {
            item.reset();
        } else if item.is_covered() {
            let f = weight / item.weight;
            item.weight = weight;
            item.z *= f;
            for c in 0..3 {
                item.color[c] *= f;
                item.normal[c] *= f;
            }
        } else {
            item.weight = weight;
            item.z = Z_EMPTY * weight;
        }
        true
    }

    pub fn add_visible_surfel(&mut self, x: usize, y: usize, surfel: SurfelId) -> bool {
        match self.entry_mut(x, y) {
            Some(entry) => {
                entry.visible.push(surfel);
                true
            }
            None => false,
        }
    }

    /// Valid only for frames rendered with [`Attributes::VISIBLE_SURFELS`].
    pub fn visible_surfels(&self, x: usize, y: usize) -> &[SurfelId] {
        match self.cell_index(x, y) {
            Some(idx) => &self.entries[idx].visible,
            None => &[],
        }
    }

    /// Capacity hint before appending many surfels to one pixel.
    pub fn reserve_visible(&mut self, x: usize, y: usize, additional: usize) {
        if let Some(entry) = self.entry_mut(x, y) {
            entry.visible.reserve(additional);
        }
    }

    pub fn reset_position(&mut self, x: usize, y: usize) {
        if let Some(entry) = self.entry_mut(x, y) {
            entry.reset();
        }
    }

    /// Valid only under [`Attributes::SINGLE_SURFEL`].
    pub fn surfel(&self, x: usize, y: usize) -> Option<SurfelId> {
        self.item(x, y)?.user_data
    }

    pub fn set_surfel(&mut self, x: usize, y: usize, surfel: Option<SurfelId>) -> bool {
        match self.item_mut(x, y) {
            Some(item) => {
                item.user_data = surfel;
                true
            }
            None => false,
        }
    }

    /// Valid only under [`Attributes::OBJECT`].
    pub fn object(&self, x: usize, y: usize) -> Option<ObjectId> {
        let idx = self.cell_index(x, y)?;
        self.entries[idx].object
    }

    pub fn set_object(&mut self, x: usize, y: usize, object: Option<ObjectId>) -> bool {
        match self.entry_mut(x, y) {
            Some(entry) => {
                entry.object = object;
                true
            }
            None => false,
        }
    }

    pub fn is_pixel_covered(&self, x: usize, y: usize) -> bool {
        self.item(x, y).is_some_and(ZBufferItem::is_covered)
    }

    pub fn all_pixels_covered(&self) -> bool {
        self.zbuffer.items().iter().all(ZBufferItem::is_covered)
    }

    pub fn covered_pixel_count(&self) -> usize {
        self.zbuffer.items().iter().filter(|item| item.is_covered()).count()
    }

    pub fn nof_splat_info_entries(&self) -> usize {
        self.splat_infos.len()
    }

    pub fn splat_info_surfels(&self) -> &[SurfelId] {
        &self.splat_surfels
    }

    /// Normalized footprint centers, upper-left origin.
    pub fn splat_info_tex_coords(&self) -> &[[f32; 2]] {
        &self.splat_tex_coords
    }

    pub fn splat_infos(&self) -> &[SplatInfo] {
        &self.splat_infos
    }

    /// Unique surfels present in any per-pixel list, sorted by id.
    pub fn collect_visible_surfels(&self) -> Vec<SurfelId> {
        let len = self.width() * self.height();
        let mut ids: Vec<SurfelId> = self.entries[..len]
            .iter()
            .flat_map(|entry| entry.visible.iter().copied())
            .collect();
        ids.sort_unstable();
        ids.dedup();
        ids
    }
}

fn ensure_weight(item: &mut ZBufferItem) -> f32 {
    if !item.is_covered() {
        item.weight = 1.0;
        item.z = Z_EMPTY;
    }
    item.weight
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attributes_combine_as_flags() {
        let mut a = Attributes::COLOR_DEPTH_NORMAL_WEIGHT | Attributes::OBJECT;
        assert!(a.contains(Attributes::OBJECT));
        assert!(!a.contains(Attributes::VISIBLE_SURFELS));
        a |= Attributes::VISIBLE_SURFELS;
        assert!(a.contains(Attributes::VISIBLE_SURFELS | Attributes::OBJECT));
        a.remove(Attributes::OBJECT);
        assert!(!a.contains(Attributes::OBJECT));
    }

    #[test]
    fn accessors_use_upper_left_origin() {
        let mut fb = ExtendedFrameBuffer::new(4, 3).expect("frame buffer");
        assert!(fb.set_color(1, 0, [10.0, 20.0, 30.0]));
        // Top row of the image is the last row of the z-buffer.
        let item = fb.zbuffer().item(1, 2).expect("in range");
        assert!(item.is_covered());
        assert_eq!(fb.color(1, 0), Some([10.0, 20.0, 30.0]));
        assert!(!fb.is_pixel_covered(1, 2));
        assert!(!fb.set_color(4, 0, [0.0; 3]));
    }

    #[test]
    fn set_weight_preserves_normalized_values() {
        let mut fb = ExtendedFrameBuffer::new(2, 2).expect("frame buffer");
        fb.set_color(0, 0, [100.0, 50.0, 0.0]);
        fb.set_depth(0, 0, 4.0);
        fb.set_weight(0, 0, 3.0);
        assert_eq!(fb.weight(0, 0), Some(3.0));
        assert_eq!(fb.color(0, 0), Some([100.0, 50.0, 0.0]));
        assert_eq!(fb.depth(0, 0), Some(4.0));
        fb.set_weight(0, 0, 0.0);
        assert!(!fb.is_pixel_covered(0, 0));
        assert_eq!(fb.color(0, 0), None);
    }

    #[test]
    fn visible_lists_grow_and_reset() {
        let mut fb = ExtendedFrameBuffer::new(2, 2).expect("frame buffer");
        fb.set_attributes(Attributes::VISIBLE_SURFELS | Attributes::OBJECT);
        fb.reserve_visible(1, 1, 8);
        fb.add_visible_surfel(1, 1, SurfelId(4));
        fb.add_visible_surfel(1, 1, SurfelId(2));
        fb.add_visible_surfel(0, 0, SurfelId(4));
        fb.set_object(1, 1, Some(ObjectId(7)));
        assert_eq!(fb.visible_surfels(1, 1), &[SurfelId(4), SurfelId(2)]);
        assert_eq!(fb.collect_visible_surfels(), vec![SurfelId(2), SurfelId(4)]);
        assert_eq!(fb.object(1, 1), Some(ObjectId(7)));

        fb.reset_position(1, 1);
        assert!(fb.visible_surfels(1, 1).is_empty());
        assert_eq!(fb.object(1, 1), None);

        fb.reset();
        assert!(fb.visible_surfels(0, 0).is_empty());
    }

    #[test]
    fn all_pixels_covered_requires_every_cell() {
        let mut fb = ExtendedFrameBuffer::new(2, 1).expect("frame buffer");
        fb.set_color(0, 0, [1.0; 3]);
        assert!(!fb.all_pixels_covered());
        fb.set_color(1, 0, [1.0; 3]);
        assert!(fb.all_pixels_covered());
        assert_eq!(fb.covered_pixel_count(), 2);
    }

    #[test]
    fn set_size_invalidates_contents() {
        let mut fb = ExtendedFrameBuffer::new(2, 2).expect("frame buffer");
        fb.set_color(0, 0, [1.0; 3]);
        fb.set_size(5, 3).expect("resize");
        assert_eq!((fb.width(), fb.height()), (5, 3));
        assert!(!fb.is_pixel_covered(0, 0));
        assert!(fb.set_size(0, 3).is_err());
    }
}
