use rayon::prelude::*;

use super::footprint::ViewportMapping;
use super::frame_buffer::ExtendedFrameBuffer;
use super::image::Image;
use super::lighting::{self, Light};
use super::zbuffer::ZBufferItem;
use super::{BoundingBox, RenderSettings, ShadingMode, SpecularModel};
use crate::math::{pack_rgb_f32, Vec3};

/// Shading state cached by `prepare` for the sweeps of one frame.
#[derive(Debug, Clone)]
pub struct Shader {
    lights: Vec<Light>,
    shading: ShadingMode,
    specular: SpecularModel,
    background: u32,
    mapping: ViewportMapping,
}

impl Shader {
    pub fn new(mapping: ViewportMapping) -> Self {
        Self {
            lights: Vec::new(),
            shading: ShadingMode::default(),
            specular: SpecularModel::default(),
            background: 0,
            mapping,
        }
    }

    /// `lights` are in view space; `mapping` is that of the z-buffer's
    /// logical size.
    pub fn prepare(
        &mut self,
        settings: &RenderSettings,
        lights: &[Light],
        mapping: ViewportMapping,
    ) {
        self.lights.clear();
        self.lights.extend_from_slice(lights);
        self.shading = settings.shading;
        self.specular = settings.specular;
        self.background = settings.background;
        self.mapping = mapping;
    }

    pub fn background(&self) -> u32 {
        self.background
    }

    /// Final color of one cell at buffer position `(x, y)` (lower-left),
    /// or `None` when uncovered.
    pub fn shade_item(&self, item: &ZBufferItem, x: usize, y: usize) -> Option<u32> {
        let rgb = item.normalized_color()?;
        let rgb = match (self.shading, item.material) {
            (ShadingMode::PerPixel, Some(material)) => {
                let normal = item.normalized_normal()?;
                let z = item.normalized_depth()?;
                let ray = self.mapping.view_ray(x as f32 + 0.5, y as f32 + 0.5);
                let view = -ray.normalize();
                let normal = if normal == Vec3::ZERO { view } else { normal };
                lighting::shade(ray * z, normal, view, rgb, &material, &self.lights, self.specular)
            }
            _ => rgb,
        };
        Some(pack_rgb_f32(rgb))
    }

    /// Writes the cells inside `bbox` into `image`, blowing each one up to a
    /// `magnification x magnification` block and flipping rows to the
    /// image's top-left origin. When the magnified buffer overshoots the
    /// image, the overshoot is cropped evenly from both sides so the
    /// projection center stays put. Pixels outside `bbox` are left
    /// untouched; the z-buffer is only read.
    pub fn shade_frame(
        &self,
        fb: &ExtendedFrameBuffer,
        bbox: BoundingBox,
        image: &mut Image,
        magnification: usize,
    ) {
        let zb = fb.zbuffer();
        let read = zb.prepare_for_reading();
        let bbox = bbox.clip(read.width, read.height);
        if bbox.is_empty() || image.width() == 0 {
            return;
        }
        let m = magnification.max(1);
        let image_width = image.width();
        let crop_x = (read.width * m).saturating_sub(image_width) / 2;
        let crop_y = (read.height * m).saturating_sub(image.height()) / 2;
        let items = zb.items();

        // The first block loses `crop_y` rows; every later one is `m` rows.
        let pixels = image.pixels_mut();
        let head_len = ((m - crop_y.min(m)) * image_width).min(pixels.len());
        let (head, rest) = pixels.split_at_mut(head_len);

        rayon::iter::once(head)
            .chain(rest.par_chunks_mut(image_width * m))
            .enumerate()
            .for_each(|(flipped_row, block)| {
                if flipped_row >= read.height {
                    return;
                }
                let y = read.height - 1 - flipped_row;
                if (y as i32) < bbox.y_min || (y as i32) > bbox.y_max {
                    return;
                }
                for x in bbox.x_min as usize..=bbox.x_max as usize {
                    let x0 = (x * m).saturating_sub(crop_x);
                    if x0 >= image_width {
                        break;
                    }
                    let x1 = ((x + 1) * m - crop_x).min(image_width);
                    if x1 <= x0 {
                        continue;
                    }
                    let item = &items[y * read.width + x];
                    let color = self.shade_item(item, x, y).unwrap_or(self.background);
                    for row in block.chunks_mut(image_width) {
                        row[x0..x1].fill(color);
                    }
                }
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Frustum;
    use crate::surfel::Material;

    fn mapping(size: usize) -> ViewportMapping {
        let frustum = Frustum::new(1.0, 1.0, 0.1, 10.0).expect("frustum");
        ViewportMapping::new(&frustum, size, size)
    }

    fn unlit_shader(size: usize) -> Shader {
        let mut shader = Shader::new(mapping(size));
        let settings = RenderSettings {
            shading: ShadingMode::Unlit,
            background: 0x11_22_33,
            ..RenderSettings::default()
        };
        shader.prepare(&settings, &[], mapping(size));
        shader
    }

    #[test]
    fn flips_rows_and_paints_background() {
        let mut fb = ExtendedFrameBuffer::new(2, 2).expect("frame buffer");
        // Upper-left pixel, stored in the top buffer row.
        fb.set_color(0, 0, [255.0, 0.0, 0.0]);
        let shader = unlit_shader(2);
        let mut image = Image::new(2, 2, 0);
        shader.shade_frame(&fb, BoundingBox::full(2, 2), &mut image, 1);
        assert_eq!(image.pixel(0, 0), Some(0xFF_00_00));
        assert_eq!(image.pixel(1, 0), Some(0x11_22_33));
        assert_eq!(image.pixel(0, 1), Some(0x11_22_33));
    }

    #[test]
    fn magnification_fills_blocks() {
        let mut fb = ExtendedFrameBuffer::new(4, 4).expect("frame buffer");
        fb.set_logical_size(2, 2).expect("within capacity");
        fb.set_color(1, 1, [0.0, 255.0, 0.0]);
        let shader = unlit_shader(2);
        let mut image = Image::new(4, 4, 0);
        shader.shade_frame(&fb, BoundingBox::full(2, 2), &mut image, 2);
        for (x, y) in [(2, 2), (3, 2), (2, 3), (3, 3)] {
            assert_eq!(image.pixel(x, y), Some(0x00_FF_00), "pixel {x},{y}");
        }
        assert_eq!(image.pixel(1, 1), Some(0x11_22_33));
    }

    #[test]
    fn uneven_magnification_crops_both_sides_evenly() {
        // 10 px at m = 4: 3 logical cells span 12 px, one cropped per side.
        let mut fb = ExtendedFrameBuffer::new(10, 10).expect("frame buffer");
        fb.set_logical_size(3, 3).expect("within capacity");
        fb.set_color(0, 0, [255.0, 0.0, 0.0]);
        fb.set_color(1, 1, [0.0, 255.0, 0.0]);
        fb.set_color(2, 2, [0.0, 0.0, 255.0]);
        let shader = unlit_shader(3);
        let mut image = Image::new(10, 10, 0);
        shader.shade_frame(&fb, BoundingBox::full(3, 3), &mut image, 4);

        // Corner cells keep 3 px, the center cell its full 4 px, centered.
        for (x, y) in [(0, 0), (2, 2)] {
            assert_eq!(image.pixel(x, y), Some(0xFF_00_00), "pixel {x},{y}");
        }
        for (x, y) in [(3, 3), (6, 6), (3, 6), (6, 3)] {
            assert_eq!(image.pixel(x, y), Some(0x00_FF_00), "pixel {x},{y}");
        }
        assert_eq!(image.pixel(2, 3), Some(0x11_22_33));
        assert_eq!(image.pixel(7, 7), Some(0x00_00_FF));
        assert_eq!(image.pixel(9, 9), Some(0x00_00_FF));
    }

    #[test]
    fn outside_bbox_is_untouched_and_sweep_is_repeatable() {
        let mut fb = ExtendedFrameBuffer::new(3, 1).expect("frame buffer");
        fb.set_color(2, 0, [10.0, 20.0, 30.0]);
        let shader = unlit_shader(3);
        let mut image = Image::new(3, 1, 0xAB_AB_AB);
        shader.shade_frame(&fb, BoundingBox::new(1, 0, 2, 0), &mut image, 1);
        let first = image.clone();
        shader.shade_frame(&fb, BoundingBox::new(1, 0, 2, 0), &mut image, 1);
        assert_eq!(image, first);
        assert_eq!(image.pixel(0, 0), Some(0xAB_AB_AB));
        assert_eq!(image.pixel(1, 0), Some(0x11_22_33));
        assert_eq!(image.pixel(2, 0), Some(0x0A_14_1E));
    }

    #[test]
    fn per_pixel_shading_uses_material_snapshot() {
        let mut fb = ExtendedFrameBuffer::new(1, 1).expect("frame buffer");
        fb.set_color(0, 0, [100.0, 100.0, 100.0]);
        fb.set_normal(0, 0, Vec3::new(0.0, 0.0, -1.0));
        fb.set_depth(0, 0, 2.0);
        let idx = fb.cell_index(0, 0).expect("in range");
        fb.zbuffer_mut().items_mut()[idx].material = Some(Material {
            ambient: 0.5,
            diffuse: 0.0,
            specular: 0.0,
            shininess: 1.0,
            specular_color: 0,
        });
        let settings = RenderSettings {
            shading: ShadingMode::PerPixel,
            ..RenderSettings::default()
        };
        let mut shader = Shader::new(mapping(1));
        shader.prepare(&settings, &[Light::directional(Vec3::new(0.0, 0.0, -1.0))], mapping(1));
        let mut image = Image::new(1, 1, 0);
        shader.shade_frame(&fb, BoundingBox::full(1, 1), &mut image, 1);
        assert_eq!(image.pixel(0, 0), Some(0x32_32_32));
    }
}
