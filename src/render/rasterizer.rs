use super::filter::FilterLut;
use super::footprint::{elliptical_footprint, surface_footprint, Footprint, Rejection, SplatInput};
use super::frame_buffer::{Attributes, ExtendedFrameBuffer, PixelEntry, SplatInfo};
use super::lighting::{self, Light};
use super::zbuffer::{WriteContext, ZBufferItem, EMPTY_WEIGHT_EPSILON};
use super::{BoundingBox, RenderSettings, ShadingMode};
use crate::surfel::{Material, ObjectId, Surfel, SurfelId, TangentClip};

pub const FLIPPED_NORMAL_COLOR: [f32; 3] = [255.0, 0.0, 255.0];

/// Active splat strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SplatFunction {
    #[default]
    Additive,
    /// Removes a contribution previously made by `Additive`.
    Subtractive,
    /// Uses explicit tangent axes and the optional clip half-plane.
    Elliptical,
}

impl SplatFunction {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Additive => "Additive",
            Self::Subtractive => "Subtractive",
            Self::Elliptical => "Elliptical",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SplatOutcome {
    /// Clipped bounding box that was swept.
    Rasterized(BoundingBox),
    BackFacing,
    Degenerate,
    /// Footprint entirely outside the buffer.
    Clipped,
}

impl From<Rejection> for SplatOutcome {
    fn from(rejection: Rejection) -> Self {
        match rejection {
            Rejection::BackFacing => Self::BackFacing,
            Rejection::Degenerate => Self::Degenerate,
        }
    }
}

/// Everything a splat call reads besides the surfel itself; built once per
/// warp pass.
#[derive(Debug, Clone, Copy)]
pub struct RasterContext<'a> {
    pub settings: &'a RenderSettings,
    pub write: WriteContext,
    pub lut: &'a FilterLut,
    /// View-space lights.
    pub lights: &'a [Light],
}

// --- Color resolution ---

/// Color written into the cells, plus the material snapshot when lighting is
/// deferred to the shading sweep.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplatColor {
    pub rgb: [f32; 3],
    pub material: Option<Material>,
}

pub fn resolve_color(surfel: &Surfel, fp: &Footprint, ctx: &RasterContext) -> SplatColor {
    let settings = ctx.settings;
    if fp.flipped && settings.debug_flipped_normals {
        return SplatColor {
            rgb: FLIPPED_NORMAL_COLOR,
            material: None,
        };
    }
    if surfel.flags.covered && settings.apply_shadows {
        return SplatColor {
            rgb: [0.0; 3],
            material: None,
        };
    }

    let mut rgb = surfel.diffuse_rgb();
    if settings.show_selection {
        rgb = tint_selection(rgb, surfel);
    }

    match settings.shading {
        ShadingMode::Unlit => SplatColor { rgb, material: None },
        ShadingMode::PerSurfel => SplatColor {
            rgb: lighting::shade(
                fp.position,
                fp.normal,
                fp.view,
                rgb,
                &surfel.material,
                ctx.lights,
                settings.specular,
            ),
            material: None,
        },
        ShadingMode::PerPixel => SplatColor {
            rgb,
            material: Some(surfel.material),
        },
    }
}

/// Selection tiers halve the two channels other than their bias channel:
/// tier 1 blue, tier 2 red, tier 3 green. Emphasised surfels are lightened.
pub fn tint_selection(rgb: [f32; 3], surfel: &Surfel) -> [f32; 3] {
    let [mut r, mut g, mut b] = rgb;
    let flags = surfel.flags;
    if flags.selected1 {
        r *= 0.5;
        g *= 0.5;
    } else if flags.selected2 {
        g *= 0.5;
        b *= 0.5;
    } else if flags.selected3 {
        r *= 0.5;
        b *= 0.5;
    }
    if flags.emphasise {
        r = (r + 255.0) * 0.5;
        g = (g + 255.0) * 0.5;
        b = (b + 255.0) * 0.5;
    }
    [r, g, b]
}

// --- Splatting ---

/// Rasterizes one surfel with the given strategy.
pub fn splat(
    function: SplatFunction,
    ctx: &RasterContext,
    fb: &mut ExtendedFrameBuffer,
    input: &SplatInput,
    surfel: &Surfel,
    id: SurfelId,
    object: Option<ObjectId>,
) -> SplatOutcome {
    let footprint = match function {
        SplatFunction::Additive | SplatFunction::Subtractive => {
            surface_footprint(input, surfel.radius, ctx.settings, &ctx.write)
        }
        SplatFunction::Elliptical => {
            elliptical_footprint(input, surfel.radius, ctx.settings, &ctx.write)
        }
    };
    let fp = match footprint {
        Ok(fp) => fp,
        Err(rejection) => return rejection.into(),
    };

    let bbox = fp.bbox.clip(fb.width(), fb.height());
    if bbox.is_empty() {
        return SplatOutcome::Clipped;
    }

    let color = resolve_color(surfel, &fp, ctx);
    let unclipped = bbox == fp.bbox;
    match function {
        SplatFunction::Additive | SplatFunction::Elliptical => {
            if unclipped {
                record_splat(fb, &fp, id);
            }
            let clip = match function {
                SplatFunction::Elliptical => surfel.clip,
                _ => None,
            };
            accumulate(ctx, fb, &fp, bbox, &color, id, object, clip);
        }
        SplatFunction::Subtractive => remove(ctx, fb, &fp, bbox, &color, id),
    }
    SplatOutcome::Rasterized(bbox)
}

/// Only footprints that lie entirely inside the buffer are recorded.
fn record_splat(fb: &mut ExtendedFrameBuffer, fp: &Footprint, id: SurfelId) {
    if !fb.attributes().contains(Attributes::SPLAT_INFO) {
        return;
    }
    fb.push_splat_info(
        id,
        SplatInfo {
            conic: fp.conic,
            x0: fp.x0,
            y0: fp.y0,
            z: fp.z,
            z_min: fp.z_min,
            z_max: fp.z_max,
            bbox: fp.bbox,
        },
    );
}

/// Visits every pixel center of `bbox` with `q < cutoff^2`, evaluating the
/// conic by forward differences. `visit(index, q, dx, dy)`.
fn sweep(
    fp: &Footprint,
    bbox: BoundingBox,
    width: usize,
    cutoff_radius_sq: f32,
    mut visit: impl FnMut(usize, f32, f32, f32),
) {
    let [a, b, c] = fp.conic;
    let ddq = 2.0 * a;
    for y in bbox.y_min..=bbox.y_max {
        let dy = y as f32 + 0.5 - fp.y0;
        let mut dx = bbox.x_min as f32 + 0.5 - fp.x0;
        let mut q = a * dx * dx + b * dx * dy + c * dy * dy;
        let mut dq = a * (2.0 * dx + 1.0) + b * dy;
        let row = y as usize * width;
        for x in bbox.x_min..=bbox.x_max {
            if q < cutoff_radius_sq {
                visit(row + x as usize, q, dx, dy);
            }
            q += dq;
            dq += ddq;
            dx += 1.0;
        }
    }
}

#[allow(clippy::too_many_arguments)]
fn accumulate(
    ctx: &RasterContext,
    fb: &mut ExtendedFrameBuffer,
    fp: &Footprint,
    bbox: BoundingBox,
    color: &SplatColor,
    id: SurfelId,
    object: Option<ObjectId>,
    clip: Option<TangentClip>,
) {
    let width = fb.width();
    let attributes = fb.attributes();
    let track_visible = attributes.contains(Attributes::VISIBLE_SURFELS);
    let track_object = attributes.contains(Attributes::OBJECT);
    let track_surfel = attributes.contains(Attributes::SINGLE_SURFEL);
    let normal = fp.normal.to_array();
    let (items, entries) = fb.cells_mut();

    sweep(fp, bbox, width, ctx.write.cutoff_radius_sq, |idx, q, dx, dy| {
        if let Some(clip) = clip {
            let (u, v) = fp.tangent_coords(dx, dy);
            if !clip.keeps(u, v) {
                return;
            }
        }
        let weight = ctx.lut.lookup(q) * fp.det;
        let z = fp.z + fp.dz_dx * dx + fp.dz_dy * dy;
        let cell = &mut items[idx];
        let entry = &mut entries[idx];

        // Empty cells hold sentinel ranges; never merge into them.
        if cell.is_covered() && cell.overlaps(fp.z_min, fp.z_max) {
            cell.z_min = cell.z_min.min(fp.z_min);
            cell.z_max = cell.z_max.max(fp.z_max);
            cell.weight += weight;
            cell.z += z * weight;
            for c in 0..3 {
                cell.color[c] += color.rgb[c] * weight;
                cell.normal[c] += normal[c] * weight;
            }
        } else if !cell.is_covered() || fp.z_min < cell.z_min {
            *cell = ZBufferItem {
                weight,
                z: z * weight,
                z_min: fp.z_min,
                z_max: fp.z_max,
                color: color.rgb.map(|v| v * weight),
                normal: normal.map(|v| v * weight),
                material: None,
                user_data: None,
            };
            if track_visible || track_object {
                entry.reset();
            }
        } else {
            return;
        }

        cell.material = color.material;
        if track_surfel {
            cell.user_data = Some(id);
        }
        if track_visible {
            entry.visible.push(id);
        }
        if track_object {
            entry.object = object;
        }
    });
}

fn remove(
    ctx: &RasterContext,
    fb: &mut ExtendedFrameBuffer,
    fp: &Footprint,
    bbox: BoundingBox,
    color: &SplatColor,
    id: SurfelId,
) {
    let width = fb.width();
    let track_visible = fb.attributes().contains(Attributes::VISIBLE_SURFELS);
    let normal = fp.normal.to_array();
    let (items, entries) = fb.cells_mut();

    sweep(fp, bbox, width, ctx.write.cutoff_radius_sq, |idx, q, dx, dy| {
        let cell = &mut items[idx];
        if !cell.is_covered() || !cell.overlaps(fp.z_min, fp.z_max) {
            return;
        }
        let weight = ctx.lut.lookup(q) * fp.det;
        let z = fp.z + fp.dz_dx * dx + fp.dz_dy * dy;
        cell.weight -= weight;
        if cell.weight < EMPTY_WEIGHT_EPSILON {
            cell.reset();
            entries[idx].reset();
            return;
        }
        cell.z -= z * weight;
        for c in 0..3 {
            cell.color[c] -= color.rgb[c] * weight;
            cell.normal[c] -= normal[c] * weight;
        }
        if cell.user_data == Some(id) {
            cell.user_data = None;
        }
        if track_visible {
            remove_visible(&mut entries[idx], id);
        }
    });
}

fn remove_visible(entry: &mut PixelEntry, id: SurfelId) {
    if let Some(pos) = entry.visible.iter().position(|&s| s == id) {
        entry.visible.swap_remove(pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::Frustum;
    use crate::math::Vec3;
    use crate::render::footprint::ViewportMapping;

    const SIZE: usize = 64;

    struct Fixture {
        settings: RenderSettings,
        lut: FilterLut,
        fb: ExtendedFrameBuffer,
        mapping: ViewportMapping,
    }

    impl Fixture {
        fn new(settings: RenderSettings) -> Self {
            let frustum = Frustum::new(2.0 * 0.5f32.atan(), 1.0, 0.1, 100.0).expect("frustum");
            Self {
                lut: FilterLut::new(settings.cutoff_radius, settings.lut_size),
                settings,
                fb: ExtendedFrameBuffer::new(SIZE, SIZE).expect("frame buffer"),
                mapping: ViewportMapping::new(&frustum, SIZE, SIZE),
            }
        }

        fn input(&self, x0: f32, y0: f32, z: f32) -> SplatInput {
            SplatInput {
                x0,
                y0,
                z,
                normal: Vec3::new(0.0, 0.0, -1.0),
                axes: None,
                lod: 0,
                stoo_scaling: self.mapping.screen_to_camera(),
                otoc_scaling: 1.0,
                mapping: self.mapping,
            }
        }

        fn splat(
            &mut self,
            function: SplatFunction,
            input: &SplatInput,
            surfel: &Surfel,
            id: u32,
        ) -> SplatOutcome {
            let ctx = RasterContext {
                settings: &self.settings,
                write: self.fb.zbuffer().prepare_for_writing(&self.settings),
                lut: &self.lut,
                lights: &[],
            };
            splat(function, &ctx, &mut self.fb, input, surfel, SurfelId(id), Some(ObjectId(7)))
        }
    }

    fn unlit() -> RenderSettings {
        RenderSettings {
            shading: ShadingMode::Unlit,
            ..RenderSettings::default()
        }
    }

    fn assert_color(actual: Option<[f32; 3]>, expected: [f32; 3]) {
        let actual = actual.expect("covered");
        for c in 0..3 {
            assert!((actual[c] - expected[c]).abs() < 1e-3, "{actual:?} vs {expected:?}");
        }
    }

    fn disc(color: u32) -> Surfel {
        Surfel::new(Vec3::ZERO, Vec3::Z, 0.25, color)
    }

    #[test]
    fn additive_splat_covers_center_with_surfel_color() {
        let mut f = Fixture::new(unlit());
        let input = f.input(32.0, 32.0, 4.0);
        let outcome = f.splat(SplatFunction::Additive, &input, &disc(0xC8_64_32), 3);
        let SplatOutcome::Rasterized(bbox) = outcome else {
            panic!("expected rasterization, got {outcome:?}");
        };
        assert!(bbox.contains(31, 31));
        let color = f.fb.color(31, 31).expect("covered");
        assert!((color[0] - 200.0).abs() < 1e-3);
        assert!((color[1] - 100.0).abs() < 1e-3);
        assert_eq!(f.fb.surfel(31, 31), Some(SurfelId(3)));
        assert!(!f.fb.is_pixel_covered(0, 0));
    }

    #[test]
    fn closer_disjoint_splat_replaces_and_farther_is_discarded() {
        let mut f = Fixture::new(unlit());
        let red = disc(0xFF_00_00);
        let blue = disc(0x00_00_FF);
        f.splat(SplatFunction::Additive, &f.input(32.0, 32.0, 6.0), &red, 0);
        f.splat(SplatFunction::Additive, &f.input(32.0, 32.0, 4.0), &blue, 1);
        assert_color(f.fb.color(31, 31), [0.0, 0.0, 255.0]);
        f.splat(SplatFunction::Additive, &f.input(32.0, 32.0, 8.0), &red, 2);
        assert_color(f.fb.color(31, 31), [0.0, 0.0, 255.0]);
        assert_eq!(f.fb.surfel(31, 31), Some(SurfelId(1)));
    }

    #[test]
    fn overlapping_ranges_merge_and_track_visible_surfels() {
        let mut f = Fixture::new(unlit());
        f.fb.set_attributes(
            Attributes::COLOR_DEPTH_NORMAL_WEIGHT
                | Attributes::VISIBLE_SURFELS
                | Attributes::OBJECT,
        );
        f.splat(SplatFunction::Additive, &f.input(32.0, 32.0, 4.0), &disc(0xFF_00_00), 0);
        f.splat(SplatFunction::Additive, &f.input(32.0, 32.0, 4.05), &disc(0x00_00_FF), 1);
        let color = f.fb.color(31, 31).expect("covered");
        assert!(color[0] > 100.0 && color[2] > 100.0, "blended {color:?}");
        assert_eq!(f.fb.visible_surfels(31, 31), &[SurfelId(0), SurfelId(1)]);
        assert_eq!(f.fb.object(31, 31), Some(ObjectId(7)));
    }

    #[test]
    fn unsplat_restores_empty_cells() {
        let mut f = Fixture::new(unlit());
        f.fb.set_attributes(Attributes::COLOR_DEPTH_NORMAL_WEIGHT | Attributes::VISIBLE_SURFELS);
        let input = f.input(30.3, 33.7, 4.0);
        let surfel = disc(0x40_80_C0);
        f.splat(SplatFunction::Additive, &input, &surfel, 5);
        assert!(f.fb.covered_pixel_count() > 0);
        f.splat(SplatFunction::Subtractive, &input, &surfel, 5);
        assert_eq!(f.fb.covered_pixel_count(), 0);
        assert!(f.fb.zbuffer().items().iter().all(|item| *item == ZBufferItem::EMPTY));
        assert!(f.fb.collect_visible_surfels().is_empty());
    }

    #[test]
    fn splat_info_is_recorded_only_when_requested() {
        let mut f = Fixture::new(unlit());
        f.splat(SplatFunction::Additive, &f.input(32.0, 32.0, 4.0), &disc(0xFF_FF_FF), 0);
        assert_eq!(f.fb.nof_splat_info_entries(), 0);
        f.fb.set_attributes(Attributes::SPLAT_INFO | Attributes::COLOR_DEPTH_NORMAL_WEIGHT);
        f.splat(SplatFunction::Additive, &f.input(32.0, 32.0, 4.0), &disc(0xFF_FF_FF), 9);
        assert_eq!(f.fb.nof_splat_info_entries(), 1);
        assert_eq!(f.fb.splat_info_surfels(), &[SurfelId(9)]);
        let [u, v] = f.fb.splat_info_tex_coords()[0];
        assert!((u - 0.5).abs() < 1e-6 && (v - 0.5).abs() < 1e-6);
    }

    #[test]
    fn splat_info_skips_footprints_crossing_the_buffer_edge() {
        let mut f = Fixture::new(unlit());
        f.fb.set_attributes(Attributes::SPLAT_INFO | Attributes::COLOR_DEPTH_NORMAL_WEIGHT);
        let input = f.input(0.8, 32.0, 4.0);
        let outcome = f.splat(SplatFunction::Additive, &input, &disc(0xFF_FF_FF), 2);
        let SplatOutcome::Rasterized(bbox) = outcome else {
            panic!("expected rasterization, got {outcome:?}");
        };
        assert_eq!(bbox.x_min, 0);
        assert!(f.fb.is_pixel_covered(0, 31));
        assert_eq!(f.fb.nof_splat_info_entries(), 0);

        f.splat(SplatFunction::Additive, &f.input(32.0, 32.0, 4.0), &disc(0xFF_FF_FF), 3);
        assert_eq!(f.fb.splat_info_surfels(), &[SurfelId(3)]);
        let info = f.fb.splat_infos()[0];
        assert!(info.bbox.x_min > 0 && info.bbox.x_max < SIZE as i32 - 1);
    }

    #[test]
    fn first_write_replaces_empty_cell_at_any_depth() {
        // Radius grows with depth so the screen footprint stays 4 px.
        for z in [1.0e6f32, 3.0e6] {
            let mut f = Fixture::new(unlit());
            let far = Surfel::new(Vec3::ZERO, Vec3::Z, 0.25 * z / 4.0, 0x80_80_80);
            f.splat(SplatFunction::Additive, &f.input(32.0, 32.0, z), &far, 0);
            let depth = f.fb.depth(31, 31).expect("covered");
            assert!((depth - z).abs() < z * 1e-3, "depth {depth} for z {z}");
            assert_color(f.fb.color(31, 31), [128.0; 3]);
        }
    }

    #[test]
    fn single_surfel_attribute_gates_user_data() {
        let mut f = Fixture::new(unlit());
        assert!(f.fb.attributes().contains(Attributes::SINGLE_SURFEL));
        f.fb.set_attributes(Attributes::COLOR_DEPTH_NORMAL_WEIGHT);
        f.splat(SplatFunction::Additive, &f.input(32.0, 32.0, 4.0), &disc(0xFF_FF_FF), 4);
        assert!(f.fb.is_pixel_covered(31, 31));
        assert_eq!(f.fb.surfel(31, 31), None);
    }

    #[test]
    fn offscreen_and_back_facing_splats_touch_nothing() {
        let mut f = Fixture::new(unlit());
        let input = f.input(-40.0, 32.0, 4.0);
        let outcome = f.splat(SplatFunction::Additive, &input, &disc(0xFF_FF_FF), 0);
        assert_eq!(outcome, SplatOutcome::Clipped);
        let mut away = f.input(32.0, 32.0, 4.0);
        away.normal = Vec3::new(0.0, 0.0, 1.0);
        let outcome = f.splat(SplatFunction::Additive, &away, &disc(0xFF_FF_FF), 0);
        assert_eq!(outcome, SplatOutcome::BackFacing);
        assert_eq!(f.fb.covered_pixel_count(), 0);
    }

    #[test]
    fn clip_half_plane_cuts_elliptical_splat() {
        let mut f = Fixture::new(unlit());
        let mut input = f.input(32.0, 32.0, 4.0);
        input.axes = Some((Vec3::new(0.25, 0.0, 0.0), Vec3::new(0.0, 0.25, 0.0)));
        let surfel = disc(0xFF_FF_FF).with_clip(TangentClip {
            a: 1.0,
            b: 0.0,
            offset: 0.0,
        });
        f.splat(SplatFunction::Elliptical, &input, &surfel, 0);
        // u grows with screen x; buffer rows are flipped but columns are not.
        assert!(f.fb.is_pixel_covered(33, 31));
        assert!(!f.fb.is_pixel_covered(30, 31));
    }

    #[test]
    fn selection_tiers_bias_channels() {
        let mut s = disc(0xC8_C8_C8);
        s.flags.selected1 = true;
        assert_eq!(tint_selection([200.0; 3], &s), [100.0, 100.0, 200.0]);
        s.flags.selected1 = false;
        s.flags.selected2 = true;
        assert_eq!(tint_selection([200.0; 3], &s), [200.0, 100.0, 100.0]);
        s.flags.selected2 = false;
        s.flags.selected3 = true;
        s.flags.emphasise = true;
        assert_eq!(tint_selection([200.0; 3], &s), [177.5, 227.5, 177.5]);
    }

    #[test]
    fn shadowed_and_flipped_surfels_get_override_colors() {
        let settings = RenderSettings {
            two_sided_normals: true,
            debug_flipped_normals: true,
            apply_shadows: true,
            ..RenderSettings::default()
        };
        let mut f = Fixture::new(settings);
        let mut away = f.input(32.0, 32.0, 4.0);
        away.normal = Vec3::new(0.0, 0.0, 1.0);
        f.splat(SplatFunction::Additive, &away, &disc(0x20_20_20), 0);
        assert_color(f.fb.color(31, 31), FLIPPED_NORMAL_COLOR);

        f.fb.reset();
        let mut shadowed = disc(0xFF_FF_FF);
        shadowed.flags.covered = true;
        f.splat(SplatFunction::Additive, &f.input(32.0, 32.0, 4.0), &shadowed, 1);
        assert_color(f.fb.color(31, 31), [0.0; 3]);
    }
}
