mod common;

use common::{items, renderer, unlit, SIZE};
use surfsplat::render::footprint::MIN_NDOTV;
use surfsplat::render::zbuffer::ZBufferItem;
use surfsplat::{RenderSettings, SplatFunction, Surfel, Vec3, WarpStats};

fn warp_one(
    settings: RenderSettings,
    function: SplatFunction,
    surfel: Surfel,
) -> (WarpStats, Vec<ZBufferItem>) {
    let mut r = renderer(settings);
    r.set_splat_function(function);
    r.begin_frame();
    let stats = r.warp(None, &[surfel]).expect("warp");
    r.shade_frame().expect("shade");
    assert!(r.image().pixels().iter().all(|&p| p == r.settings().background));
    (stats, items(&r))
}

fn assert_untouched(cells: &[ZBufferItem]) {
    assert!(cells.iter().all(|item| *item == ZBufferItem::EMPTY));
}

#[test]
fn zero_radius_surfel_is_skipped() {
    for function in [SplatFunction::Additive, SplatFunction::Elliptical] {
        let surfel = Surfel::new(Vec3::ZERO, Vec3::Z, 0.0, 0xFF_FF_FF);
        let (stats, cells) = warp_one(unlit(), function, surfel);
        assert_eq!(stats.degenerate, 1, "{function:?}");
        assert_untouched(&cells);
    }
}

#[test]
fn edge_on_surfel_is_skipped() {
    for two_sided in [false, true] {
        let settings = RenderSettings {
            two_sided_normals: two_sided,
            ..unlit()
        };
        let surfel = Surfel::new(Vec3::ZERO, Vec3::X, 0.4, 0xFF_FF_FF);
        let (stats, cells) = warp_one(settings, SplatFunction::Additive, surfel);
        assert_eq!(stats.degenerate, 1);
        assert_eq!(stats.rasterized, 0);
        assert_untouched(&cells);
    }
}

/// Unit normal whose cosine with the view direction at the origin is `n`.
fn grazing_normal(n: f32) -> Vec3 {
    Vec3::new((1.0 - n * n).sqrt(), 0.0, n)
}

#[test]
fn grazing_surfel_below_threshold_is_skipped() {
    let surfel = Surfel::new(Vec3::ZERO, grazing_normal(MIN_NDOTV * 0.5), 0.4, 0xFF_FF_FF);
    let (stats, cells) = warp_one(unlit(), SplatFunction::Additive, surfel);
    assert_eq!(stats.degenerate, 1);
    assert_eq!(stats.rasterized, 0);
    assert_untouched(&cells);
}

#[test]
fn grazing_surfel_above_threshold_stays_finite_and_bounded() {
    let surfel = Surfel::new(Vec3::ZERO, grazing_normal(MIN_NDOTV * 2.0), 0.4, 0xFF_FF_FF);
    let mut r = renderer(unlit());
    r.begin_frame();
    let stats = r.warp(None, &[surfel]).expect("warp");
    assert_eq!(stats.rasterized, 1);
    r.shade_frame().expect("shade");

    let bbox = r.bbox();
    assert!(!bbox.is_empty());
    // Seen almost edge-on about the y axis: a vertical sliver about one
    // filtered pixel wide.
    assert!(bbox.x_max - bbox.x_min <= 4, "{bbox:?}");
    assert!(bbox.y_max - bbox.y_min < SIZE as i32 / 2, "{bbox:?}");

    let cells = items(&r);
    assert!(cells.iter().any(ZBufferItem::is_covered));
    for cell in &cells {
        let sums = [cell.weight, cell.z, cell.z_min, cell.z_max];
        let mut values = sums.iter().chain(&cell.color).chain(&cell.normal);
        assert!(values.all(|v| v.is_finite()), "{cell:?}");
        if let Some(depth) = cell.normalized_depth() {
            assert!(depth > 0.5 && depth < 50.0, "depth {depth}");
        }
    }
}

#[test]
fn surfel_on_near_plane_is_culled() {
    // Eye at z = 4 with the near plane at 0.5.
    let (stats, cells) = warp_one(
        unlit(),
        SplatFunction::Additive,
        Surfel::new(Vec3::new(0.0, 0.0, 3.5), Vec3::Z, 0.2, 0xFF_FF_FF),
    );
    assert_eq!(stats.outside_frustum, 1);
    assert_untouched(&cells);
}

#[test]
fn surfel_off_screen_is_clipped() {
    let (stats, cells) = warp_one(
        unlit(),
        SplatFunction::Additive,
        Surfel::new(Vec3::new(2.5, 0.0, 0.0), Vec3::Z, 0.1, 0xFF_FF_FF),
    );
    assert_eq!(stats.clipped, 1);
    assert_untouched(&cells);
}
