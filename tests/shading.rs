mod common;

use common::{items, renderer};
use surfsplat::render::lighting::Light;
use surfsplat::{RenderSettings, ShadingMode, Surfel, Vec3};

fn scene() -> Vec<Surfel> {
    vec![
        Surfel::new(
            Vec3::new(-0.3, 0.0, 0.0),
            Vec3::new(-0.3, 0.2, 1.0).normalize(),
            0.4,
            0xE0_40_40,
        ),
        Surfel::new(
            Vec3::new(0.3, 0.1, -0.2),
            Vec3::new(0.4, 0.0, 1.0).normalize(),
            0.5,
            0x40_E0_40,
        ),
    ]
}

fn assert_shading_idempotent(shading: ShadingMode) {
    let settings = RenderSettings {
        shading,
        background: 0x20_20_20,
        ..RenderSettings::default()
    };
    let mut r = renderer(settings);
    r.set_lights(vec![Light::directional(Vec3::new(0.2, 0.5, 1.0))]);
    r.begin_frame();
    r.warp(None, &scene()).expect("warp");

    let first = r.shade_frame().expect("first shade").clone();
    let cells = items(&r);
    let second = r.shade_frame().expect("second shade").clone();

    assert_eq!(first.pixels(), second.pixels());
    assert_eq!(cells, items(&r));
    assert!(first.pixels().iter().any(|&p| p != 0x20_20_20));
}

#[test]
fn shading_twice_is_idempotent_per_surfel() {
    assert_shading_idempotent(ShadingMode::PerSurfel);
}

#[test]
fn shading_twice_is_idempotent_per_pixel() {
    assert_shading_idempotent(ShadingMode::PerPixel);
}

#[test]
fn shading_twice_is_idempotent_unlit() {
    assert_shading_idempotent(ShadingMode::Unlit);
}
