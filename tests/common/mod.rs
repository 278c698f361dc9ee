#![allow(dead_code)]

use surfsplat::render::zbuffer::ZBufferItem;
use surfsplat::{
    Frustum, RenderSettings, ShadingMode, SurfelRenderer, Transformation, Vec3, Viewport,
};

pub const SIZE: usize = 64;
/// Eye distance from the origin along +z.
pub const EYE_DISTANCE: f32 = 4.0;
/// Pixels per world unit at the origin: `(SIZE / 2) / tan(fov / 2) / EYE_DISTANCE`.
pub const PIXELS_PER_UNIT: f32 = 16.0;

pub fn unlit() -> RenderSettings {
    RenderSettings {
        shading: ShadingMode::Unlit,
        ..RenderSettings::default()
    }
}

/// 64x64 renderer looking at the origin from `(0, 0, 4)` with
/// `tan(fov / 2) = 0.5`.
pub fn renderer(settings: RenderSettings) -> SurfelRenderer {
    let viewport = Viewport::new(SIZE, SIZE).expect("viewport");
    let frustum = Frustum::new(2.0 * 0.5f32.atan(), 1.0, 0.5, 50.0).expect("frustum");
    let mut renderer = SurfelRenderer::new(viewport, frustum, settings).expect("renderer");
    renderer.set_transformation(Transformation::look_at(
        Vec3::new(0.0, 0.0, EYE_DISTANCE),
        Vec3::ZERO,
        Vec3::Y,
    ));
    renderer
}

pub fn items(renderer: &SurfelRenderer) -> Vec<ZBufferItem> {
    renderer.frame_buffer().zbuffer().items().to_vec()
}

/// Compares the accumulated sums of two cells.
pub fn assert_cells_close(a: &ZBufferItem, b: &ZBufferItem, eps: f32) {
    approx::assert_abs_diff_eq!(a.weight, b.weight, epsilon = eps);
    approx::assert_abs_diff_eq!(a.z, b.z, epsilon = eps * 10.0);
    for c in 0..3 {
        approx::assert_abs_diff_eq!(a.color[c], b.color[c], epsilon = eps * 255.0);
        approx::assert_abs_diff_eq!(a.normal[c], b.normal[c], epsilon = eps);
    }
}
