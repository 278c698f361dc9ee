//! Terminal viewer: renders the shaded image as half-block cells.

pub mod frame;
pub mod hud;
pub mod input;
pub mod terminal_setup;

use std::time::{Duration, Instant};

use crossterm::style::Color;
use surfsplat::render::image::HalfblockCell;
use surfsplat::{Camera, Light, Surfel, SurfelRenderer, Transformation, Vec3, WarpStats};

pub type AppResult<T> = Result<T, Box<dyn std::error::Error>>;

pub const HALF_BLOCK: char = '\u{2584}';
pub const FRAME_TARGET: Duration = Duration::from_millis(16);
pub const MAX_SUPERSAMPLE: u32 = 3;
pub const MAX_MAGNIFICATION: usize = 8;

pub fn rgb_to_ansi256(r: u8, g: u8, b: u8) -> u8 {
    if r == g && g == b {
        if r < 8 {
            return 16;
        }
        if r > 248 {
            return 231;
        }
        return 232 + ((r as f32 - 8.0) / 247.0 * 24.0) as u8;
    }
    let ri = (r as f32 / 255.0 * 5.0 + 0.5) as u8;
    let gi = (g as f32 / 255.0 * 5.0 + 0.5) as u8;
    let bi = (b as f32 / 255.0 * 5.0 + 0.5) as u8;
    16 + 36 * ri + 6 * gi + bi
}

pub fn make_color(r: u8, g: u8, b: u8, use_truecolor: bool) -> Color {
    if use_truecolor {
        Color::Rgb { r, g, b }
    } else {
        Color::AnsiValue(rgb_to_ansi256(r, g, b))
    }
}

pub fn is_hud_overlay_row(show_hud: bool, row: usize, term_rows: usize) -> bool {
    show_hud && (row == 0 || row == term_rows.saturating_sub(1))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraMode {
    Free,
    Orbit,
}

impl CameraMode {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Free => "Free",
            Self::Orbit => "Orbit",
        }
    }
}

/// Headlight slightly above and right of the eye, in eye space.
pub fn default_lights() -> Vec<Light> {
    vec![Light::directional(Vec3::new(0.4, 0.6, 1.0)).with_intensities(
        [0.4; 3],
        [0.9; 3],
        [0.8; 3],
    )]
}

/// Point light fixed in the world, expressed in the eye space of `view`.
pub fn world_point_light(position: Vec3, view: &Transformation) -> Light {
    Light::point(view.transform_point(position)).with_intensities([0.35; 3], [1.0; 3], [0.8; 3])
}

pub struct AppState {
    pub camera: Camera,
    pub surfels: Vec<Surfel>,
    pub renderer: SurfelRenderer,
    pub halfblock_cells: Vec<HalfblockCell>,
    pub hud_string_buf: String,
    pub input_state: input::state::InputState,
    pub show_hud: bool,
    pub camera_mode: CameraMode,
    pub move_speed: f32,
    pub frame_count: u64,
    pub last_frame_time: Instant,
    pub fps: f32,
    pub last_stats: WarpStats,
    pub orbit_angle: f32,
    pub orbit_radius: f32,
    pub orbit_height: f32,
    pub orbit_target: Vec3,
    pub supersample_factor: u32,
    /// Progressive rendering factor applied to the renderer each frame.
    pub magnification: usize,
    pub use_truecolor: bool,
    pub scene_center: Vec3,
    pub scene_radius: f32,
    /// World-space point light used with shadows; the eye-space headlight
    /// is used otherwise.
    pub world_light: Option<Vec3>,
}

impl AppState {
    pub fn new(surfels: Vec<Surfel>, renderer: SurfelRenderer) -> Self {
        let (scene_center, scene_radius) = scene_bounds(&surfels);
        let mut camera = Camera::new(Vec3::ZERO, -std::f32::consts::FRAC_PI_2, 0.0);
        surfsplat::camera::reset(&mut camera, scene_center, scene_radius * 2.5);
        Self {
            camera,
            surfels,
            renderer,
            halfblock_cells: Vec::new(),
            hud_string_buf: String::with_capacity(512),
            input_state: input::state::InputState::default(),
            show_hud: true,
            camera_mode: CameraMode::Free,
            move_speed: (scene_radius * 0.5).max(0.05),
            frame_count: 0,
            last_frame_time: Instant::now(),
            fps: 0.0,
            last_stats: WarpStats::default(),
            orbit_angle: 0.0,
            orbit_radius: scene_radius * 2.5,
            orbit_height: 0.0,
            orbit_target: scene_center,
            supersample_factor: 1,
            magnification: 1,
            use_truecolor: true,
            scene_center,
            scene_radius,
            world_light: None,
        }
    }
}

/// AABB center and half-diagonal of the surfel positions.
pub fn scene_bounds(surfels: &[Surfel]) -> (Vec3, f32) {
    if surfels.is_empty() {
        return (Vec3::ZERO, 1.0);
    }
    let mut min = Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);
    let mut max = Vec3::new(f32::NEG_INFINITY, f32::NEG_INFINITY, f32::NEG_INFINITY);
    for s in surfels {
        min.x = min.x.min(s.position.x);
        min.y = min.y.min(s.position.y);
        min.z = min.z.min(s.position.z);
        max.x = max.x.max(s.position.x);
        max.y = max.y.max(s.position.y);
        max.z = max.z.max(s.position.z);
    }
    let center = (min + max) * 0.5;
    (center, ((max - min).length() * 0.5).max(0.1))
}
