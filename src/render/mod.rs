pub mod filter;
pub mod footprint;
pub mod frame_buffer;
pub mod image;
pub mod lighting;
pub mod pipeline;
pub mod rasterizer;
pub mod shader;
pub mod shadow;
pub mod warper;
pub mod zbuffer;

use crate::error::{SplatError, SplatResult};

pub const DEFAULT_LUT_SIZE: usize = 1024;
pub const DEFAULT_CUTOFF_RADIUS: f32 = 1.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ShadingMode {
    /// Diffuse surfel colors, no lighting.
    Unlit,
    /// Lighting evaluated once per surfel before rasterization.
    #[default]
    PerSurfel,
    /// Lighting evaluated per covered pixel from the accumulated normal and
    /// the material snapshot stored in the z-buffer cell.
    PerPixel,
}

impl ShadingMode {
    pub fn next(self) -> Self {
        match self {
            Self::Unlit => Self::PerSurfel,
            Self::PerSurfel => Self::PerPixel,
            Self::PerPixel => Self::Unlit,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Unlit => "Unlit",
            Self::PerSurfel => "PerSurfel",
            Self::PerPixel => "PerPixel",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SpecularModel {
    /// `(R . V)^shininess`
    #[default]
    Reflection,
    /// `(N . H)^shininess`
    Halfway,
}

impl SpecularModel {
    pub fn toggle(self) -> Self {
        match self {
            Self::Reflection => Self::Halfway,
            Self::Halfway => Self::Reflection,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Reflection => "Reflection",
            Self::Halfway => "Halfway",
        }
    }
}

/// Legacy blending thresholds. The z-range test replaces the two offsets;
/// the angle bounds the depth gradient at grazing angles.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BlendThresholds {
    pub constant: f32,
    pub distance: f32,
    /// Radians.
    pub angle: f32,
}

impl Default for BlendThresholds {
    fn default() -> Self {
        Self {
            constant: 0.4,
            distance: 2.0,
            angle: 80.0_f32.to_radians(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderSettings {
    pub cutoff_radius: f32,
    pub lut_size: usize,
    pub thresholds: BlendThresholds,
    pub two_sided_normals: bool,
    pub shading: ShadingMode,
    pub specular: SpecularModel,
    pub show_selection: bool,
    pub apply_shadows: bool,
    /// Paint surfels whose normal had to be flipped in a debug color.
    pub debug_flipped_normals: bool,
    /// Packed `0x00RRGGBB`.
    pub background: u32,
    /// Lower bound of a splat's depth range, in LOD-scaled surfel radii.
    pub min_depth_range: f32,
    pub lod_level: i32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            cutoff_radius: DEFAULT_CUTOFF_RADIUS,
            lut_size: DEFAULT_LUT_SIZE,
            thresholds: BlendThresholds::default(),
            two_sided_normals: false,
            shading: ShadingMode::default(),
            specular: SpecularModel::default(),
            show_selection: false,
            apply_shadows: false,
            debug_flipped_normals: false,
            background: 0x00_00_00,
            min_depth_range: 1.0,
            lod_level: 0,
        }
    }
}

impl RenderSettings {
    pub fn validate(&self) -> SplatResult<()> {
        if !(self.cutoff_radius > 0.0 && self.cutoff_radius.is_finite()) {
            return Err(SplatError::InvalidCutoffRadius(self.cutoff_radius));
        }
        if self.lut_size == 0 {
            return Err(SplatError::EmptyFilterTable);
        }
        Ok(())
    }

    pub fn lod_scale(&self) -> f32 {
        2.0_f32.powi(self.lod_level)
    }
}

/// Inclusive pixel rectangle in buffer coordinates (origin lower-left).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BoundingBox {
    pub x_min: i32,
    pub y_min: i32,
    pub x_max: i32,
    pub y_max: i32,
}

impl Default for BoundingBox {
    fn default() -> Self {
        Self::empty()
    }
}

impl BoundingBox {
    pub const fn empty() -> Self {
        Self {
            x_min: i32::MAX,
            y_min: i32::MAX,
            x_max: i32::MIN,
            y_max: i32::MIN,
        }
    }

    pub fn new(x_min: i32, y_min: i32, x_max: i32, y_max: i32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.x_min > self.x_max || self.y_min > self.y_max
    }

    pub fn union(&self, other: &BoundingBox) -> Self {
        if other.is_empty() {
            return *self;
        }
        if self.is_empty() {
            return *other;
        }
        Self {
            x_min: self.x_min.min(other.x_min),
            y_min: self.y_min.min(other.y_min),
            x_max: self.x_max.max(other.x_max),
            y_max: self.y_max.max(other.y_max),
        }
    }

    pub fn clip(&self, width: usize, height: usize) -> Self {
        Self {
            x_min: self.x_min.max(0),
            y_min: self.y_min.max(0),
            x_max: self.x_max.min(width as i32 - 1),
            y_max: self.y_max.min(height as i32 - 1),
        }
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x_min && x <= self.x_max && y >= self.y_min && y <= self.y_max
    }

    pub fn full(width: usize, height: usize) -> Self {
        Self::new(0, 0, width as i32 - 1, height as i32 - 1)
    }
}
