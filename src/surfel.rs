use crate::math::{unpack_rgb_f32, Vec3};

/// Index of a surfel inside the collection it was warped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SurfelId(pub u32);

impl SurfelId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Identity of the scene object owning a surfel collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ObjectId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Material {
    pub ambient: f32,
    pub diffuse: f32,
    pub specular: f32,
    pub shininess: f32,
    /// Packed `0x00RRGGBB`.
    pub specular_color: u32,
}

impl Default for Material {
    fn default() -> Self {
        Self {
            ambient: 0.3,
            diffuse: 0.7,
            specular: 0.3,
            shininess: 16.0,
            specular_color: 0xFF_FF_FF,
        }
    }
}

impl Material {
    pub fn specular_rgb(&self) -> [f32; 3] {
        unpack_rgb_f32(self.specular_color)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SurfelFlags {
    pub selected1: bool,
    pub selected2: bool,
    pub selected3: bool,
    pub emphasise: bool,
    /// Set by the shadow pass when the surfel is not visible from the light.
    pub covered: bool,
}

/// Explicit, possibly skewed tangent axes. Lengths are the footprint
/// semi-axes in object units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TangentAxes {
    pub u: Vec3,
    pub v: Vec3,
}

/// Half-plane `u * a + v * b + offset >= 0` in normalized axis coordinates.
/// Pixels on the negative side are not rasterized.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TangentClip {
    pub a: f32,
    pub b: f32,
    pub offset: f32,
}

impl TangentClip {
    pub fn keeps(&self, u: f32, v: f32) -> bool {
        u * self.a + v * self.b + self.offset >= 0.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Surfel {
    pub position: Vec3,
    pub normal: Vec3,
    pub radius: f32,
    /// Packed `0x00RRGGBB`.
    pub color: u32,
    pub material: Material,
    pub flags: SurfelFlags,
    pub axes: Option<TangentAxes>,
    pub clip: Option<TangentClip>,
}

impl Surfel {
    pub fn new(position: Vec3, normal: Vec3, radius: f32, color: u32) -> Self {
        Self {
            position,
            normal,
            radius,
            color,
            material: Material::default(),
            flags: SurfelFlags::default(),
            axes: None,
            clip: None,
        }
    }

    pub fn with_material(mut self, material: Material) -> Self {
        self.material = material;
        self
    }

    pub fn with_axes(mut self, u: Vec3, v: Vec3) -> Self {
        self.axes = Some(TangentAxes { u, v });
        self
    }

    pub fn with_clip(mut self, clip: TangentClip) -> Self {
        self.clip = Some(clip);
        self
    }

    pub fn diffuse_rgb(&self) -> [f32; 3] {
        unpack_rgb_f32(self.color)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clip_keeps_positive_side_only() {
        let clip = TangentClip {
            a: 1.0,
            b: 0.0,
            offset: 0.0,
        };
        assert!(clip.keeps(0.5, -3.0));
        assert!(clip.keeps(0.0, 1.0));
        assert!(!clip.keeps(-0.1, 0.0));
    }

    #[test]
    fn diffuse_color_unpacks_channels() {
        let s = Surfel::new(Vec3::ZERO, Vec3::Z, 1.0, 0x10_20_30);
        assert_eq!(s.diffuse_rgb(), [16.0, 32.0, 48.0]);
    }
}
