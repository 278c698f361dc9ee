use super::SpecularModel;
use crate::math::Vec3;
use crate::surfel::Material;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LightKind {
    /// Direction from the surface toward the light.
    Directional { direction: Vec3 },
    Point { position: Vec3 },
}

/// Light source with per-channel intensities in `[0, 1]`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Light {
    pub kind: LightKind,
    pub ambient: [f32; 3],
    pub diffuse: [f32; 3],
    pub specular: [f32; 3],
}

impl Light {
    pub fn directional(direction: Vec3) -> Self {
        Self {
            kind: LightKind::Directional {
                direction: direction.normalize(),
            },
            ambient: [1.0; 3],
            diffuse: [1.0; 3],
            specular: [1.0; 3],
        }
    }

    pub fn point(position: Vec3) -> Self {
        Self {
            kind: LightKind::Point { position },
            ambient: [1.0; 3],
            diffuse: [1.0; 3],
            specular: [1.0; 3],
        }
    }

    pub fn with_intensities(
        mut self,
        ambient: [f32; 3],
        diffuse: [f32; 3],
        specular: [f32; 3],
    ) -> Self {
        self.ambient = ambient;
        self.diffuse = diffuse;
        self.specular = specular;
        self
    }

    /// Converts a light given in eye space (looking down `-z`) into the
    /// depth-positive view space used by the rasterizer.
    pub fn to_view_space(self) -> Self {
        let flip = |v: Vec3| Vec3::new(v.x, v.y, -v.z);
        let kind = match self.kind {
            LightKind::Directional { direction } => LightKind::Directional {
                direction: flip(direction),
            },
            LightKind::Point { position } => LightKind::Point {
                position: flip(position),
            },
        };
        Self { kind, ..self }
    }

    fn direction_from(&self, position: Vec3) -> Vec3 {
        match self.kind {
            LightKind::Directional { direction } => direction,
            LightKind::Point { position: p } => (p - position).normalize(),
        }
    }
}

/// Phong lighting of one sample. `diffuse` is the surface color in
/// `[0, 255]`, `normal` and `view` are unit vectors (view points toward the
/// eye). Returns the clamped color in `[0, 255]`.
pub fn shade(
    position: Vec3,
    normal: Vec3,
    view: Vec3,
    diffuse: [f32; 3],
    material: &Material,
    lights: &[Light],
    model: SpecularModel,
) -> [f32; 3] {
    let specular_color = material.specular_rgb();
    let mut out = [0.0f32; 3];

    for light in lights {
        let l = light.direction_from(position);
        for c in 0..3 {
            out[c] += material.ambient * light.ambient[c] * diffuse[c];
        }

        let ndotl = normal.dot(l);
        if ndotl <= 0.0 {
            continue;
        }
        let highlight = match model {
            SpecularModel::Reflection => {
                let r = normal * (2.0 * ndotl) - l;
                r.dot(view)
            }
            SpecularModel::Halfway => normal.dot((l + view).normalize()),
        };
        let spec = if highlight > 0.0 {
            highlight.powf(material.shininess)
        } else {
            0.0
        };

        for c in 0..3 {
            out[c] += material.diffuse * ndotl * light.diffuse[c] * diffuse[c];
            out[c] += material.specular * spec * light.specular[c] * specular_color[c];
        }
    }

    out.map(|v| v.clamp(0.0, 255.0))
}
