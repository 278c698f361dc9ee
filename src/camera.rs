use crate::error::{SplatError, SplatResult};
use crate::math::{mat3_mul, mat3_mul_vec, mat3_transpose, Mat3, Vec3, MAT3_IDENTITY};

/// Object-to-camera similarity transform: `p_cam = scale * R * p + t`.
///
/// Camera space follows the usual convention of looking down `-z`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transformation {
    rotation: Mat3,
    translation: Vec3,
    scale: f32,
    inverse_rotation: Mat3,
    inverse_translation: Vec3,
}

impl Default for Transformation {
    fn default() -> Self {
        Self::identity()
    }
}

impl Transformation {
    pub fn identity() -> Self {
        Self::new(MAT3_IDENTITY, Vec3::ZERO, 1.0)
    }

    pub fn new(rotation: Mat3, translation: Vec3, scale: f32) -> Self {
        let inverse_rotation = mat3_transpose(rotation);
        let inverse_translation = mat3_mul_vec(inverse_rotation, -translation) * (1.0 / scale);
        Self {
            rotation,
            translation,
            scale,
            inverse_rotation,
            inverse_translation,
        }
    }

    pub fn translation_only(translation: Vec3) -> Self {
        Self::new(MAT3_IDENTITY, translation, 1.0)
    }

    /// Builds the transform from a column-major 4x4 matrix holding a
    /// uniformly scaled rotation plus translation.
    pub fn from_column_major(m: [f32; 16]) -> Self {
        let scale = Vec3::new(m[0], m[1], m[2]).length().max(1e-12);
        let inv_scale = 1.0 / scale;
        let rotation = [
            [m[0] * inv_scale, m[4] * inv_scale, m[8] * inv_scale],
            [m[1] * inv_scale, m[5] * inv_scale, m[9] * inv_scale],
            [m[2] * inv_scale, m[6] * inv_scale, m[10] * inv_scale],
        ];
        Self::new(rotation, Vec3::new(m[12], m[13], m[14]), scale)
    }

    #[rustfmt::skip]
    pub fn to_column_major(&self) -> [f32; 16] {
        let r = self.rotation;
        let s = self.scale;
        let t = self.translation;
        [
            r[0][0] * s, r[1][0] * s, r[2][0] * s, 0.0,
            r[0][1] * s, r[1][1] * s, r[2][1] * s, 0.0,
            r[0][2] * s, r[1][2] * s, r[2][2] * s, 0.0,
            t.x, t.y, t.z, 1.0,
        ]
    }

    /// `self` applied after `first`, matching `M_self * M_first`.
    pub fn compose(&self, first: &Transformation) -> Self {
        let rotation = mat3_mul(self.rotation, first.rotation);
        let translation =
            mat3_mul_vec(self.rotation, first.translation) * self.scale + self.translation;
        Self::new(rotation, translation, self.scale * first.scale)
    }

    /// View transform of a camera at `eye` looking at `target`.
    pub fn look_at(eye: Vec3, target: Vec3, up: Vec3) -> Self {
        let forward = (target - eye).normalize();
        let mut right = forward.cross(up).normalize();
        if right.length_squared() < 1e-8 {
            right = forward.cross(Vec3::X).normalize();
        }
        let true_up = right.cross(forward);
        let rotation = [
            [right.x, right.y, right.z],
            [true_up.x, true_up.y, true_up.z],
            [-forward.x, -forward.y, -forward.z],
        ];
        let translation = -mat3_mul_vec(rotation, eye);
        Self::new(rotation, translation, 1.0)
    }

    pub fn rotation(&self) -> Mat3 {
        self.rotation
    }

    pub fn translation(&self) -> Vec3 {
        self.translation
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    pub fn transform_point(&self, p: Vec3) -> Vec3 {
        mat3_mul_vec(self.rotation, p) * self.scale + self.translation
    }

    /// Rotates a direction; the uniform scale does not affect unit normals.
    pub fn transform_normal(&self, n: Vec3) -> Vec3 {
        mat3_mul_vec(self.rotation, n)
    }

    pub fn inverse_transform_point(&self, p: Vec3) -> Vec3 {
        mat3_mul_vec(self.inverse_rotation, p) * (1.0 / self.scale) + self.inverse_translation
    }

    pub fn inverse_transform_normal(&self, n: Vec3) -> Vec3 {
        mat3_mul_vec(self.inverse_rotation, n)
    }
}

/// Symmetric perspective frustum. All values are positive even though the
/// camera looks down `-z`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Frustum {
    pub fov_y: f32,
    pub aspect: f32,
    pub near: f32,
    pub far: f32,
}

impl Default for Frustum {
    fn default() -> Self {
        Self {
            fov_y: std::f32::consts::PI / 3.0,
            aspect: 1.0,
            near: 0.1,
            far: 1000.0,
        }
    }
}

impl Frustum {
    pub fn new(fov_y: f32, aspect: f32, near: f32, far: f32) -> SplatResult<Self> {
        if !(fov_y > 0.0 && fov_y < std::f32::consts::PI) {
            return Err(SplatError::InvalidFrustum(format!(
                "field of view {fov_y} must lie in (0, pi)"
            )));
        }
        if !(aspect > 0.0 && aspect.is_finite()) {
            return Err(SplatError::InvalidFrustum(format!(
                "aspect ratio {aspect} must be positive"
            )));
        }
        if !(near > 0.0 && far > near) {
            return Err(SplatError::InvalidFrustum(format!(
                "clip planes near={near} far={far} must satisfy 0 < near < far"
            )));
        }
        Ok(Self {
            fov_y,
            aspect,
            near,
            far,
        })
    }

    /// Half extents of the view window at unit distance, `(x, y)`.
    pub fn half_extents(&self) -> (f32, f32) {
        let y = (self.fov_y * 0.5).tan();
        (y * self.aspect, y)
    }

    /// Column-major OpenGL-style projection matrix.
    pub fn normalization_matrix(&self) -> [f32; 16] {
        let (xp, yp) = self.half_extents();
        let (n, f) = (self.near, self.far);
        let mut m = [0.0; 16];
        m[0] = 1.0 / xp;
        m[5] = 1.0 / yp;
        m[10] = -(f + n) / (f - n);
        m[11] = -1.0;
        m[14] = -2.0 * f * n / (f - n);
        m
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Viewport {
    pub width: usize,
    pub height: usize,
}

impl Viewport {
    pub fn new(width: usize, height: usize) -> SplatResult<Self> {
        if width == 0 || height == 0 {
            return Err(SplatError::InvalidViewport { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }
}

/// Fly/orbit camera driven by the viewer.
#[derive(Debug, Clone)]
pub struct Camera {
    pub position: Vec3,
    pub forward: Vec3,
    pub right: Vec3,
    pub up: Vec3,
    pub yaw: f32,
    pub pitch: f32,
    pub fov: f32,
    pub near: f32,
    pub far: f32,
}

impl Camera {
    pub fn new(position: Vec3, yaw: f32, pitch: f32) -> Self {
        let mut camera = Self {
            position,
            forward: Vec3::new(0.0, 0.0, -1.0),
            right: Vec3::new(1.0, 0.0, 0.0),
            up: Vec3::new(0.0, 1.0, 0.0),
            yaw,
            pitch,
            fov: std::f32::consts::PI / 3.0,
            near: 0.1,
            far: 1000.0,
        };
        camera.update_vectors();
        camera
    }

    pub fn update_vectors(&mut self) {
        let forward = Vec3::new(
            self.yaw.cos() * self.pitch.cos(),
            self.pitch.sin(),
            self.yaw.sin() * self.pitch.cos(),
        )
        .normalize();

        let right = forward.cross(Vec3::Y).normalize();
        self.forward = forward;
        self.right = if right.length_squared() < 1e-6 {
            Vec3::X
        } else {
            right
        };
        self.up = self.right.cross(forward).normalize();
    }

    /// World-to-camera transform (camera looks down `-z`).
    pub fn transformation(&self) -> Transformation {
        let rotation = [
            [self.right.x, self.right.y, self.right.z],
            [self.up.x, self.up.y, self.up.z],
            [-self.forward.x, -self.forward.y, -self.forward.z],
        ];
        let translation = -mat3_mul_vec(rotation, self.position);
        Transformation::new(rotation, translation, 1.0)
    }

    pub fn frustum(&self, aspect: f32) -> SplatResult<Frustum> {
        Frustum::new(self.fov, aspect, self.near, self.far)
    }
}

pub fn reset(camera: &mut Camera, target: Vec3, distance: f32) {
    *camera = Camera::new(
        target + Vec3::new(0.0, 0.0, distance),
        -std::f32::consts::FRAC_PI_2,
        0.0,
    );
}

pub fn move_forward(camera: &mut Camera, distance: f32) {
    camera.position += camera.forward * distance;
}

pub fn move_right(camera: &mut Camera, distance: f32) {
    camera.position += camera.right * distance;
}

pub fn adjust_pitch(camera: &mut Camera, delta: f32) {
    camera.pitch = (camera.pitch + delta).clamp(-1.5, 1.5);
    camera.update_vectors();
}

pub fn adjust_yaw(camera: &mut Camera, delta: f32) {
    camera.yaw += delta;
    camera.update_vectors();
}

pub fn look_at_target(camera: &mut Camera, target: Vec3) {
    let to_target = (target - camera.position).normalize();
    if to_target.length_squared() < 1e-8 {
        return;
    }
    camera.yaw = to_target.z.atan2(to_target.x);
    camera.pitch = to_target.y.clamp(-1.0, 1.0).asin();
    camera.update_vectors();
}
