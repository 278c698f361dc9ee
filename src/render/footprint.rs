//! Screen-space footprint of a surfel: perspective Jacobian of the tangent
//! plane, EWA conics, depth range and pixel bounding box.
//!
//! All vectors here live in view space: camera space with the depth axis
//! negated, so visible points have `z > 0` and screen coordinates are
//! `x = x_v / z_v * sx + tx`, `y = y_v / z_v * sy + ty` with the origin at
//! the lower-left of the buffer.

use super::zbuffer::WriteContext;
use super::{BoundingBox, RenderSettings};
use crate::camera::Frustum;
use crate::math::Vec3;

/// Smallest accepted `N . V` after the two-sided flip.
pub const MIN_NDOTV: f32 = 1e-4;
/// Smallest accepted |det J| of the tangent-to-screen Jacobian, in pixels^2.
pub const MIN_JACOBIAN_DET: f32 = 1e-8;
/// Smallest accepted conic discriminant.
pub const MIN_CONIC_DET: f32 = 1e-12;

/// View-space to screen mapping of the current viewport.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewportMapping {
    pub sx: f32,
    pub sy: f32,
    pub tx: f32,
    pub ty: f32,
}

impl ViewportMapping {
    pub fn new(frustum: &Frustum, width: usize, height: usize) -> Self {
        let (xp, yp) = frustum.half_extents();
        let half_w = width as f32 * 0.5;
        let half_h = height as f32 * 0.5;
        Self {
            sx: half_w / xp,
            sy: half_h / yp,
            tx: half_w,
            ty: half_h,
        }
    }

    pub fn project(&self, p: Vec3) -> (f32, f32) {
        let inv_z = 1.0 / p.z;
        (p.x * inv_z * self.sx + self.tx, p.y * inv_z * self.sy + self.ty)
    }

    /// Ray through screen position `(x, y)` scaled to unit depth.
    pub fn view_ray(&self, x: f32, y: f32) -> Vec3 {
        Vec3::new((x - self.tx) / self.sx, (y - self.ty) / self.sy, 1.0)
    }

    /// Camera units per pixel at unit depth along x.
    pub fn screen_to_camera(&self) -> f32 {
        1.0 / self.sx
    }
}

/// Per-surfel input produced by the warper.
#[derive(Debug, Clone, Copy)]
pub struct SplatInput {
    pub x0: f32,
    pub y0: f32,
    /// View depth of the center, `> 0`.
    pub z: f32,
    pub normal: Vec3,
    /// Explicit tangent axes in view space, object-space lengths.
    pub axes: Option<(Vec3, Vec3)>,
    pub lod: i32,
    pub stoo_scaling: f32,
    pub otoc_scaling: f32,
    pub mapping: ViewportMapping,
}

impl SplatInput {
    /// Footprint scale of the LOD exponent, `2^lod`.
    pub fn lod_scale(&self) -> f32 {
        2.0_f32.powi(self.lod)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    BackFacing,
    Degenerate,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Footprint {
    pub x0: f32,
    pub y0: f32,
    pub z: f32,
    /// Unit normal facing the viewer (flipped when two-sided).
    pub normal: Vec3,
    pub flipped: bool,
    /// Unit vector from the center toward the eye.
    pub view: Vec3,
    pub position: Vec3,
    /// Filtered conic `(a, b, c)`: `q = a dx^2 + b dx dy + c dy^2`.
    pub conic: [f32; 3],
    /// Normalization applied to every filter weight of this splat.
    pub det: f32,
    pub z_min: f32,
    pub z_max: f32,
    pub dz_dx: f32,
    pub dz_dy: f32,
    /// Screen offset to normalized tangent coordinates.
    pub inv_jacobian: [[f32; 2]; 2],
    /// Unclipped bounds of `q < cutoff^2`.
    pub bbox: BoundingBox,
}

impl Footprint {
    pub fn q_at(&self, x: f32, y: f32) -> f32 {
        let dx = x - self.x0;
        let dy = y - self.y0;
        let [a, b, c] = self.conic;
        a * dx * dx + b * dx * dy + c * dy * dy
    }

    pub fn tangent_coords(&self, dx: f32, dy: f32) -> (f32, f32) {
        let m = self.inv_jacobian;
        (m[0][0] * dx + m[0][1] * dy, m[1][0] * dx + m[1][1] * dy)
    }
}

struct Orientation {
    normal: Vec3,
    flipped: bool,
    ray: Vec3,
    view: Vec3,
}

fn orient(input: &SplatInput, two_sided: bool) -> Result<Orientation, Rejection> {
    let ray = input.mapping.view_ray(input.x0, input.y0);
    let view = -ray.normalize();
    let mut normal = input.normal.normalize();
    let mut ndotv = normal.dot(view);
    let mut flipped = false;
    if ndotv < 0.0 {
        if !two_sided {
            return Err(Rejection::BackFacing);
        }
        normal = -normal;
        ndotv = -ndotv;
        flipped = true;
    }
    if ndotv < MIN_NDOTV || !ndotv.is_finite() {
        return Err(Rejection::Degenerate);
    }
    Ok(Orientation {
        normal,
        flipped,
        ray,
        view,
    })
}

/// Screen-space derivative of moving the center along view-space `v`.
fn project_direction(input: &SplatInput, ray: Vec3, v: Vec3) -> (f32, f32) {
    let inv_z = 1.0 / input.z;
    (
        input.mapping.sx * (v.x - ray.x * v.z) * inv_z,
        input.mapping.sy * (v.y - ray.y * v.z) * inv_z,
    )
}

/// Footprint of a circular surfel. The tangent frame is aligned with the
/// screen x axis: `S` is the tangent direction that only moves the
/// projection horizontally, so the Jacobian is upper triangular.
pub fn surface_footprint(
    input: &SplatInput,
    radius: f32,
    settings: &RenderSettings,
    ctx: &WriteContext,
) -> Result<Footprint, Rejection> {
    let o = orient(input, settings.two_sided_normals)?;

    // Ix = (X x V) x N with V = (ex, ey, 1).
    let x_cross_v = Vec3::new(0.0, -1.0, o.ray.y);
    let s_axis = x_cross_v.cross(o.normal).normalize();
    if s_axis == Vec3::ZERO {
        return Err(Rejection::Degenerate);
    }
    let t_axis = o.normal.cross(s_axis);

    let rc = radius * input.lod_scale() * input.otoc_scaling;
    let (j00, _) = project_direction(input, o.ray, s_axis * rc);
    let (j01, j11) = project_direction(input, o.ray, t_axis * rc);
    let det = j00 * j11;
    if !(det.abs() >= MIN_JACOBIAN_DET) {
        return Err(Rejection::Degenerate);
    }

    let sx = 1.0 / j00;
    let sy = -j01 / det;
    let tx = 0.0;
    let ty = 1.0 / j11;

    finish(
        input,
        &o,
        [[j00, j01], [0.0, j11]],
        [[sx, sy], [tx, ty]],
        (s_axis.z * rc, t_axis.z * rc),
        radius,
        settings,
        ctx,
    )
}

/// Footprint spanned by explicit, possibly skewed tangent axes. Surfels
/// without axes get an orthonormal pair of length `radius`.
pub fn elliptical_footprint(
    input: &SplatInput,
    radius: f32,
    settings: &RenderSettings,
    ctx: &WriteContext,
) -> Result<Footprint, Rejection> {
    let o = orient(input, settings.two_sided_normals)?;
    let scale = input.lod_scale() * input.otoc_scaling;

    let (u_axis, v_axis) = match input.axes {
        Some((u, v)) => (u * scale, v * scale),
        None => {
            let helper = if o.normal.x.abs() < 0.9 { Vec3::X } else { Vec3::Y };
            let s = o.normal.cross(helper).normalize();
            let t = o.normal.cross(s);
            (s * (radius * scale), t * (radius * scale))
        }
    };

    let (j00, j10) = project_direction(input, o.ray, u_axis);
    let (j01, j11) = project_direction(input, o.ray, v_axis);
    let det = j00 * j11 - j01 * j10;
    if !(det.abs() >= MIN_JACOBIAN_DET) {
        return Err(Rejection::Degenerate);
    }
    let inv_det = 1.0 / det;
    let inv = [
        [j11 * inv_det, -j01 * inv_det],
        [-j10 * inv_det, j00 * inv_det],
    ];

    finish(
        input,
        &o,
        [[j00, j01], [j10, j11]],
        inv,
        (u_axis.z, v_axis.z),
        radius,
        settings,
        ctx,
    )
}

#[allow(clippy::too_many_arguments)]
fn finish(
    input: &SplatInput,
    o: &Orientation,
    jac: [[f32; 2]; 2],
    inv: [[f32; 2]; 2],
    depth_axes: (f32, f32),
    radius: f32,
    settings: &RenderSettings,
    ctx: &WriteContext,
) -> Result<Footprint, Rejection> {
    let z = input.z;
    let (uz, vz) = depth_axes;

    // Depth gradient in camera units per pixel, bounded at grazing angles.
    let slope = ctx.thresholds.angle.tan().abs();
    let max_dz_dx = z * input.stoo_scaling * slope;
    let max_dz_dy = max_dz_dx * input.mapping.sx / input.mapping.sy;
    let dz_dx = (uz * inv[0][0] + vz * inv[1][0]).clamp(-max_dz_dx, max_dz_dx);
    let dz_dy = (uz * inv[0][1] + vz * inv[1][1]).clamp(-max_dz_dy, max_dz_dy);

    // Unfiltered conic invJ^T invJ and the depth extremum over its cutoff
    // ellipse: max of g.d subject to d^T Q d = R^2 is R sqrt(g^T Q^-1 g).
    let a_u = inv[0][0] * inv[0][0] + inv[1][0] * inv[1][0];
    let b_u = 2.0 * (inv[0][0] * inv[0][1] + inv[1][0] * inv[1][1]);
    let c_u = inv[0][1] * inv[0][1] + inv[1][1] * inv[1][1];
    let det_u = a_u * c_u - 0.25 * b_u * b_u;
    if !(det_u > MIN_CONIC_DET) {
        return Err(Rejection::Degenerate);
    }
    let spread = (c_u * dz_dx * dz_dx - b_u * dz_dx * dz_dy + a_u * dz_dy * dz_dy) / det_u;
    let mut half_range = ctx.cutoff_radius * spread.max(0.0).sqrt();
    let min_half_range =
        0.5 * settings.min_depth_range * radius * input.lod_scale() * input.otoc_scaling;
    half_range = half_range.max(min_half_range);

    // Filtered (EWA) conic: (J J^T + I)^-1.
    let v00 = jac[0][0] * jac[0][0] + jac[0][1] * jac[0][1] + 1.0;
    let v01 = jac[0][0] * jac[1][0] + jac[0][1] * jac[1][1];
    let v11 = jac[1][0] * jac[1][0] + jac[1][1] * jac[1][1] + 1.0;
    let det_v = v00 * v11 - v01 * v01;
    if !(det_v > MIN_CONIC_DET) {
        return Err(Rejection::Degenerate);
    }
    let inv_det_v = 1.0 / det_v;
    let a = v11 * inv_det_v;
    let b = -2.0 * v01 * inv_det_v;
    let c = v00 * inv_det_v;
    let det_jac = jac[0][0] * jac[1][1] - jac[0][1] * jac[1][0];
    let det = det_jac.abs() / det_v.sqrt();

    let det_q = a * c - 0.25 * b * b;
    if !(det_q > MIN_CONIC_DET) {
        return Err(Rejection::Degenerate);
    }
    let x_ext = ctx.cutoff_radius * (c / det_q).sqrt();
    let y_ext = ctx.cutoff_radius * (a / det_q).sqrt();
    let (x0, y0) = (input.x0, input.y0);
    if !(x_ext.is_finite() && y_ext.is_finite() && det.is_finite() && half_range.is_finite()) {
        return Err(Rejection::Degenerate);
    }
    let bbox = BoundingBox::new(
        (x0 - x_ext - 0.5).ceil() as i32,
        (y0 - y_ext - 0.5).ceil() as i32,
        (x0 + x_ext - 0.5).floor() as i32,
        (y0 + y_ext - 0.5).floor() as i32,
    );

    Ok(Footprint {
        x0,
        y0,
        z,
        normal: o.normal,
        flipped: o.flipped,
        view: o.view,
        position: o.ray * z,
        conic: [a, b, c],
        det,
        z_min: z - half_range,
        z_max: z + half_range,
        dz_dx,
        dz_dy,
        inv_jacobian: inv,
        bbox,
    })
}
