//! Two-pass shadowing: surfels that leave no trace in a render from the
//! light's point of view are in shadow.

use super::frame_buffer::Attributes;
use super::pipeline::SurfelRenderer;
use super::{RenderSettings, ShadingMode};
use crate::camera::{Frustum, Transformation, Viewport};
use crate::error::SplatResult;
use crate::math::Vec3;
use crate::surfel::Surfel;

#[derive(Debug, Clone)]
pub struct ShadowPass {
    pub light_view: Transformation,
    pub frustum: Frustum,
    pub resolution: Viewport,
}

impl ShadowPass {
    /// Light at `position` aimed at `target`.
    pub fn looking_at(
        position: Vec3,
        target: Vec3,
        fov_y: f32,
        resolution: Viewport,
    ) -> SplatResult<Self> {
        let distance = (target - position).length();
        let near = (distance * 1e-3).max(1e-3);
        let frustum = Frustum::new(fov_y, resolution.aspect(), near, distance * 10.0 + 1.0)?;
        let up = if (target - position).normalize().cross(Vec3::Y).length_squared() < 1e-6 {
            Vec3::Z
        } else {
            Vec3::Y
        };
        Ok(Self {
            light_view: Transformation::look_at(position, target, up),
            frustum,
            resolution,
        })
    }

    /// One flag per surfel: `true` when no pixel of the light's view keeps
    /// it in its visible list. Back-facing surfels count as covered.
    pub fn covered_surfels(
        &self,
        settings: &RenderSettings,
        surfels: &[Surfel],
    ) -> SplatResult<Vec<bool>> {
        let settings = RenderSettings {
            shading: ShadingMode::Unlit,
            two_sided_normals: false,
            apply_shadows: false,
            ..settings.clone()
        };
        let mut renderer = SurfelRenderer::new(self.resolution, self.frustum, settings)?;
        renderer.set_transformation(self.light_view);
        renderer
            .set_attributes(Attributes::COLOR_DEPTH_NORMAL_WEIGHT | Attributes::VISIBLE_SURFELS);
        renderer.begin_frame();
        renderer.warp(None, surfels)?;

        let mut covered = vec![true; surfels.len()];
        for id in renderer.frame_buffer().collect_visible_surfels() {
            if let Some(flag) = covered.get_mut(id.index()) {
                *flag = false;
            }
        }
        let shadowed = covered.iter().filter(|&&c| c).count();
        tracing::debug!("shadow pass: {} of {} surfels covered", shadowed, surfels.len());
        Ok(covered)
    }
}

pub fn apply_covered_flags(surfels: &mut [Surfel], covered: &[bool]) {
    for (surfel, &flag) in surfels.iter_mut().zip(covered) {
        surfel.flags.covered = flag;
    }
}
