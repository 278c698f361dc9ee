use super::footprint::{SplatInput, ViewportMapping};
use super::frame_buffer::ExtendedFrameBuffer;
use super::rasterizer::{splat, RasterContext, SplatFunction, SplatOutcome};
use super::BoundingBox;
use crate::camera::{Frustum, Transformation, Viewport};
use crate::error::{SplatError, SplatResult};
use crate::math::Vec3;
use crate::surfel::{ObjectId, Surfel, SurfelId};

/// Per-pass counters of what happened to the submitted surfels.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WarpStats {
    pub submitted: usize,
    pub rasterized: usize,
    pub outside_frustum: usize,
    pub back_facing: usize,
    pub degenerate: usize,
    pub clipped: usize,
}

impl WarpStats {
    pub fn record(&mut self, outcome: SplatOutcome) {
        match outcome {
            SplatOutcome::Rasterized(_) => self.rasterized += 1,
            SplatOutcome::BackFacing => self.back_facing += 1,
            SplatOutcome::Degenerate => self.degenerate += 1,
            SplatOutcome::Clipped => self.clipped += 1,
        }
    }

    pub fn merge(&mut self, other: &WarpStats) {
        self.submitted += other.submitted;
        self.rasterized += other.rasterized;
        self.outside_frustum += other.outside_frustum;
        self.back_facing += other.back_facing;
        self.degenerate += other.degenerate;
        self.clipped += other.clipped;
    }

    pub fn culled(&self) -> usize {
        self.outside_frustum + self.back_facing + self.degenerate + self.clipped
    }
}

/// Object-to-screen projection of surfel centers for the current view.
#[derive(Debug, Clone)]
pub struct Warper {
    transformation: Transformation,
    frustum: Frustum,
    viewport: Viewport,
    mapping: ViewportMapping,
}

impl Warper {
    pub fn new(transformation: Transformation, frustum: Frustum, viewport: Viewport) -> Self {
        Self {
            mapping: ViewportMapping::new(&frustum, viewport.width, viewport.height),
            transformation,
            frustum,
            viewport,
        }
    }

    pub fn transformation(&self) -> &Transformation {
        &self.transformation
    }

    pub fn set_transformation(&mut self, transformation: Transformation) {
        self.transformation = transformation;
    }

    pub fn frustum(&self) -> &Frustum {
        &self.frustum
    }

    pub fn set_frustum(&mut self, frustum: Frustum) {
        self.frustum = frustum;
        self.update_mapping();
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Size of the buffer being written, which is the logical z-buffer size
    /// under progressive rendering.
    pub fn set_viewport(&mut self, viewport: Viewport) {
        self.viewport = viewport;
        self.update_mapping();
    }

    pub fn mapping(&self) -> ViewportMapping {
        self.mapping
    }

    fn update_mapping(&mut self) {
        let Viewport { width, height } = self.viewport;
        self.mapping = ViewportMapping::new(&self.frustum, width, height);
    }

    /// Projects the surfel center, or `None` when it lies outside the near
    /// and far planes.
    pub fn project(&self, surfel: &Surfel, lod: i32) -> Option<SplatInput> {
        // Eye space looks down -z; flip once so depth is positive.
        let to_view = |v: Vec3| Vec3::new(v.x, v.y, -v.z);
        let t = &self.transformation;
        let center = to_view(t.transform_point(surfel.position));
        if !(center.z > self.frustum.near && center.z < self.frustum.far) {
            return None;
        }
        let (x0, y0) = self.mapping.project(center);
        if !(x0.is_finite() && y0.is_finite()) {
            return None;
        }
        let axes = surfel
            .axes
            .map(|axes| (to_view(t.transform_normal(axes.u)), to_view(t.transform_normal(axes.v))));

        Some(SplatInput {
            x0,
            y0,
            z: center.z,
            normal: to_view(t.transform_normal(surfel.normal)),
            axes,
            lod,
            stoo_scaling: self.mapping.screen_to_camera(),
            otoc_scaling: t.scale(),
            mapping: self.mapping,
        })
    }

    /// Splats every surfel of a collection. `bbox` grows to cover every
    /// pixel touched.
    pub fn warp(
        &self,
        function: SplatFunction,
        ctx: &RasterContext,
        fb: &mut ExtendedFrameBuffer,
        surfels: &[Surfel],
        object: Option<ObjectId>,
        bbox: &mut BoundingBox,
    ) -> WarpStats {
        let mut stats = WarpStats::default();
        for (i, surfel) in surfels.iter().enumerate() {
            self.warp_one(function, ctx, fb, surfel, SurfelId(i as u32), object, bbox, &mut stats);
        }
        tracing::debug!(
            "warp ({}): {} submitted, {} rasterized, {} culled",
            function.name(),
            stats.submitted,
            stats.rasterized,
            stats.culled()
        );
        stats
    }

    /// Splats the listed surfels only; ids index into `surfels`. All ids are
    /// checked before anything is written.
    #[allow(clippy::too_many_arguments)]
    pub fn warp_selection(
        &self,
        function: SplatFunction,
        ctx: &RasterContext,
        fb: &mut ExtendedFrameBuffer,
        surfels: &[Surfel],
        ids: &[SurfelId],
        object: Option<ObjectId>,
        bbox: &mut BoundingBox,
    ) -> SplatResult<WarpStats> {
        if let Some(&id) = ids.iter().find(|id| id.index() >= surfels.len()) {
            return Err(SplatError::SurfelOutOfRange {
                id,
                len: surfels.len(),
            });
        }
        let mut stats = WarpStats::default();
        for &id in ids {
            let surfel = &surfels[id.index()];
            self.warp_one(function, ctx, fb, surfel, id, object, bbox, &mut stats);
        }
        tracing::debug!(
            "warp selection ({}): {} submitted, {} rasterized",
            function.name(),
            stats.submitted,
            stats.rasterized
        );
        Ok(stats)
    }

    #[allow(clippy::too_many_arguments)]
    fn warp_one(
        &self,
        function: SplatFunction,
        ctx: &RasterContext,
        fb: &mut ExtendedFrameBuffer,
        surfel: &Surfel,
        id: SurfelId,
        object: Option<ObjectId>,
        bbox: &mut BoundingBox,
        stats: &mut WarpStats,
    ) {
        stats.submitted += 1;
        let Some(input) = self.project(surfel, ctx.settings.lod_level) else {
            stats.outside_frustum += 1;
            return;
        };
        let outcome = splat(function, ctx, fb, &input, surfel, id, object);
        if let SplatOutcome::Rasterized(touched) = outcome {
            *bbox = bbox.union(&touched);
        }
        stats.record(outcome);
    }
}
