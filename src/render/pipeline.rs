use super::filter::FilterLut;
use super::frame_buffer::{Attributes, ExtendedFrameBuffer};
use super::image::Image;
use super::lighting::Light;
use super::rasterizer::{RasterContext, SplatFunction};
use super::shader::Shader;
use super::warper::{WarpStats, Warper};
use super::{BoundingBox, RenderSettings};
use crate::camera::{Frustum, Transformation, Viewport};
use crate::error::{SplatError, SplatResult};
use crate::surfel::{ObjectId, Surfel, SurfelId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    /// No frame opened since construction or the last resize.
    Idle,
    Warping,
    Shaded,
}

/// Frame-level façade: owns the buffers and drives
/// `begin_frame -> warp* -> shade_frame`.
#[derive(Debug, Clone)]
pub struct SurfelRenderer {
    settings: RenderSettings,
    splat_function: SplatFunction,
    warper: Warper,
    lut: FilterLut,
    frame_buffer: ExtendedFrameBuffer,
    shader: Shader,
    /// Eye-space lights as supplied.
    lights: Vec<Light>,
    view_lights: Vec<Light>,
    image: Image,
    viewport: Viewport,
    magnification: usize,
    state: FrameState,
    bbox: BoundingBox,
    stats: WarpStats,
}

impl SurfelRenderer {
    pub fn new(
        viewport: Viewport,
        frustum: Frustum,
        settings: RenderSettings,
    ) -> SplatResult<Self> {
        settings.validate()?;
        let frame_buffer = ExtendedFrameBuffer::new(viewport.width, viewport.height)?;
        let warper = Warper::new(Transformation::identity(), frustum, viewport);
        Ok(Self {
            lut: FilterLut::new(settings.cutoff_radius, settings.lut_size),
            shader: Shader::new(warper.mapping()),
            image: Image::new(viewport.width, viewport.height, settings.background),
            settings,
            splat_function: SplatFunction::default(),
            warper,
            frame_buffer,
            lights: Vec::new(),
            view_lights: Vec::new(),
            viewport,
            magnification: 1,
            state: FrameState::Idle,
            bbox: BoundingBox::empty(),
            stats: WarpStats::default(),
        })
    }

    // --- Configuration ---

    pub fn settings(&self) -> &RenderSettings {
        &self.settings
    }

    /// Replaces all settings; the filter table is rebuilt when its cutoff
    /// or size changes.
    pub fn set_settings(&mut self, settings: RenderSettings) -> SplatResult<()> {
        if let Err(err) = settings.validate() {
            tracing::warn!("rejected render settings: {}", err);
            return Err(err);
        }
        if settings.lut_size != self.lut.len() {
            self.lut = FilterLut::new(settings.cutoff_radius, settings.lut_size);
        } else {
            self.lut.regenerate(settings.cutoff_radius);
        }
        self.settings = settings;
        Ok(())
    }

    pub fn set_cutoff_radius(&mut self, cutoff_radius: f32) -> SplatResult<()> {
        let settings = RenderSettings {
            cutoff_radius,
            ..self.settings.clone()
        };
        self.set_settings(settings)
    }

    pub fn splat_function(&self) -> SplatFunction {
        self.splat_function
    }

    pub fn set_splat_function(&mut self, function: SplatFunction) {
        self.splat_function = function;
    }

    pub fn transformation(&self) -> &Transformation {
        self.warper.transformation()
    }

    pub fn set_transformation(&mut self, transformation: Transformation) {
        self.warper.set_transformation(transformation);
    }

    pub fn frustum(&self) -> &Frustum {
        self.warper.frustum()
    }

    pub fn set_frustum(&mut self, frustum: Frustum) {
        self.warper.set_frustum(frustum);
    }

    pub fn viewport(&self) -> Viewport {
        self.viewport
    }

    /// Reallocates every buffer; the current frame is lost.
    pub fn set_viewport(&mut self, viewport: Viewport) -> SplatResult<()> {
        if viewport == self.viewport {
            return Ok(());
        }
        self.frame_buffer.set_size(viewport.width, viewport.height)?;
        self.image.resize(viewport.width, viewport.height, self.settings.background);
        self.viewport = viewport;
        self.magnification = 1;
        self.warper.set_viewport(viewport);
        self.state = FrameState::Idle;
        Ok(())
    }

    /// Eye-space lights (camera looking down `-z`).
    pub fn set_lights(&mut self, lights: Vec<Light>) {
        self.view_lights = lights.iter().map(|l| l.to_view_space()).collect();
        self.lights = lights;
    }

    pub fn lights(&self) -> &[Light] {
        &self.lights
    }

    pub fn magnification(&self) -> usize {
        self.magnification
    }

    /// Renders at `ceil(viewport / m)` and blows each pixel up to an
    /// `m x m` block. Takes effect at the next `begin_frame`.
    pub fn set_magnification(&mut self, magnification: usize) -> SplatResult<()> {
        if magnification == 0 {
            return Err(SplatError::InvalidMagnification(magnification));
        }
        if magnification == self.magnification {
            return Ok(());
        }
        let logical = Viewport::new(
            self.viewport.width.div_ceil(magnification),
            self.viewport.height.div_ceil(magnification),
        )?;
        self.frame_buffer.set_logical_size(logical.width, logical.height)?;
        self.warper.set_viewport(logical);
        self.magnification = magnification;
        self.state = FrameState::Idle;
        tracing::debug!(
            "magnification {} -> logical buffer {}x{}",
            magnification,
            logical.width,
            logical.height
        );
        Ok(())
    }

    pub fn set_attributes(&mut self, attributes: Attributes) {
        self.frame_buffer.set_attributes(attributes);
    }

    pub fn frame_buffer(&self) -> &ExtendedFrameBuffer {
        &self.frame_buffer
    }

    pub fn frame_buffer_mut(&mut self) -> &mut ExtendedFrameBuffer {
        &mut self.frame_buffer
    }

    pub fn warper(&self) -> &Warper {
        &self.warper
    }

    // --- Frame state machine ---

    pub fn frame_state(&self) -> FrameState {
        self.state
    }

    pub fn stats(&self) -> WarpStats {
        self.stats
    }

    /// Union of all pixels touched since the last begin/continue.
    pub fn bbox(&self) -> BoundingBox {
        self.bbox
    }

    pub fn begin_frame(&mut self) {
        self.frame_buffer.reset();
        self.image.fill(self.settings.background);
        self.bbox = BoundingBox::empty();
        self.stats = WarpStats::default();
        self.prepare_shading();
        self.state = FrameState::Warping;
        tracing::trace!("begin frame");
    }

    /// Reopens the current frame for incremental warps without clearing.
    pub fn continue_frame(&mut self) -> SplatResult<()> {
        if self.state == FrameState::Idle {
            return Err(SplatError::FrameNotStarted);
        }
        self.bbox = BoundingBox::empty();
        self.prepare_shading();
        self.state = FrameState::Warping;
        tracing::trace!("continue frame");
        Ok(())
    }

    fn prepare_shading(&mut self) {
        self.shader
            .prepare(&self.settings, &self.view_lights, self.warper.mapping());
    }

    pub fn warp(&mut self, object: Option<ObjectId>, surfels: &[Surfel]) -> SplatResult<WarpStats> {
        self.ensure_warping()?;
        let ctx = RasterContext {
            settings: &self.settings,
            write: self.frame_buffer.zbuffer().prepare_for_writing(&self.settings),
            lut: &self.lut,
            lights: &self.view_lights,
        };
        let stats = self.warper.warp(
            self.splat_function,
            &ctx,
            &mut self.frame_buffer,
            surfels,
            object,
            &mut self.bbox,
        );
        self.stats.merge(&stats);
        Ok(stats)
    }

    pub fn warp_selection(
        &mut self,
        object: Option<ObjectId>,
        surfels: &[Surfel],
        ids: &[SurfelId],
    ) -> SplatResult<WarpStats> {
        self.ensure_warping()?;
        let ctx = RasterContext {
            settings: &self.settings,
            write: self.frame_buffer.zbuffer().prepare_for_writing(&self.settings),
            lut: &self.lut,
            lights: &self.view_lights,
        };
        let stats = self.warper.warp_selection(
            self.splat_function,
            &ctx,
            &mut self.frame_buffer,
            surfels,
            ids,
            object,
            &mut self.bbox,
        )?;
        self.stats.merge(&stats);
        Ok(stats)
    }

    fn ensure_warping(&self) -> SplatResult<()> {
        match self.state {
            FrameState::Warping => Ok(()),
            FrameState::Idle | FrameState::Shaded => Err(SplatError::FrameNotStarted),
        }
    }

    /// Normalizes and shades the touched region into the image. Calling it
    /// again without new warps yields the same image.
    pub fn shade_frame(&mut self) -> SplatResult<&Image> {
        if self.state == FrameState::Idle {
            return Err(SplatError::FrameNotStarted);
        }
        self.shader
            .shade_frame(&self.frame_buffer, self.bbox, &mut self.image, self.magnification);
        self.state = FrameState::Shaded;
        tracing::debug!(
            "shaded frame: {} covered pixels, {} surfels rasterized",
            self.frame_buffer.covered_pixel_count(),
            self.stats.rasterized
        );
        Ok(&self.image)
    }

    pub fn image(&self) -> &Image {
        &self.image
    }
}
