//! Software EWA surface splatting.
//!
//! Surfels are warped into screen space, rasterized as filtered elliptical
//! footprints into a z-range blending accumulation buffer, and shaded into
//! a packed RGB image. `render::pipeline::SurfelRenderer` drives a frame.

pub mod camera;
pub mod demo;
pub mod error;
pub mod math;
pub mod parser;
pub mod render;
pub mod surfel;

pub use camera::{Camera, Frustum, Transformation, Viewport};
pub use error::{SplatError, SplatResult};
pub use math::Vec3;
pub use render::frame_buffer::{Attributes, ExtendedFrameBuffer};
pub use render::image::Image;
pub use render::lighting::Light;
pub use render::pipeline::{FrameState, SurfelRenderer};
pub use render::rasterizer::{SplatFunction, SplatOutcome};
pub use render::warper::WarpStats;
pub use render::{BoundingBox, RenderSettings, ShadingMode, SpecularModel};
pub use surfel::{Material, ObjectId, Surfel, SurfelId};
