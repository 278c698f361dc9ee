//! Error types for the splatting library.

use thiserror::Error;

use crate::surfel::SurfelId;

pub type SplatResult<T> = Result<T, SplatError>;

/// API misuse and I/O failures. Degenerate geometry is never reported here;
/// see `render::rasterizer::SplatOutcome`.
#[derive(Error, Debug)]
pub enum SplatError {
    #[error("cutoff radius must be positive and finite, got {0}")]
    InvalidCutoffRadius(f32),

    #[error("filter table needs at least one entry")]
    EmptyFilterTable,

    #[error("viewport must be non-empty, got {width}x{height}")]
    InvalidViewport { width: usize, height: usize },

    #[error(
        "requested size {width}x{height} exceeds allocated capacity \
         {capacity_width}x{capacity_height}"
    )]
    ExceedsCapacity {
        width: usize,
        height: usize,
        capacity_width: usize,
        capacity_height: usize,
    },

    #[error("magnification must be at least 1, got {0}")]
    InvalidMagnification(usize),

    #[error("frustum is invalid: {0}")]
    InvalidFrustum(String),

    #[error("warp called outside an open frame (call begin_frame or continue_frame first)")]
    FrameNotStarted,

    #[error("surfel {id:?} out of range for a collection of {len}")]
    SurfelOutOfRange { id: SurfelId, len: usize },

    #[error("PLY parse error: {0}")]
    Ply(String),

    #[error("image encoding error: {0}")]
    Image(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
