use thiserror::Error;

/// Failures surfaced by buffer, layer stack and codec operations.
///
/// Validation errors are precondition violations: the operation performs no
/// partial mutation and the caller can retry with different input. Codec
/// errors carry the underlying `image` error unchanged.
#[derive(Debug, Error)]
pub enum EditorError {
    #[error("invalid dimension {width}x{height}")]
    InvalidDimension { width: u32, height: u32 },

    #[error("pixel access ({x}, {y}) outside {width}x{height} buffer")]
    OutOfBounds { x: u32, y: u32, width: u32, height: u32 },

    #[error("region has zero area after clipping")]
    EmptyRegion,

    #[error("layer index {index} out of range (stack holds {len})")]
    InvalidIndex { index: usize, len: usize },

    #[error("cannot delete the last remaining layer")]
    LastLayerProtected,

    #[error("image decode failed")]
    DecodeFailure(#[source] image::ImageError),

    #[error("image encode failed")]
    EncodeFailure(#[source] image::ImageError),
}

pub type Result<T> = std::result::Result<T, EditorError>;
