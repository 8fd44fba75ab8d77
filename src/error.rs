//! Error types for the pixel-art engine.

use thiserror::Error;

/// Errors the engine can return. The engine is pure compute — it never
/// performs I/O, so every variant describes a caller-supplied shape or
/// index problem, not a transient failure.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum PixelartError {
    /// Output dimensions were non-positive, the palette size was `< 1`, or
    /// the input image was empty.
    #[error("invalid dimensions: {0}")]
    InvalidDimensions(String),
    /// A weights grid or pixel-constraint index didn't match the expected
    /// shape.
    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),
    /// A palette index passed to a setter was `>=` the effective palette
    /// size at the time of the call.
    #[error("palette index {index} out of range (effective palette size {size})")]
    PaletteIndexOutOfRange {
        /// The offending index.
        index: usize,
        /// The effective palette size at the time of the call.
        size: usize,
    },
}

/// Crate-local result alias.
pub type Result<T> = std::result::Result<T, PixelartError>;
