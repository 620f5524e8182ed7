use thiserror::Error;

/// Rejections raised before any row is executed.
///
/// The row kernel itself never fails; everything that could make it read or
/// write out of bounds is caught here, at the config and grid boundary.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LayerNormError {
    #[error("row length must be at least 1")]
    EmptyRow,

    #[error("row stride {stride} is smaller than the row length {n_cols}")]
    StrideTooSmall { stride: usize, n_cols: usize },

    #[error("block size {0} is not a power of two")]
    BlockSizeNotPowerOfTwo(usize),

    #[error("block size {block_size} exceeds the limit of {limit} lanes")]
    BlockSizeTooLarge { block_size: usize, limit: usize },

    #[error("epsilon must be finite and positive, got {0}")]
    InvalidEpsilon(f32),

    #[error("{name} holds {actual} elements, expected {expected}")]
    BufferLength {
        name: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("{name} holds {actual} elements, needs at least {required}")]
    BufferTooShort {
        name: &'static str,
        required: usize,
        actual: usize,
    },

    #[error("{rows} rows with stride {stride} do not fit in the address space")]
    ShapeOverflow { rows: usize, stride: usize },

    #[error("cannot allocate {0} accumulator lanes")]
    Allocation(usize),
}
