use serde::{Deserialize, Serialize};

use crate::element::Element;
use crate::error::LayerNormError;

pub const DEFAULT_EPS: f32 = 1e-5;

/// Bytes of one row chunk a single program keeps resident.
pub const MAX_FUSED_BYTES: usize = 65536;

/// Hard ceiling on the number of lanes in a block.
pub const MAX_BLOCK_SIZE: usize = 1 << 16;

/// Launch parameters shared by every row of one forward pass.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayerNormConfig {
    /// Number of columns normalized per row (N).
    pub n_cols: usize,
    /// Distance in elements between the starts of consecutive rows.
    pub stride: usize,
    pub eps: f32,
    /// Lanes per chunk; a power of two.
    pub block_size: usize,
}

impl LayerNormConfig {
    /// Dense rows of `n_cols` elements of `T`, default epsilon, and the
    /// block size picked by [`block_size_for`].
    pub fn new<T: Element>(n_cols: usize) -> Self {
        LayerNormConfig {
            n_cols,
            stride: n_cols,
            eps: DEFAULT_EPS,
            block_size: block_size_for::<T>(n_cols),
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_eps(mut self, eps: f32) -> Self {
        self.eps = eps;
        self
    }

    pub fn with_block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Chunks needed to cover one row.
    pub fn num_chunks(&self) -> usize {
        if self.block_size == 0 {
            return 0;
        }
        self.n_cols / self.block_size + usize::from(self.n_cols % self.block_size != 0)
    }

    /// Elements a strided buffer must hold to contain `rows` rows, or `None`
    /// if that does not fit in `usize`.
    pub fn required_len(&self, rows: usize) -> Option<usize> {
        match rows {
            0 => Some(0),
            _ => (rows - 1).checked_mul(self.stride)?.checked_add(self.n_cols),
        }
    }

    pub fn validate(&self) -> Result<(), LayerNormError> {
        if self.n_cols == 0 {
            return Err(LayerNormError::EmptyRow);
        }
        if self.stride < self.n_cols {
            return Err(LayerNormError::StrideTooSmall {
                stride: self.stride,
                n_cols: self.n_cols,
            });
        }
        if !self.block_size.is_power_of_two() {
            return Err(LayerNormError::BlockSizeNotPowerOfTwo(self.block_size));
        }
        if self.block_size > MAX_BLOCK_SIZE {
            return Err(LayerNormError::BlockSizeTooLarge {
                block_size: self.block_size,
                limit: MAX_BLOCK_SIZE,
            });
        }
        if !self.eps.is_finite() || self.eps <= 0.0 {
            return Err(LayerNormError::InvalidEpsilon(self.eps));
        }
        Ok(())
    }
}

/// Next power of two covering the row, capped so one chunk of `T` fits in
/// [`MAX_FUSED_BYTES`]. Longer rows are walked in several chunks.
pub fn block_size_for<T: Element>(n_cols: usize) -> usize {
    let cap = (MAX_FUSED_BYTES / std::mem::size_of::<T>()).max(1);
    n_cols
        .max(1)
        .checked_next_power_of_two()
        .unwrap_or(cap)
        .min(cap)
}

/// Partially specified config, as read from JSON.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerNormSettings {
    pub n_cols: usize,
    pub stride: Option<usize>,
    pub eps: Option<f32>,
    pub block_size: Option<usize>,
}

impl LayerNormSettings {
    pub fn from_json(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Fills unset fields with the defaults for element type `T` and
    /// validates the result.
    pub fn resolve<T: Element>(&self) -> Result<LayerNormConfig, LayerNormError> {
        let mut config = LayerNormConfig::new::<T>(self.n_cols);
        if let Some(stride) = self.stride {
            config = config.with_stride(stride);
        }
        if let Some(eps) = self.eps {
            config = config.with_eps(eps);
        }
        if let Some(block_size) = self.block_size {
            config = config.with_block_size(block_size);
        }
        config.validate()?;
        Ok(config)
    }
}
