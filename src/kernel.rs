//! The fused forward kernel for a single row.
//!
//! A row is walked in chunks of `block_size` lanes three times: once to sum
//! it, once to sum its squared deviations, once to normalize and apply the
//! affine transform. Lanes past `n_cols` in the last chunk are masked out of
//! every sum and every store.

use crate::aligned::LaneBuffer;
use crate::config::LayerNormConfig;
use crate::element::Element;
use crate::error::LayerNormError;
use crate::lanes::{add_assign, add_squares, reduce_sum};

/// Per-worker lane storage, reused across the rows a worker executes.
pub struct RowScratch {
    acc: LaneBuffer,
    tile: LaneBuffer,
}

impl RowScratch {
    pub fn new(block_size: usize) -> Result<Self, LayerNormError> {
        Ok(RowScratch {
            acc: LaneBuffer::zeroed(block_size)?,
            tile: LaneBuffer::zeroed(block_size)?,
        })
    }

    pub fn block_size(&self) -> usize {
        self.acc.len()
    }
}

/// Normalizes one row.
///
/// `x` and `y` start at the row's first column and must hold at least
/// `config.n_cols` elements; anything past that is padding and is left
/// untouched. `w` and `b` hold `n_cols` elements. `scratch` must have been
/// built for `config.block_size`. `mean` and `rstd` are stored before the
/// first output column is written.
///
/// Shapes are not checked here beyond debug assertions; [`crate::run_grid`]
/// validates them for a whole launch.
#[allow(clippy::too_many_arguments)]
pub fn layer_norm_fwd_fused<T: Element>(
    x: &[T],
    y: &mut [T],
    w: &[T],
    b: &[T],
    mean: &mut f32,
    rstd: &mut f32,
    config: &LayerNormConfig,
    scratch: &mut RowScratch,
) {
    let n = config.n_cols;
    let block = config.block_size;
    debug_assert!(n >= 1);
    debug_assert!(x.len() >= n && y.len() >= n);
    debug_assert!(w.len() >= n && b.len() >= n);
    debug_assert_eq!(scratch.block_size(), block);

    let x = &x[..n];
    let acc = scratch.acc.as_mut_slice();
    let tile = scratch.tile.as_mut_slice();

    // Mean
    acc.fill(0.0);
    for chunk in x.chunks(block) {
        let active = chunk.len();
        for (t, &v) in tile[..active].iter_mut().zip(chunk) {
            *t = v.widen();
        }
        tile[active..].fill(0.0);
        add_assign(acc, tile);
    }
    let row_mean = reduce_sum(acc) / n as f32;

    // Variance; masked lanes are zeroed after the subtraction
    acc.fill(0.0);
    for chunk in x.chunks(block) {
        let active = chunk.len();
        for (t, &v) in tile[..active].iter_mut().zip(chunk) {
            *t = v.widen() - row_mean;
        }
        tile[active..].fill(0.0);
        add_squares(acc, tile);
    }
    let var = reduce_sum(acc) / n as f32;
    let row_rstd = 1.0 / (var + config.eps).sqrt();

    *mean = row_mean;
    *rstd = row_rstd;

    // Normalize and apply the affine transform
    let y = &mut y[..n];
    let chunks = y.chunks_mut(block).zip(x.chunks(block));
    for (chunk_idx, (y_chunk, x_chunk)) in chunks.enumerate() {
        let off = chunk_idx * block;
        let w_chunk = &w[off..off + x_chunk.len()];
        let b_chunk = &b[off..off + x_chunk.len()];
        let lanes = y_chunk.iter_mut().zip(x_chunk).zip(w_chunk).zip(b_chunk);
        for (((out, &xv), &wv), &bv) in lanes {
            let x_hat = (xv.widen() - row_mean) * row_rstd;
            *out = T::narrow(x_hat * wv.widen() + bv.widen());
        }
    }
}
