use log::{debug, trace};
use rayon::prelude::*;

use crate::config::LayerNormConfig;
use crate::element::Element;
use crate::error::LayerNormError;
use crate::kernel::{layer_norm_fwd_fused, RowScratch};

/// Runs the fused forward kernel once for every row, rows in parallel.
///
/// The row count is `mean.len()`. Row `r` of `x` and `y` starts at
/// `r * config.stride`; only its first `config.n_cols` elements are read or
/// written. Buffer shapes and the config are checked up front, and nothing
/// is written if any check fails.
pub fn run_grid<T: Element>(
    x: &[T],
    y: &mut [T],
    w: &[T],
    b: &[T],
    mean: &mut [f32],
    rstd: &mut [f32],
    config: &LayerNormConfig,
) -> Result<(), LayerNormError> {
    config.validate()?;
    let rows = mean.len();
    check_shapes(x, y, w, b, rstd, rows, config)?;
    if rows == 0 {
        return Ok(());
    }

    debug!(
        "layer_norm fwd: rows={} n_cols={} stride={} block_size={} chunks={}",
        rows,
        config.n_cols,
        config.stride,
        config.block_size,
        config.num_chunks()
    );

    x.par_chunks(config.stride)
        .zip(y.par_chunks_mut(config.stride))
        .zip(mean.par_iter_mut().zip(rstd.par_iter_mut()))
        .enumerate()
        .try_for_each_init(
            || RowScratch::new(config.block_size),
            |scratch, (row, ((x_row, y_row), (row_mean, row_rstd)))| {
                let scratch = scratch.as_mut().map_err(|e| e.clone())?;
                layer_norm_fwd_fused(x_row, y_row, w, b, row_mean, row_rstd, config, scratch);
                trace!("row {}: mean={} rstd={}", row, row_mean, row_rstd);
                Ok(())
            },
        )
}

fn check_shapes<T: Element>(
    x: &[T],
    y: &[T],
    w: &[T],
    b: &[T],
    rstd: &[f32],
    rows: usize,
    config: &LayerNormConfig,
) -> Result<(), LayerNormError> {
    let exact = |name: &'static str, actual: usize, expected: usize| {
        if actual == expected {
            Ok(())
        } else {
            Err(LayerNormError::BufferLength { name, expected, actual })
        }
    };
    exact("weight", w.len(), config.n_cols)?;
    exact("bias", b.len(), config.n_cols)?;
    exact("rstd", rstd.len(), rows)?;

    let required = config.required_len(rows).ok_or(LayerNormError::ShapeOverflow {
        rows,
        stride: config.stride,
    })?;
    for (name, actual) in [("input", x.len()), ("output", y.len())] {
        if actual < required {
            return Err(LayerNormError::BufferTooShort { name, required, actual });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn strided_rows_are_normalized_independently() {
        let config = LayerNormConfig::new::<f32>(4).with_stride(6).with_block_size(4);
        let pad = -99.0_f32;
        let x = [
            1.0, 2.0, 3.0, 4.0, pad, pad, //
            2.0, 2.0, 6.0, 6.0, pad, pad, //
            -1.0, 0.0, 0.0, 1.0,
        ];
        let mut y = [pad; 16];
        let (mut mean, mut rstd) = ([0.0; 3], [0.0; 3]);
        run_grid(&x, &mut y, &[1.0; 4], &[0.0; 4], &mut mean, &mut rstd, &config).unwrap();

        assert_eq!(mean, [2.5, 4.0, 0.0]);
        assert_abs_diff_eq!(rstd[1], 1.0 / (4.0_f32 + 1e-5).sqrt(), epsilon = 1e-6);
        assert_abs_diff_eq!(y[6], -2.0 * rstd[1], epsilon = 1e-6);
        for &i in &[4, 5, 10, 11] {
            assert_eq!(y[i], pad, "padding column {} was written", i);
        }
    }

    #[test]
    fn no_rows_is_a_no_op() {
        let config = LayerNormConfig::new::<f32>(4);
        let mut y: [f32; 0] = [];
        run_grid(&[], &mut y, &[1.0; 4], &[0.0; 4], &mut [], &mut [], &config).unwrap();
    }

    #[test]
    fn shape_errors_leave_outputs_untouched() {
        let config = LayerNormConfig::new::<f32>(4);
        let x = [1.0_f32; 8];
        let mut y = [5.0_f32; 8];
        let (mut mean, mut rstd) = ([5.0_f32; 2], [5.0_f32; 2]);

        let err = run_grid(&x, &mut y, &[1.0; 3], &[0.0; 4], &mut mean, &mut rstd, &config);
        assert_eq!(
            err,
            Err(LayerNormError::BufferLength { name: "weight", expected: 4, actual: 3 })
        );

        let err = run_grid(&x, &mut y, &[1.0; 4], &[0.0; 4], &mut mean, &mut rstd[..1], &config);
        assert_eq!(
            err,
            Err(LayerNormError::BufferLength { name: "rstd", expected: 2, actual: 1 })
        );

        let err = run_grid(&x[..7], &mut y, &[1.0; 4], &[0.0; 4], &mut mean, &mut rstd, &config);
        assert_eq!(
            err,
            Err(LayerNormError::BufferTooShort { name: "input", required: 8, actual: 7 })
        );

        let err = run_grid(&x, &mut y[..6], &[1.0; 4], &[0.0; 4], &mut mean, &mut rstd, &config);
        assert_eq!(
            err,
            Err(LayerNormError::BufferTooShort { name: "output", required: 8, actual: 6 })
        );

        let err = run_grid(
            &x,
            &mut y,
            &[1.0; 4],
            &[0.0; 4],
            &mut mean,
            &mut rstd,
            &config.with_block_size(3),
        );
        assert_eq!(err, Err(LayerNormError::BlockSizeNotPowerOfTwo(3)));

        assert!(y.iter().chain(&mean).chain(&rstd).all(|&v| v == 5.0));
    }

    #[test]
    fn overflowing_row_span_is_rejected() {
        // 2 * stride wraps around to 0, so a wrapped length check would pass.
        let stride = usize::MAX / 2 + 1;
        let config = LayerNormConfig::new::<f32>(2).with_stride(stride);
        let x = [1.0_f32, 3.0];
        let mut y = [0.0_f32; 2];
        let (mut mean, mut rstd) = ([-1.0_f32; 3], [-1.0_f32; 3]);

        let err = run_grid(&x, &mut y, &[1.0; 2], &[0.0; 2], &mut mean, &mut rstd, &config);
        assert_eq!(err, Err(LayerNormError::ShapeOverflow { rows: 3, stride }));
        assert_eq!(mean, [-1.0; 3]);
        assert_eq!(rstd, [-1.0; 3]);
        assert_eq!(y, [0.0; 2]);
    }
}
