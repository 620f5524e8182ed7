//! Fused layer-normalization forward pass.
//!
//! Each row of a row-major, possibly padded matrix is normalized to zero mean
//! and unit variance, then scaled and shifted by per-column weight and bias.
//! The per-row mean and reciprocal standard deviation are written alongside
//! the output so a backward pass can reuse them.
//!
//! [`layer_norm_fwd_fused`] is the single-row kernel; [`run_grid`] validates a
//! launch and executes one kernel instance per row on the rayon pool.

pub mod aligned;
pub mod config;
pub mod element;
pub mod error;
pub mod grid;
pub mod kernel;
pub mod lanes;

pub use aligned::LaneBuffer;
pub use config::{block_size_for, LayerNormConfig, LayerNormSettings, DEFAULT_EPS};
pub use element::Element;
pub use error::LayerNormError;
pub use grid::run_grid;
pub use kernel::{layer_norm_fwd_fused, RowScratch};
