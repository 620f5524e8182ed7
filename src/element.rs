use half::{bf16, f16};

/// Storage type for the matrices and the affine parameters.
///
/// Every load widens to `f32` and every store narrows back, so the
/// statistics are accumulated in single precision whatever the storage is.
pub trait Element: Copy + Send + Sync + 'static {
    fn widen(self) -> f32;
    fn narrow(value: f32) -> Self;
}

impl Element for f32 {
    #[inline(always)]
    fn widen(self) -> f32 {
        self
    }

    #[inline(always)]
    fn narrow(value: f32) -> Self {
        value
    }
}

impl Element for f16 {
    #[inline(always)]
    fn widen(self) -> f32 {
        f16::to_f32(self)
    }

    #[inline(always)]
    fn narrow(value: f32) -> Self {
        f16::from_f32(value)
    }
}

impl Element for bf16 {
    #[inline(always)]
    fn widen(self) -> f32 {
        bf16::to_f32(self)
    }

    #[inline(always)]
    fn narrow(value: f32) -> Self {
        bf16::from_f32(value)
    }
}
