//! Lane-wise primitives over block-size-wide `f32` buffers.
//!
//! These stand in for the vector lanes of a row program: elementwise
//! accumulation into a running sum, and the collapse of that sum to a single
//! scalar. The AVX2 path uses plain adds and multiplies (no FMA) so it
//! produces exactly the bits of the scalar loop.

#[cfg(all(target_arch = "x86_64", feature = "avx2"))]
use std::arch::x86_64::*;

/// `acc[i] += src[i]`
#[inline]
pub fn add_assign(acc: &mut [f32], src: &[f32]) {
    debug_assert_eq!(acc.len(), src.len());
    #[cfg(all(target_arch = "x86_64", feature = "avx2"))]
    {
        if is_x86_feature_detected!("avx2") {
            // SAFETY: AVX2 was detected at runtime.
            unsafe { add_assign_avx2(acc, src) };
            return;
        }
    }
    add_assign_scalar(acc, src);
}

/// `acc[i] += src[i] * src[i]`
#[inline]
pub fn add_squares(acc: &mut [f32], src: &[f32]) {
    debug_assert_eq!(acc.len(), src.len());
    #[cfg(all(target_arch = "x86_64", feature = "avx2"))]
    {
        if is_x86_feature_detected!("avx2") {
            // SAFETY: AVX2 was detected at runtime.
            unsafe { add_squares_avx2(acc, src) };
            return;
        }
    }
    add_squares_scalar(acc, src);
}

/// Collapses the lanes to their sum with a pairwise tree.
///
/// The upper half is folded onto the lower half until one lane is left, so
/// the summation order depends only on `acc.len()`. Lengths that are not a
/// power of two carry their odd lane into the next level. The contents of
/// `acc` are consumed.
pub fn reduce_sum(acc: &mut [f32]) -> f32 {
    if acc.is_empty() {
        return 0.0;
    }
    let mut width = acc.len();
    while width > 1 {
        let half = width / 2;
        let (lo, hi) = acc[..width].split_at_mut(width - half);
        add_assign(&mut lo[..half], hi);
        width -= half;
    }
    acc[0]
}

pub(crate) fn add_assign_scalar(acc: &mut [f32], src: &[f32]) {
    acc.iter_mut().zip(src).for_each(|(a, &s)| *a += s);
}

pub(crate) fn add_squares_scalar(acc: &mut [f32], src: &[f32]) {
    acc.iter_mut().zip(src).for_each(|(a, &s)| *a += s * s);
}

#[cfg(all(target_arch = "x86_64", feature = "avx2"))]
#[target_feature(enable = "avx2")]
pub(crate) unsafe fn add_assign_avx2(acc: &mut [f32], src: &[f32]) {
    let n = acc.len().min(src.len());
    let n_simd = n - (n % 8);
    let mut i = 0;
    while i < n_simd {
        let a: __m256 = _mm256_loadu_ps(acc.as_ptr().add(i));
        let s: __m256 = _mm256_loadu_ps(src.as_ptr().add(i));
        _mm256_storeu_ps(acc.as_mut_ptr().add(i), _mm256_add_ps(a, s));
        i += 8;
    }
    add_assign_scalar(&mut acc[n_simd..n], &src[n_simd..n]);
}

#[cfg(all(target_arch = "x86_64", feature = "avx2"))]
#[target_feature(enable = "avx2")]
pub(crate) unsafe fn add_squares_avx2(acc: &mut [f32], src: &[f32]) {
    let n = acc.len().min(src.len());
    let n_simd = n - (n % 8);
    let mut i = 0;
    while i < n_simd {
        let a: __m256 = _mm256_loadu_ps(acc.as_ptr().add(i));
        let s: __m256 = _mm256_loadu_ps(src.as_ptr().add(i));
        let sq: __m256 = _mm256_mul_ps(s, s);
        _mm256_storeu_ps(acc.as_mut_ptr().add(i), _mm256_add_ps(a, sq));
        i += 8;
    }
    add_squares_scalar(&mut acc[n_simd..n], &src[n_simd..n]);
}
