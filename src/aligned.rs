use std::alloc::{alloc_zeroed, dealloc, Layout};
use std::ptr::NonNull;

use crate::error::LayerNormError;

/// Alignment of every lane buffer, one AVX register.
pub const LANE_ALIGN: usize = 32;

/// Zero-initialised, 32-byte aligned run of `f32` lanes.
///
/// Plays the part of a block-size-wide register file for one row: the
/// running sums and the masked tile a chunk is loaded into.
pub struct LaneBuffer {
    data: NonNull<f32>,
    len: usize,
}

// The buffer owns its allocation outright, like a `Vec<f32>`.
unsafe impl Send for LaneBuffer {}
unsafe impl Sync for LaneBuffer {}

impl LaneBuffer {
    pub fn zeroed(len: usize) -> Result<Self, LayerNormError> {
        let layout = Self::layout(len)?;
        // Zero-sized allocations are UB for the global allocator.
        if layout.size() == 0 {
            return Ok(LaneBuffer {
                data: NonNull::dangling(),
                len: 0,
            });
        }
        let data = unsafe { alloc_zeroed(layout) } as *mut f32;
        let data = NonNull::new(data).ok_or(LayerNormError::Allocation(len))?;
        Ok(LaneBuffer { data, len })
    }

    fn layout(len: usize) -> Result<Layout, LayerNormError> {
        len.checked_mul(std::mem::size_of::<f32>())
            .and_then(|size| Layout::from_size_align(size, LANE_ALIGN).ok())
            .ok_or(LayerNormError::Allocation(len))
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[inline]
    pub fn as_slice(&self) -> &[f32] {
        unsafe { std::slice::from_raw_parts(self.data.as_ptr(), self.len) }
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [f32] {
        unsafe { std::slice::from_raw_parts_mut(self.data.as_ptr(), self.len) }
    }

    pub fn clear(&mut self) {
        self.as_mut_slice().fill(0.0);
    }
}

impl Drop for LaneBuffer {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        // Same layout that allocated it, so this cannot fail.
        if let Ok(layout) = Self::layout(self.len) {
            unsafe { dealloc(self.data.as_ptr() as *mut u8, layout) };
        }
    }
}
