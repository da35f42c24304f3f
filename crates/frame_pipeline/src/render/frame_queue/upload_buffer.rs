//! Transient upload memory
//!
//! One mapped upload allocation split into a region per frame in flight.
//! Each frame appends to its region with a bump pointer; the region is
//! reused once the frame queue has waited on the frame that last wrote it.

use crate::foundation::math::utils::align_up;
use crate::render::backend::UploadMemory;
use crate::render::{RenderError, RenderResult};

/// Where uploaded data landed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadPosition {
    /// GPU virtual address of the first byte
    pub gpu_address: u64,
    /// Byte offset from the start of the upload memory
    pub buffer_offset: u64,
}

/// Per-frame ring over one upload allocation
#[derive(Debug)]
pub struct TransientUploadBuffer<M> {
    memory: M,
    per_frame_size: u64,
    frame_count: u32,
    generation: u32,
    used: u64,
}

impl<M: UploadMemory> TransientUploadBuffer<M> {
    /// Split `memory` into `frame_count` equal regions
    pub fn new(memory: M, frame_count: u32) -> RenderResult<Self> {
        if frame_count == 0 {
            return Err(RenderError::Misuse("upload buffer needs at least one frame".to_string()));
        }
        let per_frame_size = memory.size() / u64::from(frame_count);
        if per_frame_size == 0 {
            return Err(RenderError::Misuse("upload memory too small to split between frames".to_string()));
        }

        Ok(Self {
            memory,
            per_frame_size,
            frame_count,
            generation: 0,
            used: 0,
        })
    }

    /// Bytes each frame may upload
    pub fn per_frame_size(&self) -> u64 {
        self.per_frame_size
    }

    /// Bytes consumed in the current region, including alignment padding
    pub fn used(&self) -> u64 {
        self.used
    }

    /// Backing memory
    pub fn memory(&self) -> &M {
        &self.memory
    }

    /// Copy `count` packed elements from `data` into this frame's region
    ///
    /// The start is aligned to `alignment`, which must be a power of two.
    pub fn upload(&mut self, data: &[u8], count: usize, alignment: u64) -> RenderResult<UploadPosition> {
        if count == 0 || data.is_empty() {
            return Err(RenderError::Misuse("empty upload".to_string()));
        }
        if data.len() % count != 0 {
            return Err(RenderError::Misuse(format!(
                "{} bytes do not divide into {} elements",
                data.len(),
                count
            )));
        }
        if !alignment.is_power_of_two() {
            return Err(RenderError::Misuse(format!("upload alignment {alignment} is not a power of two")));
        }

        let region_start = u64::from(self.generation) * self.per_frame_size;
        let offset = align_up(region_start + self.used, alignment);
        let end = offset + data.len() as u64;
        if end > region_start + self.per_frame_size {
            return Err(RenderError::UploadCapacityExceeded {
                required: end - region_start,
                available: self.per_frame_size,
            });
        }

        self.memory.write(offset, data)?;
        self.used = end - region_start;

        Ok(UploadPosition {
            gpu_address: self.memory.gpu_address() + offset,
            buffer_offset: offset,
        })
    }

    /// Move to the next region and forget its previous contents
    pub fn advance_frame(&mut self) {
        self.generation = (self.generation + 1) % self.frame_count;
        self.used = 0;
    }
}
