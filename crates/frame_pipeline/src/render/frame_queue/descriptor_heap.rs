//! Shader-visible descriptor heap partitioning
//!
//! ```text
//! | persistent prefix | gen 0 | gen 1 | ... | gen N-1 |
//!                     \_________ circular reserve _________/
//! ```
//!
//! The persistent prefix is handed out once, for tables baked at load time.
//! The circular reserve is split evenly between the frames in flight; each
//! frame allocates linearly from its own generation and the generation is
//! recycled only after the frame queue has waited on the frame that last used
//! it.

use crate::render::backend::{DescriptorHandle, DescriptorHeapInfo};
use crate::render::{RenderError, RenderResult};

/// Persistent plus per-frame circular allocation over one descriptor heap
#[derive(Debug, Clone)]
pub struct CircularDescriptorAllocator {
    heap: DescriptorHeapInfo,
    persistent_capacity: u32,
    persistent_used: u32,
    per_frame_capacity: u32,
    frame_count: u32,
    generation: u32,
    used: u32,
}

impl CircularDescriptorAllocator {
    /// Partition `heap`, reserving `circular_reserve` descriptors at its end
    pub fn new(heap: DescriptorHeapInfo, circular_reserve: u32, frame_count: u32) -> RenderResult<Self> {
        if frame_count == 0 {
            return Err(RenderError::Misuse("descriptor allocator needs at least one frame".to_string()));
        }
        if circular_reserve > heap.capacity {
            return Err(RenderError::Misuse(format!(
                "circular reserve {} exceeds heap capacity {}",
                circular_reserve, heap.capacity
            )));
        }

        let per_frame_capacity = circular_reserve / frame_count;
        if per_frame_capacity == 0 {
            return Err(RenderError::Misuse(
                "circular reserve leaves no descriptors per frame".to_string(),
            ));
        }

        Ok(Self {
            heap,
            persistent_capacity: heap.capacity - circular_reserve,
            persistent_used: 0,
            per_frame_capacity,
            frame_count,
            generation: 0,
            used: 0,
        })
    }

    /// Heap this allocator partitions
    pub fn heap(&self) -> &DescriptorHeapInfo {
        &self.heap
    }

    /// Descriptors each generation can hand out
    pub fn per_frame_capacity(&self) -> u32 {
        self.per_frame_capacity
    }

    /// Descriptors handed out in the current generation
    pub fn circular_used(&self) -> u32 {
        self.used
    }

    /// Generation currently allocated from
    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Reserve `count` descriptors from the persistent prefix for good
    pub fn allocate_persistent(&mut self, count: u32) -> RenderResult<DescriptorHandle> {
        if count == 0 {
            return Err(RenderError::Misuse("zero-sized persistent descriptor allocation".to_string()));
        }
        let end = self
            .persistent_used
            .checked_add(count)
            .filter(|end| *end <= self.persistent_capacity)
            .ok_or(RenderError::PersistentDescriptorsExhausted {
                requested: count,
                used: self.persistent_used,
                capacity: self.persistent_capacity,
            })?;

        let base = self.handle_at(self.persistent_used);
        self.persistent_used = end;
        Ok(base)
    }

    /// Allocate `capacity` contiguous descriptors from this frame's generation
    ///
    /// Returns the handles of the first descriptor; use [`Self::advance`] to
    /// address the rest.
    pub fn allocate_circular(&mut self, capacity: u32) -> RenderResult<DescriptorHandle> {
        if capacity == 0 {
            return Err(RenderError::Misuse("zero-sized circular descriptor allocation".to_string()));
        }
        let end = self
            .used
            .checked_add(capacity)
            .filter(|end| *end <= self.per_frame_capacity)
            .ok_or(RenderError::DescriptorCapacityExceeded {
                requested: capacity,
                used: self.used,
                capacity: self.per_frame_capacity,
            })?;

        let first = self.persistent_capacity + self.generation * self.per_frame_capacity + self.used;
        self.used = end;
        Ok(self.handle_at(first))
    }

    /// Handles `offset` descriptors past `base`
    pub fn advance(&self, base: DescriptorHandle, offset: u32) -> DescriptorHandle {
        DescriptorHandle {
            cpu: base.cpu.offset(offset, self.heap.increment),
            gpu: base.gpu.offset(offset, self.heap.increment),
        }
    }

    /// Move to the next generation and forget its previous allocations
    pub fn advance_frame(&mut self) {
        self.generation = (self.generation + 1) % self.frame_count;
        self.used = 0;
    }

    fn handle_at(&self, index: u32) -> DescriptorHandle {
        self.advance(self.heap.start, index)
    }
}
