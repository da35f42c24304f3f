//! Backend abstraction traits for the frame pipeline
//!
//! The frame queue, descriptor resolver and render graph traversal never talk
//! to a graphics API directly. They record into the traits defined here, which
//! mirror an immediate-mode command stream: a command list is reset, filled in
//! order, closed and executed on a single direct queue, and a monotonically
//! increasing fence reports how far the GPU has progressed.
//!
//! The plain handle types below are opaque to the core; backends decide what
//! the numbers mean (heap offsets, object ids, GPU virtual addresses).

use crate::render::RenderResult;

/// CPU-side descriptor handle used when writing descriptors
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CpuDescriptorHandle(pub u64);

impl CpuDescriptorHandle {
    /// Handle `index` descriptors past this one
    pub fn offset(self, index: u32, increment: u32) -> Self {
        Self(self.0 + u64::from(index) * u64::from(increment))
    }
}

/// GPU-side descriptor handle bound as a descriptor table
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GpuDescriptorHandle(pub u64);

impl GpuDescriptorHandle {
    /// Handle `index` descriptors past this one
    pub fn offset(self, index: u32, increment: u32) -> Self {
        Self(self.0 + u64::from(index) * u64::from(increment))
    }
}

/// A CPU/GPU descriptor handle pair addressing one heap slot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct DescriptorHandle {
    /// Handle used to write the descriptor
    pub cpu: CpuDescriptorHandle,
    /// Handle used to bind the descriptor
    pub gpu: GpuDescriptorHandle,
}

/// Description of a shader-visible descriptor heap
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DescriptorHeapInfo {
    /// Handles of the first descriptor in the heap
    pub start: DescriptorHandle,
    /// Distance in handle units between adjacent descriptors
    pub increment: u32,
    /// Number of descriptors in the heap
    pub capacity: u32,
}

/// Identifier of a GPU resource (texture, framebuffer, buffer)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ResourceId(pub u64);

/// Identifier of a compiled pipeline state object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct PipelineStateId(pub u64);

/// Identifier of a root signature
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RootSignatureId(pub u64);

/// Primitive topology set on the input assembler
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum PrimitiveTopology {
    /// Nothing bound yet
    #[default]
    Undefined,
    /// Point list
    PointList,
    /// Line list
    LineList,
    /// Line strip
    LineStrip,
    /// Triangle list
    TriangleList,
    /// Triangle strip
    TriangleStrip,
}

/// Resource usage state tracked by transition barriers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceState {
    /// Common state, shared with presentation
    Common,
    /// Ready for presentation (same bits as `Common`)
    Present,
    /// Bound as a render target
    RenderTarget,
    /// Bound as a writable depth buffer
    DepthWrite,
    /// Bound as a read-only depth buffer
    DepthRead,
    /// Read by pixel shaders
    PixelShaderResource,
    /// Read by non-pixel shader stages
    NonPixelShaderResource,
    /// Source of a copy
    CopySource,
    /// Destination of a copy
    CopyDest,
    /// Unordered access
    UnorderedAccess,
    /// Generic read, used for upload memory
    GenericRead,
}

impl ResourceState {
    /// Whether this state has the common (zero) bit pattern
    pub fn is_common(self) -> bool {
        matches!(self, Self::Common | Self::Present)
    }
}

/// A state transition applied to one resource
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransitionBarrier {
    /// Transitioned resource
    pub resource: ResourceId,
    /// State before the barrier
    pub before: ResourceState,
    /// State after the barrier
    pub after: ResourceState,
}

impl TransitionBarrier {
    /// Create a transition barrier
    pub fn transition(resource: ResourceId, before: ResourceState, after: ResourceState) -> Self {
        Self { resource, before, after }
    }
}

/// Rasterizer viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge
    pub top_left_x: f32,
    /// Top edge
    pub top_left_y: f32,
    /// Width in pixels
    pub width: f32,
    /// Height in pixels
    pub height: f32,
    /// Minimum depth
    pub min_depth: f32,
    /// Maximum depth
    pub max_depth: f32,
}

impl Viewport {
    /// Full-depth viewport covering `width` x `height` pixels
    pub fn new(width: f32, height: f32) -> Self {
        Self {
            top_left_x: 0.0,
            top_left_y: 0.0,
            width,
            height,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// Scissor rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScissorRect {
    /// Left edge
    pub left: i32,
    /// Top edge
    pub top: i32,
    /// Right edge (exclusive)
    pub right: i32,
    /// Bottom edge (exclusive)
    pub bottom: i32,
}

/// Vertex buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexBufferView {
    /// GPU virtual address of the first vertex
    pub buffer_location: u64,
    /// Size of the view in bytes
    pub size_in_bytes: u32,
    /// Distance between vertices
    pub stride_in_bytes: u32,
}

/// Index buffer binding
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexBufferView {
    /// GPU virtual address of the first index
    pub buffer_location: u64,
    /// Size of the view in bytes
    pub size_in_bytes: u32,
    /// Whether indices are 32-bit (otherwise 16-bit)
    pub wide_indices: bool,
}

/// Constant buffer view written into a descriptor slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConstantBufferViewDesc {
    /// GPU virtual address of the constant data
    pub buffer_location: u64,
    /// Size of the constant data in bytes
    pub size_in_bytes: u32,
}

bitflags::bitflags! {
    /// Which aspects of a depth-stencil view to clear
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClearFlags: u32 {
        /// Clear the depth plane
        const DEPTH = 0b01;
        /// Clear the stencil plane
        const STENCIL = 0b10;
    }
}

/// Command recording interface
///
/// Commands execute on the GPU in exactly the order they are recorded.
pub trait CommandList {
    /// Reset the list (and its allocator) for a new frame of recording
    fn reset(&mut self) -> RenderResult<()>;

    /// Finish recording; the list can then be executed
    fn close(&mut self) -> RenderResult<()>;

    /// Bind the shader-visible descriptor heap
    fn set_descriptor_heaps(&mut self, heap: &DescriptorHeapInfo);

    /// Bind a viewport
    fn set_viewport(&mut self, viewport: &Viewport);

    /// Bind a scissor rectangle
    fn set_scissor_rect(&mut self, rect: &ScissorRect);

    /// Clear a render target view
    fn clear_render_target_view(&mut self, rtv: CpuDescriptorHandle, color: [f32; 4]);

    /// Clear a depth-stencil view
    fn clear_depth_stencil_view(&mut self, dsv: CpuDescriptorHandle, flags: ClearFlags, depth: f32, stencil: u8);

    /// Bind output merger targets
    fn set_render_targets(&mut self, rtvs: &[CpuDescriptorHandle], dsv: Option<CpuDescriptorHandle>);

    /// Bind the graphics root signature
    fn set_graphics_root_signature(&mut self, root_signature: RootSignatureId);

    /// Bind a descriptor table at a root parameter slot
    fn set_graphics_root_descriptor_table(&mut self, slot: u32, table: GpuDescriptorHandle);

    /// Bind a pipeline state object
    fn set_pipeline_state(&mut self, pipeline_state: PipelineStateId);

    /// Set the input assembler topology
    fn set_primitive_topology(&mut self, topology: PrimitiveTopology);

    /// Bind vertex buffers starting at `start_slot`; an empty slice unbinds
    fn set_vertex_buffers(&mut self, start_slot: u32, views: &[VertexBufferView]);

    /// Bind or unbind the index buffer
    fn set_index_buffer(&mut self, view: Option<&IndexBufferView>);

    /// Non-indexed instanced draw
    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, start_vertex: u32, start_instance: u32);

    /// Indexed instanced draw
    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    );

    /// Apply a batch of transition barriers
    fn resource_barrier(&mut self, barriers: &[TransitionBarrier]);
}

/// CPU/GPU completion counter
pub trait GpuFence {
    /// Highest value the GPU has signaled so far
    fn completed_value(&self) -> RenderResult<u64>;

    /// Block the calling thread until the fence reaches `value`
    fn wait_for_value(&self, value: u64) -> RenderResult<()>;
}

/// The single graphics queue command lists are submitted to
pub trait CommandQueue {
    /// Command list type this queue executes
    type CommandList: CommandList;
    /// Fence type this queue signals
    type Fence: GpuFence;

    /// Submit a closed command list
    fn execute(&self, list: &Self::CommandList) -> RenderResult<()>;

    /// Signal `fence` with `value` once all prior submissions complete
    fn signal(&self, fence: &Self::Fence, value: u64) -> RenderResult<()>;
}

/// Persistently mapped, GPU-visible upload memory
pub trait UploadMemory {
    /// GPU virtual address of the first byte
    fn gpu_address(&self) -> u64;

    /// Size in bytes
    fn size(&self) -> u64;

    /// Copy `data` into the mapping at `offset`
    fn write(&mut self, offset: u64, data: &[u8]) -> RenderResult<()>;
}

/// Device-level object creation used by the frame queue
pub trait GraphicsDevice {
    /// Command list type
    type CommandList: CommandList;
    /// Fence type
    type Fence: GpuFence;
    /// Direct queue type
    type Queue: CommandQueue<CommandList = Self::CommandList, Fence = Self::Fence>;
    /// Upload memory type
    type UploadMemory: UploadMemory;

    /// Create a closed command list with its own allocator
    fn create_command_list(&self, name: &str) -> RenderResult<Self::CommandList>;

    /// Create the direct (graphics) queue
    fn create_direct_queue(&self) -> RenderResult<Self::Queue>;

    /// Create a fence starting at `initial_value`
    fn create_fence(&self, initial_value: u64, name: &str) -> RenderResult<Self::Fence>;

    /// Create the shader-visible CBV/SRV/UAV descriptor heap
    fn create_shader_descriptor_heap(&self, capacity: u32) -> RenderResult<DescriptorHeapInfo>;

    /// Create mapped upload memory of `size` bytes
    fn create_upload_memory(&self, size: u64) -> RenderResult<Self::UploadMemory>;

    /// Write a constant buffer view into a descriptor slot
    fn create_constant_buffer_view(&self, desc: &ConstantBufferViewDesc, dest: CpuDescriptorHandle);
}
