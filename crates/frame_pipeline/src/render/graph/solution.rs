//! Render solutions, pipelines, passes and subpasses
//!
//! The graph is authored offline and shared read-only between the swap chain
//! and every in-flight frame.

use std::sync::Arc;

use crate::render::backend::{
    ClearFlags, CpuDescriptorHandle, ResourceId, ResourceState, RootSignatureId, ScissorRect, Viewport,
};
use crate::render::binding::{ConstantBufferDefinition, DescriptorCollection};
use crate::render::graph::content::RenderQueueContent;
use crate::render::{lookup, RenderResult};

/// What happens to an attachment's contents when a subpass starts
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum LoadOp {
    /// Keep previous contents
    #[default]
    Load,
    /// Contents are undefined
    DontCare,
    /// Clear a render target to a color
    ClearColor([f32; 4]),
    /// Clear a depth-stencil target
    ClearDepthStencil {
        /// Planes to clear
        flags: ClearFlags,
        /// Depth clear value
        depth: f32,
        /// Stencil clear value
        stencil: u8,
    },
}

/// An attachment of a subpass
///
/// `view` indexes the RTV or DSV array of [`RenderGraphResources`]. For
/// render targets, view 0 stands for the current back buffer and view
/// `num_back_buffers` for its sRGB view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttachmentBinding {
    /// Descriptor index
    pub view: u32,
    /// Load behaviour
    pub load_op: LoadOp,
}

impl AttachmentBinding {
    /// Attachment that keeps its contents
    pub fn load(view: u32) -> Self {
        Self { view, load_op: LoadOp::Load }
    }

    /// Attachment cleared with `load_op`
    pub fn cleared(view: u32, load_op: LoadOp) -> Self {
        Self { view, load_op }
    }
}

/// A barrier applied after a subpass finishes
///
/// Framebuffer 0 stands for the current back buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ViewTransition {
    /// Framebuffer index
    pub framebuffer: u32,
    /// State before
    pub source: ResourceState,
    /// State after
    pub target: ResourceState,
}

/// Contents drawn in order under one root signature bind
#[derive(Debug, Clone, Default)]
pub struct OrderedRenderQueue {
    /// Contents in draw order
    pub contents: Vec<Arc<RenderQueueContent>>,
}

/// A graphics subpass
#[derive(Debug, Clone, Default)]
pub struct GraphicsSubpass {
    /// Render targets
    pub output_attachments: Vec<AttachmentBinding>,
    /// Depth-stencil target
    pub depth_stencil_attachment: Option<AttachmentBinding>,
    /// Queues drawn in order
    pub ordered_render_queue: Vec<OrderedRenderQueue>,
    /// Barriers applied after the subpass
    pub post_view_transitions: Vec<ViewTransition>,
    /// Root signature shared by every draw of the subpass
    pub root_signature: RootSignatureId,
    /// Collections bound by the subpass itself
    pub descriptors: Vec<DescriptorCollection>,
    /// Reflected constant buffers of the subpass collections
    pub constant_buffers: Vec<ConstantBufferDefinition>,
}

/// A render pass
#[derive(Debug, Clone, Default)]
pub struct RenderPass {
    /// Debug name
    pub name: String,
    /// At most one viewport
    pub viewports: Vec<Viewport>,
    /// At most one scissor rectangle
    pub scissor_rects: Vec<ScissorRect>,
    /// Subpasses in order
    pub subpasses: Vec<GraphicsSubpass>,
}

/// A render pipeline
#[derive(Debug, Clone, Default)]
pub struct RenderPipeline {
    /// Debug name
    pub name: String,
    /// Passes in order
    pub passes: Vec<RenderPass>,
    /// Declared starting state of each render target, parallel to
    /// [`RenderSolution::rtv_sources`]
    pub rtv_initial_states: Vec<ResourceState>,
}

/// A render solution: alternative pipelines over the same resources
#[derive(Debug, Clone, Default)]
pub struct RenderSolution {
    /// Debug name
    pub name: String,
    /// Pipelines
    pub pipelines: Vec<RenderPipeline>,
    /// Framebuffer index behind each render target
    pub rtv_sources: Vec<u32>,
}

impl RenderSolution {
    /// Pipeline `id`
    pub fn pipeline(&self, id: u32) -> RenderResult<&RenderPipeline> {
        lookup(&self.pipelines, id as usize, "pipeline")
    }
}

/// Contiguous CPU descriptors of one kind
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DescriptorArray {
    /// First descriptor
    pub start: CpuDescriptorHandle,
    /// Handle distance between descriptors
    pub increment: u32,
    /// Number of descriptors
    pub count: u32,
}

impl DescriptorArray {
    /// Handle of descriptor `index`
    pub fn cpu_handle(&self, index: u32) -> RenderResult<CpuDescriptorHandle> {
        if index >= self.count {
            return Err(crate::render::RenderError::out_of_range(
                "descriptor",
                index as usize,
                self.count as usize,
            ));
        }
        Ok(self.start.offset(index, self.increment))
    }
}

/// GPU objects backing a render graph
#[derive(Debug, Clone, Default)]
pub struct RenderGraphResources {
    /// Framebuffers; the first `num_back_buffers` are the swap chain images
    pub framebuffers: Vec<ResourceId>,
    /// Render target views
    pub rtvs: DescriptorArray,
    /// Depth-stencil views
    pub dsvs: DescriptorArray,
    /// Swap chain image count
    pub num_back_buffers: u32,
}

impl RenderGraphResources {
    /// Framebuffer `index`
    pub fn framebuffer(&self, index: u32) -> RenderResult<ResourceId> {
        lookup(&self.framebuffers, index as usize, "framebuffer").copied()
    }
}
