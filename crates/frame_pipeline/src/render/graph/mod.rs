//! # Render Graph
//!
//! Static description of what a frame draws and the traversal that records
//! it.
//!
//! ```text
//! RenderSolution
//!  └─ RenderPipeline
//!      └─ RenderPass            (viewport, scissor)
//!          └─ GraphicsSubpass   (attachments, root signature, pass collections)
//!              └─ OrderedRenderQueue
//!                  └─ RenderQueueContent (draw calls, object batches)
//! ```

pub mod content;
pub mod solution;
pub mod traversal;

pub use content::{DrawCall, DrawCallKind, DrawItem, FlattenedObjects, MeshRenderer, RenderQueueContent};
pub use solution::{
    AttachmentBinding, DescriptorArray, GraphicsSubpass, LoadOp, OrderedRenderQueue, RenderGraphResources,
    RenderPass, RenderPipeline, RenderSolution, ViewTransition,
};
pub use traversal::{FrameTarget, GraphRecorder, TraversalScratch};
