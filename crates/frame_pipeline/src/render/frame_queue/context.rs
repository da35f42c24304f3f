//! One slot of the in-flight frame ring

use std::sync::Arc;

use crate::render::graph::{RenderGraphResources, RenderSolution};
use crate::render::{RenderError, RenderResult};

/// Where a frame is in its begin/render/end cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FramePhase {
    /// Never used, or ended
    Idle,
    /// Begun; the command list is open
    Recording,
    /// Command list executed; waiting for `end_frame`
    Submitted,
}

/// Recording state owned by one ring slot
///
/// The slot is reused only after the fence has reached `fence_value`.
pub struct FrameContext<L> {
    pub(crate) command_list: L,
    pub(crate) fence_value: u64,
    pub(crate) phase: FramePhase,
    pub(crate) back_buffer_index: u32,
    pub(crate) back_buffer_count: u32,
    pub(crate) solution_id: u32,
    pub(crate) pipeline_id: u32,
    pub(crate) render_graph: Option<Arc<RenderGraphResources>>,
    pub(crate) solution: Option<Arc<RenderSolution>>,
}

impl<L> FrameContext<L> {
    pub(crate) fn new(command_list: L) -> Self {
        Self {
            command_list,
            fence_value: 0,
            phase: FramePhase::Idle,
            back_buffer_index: 0,
            back_buffer_count: 0,
            solution_id: 0,
            pipeline_id: 0,
            render_graph: None,
            solution: None,
        }
    }

    /// Command list recorded by this slot
    pub fn command_list(&self) -> &L {
        &self.command_list
    }

    /// Fence value signaled when this frame completes
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }

    /// Current phase of the slot
    pub fn phase(&self) -> FramePhase {
        self.phase
    }

    /// Swap chain image captured at `begin_frame`
    pub fn back_buffer_index(&self) -> u32 {
        self.back_buffer_index
    }

    /// Swap chain image count captured at `begin_frame`
    pub fn back_buffer_count(&self) -> u32 {
        self.back_buffer_count
    }

    /// Solution drawn by this frame
    pub fn solution_id(&self) -> u32 {
        self.solution_id
    }

    /// Pipeline drawn by this frame
    pub fn pipeline_id(&self) -> u32 {
        self.pipeline_id
    }

    /// Render graph captured at `begin_frame`
    pub fn render_graph(&self) -> RenderResult<&Arc<RenderGraphResources>> {
        self.render_graph
            .as_ref()
            .ok_or_else(|| RenderError::Misuse("frame has no render graph".to_string()))
    }

    /// Solution captured at `begin_frame`
    pub fn solution(&self) -> RenderResult<&Arc<RenderSolution>> {
        self.solution
            .as_ref()
            .ok_or_else(|| RenderError::Misuse("frame has no render solution".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_context_has_no_captured_graph() {
        let context = FrameContext::new(());
        assert_eq!(context.phase(), FramePhase::Idle);
        assert_eq!(context.fence_value(), 0);
        assert!(context.render_graph().is_err());
        assert!(context.solution().is_err());
    }
}
