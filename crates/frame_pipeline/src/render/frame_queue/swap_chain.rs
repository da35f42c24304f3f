//! What the frame queue needs to know about the presentation surface

use std::sync::Arc;

use crate::render::graph::{RenderGraphResources, RenderSolution};

/// Source of the back buffer and render graph a frame is recorded against
pub trait SwapChain {
    /// Whether frames can currently be rendered
    fn is_valid(&self) -> bool;

    /// Back buffer the next frame renders into
    fn current_back_buffer_index(&self) -> u32;

    /// GPU objects of the active render graph
    fn render_graph(&self) -> &Arc<RenderGraphResources>;

    /// Active render solution
    fn current_solution(&self) -> &Arc<RenderSolution>;

    /// Index of the active solution
    fn solution_id(&self) -> u32;

    /// Index of the active pipeline within the solution
    fn pipeline_id(&self) -> u32;

    /// Number of swap chain images
    fn back_buffer_count(&self) -> u32 {
        self.render_graph().num_back_buffers
    }
}

/// Plain-data swap chain with a rotating back buffer
#[derive(Debug, Clone)]
pub struct SwapChainState {
    /// Graph resources
    pub resources: Arc<RenderGraphResources>,
    /// Solution drawn each frame
    pub solution: Arc<RenderSolution>,
    /// Index of `solution`
    pub solution_id: u32,
    /// Pipeline drawn each frame
    pub pipeline_id: u32,
    /// Current back buffer
    pub back_buffer_index: u32,
    /// Cleared when the surface is lost
    pub valid: bool,
}

impl SwapChainState {
    /// Swap chain drawing pipeline 0 of solution 0
    pub fn new(resources: Arc<RenderGraphResources>, solution: Arc<RenderSolution>) -> Self {
        Self {
            resources,
            solution,
            solution_id: 0,
            pipeline_id: 0,
            back_buffer_index: 0,
            valid: true,
        }
    }

    /// Select the solution and pipeline to draw
    pub fn with_pipeline(mut self, solution_id: u32, pipeline_id: u32) -> Self {
        self.solution_id = solution_id;
        self.pipeline_id = pipeline_id;
        self
    }

    /// Flip to the next back buffer
    pub fn present(&mut self) {
        let count = self.resources.num_back_buffers.max(1);
        self.back_buffer_index = (self.back_buffer_index + 1) % count;
    }
}

impl SwapChain for SwapChainState {
    fn is_valid(&self) -> bool {
        self.valid && self.resources.num_back_buffers > 0
    }

    fn current_back_buffer_index(&self) -> u32 {
        self.back_buffer_index
    }

    fn render_graph(&self) -> &Arc<RenderGraphResources> {
        &self.resources
    }

    fn current_solution(&self) -> &Arc<RenderSolution> {
        &self.solution
    }

    fn solution_id(&self) -> u32 {
        self.solution_id
    }

    fn pipeline_id(&self) -> u32 {
        self.pipeline_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_present_rotates_back_buffers() {
        let resources = RenderGraphResources {
            num_back_buffers: 2,
            ..RenderGraphResources::default()
        };
        let mut swap_chain = SwapChainState::new(Arc::new(resources), Arc::new(RenderSolution::default()));
        assert!(swap_chain.is_valid());
        assert_eq!(swap_chain.back_buffer_count(), 2);

        swap_chain.present();
        assert_eq!(swap_chain.current_back_buffer_index(), 1);
        swap_chain.present();
        assert_eq!(swap_chain.current_back_buffer_index(), 0);
    }

    #[test]
    fn test_swap_chain_without_images_is_invalid() {
        let swap_chain = SwapChainState::new(
            Arc::new(RenderGraphResources::default()),
            Arc::new(RenderSolution::default()),
        );
        assert!(!swap_chain.is_valid());
    }
}
