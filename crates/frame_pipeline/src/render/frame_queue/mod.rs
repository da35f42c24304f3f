//! # Frame Queue
//!
//! Keeps up to `frame_queue_size` frames in flight on a single direct queue.
//!
//! Every frame goes through `begin_frame`, `render_frame` and `end_frame`.
//! `begin_frame` is the only place the CPU blocks: it takes the next ring
//! slot, waits until the GPU has finished the frame that last used it, then
//! rotates the circular descriptor region and the upload ring to the
//! generation that frame released. `render_frame` walks the render graph into
//! the slot's command list and submits it, and `end_frame` asks the queue to
//! signal the frame's fence value.
//!
//! Fence values start at 1 and grow by one per `begin_frame`, so the frame
//! that last used a slot is always `fence_value - frame_queue_size`.
//!
//! Only one frame is open on the CPU at a time. The allocators track a single
//! current generation and the fence must be signaled in increasing order, so
//! `begin_frame` refuses to start a frame while another one is not ended.

pub mod context;
pub mod descriptor_heap;
pub mod swap_chain;
pub mod upload_buffer;

use std::sync::Arc;

pub use context::{FrameContext, FramePhase};
pub use descriptor_heap::CircularDescriptorAllocator;
pub use swap_chain::{SwapChain, SwapChainState};
pub use upload_buffer::{TransientUploadBuffer, UploadPosition};

use crate::core::config::FrameQueueConfig;
use crate::render::backend::{
    CommandList, CommandQueue, GpuFence, GraphicsDevice, ResourceState, TransitionBarrier,
};
use crate::render::binding::DescriptorResolver;
use crate::render::camera::CameraData;
use crate::render::graph::{FrameTarget, GraphRecorder, TraversalScratch};
use crate::render::{lookup, RenderError, RenderResult};

/// Handle to a begun frame
///
/// Only valid until the ring wraps back to its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FrameToken {
    slot: u32,
    fence_value: u64,
}

impl FrameToken {
    /// Ring slot of the frame
    pub fn slot(&self) -> u32 {
        self.slot
    }

    /// Fence value the frame signals
    pub fn fence_value(&self) -> u64 {
        self.fence_value
    }
}

/// Ring of in-flight frames sharing one queue, fence and set of allocators
pub struct FrameQueue<D: GraphicsDevice> {
    device: D,
    queue: D::Queue,
    fence: D::Fence,
    frames: Vec<FrameContext<D::CommandList>>,
    next_frame_fence: u64,
    next_frame_index: usize,
    last_signaled_fence: u64,
    descriptors: CircularDescriptorAllocator,
    upload_buffer: TransientUploadBuffer<D::UploadMemory>,
    scratch: TraversalScratch,
    constant_payload: Vec<u8>,
    constant_buffer_alignment: u32,
}

fn frame_mut<L>(frames: &mut [FrameContext<L>], token: FrameToken) -> RenderResult<&mut FrameContext<L>> {
    let len = frames.len();
    let frame = frames
        .get_mut(token.slot as usize)
        .ok_or_else(|| RenderError::out_of_range("frame slot", token.slot as usize, len))?;
    if frame.fence_value != token.fence_value {
        return Err(RenderError::Misuse(format!(
            "stale frame token: slot {} now holds frame {}, not {}",
            token.slot, frame.fence_value, token.fence_value
        )));
    }
    Ok(frame)
}

impl<D: GraphicsDevice> FrameQueue<D> {
    /// Create the queue, fence, command lists and allocators
    pub fn new(device: D, config: &FrameQueueConfig) -> RenderResult<Self> {
        config
            .validate()
            .map_err(|e| RenderError::Misuse(e.to_string()))?;

        let frame_count = config.frame_queue_size;
        let queue = device.create_direct_queue()?;
        let fence = device.create_fence(0, "FrameQueue")?;

        let frames = (0..frame_count)
            .map(|i| {
                device
                    .create_command_list(&format!("FrameContext: {i}"))
                    .map(FrameContext::new)
            })
            .collect::<RenderResult<Vec<_>>>()?;

        let heap = device.create_shader_descriptor_heap(config.shader_descriptor_capacity)?;
        let descriptors =
            CircularDescriptorAllocator::new(heap, config.shader_descriptor_circular_reserve, frame_count)?;

        let upload_memory =
            device.create_upload_memory(config.upload_buffer_size_per_frame * u64::from(frame_count))?;
        let upload_buffer = TransientUploadBuffer::new(upload_memory, frame_count)?;

        log::debug!(
            "Created frame queue: {} frames, {} circular descriptors and {} upload bytes per frame",
            frame_count,
            descriptors.per_frame_capacity(),
            upload_buffer.per_frame_size()
        );

        Ok(Self {
            device,
            queue,
            fence,
            frames,
            next_frame_fence: 1,
            next_frame_index: 0,
            last_signaled_fence: 0,
            descriptors,
            upload_buffer,
            scratch: TraversalScratch::new(),
            constant_payload: Vec::with_capacity(256),
            constant_buffer_alignment: config.constant_buffer_alignment,
        })
    }

    /// Start recording the next frame
    ///
    /// Blocks until the GPU has finished the previous frame of the same slot.
    /// Fails while an earlier frame has not been ended.
    pub fn begin_frame(&mut self, swap_chain: &impl SwapChain) -> RenderResult<FrameToken> {
        if !swap_chain.is_valid() {
            return Err(RenderError::Misuse("begin_frame needs a valid swap chain".to_string()));
        }

        if let Some(open) = self.frames.iter().find(|frame| frame.phase != FramePhase::Idle) {
            return Err(RenderError::Misuse(format!(
                "frame {} was never ended",
                open.fence_value
            )));
        }

        let slot = self.next_frame_index;
        let fence_value = self.next_frame_fence;
        let frame_count = self.frames.len();
        let frame = &mut self.frames[slot];

        let previous = frame.fence_value;
        if self.fence.completed_value()? < previous {
            log::warn!("Frame {} waiting for GPU to finish frame {}", fence_value, previous);
            self.fence.wait_for_value(previous)?;
        }

        self.next_frame_fence += 1;
        self.next_frame_index = (slot + 1) % frame_count;

        frame.command_list.reset()?;
        frame.fence_value = fence_value;
        frame.phase = FramePhase::Recording;
        frame.back_buffer_index = swap_chain.current_back_buffer_index();
        frame.back_buffer_count = swap_chain.back_buffer_count();
        frame.solution_id = swap_chain.solution_id();
        frame.pipeline_id = swap_chain.pipeline_id();
        frame.render_graph = Some(Arc::clone(swap_chain.render_graph()));
        frame.solution = Some(Arc::clone(swap_chain.current_solution()));

        self.descriptors.advance_frame();
        self.upload_buffer.advance_frame();

        log::trace!(
            "Began frame {} in slot {} (descriptor generation {})",
            fence_value,
            slot,
            self.descriptors.generation()
        );

        Ok(FrameToken {
            slot: slot as u32,
            fence_value,
        })
    }

    /// Record the frame's pipeline and submit it
    pub fn render_frame(&mut self, token: FrameToken, camera: &CameraData) -> RenderResult<()> {
        let Self {
            device,
            queue,
            frames,
            descriptors,
            upload_buffer,
            scratch,
            constant_payload,
            constant_buffer_alignment,
            ..
        } = self;

        let frame = frame_mut(frames, token)?;
        if frame.phase != FramePhase::Recording {
            return Err(RenderError::Misuse(format!(
                "frame {} rendered outside of recording",
                token.fence_value
            )));
        }

        let solution = Arc::clone(frame.solution()?);
        let resources = Arc::clone(frame.render_graph()?);
        let target = FrameTarget {
            solution: &solution,
            resources: &resources,
            solution_id: frame.solution_id,
            pipeline_id: frame.pipeline_id,
            back_buffer_index: frame.back_buffer_index,
            back_buffer_count: frame.back_buffer_count,
        };

        let resolver = DescriptorResolver::new(
            &*device,
            descriptors,
            upload_buffer,
            constant_payload,
            camera,
            *constant_buffer_alignment,
        );
        GraphRecorder::<D>::new(&mut frame.command_list, resolver, scratch, target).record()?;

        frame.command_list.close()?;
        queue.execute(&frame.command_list)?;
        frame.phase = FramePhase::Submitted;
        Ok(())
    }

    /// Signal the frame's fence value on the queue
    pub fn end_frame(&mut self, token: FrameToken) -> RenderResult<()> {
        let frame = frame_mut(&mut self.frames, token)?;
        match frame.phase {
            FramePhase::Idle => {
                return Err(RenderError::Misuse(format!("frame {} already ended", token.fence_value)));
            }
            FramePhase::Recording => {
                log::debug!("Frame {} ended without being rendered", token.fence_value);
                frame.command_list.close()?;
            }
            FramePhase::Submitted => {}
        }

        self.queue.signal(&self.fence, frame.fence_value)?;
        frame.phase = FramePhase::Idle;
        self.last_signaled_fence = frame.fence_value;
        Ok(())
    }

    /// Move every configured render target into its declared starting state
    ///
    /// Runs one frame without draws. Targets declared `Common` or
    /// `RenderTarget` are left alone.
    pub fn init_pipeline(&mut self, swap_chain: &impl SwapChain) -> RenderResult<()> {
        let token = self.begin_frame(swap_chain)?;
        if let Err(err) = self.record_initial_transitions(token) {
            self.abandon_frame(token);
            return Err(err);
        }
        self.end_frame(token)
    }

    fn record_initial_transitions(&mut self, token: FrameToken) -> RenderResult<()> {
        let frame = frame_mut(&mut self.frames, token)?;

        let solution = Arc::clone(frame.solution()?);
        let resources = Arc::clone(frame.render_graph()?);
        let pipeline = solution.pipeline(frame.pipeline_id)?;

        let mut barriers = Vec::new();
        for (rtv, &state) in pipeline.rtv_initial_states.iter().enumerate() {
            if state.is_common() || state == ResourceState::RenderTarget {
                continue;
            }
            let source = *lookup(&solution.rtv_sources, rtv, "render target source")?;
            barriers.push(TransitionBarrier::transition(
                resources.framebuffer(source)?,
                ResourceState::RenderTarget,
                state,
            ));
        }

        if !barriers.is_empty() {
            frame.command_list.resource_barrier(&barriers);
        }
        frame.command_list.close()?;
        self.queue.execute(&frame.command_list)?;
        frame.phase = FramePhase::Submitted;

        log::debug!(
            "Initialized pipeline {} with {} render target transitions",
            pipeline.name,
            barriers.len()
        );
        Ok(())
    }

    /// Close and signal a frame whose recording failed so its slot can be reused
    fn abandon_frame(&mut self, token: FrameToken) {
        let Ok(frame) = frame_mut(&mut self.frames, token) else {
            return;
        };
        if frame.phase == FramePhase::Recording {
            if let Err(err) = frame.command_list.close() {
                log::warn!("Failed to close abandoned frame {}: {}", token.fence_value, err);
            }
        }
        match self.queue.signal(&self.fence, frame.fence_value) {
            Ok(()) => self.last_signaled_fence = frame.fence_value,
            Err(err) => log::error!("Failed to signal abandoned frame {}: {}", token.fence_value, err),
        }
        frame.phase = FramePhase::Idle;
    }

    /// Block until every ended frame has completed on the GPU
    pub fn wait_idle(&self) -> RenderResult<()> {
        self.fence.wait_for_value(self.last_signaled_fence)
    }

    /// Frame a token refers to
    pub fn frame(&self, token: FrameToken) -> RenderResult<&FrameContext<D::CommandList>> {
        let frame = lookup(&self.frames, token.slot as usize, "frame slot")?;
        if frame.fence_value != token.fence_value {
            return Err(RenderError::Misuse(format!(
                "stale frame token for frame {}",
                token.fence_value
            )));
        }
        Ok(frame)
    }

    /// Device the queue records with
    pub fn device(&self) -> &D {
        &self.device
    }

    /// Fence signaled once per ended frame
    pub fn fence(&self) -> &D::Fence {
        &self.fence
    }

    /// Number of frames in flight
    pub fn frame_count(&self) -> u32 {
        self.frames.len() as u32
    }

    /// Fence value the next `begin_frame` assigns
    pub fn next_frame_fence(&self) -> u64 {
        self.next_frame_fence
    }

    /// Shader-visible descriptor allocator
    pub fn descriptors(&self) -> &CircularDescriptorAllocator {
        &self.descriptors
    }

    /// Allocator access for baking persistent tables at load time
    pub fn descriptors_mut(&mut self) -> &mut CircularDescriptorAllocator {
        &mut self.descriptors
    }

    /// Per-frame upload ring for constant data
    pub fn upload_buffer(&self) -> &TransientUploadBuffer<D::UploadMemory> {
        &self.upload_buffer
    }
}
