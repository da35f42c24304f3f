//! In-memory recording backend
//!
//! Implements every backend trait without a GPU. Command lists store the
//! commands they receive, the queue keeps a log of everything submitted, and
//! fences either complete as soon as they are signaled or hold their value
//! until a test completes them by hand. Used by the headless demo and by the
//! test suite to check the exact command stream a frame produces.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};

use crate::render::backend::{
    ClearFlags, CommandList, CommandQueue, ConstantBufferViewDesc, CpuDescriptorHandle, DescriptorHandle,
    DescriptorHeapInfo, GpuDescriptorHandle, GpuFence, GraphicsDevice, IndexBufferView, PipelineStateId,
    PrimitiveTopology, RootSignatureId, ScissorRect, TransitionBarrier, UploadMemory, VertexBufferView, Viewport,
};
use crate::render::{RenderError, RenderResult};

/// CPU address of the first descriptor in a recorded heap
pub const HEAP_CPU_START: u64 = 0x1000_0000;
/// GPU address of the first descriptor in a recorded heap
pub const HEAP_GPU_START: u64 = 0x2000_0000;
/// Handle distance between adjacent descriptors
pub const HEAP_INCREMENT: u32 = 32;
/// GPU address of the first upload allocation
const UPLOAD_BASE: u64 = 0x4000_0000;
/// Upload allocations start on this boundary
const UPLOAD_PLACEMENT: u64 = 0x1_0000;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// One command as it was recorded
#[derive(Debug, Clone, PartialEq)]
pub enum RecordedCommand {
    /// Shader-visible heap bound
    SetDescriptorHeaps(DescriptorHeapInfo),
    /// Viewport set
    SetViewport(Viewport),
    /// Scissor rectangle set
    SetScissorRect(ScissorRect),
    /// Render target cleared to a color
    ClearRenderTargetView {
        /// Cleared view
        rtv: CpuDescriptorHandle,
        /// Clear color
        color: [f32; 4],
    },
    /// Depth-stencil view cleared
    ClearDepthStencilView {
        /// Cleared view
        dsv: CpuDescriptorHandle,
        /// Planes cleared
        flags: ClearFlags,
        /// Depth value
        depth: f32,
        /// Stencil value
        stencil: u8,
    },
    /// Render targets and optional depth-stencil bound
    SetRenderTargets {
        /// Render target views
        rtvs: Vec<CpuDescriptorHandle>,
        /// Depth-stencil view
        dsv: Option<CpuDescriptorHandle>,
    },
    /// Root signature bound
    SetGraphicsRootSignature(RootSignatureId),
    /// Descriptor table bound at a root parameter
    SetGraphicsRootDescriptorTable {
        /// Root parameter index
        slot: u32,
        /// First descriptor of the table
        table: GpuDescriptorHandle,
    },
    /// Pipeline state bound
    SetPipelineState(PipelineStateId),
    /// Input assembler topology set
    SetPrimitiveTopology(PrimitiveTopology),
    /// Vertex buffers bound from `start_slot`
    SetVertexBuffers {
        /// First input slot
        start_slot: u32,
        /// Bound views
        views: Vec<VertexBufferView>,
    },
    /// Index buffer bound, or unbound
    SetIndexBuffer(Option<IndexBufferView>),
    /// Non-indexed draw
    DrawInstanced {
        /// Vertices per instance
        vertex_count: u32,
        /// Instances drawn
        instance_count: u32,
        /// First vertex
        start_vertex: u32,
        /// First instance
        start_instance: u32,
    },
    /// Indexed draw
    DrawIndexedInstanced {
        /// Indices per instance
        index_count: u32,
        /// Instances drawn
        instance_count: u32,
        /// First index
        start_index: u32,
        /// Value added to each index
        base_vertex: i32,
        /// First instance
        start_instance: u32,
    },
    /// Batch of transition barriers
    ResourceBarrier(Vec<TransitionBarrier>),
}

impl RecordedCommand {
    /// Whether this command is a draw of either kind
    pub fn is_draw(&self) -> bool {
        matches!(self, Self::DrawInstanced { .. } | Self::DrawIndexedInstanced { .. })
    }
}

/// A closed command list handed to the queue
#[derive(Debug, Clone)]
pub struct Submission {
    /// Debug name of the executed list
    pub list_name: String,
    /// Commands in recording order
    pub commands: Vec<RecordedCommand>,
}

struct UploadAllocation {
    base: u64,
    bytes: Arc<Mutex<Vec<u8>>>,
}

#[derive(Default)]
struct DeviceState {
    submissions: Vec<Submission>,
    constant_buffer_views: Vec<(CpuDescriptorHandle, ConstantBufferViewDesc)>,
    uploads: Vec<UploadAllocation>,
    next_upload_address: u64,
    command_lists_created: usize,
}

/// Device whose objects record instead of executing
#[derive(Clone)]
pub struct RecordingDevice {
    state: Arc<Mutex<DeviceState>>,
    held_fences: bool,
}

impl Default for RecordingDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl RecordingDevice {
    /// Device whose fences complete as soon as the queue signals them
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(DeviceState {
                next_upload_address: UPLOAD_BASE,
                ..DeviceState::default()
            })),
            held_fences: false,
        }
    }

    /// Device whose fences only advance through [`RecordingFence::complete`]
    pub fn with_held_fences() -> Self {
        Self {
            held_fences: true,
            ..Self::new()
        }
    }

    /// Every command executed on any queue, in submission order
    pub fn submitted_commands(&self) -> Vec<RecordedCommand> {
        lock(&self.state)
            .submissions
            .iter()
            .flat_map(|submission| submission.commands.iter().cloned())
            .collect()
    }

    /// Every submission so far
    pub fn submissions(&self) -> Vec<Submission> {
        lock(&self.state).submissions.clone()
    }

    /// Number of command lists executed so far
    pub fn submission_count(&self) -> usize {
        lock(&self.state).submissions.len()
    }

    /// Constant buffer views written so far, oldest first
    pub fn constant_buffer_views(&self) -> Vec<(CpuDescriptorHandle, ConstantBufferViewDesc)> {
        lock(&self.state).constant_buffer_views.clone()
    }

    /// Number of command lists created on this device
    pub fn command_lists_created(&self) -> usize {
        lock(&self.state).command_lists_created
    }

    /// Read `len` bytes of upload memory at GPU address `address`
    pub fn read_upload(&self, address: u64, len: usize) -> RenderResult<Vec<u8>> {
        let state = lock(&self.state);
        for allocation in &state.uploads {
            let bytes = lock(&allocation.bytes);
            let end = allocation.base + bytes.len() as u64;
            if address >= allocation.base && address + len as u64 <= end {
                let start = (address - allocation.base) as usize;
                return Ok(bytes[start..start + len].to_vec());
            }
        }
        Err(RenderError::Misuse(format!(
            "no upload memory covers {len} bytes at {address:#x}"
        )))
    }
}

impl GraphicsDevice for RecordingDevice {
    type CommandList = RecordingCommandList;
    type Fence = RecordingFence;
    type Queue = RecordingQueue;
    type UploadMemory = RecordingUploadMemory;

    fn create_command_list(&self, name: &str) -> RenderResult<RecordingCommandList> {
        lock(&self.state).command_lists_created += 1;
        Ok(RecordingCommandList {
            name: name.to_string(),
            commands: Vec::new(),
            recording: false,
        })
    }

    fn create_direct_queue(&self) -> RenderResult<RecordingQueue> {
        Ok(RecordingQueue {
            state: Arc::clone(&self.state),
        })
    }

    fn create_fence(&self, initial_value: u64, name: &str) -> RenderResult<RecordingFence> {
        log::debug!("Created recording fence '{}' at {}", name, initial_value);
        Ok(RecordingFence::new(initial_value, self.held_fences))
    }

    fn create_shader_descriptor_heap(&self, capacity: u32) -> RenderResult<DescriptorHeapInfo> {
        Ok(DescriptorHeapInfo {
            start: DescriptorHandle {
                cpu: CpuDescriptorHandle(HEAP_CPU_START),
                gpu: GpuDescriptorHandle(HEAP_GPU_START),
            },
            increment: HEAP_INCREMENT,
            capacity,
        })
    }

    fn create_upload_memory(&self, size: u64) -> RenderResult<RecordingUploadMemory> {
        let len = usize::try_from(size).map_err(|_| RenderError::Device(format!("upload size {size} too large")))?;
        let bytes = Arc::new(Mutex::new(vec![0u8; len]));

        let mut state = lock(&self.state);
        let base = state.next_upload_address;
        state.next_upload_address = crate::foundation::math::utils::align_up(base + size.max(1), UPLOAD_PLACEMENT);
        state.uploads.push(UploadAllocation {
            base,
            bytes: Arc::clone(&bytes),
        });

        Ok(RecordingUploadMemory { base, bytes })
    }

    fn create_constant_buffer_view(&self, desc: &ConstantBufferViewDesc, dest: CpuDescriptorHandle) {
        lock(&self.state).constant_buffer_views.push((dest, *desc));
    }
}

/// Command list that stores its commands
#[derive(Debug)]
pub struct RecordingCommandList {
    name: String,
    commands: Vec<RecordedCommand>,
    recording: bool,
}

impl RecordingCommandList {
    /// Debug name given at creation
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Commands recorded since the last reset
    pub fn commands(&self) -> &[RecordedCommand] {
        &self.commands
    }

    /// Whether the list is open for recording
    pub fn is_recording(&self) -> bool {
        self.recording
    }

    fn push(&mut self, command: RecordedCommand) {
        if !self.recording {
            log::warn!("Command recorded into closed list '{}'", self.name);
        }
        self.commands.push(command);
    }
}

impl CommandList for RecordingCommandList {
    fn reset(&mut self) -> RenderResult<()> {
        self.commands.clear();
        self.recording = true;
        Ok(())
    }

    fn close(&mut self) -> RenderResult<()> {
        if !self.recording {
            return Err(RenderError::Misuse(format!("command list '{}' is already closed", self.name)));
        }
        self.recording = false;
        Ok(())
    }

    fn set_descriptor_heaps(&mut self, heap: &DescriptorHeapInfo) {
        self.push(RecordedCommand::SetDescriptorHeaps(*heap));
    }

    fn set_viewport(&mut self, viewport: &Viewport) {
        self.push(RecordedCommand::SetViewport(*viewport));
    }

    fn set_scissor_rect(&mut self, rect: &ScissorRect) {
        self.push(RecordedCommand::SetScissorRect(*rect));
    }

    fn clear_render_target_view(&mut self, rtv: CpuDescriptorHandle, color: [f32; 4]) {
        self.push(RecordedCommand::ClearRenderTargetView { rtv, color });
    }

    fn clear_depth_stencil_view(&mut self, dsv: CpuDescriptorHandle, flags: ClearFlags, depth: f32, stencil: u8) {
        self.push(RecordedCommand::ClearDepthStencilView {
            dsv,
            flags,
            depth,
            stencil,
        });
    }

    fn set_render_targets(&mut self, rtvs: &[CpuDescriptorHandle], dsv: Option<CpuDescriptorHandle>) {
        self.push(RecordedCommand::SetRenderTargets {
            rtvs: rtvs.to_vec(),
            dsv,
        });
    }

    fn set_graphics_root_signature(&mut self, root_signature: RootSignatureId) {
        self.push(RecordedCommand::SetGraphicsRootSignature(root_signature));
    }

    fn set_graphics_root_descriptor_table(&mut self, slot: u32, table: GpuDescriptorHandle) {
        self.push(RecordedCommand::SetGraphicsRootDescriptorTable { slot, table });
    }

    fn set_pipeline_state(&mut self, pipeline_state: PipelineStateId) {
        self.push(RecordedCommand::SetPipelineState(pipeline_state));
    }

    fn set_primitive_topology(&mut self, topology: PrimitiveTopology) {
        self.push(RecordedCommand::SetPrimitiveTopology(topology));
    }

    fn set_vertex_buffers(&mut self, start_slot: u32, views: &[VertexBufferView]) {
        self.push(RecordedCommand::SetVertexBuffers {
            start_slot,
            views: views.to_vec(),
        });
    }

    fn set_index_buffer(&mut self, view: Option<&IndexBufferView>) {
        self.push(RecordedCommand::SetIndexBuffer(view.copied()));
    }

    fn draw_instanced(&mut self, vertex_count: u32, instance_count: u32, start_vertex: u32, start_instance: u32) {
        self.push(RecordedCommand::DrawInstanced {
            vertex_count,
            instance_count,
            start_vertex,
            start_instance,
        });
    }

    fn draw_indexed_instanced(
        &mut self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
    ) {
        self.push(RecordedCommand::DrawIndexedInstanced {
            index_count,
            instance_count,
            start_index,
            base_vertex,
            start_instance,
        });
    }

    fn resource_barrier(&mut self, barriers: &[TransitionBarrier]) {
        self.push(RecordedCommand::ResourceBarrier(barriers.to_vec()));
    }
}

/// Queue that appends executed lists to the device log
pub struct RecordingQueue {
    state: Arc<Mutex<DeviceState>>,
}

impl CommandQueue for RecordingQueue {
    type CommandList = RecordingCommandList;
    type Fence = RecordingFence;

    fn execute(&self, list: &RecordingCommandList) -> RenderResult<()> {
        if list.is_recording() {
            return Err(RenderError::Misuse(format!(
                "command list '{}' executed while still recording",
                list.name
            )));
        }
        lock(&self.state).submissions.push(Submission {
            list_name: list.name.clone(),
            commands: list.commands.clone(),
        });
        Ok(())
    }

    fn signal(&self, fence: &RecordingFence, value: u64) -> RenderResult<()> {
        fence.queue_signal(value);
        Ok(())
    }
}

struct FenceState {
    completed: u64,
    signaled: u64,
    waits: Vec<u64>,
}

struct FenceShared {
    state: Mutex<FenceState>,
    reached: Condvar,
}

/// Fence with a host-visible counter
///
/// In held mode, queue signals are only remembered; the counter advances
/// when [`RecordingFence::complete`] is called, which lets tests stand in
/// for a slow GPU.
#[derive(Clone)]
pub struct RecordingFence {
    shared: Arc<FenceShared>,
    held: bool,
}

impl RecordingFence {
    fn new(initial_value: u64, held: bool) -> Self {
        Self {
            shared: Arc::new(FenceShared {
                state: Mutex::new(FenceState {
                    completed: initial_value,
                    signaled: initial_value,
                    waits: Vec::new(),
                }),
                reached: Condvar::new(),
            }),
            held,
        }
    }

    fn queue_signal(&self, value: u64) {
        let mut state = lock(&self.shared.state);
        state.signaled = state.signaled.max(value);
        if !self.held {
            state.completed = state.completed.max(value);
            self.shared.reached.notify_all();
        }
    }

    /// Advance the completed value to `value`, waking blocked waiters
    pub fn complete(&self, value: u64) {
        let mut state = lock(&self.shared.state);
        state.completed = state.completed.max(value);
        self.shared.reached.notify_all();
    }

    /// Highest value a queue has asked to signal
    pub fn signaled_value(&self) -> u64 {
        lock(&self.shared.state).signaled
    }

    /// Values the host had to block on, in order
    pub fn waits(&self) -> Vec<u64> {
        lock(&self.shared.state).waits.clone()
    }
}

impl GpuFence for RecordingFence {
    fn completed_value(&self) -> RenderResult<u64> {
        Ok(lock(&self.shared.state).completed)
    }

    fn wait_for_value(&self, value: u64) -> RenderResult<()> {
        let mut state = lock(&self.shared.state);
        if state.completed >= value {
            return Ok(());
        }
        state.waits.push(value);
        while state.completed < value {
            state = self
                .shared
                .reached
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }
}

/// Host memory standing in for a mapped upload heap
pub struct RecordingUploadMemory {
    base: u64,
    bytes: Arc<Mutex<Vec<u8>>>,
}

impl UploadMemory for RecordingUploadMemory {
    fn gpu_address(&self) -> u64 {
        self.base
    }

    fn size(&self) -> u64 {
        lock(&self.bytes).len() as u64
    }

    fn write(&mut self, offset: u64, data: &[u8]) -> RenderResult<()> {
        let mut bytes = lock(&self.bytes);
        let start = usize::try_from(offset).map_err(|_| RenderError::out_of_range("upload offset", offset as usize, bytes.len()))?;
        let end = start + data.len();
        if end > bytes.len() {
            return Err(RenderError::UploadCapacityExceeded {
                required: end as u64,
                available: bytes.len() as u64,
            });
        }
        bytes[start..end].copy_from_slice(data);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_closed_list_cannot_be_closed_or_executed_open() {
        let device = RecordingDevice::new();
        let queue = device.create_direct_queue().unwrap();
        let mut list = device.create_command_list("list").unwrap();

        assert!(list.close().is_err());

        list.reset().unwrap();
        list.draw_instanced(3, 1, 0, 0);
        assert!(queue.execute(&list).is_err());

        list.close().unwrap();
        queue.execute(&list).unwrap();
        assert_eq!(device.submission_count(), 1);
        assert_eq!(device.submitted_commands().len(), 1);
        assert!(device.submitted_commands()[0].is_draw());
    }

    #[test]
    fn test_reset_clears_commands() {
        let device = RecordingDevice::new();
        let mut list = device.create_command_list("list").unwrap();
        list.reset().unwrap();
        list.set_pipeline_state(PipelineStateId(4));
        list.reset().unwrap();
        assert!(list.commands().is_empty());
    }

    #[test]
    fn test_immediate_fence_completes_on_signal() {
        let device = RecordingDevice::new();
        let queue = device.create_direct_queue().unwrap();
        let fence = device.create_fence(0, "fence").unwrap();

        queue.signal(&fence, 3).unwrap();
        assert_eq!(fence.completed_value().unwrap(), 3);
        fence.wait_for_value(3).unwrap();
        assert!(fence.waits().is_empty());
    }

    #[test]
    fn test_held_fence_blocks_until_completed() {
        let device = RecordingDevice::with_held_fences();
        let queue = device.create_direct_queue().unwrap();
        let fence = device.create_fence(0, "fence").unwrap();

        queue.signal(&fence, 1).unwrap();
        assert_eq!(fence.signaled_value(), 1);
        assert_eq!(fence.completed_value().unwrap(), 0);

        let gpu = fence.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(20));
            gpu.complete(1);
        });

        fence.wait_for_value(1).unwrap();
        handle.join().unwrap();
        assert_eq!(fence.completed_value().unwrap(), 1);
        assert_eq!(fence.waits(), vec![1]);
    }

    #[test]
    fn test_upload_memory_is_readable_through_device() {
        let device = RecordingDevice::new();
        let mut first = device.create_upload_memory(256).unwrap();
        let mut second = device.create_upload_memory(256).unwrap();
        assert_ne!(first.gpu_address(), second.gpu_address());

        first.write(16, &[1, 2, 3]).unwrap();
        second.write(0, &[9]).unwrap();
        assert_eq!(device.read_upload(first.gpu_address() + 16, 3).unwrap(), vec![1, 2, 3]);
        assert_eq!(device.read_upload(second.gpu_address(), 1).unwrap(), vec![9]);

        assert!(first.write(255, &[0, 0]).is_err());
        assert!(device.read_upload(0, 1).is_err());
    }
}
