//! # Shader Data
//!
//! Compiled shader data as the frame pipeline consumes it. A shader owns one
//! queue per render-graph subpass it participates in; each queue has quality
//! levels, each level has variants, and each variant is a sequence of shader
//! subpasses drawn one after the other.
//!
//! The frame pipeline always draws level 0, variant 0.

pub mod asset;

use std::collections::HashMap;

use crate::render::backend::PipelineStateId;
use crate::render::binding::ConstantBufferDefinition;
use crate::render::{lookup, RenderError, RenderResult};

pub use asset::{
    InputLayout, ShaderBuildMode, ShaderCompiler, ShaderInput, ShaderProgram, ShaderStage, StageSource,
    SubpassSource, VertexSemantic,
};

/// Position of a subpass in the render graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderSubpassId {
    /// Render solution
    pub solution: u32,
    /// Pipeline within the solution
    pub pipeline: u32,
    /// Pass within the pipeline
    pub pass: u32,
    /// Subpass within the pass
    pub subpass: u32,
}

/// Position of a queue in a shader's own solution/pipeline/queue hierarchy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderQueueId {
    /// Shader solution
    pub solution: u32,
    /// Shader pipeline
    pub pipeline: u32,
    /// Queue within the pipeline
    pub queue: u32,
}

/// Levels of a queue, generic over what each subpass stores
#[derive(Debug, Clone, PartialEq)]
pub struct LeveledQueue<T> {
    /// Quality levels, most detailed first
    pub levels: Vec<QueueLevel<T>>,
}

/// Variants of one quality level
#[derive(Debug, Clone, PartialEq)]
pub struct QueueLevel<T> {
    /// Variants
    pub variants: Vec<QueueVariant<T>>,
}

/// Subpasses of one variant
#[derive(Debug, Clone, PartialEq)]
pub struct QueueVariant<T> {
    /// Variant name
    pub name: String,
    /// Subpasses drawn in order
    pub subpasses: Vec<T>,
}

impl<T> LeveledQueue<T> {
    /// Queue with a single level and variant
    pub fn single(name: impl Into<String>, subpasses: Vec<T>) -> Self {
        Self {
            levels: vec![QueueLevel {
                variants: vec![QueueVariant {
                    name: name.into(),
                    subpasses,
                }],
            }],
        }
    }

    /// Subpasses of `level` / `variant`
    pub fn subpasses(&self, level: usize, variant: usize) -> RenderResult<&[T]> {
        let level = lookup(&self.levels, level, "queue level")?;
        let variant = lookup(&level.variants, variant, "queue variant")?;
        Ok(&variant.subpasses)
    }
}

/// What a shader subpass needs at draw time
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ShaderSubpassData {
    /// Compiled or deferred stage code
    pub program: ShaderProgram,
    /// Vertex inputs the vertex stage reads
    pub input_layout: InputLayout,
    /// Per-batch textures the subpass samples
    pub textures: Vec<String>,
    /// Maps a mesh layout id to an index into `states`
    pub vertex_layout_index: Vec<usize>,
    /// Pipeline states, one per supported vertex layout
    pub states: Vec<PipelineStateId>,
    /// Reflected constant buffers of the subpass
    pub constant_buffers: Vec<ConstantBufferDefinition>,
}

impl ShaderSubpassData {
    /// Pipeline state for meshes built with `layout_id`
    pub fn pipeline_state(&self, layout_id: usize) -> RenderResult<PipelineStateId> {
        let state = *lookup(&self.vertex_layout_index, layout_id, "vertex layout")?;
        lookup(&self.states, state, "pipeline state").copied()
    }
}

/// Shader queue holding draw-time subpass data
pub type ShaderQueue = LeveledQueue<ShaderSubpassData>;

/// A compiled shader and the render-graph subpasses it draws in
#[derive(Debug, Clone, Default)]
pub struct Shader {
    /// Shader name
    pub name: String,
    /// Queues by id
    pub queues: HashMap<ShaderQueueId, ShaderQueue>,
    /// Which queue draws in which render-graph subpass
    pub subpass_queues: HashMap<RenderSubpassId, ShaderQueueId>,
}

impl Shader {
    /// Create an empty shader
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Register `queue` under `id`, drawing in render subpass `subpass`
    pub fn with_queue(mut self, subpass: RenderSubpassId, id: ShaderQueueId, queue: ShaderQueue) -> Self {
        self.queues.insert(id, queue);
        self.subpass_queues.insert(subpass, id);
        self
    }

    /// Queue id and data drawn in render subpass `subpass`
    pub fn queue_for(&self, subpass: RenderSubpassId) -> RenderResult<(ShaderQueueId, &ShaderQueue)> {
        let id = *self.subpass_queues.get(&subpass).ok_or_else(|| {
            RenderError::Misuse(format!(
                "shader {} does not draw in subpass {:?}",
                self.name, subpass
            ))
        })?;
        let queue = self
            .queues
            .get(&id)
            .ok_or_else(|| RenderError::Misuse(format!("shader {} has no queue {:?}", self.name, id)))?;
        Ok((id, queue))
    }
}
