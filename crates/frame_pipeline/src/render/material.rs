//! Materials
//!
//! A material pairs a [`Shader`] with the descriptor collections it binds in
//! each of the shader's subpasses. Material queues mirror the shader's
//! queues level for level, variant for variant and subpass for subpass.

use std::collections::HashMap;
use std::sync::Arc;

use crate::render::binding::DescriptorCollection;
use crate::render::shader::{LeveledQueue, RenderSubpassId, Shader, ShaderQueue, ShaderQueueId};
use crate::render::{RenderError, RenderResult};

/// Collections a material binds in one shader subpass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MaterialSubpassData {
    /// Collections in binding order
    pub collections: Vec<DescriptorCollection>,
}

impl MaterialSubpassData {
    /// Subpass data binding `collections`
    pub fn new(collections: Vec<DescriptorCollection>) -> Self {
        Self { collections }
    }
}

/// Material-side counterpart of a [`ShaderQueue`]
pub type MaterialQueue = LeveledQueue<MaterialSubpassData>;

/// Shader plus per-subpass binding data
#[derive(Debug, Clone)]
pub struct Material {
    /// Material name
    pub name: String,
    /// Shader the material draws with
    pub shader: Arc<Shader>,
    /// Binding data per shader queue
    pub queues: HashMap<ShaderQueueId, MaterialQueue>,
}

impl Material {
    /// Material with no binding data yet
    pub fn new(name: impl Into<String>, shader: Arc<Shader>) -> Self {
        Self {
            name: name.into(),
            shader,
            queues: HashMap::new(),
        }
    }

    /// Attach binding data for shader queue `id`
    pub fn with_queue(mut self, id: ShaderQueueId, queue: MaterialQueue) -> Self {
        self.queues.insert(id, queue);
        self
    }

    /// Shader queue and matching material queue drawn in render subpass `subpass`
    pub fn subpass_data(&self, subpass: RenderSubpassId) -> RenderResult<(&ShaderQueue, &MaterialQueue)> {
        let (id, shader_queue) = self.shader.queue_for(subpass)?;
        let material_queue = self.queues.get(&id).ok_or_else(|| {
            RenderError::Misuse(format!(
                "material {} has no binding data for shader queue {:?}",
                self.name, id
            ))
        })?;
        Ok((shader_queue, material_queue))
    }
}
