//! Recording one pipeline of a render solution into a command list
//!
//! The walk is strictly ordered: passes, then subpasses, then ordered queues,
//! then content items, then shader subpasses. Topology and pipeline state are
//! only re-sent when they change within a subpass.

use crate::render::backend::{
    CommandList, CpuDescriptorHandle, GraphicsDevice, PipelineStateId, PrimitiveTopology, ResourceState,
    TransitionBarrier,
};
use crate::render::binding::{BatchObject, BindingScope, DescriptorResolver, UpdateFrequency};
use crate::render::graph::content::{DrawCall, DrawCallKind, DrawItem, FlattenedObjects, RenderQueueContent};
use crate::render::graph::solution::{
    GraphicsSubpass, LoadOp, RenderGraphResources, RenderPass, RenderSolution,
};
use crate::render::material::{Material, MaterialSubpassData};
use crate::render::shader::{RenderSubpassId, ShaderSubpassData};
use crate::render::{lookup, RenderError, RenderResult};

const LEVEL: usize = 0;
const VARIANT: usize = 0;

/// The pipeline and back buffer a frame renders
#[derive(Debug, Clone, Copy)]
pub struct FrameTarget<'a> {
    /// Solution being drawn
    pub solution: &'a RenderSolution,
    /// Resources of the solution's render graph
    pub resources: &'a RenderGraphResources,
    /// Index of the solution
    pub solution_id: u32,
    /// Index of the pipeline within the solution
    pub pipeline_id: u32,
    /// Swap chain image rendered to
    pub back_buffer_index: u32,
    /// Swap chain image count
    pub back_buffer_count: u32,
}

impl FrameTarget<'_> {
    fn render_target_view(&self, view: u32) -> RenderResult<CpuDescriptorHandle> {
        let index = if view == 0 {
            self.back_buffer_index
        } else if view == self.back_buffer_count {
            self.back_buffer_index + self.back_buffer_count
        } else {
            view
        };
        self.resources.rtvs.cpu_handle(index)
    }

    fn framebuffer(&self, index: u32) -> RenderResult<crate::render::backend::ResourceId> {
        let index = if index == 0 { self.back_buffer_index } else { index };
        self.resources.framebuffer(index)
    }
}

/// Reusable per-frame vectors
#[derive(Debug)]
pub struct TraversalScratch {
    rtvs: Vec<CpuDescriptorHandle>,
    barriers: Vec<TransitionBarrier>,
}

impl TraversalScratch {
    /// Scratch sized for typical subpasses
    pub fn new() -> Self {
        Self {
            rtvs: Vec::with_capacity(16),
            barriers: Vec::with_capacity(32),
        }
    }
}

impl Default for TraversalScratch {
    fn default() -> Self {
        Self::new()
    }
}

/// Input assembler and pipeline state last sent in the current subpass
#[derive(Debug, Default)]
struct StateCache {
    topology: PrimitiveTopology,
    pipeline_state: Option<PipelineStateId>,
}

impl StateCache {
    fn set_topology<L: CommandList>(&mut self, list: &mut L, topology: PrimitiveTopology) {
        if self.topology != topology {
            list.set_primitive_topology(topology);
            self.topology = topology;
        }
    }

    fn set_pipeline_state<L: CommandList>(&mut self, list: &mut L, pipeline_state: PipelineStateId) {
        if self.pipeline_state != Some(pipeline_state) {
            list.set_pipeline_state(pipeline_state);
            self.pipeline_state = Some(pipeline_state);
        }
    }
}

/// Records a [`FrameTarget`] into a command list
pub struct GraphRecorder<'a, D: GraphicsDevice> {
    list: &'a mut D::CommandList,
    resolver: DescriptorResolver<'a, D>,
    scratch: &'a mut TraversalScratch,
    target: FrameTarget<'a>,
}

impl<'a, D: GraphicsDevice> GraphRecorder<'a, D> {
    /// Create a recorder writing into `list`
    pub fn new(
        list: &'a mut D::CommandList,
        resolver: DescriptorResolver<'a, D>,
        scratch: &'a mut TraversalScratch,
        target: FrameTarget<'a>,
    ) -> Self {
        Self {
            list,
            resolver,
            scratch,
            target,
        }
    }

    /// Record every pass of the target pipeline
    pub fn record(mut self) -> RenderResult<()> {
        let back_buffer = self.target.resources.framebuffer(self.target.back_buffer_index)?;
        self.list.resource_barrier(&[TransitionBarrier::transition(
            back_buffer,
            ResourceState::Present,
            ResourceState::RenderTarget,
        )]);

        let heap = *self.resolver.heap();
        self.list.set_descriptor_heaps(&heap);

        let pipeline = self.target.solution.pipeline(self.target.pipeline_id)?;
        for (pass_id, pass) in pipeline.passes.iter().enumerate() {
            self.record_pass(pass_id as u32, pass)?;
        }
        Ok(())
    }

    fn record_pass(&mut self, pass_id: u32, pass: &RenderPass) -> RenderResult<()> {
        if pass.viewports.len() > 1 {
            return Err(RenderError::TooManyRasterRects {
                kind: "viewport",
                count: pass.viewports.len(),
            });
        }
        if pass.scissor_rects.len() > 1 {
            return Err(RenderError::TooManyRasterRects {
                kind: "scissor rect",
                count: pass.scissor_rects.len(),
            });
        }
        if let Some(viewport) = pass.viewports.first() {
            self.list.set_viewport(viewport);
        }
        if let Some(rect) = pass.scissor_rects.first() {
            self.list.set_scissor_rect(rect);
        }

        for (subpass_id, subpass) in pass.subpasses.iter().enumerate() {
            let id = RenderSubpassId {
                solution: self.target.solution_id,
                pipeline: self.target.pipeline_id,
                pass: pass_id,
                subpass: subpass_id as u32,
            };
            log::trace!("Recording subpass {:?} of pass {}", id, pass.name);
            self.record_subpass(id, subpass)?;
        }
        Ok(())
    }

    fn record_subpass(&mut self, id: RenderSubpassId, subpass: &GraphicsSubpass) -> RenderResult<()> {
        self.bind_attachments(subpass)?;

        let mut cache = StateCache::default();
        for queue in &subpass.ordered_render_queue {
            self.list.set_graphics_root_signature(subpass.root_signature);

            for collection in &subpass.descriptors {
                if collection.index.update != UpdateFrequency::PerPass {
                    continue;
                }
                self.resolver.bind_collection(
                    &mut *self.list,
                    collection,
                    BindingScope::Pass,
                    &subpass.constant_buffers,
                )?;
            }

            for content in &queue.contents {
                self.record_content(id, content, &mut cache)?;
            }
        }

        if subpass.post_view_transitions.is_empty() {
            return Ok(());
        }
        self.scratch.barriers.clear();
        for transition in &subpass.post_view_transitions {
            let resource = self.target.framebuffer(transition.framebuffer)?;
            self.scratch
                .barriers
                .push(TransitionBarrier::transition(resource, transition.source, transition.target));
        }
        self.list.resource_barrier(&self.scratch.barriers);
        Ok(())
    }

    fn bind_attachments(&mut self, subpass: &GraphicsSubpass) -> RenderResult<()> {
        self.scratch.rtvs.clear();
        for attachment in &subpass.output_attachments {
            let rtv = self.target.render_target_view(attachment.view)?;
            self.scratch.rtvs.push(rtv);

            match attachment.load_op {
                LoadOp::ClearColor(color) => self.list.clear_render_target_view(rtv, color),
                LoadOp::ClearDepthStencil { .. } => {
                    return Err(RenderError::InvalidLoadOp("RTV should not use clear depth stencil"))
                }
                LoadOp::Load | LoadOp::DontCare => {}
            }
        }

        let dsv = match &subpass.depth_stencil_attachment {
            Some(attachment) => {
                let dsv = self.target.resources.dsvs.cpu_handle(attachment.view)?;
                match attachment.load_op {
                    LoadOp::ClearColor(_) => {
                        return Err(RenderError::InvalidLoadOp("DSV should not use clear color"))
                    }
                    LoadOp::ClearDepthStencil { flags, depth, stencil } => {
                        self.list.clear_depth_stencil_view(dsv, flags, depth, stencil);
                    }
                    LoadOp::Load | LoadOp::DontCare => {}
                }
                Some(dsv)
            }
            None => None,
        };

        if !self.scratch.rtvs.is_empty() || dsv.is_some() {
            self.list.set_render_targets(&self.scratch.rtvs, dsv);
        }
        Ok(())
    }

    fn record_content(
        &mut self,
        id: RenderSubpassId,
        content: &RenderQueueContent,
        cache: &mut StateCache,
    ) -> RenderResult<()> {
        for item in &content.items {
            match *item {
                DrawItem::DrawCall(index) => {
                    let draw_call = lookup(&content.draw_calls, index, "draw call")?;
                    self.record_draw_call(id, draw_call, cache)?;
                }
                DrawItem::ObjectBatch(index) => {
                    let batch = lookup(&content.flattened_objects, index, "object batch")?;
                    self.record_batch(id, batch, cache)?;
                }
            }
        }
        Ok(())
    }

    fn record_draw_call(
        &mut self,
        id: RenderSubpassId,
        draw_call: &DrawCall,
        cache: &mut StateCache,
    ) -> RenderResult<()> {
        match draw_call.kind {
            DrawCallKind::FullScreenTriangle => {}
            DrawCallKind::Mesh => return Err(RenderError::Unsupported("mesh draw calls")),
        }

        cache.set_topology(&mut *self.list, PrimitiveTopology::TriangleList);
        self.list.set_vertex_buffers(0, &[]);
        self.list.set_index_buffer(None);

        self.for_each_shader_subpass(id, &draw_call.material, |recorder, shader_subpass, material_subpass| {
            cache.set_pipeline_state(&mut *recorder.list, shader_subpass.pipeline_state(0)?);
            recorder.bind_material(shader_subpass, material_subpass, BindingScope::Draw(None))?;
            recorder.list.draw_instanced(3, 1, 0, 0);
            Ok(())
        })
    }

    fn record_batch(
        &mut self,
        id: RenderSubpassId,
        batch: &FlattenedObjects,
        cache: &mut StateCache,
    ) -> RenderResult<()> {
        batch.validate()?;

        for (object_id, renderer) in batch.mesh_renderers.iter().enumerate() {
            let mesh = &renderer.mesh;
            for (material_id, material) in renderer.materials.iter().enumerate() {
                let Some(submesh) = mesh.submeshes.get(material_id) else {
                    break;
                };

                cache.set_topology(&mut *self.list, mesh.primitive_topology);
                self.list.set_vertex_buffers(0, &mesh.vertex_buffer_views);
                self.list.set_index_buffer(mesh.index_buffer_view.as_ref());

                let object = BatchObject { batch, object_id };
                self.for_each_shader_subpass(id, material, |recorder, shader_subpass, material_subpass| {
                    cache.set_pipeline_state(&mut *recorder.list, shader_subpass.pipeline_state(mesh.layout_id)?);
                    recorder.bind_material(shader_subpass, material_subpass, BindingScope::Draw(Some(object)))?;
                    recorder
                        .list
                        .draw_indexed_instanced(submesh.index_count, 1, submesh.index_offset, 0, 0);
                    Ok(())
                })?;
            }
        }
        Ok(())
    }

    fn for_each_shader_subpass<F>(&mut self, id: RenderSubpassId, material: &Material, mut draw: F) -> RenderResult<()>
    where
        F: FnMut(&mut Self, &ShaderSubpassData, &MaterialSubpassData) -> RenderResult<()>,
    {
        let (shader_queue, material_queue) = material.subpass_data(id)?;
        let material_subpasses = material_queue.subpasses(LEVEL, VARIANT)?;

        for (k, shader_subpass) in shader_queue.subpasses(LEVEL, VARIANT)?.iter().enumerate() {
            let material_subpass = lookup(material_subpasses, k, "material subpass")?;
            draw(self, shader_subpass, material_subpass)?;
        }
        Ok(())
    }

    fn bind_material(
        &mut self,
        shader_subpass: &ShaderSubpassData,
        material_subpass: &MaterialSubpassData,
        scope: BindingScope<'_>,
    ) -> RenderResult<()> {
        for collection in &material_subpass.collections {
            self.resolver
                .bind_collection(&mut *self.list, collection, scope, &shader_subpass.constant_buffers)?;
        }
        Ok(())
    }
}
