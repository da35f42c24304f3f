//! Binding of descriptor collections onto a command list
//!
//! Persistent collections only point their root slots at tables baked when
//! the material was loaded. Dynamic collections are rebuilt on every bind:
//! a table is carved out of the frame's circular descriptor region, engine
//! constant buffers are assembled into the upload ring and a constant buffer
//! view is written for each of them.

use std::fmt;

use crate::render::backend::{
    CommandList, ConstantBufferViewDesc, DescriptorHandle, DescriptorHeapInfo, GraphicsDevice,
};
use crate::render::binding::constants::{build_constant_buffer, BatchObject, ConstantBufferDefinition, ConstantInputs};
use crate::render::binding::{
    DescriptorCollection, DescriptorIndex, DescriptorKind, DescriptorList, DescriptorSource, Persistency,
    RootParameterKind, UpdateFrequency,
};
use crate::render::camera::CameraData;
use crate::render::frame_queue::descriptor_heap::CircularDescriptorAllocator;
use crate::render::frame_queue::upload_buffer::TransientUploadBuffer;
use crate::render::{RenderError, RenderResult};

/// Granularity a collection is being bound at
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScopeKind {
    /// Once per pass
    Pass,
    /// Once per draw
    Draw,
}

impl fmt::Display for ScopeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pass => f.write_str("pass"),
            Self::Draw => f.write_str("instance"),
        }
    }
}

/// Where in the traversal a collection is being bound
#[derive(Debug, Clone, Copy)]
pub enum BindingScope<'a> {
    /// Subpass-level binding
    Pass,
    /// Draw-level binding, with the object being drawn when there is one
    Draw(Option<BatchObject<'a>>),
}

impl BindingScope<'_> {
    /// Granularity of this scope
    pub fn kind(&self) -> ScopeKind {
        match self {
            Self::Pass => ScopeKind::Pass,
            Self::Draw(_) => ScopeKind::Draw,
        }
    }
}

/// Frame-local state needed to rebuild dynamic descriptor tables
pub struct DescriptorResolver<'a, D: GraphicsDevice> {
    device: &'a D,
    descriptors: &'a mut CircularDescriptorAllocator,
    upload: &'a mut TransientUploadBuffer<D::UploadMemory>,
    payload: &'a mut Vec<u8>,
    camera: &'a CameraData,
    alignment: u32,
}

impl<'a, D: GraphicsDevice> DescriptorResolver<'a, D> {
    /// Create a resolver over one frame's allocators
    pub fn new(
        device: &'a D,
        descriptors: &'a mut CircularDescriptorAllocator,
        upload: &'a mut TransientUploadBuffer<D::UploadMemory>,
        payload: &'a mut Vec<u8>,
        camera: &'a CameraData,
        alignment: u32,
    ) -> Self {
        Self {
            device,
            descriptors,
            upload,
            payload,
            camera,
            alignment,
        }
    }

    /// Shader-visible heap the tables are carved from
    pub fn heap(&self) -> &DescriptorHeapInfo {
        self.descriptors.heap()
    }

    /// Bind `collection` at `scope`
    ///
    /// `constant_buffers` are the reflected definitions visible at this
    /// scope: the subpass's for pass bindings, the shader's for draws.
    pub fn bind_collection(
        &mut self,
        list: &mut D::CommandList,
        collection: &DescriptorCollection,
        scope: BindingScope<'_>,
        constant_buffers: &[ConstantBufferDefinition],
    ) -> RenderResult<()> {
        match collection.index.kind {
            RootParameterKind::Table => {}
            RootParameterKind::StaticSamplers => return Ok(()),
            RootParameterKind::Constants => return Err(RenderError::Unsupported("root constants")),
            RootParameterKind::ConstantBufferView => return Err(RenderError::Unsupported("root cbv")),
            RootParameterKind::UnorderedAccessView => return Err(RenderError::Unsupported("root uav")),
            RootParameterKind::ShaderResourceView => return Err(RenderError::Unsupported("root srv")),
        }
        if matches!(scope, BindingScope::Pass) && !collection.sampler_lists.is_empty() {
            return Err(RenderError::Unsupported("sampler tables bound per pass"));
        }

        match collection.index.persistency {
            Persistency::Persistent => {
                for table in collection.resource_view_lists.iter().chain(&collection.sampler_lists) {
                    if table.capacity == 0 {
                        return Err(RenderError::Misuse(format!(
                            "persistent descriptor table at slot {} is empty",
                            table.slot
                        )));
                    }
                    list.set_graphics_root_descriptor_table(table.slot, table.gpu_offset);
                }
                Ok(())
            }
            Persistency::Dynamic => {
                if matches!(scope, BindingScope::Draw(_))
                    && !collection.index.update.is_finer_than(UpdateFrequency::PerPass)
                {
                    return Err(RenderError::Misuse(format!(
                        "{} collection cannot be rebuilt per draw",
                        collection.index.update
                    )));
                }
                if !collection.sampler_lists.is_empty() {
                    return Err(RenderError::Unsupported("dynamic sampler tables"));
                }

                for table in &collection.resource_view_lists {
                    self.bind_dynamic_table(list, collection.index, table, scope, constant_buffers)?;
                }
                Ok(())
            }
        }
    }

    fn bind_dynamic_table(
        &mut self,
        list: &mut D::CommandList,
        index: DescriptorIndex,
        table: &DescriptorList,
        scope: BindingScope<'_>,
        constant_buffers: &[ConstantBufferDefinition],
    ) -> RenderResult<()> {
        if table.capacity == 0 || table.ranges.is_empty() {
            return Err(RenderError::Misuse(format!(
                "dynamic descriptor table at slot {} is empty",
                table.slot
            )));
        }

        let base = self.descriptors.allocate_circular(table.capacity)?;
        let mut descriptor_id = 0u32;

        for subrange in table.ranges.iter().flat_map(|range| &range.subranges) {
            match subrange.source {
                DescriptorSource::Engine => {}
                DescriptorSource::RenderTarget => {
                    return Err(RenderError::Unsupported("render target descriptors"))
                }
                DescriptorSource::Material => return Err(RenderError::Unsupported("material descriptors")),
            }

            for attribute in &subrange.descriptors {
                if descriptor_id >= table.capacity {
                    return Err(RenderError::Misuse(format!(
                        "descriptor table at slot {} declares more than {} descriptors",
                        table.slot, table.capacity
                    )));
                }

                match attribute.kind {
                    DescriptorKind::ConstantBuffer => {
                        let dest = self.descriptors.advance(base, descriptor_id);
                        self.write_constant_buffer(index, dest, scope, constant_buffers)?;
                    }
                    DescriptorKind::MainTex => return Err(RenderError::Unsupported("texture descriptors")),
                    DescriptorKind::PointSampler | DescriptorKind::LinearSampler => {}
                }
                descriptor_id += 1;
            }
        }

        list.set_graphics_root_descriptor_table(table.slot, base.gpu);
        Ok(())
    }

    fn write_constant_buffer(
        &mut self,
        index: DescriptorIndex,
        dest: DescriptorHandle,
        scope: BindingScope<'_>,
        constant_buffers: &[ConstantBufferDefinition],
    ) -> RenderResult<()> {
        let definition = match_constant_buffer(index, constant_buffers)?;

        let object = match scope {
            BindingScope::Pass => None,
            BindingScope::Draw(object) => object,
        };
        let inputs = ConstantInputs {
            camera: self.camera,
            object,
        };
        build_constant_buffer(definition, scope.kind(), &inputs, self.alignment, self.payload)?;

        let position = self.upload.upload(self.payload.as_slice(), 1, u64::from(self.alignment))?;
        let desc = ConstantBufferViewDesc {
            buffer_location: position.gpu_address,
            size_in_bytes: u32::try_from(self.payload.len())
                .map_err(|_| RenderError::Misuse("constant buffer larger than 4 GiB".to_string()))?,
        };
        self.device.create_constant_buffer_view(&desc, dest.cpu);

        log::trace!(
            "Wrote {} byte constant buffer at {:#x} for {:?}",
            desc.size_in_bytes,
            desc.buffer_location,
            index.update
        );
        Ok(())
    }
}

/// The single constant buffer definition belonging to `index`
pub fn match_constant_buffer(
    index: DescriptorIndex,
    constant_buffers: &[ConstantBufferDefinition],
) -> RenderResult<&ConstantBufferDefinition> {
    let mut matches = constant_buffers.iter().filter(|cb| cb.index == index);
    let first = matches.next().ok_or(RenderError::ConstantBufferNotFound)?;

    let extra = matches.count();
    if extra > 0 {
        return Err(RenderError::AmbiguousConstantBuffer(extra + 1));
    }
    Ok(first)
}
