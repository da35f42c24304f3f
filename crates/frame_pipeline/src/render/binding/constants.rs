//! Engine-sourced constant buffer assembly
//!
//! Shader reflection describes each constant buffer as an ordered list of
//! typed fields. Fields sourced from the engine are filled from the camera
//! and, at draw scope, from the object batch being drawn. Which engine value
//! may appear at which scope is fixed by the [`ENGINE_CONSTANTS`] table.

use std::fmt;

use crate::foundation::math::{matrix_bytes, utils::align_up, Mat4};
use crate::render::binding::DescriptorIndex;
use crate::render::camera::CameraData;
use crate::render::graph::content::FlattenedObjects;
use crate::render::{lookup, RenderError, RenderResult};

use super::resolver::ScopeKind;

/// Engine-provided matrix values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineData {
    /// Camera projection
    Proj,
    /// Camera view
    View,
    /// View times object world transform
    WorldView,
    /// Inverse-transpose of the object world transform
    WorldInvT,
}

impl fmt::Display for EngineData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Proj => "Proj",
            Self::View => "View",
            Self::WorldView => "WorldView",
            Self::WorldInvT => "WorldInvT",
        };
        f.write_str(name)
    }
}

/// HLSL-side type of a constant field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantType {
    /// `float`
    Float,
    /// `float2`
    Float2,
    /// `float3`
    Float3,
    /// `float4`
    Float4,
    /// `float4x4`
    Float4x4,
}

impl ConstantType {
    /// Size in bytes
    pub fn size(self) -> u32 {
        match self {
            Self::Float => 4,
            Self::Float2 => 8,
            Self::Float3 => 12,
            Self::Float4 => 16,
            Self::Float4x4 => 64,
        }
    }
}

/// Who provides a constant field's value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConstantSource {
    /// Filled by the engine
    Engine(EngineData),
    /// Provided by a render target
    RenderTarget,
    /// Provided by the material
    Material,
}

/// One field of a constant buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantField {
    /// Shader-side name
    pub name: String,
    /// Field type
    pub ty: ConstantType,
    /// Value source
    pub source: ConstantSource,
}

impl ConstantField {
    /// Engine-sourced `float4x4` field named after its data
    pub fn engine(data: EngineData) -> Self {
        Self {
            name: data.to_string(),
            ty: ConstantType::Float4x4,
            source: ConstantSource::Engine(data),
        }
    }
}

/// Reflected layout of one constant buffer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantBufferDefinition {
    /// Collection this buffer belongs to
    pub index: DescriptorIndex,
    /// Declared size in bytes, before alignment
    pub size: u32,
    /// Fields in declaration order
    pub constants: Vec<ConstantField>,
}

impl ConstantBufferDefinition {
    /// Definition whose size is the packed size of its fields
    pub fn from_fields(index: DescriptorIndex, constants: Vec<ConstantField>) -> Self {
        let size = constants.iter().map(|field| field.ty.size()).sum();
        Self { index, size, constants }
    }
}

/// One object of a batch, addressed by its position in the batch arrays
#[derive(Debug, Clone, Copy)]
pub struct BatchObject<'a> {
    /// Batch the object belongs to
    pub batch: &'a FlattenedObjects,
    /// Index into the batch arrays
    pub object_id: usize,
}

/// Data engine constants are computed from
#[derive(Debug, Clone, Copy)]
pub struct ConstantInputs<'a> {
    /// Camera of the frame
    pub camera: &'a CameraData,
    /// Object being drawn, absent for pass-level and full-screen binds
    pub object: Option<BatchObject<'a>>,
}

type MatrixSource = fn(&ConstantInputs<'_>) -> RenderResult<Mat4>;

/// Legal scope and value source of every engine constant
const ENGINE_CONSTANTS: [(EngineData, ScopeKind, MatrixSource); 4] = [
    (EngineData::Proj, ScopeKind::Pass, camera_proj),
    (EngineData::View, ScopeKind::Pass, camera_view),
    (EngineData::WorldView, ScopeKind::Draw, world_view),
    (EngineData::WorldInvT, ScopeKind::Draw, world_inverse_transpose),
];

fn camera_proj(inputs: &ConstantInputs<'_>) -> RenderResult<Mat4> {
    Ok(inputs.camera.proj)
}

fn camera_view(inputs: &ConstantInputs<'_>) -> RenderResult<Mat4> {
    Ok(inputs.camera.view)
}

fn world_view(inputs: &ConstantInputs<'_>) -> RenderResult<Mat4> {
    let object = inputs.object.ok_or(RenderError::MissingObjectBatch)?;
    let world = indexed(&object.batch.world_transforms, object.object_id, "world transform")?;
    Ok(inputs.camera.view * world)
}

fn world_inverse_transpose(inputs: &ConstantInputs<'_>) -> RenderResult<Mat4> {
    let object = inputs.object.ok_or(RenderError::MissingObjectBatch)?;
    indexed(&object.batch.world_transform_invs, object.object_id, "inverse world transform")
}

fn indexed(matrices: &[Mat4], index: usize, what: &'static str) -> RenderResult<Mat4> {
    lookup(matrices, index, what).copied()
}

fn engine_source(data: EngineData, scope: ScopeKind) -> RenderResult<MatrixSource> {
    let (_, legal_scope, source) = ENGINE_CONSTANTS
        .iter()
        .copied()
        .find(|(entry, _, _)| *entry == data)
        .ok_or(RenderError::Unsupported("engine constant source"))?;

    if legal_scope != scope {
        return Err(RenderError::IllegalScope { element: data, scope });
    }
    Ok(source)
}

/// Fill `payload` with the constant buffer described by `definition`
///
/// The payload is resized to the declared size rounded up to `alignment` and
/// zero-filled; fields are then written back to back in declaration order.
pub fn build_constant_buffer(
    definition: &ConstantBufferDefinition,
    scope: ScopeKind,
    inputs: &ConstantInputs<'_>,
    alignment: u32,
    payload: &mut Vec<u8>,
) -> RenderResult<()> {
    if definition.size == 0 {
        return Err(RenderError::EmptyConstantBuffer);
    }
    if alignment == 0 || !alignment.is_power_of_two() {
        return Err(RenderError::Misuse(format!(
            "constant buffer alignment {alignment} is not a power of two"
        )));
    }

    let aligned = align_up(u64::from(definition.size), u64::from(alignment)) as usize;
    payload.clear();
    payload.resize(aligned, 0);

    let mut offset = 0usize;
    for field in &definition.constants {
        let data = match field.source {
            ConstantSource::Engine(data) => data,
            ConstantSource::RenderTarget => return Err(RenderError::Unsupported("render target constants")),
            ConstantSource::Material => return Err(RenderError::Unsupported("material constants")),
        };
        if field.ty != ConstantType::Float4x4 {
            return Err(RenderError::Misuse(format!(
                "engine constant {} must be float4x4",
                field.name
            )));
        }

        let source = engine_source(data, scope)?;
        let matrix = source(inputs)?;
        let bytes = matrix_bytes(&matrix);

        let end = offset + bytes.len();
        if end > payload.len() {
            return Err(RenderError::ConstantBufferOverflow {
                required: end,
                available: payload.len(),
            });
        }
        payload[offset..end].copy_from_slice(bytes);
        offset = end;
    }

    Ok(())
}
