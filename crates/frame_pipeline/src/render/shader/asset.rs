//! Shader asset building
//!
//! Turns generated shader source into the [`ShaderSubpassData`] the frame
//! pipeline draws with. Stage code is either compiled right away or stored as
//! source for a later compile step; vertex inputs are collected into an input
//! layout and per-batch texture names are gathered from the root signature.

use std::collections::BTreeMap;

use crate::render::binding::{DescriptorIndex, RootParameterKind, UpdateFrequency};
use crate::render::shader::ShaderSubpassData;
use crate::render::{RenderError, RenderResult};

/// Programmable pipeline stage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader
    Vertex,
    /// Pixel shader
    Pixel,
    /// Geometry shader
    Geometry,
    /// Hull shader
    Hull,
    /// Domain shader
    Domain,
}

impl ShaderStage {
    fn target(self) -> RenderResult<(&'static str, &'static str)> {
        match self {
            Self::Vertex => Ok(("vs_5_0", "vs")),
            Self::Pixel => Ok(("ps_5_0", "ps")),
            Self::Geometry => Err(RenderError::Unsupported("geometry shaders")),
            Self::Hull => Err(RenderError::Unsupported("hull shaders")),
            Self::Domain => Err(RenderError::Unsupported("domain shaders")),
        }
    }
}

/// Whether stage code is compiled now or stored as source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderBuildMode {
    /// Compile with the supplied [`ShaderCompiler`]
    Compile,
    /// Store the source text for a later compile step
    Defer,
}

/// Offline shader compiler
pub trait ShaderCompiler {
    /// Compile `source` for `target` (e.g. `vs_5_0`); `name` is used in diagnostics
    fn compile(&self, target: &str, name: &str, source: &str) -> RenderResult<Vec<u8>>;
}

/// Bytecode or deferred source of each stage
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShaderProgram {
    /// Vertex stage
    pub vs: Vec<u8>,
    /// Pixel stage
    pub ps: Vec<u8>,
}

impl ShaderProgram {
    /// Store the code of one stage
    ///
    /// Deferred source may only be written once per stage.
    pub fn store_stage(
        &mut self,
        stage: ShaderStage,
        shader_name: &str,
        source: &str,
        mode: ShaderBuildMode,
        compiler: &dyn ShaderCompiler,
    ) -> RenderResult<()> {
        let (target, suffix) = stage.target()?;
        let buffer = match stage {
            ShaderStage::Vertex => &mut self.vs,
            _ => &mut self.ps,
        };

        match mode {
            ShaderBuildMode::Compile => {
                *buffer = compiler.compile(target, &format!("{shader_name}.{suffix}"), source)?;
            }
            ShaderBuildMode::Defer => {
                if !buffer.is_empty() {
                    return Err(RenderError::Misuse(format!(
                        "{suffix} stage of {shader_name} written twice"
                    )));
                }
                buffer.extend_from_slice(source.as_bytes());
            }
        }
        Ok(())
    }
}

/// Semantic attached to a shader input
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum VertexSemantic {
    /// `BINORMAL`
    Binormal,
    /// `BLENDINDICES`
    BlendIndices,
    /// `BLENDWEIGHT`
    BlendWeight,
    /// `NORMAL`
    Normal,
    /// `POSITIONT`
    PositionT,
    /// `PSIZE`
    PSize,
    /// `TANGENT`
    Tangent,
    /// `TEXCOORD`
    TexCoord,
    /// `SV_Position`
    SvPosition,
    /// Any system value or semantic not fed from a vertex buffer
    Other(String),
}

impl VertexSemantic {
    /// Whether the input is read from a vertex buffer
    pub fn is_vertex_element(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// A vertex stage input with no upstream node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderInput {
    /// Input name
    pub name: String,
    /// Input semantic
    pub semantic: VertexSemantic,
}

/// Vertex inputs grouped by semantic
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InputLayout {
    /// Input names per semantic, in declaration order
    pub semantics: BTreeMap<VertexSemantic, Vec<String>>,
}

/// Descriptor kinds inside a root signature table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TableDescriptorKind {
    /// Constant buffer view
    Cbv,
    /// Shader resource view
    Srv,
    /// Unordered access view
    Uav,
    /// Sampler
    Sampler,
}

/// One descriptor of a root signature table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescriptor {
    /// Shader-side name
    pub name: String,
    /// Descriptor kind
    pub kind: TableDescriptorKind,
}

/// Generated source of one stage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageSource {
    /// Stage
    pub stage: ShaderStage,
    /// Generated HLSL
    pub source: String,
}

/// Everything generated for one shader subpass
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct SubpassSource {
    /// Stage sources
    pub stages: Vec<StageSource>,
    /// Vertex stage inputs with no upstream node
    pub vertex_inputs: Vec<ShaderInput>,
    /// Root signature tables with their descriptors
    pub root_tables: Vec<(DescriptorIndex, Vec<TableDescriptor>)>,
}

/// Name of the `index`-th subpass of `pass_name` in shader `prototype`
///
/// Unnamed passes are written as `@`.
pub fn subpass_shader_name(index: usize, pass_name: &str, prototype: &str) -> String {
    let pass = if pass_name.is_empty() { "@" } else { pass_name };
    format!("{index}/{pass}/{prototype}")
}

/// Texture names bound through per-batch descriptor tables
pub fn collect_batch_textures(root_tables: &[(DescriptorIndex, Vec<TableDescriptor>)]) -> RenderResult<Vec<String>> {
    let mut textures = Vec::new();
    for (index, descriptors) in root_tables {
        if index.update != UpdateFrequency::PerBatch {
            continue;
        }
        match index.kind {
            RootParameterKind::Constants => return Err(RenderError::Unsupported("root constants")),
            RootParameterKind::ConstantBufferView => return Err(RenderError::Unsupported("root cbv")),
            RootParameterKind::UnorderedAccessView => return Err(RenderError::Unsupported("root uav")),
            RootParameterKind::ShaderResourceView => return Err(RenderError::Unsupported("root srv")),
            RootParameterKind::StaticSamplers => {}
            RootParameterKind::Table => {
                for descriptor in descriptors.iter().filter(|d| d.kind == TableDescriptorKind::Srv) {
                    if descriptor.name.is_empty() {
                        return Err(RenderError::Misuse("per-batch texture without a name".to_string()));
                    }
                    textures.push(descriptor.name.clone());
                }
            }
        }
    }
    Ok(textures)
}

/// Group vertex-buffer inputs by semantic
pub fn collect_input_layout(inputs: &[ShaderInput]) -> InputLayout {
    let mut layout = InputLayout::default();
    for input in inputs.iter().filter(|input| input.semantic.is_vertex_element()) {
        layout
            .semantics
            .entry(input.semantic.clone())
            .or_default()
            .push(input.name.clone());
    }
    layout
}

/// Fill the program, input layout and textures of `data` from `source`
pub fn build_subpass_program(
    shader_name: &str,
    source: &SubpassSource,
    mode: ShaderBuildMode,
    compiler: &dyn ShaderCompiler,
    data: &mut ShaderSubpassData,
) -> RenderResult<()> {
    data.textures.extend(collect_batch_textures(&source.root_tables)?);

    for stage in &source.stages {
        if stage.stage == ShaderStage::Vertex {
            let layout = collect_input_layout(&source.vertex_inputs);
            for (semantic, names) in layout.semantics {
                data.input_layout.semantics.entry(semantic).or_default().extend(names);
            }
        }
        data.program
            .store_stage(stage.stage, shader_name, &stage.source, mode, compiler)?;
    }

    log::debug!(
        "Built shader subpass {} ({} stages, {} textures)",
        shader_name,
        source.stages.len(),
        data.textures.len()
    );
    Ok(())
}
