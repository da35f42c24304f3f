//! # Shader Binding Model
//!
//! Data-driven description of what a shader expects to find bound at each
//! root parameter, as produced by the shader pipeline.
//!
//! A [`DescriptorCollection`] groups the descriptor tables of one root
//! signature that share an update frequency and persistency:
//!
//! - **Update frequency** says how often the collection is rebound and
//!   therefore which engine data it may legally contain.
//! - **Persistency** says whether the table was baked once ([`Persistency::Persistent`])
//!   or must be rebuilt from the circular allocator on every bind
//!   ([`Persistency::Dynamic`]).
//! - Each table is split into ranges and subranges attributed to a
//!   [`DescriptorSource`]; only engine-sourced constant buffers and samplers
//!   are resolved dynamically today.

pub mod constants;
pub mod resolver;

use std::fmt;

use crate::render::backend::GpuDescriptorHandle;

pub use constants::{
    build_constant_buffer, BatchObject, ConstantBufferDefinition, ConstantField, ConstantInputs,
    ConstantSource, ConstantType, EngineData,
};
pub use resolver::{match_constant_buffer, BindingScope, DescriptorResolver, ScopeKind};

/// How often a binding collection is rebound
///
/// Ordered from coarsest to finest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum UpdateFrequency {
    /// Once per frame
    PerFrame,
    /// Once per pass
    PerPass,
    /// Once per batch of objects sharing a material
    PerBatch,
    /// Once per draw
    PerDraw,
}

impl UpdateFrequency {
    /// Whether this frequency rebinds more often than `other`
    pub fn is_finer_than(self, other: Self) -> bool {
        self > other
    }
}

impl fmt::Display for UpdateFrequency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::PerFrame => "PerFrame",
            Self::PerPass => "PerPass",
            Self::PerBatch => "PerBatch",
            Self::PerDraw => "PerDraw",
        };
        f.write_str(name)
    }
}

/// Whether a collection's descriptor tables are baked or rebuilt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Persistency {
    /// Written once; binding only sets the stored GPU offset
    Persistent,
    /// Rebuilt from the circular allocator on every bind
    Dynamic,
}

/// Kind of root parameter a collection is bound through
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootParameterKind {
    /// Descriptor table
    Table,
    /// Static samplers baked into the root signature
    StaticSamplers,
    /// Inline root constants
    Constants,
    /// Root constant buffer view
    ConstantBufferView,
    /// Root unordered access view
    UnorderedAccessView,
    /// Root shader resource view
    ShaderResourceView,
}

/// Identity of a binding collection within a root signature
///
/// Constant buffer definitions are matched to collections by equality of
/// this index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorIndex {
    /// Rebind cadence
    pub update: UpdateFrequency,
    /// Baked or rebuilt
    pub persistency: Persistency,
    /// Root parameter kind
    pub kind: RootParameterKind,
    /// Register space the collection lives in
    pub space: u32,
}

impl DescriptorIndex {
    /// Descriptor-table collection in register space 0
    pub fn table(update: UpdateFrequency, persistency: Persistency) -> Self {
        Self {
            update,
            persistency,
            kind: RootParameterKind::Table,
            space: 0,
        }
    }

    /// Same collection in another register space
    pub fn in_space(mut self, space: u32) -> Self {
        self.space = space;
        self
    }
}

/// Who supplies the data behind a descriptor subrange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorSource {
    /// Camera and transform data the engine fills in
    Engine,
    /// Render targets produced by earlier passes
    RenderTarget,
    /// Textures and constants owned by the material
    Material,
}

/// Kind of one descriptor within a subrange
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorKind {
    /// Constant buffer view
    ConstantBuffer,
    /// Main texture shader resource view
    MainTex,
    /// Point sampler
    PointSampler,
    /// Linear sampler
    LinearSampler,
}

/// One named descriptor slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorAttribute {
    /// Shader-side name
    pub name: String,
    /// Descriptor kind
    pub kind: DescriptorKind,
}

impl DescriptorAttribute {
    /// Create an attribute
    pub fn new(name: impl Into<String>, kind: DescriptorKind) -> Self {
        Self { name: name.into(), kind }
    }
}

/// Consecutive descriptors sharing a source
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSubrange {
    /// Data source
    pub source: DescriptorSource,
    /// Descriptors in table order
    pub descriptors: Vec<DescriptorAttribute>,
}

/// A range of a descriptor table
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DescriptorRange {
    /// Subranges in table order
    pub subranges: Vec<DescriptorSubrange>,
}

/// One descriptor table bound at a root parameter slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorList {
    /// Root parameter slot
    pub slot: u32,
    /// Number of descriptors in the table
    pub capacity: u32,
    /// Baked table location, used by persistent collections
    pub gpu_offset: GpuDescriptorHandle,
    /// Table layout
    pub ranges: Vec<DescriptorRange>,
}

impl DescriptorList {
    /// Total descriptors declared across all ranges
    pub fn declared_descriptors(&self) -> usize {
        self.ranges
            .iter()
            .flat_map(|range| range.subranges.iter())
            .map(|subrange| subrange.descriptors.len())
            .sum()
    }
}

/// All descriptor tables of one root signature sharing a [`DescriptorIndex`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorCollection {
    /// Collection identity
    pub index: DescriptorIndex,
    /// CBV/SRV/UAV tables
    pub resource_view_lists: Vec<DescriptorList>,
    /// Sampler tables
    pub sampler_lists: Vec<DescriptorList>,
}

impl DescriptorCollection {
    /// Collection with resource view tables only
    pub fn new(index: DescriptorIndex, resource_view_lists: Vec<DescriptorList>) -> Self {
        Self {
            index,
            resource_view_lists,
            sampler_lists: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_frequency_ordering() {
        assert!(UpdateFrequency::PerFrame < UpdateFrequency::PerPass);
        assert!(UpdateFrequency::PerPass < UpdateFrequency::PerBatch);
        assert!(UpdateFrequency::PerBatch < UpdateFrequency::PerDraw);

        assert!(UpdateFrequency::PerDraw.is_finer_than(UpdateFrequency::PerPass));
        assert!(UpdateFrequency::PerBatch.is_finer_than(UpdateFrequency::PerPass));
        assert!(!UpdateFrequency::PerPass.is_finer_than(UpdateFrequency::PerPass));
        assert!(!UpdateFrequency::PerFrame.is_finer_than(UpdateFrequency::PerPass));
    }

    #[test]
    fn test_descriptor_index_equality_includes_space() {
        let a = DescriptorIndex::table(UpdateFrequency::PerPass, Persistency::Dynamic);
        assert_eq!(a, DescriptorIndex::table(UpdateFrequency::PerPass, Persistency::Dynamic));
        assert_ne!(a, a.in_space(1));
        assert_ne!(a, DescriptorIndex::table(UpdateFrequency::PerDraw, Persistency::Dynamic));
    }

    #[test]
    fn test_declared_descriptors_counts_subranges() {
        let list = DescriptorList {
            slot: 0,
            capacity: 3,
            gpu_offset: GpuDescriptorHandle::default(),
            ranges: vec![
                DescriptorRange {
                    subranges: vec![DescriptorSubrange {
                        source: DescriptorSource::Engine,
                        descriptors: vec![
                            DescriptorAttribute::new("Camera", DescriptorKind::ConstantBuffer),
                            DescriptorAttribute::new("Linear", DescriptorKind::LinearSampler),
                        ],
                    }],
                },
                DescriptorRange {
                    subranges: vec![DescriptorSubrange {
                        source: DescriptorSource::Material,
                        descriptors: vec![DescriptorAttribute::new("Albedo", DescriptorKind::MainTex)],
                    }],
                },
            ],
        };
        assert_eq!(list.declared_descriptors(), 3);
    }
}
