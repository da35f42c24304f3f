//! GPU-resident mesh description
//!
//! Meshes reach the frame pipeline already uploaded: what is recorded per
//! draw is the buffer views, the topology, the vertex layout the mesh was
//! built with and the index ranges of its submeshes.

use crate::render::backend::{IndexBufferView, PrimitiveTopology, VertexBufferView};

/// Index range of one material slot of a mesh
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubMesh {
    /// Number of indices drawn
    pub index_count: u32,
    /// First index in the index buffer
    pub index_offset: u32,
}

impl SubMesh {
    /// Create a submesh covering `index_count` indices from `index_offset`
    pub fn new(index_count: u32, index_offset: u32) -> Self {
        Self { index_count, index_offset }
    }
}

/// Mesh geometry bound for indexed draws
#[derive(Debug, Clone, PartialEq)]
pub struct Mesh {
    /// Debug name
    pub name: String,
    /// Vertex streams, bound from slot 0
    pub vertex_buffer_views: Vec<VertexBufferView>,
    /// Index buffer, if the mesh is indexed
    pub index_buffer_view: Option<IndexBufferView>,
    /// Input assembler topology
    pub primitive_topology: PrimitiveTopology,
    /// Vertex layout the mesh was built with
    ///
    /// Shaders map this id to one of their compiled pipeline states.
    pub layout_id: usize,
    /// Index ranges, one per material slot
    pub submeshes: Vec<SubMesh>,
}

impl Mesh {
    /// Triangle-list mesh with no buffers bound yet
    pub fn new(name: impl Into<String>, layout_id: usize, submeshes: Vec<SubMesh>) -> Self {
        Self {
            name: name.into(),
            vertex_buffer_views: Vec::new(),
            index_buffer_view: None,
            primitive_topology: PrimitiveTopology::TriangleList,
            layout_id,
            submeshes,
        }
    }

    /// Total indices across all submeshes
    pub fn index_count(&self) -> u32 {
        self.submeshes.iter().map(|submesh| submesh.index_count).sum()
    }
}
