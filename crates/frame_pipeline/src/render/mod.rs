//! # Rendering System
//!
//! Frame pipelining and render graph submission over an abstract graphics
//! backend.
//!
//! ## Architecture
//!
//! - **Frame Queue**: a ring of in-flight frame contexts synchronized with a
//!   single monotonically increasing fence
//! - **Transient Allocators**: circular descriptor and upload regions, one
//!   generation per frame in flight
//! - **Render Graph**: solutions, pipelines, passes and subpasses walked once
//!   per frame into a single command list
//! - **Binding**: descriptor collections resolved per pass or per draw from
//!   engine data
//! - **Backends**: the traits in [`backend`] plus a recording backend and a
//!   Vulkan timeline fence
//!
//! ## Frame Lifecycle
//!
//! ```text
//! begin_frame -> render_frame -> end_frame
//!      |              |              |
//!  wait for slot   record graph   signal fence
//! ```

pub mod backend;
pub mod backends;
pub mod binding;
pub mod camera;
pub mod frame_queue;
pub mod graph;
pub mod material;
pub mod mesh;
pub mod shader;

pub use backend::{CommandList, CommandQueue, GpuFence, GraphicsDevice, UploadMemory};
pub use camera::{Camera, CameraData};
pub use frame_queue::{FrameQueue, FrameToken, SwapChain, SwapChainState};
pub use material::Material;
pub use mesh::{Mesh, SubMesh};

use crate::render::binding::{EngineData, ScopeKind};

/// Broad category of a [`RenderError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// The caller or the pipeline data broke a contract
    Misuse,
    /// The data asks for a feature that is not implemented
    Unsupported,
    /// The graphics device reported a failure
    Device,
}

/// Errors raised while pipelining and recording frames
#[derive(thiserror::Error, Debug)]
pub enum RenderError {
    /// The frame's circular descriptor region cannot fit a table
    ///
    /// Raised by circular allocation when the current generation has fewer
    /// than `requested` descriptors left. Either the reserve is too small for
    /// the scene or a table was declared larger than intended.
    #[error("circular descriptor region exhausted: requested {requested}, {used} of {capacity} in use")]
    DescriptorCapacityExceeded {
        /// Descriptors asked for
        requested: u32,
        /// Descriptors already handed out this generation
        used: u32,
        /// Descriptors available per generation
        capacity: u32,
    },

    /// The persistent prefix of the descriptor heap is full
    #[error("persistent descriptors exhausted: requested {requested}, {used} of {capacity} in use")]
    PersistentDescriptorsExhausted {
        /// Descriptors asked for
        requested: u32,
        /// Descriptors already handed out
        used: u32,
        /// Size of the persistent prefix
        capacity: u32,
    },

    /// The frame's upload region cannot fit the data
    #[error("upload region exhausted: need {required} bytes, {available} available per frame")]
    UploadCapacityExceeded {
        /// End offset the upload would reach
        required: u64,
        /// Bytes per generation
        available: u64,
    },

    /// Engine data requested at a scope where it has no meaning
    ///
    /// Camera matrices exist once per pass and object transforms once per
    /// draw; asking for either at the other scope is a pipeline authoring
    /// mistake.
    #[error("{element} cannot be per {scope}")]
    IllegalScope {
        /// Requested engine value
        element: EngineData,
        /// Scope it was requested at
        scope: ScopeKind,
    },

    /// Per-object data requested while no object batch is being drawn
    #[error("per-object constants requested without an object batch")]
    MissingObjectBatch,

    /// No constant buffer definition matches a collection
    #[error("no constant buffer matches the descriptor collection")]
    ConstantBufferNotFound,

    /// Several constant buffer definitions match a collection
    #[error("{0} constant buffers match the descriptor collection")]
    AmbiguousConstantBuffer(usize),

    /// Constant fields run past the end of the buffer
    #[error("constant buffer overflow: fields need {required} bytes, buffer holds {available}")]
    ConstantBufferOverflow {
        /// Bytes the fields need
        required: usize,
        /// Bytes in the aligned buffer
        available: usize,
    },

    /// A constant buffer definition with zero size
    #[error("constant buffer has zero size")]
    EmptyConstantBuffer,

    /// A clear operation on the wrong kind of attachment
    #[error("{0}")]
    InvalidLoadOp(&'static str),

    /// More than one viewport or scissor rectangle on a pass
    #[error("pass declares {count} {kind}s, at most one is supported")]
    TooManyRasterRects {
        /// "viewport" or "scissor rect"
        kind: &'static str,
        /// Number declared
        count: usize,
    },

    /// An object batch whose parallel arrays differ in length
    #[error("object batch arrays differ: {renderers} renderers, {transforms} transforms, {inverses} inverse transforms")]
    MismatchedBatch {
        /// Mesh renderer count
        renderers: usize,
        /// World transform count
        transforms: usize,
        /// Inverse world transform count
        inverses: usize,
    },

    /// An index into pipeline data is out of range
    #[error("{what} index {index} out of range ({len} available)")]
    IndexOutOfRange {
        /// What was being indexed
        what: &'static str,
        /// Offending index
        index: usize,
        /// Length of the indexed collection
        len: usize,
    },

    /// Other contract violation
    #[error("{0}")]
    Misuse(String),

    /// Feature not implemented
    #[error("{0} not supported yet")]
    Unsupported(&'static str),

    /// Backend failure
    #[error("device error: {0}")]
    Device(String),
}

impl RenderError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unsupported(_) => ErrorKind::Unsupported,
            Self::Device(_) => ErrorKind::Device,
            _ => ErrorKind::Misuse,
        }
    }

    /// Shorthand for an out-of-range index
    pub(crate) fn out_of_range(what: &'static str, index: usize, len: usize) -> Self {
        Self::IndexOutOfRange { what, index, len }
    }
}

/// Result type for rendering operations
pub type RenderResult<T> = Result<T, RenderError>;

/// Index into `items`, reporting what was indexed on failure
pub(crate) fn lookup<'a, T>(items: &'a [T], index: usize, what: &'static str) -> RenderResult<&'a T> {
    items
        .get(index)
        .ok_or_else(|| RenderError::out_of_range(what, index, items.len()))
}
