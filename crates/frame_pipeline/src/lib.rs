//! # Frame Pipeline
//!
//! Frame pipelining and dynamic resource binding for a render-graph driven
//! GPU renderer.
//!
//! ## Features
//!
//! - **Frames in Flight**: a fence-synchronized ring of frame contexts
//! - **Transient Allocation**: circular descriptor and upload regions recycled
//!   per frame generation
//! - **Render Graph Traversal**: passes, subpasses, ordered queues and draw
//!   items recorded deterministically into one command list
//! - **Dynamic Binding**: descriptor tables and engine constant buffers built
//!   per pass or per draw
//! - **Pluggable Backends**: an in-memory recording backend and a Vulkan
//!   timeline semaphore fence
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use frame_pipeline::prelude::*;
//! use frame_pipeline::render::backend::ResourceId;
//! use frame_pipeline::render::backends::recording::RecordingDevice;
//! use frame_pipeline::render::graph::{RenderGraphResources, RenderPipeline, RenderSolution};
//!
//! fn main() -> Result<(), RenderError> {
//!     let mut frames = FrameQueue::new(RecordingDevice::new(), &FrameQueueConfig::default())?;
//!     let resources = RenderGraphResources {
//!         framebuffers: vec![ResourceId(1), ResourceId(2)],
//!         num_back_buffers: 2,
//!         ..RenderGraphResources::default()
//!     };
//!     let solution = RenderSolution {
//!         pipelines: vec![RenderPipeline::default()],
//!         ..RenderSolution::default()
//!     };
//!     let mut swap_chain = SwapChainState::new(Arc::new(resources), Arc::new(solution));
//!     let camera = Camera::default();
//!
//!     frames.init_pipeline(&swap_chain)?;
//!     let frame = frames.begin_frame(&swap_chain)?;
//!     frames.render_frame(frame, &camera.data())?;
//!     frames.end_frame(frame)?;
//!     swap_chain.present();
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod config;
pub mod core;
pub mod foundation;
pub mod render;

/// Common imports for frame pipeline users
pub mod prelude {
    pub use crate::{
        core::config::{ApplicationConfig, Config, EngineConfig, FrameQueueConfig},
        foundation::math::{Mat4, Vec3},
        render::{
            Camera, CameraData, ErrorKind, FrameQueue, FrameToken, GraphicsDevice, Material, Mesh,
            RenderError, RenderResult, SubMesh, SwapChain, SwapChainState,
        },
    };
}
