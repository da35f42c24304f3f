//! Headless frame pipeline demo
//!
//! Builds a two-pass render graph (an object pass drawing a small batch of
//! cubes and a full-screen post pass), runs it for a few frames on the
//! recording backend and logs what was submitted.
//!
//! Usage: `frame_demo [config.toml|config.ron] [frames]`

use std::path::Path;
use std::sync::Arc;

use frame_pipeline::core::config::{ApplicationConfig, Config, ConfigError};
use frame_pipeline::foundation::{logging, math::{Mat4, Vec3}};
use frame_pipeline::render::backend::{
    ClearFlags, CpuDescriptorHandle, GpuDescriptorHandle, PipelineStateId, ResourceId, ResourceState,
    RootSignatureId, ScissorRect, Viewport,
};
use frame_pipeline::render::backends::recording::{RecordedCommand, RecordingDevice};
use frame_pipeline::render::binding::{
    ConstantBufferDefinition, ConstantField, DescriptorAttribute, DescriptorCollection, DescriptorIndex,
    DescriptorKind, DescriptorList, DescriptorRange, DescriptorSource, DescriptorSubrange, EngineData, Persistency,
    UpdateFrequency,
};
use frame_pipeline::render::graph::{
    AttachmentBinding, DescriptorArray, DrawCall, FlattenedObjects, GraphicsSubpass, LoadOp, MeshRenderer,
    OrderedRenderQueue, RenderGraphResources, RenderPass, RenderPipeline, RenderQueueContent, RenderSolution,
    ViewTransition,
};
use frame_pipeline::render::material::{MaterialQueue, MaterialSubpassData};
use frame_pipeline::render::shader::{RenderSubpassId, Shader, ShaderQueue, ShaderQueueId, ShaderSubpassData};
use frame_pipeline::render::{
    Camera, FrameQueue, Material, Mesh, RenderError, SubMesh, SwapChainState,
};

const WIDTH: u32 = 1280;
const HEIGHT: u32 = 720;
const BACK_BUFFERS: u32 = 3;
const DEFAULT_FRAMES: u32 = 6;

/// RTV of the HDR scene target, after the linear and sRGB back buffer views
const HDR_RTV: u32 = BACK_BUFFERS * 2;
/// Framebuffer of the HDR scene target, after the back buffers
const HDR_TARGET: u32 = BACK_BUFFERS;
/// Framebuffer of the history target read by later frames
const HISTORY_TARGET: u32 = BACK_BUFFERS + 1;

#[derive(Debug, thiserror::Error)]
enum DemoError {
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("rendering: {0}")]
    Render(#[from] RenderError),
    #[error("invalid frame count '{0}'")]
    FrameCount(String),
}

const OBJECT_SUBPASS: RenderSubpassId = RenderSubpassId {
    solution: 0,
    pipeline: 0,
    pass: 0,
    subpass: 0,
};

const POST_SUBPASS: RenderSubpassId = RenderSubpassId {
    solution: 0,
    pipeline: 0,
    pass: 1,
    subpass: 0,
};

fn engine_table(slot: u32, kinds: &[DescriptorKind]) -> DescriptorList {
    DescriptorList {
        slot,
        capacity: kinds.len() as u32,
        gpu_offset: GpuDescriptorHandle::default(),
        ranges: vec![DescriptorRange {
            subranges: vec![DescriptorSubrange {
                source: DescriptorSource::Engine,
                descriptors: kinds
                    .iter()
                    .enumerate()
                    .map(|(i, kind)| DescriptorAttribute::new(format!("engine{i}"), *kind))
                    .collect(),
            }],
        }],
    }
}

fn material(
    name: &str,
    subpass: RenderSubpassId,
    pso: u64,
    collections: Vec<DescriptorCollection>,
    constant_buffers: Vec<ConstantBufferDefinition>,
) -> Arc<Material> {
    let queue_id = ShaderQueueId {
        solution: 0,
        pipeline: 0,
        queue: subpass.pass,
    };
    let data = ShaderSubpassData {
        vertex_layout_index: vec![0],
        states: vec![PipelineStateId(pso)],
        constant_buffers,
        ..ShaderSubpassData::default()
    };
    let shader = Shader::new(name).with_queue(subpass, queue_id, ShaderQueue::single("default", vec![data]));

    Arc::new(Material::new(name, Arc::new(shader)).with_queue(
        queue_id,
        MaterialQueue::single("default", vec![MaterialSubpassData::new(collections)]),
    ))
}

/// Object pass: camera constants per pass, object constants per draw
fn object_pass() -> RenderPass {
    let per_pass = DescriptorIndex::table(UpdateFrequency::PerPass, Persistency::Dynamic);
    let per_draw = DescriptorIndex::table(UpdateFrequency::PerDraw, Persistency::Dynamic);

    let lit = material(
        "lit",
        OBJECT_SUBPASS,
        1,
        vec![DescriptorCollection::new(
            per_draw,
            vec![engine_table(1, &[DescriptorKind::ConstantBuffer, DescriptorKind::LinearSampler])],
        )],
        vec![ConstantBufferDefinition::from_fields(
            per_draw,
            vec![ConstantField::engine(EngineData::WorldView), ConstantField::engine(EngineData::WorldInvT)],
        )],
    );

    let cube = Arc::new(Mesh::new("cube", 0, vec![SubMesh::new(36, 0)]));
    let mut batch = FlattenedObjects::default();
    for i in 0..4 {
        let offset = i as f32 * 2.5 - 3.75;
        batch.push(
            MeshRenderer {
                mesh: Arc::clone(&cube),
                materials: vec![Arc::clone(&lit)],
            },
            Mat4::new_translation(&Vec3::new(offset, 0.0, 0.0)),
        );
    }
    let mut content = RenderQueueContent::default();
    content.push_batch(batch);

    RenderPass {
        name: "objects".to_string(),
        viewports: vec![Viewport::new(WIDTH as f32, HEIGHT as f32)],
        scissor_rects: vec![ScissorRect {
            left: 0,
            top: 0,
            right: WIDTH as i32,
            bottom: HEIGHT as i32,
        }],
        subpasses: vec![GraphicsSubpass {
            output_attachments: vec![AttachmentBinding::cleared(
                HDR_RTV,
                LoadOp::ClearColor([0.02, 0.02, 0.05, 1.0]),
            )],
            depth_stencil_attachment: Some(AttachmentBinding::cleared(
                0,
                LoadOp::ClearDepthStencil {
                    flags: ClearFlags::DEPTH | ClearFlags::STENCIL,
                    depth: 1.0,
                    stencil: 0,
                },
            )),
            ordered_render_queue: vec![OrderedRenderQueue {
                contents: vec![Arc::new(content)],
            }],
            post_view_transitions: vec![ViewTransition {
                framebuffer: HDR_TARGET,
                source: ResourceState::RenderTarget,
                target: ResourceState::PixelShaderResource,
            }],
            root_signature: RootSignatureId(1),
            descriptors: vec![DescriptorCollection::new(
                per_pass,
                vec![engine_table(0, &[DescriptorKind::ConstantBuffer])],
            )],
            constant_buffers: vec![ConstantBufferDefinition::from_fields(
                per_pass,
                vec![ConstantField::engine(EngineData::View), ConstantField::engine(EngineData::Proj)],
            )],
        }],
    }
}

/// Post pass: one full-screen triangle into the back buffer
fn post_pass() -> RenderPass {
    let tonemap = material("tonemap", POST_SUBPASS, 2, Vec::new(), Vec::new());
    let mut content = RenderQueueContent::default();
    content.push_draw_call(DrawCall::full_screen_triangle(tonemap));

    RenderPass {
        name: "post".to_string(),
        subpasses: vec![GraphicsSubpass {
            output_attachments: vec![AttachmentBinding::load(0)],
            ordered_render_queue: vec![OrderedRenderQueue {
                contents: vec![Arc::new(content)],
            }],
            post_view_transitions: vec![
                ViewTransition {
                    framebuffer: 0,
                    source: ResourceState::RenderTarget,
                    target: ResourceState::Present,
                },
                ViewTransition {
                    framebuffer: HDR_TARGET,
                    source: ResourceState::PixelShaderResource,
                    target: ResourceState::RenderTarget,
                },
            ],
            root_signature: RootSignatureId(2),
            ..GraphicsSubpass::default()
        }],
        ..RenderPass::default()
    }
}

fn swap_chain() -> SwapChainState {
    let framebuffers = (0..=HISTORY_TARGET).map(|i| ResourceId(100 + u64::from(i))).collect();
    let resources = RenderGraphResources {
        framebuffers,
        rtvs: DescriptorArray {
            start: CpuDescriptorHandle(0x8000),
            increment: 32,
            count: BACK_BUFFERS * 2 + 1,
        },
        dsvs: DescriptorArray {
            start: CpuDescriptorHandle(0xc000),
            increment: 32,
            count: 1,
        },
        num_back_buffers: BACK_BUFFERS,
    };
    let solution = RenderSolution {
        name: "forward".to_string(),
        pipelines: vec![RenderPipeline {
            name: "forward+post".to_string(),
            passes: vec![object_pass(), post_pass()],
            rtv_initial_states: vec![
                ResourceState::Present,
                ResourceState::RenderTarget,
                ResourceState::PixelShaderResource,
            ],
        }],
        rtv_sources: vec![0, HDR_TARGET, HISTORY_TARGET],
    };
    SwapChainState::new(Arc::new(resources), Arc::new(solution))
}

fn load_config(path: Option<&str>) -> Result<ApplicationConfig, DemoError> {
    let config = match path {
        Some(path) => ApplicationConfig::load_from_file(Path::new(path))?,
        None => ApplicationConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn summarize(commands: &[RecordedCommand]) -> (usize, usize, usize) {
    let draws = commands.iter().filter(|command| command.is_draw()).count();
    let tables = commands
        .iter()
        .filter(|command| matches!(command, RecordedCommand::SetGraphicsRootDescriptorTable { .. }))
        .count();
    let barriers = commands
        .iter()
        .filter(|command| matches!(command, RecordedCommand::ResourceBarrier(_)))
        .count();
    (draws, tables, barriers)
}

fn run() -> Result<(), DemoError> {
    let mut args = std::env::args().skip(1);
    let config = load_config(args.next().as_deref())?;
    let frames = match args.next() {
        Some(count) => count.parse().map_err(|_| DemoError::FrameCount(count))?,
        None => DEFAULT_FRAMES,
    };

    logging::init_with_level(&config.engine.log_level);
    log::info!(
        "Running {} frames with {} frames in flight",
        frames,
        config.frame_queue.frame_queue_size
    );

    let device = RecordingDevice::new();
    let mut queue = FrameQueue::new(device.clone(), &config.frame_queue)?;
    let mut swap_chain = swap_chain();
    let mut camera = Camera::perspective(
        Vec3::new(0.0, 3.0, 10.0),
        45.0,
        WIDTH as f32 / HEIGHT as f32,
        0.1,
        100.0,
    );
    camera.look_at(Vec3::zeros());

    queue.init_pipeline(&swap_chain)?;
    log::info!("Pipeline initialized ({} submission)", device.submission_count());

    for frame in 0..frames {
        let angle = frame as f32 * 0.1;
        camera.set_position(Vec3::new(10.0 * angle.sin(), 3.0, 10.0 * angle.cos()));
        camera.look_at(Vec3::zeros());

        let token = queue.begin_frame(&swap_chain)?;
        queue.render_frame(token, &camera.data())?;
        queue.end_frame(token)?;

        let submissions = device.submissions();
        if let Some(submission) = submissions.last() {
            let (draws, tables, barriers) = summarize(&submission.commands);
            log::info!(
                "Frame {} [{}] back buffer {}: {} commands, {} draws, {} tables, {} barrier batches",
                token.fence_value(),
                submission.list_name,
                swap_chain.back_buffer_index,
                submission.commands.len(),
                draws,
                tables,
                barriers
            );
        }
        swap_chain.present();
    }

    queue.wait_idle()?;
    log::info!(
        "Done: {} submissions, {} constant buffer views written",
        device.submission_count(),
        device.constant_buffer_views().len()
    );
    Ok(())
}

fn main() {
    if let Err(e) = run() {
        log::error!("frame_demo failed: {}", e);
        eprintln!("frame_demo failed: {e}");
        std::process::exit(1);
    }
}
