//! Full frames driven through the recording backend

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use frame_pipeline::foundation::logging;
use frame_pipeline::foundation::math::matrix_bytes;
use frame_pipeline::prelude::*;
use frame_pipeline::render::backend::{
    ClearFlags, CpuDescriptorHandle, GpuDescriptorHandle, GpuFence, PipelineStateId, PrimitiveTopology, ResourceId,
    ResourceState, RootSignatureId, ScissorRect, TransitionBarrier, Viewport,
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

const BACK_BUFFERS: u32 = 2;

fn config(frames: u32) -> FrameQueueConfig {
    logging::init_for_tests();
    FrameQueueConfig::new()
        .with_frame_queue_size(frames)
        .with_descriptors(256, 192)
        .with_upload_buffer_size(64 * 1024)
}

fn resources() -> Arc<RenderGraphResources> {
    Arc::new(RenderGraphResources {
        framebuffers: vec![ResourceId(10), ResourceId(11), ResourceId(20), ResourceId(21), ResourceId(22)],
        rtvs: DescriptorArray {
            start: CpuDescriptorHandle(0x9000),
            increment: 8,
            count: 8,
        },
        dsvs: DescriptorArray {
            start: CpuDescriptorHandle(0xa000),
            increment: 8,
            count: 1,
        },
        num_back_buffers: BACK_BUFFERS,
    })
}

fn subpass_id(pass: u32, subpass: u32) -> RenderSubpassId {
    RenderSubpassId {
        solution: 0,
        pipeline: 0,
        pass,
        subpass,
    }
}

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
                    .map(|kind| DescriptorAttribute::new(format!("{kind:?}"), *kind))
                    .collect(),
            }],
        }],
    }
}

/// Material drawing in every listed subpass with pipeline state `pso`
fn material(
    name: &str,
    subpasses: &[RenderSubpassId],
    pso: u64,
    collections: Vec<DescriptorCollection>,
    constant_buffers: Vec<ConstantBufferDefinition>,
) -> Arc<Material> {
    let queue_id = ShaderQueueId {
        solution: 0,
        pipeline: 0,
        queue: 0,
    };
    let data = ShaderSubpassData {
        vertex_layout_index: vec![0],
        states: vec![PipelineStateId(pso)],
        constant_buffers,
        ..ShaderSubpassData::default()
    };
    let shader = subpasses.iter().fold(Shader::new(name), |shader, id| {
        shader.with_queue(*id, queue_id, ShaderQueue::single("default", vec![data.clone()]))
    });

    Arc::new(Material::new(name, Arc::new(shader)).with_queue(
        queue_id,
        MaterialQueue::single("default", vec![MaterialSubpassData::new(collections)]),
    ))
}

fn subpass(content: RenderQueueContent) -> GraphicsSubpass {
    GraphicsSubpass {
        output_attachments: vec![AttachmentBinding::cleared(0, LoadOp::ClearColor([0.0, 0.0, 0.0, 1.0]))],
        ordered_render_queue: vec![OrderedRenderQueue {
            contents: vec![Arc::new(content)],
        }],
        root_signature: RootSignatureId(1),
        ..GraphicsSubpass::default()
    }
}

fn pass(name: &str, subpasses: Vec<GraphicsSubpass>) -> RenderPass {
    RenderPass {
        name: name.to_string(),
        viewports: vec![Viewport::new(1280.0, 720.0)],
        scissor_rects: vec![ScissorRect {
            left: 0,
            top: 0,
            right: 1280,
            bottom: 720,
        }],
        subpasses,
    }
}

fn swap_chain(passes: Vec<RenderPass>) -> SwapChainState {
    let solution = RenderSolution {
        name: "forward".to_string(),
        pipelines: vec![RenderPipeline {
            name: "main".to_string(),
            passes,
            rtv_initial_states: Vec::new(),
        }],
        rtv_sources: Vec::new(),
    };
    SwapChainState::new(resources(), Arc::new(solution))
}

fn run_frame(queue: &mut FrameQueue<RecordingDevice>, swap_chain: &SwapChainState, camera: &CameraData) -> RenderResult<()> {
    let token = queue.begin_frame(swap_chain)?;
    let rendered = queue.render_frame(token, camera);
    queue.end_frame(token)?;
    rendered
}

#[test]
fn test_ring_slots_and_fence_values_advance_together() {
    let mut queue = FrameQueue::new(RecordingDevice::new(), &config(3)).unwrap();
    let swap_chain = swap_chain(Vec::new());

    let mut last_fence = 0;
    for i in 0..7u32 {
        let token = queue.begin_frame(&swap_chain).unwrap();
        assert_eq!(token.slot(), i % 3);
        assert_eq!(token.fence_value(), last_fence + 1);
        assert_eq!(queue.descriptors().generation(), (i + 1) % 3);
        last_fence = token.fence_value();

        queue.render_frame(token, &CameraData::default()).unwrap();
        queue.end_frame(token).unwrap();
    }

    assert_eq!(queue.fence().completed_value().unwrap(), 7);
    assert_eq!(queue.device().submission_count(), 7);
}

#[test]
fn test_begin_frame_waits_for_the_slot_fence() {
    let device = RecordingDevice::with_held_fences();
    let mut queue = FrameQueue::new(device, &config(2)).unwrap();
    let swap_chain = swap_chain(Vec::new());

    for _ in 0..2 {
        let token = queue.begin_frame(&swap_chain).unwrap();
        queue.end_frame(token).unwrap();
    }
    assert_eq!(queue.fence().signaled_value(), 2);
    assert_eq!(queue.fence().completed_value().unwrap(), 0);
    assert!(queue.fence().waits().is_empty());

    let gpu = queue.fence().clone();
    let finished = Arc::new(AtomicBool::new(false));
    let gpu_finished = Arc::clone(&finished);
    let handle = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        gpu_finished.store(true, Ordering::SeqCst);
        gpu.complete(1);
    });

    let token = queue.begin_frame(&swap_chain).unwrap();
    assert!(finished.load(Ordering::SeqCst));
    assert_eq!(token.slot(), 0);
    assert_eq!(token.fence_value(), 3);
    assert_eq!(queue.fence().waits(), vec![1]);
    handle.join().unwrap();
}

#[test]
fn test_circular_descriptors_reclaimed_per_generation() {
    let mut queue = FrameQueue::new(RecordingDevice::new(), &config(3)).unwrap();
    let swap_chain = swap_chain(Vec::new());
    let per_frame = queue.descriptors().per_frame_capacity();
    assert_eq!(per_frame, 64);

    let token = queue.begin_frame(&swap_chain).unwrap();
    queue.descriptors_mut().allocate_circular(per_frame).unwrap();
    let err = queue.descriptors_mut().allocate_circular(1).unwrap_err();
    assert!(matches!(err, RenderError::DescriptorCapacityExceeded { requested: 1, .. }));
    assert_eq!(err.kind(), ErrorKind::Misuse);
    queue.end_frame(token).unwrap();

    let token = queue.begin_frame(&swap_chain).unwrap();
    queue.descriptors_mut().allocate_circular(per_frame).unwrap();
    queue.end_frame(token).unwrap();
}

fn per_pass_dynamic() -> DescriptorIndex {
    DescriptorIndex::table(UpdateFrequency::PerPass, Persistency::Dynamic)
}

fn camera_pass(field: EngineData) -> Vec<RenderPass> {
    let mut sub = subpass(RenderQueueContent::default());
    sub.descriptors = vec![DescriptorCollection::new(
        per_pass_dynamic(),
        vec![engine_table(0, &[DescriptorKind::ConstantBuffer])],
    )];
    sub.constant_buffers = vec![ConstantBufferDefinition::from_fields(
        per_pass_dynamic(),
        vec![ConstantField::engine(field)],
    )];
    vec![pass("camera", vec![sub])]
}

#[test]
fn test_pass_constant_buffer_is_padded_and_uploaded() {
    let mut queue = FrameQueue::new(RecordingDevice::new(), &config(2)).unwrap();
    let swap_chain = swap_chain(camera_pass(EngineData::View));
    let mut camera = Camera::perspective(Vec3::new(0.0, 2.0, 5.0), 60.0, 16.0 / 9.0, 0.1, 100.0);
    camera.look_at(Vec3::zeros());
    let data = camera.data();

    run_frame(&mut queue, &swap_chain, &data).unwrap();

    let views = queue.device().constant_buffer_views();
    assert_eq!(views.len(), 1);
    let (_, desc) = views[0];
    assert_eq!(desc.size_in_bytes, 256);

    let uploaded = queue.device().read_upload(desc.buffer_location, 256).unwrap();
    assert_eq!(&uploaded[..64], matrix_bytes(&data.view));
    assert!(uploaded[64..].iter().all(|byte| *byte == 0));
}

#[test]
fn test_world_view_at_pass_scope_fails() {
    let mut queue = FrameQueue::new(RecordingDevice::new(), &config(2)).unwrap();
    let swap_chain = swap_chain(camera_pass(EngineData::WorldView));

    let err = run_frame(&mut queue, &swap_chain, &CameraData::default()).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Misuse);
    assert_eq!(err.to_string(), "WorldView cannot be per pass");
}

#[test]
fn test_passes_and_subpasses_record_draws_in_order() {
    let mut passes = Vec::new();
    let mut pso = 0;
    for pass_id in 0..2 {
        let mut subpasses = Vec::new();
        for subpass_index in 0..2 {
            pso += 1;
            let material = material("fullscreen", &[subpass_id(pass_id, subpass_index)], pso, Vec::new(), Vec::new());
            let mut content = RenderQueueContent::default();
            for _ in 0..3 {
                content.push_draw_call(DrawCall::full_screen_triangle(Arc::clone(&material)));
            }
            subpasses.push(subpass(content));
        }
        passes.push(pass(&format!("pass {pass_id}"), subpasses));
    }

    let mut queue = FrameQueue::new(RecordingDevice::new(), &config(2)).unwrap();
    let swap_chain = swap_chain(passes);
    run_frame(&mut queue, &swap_chain, &CameraData::default()).unwrap();

    let commands = queue.device().submitted_commands();
    let draws = commands
        .iter()
        .filter(|command| matches!(command, RecordedCommand::DrawInstanced { vertex_count: 3, instance_count: 1, .. }))
        .count();
    assert_eq!(draws, 12);

    // Each subpass sends its pipeline state once and draws three times under it
    let mut per_state = Vec::new();
    for command in &commands {
        match command {
            RecordedCommand::SetPipelineState(PipelineStateId(id)) => per_state.push((*id, 0)),
            RecordedCommand::DrawInstanced { .. } => {
                if let Some(last) = per_state.last_mut() {
                    last.1 += 1;
                }
            }
            _ => {}
        }
    }
    assert_eq!(per_state, vec![(1, 3), (2, 3), (3, 3), (4, 3)]);

    let viewports = commands
        .iter()
        .filter(|command| matches!(command, RecordedCommand::SetViewport(_)))
        .count();
    assert_eq!(viewports, 2);
}

#[test]
fn test_batch_draws_stop_at_submesh_count() {
    let id = subpass_id(0, 0);
    let materials = (0..3)
        .map(|i| material(&format!("m{i}"), &[id], 7, Vec::new(), Vec::new()))
        .collect();
    let mesh = Arc::new(Mesh::new("crate", 0, vec![SubMesh::new(36, 0), SubMesh::new(12, 36)]));

    let mut batch = FlattenedObjects::default();
    batch.push(MeshRenderer { mesh, materials }, Mat4::identity());
    let mut content = RenderQueueContent::default();
    content.push_batch(batch);

    let mut queue = FrameQueue::new(RecordingDevice::new(), &config(2)).unwrap();
    let swap_chain = swap_chain(vec![pass("objects", vec![subpass(content)])]);
    run_frame(&mut queue, &swap_chain, &CameraData::default()).unwrap();

    let draws: Vec<_> = queue
        .device()
        .submitted_commands()
        .into_iter()
        .filter_map(|command| match command {
            RecordedCommand::DrawIndexedInstanced {
                index_count,
                start_index,
                ..
            } => Some((index_count, start_index)),
            _ => None,
        })
        .collect();
    assert_eq!(draws, vec![(36, 0), (12, 36)]);
}

#[test]
fn test_per_draw_constants_follow_each_object() {
    let id = subpass_id(0, 0);
    let per_draw = DescriptorIndex::table(UpdateFrequency::PerDraw, Persistency::Dynamic);
    let collection = DescriptorCollection::new(per_draw, vec![engine_table(1, &[DescriptorKind::ConstantBuffer])]);
    let cb = ConstantBufferDefinition::from_fields(
        per_draw,
        vec![ConstantField::engine(EngineData::WorldView), ConstantField::engine(EngineData::WorldInvT)],
    );
    let material = material("lit", &[id], 3, vec![collection], vec![cb]);
    let mesh = Arc::new(Mesh::new("cube", 0, vec![SubMesh::new(36, 0)]));

    let worlds = [
        Mat4::new_translation(&Vec3::new(1.0, 0.0, 0.0)),
        Mat4::new_translation(&Vec3::new(0.0, 3.0, 0.0)),
    ];
    let mut batch = FlattenedObjects::default();
    for world in worlds {
        batch.push(
            MeshRenderer {
                mesh: Arc::clone(&mesh),
                materials: vec![Arc::clone(&material)],
            },
            world,
        );
    }
    let mut content = RenderQueueContent::default();
    content.push_batch(batch);

    let camera = CameraData {
        view: Mat4::new_translation(&Vec3::new(0.0, 0.0, -10.0)),
        proj: Mat4::identity(),
    };
    let mut queue = FrameQueue::new(RecordingDevice::new(), &config(2)).unwrap();
    let swap_chain = swap_chain(vec![pass("objects", vec![subpass(content)])]);
    run_frame(&mut queue, &swap_chain, &camera).unwrap();

    let views = queue.device().constant_buffer_views();
    assert_eq!(views.len(), 2);
    for ((_, desc), world) in views.iter().zip(worlds) {
        assert_eq!(desc.size_in_bytes, 256);
        let bytes = queue.device().read_upload(desc.buffer_location, 128).unwrap();
        assert_eq!(&bytes[..64], matrix_bytes(&(camera.view * world)));
        assert_eq!(&bytes[64..128], matrix_bytes(&world.try_inverse().unwrap().transpose()));
    }
    assert_ne!(views[0].1.buffer_location, views[1].1.buffer_location);
}

#[test]
fn test_post_subpass_transitions_alias_the_back_buffer() {
    let mut sub = subpass(RenderQueueContent::default());
    sub.post_view_transitions = vec![
        ViewTransition {
            framebuffer: 0,
            source: ResourceState::RenderTarget,
            target: ResourceState::Present,
        },
        ViewTransition {
            framebuffer: 2,
            source: ResourceState::RenderTarget,
            target: ResourceState::PixelShaderResource,
        },
    ];
    let mut swap_chain = swap_chain(vec![pass("post", vec![sub])]);
    swap_chain.present();

    let mut queue = FrameQueue::new(RecordingDevice::new(), &config(2)).unwrap();
    run_frame(&mut queue, &swap_chain, &CameraData::default()).unwrap();

    let commands = queue.device().submitted_commands();
    assert_eq!(
        commands.last(),
        Some(&RecordedCommand::ResourceBarrier(vec![
            TransitionBarrier::transition(ResourceId(11), ResourceState::RenderTarget, ResourceState::Present),
            TransitionBarrier::transition(ResourceId(20), ResourceState::RenderTarget, ResourceState::PixelShaderResource),
        ]))
    );
    assert_eq!(
        commands.first(),
        Some(&RecordedCommand::ResourceBarrier(vec![TransitionBarrier::transition(
            ResourceId(11),
            ResourceState::Present,
            ResourceState::RenderTarget,
        )]))
    );
}

#[test]
fn test_init_pipeline_transitions_only_non_render_target_states() {
    let mut swap_chain = swap_chain(Vec::new());
    let solution = RenderSolution {
        name: "deferred".to_string(),
        pipelines: vec![RenderPipeline {
            name: "gbuffer".to_string(),
            passes: Vec::new(),
            rtv_initial_states: vec![
                ResourceState::Common,
                ResourceState::RenderTarget,
                ResourceState::PixelShaderResource,
                ResourceState::Present,
                ResourceState::CopySource,
            ],
        }],
        rtv_sources: vec![0, 2, 3, 1, 4],
    };
    swap_chain.solution = Arc::new(solution);

    let mut queue = FrameQueue::new(RecordingDevice::new(), &config(2)).unwrap();
    queue.init_pipeline(&swap_chain).unwrap();

    assert_eq!(queue.fence().completed_value().unwrap(), 1);
    assert_eq!(
        queue.device().submitted_commands(),
        vec![RecordedCommand::ResourceBarrier(vec![
            TransitionBarrier::transition(ResourceId(21), ResourceState::RenderTarget, ResourceState::PixelShaderResource),
            TransitionBarrier::transition(ResourceId(22), ResourceState::RenderTarget, ResourceState::CopySource),
        ])]
    );
}

#[test]
fn test_init_pipeline_without_transitions_records_nothing() {
    let swap_chain = swap_chain(Vec::new());
    let mut queue = FrameQueue::new(RecordingDevice::new(), &config(2)).unwrap();
    queue.init_pipeline(&swap_chain).unwrap();

    assert_eq!(queue.device().submission_count(), 1);
    assert!(queue.device().submitted_commands().is_empty());
    assert_eq!(queue.next_frame_fence(), 2);
}

#[test]
fn test_more_than_one_viewport_or_scissor_fails() {
    let mut viewports = pass("split", vec![subpass(RenderQueueContent::default())]);
    viewports.viewports.push(Viewport::new(640.0, 360.0));
    let mut queue = FrameQueue::new(RecordingDevice::new(), &config(2)).unwrap();
    let err = run_frame(&mut queue, &swap_chain(vec![viewports]), &CameraData::default()).unwrap_err();
    assert!(matches!(err, RenderError::TooManyRasterRects { kind: "viewport", count: 2 }));

    let mut scissors = pass("split", vec![subpass(RenderQueueContent::default())]);
    scissors.scissor_rects.push(ScissorRect {
        left: 0,
        top: 0,
        right: 640,
        bottom: 360,
    });
    let err = run_frame(&mut queue, &swap_chain(vec![scissors]), &CameraData::default()).unwrap_err();
    assert!(matches!(err, RenderError::TooManyRasterRects { kind: "scissor rect", count: 2 }));
    assert_eq!(err.kind(), ErrorKind::Misuse);
}

#[test]
fn test_clear_on_the_wrong_attachment_kind_fails() {
    let depth_clear = LoadOp::ClearDepthStencil {
        flags: ClearFlags::DEPTH,
        depth: 1.0,
        stencil: 0,
    };
    let mut queue = FrameQueue::new(RecordingDevice::new(), &config(2)).unwrap();

    let mut color_target = subpass(RenderQueueContent::default());
    color_target.output_attachments = vec![AttachmentBinding::cleared(3, depth_clear)];
    let err = run_frame(&mut queue, &swap_chain(vec![pass("bad rtv", vec![color_target])]), &CameraData::default())
        .unwrap_err();
    assert!(matches!(err, RenderError::InvalidLoadOp(_)));

    let mut depth_target = subpass(RenderQueueContent::default());
    depth_target.depth_stencil_attachment = Some(AttachmentBinding::cleared(0, LoadOp::ClearColor([1.0; 4])));
    let err = run_frame(&mut queue, &swap_chain(vec![pass("bad dsv", vec![depth_target])]), &CameraData::default())
        .unwrap_err();
    assert!(matches!(err, RenderError::InvalidLoadOp(_)));

    let mut valid = subpass(RenderQueueContent::default());
    valid.depth_stencil_attachment = Some(AttachmentBinding::cleared(0, depth_clear));
    run_frame(&mut queue, &swap_chain(vec![pass("depth", vec![valid])]), &CameraData::default()).unwrap();
    assert!(queue.device().submitted_commands().contains(&RecordedCommand::ClearDepthStencilView {
        dsv: CpuDescriptorHandle(0xa000),
        flags: ClearFlags::DEPTH,
        depth: 1.0,
        stencil: 0,
    }));
}

#[test]
fn test_back_buffer_views_follow_the_current_image() {
    let mut sub = subpass(RenderQueueContent::default());
    sub.output_attachments = vec![
        AttachmentBinding::cleared(0, LoadOp::ClearColor([0.25; 4])),
        AttachmentBinding::load(BACK_BUFFERS),
        AttachmentBinding::load(5),
    ];
    let mut swap_chain = swap_chain(vec![pass("present", vec![sub])]);
    swap_chain.present();

    let mut queue = FrameQueue::new(RecordingDevice::new(), &config(2)).unwrap();
    run_frame(&mut queue, &swap_chain, &CameraData::default()).unwrap();

    // Image 1: linear view 1, sRGB view 1 + 2, then a plain offscreen view
    let commands = queue.device().submitted_commands();
    assert!(commands.contains(&RecordedCommand::ClearRenderTargetView {
        rtv: CpuDescriptorHandle(0x9008),
        color: [0.25; 4],
    }));
    assert!(commands.contains(&RecordedCommand::SetRenderTargets {
        rtvs: vec![CpuDescriptorHandle(0x9008), CpuDescriptorHandle(0x9018), CpuDescriptorHandle(0x9028)],
        dsv: None,
    }));
}

#[test]
fn test_topology_is_only_sent_when_it_changes() {
    let id = subpass_id(0, 0);
    let fullscreen = material("fullscreen", &[id], 1, Vec::new(), Vec::new());
    let strips = material("strips", &[id], 1, Vec::new(), Vec::new());
    let mut mesh = Mesh::new("ribbon", 0, vec![SubMesh::new(8, 0)]);
    mesh.primitive_topology = PrimitiveTopology::TriangleStrip;

    let mut batch = FlattenedObjects::default();
    batch.push(
        MeshRenderer {
            mesh: Arc::new(mesh),
            materials: vec![strips],
        },
        Mat4::identity(),
    );
    let mut content = RenderQueueContent::default();
    content.push_draw_call(DrawCall::full_screen_triangle(Arc::clone(&fullscreen)));
    content.push_draw_call(DrawCall::full_screen_triangle(Arc::clone(&fullscreen)));
    content.push_batch(batch);
    content.push_draw_call(DrawCall::full_screen_triangle(fullscreen));

    let mut queue = FrameQueue::new(RecordingDevice::new(), &config(2)).unwrap();
    let swap_chain = swap_chain(vec![pass("mixed", vec![subpass(content)])]);
    run_frame(&mut queue, &swap_chain, &CameraData::default()).unwrap();

    let commands = queue.device().submitted_commands();
    let topologies: Vec<_> = commands
        .iter()
        .filter_map(|command| match command {
            RecordedCommand::SetPrimitiveTopology(topology) => Some(*topology),
            _ => None,
        })
        .collect();
    assert_eq!(
        topologies,
        vec![
            PrimitiveTopology::TriangleList,
            PrimitiveTopology::TriangleStrip,
            PrimitiveTopology::TriangleList,
        ]
    );
    // Every draw shares one pipeline state, so it is bound once
    let states = commands
        .iter()
        .filter(|command| matches!(command, RecordedCommand::SetPipelineState(_)))
        .count();
    assert_eq!(states, 1);
    assert_eq!(commands.iter().filter(|command| command.is_draw()).count(), 4);
}
