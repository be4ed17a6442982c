//! 延迟渲染风格的一帧
//!
//! cull → gbuffer → lighting → bloom-downsample → bloom-blur → tonemap(present)
//!
//! Pass 之间通过 blackboard 传递资源句柄。

use ash::vk;
use aster_render_graph::device::headless::{RgHeadlessDevice, RgHeadlessImage};
use aster_render_graph::{
    RenderGraph, RgBufferDesc, RgClearValue, RgFrameContext, RgImageDesc, RgImageState, RgPassType, RgResourceHandle,
};

type FrameContext<'a> = RgFrameContext<'a, RgHeadlessDevice>;

/// 后处理参数，由应用在构建之前写入 blackboard
pub struct PostSettings {
    pub exposure: f32,
    pub bloom_strength: f32,
}

impl Default for PostSettings {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            bloom_strength: 0.04,
        }
    }
}

#[derive(Default)]
pub struct CullData {
    pub draw_args: RgResourceHandle,
}

#[derive(Default)]
pub struct GBufferData {
    pub albedo: RgResourceHandle,
    pub normal: RgResourceHandle,
    pub depth: RgResourceHandle,
}

#[derive(Default)]
pub struct LightingData {
    pub hdr: RgResourceHandle,
}

#[derive(Default)]
pub struct BloomData {
    pub bloom: RgResourceHandle,
}

/// 在 headless 命令列表上记录 Pass 名称
fn mark(ctx: &mut FrameContext<'_>, detail: String) {
    let label = format!("{} [slot {}] {}", ctx.pass_name(), ctx.frame_in_flight(), detail);
    ctx.cmd.marker(label);
}

pub fn build(graph: &mut RenderGraph<RgHeadlessDevice>, swapchain_image: RgHeadlessImage) {
    graph.blackboard_mut().insert::<PostSettings>().exposure = 1.2;

    let swapchain = graph.import_image(
        "swapchain",
        RgImageDesc::swapchain_relative(1.0, 1.0, vk::Format::B8G8R8A8_UNORM),
        swapchain_image,
        RgImageState::UNDEFINED,
    );

    add_cull_pass(graph);
    add_gbuffer_pass(graph);
    add_lighting_pass(graph);
    add_bloom_passes(graph);
    add_tonemap_pass(graph, swapchain);
}

fn add_cull_pass(graph: &mut RenderGraph<RgHeadlessDevice>) {
    graph.add_pass(
        "cull",
        RgPassType::Compute,
        |builder| {
            let draw_args = builder.create_buffer(
                RgBufferDesc::new(64 * 1024, vk::BufferUsageFlags::INDIRECT_BUFFER),
                "draw-args",
            );
            builder.blackboard().insert::<CullData>().draw_args = draw_args;
            draw_args
        },
        |draw_args, ctx| {
            let detail = format!("draw-args: {:?}", ctx.buffer(*draw_args));
            mark(ctx, detail);
        },
    );
}

fn add_gbuffer_pass(graph: &mut RenderGraph<RgHeadlessDevice>) {
    graph.add_pass(
        "gbuffer",
        RgPassType::Rasterizer,
        |builder| {
            let draw_args = builder.blackboard().get::<CullData>().draw_args;
            builder.read_buffer(draw_args);

            let albedo = builder.create_attachment(
                RgImageDesc::swapchain_relative(1.0, 1.0, vk::Format::R8G8B8A8_UNORM),
                "gbuffer-albedo",
                Some(RgClearValue::BLACK),
            );
            let normal = builder.create_attachment(
                RgImageDesc::swapchain_relative(1.0, 1.0, vk::Format::R16G16B16A16_SFLOAT),
                "gbuffer-normal",
                Some(RgClearValue::TRANSPARENT),
            );
            let depth = builder.create_attachment(
                RgImageDesc::swapchain_relative(1.0, 1.0, vk::Format::D32_SFLOAT),
                "gbuffer-depth",
                Some(RgClearValue::DEPTH_ONE),
            );

            let data = builder.blackboard().insert::<GBufferData>();
            data.albedo = albedo;
            data.normal = normal;
            data.depth = depth;
            [albedo, normal, depth]
        },
        |targets, ctx| {
            let clears = targets.iter().filter(|&&target| ctx.clear_value(target).is_some()).count();
            let extent = ctx.image_extent(targets[0]);
            mark(ctx, format!("{} cleared targets, extent {:?}", clears, extent));
        },
    );
}

fn add_lighting_pass(graph: &mut RenderGraph<RgHeadlessDevice>) {
    graph.add_pass(
        "lighting",
        RgPassType::Compute,
        |builder| {
            let gbuffer = builder.blackboard().get::<GBufferData>();
            let (albedo, normal, depth) = (gbuffer.albedo, gbuffer.normal, gbuffer.depth);
            builder.read_texture(albedo);
            builder.read_texture(normal);
            builder.read_texture(depth);

            let desc = builder.image_desc(albedo).clone();
            let hdr = builder.create_storage_image(
                RgImageDesc {
                    format: vk::Format::R16G16B16A16_SFLOAT,
                    ..desc
                },
                "hdr",
                None,
            );
            builder.blackboard().insert::<LightingData>().hdr = hdr;
            hdr
        },
        |hdr, ctx| {
            let exposure = ctx.blackboard().get::<PostSettings>().exposure;
            let detail = format!("hdr: {:?}, exposure {}", ctx.image(*hdr), exposure);
            mark(ctx, detail);
        },
    );
}

fn add_bloom_passes(graph: &mut RenderGraph<RgHeadlessDevice>) {
    graph.add_pass(
        "bloom-downsample",
        RgPassType::Compute,
        |builder| {
            let hdr = builder.blackboard().get::<LightingData>().hdr;
            builder.read_texture(hdr);
            let bloom = builder.create_storage_image(
                RgImageDesc::input_relative(hdr, 0.5, 0.5, vk::Format::B10G11R11_UFLOAT_PACK32),
                "bloom",
                None,
            );
            builder.blackboard().insert::<BloomData>().bloom = bloom;
        },
        |_, ctx| mark(ctx, String::new()),
    );

    graph.add_pass(
        "bloom-blur",
        RgPassType::Compute,
        |builder| {
            let bloom = builder.blackboard().get::<BloomData>().bloom;
            let blurred = builder.write_storage_image(bloom);
            // 之后的 Pass 必须使用新版本
            builder.blackboard().get_mut::<BloomData>().bloom = blurred;
            blurred
        },
        |bloom, ctx| {
            let strength = ctx.blackboard().get::<PostSettings>().bloom_strength;
            let detail = format!("{:?} strength {}", ctx.image_extent(*bloom), strength);
            mark(ctx, detail);
        },
    );
}

fn add_tonemap_pass(graph: &mut RenderGraph<RgHeadlessDevice>, swapchain: RgResourceHandle) {
    graph.add_pass(
        "tonemap",
        RgPassType::Rasterizer,
        |builder| {
            let hdr = builder.blackboard().get::<LightingData>().hdr;
            let bloom = builder.blackboard().get::<BloomData>().bloom;
            builder.read_texture(hdr);
            builder.read_texture(bloom);

            let target = builder.write_attachment(swapchain);
            builder.export_texture_as(target, RgImageState::PRESENT);
            target
        },
        |target, ctx| {
            let detail = format!("present target {:?}", ctx.image(*target));
            mark(ctx, detail);
        },
    );
}
