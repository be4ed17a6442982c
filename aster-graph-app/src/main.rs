//! 渲染图示例程序
//!
//! 用 headless device 驱动一个延迟渲染风格的帧：编译、执行几帧、
//! 模拟窗口尺寸变化后 resize，再执行几帧，最后输出 DOT 文本。
//!
//! `RUST_LOG=aster_render_graph=debug` 可以看到别名分配的过程。

mod deferred;

use anyhow::Context;
use ash::vk;
use aster_render_graph::device::headless::{RgHeadlessCommandList, RgHeadlessDevice};
use aster_render_graph::device::{RgDevice, RgImageCreateInfo};
use aster_render_graph::{RenderGraph, RgSettings};

const FRAMES_PER_SIZE: u64 = 3;

fn run_frames(graph: &mut RenderGraph<RgHeadlessDevice>, cmd: &mut RgHeadlessCommandList, frames: std::ops::Range<u64>) {
    for frame_index in frames {
        aster_render_graph::rg_profile_span!("frame");
        cmd.clear();
        graph.execute(cmd, frame_index);
        log::info!(
            "frame {}: {} commands ({} barriers)",
            frame_index,
            cmd.commands().len(),
            cmd.barrier_count()
        );
        for command in cmd.commands() {
            log::debug!("    {:?}", command);
        }
    }
}

fn main() -> anyhow::Result<()> {
    aster_crate_tools::init_log::init_log();
    #[cfg(feature = "profiling")]
    aster_render_graph::profiling::start_profiler();

    let extent = vk::Extent2D {
        width: 1280,
        height: 720,
    };
    let mut device = RgHeadlessDevice::new(extent);
    let swapchain_image = device.create_image(
        "swapchain",
        &RgImageCreateInfo {
            extent: vk::Extent3D {
                width: extent.width,
                height: extent.height,
                depth: 1,
            },
            format: vk::Format::B8G8R8A8_UNORM,
            usage: vk::ImageUsageFlags::COLOR_ATTACHMENT,
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            image_type: vk::ImageType::TYPE_2D,
        },
    );

    let settings = RgSettings {
        frames_in_flight: 2,
        log_execution_plan: true,
        ..Default::default()
    };
    let mut graph = RenderGraph::with_settings(device, settings);
    deferred::build(&mut graph, swapchain_image);
    graph.compile().context("failed to compile the deferred frame graph")?;

    let mut cmd = RgHeadlessCommandList::new();
    run_frames(&mut graph, &mut cmd, 0..FRAMES_PER_SIZE);

    graph.device_mut().set_swapchain_extent(vk::Extent2D {
        width: 1920,
        height: 1080,
    });
    let stats = graph.resize().context("failed to resize the deferred frame graph")?;
    log::info!(
        "resize: reused {}, created {}, destroyed {}; {} images alive",
        stats.reused,
        stats.created,
        stats.destroyed,
        graph.device().live_image_count()
    );
    run_frames(&mut graph, &mut cmd, FRAMES_PER_SIZE..FRAMES_PER_SIZE * 2);

    println!("{}", graph.to_dot());
    Ok(())
}
