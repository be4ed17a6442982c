//! 按编译结果执行渲染图
//!
//! 每个 Pass 之前录制预先计算的 barrier，然后调用 Pass 的 execute 回调；
//! 所有 Pass 之后录制导出图像的最终转换。

use ash::vk;

use super::barrier::RgPassBarriers;
use super::frame_graph::{RenderGraph, RgGraphState};
use super::pass::RgFrameContext;
use super::physical::RgPhysicalPool;
use super::resource_registry::RgResourceRegistry;
use crate::device::{RgBufferBarrier, RgDevice, RgImageBarrier};

impl<D: RgDevice> RenderGraph<D> {
    /// 执行渲染图
    ///
    /// # 参数
    /// - `cmd`: 命令列表（已经 begin）
    /// - `frame_index`: 单调递增的帧序号，`frame_index % frames_in_flight` 传给 Pass
    ///
    /// Pass 回调 panic 时 graph 回到 `Compiled`，已录制的命令由调用方丢弃。
    ///
    /// # Panics
    /// graph 未编译
    pub fn execute(&mut self, cmd: &mut D::CommandList, frame_index: u64) {
        crate::rg_profile_span!("RenderGraph::execute");
        assert_eq!(
            self.state,
            RgGraphState::Compiled,
            "RenderGraph: execute requires a compiled graph (state: {:?})",
            self.state
        );
        let Some(compiled) = self.compiled.as_ref() else {
            panic!("RenderGraph: execute requires a compiled graph");
        };

        let frame_in_flight = (frame_index % self.settings.frames_in_flight as u64) as usize;
        self.state = RgGraphState::Executing;
        let _executing = scopeguard::guard(&mut self.state, |state| *state = RgGraphState::Compiled);

        for &pass in &compiled.order {
            let node = &mut self.passes[pass.index()];

            let barriers = &compiled.barriers.passes[pass.index()];
            if barriers.has_barriers() {
                record_barriers(&mut self.device, cmd, &self.resources, &self.physical, barriers, &node.name);
            }

            let mut ctx = RgFrameContext {
                cmd: &mut *cmd,
                frame_index,
                frame_in_flight,
                pass_name: &node.name,
                blackboard: &self.blackboard,
                resources: &self.resources,
                physical: &self.physical,
            };
            (node.execute)(&mut ctx);
        }

        if compiled.barriers.trailing.has_barriers() {
            record_barriers(
                &mut self.device,
                cmd,
                &self.resources,
                &self.physical,
                &compiled.barriers.trailing,
                "<export>",
            );
        }
    }
}

/// 把 barrier 描述解析到物理资源并交给设备录制
///
/// 没有绑定物理资源的 barrier 会被跳过。
fn record_barriers<D: RgDevice>(
    device: &mut D,
    cmd: &mut D::CommandList,
    resources: &RgResourceRegistry,
    physical: &RgPhysicalPool<D>,
    barriers: &RgPassBarriers,
    pass_name: &str,
) {
    let image_barriers: Vec<RgImageBarrier<D::Image>> = barriers
        .image_barriers
        .iter()
        .filter_map(|desc| {
            let Some(entry) = physical.image_of(desc.resource) else {
                log::warn!(
                    "RenderGraph: image '{}' has no physical image, barrier before '{}' skipped",
                    resources.at(desc.resource).name,
                    pass_name
                );
                return None;
            };
            Some(RgImageBarrier {
                image: entry.image,
                src_state: desc.src_state,
                dst_state: desc.dst_state,
                aspect: desc.aspect,
                mip_levels: desc.mip_levels,
                array_layers: desc.array_layers,
            })
        })
        .collect();

    let buffer_barriers: Vec<RgBufferBarrier<D::Buffer>> = barriers
        .buffer_barriers
        .iter()
        .filter_map(|desc| {
            let Some(entry) = physical.buffer_of(desc.resource) else {
                log::warn!(
                    "RenderGraph: buffer '{}' has no physical buffer, barrier before '{}' skipped",
                    resources.at(desc.resource).name,
                    pass_name
                );
                return None;
            };
            Some(RgBufferBarrier {
                buffer: entry.buffer,
                src_state: desc.src_state,
                dst_state: desc.dst_state,
                offset: 0,
                size: vk::WHOLE_SIZE,
            })
        })
        .collect();

    log::trace!(
        "RenderGraph: {} image / {} buffer barriers before '{}'",
        image_barriers.len(),
        buffer_barriers.len(),
        pass_name
    );
    if !image_barriers.is_empty() || !buffer_barriers.is_empty() {
        device.record_barriers(cmd, &image_barriers, &buffer_barriers);
    }
}
