//! 调试输出：Graphviz DOT 导出和执行计划打印

use std::fmt::Write as _;

use ash::vk;
use itertools::Itertools;

use super::barrier::RgPassBarriers;
use super::frame_graph::RenderGraph;
use super::pass::RgResourceAccess;
use super::resource::RgResourceKind;
use super::resource_state::RgAccessState;
use crate::device::RgDevice;

impl<D: RgDevice> RenderGraph<D> {
    /// 导出 Graphviz DOT 文本
    ///
    /// Pass 为方框，资源版本为椭圆（导入的用虚线，导出的用双线）；
    /// 写入为红色边，读取为蓝色边，编译后的 Pass 依赖为灰色虚线。
    pub fn to_dot(&self) -> String {
        let mut dot = String::new();
        let _ = writeln!(dot, "digraph RenderGraph {{");
        let _ = writeln!(dot, "    rankdir=LR;");
        let _ = writeln!(dot, "    node [fontname=\"Helvetica\", fontsize=10];");

        for (index, pass) in self.passes.iter().enumerate() {
            let _ = writeln!(
                dot,
                "    pass_{} [label=\"{}\\n({:?})\", shape=box, style=filled, fillcolor=\"#cfe2ff\"];",
                index,
                escape(&pass.name),
                pass.pass_type
            );
        }

        for (index, resource) in self.resources.iter() {
            let shape = match resource.kind {
                RgResourceKind::Image => "ellipse",
                RgResourceKind::Buffer => "hexagon",
            };
            let mut style = String::new();
            if resource.is_imported() {
                style.push_str(", style=dashed");
            }
            if resource.is_exported() {
                style.push_str(", peripheries=2");
            }
            let _ = writeln!(
                dot,
                "    res_{} [label=\"{} v{}\", shape={}{}];",
                index,
                escape(&resource.name),
                resource.version,
                shape,
                style
            );
        }

        for (index, pass) in self.passes.iter().enumerate() {
            for access in &pass.outputs {
                let _ = writeln!(dot, "    pass_{} -> res_{} [color=red];", index, access.handle.index());
            }
            for access in &pass.inputs {
                let _ = writeln!(dot, "    res_{} -> pass_{} [color=blue];", access.handle.index(), index);
            }
        }

        if let Some(compiled) = &self.compiled {
            for edge in compiled.dependencies.edges() {
                let _ = writeln!(
                    dot,
                    "    pass_{} -> pass_{} [style=dashed, color=gray, constraint=false];",
                    edge.producer, edge.consumer
                );
            }
        }

        dot.push_str("}\n");
        dot
    }

    /// 打印执行计划（用于调试）
    ///
    /// 输出每个 Pass 的执行顺序、资源读写、物理槽位和 barrier 详细信息。
    pub fn print_execution_plan(&self) {
        let Some(compiled) = &self.compiled else {
            log::info!("RenderGraph: not compiled, no execution plan");
            return;
        };

        log::info!("╔══════════════════════════════════════════════════════════════════╗");
        log::info!("║              RenderGraph Execution Plan                          ║");
        log::info!("╠══════════════════════════════════════════════════════════════════╣");
        log::info!(
            "║ Total Passes: {}  |  Execution Order: [{}]",
            self.passes.len(),
            compiled.order.iter().map(|pass| self.passes[pass.index()].name.as_str()).join(" → ")
        );
        log::info!(
            "║ Resources: {}  |  Physical Slots: {}  |  Aliasing: {}",
            self.resources.len(),
            compiled.aliasing.slots.len(),
            if self.settings.enable_aliasing { "on" } else { "off" }
        );
        log::info!("╚══════════════════════════════════════════════════════════════════╝");

        for (order, &pass) in compiled.order.iter().enumerate() {
            let node = &self.passes[pass.index()];
            let barriers = &compiled.barriers.passes[pass.index()];

            log::info!("");
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!("│ [{}/{}] Pass: \"{}\" ({:?})", order + 1, compiled.order.len(), node.name, node.pass_type);
            log::info!("├─────────────────────────────────────────────────────────────────┤");

            if !node.inputs.is_empty() {
                log::info!("│ Reads:");
                for access in &node.inputs {
                    self.print_access("📖", access);
                }
            }
            if !node.outputs.is_empty() {
                log::info!("│ Writes:");
                for access in &node.outputs {
                    self.print_access("✏️ ", access);
                }
            }

            self.print_barriers(barriers);
            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }

        if compiled.barriers.trailing.has_barriers() {
            log::info!("");
            log::info!("┌─────────────────────────────────────────────────────────────────┐");
            log::info!("│ After last pass (exports)");
            log::info!("├─────────────────────────────────────────────────────────────────┤");
            self.print_barriers(&compiled.barriers.trailing);
            log::info!("└─────────────────────────────────────────────────────────────────┘");
        }

        log::info!("");
        log::info!("═══════════════════════ End of Execution Plan ═══════════════════════");
    }

    fn print_access(&self, icon: &str, access: &RgResourceAccess) {
        let resource = self.resources.get(access.handle);
        let slot = self
            .compiled
            .as_ref()
            .and_then(|compiled| compiled.aliasing.slot_of(resource.root))
            .map_or_else(|| "-".to_string(), |slot| format!("#{}", slot));
        match access.state {
            RgAccessState::Image(state) => log::info!(
                "│   {} \"{}\" v{} [{:?}, slot {}] @ {:?} (stage: {}, access: {})",
                icon,
                resource.name,
                resource.version,
                access.usage,
                slot,
                state.layout,
                format_pipeline_stage(state.stage),
                format_access_flags(state.access)
            ),
            RgAccessState::Buffer(state) => log::info!(
                "│   {} \"{}\" v{} [{:?}, slot {}] (stage: {}, access: {})",
                icon,
                resource.name,
                resource.version,
                access.usage,
                slot,
                format_pipeline_stage(state.stage),
                format_access_flags(state.access)
            ),
        }
    }

    fn print_barriers(&self, barriers: &RgPassBarriers) {
        if !barriers.has_barriers() {
            log::info!("│ No barriers required");
            return;
        }

        log::info!("├─────────────────────────────────────────────────────────────────┤");
        log::info!(
            "│ Barriers: {} image, {} buffer",
            barriers.image_barrier_count(),
            barriers.buffer_barrier_count()
        );

        for barrier in &barriers.image_barriers {
            let layout_change = if barrier.has_layout_transition() {
                format!("{:?} → {:?}", barrier.src_state.layout, barrier.dst_state.layout)
            } else {
                format!("{:?} (no layout change)", barrier.src_state.layout)
            };
            log::info!("│   🔒 Image \"{}\":", self.resources.at(barrier.resource).name);
            log::info!("│       Layout: {}", layout_change);
            log::info!(
                "│       Stage:  {} → {}",
                format_pipeline_stage(barrier.src_state.stage),
                format_pipeline_stage(barrier.dst_state.stage)
            );
            log::info!(
                "│       Access: {} → {}",
                format_access_flags(barrier.src_state.access),
                format_access_flags(barrier.dst_state.access)
            );
            log::info!("│       Aspect: {:?}", barrier.aspect);
        }

        for barrier in &barriers.buffer_barriers {
            log::info!("│   🔒 Buffer \"{}\":", self.resources.at(barrier.resource).name);
            log::info!(
                "│       Stage:  {} → {}",
                format_pipeline_stage(barrier.src_state.stage),
                format_pipeline_stage(barrier.dst_state.stage)
            );
            log::info!(
                "│       Access: {} → {}",
                format_access_flags(barrier.src_state.access),
                format_access_flags(barrier.dst_state.access)
            );
        }
    }
}

fn escape(name: &str) -> String {
    name.replace('\\', "\\\\").replace('"', "\\\"")
}

const STAGE_NAMES: &[(vk::PipelineStageFlags2, &str)] = &[
    (vk::PipelineStageFlags2::TOP_OF_PIPE, "TOP_OF_PIPE"),
    (vk::PipelineStageFlags2::BOTTOM_OF_PIPE, "BOTTOM_OF_PIPE"),
    (vk::PipelineStageFlags2::DRAW_INDIRECT, "DRAW_INDIRECT"),
    (vk::PipelineStageFlags2::VERTEX_SHADER, "VERTEX_SHADER"),
    (vk::PipelineStageFlags2::FRAGMENT_SHADER, "FRAGMENT_SHADER"),
    (vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT, "COLOR_ATTACHMENT_OUTPUT"),
    (vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS, "EARLY_FRAGMENT_TESTS"),
    (vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS, "LATE_FRAGMENT_TESTS"),
    (vk::PipelineStageFlags2::COMPUTE_SHADER, "COMPUTE_SHADER"),
    (vk::PipelineStageFlags2::TRANSFER, "TRANSFER"),
    (vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR, "RAY_TRACING_SHADER"),
];

const ACCESS_NAMES: &[(vk::AccessFlags2, &str)] = &[
    (vk::AccessFlags2::INDIRECT_COMMAND_READ, "INDIRECT_CMD_READ"),
    (vk::AccessFlags2::SHADER_SAMPLED_READ, "SHADER_SAMPLED_READ"),
    (vk::AccessFlags2::SHADER_STORAGE_READ, "STORAGE_READ"),
    (vk::AccessFlags2::SHADER_STORAGE_WRITE, "STORAGE_WRITE"),
    (vk::AccessFlags2::COLOR_ATTACHMENT_READ, "COLOR_ATTACH_READ"),
    (vk::AccessFlags2::COLOR_ATTACHMENT_WRITE, "COLOR_ATTACH_WRITE"),
    (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ, "DEPTH_ATTACH_READ"),
    (vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE, "DEPTH_ATTACH_WRITE"),
    (vk::AccessFlags2::TRANSFER_READ, "TRANSFER_READ"),
    (vk::AccessFlags2::TRANSFER_WRITE, "TRANSFER_WRITE"),
    (vk::AccessFlags2::MEMORY_READ, "MEMORY_READ"),
    (vk::AccessFlags2::MEMORY_WRITE, "MEMORY_WRITE"),
];

/// 格式化 PipelineStageFlags2 为可读字符串
pub fn format_pipeline_stage(stage: vk::PipelineStageFlags2) -> String {
    if stage == vk::PipelineStageFlags2::NONE {
        return "NONE".to_string();
    }
    let names = STAGE_NAMES.iter().filter(|(flag, _)| stage.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if names.is_empty() { format!("{:?}", stage) } else { names.join(" | ") }
}

/// 格式化 AccessFlags2 为可读字符串
pub fn format_access_flags(access: vk::AccessFlags2) -> String {
    if access == vk::AccessFlags2::NONE {
        return "NONE".to_string();
    }
    let names = ACCESS_NAMES.iter().filter(|(flag, _)| access.contains(*flag)).map(|(_, name)| *name).collect_vec();
    if names.is_empty() { format!("{:?}", access) } else { names.join(" | ") }
}
