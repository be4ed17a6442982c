//! RenderGraph - 声明式渲染图系统
//!
//! 提供自动依赖排序、资源别名和 barrier 生成的 frame graph。
//!
//! # 核心概念
//!
//! - **RgResourceHandle**: 虚拟资源句柄（下标 + 版本），每次 read-modify-write 产生新版本
//! - **RgImageState / RgBufferState**: 资源状态描述，包含 stage、access、layout
//! - **RgPassBuilder**: setup 阶段声明 Pass 创建、读取、写入、导出的资源
//! - **RgFrameContext**: execute 阶段的命令列表、帧序号和物理资源查询
//! - **RgBlackboard**: Pass 之间按类型共享数据
//! - **RenderGraph**: 注册资源和 Pass，编译后按帧执行
//!
//! # 使用示例
//!
//! ```ignore
//! use aster_render_graph::*;
//!
//! let mut graph = RenderGraph::new(RgHeadlessDevice::new(extent));
//!
//! graph.add_pass(
//!     "lighting",
//!     RgPassType::Compute,
//!     |builder| builder.create_storage_image(RgImageDesc::swapchain_relative(1.0, 1.0, vk::Format::R16G16B16A16_SFLOAT), "hdr", None),
//!     |hdr, ctx| {
//!         let image = ctx.image(*hdr);
//!         // 绑定 descriptor sets, dispatch...
//!     },
//! );
//!
//! graph.compile()?;
//! graph.execute(&mut cmd, frame_index);
//! ```
//!
//! # 模块结构
//!
//! - `resource_handle`: 虚拟资源句柄与物理资源键
//! - `resource_state`: 资源状态（stage/access/layout）封装
//! - `resource` / `resource_registry`: 资源记录与注册表
//! - `pass`: Pass 节点、构建器、执行上下文
//! - `graph`: 依赖图和拓扑排序
//! - `lifetime`: 生命周期与别名分配
//! - `barrier`: 自动 barrier 计算
//! - `compiler`: 校验与编译流程
//! - `physical`: 物理资源池
//! - `frame_graph` / `executor`: graph 主体和执行
//! - `visualize`: DOT 导出和执行计划打印

mod barrier;
mod blackboard;
mod buffer_resource;
mod compiler;
mod error;
mod executor;
mod frame_graph;
mod graph;
mod image_resource;
mod lifetime;
mod pass;
mod physical;
mod resource;
mod resource_handle;
mod resource_registry;
mod resource_state;
mod settings;
mod visualize;

// Re-exports
pub use barrier::{RgBarrierPlan, RgBufferBarrierDesc, RgImageBarrierDesc, RgPassBarriers};
pub use blackboard::RgBlackboard;
pub use buffer_resource::RgBufferDesc;
pub use compiler::RgCompiledGraph;
pub use error::RgCompileError;
pub use frame_graph::{RenderGraph, RgGraphState};
pub use graph::{DependencyAnalyzer, DependencyEdge, DependencyGraph};
pub use image_resource::{RgImageDesc, RgSizePolicy};
pub use lifetime::{RgAliasSlot, RgAliasingPlan, RgLifetime};
pub use pass::{RgFrameContext, RgPassBuilder, RgPassNode, RgPassType, RgResourceAccess};
pub use physical::{RgPhysicalBuffer, RgPhysicalImage, RgPhysicalPool, RgPhysicalResource, RgRealizeStats};
pub use resource::{RgClearValue, RgExportInfo, RgImportInfo, RgResource, RgResourceKind, RgUsageKind, RgUsageMask};
pub use resource_handle::{RgPassHandle, RgPhysicalBufferHandle, RgPhysicalImageHandle, RgResourceHandle};
pub use resource_registry::RgResourceRegistry;
pub use resource_state::{RgAccessState, RgBufferState, RgImageState};
pub use settings::RgSettings;
pub use visualize::{format_access_flags, format_pipeline_stage};
