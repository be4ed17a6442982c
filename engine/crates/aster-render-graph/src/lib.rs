//! Aster 渲染图
//!
//! 声明式的 frame graph：Pass 声明自己创建、读取、写入的资源，
//! 编译阶段自动完成执行排序、资源生命周期分析与别名分配、barrier 推导，
//! 执行阶段按顺序录制 barrier 并回调每个 Pass。
//!
//! 物理设备被抽象为 [`device::RgDevice`]，渲染图本身不依赖任何具体的图形 API 实现；
//! stage / access / layout 等状态使用 `ash::vk` 的值类型表达。

pub mod device;
pub mod profiling;
pub mod render_graph;

pub use device::headless::RgHeadlessDevice;
pub use device::RgDevice;
pub use render_graph::*;
