//! RenderGraph 主体
//!
//! 持有设备、资源注册表、Pass 列表和物理资源池。
//!
//! # 使用流程
//!
//! 1. 创建 graph: `RenderGraph::new(device)`
//! 2. 导入外部资源: `graph.import_image(...)`
//! 3. 添加 Pass: `graph.add_pass("name", type, setup, execute)`
//! 4. 编译: `graph.compile()?`
//! 5. 每帧执行: `graph.execute(&mut cmd, frame_index)`
//! 6. 窗口尺寸变化后: `graph.resize()?`

use std::collections::HashMap;

use super::blackboard::RgBlackboard;
use super::barrier::RgPassBarriers;
use super::buffer_resource::RgBufferDesc;
use super::compiler::{self, RgCompiledGraph, RgCompiler};
use super::error::RgCompileError;
use super::image_resource::RgImageDesc;
use super::lifetime::RgLifetime;
use super::pass::{RgExecuteFn, RgFrameContext, RgPassBuilder, RgPassNode, RgPassType};
use super::physical::{RgPhysicalPool, RgRealizeStats};
use super::resource::{RgImportInfo, RgResource};
use super::resource_handle::{RgPassHandle, RgResourceHandle};
use super::resource_registry::RgResourceRegistry;
use super::resource_state::{RgAccessState, RgBufferState, RgImageState};
use super::settings::RgSettings;
use crate::device::RgDevice;

/// graph 的生命周期状态
///
/// `Building → Compiled → Executing → Compiled … → Resizing → Compiled`
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RgGraphState {
    /// 可以添加 Pass 和导入资源
    Building,
    /// 已编译，可以执行或 resize
    Compiled,
    Executing,
    Resizing,
}

pub struct RenderGraph<D: RgDevice> {
    pub(crate) device: D,
    pub(crate) settings: RgSettings,
    pub(crate) state: RgGraphState,

    pub(crate) resources: RgResourceRegistry,
    /// Pass 节点列表（按声明顺序）
    pub(crate) passes: Vec<RgPassNode<D>>,
    pass_names: HashMap<String, RgPassHandle>,
    pub(crate) blackboard: RgBlackboard,

    pub(crate) physical: RgPhysicalPool<D>,
    pub(crate) compiled: Option<RgCompiledGraph>,
}

// new & init
impl<D: RgDevice> RenderGraph<D> {
    pub fn new(device: D) -> Self {
        Self::with_settings(device, RgSettings::default())
    }

    pub fn with_settings(device: D, settings: RgSettings) -> Self {
        assert!(settings.frames_in_flight > 0, "RenderGraph: frames_in_flight must be at least 1");
        Self {
            device,
            settings,
            state: RgGraphState::Building,
            resources: RgResourceRegistry::new(),
            passes: Vec::new(),
            pass_names: HashMap::new(),
            blackboard: RgBlackboard::default(),
            physical: RgPhysicalPool::default(),
            compiled: None,
        }
    }
}

// build
impl<D: RgDevice> RenderGraph<D> {
    /// 添加 Pass
    ///
    /// `setup` 立即以绑定到新 Pass 的构建器调用，用于声明资源；它的返回值会被保存，
    /// 每帧以引用的形式传给 `execute`。
    ///
    /// # Panics
    /// - 名称已存在
    /// - graph 已经编译
    pub fn add_pass<T, S, E>(
        &mut self,
        name: impl Into<String>,
        pass_type: RgPassType,
        setup: S,
        mut execute: E,
    ) -> RgPassHandle
    where
        T: 'static,
        S: FnOnce(&mut RgPassBuilder<'_>) -> T,
        E: FnMut(&T, &mut RgFrameContext<'_, D>) + 'static,
    {
        let name = name.into();
        self.assert_building("add_pass");
        assert!(!self.pass_names.contains_key(&name), "RenderGraph: pass '{}' already exists", name);

        let pass = RgPassHandle::new(self.passes.len());
        let mut builder = RgPassBuilder {
            pass,
            name: &name,
            pass_type,
            inputs: Vec::new(),
            outputs: Vec::new(),
            resources: &mut self.resources,
            blackboard: &mut self.blackboard,
        };
        let data = setup(&mut builder);
        let (inputs, outputs) = (builder.inputs, builder.outputs);

        if inputs.is_empty() && outputs.is_empty() {
            log::warn!("RenderGraph: pass '{}' declares no resources", name);
        }

        let execute: RgExecuteFn<D> = Box::new(move |ctx: &mut RgFrameContext<'_, D>| execute(&data, ctx));
        self.pass_names.insert(name.clone(), pass);
        self.passes.push(RgPassNode {
            name,
            pass_type,
            inputs,
            outputs,
            edges: Vec::new(),
            execute,
        });
        pass
    }

    /// 导入外部图像
    ///
    /// 导入的图像不会被 graph 分配、别名或销毁；barrier 从 `initial_state` 开始。
    /// `desc` 只用于推导 aspect 和相对尺寸。
    pub fn import_image(
        &mut self,
        name: impl Into<String>,
        desc: RgImageDesc,
        image: D::Image,
        initial_state: RgImageState,
    ) -> RgResourceHandle {
        self.assert_building("import_image");
        let name = name.into();
        let physical = self.physical.import_image(&name, image);
        let handle = self.resources.register_image(name, desc, None, None);
        self.resources.set_import(
            handle,
            RgImportInfo {
                physical,
                initial_state: RgAccessState::Image(initial_state),
            },
        );
        handle
    }

    /// 导入外部缓冲区
    pub fn import_buffer(
        &mut self,
        name: impl Into<String>,
        desc: RgBufferDesc,
        buffer: D::Buffer,
        initial_state: RgBufferState,
    ) -> RgResourceHandle {
        self.assert_building("import_buffer");
        let name = name.into();
        let physical = self.physical.import_buffer(&name, buffer);
        let handle = self.resources.register_buffer(name, desc, None);
        self.resources.set_import(
            handle,
            RgImportInfo {
                physical,
                initial_state: RgAccessState::Buffer(initial_state),
            },
        );
        handle
    }

    fn assert_building(&self, op: &str) {
        assert_eq!(
            self.state,
            RgGraphState::Building,
            "RenderGraph: {} is only allowed while building (state: {:?})",
            op,
            self.state
        );
    }
}

// compile & resize
impl<D: RgDevice> RenderGraph<D> {
    /// 编译渲染图
    ///
    /// 依赖排序、生命周期与别名分配、barrier 推导，然后分配物理资源。
    /// 重复编译得到相同的结果，未变化的物理资源会被沿用。
    /// 失败时 graph 回到 Building 状态。
    pub fn compile(&mut self) -> Result<(), RgCompileError> {
        crate::rg_profile_span!("RenderGraph::compile");
        assert!(
            matches!(self.state, RgGraphState::Building | RgGraphState::Compiled),
            "RenderGraph: compile called while {:?}",
            self.state
        );

        match self.compile_inner() {
            Ok(stats) => {
                self.state = RgGraphState::Compiled;
                log::info!(
                    "RenderGraph: compiled {} passes, {} resources into {} physical slots (reused {}, created {}, destroyed {})",
                    self.passes.len(),
                    self.resources.len(),
                    self.compiled.as_ref().map_or(0, |compiled| compiled.aliasing.slots.len()),
                    stats.reused,
                    stats.created,
                    stats.destroyed
                );
                if self.settings.log_execution_plan {
                    self.print_execution_plan();
                }
                Ok(())
            }
            Err(err) => {
                log::error!("{}", err);
                self.state = RgGraphState::Building;
                self.compiled = None;
                Err(err)
            }
        }
    }

    fn compile_inner(&mut self) -> Result<RgRealizeStats, RgCompileError> {
        let compiled = RgCompiler::new(&self.resources, &self.passes, &self.settings).compile()?;

        for pass in &mut self.passes {
            pass.edges.clear();
        }
        for edge in compiled.dependencies.edges() {
            self.passes[edge.producer].edges.push(RgPassHandle::new(edge.consumer));
        }

        let stats = compiler::realize_physical(&self.resources, &compiled, &mut self.device, &mut self.physical)?;
        self.compiled = Some(compiled);
        Ok(stats)
    }

    /// 按当前 swapchain 尺寸重新分配物理资源
    ///
    /// 调用方保证没有正在执行的 GPU 工作引用旧资源。尺寸不变的资源保留原来的句柄。
    pub fn resize(&mut self) -> Result<RgRealizeStats, RgCompileError> {
        crate::rg_profile_span!("RenderGraph::resize");
        assert_eq!(
            self.state,
            RgGraphState::Compiled,
            "RenderGraph: resize requires a compiled graph (state: {:?})",
            self.state
        );
        let Some(compiled) = self.compiled.as_ref() else {
            panic!("RenderGraph: resize requires a compiled graph");
        };

        self.state = RgGraphState::Resizing;
        match compiler::realize_physical(&self.resources, compiled, &mut self.device, &mut self.physical) {
            Ok(stats) => {
                let extent = self.device.swapchain_extent();
                log::info!(
                    "RenderGraph: resized to {}x{} (reused {}, created {}, destroyed {})",
                    extent.width,
                    extent.height,
                    stats.reused,
                    stats.created,
                    stats.destroyed
                );
                self.state = RgGraphState::Compiled;
                Ok(stats)
            }
            Err(err) => {
                log::error!("{}", err);
                self.state = RgGraphState::Building;
                self.compiled = None;
                Err(err)
            }
        }
    }
}

// getters
impl<D: RgDevice> RenderGraph<D> {
    #[inline]
    pub fn state(&self) -> RgGraphState {
        self.state
    }

    #[inline]
    pub fn settings(&self) -> &RgSettings {
        &self.settings
    }

    #[inline]
    pub fn device(&self) -> &D {
        &self.device
    }

    /// 设备的可变引用，例如更新 swapchain 尺寸后调用 `resize`
    #[inline]
    pub fn device_mut(&mut self) -> &mut D {
        &mut self.device
    }

    #[inline]
    pub fn blackboard(&self) -> &RgBlackboard {
        &self.blackboard
    }

    #[inline]
    pub fn blackboard_mut(&mut self) -> &mut RgBlackboard {
        &mut self.blackboard
    }

    #[inline]
    pub fn pass_count(&self) -> usize {
        self.passes.len()
    }

    #[inline]
    pub fn pass(&self, handle: RgPassHandle) -> &RgPassNode<D> {
        &self.passes[handle.index()]
    }

    pub fn find_pass(&self, name: &str) -> Option<RgPassHandle> {
        self.pass_names.get(name).copied()
    }

    #[inline]
    pub fn resources(&self) -> &RgResourceRegistry {
        &self.resources
    }

    #[inline]
    pub fn resource(&self, handle: RgResourceHandle) -> &RgResource {
        self.resources.get(handle)
    }

    #[inline]
    pub fn compiled(&self) -> Option<&RgCompiledGraph> {
        self.compiled.as_ref()
    }

    #[inline]
    pub fn physical(&self) -> &RgPhysicalPool<D> {
        &self.physical
    }

    /// 执行顺序，未编译时为空
    pub fn execution_order(&self) -> &[RgPassHandle] {
        self.compiled.as_ref().map_or(&[], |compiled| compiled.order.as_slice())
    }

    pub fn edge_count(&self) -> usize {
        self.compiled.as_ref().map_or(0, |compiled| compiled.dependencies.edge_count())
    }

    /// 资源版本绑定的物理图像
    pub fn physical_image(&self, handle: RgResourceHandle) -> Option<D::Image> {
        self.physical.image_of(handle.index()).map(|entry| entry.image)
    }

    pub fn physical_buffer(&self, handle: RgResourceHandle) -> Option<D::Buffer> {
        self.physical.buffer_of(handle.index()).map(|entry| entry.buffer)
    }

    /// 资源所在的别名槽位；导入的资源没有槽位
    pub fn slot_of(&self, handle: RgResourceHandle) -> Option<usize> {
        let root = self.resources.get(handle).root;
        self.compiled.as_ref()?.aliasing.slot_of(root)
    }

    /// 资源版本在执行顺序上的生命周期
    pub fn lifetime(&self, handle: RgResourceHandle) -> Option<RgLifetime> {
        self.compiled.as_ref()?.lifetimes.get(handle.index()).copied()
    }

    /// Pass 执行前录制的 barrier
    pub fn pass_barriers(&self, pass: RgPassHandle) -> Option<&RgPassBarriers> {
        self.compiled.as_ref()?.barriers.passes.get(pass.index())
    }

    /// 最后一个 Pass 之后录制的 barrier
    pub fn trailing_barriers(&self) -> Option<&RgPassBarriers> {
        self.compiled.as_ref().map(|compiled| &compiled.barriers.trailing)
    }
}

impl<D: RgDevice> Drop for RenderGraph<D> {
    fn drop(&mut self) {
        log::debug!("RenderGraph: destroying {} physical resources", self.physical.owned_count());
        self.physical.destroy_all(&mut self.device);
    }
}

#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use ash::vk;

    use super::*;
    use crate::device::headless::{
        RgHeadlessBuffer, RgHeadlessCommand, RgHeadlessCommandList, RgHeadlessDevice, RgHeadlessImage,
    };
    use crate::device::{RgBufferBarrier, RgBufferCreateInfo, RgImageBarrier, RgImageCreateInfo};
    use crate::render_graph::resource::RgClearValue;

    const EXTENT: vk::Extent2D = vk::Extent2D { width: 1280, height: 720 };

    fn new_graph() -> RenderGraph<RgHeadlessDevice> {
        RenderGraph::new(RgHeadlessDevice::new(EXTENT))
    }

    fn storage_desc(size: u32) -> RgImageDesc {
        RgImageDesc::new_2d(size, size, vk::Format::R16G16B16A16_SFLOAT)
    }

    fn buffer_desc() -> RgBufferDesc {
        RgBufferDesc::new(4096, vk::BufferUsageFlags::STORAGE_BUFFER)
    }

    /// 与测试共享的设备，graph drop 之后仍可检查
    struct SharedDevice(Rc<RefCell<RgHeadlessDevice>>);

    impl RgDevice for SharedDevice {
        type Image = RgHeadlessImage;
        type Buffer = RgHeadlessBuffer;
        type CommandList = RgHeadlessCommandList;

        fn create_image(&mut self, name: &str, info: &RgImageCreateInfo) -> Self::Image {
            self.0.borrow_mut().create_image(name, info)
        }

        fn create_buffer(&mut self, name: &str, info: &RgBufferCreateInfo) -> Self::Buffer {
            self.0.borrow_mut().create_buffer(name, info)
        }

        fn destroy_image(&mut self, image: Self::Image) {
            self.0.borrow_mut().destroy_image(image)
        }

        fn destroy_buffer(&mut self, buffer: Self::Buffer) {
            self.0.borrow_mut().destroy_buffer(buffer)
        }

        fn record_barriers(
            &mut self,
            cmd: &mut Self::CommandList,
            image_barriers: &[RgImageBarrier<Self::Image>],
            buffer_barriers: &[RgBufferBarrier<Self::Buffer>],
        ) {
            self.0.borrow_mut().record_barriers(cmd, image_barriers, buffer_barriers)
        }

        fn swapchain_extent(&self) -> vk::Extent2D {
            self.0.borrow().swapchain_extent()
        }
    }

    #[test]
    fn test_buffer_then_image_scenario() {
        let mut graph = new_graph();
        let mut b0 = RgResourceHandle::INVALID;
        let mut i0 = RgResourceHandle::INVALID;

        let a = graph.add_pass(
            "A",
            RgPassType::Compute,
            |builder| {
                b0 = builder.create_buffer(buffer_desc(), "B0");
            },
            |_, _| {},
        );
        let c = graph.add_pass(
            "C",
            RgPassType::Compute,
            |builder| {
                builder.read_buffer(b0);
                i0 = builder.create_storage_image(storage_desc(64), "I0", None);
            },
            |_, _| {},
        );
        let d = graph.add_pass(
            "D",
            RgPassType::Compute,
            |builder| {
                builder.read_texture(i0);
                let output = builder.create_storage_image(storage_desc(64), "output", None);
                builder.export_texture(output);
            },
            |_, _| {},
        );

        graph.compile().unwrap();
        assert_eq!(graph.state(), RgGraphState::Compiled);
        assert_eq!(graph.execution_order(), &[a, c, d]);
        assert_eq!(graph.edge_count(), 2);
        assert_eq!(graph.pass(a).edges(), &[c]);
        assert_eq!(graph.pass(c).edges(), &[d]);
        assert!(graph.pass(d).edges().is_empty());
        assert_eq!(graph.resources().len(), 3);
        assert_eq!(graph.resource(b0).producer(), Some(a));
        assert_eq!(graph.resource(i0).readers(), &[d]);
        assert!(graph.physical_buffer(b0).is_some());
        assert!(graph.physical_image(i0).is_some());
    }

    #[test]
    fn test_producer_precedes_readers_declared_out_of_order() {
        let mut graph = new_graph();
        let mut color = RgResourceHandle::INVALID;
        let mut lit = RgResourceHandle::INVALID;

        // 先声明无关的 Pass，再声明生产者与消费者
        let unrelated = graph.add_pass(
            "unrelated",
            RgPassType::Compute,
            |builder| {
                builder.create_buffer(buffer_desc(), "scratch");
            },
            |_, _| {},
        );
        let producer = graph.add_pass(
            "gbuffer",
            RgPassType::Rasterizer,
            |builder| {
                color = builder.create_attachment(storage_desc(32), "albedo", Some(RgClearValue::BLACK));
            },
            |_, _| {},
        );
        let consumer = graph.add_pass(
            "lighting",
            RgPassType::Compute,
            |builder| {
                builder.read_texture(color);
                lit = builder.create_storage_image(storage_desc(32), "lit", None);
            },
            |_, _| {},
        );
        graph.compile().unwrap();

        let order = graph.execution_order();
        let position = |pass: RgPassHandle| order.iter().position(|&p| p == pass);
        assert!(position(producer) < position(consumer));
        assert_eq!(order[0], unrelated);
        assert_eq!(graph.resource(color).clear_value(), Some(RgClearValue::BLACK));
        assert!(graph.resource(lit).readers().is_empty());
    }

    #[test]
    fn test_disjoint_transients_share_physical_image() {
        let build = |enable_aliasing: bool| {
            let settings = RgSettings {
                enable_aliasing,
                ..Default::default()
            };
            let mut graph = RenderGraph::with_settings(RgHeadlessDevice::new(EXTENT), settings);
            let mut t0 = RgResourceHandle::INVALID;
            let mut x = RgResourceHandle::INVALID;
            let mut t1 = RgResourceHandle::INVALID;

            graph.add_pass("p0", RgPassType::Compute, |b| t0 = b.create_storage_image(storage_desc(64), "t0", None), |_, _| {});
            graph.add_pass(
                "p1",
                RgPassType::Compute,
                |b| {
                    b.read_texture(t0);
                    x = b.create_buffer(buffer_desc(), "x");
                },
                |_, _| {},
            );
            graph.add_pass(
                "p2",
                RgPassType::Compute,
                |b| {
                    b.read_buffer(x);
                    t1 = b.create_storage_image(storage_desc(64), "t1", None);
                },
                |_, _| {},
            );
            graph.add_pass(
                "p3",
                RgPassType::Compute,
                |b| {
                    b.read_texture(t1);
                    let out = b.create_storage_image(storage_desc(64), "out", None);
                    b.export_texture(out);
                },
                |_, _| {},
            );
            graph.compile().unwrap();
            (graph, t0, t1)
        };

        let (graph, t0, t1) = build(true);
        assert_eq!(graph.lifetime(t0), Some(RgLifetime { first_write: 0, last_read: 1 }));
        assert_eq!(graph.lifetime(t1), Some(RgLifetime { first_write: 2, last_read: 3 }));
        assert_eq!(graph.slot_of(t0), graph.slot_of(t1));
        assert_eq!(graph.physical_image(t0), graph.physical_image(t1));
        // t0|t1 共享一张，out 独占一张
        assert_eq!(graph.device().live_image_count(), 2);

        let (graph, t0, t1) = build(false);
        assert_ne!(graph.slot_of(t0), graph.slot_of(t1));
        assert_ne!(graph.physical_image(t0), graph.physical_image(t1));
        assert_eq!(graph.device().live_image_count(), 3);
    }

    #[test]
    fn test_overlapping_transients_get_distinct_slots() {
        let mut graph = new_graph();
        let mut t0 = RgResourceHandle::INVALID;
        let mut t1 = RgResourceHandle::INVALID;

        graph.add_pass(
            "write",
            RgPassType::Compute,
            |b| {
                t0 = b.create_storage_image(storage_desc(64), "t0", None);
                t1 = b.create_storage_image(storage_desc(64), "t1", None);
            },
            |_, _| {},
        );
        graph.add_pass(
            "read",
            RgPassType::Compute,
            |b| {
                b.read_texture(t0);
                b.read_texture(t1);
            },
            |_, _| {},
        );
        graph.compile().unwrap();

        assert_ne!(graph.slot_of(t0), graph.slot_of(t1));
        assert_ne!(graph.physical_image(t0), graph.physical_image(t1));
    }

    #[test]
    fn test_compile_twice_is_idempotent() {
        let mut graph = new_graph();
        let mut t0 = RgResourceHandle::INVALID;
        graph.add_pass("p0", RgPassType::Compute, |b| t0 = b.create_storage_image(storage_desc(64), "t0", None), |_, _| {});
        graph.add_pass("p1", RgPassType::Compute, |b| { b.read_texture(t0); }, |_, _| {});

        graph.compile().unwrap();
        let order = graph.execution_order().to_vec();
        let slot = graph.slot_of(t0);
        let image = graph.physical_image(t0);
        let created = graph.device().created_image_count();

        graph.compile().unwrap();
        assert_eq!(graph.execution_order(), order.as_slice());
        assert_eq!(graph.slot_of(t0), slot);
        assert_eq!(graph.physical_image(t0), image);
        assert_eq!(graph.device().created_image_count(), created);
        assert_eq!(graph.pass(RgPassHandle::new(0)).edges().len(), 1);
    }

    #[test]
    fn test_resize_only_recreates_relative_images() {
        let mut graph = new_graph();
        let mut fixed = RgResourceHandle::INVALID;
        let mut relative = RgResourceHandle::INVALID;

        graph.add_pass(
            "p0",
            RgPassType::Compute,
            |b| {
                fixed = b.create_storage_image(storage_desc(256), "fixed", None);
                relative = b.create_storage_image(
                    RgImageDesc::swapchain_relative(0.5, 0.5, vk::Format::R16G16B16A16_SFLOAT),
                    "half-res",
                    None,
                );
            },
            |_, _| {},
        );
        graph.add_pass(
            "p1",
            RgPassType::Compute,
            |b| {
                b.read_texture(fixed);
                b.read_texture(relative);
            },
            |_, _| {},
        );
        graph.compile().unwrap();

        let fixed_image = graph.physical_image(fixed);
        let relative_image = graph.physical_image(relative);
        let extent = relative_image.and_then(|image| graph.device().image_info(image)).map(|info| info.extent);
        assert_eq!(extent, Some(vk::Extent3D { width: 640, height: 360, depth: 1 }));

        graph.device_mut().set_swapchain_extent(vk::Extent2D { width: 1920, height: 1080 });
        let stats = graph.resize().unwrap();
        assert_eq!(stats, RgRealizeStats { reused: 1, created: 1, destroyed: 1 });
        assert_eq!(graph.state(), RgGraphState::Compiled);

        assert_eq!(graph.physical_image(fixed), fixed_image);
        let resized = graph.physical_image(relative);
        assert_ne!(resized, relative_image);
        let extent = resized.and_then(|image| graph.device().image_info(image)).map(|info| info.extent);
        assert_eq!(extent, Some(vk::Extent3D { width: 960, height: 540, depth: 1 }));
    }

    #[test]
    #[should_panic(expected = "pass 'forward-pass' already exists")]
    fn test_duplicate_pass_name_panics() {
        let mut graph = new_graph();
        graph.add_pass("forward-pass", RgPassType::Rasterizer, |_| {}, |_, _| {});
        graph.add_pass("forward-pass", RgPassType::Rasterizer, |_| {}, |_, _| {});
    }

    #[test]
    #[should_panic(expected = "superseded by v1")]
    fn test_superseded_handle_panics() {
        let mut graph = new_graph();
        let mut color = RgResourceHandle::INVALID;
        graph.add_pass("p0", RgPassType::Rasterizer, |b| color = b.create_attachment(storage_desc(32), "color", None), |_, _| {});
        graph.add_pass("p1", RgPassType::Rasterizer, |b| { b.write_attachment(color); }, |_, _| {});
        graph.add_pass("p2", RgPassType::Compute, |b| { b.read_texture(color); }, |_, _| {});
    }

    #[test]
    #[should_panic(expected = "cannot use attachments")]
    fn test_attachment_in_compute_pass_panics() {
        let mut graph = new_graph();
        graph.add_pass("cs", RgPassType::Compute, |b| { b.create_attachment(storage_desc(32), "color", None); }, |_, _| {});
    }

    #[test]
    #[should_panic(expected = "in read_texture")]
    fn test_buffer_read_as_image_panics() {
        let mut graph = new_graph();
        let mut buffer = RgResourceHandle::INVALID;
        graph.add_pass("p0", RgPassType::Compute, |b| buffer = b.create_buffer(buffer_desc(), "buffer"), |_, _| {});
        graph.add_pass("p1", RgPassType::Compute, |b| { b.read_texture(buffer); }, |_, _| {});
    }

    #[test]
    #[should_panic(expected = "only allowed while building")]
    fn test_add_pass_after_compile_panics() {
        let mut graph = new_graph();
        graph.add_pass("p0", RgPassType::Compute, |b| { b.create_buffer(buffer_desc(), "buffer"); }, |_, _| {});
        graph.compile().unwrap();
        graph.add_pass("p1", RgPassType::Compute, |_| {}, |_, _| {});
    }

    #[test]
    #[should_panic(expected = "requires a compiled graph")]
    fn test_resize_before_compile_panics() {
        let mut graph = new_graph();
        let _ = graph.resize();
    }

    #[test]
    fn test_cycle_is_reported_and_graph_stays_building() {
        let mut graph = new_graph();
        let mut r0 = RgResourceHandle::INVALID;
        let mut r1 = RgResourceHandle::INVALID;
        let p0 = graph.add_pass("p0", RgPassType::Compute, |b| r0 = b.create_buffer(buffer_desc(), "r0"), |_, _| {});
        graph.add_pass(
            "p1",
            RgPassType::Compute,
            |b| {
                b.read_buffer(r0);
                r1 = b.create_buffer(buffer_desc(), "r1");
            },
            |_, _| {},
        );
        graph.add_pass("p2", RgPassType::Compute, |b| { b.create_buffer(buffer_desc(), "r2"); }, |_, _| {});
        // 构建器无法表达的反向读取
        graph.resources.get_mut(r1).readers.push(p0);

        let err = graph.compile().unwrap_err();
        assert_eq!(
            err,
            RgCompileError::Cycle {
                passes: vec!["p0".to_string(), "p1".to_string()]
            }
        );
        assert_eq!(graph.state(), RgGraphState::Building);
        assert!(graph.execution_order().is_empty());
    }

    #[test]
    fn test_invalid_descriptions_fail_compile() {
        let mut graph = new_graph();
        graph.add_pass("p0", RgPassType::Compute, |b| { b.create_storage_image(storage_desc(0), "empty", None); }, |_, _| {});
        assert!(matches!(graph.compile(), Err(RgCompileError::ZeroSizedImage { .. })));

        let mut graph = new_graph();
        graph.add_pass("p0", RgPassType::Compute, |b| { b.create_buffer(RgBufferDesc::new(0, vk::BufferUsageFlags::STORAGE_BUFFER), "empty"); }, |_, _| {});
        assert!(matches!(graph.compile(), Err(RgCompileError::ZeroSizedBuffer { .. })));

        let mut graph = new_graph();
        graph.add_pass("p0", RgPassType::Compute, |b| { b.create_storage_image(storage_desc(8).with_mip_levels(0), "no-mips", None); }, |_, _| {});
        assert!(matches!(graph.compile(), Err(RgCompileError::ZeroMipsOrLayers { .. })));

        let mut graph = new_graph();
        graph.add_pass(
            "p0",
            RgPassType::Compute,
            |b| {
                let buffer = b.create_buffer(buffer_desc(), "buffer");
                b.create_storage_image(RgImageDesc::input_relative(buffer, 1.0, 1.0, vk::Format::R8_UNORM), "bad", None);
            },
            |_, _| {},
        );
        assert!(matches!(graph.compile(), Err(RgCompileError::InvalidSizePolicy { .. })));
    }

    #[test]
    fn test_export_of_superseded_version_fails_compile() {
        let mut graph = new_graph();
        let mut color = RgResourceHandle::INVALID;
        graph.add_pass(
            "p0",
            RgPassType::Rasterizer,
            |b| {
                color = b.create_attachment(storage_desc(32), "color", None);
                b.export_texture(color);
            },
            |_, _| {},
        );
        graph.add_pass("p1", RgPassType::Rasterizer, |b| { b.write_attachment(color); }, |_, _| {});

        let err = graph.compile().unwrap_err();
        assert_eq!(
            err,
            RgCompileError::ExportSuperseded {
                resource: "color".to_string(),
                version: 0
            }
        );
    }

    #[test]
    fn test_execute_records_barriers_before_each_pass() {
        let mut graph = new_graph();
        let swapchain_image = graph.device_mut().create_image("swapchain", &RgImageCreateInfo::default());
        let swapchain = graph.import_image(
            "swapchain",
            RgImageDesc::swapchain_relative(1.0, 1.0, vk::Format::B8G8R8A8_UNORM),
            swapchain_image,
            RgImageState::UNDEFINED,
        );

        let mut hdr = RgResourceHandle::INVALID;
        graph.add_pass(
            "lighting",
            RgPassType::Compute,
            |b| hdr = b.create_storage_image(RgImageDesc::swapchain_relative(1.0, 1.0, vk::Format::R16G16B16A16_SFLOAT), "hdr", None),
            |_, ctx| {
                let name = ctx.pass_name().to_string();
                ctx.cmd.marker(name);
            },
        );
        let tonemap = graph.add_pass(
            "tonemap",
            RgPassType::Rasterizer,
            |b| {
                b.read_texture(hdr);
                let target = b.write_attachment(swapchain);
                b.export_texture_as(target, RgImageState::PRESENT);
                target
            },
            |target, ctx| {
                assert!(ctx.image(*target).is_some());
                let name = ctx.pass_name().to_string();
                ctx.cmd.marker(name);
            },
        );
        graph.compile().unwrap();
        assert_eq!(graph.pass_barriers(tonemap).map(|b| b.image_barrier_count()), Some(2));
        assert_eq!(graph.trailing_barriers().map(|b| b.image_barrier_count()), Some(1));
        // 导入的图像没有别名槽位
        assert_eq!(graph.slot_of(swapchain), None);

        let mut cmd = RgHeadlessCommandList::new();
        graph.execute(&mut cmd, 0);
        assert_eq!(graph.state(), RgGraphState::Compiled);

        let hdr_image = graph.physical_image(hdr).unwrap();
        let commands = cmd.commands();
        assert_eq!(commands.len(), 6);
        assert_eq!(
            commands[0],
            RgHeadlessCommand::ImageBarrier {
                image: hdr_image,
                old_layout: vk::ImageLayout::UNDEFINED,
                new_layout: vk::ImageLayout::GENERAL,
            }
        );
        assert_eq!(commands[1], RgHeadlessCommand::Marker("lighting".to_string()));
        assert!(commands[2..4].contains(&RgHeadlessCommand::ImageBarrier {
            image: hdr_image,
            old_layout: vk::ImageLayout::GENERAL,
            new_layout: vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL,
        }));
        assert!(commands[2..4].contains(&RgHeadlessCommand::ImageBarrier {
            image: swapchain_image,
            old_layout: vk::ImageLayout::UNDEFINED,
            new_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
        }));
        assert_eq!(commands[4], RgHeadlessCommand::Marker("tonemap".to_string()));
        assert_eq!(
            commands[5],
            RgHeadlessCommand::ImageBarrier {
                image: swapchain_image,
                old_layout: vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
                new_layout: vk::ImageLayout::PRESENT_SRC_KHR,
            }
        );

        // 第二帧的 barrier 与第一帧相同
        cmd.clear();
        graph.execute(&mut cmd, 1);
        assert_eq!(cmd.barrier_count(), 4);
    }

    #[test]
    fn test_repeated_storage_writes_get_barriers() {
        let mut graph = new_graph();
        let mut v0 = RgResourceHandle::INVALID;
        let mut v1 = RgResourceHandle::INVALID;

        let a = graph.add_pass(
            "a",
            RgPassType::Compute,
            |b| v0 = b.create_storage_image(storage_desc(64), "accum", None),
            |_, _| {},
        );
        let b = graph.add_pass("b", RgPassType::Compute, |b| v1 = b.write_storage_image(v0), |_, _| {});
        let c = graph.add_pass(
            "c",
            RgPassType::Compute,
            |b| {
                let v2 = b.write_storage_image(v1);
                b.export_texture(v2);
            },
            |_, _| {},
        );
        graph.compile().unwrap();

        for pass in [a, b, c] {
            assert_eq!(graph.pass_barriers(pass).map(|b| b.image_barrier_count()), Some(1));
        }
        let barriers = graph.pass_barriers(c).unwrap();
        let rw = RgImageState::storage_read_write(vk::PipelineStageFlags2::COMPUTE_SHADER);
        assert_eq!(barriers.image_barriers[0].src_state, rw);
        assert_eq!(barriers.image_barriers[0].dst_state, rw);
    }

    #[test]
    fn test_first_barrier_waits_on_previous_frame() {
        let mut graph = new_graph();
        let mut bloom = RgResourceHandle::INVALID;

        let downsample = graph.add_pass(
            "bloom",
            RgPassType::Compute,
            |b| bloom = b.create_storage_image(storage_desc(64), "bloom", None),
            |_, _| {},
        );
        graph.add_pass(
            "tonemap",
            RgPassType::Rasterizer,
            |b| {
                b.read_texture(bloom);
                let output = b.create_attachment(storage_desc(64), "output", None);
                b.export_texture(output);
            },
            |_, _| {},
        );
        graph.compile().unwrap();

        let mut cmd = RgHeadlessCommandList::new();
        let mut per_frame = Vec::new();
        for frame_index in 0..2 {
            cmd.clear();
            graph.execute(&mut cmd, frame_index);
            per_frame.push(cmd.barrier_count());
        }
        assert_eq!(per_frame[0], per_frame[1]);

        // 上一帧 tonemap 在 fragment 阶段采样 bloom，本帧第一次写入要等它结束
        let first = &graph.pass_barriers(downsample).unwrap().image_barriers[0];
        assert_eq!(first.src_state.stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(first.src_state.access, vk::AccessFlags2::SHADER_SAMPLED_READ);
        assert_eq!(first.src_state.layout, vk::ImageLayout::UNDEFINED);
        assert_eq!(first.dst_state.layout, vk::ImageLayout::GENERAL);
    }

    #[test]
    fn test_panicking_pass_leaves_graph_compiled() {
        let mut graph = new_graph();
        graph.add_pass(
            "flaky",
            RgPassType::Compute,
            |b| b.create_storage_image(storage_desc(64), "t0", None),
            |_, ctx| {
                if ctx.frame_index() == 0 {
                    panic!("pass failed");
                }
                ctx.cmd.marker("flaky");
            },
        );
        graph.compile().unwrap();

        let mut cmd = RgHeadlessCommandList::new();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| graph.execute(&mut cmd, 0)));
        assert!(result.is_err());
        assert_eq!(graph.state(), RgGraphState::Compiled);

        cmd.clear();
        graph.execute(&mut cmd, 1);
        assert!(cmd.commands().contains(&RgHeadlessCommand::Marker("flaky".to_string())));
        assert_eq!(graph.state(), RgGraphState::Compiled);
    }

    #[test]
    fn test_frame_context_exposes_frame_slot_and_blackboard() {
        #[derive(Default)]
        struct SceneData {
            albedo: RgResourceHandle,
            exposure: f32,
        }

        let settings = RgSettings {
            frames_in_flight: 2,
            ..Default::default()
        };
        let mut graph = RenderGraph::with_settings(RgHeadlessDevice::new(EXTENT), settings);
        graph.blackboard_mut().insert::<SceneData>().exposure = 1.5;

        graph.add_pass(
            "gbuffer",
            RgPassType::Rasterizer,
            |b| {
                let albedo = b.create_attachment(storage_desc(16), "albedo", None);
                b.blackboard().get_mut::<SceneData>().albedo = albedo;
            },
            |_, _| {},
        );

        let seen = Rc::new(Cell::new((0_usize, 0.0_f32, false)));
        let seen_in_pass = seen.clone();
        graph.add_pass(
            "resolve",
            RgPassType::Compute,
            |b| {
                let albedo = b.blackboard().get::<SceneData>().albedo;
                b.read_texture(albedo);
                b.create_buffer(buffer_desc(), "histogram");
                albedo
            },
            move |albedo, ctx| {
                let exposure = ctx.blackboard().get::<SceneData>().exposure;
                seen_in_pass.set((ctx.frame_in_flight(), exposure, ctx.image(*albedo).is_some()));
            },
        );
        graph.compile().unwrap();

        let mut cmd = RgHeadlessCommandList::new();
        graph.execute(&mut cmd, 5);
        assert_eq!(seen.get(), (1, 1.5, true));
        graph.execute(&mut cmd, 6);
        assert_eq!(seen.get().0, 0);
    }

    #[test]
    #[should_panic(expected = "requires a compiled graph")]
    fn test_execute_before_compile_panics() {
        let mut graph = new_graph();
        let mut cmd = RgHeadlessCommandList::new();
        graph.execute(&mut cmd, 0);
    }

    #[test]
    fn test_drop_destroys_owned_resources_only() {
        let device = Rc::new(RefCell::new(RgHeadlessDevice::new(EXTENT)));
        let external = device.borrow_mut().create_image("external", &RgImageCreateInfo::default());

        {
            let mut graph = RenderGraph::new(SharedDevice(device.clone()));
            let imported = graph.import_image("external", storage_desc(64), external, RgImageState::UNDEFINED);
            graph.add_pass(
                "p0",
                RgPassType::Compute,
                |b| {
                    b.read_texture(imported);
                    b.create_storage_image(storage_desc(64), "t0", None);
                    b.create_buffer(buffer_desc(), "b0");
                },
                |_, _| {},
            );
            graph.compile().unwrap();
            assert_eq!(device.borrow().live_image_count(), 2);
            assert_eq!(device.borrow().live_buffer_count(), 1);
        }

        assert_eq!(device.borrow().live_image_count(), 1);
        assert_eq!(device.borrow().live_buffer_count(), 0);
        assert_eq!(device.borrow().destroyed_image_count(), 1);
    }
}
