//! Pass 定义和构建器
//!
//! `RgPassBuilder` 在 setup 阶段声明 Pass 创建、读取、写入和导出的资源；
//! `RgFrameContext` 在 execute 阶段提供命令列表和物理资源查询。

use ash::vk;

use super::blackboard::RgBlackboard;
use super::buffer_resource::RgBufferDesc;
use super::image_resource::RgImageDesc;
use super::physical::RgPhysicalPool;
use super::resource::{RgClearValue, RgExportInfo, RgResource, RgResourceKind, RgUsageKind};
use super::resource_handle::{RgPassHandle, RgResourceHandle};
use super::resource_registry::RgResourceRegistry;
use super::resource_state::{RgAccessState, RgBufferState, RgImageState};
use crate::device::RgDevice;

/// Pass 类型，决定声明访问时使用的 shader stage
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgPassType {
    Compute,
    Rasterizer,
    RayTracing,
}

impl RgPassType {
    /// 读取纹理 / storage image 时的 stage
    #[inline]
    pub fn image_stage(self) -> vk::PipelineStageFlags2 {
        match self {
            Self::Compute => vk::PipelineStageFlags2::COMPUTE_SHADER,
            Self::Rasterizer => vk::PipelineStageFlags2::FRAGMENT_SHADER,
            Self::RayTracing => vk::PipelineStageFlags2::RAY_TRACING_SHADER_KHR,
        }
    }

    /// 访问缓冲区时的 stage；光栅化 Pass 的顶点阶段也可能读取
    #[inline]
    pub fn buffer_stage(self) -> vk::PipelineStageFlags2 {
        match self {
            Self::Rasterizer => vk::PipelineStageFlags2::VERTEX_SHADER | vk::PipelineStageFlags2::FRAGMENT_SHADER,
            other => other.image_stage(),
        }
    }
}

/// Pass 对一个资源版本的一次访问
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RgResourceAccess {
    pub handle: RgResourceHandle,
    pub usage: RgUsageKind,
    pub state: RgAccessState,
}

pub(crate) type RgExecuteFn<D> = Box<dyn for<'c> FnMut(&mut RgFrameContext<'c, D>)>;

/// Pass 节点
pub struct RgPassNode<D: RgDevice> {
    pub(crate) name: String,
    pub(crate) pass_type: RgPassType,
    pub(crate) inputs: Vec<RgResourceAccess>,
    pub(crate) outputs: Vec<RgResourceAccess>,
    /// 后继 Pass，仅在 compile 时重建
    pub(crate) edges: Vec<RgPassHandle>,
    pub(crate) execute: RgExecuteFn<D>,
}

// getters
impl<D: RgDevice> RgPassNode<D> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn pass_type(&self) -> RgPassType {
        self.pass_type
    }

    #[inline]
    pub fn inputs(&self) -> &[RgResourceAccess] {
        &self.inputs
    }

    #[inline]
    pub fn outputs(&self) -> &[RgResourceAccess] {
        &self.outputs
    }

    #[inline]
    pub fn edges(&self) -> &[RgPassHandle] {
        &self.edges
    }

    /// 按声明顺序遍历输入和输出
    pub fn accesses(&self) -> impl Iterator<Item = &RgResourceAccess> {
        self.inputs.iter().chain(self.outputs.iter())
    }
}

/// Pass 构建器
///
/// 只在 `RenderGraph::add_pass` 的 setup 闭包中存在，绑定到正在声明的 Pass。
pub struct RgPassBuilder<'a> {
    pub(crate) pass: RgPassHandle,
    pub(crate) name: &'a str,
    pub(crate) pass_type: RgPassType,

    pub(crate) inputs: Vec<RgResourceAccess>,
    pub(crate) outputs: Vec<RgResourceAccess>,

    pub(crate) resources: &'a mut RgResourceRegistry,
    pub(crate) blackboard: &'a mut RgBlackboard,
}

// getters
impl RgPassBuilder<'_> {
    #[inline]
    pub fn pass(&self) -> RgPassHandle {
        self.pass
    }

    #[inline]
    pub fn pass_name(&self) -> &str {
        self.name
    }

    #[inline]
    pub fn pass_type(&self) -> RgPassType {
        self.pass_type
    }

    /// 跨 Pass 共享的黑板
    #[inline]
    pub fn blackboard(&mut self) -> &mut RgBlackboard {
        &mut *self.blackboard
    }

    /// 图像的描述，常用于派生同尺寸的新图像
    pub fn image_desc(&self, handle: RgResourceHandle) -> &RgImageDesc {
        let resource = self.resources.get(handle);
        assert_eq!(
            resource.kind,
            RgResourceKind::Image,
            "RenderGraph: pass '{}' asked for the image description of buffer '{}'",
            self.name,
            resource.name
        );
        self.resources
            .image_desc(resource.desc_index)
            .unwrap_or_else(|| panic!("RenderGraph: image '{}' has no description", resource.name))
    }
}

// create
impl RgPassBuilder<'_> {
    /// 创建由本 Pass 写入的颜色/深度附件
    pub fn create_attachment(
        &mut self,
        desc: RgImageDesc,
        name: impl Into<String>,
        clear_value: Option<RgClearValue>,
    ) -> RgResourceHandle {
        self.assert_graphics("create_attachment");
        let state = if desc.is_depth() {
            RgImageState::DEPTH_ATTACHMENT_WRITE
        } else {
            RgImageState::COLOR_ATTACHMENT_WRITE
        };
        let handle = self.resources.register_image(name, desc, Some(self.pass), clear_value);
        self.push_output(handle, RgUsageKind::Attachment, RgAccessState::Image(state));
        handle
    }

    /// 创建由本 Pass 写入的 storage image
    pub fn create_storage_image(
        &mut self,
        desc: RgImageDesc,
        name: impl Into<String>,
        clear_value: Option<RgClearValue>,
    ) -> RgResourceHandle {
        let state = RgImageState::storage_write(self.pass_type.image_stage());
        let handle = self.resources.register_image(name, desc, Some(self.pass), clear_value);
        self.push_output(handle, RgUsageKind::StorageImage, RgAccessState::Image(state));
        handle
    }

    /// 创建由本 Pass 写入的缓冲区
    pub fn create_buffer(&mut self, desc: RgBufferDesc, name: impl Into<String>) -> RgResourceHandle {
        let state = RgBufferState::storage_write(self.pass_type.buffer_stage());
        let handle = self.resources.register_buffer(name, desc, Some(self.pass));
        self.push_output(handle, RgUsageKind::Buffer, RgAccessState::Buffer(state));
        handle
    }
}

// read
impl RgPassBuilder<'_> {
    /// 作为采样纹理读取
    pub fn read_texture(&mut self, handle: RgResourceHandle) -> RgResourceHandle {
        self.check_current(handle, RgResourceKind::Image, "read_texture");
        let state = RgImageState::shader_read(self.pass_type.image_stage());
        self.push_input(handle, RgUsageKind::Texture, RgAccessState::Image(state));
        handle
    }

    /// 作为 storage image 只读
    pub fn read_storage_image(&mut self, handle: RgResourceHandle) -> RgResourceHandle {
        self.check_current(handle, RgResourceKind::Image, "read_storage_image");
        let state = RgImageState::storage_read(self.pass_type.image_stage());
        self.push_input(handle, RgUsageKind::StorageImage, RgAccessState::Image(state));
        handle
    }

    /// 作为附件只读（深度格式使用只读深度 layout）
    pub fn read_attachment(&mut self, handle: RgResourceHandle) -> RgResourceHandle {
        self.assert_graphics("read_attachment");
        let is_depth = self.check_current(handle, RgResourceKind::Image, "read_attachment");
        let state = if is_depth {
            RgImageState::DEPTH_ATTACHMENT_READ
        } else {
            RgImageState::COLOR_ATTACHMENT_READ
        };
        self.push_input(handle, RgUsageKind::Attachment, RgAccessState::Image(state));
        handle
    }

    pub fn read_buffer(&mut self, handle: RgResourceHandle) -> RgResourceHandle {
        self.check_current(handle, RgResourceKind::Buffer, "read_buffer");
        let state = RgBufferState::storage_read(self.pass_type.buffer_stage());
        self.push_input(handle, RgUsageKind::Buffer, RgAccessState::Buffer(state));
        handle
    }
}

// read-modify-write
impl RgPassBuilder<'_> {
    /// 在已有内容上继续写入附件，返回新版本
    ///
    /// 旧句柄之后不能再被任何 Pass 使用。
    pub fn write_attachment(&mut self, handle: RgResourceHandle) -> RgResourceHandle {
        self.assert_graphics("write_attachment");
        let is_depth = self.check_current(handle, RgResourceKind::Image, "write_attachment");
        let state = if is_depth {
            RgImageState::DEPTH_ATTACHMENT_READ_WRITE
        } else {
            RgImageState::COLOR_ATTACHMENT_READ_WRITE
        };
        self.read_modify_write(handle, RgUsageKind::Attachment, RgAccessState::Image(state))
    }

    /// 在已有内容上继续写入 storage image，返回新版本
    pub fn write_storage_image(&mut self, handle: RgResourceHandle) -> RgResourceHandle {
        self.check_current(handle, RgResourceKind::Image, "write_storage_image");
        let state = RgImageState::storage_read_write(self.pass_type.image_stage());
        self.read_modify_write(handle, RgUsageKind::StorageImage, RgAccessState::Image(state))
    }

    /// 在已有内容上继续写入缓冲区，返回新版本
    pub fn write_buffer(&mut self, handle: RgResourceHandle) -> RgResourceHandle {
        self.check_current(handle, RgResourceKind::Buffer, "write_buffer");
        let state = RgBufferState::storage_read_write(self.pass_type.buffer_stage());
        self.read_modify_write(handle, RgUsageKind::Buffer, RgAccessState::Buffer(state))
    }

    fn read_modify_write(
        &mut self,
        handle: RgResourceHandle,
        usage: RgUsageKind,
        state: RgAccessState,
    ) -> RgResourceHandle {
        self.push_input(handle, usage, state);
        let next = self.resources.next_version(handle, self.pass);
        self.push_output(next, usage, state);
        next
    }
}

// export
impl RgPassBuilder<'_> {
    /// 标记图像在 graph 执行完之后仍需保留（不参与别名）
    pub fn export_texture(&mut self, handle: RgResourceHandle) {
        self.check_current(handle, RgResourceKind::Image, "export_texture");
        self.resources.get_mut(handle).export = Some(RgExportInfo::default());
    }

    /// 导出图像，并在最后一个 Pass 之后转换到 `final_state`（例如 present）
    pub fn export_texture_as(&mut self, handle: RgResourceHandle, final_state: RgImageState) {
        self.check_current(handle, RgResourceKind::Image, "export_texture_as");
        self.resources.get_mut(handle).export = Some(RgExportInfo {
            final_state: Some(final_state),
        });
    }
}

// 内部检查
impl RgPassBuilder<'_> {
    fn assert_graphics(&self, op: &str) {
        assert!(
            self.pass_type != RgPassType::Compute,
            "RenderGraph: compute pass '{}' cannot use attachments ({})",
            self.name,
            op
        );
    }

    /// 检查句柄是最新版本且种类正确，返回图像是否为深度格式
    fn check_current(&self, handle: RgResourceHandle, kind: RgResourceKind, op: &str) -> bool {
        let resource: &RgResource = self.resources.get(handle);
        if let Some(next) = resource.superseded_by {
            panic!(
                "RenderGraph: pass '{}' uses '{}' v{} in {} but it was superseded by v{}; use the newer handle",
                self.name,
                resource.name,
                resource.version,
                op,
                self.resources.at(next).version
            );
        }
        assert_eq!(
            resource.kind, kind,
            "RenderGraph: pass '{}' uses {:?} '{}' in {}",
            self.name, resource.kind, resource.name, op
        );
        match kind {
            RgResourceKind::Image => {
                self.resources.image_desc(resource.desc_index).is_some_and(|desc| desc.is_depth())
            }
            RgResourceKind::Buffer => false,
        }
    }

    fn push_input(&mut self, handle: RgResourceHandle, usage: RgUsageKind, state: RgAccessState) {
        let pass = self.pass;
        let resource = self.resources.get_mut(handle);
        resource.usage.insert(usage);
        if !resource.readers.contains(&pass) {
            resource.readers.push(pass);
        }
        self.inputs.push(RgResourceAccess { handle, usage, state });
    }

    fn push_output(&mut self, handle: RgResourceHandle, usage: RgUsageKind, state: RgAccessState) {
        self.resources.get_mut(handle).usage.insert(usage);
        self.outputs.push(RgResourceAccess { handle, usage, state });
    }
}

/// Pass 执行时的上下文
pub struct RgFrameContext<'a, D: RgDevice> {
    /// 命令列表；barrier 已经录制完毕
    pub cmd: &'a mut D::CommandList,

    pub(crate) frame_index: u64,
    pub(crate) frame_in_flight: usize,
    pub(crate) pass_name: &'a str,
    pub(crate) blackboard: &'a RgBlackboard,
    pub(crate) resources: &'a RgResourceRegistry,
    pub(crate) physical: &'a RgPhysicalPool<D>,
}

impl<'a, D: RgDevice> RgFrameContext<'a, D> {
    #[inline]
    pub fn frame_index(&self) -> u64 {
        self.frame_index
    }

    /// `frame_index % frames_in_flight`，用于索引 Pass 自己的每帧数据
    #[inline]
    pub fn frame_in_flight(&self) -> usize {
        self.frame_in_flight
    }

    #[inline]
    pub fn pass_name(&self) -> &str {
        self.pass_name
    }

    #[inline]
    pub fn blackboard(&self) -> &RgBlackboard {
        self.blackboard
    }

    /// 资源版本对应的物理图像
    #[inline]
    pub fn image(&self, handle: RgResourceHandle) -> Option<D::Image> {
        self.physical.image_of(handle.index()).map(|entry| entry.image)
    }

    /// 物理图像解析后的尺寸
    #[inline]
    pub fn image_extent(&self, handle: RgResourceHandle) -> Option<vk::Extent3D> {
        self.physical.image_of(handle.index()).map(|entry| entry.create_info.extent)
    }

    #[inline]
    pub fn buffer(&self, handle: RgResourceHandle) -> Option<D::Buffer> {
        self.physical.buffer_of(handle.index()).map(|entry| entry.buffer)
    }

    /// 创建资源时给出的清除值（只记录在版本 0 上）
    pub fn clear_value(&self, handle: RgResourceHandle) -> Option<RgClearValue> {
        let resource = self.resources.get(handle);
        self.resources.at(resource.root).clear_value
    }
}
