//! RenderGraph 依赖的设备抽象
//!
//! graph 只需要设备能创建/销毁图像和缓冲区、在命令列表上录制 barrier、
//! 以及报告当前 swapchain 尺寸。具体的图形 API 由实现方决定。

pub mod headless;

use std::fmt;

use ash::vk;

use crate::render_graph::{RgBufferState, RgImageState};

/// 创建物理图像所需的参数（尺寸已解析）
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RgImageCreateInfo {
    pub extent: vk::Extent3D,
    pub format: vk::Format,
    pub usage: vk::ImageUsageFlags,
    pub mip_levels: u32,
    pub array_layers: u32,
    pub samples: vk::SampleCountFlags,
    pub image_type: vk::ImageType,
}

/// 创建物理缓冲区所需的参数
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct RgBufferCreateInfo {
    pub size: vk::DeviceSize,
    pub usage: vk::BufferUsageFlags,
}

/// 已绑定物理图像的 barrier
#[derive(Clone, Debug)]
pub struct RgImageBarrier<I> {
    pub image: I,
    pub src_state: RgImageState,
    pub dst_state: RgImageState,
    pub aspect: vk::ImageAspectFlags,
    pub mip_levels: u32,
    pub array_layers: u32,
}

impl<I> RgImageBarrier<I> {
    /// 转换为 `vk::ImageMemoryBarrier2`，供 Vulkan 后端直接使用
    pub fn to_vk(&self, image: vk::Image) -> vk::ImageMemoryBarrier2<'static> {
        vk::ImageMemoryBarrier2::default()
            .image(image)
            .old_layout(self.src_state.layout)
            .new_layout(self.dst_state.layout)
            .src_stage_mask(self.src_state.stage)
            .src_access_mask(self.src_state.src_access())
            .dst_stage_mask(self.dst_state.stage)
            .dst_access_mask(self.dst_state.access)
            .subresource_range(vk::ImageSubresourceRange {
                aspect_mask: self.aspect,
                base_mip_level: 0,
                level_count: self.mip_levels,
                base_array_layer: 0,
                layer_count: self.array_layers,
            })
    }
}

/// 已绑定物理缓冲区的 barrier
#[derive(Clone, Debug)]
pub struct RgBufferBarrier<B> {
    pub buffer: B,
    pub src_state: RgBufferState,
    pub dst_state: RgBufferState,
    pub offset: vk::DeviceSize,
    pub size: vk::DeviceSize,
}

impl<B> RgBufferBarrier<B> {
    pub fn to_vk(&self, buffer: vk::Buffer) -> vk::BufferMemoryBarrier2<'static> {
        vk::BufferMemoryBarrier2::default()
            .buffer(buffer)
            .offset(self.offset)
            .size(self.size)
            .src_stage_mask(self.src_state.stage)
            .src_access_mask(self.src_state.src_access())
            .dst_stage_mask(self.dst_state.stage)
            .dst_access_mask(self.dst_state.access)
    }
}

/// 设备协作者
///
/// graph 持有设备，并在 `Drop` 时通过它销毁自己创建的物理资源。
/// 导入的资源永远不会被 graph 销毁。
pub trait RgDevice {
    /// 物理图像句柄
    type Image: Copy + PartialEq + fmt::Debug;
    /// 物理缓冲区句柄
    type Buffer: Copy + PartialEq + fmt::Debug;
    /// 命令列表
    type CommandList;

    fn create_image(&mut self, name: &str, info: &RgImageCreateInfo) -> Self::Image;

    fn create_buffer(&mut self, name: &str, info: &RgBufferCreateInfo) -> Self::Buffer;

    fn destroy_image(&mut self, image: Self::Image);

    fn destroy_buffer(&mut self, buffer: Self::Buffer);

    /// 在命令列表上录制一组 barrier
    fn record_barriers(
        &mut self,
        cmd: &mut Self::CommandList,
        image_barriers: &[RgImageBarrier<Self::Image>],
        buffer_barriers: &[RgBufferBarrier<Self::Buffer>],
    );

    /// 当前 swapchain 尺寸，用于解析相对尺寸
    fn swapchain_extent(&self) -> vk::Extent2D;
}
