//! 无 GPU 的设备实现
//!
//! 只分配递增的句柄并记录调用，用于测试和演示程序。

use std::collections::HashMap;

use ash::vk;

use super::{RgBufferBarrier, RgBufferCreateInfo, RgDevice, RgImageBarrier, RgImageCreateInfo};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RgHeadlessImage(pub u64);

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RgHeadlessBuffer(pub u64);

/// 录制到命令列表中的一条命令
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RgHeadlessCommand {
    ImageBarrier {
        image: RgHeadlessImage,
        old_layout: vk::ImageLayout,
        new_layout: vk::ImageLayout,
    },
    BufferBarrier {
        buffer: RgHeadlessBuffer,
    },
    /// Pass 自己录制的标记
    Marker(String),
}

#[derive(Debug, Default)]
pub struct RgHeadlessCommandList {
    commands: Vec<RgHeadlessCommand>,
}

impl RgHeadlessCommandList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn marker(&mut self, label: impl Into<String>) {
        self.commands.push(RgHeadlessCommand::Marker(label.into()));
    }

    #[inline]
    pub fn commands(&self) -> &[RgHeadlessCommand] {
        &self.commands
    }

    pub fn barrier_count(&self) -> usize {
        self.commands.iter().filter(|c| !matches!(c, RgHeadlessCommand::Marker(_))).count()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }
}

pub struct RgHeadlessDevice {
    next_id: u64,
    swapchain_extent: vk::Extent2D,

    images: HashMap<RgHeadlessImage, (String, RgImageCreateInfo)>,
    buffers: HashMap<RgHeadlessBuffer, (String, RgBufferCreateInfo)>,

    created_images: usize,
    destroyed_images: usize,
    created_buffers: usize,
    destroyed_buffers: usize,
}

// new & init
impl RgHeadlessDevice {
    pub fn new(swapchain_extent: vk::Extent2D) -> Self {
        Self {
            next_id: 1,
            swapchain_extent,
            images: HashMap::new(),
            buffers: HashMap::new(),
            created_images: 0,
            destroyed_images: 0,
            created_buffers: 0,
            destroyed_buffers: 0,
        }
    }

    /// 模拟窗口尺寸变化，之后应调用 `RenderGraph::resize`
    pub fn set_swapchain_extent(&mut self, extent: vk::Extent2D) {
        self.swapchain_extent = extent;
    }

    fn next_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }
}

// getters
impl RgHeadlessDevice {
    #[inline]
    pub fn live_image_count(&self) -> usize {
        self.images.len()
    }

    #[inline]
    pub fn live_buffer_count(&self) -> usize {
        self.buffers.len()
    }

    #[inline]
    pub fn created_image_count(&self) -> usize {
        self.created_images
    }

    #[inline]
    pub fn destroyed_image_count(&self) -> usize {
        self.destroyed_images
    }

    #[inline]
    pub fn created_buffer_count(&self) -> usize {
        self.created_buffers
    }

    #[inline]
    pub fn destroyed_buffer_count(&self) -> usize {
        self.destroyed_buffers
    }

    pub fn image_info(&self, image: RgHeadlessImage) -> Option<&RgImageCreateInfo> {
        self.images.get(&image).map(|(_, info)| info)
    }

    pub fn image_name(&self, image: RgHeadlessImage) -> Option<&str> {
        self.images.get(&image).map(|(name, _)| name.as_str())
    }

    pub fn buffer_info(&self, buffer: RgHeadlessBuffer) -> Option<&RgBufferCreateInfo> {
        self.buffers.get(&buffer).map(|(_, info)| info)
    }
}

impl RgDevice for RgHeadlessDevice {
    type Image = RgHeadlessImage;
    type Buffer = RgHeadlessBuffer;
    type CommandList = RgHeadlessCommandList;

    fn create_image(&mut self, name: &str, info: &RgImageCreateInfo) -> Self::Image {
        let image = RgHeadlessImage(self.next_id());
        log::trace!(
            "HeadlessDevice: creating image {:?} '{}' ({}x{}x{}, {:?})",
            image,
            name,
            info.extent.width,
            info.extent.height,
            info.extent.depth,
            info.format
        );
        self.images.insert(image, (name.to_string(), info.clone()));
        self.created_images += 1;
        image
    }

    fn create_buffer(&mut self, name: &str, info: &RgBufferCreateInfo) -> Self::Buffer {
        let buffer = RgHeadlessBuffer(self.next_id());
        log::trace!("HeadlessDevice: creating buffer {:?} '{}' (size: {})", buffer, name, info.size);
        self.buffers.insert(buffer, (name.to_string(), info.clone()));
        self.created_buffers += 1;
        buffer
    }

    fn destroy_image(&mut self, image: Self::Image) {
        let removed = self.images.remove(&image);
        assert!(removed.is_some(), "HeadlessDevice: destroying unknown image {:?}", image);
        log::trace!("HeadlessDevice: destroying image {:?}", image);
        self.destroyed_images += 1;
    }

    fn destroy_buffer(&mut self, buffer: Self::Buffer) {
        let removed = self.buffers.remove(&buffer);
        assert!(removed.is_some(), "HeadlessDevice: destroying unknown buffer {:?}", buffer);
        log::trace!("HeadlessDevice: destroying buffer {:?}", buffer);
        self.destroyed_buffers += 1;
    }

    fn record_barriers(
        &mut self,
        cmd: &mut Self::CommandList,
        image_barriers: &[RgImageBarrier<Self::Image>],
        buffer_barriers: &[RgBufferBarrier<Self::Buffer>],
    ) {
        for barrier in image_barriers {
            log::trace!(
                "HeadlessDevice: image barrier {:?}: {:?} -> {:?}",
                barrier.image,
                barrier.src_state.layout,
                barrier.dst_state.layout
            );
            cmd.commands.push(RgHeadlessCommand::ImageBarrier {
                image: barrier.image,
                old_layout: barrier.src_state.layout,
                new_layout: barrier.dst_state.layout,
            });
        }
        for barrier in buffer_barriers {
            log::trace!("HeadlessDevice: buffer barrier {:?}", barrier.buffer);
            cmd.commands.push(RgHeadlessCommand::BufferBarrier { buffer: barrier.buffer });
        }
    }

    #[inline]
    fn swapchain_extent(&self) -> vk::Extent2D {
        self.swapchain_extent
    }
}
