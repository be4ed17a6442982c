//! 物理资源池
//!
//! 每个别名槽位对应一个物理图像或缓冲区。重新编译或 resize 时，
//! 创建参数没有变化的槽位沿用原来的设备句柄，其余的销毁后重建。
//! 导入的资源也登记在池中，但永远不会被销毁。

use slotmap::SlotMap;

use super::resource_handle::{RgPhysicalBufferHandle, RgPhysicalImageHandle};
use crate::device::{RgBufferCreateInfo, RgDevice, RgImageCreateInfo};

/// 虚拟资源绑定到的物理条目
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgPhysicalResource {
    Image(RgPhysicalImageHandle),
    Buffer(RgPhysicalBufferHandle),
}

pub struct RgPhysicalImage<I> {
    pub(crate) image: I,
    pub(crate) name: String,
    pub(crate) create_info: RgImageCreateInfo,
    /// 共享这块内存的资源下标（所有版本）
    pub(crate) aliases: Vec<usize>,
    pub(crate) imported: bool,
}

pub struct RgPhysicalBuffer<B> {
    pub(crate) buffer: B,
    pub(crate) name: String,
    pub(crate) create_info: RgBufferCreateInfo,
    pub(crate) aliases: Vec<usize>,
    pub(crate) imported: bool,
}

/// 一个别名槽位的物理资源需求
#[derive(Clone, Debug, PartialEq)]
pub enum RgSlotRequest {
    Image {
        name: String,
        info: RgImageCreateInfo,
        aliases: Vec<usize>,
    },
    Buffer {
        name: String,
        info: RgBufferCreateInfo,
        aliases: Vec<usize>,
    },
}

/// 一次 realize 的统计
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RgRealizeStats {
    pub reused: usize,
    pub created: usize,
    pub destroyed: usize,
}

pub struct RgPhysicalPool<D: RgDevice> {
    images: SlotMap<RgPhysicalImageHandle, RgPhysicalImage<D::Image>>,
    buffers: SlotMap<RgPhysicalBufferHandle, RgPhysicalBuffer<D::Buffer>>,
    /// 资源下标 -> 物理条目，每次 realize 重建
    bindings: Vec<Option<RgPhysicalResource>>,
}

impl<D: RgDevice> Default for RgPhysicalPool<D> {
    fn default() -> Self {
        Self {
            images: SlotMap::with_key(),
            buffers: SlotMap::with_key(),
            bindings: Vec::new(),
        }
    }
}

// import
impl<D: RgDevice> RgPhysicalPool<D> {
    pub fn import_image(&mut self, name: &str, image: D::Image) -> RgPhysicalResource {
        RgPhysicalResource::Image(self.images.insert(RgPhysicalImage {
            image,
            name: name.to_string(),
            create_info: RgImageCreateInfo::default(),
            aliases: Vec::new(),
            imported: true,
        }))
    }

    pub fn import_buffer(&mut self, name: &str, buffer: D::Buffer) -> RgPhysicalResource {
        RgPhysicalResource::Buffer(self.buffers.insert(RgPhysicalBuffer {
            buffer,
            name: name.to_string(),
            create_info: RgBufferCreateInfo::default(),
            aliases: Vec::new(),
            imported: true,
        }))
    }

    /// 更新导入资源的解析参数和别名列表（不会创建或销毁）
    pub fn bind_imported(&mut self, physical: RgPhysicalResource, info: Option<RgImageCreateInfo>, aliases: Vec<usize>) {
        match physical {
            RgPhysicalResource::Image(handle) => {
                if let Some(entry) = self.images.get_mut(handle) {
                    if let Some(info) = info {
                        entry.create_info = info;
                    }
                    entry.aliases = aliases;
                }
            }
            RgPhysicalResource::Buffer(handle) => {
                if let Some(entry) = self.buffers.get_mut(handle) {
                    entry.aliases = aliases;
                }
            }
        }
    }
}

// realize
impl<D: RgDevice> RgPhysicalPool<D> {
    /// 为每个槽位提供物理资源，返回与 `requests` 一一对应的物理条目
    ///
    /// 优先沿用别名列表和创建参数都相同的旧条目，其次沿用创建参数相同的旧条目；
    /// 没有被沿用的旧条目会通过设备销毁。
    pub fn realize(
        &mut self,
        device: &mut D,
        requests: &[RgSlotRequest],
    ) -> (Vec<RgPhysicalResource>, RgRealizeStats) {
        let mut stats = RgRealizeStats::default();
        let mut free_images: Vec<RgPhysicalImageHandle> =
            self.images.iter().filter(|(_, entry)| !entry.imported).map(|(handle, _)| handle).collect();
        let mut free_buffers: Vec<RgPhysicalBufferHandle> =
            self.buffers.iter().filter(|(_, entry)| !entry.imported).map(|(handle, _)| handle).collect();

        let mut claimed_images: Vec<Option<RgPhysicalImageHandle>> = vec![None; requests.len()];
        let mut claimed_buffers: Vec<Option<RgPhysicalBufferHandle>> = vec![None; requests.len()];

        // 第一轮：别名列表与参数完全一致，第二轮：只要求参数一致
        for exact in [true, false] {
            for (slot, request) in requests.iter().enumerate() {
                match request {
                    RgSlotRequest::Image { info, aliases, .. } if claimed_images[slot].is_none() => {
                        let found = free_images.iter().position(|&handle| {
                            let entry = &self.images[handle];
                            entry.create_info == *info && (!exact || entry.aliases == *aliases)
                        });
                        if let Some(position) = found {
                            claimed_images[slot] = Some(free_images.swap_remove(position));
                        }
                    }
                    RgSlotRequest::Buffer { info, aliases, .. } if claimed_buffers[slot].is_none() => {
                        let found = free_buffers.iter().position(|&handle| {
                            let entry = &self.buffers[handle];
                            entry.create_info == *info && (!exact || entry.aliases == *aliases)
                        });
                        if let Some(position) = found {
                            claimed_buffers[slot] = Some(free_buffers.swap_remove(position));
                        }
                    }
                    _ => {}
                }
            }
        }

        for handle in free_images {
            if let Some(entry) = self.images.remove(handle) {
                device.destroy_image(entry.image);
                stats.destroyed += 1;
            }
        }
        for handle in free_buffers {
            if let Some(entry) = self.buffers.remove(handle) {
                device.destroy_buffer(entry.buffer);
                stats.destroyed += 1;
            }
        }

        let mut physical = Vec::with_capacity(requests.len());
        for (slot, request) in requests.iter().enumerate() {
            match request {
                RgSlotRequest::Image { name, info, aliases } => {
                    let handle = match claimed_images[slot] {
                        Some(handle) => {
                            stats.reused += 1;
                            let entry = &mut self.images[handle];
                            entry.name = name.clone();
                            entry.aliases = aliases.clone();
                            handle
                        }
                        None => {
                            stats.created += 1;
                            let image = device.create_image(name, info);
                            self.images.insert(RgPhysicalImage {
                                image,
                                name: name.clone(),
                                create_info: info.clone(),
                                aliases: aliases.clone(),
                                imported: false,
                            })
                        }
                    };
                    physical.push(RgPhysicalResource::Image(handle));
                }
                RgSlotRequest::Buffer { name, info, aliases } => {
                    let handle = match claimed_buffers[slot] {
                        Some(handle) => {
                            stats.reused += 1;
                            let entry = &mut self.buffers[handle];
                            entry.name = name.clone();
                            entry.aliases = aliases.clone();
                            handle
                        }
                        None => {
                            stats.created += 1;
                            let buffer = device.create_buffer(name, info);
                            self.buffers.insert(RgPhysicalBuffer {
                                buffer,
                                name: name.clone(),
                                create_info: info.clone(),
                                aliases: aliases.clone(),
                                imported: false,
                            })
                        }
                    };
                    physical.push(RgPhysicalResource::Buffer(handle));
                }
            }
        }

        (physical, stats)
    }

    /// 重建资源下标到物理条目的映射
    pub fn rebind(&mut self, resource_count: usize) {
        self.bindings = vec![None; resource_count];
        for (handle, entry) in &self.images {
            for &index in &entry.aliases {
                if let Some(binding) = self.bindings.get_mut(index) {
                    *binding = Some(RgPhysicalResource::Image(handle));
                }
            }
        }
        for (handle, entry) in &self.buffers {
            for &index in &entry.aliases {
                if let Some(binding) = self.bindings.get_mut(index) {
                    *binding = Some(RgPhysicalResource::Buffer(handle));
                }
            }
        }
    }

    /// 销毁所有由 graph 创建的物理资源
    pub fn destroy_all(&mut self, device: &mut D) {
        for (_, entry) in self.images.drain() {
            if !entry.imported {
                device.destroy_image(entry.image);
            }
        }
        for (_, entry) in self.buffers.drain() {
            if !entry.imported {
                device.destroy_buffer(entry.buffer);
            }
        }
        self.bindings.clear();
    }
}

// getters
impl<D: RgDevice> RgPhysicalPool<D> {
    #[inline]
    pub fn binding(&self, resource_index: usize) -> Option<RgPhysicalResource> {
        self.bindings.get(resource_index).copied().flatten()
    }

    pub fn image_of(&self, resource_index: usize) -> Option<&RgPhysicalImage<D::Image>> {
        match self.binding(resource_index)? {
            RgPhysicalResource::Image(handle) => self.images.get(handle),
            RgPhysicalResource::Buffer(_) => None,
        }
    }

    pub fn buffer_of(&self, resource_index: usize) -> Option<&RgPhysicalBuffer<D::Buffer>> {
        match self.binding(resource_index)? {
            RgPhysicalResource::Buffer(handle) => self.buffers.get(handle),
            RgPhysicalResource::Image(_) => None,
        }
    }

    #[inline]
    pub fn image(&self, handle: RgPhysicalImageHandle) -> Option<&RgPhysicalImage<D::Image>> {
        self.images.get(handle)
    }

    #[inline]
    pub fn buffer(&self, handle: RgPhysicalBufferHandle) -> Option<&RgPhysicalBuffer<D::Buffer>> {
        self.buffers.get(handle)
    }

    /// graph 自己创建的物理资源数量（不含导入）
    pub fn owned_count(&self) -> usize {
        self.images.values().filter(|entry| !entry.imported).count()
            + self.buffers.values().filter(|entry| !entry.imported).count()
    }
}

// getters
impl<I> RgPhysicalImage<I> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn create_info(&self) -> &RgImageCreateInfo {
        &self.create_info
    }

    #[inline]
    pub fn aliases(&self) -> &[usize] {
        &self.aliases
    }
}

// getters
impl<B> RgPhysicalBuffer<B> {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn create_info(&self) -> &RgBufferCreateInfo {
        &self.create_info
    }

    #[inline]
    pub fn aliases(&self) -> &[usize] {
        &self.aliases
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::headless::RgHeadlessDevice;
    use ash::vk;

    fn image_request(width: u32, aliases: Vec<usize>) -> RgSlotRequest {
        RgSlotRequest::Image {
            name: format!("image{}", width),
            info: RgImageCreateInfo {
                extent: vk::Extent3D { width, height: width, depth: 1 },
                format: vk::Format::R8G8B8A8_UNORM,
                usage: vk::ImageUsageFlags::SAMPLED,
                mip_levels: 1,
                array_layers: 1,
                samples: vk::SampleCountFlags::TYPE_1,
                image_type: vk::ImageType::TYPE_2D,
            },
            aliases,
        }
    }

    #[test]
    fn test_realize_reuses_unchanged_slots() {
        let mut device = RgHeadlessDevice::new(vk::Extent2D { width: 64, height: 64 });
        let mut pool = RgPhysicalPool::<RgHeadlessDevice>::default();

        let (first, stats) = pool.realize(&mut device, &[image_request(16, vec![0]), image_request(32, vec![1])]);
        assert_eq!(stats.created, 2);
        pool.rebind(2);
        let image0 = pool.image_of(0).map(|e| e.image);

        let (second, stats) = pool.realize(&mut device, &[image_request(16, vec![0]), image_request(48, vec![1])]);
        assert_eq!(stats, RgRealizeStats { reused: 1, created: 1, destroyed: 1 });
        assert_eq!(first[0], second[0]);
        pool.rebind(2);
        assert_eq!(pool.image_of(0).map(|e| e.image), image0);
        assert_eq!(device.live_image_count(), 2);

        pool.destroy_all(&mut device);
        assert_eq!(device.live_image_count(), 0);
    }

    #[test]
    fn test_imported_entries_are_never_destroyed() {
        let mut device = RgHeadlessDevice::new(vk::Extent2D { width: 64, height: 64 });
        let external = device.create_image("swapchain", &RgImageCreateInfo::default());
        let mut pool = RgPhysicalPool::<RgHeadlessDevice>::default();
        let imported = pool.import_image("swapchain", external);
        pool.bind_imported(imported, None, vec![0]);

        pool.realize(&mut device, &[]);
        pool.rebind(1);
        assert_eq!(pool.image_of(0).map(|e| e.image), Some(external));

        pool.destroy_all(&mut device);
        assert_eq!(device.live_image_count(), 1);
    }
}
