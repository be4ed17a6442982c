use ash::vk;

/// 缓冲区资源描述
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RgBufferDesc {
    /// 缓冲区大小（字节）
    pub size: vk::DeviceSize,
    /// 缓冲区用途
    pub usage: vk::BufferUsageFlags,
}

impl Default for RgBufferDesc {
    fn default() -> Self {
        Self {
            size: 0,
            usage: vk::BufferUsageFlags::STORAGE_BUFFER,
        }
    }
}

impl RgBufferDesc {
    #[inline]
    pub fn new(size: vk::DeviceSize, usage: vk::BufferUsageFlags) -> Self {
        Self { size, usage }
    }

    /// 大小一致即可共享物理内存，usage 取并集
    #[inline]
    pub fn can_alias(&self, other: &Self) -> bool {
        self.size == other.size
    }
}
