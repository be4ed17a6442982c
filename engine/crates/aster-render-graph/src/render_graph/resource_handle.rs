//! RenderGraph 句柄定义
//!
//! 这些句柄是 graph 内部的虚拟引用：只是扁平数组中的下标，从不持有资源。
//! 资源句柄额外携带版本号，用于调试输出和陈旧句柄的诊断。

use std::fmt;

/// Graph 内部的资源句柄（图像或缓冲区）
///
/// `index` 指向 `RgResourceRegistry` 中的资源记录；每次 read-modify-write
/// 都会产生一条新记录，因此不同版本拥有不同的 `index`。
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RgResourceHandle {
    /// 资源在 RgResourceRegistry 中的索引
    pub(crate) index: u32,
    /// 版本号，每次写操作后递增
    pub(crate) version: u32,
}

impl RgResourceHandle {
    /// 无效句柄
    pub const INVALID: Self = Self {
        index: u32::MAX,
        version: 0,
    };

    #[inline]
    pub(crate) fn new(index: usize, version: u32) -> Self {
        Self {
            index: index as u32,
            version,
        }
    }

    /// 获取资源索引
    #[inline]
    pub fn index(&self) -> usize {
        self.index as usize
    }

    /// 获取版本号
    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[inline]
    pub fn is_valid(&self) -> bool {
        self.index != u32::MAX
    }
}

impl Default for RgResourceHandle {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Debug for RgResourceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_valid() {
            write!(f, "RgResource({}.v{})", self.index, self.version)
        } else {
            write!(f, "RgResource(invalid)")
        }
    }
}

/// Graph 内部的 Pass 句柄，按声明顺序分配
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RgPassHandle(pub(crate) u32);

impl RgPassHandle {
    #[inline]
    pub(crate) fn new(index: usize) -> Self {
        Self(index as u32)
    }

    /// Pass 的声明序号
    #[inline]
    pub fn index(&self) -> usize {
        self.0 as usize
    }
}

impl fmt::Debug for RgPassHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RgPass({})", self.0)
    }
}

slotmap::new_key_type! {
    /// 物理图像在 RgPhysicalPool 中的句柄
    pub struct RgPhysicalImageHandle;
    /// 物理缓冲区在 RgPhysicalPool 中的句柄
    pub struct RgPhysicalBufferHandle;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_handle() {
        assert!(!RgResourceHandle::INVALID.is_valid());
        assert!(!RgResourceHandle::default().is_valid());
        assert!(RgResourceHandle::new(3, 1).is_valid());
    }

    #[test]
    fn test_debug_format() {
        assert_eq!(format!("{:?}", RgResourceHandle::new(2, 1)), "RgResource(2.v1)");
        assert_eq!(format!("{:?}", RgPassHandle::new(4)), "RgPass(4)");
    }
}
