//! 虚拟资源记录
//!
//! 每个版本一条记录；同一份物理内存的所有版本构成一个 family，
//! 由 `root`（版本 0 的下标）标识。

use ash::vk;

use super::physical::RgPhysicalResource;
use super::resource_handle::RgPassHandle;
use super::resource_state::{RgAccessState, RgImageState};

/// 资源种类
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgResourceKind {
    Image,
    Buffer,
}

/// Pass 对资源的使用方式
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgUsageKind {
    /// 颜色或深度附件
    Attachment,
    /// storage image
    StorageImage,
    /// 采样纹理
    Texture,
    /// storage / uniform buffer
    Buffer,
}

impl RgUsageKind {
    #[inline]
    const fn bit(self) -> u8 {
        match self {
            Self::Attachment => 1 << 0,
            Self::StorageImage => 1 << 1,
            Self::Texture => 1 << 2,
            Self::Buffer => 1 << 3,
        }
    }

    #[inline]
    pub fn resource_kind(self) -> RgResourceKind {
        match self {
            Self::Buffer => RgResourceKind::Buffer,
            _ => RgResourceKind::Image,
        }
    }
}

/// 资源所有版本上声明过的用法的并集
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RgUsageMask(u8);

impl RgUsageMask {
    #[inline]
    pub fn insert(&mut self, kind: RgUsageKind) {
        self.0 |= kind.bit();
    }

    #[inline]
    pub fn contains(&self, kind: RgUsageKind) -> bool {
        self.0 & kind.bit() != 0
    }

    #[inline]
    pub fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    /// 换算为创建图像时需要的 usage
    pub fn image_usage(&self, is_depth: bool) -> vk::ImageUsageFlags {
        let mut usage = vk::ImageUsageFlags::empty();
        if self.contains(RgUsageKind::Attachment) {
            usage |= if is_depth {
                vk::ImageUsageFlags::DEPTH_STENCIL_ATTACHMENT
            } else {
                vk::ImageUsageFlags::COLOR_ATTACHMENT
            };
        }
        if self.contains(RgUsageKind::StorageImage) {
            usage |= vk::ImageUsageFlags::STORAGE;
        }
        if self.contains(RgUsageKind::Texture) {
            usage |= vk::ImageUsageFlags::SAMPLED;
        }
        usage
    }

    /// 换算为创建缓冲区时需要的 usage
    pub fn buffer_usage(&self) -> vk::BufferUsageFlags {
        if self.contains(RgUsageKind::Buffer) {
            vk::BufferUsageFlags::STORAGE_BUFFER
        } else {
            vk::BufferUsageFlags::empty()
        }
    }
}

impl std::fmt::Debug for RgUsageMask {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let kinds = [
            RgUsageKind::Attachment,
            RgUsageKind::StorageImage,
            RgUsageKind::Texture,
            RgUsageKind::Buffer,
        ];
        f.debug_set().entries(kinds.iter().filter(|kind| self.contains(**kind))).finish()
    }
}

/// 附件的清除值
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RgClearValue {
    Color([f32; 4]),
    DepthStencil { depth: f32, stencil: u32 },
}

impl RgClearValue {
    pub const BLACK: Self = Self::Color([0.0, 0.0, 0.0, 1.0]);
    pub const TRANSPARENT: Self = Self::Color([0.0, 0.0, 0.0, 0.0]);
    /// reverse-z 使用 0 作为最远深度
    pub const DEPTH_ZERO: Self = Self::DepthStencil { depth: 0.0, stencil: 0 };
    pub const DEPTH_ONE: Self = Self::DepthStencil { depth: 1.0, stencil: 0 };

    pub fn to_vk(&self) -> vk::ClearValue {
        match *self {
            Self::Color(float32) => vk::ClearValue {
                color: vk::ClearColorValue { float32 },
            },
            Self::DepthStencil { depth, stencil } => vk::ClearValue {
                depth_stencil: vk::ClearDepthStencilValue { depth, stencil },
            },
        }
    }
}

/// 外部导入资源的信息
#[derive(Clone, Copy, Debug)]
pub struct RgImportInfo {
    /// 物理池中的条目（不由 graph 销毁）
    pub physical: RgPhysicalResource,
    /// 进入 graph 时的状态
    pub initial_state: RgAccessState,
}

/// 导出资源信息
///
/// 导出的资源不参与别名；带 `final_state` 的图像会在最后一个 Pass 之后转换到该状态。
#[derive(Clone, Copy, Debug, Default)]
pub struct RgExportInfo {
    pub final_state: Option<RgImageState>,
}

/// 资源记录（每个版本一条）
#[derive(Clone, Debug)]
pub struct RgResource {
    pub(crate) name: String,
    pub(crate) kind: RgResourceKind,
    /// 图像或缓冲区描述表中的下标
    pub(crate) desc_index: usize,
    pub(crate) version: u32,
    /// 创建或最后写入该版本的 Pass；导入资源为 `None`
    pub(crate) producer: Option<RgPassHandle>,
    pub(crate) readers: Vec<RgPassHandle>,
    pub(crate) clear_value: Option<RgClearValue>,
    pub(crate) usage: RgUsageMask,
    /// 版本 0 的下标
    pub(crate) root: usize,
    /// 下一个版本的下标
    pub(crate) superseded_by: Option<usize>,
    pub(crate) import: Option<RgImportInfo>,
    pub(crate) export: Option<RgExportInfo>,
}

// getters
impl RgResource {
    #[inline]
    pub fn name(&self) -> &str {
        &self.name
    }

    #[inline]
    pub fn kind(&self) -> RgResourceKind {
        self.kind
    }

    #[inline]
    pub fn version(&self) -> u32 {
        self.version
    }

    #[inline]
    pub fn producer(&self) -> Option<RgPassHandle> {
        self.producer
    }

    #[inline]
    pub fn readers(&self) -> &[RgPassHandle] {
        &self.readers
    }

    #[inline]
    pub fn clear_value(&self) -> Option<RgClearValue> {
        self.clear_value
    }

    #[inline]
    pub fn usage(&self) -> RgUsageMask {
        self.usage
    }

    #[inline]
    pub fn root(&self) -> usize {
        self.root
    }

    #[inline]
    pub fn is_imported(&self) -> bool {
        self.import.is_some()
    }

    #[inline]
    pub fn is_exported(&self) -> bool {
        self.export.is_some()
    }

    #[inline]
    pub fn is_superseded(&self) -> bool {
        self.superseded_by.is_some()
    }
}
