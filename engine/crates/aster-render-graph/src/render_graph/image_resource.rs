use ash::vk;

use super::resource_handle::RgResourceHandle;

/// 图像尺寸策略
///
/// 相对尺寸在编译（以及 resize）时才被解析为具体的宽高。
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum RgSizePolicy {
    /// 固定尺寸
    Absolute { width: u32, height: u32 },
    /// 相对 swapchain 尺寸缩放
    SwapchainRelative { scale_x: f32, scale_y: f32 },
    /// 相对另一张图像的尺寸缩放
    InputRelative {
        resource: RgResourceHandle,
        scale_x: f32,
        scale_y: f32,
    },
}

impl RgSizePolicy {
    /// 与 swapchain 同尺寸
    pub const SWAPCHAIN: Self = Self::SwapchainRelative {
        scale_x: 1.0,
        scale_y: 1.0,
    };

    /// 是否依赖 swapchain 尺寸（直接或通过其他图像间接依赖不在此判断）
    #[inline]
    pub fn is_swapchain_relative(&self) -> bool {
        matches!(self, Self::SwapchainRelative { .. })
    }

    /// 按比例缩放一个基准尺寸，结果至少为 1
    pub(crate) fn scale(base: vk::Extent2D, scale_x: f32, scale_y: f32) -> vk::Extent2D {
        let scaled = |value: u32, scale: f32| ((value as f32 * scale).round() as u32).max(1);
        vk::Extent2D {
            width: scaled(base.width, scale_x),
            height: scaled(base.height, scale_y),
        }
    }
}

/// 图像资源描述
///
/// 创建之后不可变；read-modify-write 产生的新版本与旧版本共享同一份描述。
#[derive(Clone, Debug, PartialEq)]
pub struct RgImageDesc {
    /// 尺寸策略
    pub size: RgSizePolicy,
    /// 图像格式
    pub format: vk::Format,
    /// 额外用途；Pass 声明的用法会在分配时并入
    pub usage: vk::ImageUsageFlags,
    /// 图像深度（3D 纹理）
    pub depth: u32,
    /// Mip 级别数
    pub mip_levels: u32,
    /// 数组层数
    pub array_layers: u32,
    /// 采样数
    pub samples: vk::SampleCountFlags,
    /// 图像类型
    pub image_type: vk::ImageType,
}

impl Default for RgImageDesc {
    fn default() -> Self {
        Self {
            size: RgSizePolicy::SWAPCHAIN,
            format: vk::Format::R8G8B8A8_UNORM,
            usage: vk::ImageUsageFlags::empty(),
            depth: 1,
            mip_levels: 1,
            array_layers: 1,
            samples: vk::SampleCountFlags::TYPE_1,
            image_type: vk::ImageType::TYPE_2D,
        }
    }
}

// new & builder
impl RgImageDesc {
    /// 固定尺寸的 2D 图像
    #[inline]
    pub fn new_2d(width: u32, height: u32, format: vk::Format) -> Self {
        Self {
            size: RgSizePolicy::Absolute { width, height },
            format,
            ..Default::default()
        }
    }

    /// 按比例跟随 swapchain 尺寸的 2D 图像
    #[inline]
    pub fn swapchain_relative(scale_x: f32, scale_y: f32, format: vk::Format) -> Self {
        Self {
            size: RgSizePolicy::SwapchainRelative { scale_x, scale_y },
            format,
            ..Default::default()
        }
    }

    /// 按比例跟随另一张图像尺寸的 2D 图像
    #[inline]
    pub fn input_relative(resource: RgResourceHandle, scale_x: f32, scale_y: f32, format: vk::Format) -> Self {
        Self {
            size: RgSizePolicy::InputRelative {
                resource,
                scale_x,
                scale_y,
            },
            format,
            ..Default::default()
        }
    }

    #[inline]
    pub fn with_usage(mut self, usage: vk::ImageUsageFlags) -> Self {
        self.usage = usage;
        self
    }

    #[inline]
    pub fn with_mip_levels(mut self, mip_levels: u32) -> Self {
        self.mip_levels = mip_levels;
        self
    }

    #[inline]
    pub fn with_array_layers(mut self, array_layers: u32) -> Self {
        self.array_layers = array_layers;
        self
    }

    #[inline]
    pub fn with_samples(mut self, samples: vk::SampleCountFlags) -> Self {
        self.samples = samples;
        self
    }
}

// 辅助方法
impl RgImageDesc {
    /// 两个描述是否可以共享同一块物理内存
    ///
    /// 除 usage 外的所有字段都必须一致，usage 在分配时取并集。
    pub fn can_alias(&self, other: &Self) -> bool {
        self.size == other.size
            && self.format == other.format
            && self.depth == other.depth
            && self.mip_levels == other.mip_levels
            && self.array_layers == other.array_layers
            && self.samples == other.samples
            && self.image_type == other.image_type
    }

    #[inline]
    pub fn is_depth(&self) -> bool {
        Self::infer_aspect(self.format).contains(vk::ImageAspectFlags::DEPTH)
    }

    /// 从格式推断 aspect
    pub fn infer_aspect(format: vk::Format) -> vk::ImageAspectFlags {
        match format {
            vk::Format::D16_UNORM | vk::Format::D32_SFLOAT | vk::Format::X8_D24_UNORM_PACK32 => {
                vk::ImageAspectFlags::DEPTH
            }
            vk::Format::S8_UINT => vk::ImageAspectFlags::STENCIL,
            vk::Format::D16_UNORM_S8_UINT | vk::Format::D24_UNORM_S8_UINT | vk::Format::D32_SFLOAT_S8_UINT => {
                vk::ImageAspectFlags::DEPTH | vk::ImageAspectFlags::STENCIL
            }
            _ => vk::ImageAspectFlags::COLOR,
        }
    }
}
