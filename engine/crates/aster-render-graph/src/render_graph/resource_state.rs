//! 资源访问状态
//!
//! 用 `vk` 的 pipeline stage、access mask 和 image layout 描述一次访问，
//! barrier 推导只比较这些值，本身不调用任何图形 API。

use ash::vk;

/// 被视为"写"的 access 位
const WRITE_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
    vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw()
        | vk::AccessFlags2::SHADER_WRITE.as_raw()
        | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
        | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
        | vk::AccessFlags2::HOST_WRITE.as_raw()
        | vk::AccessFlags2::MEMORY_WRITE.as_raw()
        | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR.as_raw(),
);

/// 作为 barrier src 时没有意义的只读 access 位
const READ_ACCESS: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
    vk::AccessFlags2::SHADER_SAMPLED_READ.as_raw()
        | vk::AccessFlags2::SHADER_STORAGE_READ.as_raw()
        | vk::AccessFlags2::SHADER_READ.as_raw()
        | vk::AccessFlags2::UNIFORM_READ.as_raw()
        | vk::AccessFlags2::INPUT_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
        | vk::AccessFlags2::VERTEX_ATTRIBUTE_READ.as_raw()
        | vk::AccessFlags2::INDEX_READ.as_raw()
        | vk::AccessFlags2::INDIRECT_COMMAND_READ.as_raw()
        | vk::AccessFlags2::TRANSFER_READ.as_raw()
        | vk::AccessFlags2::HOST_READ.as_raw()
        | vk::AccessFlags2::MEMORY_READ.as_raw(),
);

const DEPTH_TEST_STAGES: vk::PipelineStageFlags2 = vk::PipelineStageFlags2::from_raw(
    vk::PipelineStageFlags2::EARLY_FRAGMENT_TESTS.as_raw() | vk::PipelineStageFlags2::LATE_FRAGMENT_TESTS.as_raw(),
);

/// 图像访问状态
///
/// 描述图像在某个 Pass 中的使用方式，用于自动计算 barrier。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgImageState {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
    pub layout: vk::ImageLayout,
}

impl Default for RgImageState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

// new & 常量定义
impl RgImageState {
    #[inline]
    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2, layout: vk::ImageLayout) -> Self {
        Self { stage, access, layout }
    }

    /// 未定义状态（初始状态或不关心内容）
    pub const UNDEFINED: Self =
        Self::new(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE, vk::ImageLayout::UNDEFINED);

    /// 颜色附件写入
    pub const COLOR_ATTACHMENT_WRITE: Self = Self::new(
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        vk::AccessFlags2::COLOR_ATTACHMENT_WRITE,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    );

    /// 颜色附件只读（load 之后不写）
    pub const COLOR_ATTACHMENT_READ: Self = Self::new(
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        vk::AccessFlags2::COLOR_ATTACHMENT_READ,
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    );

    /// 颜色附件读写（blend / load-store）
    pub const COLOR_ATTACHMENT_READ_WRITE: Self = Self::new(
        vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::COLOR_ATTACHMENT_READ.as_raw() | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw(),
        ),
        vk::ImageLayout::COLOR_ATTACHMENT_OPTIMAL,
    );

    /// 深度附件写入
    pub const DEPTH_ATTACHMENT_WRITE: Self = Self::new(
        DEPTH_TEST_STAGES,
        vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE,
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    );

    /// 深度附件只读（只做深度测试）
    pub const DEPTH_ATTACHMENT_READ: Self = Self::new(
        DEPTH_TEST_STAGES,
        vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ,
        vk::ImageLayout::DEPTH_STENCIL_READ_ONLY_OPTIMAL,
    );

    /// 深度附件读写
    pub const DEPTH_ATTACHMENT_READ_WRITE: Self = Self::new(
        DEPTH_TEST_STAGES,
        vk::AccessFlags2::from_raw(
            vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_READ.as_raw()
                | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw(),
        ),
        vk::ImageLayout::DEPTH_STENCIL_ATTACHMENT_OPTIMAL,
    );

    /// 传输源
    pub const TRANSFER_SRC: Self = Self::new(
        vk::PipelineStageFlags2::TRANSFER,
        vk::AccessFlags2::TRANSFER_READ,
        vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
    );

    /// 传输目标
    pub const TRANSFER_DST: Self = Self::new(
        vk::PipelineStageFlags2::TRANSFER,
        vk::AccessFlags2::TRANSFER_WRITE,
        vk::ImageLayout::TRANSFER_DST_OPTIMAL,
    );

    /// 呈现（swapchain image）
    pub const PRESENT: Self =
        Self::new(vk::PipelineStageFlags2::BOTTOM_OF_PIPE, vk::AccessFlags2::NONE, vk::ImageLayout::PRESENT_SRC_KHR);

    /// 在给定 shader stage 中采样
    #[inline]
    pub const fn shader_read(stage: vk::PipelineStageFlags2) -> Self {
        Self::new(stage, vk::AccessFlags2::SHADER_SAMPLED_READ, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
    }

    /// 在给定 shader stage 中作为 storage image 读取
    #[inline]
    pub const fn storage_read(stage: vk::PipelineStageFlags2) -> Self {
        Self::new(stage, vk::AccessFlags2::SHADER_STORAGE_READ, vk::ImageLayout::GENERAL)
    }

    /// 在给定 shader stage 中作为 storage image 写入
    #[inline]
    pub const fn storage_write(stage: vk::PipelineStageFlags2) -> Self {
        Self::new(stage, vk::AccessFlags2::SHADER_STORAGE_WRITE, vk::ImageLayout::GENERAL)
    }

    /// 在给定 shader stage 中作为 storage image 读写
    #[inline]
    pub const fn storage_read_write(stage: vk::PipelineStageFlags2) -> Self {
        Self::new(
            stage,
            vk::AccessFlags2::from_raw(
                vk::AccessFlags2::SHADER_STORAGE_READ.as_raw() | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
            ),
            vk::ImageLayout::GENERAL,
        )
    }
}

// 辅助方法
impl RgImageState {
    #[inline]
    pub fn is_write(&self) -> bool {
        self.access.intersects(WRITE_ACCESS)
    }

    /// 用于 barrier src 的 access（去掉读操作）
    #[inline]
    pub fn src_access(&self) -> vk::AccessFlags2 {
        self.access & !READ_ACCESS
    }

    /// 合并同一 Pass 对同一资源的两次声明
    ///
    /// layout 相同时取并集；layout 冲突时写入声明优先。
    pub fn merge(self, other: Self) -> Self {
        if self.layout == other.layout {
            Self::new(self.stage | other.stage, self.access | other.access, self.layout)
        } else if other.is_write() || !self.is_write() {
            other
        } else {
            self
        }
    }
}

/// 缓冲区访问状态
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RgBufferState {
    pub stage: vk::PipelineStageFlags2,
    pub access: vk::AccessFlags2,
}

impl Default for RgBufferState {
    fn default() -> Self {
        Self::UNDEFINED
    }
}

// new & 常量定义
impl RgBufferState {
    #[inline]
    pub const fn new(stage: vk::PipelineStageFlags2, access: vk::AccessFlags2) -> Self {
        Self { stage, access }
    }

    pub const UNDEFINED: Self = Self::new(vk::PipelineStageFlags2::TOP_OF_PIPE, vk::AccessFlags2::NONE);

    /// 间接命令缓冲区
    pub const INDIRECT_BUFFER: Self =
        Self::new(vk::PipelineStageFlags2::DRAW_INDIRECT, vk::AccessFlags2::INDIRECT_COMMAND_READ);

    pub const TRANSFER_SRC: Self = Self::new(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_READ);

    pub const TRANSFER_DST: Self = Self::new(vk::PipelineStageFlags2::TRANSFER, vk::AccessFlags2::TRANSFER_WRITE);

    #[inline]
    pub const fn storage_read(stage: vk::PipelineStageFlags2) -> Self {
        Self::new(stage, vk::AccessFlags2::SHADER_STORAGE_READ)
    }

    #[inline]
    pub const fn storage_write(stage: vk::PipelineStageFlags2) -> Self {
        Self::new(stage, vk::AccessFlags2::SHADER_STORAGE_WRITE)
    }

    #[inline]
    pub const fn storage_read_write(stage: vk::PipelineStageFlags2) -> Self {
        Self::new(
            stage,
            vk::AccessFlags2::from_raw(
                vk::AccessFlags2::SHADER_STORAGE_READ.as_raw() | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw(),
            ),
        )
    }
}

// 辅助方法
impl RgBufferState {
    #[inline]
    pub fn is_write(&self) -> bool {
        self.access.intersects(WRITE_ACCESS)
    }

    #[inline]
    pub fn src_access(&self) -> vk::AccessFlags2 {
        self.access & !READ_ACCESS
    }

    pub fn merge(self, other: Self) -> Self {
        Self::new(self.stage | other.stage, self.access | other.access)
    }
}

/// 一次访问的状态：图像带 layout，缓冲区不带
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum RgAccessState {
    Image(RgImageState),
    Buffer(RgBufferState),
}

impl RgAccessState {
    #[inline]
    pub fn is_write(&self) -> bool {
        match self {
            Self::Image(state) => state.is_write(),
            Self::Buffer(state) => state.is_write(),
        }
    }

    #[inline]
    pub fn stage(&self) -> vk::PipelineStageFlags2 {
        match self {
            Self::Image(state) => state.stage,
            Self::Buffer(state) => state.stage,
        }
    }

    #[inline]
    pub fn access(&self) -> vk::AccessFlags2 {
        match self {
            Self::Image(state) => state.access,
            Self::Buffer(state) => state.access,
        }
    }

    /// 图像的 layout；缓冲区返回 `None`
    #[inline]
    pub fn layout(&self) -> Option<vk::ImageLayout> {
        match self {
            Self::Image(state) => Some(state.layout),
            Self::Buffer(_) => None,
        }
    }
}
