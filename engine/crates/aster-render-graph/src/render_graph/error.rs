use thiserror::Error;

/// `RenderGraph::compile` 的失败原因
///
/// 编译失败后 graph 停留在 Building 状态，不能执行。
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RgCompileError {
    /// 依赖中存在环，列出所有未能排序的 Pass
    #[error("RenderGraph: cycle detected involving passes: {passes:?}")]
    Cycle { passes: Vec<String> },

    #[error("RenderGraph: image '{resource}' has zero-sized extent {width}x{height}x{depth}")]
    ZeroSizedImage {
        resource: String,
        width: u32,
        height: u32,
        depth: u32,
    },

    #[error("RenderGraph: buffer '{resource}' has zero size")]
    ZeroSizedBuffer { resource: String },

    #[error("RenderGraph: image '{resource}' must have at least one mip level and one array layer")]
    ZeroMipsOrLayers { resource: String },

    #[error("RenderGraph: resource '{resource}' refers to missing description #{desc_index}")]
    MissingDescription { resource: String, desc_index: usize },

    /// 相对尺寸引用了缓冲区，或相对关系形成环
    #[error("RenderGraph: image '{resource}' has an invalid input-relative size: {reason}")]
    InvalidSizePolicy { resource: String, reason: String },

    /// 导出的版本之后又被写入
    #[error("RenderGraph: '{resource}' v{version} is exported but a later pass writes a newer version")]
    ExportSuperseded { resource: String, version: u32 },

    #[error("RenderGraph: '{first}' and '{second}' share physical memory but their descriptions differ")]
    InconsistentAlias { first: String, second: String },

    #[error("RenderGraph: '{first}' and '{second}' share physical memory but their lifetimes overlap")]
    AliasOverlap { first: String, second: String },
}
