/// RenderGraph 的配置
#[derive(Clone, Debug)]
pub struct RgSettings {
    /// 同时在 GPU 上执行的帧数，决定 `RgFrameContext::frame_in_flight`
    pub frames_in_flight: usize,
    /// 关闭后每个资源 family 独占一块物理内存
    pub enable_aliasing: bool,
    /// 每次编译后通过 log 打印执行计划
    pub log_execution_plan: bool,
}

impl Default for RgSettings {
    fn default() -> Self {
        Self {
            frames_in_flight: 3,
            enable_aliasing: true,
            log_execution_plan: false,
        }
    }
}
