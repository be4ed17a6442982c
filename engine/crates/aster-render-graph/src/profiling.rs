//! 可选的 Tracy 性能分析
//!
//! 打开 `profiling` feature 后，[`rg_profile_span!`](crate::rg_profile_span) 会在当前作用域创建一个 tracy span；
//! 否则宏展开为空。

#[cfg(feature = "profiling")]
#[doc(hidden)]
pub use tracy_client;

/// 启动 tracy client（仅在 `profiling` feature 下存在）
///
/// span 需要一个正在运行的 client，应用应在构建渲染图之前调用一次。
#[cfg(feature = "profiling")]
pub fn start_profiler() {
    let _ = tracy_client::Client::start();
}

/// 在当前作用域打开一个 profiling span
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! rg_profile_span {
    ($name:literal) => {
        let _rg_span = $crate::profiling::tracy_client::span!($name);
    };
}

/// 在当前作用域打开一个 profiling span
#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! rg_profile_span {
    ($name:literal) => {};
}
