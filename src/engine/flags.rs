//! ### English
//! Bitflags passed when creating an adaptor.
//!
//! They are plain `u32` masks and are folded into [`EnvironmentOptions`] by
//! [`EnvironmentOptions::apply_flags`]; a flag always wins over the environment.
//!
//! ### 中文
//! 创建 adaptor 时传入的位标志（bitflags）。
//!
//! 以 `u32` 位掩码表示，并通过 [`EnvironmentOptions::apply_flags`] 合并进
//! [`EnvironmentOptions`]；标志位始终优先于环境变量。
//!
//! [`EnvironmentOptions`]: crate::engine::config::EnvironmentOptions
//! [`EnvironmentOptions::apply_flags`]: crate::engine::config::EnvironmentOptions::apply_flags

/// ### English
/// Render only when an update is requested (`ThreadMode::RunIfRequested`).
///
/// ### 中文
/// 仅在请求更新时渲染（`ThreadMode::RunIfRequested`）。
pub const ADAPTOR_FLAG_RUN_IF_REQUESTED: u32 = 1 << 0;

/// ### English
/// Always swap the full surface, even if the graphics backend supports partial update.
///
/// ### 中文
/// 始终整屏交换，即使图形后端支持局部更新。
pub const ADAPTOR_FLAG_DISABLE_PARTIAL_UPDATE: u32 = 1 << 1;

/// ### English
/// Log the measured frame rate once per second.
///
/// ### 中文
/// 每秒输出一次实测帧率日志。
pub const ADAPTOR_FLAG_FPS_TRACKING: u32 = 1 << 2;
