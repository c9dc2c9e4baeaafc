//! ### English
//! Runtime options for the adaptor, read from the environment or set programmatically.
//!
//! ### 中文
//! adaptor 的运行时选项：可从环境变量读取，也可通过代码设置。

use std::time::Duration;

use tracing::warn;

use crate::engine::flags::{
    ADAPTOR_FLAG_DISABLE_PARTIAL_UPDATE, ADAPTOR_FLAG_FPS_TRACKING, ADAPTOR_FLAG_RUN_IF_REQUESTED,
};
use crate::engine::render::ThreadMode;

pub const ENV_REFRESH_RATE: &str = "RENDER_ADAPTOR_REFRESH_RATE";
pub const ENV_THREAD_MODE: &str = "RENDER_ADAPTOR_THREAD_MODE";
pub const ENV_BUFFER_QUEUE_SIZE: &str = "RENDER_ADAPTOR_BUFFER_QUEUE_SIZE";
pub const ENV_DISABLE_PARTIAL_UPDATE: &str = "RENDER_ADAPTOR_DISABLE_PARTIAL_UPDATE";
pub const ENV_DISABLE_DEPTH_BUFFER: &str = "RENDER_ADAPTOR_DISABLE_DEPTH_BUFFER";
pub const ENV_DISABLE_STENCIL_BUFFER: &str = "RENDER_ADAPTOR_DISABLE_STENCIL_BUFFER";
pub const ENV_MULTI_SAMPLING_LEVEL: &str = "RENDER_ADAPTOR_MULTI_SAMPLING_LEVEL";
pub const ENV_FPS_TRACKING: &str = "RENDER_ADAPTOR_FPS_TRACKING";

/// ### English
/// Default depth of a native buffer queue.
///
/// ### 中文
/// native buffer 队列的默认深度。
pub const DEFAULT_BUFFER_QUEUE_SIZE: usize = 3;

/// ### English
/// Default time allowed for the render thread to bring up graphics.
///
/// ### 中文
/// 渲染线程完成图形初始化的默认超时时间。
pub const DEFAULT_START_TIMEOUT: Duration = Duration::from_secs(30);

/// ### English
/// Default time the event thread waits for a surface replace/delete to be processed.
///
/// ### 中文
/// 事件线程等待 surface 替换/删除完成的默认超时时间。
pub const DEFAULT_SURFACE_REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// ### English
/// Default time the render thread waits for `ReleaseLock` before treating the compositor as stuck.
///
/// ### 中文
/// 渲染线程等待 `ReleaseLock` 的默认超时；超时即视为合成器卡死。
pub const DEFAULT_COMPOSITOR_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// ### English
/// Adaptor configuration.
///
/// ### 中文
/// adaptor 配置。
#[derive(Clone, Debug)]
pub struct EnvironmentOptions {
    render_refresh_rate: u32,
    thread_mode: ThreadMode,
    buffer_queue_size: usize,
    partial_update: bool,
    depth_buffer_required: bool,
    stencil_buffer_required: bool,
    multi_sampling_level: i32,
    fps_tracking_seconds: u32,
    start_timeout: Duration,
    surface_request_timeout: Duration,
    compositor_lock_timeout: Duration,
}

impl Default for EnvironmentOptions {
    fn default() -> Self {
        Self {
            render_refresh_rate: 1,
            thread_mode: ThreadMode::Normal,
            buffer_queue_size: DEFAULT_BUFFER_QUEUE_SIZE,
            partial_update: true,
            depth_buffer_required: true,
            stencil_buffer_required: true,
            multi_sampling_level: 0,
            fps_tracking_seconds: 0,
            start_timeout: DEFAULT_START_TIMEOUT,
            surface_request_timeout: DEFAULT_SURFACE_REQUEST_TIMEOUT,
            compositor_lock_timeout: DEFAULT_COMPOSITOR_LOCK_TIMEOUT,
        }
    }
}

impl EnvironmentOptions {
    /// ### English
    /// Reads options from the process environment; unset or malformed variables keep defaults.
    ///
    /// ### 中文
    /// 从进程环境变量读取选项；未设置或格式错误的变量保持默认值。
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// ### English
    /// Reads options through `lookup` (used by tests to avoid touching the real environment).
    ///
    /// #### Parameters
    /// - `lookup`: Returns the raw value of a variable, or `None` when unset.
    ///
    /// ### 中文
    /// 通过 `lookup` 读取选项（测试中用于避免修改真实环境变量）。
    ///
    /// #### 参数
    /// - `lookup`：返回变量原始值；未设置时返回 `None`。
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let integer = |name: &str| -> Option<i64> {
            let raw = lookup(name)?;
            match raw.trim().parse::<i64>() {
                Ok(value) => Some(value),
                Err(_) => {
                    warn!(variable = name, value = %raw, "ignoring non-integer environment value");
                    None
                }
            }
        };

        let mut options = Self::default();

        if let Some(rate) = integer(ENV_REFRESH_RATE) {
            if rate >= 1 {
                options.render_refresh_rate = rate.min(u32::MAX as i64) as u32;
            }
        }
        if let Some(mode) = integer(ENV_THREAD_MODE) {
            match mode {
                0 => options.thread_mode = ThreadMode::Normal,
                1 => options.thread_mode = ThreadMode::RunIfRequested,
                other => warn!(mode = other, "unknown thread mode, keeping NORMAL"),
            }
        }
        if let Some(size) = integer(ENV_BUFFER_QUEUE_SIZE) {
            if size >= 1 {
                options.buffer_queue_size = size as usize;
            }
        }
        if let Some(disabled) = integer(ENV_DISABLE_PARTIAL_UPDATE) {
            options.partial_update = disabled == 0;
        }
        if let Some(disabled) = integer(ENV_DISABLE_DEPTH_BUFFER) {
            options.depth_buffer_required = disabled == 0;
        }
        if let Some(disabled) = integer(ENV_DISABLE_STENCIL_BUFFER) {
            options.stencil_buffer_required = disabled == 0;
        }
        if let Some(level) = integer(ENV_MULTI_SAMPLING_LEVEL) {
            options.multi_sampling_level = level.clamp(0, i32::MAX as i64) as i32;
        }
        if let Some(seconds) = integer(ENV_FPS_TRACKING) {
            options.fps_tracking_seconds = seconds.clamp(0, u32::MAX as i64) as u32;
        }

        /* ### English
         * A stencil buffer cannot exist without a depth buffer in the configs we choose.
         * ### 中文
         * 在我们选择的配置中，没有深度缓冲就不能有模板缓冲。
         */
        if !options.depth_buffer_required {
            options.stencil_buffer_required = false;
        }
        options
    }

    /// ### English
    /// Applies `ADAPTOR_FLAG_*` bits on top of the current options.
    ///
    /// ### 中文
    /// 在当前选项之上应用 `ADAPTOR_FLAG_*` 位标志。
    pub fn apply_flags(mut self, flags: u32) -> Self {
        if flags & ADAPTOR_FLAG_RUN_IF_REQUESTED != 0 {
            self.thread_mode = ThreadMode::RunIfRequested;
        }
        if flags & ADAPTOR_FLAG_DISABLE_PARTIAL_UPDATE != 0 {
            self.partial_update = false;
        }
        if flags & ADAPTOR_FLAG_FPS_TRACKING != 0 && self.fps_tracking_seconds == 0 {
            self.fps_tracking_seconds = 1;
        }
        self
    }

    pub fn render_refresh_rate(&self) -> u32 {
        self.render_refresh_rate
    }

    pub fn thread_mode(&self) -> ThreadMode {
        self.thread_mode
    }

    pub fn buffer_queue_size(&self) -> usize {
        self.buffer_queue_size
    }

    pub fn partial_update(&self) -> bool {
        self.partial_update
    }

    pub fn depth_buffer_required(&self) -> bool {
        self.depth_buffer_required
    }

    pub fn stencil_buffer_required(&self) -> bool {
        self.stencil_buffer_required
    }

    pub fn multi_sampling_level(&self) -> i32 {
        self.multi_sampling_level
    }

    pub fn fps_tracking_seconds(&self) -> u32 {
        self.fps_tracking_seconds
    }

    pub fn start_timeout(&self) -> Duration {
        self.start_timeout
    }

    pub fn surface_request_timeout(&self) -> Duration {
        self.surface_request_timeout
    }

    pub fn compositor_lock_timeout(&self) -> Duration {
        self.compositor_lock_timeout
    }

    pub fn with_render_refresh_rate(mut self, frames_per_render: u32) -> Self {
        self.render_refresh_rate = frames_per_render.max(1);
        self
    }

    pub fn with_thread_mode(mut self, mode: ThreadMode) -> Self {
        self.thread_mode = mode;
        self
    }

    pub fn with_buffer_queue_size(mut self, size: usize) -> Self {
        self.buffer_queue_size = size.max(1);
        self
    }

    pub fn with_partial_update(mut self, enabled: bool) -> Self {
        self.partial_update = enabled;
        self
    }

    pub fn with_start_timeout(mut self, timeout: Duration) -> Self {
        self.start_timeout = timeout;
        self
    }

    pub fn with_surface_request_timeout(mut self, timeout: Duration) -> Self {
        self.surface_request_timeout = timeout;
        self
    }

    pub fn with_compositor_lock_timeout(mut self, timeout: Duration) -> Self {
        self.compositor_lock_timeout = timeout;
        self
    }
}
