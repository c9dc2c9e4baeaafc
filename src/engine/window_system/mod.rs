//! ### English
//! Windowing-system contract consumed by render surfaces.
//!
//! Implementations are internally synchronized (like a display connection): window operations
//! come from the event thread, EGL-window operations from the render thread.
//!
//! ### 中文
//! render surface 所依赖的窗口系统契约。
//!
//! 实现需自带内部同步（类似 display 连接）：窗口操作来自事件线程，EGL window 操作来自渲染线程。

mod headless;

pub use headless::HeadlessWindowSystem;

use dpi::PhysicalSize;

use crate::engine::error::Result;
use crate::engine::geometry::{PositionSize, Rect};
use crate::engine::graphics::ColorDepth;

/// ### English
/// Opaque native handle (window, EGL window, pixmap or buffer queue).
///
/// ### 中文
/// 不透明的原生句柄（窗口、EGL window、pixmap 或 buffer 队列）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub u64);

pub trait WindowSystem: Send + Sync {
    fn screen_size(&self) -> PhysicalSize<u32>;

    /// ### English
    /// Horizontal and vertical DPI.
    ///
    /// ### 中文
    /// 水平与垂直 DPI。
    fn dpi(&self) -> (u32, u32);

    /// ### English
    /// Current screen rotation in degrees (0, 90, 180 or 270).
    ///
    /// ### 中文
    /// 当前屏幕旋转角度（0、90、180 或 270）。
    fn screen_rotation_angle(&self) -> i32;

    fn create_window(&self, position: PositionSize, transparent: bool) -> Result<NativeHandle>;

    fn destroy_window(&self, window: NativeHandle);

    fn move_resize_window(&self, window: NativeHandle, position: PositionSize);

    fn create_egl_window(
        &self,
        window: NativeHandle,
        size: PhysicalSize<u32>,
    ) -> Result<NativeHandle>;

    fn destroy_egl_window(&self, egl_window: NativeHandle);

    fn resize_egl_window(&self, egl_window: NativeHandle, size: PhysicalSize<u32>);

    fn set_egl_window_rotation(&self, egl_window: NativeHandle, angle: i32);

    fn is_rotation_supported(&self, egl_window: NativeHandle) -> bool;

    /// ### English
    /// Tells the compositor the client finished drawing at the new orientation.
    ///
    /// ### 中文
    /// 通知合成器：客户端已按新方向完成绘制。
    fn window_rotation_completed(&self, window: NativeHandle, angle: i32, size: PhysicalSize<u32>);

    fn create_pixmap(&self, size: PhysicalSize<u32>, depth: ColorDepth) -> Result<NativeHandle>;

    fn free_pixmap(&self, pixmap: NativeHandle);

    /// ### English
    /// Reports `area` of `pixmap` as updated to the compositor.
    ///
    /// ### 中文
    /// 向合成器报告 `pixmap` 的 `area` 区域已更新。
    fn damage_pixmap(&self, pixmap: NativeHandle, area: Rect);

    /// ### English
    /// Drains the event queue bound to `window`; returns how many events were handled.
    ///
    /// ### 中文
    /// 清空与 `window` 关联的事件队列；返回处理的事件数量。
    fn dispatch_events(&self, window: NativeHandle) -> usize;
}
