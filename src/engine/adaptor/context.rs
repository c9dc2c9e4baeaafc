//! ### English
//! Application context: the event loop, trigger manager, backends and options an adaptor uses.
//!
//! ### 中文
//! 应用上下文：适配器使用的事件循环、trigger 管理器、后端与配置。

use std::sync::Arc;

use tracing::debug;

use crate::engine::config::EnvironmentOptions;
use crate::engine::error::Result;
use crate::engine::geometry::PositionSize;
use crate::engine::graphics::GraphicsFactory;
use crate::engine::imaging::{ColorFormat, NativeImageSourceQueue};
use crate::engine::surface::RenderSurface;
use crate::engine::system::{EventLoopHandle, TriggerEventManager};
use crate::engine::window_system::{NativeHandle, WindowSystem};

/// ### English
/// Collaborators shared by every adaptor of one application.
///
/// Cloning is cheap; clones share the trigger manager and the backends. Several contexts may
/// live in one process, each bound to its own event loop.
///
/// ### 中文
/// 同一应用内所有适配器共享的协作对象。
///
/// 克隆开销很小，克隆体共享 trigger 管理器与后端。同一进程中可以存在多个上下文，
/// 各自绑定到自己的事件循环。
#[derive(Clone)]
pub struct AdaptorContext {
    event_loop: EventLoopHandle,
    triggers: TriggerEventManager,
    graphics_factory: Arc<dyn GraphicsFactory>,
    window_system: Arc<dyn WindowSystem>,
    options: EnvironmentOptions,
}

impl AdaptorContext {
    /// ### English
    /// Creates a context bound to `event_loop` and registers its trigger manager there.
    ///
    /// #### Parameters
    /// - `event_loop`: Handle of the loop that runs idle callbacks and trigger dispatch.
    /// - `graphics_factory`: Creates one graphics backend per adaptor.
    /// - `window_system`: Native windowing backend shared by every surface.
    /// - `options`: Environment options, usually [`EnvironmentOptions::from_env`].
    ///
    /// ### 中文
    /// 创建绑定到 `event_loop` 的上下文，并在其上注册 trigger 管理器。
    ///
    /// #### 参数
    /// - `event_loop`：执行 idle 回调与 trigger 分发的事件循环句柄。
    /// - `graphics_factory`：为每个适配器创建一个图形后端。
    /// - `window_system`：所有 surface 共享的原生窗口后端。
    /// - `options`：环境配置，通常来自 [`EnvironmentOptions::from_env`]。
    pub fn new(
        event_loop: &EventLoopHandle,
        graphics_factory: Arc<dyn GraphicsFactory>,
        window_system: Arc<dyn WindowSystem>,
        options: EnvironmentOptions,
    ) -> Result<Self> {
        let triggers = TriggerEventManager::new(event_loop)?;
        debug!(?options, "adaptor context created");
        Ok(Self {
            event_loop: event_loop.clone(),
            triggers,
            graphics_factory,
            window_system,
            options,
        })
    }

    #[inline]
    pub fn event_loop(&self) -> &EventLoopHandle {
        &self.event_loop
    }

    #[inline]
    pub fn triggers(&self) -> &TriggerEventManager {
        &self.triggers
    }

    #[inline]
    pub fn graphics_factory(&self) -> &Arc<dyn GraphicsFactory> {
        &self.graphics_factory
    }

    #[inline]
    pub fn window_system(&self) -> &Arc<dyn WindowSystem> {
        &self.window_system
    }

    #[inline]
    pub fn options(&self) -> &EnvironmentOptions {
        &self.options
    }

    /// ### English
    /// Creates a native window and its render surface. An empty `position` means full screen.
    ///
    /// ### 中文
    /// 创建原生窗口及其 render surface；`position` 为空表示全屏。
    pub fn create_window_surface(
        &self,
        position: PositionSize,
        transparent: bool,
    ) -> Result<RenderSurface> {
        RenderSurface::window(self.window_system.clone(), &self.triggers, position, transparent)
            .map(|surface| surface.with_options(&self.options))
    }

    /// ### English
    /// Wraps a window created elsewhere. The window outlives the surface.
    ///
    /// ### 中文
    /// 包装在别处创建的窗口；窗口的生命周期长于 surface。
    pub fn wrap_native_window(
        &self,
        window: NativeHandle,
        position: PositionSize,
        transparent: bool,
    ) -> Result<RenderSurface> {
        RenderSurface::from_native_window(
            self.window_system.clone(),
            &self.triggers,
            window,
            position,
            transparent,
        )
        .map(|surface| surface.with_options(&self.options))
    }

    pub fn create_pixmap_surface(
        &self,
        position: PositionSize,
        transparent: bool,
    ) -> Result<RenderSurface> {
        RenderSurface::pixmap(self.window_system.clone(), position, transparent)
            .map(|surface| surface.with_options(&self.options))
    }

    /// ### English
    /// Creates an image queue with the configured depth.
    ///
    /// ### 中文
    /// 以配置的深度创建图像队列。
    pub fn create_image_queue(
        &self,
        width: u32,
        height: u32,
        format: ColorFormat,
    ) -> Result<NativeImageSourceQueue> {
        NativeImageSourceQueue::new(width, height, format, self.options.buffer_queue_size())
    }

    pub fn create_native_buffer_surface(
        &self,
        queue: NativeImageSourceQueue,
    ) -> Result<RenderSurface> {
        RenderSurface::native_buffer(self.window_system.clone(), queue)
            .map(|surface| surface.with_options(&self.options))
    }
}
