//! ### English
//! The adaptor: event-thread lifecycle of one render thread and its surface.
//!
//! ### 中文
//! 适配器：单个渲染线程及其 surface 在事件线程上的生命周期。

use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::engine::error::{Error, Result};
use crate::engine::geometry::PositionSize;
use crate::engine::lock;
use crate::engine::render::{SceneCore, ThreadController, UpdateMode};
use crate::engine::surface::{RenderSurface, SurfaceProxy};
use crate::engine::system::{TriggerEvent, TriggerOptions};

use super::context::AdaptorContext;

/// ### English
/// Lifecycle state of an [`Adaptor`].
///
/// ### 中文
/// [`Adaptor`] 的生命周期状态。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum AdaptorState {
    #[default]
    Created,
    Running,
    Paused,
    Stopped,
}

impl AdaptorState {
    #[inline]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::Stopped => "stopped",
        }
    }
}

type CoreEventsHandler = Box<dyn FnMut() + Send + 'static>;

/// ### English
/// Event-thread facade that starts, pauses, resumes and stops the render thread and forwards
/// surface requests to it.
///
/// Dropping the adaptor stops it.
///
/// ### 中文
/// 事件线程门面：启动、暂停、恢复与停止渲染线程，并向其转发 surface 请求。
///
/// 丢弃适配器时会将其停止。
pub struct Adaptor {
    context: AdaptorContext,
    state: AdaptorState,
    controller: ThreadController,
    surface: Option<SurfaceProxy>,
    core_events: Arc<Mutex<Option<CoreEventsHandler>>>,
    _core_events_trigger: TriggerEvent,
}

impl Adaptor {
    /// ### English
    /// Creates a stopped-until-started adaptor with its own graphics backend.
    ///
    /// #### Parameters
    /// - `context`: Event loop, trigger manager, backends and options.
    /// - `surface`: Initial render surface, or `None` to start with a context only.
    /// - `core`: Scene core driven by the render thread.
    ///
    /// ### 中文
    /// 创建一个尚未启动的适配器，并为其创建独立的图形后端。
    ///
    /// #### 参数
    /// - `context`：事件循环、trigger 管理器、后端与配置。
    /// - `surface`：初始 render surface；为 `None` 时只创建上下文。
    /// - `core`：由渲染线程驱动的场景核心。
    pub fn new(
        context: AdaptorContext,
        surface: Option<RenderSurface>,
        core: Box<dyn SceneCore>,
    ) -> Result<Self> {
        let graphics = context.graphics_factory().create_graphics(context.options())?;
        let proxy = surface.as_ref().map(RenderSurface::proxy);

        let core_events: Arc<Mutex<Option<CoreEventsHandler>>> = Arc::new(Mutex::new(None));
        let slot = core_events.clone();
        let core_events_trigger = context.triggers().create_trigger_event(
            move || {
                /* ### English
                 * The handler runs outside the lock and may install a replacement.
                 * ### 中文
                 * 处理函数在锁外运行，可以安装替代的处理函数。
                 */
                let taken = lock(&slot).take();
                if let Some(mut handler) = taken {
                    handler();
                    let mut current = lock(&slot);
                    if current.is_none() {
                        *current = Some(handler);
                    }
                }
            },
            TriggerOptions::KeepAliveAfterTrigger,
        );

        let mut controller = ThreadController::new(
            graphics,
            surface,
            core,
            context.triggers(),
            context.options(),
        );
        controller.set_core_events_notification(Some(core_events_trigger.handle()));

        debug!(surface = ?proxy.as_ref().map(SurfaceProxy::id), "adaptor created");
        Ok(Self {
            context,
            state: AdaptorState::Created,
            controller,
            surface: proxy,
            core_events,
            _core_events_trigger: core_events_trigger,
        })
    }

    #[inline]
    pub fn state(&self) -> AdaptorState {
        self.state
    }

    #[inline]
    pub fn context(&self) -> &AdaptorContext {
        &self.context
    }

    /// ### English
    /// Event-thread handle of the current surface.
    ///
    /// ### 中文
    /// 当前 surface 在事件线程一侧的句柄。
    #[inline]
    pub fn surface(&self) -> Option<&SurfaceProxy> {
        self.surface.as_ref()
    }

    #[inline]
    pub fn controller(&self) -> &ThreadController {
        &self.controller
    }

    /// ### English
    /// Starts the render thread and blocks until it owns a graphics context.
    ///
    /// Starting a running or paused adaptor does nothing. A failed start leaves the adaptor
    /// stopped.
    ///
    /// ### 中文
    /// 启动渲染线程并阻塞到其持有图形上下文。
    ///
    /// 对运行中或已暂停的适配器调用不做任何事；启动失败后适配器处于停止状态。
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            AdaptorState::Created => {}
            AdaptorState::Running | AdaptorState::Paused => {
                warn!(state = self.state.as_str(), "adaptor already started");
                return Ok(());
            }
            AdaptorState::Stopped => return Err(self.invalid("start")),
        }
        if let Err(err) = self.controller.start() {
            self.state = AdaptorState::Stopped;
            return Err(err);
        }
        self.state = AdaptorState::Running;
        info!("adaptor started");
        Ok(())
    }

    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            AdaptorState::Running => {
                self.controller.pause();
                self.state = AdaptorState::Paused;
                info!("adaptor paused");
                Ok(())
            }
            AdaptorState::Created | AdaptorState::Paused => Ok(()),
            AdaptorState::Stopped => Err(self.invalid("pause")),
        }
    }

    /// ### English
    /// Resumes a paused adaptor. The first frame after resume is force-rendered.
    ///
    /// ### 中文
    /// 恢复已暂停的适配器；恢复后的第一帧会被强制渲染。
    pub fn resume(&mut self) -> Result<()> {
        match self.state {
            AdaptorState::Paused => {
                self.controller.resume();
                self.state = AdaptorState::Running;
                info!("adaptor resumed");
                Ok(())
            }
            AdaptorState::Created | AdaptorState::Running => Ok(()),
            AdaptorState::Stopped => Err(self.invalid("resume")),
        }
    }

    /// ### English
    /// Stops and joins the render thread. Idempotent.
    ///
    /// ### 中文
    /// 停止并 join 渲染线程；可重复调用。
    pub fn stop(&mut self) {
        if self.state == AdaptorState::Stopped {
            return;
        }
        self.controller.stop();
        self.state = AdaptorState::Stopped;
        info!("adaptor stopped");
    }

    /// ### English
    /// Moves rendering to `surface` and returns the previous one with its graphics surface
    /// destroyed. Blocks until the render thread has switched.
    ///
    /// ### 中文
    /// 把渲染切换到 `surface`，返回图形 surface 已销毁的旧 surface；阻塞到渲染线程完成切换。
    pub fn replace_surface(&mut self, surface: RenderSurface) -> Result<Option<RenderSurface>> {
        if self.state == AdaptorState::Stopped {
            return Err(self.invalid("replace a surface"));
        }
        let proxy = surface.proxy();
        let previous = self.controller.replace_surface(surface)?;
        debug!(surface = proxy.id(), "adaptor surface replaced");
        self.surface = Some(proxy);
        Ok(previous)
    }

    /// ### English
    /// Recreates the native drawable of the current surface. Returns `true` on context loss.
    ///
    /// ### 中文
    /// 重建当前 surface 的原生可绘制对象；上下文丢失时返回 `true`。
    pub fn recreate_surface(&self) -> Result<bool> {
        match self.state {
            AdaptorState::Running | AdaptorState::Paused => self.controller.recreate_surface(),
            state => Err(Error::InvalidAdaptorState {
                operation: "recreate a surface",
                state: state.as_str(),
            }),
        }
    }

    /// ### English
    /// Detaches the current surface; rendering continues without one.
    ///
    /// ### 中文
    /// 解除当前 surface；之后在没有 surface 的情况下继续运行。
    pub fn delete_surface(&mut self) -> Result<Option<RenderSurface>> {
        if self.state == AdaptorState::Stopped {
            return Err(self.invalid("delete a surface"));
        }
        let surface = self.controller.delete_surface()?;
        self.surface = None;
        Ok(surface)
    }

    /// ### English
    /// Records a new window geometry. Returns `true` if the render thread was asked to resize.
    ///
    /// ### 中文
    /// 记录新的窗口几何；若已请求渲染线程 resize 则返回 `true`。
    pub fn surface_resized(&self, position: PositionSize) -> bool {
        if self.state == AdaptorState::Stopped {
            return false;
        }
        let Some(surface) = self.surface.as_ref() else {
            return false;
        };
        if !surface.move_resize(position) {
            return false;
        }
        self.controller.resize_surface();
        self.controller.request_update();
        true
    }

    /// ### English
    /// Records a window rotation. Returns `true` if the render thread was asked to resize.
    ///
    /// ### 中文
    /// 记录窗口旋转；若已请求渲染线程 resize 则返回 `true`。
    pub fn surface_rotated(&self, angle: i32, width: i32, height: i32) -> bool {
        if self.state == AdaptorState::Stopped {
            return false;
        }
        let Some(surface) = self.surface.as_ref() else {
            return false;
        };
        if !surface.request_rotation(angle, width, height) {
            return false;
        }
        self.controller.resize_surface();
        self.controller.request_update();
        true
    }

    pub fn set_render_refresh_rate(&self, frames_per_render: u32) {
        self.controller.set_render_refresh_rate(frames_per_render);
    }

    pub fn request_update(&self) {
        if self.state != AdaptorState::Stopped {
            self.controller.request_update();
        }
    }

    /// ### English
    /// Renders exactly one frame, even while paused.
    ///
    /// ### 中文
    /// 渲染恰好一帧，即使处于暂停状态。
    pub fn request_update_once(&self, mode: UpdateMode) {
        if self.state != AdaptorState::Stopped {
            self.controller.request_update_once(mode);
        }
    }

    /// ### English
    /// Runs `callback` once on the event thread. Returns `false` if the adaptor is stopped or
    /// the event loop is shutting down.
    ///
    /// ### 中文
    /// 在事件线程上执行一次 `callback`。若适配器已停止或事件循环正在关闭则返回 `false`。
    pub fn add_idle<F>(&self, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        if self.state == AdaptorState::Stopped {
            return false;
        }
        self.context.event_loop().add_idle(callback)
    }

    /// ### English
    /// Runs `callback` on every event-loop iteration until it returns `false`.
    ///
    /// ### 中文
    /// 在每轮事件循环中执行 `callback`，直到其返回 `false`。
    pub fn add_repeating_idle<F>(&self, callback: F) -> bool
    where
        F: FnMut() -> bool + Send + 'static,
    {
        if self.state == AdaptorState::Stopped {
            return false;
        }
        self.context.event_loop().add_repeating_idle(callback)
    }

    /// ### English
    /// Handler run on the event thread when the scene core asks for a notification.
    ///
    /// ### 中文
    /// 场景核心请求通知时在事件线程上执行的处理函数。
    pub fn set_core_events_handler<F>(&self, handler: F)
    where
        F: FnMut() + Send + 'static,
    {
        *lock(&self.core_events) = Some(Box::new(handler));
    }

    fn invalid(&self, operation: &'static str) -> Error {
        Error::InvalidAdaptorState {
            operation,
            state: self.state.as_str(),
        }
    }
}

impl Drop for Adaptor {
    fn drop(&mut self) {
        self.stop();
    }
}
