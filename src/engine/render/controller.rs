//! ### English
//! Event-thread controller of the render thread.
//!
//! Every method here only sets requests in the shared state and wakes the render thread. Graphics
//! calls happen on the render thread alone.
//!
//! ### 中文
//! 渲染线程在事件线程一侧的控制器。
//!
//! 这里的每个方法只在共享状态中设置请求并唤醒渲染线程；图形调用只发生在渲染线程上。

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{Receiver, RecvTimeoutError};
use tracing::{debug, error, info, warn};

use crate::engine::config::EnvironmentOptions;
use crate::engine::error::{Error, Result};
use crate::engine::graphics::{GraphicsInterface, ThreadAffineGraphics, ThreadViolations};
use crate::engine::lockfree::{OneShot, RecvError};
use crate::engine::surface::RenderSurface;
use crate::engine::system::{TriggerEvent, TriggerEventManager, TriggerHandle, TriggerOptions};

use super::helper::RenderHelper;
use super::pacing::{FpsTracker, frame_duration};
use super::render_thread::RenderThread;
use super::scene::{SceneCore, ThreadMode, UpdateMode};
use super::shared::{CONTINUOUS, ControllerShared, ONCE, SurfaceRequest};

/// ### English
/// What the render thread takes ownership of when it starts.
///
/// ### 中文
/// 渲染线程启动时接管的内容。
struct Payload {
    graphics: ThreadAffineGraphics,
    surface: Option<RenderSurface>,
    core: Box<dyn SceneCore>,
}

/// ### English
/// Owns the render thread and forwards event-thread requests to it.
///
/// ### 中文
/// 持有渲染线程，并把事件线程的请求转交给它。
pub struct ThreadController {
    shared: Arc<ControllerShared>,
    /// ### English
    /// `Some` until the render thread starts.
    ///
    /// ### 中文
    /// 渲染线程启动前为 `Some`。
    payload: Option<Payload>,
    thread: Option<thread::JoinHandle<()>>,
    sleep_trigger: TriggerEvent,
    notification: Option<TriggerHandle>,
    violations: ThreadViolations,
    running: bool,
    stopped: bool,
    start_timeout: Duration,
    surface_request_timeout: Duration,
    fps_tracking_seconds: u32,
}

impl ThreadController {
    /// ### English
    /// Prepares a controller. Nothing runs until [`ThreadController::start`].
    ///
    /// #### Parameters
    /// - `graphics`: Backend moved to the render thread; wrapped in a thread-affinity check.
    /// - `surface`: Initial surface, if any.
    /// - `core`: Scene core driven every frame.
    /// - `triggers`: Event-thread trigger manager used for the sleep handshake.
    /// - `options`: Refresh rate, thread mode, timeouts and FPS tracking.
    ///
    /// ### 中文
    /// 准备一个控制器；在 [`ThreadController::start`] 之前不会运行任何东西。
    ///
    /// #### 参数
    /// - `graphics`：移交给渲染线程的后端，外层套有线程亲和检查。
    /// - `surface`：初始 surface（可选）。
    /// - `core`：每帧驱动的场景核心。
    /// - `triggers`：事件线程的 trigger 管理器，用于休眠握手。
    /// - `options`：刷新率、线程模式、超时与 FPS 统计。
    pub fn new(
        graphics: Box<dyn GraphicsInterface>,
        surface: Option<RenderSurface>,
        core: Box<dyn SceneCore>,
        triggers: &TriggerEventManager,
        options: &EnvironmentOptions,
    ) -> Self {
        let shared = Arc::new(ControllerShared::new(
            options.thread_mode(),
            frame_duration(options.render_refresh_rate()),
            options.compositor_lock_timeout(),
        ));
        let weak = Arc::downgrade(&shared);
        let sleep_trigger = triggers.create_trigger_event(
            move || {
                if let Some(shared) = weak.upgrade() {
                    shared.process_sleep_request();
                }
            },
            TriggerOptions::KeepAliveAfterTrigger,
        );
        let graphics = ThreadAffineGraphics::new(graphics);
        let violations = graphics.violations();

        Self {
            shared,
            payload: Some(Payload {
                graphics,
                surface,
                core,
            }),
            thread: None,
            sleep_trigger,
            notification: None,
            violations,
            running: false,
            stopped: false,
            start_timeout: options.start_timeout(),
            surface_request_timeout: options.surface_request_timeout(),
            fps_tracking_seconds: options.fps_tracking_seconds(),
        }
    }

    /// ### English
    /// Trigger fired when the core asks for an event-thread notification. Takes effect at start.
    ///
    /// ### 中文
    /// 核心请求事件线程通知时触发的 trigger；在启动时生效。
    pub fn set_core_events_notification(&mut self, notification: Option<TriggerHandle>) {
        self.notification = notification;
    }

    /// ### English
    /// Spawns the render thread and blocks until it has a graphics context, then lets it run.
    ///
    /// ### 中文
    /// 创建渲染线程并阻塞等待其建立图形上下文，然后令其开始运行。
    pub fn start(&mut self) -> Result<()> {
        if self.thread.is_some() {
            return Err(Error::RenderThreadStart("render thread already running".into()));
        }
        let Some(payload) = self.payload.take() else {
            return Err(Error::RenderThreadStopped);
        };

        let render = RenderThread {
            shared: self.shared.clone(),
            helper: RenderHelper::new(payload.graphics, payload.surface, self.shared.clone()),
            core: payload.core,
            sleep_trigger: self.sleep_trigger.handle(),
            notification: self.notification.clone(),
            fps: FpsTracker::new(self.fps_tracking_seconds),
            force_clear: false,
        };

        let init = Arc::new(OneShot::new(thread::current()));
        let init_for_thread = init.clone();
        let thread = thread::Builder::new()
            .name("render".into())
            .spawn(move || render.run(init_for_thread))
            .map_err(|err| Error::RenderThreadStart(err.to_string()))?;

        match init.recv_timeout(self.start_timeout) {
            Ok(Ok(())) => {
                self.thread = Some(thread);
                self.running = true;
                self.run_for_mode(false);
                info!("render thread started");
                Ok(())
            }
            Ok(Err(err)) => {
                join(thread);
                self.stopped = true;
                Err(err)
            }
            Err(RecvError::Closed) => {
                join(thread);
                self.stopped = true;
                Err(Error::RenderThreadStart(
                    "render thread exited during initialization".into(),
                ))
            }
            Err(RecvError::Timeout) => {
                self.shared.stop();
                join(thread);
                self.stopped = true;
                Err(Error::Timeout("render thread start"))
            }
        }
    }

    #[inline]
    pub fn is_started(&self) -> bool {
        self.thread.is_some()
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn pause(&mut self) {
        if !self.is_started() {
            return;
        }
        self.running = false;
        self.shared.pause();
        debug!("render thread paused");
    }

    /// ### English
    /// Resumes a paused render thread; the first frame is force-rendered with animation time
    /// progressed across the pause.
    ///
    /// ### 中文
    /// 恢复已暂停的渲染线程；第一帧强制渲染，并推进暂停期间的动画时间。
    pub fn resume(&mut self) {
        if !self.is_started() || self.running || !self.shared.is_paused() {
            return;
        }
        self.shared.set_update_mode(UpdateMode::ForceRender);
        self.run_for_mode(true);
        self.running = true;
        debug!("render thread resumed");
    }

    /// ### English
    /// Stops and joins the render thread. Interrupts any wait, including frame pacing.
    /// Idempotent.
    ///
    /// ### 中文
    /// 停止并 join 渲染线程；会打断任何等待（包括帧节奏睡眠）。可重复调用。
    pub fn stop(&mut self) {
        self.shared.stop();
        if let Some(thread) = self.thread.take() {
            join(thread);
            info!("render thread stopped");
        }
        self.payload = None;
        self.running = false;
        self.stopped = true;
    }

    /// ### English
    /// Asks for frames until the core reports it no longer needs updates.
    ///
    /// ### 中文
    /// 请求渲染，直到核心报告不再需要更新。
    pub fn request_update(&self) {
        self.shared.add_update_request();
        if self.running && self.shared.is_paused() {
            self.run_for_mode(false);
        }
        self.shared.set_pending_update();
    }

    /// ### English
    /// Asks for exactly one frame, even while paused.
    ///
    /// ### 中文
    /// 请求恰好一帧，即使处于暂停状态。
    pub fn request_update_once(&self, mode: UpdateMode) {
        self.shared.add_update_request();
        self.shared.set_update_mode(mode);
        if self.is_started() && self.shared.is_paused() {
            self.shared.run(ONCE, false);
        }
    }

    /// ### English
    /// Moves rendering to `surface`. Blocks until the render thread hands back the previous
    /// surface (graphics surface destroyed) or the surface request timeout expires.
    ///
    /// ### 中文
    /// 把渲染切换到 `surface`。阻塞直到渲染线程交回旧 surface（其图形 surface 已销毁），
    /// 或 surface 请求超时。
    pub fn replace_surface(&mut self, surface: RenderSurface) -> Result<Option<RenderSurface>> {
        if let Some(payload) = self.payload.as_mut() {
            return Ok(payload.surface.replace(surface));
        }
        if !self.is_started() {
            return Err(Error::RenderThreadStopped);
        }
        let (reply, response) = crossbeam_channel::bounded(1);
        self.shared
            .submit_surface_request(SurfaceRequest::Replace { surface, reply });
        self.await_reply(&response, "surface replacement")?
    }

    /// ### English
    /// Replaces the native drawable under the current surface (resize-by-recreate, rotation,
    /// pixmap swap). Returns `true` if the graphics context was lost and resources reloaded.
    ///
    /// ### 中文
    /// 替换当前 surface 之下的原生可绘制对象（重建式缩放、旋转、pixmap 交换）。
    /// 若图形上下文丢失并已重新加载资源则返回 `true`。
    pub fn recreate_surface(&self) -> Result<bool> {
        if !self.is_started() {
            return Err(Error::RenderThreadStopped);
        }
        let (reply, response) = crossbeam_channel::bounded(1);
        self.shared
            .submit_surface_request(SurfaceRequest::Recreate { reply });
        self.await_reply(&response, "surface recreation")?
    }

    /// ### English
    /// Detaches the current surface and returns it with its graphics surface destroyed.
    ///
    /// ### 中文
    /// 解除当前 surface 并将其返回（图形 surface 已销毁）。
    pub fn delete_surface(&mut self) -> Result<Option<RenderSurface>> {
        if let Some(payload) = self.payload.as_mut() {
            return Ok(payload.surface.take());
        }
        if !self.is_started() {
            return Err(Error::RenderThreadStopped);
        }
        let (reply, response) = crossbeam_channel::bounded(1);
        self.shared
            .submit_surface_request(SurfaceRequest::Delete { reply });
        self.await_reply(&response, "surface deletion")
    }

    /// ### English
    /// The next frame is a resizing frame; the surface applies its pending geometry.
    ///
    /// ### 中文
    /// 下一帧为 resize 帧；surface 会应用其待处理的几何变化。
    pub fn resize_surface(&self) {
        self.shared.request_resize();
    }

    /// ### English
    /// Renders once every `frames_per_render` display refreshes.
    ///
    /// ### 中文
    /// 每 `frames_per_render` 次显示刷新渲染一次。
    pub fn set_render_refresh_rate(&self, frames_per_render: u32) {
        let duration = frame_duration(frames_per_render);
        self.shared.set_frame_duration(duration);
        debug!(frames_per_render, ?duration, "render refresh rate set");
    }

    pub fn render_frame_duration(&self) -> Duration {
        self.shared.frame_duration()
    }

    pub fn thread_mode(&self) -> ThreadMode {
        self.shared.thread_mode()
    }

    pub fn set_thread_mode(&mut self, mode: ThreadMode) {
        if self.shared.thread_mode() == mode {
            return;
        }
        self.shared.set_thread_mode(mode);
        if self.running {
            self.run_for_mode(false);
        }
        debug!(?mode, "render thread mode changed");
    }

    /// ### English
    /// Number of context losses the render thread recovered from.
    ///
    /// ### 中文
    /// 渲染线程已处理的上下文丢失次数。
    pub fn context_loss_count(&self) -> u32 {
        self.shared.context_loss_count()
    }

    /// ### English
    /// Counter of graphics calls refused because they came from a thread other than the
    /// render thread.
    ///
    /// ### 中文
    /// 因来自渲染线程以外的线程而被拒绝的图形调用计数。
    pub fn graphics_violations(&self) -> ThreadViolations {
        self.violations.clone()
    }

    pub fn pending_update_requests(&self) -> u32 {
        self.shared.update_requests()
    }

    fn run_for_mode(&self, use_elapsed_time: bool) {
        match self.shared.thread_mode() {
            ThreadMode::Normal => self.shared.run(CONTINUOUS, use_elapsed_time),
            ThreadMode::RunIfRequested => self.shared.run(ONCE, use_elapsed_time),
        }
    }

    fn await_reply<T>(&self, response: &Receiver<T>, operation: &'static str) -> Result<T> {
        match response.recv_timeout(self.surface_request_timeout) {
            Ok(value) => Ok(value),
            Err(RecvTimeoutError::Timeout) => {
                error!(operation, timeout = ?self.surface_request_timeout, "render thread did not answer");
                Err(Error::Timeout(operation))
            }
            Err(RecvTimeoutError::Disconnected) => {
                warn!(operation, "render thread dropped the request");
                Err(Error::RenderThreadStopped)
            }
        }
    }
}

impl Drop for ThreadController {
    fn drop(&mut self) {
        if !self.stopped {
            self.stop();
        }
    }
}

fn join(thread: thread::JoinHandle<()>) {
    if thread.join().is_err() {
        error!("render thread panicked");
    }
}
