//! ### English
//! Body of the render thread: initialization handshake, the per-frame loop and teardown.
//!
//! Frame order: wait until runnable, drain surface events, handle a surface request, update the
//! core, take a pending resize, pre-render, render, post-render, ask to sleep when idle, then
//! sleep until the next frame deadline.
//!
//! ### 中文
//! 渲染线程主体：初始化握手、逐帧循环与清理。
//!
//! 帧顺序：等待可运行、清空 surface 事件、处理 surface 请求、更新核心、取出待处理的 resize、
//! pre-render、渲染、post-render、空闲时请求休眠，然后睡眠到下一帧截止时间。

use std::sync::Arc;
use std::time::Instant;

use tracing::{error, info, trace, warn};

use crate::engine::error::Result;
use crate::engine::lockfree::{CloseOnDrop, OneShot};
use crate::engine::system::TriggerHandle;

use super::helper::RenderHelper;
use super::pacing::{FpsTracker, FramePacer};
use super::scene::{FrameInfo, RenderStatus, SceneCore, UpdateMode};
use super::shared::{ControllerShared, SurfaceRequest};

pub(crate) struct RenderThread {
    pub(crate) shared: Arc<ControllerShared>,
    pub(crate) helper: RenderHelper,
    pub(crate) core: Box<dyn SceneCore>,
    pub(crate) sleep_trigger: TriggerHandle,
    pub(crate) notification: Option<TriggerHandle>,
    pub(crate) fps: FpsTracker,
    pub(crate) force_clear: bool,
}

impl RenderThread {
    /// ### English
    /// Thread entry point. Reports initialization through `init`, then renders until stopped.
    ///
    /// ### 中文
    /// 线程入口。通过 `init` 报告初始化结果，然后持续渲染直到被停止。
    pub(crate) fn run(mut self, init: Arc<OneShot<Result<()>>>) {
        let guard = CloseOnDrop(&init);
        if let Err(err) = self.helper.initialize_graphics() {
            error!(%err, "render thread failed to initialize graphics");
            self.helper.shutdown();
            init.send(Err(err));
            return;
        }
        self.core.context_created();
        init.send(Ok(()));
        drop(guard);
        info!("render thread initialized");

        self.frame_loop();

        self.core.context_destroyed();
        self.helper.shutdown();
        info!("render thread destroyed");
    }

    fn frame_loop(&mut self) {
        let mut pacer = FramePacer::new();
        let mut update_required = true;
        let epoch = Instant::now();
        let mut last_frame = epoch;

        loop {
            let ready = self.shared.wait_until_ready(update_required);
            if ready.waited {
                pacer.reset();
            }
            if !ready.alive {
                break;
            }

            let frame_start = Instant::now();
            if ready.use_elapsed_time {
                self.fps.track(frame_start - last_frame);
            }
            last_frame = frame_start;

            self.helper.consume_events();
            let replacing = self.handle_surface_request();

            let frame = self.shared.frame_duration();
            let mode = self.shared.take_update_mode();
            let frame_time_ms = (frame_start - epoch).as_millis() as u64;
            let info = FrameInfo {
                frame_delta: pacer.frame_delta(frame, ready.use_elapsed_time),
                frame_time_ms,
                next_frame_time_ms: frame_time_ms + frame.as_millis() as u64,
                frames_dropped: pacer.frames_dropped(),
            };
            let update = self.core.update(&info);
            if update.needs_notification {
                self.notify_core_events();
            }

            let resizing = self.shared.take_resize();
            let damaged = self.core.damaged_rects();

            let mut render = RenderStatus::default();
            if mode == UpdateMode::SkipRender {
                trace!("render skipped for this frame");
            } else if self.helper.pre_render(resizing, &damaged) {
                let force_clear = std::mem::take(&mut self.force_clear) || mode == UpdateMode::ForceRender;
                let mut context = self.helper.render_context(force_clear);
                render = self.core.render(&mut context);
                if render.needs_post_render {
                    self.helper.post_render(replacing, resizing);
                }
            } else if !self.helper.has_surface() {
                trace!("no surface, frame not rendered");
            }

            update_required = update.keep_updating || render.needs_update;
            if !update_required && !self.sleep_trigger.trigger() {
                warn!("sleep trigger is gone");
            }

            let deadline = pacer.end_frame(frame, frame_start, Instant::now());
            self.shared.sleep_until(deadline);
        }
    }

    /// ### English
    /// Handles at most one surface request. Returns `true` if this frame renders into a
    /// replaced surface.
    ///
    /// ### 中文
    /// 最多处理一个 surface 请求；若本帧渲染到被替换后的 surface 则返回 `true`。
    fn handle_surface_request(&mut self) -> bool {
        let Some(request) = self.shared.take_surface_request() else {
            return false;
        };
        match request {
            SurfaceRequest::Replace { surface, reply } => {
                let result = self.helper.replace_surface(surface);
                let replaced = result.is_ok();
                if reply.send(result).is_err() {
                    warn!("surface replacement finished after the requester gave up");
                }
                replaced
            }
            SurfaceRequest::Recreate { reply } => {
                let result = self.helper.recreate_surface();
                if let Ok(true) = result {
                    self.context_lost();
                }
                let replaced = result.is_ok();
                if reply.send(result).is_err() {
                    warn!("surface recreation finished after the requester gave up");
                }
                replaced
            }
            SurfaceRequest::Delete { reply } => {
                let surface = self.helper.detach_surface();
                if reply.send(surface).is_err() {
                    warn!("surface deletion finished after the requester gave up");
                }
                false
            }
        }
    }

    fn context_lost(&mut self) {
        let count = self.shared.record_context_loss();
        warn!(count, "graphics context lost, reloading GPU resources");
        self.core.context_lost();
        self.helper.set_full_swap_next_frame();
        self.force_clear = true;
    }

    fn notify_core_events(&self) {
        if let Some(notification) = &self.notification {
            if !notification.trigger() {
                warn!("core events notification is gone");
            }
        }
    }
}
