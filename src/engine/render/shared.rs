//! ### English
//! State shared by [`ThreadController`](super::ThreadController) (event thread) and the render
//! thread, guarded by one mutex and one condition variable.
//!
//! The event thread only sets request flags here. The render thread consumes them at the start
//! of a frame and is the only side that touches graphics state.
//!
//! ### 中文
//! [`ThreadController`](super::ThreadController)（事件线程）与渲染线程共享的状态，
//! 由一个互斥锁和一个条件变量保护。
//!
//! 事件线程只在此设置请求标记；渲染线程在帧开始时消费它们，且只有渲染线程接触图形状态。

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use crossbeam_channel::Sender;
use tracing::{error, trace};

use crate::engine::error::Result;
use crate::engine::lock;
use crate::engine::surface::{RenderSurface, ThreadSynchronization};

use super::scene::{ThreadMode, UpdateMode};

/// ### English
/// Run count meaning "until paused".
///
/// ### 中文
/// 表示“持续运行直到暂停”的运行计数。
pub(crate) const CONTINUOUS: i32 = -1;
pub(crate) const ONCE: i32 = 1;

/// ### English
/// Cap on queued update requests. Two covers a request that arrives just before the event
/// thread handles a sleep request for the previous one.
///
/// ### 中文
/// 排队的 update 请求上限。取 2 可覆盖“请求恰好在处理上一次休眠请求之前到达”的情形。
pub const MAXIMUM_UPDATE_REQUESTS: u32 = 2;

/// ### English
/// Surface work handed from the event thread to the render thread.
///
/// ### 中文
/// 事件线程交给渲染线程的 surface 工作。
pub(crate) enum SurfaceRequest {
    /// ### English
    /// Render into `surface` from now on; the old surface is sent back.
    ///
    /// ### 中文
    /// 此后渲染到 `surface`；旧 surface 被送回。
    Replace {
        surface: RenderSurface,
        reply: Sender<Result<Option<RenderSurface>>>,
    },
    /// ### English
    /// Swap the native drawable under the current surface; replies whether the context was lost.
    ///
    /// ### 中文
    /// 替换当前 surface 之下的原生可绘制对象；回复上下文是否丢失。
    Recreate { reply: Sender<Result<bool>> },
    Delete { reply: Sender<Option<RenderSurface>> },
}

struct ControlState {
    run_count: i32,
    can_sleep: bool,
    pending_update: bool,
    use_elapsed_time_after_wait: bool,
    update_requests: u32,
    destroy: bool,
    surface_request: Option<SurfaceRequest>,
    surface_resized: bool,
    post_rendering: bool,
    update_mode: UpdateMode,
    thread_mode: ThreadMode,
    frame_duration: Duration,
}

/// ### English
/// Outcome of [`ControllerShared::wait_until_ready`].
///
/// ### 中文
/// [`ControllerShared::wait_until_ready`] 的结果。
#[derive(Clone, Copy, Debug)]
pub(crate) struct Ready {
    pub(crate) alive: bool,
    pub(crate) use_elapsed_time: bool,
    pub(crate) waited: bool,
}

pub(crate) struct ControllerShared {
    state: Mutex<ControlState>,
    condvar: Condvar,
    compositor_lock_timeout: Duration,
    context_losses: AtomicU32,
}

impl ControllerShared {
    pub(crate) fn new(
        thread_mode: ThreadMode,
        frame_duration: Duration,
        compositor_lock_timeout: Duration,
    ) -> Self {
        Self {
            state: Mutex::new(ControlState {
                run_count: 0,
                can_sleep: false,
                pending_update: false,
                use_elapsed_time_after_wait: false,
                update_requests: 0,
                destroy: false,
                surface_request: None,
                surface_resized: false,
                post_rendering: false,
                update_mode: UpdateMode::Normal,
                thread_mode,
                frame_duration,
            }),
            condvar: Condvar::new(),
            compositor_lock_timeout,
            context_losses: AtomicU32::new(0),
        }
    }

    #[inline]
    fn state(&self) -> MutexGuard<'_, ControlState> {
        lock(&self.state)
    }

    // ----- event thread -----

    pub(crate) fn run(&self, cycles: i32, use_elapsed_time: bool) {
        let mut state = self.state();
        state.run_count = cycles;
        state.can_sleep = false;
        state.use_elapsed_time_after_wait = use_elapsed_time;
        trace!(cycles, use_elapsed_time, "render thread run requested");
        self.condvar.notify_all();
    }

    pub(crate) fn pause(&self) {
        self.state().run_count = 0;
    }

    pub(crate) fn stop(&self) {
        self.state().destroy = true;
        self.condvar.notify_all();
    }

    /// ### English
    /// `true` if the render thread is not running continuously or was allowed to sleep.
    ///
    /// ### 中文
    /// 渲染线程未处于持续运行状态，或已被允许休眠时为 `true`。
    pub(crate) fn is_paused(&self) -> bool {
        let state = self.state();
        state.run_count != CONTINUOUS || state.can_sleep
    }

    /// ### English
    /// Counts one update request (up to [`MAXIMUM_UPDATE_REQUESTS`]).
    ///
    /// ### 中文
    /// 记录一次 update 请求（最多 [`MAXIMUM_UPDATE_REQUESTS`] 次）。
    pub(crate) fn add_update_request(&self) {
        let mut state = self.state();
        state.update_requests = (state.update_requests + 1).min(MAXIMUM_UPDATE_REQUESTS);
    }

    pub(crate) fn set_pending_update(&self) {
        self.state().pending_update = true;
        self.condvar.notify_all();
    }

    /// ### English
    /// Event-thread half of the sleep handshake: the render thread may sleep once every queued
    /// update request has been served.
    ///
    /// ### 中文
    /// 休眠握手的事件线程一侧：所有排队的 update 请求都被处理后，渲染线程才可休眠。
    pub(crate) fn process_sleep_request(&self) {
        let mut state = self.state();
        state.update_requests = state.update_requests.saturating_sub(1);
        if state.update_requests == 0 {
            state.can_sleep = true;
            trace!("render thread may sleep");
        }
    }

    pub(crate) fn update_requests(&self) -> u32 {
        self.state().update_requests
    }

    pub(crate) fn set_update_mode(&self, mode: UpdateMode) {
        self.state().update_mode = mode;
    }

    pub(crate) fn thread_mode(&self) -> ThreadMode {
        self.state().thread_mode
    }

    pub(crate) fn set_thread_mode(&self, mode: ThreadMode) {
        self.state().thread_mode = mode;
    }

    pub(crate) fn frame_duration(&self) -> Duration {
        self.state().frame_duration
    }

    pub(crate) fn set_frame_duration(&self, duration: Duration) {
        self.state().frame_duration = duration;
        self.condvar.notify_all();
    }

    /// ### English
    /// Hands a surface request to the render thread and releases any post-render wait.
    /// A request still pending is dropped, which disconnects its reply.
    ///
    /// ### 中文
    /// 把 surface 请求交给渲染线程，并解除任何 post-render 等待。
    /// 尚未处理的旧请求会被丢弃，其回复通道随之断开。
    pub(crate) fn submit_surface_request(&self, request: SurfaceRequest) {
        let mut state = self.state();
        state.post_rendering = false;
        if state.surface_request.replace(request).is_some() {
            error!("surface request superseded before the render thread handled it");
        }
        self.condvar.notify_all();
    }

    pub(crate) fn request_resize(&self) {
        let mut state = self.state();
        state.post_rendering = false;
        state.surface_resized = true;
        self.condvar.notify_all();
    }

    pub(crate) fn context_loss_count(&self) -> u32 {
        self.context_losses.load(Ordering::Acquire)
    }

    // ----- render thread -----

    /// ### English
    /// Blocks while the render thread is paused or asleep and nothing else needs attention.
    ///
    /// #### Parameters
    /// - `update_required`: The last frame asked for another one.
    ///
    /// ### 中文
    /// 在渲染线程被暂停或休眠、且没有其他事务需要处理时阻塞。
    ///
    /// #### 参数
    /// - `update_required`：上一帧要求继续渲染。
    pub(crate) fn wait_until_ready(&self, update_required: bool) -> Ready {
        let mut state = self.state();
        let mut use_elapsed_time = true;
        let mut waited = false;
        while (state.run_count == 0
            || (state.can_sleep && !update_required && !state.pending_update))
            && !state.destroy
            && state.surface_request.is_none()
            && !state.surface_resized
        {
            trace!(
                run_count = state.run_count,
                can_sleep = state.can_sleep,
                update_required,
                "render thread waiting"
            );
            waited = true;
            state = self
                .condvar
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
            if !state.use_elapsed_time_after_wait {
                use_elapsed_time = false;
            }
        }

        state.use_elapsed_time_after_wait = false;
        state.can_sleep = false;
        state.pending_update = false;
        if state.run_count > 0 {
            state.run_count -= 1;
        }
        Ready {
            alive: !state.destroy,
            use_elapsed_time,
            waited,
        }
    }

    pub(crate) fn take_surface_request(&self) -> Option<SurfaceRequest> {
        self.state().surface_request.take()
    }

    /// ### English
    /// Consumes the resize flag; `true` makes this a resizing frame.
    ///
    /// ### 中文
    /// 消费 resize 标记；返回 `true` 表示本帧为 resize 帧。
    pub(crate) fn take_resize(&self) -> bool {
        std::mem::take(&mut self.state().surface_resized)
    }

    pub(crate) fn take_update_mode(&self) -> UpdateMode {
        std::mem::take(&mut self.state().update_mode)
    }

    pub(crate) fn record_context_loss(&self) -> u32 {
        self.context_losses.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// ### English
    /// Sleeps until `deadline` unless stopped or handed a surface request or resize first.
    ///
    /// ### 中文
    /// 睡眠至 `deadline`；若期间收到停止、surface 请求或 resize 则提前返回。
    pub(crate) fn sleep_until(&self, deadline: Instant) {
        let mut state = self.state();
        loop {
            if state.destroy || state.surface_request.is_some() || state.surface_resized {
                return;
            }
            let now = Instant::now();
            if now >= deadline {
                return;
            }
            state = self
                .condvar
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }
}

impl ThreadSynchronization for ControllerShared {
    fn post_render_started(&self) {
        self.state().post_rendering = true;
    }

    fn post_render_wait_for_completion(&self) {
        let deadline = Instant::now() + self.compositor_lock_timeout;
        let mut state = self.state();
        while state.post_rendering
            && state.surface_request.is_none()
            && !state.surface_resized
            && !state.destroy
        {
            let now = Instant::now();
            if now >= deadline {
                error!(
                    timeout = ?self.compositor_lock_timeout,
                    "post-render completion was not signaled in time"
                );
                state.post_rendering = false;
                drop(state);
                if cfg!(debug_assertions) {
                    panic!("post-render completion timed out");
                }
                return;
            }
            state = self
                .condvar
                .wait_timeout(state, deadline - now)
                .unwrap_or_else(PoisonError::into_inner)
                .0;
        }
    }

    fn post_render_complete(&self) {
        self.state().post_rendering = false;
        self.condvar.notify_all();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::thread;

    use super::*;

    fn shared() -> Arc<ControllerShared> {
        Arc::new(ControllerShared::new(
            ThreadMode::Normal,
            Duration::from_millis(16),
            Duration::from_secs(5),
        ))
    }

    #[test]
    fn update_requests_are_capped_and_gate_sleep() {
        let shared = shared();
        for _ in 0..5 {
            shared.add_update_request();
        }
        assert_eq!(shared.update_requests(), MAXIMUM_UPDATE_REQUESTS);

        shared.run(CONTINUOUS, false);
        assert!(!shared.is_paused());
        shared.process_sleep_request();
        assert!(!shared.is_paused());
        shared.process_sleep_request();
        assert!(shared.is_paused());
    }

    #[test]
    fn run_once_counts_down() {
        let shared = shared();
        shared.run(ONCE, false);
        let ready = shared.wait_until_ready(true);
        assert!(ready.alive);
        assert!(!ready.waited);
        assert!(shared.is_paused());
    }

    #[test]
    fn stop_releases_a_waiting_render_thread() {
        let shared = shared();
        let waiter = {
            let shared = shared.clone();
            thread::spawn(move || shared.wait_until_ready(false))
        };
        thread::sleep(Duration::from_millis(20));
        shared.stop();
        let ready = waiter.join().unwrap();
        assert!(!ready.alive);
        assert!(ready.waited);
    }

    #[test]
    fn resize_interrupts_pacing_sleep() {
        let shared = shared();
        let sleeper = {
            let shared = shared.clone();
            thread::spawn(move || {
                let start = Instant::now();
                shared.sleep_until(start + Duration::from_secs(30));
                start.elapsed()
            })
        };
        thread::sleep(Duration::from_millis(20));
        shared.request_resize();
        assert!(sleeper.join().unwrap() < Duration::from_secs(5));
        assert!(shared.take_resize());
        assert!(!shared.take_resize());
    }

    #[test]
    fn post_render_wait_ends_on_completion() {
        let shared = shared();
        shared.post_render_started();
        let waiter = {
            let shared = shared.clone();
            thread::spawn(move || shared.post_render_wait_for_completion())
        };
        thread::sleep(Duration::from_millis(20));
        shared.post_render_complete();
        waiter.join().unwrap();
    }

    #[test]
    fn update_mode_is_consumed_once() {
        let shared = shared();
        shared.set_update_mode(UpdateMode::ForceRender);
        assert_eq!(shared.take_update_mode(), UpdateMode::ForceRender);
        assert_eq!(shared.take_update_mode(), UpdateMode::Normal);
    }
}
