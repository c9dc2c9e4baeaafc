//! ### English
//! `poll(2)`-based event loop owned by the event thread.
//!
//! File descriptor monitors and idle callbacks registered from any thread are dispatched here, on
//! the thread that calls [`EventLoop::run`] / [`EventLoop::run_once`].
//!
//! ### 中文
//! 由事件线程持有、基于 `poll(2)` 的事件循环。
//!
//! 任意线程注册的文件描述符监视器与 idle 回调都会在调用 [`EventLoop::run`] /
//! [`EventLoop::run_once`] 的线程上分发执行。

use std::collections::{HashMap, VecDeque};
use std::io;
use std::marker::PhantomData;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossbeam_channel::{Receiver, Sender};
use tracing::{debug, trace, warn};

use crate::engine::error::Result;
use crate::engine::lock;

use super::eventfd::EventFd;
use super::fd_monitor::FdEvents;

pub(crate) type MonitorCallback = Box<dyn FnMut(FdEvents, RawFd) + Send + 'static>;

enum IdleTask {
    Once(Box<dyn FnOnce() + Send + 'static>),
    Repeating(Box<dyn FnMut() -> bool + Send + 'static>),
}

pub(crate) struct MonitorSlot {
    pub(crate) fd: RawFd,
    pub(crate) events: FdEvents,
    /// ### English
    /// `None` while the callback is executing on the loop thread.
    ///
    /// ### 中文
    /// 回调正在事件循环线程上执行时为 `None`。
    pub(crate) callback: Option<MonitorCallback>,
}

pub(crate) struct LoopShared {
    wake: EventFd,
    quitting: AtomicBool,
    next_monitor_id: AtomicU64,
    pub(crate) monitors: Mutex<HashMap<u64, MonitorSlot>>,
    idle_tx: Sender<IdleTask>,
}

impl LoopShared {
    pub(crate) fn wake(&self) {
        if let Err(err) = self.wake.notify() {
            warn!(%err, "failed to wake event loop");
        }
    }

    pub(crate) fn next_monitor_id(&self) -> u64 {
        self.next_monitor_id.fetch_add(1, Ordering::Relaxed)
    }
}

/// ### English
/// Event loop for the event thread. Not `Send`: it runs callbacks on the thread that created it.
///
/// ### 中文
/// 事件线程的事件循环。非 `Send`：回调总是在创建它的线程上执行。
pub struct EventLoop {
    shared: Arc<LoopShared>,
    idle_rx: Receiver<IdleTask>,
    /// ### English
    /// Idle tasks carried into the next iteration (repeating tasks that asked to stay).
    ///
    /// ### 中文
    /// 延续到下一轮的 idle 任务（要求保留的重复任务）。
    carried: VecDeque<IdleTask>,
    _not_send: PhantomData<*const ()>,
}

/// ### English
/// Cloneable, thread-safe handle to an [`EventLoop`].
///
/// ### 中文
/// 可克隆、线程安全的 [`EventLoop`] 句柄。
#[derive(Clone)]
pub struct EventLoopHandle {
    pub(crate) shared: Arc<LoopShared>,
}

impl EventLoop {
    /// ### English
    /// Creates an event loop with its own wakeup descriptor.
    ///
    /// ### 中文
    /// 创建事件循环及其专用的唤醒描述符。
    pub fn new() -> Result<Self> {
        let (idle_tx, idle_rx) = crossbeam_channel::unbounded();
        let shared = Arc::new(LoopShared {
            wake: EventFd::new()?,
            quitting: AtomicBool::new(false),
            next_monitor_id: AtomicU64::new(1),
            monitors: Mutex::new(HashMap::new()),
            idle_tx,
        });
        Ok(Self {
            shared,
            idle_rx,
            carried: VecDeque::new(),
            _not_send: PhantomData,
        })
    }

    pub fn handle(&self) -> EventLoopHandle {
        EventLoopHandle {
            shared: self.shared.clone(),
        }
    }

    /// ### English
    /// Runs until [`EventLoopHandle::quit`] is called.
    ///
    /// ### 中文
    /// 持续运行，直到调用 [`EventLoopHandle::quit`]。
    pub fn run(&mut self) -> Result<()> {
        while self.run_once(None)? {}
        debug!("event loop finished");
        Ok(())
    }

    /// ### English
    /// Performs one iteration: waits for descriptor activity (or `timeout`), dispatches ready
    /// monitors, then runs the idle tasks queued so far.
    ///
    /// Returns `false` once the loop has been asked to quit.
    ///
    /// #### Parameters
    /// - `timeout`: Maximum time to wait; `None` blocks until something happens. Pending idle
    ///   tasks make the wait non-blocking.
    ///
    /// ### 中文
    /// 执行一轮：等待描述符活动（或 `timeout` 超时），分发就绪的监视器，再执行已排队的 idle 任务。
    ///
    /// 一旦收到退出请求即返回 `false`。
    ///
    /// #### 参数
    /// - `timeout`：最长等待时间；`None` 表示一直阻塞直到有事件。存在待执行 idle 任务时不阻塞。
    pub fn run_once(&mut self, timeout: Option<Duration>) -> Result<bool> {
        if self.shared.quitting.load(Ordering::Acquire) {
            return Ok(false);
        }

        let has_idle = !self.carried.is_empty() || !self.idle_rx.is_empty();
        let timeout_ms = if has_idle {
            0
        } else {
            match timeout {
                Some(timeout) => timeout.as_millis().min(i32::MAX as u128) as i32,
                None => -1,
            }
        };

        let mut pollfds = Vec::with_capacity(8);
        let mut ids = Vec::with_capacity(8);
        pollfds.push(libc::pollfd {
            fd: self.shared.wake.as_raw_fd(),
            events: libc::POLLIN,
            revents: 0,
        });
        {
            let monitors = lock(&self.shared.monitors);
            for (id, slot) in monitors.iter() {
                pollfds.push(libc::pollfd {
                    fd: slot.fd,
                    events: slot.events.to_poll_events(),
                    revents: 0,
                });
                ids.push(*id);
            }
        }

        loop {
            let rc = unsafe {
                libc::poll(
                    pollfds.as_mut_ptr(),
                    pollfds.len() as libc::nfds_t,
                    timeout_ms,
                )
            };
            if rc >= 0 {
                break;
            }
            let err = io::Error::last_os_error();
            if err.kind() != io::ErrorKind::Interrupted {
                return Err(err.into());
            }
        }

        if pollfds[0].revents != 0 {
            if let Err(err) = self.shared.wake.drain() {
                warn!(%err, "failed to drain event loop wakeup descriptor");
            }
        }

        for (pollfd, id) in pollfds[1..].iter().zip(ids) {
            if pollfd.revents == 0 {
                continue;
            }
            let events = FdEvents::from_poll_events(pollfd.revents);
            self.dispatch_monitor(id, events, pollfd.fd);
        }

        self.run_idle_tasks();

        Ok(!self.shared.quitting.load(Ordering::Acquire))
    }

    fn dispatch_monitor(&self, id: u64, events: FdEvents, fd: RawFd) {
        let callback = lock(&self.shared.monitors)
            .get_mut(&id)
            .and_then(|slot| slot.callback.take());
        let Some(mut callback) = callback else {
            return;
        };

        trace!(fd, ?events, "dispatching fd monitor");
        callback(events, fd);

        /* ### English
         * The monitor may have been dropped inside its own callback; the callback is then released
         * here, outside the registry lock.
         * ### 中文
         * 监视器可能在自身回调中被销毁；此时回调在这里、于注册表锁之外释放。
         */
        let leftover = {
            let mut monitors = lock(&self.shared.monitors);
            match monitors.get_mut(&id) {
                Some(slot) if slot.callback.is_none() => {
                    slot.callback = Some(callback);
                    None
                }
                _ => Some(callback),
            }
        };
        drop(leftover);
    }

    fn run_idle_tasks(&mut self) {
        self.carried.extend(self.idle_rx.try_iter());
        let count = self.carried.len();
        let mut keep = Vec::new();
        for _ in 0..count {
            let Some(task) = self.carried.pop_front() else {
                break;
            };
            match task {
                IdleTask::Once(callback) => callback(),
                IdleTask::Repeating(mut callback) => {
                    if callback() {
                        keep.push(IdleTask::Repeating(callback));
                    }
                }
            }
        }
        self.carried.extend(keep);
    }
}

impl Drop for EventLoop {
    fn drop(&mut self) {
        self.shared.quitting.store(true, Ordering::Release);
    }
}

impl EventLoopHandle {
    /// ### English
    /// Queues `callback` to run once on the event thread.
    ///
    /// Returns `false` if the loop is shutting down; the callback is dropped in that case.
    ///
    /// ### 中文
    /// 将 `callback` 加入队列，在事件线程上执行一次。
    ///
    /// 若事件循环正在关闭则返回 `false`，此时回调会被丢弃。
    pub fn add_idle<F>(&self, callback: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.push_idle(IdleTask::Once(Box::new(callback)))
    }

    /// ### English
    /// Queues a callback that runs once per iteration until it returns `false`.
    ///
    /// ### 中文
    /// 加入一个每轮执行一次的回调，直到其返回 `false`。
    pub fn add_repeating_idle<F>(&self, callback: F) -> bool
    where
        F: FnMut() -> bool + Send + 'static,
    {
        self.push_idle(IdleTask::Repeating(Box::new(callback)))
    }

    /// ### English
    /// Asks the loop to stop after the current iteration.
    ///
    /// ### 中文
    /// 请求事件循环在本轮结束后停止。
    pub fn quit(&self) {
        self.shared.quitting.store(true, Ordering::Release);
        self.shared.wake();
    }

    pub fn is_quitting(&self) -> bool {
        self.shared.quitting.load(Ordering::Acquire)
    }

    fn push_idle(&self, task: IdleTask) -> bool {
        if self.is_quitting() {
            return false;
        }
        if self.shared.idle_tx.send(task).is_err() {
            return false;
        }
        self.shared.wake();
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;

    #[test]
    fn idle_runs_once_on_loop_thread() {
        let mut event_loop = EventLoop::new().unwrap();
        let handle = event_loop.handle();
        let hits = Arc::new(AtomicUsize::new(0));
        let loop_thread = std::thread::current().id();

        let counter = hits.clone();
        assert!(handle.add_idle(move || {
            assert_eq!(std::thread::current().id(), loop_thread);
            counter.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(event_loop.run_once(Some(Duration::from_millis(10))).unwrap());
        assert!(event_loop.run_once(Some(Duration::from_millis(10))).unwrap());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn repeating_idle_stops_when_it_returns_false() {
        let mut event_loop = EventLoop::new().unwrap();
        let runs = Arc::new(AtomicUsize::new(0));
        let counter = runs.clone();
        event_loop
            .handle()
            .add_repeating_idle(move || counter.fetch_add(1, Ordering::SeqCst) < 2);

        for _ in 0..5 {
            event_loop.run_once(Some(Duration::from_millis(1))).unwrap();
        }
        assert_eq!(runs.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn add_idle_fails_after_quit() {
        let mut event_loop = EventLoop::new().unwrap();
        let handle = event_loop.handle();
        handle.quit();
        assert!(!handle.add_idle(|| {}));
        assert!(!event_loop.run_once(None).unwrap());
    }

    #[test]
    fn quit_from_another_thread_unblocks_run() {
        let mut event_loop = EventLoop::new().unwrap();
        let handle = event_loop.handle();
        let quitter = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            handle.quit();
        });
        event_loop.run().unwrap();
        quitter.join().unwrap();
    }
}
