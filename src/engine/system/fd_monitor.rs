//! ### English
//! Calls back on the event thread when a file descriptor becomes readable, writable or errors.
//!
//! ### 中文
//! 当文件描述符可读、可写或出错时，在事件线程上回调。

use std::ops::BitOr;
use std::os::fd::RawFd;
use std::sync::Weak;

use tracing::debug;

use crate::engine::error::{Error, Result};
use crate::engine::lock;

use super::event_loop::{EventLoopHandle, LoopShared, MonitorSlot};

/// ### English
/// Descriptor event mask.
///
/// ### 中文
/// 描述符事件掩码。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FdEvents(u32);

impl FdEvents {
    pub const NONE: FdEvents = FdEvents(0);
    pub const READABLE: FdEvents = FdEvents(1 << 0);
    pub const WRITABLE: FdEvents = FdEvents(1 << 1);
    pub const ERROR: FdEvents = FdEvents(1 << 2);

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: FdEvents) -> bool {
        self.0 & other.0 == other.0 && other.0 != 0
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub(crate) fn to_poll_events(self) -> libc::c_short {
        let mut events = 0;
        if self.contains(FdEvents::READABLE) {
            events |= libc::POLLIN;
        }
        if self.contains(FdEvents::WRITABLE) {
            events |= libc::POLLOUT;
        }
        events
    }

    pub(crate) fn from_poll_events(revents: libc::c_short) -> FdEvents {
        let mut events = FdEvents::NONE;
        if revents & libc::POLLIN != 0 {
            events = events | FdEvents::READABLE;
        }
        if revents & libc::POLLOUT != 0 {
            events = events | FdEvents::WRITABLE;
        }
        if revents & (libc::POLLERR | libc::POLLHUP | libc::POLLNVAL) != 0 {
            events = events | FdEvents::ERROR;
        }
        events
    }
}

impl BitOr for FdEvents {
    type Output = FdEvents;

    #[inline]
    fn bitor(self, rhs: FdEvents) -> FdEvents {
        FdEvents(self.0 | rhs.0)
    }
}

/// ### English
/// Registration of a descriptor on an [`EventLoop`](super::EventLoop). Dropping it unregisters.
///
/// The descriptor is borrowed, not owned: the caller keeps it open for the monitor's lifetime.
///
/// ### 中文
/// 在 [`EventLoop`](super::EventLoop) 上注册的描述符监视；drop 时自动注销。
///
/// 描述符只是借用而非持有：调用方需在监视器存活期间保持其打开。
pub struct FileDescriptorMonitor {
    id: u64,
    fd: RawFd,
    shared: Weak<LoopShared>,
}

impl FileDescriptorMonitor {
    /// ### English
    /// Starts monitoring `fd` for `events`. Errors are always reported, even if not requested.
    ///
    /// #### Parameters
    /// - `event_loop`: Loop whose thread will run `callback`.
    /// - `fd`: Descriptor to watch; must be non-negative.
    /// - `events`: Readable and/or writable interest.
    /// - `callback`: Receives the observed events and the descriptor.
    ///
    /// ### 中文
    /// 开始监视 `fd` 上的 `events`。错误事件始终会上报，即使未请求。
    ///
    /// #### 参数
    /// - `event_loop`：执行 `callback` 的事件循环。
    /// - `fd`：要监视的描述符；必须非负。
    /// - `events`：关注可读和/或可写。
    /// - `callback`：接收实际事件与描述符。
    pub fn new<F>(
        event_loop: &EventLoopHandle,
        fd: RawFd,
        events: FdEvents,
        callback: F,
    ) -> Result<Self>
    where
        F: FnMut(FdEvents, RawFd) + Send + 'static,
    {
        if fd < 0 {
            return Err(Error::InvalidFileDescriptor(fd));
        }
        if event_loop.is_quitting() {
            return Err(Error::EventLoopClosed);
        }

        let shared = &event_loop.shared;
        let id = shared.next_monitor_id();
        lock(&shared.monitors).insert(
            id,
            MonitorSlot {
                fd,
                events,
                callback: Some(Box::new(callback)),
            },
        );
        shared.wake();
        debug!(fd, ?events, "fd monitor registered");

        Ok(Self {
            id,
            fd,
            shared: std::sync::Arc::downgrade(shared),
        })
    }

    #[inline]
    pub fn fd(&self) -> RawFd {
        self.fd
    }
}

impl Drop for FileDescriptorMonitor {
    fn drop(&mut self) {
        let Some(shared) = self.shared.upgrade() else {
            return;
        };
        let removed = lock(&shared.monitors).remove(&self.id);
        shared.wake();
        drop(removed);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;
    use crate::engine::system::EventLoop;
    use crate::engine::system::eventfd::EventFd;

    #[test]
    fn negative_descriptor_is_rejected() {
        let event_loop = EventLoop::new().unwrap();
        let result = FileDescriptorMonitor::new(&event_loop.handle(), -1, FdEvents::READABLE, |_, _| {});
        assert!(matches!(result, Err(Error::InvalidFileDescriptor(-1))));
    }

    #[test]
    fn readable_descriptor_invokes_callback() {
        let mut event_loop = EventLoop::new().unwrap();
        let source = EventFd::new().unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = hits.clone();
        let monitor = FileDescriptorMonitor::new(
            &event_loop.handle(),
            source.as_raw_fd(),
            FdEvents::READABLE,
            move |events, _| {
                assert!(events.contains(FdEvents::READABLE));
                counter.fetch_add(1, Ordering::SeqCst);
            },
        )
        .unwrap();

        event_loop.run_once(Some(Duration::from_millis(5))).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 0);

        source.notify().unwrap();
        event_loop.run_once(Some(Duration::from_millis(100))).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
        source.drain().unwrap();

        drop(monitor);
        source.notify().unwrap();
        event_loop.run_once(Some(Duration::from_millis(5))).unwrap();
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn event_mask_mapping() {
        let events = FdEvents::from_poll_events(libc::POLLIN | libc::POLLHUP);
        assert!(events.contains(FdEvents::READABLE));
        assert!(events.contains(FdEvents::ERROR));
        assert!(!events.contains(FdEvents::WRITABLE));
        assert_eq!(
            (FdEvents::READABLE | FdEvents::WRITABLE).to_poll_events(),
            libc::POLLIN | libc::POLLOUT
        );
    }
}
