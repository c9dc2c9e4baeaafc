//! ### English
//! Non-blocking wakeup descriptor (`eventfd` on Linux, a self-pipe elsewhere).
//!
//! ### 中文
//! 非阻塞唤醒描述符（Linux 上为 `eventfd`，其它平台为 self-pipe）。

use std::io;
use std::os::fd::{AsRawFd, FromRawFd, OwnedFd, RawFd};

/// ### English
/// A counter-style descriptor that becomes readable after [`EventFd::notify`].
///
/// ### 中文
/// 计数器式描述符：调用 [`EventFd::notify`] 后变为可读。
#[derive(Debug)]
pub(crate) struct EventFd {
    read: OwnedFd,
    #[cfg(not(target_os = "linux"))]
    write: OwnedFd,
}

impl EventFd {
    #[cfg(target_os = "linux")]
    pub(crate) fn new() -> io::Result<Self> {
        let fd = unsafe { libc::eventfd(0, libc::EFD_NONBLOCK | libc::EFD_CLOEXEC) };
        if fd < 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(Self {
            read: unsafe { OwnedFd::from_raw_fd(fd) },
        })
    }

    #[cfg(not(target_os = "linux"))]
    pub(crate) fn new() -> io::Result<Self> {
        let mut fds = [0 as libc::c_int; 2];
        if unsafe { libc::pipe(fds.as_mut_ptr()) } < 0 {
            return Err(io::Error::last_os_error());
        }
        let read = unsafe { OwnedFd::from_raw_fd(fds[0]) };
        let write = unsafe { OwnedFd::from_raw_fd(fds[1]) };
        for fd in [read.as_raw_fd(), write.as_raw_fd()] {
            unsafe {
                let flags = libc::fcntl(fd, libc::F_GETFL);
                libc::fcntl(fd, libc::F_SETFL, flags | libc::O_NONBLOCK);
                libc::fcntl(fd, libc::F_SETFD, libc::FD_CLOEXEC);
            }
        }
        Ok(Self { read, write })
    }

    /// ### English
    /// Descriptor to poll for readability.
    ///
    /// ### 中文
    /// 用于轮询可读事件的描述符。
    #[inline]
    pub(crate) fn as_raw_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    /// ### English
    /// Adds one to the counter, waking any poller.
    ///
    /// ### 中文
    /// 计数器加一，唤醒正在轮询的线程。
    pub(crate) fn notify(&self) -> io::Result<()> {
        let value: u64 = 1;
        let written = unsafe {
            libc::write(
                self.write_fd(),
                (&value as *const u64).cast(),
                std::mem::size_of::<u64>(),
            )
        };
        if written < 0 {
            return Err(io::Error::last_os_error());
        }
        if written as usize != std::mem::size_of::<u64>() {
            return Err(io::Error::new(
                io::ErrorKind::WriteZero,
                "short write to wakeup descriptor",
            ));
        }
        Ok(())
    }

    /// ### English
    /// Reads and resets the counter. Returns 0 when nothing was pending.
    ///
    /// ### 中文
    /// 读取并清空计数器；无待处理唤醒时返回 0。
    pub(crate) fn drain(&self) -> io::Result<u64> {
        let mut total = 0u64;
        loop {
            let mut value: u64 = 0;
            let read = unsafe {
                libc::read(
                    self.read.as_raw_fd(),
                    (&mut value as *mut u64).cast(),
                    std::mem::size_of::<u64>(),
                )
            };
            if read < 0 {
                let err = io::Error::last_os_error();
                return match err.kind() {
                    io::ErrorKind::WouldBlock => Ok(total),
                    io::ErrorKind::Interrupted => continue,
                    _ => Err(err),
                };
            }
            if read == 0 {
                return Ok(total);
            }
            total = total.saturating_add(value.max(1));

            /* ### English
             * An eventfd read resets the whole counter; a pipe may hold several writes.
             * ### 中文
             * eventfd 一次读取即清零计数；pipe 可能积压多次写入。
             */
            if cfg!(target_os = "linux") {
                return Ok(total);
            }
        }
    }

    #[cfg(target_os = "linux")]
    #[inline]
    fn write_fd(&self) -> RawFd {
        self.read.as_raw_fd()
    }

    #[cfg(not(target_os = "linux"))]
    #[inline]
    fn write_fd(&self) -> RawFd {
        self.write.as_raw_fd()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn notify_then_drain() {
        let fd = EventFd::new().unwrap();
        assert_eq!(fd.drain().unwrap(), 0);
        fd.notify().unwrap();
        fd.notify().unwrap();
        assert!(fd.drain().unwrap() >= 1);
        assert_eq!(fd.drain().unwrap(), 0);
    }
}
