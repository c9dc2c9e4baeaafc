use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU8, Ordering};
use std::thread;
use std::time::{Duration, Instant};

const EMPTY: u8 = 0;
const WRITING: u8 = 1;
const READY: u8 = 2;
const TAKEN: u8 = 3;
const CLOSED: u8 = 4;

/// ### English
/// Why [`OneShot::recv_timeout`] returned without a value.
///
/// ### 中文
/// [`OneShot::recv_timeout`] 未取得值的原因。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum RecvError {
    Timeout,
    /// ### English
    /// The sender gave up (for example the sending thread unwound) without a value.
    ///
    /// ### 中文
    /// 发送方在未发送值的情况下放弃（例如发送线程发生栈展开）。
    Closed,
}

/// ### English
/// One-shot, single-producer single-consumer handoff used for thread start handshakes.
///
/// The waiting thread is recorded at construction so the sender (or a closing sender) can
/// `unpark()` it.
///
/// ### 中文
/// 一次性单生产者/单消费者值传递，用于线程启动握手。
///
/// 构造时记录等待线程，发送方（或关闭方）可借此 `unpark()` 唤醒它。
pub(crate) struct OneShot<T> {
    /// ### English
    /// `EMPTY` → `WRITING` → `READY` → `TAKEN`, or `EMPTY` → `CLOSED`.
    ///
    /// ### 中文
    /// `EMPTY` → `WRITING` → `READY` → `TAKEN`，或 `EMPTY` → `CLOSED`。
    state: AtomicU8,
    value: UnsafeCell<MaybeUninit<T>>,
    waiter: thread::Thread,
}

unsafe impl<T: Send> Send for OneShot<T> {}
unsafe impl<T: Send> Sync for OneShot<T> {}

impl<T> OneShot<T> {
    #[inline]
    pub(crate) fn new(waiter: thread::Thread) -> Self {
        Self {
            state: AtomicU8::new(EMPTY),
            value: UnsafeCell::new(MaybeUninit::uninit()),
            waiter,
        }
    }

    /// ### English
    /// Sends the value. Returns `false` if a value was already sent or the channel was closed.
    ///
    /// ### 中文
    /// 发送值；若已发送过或已关闭则返回 `false`。
    pub(crate) fn send(&self, value: T) -> bool {
        if self
            .state
            .compare_exchange(EMPTY, WRITING, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            return false;
        }

        unsafe {
            (*self.value.get()).write(value);
        }
        self.state.store(READY, Ordering::Release);
        self.waiter.unpark();
        true
    }

    /// ### English
    /// Marks the channel as abandoned if nothing was sent yet.
    ///
    /// ### 中文
    /// 若尚未发送，则把通道标记为已放弃。
    pub(crate) fn close(&self) {
        if self
            .state
            .compare_exchange(EMPTY, CLOSED, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
        {
            self.waiter.unpark();
        }
    }

    #[inline]
    fn try_take(&self) -> Option<T> {
        self.state
            .compare_exchange(READY, TAKEN, Ordering::Acquire, Ordering::Relaxed)
            .ok()
            .map(|_| unsafe { (*self.value.get()).assume_init_read() })
    }

    /// ### English
    /// Waits up to `timeout` for the value.
    ///
    /// ### 中文
    /// 在 `timeout` 内等待接收值。
    pub(crate) fn recv_timeout(&self, timeout: Duration) -> Result<T, RecvError> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(value) = self.try_take() {
                return Ok(value);
            }
            if self.state.load(Ordering::Acquire) == CLOSED {
                return Err(RecvError::Closed);
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(RecvError::Timeout);
            }
            thread::park_timeout(deadline - now);
        }
    }
}

impl<T> Drop for OneShot<T> {
    fn drop(&mut self) {
        if *self.state.get_mut() == READY {
            unsafe {
                drop((*self.value.get()).assume_init_read());
            }
        }
    }
}

/// ### English
/// Closes the wrapped channel on drop unless a value was sent; lets the receiver notice a sender
/// that unwound before reporting.
///
/// ### 中文
/// drop 时若尚未发送值则关闭通道；使接收方能察觉在报告前就已栈展开的发送方。
pub(crate) struct CloseOnDrop<'a, T>(pub(crate) &'a OneShot<T>);

impl<T> Drop for CloseOnDrop<'_, T> {
    fn drop(&mut self) {
        self.0.close();
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[test]
    fn value_crosses_threads() {
        let slot = Arc::new(OneShot::new(thread::current()));
        let sender = slot.clone();
        let worker = thread::spawn(move || assert!(sender.send(7u32)));
        assert_eq!(slot.recv_timeout(Duration::from_secs(5)), Ok(7));
        worker.join().unwrap();
        assert!(!slot.send(8));
    }

    #[test]
    fn closed_sender_is_reported() {
        let slot = Arc::new(OneShot::<u32>::new(thread::current()));
        let sender = slot.clone();
        thread::spawn(move || {
            let _guard = CloseOnDrop(&sender);
        })
        .join()
        .unwrap();
        assert_eq!(
            slot.recv_timeout(Duration::from_secs(5)),
            Err(RecvError::Closed)
        );
    }

    #[test]
    fn times_out_without_sender() {
        let slot = OneShot::<()>::new(thread::current());
        assert_eq!(
            slot.recv_timeout(Duration::from_millis(10)),
            Err(RecvError::Timeout)
        );
    }
}
