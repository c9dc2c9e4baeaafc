use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

/// ### English
/// GPU completion fence. Clones observe the same signal.
///
/// ### 中文
/// GPU 完成 fence；克隆体观察同一个信号。
#[derive(Clone, Debug)]
pub struct GpuFence {
    signaled: Arc<AtomicBool>,
}

impl GpuFence {
    /// ### English
    /// A fence that has already completed (CPU-only work, nothing to wait for).
    ///
    /// ### 中文
    /// 已完成的 fence（纯 CPU 工作，无需等待）。
    pub fn signaled() -> Self {
        Self {
            signaled: Arc::new(AtomicBool::new(true)),
        }
    }

    pub fn pending() -> Self {
        Self {
            signaled: Arc::new(AtomicBool::new(false)),
        }
    }

    #[inline]
    pub fn signal(&self) {
        self.signaled.store(true, Ordering::Release);
    }

    #[inline]
    pub fn is_signaled(&self) -> bool {
        self.signaled.load(Ordering::Acquire)
    }
}
