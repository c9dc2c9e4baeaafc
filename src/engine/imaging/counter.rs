//! ### English
//! Process-wide count of allocated native buffers, for leak diagnosis.
//!
//! ### 中文
//! 进程级的已分配 native buffer 计数，用于泄漏诊断。

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::trace;

static LIVE_NATIVE_BUFFERS: AtomicUsize = AtomicUsize::new(0);

/// ### English
/// Native buffers currently allocated by every queue in the process.
///
/// ### 中文
/// 进程内所有队列当前已分配的 native buffer 数量。
pub fn live_native_buffers() -> usize {
    LIVE_NATIVE_BUFFERS.load(Ordering::Relaxed)
}

/// ### English
/// Counts one buffer for as long as it lives.
///
/// ### 中文
/// 在存活期间为一个 buffer 计数。
#[derive(Debug)]
pub(crate) struct LiveBuffer(());

impl LiveBuffer {
    pub(crate) fn new() -> Self {
        let live = LIVE_NATIVE_BUFFERS.fetch_add(1, Ordering::Relaxed) + 1;
        trace!(live, "native buffer allocated");
        Self(())
    }
}

impl Drop for LiveBuffer {
    fn drop(&mut self) {
        let live = LIVE_NATIVE_BUFFERS.fetch_sub(1, Ordering::Relaxed) - 1;
        trace!(live, "native buffer freed");
    }
}
