/// ### English
/// Adaptor internals: event thread plumbing, graphics and windowing contracts, render surfaces,
/// image queues and the render thread.
///
/// ### 中文
/// 适配层内部模块：事件线程设施、图形与窗口契约、render surface、图像队列以及渲染线程。
pub mod adaptor;
pub mod config;
pub mod error;
pub mod flags;
pub mod geometry;
pub mod graphics;
pub mod imaging;
pub(crate) mod lockfree;
pub mod render;
pub mod surface;
pub mod system;
pub mod window_system;

use std::sync::{Mutex, MutexGuard, PoisonError};

/// ### English
/// Locks `mutex`, recovering the guard if a panicking thread poisoned it.
///
/// ### 中文
/// 锁定 `mutex`；若被 panic 的线程毒化，则恢复其守卫。
#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
