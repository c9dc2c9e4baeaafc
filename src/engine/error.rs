//! ### English
//! Crate-wide error type.
//!
//! Programming errors that a C++ adaptor would `assert` on (out-of-order surface calls, double
//! destroy, invalid descriptors, cross-thread graphics calls) are reported here as values.
//!
//! ### 中文
//! crate 统一的错误类型。
//!
//! C++ 适配层中以 `assert` 处理的编程错误（surface 调用顺序错误、重复销毁、无效描述符、
//! 跨线程图形调用）在这里都以错误值的形式返回。

use std::thread::ThreadId;

use thiserror::Error;

use crate::engine::surface::SurfaceState;

/// ### English
/// Errors returned by the adaptor core.
///
/// ### 中文
/// 适配层核心返回的错误。
#[derive(Error, Debug)]
pub enum Error {
    #[error("invalid file descriptor: {0}")]
    InvalidFileDescriptor(i32),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("graphics error: {0}")]
    Graphics(String),

    #[error("windowing system error: {0}")]
    WindowSystem(String),

    #[error("{operation} is not allowed while the surface is {state:?}")]
    InvalidSurfaceState {
        operation: &'static str,
        state: SurfaceState,
    },

    #[error("graphics already initialized for this surface")]
    AlreadyInitialized,

    #[error("surface already destroyed")]
    AlreadyDestroyed,

    #[error("graphics call `{call}` from {caller:?}, but the context belongs to {owner:?}")]
    WrongThread {
        call: &'static str,
        owner: ThreadId,
        caller: ThreadId,
    },

    #[error("adaptor cannot {operation} while {state}")]
    InvalidAdaptorState {
        operation: &'static str,
        state: &'static str,
    },

    #[error("render thread failed to start: {0}")]
    RenderThreadStart(String),

    #[error("timed out waiting for {0}")]
    Timeout(&'static str),

    #[error("render thread is not running")]
    RenderThreadStopped,

    #[error("buffer does not belong to this queue or is no longer dequeued")]
    UnknownBuffer,

    #[error("{0} buffer(s) still dequeued")]
    BuffersInFlight(usize),

    #[error("image queue has no image yet")]
    NotInitialized,

    #[error("event loop is shutting down")]
    EventLoopClosed,
}

/// ### English
/// Result alias used throughout the crate.
///
/// ### 中文
/// crate 内通用的 Result 别名。
pub type Result<T> = std::result::Result<T, Error>;
