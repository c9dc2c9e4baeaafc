//! ### English
//! Event-thread plumbing: event loop, descriptor monitors and cross-thread trigger events.
//!
//! ### 中文
//! 事件线程基础设施：事件循环、描述符监视器与跨线程 trigger event。

mod event_loop;
pub(crate) mod eventfd;
mod fd_monitor;
mod trigger;
mod trigger_manager;

pub use event_loop::{EventLoop, EventLoopHandle};
pub use fd_monitor::{FdEvents, FileDescriptorMonitor};
pub use trigger::{TriggerEvent, TriggerHandle, TriggerId, TriggerOptions};
pub use trigger_manager::TriggerEventManager;
