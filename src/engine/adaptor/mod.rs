//! ### English
//! Event-thread facade over the render thread.
//!
//! - [`AdaptorContext`]: the collaborators an adaptor is built from, passed in explicitly.
//! - [`Adaptor`]: lifecycle (`Created → Running ⇄ Paused → Stopped`) and surface requests.
//!
//! ### 中文
//! 渲染线程在事件线程一侧的门面。
//!
//! - [`AdaptorContext`]：构建适配器所需的协作对象，显式传入。
//! - [`Adaptor`]：生命周期（`Created → Running ⇄ Paused → Stopped`）与 surface 请求。

mod context;
mod lifecycle;

pub use context::AdaptorContext;
pub use lifecycle::{Adaptor, AdaptorState};
