//! ### English
//! Render thread: scene core hooks, frame pacing and the controller the event thread uses.
//!
//! ### 中文
//! 渲染线程：场景核心钩子、帧节奏控制，以及事件线程使用的控制器。

mod controller;
mod helper;
mod pacing;
mod render_thread;
mod scene;
mod shared;

pub use controller::ThreadController;
pub use pacing::{DEFAULT_FRAME_DURATION, frame_duration};
pub use scene::{
    FrameInfo, RenderContext, RenderStatus, SceneCore, ThreadMode, UpdateMode, UpdateStatus,
};
pub use shared::MAXIMUM_UPDATE_REQUESTS;
