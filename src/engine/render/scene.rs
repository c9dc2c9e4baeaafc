//! ### English
//! Hooks the render thread drives on the scene-graph core.
//!
//! ### 中文
//! 渲染线程驱动场景核心所用的钩子。

use crate::engine::geometry::{PositionSize, Rect};
use crate::engine::graphics::GraphicsInterface;

/// ### English
/// How the render thread schedules frames.
///
/// ### 中文
/// 渲染线程的帧调度方式。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ThreadMode {
    /// ### English
    /// Render continuously, paced by the frame duration.
    ///
    /// ### 中文
    /// 按帧间隔持续渲染。
    #[default]
    Normal,
    /// ### English
    /// Render one frame per `request_update` / `request_update_once`.
    ///
    /// ### 中文
    /// 每次 `request_update` / `request_update_once` 渲染一帧。
    RunIfRequested,
}

/// ### English
/// Per-request override of the next frame.
///
/// ### 中文
/// 针对下一帧的单次覆盖。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum UpdateMode {
    #[default]
    Normal,
    /// ### English
    /// Update the scene but do not render or present.
    ///
    /// ### 中文
    /// 更新场景但不渲染、不呈现。
    SkipRender,
    /// ### English
    /// Render with a full clear even if nothing changed.
    ///
    /// ### 中文
    /// 即使没有变化也做一次完整清屏渲染。
    ForceRender,
}

/// ### English
/// Timing passed to [`SceneCore::update`].
///
/// ### 中文
/// 传给 [`SceneCore::update`] 的时间信息。
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct FrameInfo {
    /// ### English
    /// Seconds of animation progression for this frame; `0.0` right after a wait that asked
    /// for no progression.
    ///
    /// ### 中文
    /// 本帧的动画推进秒数；在不要求推进的等待之后为 `0.0`。
    pub frame_delta: f32,
    pub frame_time_ms: u64,
    pub next_frame_time_ms: u64,
    /// ### English
    /// Frames skipped by pacing catch-up before this one.
    ///
    /// ### 中文
    /// 在本帧之前因追帧而跳过的帧数。
    pub frames_dropped: u32,
}

/// ### English
/// Result of [`SceneCore::update`].
///
/// ### 中文
/// [`SceneCore::update`] 的结果。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct UpdateStatus {
    /// ### English
    /// More frames are needed (animations running).
    ///
    /// ### 中文
    /// 还需要后续帧（动画进行中）。
    pub keep_updating: bool,
    /// ### English
    /// Run the core-events handler on the event thread.
    ///
    /// ### 中文
    /// 需要在事件线程上执行核心事件处理器。
    pub needs_notification: bool,
}

/// ### English
/// Result of [`SceneCore::render`].
///
/// ### 中文
/// [`SceneCore::render`] 的结果。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RenderStatus {
    /// ### English
    /// Something was drawn and must be presented.
    ///
    /// ### 中文
    /// 已有绘制内容，需要呈现。
    pub needs_post_render: bool,
    pub needs_update: bool,
}

/// ### English
/// What the core may use while rendering one frame. Lives only between pre-render and
/// post-render on the render thread.
///
/// ### 中文
/// 核心在渲染一帧时可使用的内容；只存在于渲染线程的 pre-render 与 post-render 之间。
pub struct RenderContext<'a> {
    pub graphics: &'a mut dyn GraphicsInterface,
    /// ### English
    /// Clear the whole surface before drawing (resume, forced render, context loss).
    ///
    /// ### 中文
    /// 绘制前清除整个 surface（恢复、强制渲染、上下文丢失之后）。
    pub force_clear: bool,
    /// ### English
    /// Area repainted this frame; `None` for the whole surface.
    ///
    /// ### 中文
    /// 本帧重绘的区域；`None` 表示整个 surface。
    pub clipping_rect: Option<Rect>,
    pub surface_rect: PositionSize,
}

/// ### English
/// Scene-graph core driven by the render thread. Implementations must not spawn threads or
/// keep the graphics interface beyond a call.
///
/// ### 中文
/// 由渲染线程驱动的场景核心。实现不得创建线程，也不得在调用之外持有图形接口。
pub trait SceneCore: Send {
    fn context_created(&mut self) {}

    fn context_destroyed(&mut self) {}

    /// ### English
    /// Every GPU resource created so far is invalid and must be reloaded.
    ///
    /// ### 中文
    /// 此前创建的所有 GPU 资源均已失效，必须重新加载。
    fn context_lost(&mut self) {}

    fn update(&mut self, frame: &FrameInfo) -> UpdateStatus;

    /// ### English
    /// Areas changed since the last frame. Empty means unknown.
    ///
    /// ### 中文
    /// 自上一帧以来变化的区域；为空表示未知。
    fn damaged_rects(&mut self) -> Vec<Rect> {
        Vec::new()
    }

    fn render(&mut self, context: &mut RenderContext<'_>) -> RenderStatus;
}
