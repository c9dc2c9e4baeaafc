/// ### English
/// `render_adaptor` crate root.
///
/// Binds a windowing system and a graphics backend to a scene core driven from a dedicated
/// render thread. The event thread owns the [`Adaptor`]; the render thread owns the graphics
/// context and the current [`RenderSurface`]. Everything lives under `engine`; the common
/// types are re-exported here.
///
/// ### 中文
/// `render_adaptor` 的 crate 根。
///
/// 把窗口系统与图形后端绑定到由独立渲染线程驱动的场景核心。事件线程持有 [`Adaptor`]，
/// 渲染线程持有图形上下文与当前的 [`RenderSurface`]。全部实现位于 `engine` 模块，
/// 常用类型在此重新导出。
pub mod engine;

pub use engine::adaptor::{Adaptor, AdaptorContext, AdaptorState};
pub use engine::config::EnvironmentOptions;
pub use engine::error::{Error, Result};
pub use engine::geometry::{PositionSize, Rect};
pub use engine::graphics::{GraphicsFactory, GraphicsInterface, HeadlessGraphicsFactory};
pub use engine::imaging::{ColorFormat, NativeImageSourceQueue};
pub use engine::render::{
    FrameInfo, RenderContext, RenderStatus, SceneCore, ThreadController, ThreadMode, UpdateMode,
    UpdateStatus,
};
pub use engine::surface::{RenderSurface, SurfaceProxy, SurfaceState, SurfaceType};
pub use engine::system::{EventLoop, EventLoopHandle, TriggerEvent, TriggerEventManager};
pub use engine::window_system::{HeadlessWindowSystem, WindowSystem};
