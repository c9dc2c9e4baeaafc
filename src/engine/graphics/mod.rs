//! ### English
//! Graphics backend contract (EGL + GLES style) used by render surfaces and the render thread.
//!
//! Every method must be called on the thread that initialized the backend; wrap backends in
//! [`ThreadAffineGraphics`] to have that checked.
//!
//! ### 中文
//! render surface 与渲染线程使用的图形后端契约（EGL + GLES 风格）。
//!
//! 所有方法都必须在初始化后端的线程上调用；用 [`ThreadAffineGraphics`] 包装后端即可自动检查。

mod factory;
mod fence;
mod headless;
mod thread_affine;

pub use factory::{GraphicsFactory, HeadlessGraphicsFactory};
pub use fence::GpuFence;
pub use headless::{GraphicsCall, HeadlessControl, HeadlessGraphics};
pub use thread_affine::{ThreadAffineGraphics, ThreadViolations};

use crate::engine::config::EnvironmentOptions;
use crate::engine::error::Result;
use crate::engine::geometry::Rect;
use crate::engine::imaging::ImageView;
use crate::engine::window_system::NativeHandle;

/// ### English
/// Backend surface handle (`EGLSurface`).
///
/// ### 中文
/// 后端 surface 句柄（`EGLSurface`）。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SurfaceHandle(pub u64);

/// ### English
/// Backend texture name.
///
/// ### 中文
/// 后端纹理名。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// ### English
/// Color depth of a drawable.
///
/// ### 中文
/// 可绘制对象的颜色深度。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorDepth {
    /// ### English
    /// RGB888, opaque.
    ///
    /// ### 中文
    /// RGB888，不透明。
    Depth24,
    /// ### English
    /// RGBA8888, transparent.
    ///
    /// ### 中文
    /// RGBA8888，透明。
    Depth32,
}

impl ColorDepth {
    #[inline]
    pub fn from_transparency(transparent: bool) -> Self {
        if transparent {
            ColorDepth::Depth32
        } else {
            ColorDepth::Depth24
        }
    }
}

/// ### English
/// Which kind of drawable a config is chosen for.
///
/// ### 中文
/// 选择配置时对应的可绘制对象类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigKind {
    Window,
    Pixmap,
}

/// ### English
/// Context requirements passed to [`GraphicsInterface::initialize`].
///
/// ### 中文
/// 传给 [`GraphicsInterface::initialize`] 的上下文需求。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GraphicsConfig {
    pub depth_buffer: bool,
    pub stencil_buffer: bool,
    pub multi_sampling_level: i32,
}

impl GraphicsConfig {
    pub fn from_options(options: &EnvironmentOptions) -> Self {
        Self {
            depth_buffer: options.depth_buffer_required(),
            stencil_buffer: options.stencil_buffer_required(),
            multi_sampling_level: options.multi_sampling_level(),
        }
    }
}

impl Default for GraphicsConfig {
    fn default() -> Self {
        Self::from_options(&EnvironmentOptions::default())
    }
}

/// ### English
/// Optional features reported by a backend.
///
/// ### 中文
/// 后端报告的可选特性。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GraphicsCapabilities {
    /// ### English
    /// Buffer age + damage-region swaps are available.
    ///
    /// ### 中文
    /// 支持 buffer age 与带脏区的交换。
    pub partial_update: bool,
}

/// ### English
/// Outcome of replacing a surface's native drawable.
///
/// ### 中文
/// 替换 surface 原生可绘制对象的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SurfaceReplacement {
    pub handle: SurfaceHandle,
    /// ### English
    /// The context had to be recreated; every GPU resource made so far is invalid.
    ///
    /// ### 中文
    /// 上下文被重建；此前创建的所有 GPU 资源均已失效。
    pub context_lost: bool,
}

/// ### English
/// Graphics backend. Implementations are moved to, and used only on, the render thread.
///
/// ### 中文
/// 图形后端。实现会被移交到渲染线程，并且只在该线程上使用。
pub trait GraphicsInterface: Send {
    /// ### English
    /// Opens the display connection. Tags the calling thread as the context owner.
    ///
    /// ### 中文
    /// 打开 display 连接，并把调用线程标记为上下文所有者。
    fn initialize(&mut self, config: &GraphicsConfig) -> Result<()>;

    fn choose_config(&mut self, kind: ConfigKind, depth: ColorDepth) -> Result<()>;

    fn create_context(&mut self) -> Result<()>;

    fn create_window_surface(
        &mut self,
        window: NativeHandle,
        depth: ColorDepth,
    ) -> Result<SurfaceHandle>;

    fn create_pixmap_surface(
        &mut self,
        pixmap: NativeHandle,
        depth: ColorDepth,
    ) -> Result<SurfaceHandle>;

    /// ### English
    /// Destroys `old`, creates a surface for `window` and makes it current.
    ///
    /// ### 中文
    /// 销毁 `old`，为 `window` 创建新 surface 并设为当前。
    fn replace_window_surface(
        &mut self,
        old: SurfaceHandle,
        window: NativeHandle,
    ) -> Result<SurfaceReplacement>;

    fn replace_pixmap_surface(
        &mut self,
        old: SurfaceHandle,
        pixmap: NativeHandle,
    ) -> Result<SurfaceReplacement>;

    fn destroy_surface(&mut self, surface: SurfaceHandle) -> Result<()>;

    fn make_current(&mut self, surface: SurfaceHandle) -> Result<()>;

    /// ### English
    /// Age of the back buffer in frames; 0 means its content is undefined.
    ///
    /// ### 中文
    /// 后缓冲的帧龄；0 表示内容未定义。
    fn buffer_age(&mut self, surface: SurfaceHandle) -> u32;

    fn set_damage_region(&mut self, surface: SurfaceHandle, rects: &[Rect]) -> Result<()>;

    /// ### English
    /// Presents `surface`. An empty `damage` list swaps the whole surface.
    ///
    /// ### 中文
    /// 呈现 `surface`；`damage` 为空时整屏交换。
    fn swap_buffers(&mut self, surface: SurfaceHandle, damage: &[Rect]) -> Result<()>;

    fn flush(&mut self);

    /// ### English
    /// Uploads `image` into `target` (created when `None`). The returned fence signals once the
    /// GPU no longer reads the source pixels.
    ///
    /// ### 中文
    /// 将 `image` 上传到 `target`（为 `None` 时新建）。返回的 fence 在 GPU 不再读取源像素后触发。
    fn upload_texture(
        &mut self,
        target: Option<TextureId>,
        image: &ImageView<'_>,
    ) -> Result<(TextureId, GpuFence)>;

    fn bind_texture(&mut self, texture: TextureId) -> Result<()>;

    fn capabilities(&self) -> GraphicsCapabilities;

    /// ### English
    /// Destroys the context and closes the display. Safe to call more than once.
    ///
    /// ### 中文
    /// 销毁上下文并关闭 display；可重复调用。
    fn terminate(&mut self);
}
