//! ### English
//! `RenderSurface`: one native drawable plus the per-frame contract the render thread drives.
//!
//! The state machine, partial-update bookkeeping and frame sequencing live here once; the
//! window, pixmap and native-buffer variants only create, replace and destroy their drawables
//! and add their own post-render handshake.
//!
//! ### 中文
//! `RenderSurface`：一个原生可绘制对象，以及渲染线程驱动的逐帧契约。
//!
//! 状态机、部分更新记录与帧序列只在此处实现一次；window、pixmap 与 native-buffer 变体
//! 只负责创建、替换、销毁各自的可绘制对象，并附加各自的 post-render 握手。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use tracing::{debug, error, info, trace, warn};

use crate::engine::config::EnvironmentOptions;
use crate::engine::error::{Error, Result};
use crate::engine::geometry::{PositionSize, Rect};
use crate::engine::graphics::{ColorDepth, ConfigKind, GraphicsConfig, GraphicsInterface, SurfaceHandle};
use crate::engine::imaging::NativeImageSourceQueue;
use crate::engine::lock;
use crate::engine::system::{TriggerEventManager, TriggerHandle};
use crate::engine::window_system::{NativeHandle, WindowSystem};

use super::damage::DamageHistory;
use super::native_buffer::NativeBufferSurface;
use super::pixmap::{BUFFER_COUNT, PixmapSurface};
use super::proxy::{Geometry, SurfaceProxy, SurfaceShared};
use super::state::{SurfaceState, SurfaceType};
use super::sync::ThreadSynchronization;
use super::window::WindowSurface;

static NEXT_SURFACE_ID: AtomicU64 = AtomicU64::new(1);

enum SurfaceVariant {
    Window(WindowSurface),
    Pixmap(PixmapSurface),
    NativeBuffer(NativeBufferSurface),
}

impl SurfaceVariant {
    fn kind(&self) -> SurfaceType {
        match self {
            SurfaceVariant::Window(_) => SurfaceType::Window,
            SurfaceVariant::Pixmap(_) => SurfaceType::Pixmap,
            SurfaceVariant::NativeBuffer(_) => SurfaceType::NativeBuffer,
        }
    }

    fn config_kind(&self) -> ConfigKind {
        match self {
            SurfaceVariant::Pixmap(_) => ConfigKind::Pixmap,
            _ => ConfigKind::Window,
        }
    }

    fn current_handle(&self) -> Option<SurfaceHandle> {
        match self {
            SurfaceVariant::Window(window) => window.current_handle(),
            SurfaceVariant::Pixmap(pixmap) => pixmap.current_handle(),
            SurfaceVariant::NativeBuffer(native) => native.current_handle(),
        }
    }
}

/// ### English
/// A native drawable (window, pixmap or native-buffer queue) the render thread draws into.
///
/// Created on the event thread, then moved to the render thread which performs every graphics
/// call. Keep a [`SurfaceProxy`] (from [`RenderSurface::proxy`]) on the event thread.
///
/// ### 中文
/// 渲染线程绘制目标的原生可绘制对象（窗口、pixmap 或 native-buffer 队列）。
///
/// 在事件线程创建，随后移交给渲染线程，由其执行所有图形调用。事件线程保留一个
/// [`SurfaceProxy`]（通过 [`RenderSurface::proxy`] 获取）。
pub struct RenderSurface {
    shared: Arc<SurfaceShared>,
    state: SurfaceState,
    depth: ColorDepth,
    variant: SurfaceVariant,
    graphics_config: GraphicsConfig,
    partial_update_allowed: bool,
    partial_update: bool,
    full_swap_next_frame: bool,
    damage: DamageHistory,
    frame_surface: Option<SurfaceHandle>,
    frame_clip: Option<Rect>,
    render_notification: Option<TriggerHandle>,
    render_started: bool,
}

impl RenderSurface {
    fn with_variant(
        shared: Arc<SurfaceShared>,
        variant: SurfaceVariant,
        transparent: bool,
    ) -> Self {
        let options = EnvironmentOptions::default();
        Self {
            shared,
            state: SurfaceState::Uninitialized,
            depth: ColorDepth::from_transparency(transparent),
            variant,
            graphics_config: GraphicsConfig::from_options(&options),
            partial_update_allowed: options.partial_update(),
            partial_update: false,
            full_swap_next_frame: true,
            damage: DamageHistory::default(),
            frame_surface: None,
            frame_clip: None,
            render_notification: None,
            render_started: false,
        }
    }

    fn new_shared<F>(
        kind: SurfaceType,
        window_system: Arc<dyn WindowSystem>,
        geometry: Geometry,
        variant: F,
    ) -> Result<(Arc<SurfaceShared>, SurfaceVariant)>
    where
        F: FnOnce(Weak<SurfaceShared>) -> Result<SurfaceVariant>,
    {
        let id = NEXT_SURFACE_ID.fetch_add(1, Ordering::Relaxed);
        let mut built = None;
        let mut failure = None;
        let shared = Arc::new_cyclic(|weak| {
            match variant(weak.clone()) {
                Ok(v) => built = Some(v),
                Err(err) => failure = Some(err),
            }
            SurfaceShared::new(id, kind, window_system, geometry)
        });
        match (built, failure) {
            (Some(variant), _) => Ok((shared, variant)),
            (None, Some(err)) => Err(err),
            (None, None) => Err(Error::WindowSystem("surface variant was not built".into())),
        }
    }

    /// ### English
    /// Creates a native window and a window surface for it.
    ///
    /// #### Parameters
    /// - `position`: Window rectangle; a zero width or height means full screen.
    /// - `transparent`: Selects a 32-bit (alpha) instead of a 24-bit drawable.
    ///
    /// ### 中文
    /// 创建原生窗口及其 window surface。
    ///
    /// #### 参数
    /// - `position`：窗口矩形；宽或高为 0 表示全屏。
    /// - `transparent`：选择 32 位（带 alpha）而非 24 位的可绘制对象。
    pub fn window(
        window_system: Arc<dyn WindowSystem>,
        triggers: &TriggerEventManager,
        position: PositionSize,
        transparent: bool,
    ) -> Result<Self> {
        let position = full_screen_if_empty(window_system.as_ref(), position);
        let window = window_system.create_window(position, transparent)?;
        Self::window_surface(window_system, triggers, window, true, position, transparent)
    }

    /// ### English
    /// Wraps an existing native window. The window is not destroyed with the surface unless
    /// ownership is transferred to it.
    ///
    /// ### 中文
    /// 包装一个已存在的原生窗口。除非所有权被转移给该 surface，否则窗口不会随 surface 一起销毁。
    pub fn from_native_window(
        window_system: Arc<dyn WindowSystem>,
        triggers: &TriggerEventManager,
        window: NativeHandle,
        position: PositionSize,
        transparent: bool,
    ) -> Result<Self> {
        let position = full_screen_if_empty(window_system.as_ref(), position);
        Self::window_surface(window_system, triggers, window, false, position, transparent)
    }

    fn window_surface(
        window_system: Arc<dyn WindowSystem>,
        triggers: &TriggerEventManager,
        window: NativeHandle,
        owns_window: bool,
        position: PositionSize,
        transparent: bool,
    ) -> Result<Self> {
        let mut geometry = Geometry::new(position, Some(window));
        geometry.screen_rotation_angle = window_system.screen_rotation_angle();
        geometry.screen_rotation_pending = geometry.screen_rotation_angle != 0;

        let (shared, variant) =
            Self::new_shared(SurfaceType::Window, window_system, geometry, |weak| {
                Ok(SurfaceVariant::Window(WindowSurface::new(
                    window,
                    owns_window,
                    weak,
                    triggers,
                )))
            })?;
        debug!(surface = shared.id, ?window, ?position, "window render surface created");
        Ok(Self::with_variant(shared, variant, transparent))
    }

    /// ### English
    /// Creates an off-screen surface backed by [`BUFFER_COUNT`] pixmaps of `position`'s size.
    ///
    /// ### 中文
    /// 创建离屏 surface，由 [`BUFFER_COUNT`] 个 `position` 尺寸的 pixmap 支撑。
    pub fn pixmap(
        window_system: Arc<dyn WindowSystem>,
        position: PositionSize,
        transparent: bool,
    ) -> Result<Self> {
        if position.is_empty() {
            return Err(Error::WindowSystem(format!(
                "pixmap size is invalid: {position:?}"
            )));
        }
        let depth = ColorDepth::from_transparency(transparent);
        let first = window_system.create_pixmap(position.size(), depth)?;
        let second = match window_system.create_pixmap(position.size(), depth) {
            Ok(pixmap) => pixmap,
            Err(err) => {
                window_system.free_pixmap(first);
                return Err(err);
            }
        };
        let pixmaps: [NativeHandle; BUFFER_COUNT] = [first, second];
        let (shared, variant) = Self::new_shared(
            SurfaceType::Pixmap,
            window_system,
            Geometry::new(position, None),
            |_| Ok(SurfaceVariant::Pixmap(PixmapSurface::new(pixmaps))),
        )?;
        debug!(surface = shared.id, ?position, "pixmap render surface created");
        Ok(Self::with_variant(shared, variant, transparent))
    }

    /// ### English
    /// Creates a surface that renders into `queue`.
    ///
    /// ### 中文
    /// 创建渲染到 `queue` 的 surface。
    pub fn native_buffer(
        window_system: Arc<dyn WindowSystem>,
        queue: NativeImageSourceQueue,
    ) -> Result<Self> {
        let size = queue.size();
        let position = Rect::from_size(size);
        let transparent = queue.is_blending_required();
        let (shared, variant) = Self::new_shared(
            SurfaceType::NativeBuffer,
            window_system,
            Geometry::new(position, None),
            |_| Ok(SurfaceVariant::NativeBuffer(NativeBufferSurface::new(queue))),
        )?;
        debug!(surface = shared.id, ?size, "native buffer render surface created");
        Ok(Self::with_variant(shared, variant, transparent))
    }

    /// ### English
    /// Applies graphics requirements (depth/stencil, multisampling, partial update) from
    /// `options`.
    ///
    /// ### 中文
    /// 从 `options` 应用图形需求（深度/模板缓冲、多重采样、部分更新）。
    pub fn with_options(mut self, options: &EnvironmentOptions) -> Self {
        self.graphics_config = GraphicsConfig::from_options(options);
        self.partial_update_allowed = options.partial_update();
        self
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    #[inline]
    pub fn surface_type(&self) -> SurfaceType {
        self.variant.kind()
    }

    #[inline]
    pub fn state(&self) -> SurfaceState {
        self.state
    }

    #[inline]
    pub fn color_depth(&self) -> ColorDepth {
        self.depth
    }

    pub fn proxy(&self) -> SurfaceProxy {
        SurfaceProxy {
            shared: self.shared.clone(),
        }
    }

    pub fn position_size(&self) -> PositionSize {
        lock(&self.shared.geometry).position
    }

    pub fn dpi(&self) -> (u32, u32) {
        self.shared.window_system.dpi()
    }

    /// ### English
    /// Window rotation plus screen rotation in degrees; 0 for off-screen surfaces.
    ///
    /// ### 中文
    /// 窗口旋转与屏幕旋转之和（角度）；离屏 surface 为 0。
    pub fn orientation(&self) -> i32 {
        lock(&self.shared.geometry).total_rotation()
    }

    pub fn native_window(&self) -> Option<NativeHandle> {
        match &self.variant {
            SurfaceVariant::Window(window) => Some(window.window()),
            _ => None,
        }
    }

    /// ### English
    /// The backing image queue of a native-buffer surface.
    ///
    /// ### 中文
    /// native-buffer surface 的后备图像队列。
    pub fn native_queue(&self) -> Option<&NativeImageSourceQueue> {
        match &self.variant {
            SurfaceVariant::NativeBuffer(native) => Some(native.queue()),
            _ => None,
        }
    }

    /// ### English
    /// Graphics surface currently targeted by this render surface.
    ///
    /// ### 中文
    /// 当前 render surface 所对应的图形 surface。
    pub fn graphics_surface(&self) -> Option<SurfaceHandle> {
        self.variant.current_handle()
    }

    pub fn depth_buffer_required(&self) -> bool {
        self.graphics_config.depth_buffer
    }

    pub fn stencil_buffer_required(&self) -> bool {
        self.graphics_config.stencil_buffer
    }

    pub fn set_depth_buffer_required(&mut self, required: bool) {
        self.graphics_config.depth_buffer = required;
    }

    pub fn set_stencil_buffer_required(&mut self, required: bool) {
        self.graphics_config.stencil_buffer = required;
    }

    /// ### English
    /// `true` when damage-region swaps are in use (backend capability and configuration).
    ///
    /// ### 中文
    /// 使用带脏区交换时为 `true`（由后端能力与配置共同决定）。
    pub fn is_partial_update_active(&self) -> bool {
        self.partial_update
    }

    /// ### English
    /// Area being repainted this frame, or `None` for the whole surface.
    ///
    /// ### 中文
    /// 本帧正在重绘的区域；`None` 表示整个 surface。
    pub fn clipping_rect(&self) -> Option<Rect> {
        self.frame_clip
    }

    pub fn set_full_swap_next_frame(&mut self) {
        self.full_swap_next_frame = true;
    }

    /// ### English
    /// Trigger fired after each presented frame (window and native-buffer surfaces) or used
    /// instead of a damage report (pixmap surfaces).
    ///
    /// ### 中文
    /// 每帧呈现后触发的 trigger（window 与 native-buffer surface），对 pixmap surface 则用于替代
    /// damage 报告。
    pub fn set_render_notification(&mut self, notification: Option<TriggerHandle>) {
        self.render_notification = notification;
    }

    pub fn set_thread_synchronization(&mut self, sync: Option<Arc<dyn ThreadSynchronization>>) {
        self.shared.set_sync(sync);
    }

    /// ### English
    /// Opens the display for this surface and chooses a config. Tags the calling thread as the
    /// graphics owner. A second call fails with [`Error::AlreadyInitialized`].
    ///
    /// ### 中文
    /// 为该 surface 打开 display 并选择配置，同时把调用线程标记为图形所有者。
    /// 第二次调用返回 [`Error::AlreadyInitialized`]。
    pub fn initialize_graphics(&mut self, graphics: &mut dyn GraphicsInterface) -> Result<()> {
        match self.state {
            SurfaceState::Uninitialized => {}
            SurfaceState::Terminated => {
                return Err(Error::InvalidSurfaceState {
                    operation: "initialize_graphics",
                    state: self.state,
                });
            }
            _ => return Err(Error::AlreadyInitialized),
        }
        graphics.initialize(&self.graphics_config)?;
        graphics.choose_config(self.variant.config_kind(), self.depth)?;
        graphics.create_context()?;
        self.state = SurfaceState::GraphicsInitialized;
        debug!(surface = self.shared.id, kind = ?self.variant.kind(), "graphics initialized");
        Ok(())
    }

    /// ### English
    /// Creates the graphics surface for the native drawable and makes it current.
    ///
    /// ### 中文
    /// 为原生可绘制对象创建图形 surface 并设为当前。
    pub fn create_surface(&mut self, graphics: &mut dyn GraphicsInterface) -> Result<()> {
        self.state.require(
            "create_surface",
            &[SurfaceState::GraphicsInitialized, SurfaceState::SurfaceDestroyed],
        )?;
        let created = match &mut self.variant {
            SurfaceVariant::Window(window) => window.create(graphics, &self.shared, self.depth),
            SurfaceVariant::Pixmap(pixmap) => pixmap.create(graphics, self.depth),
            SurfaceVariant::NativeBuffer(native) => native.create(graphics, self.depth),
        };
        let handle = created.inspect_err(|err| {
            error!(%err, surface = self.shared.id, "failed to create graphics surface");
        })?;
        graphics.make_current(handle)?;

        self.partial_update = self.partial_update_allowed && graphics.capabilities().partial_update;
        self.full_swap_next_frame = true;
        self.damage.clear();
        self.state = SurfaceState::SurfaceCreated;
        debug!(surface = self.shared.id, ?handle, partial_update = self.partial_update, "surface created");
        Ok(())
    }

    /// ### English
    /// Swaps the native drawable under the graphics surface.
    ///
    /// Returns `true` if the context was lost; the caller must then reload every GPU resource.
    /// This is never retried here.
    ///
    /// ### 中文
    /// 替换图形 surface 之下的原生可绘制对象。
    ///
    /// 若上下文丢失则返回 `true`，调用方须重新加载所有 GPU 资源；此处不会自动重试。
    pub fn replace_surface(&mut self, graphics: &mut dyn GraphicsInterface) -> Result<bool> {
        self.state.require(
            "replace_surface",
            &[
                SurfaceState::SurfaceCreated,
                SurfaceState::Rendering,
                SurfaceState::Replacing,
            ],
        )?;
        let replaced = match &mut self.variant {
            SurfaceVariant::Window(window) => window.replace(graphics, &self.shared),
            SurfaceVariant::Pixmap(pixmap) => pixmap.replace(graphics),
            SurfaceVariant::NativeBuffer(native) => native.replace(graphics),
        };
        let replacement = match replaced {
            Ok(replacement) => replacement,
            Err(err) => {
                error!(%err, surface = self.shared.id, "surface replacement failed");
                self.state = SurfaceState::SurfaceDestroyed;
                return Err(err);
            }
        };

        self.full_swap_next_frame = true;
        self.damage.clear();
        self.frame_surface = None;
        self.state = SurfaceState::Replacing;
        if replacement.context_lost {
            warn!(surface = self.shared.id, "graphics context lost during surface replacement");
        } else {
            debug!(surface = self.shared.id, handle = ?replacement.handle, "surface replaced");
        }
        Ok(replacement.context_lost)
    }

    pub fn start_render(&mut self) {
        self.render_started = true;
    }

    /// ### English
    /// Detaches the render thread. Safe in any state, including before `start_render`.
    ///
    /// ### 中文
    /// 使渲染线程脱离该 surface；在任何状态下（包括 `start_render` 之前）调用都是安全的。
    pub fn stop_render(&mut self) {
        if let SurfaceVariant::NativeBuffer(native) = &mut self.variant {
            native.cancel_frame();
        }
        if matches!(self.variant, SurfaceVariant::Pixmap(_) | SurfaceVariant::NativeBuffer(_)) {
            self.shared.release_lock();
        }
        if matches!(self.state, SurfaceState::Rendering | SurfaceState::Replacing) {
            self.state = SurfaceState::SurfaceCreated;
        }
        self.frame_surface = None;
        self.render_started = false;
    }

    pub fn release_lock(&self) -> bool {
        self.shared.release_lock()
    }

    /// ### English
    /// Drains windowing events queued for this surface's window. Returns how many were handled.
    ///
    /// ### 中文
    /// 清空该 surface 窗口上排队的窗口事件；返回处理的数量。
    pub fn consume_events(&mut self) -> usize {
        match &self.variant {
            SurfaceVariant::Window(window) => self.shared.window_system.dispatch_events(window.window()),
            _ => 0,
        }
    }

    /// ### English
    /// Prepares a frame: applies pending resize/rotation, makes the surface current and, with
    /// partial update, sets the damage region from buffer age.
    ///
    /// Returns `Ok(false)` when the frame should be skipped.
    ///
    /// #### Parameters
    /// - `resizing`: A resize or rotation request is handled this frame.
    /// - `damaged`: Areas the scene changed this frame; empty means unknown (repaint all).
    ///
    /// ### 中文
    /// 准备一帧：应用待处理的缩放/旋转，设为当前 surface；启用部分更新时按 buffer age 设置脏区。
    ///
    /// 返回 `Ok(false)` 表示应跳过本帧。
    ///
    /// #### 参数
    /// - `resizing`：本帧处理缩放或旋转请求。
    /// - `damaged`：本帧场景变化的区域；为空表示未知（整屏重绘）。
    pub fn pre_render(
        &mut self,
        graphics: &mut dyn GraphicsInterface,
        resizing: bool,
        damaged: &[Rect],
    ) -> Result<bool> {
        self.state.require(
            "pre_render",
            &[
                SurfaceState::SurfaceCreated,
                SurfaceState::Rendering,
                SurfaceState::Replacing,
            ],
        )?;
        self.frame_surface = None;
        self.frame_clip = None;

        let ready = match &mut self.variant {
            SurfaceVariant::Window(window) => window.pre_render(&self.shared, resizing),
            SurfaceVariant::Pixmap(_) => true,
            SurfaceVariant::NativeBuffer(native) => native.pre_render(),
        };
        if !ready {
            return Ok(false);
        }
        let Some(handle) = self.variant.current_handle() else {
            warn!(surface = self.shared.id, "no graphics surface to render into");
            return Ok(false);
        };
        graphics.make_current(handle)?;

        if self.partial_update && !self.full_swap_next_frame && !resizing {
            let full = Rect::from_size(lock(&self.shared.geometry).buffer_size());
            let age = graphics.buffer_age(handle);
            self.frame_clip = self.damage.clip(age, damaged, full);
            if let Some(clip) = self.frame_clip {
                graphics.set_damage_region(handle, &[clip])?;
            }
            trace!(surface = self.shared.id, age, clip = ?self.frame_clip, "partial update");
        }

        self.frame_surface = Some(handle);
        if self.state == SurfaceState::SurfaceCreated {
            self.state = SurfaceState::Rendering;
        }
        Ok(true)
    }

    /// ### English
    /// Presents the frame prepared by [`RenderSurface::pre_render`] on the same graphics
    /// surface, then runs the variant's handshake (rotation completion, compositor lock, queue
    /// publish).
    ///
    /// #### Parameters
    /// - `replacing`: The surface was replaced at the start of this frame.
    /// - `resizing`: A resize or rotation request is handled this frame.
    ///
    /// ### 中文
    /// 在同一图形 surface 上呈现 [`RenderSurface::pre_render`] 准备的帧，然后执行变体自身的握手
    /// （旋转完成、合成器锁、队列发布）。
    ///
    /// #### 参数
    /// - `replacing`：本帧开始时替换了 surface。
    /// - `resizing`：本帧处理缩放或旋转请求。
    pub fn post_render(
        &mut self,
        graphics: &mut dyn GraphicsInterface,
        replacing: bool,
        resizing: bool,
    ) -> Result<()> {
        self.state.require(
            "post_render",
            &[SurfaceState::Rendering, SurfaceState::Replacing],
        )?;
        let Some(handle) = self.frame_surface.take() else {
            return Err(Error::InvalidSurfaceState {
                operation: "post_render without pre_render",
                state: self.state,
            });
        };
        if self.variant.current_handle() != Some(handle) {
            return Err(Error::Graphics(format!(
                "graphics surface changed between pre_render and post_render ({handle:?})"
            )));
        }
        let damage: Vec<Rect> = self.frame_clip.take().into_iter().collect();

        match &mut self.variant {
            SurfaceVariant::Window(window) => {
                window.before_swap(&self.shared, resizing);
                graphics.swap_buffers(handle, &damage)?;
                self.notify_rendered();
            }
            SurfaceVariant::Pixmap(pixmap) => {
                pixmap.post_render(graphics, &self.shared, self.render_notification.as_ref())?;
            }
            SurfaceVariant::NativeBuffer(native) => {
                graphics.swap_buffers(handle, &damage)?;
                native.after_swap()?;
                if !replacing {
                    self.notify_rendered();
                }
            }
        }

        let presented = damage
            .first()
            .copied()
            .unwrap_or_else(|| Rect::from_size(lock(&self.shared.geometry).buffer_size()));
        self.damage.push(presented);
        self.full_swap_next_frame = false;
        if replacing || self.state == SurfaceState::Replacing {
            self.state = SurfaceState::Rendering;
        }
        Ok(())
    }

    fn notify_rendered(&self) {
        if let Some(notification) = &self.render_notification {
            if !notification.trigger() {
                trace!(surface = self.shared.id, "render notification is gone");
            }
        }
    }

    /// ### English
    /// Destroys the graphics surface, then the drawable objects made for it (the EGL window).
    /// A second call fails with [`Error::AlreadyDestroyed`].
    ///
    /// ### 中文
    /// 先销毁图形 surface，再销毁为其创建的可绘制对象（EGL window）。
    /// 第二次调用返回 [`Error::AlreadyDestroyed`]。
    pub fn destroy_surface(&mut self, graphics: &mut dyn GraphicsInterface) -> Result<()> {
        match self.state {
            SurfaceState::SurfaceDestroyed | SurfaceState::Terminated => {
                return Err(Error::AlreadyDestroyed);
            }
            state if !state.has_surface() => {
                return Err(Error::InvalidSurfaceState {
                    operation: "destroy_surface",
                    state,
                });
            }
            _ => {}
        }
        self.stop_render();
        let result = match &mut self.variant {
            SurfaceVariant::Window(window) => window.destroy(graphics, &self.shared),
            SurfaceVariant::Pixmap(pixmap) => pixmap.destroy(graphics),
            SurfaceVariant::NativeBuffer(native) => native.destroy(graphics),
        };
        self.state = SurfaceState::SurfaceDestroyed;
        debug!(surface = self.shared.id, "surface destroyed");
        result
    }

    /// ### English
    /// Final teardown on the render thread: destroys the graphics surface if it still exists.
    /// Idempotent.
    ///
    /// ### 中文
    /// 渲染线程上的最终清理：若图形 surface 仍存在则销毁。可重复调用。
    pub fn terminate(&mut self, graphics: &mut dyn GraphicsInterface) -> Result<()> {
        let result = if self.state.has_surface() {
            self.destroy_surface(graphics)
        } else {
            Ok(())
        };
        self.state = SurfaceState::Terminated;
        result
    }

    /// ### English
    /// Moves ownership of the native window from this surface to `target`, which must wrap the
    /// same window. The window then lives as long as `target`.
    ///
    /// ### 中文
    /// 把原生窗口的所有权从本 surface 转移给 `target`（须包装同一窗口）。
    /// 此后窗口的生命周期跟随 `target`。
    pub fn transfer_display_owner(&mut self, target: &mut RenderSurface) -> Result<()> {
        let (SurfaceVariant::Window(from), SurfaceVariant::Window(to)) =
            (&mut self.variant, &mut target.variant)
        else {
            return Err(Error::WindowSystem(
                "display ownership can only move between window surfaces".into(),
            ));
        };
        if from.window() != to.window() {
            return Err(Error::WindowSystem(format!(
                "surfaces wrap different windows ({:?} and {:?})",
                from.window(),
                to.window()
            )));
        }
        if !from.owns_window() {
            return Ok(());
        }
        from.set_owns_window(false);
        to.set_owns_window(true);
        info!(from = self.shared.id, to = target.shared.id, "display ownership transferred");
        Ok(())
    }
}

impl Drop for RenderSurface {
    fn drop(&mut self) {
        if self.state.has_surface() {
            warn!(
                surface = self.shared.id,
                state = ?self.state,
                "render surface dropped before its graphics surface was destroyed"
            );
        }
        if let SurfaceVariant::NativeBuffer(native) = &mut self.variant {
            native.cancel_frame();
        }
        self.shared.set_sync(None);
        match &mut self.variant {
            SurfaceVariant::Window(window) => window.release_native(&self.shared),
            SurfaceVariant::Pixmap(pixmap) => pixmap.release_native(&self.shared),
            SurfaceVariant::NativeBuffer(_) => {}
        }
    }
}

impl std::fmt::Debug for RenderSurface {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderSurface")
            .field("id", &self.shared.id)
            .field("kind", &self.variant.kind())
            .field("state", &self.state)
            .field("render_started", &self.render_started)
            .finish_non_exhaustive()
    }
}

fn full_screen_if_empty(window_system: &dyn WindowSystem, position: PositionSize) -> PositionSize {
    if position.width == 0 || position.height == 0 {
        Rect::from_size(window_system.screen_size())
    } else {
        position
    }
}
