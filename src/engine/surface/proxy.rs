//! ### English
//! Event-thread half of a render surface.
//!
//! The render thread owns the [`RenderSurface`](super::RenderSurface) and every graphics object
//! behind it. The event thread keeps a [`SurfaceProxy`] which may only record requests (move,
//! resize, rotation) and answer compositor handshakes (`release_lock`); the render thread picks
//! the requests up at the next resizing frame.
//!
//! ### 中文
//! render surface 的事件线程一侧。
//!
//! 渲染线程持有 [`RenderSurface`](super::RenderSurface) 及其背后的所有图形对象。事件线程持有
//! [`SurfaceProxy`]，只能登记请求（移动、缩放、旋转）并响应合成器握手（`release_lock`）；
//! 渲染线程在下一次 resize 帧中处理这些请求。

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use dpi::PhysicalSize;
use tracing::{debug, trace};

use crate::engine::geometry::{PositionSize, is_transposing_angle};
use crate::engine::lock;
use crate::engine::window_system::{NativeHandle, WindowSystem};

use super::state::SurfaceType;
use super::sync::ThreadSynchronization;

/// ### English
/// Moves or resizes smaller than this (in pixels) are ignored.
///
/// ### 中文
/// 小于该像素数的移动或缩放会被忽略。
pub const MINIMUM_DIMENSION_CHANGE: i32 = 1;

#[derive(Debug)]
pub(crate) struct Geometry {
    pub(crate) position: PositionSize,
    pub(crate) window: Option<NativeHandle>,
    pub(crate) resize_pending: bool,
    pub(crate) rotation_angle: i32,
    pub(crate) rotation_pending: bool,
    pub(crate) screen_rotation_angle: i32,
    pub(crate) screen_rotation_pending: bool,
    pub(crate) rotation_supported: bool,
}

impl Geometry {
    pub(crate) fn new(position: PositionSize, window: Option<NativeHandle>) -> Self {
        Self {
            position,
            window,
            resize_pending: false,
            rotation_angle: 0,
            rotation_pending: false,
            screen_rotation_angle: 0,
            screen_rotation_pending: false,
            rotation_supported: false,
        }
    }

    /// ### English
    /// Size of the native buffer: the window size, transposed for 90/270 screen rotation.
    ///
    /// ### 中文
    /// 原生 buffer 的尺寸：窗口尺寸，屏幕旋转 90/270 度时宽高互换。
    pub(crate) fn buffer_size(&self) -> PhysicalSize<u32> {
        if is_transposing_angle(self.screen_rotation_angle) {
            self.position.transposed().size()
        } else {
            self.position.size()
        }
    }

    pub(crate) fn total_rotation(&self) -> i32 {
        (self.rotation_angle + self.screen_rotation_angle).rem_euclid(360)
    }
}

pub(crate) struct SurfaceShared {
    pub(crate) id: u64,
    pub(crate) kind: SurfaceType,
    pub(crate) window_system: Arc<dyn WindowSystem>,
    pub(crate) geometry: Mutex<Geometry>,
    sync: Mutex<Option<Arc<dyn ThreadSynchronization>>>,
    lock_held: AtomicBool,
    presented: Mutex<Option<NativeHandle>>,
}

impl SurfaceShared {
    pub(crate) fn new(
        id: u64,
        kind: SurfaceType,
        window_system: Arc<dyn WindowSystem>,
        geometry: Geometry,
    ) -> Self {
        Self {
            id,
            kind,
            window_system,
            geometry: Mutex::new(geometry),
            sync: Mutex::new(None),
            lock_held: AtomicBool::new(false),
            presented: Mutex::new(None),
        }
    }

    pub(crate) fn sync(&self) -> Option<Arc<dyn ThreadSynchronization>> {
        lock(&self.sync).clone()
    }

    pub(crate) fn set_sync(&self, sync: Option<Arc<dyn ThreadSynchronization>>) {
        *lock(&self.sync) = sync;
    }

    /// ### English
    /// Render thread: a presented frame now waits for the event thread's `release_lock`.
    ///
    /// ### 中文
    /// 渲染线程：已呈现的帧开始等待事件线程的 `release_lock`。
    pub(crate) fn acquire_lock(&self) {
        self.lock_held.store(true, Ordering::Release);
    }

    pub(crate) fn is_lock_held(&self) -> bool {
        self.lock_held.load(Ordering::Acquire)
    }

    pub(crate) fn release_lock(&self) -> bool {
        if !self.lock_held.swap(false, Ordering::AcqRel) {
            debug!(surface = self.id, "release_lock without an outstanding compositor lock");
            return false;
        }
        if let Some(sync) = self.sync() {
            sync.post_render_complete();
        }
        trace!(surface = self.id, "compositor lock released");
        true
    }

    pub(crate) fn set_presented(&self, drawable: Option<NativeHandle>) {
        *lock(&self.presented) = drawable;
    }

    /// ### English
    /// Event thread: the render thread finished drawing at the requested orientation.
    ///
    /// ### 中文
    /// 事件线程：渲染线程已按请求的方向完成绘制。
    pub(crate) fn complete_rotation(&self) {
        let (window, angle, size) = {
            let mut geometry = lock(&self.geometry);
            geometry.rotation_pending = false;
            (geometry.window, geometry.rotation_angle, geometry.position.size())
        };
        if let Some(window) = window {
            self.window_system
                .window_rotation_completed(window, angle, size);
        }
        debug!(surface = self.id, angle, "rotation done");
        if let Some(sync) = self.sync() {
            sync.post_render_complete();
        }
    }
}

/// ### English
/// Cloneable event-thread handle to a render surface.
///
/// ### 中文
/// render surface 在事件线程一侧的可克隆句柄。
#[derive(Clone)]
pub struct SurfaceProxy {
    pub(crate) shared: Arc<SurfaceShared>,
}

impl SurfaceProxy {
    #[inline]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    #[inline]
    pub fn surface_type(&self) -> SurfaceType {
        self.shared.kind
    }

    pub fn position_size(&self) -> PositionSize {
        lock(&self.shared.geometry).position
    }

    pub fn dpi(&self) -> (u32, u32) {
        self.shared.window_system.dpi()
    }

    /// ### English
    /// Moves and/or resizes the native window. Only window surfaces move.
    ///
    /// Returns `true` when the size changed; the caller then asks the render thread to resize
    /// (`Adaptor::surface_resized`).
    ///
    /// ### 中文
    /// 移动和/或缩放原生窗口；仅 window surface 可移动。
    ///
    /// 尺寸变化时返回 `true`；调用方随后需请求渲染线程执行 resize（`Adaptor::surface_resized`）。
    pub fn move_resize(&self, position: PositionSize) -> bool {
        if self.shared.kind != SurfaceType::Window {
            return false;
        }
        let mut geometry = lock(&self.shared.geometry);
        let current = geometry.position;
        let need_move = (position.x - current.x).abs() > MINIMUM_DIMENSION_CHANGE
            || (position.y - current.y).abs() > MINIMUM_DIMENSION_CHANGE;
        let need_resize = (position.width - current.width).abs() > MINIMUM_DIMENSION_CHANGE
            || (position.height - current.height).abs() > MINIMUM_DIMENSION_CHANGE;
        if !need_move && !need_resize {
            return false;
        }
        if let Some(window) = geometry.window {
            self.shared
                .window_system
                .move_resize_window(window, position);
        }
        geometry.position = position;
        if need_resize {
            geometry.resize_pending = true;
        }
        debug!(surface = self.shared.id, ?position, need_resize, "window moved");
        need_resize
    }

    /// ### English
    /// Requests the window to be drawn at `angle` with the new size. Returns `false` when the
    /// drawable cannot rotate (or the surface is not a window).
    ///
    /// ### 中文
    /// 请求以 `angle` 角度和新尺寸绘制窗口；可绘制对象不支持旋转（或不是 window surface）时返回 `false`。
    pub fn request_rotation(&self, angle: i32, width: i32, height: i32) -> bool {
        if self.shared.kind != SurfaceType::Window {
            return false;
        }
        let mut geometry = lock(&self.shared.geometry);
        if !geometry.rotation_supported {
            debug!(surface = self.shared.id, angle, "rotation not supported");
            return false;
        }
        geometry.position.width = width;
        geometry.position.height = height;
        geometry.rotation_angle = angle.rem_euclid(360);
        geometry.rotation_pending = true;
        true
    }

    /// ### English
    /// Re-reads the screen rotation after an output transform event. Returns `true` if it
    /// changed.
    ///
    /// ### 中文
    /// 在输出变换事件后重新读取屏幕旋转角度；发生变化时返回 `true`。
    pub fn output_transformed(&self) -> bool {
        let angle = self.shared.window_system.screen_rotation_angle();
        let mut geometry = lock(&self.shared.geometry);
        if geometry.screen_rotation_angle == angle {
            return false;
        }
        geometry.screen_rotation_angle = angle;
        geometry.screen_rotation_pending = true;
        true
    }

    /// ### English
    /// Window rotation plus screen rotation, in degrees.
    ///
    /// ### 中文
    /// 窗口旋转与屏幕旋转之和（角度）。
    pub fn orientation(&self) -> i32 {
        lock(&self.shared.geometry).total_rotation()
    }

    /// ### English
    /// Drawable holding the last completed frame (pixmap surfaces).
    ///
    /// ### 中文
    /// 持有最近完成帧的可绘制对象（pixmap surface）。
    pub fn presented_drawable(&self) -> Option<NativeHandle> {
        *lock(&self.shared.presented)
    }

    /// ### English
    /// `true` while a presented frame waits for [`SurfaceProxy::release_lock`].
    ///
    /// ### 中文
    /// 已呈现的帧等待 [`SurfaceProxy::release_lock`] 期间为 `true`。
    pub fn is_locked(&self) -> bool {
        self.shared.is_lock_held()
    }

    /// ### English
    /// Releases the compositor lock of the last presented frame, letting the render thread
    /// continue. Ignored (and logged) when no frame is locked.
    ///
    /// ### 中文
    /// 释放最近呈现帧的合成器锁，使渲染线程继续；没有被锁定的帧时忽略（并记录日志）。
    pub fn release_lock(&self) -> bool {
        self.shared.release_lock()
    }
}

impl std::fmt::Debug for SurfaceProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SurfaceProxy")
            .field("id", &self.shared.id)
            .field("kind", &self.shared.kind)
            .finish()
    }
}
