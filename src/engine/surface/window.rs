use std::sync::Weak;

use tracing::{debug, error, trace, warn};

use crate::engine::error::{Error, Result};
use crate::engine::graphics::{ColorDepth, GraphicsInterface, SurfaceHandle, SurfaceReplacement};
use crate::engine::lock;
use crate::engine::system::{TriggerEvent, TriggerEventManager, TriggerOptions};
use crate::engine::window_system::NativeHandle;

use super::proxy::SurfaceShared;

/// ### English
/// Native window drawn through an EGL window.
///
/// ### 中文
/// 通过 EGL window 绘制的原生窗口。
pub(crate) struct WindowSurface {
    window: NativeHandle,
    owns_window: bool,
    egl_window: Option<NativeHandle>,
    surface: Option<SurfaceHandle>,
    rotation_trigger: TriggerEvent,
}

impl WindowSurface {
    pub(crate) fn new(
        window: NativeHandle,
        owns_window: bool,
        shared: Weak<SurfaceShared>,
        triggers: &TriggerEventManager,
    ) -> Self {
        let rotation_trigger = triggers.create_trigger_event(
            move || {
                if let Some(shared) = shared.upgrade() {
                    shared.complete_rotation();
                }
            },
            TriggerOptions::KeepAliveAfterTrigger,
        );
        Self {
            window,
            owns_window,
            egl_window: None,
            surface: None,
            rotation_trigger,
        }
    }

    #[inline]
    pub(crate) fn window(&self) -> NativeHandle {
        self.window
    }

    #[inline]
    pub(crate) fn owns_window(&self) -> bool {
        self.owns_window
    }

    pub(crate) fn set_owns_window(&mut self, owns: bool) {
        self.owns_window = owns;
    }

    #[inline]
    pub(crate) fn current_handle(&self) -> Option<SurfaceHandle> {
        self.surface
    }

    pub(crate) fn create(
        &mut self,
        graphics: &mut dyn GraphicsInterface,
        shared: &SurfaceShared,
        depth: ColorDepth,
    ) -> Result<SurfaceHandle> {
        let size = lock(&shared.geometry).buffer_size();
        let egl_window = shared.window_system.create_egl_window(self.window, size)?;
        let surface = match graphics.create_window_surface(egl_window, depth) {
            Ok(surface) => surface,
            Err(err) => {
                shared.window_system.destroy_egl_window(egl_window);
                return Err(err);
            }
        };
        let supported = shared.window_system.is_rotation_supported(egl_window);
        lock(&shared.geometry).rotation_supported = supported;

        self.egl_window = Some(egl_window);
        self.surface = Some(surface);
        debug!(window = ?self.window, ?size, ?surface, rotation_supported = supported, "window surface created");
        Ok(surface)
    }

    /// ### English
    /// Attaches a fresh EGL window. The old EGL window is destroyed only after the graphics
    /// surface on it has been replaced.
    ///
    /// ### 中文
    /// 挂接新的 EGL window；旧 EGL window 只在其上的图形 surface 被替换之后才销毁。
    pub(crate) fn replace(
        &mut self,
        graphics: &mut dyn GraphicsInterface,
        shared: &SurfaceShared,
    ) -> Result<SurfaceReplacement> {
        let old = self
            .surface
            .ok_or_else(|| Error::Graphics("replace requested without a window surface".into()))?;
        let size = {
            let mut geometry = lock(&shared.geometry);
            geometry.screen_rotation_pending = true;
            geometry.buffer_size()
        };
        let egl_window = shared.window_system.create_egl_window(self.window, size)?;
        let replaced = graphics.replace_window_surface(old, egl_window);
        let old_egl_window = std::mem::replace(&mut self.egl_window, Some(egl_window));
        if let Some(old_egl_window) = old_egl_window {
            shared.window_system.destroy_egl_window(old_egl_window);
        }
        match replaced {
            Ok(replacement) => {
                self.surface = Some(replacement.handle);
                Ok(replacement)
            }
            Err(err) => {
                self.surface = None;
                if let Some(egl_window) = self.egl_window.take() {
                    shared.window_system.destroy_egl_window(egl_window);
                }
                Err(err)
            }
        }
    }

    pub(crate) fn destroy(
        &mut self,
        graphics: &mut dyn GraphicsInterface,
        shared: &SurfaceShared,
    ) -> Result<()> {
        let result = match self.surface.take() {
            Some(surface) => graphics.destroy_surface(surface),
            None => Ok(()),
        };
        if let Some(egl_window) = self.egl_window.take() {
            shared.window_system.destroy_egl_window(egl_window);
        }
        result
    }

    /// ### English
    /// Applies pending rotation and resize to the EGL window on a resizing frame.
    ///
    /// ### 中文
    /// 在 resize 帧中把待处理的旋转与缩放应用到 EGL window。
    pub(crate) fn pre_render(&mut self, shared: &SurfaceShared, resizing: bool) -> bool {
        if !resizing {
            return true;
        }
        let Some(egl_window) = self.egl_window else {
            return true;
        };
        let mut geometry = lock(&shared.geometry);
        if geometry.rotation_pending || geometry.screen_rotation_pending {
            let total = geometry.total_rotation();
            shared
                .window_system
                .set_egl_window_rotation(egl_window, total);
            geometry.screen_rotation_pending = false;
            trace!(surface = shared.id, total, "egl window rotation set");
        }
        if geometry.resize_pending {
            let size = geometry.buffer_size();
            shared.window_system.resize_egl_window(egl_window, size);
            geometry.resize_pending = false;
            trace!(surface = shared.id, ?size, "egl window resized");
        }
        true
    }

    /// ### English
    /// On a resizing frame with a rotation in flight, hands the rotation-complete step to the
    /// event thread and waits for it before the swap.
    ///
    /// ### 中文
    /// 在旋转进行中的 resize 帧里，把“旋转完成”步骤交给事件线程，并在交换前等待其完成。
    pub(crate) fn before_swap(&self, shared: &SurfaceShared, resizing: bool) {
        if !resizing || !lock(&shared.geometry).rotation_pending {
            return;
        }
        let sync = shared.sync();
        if let Some(sync) = &sync {
            sync.post_render_started();
        }
        if let Err(err) = self.rotation_trigger.trigger() {
            error!(%err, surface = shared.id, "failed to trigger rotation completion");
            if let Some(sync) = &sync {
                sync.post_render_complete();
            }
            return;
        }
        if let Some(sync) = &sync {
            sync.post_render_wait_for_completion();
        }
    }

    /// ### English
    /// Frees what the window system still holds for this surface.
    ///
    /// ### 中文
    /// 释放窗口系统中仍为该 surface 保留的资源。
    pub(crate) fn release_native(&mut self, shared: &SurfaceShared) {
        if let Some(egl_window) = self.egl_window.take() {
            warn!(surface = shared.id, "egl window still alive at drop");
            shared.window_system.destroy_egl_window(egl_window);
        }
        if self.owns_window {
            shared.window_system.destroy_window(self.window);
            self.owns_window = false;
        }
    }
}
