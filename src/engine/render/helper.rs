//! ### English
//! Render-thread owner of the graphics backend and the current render surface.
//!
//! ### 中文
//! 渲染线程上图形后端与当前 render surface 的持有者。

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::engine::error::Result;
use crate::engine::geometry::Rect;
use crate::engine::graphics::{
    ColorDepth, ConfigKind, GraphicsConfig, GraphicsInterface, ThreadAffineGraphics,
};
use crate::engine::surface::{RenderSurface, SurfaceState, ThreadSynchronization};

use super::scene::RenderContext;

pub(crate) struct RenderHelper {
    graphics: ThreadAffineGraphics,
    surface: Option<RenderSurface>,
    sync: Arc<dyn ThreadSynchronization>,
}

impl RenderHelper {
    pub(crate) fn new(
        graphics: ThreadAffineGraphics,
        surface: Option<RenderSurface>,
        sync: Arc<dyn ThreadSynchronization>,
    ) -> Self {
        Self {
            graphics,
            surface,
            sync,
        }
    }

    /// ### English
    /// Brings up the context on the calling thread and creates the surface's graphics surface.
    /// Without a surface only the context is created.
    ///
    /// ### 中文
    /// 在调用线程上建立上下文并创建 surface 的图形 surface；没有 surface 时只创建上下文。
    pub(crate) fn initialize_graphics(&mut self) -> Result<()> {
        match self.surface.as_mut() {
            Some(surface) => {
                surface.set_thread_synchronization(Some(self.sync.clone()));
                surface.initialize_graphics(&mut self.graphics)?;
                surface.create_surface(&mut self.graphics)?;
                surface.start_render();
            }
            None => {
                self.graphics.initialize(&GraphicsConfig::default())?;
                self.graphics
                    .choose_config(ConfigKind::Window, ColorDepth::Depth32)?;
                self.graphics.create_context()?;
            }
        }
        debug!("render helper graphics initialized");
        Ok(())
    }

    #[inline]
    pub(crate) fn has_surface(&self) -> bool {
        self.surface.is_some()
    }

    /// ### English
    /// Moves rendering to `surface` and returns the previous surface with its graphics surface
    /// destroyed. The new surface joins the existing context.
    ///
    /// ### 中文
    /// 把渲染切换到 `surface`，并返回图形 surface 已销毁的旧 surface。新 surface 沿用现有上下文。
    pub(crate) fn replace_surface(
        &mut self,
        mut surface: RenderSurface,
    ) -> Result<Option<RenderSurface>> {
        let old = self.detach_surface();

        surface.set_thread_synchronization(Some(self.sync.clone()));
        if let Err(err) = attach(&mut surface, &mut self.graphics) {
            error!(%err, surface = surface.id(), "failed to attach replacement surface");
            surface.set_thread_synchronization(None);
            if let Some(mut old) = old {
                old.set_thread_synchronization(Some(self.sync.clone()));
                match attach(&mut old, &mut self.graphics) {
                    Ok(()) => {
                        old.start_render();
                        self.surface = Some(old);
                    }
                    Err(restore) => error!(%restore, "failed to restore the previous surface"),
                }
            }
            return Err(err);
        }
        surface.start_render();
        info!(new = surface.id(), old = ?old.as_ref().map(RenderSurface::id), "surface replaced");
        self.surface = Some(surface);
        Ok(old)
    }

    /// ### English
    /// Replaces the native drawable of the current surface. Returns `true` on context loss.
    ///
    /// ### 中文
    /// 替换当前 surface 的原生可绘制对象；上下文丢失时返回 `true`。
    pub(crate) fn recreate_surface(&mut self) -> Result<bool> {
        match self.surface.as_mut() {
            Some(surface) => surface.replace_surface(&mut self.graphics),
            None => {
                warn!("recreate requested without a surface");
                Ok(false)
            }
        }
    }

    /// ### English
    /// Stops rendering into the current surface, destroys its graphics surface and returns it.
    ///
    /// ### 中文
    /// 停止向当前 surface 渲染，销毁其图形 surface 并将其返回。
    pub(crate) fn detach_surface(&mut self) -> Option<RenderSurface> {
        let mut surface = self.surface.take()?;
        surface.stop_render();
        if surface.state().has_surface() {
            if let Err(err) = surface.destroy_surface(&mut self.graphics) {
                error!(%err, surface = surface.id(), "failed to destroy detached surface");
            }
        }
        surface.set_thread_synchronization(None);
        Some(surface)
    }

    pub(crate) fn consume_events(&mut self) -> usize {
        self.surface.as_mut().map_or(0, RenderSurface::consume_events)
    }

    /// ### English
    /// `false` skips the frame (no surface, or the surface is not ready).
    ///
    /// ### 中文
    /// 返回 `false` 表示跳过本帧（没有 surface，或 surface 未就绪）。
    pub(crate) fn pre_render(&mut self, resizing: bool, damaged: &[Rect]) -> bool {
        let Some(surface) = self.surface.as_mut() else {
            return false;
        };
        match surface.pre_render(&mut self.graphics, resizing, damaged) {
            Ok(ready) => ready,
            Err(err) => {
                error!(%err, surface = surface.id(), "pre-render failed");
                false
            }
        }
    }

    pub(crate) fn render_context(&mut self, force_clear: bool) -> RenderContext<'_> {
        let (clipping_rect, surface_rect) = self
            .surface
            .as_ref()
            .map(|surface| (surface.clipping_rect(), surface.position_size()))
            .unwrap_or_default();
        RenderContext {
            graphics: &mut self.graphics,
            force_clear,
            clipping_rect,
            surface_rect,
        }
    }

    pub(crate) fn post_render(&mut self, replacing: bool, resizing: bool) {
        let Some(surface) = self.surface.as_mut() else {
            return;
        };
        if let Err(err) = surface.post_render(&mut self.graphics, replacing, resizing) {
            error!(%err, surface = surface.id(), "post-render failed");
        }
    }

    pub(crate) fn set_full_swap_next_frame(&mut self) {
        if let Some(surface) = self.surface.as_mut() {
            surface.set_full_swap_next_frame();
        }
    }

    /// ### English
    /// Final teardown on the render thread: terminates the surface, then the context.
    ///
    /// ### 中文
    /// 渲染线程上的最终清理：先终止 surface，再终止上下文。
    pub(crate) fn shutdown(&mut self) {
        if let Some(mut surface) = self.surface.take() {
            surface.stop_render();
            if let Err(err) = surface.terminate(&mut self.graphics) {
                error!(%err, surface = surface.id(), "failed to terminate surface");
            }
            surface.set_thread_synchronization(None);
        }
        self.graphics.terminate();
        debug!("render helper shut down");
    }
}

fn attach(surface: &mut RenderSurface, graphics: &mut dyn GraphicsInterface) -> Result<()> {
    if surface.state() == SurfaceState::Uninitialized {
        surface.initialize_graphics(graphics)?;
    }
    surface.create_surface(graphics)
}
