//! ### English
//! Thread-id tag check around a [`GraphicsInterface`].
//!
//! The thread that calls `initialize` becomes the owner. Any later call from another thread is
//! counted, logged and refused instead of reaching the driver.
//!
//! ### 中文
//! 对 [`GraphicsInterface`] 的线程 id 标记检查。
//!
//! 调用 `initialize` 的线程成为所有者。之后来自其它线程的调用会被计数、记录日志并拒绝，
//! 不会到达驱动。

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread::{self, ThreadId};

use tracing::error;

use crate::engine::error::{Error, Result};
use crate::engine::geometry::Rect;
use crate::engine::imaging::ImageView;
use crate::engine::window_system::NativeHandle;

use super::{
    ColorDepth, ConfigKind, GpuFence, GraphicsCapabilities, GraphicsConfig, GraphicsInterface,
    SurfaceHandle, SurfaceReplacement, TextureId,
};

/// ### English
/// Shared counter of refused cross-thread calls.
///
/// ### 中文
/// 被拒绝的跨线程调用计数（共享）。
#[derive(Clone, Debug, Default)]
pub struct ThreadViolations(Arc<AtomicUsize>);

impl ThreadViolations {
    #[inline]
    pub fn count(&self) -> usize {
        self.0.load(Ordering::Acquire)
    }

    #[inline]
    fn record(&self) {
        self.0.fetch_add(1, Ordering::AcqRel);
    }
}

/// ### English
/// Wrapper that enforces single-thread use of a graphics backend.
///
/// ### 中文
/// 强制图形后端单线程使用的包装器。
pub struct ThreadAffineGraphics {
    inner: Box<dyn GraphicsInterface>,
    owner: Option<ThreadId>,
    violations: ThreadViolations,
}

impl ThreadAffineGraphics {
    pub fn new(inner: Box<dyn GraphicsInterface>) -> Self {
        Self {
            inner,
            owner: None,
            violations: ThreadViolations::default(),
        }
    }

    pub fn violations(&self) -> ThreadViolations {
        self.violations.clone()
    }

    pub fn owner(&self) -> Option<ThreadId> {
        self.owner
    }

    fn check(&self, call: &'static str) -> Result<()> {
        let Some(owner) = self.owner else {
            return Ok(());
        };
        let caller = thread::current().id();
        if caller == owner {
            return Ok(());
        }
        self.violations.record();
        error!(call, ?owner, ?caller, "graphics call from a thread that does not own the context");
        Err(Error::WrongThread {
            call,
            owner,
            caller,
        })
    }
}

impl GraphicsInterface for ThreadAffineGraphics {
    fn initialize(&mut self, config: &GraphicsConfig) -> Result<()> {
        self.check("initialize")?;
        self.inner.initialize(config)?;
        self.owner = Some(thread::current().id());
        Ok(())
    }

    fn choose_config(&mut self, kind: ConfigKind, depth: ColorDepth) -> Result<()> {
        self.check("choose_config")?;
        self.inner.choose_config(kind, depth)
    }

    fn create_context(&mut self) -> Result<()> {
        self.check("create_context")?;
        self.inner.create_context()
    }

    fn create_window_surface(
        &mut self,
        window: NativeHandle,
        depth: ColorDepth,
    ) -> Result<SurfaceHandle> {
        self.check("create_window_surface")?;
        self.inner.create_window_surface(window, depth)
    }

    fn create_pixmap_surface(
        &mut self,
        pixmap: NativeHandle,
        depth: ColorDepth,
    ) -> Result<SurfaceHandle> {
        self.check("create_pixmap_surface")?;
        self.inner.create_pixmap_surface(pixmap, depth)
    }

    fn replace_window_surface(
        &mut self,
        old: SurfaceHandle,
        window: NativeHandle,
    ) -> Result<SurfaceReplacement> {
        self.check("replace_window_surface")?;
        self.inner.replace_window_surface(old, window)
    }

    fn replace_pixmap_surface(
        &mut self,
        old: SurfaceHandle,
        pixmap: NativeHandle,
    ) -> Result<SurfaceReplacement> {
        self.check("replace_pixmap_surface")?;
        self.inner.replace_pixmap_surface(old, pixmap)
    }

    fn destroy_surface(&mut self, surface: SurfaceHandle) -> Result<()> {
        self.check("destroy_surface")?;
        self.inner.destroy_surface(surface)
    }

    fn make_current(&mut self, surface: SurfaceHandle) -> Result<()> {
        self.check("make_current")?;
        self.inner.make_current(surface)
    }

    fn buffer_age(&mut self, surface: SurfaceHandle) -> u32 {
        if self.check("buffer_age").is_err() {
            return 0;
        }
        self.inner.buffer_age(surface)
    }

    fn set_damage_region(&mut self, surface: SurfaceHandle, rects: &[Rect]) -> Result<()> {
        self.check("set_damage_region")?;
        self.inner.set_damage_region(surface, rects)
    }

    fn swap_buffers(&mut self, surface: SurfaceHandle, damage: &[Rect]) -> Result<()> {
        self.check("swap_buffers")?;
        self.inner.swap_buffers(surface, damage)
    }

    fn flush(&mut self) {
        if self.check("flush").is_ok() {
            self.inner.flush();
        }
    }

    fn upload_texture(
        &mut self,
        target: Option<TextureId>,
        image: &ImageView<'_>,
    ) -> Result<(TextureId, GpuFence)> {
        self.check("upload_texture")?;
        self.inner.upload_texture(target, image)
    }

    fn bind_texture(&mut self, texture: TextureId) -> Result<()> {
        self.check("bind_texture")?;
        self.inner.bind_texture(texture)
    }

    fn capabilities(&self) -> GraphicsCapabilities {
        self.inner.capabilities()
    }

    fn terminate(&mut self) {
        if self.check("terminate").is_ok() {
            self.inner.terminate();
            self.owner = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::graphics::HeadlessGraphics;

    #[test]
    fn calls_from_other_threads_are_refused_and_counted() {
        let (graphics, _control) = HeadlessGraphics::new();
        let mut graphics = ThreadAffineGraphics::new(Box::new(graphics));
        let violations = graphics.violations();
        graphics.initialize(&GraphicsConfig::default()).unwrap();
        graphics.choose_config(ConfigKind::Window, ColorDepth::Depth24).unwrap();

        let mut graphics = thread::spawn(move || {
            let result = graphics.create_context();
            assert!(matches!(result, Err(Error::WrongThread { .. })));
            graphics.flush();
            graphics
        })
        .join()
        .unwrap();

        assert_eq!(violations.count(), 2);
        graphics.create_context().unwrap();
        assert_eq!(violations.count(), 2);
    }
}
