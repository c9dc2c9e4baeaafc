use tracing::{debug, error, trace};

use crate::engine::error::{Error, Result};
use crate::engine::geometry::Rect;
use crate::engine::graphics::{ColorDepth, GraphicsInterface, SurfaceHandle, SurfaceReplacement};
use crate::engine::lock;
use crate::engine::system::TriggerHandle;
use crate::engine::window_system::NativeHandle;

use super::proxy::SurfaceShared;

/// ### English
/// Pixmaps per surface: one being produced, one held by the compositor.
///
/// ### 中文
/// 每个 surface 的 pixmap 数量：一个正在生产，一个由合成器持有。
pub const BUFFER_COUNT: usize = 2;

/// ### English
/// Double-buffered off-screen pixmap surface.
///
/// ### 中文
/// 双缓冲的离屏 pixmap surface。
pub(crate) struct PixmapSurface {
    pixmaps: [NativeHandle; BUFFER_COUNT],
    surfaces: [Option<SurfaceHandle>; BUFFER_COUNT],
    produce: usize,
}

impl PixmapSurface {
    pub(crate) fn new(pixmaps: [NativeHandle; BUFFER_COUNT]) -> Self {
        Self {
            pixmaps,
            surfaces: [None; BUFFER_COUNT],
            produce: 0,
        }
    }

    #[inline]
    pub(crate) fn current_handle(&self) -> Option<SurfaceHandle> {
        self.surfaces[self.produce]
    }

    pub(crate) fn create(
        &mut self,
        graphics: &mut dyn GraphicsInterface,
        depth: ColorDepth,
    ) -> Result<SurfaceHandle> {
        for index in 0..BUFFER_COUNT {
            match graphics.create_pixmap_surface(self.pixmaps[index], depth) {
                Ok(surface) => self.surfaces[index] = Some(surface),
                Err(err) => {
                    for surface in self.surfaces.iter_mut().filter_map(Option::take) {
                        if let Err(cleanup) = graphics.destroy_surface(surface) {
                            error!(%cleanup, "failed to destroy partial pixmap surface");
                        }
                    }
                    return Err(err);
                }
            }
        }
        self.current_handle()
            .ok_or_else(|| Error::Graphics("pixmap surface missing after creation".into()))
    }

    pub(crate) fn replace(
        &mut self,
        graphics: &mut dyn GraphicsInterface,
    ) -> Result<SurfaceReplacement> {
        let mut context_lost = false;
        for index in 0..BUFFER_COUNT {
            let old = self.surfaces[index]
                .take()
                .ok_or_else(|| Error::Graphics("replace requested without a pixmap surface".into()))?;
            let replacement = graphics.replace_pixmap_surface(old, self.pixmaps[index])?;
            context_lost |= replacement.context_lost;
            self.surfaces[index] = Some(replacement.handle);
        }
        let handle = self
            .current_handle()
            .ok_or_else(|| Error::Graphics("pixmap surface missing after replacement".into()))?;
        Ok(SurfaceReplacement {
            handle,
            context_lost,
        })
    }

    pub(crate) fn destroy(&mut self, graphics: &mut dyn GraphicsInterface) -> Result<()> {
        let mut result = Ok(());
        for surface in self.surfaces.iter_mut().filter_map(Option::take) {
            if let Err(err) = graphics.destroy_surface(surface) {
                error!(%err, ?surface, "failed to destroy pixmap surface");
                result = Err(err);
            }
        }
        result
    }

    /// ### English
    /// Flushes, flips the buffers and hands the finished pixmap to the event thread, then waits
    /// until it is released.
    ///
    /// ### 中文
    /// 刷新、翻转缓冲并把完成的 pixmap 交给事件线程，然后等待其被释放。
    pub(crate) fn post_render(
        &mut self,
        graphics: &mut dyn GraphicsInterface,
        shared: &SurfaceShared,
        notification: Option<&TriggerHandle>,
    ) -> Result<()> {
        graphics.flush();

        let sync = shared.sync();
        if let Some(sync) = &sync {
            /* ### English
             * Mark the frame started before the lock becomes visible to `release_lock`.
             * ### 中文
             * 在锁对 `release_lock` 可见之前先标记本帧已开始。
             */
            sync.post_render_started();
            shared.acquire_lock();
        }

        let consume = self.produce;
        self.produce ^= 1;
        shared.set_presented(Some(self.pixmaps[consume]));
        if let Some(surface) = self.surfaces[self.produce] {
            graphics.make_current(surface)?;
        }
        trace!(surface = shared.id, consume, produce = self.produce, "pixmap buffers swapped");

        let notified = notification.is_some_and(TriggerHandle::trigger);
        if !notified {
            let area = Rect::from_size(lock(&shared.geometry).position.size());
            shared
                .window_system
                .damage_pixmap(self.pixmaps[consume], area);
        }

        if let Some(sync) = &sync {
            sync.post_render_wait_for_completion();
        }
        Ok(())
    }

    pub(crate) fn release_native(&mut self, shared: &SurfaceShared) {
        for pixmap in self.pixmaps {
            shared.window_system.free_pixmap(pixmap);
        }
        shared.set_presented(None);
        debug!(surface = shared.id, "pixmaps freed");
    }
}
