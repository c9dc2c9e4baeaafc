use tracing::{debug, warn};

use crate::engine::error::{Error, Result};
use crate::engine::graphics::{ColorDepth, GraphicsInterface, SurfaceHandle, SurfaceReplacement};
use crate::engine::imaging::{DequeuedBuffer, NativeImageSourceQueue};

/// ### English
/// Surface rendering into a [`NativeImageSourceQueue`]; each frame dequeues one buffer and
/// enqueues it after the swap.
///
/// ### 中文
/// 渲染到 [`NativeImageSourceQueue`] 的 surface；每帧 dequeue 一个 buffer，交换后再 enqueue。
pub(crate) struct NativeBufferSurface {
    queue: NativeImageSourceQueue,
    surface: Option<SurfaceHandle>,
    drawable: Option<DequeuedBuffer>,
}

impl NativeBufferSurface {
    pub(crate) fn new(queue: NativeImageSourceQueue) -> Self {
        Self {
            queue,
            surface: None,
            drawable: None,
        }
    }

    #[inline]
    pub(crate) fn queue(&self) -> &NativeImageSourceQueue {
        &self.queue
    }

    #[inline]
    pub(crate) fn current_handle(&self) -> Option<SurfaceHandle> {
        self.surface
    }

    pub(crate) fn create(
        &mut self,
        graphics: &mut dyn GraphicsInterface,
        depth: ColorDepth,
    ) -> Result<SurfaceHandle> {
        let surface = graphics.create_window_surface(self.queue.native_handle(), depth)?;
        self.surface = Some(surface);
        Ok(surface)
    }

    pub(crate) fn replace(
        &mut self,
        graphics: &mut dyn GraphicsInterface,
    ) -> Result<SurfaceReplacement> {
        let old = self
            .surface
            .take()
            .ok_or_else(|| Error::Graphics("replace requested without a queue surface".into()))?;
        self.drawable = None;
        let replacement = graphics.replace_window_surface(old, self.queue.native_handle())?;
        self.surface = Some(replacement.handle);
        Ok(replacement)
    }

    pub(crate) fn destroy(&mut self, graphics: &mut dyn GraphicsInterface) -> Result<()> {
        self.drawable = None;
        match self.surface.take() {
            Some(surface) => graphics.destroy_surface(surface),
            None => Ok(()),
        }
    }

    /// ### English
    /// Takes the buffer this frame renders into. On exhaustion the oldest unconsumed image is
    /// dropped and the dequeue retried once; `false` skips the frame.
    ///
    /// ### 中文
    /// 取得本帧渲染使用的 buffer。队列耗尽时丢弃最早未消费的图像并重试一次；返回 `false` 表示跳过本帧。
    pub(crate) fn pre_render(&mut self) -> bool {
        if self.drawable.is_some() {
            return true;
        }
        let buffer = self.queue.dequeue_buffer().or_else(|| {
            self.queue.ignore_source_image();
            self.queue.dequeue_buffer()
        });
        match buffer {
            Some(buffer) => {
                self.drawable = Some(buffer);
                true
            }
            None => {
                warn!(counts = ?self.queue.buffer_counts(), "native buffer queue exhausted, skipping frame");
                false
            }
        }
    }

    /// ### English
    /// Publishes the frame's buffer to the consumer.
    ///
    /// ### 中文
    /// 把本帧的 buffer 发布给消费者。
    pub(crate) fn after_swap(&mut self) -> Result<()> {
        match self.drawable.take() {
            Some(buffer) => self.queue.enqueue_buffer(buffer),
            None => {
                debug!("swap without a dequeued buffer");
                Ok(())
            }
        }
    }

    /// ### English
    /// Returns a buffer dequeued for a frame that will not be presented.
    ///
    /// ### 中文
    /// 归还为不会呈现的帧所 dequeue 的 buffer。
    pub(crate) fn cancel_frame(&mut self) {
        self.drawable = None;
    }
}
