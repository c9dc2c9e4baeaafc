//! ### English
//! `NativeImageSourceQueue`: a bounded producer/consumer ring of native buffers.
//!
//! Producers (render thread or worker threads) dequeue, fill and enqueue buffers. The GL thread
//! consumes them with [`NativeImageSourceQueue::prepare_texture`] and reclaims them with
//! [`NativeImageSourceQueue::free_released_buffers`]. Dequeue never blocks.
//!
//! ### 中文
//! `NativeImageSourceQueue`：有界的 native buffer 生产者/消费者环。
//!
//! 生产者（渲染线程或工作线程）dequeue、填充并 enqueue buffer。GL 线程通过
//! [`NativeImageSourceQueue::prepare_texture`] 消费，并通过
//! [`NativeImageSourceQueue::free_released_buffers`] 回收。dequeue 从不阻塞。

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use dpi::PhysicalSize;
use tracing::{debug, error, trace, warn};

use crate::engine::config::EnvironmentOptions;
use crate::engine::error::{Error, Result};
use crate::engine::graphics::{GpuFence, GraphicsInterface, TextureId};
use crate::engine::lock;
use crate::engine::window_system::NativeHandle;

use super::buffer_queue::{BufferCounts, MemoryBufferQueue, NativeBuffer, NativeBufferQueue};
use super::format::{ColorFormat, ImageView};

static NEXT_QUEUE_ID: AtomicU64 = AtomicU64::new(1);

/// ### English
/// Result of [`NativeImageSourceQueue::prepare_texture`].
///
/// ### 中文
/// [`NativeImageSourceQueue::prepare_texture`] 的结果。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PrepareTextureResult {
    /// ### English
    /// A new image was uploaded.
    ///
    /// ### 中文
    /// 已上传新图像。
    ImageChanged,
    /// ### English
    /// Nothing new; the current texture stays valid.
    ///
    /// ### 中文
    /// 无新图像；当前纹理仍有效。
    NoChange,
    /// ### English
    /// No image has ever been produced.
    ///
    /// ### 中文
    /// 尚未产生任何图像。
    NotInitialized,
    /// ### English
    /// The upload failed; the previous texture, if any, is kept.
    ///
    /// ### 中文
    /// 上传失败；保留之前的纹理（若有）。
    UnknownError,
}

/// ### English
/// CPU copy of the newest image, kept when buffers are reclaimed before the GL thread uploads it.
///
/// ### 中文
/// 最新图像的 CPU 副本；在 GL 线程上传之前回收 buffer 时保留。
struct PendingImage {
    width: u32,
    height: u32,
    stride: u32,
    pixels: Vec<u8>,
}

#[derive(Default)]
struct Bookkeeping {
    dequeued: usize,
    next_ticket: u64,
    /// Ticket of the most recent dequeue; only that buffer may be enqueued.
    last_dequeued: Option<u64>,
    resized: bool,
    pending_image: Option<PendingImage>,
    texture: Option<TextureId>,
}

struct QueueShared {
    id: u64,
    queue: Box<dyn NativeBufferQueue>,
    book: Mutex<Bookkeeping>,
}

impl QueueShared {
    fn buffer_returned(&self, ticket: u64) {
        let mut book = lock(&self.book);
        book.dequeued = book.dequeued.saturating_sub(1);
        if book.last_dequeued == Some(ticket) {
            book.last_dequeued = None;
        }
    }
}

/// ### English
/// Exclusive write access to one dequeued buffer.
///
/// Pass it to [`NativeImageSourceQueue::enqueue_buffer`] to present it; dropping it instead
/// cancels the dequeue.
///
/// ### 中文
/// 对一个已 dequeue buffer 的独占写访问。
///
/// 传给 [`NativeImageSourceQueue::enqueue_buffer`] 以呈现；若直接 drop 则取消该次 dequeue。
pub struct DequeuedBuffer {
    queue_id: u64,
    ticket: u64,
    queue: Weak<QueueShared>,
    width: u32,
    height: u32,
    stride: u32,
    native: Option<NativeBuffer>,
}

impl DequeuedBuffer {
    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn stride(&self) -> u32 {
        self.stride
    }

    pub fn pixels(&self) -> &[u8] {
        self.native.as_ref().map_or(&[], NativeBuffer::pixels)
    }

    pub fn pixels_mut(&mut self) -> &mut [u8] {
        self.native
            .as_mut()
            .map_or(&mut [], NativeBuffer::pixels_mut)
    }

    fn take_native(&mut self) -> Option<NativeBuffer> {
        self.native.take()
    }
}

impl Drop for DequeuedBuffer {
    fn drop(&mut self) {
        let Some(native) = self.native.take() else {
            return;
        };
        if let Some(shared) = self.queue.upgrade() {
            shared.queue.cancel_dequeue(native);
            shared.buffer_returned(self.ticket);
        }
    }
}

impl std::fmt::Debug for DequeuedBuffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DequeuedBuffer")
            .field("queue_id", &self.queue_id)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("stride", &self.stride)
            .finish()
    }
}

/// ### English
/// Bounded multi-buffer image queue usable as a texture source and as a surface backing store.
///
/// Cloning shares the same queue.
///
/// ### 中文
/// 有界多缓冲图像队列，可作为纹理源，也可作为 surface 的后备存储。
///
/// 克隆后共享同一个队列。
#[derive(Clone)]
pub struct NativeImageSourceQueue {
    shared: Arc<QueueShared>,
}

impl NativeImageSourceQueue {
    /// ### English
    /// Creates an in-memory queue of `depth` buffers.
    ///
    /// #### Parameters
    /// - `width`, `height`: Buffer size in pixels; both must be non-zero.
    /// - `format`: Pixel layout.
    /// - `depth`: Number of buffers in the ring.
    ///
    /// ### 中文
    /// 创建包含 `depth` 个 buffer 的内存队列。
    ///
    /// #### 参数
    /// - `width`、`height`：buffer 像素尺寸；均须非零。
    /// - `format`：像素布局。
    /// - `depth`：环中 buffer 数量。
    pub fn new(width: u32, height: u32, format: ColorFormat, depth: usize) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(Error::Graphics(format!(
                "image queue needs a non-empty size, got {width}x{height}"
            )));
        }
        let queue = MemoryBufferQueue::new(PhysicalSize::new(width, height), format, depth);
        Ok(Self::with_queue(Box::new(queue)))
    }

    /// ### English
    /// Creates an in-memory queue whose depth comes from `options`.
    ///
    /// ### 中文
    /// 创建内存队列，深度取自 `options`。
    pub fn with_options(
        width: u32,
        height: u32,
        format: ColorFormat,
        options: &EnvironmentOptions,
    ) -> Result<Self> {
        Self::new(width, height, format, options.buffer_queue_size())
    }

    /// ### English
    /// Wraps a platform queue.
    ///
    /// ### 中文
    /// 包装一个平台队列。
    pub fn with_queue(queue: Box<dyn NativeBufferQueue>) -> Self {
        let id = NEXT_QUEUE_ID.fetch_add(1, Ordering::Relaxed);
        debug!(
            id,
            size = ?queue.size(),
            depth = queue.capacity(),
            format = ?queue.format(),
            "image queue created"
        );
        Self {
            shared: Arc::new(QueueShared {
                id,
                queue,
                book: Mutex::new(Bookkeeping::default()),
            }),
        }
    }

    pub fn native_handle(&self) -> NativeHandle {
        self.shared.queue.handle()
    }

    pub fn size(&self) -> PhysicalSize<u32> {
        self.shared.queue.size()
    }

    pub fn format(&self) -> ColorFormat {
        self.shared.queue.format()
    }

    pub fn queue_depth(&self) -> usize {
        self.shared.queue.capacity()
    }

    pub fn is_blending_required(&self) -> bool {
        self.format().is_blending_required()
    }

    pub fn buffer_counts(&self) -> BufferCounts {
        self.shared.queue.counts()
    }

    pub fn can_dequeue_buffer(&self) -> bool {
        self.shared.queue.can_dequeue()
    }

    /// ### English
    /// Takes a free buffer for writing, or `None` when every buffer is in use.
    ///
    /// ### 中文
    /// 取得一个空闲 buffer 用于写入；所有 buffer 都在使用中时返回 `None`。
    pub fn dequeue_buffer(&self) -> Option<DequeuedBuffer> {
        let native = self.shared.queue.dequeue()?;
        let ticket = {
            let mut book = lock(&self.shared.book);
            book.dequeued += 1;
            book.next_ticket += 1;
            book.last_dequeued = Some(book.next_ticket);
            book.next_ticket
        };
        trace!(queue = self.shared.id, slot = native.slot(), ticket, "buffer dequeued");
        Some(DequeuedBuffer {
            queue_id: self.shared.id,
            ticket,
            queue: Arc::downgrade(&self.shared),
            width: native.width(),
            height: native.height(),
            stride: native.stride(),
            native: Some(native),
        })
    }

    /// ### English
    /// Hands a filled buffer to the consumer.
    ///
    /// Fails with [`Error::UnknownBuffer`] if `buffer` is not the most recently dequeued buffer
    /// of this queue, or was dequeued before the last [`NativeImageSourceQueue::set_size`].
    /// A rejected buffer is dropped, which cancels its dequeue.
    ///
    /// ### 中文
    /// 将写好的 buffer 交给消费者。
    ///
    /// 若 `buffer` 不是本队列最近一次 dequeue 的 buffer、或在最近一次
    /// [`NativeImageSourceQueue::set_size`] 之前 dequeue，则返回 [`Error::UnknownBuffer`]。
    /// 被拒绝的 buffer 会被 drop，从而取消其 dequeue。
    pub fn enqueue_buffer(&self, mut buffer: DequeuedBuffer) -> Result<()> {
        if buffer.queue_id != self.shared.id {
            return Err(Error::UnknownBuffer);
        }
        let latest = lock(&self.shared.book).last_dequeued;
        if latest != Some(buffer.ticket) {
            warn!(
                queue = self.shared.id,
                ticket = buffer.ticket,
                ?latest,
                "rejected buffer that is not the most recent dequeue"
            );
            return Err(Error::UnknownBuffer);
        }
        let Some(native) = buffer.take_native() else {
            return Err(Error::UnknownBuffer);
        };
        let result = self.shared.queue.enqueue(native);
        self.shared.buffer_returned(buffer.ticket);
        match result {
            Ok(()) => Ok(()),
            Err(stale) => {
                warn!(queue = self.shared.id, slot = stale.slot(), "rejected stale buffer");
                Err(Error::UnknownBuffer)
            }
        }
    }

    /// ### English
    /// Returns a dequeued buffer without presenting it.
    ///
    /// ### 中文
    /// 归还一个已 dequeue 的 buffer 而不呈现。
    pub fn cancel_dequeued_buffer(&self, mut buffer: DequeuedBuffer) -> Result<()> {
        if buffer.queue_id != self.shared.id {
            return Err(Error::UnknownBuffer);
        }
        if let Some(native) = buffer.take_native() {
            self.shared.queue.cancel_dequeue(native);
            self.shared.buffer_returned(buffer.ticket);
        }
        Ok(())
    }

    /// ### English
    /// Drops the oldest image the consumer has not taken yet, freeing its slot.
    ///
    /// ### 中文
    /// 丢弃消费者尚未取走的最早图像，释放其槽位。
    pub fn ignore_source_image(&self) {
        if let Some(buffer) = self.shared.queue.acquire() {
            trace!(queue = self.shared.id, slot = buffer.slot(), "source image ignored");
            self.shared.queue.release(buffer, GpuFence::signaled());
        }
    }

    /// ### English
    /// Reclaims buffers the consumer is done with. Call once per frame on the GL thread.
    ///
    /// Queued images are collapsed to the newest one, which is copied aside for the next
    /// [`NativeImageSourceQueue::prepare_texture`]; released buffers whose GPU fences have
    /// signaled become free. Returns how many buffers are free afterwards.
    ///
    /// ### 中文
    /// 回收消费者已用完的 buffer；应在 GL 线程上每帧调用一次。
    ///
    /// 已入队的图像被合并为最新的一张，并复制一份留给下一次
    /// [`NativeImageSourceQueue::prepare_texture`]；GPU fence 已触发的已释放 buffer 变为空闲。
    /// 返回之后空闲的 buffer 数量。
    pub fn free_released_buffers(&self) -> usize {
        if let Some(latest) = self.acquire_latest() {
            let pending = PendingImage {
                width: latest.width(),
                height: latest.height(),
                stride: latest.stride(),
                pixels: latest.pixels().to_vec(),
            };
            self.shared.queue.release(latest, GpuFence::signaled());
            lock(&self.shared.book).pending_image = Some(pending);
        }

        let reclaimed = self.shared.queue.reclaim();
        if reclaimed > 0 {
            trace!(queue = self.shared.id, reclaimed, "released buffers reclaimed");
        }
        self.shared.queue.counts().free
    }

    /// ### English
    /// Uploads the newest image into the queue's texture. GL thread only.
    ///
    /// ### 中文
    /// 把最新图像上传到队列的纹理；仅限 GL 线程。
    pub fn prepare_texture(&self, graphics: &mut dyn GraphicsInterface) -> PrepareTextureResult {
        let format = self.format();
        let latest = self.acquire_latest();
        let mut book = lock(&self.shared.book);

        if book.resized {
            book.resized = false;
            book.texture = None;
        }

        let result = match latest {
            Some(buffer) => {
                let uploaded = graphics.upload_texture(book.texture, &buffer.view());
                match uploaded {
                    Ok((texture, fence)) => {
                        book.texture = Some(texture);
                        book.pending_image = None;
                        self.shared.queue.release(buffer, fence);
                        PrepareTextureResult::ImageChanged
                    }
                    Err(err) => {
                        error!(%err, queue = self.shared.id, "texture upload failed");
                        self.shared.queue.release(buffer, GpuFence::signaled());
                        PrepareTextureResult::UnknownError
                    }
                }
            }
            None => match book.pending_image.take() {
                Some(image) => {
                    let view = ImageView {
                        width: image.width,
                        height: image.height,
                        stride: image.stride,
                        format,
                        pixels: &image.pixels,
                    };
                    match graphics.upload_texture(book.texture, &view) {
                        Ok((texture, _fence)) => {
                            book.texture = Some(texture);
                            PrepareTextureResult::ImageChanged
                        }
                        Err(err) => {
                            error!(%err, queue = self.shared.id, "texture upload failed");
                            PrepareTextureResult::UnknownError
                        }
                    }
                }
                None if book.texture.is_some() => PrepareTextureResult::NoChange,
                None => PrepareTextureResult::NotInitialized,
            },
        };
        drop(book);

        self.shared.queue.reclaim();
        result
    }

    /// ### English
    /// Binds the texture produced by the last successful [`NativeImageSourceQueue::prepare_texture`].
    ///
    /// ### 中文
    /// 绑定最近一次成功的 [`NativeImageSourceQueue::prepare_texture`] 生成的纹理。
    pub fn target_texture(&self, graphics: &mut dyn GraphicsInterface) -> Result<()> {
        let texture = lock(&self.shared.book).texture.ok_or(Error::NotInitialized)?;
        graphics.bind_texture(texture)
    }

    /// ### English
    /// Resizes every buffer. Refused while a buffer is dequeued.
    ///
    /// ### 中文
    /// 调整所有 buffer 的尺寸；存在已 dequeue 的 buffer 时拒绝执行。
    pub fn set_size(&self, width: u32, height: u32) -> Result<()> {
        let size = PhysicalSize::new(width, height);
        if self.size() == size {
            return Ok(());
        }
        let mut book = lock(&self.shared.book);
        if book.dequeued > 0 {
            return Err(Error::BuffersInFlight(book.dequeued));
        }
        self.shared.queue.reset(size);
        book.resized = true;
        book.pending_image = None;
        debug!(queue = self.shared.id, ?size, "image queue resized");
        Ok(())
    }

    /// ### English
    /// Buffers currently held by producers.
    ///
    /// ### 中文
    /// 生产者当前持有的 buffer 数量。
    pub fn dequeued_count(&self) -> usize {
        lock(&self.shared.book).dequeued
    }

    /// ### English
    /// Acquires every queued image and keeps only the newest; older ones are released unread.
    ///
    /// ### 中文
    /// acquire 所有已入队图像，仅保留最新一张；较旧的未读即释放。
    fn acquire_latest(&self) -> Option<NativeBuffer> {
        let mut latest: Option<NativeBuffer> = None;
        while let Some(buffer) = self.shared.queue.acquire() {
            if let Some(older) = latest.replace(buffer) {
                self.shared.queue.release(older, GpuFence::signaled());
            }
        }
        latest
    }
}

impl std::fmt::Debug for NativeImageSourceQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeImageSourceQueue")
            .field("id", &self.shared.id)
            .field("size", &self.size())
            .field("format", &self.format())
            .finish()
    }
}
