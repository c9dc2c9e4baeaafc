//! ### English
//! Platform buffer queue contract (tbm_surface_queue style) and an in-memory implementation.
//!
//! Buffer storage moves with ownership: `dequeue`/`acquire` hand the pixels out, `enqueue`/
//! `release`/`cancel_dequeue` give them back. A released buffer only becomes free again once its
//! GPU fence has signaled.
//!
//! ### 中文
//! 平台 buffer 队列契约（tbm_surface_queue 风格）及其内存实现。
//!
//! buffer 存储随所有权移动：`dequeue`/`acquire` 交出像素，`enqueue`/`release`/`cancel_dequeue`
//! 归还。被 release 的 buffer 只有在其 GPU fence 触发后才会重新变为空闲。

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use dpi::PhysicalSize;
use tracing::{debug, warn};

use crate::engine::graphics::GpuFence;
use crate::engine::lock;
use crate::engine::window_system::NativeHandle;

use super::counter::LiveBuffer;
use super::format::{ColorFormat, ImageView};

static NEXT_QUEUE_HANDLE: AtomicU64 = AtomicU64::new(1 << 32);

#[derive(Debug)]
struct BufferStorage {
    pixels: Box<[u8]>,
    _live: LiveBuffer,
}

/// ### English
/// A native buffer currently owned by the producer (dequeued) or the consumer (acquired).
///
/// ### 中文
/// 当前由生产者（已 dequeue）或消费者（已 acquire）持有的 native buffer。
#[derive(Debug)]
pub struct NativeBuffer {
    slot: usize,
    generation: u64,
    width: u32,
    height: u32,
    stride: u32,
    format: ColorFormat,
    storage: BufferStorage,
}

impl NativeBuffer {
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

    #[inline]
    pub fn slot(&self) -> usize {
        self.slot
    }

    #[inline]
    pub fn pixels(&self) -> &[u8] {
        &self.storage.pixels
    }

    #[inline]
    pub fn pixels_mut(&mut self) -> &mut [u8] {
        &mut self.storage.pixels
    }

    pub fn view(&self) -> ImageView<'_> {
        ImageView {
            width: self.width,
            height: self.height,
            stride: self.stride,
            format: self.format,
            pixels: &self.storage.pixels,
        }
    }
}

/// ### English
/// Per-state buffer counts, for diagnostics.
///
/// ### 中文
/// 各状态下的 buffer 数量，用于诊断。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BufferCounts {
    pub free: usize,
    pub dequeued: usize,
    pub queued: usize,
    pub acquired: usize,
    pub release_pending: usize,
}

/// ### English
/// Platform buffer queue. Implementations are internally locked and callable from any thread.
///
/// ### 中文
/// 平台 buffer 队列。实现自带内部锁，可在任意线程调用。
pub trait NativeBufferQueue: Send + Sync {
    /// ### English
    /// Handle to hand to the graphics backend as a native window.
    ///
    /// ### 中文
    /// 作为原生窗口交给图形后端的句柄。
    fn handle(&self) -> NativeHandle;

    fn size(&self) -> PhysicalSize<u32>;

    fn format(&self) -> ColorFormat;

    fn capacity(&self) -> usize;

    fn can_dequeue(&self) -> bool;

    fn dequeue(&self) -> Option<NativeBuffer>;

    /// ### English
    /// Hands a filled buffer to the consumer. A buffer that is not dequeued from the current
    /// generation of this queue is returned unchanged.
    ///
    /// ### 中文
    /// 将写好的 buffer 交给消费者。不属于本队列当前代次、或未处于 dequeue 状态的 buffer 会原样返回。
    fn enqueue(&self, buffer: NativeBuffer) -> Result<(), NativeBuffer>;

    fn cancel_dequeue(&self, buffer: NativeBuffer);

    fn can_acquire(&self) -> bool;

    /// ### English
    /// Takes the oldest queued buffer.
    ///
    /// ### 中文
    /// 取出最早入队的 buffer。
    fn acquire(&self) -> Option<NativeBuffer>;

    /// ### English
    /// Returns an acquired buffer. It becomes free immediately if `fence` has signaled, otherwise
    /// on a later [`NativeBufferQueue::reclaim`].
    ///
    /// ### 中文
    /// 归还已 acquire 的 buffer。若 `fence` 已触发则立即变为空闲，否则等到之后的
    /// [`NativeBufferQueue::reclaim`]。
    fn release(&self, buffer: NativeBuffer, fence: GpuFence);

    /// ### English
    /// Frees released buffers whose fences have signaled. Returns how many were freed.
    ///
    /// ### 中文
    /// 回收 fence 已触发的已释放 buffer；返回回收数量。
    fn reclaim(&self) -> usize;

    /// ### English
    /// Drops every buffer and starts a new generation at `size`. Buffers still handed out become
    /// stale and are discarded when they come back.
    ///
    /// ### 中文
    /// 丢弃所有 buffer 并以 `size` 开始新的代次。仍在外部的 buffer 变为过期，归还时直接丢弃。
    fn reset(&self, size: PhysicalSize<u32>);

    fn counts(&self) -> BufferCounts;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum BufferState {
    Free,
    Dequeued,
    Queued,
    Acquired,
    ReleasePending,
}

#[derive(Debug)]
struct Slot {
    state: BufferState,
    storage: Option<BufferStorage>,
    fence: Option<GpuFence>,
}

impl Slot {
    fn empty() -> Self {
        Self {
            state: BufferState::Free,
            storage: None,
            fence: None,
        }
    }
}

#[derive(Debug)]
struct MemoryQueueState {
    generation: u64,
    size: PhysicalSize<u32>,
    slots: Vec<Slot>,
    queued: VecDeque<usize>,
}

/// ### English
/// Heap-backed [`NativeBufferQueue`]. Storage is allocated lazily on first dequeue of a slot.
///
/// ### 中文
/// 基于堆内存的 [`NativeBufferQueue`]；槽位存储在首次 dequeue 时才分配。
#[derive(Debug)]
pub struct MemoryBufferQueue {
    handle: NativeHandle,
    format: ColorFormat,
    capacity: usize,
    state: Mutex<MemoryQueueState>,
}

impl MemoryBufferQueue {
    pub fn new(size: PhysicalSize<u32>, format: ColorFormat, capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            handle: NativeHandle(NEXT_QUEUE_HANDLE.fetch_add(1, Ordering::Relaxed)),
            format,
            capacity,
            state: Mutex::new(MemoryQueueState {
                generation: 1,
                size,
                slots: (0..capacity).map(|_| Slot::empty()).collect(),
                queued: VecDeque::with_capacity(capacity),
            }),
        }
    }

    #[inline]
    fn stride(&self, size: PhysicalSize<u32>) -> u32 {
        size.width * self.format.bytes_per_pixel()
    }

    /// ### English
    /// Puts storage back into its slot if the buffer is current and in `expected` state.
    ///
    /// ### 中文
    /// 若 buffer 属于当前代次且处于 `expected` 状态，则把存储放回槽位。
    fn take_back(
        state: &mut MemoryQueueState,
        buffer: NativeBuffer,
        expected: BufferState,
    ) -> Result<usize, NativeBuffer> {
        if buffer.generation != state.generation {
            return Err(buffer);
        }
        let Some(slot) = state.slots.get_mut(buffer.slot) else {
            return Err(buffer);
        };
        if slot.state != expected || slot.storage.is_some() {
            return Err(buffer);
        }
        let index = buffer.slot;
        slot.storage = Some(buffer.storage);
        Ok(index)
    }

    fn hand_out(&self, state: &mut MemoryQueueState, index: usize) -> Option<NativeBuffer> {
        let generation = state.generation;
        let size = state.size;
        let storage = state.slots.get_mut(index)?.storage.take()?;
        Some(NativeBuffer {
            slot: index,
            generation,
            width: size.width,
            height: size.height,
            stride: self.stride(size),
            format: self.format,
            storage,
        })
    }
}

impl NativeBufferQueue for MemoryBufferQueue {
    fn handle(&self) -> NativeHandle {
        self.handle
    }

    fn size(&self) -> PhysicalSize<u32> {
        lock(&self.state).size
    }

    fn format(&self) -> ColorFormat {
        self.format
    }

    fn capacity(&self) -> usize {
        self.capacity
    }

    fn can_dequeue(&self) -> bool {
        lock(&self.state)
            .slots
            .iter()
            .any(|slot| slot.state == BufferState::Free)
    }

    fn dequeue(&self) -> Option<NativeBuffer> {
        let mut state = lock(&self.state);
        let index = state
            .slots
            .iter()
            .position(|slot| slot.state == BufferState::Free)?;

        let bytes = self.stride(state.size) as usize * state.size.height as usize;
        let slot = &mut state.slots[index];
        if slot.storage.is_none() {
            slot.storage = Some(BufferStorage {
                pixels: vec![0u8; bytes].into_boxed_slice(),
                _live: LiveBuffer::new(),
            });
        }
        slot.state = BufferState::Dequeued;
        self.hand_out(&mut state, index)
    }

    fn enqueue(&self, buffer: NativeBuffer) -> Result<(), NativeBuffer> {
        let mut state = lock(&self.state);
        let index = Self::take_back(&mut state, buffer, BufferState::Dequeued)?;
        state.slots[index].state = BufferState::Queued;
        state.queued.push_back(index);
        Ok(())
    }

    fn cancel_dequeue(&self, buffer: NativeBuffer) {
        let mut state = lock(&self.state);
        match Self::take_back(&mut state, buffer, BufferState::Dequeued) {
            Ok(index) => state.slots[index].state = BufferState::Free,
            Err(stale) => debug!(slot = stale.slot, "dropping stale dequeued buffer"),
        }
    }

    fn can_acquire(&self) -> bool {
        !lock(&self.state).queued.is_empty()
    }

    fn acquire(&self) -> Option<NativeBuffer> {
        let mut state = lock(&self.state);
        let index = state.queued.pop_front()?;
        state.slots[index].state = BufferState::Acquired;
        self.hand_out(&mut state, index)
    }

    fn release(&self, buffer: NativeBuffer, fence: GpuFence) {
        let mut state = lock(&self.state);
        match Self::take_back(&mut state, buffer, BufferState::Acquired) {
            Ok(index) => {
                let slot = &mut state.slots[index];
                if fence.is_signaled() {
                    slot.state = BufferState::Free;
                    slot.fence = None;
                } else {
                    slot.state = BufferState::ReleasePending;
                    slot.fence = Some(fence);
                }
            }
            Err(stale) => debug!(slot = stale.slot, "dropping stale acquired buffer"),
        }
    }

    fn reclaim(&self) -> usize {
        let mut state = lock(&self.state);
        let mut freed = 0;
        for slot in state.slots.iter_mut() {
            if slot.state != BufferState::ReleasePending {
                continue;
            }
            let signaled = slot.fence.as_ref().is_none_or(GpuFence::is_signaled);
            if signaled {
                slot.state = BufferState::Free;
                slot.fence = None;
                freed += 1;
            }
        }
        freed
    }

    fn reset(&self, size: PhysicalSize<u32>) {
        let mut state = lock(&self.state);
        let outstanding = state
            .slots
            .iter()
            .filter(|slot| matches!(slot.state, BufferState::Dequeued | BufferState::Acquired))
            .count();
        if outstanding > 0 {
            warn!(outstanding, "resetting queue with buffers still handed out");
        }
        state.generation += 1;
        state.size = size;
        state.queued.clear();
        state.slots = (0..self.capacity).map(|_| Slot::empty()).collect();
    }

    fn counts(&self) -> BufferCounts {
        let state = lock(&self.state);
        let mut counts = BufferCounts::default();
        for slot in &state.slots {
            match slot.state {
                BufferState::Free => counts.free += 1,
                BufferState::Dequeued => counts.dequeued += 1,
                BufferState::Queued => counts.queued += 1,
                BufferState::Acquired => counts.acquired += 1,
                BufferState::ReleasePending => counts.release_pending += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn queue(capacity: usize) -> MemoryBufferQueue {
        MemoryBufferQueue::new(PhysicalSize::new(4, 2), ColorFormat::Rgba8888, capacity)
    }

    #[test]
    fn buffers_follow_the_ring() {
        let queue = queue(2);
        let mut a = queue.dequeue().unwrap();
        assert_eq!(a.stride(), 16);
        assert_eq!(a.pixels().len(), 32);
        a.pixels_mut()[0] = 0xAB;
        let _b = queue.dequeue().unwrap();
        assert!(!queue.can_dequeue());
        assert!(queue.dequeue().is_none());

        queue.enqueue(a).unwrap();
        let acquired = queue.acquire().unwrap();
        assert_eq!(acquired.pixels()[0], 0xAB);

        let fence = GpuFence::pending();
        queue.release(acquired, fence.clone());
        assert_eq!(queue.counts().release_pending, 1);
        assert_eq!(queue.reclaim(), 0);
        fence.signal();
        assert_eq!(queue.reclaim(), 1);
        assert!(queue.can_dequeue());
    }

    #[test]
    fn stale_buffers_are_rejected_after_reset() {
        let queue = queue(2);
        let buffer = queue.dequeue().unwrap();
        queue.reset(PhysicalSize::new(8, 8));
        let rejected = queue.enqueue(buffer).unwrap_err();
        drop(rejected);
        assert_eq!(queue.counts().free, 2);
        assert_eq!(queue.dequeue().unwrap().pixels().len(), 8 * 8 * 4);
    }

    #[test]
    fn cancel_returns_the_slot() {
        let queue = queue(1);
        let buffer = queue.dequeue().unwrap();
        queue.cancel_dequeue(buffer);
        assert!(queue.can_dequeue());
        assert!(!queue.can_acquire());
    }
}
