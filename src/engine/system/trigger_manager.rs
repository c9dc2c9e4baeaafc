//! ### English
//! One wakeup descriptor shared by every [`TriggerEvent`] of an event loop.
//!
//! `trigger` inserts the event id into a pending set under a mutex and writes the descriptor only
//! when no write is outstanding. On the loop thread the descriptor is drained, the pending set is
//! swapped out and each still-valid callback runs once. Repeated triggers before dispatch coalesce.
//!
//! ### 中文
//! 同一事件循环上所有 [`TriggerEvent`] 共用的一个唤醒描述符。
//!
//! `trigger` 在互斥锁下把事件 id 放入待处理集合，仅当没有未消费的写入时才写描述符。
//! 在事件循环线程上：读空描述符、换出待处理集合、对仍有效的回调各执行一次。
//! 分发前的多次触发会合并为一次。

use std::collections::{BTreeSet, HashMap};
use std::mem;
use std::os::fd::RawFd;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, Weak};

use tracing::{debug, error, trace, warn};

use crate::engine::error::Result;
use crate::engine::lock;

use super::event_loop::EventLoopHandle;
use super::eventfd::EventFd;
use super::fd_monitor::{FdEvents, FileDescriptorMonitor};
use super::trigger::{TriggerCallback, TriggerEvent, TriggerId, TriggerOptions};

struct TriggerEntry {
    /// ### English
    /// `None` while the callback runs on the loop thread.
    ///
    /// ### 中文
    /// 回调在事件循环线程上执行期间为 `None`。
    callback: Option<TriggerCallback>,
    options: TriggerOptions,
}

#[derive(Default)]
struct PendingBatch {
    ids: BTreeSet<TriggerId>,
    descriptor_written: bool,
}

pub(crate) struct ManagerInner {
    eventfd: EventFd,
    pending: Mutex<PendingBatch>,
    entries: Mutex<HashMap<TriggerId, TriggerEntry>>,
    /// ### English
    /// Callbacks of discarded events, dropped after the next dispatch batch.
    ///
    /// ### 中文
    /// 已丢弃事件的回调；在下一批分发结束后释放。
    discarded: Mutex<Vec<TriggerCallback>>,
    next_id: AtomicU32,
    monitor: Mutex<Option<FileDescriptorMonitor>>,
}

impl ManagerInner {
    /// ### English
    /// Marks `id` pending (or just wakes the loop when `id` is `None`). Never blocks beyond the
    /// short pending-set lock.
    ///
    /// ### 中文
    /// 将 `id` 标记为待处理（`id` 为 `None` 时仅唤醒事件循环）。除短暂持有待处理集合锁外不会阻塞。
    pub(crate) fn trigger(&self, id: Option<TriggerId>) -> Result<()> {
        let mut pending = lock(&self.pending);
        if let Some(id) = id {
            pending.ids.insert(id);
        }
        if !pending.descriptor_written {
            if let Err(err) = self.eventfd.notify() {
                error!(%err, fd = self.eventfd.as_raw_fd(), "failed to write trigger descriptor");
                return Err(err.into());
            }
            pending.descriptor_written = true;
        }
        Ok(())
    }

    pub(crate) fn discard(&self, id: TriggerId) {
        let callback = lock(&self.entries)
            .remove(&id)
            .and_then(|entry| entry.callback);

        /* ### English
         * A `None` callback is mid-flight on the loop thread; the dispatcher drops it on return.
         * ### 中文
         * 回调为 `None` 表示正在事件循环线程上执行；由分发器在其返回后释放。
         */
        if let Some(callback) = callback {
            lock(&self.discarded).push(callback);
            let _ = self.trigger(None);
        }
        trace!(id = id.0, "trigger event discarded");
    }

    pub(crate) fn is_valid(&self, id: TriggerId) -> bool {
        lock(&self.entries).contains_key(&id)
    }

    fn triggered(&self, events: FdEvents) {
        if !events.contains(FdEvents::READABLE) {
            error!(?events, "trigger descriptor reported an unexpected event");
            return;
        }

        if let Err(err) = self.eventfd.drain() {
            warn!(%err, "failed to drain trigger descriptor");
        }

        let doomed = mem::take(&mut *lock(&self.discarded));
        let batch = {
            let mut pending = lock(&self.pending);
            pending.descriptor_written = false;
            mem::take(&mut pending.ids)
        };

        for id in batch {
            let taken = lock(&self.entries).get_mut(&id).and_then(|entry| {
                entry
                    .callback
                    .take()
                    .map(|callback| (callback, entry.options))
            });
            let Some((mut callback, options)) = taken else {
                continue;
            };

            callback();

            let leftover = {
                let mut entries = lock(&self.entries);
                match options {
                    TriggerOptions::DeleteAfterTrigger => {
                        entries.remove(&id);
                        Some(callback)
                    }
                    TriggerOptions::KeepAliveAfterTrigger => match entries.get_mut(&id) {
                        Some(entry) => {
                            entry.callback = Some(callback);
                            None
                        }
                        None => Some(callback),
                    },
                }
            };
            drop(leftover);
        }

        drop(doomed);

        if !lock(&self.discarded).is_empty() {
            let _ = self.trigger(None);
        }
    }
}

/// ### English
/// Factory and dispatcher for [`TriggerEvent`]s bound to one event loop.
///
/// Cloning shares the same descriptor.
///
/// ### 中文
/// 绑定到某个事件循环的 [`TriggerEvent`] 工厂与分发器。
///
/// 克隆后共享同一个描述符。
#[derive(Clone)]
pub struct TriggerEventManager {
    inner: Arc<ManagerInner>,
}

impl TriggerEventManager {
    /// ### English
    /// Creates the shared descriptor and registers it on `event_loop`.
    ///
    /// ### 中文
    /// 创建共享描述符并注册到 `event_loop`。
    pub fn new(event_loop: &EventLoopHandle) -> Result<Self> {
        let inner = Arc::new(ManagerInner {
            eventfd: EventFd::new()?,
            pending: Mutex::new(PendingBatch::default()),
            entries: Mutex::new(HashMap::new()),
            discarded: Mutex::new(Vec::new()),
            next_id: AtomicU32::new(1),
            monitor: Mutex::new(None),
        });

        let weak: Weak<ManagerInner> = Arc::downgrade(&inner);
        let monitor = FileDescriptorMonitor::new(
            event_loop,
            inner.eventfd.as_raw_fd(),
            FdEvents::READABLE,
            move |events, _fd| {
                if let Some(inner) = weak.upgrade() {
                    inner.triggered(events);
                }
            },
        )?;
        *lock(&inner.monitor) = Some(monitor);
        debug!(fd = inner.eventfd.as_raw_fd(), "trigger event manager ready");

        Ok(Self { inner })
    }

    /// ### English
    /// Creates a trigger event whose `callback` runs on the event loop thread.
    ///
    /// #### Parameters
    /// - `callback`: Invoked once per dispatch cycle in which the event was triggered.
    /// - `options`: Whether the event survives its first invocation.
    ///
    /// ### 中文
    /// 创建一个 trigger event，其 `callback` 在事件循环线程上执行。
    ///
    /// #### 参数
    /// - `callback`：在每个被触发过的分发周期内执行一次。
    /// - `options`：事件在首次执行后是否保留。
    pub fn create_trigger_event<F>(&self, callback: F, options: TriggerOptions) -> TriggerEvent
    where
        F: FnMut() + Send + 'static,
    {
        let id = TriggerId(self.inner.next_id.fetch_add(1, Ordering::Relaxed));
        lock(&self.inner.entries).insert(
            id,
            TriggerEntry {
                callback: Some(Box::new(callback)),
                options,
            },
        );
        TriggerEvent::new(id, self.inner.clone())
    }

    /// ### English
    /// Number of events waiting for the next dispatch.
    ///
    /// ### 中文
    /// 等待下一次分发的事件数量。
    pub fn pending_count(&self) -> usize {
        lock(&self.inner.pending).ids.len()
    }

    /// ### English
    /// Number of trigger events that are still valid.
    ///
    /// ### 中文
    /// 仍然有效的 trigger event 数量。
    pub fn live_count(&self) -> usize {
        lock(&self.inner.entries).len()
    }

    pub fn descriptor(&self) -> RawFd {
        self.inner.eventfd.as_raw_fd()
    }
}
