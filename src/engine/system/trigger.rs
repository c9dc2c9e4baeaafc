use std::sync::{Arc, Weak};

use tracing::warn;

use crate::engine::error::Result;

use super::trigger_manager::ManagerInner;

pub(crate) type TriggerCallback = Box<dyn FnMut() + Send + 'static>;

/// ### English
/// Identifier of a trigger event, unique within its manager.
///
/// ### 中文
/// trigger event 的标识；在所属 manager 内唯一。
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TriggerId(pub(crate) u32);

/// ### English
/// Lifetime policy of a trigger event.
///
/// ### 中文
/// trigger event 的生命周期策略。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TriggerOptions {
    /// ### English
    /// Fires on every dispatch cycle in which it was triggered.
    ///
    /// ### 中文
    /// 每个被触发过的分发周期都会执行。
    KeepAliveAfterTrigger,
    /// ### English
    /// Fires at most once; the callback is released afterwards.
    ///
    /// ### 中文
    /// 最多执行一次，之后释放回调。
    DeleteAfterTrigger,
}

/// ### English
/// Cross-thread wakeup token. `trigger` may be called from any thread; the callback always runs on
/// the event loop thread. Dropping the event discards it, including any pending trigger.
///
/// ### 中文
/// 跨线程唤醒令牌。`trigger` 可在任意线程调用；回调总是在事件循环线程上执行。
/// drop 时丢弃该事件（包括尚未分发的触发）。
pub struct TriggerEvent {
    id: TriggerId,
    manager: Arc<ManagerInner>,
}

impl TriggerEvent {
    pub(crate) fn new(id: TriggerId, manager: Arc<ManagerInner>) -> Self {
        Self { id, manager }
    }

    #[inline]
    pub fn id(&self) -> TriggerId {
        self.id
    }

    /// ### English
    /// Requests the callback to run on the event loop thread. Coalesces with other pending
    /// triggers of this event.
    ///
    /// Fails only if the shared descriptor cannot be written (already logged).
    ///
    /// ### 中文
    /// 请求在事件循环线程上执行回调；与该事件尚未分发的其它触发合并。
    ///
    /// 仅在共享描述符写入失败时返回错误（已记录日志）。
    pub fn trigger(&self) -> Result<()> {
        self.manager.trigger(Some(self.id))
    }

    /// ### English
    /// `false` once a one-shot event has fired.
    ///
    /// ### 中文
    /// 一次性事件执行后返回 `false`。
    pub fn is_valid(&self) -> bool {
        self.manager.is_valid(self.id)
    }

    /// ### English
    /// Returns a cloneable trigger-only handle that does not keep the event alive.
    ///
    /// ### 中文
    /// 返回一个可克隆、仅可触发的句柄；它不会延长事件的生命周期。
    pub fn handle(&self) -> TriggerHandle {
        TriggerHandle {
            id: self.id,
            manager: Arc::downgrade(&self.manager),
        }
    }
}

impl Drop for TriggerEvent {
    fn drop(&mut self) {
        self.manager.discard(self.id);
    }
}

impl std::fmt::Debug for TriggerEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TriggerEvent").field("id", &self.id).finish()
    }
}

/// ### English
/// Weak, cloneable handle used by code that only needs to fire an event it does not own.
///
/// ### 中文
/// 弱引用、可克隆的句柄；供只需触发而不持有事件的代码使用。
#[derive(Clone, Debug)]
pub struct TriggerHandle {
    id: TriggerId,
    manager: Weak<ManagerInner>,
}

impl TriggerHandle {
    /// ### English
    /// Triggers the event. Returns `false` if the event was discarded or the trigger failed.
    ///
    /// ### 中文
    /// 触发事件；若事件已被丢弃或触发失败则返回 `false`。
    pub fn trigger(&self) -> bool {
        let Some(manager) = self.manager.upgrade() else {
            return false;
        };
        if !manager.is_valid(self.id) {
            return false;
        }
        match manager.trigger(Some(self.id)) {
            Ok(()) => true,
            Err(err) => {
                warn!(%err, id = self.id.0, "trigger handle failed");
                false
            }
        }
    }

    #[inline]
    pub fn id(&self) -> TriggerId {
        self.id
    }
}
