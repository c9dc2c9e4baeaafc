/// ### English
/// Post-render handshake between the render thread and the event thread.
///
/// The render thread calls `post_render_started`, hands work to the event thread (a trigger or a
/// damage report) and then blocks in `post_render_wait_for_completion` until the event thread
/// calls `post_render_complete`.
///
/// ### 中文
/// 渲染线程与事件线程之间的 post-render 握手。
///
/// 渲染线程调用 `post_render_started`，把工作交给事件线程（trigger 或 damage 报告），
/// 然后在 `post_render_wait_for_completion` 中阻塞，直到事件线程调用 `post_render_complete`。
pub trait ThreadSynchronization: Send + Sync {
    fn post_render_started(&self);

    fn post_render_wait_for_completion(&self);

    fn post_render_complete(&self);
}
