//! ### English
//! Render surfaces: the native drawables the render thread presents into.
//!
//! - [`RenderSurface`]: render-thread owner of one drawable and its graphics surface.
//! - [`SurfaceProxy`]: event-thread requests and compositor handshakes.
//! - [`ThreadSynchronization`]: post-render handshake implemented by the render controller.
//!
//! ### 中文
//! render surface：渲染线程呈现目标的原生可绘制对象。
//!
//! - [`RenderSurface`]：渲染线程持有的可绘制对象及其图形 surface。
//! - [`SurfaceProxy`]：事件线程的请求与合成器握手。
//! - [`ThreadSynchronization`]：由渲染控制器实现的 post-render 握手。

mod damage;
mod native_buffer;
mod pixmap;
mod proxy;
mod render_surface;
mod state;
mod sync;
mod window;

pub use pixmap::BUFFER_COUNT;
pub use proxy::{MINIMUM_DIMENSION_CHANGE, SurfaceProxy};
pub use render_surface::RenderSurface;
pub use state::{SurfaceState, SurfaceType};
pub use sync::ThreadSynchronization;

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    use dpi::PhysicalSize;

    use super::*;
    use crate::engine::error::Error;
    use crate::engine::geometry::Rect;
    use crate::engine::graphics::{GraphicsCall, HeadlessControl, HeadlessGraphics};
    use crate::engine::imaging::{ColorFormat, NativeImageSourceQueue};
    use crate::engine::system::{EventLoop, TriggerEventManager};
    use crate::engine::window_system::{HeadlessWindowSystem, WindowSystem};

    struct Fixture {
        _event_loop: EventLoop,
        triggers: TriggerEventManager,
        window_system: Arc<HeadlessWindowSystem>,
        graphics: HeadlessGraphics,
        control: HeadlessControl,
    }

    fn fixture() -> Fixture {
        let event_loop = EventLoop::new().unwrap();
        let triggers = TriggerEventManager::new(&event_loop.handle()).unwrap();
        let (graphics, control) = HeadlessGraphics::new();
        Fixture {
            _event_loop: event_loop,
            triggers,
            window_system: Arc::new(HeadlessWindowSystem::new(PhysicalSize::new(1280, 720))),
            graphics,
            control,
        }
    }

    impl Fixture {
        fn window(&self, position: Rect) -> RenderSurface {
            let window_system: Arc<dyn WindowSystem> = self.window_system.clone();
            RenderSurface::window(window_system, &self.triggers, position, false).unwrap()
        }
    }

    #[test]
    fn zero_size_window_is_full_screen() {
        let fx = fixture();
        let surface = fx.window(Rect::new(10, 10, 0, 480));
        assert_eq!(surface.position_size(), Rect::new(0, 0, 1280, 720));
    }

    #[test]
    fn rotated_screen_transposes_buffer() {
        let mut fx = fixture();
        fx.window_system.set_screen_rotation(90);
        let mut surface = fx.window(Rect::new(0, 0, 800, 480));
        surface.initialize_graphics(&mut fx.graphics).unwrap();
        surface.create_surface(&mut fx.graphics).unwrap();

        let window = surface.native_window().unwrap();
        assert!(fx.window_system.window_position(window).is_some());
        let sizes: Vec<_> = fx
            .control
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                GraphicsCall::CreateWindowSurface { window, .. } => Some(window),
                _ => None,
            })
            .filter_map(|egl| fx.window_system.egl_window_size(egl))
            .collect();
        assert_eq!(sizes, vec![PhysicalSize::new(480, 800)]);
        surface.destroy_surface(&mut fx.graphics).unwrap();
    }

    #[test]
    fn out_of_order_calls_are_rejected() {
        let mut fx = fixture();
        let mut surface = fx.window(Rect::new(0, 0, 64, 64));
        assert!(matches!(
            surface.create_surface(&mut fx.graphics),
            Err(Error::InvalidSurfaceState { .. })
        ));
        assert!(surface.pre_render(&mut fx.graphics, false, &[]).is_err());
        assert!(surface.post_render(&mut fx.graphics, false, false).is_err());

        surface.initialize_graphics(&mut fx.graphics).unwrap();
        assert!(matches!(
            surface.initialize_graphics(&mut fx.graphics),
            Err(Error::AlreadyInitialized)
        ));
        surface.create_surface(&mut fx.graphics).unwrap();
        surface.destroy_surface(&mut fx.graphics).unwrap();
        assert!(matches!(
            surface.destroy_surface(&mut fx.graphics),
            Err(Error::AlreadyDestroyed)
        ));
        surface.create_surface(&mut fx.graphics).unwrap();
        surface.terminate(&mut fx.graphics).unwrap();
        assert_eq!(surface.state(), SurfaceState::Terminated);
    }

    #[test]
    fn stop_render_is_safe_before_start() {
        let fx = fixture();
        let mut surface = fx.window(Rect::new(0, 0, 64, 64));
        surface.stop_render();
        assert_eq!(surface.state(), SurfaceState::Uninitialized);
    }

    #[test]
    fn partial_update_swaps_damage_when_supported() {
        let mut fx = fixture();
        fx.control.set_partial_update(true);
        fx.control.set_buffer_age(1);
        let mut surface = fx.window(Rect::new(0, 0, 100, 100));
        surface.initialize_graphics(&mut fx.graphics).unwrap();
        surface.create_surface(&mut fx.graphics).unwrap();
        assert!(surface.is_partial_update_active());

        // First frame is always a full swap.
        assert!(surface.pre_render(&mut fx.graphics, false, &[Rect::new(0, 0, 5, 5)]).unwrap());
        surface.post_render(&mut fx.graphics, false, false).unwrap();

        assert!(surface.pre_render(&mut fx.graphics, false, &[Rect::new(0, 0, 5, 5)]).unwrap());
        assert_eq!(surface.clipping_rect(), Some(Rect::new(0, 0, 5, 5)));
        surface.post_render(&mut fx.graphics, false, false).unwrap();

        let damages: Vec<_> = fx
            .control
            .calls()
            .into_iter()
            .filter_map(|call| match call {
                GraphicsCall::SwapBuffers { damage, .. } => Some(damage),
                _ => None,
            })
            .collect();
        assert_eq!(damages, vec![vec![], vec![Rect::new(0, 0, 5, 5)]]);
        surface.destroy_surface(&mut fx.graphics).unwrap();
    }

    #[test]
    fn partial_update_can_be_disabled_by_options() {
        let mut fx = fixture();
        fx.control.set_partial_update(true);
        let options = crate::engine::config::EnvironmentOptions::default().with_partial_update(false);
        let mut surface = fx.window(Rect::new(0, 0, 100, 100)).with_options(&options);
        surface.initialize_graphics(&mut fx.graphics).unwrap();
        surface.create_surface(&mut fx.graphics).unwrap();
        assert!(!surface.is_partial_update_active());
        surface.destroy_surface(&mut fx.graphics).unwrap();
    }

    #[test]
    fn move_resize_ignores_tiny_changes() {
        let fx = fixture();
        let surface = fx.window(Rect::new(0, 0, 100, 100));
        let proxy = surface.proxy();
        assert!(!proxy.move_resize(Rect::new(1, 1, 101, 101)));
        assert_eq!(proxy.position_size(), Rect::new(0, 0, 100, 100));
        assert!(proxy.move_resize(Rect::new(0, 0, 200, 100)));
        assert_eq!(proxy.position_size(), Rect::new(0, 0, 200, 100));
    }

    #[test]
    fn resize_is_applied_on_resizing_frame() {
        let mut fx = fixture();
        let mut surface = fx.window(Rect::new(0, 0, 100, 100));
        let proxy = surface.proxy();
        surface.initialize_graphics(&mut fx.graphics).unwrap();
        surface.create_surface(&mut fx.graphics).unwrap();
        assert!(proxy.move_resize(Rect::new(0, 0, 300, 200)));

        assert!(surface.pre_render(&mut fx.graphics, true, &[]).unwrap());
        surface.post_render(&mut fx.graphics, false, true).unwrap();
        let egl = fx
            .control
            .calls()
            .into_iter()
            .find_map(|call| match call {
                GraphicsCall::CreateWindowSurface { window, .. } => Some(window),
                _ => None,
            })
            .unwrap();
        assert_eq!(fx.window_system.egl_window_size(egl), Some(PhysicalSize::new(300, 200)));
        surface.destroy_surface(&mut fx.graphics).unwrap();
    }

    #[test]
    fn pixmap_flips_buffers_and_reports_damage() {
        let mut fx = fixture();
        let window_system: Arc<dyn WindowSystem> = fx.window_system.clone();
        let mut surface = RenderSurface::pixmap(window_system, Rect::new(0, 0, 32, 32), true).unwrap();
        let proxy = surface.proxy();
        assert_eq!(fx.window_system.live_pixmaps(), BUFFER_COUNT);

        surface.initialize_graphics(&mut fx.graphics).unwrap();
        surface.create_surface(&mut fx.graphics).unwrap();
        let first = surface.graphics_surface();
        assert!(surface.pre_render(&mut fx.graphics, false, &[]).unwrap());
        surface.post_render(&mut fx.graphics, false, false).unwrap();

        assert_ne!(surface.graphics_surface(), first);
        assert!(proxy.presented_drawable().is_some());
        assert_eq!(fx.window_system.damage_reports(), 1);
        assert_eq!(fx.control.swap_count(), 0);
        assert!(!proxy.release_lock());

        surface.destroy_surface(&mut fx.graphics).unwrap();
        drop(surface);
        assert_eq!(fx.window_system.live_pixmaps(), 0);
    }

    /// Plays the event thread inside the handshake: tries to release before the frame is
    /// locked, then releases while the render thread is about to wait.
    struct ReleasingSync {
        proxy: SurfaceProxy,
        post_rendering: AtomicBool,
        early_release: AtomicBool,
        waited_while_pending: AtomicBool,
    }

    impl ThreadSynchronization for ReleasingSync {
        fn post_render_started(&self) {
            self.early_release
                .store(self.proxy.release_lock(), Ordering::SeqCst);
            self.post_rendering.store(true, Ordering::SeqCst);
        }

        fn post_render_wait_for_completion(&self) {
            assert!(self.proxy.is_locked());
            assert!(self.proxy.release_lock());
            self.waited_while_pending
                .store(self.post_rendering.load(Ordering::SeqCst), Ordering::SeqCst);
        }

        fn post_render_complete(&self) {
            self.post_rendering.store(false, Ordering::SeqCst);
        }
    }

    #[test]
    fn pixmap_release_is_never_lost_to_the_started_mark() {
        let mut fx = fixture();
        let window_system: Arc<dyn WindowSystem> = fx.window_system.clone();
        let mut surface = RenderSurface::pixmap(window_system, Rect::new(0, 0, 32, 32), true).unwrap();
        let sync = Arc::new(ReleasingSync {
            proxy: surface.proxy(),
            post_rendering: AtomicBool::new(false),
            early_release: AtomicBool::new(true),
            waited_while_pending: AtomicBool::new(true),
        });
        surface.set_thread_synchronization(Some(sync.clone()));

        surface.initialize_graphics(&mut fx.graphics).unwrap();
        surface.create_surface(&mut fx.graphics).unwrap();
        assert!(surface.pre_render(&mut fx.graphics, false, &[]).unwrap());
        surface.post_render(&mut fx.graphics, false, false).unwrap();

        assert!(!sync.early_release.load(Ordering::SeqCst));
        assert!(!sync.waited_while_pending.load(Ordering::SeqCst));
        assert!(!surface.proxy().is_locked());

        surface.set_thread_synchronization(None);
        surface.destroy_surface(&mut fx.graphics).unwrap();
    }

    #[test]
    fn native_buffer_surface_publishes_frames() {
        let mut fx = fixture();
        let queue = NativeImageSourceQueue::new(16, 16, ColorFormat::Rgba8888, 2).unwrap();
        let window_system: Arc<dyn WindowSystem> = fx.window_system.clone();
        let mut surface = RenderSurface::native_buffer(window_system, queue.clone()).unwrap();
        surface.initialize_graphics(&mut fx.graphics).unwrap();
        surface.create_surface(&mut fx.graphics).unwrap();

        for _ in 0..3 {
            assert!(surface.pre_render(&mut fx.graphics, false, &[]).unwrap());
            surface.post_render(&mut fx.graphics, false, false).unwrap();
        }
        // Exhausted twice over; the ignore-and-retry path kept frames flowing.
        assert_eq!(fx.control.swap_count(), 3);
        assert_eq!(queue.buffer_counts().queued, 2);
        surface.destroy_surface(&mut fx.graphics).unwrap();
    }

    #[test]
    fn display_ownership_moves_with_transfer() {
        let fx = fixture();
        let mut first = fx.window(Rect::new(0, 0, 10, 10));
        let window = first.native_window().unwrap();
        let window_system: Arc<dyn WindowSystem> = fx.window_system.clone();
        let mut second = RenderSurface::from_native_window(
            window_system,
            &fx.triggers,
            window,
            Rect::new(0, 0, 10, 10),
            false,
        )
        .unwrap();

        first.transfer_display_owner(&mut second).unwrap();
        drop(first);
        assert_eq!(fx.window_system.live_windows(), 1);
        drop(second);
        assert_eq!(fx.window_system.live_windows(), 0);
    }
}
