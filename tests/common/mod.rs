#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use dpi::PhysicalSize;
use render_adaptor::engine::graphics::HeadlessControl;
use render_adaptor::{
    AdaptorContext, EnvironmentOptions, EventLoop, FrameInfo, GraphicsFactory,
    HeadlessGraphicsFactory, HeadlessWindowSystem, RenderContext, RenderStatus, SceneCore,
    UpdateStatus, WindowSystem,
};

pub fn screen() -> PhysicalSize<u32> {
    PhysicalSize::new(1280, 720)
}

pub const WAIT: Duration = Duration::from_secs(5);

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Counters shared between a test and the [`RecordingCore`] on the render thread.
#[derive(Clone, Default)]
pub struct SceneStats {
    inner: Arc<StatsInner>,
}

#[derive(Default)]
struct StatsInner {
    updates: AtomicUsize,
    renders: AtomicUsize,
    forced_clears: AtomicUsize,
    created: AtomicUsize,
    destroyed: AtomicUsize,
    lost: AtomicUsize,
    keep_updating: AtomicBool,
    notify: AtomicBool,
    deltas: Mutex<Vec<f32>>,
}

impl SceneStats {
    pub fn updates(&self) -> usize {
        self.inner.updates.load(Ordering::SeqCst)
    }

    pub fn renders(&self) -> usize {
        self.inner.renders.load(Ordering::SeqCst)
    }

    pub fn forced_clears(&self) -> usize {
        self.inner.forced_clears.load(Ordering::SeqCst)
    }

    pub fn created(&self) -> usize {
        self.inner.created.load(Ordering::SeqCst)
    }

    pub fn destroyed(&self) -> usize {
        self.inner.destroyed.load(Ordering::SeqCst)
    }

    pub fn lost(&self) -> usize {
        self.inner.lost.load(Ordering::SeqCst)
    }

    pub fn set_keep_updating(&self, keep: bool) {
        self.inner.keep_updating.store(keep, Ordering::SeqCst);
    }

    pub fn set_notify(&self, notify: bool) {
        self.inner.notify.store(notify, Ordering::SeqCst);
    }

    pub fn deltas(&self) -> Vec<f32> {
        self.inner.deltas.lock().unwrap().clone()
    }
}

/// Scene core that renders nothing and counts every hook.
pub struct RecordingCore {
    stats: SceneStats,
}

impl RecordingCore {
    pub fn new() -> (Box<dyn SceneCore>, SceneStats) {
        let stats = SceneStats::default();
        (
            Box::new(Self {
                stats: stats.clone(),
            }),
            stats,
        )
    }
}

impl SceneCore for RecordingCore {
    fn context_created(&mut self) {
        self.stats.inner.created.fetch_add(1, Ordering::SeqCst);
    }

    fn context_destroyed(&mut self) {
        self.stats.inner.destroyed.fetch_add(1, Ordering::SeqCst);
    }

    fn context_lost(&mut self) {
        self.stats.inner.lost.fetch_add(1, Ordering::SeqCst);
    }

    fn update(&mut self, frame: &FrameInfo) -> UpdateStatus {
        self.stats.inner.updates.fetch_add(1, Ordering::SeqCst);
        self.stats.inner.deltas.lock().unwrap().push(frame.frame_delta);
        UpdateStatus {
            keep_updating: self.stats.inner.keep_updating.load(Ordering::SeqCst),
            needs_notification: self.stats.inner.notify.swap(false, Ordering::SeqCst),
        }
    }

    fn render(&mut self, context: &mut RenderContext<'_>) -> RenderStatus {
        self.stats.inner.renders.fetch_add(1, Ordering::SeqCst);
        if context.force_clear {
            self.stats.inner.forced_clears.fetch_add(1, Ordering::SeqCst);
        }
        RenderStatus {
            needs_post_render: true,
            needs_update: false,
        }
    }
}

/// Event loop plus headless backends wired into an [`AdaptorContext`].
pub struct Harness {
    pub event_loop: EventLoop,
    pub context: AdaptorContext,
    pub window_system: Arc<HeadlessWindowSystem>,
    pub graphics: HeadlessControl,
}

impl Harness {
    pub fn new() -> Self {
        Self::with_options(EnvironmentOptions::default())
    }

    pub fn with_options(options: EnvironmentOptions) -> Self {
        init_tracing();
        let event_loop = EventLoop::new().unwrap();
        let factory = HeadlessGraphicsFactory::new();
        let graphics = factory.control();
        let window_system = Arc::new(HeadlessWindowSystem::new(screen()));
        let factory: Arc<dyn GraphicsFactory> = Arc::new(factory);
        let windows: Arc<dyn WindowSystem> = window_system.clone();
        let context =
            AdaptorContext::new(&event_loop.handle(), factory, windows, options).unwrap();
        Self {
            event_loop,
            context,
            window_system,
            graphics,
        }
    }

    /// Runs the event loop until `condition` holds or [`WAIT`] passes.
    pub fn pump_until<F>(&mut self, mut condition: F) -> bool
    where
        F: FnMut() -> bool,
    {
        let deadline = Instant::now() + WAIT;
        loop {
            if condition() {
                return true;
            }
            if Instant::now() >= deadline {
                return false;
            }
            self.event_loop
                .run_once(Some(Duration::from_millis(5)))
                .unwrap();
        }
    }

    /// Runs the event loop for `duration`.
    pub fn pump_for(&mut self, duration: Duration) {
        let deadline = Instant::now() + duration;
        while Instant::now() < deadline {
            self.event_loop
                .run_once(Some(Duration::from_millis(5)))
                .unwrap();
        }
    }
}

/// Polls `condition` without running the event loop.
pub fn wait_until<F>(mut condition: F) -> bool
where
    F: FnMut() -> bool,
{
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}
