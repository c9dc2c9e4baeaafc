mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use common::{Harness, RecordingCore, wait_until};
use render_adaptor::{
    Adaptor, AdaptorState, EnvironmentOptions, Error, Rect, ThreadMode, UpdateMode,
};

fn window_adaptor(harness: &Harness) -> (Adaptor, common::SceneStats) {
    let surface = harness
        .context
        .create_window_surface(Rect::new(0, 0, 800, 480), false)
        .unwrap();
    let (core, stats) = RecordingCore::new();
    let adaptor = Adaptor::new(harness.context.clone(), Some(surface), core).unwrap();
    (adaptor, stats)
}

#[test]
fn start_renders_and_stop_tears_down() {
    let mut harness = Harness::new();
    let (mut adaptor, stats) = window_adaptor(&harness);
    assert_eq!(adaptor.state(), AdaptorState::Created);

    adaptor.start().unwrap();
    assert_eq!(adaptor.state(), AdaptorState::Running);
    assert_eq!(stats.created(), 1);
    let graphics = harness.graphics.clone();
    assert!(harness.pump_until(|| graphics.swap_count() >= 1));
    assert!(stats.renders() >= 1);

    adaptor.stop();
    assert_eq!(adaptor.state(), AdaptorState::Stopped);
    assert_eq!(stats.destroyed(), 1);
    assert_eq!(harness.window_system.live_egl_windows(), 0);
    assert_eq!(adaptor.controller().graphics_violations().count(), 0);

    adaptor.stop();
    assert_eq!(stats.destroyed(), 1);
}

#[test]
fn repeated_start_is_ignored_and_start_after_stop_fails() {
    let harness = Harness::new();
    let (mut adaptor, stats) = window_adaptor(&harness);
    adaptor.start().unwrap();
    adaptor.start().unwrap();
    assert_eq!(stats.created(), 1);

    adaptor.stop();
    assert!(matches!(
        adaptor.start(),
        Err(Error::InvalidAdaptorState { operation: "start", state: "stopped" })
    ));
    assert!(matches!(adaptor.resume(), Err(Error::InvalidAdaptorState { .. })));
    assert!(!adaptor.add_idle(|| {}));
}

#[test]
fn pause_halts_frames_and_resume_forces_a_clear() {
    let mut harness = Harness::new();
    let (mut adaptor, stats) = window_adaptor(&harness);
    stats.set_keep_updating(true);
    adaptor.start().unwrap();
    assert!(wait_until(|| stats.renders() >= 2));

    adaptor.pause().unwrap();
    assert_eq!(adaptor.state(), AdaptorState::Paused);
    // Let an in-flight frame finish.
    harness.pump_for(Duration::from_millis(50));
    let paused_at = stats.renders();
    harness.pump_for(Duration::from_millis(100));
    assert_eq!(stats.renders(), paused_at);

    adaptor.resume().unwrap();
    assert_eq!(adaptor.state(), AdaptorState::Running);
    assert!(wait_until(|| stats.renders() > paused_at));
    assert!(stats.forced_clears() >= 1);
    adaptor.stop();
}

#[test]
fn update_once_renders_a_single_frame_while_paused() {
    let mut harness = Harness::new();
    let (mut adaptor, stats) = window_adaptor(&harness);
    adaptor.start().unwrap();
    adaptor.pause().unwrap();
    harness.pump_for(Duration::from_millis(50));
    let before = stats.updates();

    adaptor.request_update_once(UpdateMode::Normal);
    assert!(wait_until(|| stats.updates() == before + 1));
    harness.pump_for(Duration::from_millis(100));
    assert_eq!(stats.updates(), before + 1);
    adaptor.stop();
}

#[test]
fn run_if_requested_mode_sleeps_between_requests() {
    let options = EnvironmentOptions::default().with_thread_mode(ThreadMode::RunIfRequested);
    let mut harness = Harness::with_options(options);
    let (mut adaptor, stats) = window_adaptor(&harness);
    adaptor.start().unwrap();
    assert_eq!(adaptor.controller().thread_mode(), ThreadMode::RunIfRequested);
    assert!(wait_until(|| stats.updates() == 1));
    harness.pump_for(Duration::from_millis(100));
    assert_eq!(stats.updates(), 1);

    adaptor.request_update();
    assert!(wait_until(|| stats.updates() == 2));
    harness.pump_for(Duration::from_millis(100));
    assert_eq!(stats.updates(), 2);
    adaptor.stop();
}

#[test]
fn idle_render_thread_is_allowed_to_sleep() {
    let mut harness = Harness::new();
    let (mut adaptor, stats) = window_adaptor(&harness);
    adaptor.start().unwrap();

    // The sleep request is handled on the event loop.
    harness.pump_for(Duration::from_millis(100));
    let settled = stats.updates();
    harness.pump_for(Duration::from_millis(100));
    assert_eq!(stats.updates(), settled);

    adaptor.request_update();
    assert!(harness.pump_until(|| stats.updates() > settled));
    assert!(harness.pump_until(|| adaptor.controller().pending_update_requests() == 0));
    adaptor.stop();
}

#[test]
fn stop_interrupts_frame_pacing_sleep() {
    // 600 refreshes per frame is a ten second frame.
    let options = EnvironmentOptions::default().with_render_refresh_rate(600);
    let harness = Harness::with_options(options);
    let (mut adaptor, stats) = window_adaptor(&harness);
    stats.set_keep_updating(true);
    adaptor.start().unwrap();
    assert!(wait_until(|| stats.renders() >= 1));
    assert_eq!(
        adaptor.controller().render_frame_duration(),
        render_adaptor::engine::render::frame_duration(600)
    );

    let started = Instant::now();
    adaptor.stop();
    assert!(started.elapsed() < Duration::from_secs(2));
    assert_eq!(stats.destroyed(), 1);
}

#[test]
fn drop_stops_the_render_thread() {
    let harness = Harness::new();
    let (mut adaptor, stats) = window_adaptor(&harness);
    adaptor.start().unwrap();
    drop(adaptor);
    assert_eq!(stats.destroyed(), 1);
    assert_eq!(harness.window_system.live_windows(), 0);
}

#[test]
fn core_events_handler_runs_on_the_event_thread() {
    let mut harness = Harness::new();
    let (mut adaptor, stats) = window_adaptor(&harness);
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let event_thread = std::thread::current().id();
    adaptor.set_core_events_handler(move || {
        assert_eq!(std::thread::current().id(), event_thread);
        counter.fetch_add(1, Ordering::SeqCst);
    });

    stats.set_notify(true);
    adaptor.start().unwrap();
    assert!(harness.pump_until(|| calls.load(Ordering::SeqCst) == 1));
    adaptor.stop();
}

#[test]
fn idle_callbacks_run_until_stopped() {
    let mut harness = Harness::new();
    let (mut adaptor, _stats) = window_adaptor(&harness);
    let once = Arc::new(AtomicUsize::new(0));
    let repeats = Arc::new(AtomicUsize::new(0));

    let counter = once.clone();
    assert!(adaptor.add_idle(move || {
        counter.fetch_add(1, Ordering::SeqCst);
    }));
    let counter = repeats.clone();
    assert!(adaptor.add_repeating_idle(move || counter.fetch_add(1, Ordering::SeqCst) < 2));

    harness.pump_for(Duration::from_millis(50));
    assert_eq!(once.load(Ordering::SeqCst), 1);
    assert_eq!(repeats.load(Ordering::SeqCst), 3);

    adaptor.stop();
    assert!(!adaptor.add_idle(|| {}));
}

#[test]
fn failed_start_leaves_the_adaptor_stopped() {
    let harness = Harness::new();
    harness.graphics.set_fail_surface_creation(true);
    let (mut adaptor, stats) = window_adaptor(&harness);
    assert!(matches!(adaptor.start(), Err(Error::Graphics(_))));
    assert_eq!(adaptor.state(), AdaptorState::Stopped);
    assert_eq!(stats.created(), 0);
}
