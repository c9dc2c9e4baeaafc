mod common;

use std::time::Duration;

use common::{Harness, RecordingCore, wait_until};
use dpi::PhysicalSize;
use render_adaptor::engine::graphics::{
    GraphicsCall, HeadlessControl, HeadlessGraphics, SurfaceHandle,
};
use render_adaptor::{
    Adaptor, AdaptorState, ColorFormat, Error, Rect, SurfaceState, SurfaceType,
};

fn started(harness: &Harness, position: Rect) -> (Adaptor, common::SceneStats) {
    let surface = harness
        .context
        .create_window_surface(position, false)
        .unwrap();
    let (core, stats) = RecordingCore::new();
    let mut adaptor = Adaptor::new(harness.context.clone(), Some(surface), core).unwrap();
    adaptor.start().unwrap();
    assert!(wait_until(|| stats.renders() >= 1));
    (adaptor, stats)
}

/// Every present goes to the surface made current for that frame.
fn assert_frames_are_atomic(control: &HeadlessControl) {
    let mut current = None;
    for call in control.calls() {
        match call {
            GraphicsCall::MakeCurrent(surface) => current = Some(surface),
            GraphicsCall::SwapBuffers { surface, .. } => assert_eq!(Some(surface), current),
            GraphicsCall::DestroySurface(surface) if current == Some(surface) => current = None,
            _ => {}
        }
    }
}

fn created_surfaces(control: &HeadlessControl) -> Vec<SurfaceHandle> {
    control
        .calls()
        .into_iter()
        .filter_map(|call| match call {
            GraphicsCall::CreateWindowSurface { surface, .. }
            | GraphicsCall::CreatePixmapSurface { surface, .. } => Some(surface),
            _ => None,
        })
        .collect()
}

fn used_after(control: &HeadlessControl, handle: SurfaceHandle, marker: usize) -> bool {
    control.calls().into_iter().skip(marker + 1).any(|call| match call {
        GraphicsCall::MakeCurrent(surface) => surface == handle,
        GraphicsCall::SwapBuffers { surface, .. } => surface == handle,
        GraphicsCall::SetDamageRegion { surface, .. } => surface == handle,
        _ => false,
    })
}

#[test]
fn window_surface_presents_one_frame() {
    let harness = Harness::new();
    let mut surface = harness
        .context
        .create_window_surface(Rect::new(0, 0, 800, 480), false)
        .unwrap();
    let (mut graphics, control) = HeadlessGraphics::new();

    surface.initialize_graphics(&mut graphics).unwrap();
    surface.create_surface(&mut graphics).unwrap();
    assert!(surface.pre_render(&mut graphics, false, &[]).unwrap());
    surface.post_render(&mut graphics, false, false).unwrap();
    assert_eq!(control.swap_count(), 1);

    surface.destroy_surface(&mut graphics).unwrap();
    surface.terminate(&mut graphics).unwrap();
    assert_eq!(surface.state(), SurfaceState::Terminated);
}

#[test]
fn surface_calls_follow_the_state_machine() {
    let harness = Harness::new();
    let mut surface = harness
        .context
        .create_pixmap_surface(Rect::new(0, 0, 64, 64), true)
        .unwrap();
    let (mut graphics, control) = HeadlessGraphics::new();

    assert!(surface.create_surface(&mut graphics).is_err());
    assert!(surface.pre_render(&mut graphics, false, &[]).is_err());
    assert!(surface.post_render(&mut graphics, false, false).is_err());
    assert!(created_surfaces(&control).is_empty());

    surface.initialize_graphics(&mut graphics).unwrap();
    assert!(surface.pre_render(&mut graphics, false, &[]).is_err());
    surface.create_surface(&mut graphics).unwrap();
    assert!(surface.pre_render(&mut graphics, false, &[]).unwrap());
    surface.post_render(&mut graphics, false, false).unwrap();
    assert!(surface.proxy().presented_drawable().is_some());
    surface.terminate(&mut graphics).unwrap();
}

#[test]
fn replace_surface_switches_whole_frames() {
    let harness = Harness::new();
    let (mut adaptor, stats) = started(&harness, Rect::new(0, 0, 800, 480));
    stats.set_keep_updating(true);
    adaptor.request_update();

    let next = harness
        .context
        .create_window_surface(Rect::new(0, 0, 640, 360), false)
        .unwrap();
    let next_id = next.id();
    let old = adaptor.replace_surface(next).unwrap().expect("previous surface");
    assert_eq!(old.state(), SurfaceState::SurfaceDestroyed);
    assert_eq!(adaptor.surface().map(|proxy| proxy.id()), Some(next_id));

    let created = created_surfaces(&harness.graphics);
    assert_eq!(created.len(), 2);
    let swaps = harness.graphics.swap_count();
    assert!(wait_until(|| harness.graphics.swap_count() > swaps + 2));

    let calls = harness.graphics.calls();
    let destroyed_at = calls
        .iter()
        .position(|call| *call == GraphicsCall::DestroySurface(created[0]))
        .expect("old surface destroyed");
    assert!(!used_after(&harness.graphics, created[0], destroyed_at));
    assert_frames_are_atomic(&harness.graphics);
    assert_eq!(adaptor.controller().graphics_violations().count(), 0);
    adaptor.stop();
}

#[test]
fn window_events_are_drained_before_a_replacement() {
    let harness = Harness::new();
    let surface = harness
        .context
        .create_window_surface(Rect::new(0, 0, 800, 480), false)
        .unwrap();
    let window = surface.native_window().expect("window surface");
    let (core, stats) = RecordingCore::new();
    let mut adaptor = Adaptor::new(harness.context.clone(), Some(surface), core).unwrap();
    adaptor.start().unwrap();
    assert!(wait_until(|| stats.renders() >= 1));
    adaptor.pause().unwrap();

    harness.window_system.post_events(window, 3);
    let next = harness
        .context
        .create_window_surface(Rect::new(0, 0, 640, 360), false)
        .unwrap();
    let old = adaptor.replace_surface(next).unwrap().expect("previous surface");

    assert_eq!(harness.window_system.pending_events(window), 0);
    assert_eq!(old.state(), SurfaceState::SurfaceDestroyed);
    adaptor.stop();
}

#[test]
fn failed_replacement_keeps_the_old_surface() {
    let harness = Harness::new();
    let (mut adaptor, stats) = started(&harness, Rect::new(0, 0, 320, 240));
    let previous = adaptor.surface().map(|proxy| proxy.id());

    // A terminated surface cannot be brought back.
    let mut spent = harness
        .context
        .create_pixmap_surface(Rect::new(0, 0, 32, 32), false)
        .unwrap();
    let (mut graphics, _control) = HeadlessGraphics::new();
    spent.initialize_graphics(&mut graphics).unwrap();
    spent.terminate(&mut graphics).unwrap();

    assert!(matches!(
        adaptor.replace_surface(spent),
        Err(Error::InvalidSurfaceState { .. })
    ));
    assert_eq!(adaptor.surface().map(|proxy| proxy.id()), previous);

    let swaps = harness.graphics.swap_count();
    let renders = stats.renders();
    adaptor.request_update();
    assert!(wait_until(|| stats.renders() > renders));
    assert!(wait_until(|| harness.graphics.swap_count() > swaps));
    adaptor.stop();
}

#[test]
fn context_loss_reloads_resources_and_drops_old_handle() {
    let harness = Harness::new();
    let (mut adaptor, stats) = started(&harness, Rect::new(0, 0, 800, 480));
    harness.graphics.set_context_lost_on_replace(true);

    assert!(adaptor.recreate_surface().unwrap());
    assert_eq!(stats.lost(), 1);
    assert_eq!(adaptor.controller().context_loss_count(), 1);

    let calls = harness.graphics.calls();
    let (marker, old) = calls
        .iter()
        .enumerate()
        .find_map(|(index, call)| match call {
            GraphicsCall::ReplaceSurface {
                old,
                context_lost: true,
                ..
            } => Some((index, *old)),
            _ => None,
        })
        .expect("surface replaced with context loss");

    adaptor.request_update();
    assert!(wait_until(|| stats.forced_clears() >= 1));
    assert!(!used_after(&harness.graphics, old, marker));
    assert_frames_are_atomic(&harness.graphics);
    adaptor.stop();
}

#[test]
fn recreate_without_context_loss_keeps_resources() {
    let harness = Harness::new();
    let (mut adaptor, stats) = started(&harness, Rect::new(0, 0, 800, 480));
    assert!(!adaptor.recreate_surface().unwrap());
    assert_eq!(stats.lost(), 0);
    assert_eq!(adaptor.controller().context_loss_count(), 0);
    adaptor.stop();
    assert!(matches!(
        adaptor.recreate_surface(),
        Err(Error::InvalidAdaptorState { .. })
    ));
}

#[test]
fn delete_surface_keeps_the_thread_alive() {
    let harness = Harness::new();
    let (mut adaptor, stats) = started(&harness, Rect::new(0, 0, 800, 480));
    let surface = adaptor.delete_surface().unwrap().expect("surface");
    assert_eq!(surface.state(), SurfaceState::SurfaceDestroyed);
    assert!(adaptor.surface().is_none());
    assert_eq!(adaptor.state(), AdaptorState::Running);

    // Updates continue without presenting.
    let swaps = harness.graphics.swap_count();
    let updates = stats.updates();
    adaptor.request_update();
    assert!(wait_until(|| stats.updates() > updates));
    assert_eq!(harness.graphics.swap_count(), swaps);
    assert!(!adaptor.surface_resized(Rect::new(0, 0, 100, 100)));

    let pixmap = harness
        .context
        .create_pixmap_surface(Rect::new(0, 0, 64, 64), false)
        .unwrap();
    assert!(adaptor.replace_surface(pixmap).unwrap().is_none());
    assert_eq!(
        adaptor.surface().map(|proxy| proxy.surface_type()),
        Some(SurfaceType::Pixmap)
    );
    adaptor.request_update();
    let proxy = adaptor.surface().cloned().expect("pixmap proxy");
    assert!(wait_until(|| proxy.is_locked() && proxy.presented_drawable().is_some()));
    assert!(proxy.release_lock());
    assert!(!proxy.release_lock());
    adaptor.stop();
}

#[test]
fn resize_is_applied_by_the_render_thread() {
    let mut harness = Harness::new();
    let (mut adaptor, _stats) = started(&harness, Rect::new(0, 0, 800, 480));
    let egl_window = harness
        .graphics
        .calls()
        .into_iter()
        .find_map(|call| match call {
            GraphicsCall::CreateWindowSurface { window, .. } => Some(window),
            _ => None,
        })
        .expect("egl window");

    assert!(!adaptor.surface_resized(Rect::new(0, 0, 801, 480)));
    assert!(adaptor.surface_resized(Rect::new(0, 0, 1024, 600)));
    let window_system = harness.window_system.clone();
    assert!(harness.pump_until(|| {
        window_system.egl_window_size(egl_window) == Some(PhysicalSize::new(1024, 600))
    }));
    adaptor.stop();
}

#[test]
fn rotation_completes_on_the_event_thread() {
    let mut harness = Harness::new();
    let (mut adaptor, _stats) = started(&harness, Rect::new(0, 0, 800, 480));
    assert!(adaptor.surface_rotated(90, 480, 800));

    let window_system = harness.window_system.clone();
    assert!(harness.pump_until(|| !window_system.rotation_completions().is_empty()));
    let completions = harness.window_system.rotation_completions();
    assert_eq!(completions.len(), 1);
    assert_eq!(completions[0].1, 90);
    assert_eq!(adaptor.surface().map(|proxy| proxy.orientation()), Some(90));

    harness.pump_for(Duration::from_millis(50));
    adaptor.stop();
}

#[test]
fn native_buffer_surface_feeds_its_queue() {
    let harness = Harness::new();
    let queue = harness
        .context
        .create_image_queue(64, 64, ColorFormat::Rgba8888)
        .unwrap();
    assert_eq!(queue.queue_depth(), harness.context.options().buffer_queue_size());
    let consumer = queue.clone();
    let surface = harness.context.create_native_buffer_surface(queue).unwrap();

    let (core, stats) = RecordingCore::new();
    stats.set_keep_updating(true);
    let mut adaptor = Adaptor::new(harness.context.clone(), Some(surface), core).unwrap();
    adaptor.start().unwrap();

    assert!(wait_until(|| consumer.buffer_counts().queued > 0));
    adaptor.stop();
    assert_eq!(consumer.dequeued_count(), 0);
    assert!(consumer.free_released_buffers() > 0);
    assert!(consumer.dequeue_buffer().is_some());
}
