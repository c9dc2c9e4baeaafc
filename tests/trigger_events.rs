mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use render_adaptor::engine::system::TriggerOptions;
use render_adaptor::{EventLoop, TriggerEventManager};

fn dispatch(event_loop: &mut EventLoop) {
    event_loop
        .run_once(Some(Duration::from_millis(100)))
        .unwrap();
}

#[test]
fn concurrent_triggers_fire_once_per_cycle() {
    common::init_tracing();
    let mut event_loop = EventLoop::new().unwrap();
    let manager = TriggerEventManager::new(&event_loop.handle()).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let event = manager.create_trigger_event(
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        TriggerOptions::KeepAliveAfterTrigger,
    );

    let workers: Vec<_> = [4, 3, 3]
        .into_iter()
        .map(|count| {
            let handle = event.handle();
            thread::spawn(move || {
                for _ in 0..count {
                    assert!(handle.trigger());
                }
            })
        })
        .collect();
    for worker in workers {
        worker.join().unwrap();
    }

    assert_eq!(manager.pending_count(), 1);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    dispatch(&mut event_loop);
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    // A later cycle fires again.
    dispatch(&mut event_loop);
    assert_eq!(hits.load(Ordering::SeqCst), 1);
    event.trigger().unwrap();
    dispatch(&mut event_loop);
    assert_eq!(hits.load(Ordering::SeqCst), 2);
}

#[test]
fn handle_outliving_its_event_is_harmless() {
    common::init_tracing();
    let mut event_loop = EventLoop::new().unwrap();
    let manager = TriggerEventManager::new(&event_loop.handle()).unwrap();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = hits.clone();
    let event = manager.create_trigger_event(
        move || {
            counter.fetch_add(1, Ordering::SeqCst);
        },
        TriggerOptions::KeepAliveAfterTrigger,
    );
    let handle = event.handle();

    handle.trigger();
    drop(event);
    handle.trigger();
    dispatch(&mut event_loop);
    assert_eq!(hits.load(Ordering::SeqCst), 0);
    assert_eq!(manager.live_count(), 0);
}
