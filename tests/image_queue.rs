mod common;

use std::thread;

use render_adaptor::engine::graphics::{
    ColorDepth, ConfigKind, GraphicsConfig, HeadlessGraphics,
};
use render_adaptor::engine::imaging::PrepareTextureResult;
use render_adaptor::{ColorFormat, GraphicsInterface, NativeImageSourceQueue};

#[test]
fn exhausted_ring_recovers_after_enqueue_and_free() {
    common::init_tracing();
    let queue = NativeImageSourceQueue::new(256, 256, ColorFormat::Rgba8888, 2).unwrap();

    let first = queue.dequeue_buffer().expect("first buffer");
    let second = queue.dequeue_buffer().expect("second buffer");
    assert!(queue.dequeue_buffer().is_none());

    queue.enqueue_buffer(second).unwrap();
    assert!(queue.free_released_buffers() >= 1);
    assert!(queue.dequeue_buffer().is_some());
    drop(first);
}

#[test]
fn dequeues_never_exceed_queue_depth() {
    common::init_tracing();
    for depth in 1..=4 {
        let queue = NativeImageSourceQueue::new(8, 8, ColorFormat::Rgb888, depth).unwrap();
        let held: Vec<_> = (0..depth + 3).filter_map(|_| queue.dequeue_buffer()).collect();
        assert_eq!(held.len(), depth);
        assert!(!queue.can_dequeue_buffer());

        queue.ignore_source_image();
        assert_eq!(queue.dequeued_count(), depth);
        drop(held);
        assert_eq!(queue.dequeued_count(), 0);
    }
}

#[test]
fn producer_thread_feeds_texture_on_render_side() {
    common::init_tracing();
    let (mut graphics, _control) = HeadlessGraphics::new();
    graphics.initialize(&GraphicsConfig::default()).unwrap();
    graphics
        .choose_config(ConfigKind::Window, ColorDepth::Depth32)
        .unwrap();
    graphics.create_context().unwrap();

    let queue = NativeImageSourceQueue::new(4, 4, ColorFormat::Rgba8888, 3).unwrap();
    let producer = queue.clone();
    thread::spawn(move || {
        let mut buffer = producer.dequeue_buffer().unwrap();
        buffer.pixels_mut().fill(0x7f);
        producer.enqueue_buffer(buffer).unwrap();
    })
    .join()
    .unwrap();

    assert_eq!(
        queue.prepare_texture(&mut graphics),
        PrepareTextureResult::ImageChanged
    );
    queue.target_texture(&mut graphics).unwrap();
}
