//! ### English
//! Native image sources: buffer queue contract, pixel formats and the producer/consumer image
//! queue built on top of them.
//!
//! ### 中文
//! 原生图像源：buffer 队列契约、像素格式，以及基于它们的生产者/消费者图像队列。

mod buffer_queue;
mod counter;
mod format;
mod image_queue;

pub use buffer_queue::{BufferCounts, MemoryBufferQueue, NativeBuffer, NativeBufferQueue};
pub use counter::live_native_buffers;
pub use format::{ColorFormat, ImageView};
pub use image_queue::{DequeuedBuffer, NativeImageSourceQueue, PrepareTextureResult};
