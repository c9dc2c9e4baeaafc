//! ### English
//! Frame pacing and FPS tracking for the render thread.
//!
//! Deadlines advance by whole frame durations from the previous deadline, so a late frame is
//! followed by a shorter one. Once the thread falls more than a frame behind, the missed frames
//! are dropped and counted so the next update can progress animations by the lost time.
//!
//! ### 中文
//! 渲染线程的帧节奏控制与 FPS 统计。
//!
//! 截止时间以整帧间隔从上一截止时间推进，因此迟到的一帧之后会跟一个更短的帧。
//! 一旦落后超过一帧，就丢弃错过的帧并计数，使下一次 update 能按丢失的时间推进动画。

use std::time::{Duration, Instant};

use tracing::info;

/// ### English
/// Duration of one display refresh (60 Hz).
///
/// ### 中文
/// 一次显示刷新的时长（60 Hz）。
pub const DEFAULT_FRAME_DURATION: Duration = Duration::from_nanos(1_000_000_000 / 60);

/// ### English
/// Frame duration for rendering once every `frames_per_render` refreshes. `0` is treated as 1.
///
/// ### 中文
/// 每 `frames_per_render` 次刷新渲染一次时的帧间隔；`0` 视为 1。
#[inline]
pub fn frame_duration(frames_per_render: u32) -> Duration {
    DEFAULT_FRAME_DURATION * frames_per_render.max(1)
}

#[derive(Debug)]
pub(crate) struct FramePacer {
    sleep_until: Option<Instant>,
    extra_frames_dropped: u32,
}

impl FramePacer {
    pub(crate) fn new() -> Self {
        Self {
            sleep_until: None,
            extra_frames_dropped: 0,
        }
    }

    /// ### English
    /// Forgets the previous deadline; the next frame is paced from its own start time.
    ///
    /// ### 中文
    /// 丢弃上一截止时间；下一帧从其自身开始时间起计算节奏。
    pub(crate) fn reset(&mut self) {
        self.sleep_until = None;
    }

    #[inline]
    pub(crate) fn frames_dropped(&self) -> u32 {
        self.extra_frames_dropped
    }

    /// ### English
    /// Seconds of progression for the coming frame.
    ///
    /// ### 中文
    /// 即将开始的帧的推进秒数。
    pub(crate) fn frame_delta(&self, frame: Duration, use_elapsed_time: bool) -> f32 {
        if !use_elapsed_time {
            return 0.0;
        }
        frame.as_secs_f32() * (1 + self.extra_frames_dropped) as f32
    }

    /// ### English
    /// Computes when the next frame may start.
    ///
    /// #### Parameters
    /// - `frame`: Current frame duration.
    /// - `frame_start`: When the frame that just ended started.
    /// - `now`: Time at the end of the frame.
    ///
    /// ### 中文
    /// 计算下一帧可以开始的时间。
    ///
    /// #### 参数
    /// - `frame`：当前帧间隔。
    /// - `frame_start`：刚结束的这一帧的开始时间。
    /// - `now`：帧结束时的时间。
    pub(crate) fn end_frame(&mut self, frame: Duration, frame_start: Instant, now: Instant) -> Instant {
        self.extra_frames_dropped = 0;
        let deadline = match self.sleep_until {
            None => frame_start + frame,
            Some(previous) => {
                let mut deadline = previous + frame;
                while now > deadline + frame {
                    deadline += frame;
                    self.extra_frames_dropped += 1;
                }
                deadline
            }
        };
        self.sleep_until = Some(deadline);
        deadline
    }
}

/// ### English
/// Averages frame times over a fixed window and logs the rate.
///
/// ### 中文
/// 在固定时间窗口内统计帧时间并记录帧率。
#[derive(Debug)]
pub(crate) struct FpsTracker {
    window: f32,
    elapsed: f32,
    frames: u32,
}

impl FpsTracker {
    /// ### English
    /// `seconds == 0` disables tracking.
    ///
    /// ### 中文
    /// `seconds == 0` 表示关闭统计。
    pub(crate) fn new(seconds: u32) -> Self {
        Self {
            window: seconds as f32,
            elapsed: 0.0,
            frames: 0,
        }
    }

    #[inline]
    pub(crate) fn enabled(&self) -> bool {
        self.window > 0.0
    }

    /// ### English
    /// Records one frame; returns the measured rate when a window completes.
    ///
    /// ### 中文
    /// 记录一帧；当一个统计窗口结束时返回测得的帧率。
    pub(crate) fn track(&mut self, since_last_frame: Duration) -> Option<f32> {
        if !self.enabled() {
            return None;
        }
        self.elapsed += since_last_frame.as_secs_f32();
        self.frames += 1;
        if self.elapsed < self.window {
            return None;
        }
        let fps = self.frames as f32 / self.elapsed;
        info!(fps, seconds = self.elapsed, frames = self.frames, "render frame rate");
        self.elapsed = 0.0;
        self.frames = 0;
        Some(fps)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FRAME: Duration = Duration::from_millis(10);

    #[test]
    fn first_frame_is_paced_from_its_start() {
        let mut pacer = FramePacer::new();
        let start = Instant::now();
        assert_eq!(pacer.end_frame(FRAME, start, start), start + FRAME);
        assert_eq!(pacer.frames_dropped(), 0);
    }

    #[test]
    fn late_frames_catch_up_and_count_drops() {
        let mut pacer = FramePacer::new();
        let start = Instant::now();
        let first = pacer.end_frame(FRAME, start, start);

        // The next frame finished 35ms after the first deadline.
        let late = first + Duration::from_millis(35);
        let next = pacer.end_frame(FRAME, first, late);
        assert_eq!(next, first + FRAME * 3);
        assert_eq!(pacer.frames_dropped(), 2);
        assert!((pacer.frame_delta(FRAME, true) - 0.03).abs() < 1e-6);
        assert_eq!(pacer.frame_delta(FRAME, false), 0.0);

        pacer.reset();
        let resumed = late + Duration::from_secs(1);
        assert_eq!(pacer.end_frame(FRAME, resumed, resumed), resumed + FRAME);
    }

    #[test]
    fn refresh_rate_scales_frame_duration() {
        assert_eq!(frame_duration(0), DEFAULT_FRAME_DURATION);
        assert_eq!(frame_duration(2), DEFAULT_FRAME_DURATION * 2);
    }

    #[test]
    fn fps_tracker_reports_per_window() {
        let mut disabled = FpsTracker::new(0);
        assert_eq!(disabled.track(FRAME), None);

        let mut tracker = FpsTracker::new(1);
        let mut frames = 0;
        let fps = loop {
            frames += 1;
            if let Some(fps) = tracker.track(FRAME) {
                break fps;
            }
            assert!(frames < 200);
        };
        assert!((100..=101).contains(&frames));
        assert!((fps - 100.0).abs() < 1.0);
    }
}
