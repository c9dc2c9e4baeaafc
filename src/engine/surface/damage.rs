//! ### English
//! Per-frame damage history for partial update.
//!
//! With buffer age `n`, the back buffer holds the image from `n` frames ago, so the region to
//! repaint is this frame's damage plus the damage of the previous `n - 1` frames.
//!
//! ### 中文
//! 部分更新使用的逐帧脏区历史。
//!
//! buffer age 为 `n` 时，后缓冲保存的是 `n` 帧之前的图像，因此需要重绘的区域是本帧脏区
//! 加上之前 `n - 1` 帧的脏区。

use std::collections::VecDeque;

use crate::engine::geometry::Rect;

/// ### English
/// Frames remembered; older buffer ages fall back to a full repaint.
///
/// ### 中文
/// 记录的帧数；更老的 buffer age 退化为整屏重绘。
const MAX_TRACKED_FRAMES: usize = 4;

#[derive(Debug, Default)]
pub(crate) struct DamageHistory {
    frames: VecDeque<Rect>,
}

impl DamageHistory {
    /// ### English
    /// Region to repaint this frame, clipped to `full`. `None` means repaint everything.
    ///
    /// ### 中文
    /// 本帧需重绘的区域（裁剪到 `full`）；`None` 表示整屏重绘。
    pub(crate) fn clip(&self, buffer_age: u32, damage: &[Rect], full: Rect) -> Option<Rect> {
        if damage.is_empty() {
            return None;
        }
        let age = buffer_age as usize;
        if age == 0 || age > self.frames.len() + 1 {
            return None;
        }
        let current = damage.iter().fold(Rect::default(), |acc, rect| acc.union(rect));
        let merged = self
            .frames
            .iter()
            .take(age - 1)
            .fold(current, |acc, rect| acc.union(rect));
        merged.intersection(&full)
    }

    /// ### English
    /// Records the damage of the frame just presented (newest first).
    ///
    /// ### 中文
    /// 记录刚呈现帧的脏区（最新的在前）。
    pub(crate) fn push(&mut self, damage: Rect) {
        self.frames.push_front(damage);
        self.frames.truncate(MAX_TRACKED_FRAMES);
    }

    pub(crate) fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: Rect = Rect::new(0, 0, 100, 100);

    #[test]
    fn unknown_age_repaints_everything() {
        let history = DamageHistory::default();
        assert_eq!(history.clip(0, &[Rect::new(0, 0, 1, 1)], FULL), None);
        assert_eq!(history.clip(3, &[Rect::new(0, 0, 1, 1)], FULL), None);
    }

    #[test]
    fn age_merges_previous_frames() {
        let mut history = DamageHistory::default();
        history.push(Rect::new(50, 50, 10, 10));
        history.push(Rect::new(0, 0, 10, 10));

        let current = [Rect::new(20, 20, 5, 5)];
        assert_eq!(history.clip(1, &current, FULL), Some(Rect::new(20, 20, 5, 5)));
        assert_eq!(history.clip(2, &current, FULL), Some(Rect::new(0, 0, 25, 25)));
        assert_eq!(history.clip(3, &current, FULL), Some(Rect::new(0, 0, 60, 60)));
    }

    #[test]
    fn damage_is_clipped_to_surface() {
        let history = DamageHistory::default();
        assert_eq!(
            history.clip(1, &[Rect::new(90, 90, 50, 50)], FULL),
            Some(Rect::new(90, 90, 10, 10))
        );
    }
}
