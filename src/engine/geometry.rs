//! ### English
//! Plain rectangle math shared by surfaces, damage tracking and the windowing layer.
//!
//! ### 中文
//! surface、脏区跟踪与窗口层共用的矩形运算。

use dpi::PhysicalSize;

/// ### English
/// Integer rectangle in surface coordinates (also used as a window position/size).
///
/// ### 中文
/// surface 坐标系下的整数矩形（也用作窗口的位置/尺寸）。
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

/// ### English
/// Window position and size; same layout as [`Rect`].
///
/// ### 中文
/// 窗口位置与尺寸；布局与 [`Rect`] 相同。
pub type PositionSize = Rect;

impl Rect {
    #[inline]
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    #[inline]
    pub fn from_size(size: PhysicalSize<u32>) -> Self {
        Self::new(0, 0, clamp_i32(size.width), clamp_i32(size.height))
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    #[inline]
    pub fn size(&self) -> PhysicalSize<u32> {
        PhysicalSize::new(self.width.max(0) as u32, self.height.max(0) as u32)
    }

    /// ### English
    /// Smallest rectangle containing both; an empty side is ignored.
    ///
    /// ### 中文
    /// 同时包含两者的最小矩形；空矩形一侧会被忽略。
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let left = self.x.min(other.x);
        let top = self.y.min(other.y);
        let right = (self.x + self.width).max(other.x + other.width);
        let bottom = (self.y + self.height).max(other.y + other.height);
        Rect::new(left, top, right - left, bottom - top)
    }

    /// ### English
    /// Overlapping area, or `None` when the rectangles do not intersect.
    ///
    /// ### 中文
    /// 两矩形的重叠区域；不相交时返回 `None`。
    pub fn intersection(&self, other: &Rect) -> Option<Rect> {
        let left = self.x.max(other.x);
        let top = self.y.max(other.y);
        let right = (self.x + self.width).min(other.x + other.width);
        let bottom = (self.y + self.height).min(other.y + other.height);
        if right <= left || bottom <= top {
            return None;
        }
        Some(Rect::new(left, top, right - left, bottom - top))
    }

    /// ### English
    /// Same rectangle with width and height exchanged (90/270 degree screen rotation).
    ///
    /// ### 中文
    /// 宽高互换后的矩形（屏幕旋转 90/270 度时使用）。
    #[inline]
    pub fn transposed(&self) -> Rect {
        Rect::new(self.x, self.y, self.height, self.width)
    }
}

#[inline]
fn clamp_i32(value: u32) -> i32 {
    value.min(i32::MAX as u32) as i32
}

/// ### English
/// Returns `true` for angles where the native buffer is laid out with swapped axes.
///
/// ### 中文
/// 对于需要交换宽高轴的角度（90/270）返回 `true`。
#[inline]
pub fn is_transposing_angle(angle: i32) -> bool {
    matches!(angle.rem_euclid(360), 90 | 270)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn union_ignores_empty_side() {
        let a = Rect::new(10, 10, 20, 20);
        assert_eq!(a.union(&Rect::default()), a);
        assert_eq!(Rect::default().union(&a), a);
        assert_eq!(
            a.union(&Rect::new(0, 0, 5, 5)),
            Rect::new(0, 0, 30, 30)
        );
    }

    #[test]
    fn intersection_of_disjoint_rects_is_none() {
        let a = Rect::new(0, 0, 10, 10);
        assert_eq!(a.intersection(&Rect::new(10, 0, 5, 5)), None);
        assert_eq!(
            a.intersection(&Rect::new(5, 5, 10, 10)),
            Some(Rect::new(5, 5, 5, 5))
        );
    }

    #[test]
    fn transposing_angles() {
        assert!(is_transposing_angle(90));
        assert!(is_transposing_angle(-90));
        assert!(!is_transposing_angle(180));
        assert!(!is_transposing_angle(0));
    }
}
