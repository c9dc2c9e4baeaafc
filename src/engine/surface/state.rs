use crate::engine::error::{Error, Result};

/// ### English
/// Kind of native drawable behind a render surface.
///
/// ### 中文
/// render surface 背后的原生可绘制对象类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceType {
    Window,
    Pixmap,
    NativeBuffer,
}

/// ### English
/// Lifecycle of a render surface.
///
/// `Uninitialized → GraphicsInitialized → SurfaceCreated → Rendering ⇄ Replacing →
/// SurfaceDestroyed → Terminated`. A destroyed surface may be created again.
///
/// ### 中文
/// render surface 的生命周期。
///
/// `Uninitialized → GraphicsInitialized → SurfaceCreated → Rendering ⇄ Replacing →
/// SurfaceDestroyed → Terminated`。已销毁的 surface 可以重新创建。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SurfaceState {
    Uninitialized,
    GraphicsInitialized,
    SurfaceCreated,
    Rendering,
    /// ### English
    /// The drawable was swapped; the frame in flight finalizes the replacement in post-render.
    ///
    /// ### 中文
    /// 可绘制对象已被替换；当前帧在 post-render 中完成替换。
    Replacing,
    SurfaceDestroyed,
    Terminated,
}

impl SurfaceState {
    /// ### English
    /// `true` while a graphics surface exists.
    ///
    /// ### 中文
    /// 图形 surface 存在期间为 `true`。
    #[inline]
    pub fn has_surface(self) -> bool {
        matches!(
            self,
            SurfaceState::SurfaceCreated | SurfaceState::Rendering | SurfaceState::Replacing
        )
    }

    pub(crate) fn require(self, operation: &'static str, allowed: &[SurfaceState]) -> Result<()> {
        if allowed.contains(&self) {
            Ok(())
        } else {
            Err(Error::InvalidSurfaceState {
                operation,
                state: self,
            })
        }
    }
}
