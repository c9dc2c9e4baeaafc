//! ### English
//! In-memory graphics backend.
//!
//! It keeps the same bookkeeping a real EGL driver enforces (initialize before surfaces, no use
//! of destroyed handles) and records every call so the frame sequence can be inspected.
//!
//! ### 中文
//! 内存中的图形后端。
//!
//! 它维护与真实 EGL 驱动相同的约束（先初始化后建 surface、不得使用已销毁的句柄），
//! 并记录每次调用，便于检查帧序列。

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use tracing::{debug, error};

use crate::engine::error::{Error, Result};
use crate::engine::geometry::Rect;
use crate::engine::imaging::ImageView;
use crate::engine::lock;
use crate::engine::window_system::NativeHandle;

use super::{
    ColorDepth, ConfigKind, GpuFence, GraphicsCapabilities, GraphicsConfig, GraphicsInterface,
    SurfaceHandle, SurfaceReplacement, TextureId,
};

/// ### English
/// One recorded backend call.
///
/// ### 中文
/// 一条被记录的后端调用。
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GraphicsCall {
    Initialize,
    ChooseConfig(ConfigKind, ColorDepth),
    CreateContext,
    CreateWindowSurface {
        window: NativeHandle,
        surface: SurfaceHandle,
    },
    CreatePixmapSurface {
        pixmap: NativeHandle,
        surface: SurfaceHandle,
    },
    ReplaceSurface {
        old: SurfaceHandle,
        new: SurfaceHandle,
        context_lost: bool,
    },
    DestroySurface(SurfaceHandle),
    MakeCurrent(SurfaceHandle),
    SetDamageRegion {
        surface: SurfaceHandle,
        rects: Vec<Rect>,
    },
    SwapBuffers {
        surface: SurfaceHandle,
        damage: Vec<Rect>,
    },
    Flush,
    UploadTexture {
        texture: TextureId,
        width: u32,
        height: u32,
    },
    BindTexture(TextureId),
    Terminate,
}

#[derive(Debug, Default)]
struct Behavior {
    fail_surface_creation: bool,
    context_lost_on_replace: bool,
    partial_update: bool,
    buffer_age: u32,
    defer_fences: bool,
}

/// ### English
/// Shared view of a [`HeadlessGraphics`]: call log plus behavior switches, usable from any thread.
///
/// ### 中文
/// [`HeadlessGraphics`] 的共享视图：调用日志与行为开关，可在任意线程使用。
#[derive(Clone, Default)]
pub struct HeadlessControl {
    calls: Arc<Mutex<Vec<GraphicsCall>>>,
    behavior: Arc<Mutex<Behavior>>,
    fences: Arc<Mutex<Vec<GpuFence>>>,
}

impl HeadlessControl {
    pub fn calls(&self) -> Vec<GraphicsCall> {
        lock(&self.calls).clone()
    }

    pub fn clear_calls(&self) {
        lock(&self.calls).clear();
    }

    pub fn count<P>(&self, predicate: P) -> usize
    where
        P: Fn(&GraphicsCall) -> bool,
    {
        lock(&self.calls).iter().filter(|call| predicate(call)).count()
    }

    pub fn swap_count(&self) -> usize {
        self.count(|call| matches!(call, GraphicsCall::SwapBuffers { .. }))
    }

    /// ### English
    /// Makes every following surface creation fail, like `EGL_NO_SURFACE`.
    ///
    /// ### 中文
    /// 使之后的 surface 创建全部失败，等同于 `EGL_NO_SURFACE`。
    pub fn set_fail_surface_creation(&self, fail: bool) {
        lock(&self.behavior).fail_surface_creation = fail;
    }

    pub fn set_context_lost_on_replace(&self, lost: bool) {
        lock(&self.behavior).context_lost_on_replace = lost;
    }

    pub fn set_partial_update(&self, supported: bool) {
        lock(&self.behavior).partial_update = supported;
    }

    pub fn set_buffer_age(&self, age: u32) {
        lock(&self.behavior).buffer_age = age;
    }

    /// ### English
    /// Texture uploads return pending fences until [`HeadlessControl::signal_fences`] runs.
    ///
    /// ### 中文
    /// 纹理上传返回未完成的 fence，直到调用 [`HeadlessControl::signal_fences`]。
    pub fn set_defer_fences(&self, defer: bool) {
        lock(&self.behavior).defer_fences = defer;
    }

    pub fn signal_fences(&self) {
        for fence in lock(&self.fences).drain(..) {
            fence.signal();
        }
    }

    fn record(&self, call: GraphicsCall) {
        lock(&self.calls).push(call);
    }
}

/// ### English
/// Headless [`GraphicsInterface`] implementation.
///
/// ### 中文
/// 无窗口（headless）的 [`GraphicsInterface`] 实现。
pub struct HeadlessGraphics {
    control: HeadlessControl,
    initialized: bool,
    config_chosen: bool,
    context: bool,
    next_surface: u64,
    next_texture: u32,
    surfaces: HashSet<SurfaceHandle>,
    textures: HashSet<TextureId>,
    current: Option<SurfaceHandle>,
}

impl HeadlessGraphics {
    pub fn new() -> (Self, HeadlessControl) {
        let control = HeadlessControl::default();
        (Self::with_control(control.clone()), control)
    }

    pub fn with_control(control: HeadlessControl) -> Self {
        Self {
            control,
            initialized: false,
            config_chosen: false,
            context: false,
            next_surface: 1,
            next_texture: 1,
            surfaces: HashSet::new(),
            textures: HashSet::new(),
            current: None,
        }
    }

    fn new_surface(&mut self) -> Result<SurfaceHandle> {
        if !self.initialized || !self.config_chosen {
            return Err(Error::Graphics(
                "surface requested before display and config were set up".into(),
            ));
        }
        if lock(&self.control.behavior).fail_surface_creation {
            error!("surface creation failed (EGL_NO_SURFACE)");
            return Err(Error::Graphics("failed to create surface".into()));
        }
        let handle = SurfaceHandle(self.next_surface);
        self.next_surface += 1;
        self.surfaces.insert(handle);
        Ok(handle)
    }

    fn known(&self, surface: SurfaceHandle, call: &str) -> Result<()> {
        if self.surfaces.contains(&surface) {
            Ok(())
        } else {
            Err(Error::Graphics(format!("{call} on unknown surface {surface:?}")))
        }
    }

    fn replace(&mut self, old: SurfaceHandle) -> Result<SurfaceReplacement> {
        self.known(old, "replace")?;
        self.surfaces.remove(&old);
        if self.current == Some(old) {
            self.current = None;
        }
        let handle = self.new_surface()?;
        let context_lost = lock(&self.control.behavior).context_lost_on_replace;
        if context_lost {
            self.textures.clear();
        }
        self.current = Some(handle);
        self.control.record(GraphicsCall::ReplaceSurface {
            old,
            new: handle,
            context_lost,
        });
        Ok(SurfaceReplacement {
            handle,
            context_lost,
        })
    }
}

impl GraphicsInterface for HeadlessGraphics {
    fn initialize(&mut self, _config: &GraphicsConfig) -> Result<()> {
        self.initialized = true;
        self.control.record(GraphicsCall::Initialize);
        Ok(())
    }

    fn choose_config(&mut self, kind: ConfigKind, depth: ColorDepth) -> Result<()> {
        if !self.initialized {
            return Err(Error::Graphics("choose_config before initialize".into()));
        }
        self.config_chosen = true;
        self.control.record(GraphicsCall::ChooseConfig(kind, depth));
        Ok(())
    }

    fn create_context(&mut self) -> Result<()> {
        if !self.config_chosen {
            return Err(Error::Graphics("create_context before choose_config".into()));
        }
        self.context = true;
        self.control.record(GraphicsCall::CreateContext);
        Ok(())
    }

    fn create_window_surface(
        &mut self,
        window: NativeHandle,
        _depth: ColorDepth,
    ) -> Result<SurfaceHandle> {
        let surface = self.new_surface()?;
        self.control
            .record(GraphicsCall::CreateWindowSurface { window, surface });
        Ok(surface)
    }

    fn create_pixmap_surface(
        &mut self,
        pixmap: NativeHandle,
        _depth: ColorDepth,
    ) -> Result<SurfaceHandle> {
        let surface = self.new_surface()?;
        self.control
            .record(GraphicsCall::CreatePixmapSurface { pixmap, surface });
        Ok(surface)
    }

    fn replace_window_surface(
        &mut self,
        old: SurfaceHandle,
        _window: NativeHandle,
    ) -> Result<SurfaceReplacement> {
        self.replace(old)
    }

    fn replace_pixmap_surface(
        &mut self,
        old: SurfaceHandle,
        _pixmap: NativeHandle,
    ) -> Result<SurfaceReplacement> {
        self.replace(old)
    }

    fn destroy_surface(&mut self, surface: SurfaceHandle) -> Result<()> {
        self.known(surface, "destroy_surface")?;
        self.surfaces.remove(&surface);
        if self.current == Some(surface) {
            self.current = None;
        }
        self.control.record(GraphicsCall::DestroySurface(surface));
        Ok(())
    }

    fn make_current(&mut self, surface: SurfaceHandle) -> Result<()> {
        self.known(surface, "make_current")?;
        if !self.context {
            return Err(Error::Graphics("make_current without a context".into()));
        }
        self.current = Some(surface);
        self.control.record(GraphicsCall::MakeCurrent(surface));
        Ok(())
    }

    fn buffer_age(&mut self, surface: SurfaceHandle) -> u32 {
        if self.known(surface, "buffer_age").is_err() {
            return 0;
        }
        lock(&self.control.behavior).buffer_age
    }

    fn set_damage_region(&mut self, surface: SurfaceHandle, rects: &[Rect]) -> Result<()> {
        self.known(surface, "set_damage_region")?;
        self.control.record(GraphicsCall::SetDamageRegion {
            surface,
            rects: rects.to_vec(),
        });
        Ok(())
    }

    fn swap_buffers(&mut self, surface: SurfaceHandle, damage: &[Rect]) -> Result<()> {
        self.known(surface, "swap_buffers")?;
        if self.current != Some(surface) {
            return Err(Error::Graphics(format!(
                "swap_buffers on {surface:?} which is not current"
            )));
        }
        self.control.record(GraphicsCall::SwapBuffers {
            surface,
            damage: damage.to_vec(),
        });
        Ok(())
    }

    fn flush(&mut self) {
        self.control.record(GraphicsCall::Flush);
    }

    fn upload_texture(
        &mut self,
        target: Option<TextureId>,
        image: &ImageView<'_>,
    ) -> Result<(TextureId, GpuFence)> {
        if !self.context {
            return Err(Error::Graphics("texture upload without a context".into()));
        }
        let texture = match target {
            Some(texture) if self.textures.contains(&texture) => texture,
            _ => {
                let texture = TextureId(self.next_texture);
                self.next_texture += 1;
                self.textures.insert(texture);
                texture
            }
        };

        let fence = if lock(&self.control.behavior).defer_fences {
            let fence = GpuFence::pending();
            lock(&self.control.fences).push(fence.clone());
            fence
        } else {
            GpuFence::signaled()
        };
        self.control.record(GraphicsCall::UploadTexture {
            texture,
            width: image.width,
            height: image.height,
        });
        Ok((texture, fence))
    }

    fn bind_texture(&mut self, texture: TextureId) -> Result<()> {
        if !self.textures.contains(&texture) {
            return Err(Error::Graphics(format!("unknown texture {texture:?}")));
        }
        self.control.record(GraphicsCall::BindTexture(texture));
        Ok(())
    }

    fn capabilities(&self) -> GraphicsCapabilities {
        GraphicsCapabilities {
            partial_update: lock(&self.control.behavior).partial_update,
        }
    }

    fn terminate(&mut self) {
        if !self.initialized {
            return;
        }
        debug!(leaked_surfaces = self.surfaces.len(), "headless graphics terminated");
        self.initialized = false;
        self.config_chosen = false;
        self.context = false;
        self.current = None;
        self.surfaces.clear();
        self.textures.clear();
        self.control.record(GraphicsCall::Terminate);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready() -> (HeadlessGraphics, HeadlessControl) {
        let (mut graphics, control) = HeadlessGraphics::new();
        graphics.initialize(&GraphicsConfig::default()).unwrap();
        graphics
            .choose_config(ConfigKind::Window, ColorDepth::Depth32)
            .unwrap();
        graphics.create_context().unwrap();
        (graphics, control)
    }

    #[test]
    fn surface_before_initialize_fails() {
        let (mut graphics, _) = HeadlessGraphics::new();
        assert!(
            graphics
                .create_window_surface(NativeHandle(1), ColorDepth::Depth24)
                .is_err()
        );
    }

    #[test]
    fn replaced_handle_is_no_longer_usable() {
        let (mut graphics, control) = ready();
        let old = graphics
            .create_window_surface(NativeHandle(7), ColorDepth::Depth24)
            .unwrap();
        control.set_context_lost_on_replace(true);
        let replacement = graphics.replace_window_surface(old, NativeHandle(8)).unwrap();
        assert!(replacement.context_lost);
        assert_ne!(replacement.handle, old);
        assert!(graphics.make_current(old).is_err());
        graphics.swap_buffers(replacement.handle, &[]).unwrap();
    }

    #[test]
    fn forced_creation_failure() {
        let (mut graphics, control) = ready();
        control.set_fail_surface_creation(true);
        assert!(
            graphics
                .create_pixmap_surface(NativeHandle(3), ColorDepth::Depth24)
                .is_err()
        );
    }
}
