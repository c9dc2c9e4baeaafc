use std::collections::HashMap;
use std::sync::Mutex;

use dpi::PhysicalSize;
use tracing::{debug, warn};

use crate::engine::error::{Error, Result};
use crate::engine::geometry::{PositionSize, Rect};
use crate::engine::graphics::ColorDepth;
use crate::engine::lock;

use super::{NativeHandle, WindowSystem};

#[derive(Debug)]
struct EglWindowRecord {
    window: NativeHandle,
    size: PhysicalSize<u32>,
    rotation: i32,
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_handle: u64,
    screen_rotation: i32,
    windows: HashMap<NativeHandle, PositionSize>,
    egl_windows: HashMap<NativeHandle, EglWindowRecord>,
    pixmaps: HashMap<NativeHandle, PhysicalSize<u32>>,
    pending_events: HashMap<NativeHandle, usize>,
    damage_reports: usize,
    rotation_completions: Vec<(NativeHandle, i32)>,
}

impl HeadlessState {
    fn allocate(&mut self) -> NativeHandle {
        self.next_handle += 1;
        NativeHandle(self.next_handle)
    }
}

/// ### English
/// In-memory [`WindowSystem`] with a fixed screen.
///
/// ### 中文
/// 屏幕固定的内存版 [`WindowSystem`]。
pub struct HeadlessWindowSystem {
    screen: PhysicalSize<u32>,
    dpi: (u32, u32),
    rotation_supported: bool,
    state: Mutex<HeadlessState>,
}

impl HeadlessWindowSystem {
    pub fn new(screen: PhysicalSize<u32>) -> Self {
        Self {
            screen,
            dpi: (96, 96),
            rotation_supported: true,
            state: Mutex::new(HeadlessState::default()),
        }
    }

    pub fn with_rotation_support(mut self, supported: bool) -> Self {
        self.rotation_supported = supported;
        self
    }

    pub fn set_screen_rotation(&self, angle: i32) {
        lock(&self.state).screen_rotation = angle.rem_euclid(360);
    }

    /// ### English
    /// Queues `count` fake input events for `window`.
    ///
    /// ### 中文
    /// 为 `window` 排入 `count` 个模拟输入事件。
    pub fn post_events(&self, window: NativeHandle, count: usize) {
        *lock(&self.state).pending_events.entry(window).or_default() += count;
    }

    pub fn pending_events(&self, window: NativeHandle) -> usize {
        lock(&self.state)
            .pending_events
            .get(&window)
            .copied()
            .unwrap_or(0)
    }

    pub fn window_position(&self, window: NativeHandle) -> Option<PositionSize> {
        lock(&self.state).windows.get(&window).copied()
    }

    pub fn egl_window_size(&self, egl_window: NativeHandle) -> Option<PhysicalSize<u32>> {
        lock(&self.state)
            .egl_windows
            .get(&egl_window)
            .map(|record| record.size)
    }

    pub fn egl_window_rotation(&self, egl_window: NativeHandle) -> Option<i32> {
        lock(&self.state)
            .egl_windows
            .get(&egl_window)
            .map(|record| record.rotation)
    }

    pub fn live_windows(&self) -> usize {
        lock(&self.state).windows.len()
    }

    pub fn live_egl_windows(&self) -> usize {
        lock(&self.state).egl_windows.len()
    }

    pub fn live_pixmaps(&self) -> usize {
        lock(&self.state).pixmaps.len()
    }

    pub fn damage_reports(&self) -> usize {
        lock(&self.state).damage_reports
    }

    pub fn rotation_completions(&self) -> Vec<(NativeHandle, i32)> {
        lock(&self.state).rotation_completions.clone()
    }
}

impl WindowSystem for HeadlessWindowSystem {
    fn screen_size(&self) -> PhysicalSize<u32> {
        self.screen
    }

    fn dpi(&self) -> (u32, u32) {
        self.dpi
    }

    fn screen_rotation_angle(&self) -> i32 {
        lock(&self.state).screen_rotation
    }

    fn create_window(&self, position: PositionSize, transparent: bool) -> Result<NativeHandle> {
        if position.is_empty() {
            return Err(Error::WindowSystem(format!(
                "cannot create a window with area {position:?}"
            )));
        }
        let mut state = lock(&self.state);
        let window = state.allocate();
        state.windows.insert(window, position);
        debug!(?window, ?position, transparent, "headless window created");
        Ok(window)
    }

    fn destroy_window(&self, window: NativeHandle) {
        let mut state = lock(&self.state);
        let dangling = state
            .egl_windows
            .values()
            .filter(|record| record.window == window)
            .count();
        if dangling > 0 {
            warn!(?window, dangling, "window destroyed before its egl windows");
        }
        state.windows.remove(&window);
        state.pending_events.remove(&window);
    }

    fn move_resize_window(&self, window: NativeHandle, position: PositionSize) {
        if let Some(current) = lock(&self.state).windows.get_mut(&window) {
            *current = position;
        }
    }

    fn create_egl_window(
        &self,
        window: NativeHandle,
        size: PhysicalSize<u32>,
    ) -> Result<NativeHandle> {
        let mut state = lock(&self.state);
        if !state.windows.contains_key(&window) {
            return Err(Error::WindowSystem(format!("unknown window {window:?}")));
        }
        let egl_window = state.allocate();
        state.egl_windows.insert(
            egl_window,
            EglWindowRecord {
                window,
                size,
                rotation: 0,
            },
        );
        Ok(egl_window)
    }

    fn destroy_egl_window(&self, egl_window: NativeHandle) {
        if lock(&self.state).egl_windows.remove(&egl_window).is_none() {
            warn!(?egl_window, "destroying an unknown egl window");
        }
    }

    fn resize_egl_window(&self, egl_window: NativeHandle, size: PhysicalSize<u32>) {
        if let Some(record) = lock(&self.state).egl_windows.get_mut(&egl_window) {
            record.size = size;
        }
    }

    fn set_egl_window_rotation(&self, egl_window: NativeHandle, angle: i32) {
        if let Some(record) = lock(&self.state).egl_windows.get_mut(&egl_window) {
            record.rotation = angle.rem_euclid(360);
        }
    }

    fn is_rotation_supported(&self, egl_window: NativeHandle) -> bool {
        self.rotation_supported && lock(&self.state).egl_windows.contains_key(&egl_window)
    }

    fn window_rotation_completed(&self, window: NativeHandle, angle: i32, _size: PhysicalSize<u32>) {
        lock(&self.state).rotation_completions.push((window, angle));
    }

    fn create_pixmap(&self, size: PhysicalSize<u32>, _depth: ColorDepth) -> Result<NativeHandle> {
        if size.width == 0 || size.height == 0 {
            return Err(Error::WindowSystem("cannot create an empty pixmap".into()));
        }
        let mut state = lock(&self.state);
        let pixmap = state.allocate();
        state.pixmaps.insert(pixmap, size);
        Ok(pixmap)
    }

    fn free_pixmap(&self, pixmap: NativeHandle) {
        lock(&self.state).pixmaps.remove(&pixmap);
    }

    fn damage_pixmap(&self, pixmap: NativeHandle, _area: Rect) {
        let mut state = lock(&self.state);
        if state.pixmaps.contains_key(&pixmap) {
            state.damage_reports += 1;
        }
    }

    fn dispatch_events(&self, window: NativeHandle) -> usize {
        lock(&self.state)
            .pending_events
            .remove(&window)
            .unwrap_or(0)
    }
}

impl std::fmt::Debug for HeadlessWindowSystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeadlessWindowSystem")
            .field("screen", &self.screen)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn egl_window_requires_a_window() {
        let ws = HeadlessWindowSystem::new(PhysicalSize::new(800, 480));
        assert!(ws.create_egl_window(NativeHandle(42), PhysicalSize::new(1, 1)).is_err());

        let window = ws.create_window(Rect::new(0, 0, 800, 480), false).unwrap();
        let egl = ws.create_egl_window(window, PhysicalSize::new(800, 480)).unwrap();
        ws.resize_egl_window(egl, PhysicalSize::new(400, 240));
        assert_eq!(ws.egl_window_size(egl), Some(PhysicalSize::new(400, 240)));
        ws.destroy_egl_window(egl);
        assert_eq!(ws.live_egl_windows(), 0);
    }

    #[test]
    fn events_are_drained_once() {
        let ws = HeadlessWindowSystem::new(PhysicalSize::new(800, 480));
        let window = ws.create_window(Rect::new(0, 0, 10, 10), false).unwrap();
        ws.post_events(window, 3);
        assert_eq!(ws.dispatch_events(window), 3);
        assert_eq!(ws.dispatch_events(window), 0);
    }
}
