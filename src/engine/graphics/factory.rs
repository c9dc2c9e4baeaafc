use crate::engine::config::EnvironmentOptions;
use crate::engine::error::Result;

use super::{GraphicsInterface, HeadlessControl, HeadlessGraphics};

/// ### English
/// Creates the graphics backend for one adaptor. The adaptor owns the factory for its lifetime
/// and hands the created backend to its render thread.
///
/// ### 中文
/// 为一个 adaptor 创建图形后端。adaptor 在其生命周期内持有该工厂，并把创建的后端交给渲染线程。
pub trait GraphicsFactory: Send + Sync {
    fn create_graphics(&self, options: &EnvironmentOptions) -> Result<Box<dyn GraphicsInterface>>;
}

/// ### English
/// Factory for [`HeadlessGraphics`]; every backend it creates reports to the same control.
///
/// ### 中文
/// [`HeadlessGraphics`] 的工厂；其创建的所有后端共用同一个 control。
#[derive(Clone, Default)]
pub struct HeadlessGraphicsFactory {
    control: HeadlessControl,
}

impl HeadlessGraphicsFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn control(&self) -> HeadlessControl {
        self.control.clone()
    }
}

impl GraphicsFactory for HeadlessGraphicsFactory {
    fn create_graphics(&self, _options: &EnvironmentOptions) -> Result<Box<dyn GraphicsInterface>> {
        Ok(Box::new(HeadlessGraphics::with_control(self.control.clone())))
    }
}
