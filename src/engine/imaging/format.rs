/// ### English
/// Pixel layout of a native buffer.
///
/// ### 中文
/// native buffer 的像素布局。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ColorFormat {
    Bgra8888,
    Bgrx8888,
    Bgr888,
    Rgba8888,
    Rgbx8888,
    Rgb888,
}

impl ColorFormat {
    #[inline]
    pub const fn bytes_per_pixel(self) -> u32 {
        match self {
            ColorFormat::Bgr888 | ColorFormat::Rgb888 => 3,
            _ => 4,
        }
    }

    /// ### English
    /// Formats carrying a real alpha channel need blending when sampled.
    ///
    /// ### 中文
    /// 带真实 alpha 通道的格式在采样时需要混合。
    #[inline]
    pub const fn is_blending_required(self) -> bool {
        matches!(self, ColorFormat::Bgra8888 | ColorFormat::Rgba8888)
    }
}

/// ### English
/// Borrowed view of image pixels, as handed to texture uploads.
///
/// ### 中文
/// 图像像素的借用视图，用于纹理上传。
#[derive(Clone, Copy, Debug)]
pub struct ImageView<'a> {
    pub width: u32,
    pub height: u32,
    /// ### English
    /// Bytes per row.
    ///
    /// ### 中文
    /// 每行字节数。
    pub stride: u32,
    pub format: ColorFormat,
    pub pixels: &'a [u8],
}
