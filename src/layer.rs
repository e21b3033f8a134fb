use crate::blend::BlendMode;
use crate::buffer::{PixelBuffer, PixelFormat, ResizeFilter};
use crate::error::Result;

/// Single raster element in the document: an owned buffer plus display
/// attributes. Offsets position the buffer origin in canvas coordinates and
/// may be negative; the compositor clips.
///
/// Cloning a layer deep-copies its buffer and mask, which is what
/// duplication and history snapshots rely on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Layer {
    pub image: Option<PixelBuffer>,
    pub name: String,
    pub visible: bool,
    /// Percent, clamped to 0..=100.
    pub opacity: u8,
    pub blend_mode: BlendMode,
    pub x_offset: i32,
    pub y_offset: i32,
    /// Optional grayscale alpha modifier; applied when its size matches the
    /// image.
    pub mask: Option<PixelBuffer>,
}

impl Layer {
    pub fn new(image: Option<PixelBuffer>, name: impl Into<String>) -> Self {
        Self {
            image,
            name: name.into(),
            visible: true,
            opacity: 100,
            blend_mode: BlendMode::Normal,
            x_offset: 0,
            y_offset: 0,
            mask: None,
        }
    }

    pub fn set_opacity(&mut self, opacity: u8) {
        self.opacity = opacity.min(100);
    }

    /// Replace the layer's buffer with a resampled copy (Lanczos).
    pub fn resize(&mut self, width: u32, height: u32) -> Result<()> {
        if let Some(image) = &self.image {
            self.image = Some(image.resized(width, height, ResizeFilter::Lanczos)?);
        }
        Ok(())
    }

    /// Display version of the buffer with opacity (and mask, when present)
    /// folded into the alpha channel.
    ///
    /// Returns the buffer unchanged at opacity 100 with no mask, `None` when
    /// the layer holds no image; otherwise an RGBA copy whose alpha is
    /// scaled by `opacity/100`, rounded to nearest.
    pub fn apply_opacity(&self) -> Option<PixelBuffer> {
        let image = self.image.as_ref()?;
        let opacity = self.opacity.min(100) as u32;

        let mask = self
            .mask
            .as_ref()
            .filter(|m| m.size() == image.size());
        if opacity == 100 && mask.is_none() {
            return Some(image.clone());
        }

        let mut out = image.to_rgba();
        let (width, height) = out.size();
        let data = out.data_mut();
        for y in 0..height {
            for x in 0..width {
                let i = (y as usize * width as usize + x as usize) * 4;
                let mut a = (data[i + 3] as u32 * opacity + 50) / 100;
                if let Some(mask) = mask {
                    let m = mask.sample(x, y)[0] as u32;
                    a = (a * m + 127) / 255;
                }
                data[i + 3] = a as u8;
            }
        }
        debug_assert_eq!(out.format(), PixelFormat::Rgba);
        Some(out)
    }
}
