use image::DynamicImage;
use image::imageops::{self, FilterType};

use crate::error::{EditorError, Result};

/// Sample layout of a [`PixelBuffer`].
///
/// `Rgba` stores straight (non-premultiplied) alpha.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PixelFormat {
    Rgb,
    Rgba,
}

impl PixelFormat {
    pub fn channels(self) -> usize {
        match self {
            PixelFormat::Rgb => 3,
            PixelFormat::Rgba => 4,
        }
    }
}

/// Resampling kernel used by [`PixelBuffer::resized`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResizeFilter {
    Nearest,
    Box,
    Bilinear,
    Bicubic,
    #[default]
    Lanczos,
}

impl ResizeFilter {
    fn to_image_filter(self) -> FilterType {
        match self {
            // `image` has no separate box kernel; nearest is its zero-order
            // equivalent.
            ResizeFilter::Nearest | ResizeFilter::Box => FilterType::Nearest,
            ResizeFilter::Bilinear => FilterType::Triangle,
            ResizeFilter::Bicubic => FilterType::CatmullRom,
            ResizeFilter::Lanczos => FilterType::Lanczos3,
        }
    }
}

/// Axis-aligned rectangle in buffer coordinates. May extend outside the
/// buffer; operations clip it first.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: u32, height: u32) -> Self {
        Self { x, y, width, height }
    }
}

/// Owned 2D raster with 8-bit samples.
///
/// The sample vector always holds exactly `width * height * channels` bytes;
/// every constructor enforces this. Cloning is a deep copy with no shared
/// backing storage, which is what the history snapshots rely on.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PixelBuffer {
    width: u32,
    height: u32,
    format: PixelFormat,
    data: Vec<u8>,
}

impl PixelBuffer {
    /// Allocate a buffer filled with a constant color. For `Rgb` the alpha
    /// component of `fill` is ignored.
    pub fn new(width: u32, height: u32, format: PixelFormat, fill: [u8; 4]) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(EditorError::InvalidDimension { width, height });
        }
        let channels = format.channels();
        let mut data = Vec::with_capacity(width as usize * height as usize * channels);
        for _ in 0..width as usize * height as usize {
            data.extend_from_slice(&fill[..channels]);
        }
        Ok(Self { width, height, format, data })
    }

    /// Wrap an existing sample vector. Returns `None` when the length does
    /// not match the dimensions, mirroring `image::RgbaImage::from_raw`.
    pub fn from_raw(width: u32, height: u32, format: PixelFormat, data: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        if data.len() != width as usize * height as usize * format.channels() {
            return None;
        }
        Some(Self { width, height, format, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn size(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    pub fn format(&self) -> PixelFormat {
        self.format
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub(crate) fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Bytes per row.
    pub(crate) fn stride(&self) -> usize {
        self.width as usize * self.format.channels()
    }

    #[inline]
    fn index(&self, x: u32, y: u32) -> usize {
        (y as usize * self.width as usize + x as usize) * self.format.channels()
    }

    /// Read a pixel without bounds checking; callers guarantee the
    /// coordinates are inside the buffer. `Rgb` reads report alpha 255.
    #[inline]
    pub(crate) fn sample(&self, x: u32, y: u32) -> [u8; 4] {
        let i = self.index(x, y);
        match self.format {
            PixelFormat::Rgb => [self.data[i], self.data[i + 1], self.data[i + 2], 255],
            PixelFormat::Rgba => [
                self.data[i],
                self.data[i + 1],
                self.data[i + 2],
                self.data[i + 3],
            ],
        }
    }

    /// Bounds-checked pixel read. `Rgb` buffers report alpha 255.
    pub fn pixel(&self, x: u32, y: u32) -> Result<[u8; 4]> {
        self.check_bounds(x, y)?;
        Ok(self.sample(x, y))
    }

    /// Bounds-checked pixel write. The alpha component is ignored for `Rgb`.
    pub fn set_pixel(&mut self, x: u32, y: u32, pixel: [u8; 4]) -> Result<()> {
        self.check_bounds(x, y)?;
        let i = self.index(x, y);
        let channels = self.format.channels();
        self.data[i..i + channels].copy_from_slice(&pixel[..channels]);
        Ok(())
    }

    fn check_bounds(&self, x: u32, y: u32) -> Result<()> {
        if x >= self.width || y >= self.height {
            return Err(EditorError::OutOfBounds {
                x,
                y,
                width: self.width,
                height: self.height,
            });
        }
        Ok(())
    }

    /// Copy converting to `Rgba`; existing `Rgba` buffers clone unchanged.
    pub fn to_rgba(&self) -> PixelBuffer {
        match self.format {
            PixelFormat::Rgba => self.clone(),
            PixelFormat::Rgb => {
                let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 4);
                for px in self.data.chunks_exact(3) {
                    data.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
                PixelBuffer {
                    width: self.width,
                    height: self.height,
                    format: PixelFormat::Rgba,
                    data,
                }
            }
        }
    }

    /// Copy converting to opaque `Rgb`; the alpha channel is dropped.
    pub fn to_rgb(&self) -> PixelBuffer {
        match self.format {
            PixelFormat::Rgb => self.clone(),
            PixelFormat::Rgba => {
                let mut data = Vec::with_capacity(self.width as usize * self.height as usize * 3);
                for px in self.data.chunks_exact(4) {
                    data.extend_from_slice(&px[..3]);
                }
                PixelBuffer {
                    width: self.width,
                    height: self.height,
                    format: PixelFormat::Rgb,
                    data,
                }
            }
        }
    }

    /// Resample into a new buffer of the given size.
    pub fn resized(&self, width: u32, height: u32, filter: ResizeFilter) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(EditorError::InvalidDimension { width, height });
        }
        let resized = imageops::resize(&self.as_dynamic(), width, height, filter.to_image_filter());
        let out = DynamicImage::ImageRgba8(resized);
        Ok(Self::from_dynamic(out, self.format))
    }

    /// Extract a sub-rectangle, clipped to the buffer bounds.
    pub fn cropped(&self, rect: Rect) -> Result<Self> {
        let x0 = rect.x.max(0) as u32;
        let y0 = rect.y.max(0) as u32;
        let x1 = rect
            .x
            .saturating_add(rect.width.min(i32::MAX as u32) as i32)
            .clamp(0, self.width as i32) as u32;
        let y1 = rect
            .y
            .saturating_add(rect.height.min(i32::MAX as u32) as i32)
            .clamp(0, self.height as i32) as u32;
        if x0 >= x1 || y0 >= y1 || x0 >= self.width || y0 >= self.height {
            return Err(EditorError::EmptyRegion);
        }

        let channels = self.format.channels();
        let out_w = x1 - x0;
        let out_h = y1 - y0;
        let mut data = Vec::with_capacity(out_w as usize * out_h as usize * channels);
        for y in y0..y1 {
            let start = self.index(x0, y);
            data.extend_from_slice(&self.data[start..start + out_w as usize * channels]);
        }
        Ok(Self {
            width: out_w,
            height: out_h,
            format: self.format,
            data,
        })
    }

    /// Rotate clockwise by 90 degrees.
    pub fn rotated90(&self) -> PixelBuffer {
        Self::from_dynamic(self.as_dynamic().rotate90(), self.format)
    }

    /// Rotate by 180 degrees.
    pub fn rotated180(&self) -> PixelBuffer {
        Self::from_dynamic(self.as_dynamic().rotate180(), self.format)
    }

    /// Rotate clockwise by 270 degrees.
    pub fn rotated270(&self) -> PixelBuffer {
        Self::from_dynamic(self.as_dynamic().rotate270(), self.format)
    }

    /// Mirror along the vertical axis.
    pub fn flipped_horizontal(&self) -> PixelBuffer {
        Self::from_dynamic(self.as_dynamic().fliph(), self.format)
    }

    /// Mirror along the horizontal axis.
    pub fn flipped_vertical(&self) -> PixelBuffer {
        Self::from_dynamic(self.as_dynamic().flipv(), self.format)
    }

    pub(crate) fn as_dynamic(&self) -> DynamicImage {
        match self.format {
            PixelFormat::Rgb => DynamicImage::ImageRgb8(
                image::RgbImage::from_raw(self.width, self.height, self.data.clone())
                    .expect("sample count matches dimensions"),
            ),
            PixelFormat::Rgba => DynamicImage::ImageRgba8(
                image::RgbaImage::from_raw(self.width, self.height, self.data.clone())
                    .expect("sample count matches dimensions"),
            ),
        }
    }

    pub(crate) fn from_dynamic(img: DynamicImage, format: PixelFormat) -> PixelBuffer {
        match format {
            PixelFormat::Rgb => {
                let rgb = img.to_rgb8();
                let (width, height) = rgb.dimensions();
                PixelBuffer {
                    width,
                    height,
                    format,
                    data: rgb.into_raw(),
                }
            }
            PixelFormat::Rgba => {
                let rgba = img.to_rgba8();
                let (width, height) = rgba.dimensions();
                PixelBuffer {
                    width,
                    height,
                    format,
                    data: rgba.into_raw(),
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_rejects_zero_dimension() {
        assert!(matches!(
            PixelBuffer::new(0, 10, PixelFormat::Rgba, [0; 4]),
            Err(EditorError::InvalidDimension { .. })
        ));
        assert!(matches!(
            PixelBuffer::new(10, 0, PixelFormat::Rgb, [0; 4]),
            Err(EditorError::InvalidDimension { .. })
        ));
    }

    #[test]
    fn fill_and_sample_count() {
        let buf = PixelBuffer::new(4, 3, PixelFormat::Rgba, [1, 2, 3, 4]).unwrap();
        assert_eq!(buf.data().len(), 4 * 3 * 4);
        assert_eq!(buf.pixel(3, 2).unwrap(), [1, 2, 3, 4]);

        let rgb = PixelBuffer::new(4, 3, PixelFormat::Rgb, [9, 8, 7, 0]).unwrap();
        assert_eq!(rgb.data().len(), 4 * 3 * 3);
        assert_eq!(rgb.pixel(0, 0).unwrap(), [9, 8, 7, 255]);
    }

    #[test]
    fn pixel_access_bounds_checked() {
        let mut buf = PixelBuffer::new(2, 2, PixelFormat::Rgba, [0; 4]).unwrap();
        assert!(matches!(
            buf.pixel(2, 0),
            Err(EditorError::OutOfBounds { .. })
        ));
        assert!(matches!(
            buf.set_pixel(0, 2, [0; 4]),
            Err(EditorError::OutOfBounds { .. })
        ));
        buf.set_pixel(1, 1, [10, 20, 30, 40]).unwrap();
        assert_eq!(buf.pixel(1, 1).unwrap(), [10, 20, 30, 40]);
    }

    #[test]
    fn clone_is_deep() {
        let mut a = PixelBuffer::new(2, 2, PixelFormat::Rgba, [5; 4]).unwrap();
        let b = a.clone();
        a.set_pixel(0, 0, [0, 0, 0, 0]).unwrap();
        assert_eq!(b.pixel(0, 0).unwrap(), [5, 5, 5, 5]);
    }

    #[test]
    fn crop_clips_to_bounds() {
        let mut buf = PixelBuffer::new(10, 10, PixelFormat::Rgba, [0; 4]).unwrap();
        buf.set_pixel(9, 9, [1, 2, 3, 4]).unwrap();
        let cropped = buf.cropped(Rect::new(8, 8, 100, 100)).unwrap();
        assert_eq!(cropped.size(), (2, 2));
        assert_eq!(cropped.pixel(1, 1).unwrap(), [1, 2, 3, 4]);
    }

    #[test]
    fn crop_negative_origin() {
        let buf = PixelBuffer::new(10, 10, PixelFormat::Rgb, [7, 7, 7, 0]).unwrap();
        let cropped = buf.cropped(Rect::new(-5, -5, 8, 8)).unwrap();
        assert_eq!(cropped.size(), (3, 3));
    }

    #[test]
    fn crop_empty_region_rejected() {
        let buf = PixelBuffer::new(10, 10, PixelFormat::Rgba, [0; 4]).unwrap();
        assert!(matches!(
            buf.cropped(Rect::new(20, 20, 5, 5)),
            Err(EditorError::EmptyRegion)
        ));
        assert!(matches!(
            buf.cropped(Rect::new(0, 0, 0, 5)),
            Err(EditorError::EmptyRegion)
        ));
    }

    #[test]
    fn resize_rejects_zero_target() {
        let buf = PixelBuffer::new(4, 4, PixelFormat::Rgba, [0; 4]).unwrap();
        assert!(matches!(
            buf.resized(0, 4, ResizeFilter::default()),
            Err(EditorError::InvalidDimension { .. })
        ));
    }

    #[test]
    fn resize_constant_image_stays_constant() {
        let buf = PixelBuffer::new(8, 8, PixelFormat::Rgba, [100, 150, 200, 255]).unwrap();
        let out = buf.resized(16, 16, ResizeFilter::default()).unwrap();
        assert_eq!(out.size(), (16, 16));
        assert_eq!(out.pixel(8, 8).unwrap(), [100, 150, 200, 255]);
    }

    #[test]
    fn format_conversions() {
        let rgba = PixelBuffer::new(2, 2, PixelFormat::Rgba, [10, 20, 30, 40]).unwrap();
        let rgb = rgba.to_rgb();
        assert_eq!(rgb.format(), PixelFormat::Rgb);
        assert_eq!(rgb.pixel(0, 0).unwrap(), [10, 20, 30, 255]);

        let back = rgb.to_rgba();
        assert_eq!(back.pixel(0, 0).unwrap(), [10, 20, 30, 255]);
    }

    #[test]
    fn rotate_quarter_turn() {
        let mut buf = PixelBuffer::new(2, 1, PixelFormat::Rgba, [0; 4]).unwrap();
        buf.set_pixel(0, 0, [255, 0, 0, 255]).unwrap();
        buf.set_pixel(1, 0, [0, 255, 0, 255]).unwrap();
        let rotated = buf.rotated90();
        assert_eq!(rotated.size(), (1, 2));
        assert_eq!(rotated.pixel(0, 0).unwrap(), [255, 0, 0, 255]);
        assert_eq!(rotated.pixel(0, 1).unwrap(), [0, 255, 0, 255]);
    }
}
