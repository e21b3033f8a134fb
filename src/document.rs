use std::io::Cursor;

use image::ImageFormat;
use log::debug;

use crate::blend::BlendMode;
use crate::buffer::PixelBuffer;
use crate::error::{EditorError, Result};
use crate::history::{DEFAULT_HISTORY_CAP, HistoryManager};
use crate::layer::Layer;
use crate::stack::LayerStack;

/// Encoded output formats for [`Document::export_composite`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExportFormat {
    Png,
    Jpeg,
    Bmp,
    Gif,
    Tiff,
}

impl ExportFormat {
    pub fn label(&self) -> &'static str {
        match self {
            ExportFormat::Png => "PNG",
            ExportFormat::Jpeg => "JPEG",
            ExportFormat::Bmp => "BMP",
            ExportFormat::Gif => "GIF",
            ExportFormat::Tiff => "TIFF",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Png => "png",
            ExportFormat::Jpeg => "jpg",
            ExportFormat::Bmp => "bmp",
            ExportFormat::Gif => "gif",
            ExportFormat::Tiff => "tiff",
        }
    }

    fn image_format(&self) -> ImageFormat {
        match self {
            ExportFormat::Png => ImageFormat::Png,
            ExportFormat::Jpeg => ImageFormat::Jpeg,
            ExportFormat::Bmp => ImageFormat::Bmp,
            ExportFormat::Gif => ImageFormat::Gif,
            ExportFormat::Tiff => ImageFormat::Tiff,
        }
    }

    fn supports_alpha(&self) -> bool {
        !matches!(self, ExportFormat::Jpeg)
    }
}

/// Decode encoded image bytes into an RGBA buffer. Codec failures pass
/// through unchanged for the UI to report.
pub fn decode_image(bytes: &[u8]) -> Result<PixelBuffer> {
    let decoded = image::load_from_memory(bytes).map_err(EditorError::DecodeFailure)?;
    let rgba = decoded.to_rgba8();
    let (width, height) = rgba.dimensions();
    PixelBuffer::from_raw(width, height, crate::buffer::PixelFormat::Rgba, rgba.into_raw())
        .ok_or(EditorError::InvalidDimension { width, height })
}

/// Encode a buffer into the given format. Formats without an alpha channel
/// get the alpha dropped; flattening against a background color beforehand
/// is the caller's choice.
pub fn encode_image(buffer: &PixelBuffer, format: ExportFormat) -> Result<Vec<u8>> {
    let dynamic = if format.supports_alpha() {
        buffer.as_dynamic()
    } else {
        buffer.to_rgb().as_dynamic()
    };
    let mut out = Cursor::new(Vec::new());
    dynamic
        .write_to(&mut out, format.image_format())
        .map_err(EditorError::EncodeFailure)?;
    Ok(out.into_inner())
}

/// One open document: the live layer stack plus its session-only undo
/// history. This is the surface the UI layer talks to; every mutating
/// operation snapshots the stack first so undo can restore it.
#[derive(Debug)]
pub struct Document {
    stack: LayerStack,
    history: HistoryManager,
}

impl Default for Document {
    fn default() -> Self {
        Self::new()
    }
}

impl Document {
    pub fn new() -> Self {
        Self::with_history_cap(DEFAULT_HISTORY_CAP)
    }

    /// `history_cap` comes from the application settings at startup.
    pub fn with_history_cap(history_cap: usize) -> Self {
        Self {
            stack: LayerStack::new(),
            history: HistoryManager::new(history_cap),
        }
    }

    pub fn stack(&self) -> &LayerStack {
        &self.stack
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        self.stack.canvas_size()
    }

    /// Composite of all visible layers for the renderer; `None` means
    /// nothing to display.
    pub fn composite_for_display(&self) -> Option<PixelBuffer> {
        self.stack.composite()
    }

    /// Start a fresh document with an opaque background. Resets history to
    /// this state as its single entry.
    pub fn new_document(&mut self, width: u32, height: u32, bg_color: [u8; 4]) -> Result<()> {
        self.stack.create_new_document(width, height, bg_color)?;
        self.history.clear();
        self.history.push(&self.stack);
        Ok(())
    }

    /// Install a decoded image as the document's background layer. The
    /// buffer typically comes from [`decode_image`], possibly produced on a
    /// worker thread for large files.
    pub fn open_decoded(&mut self, buffer: PixelBuffer) {
        self.stack.open_image(buffer);
        self.history.clear();
        self.history.push(&self.stack);
        debug!("opened document {:?}", self.stack.canvas_size());
    }

    /// Snapshot the current state; the UI calls this right before mutating
    /// layer buffers directly (brush strokes, filters).
    pub fn push_snapshot(&mut self) {
        self.history.push(&self.stack);
    }

    /// Run a structural edit with a snapshot taken first; a failed edit
    /// rolls the snapshot back so history only grows on real changes.
    fn edit<T>(&mut self, op: impl FnOnce(&mut LayerStack) -> Result<T>) -> Result<T> {
        self.history.push(&self.stack);
        match op(&mut self.stack) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.history.forget_latest();
                Err(err)
            }
        }
    }

    pub fn add_layer(&mut self) {
        self.history.push(&self.stack);
        self.stack.add_layer(None);
    }

    pub fn delete_layer(&mut self, index: Option<usize>) -> Result<()> {
        self.edit(|stack| stack.delete_layer(index))
    }

    pub fn duplicate_layer(&mut self, index: Option<usize>) -> Option<String> {
        self.history.push(&self.stack);
        match self.stack.duplicate_layer(index) {
            Some(layer) => Some(layer.name.clone()),
            None => {
                self.history.forget_latest();
                None
            }
        }
    }

    pub fn move_layer(&mut self, from: usize, to: usize) -> Result<()> {
        self.edit(|stack| stack.move_layer(from, to))
    }

    pub fn merge_layers(&mut self, index1: usize, index2: usize) -> Result<()> {
        self.edit(|stack| stack.merge_layers(index1, index2))
    }

    pub fn flatten_image(&mut self) -> Option<PixelBuffer> {
        self.history.push(&self.stack);
        match self.stack.flatten_image() {
            Some(flat) => Some(flat),
            None => {
                self.history.forget_latest();
                None
            }
        }
    }

    pub fn rename_layer(&mut self, index: usize, name: impl Into<String>) -> Result<()> {
        let name = name.into();
        self.edit(|stack| stack.rename_layer(index, name))
    }

    pub fn set_visible(&mut self, index: usize, visible: bool) -> Result<()> {
        self.edit(|stack| stack.set_visible(index, visible))
    }

    pub fn set_layer_opacity(&mut self, index: usize, opacity: u8) -> Result<()> {
        self.edit(|stack| stack.set_layer_opacity(index, opacity))
    }

    pub fn set_blend_mode(&mut self, index: usize, mode: BlendMode) -> Result<()> {
        self.edit(|stack| stack.set_blend_mode(index, mode))
    }

    pub fn set_layer_offset(&mut self, index: usize, x: i32, y: i32) -> Result<()> {
        self.edit(|stack| stack.set_layer_offset(index, x, y))
    }

    /// Selecting a layer is not an edit; no snapshot is taken.
    pub fn set_active(&mut self, index: usize) -> Result<()> {
        self.stack.set_active(index)
    }

    /// Mutable access to the active layer for direct pixel edits. Callers
    /// are expected to [`push_snapshot`](Self::push_snapshot) first.
    pub fn active_layer_mut(&mut self) -> Option<&mut Layer> {
        self.stack.active_layer_mut()
    }

    /// Paste an externally produced raster (text glyphs, stamps) onto the
    /// active layer.
    pub fn paste_buffer(&mut self, buffer: &PixelBuffer, x: i32, y: i32, mode: BlendMode) -> Result<()> {
        self.edit(|stack| stack.paste_into_active(buffer, x, y, mode))
    }

    pub fn can_undo(&self) -> bool {
        self.history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.history.can_redo()
    }

    /// Restore the previous snapshot; returns whether anything changed.
    pub fn undo(&mut self) -> bool {
        match self.history.undo() {
            Some((layers, active)) => {
                self.stack.install(layers, active);
                true
            }
            None => false,
        }
    }

    /// Re-apply the next snapshot; returns whether anything changed.
    pub fn redo(&mut self) -> bool {
        match self.history.redo() {
            Some((layers, active)) => {
                self.stack.install(layers, active);
                true
            }
            None => false,
        }
    }

    /// Encode the RGBA composite for the external file writer. An empty
    /// stack has nothing to encode.
    pub fn export_composite(&self, format: ExportFormat) -> Result<Vec<u8>> {
        let composite = self.stack.composite().ok_or(EditorError::EmptyRegion)?;
        encode_image(&composite, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PixelFormat;

    fn white_doc() -> Document {
        let mut doc = Document::new();
        doc.new_document(8, 8, [255, 255, 255, 255]).unwrap();
        doc
    }

    #[test]
    fn new_document_seeds_history() {
        let doc = white_doc();
        assert!(!doc.can_undo());
        assert!(!doc.can_redo());
        assert_eq!(doc.canvas_size(), (8, 8));
    }

    #[test]
    fn undo_reverses_add_layer() {
        let mut doc = white_doc();
        doc.add_layer();
        assert_eq!(doc.stack().len(), 2);
        assert!(doc.undo());
        assert_eq!(doc.stack().len(), 1);
        // Redo reinstalls the snapshot taken before the edit; the edit's
        // result itself was never captured.
        assert!(doc.can_redo());
        assert!(doc.redo());
        assert_eq!(doc.stack().len(), 1);
    }

    #[test]
    fn failed_edit_leaves_history_untouched() {
        let mut doc = white_doc();
        assert!(doc.delete_layer(None).is_err());
        assert!(!doc.can_undo());
        assert!(doc.duplicate_layer(Some(7)).is_none());
        assert!(!doc.can_undo());
    }

    #[test]
    fn edit_after_undo_discards_redo() {
        let mut doc = white_doc();
        doc.add_layer();
        doc.add_layer();
        assert!(doc.undo());
        assert!(doc.can_redo());
        doc.add_layer();
        assert!(!doc.can_redo());
        assert!(!doc.redo());
    }

    #[test]
    fn undo_restores_layer_attributes() {
        let mut doc = white_doc();
        doc.set_layer_opacity(0, 40).unwrap();
        assert_eq!(doc.stack().layers()[0].opacity, 40);
        assert!(doc.undo());
        assert_eq!(doc.stack().layers()[0].opacity, 100);

        doc.rename_layer(0, "Renamed").unwrap();
        assert_eq!(doc.stack().layers()[0].name, "Renamed");
        assert!(doc.undo());
        assert_eq!(doc.stack().layers()[0].name, "Background");
    }

    #[test]
    fn open_decoded_replaces_content_and_history() {
        let mut doc = white_doc();
        doc.add_layer();
        let buffer = PixelBuffer::new(20, 10, PixelFormat::Rgba, [1, 2, 3, 255]).unwrap();
        doc.open_decoded(buffer);
        assert_eq!(doc.canvas_size(), (20, 10));
        assert_eq!(doc.stack().len(), 1);
        assert!(!doc.can_undo());
    }

    #[test]
    fn export_empty_document_fails() {
        let doc = Document::new();
        assert!(matches!(
            doc.export_composite(ExportFormat::Png),
            Err(EditorError::EmptyRegion)
        ));
    }

    #[test]
    fn png_round_trip() {
        let mut doc = Document::new();
        doc.new_document(6, 4, [10, 200, 30, 255]).unwrap();
        let bytes = doc.export_composite(ExportFormat::Png).unwrap();
        let decoded = decode_image(&bytes).unwrap();
        assert_eq!(decoded.size(), (6, 4));
        assert_eq!(decoded.pixel(3, 2).unwrap(), [10, 200, 30, 255]);
    }

    #[test]
    fn jpeg_export_drops_alpha() {
        let doc = white_doc();
        let bytes = doc.export_composite(ExportFormat::Jpeg).unwrap();
        assert!(!bytes.is_empty());
        let decoded = decode_image(&bytes).unwrap();
        assert_eq!(decoded.size(), (8, 8));
    }

    #[test]
    fn decode_garbage_fails() {
        assert!(matches!(
            decode_image(b"not an image"),
            Err(EditorError::DecodeFailure(_))
        ));
    }

    #[test]
    fn paste_buffer_is_undoable() {
        let mut doc = white_doc();
        let stamp = PixelBuffer::new(2, 2, PixelFormat::Rgba, [0, 0, 0, 255]).unwrap();
        doc.paste_buffer(&stamp, 1, 1, BlendMode::Normal).unwrap();
        let after = doc.composite_for_display().unwrap();
        assert_eq!(after.pixel(1, 1).unwrap(), [0, 0, 0, 255]);
        assert!(doc.undo());
        let before = doc.composite_for_display().unwrap();
        assert_eq!(before.pixel(1, 1).unwrap(), [255, 255, 255, 255]);
    }
}
