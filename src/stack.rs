use log::{debug, warn};

use crate::blend::{BlendMode, composite_over};
use crate::buffer::{PixelBuffer, PixelFormat};
use crate::error::{EditorError, Result};
use crate::layer::Layer;

/// Default canvas size used before any document is created or opened.
pub const DEFAULT_CANVAS_SIZE: (u32, u32) = (800, 600);

/// Ordered stack of layers (index 0 = bottom) plus the active-layer index
/// and the canvas coordinate space everything composites into.
///
/// Every failing operation leaves the stack untouched. After any single
/// public operation other than [`clear_layers`](Self::clear_layers) a
/// non-empty stack keeps at least one layer.
#[derive(Clone, Debug)]
pub struct LayerStack {
    layers: Vec<Layer>,
    active: Option<usize>,
    canvas_size: (u32, u32),
}

impl Default for LayerStack {
    fn default() -> Self {
        Self::new()
    }
}

impl LayerStack {
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            active: None,
            canvas_size: DEFAULT_CANVAS_SIZE,
        }
    }

    pub fn layers(&self) -> &[Layer] {
        &self.layers
    }

    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }

    pub fn canvas_size(&self) -> (u32, u32) {
        self.canvas_size
    }

    pub fn active_index(&self) -> Option<usize> {
        self.active
    }

    pub fn active_layer(&self) -> Option<&Layer> {
        self.layers.get(self.active?)
    }

    pub fn active_layer_mut(&mut self) -> Option<&mut Layer> {
        let index = self.active?;
        self.layers.get_mut(index)
    }

    pub fn layer(&self, index: usize) -> Result<&Layer> {
        self.check_index(index)?;
        Ok(&self.layers[index])
    }

    fn check_index(&self, index: usize) -> Result<()> {
        if index >= self.layers.len() {
            return Err(EditorError::InvalidIndex {
                index,
                len: self.layers.len(),
            });
        }
        Ok(())
    }

    fn resolve_index(&self, index: Option<usize>) -> Result<usize> {
        let index = index.or(self.active).ok_or(EditorError::InvalidIndex {
            index: 0,
            len: self.layers.len(),
        })?;
        self.check_index(index)?;
        Ok(index)
    }

    /// Replace all layers with a single opaque background layer.
    pub fn create_new_document(&mut self, width: u32, height: u32, bg_color: [u8; 4]) -> Result<()> {
        let background = PixelBuffer::new(width, height, PixelFormat::Rgb, bg_color)?;
        self.canvas_size = (width, height);
        self.layers = vec![Layer::new(Some(background), "Background")];
        self.active = Some(0);
        debug!("new document {width}x{height}");
        Ok(())
    }

    /// Replace the stack with a single opaque background layer holding a
    /// decoded image; the canvas adopts the image size.
    pub fn open_image(&mut self, buffer: PixelBuffer) {
        self.canvas_size = buffer.size();
        self.layers = vec![Layer::new(Some(buffer), "Background")];
        self.active = Some(0);
    }

    /// Append a layer on top of the stack and make it active. When `layer`
    /// is `None` a transparent canvas-sized layer named `"Layer {N}"` is
    /// synthesized.
    pub fn add_layer(&mut self, layer: Option<Layer>) -> &Layer {
        let layer = layer.unwrap_or_else(|| {
            let (width, height) = self.canvas_size;
            let transparent = PixelBuffer::new(width, height, PixelFormat::Rgba, [0, 0, 0, 0])
                .expect("canvas size is never zero");
            Layer::new(Some(transparent), format!("Layer {}", self.layers.len() + 1))
        });
        self.layers.push(layer);
        self.active = Some(self.layers.len() - 1);
        debug!("added layer {:?}", self.layers.last().map(|l| &l.name));
        &self.layers[self.layers.len() - 1]
    }

    /// Remove a layer (the active one by default). The last remaining layer
    /// can never be deleted.
    pub fn delete_layer(&mut self, index: Option<usize>) -> Result<()> {
        let index = self.resolve_index(index)?;
        if self.layers.len() <= 1 {
            warn!("refusing to delete the last layer");
            return Err(EditorError::LastLayerProtected);
        }
        self.layers.remove(index);
        if let Some(active) = self.active {
            if active >= self.layers.len() {
                self.active = Some(self.layers.len() - 1);
            }
        }
        Ok(())
    }

    /// Reposition a layer within the stack; the active index follows the
    /// moved layer.
    pub fn move_layer(&mut self, from: usize, to: usize) -> Result<()> {
        self.check_index(from)?;
        self.check_index(to)?;
        let layer = self.layers.remove(from);
        self.layers.insert(to, layer);
        if self.active == Some(from) {
            self.active = Some(to);
        }
        Ok(())
    }

    /// Deep-copy a layer (the active one by default), insert the copy
    /// directly above the source and make it active. Returns `None` on an
    /// invalid index.
    pub fn duplicate_layer(&mut self, index: Option<usize>) -> Option<&Layer> {
        let index = self.resolve_index(index).ok()?;
        let mut copy = self.layers[index].clone();
        copy.name = format!("Copy of {}", copy.name);
        self.layers.insert(index + 1, copy);
        self.active = Some(index + 1);
        Some(&self.layers[index + 1])
    }

    /// Merge two layers into one. The numerically smaller index is treated
    /// as the lower layer; the upper layer (after its own opacity) is
    /// alpha-pasted onto a copy of the lower buffer at the upper layer's
    /// offset. The result replaces the lower slot and the upper slot is
    /// removed.
    pub fn merge_layers(&mut self, index1: usize, index2: usize) -> Result<()> {
        self.check_index(index1)?;
        self.check_index(index2)?;
        let (lower, upper) = if index1 <= index2 {
            (index1, index2)
        } else {
            (index2, index1)
        };

        let (width, height) = self.canvas_size;
        let mut merged = match &self.layers[lower].image {
            Some(image) => image.to_rgba(),
            None => PixelBuffer::new(width, height, PixelFormat::Rgba, [0, 0, 0, 0])
                .expect("canvas size is never zero"),
        };

        let top = &self.layers[upper];
        if top.visible {
            if let Some(top_image) = top.apply_opacity() {
                composite_over(
                    &mut merged,
                    &top_image,
                    top.x_offset,
                    top.y_offset,
                    BlendMode::Normal,
                );
            }
        }

        self.layers[lower] = Layer::new(Some(merged), "Merged Layer");
        self.layers.remove(upper);

        if let Some(active) = self.active {
            if active == upper {
                self.active = Some(lower);
            } else if active > upper {
                self.active = Some(active - 1);
            }
        }
        debug!("merged layers {lower} and {upper}");
        Ok(())
    }

    /// Composite every layer (visibility, opacity and blend respected) into
    /// one opaque RGB layer that replaces the whole stack. Returns the RGBA
    /// composite, or `None` when the stack is empty.
    pub fn flatten_image(&mut self) -> Option<PixelBuffer> {
        let flattened = self.composite()?;
        self.layers = vec![Layer::new(Some(flattened.to_rgb()), "Flattened Image")];
        self.active = Some(0);
        debug!("flattened stack into a single layer");
        Some(flattened)
    }

    /// Composite all visible layers bottom-to-top into a canvas-sized RGBA
    /// buffer. Does not mutate the stack; `None` means an empty stack
    /// ("nothing to display", not an error).
    pub fn composite(&self) -> Option<PixelBuffer> {
        if self.layers.is_empty() {
            return None;
        }
        let (width, height) = self.canvas_size;
        let mut acc = PixelBuffer::new(width, height, PixelFormat::Rgba, [0, 0, 0, 0])
            .expect("canvas size is never zero");

        for layer in &self.layers {
            if !layer.visible {
                continue;
            }
            let Some(src) = layer.apply_opacity() else {
                continue;
            };
            composite_over(&mut acc, &src, layer.x_offset, layer.y_offset, layer.blend_mode);
        }
        Some(acc)
    }

    /// Alpha-paste a buffer onto the active layer at the given canvas
    /// position. This is the primitive external raster producers (text
    /// rendering, stamps) go through.
    pub fn paste_into_active(
        &mut self,
        buffer: &PixelBuffer,
        x: i32,
        y: i32,
        mode: BlendMode,
    ) -> Result<()> {
        let index = self.resolve_index(None)?;
        let layer = &mut self.layers[index];
        let (width, height) = self.canvas_size;
        let mut target = match &layer.image {
            Some(image) => image.to_rgba(),
            None => PixelBuffer::new(width, height, PixelFormat::Rgba, [0, 0, 0, 0])
                .expect("canvas size is never zero"),
        };
        composite_over(&mut target, buffer, x - layer.x_offset, y - layer.y_offset, mode);
        layer.image = Some(target);
        Ok(())
    }

    /// Remove every layer, keeping the canvas size. Only used right before
    /// repopulating the stack (opening or creating a document).
    pub fn clear_layers(&mut self) {
        self.layers.clear();
        self.active = None;
    }

    /// Replace the stack contents wholesale. Used when installing a history
    /// snapshot.
    pub(crate) fn install(&mut self, layers: Vec<Layer>, active: Option<usize>) {
        self.layers = layers;
        self.active = active;
    }

    pub(crate) fn snapshot_layers(&self) -> Vec<Layer> {
        self.layers.clone()
    }

    pub fn set_active(&mut self, index: usize) -> Result<()> {
        self.check_index(index)?;
        self.active = Some(index);
        Ok(())
    }

    pub fn rename_layer(&mut self, index: usize, name: impl Into<String>) -> Result<()> {
        self.check_index(index)?;
        self.layers[index].name = name.into();
        Ok(())
    }

    pub fn set_visible(&mut self, index: usize, visible: bool) -> Result<()> {
        self.check_index(index)?;
        self.layers[index].visible = visible;
        Ok(())
    }

    pub fn set_layer_opacity(&mut self, index: usize, opacity: u8) -> Result<()> {
        self.check_index(index)?;
        self.layers[index].set_opacity(opacity);
        Ok(())
    }

    pub fn set_blend_mode(&mut self, index: usize, mode: BlendMode) -> Result<()> {
        self.check_index(index)?;
        self.layers[index].blend_mode = mode;
        Ok(())
    }

    pub fn set_layer_offset(&mut self, index: usize, x: i32, y: i32) -> Result<()> {
        self.check_index(index)?;
        self.layers[index].x_offset = x;
        self.layers[index].y_offset = y;
        Ok(())
    }
}
