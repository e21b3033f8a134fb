//! Layer compositing and undo history engine for a raster image editor.
//!
//! The crate owns the document model (pixel buffers, layers, the layer
//! stack with its compositor, and the snapshot-based undo history) and
//! exposes it through [`Document`]. Windowing, input and file dialogs live
//! in the consuming application.

pub mod blend;
pub mod buffer;
pub mod document;
pub mod error;
pub mod history;
pub mod layer;
pub mod stack;
pub mod utils;

pub use blend::BlendMode;
pub use buffer::{PixelBuffer, PixelFormat, Rect, ResizeFilter};
pub use document::{Document, ExportFormat, decode_image, encode_image};
pub use error::{EditorError, Result};
pub use history::{DEFAULT_HISTORY_CAP, HistoryManager};
pub use layer::Layer;
pub use stack::LayerStack;
