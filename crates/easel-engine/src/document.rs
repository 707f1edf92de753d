use easel_contracts::request::{BoundingBox, Viewport};
use easel_contracts::Result;

use crate::placement::Placement;

/// Opaque handle to an image element owned by the host document.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ElementRef(pub String);

impl ElementRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectedImage {
    pub element: ElementRef,
    /// Data URI, file path, `file://` URI or http(s) URL.
    pub locator: String,
}

/// The host editor, as seen by the orchestrator.
pub trait Document {
    fn selected_image_source(&self) -> Option<SelectedImage>;

    /// Bounding boxes of selected elements that are not images.
    fn selected_shape_bounding_boxes(&self) -> Vec<BoundingBox>;

    fn viewport_size(&self) -> Viewport;

    fn insert_image(&mut self, bytes: &[u8], placement: Placement) -> Result<ElementRef>;

    fn replace_image(&mut self, element: &ElementRef, bytes: &[u8]) -> Result<()>;
}
