use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use easel_contracts::request::{BoundingBox, Viewport};
use easel_contracts::EaselError;
use easel_engine::{Document, ElementRef, Placement, SelectedImage};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

pub const MANIFEST_FILE: &str = "canvas.json";
const SOURCE_ELEMENT: &str = "source";

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PlacementRecord {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl From<Placement> for PlacementRecord {
    fn from(placement: Placement) -> Self {
        Self {
            x: placement.x,
            y: placement.y,
            width: placement.width,
            height: placement.height,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    pub file: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub placement: Option<PlacementRecord>,
    #[serde(default)]
    pub replaced: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CanvasManifest {
    pub viewport: Viewport,
    pub elements: IndexMap<String, ElementRecord>,
}

/// Headless stand-in for an editor: every element is a PNG inside one
/// directory and `canvas.json` records where each one sits.
#[derive(Debug)]
pub struct DirectoryCanvas {
    root: PathBuf,
    viewport: Viewport,
    source: Option<String>,
    shapes: Vec<BoundingBox>,
    elements: IndexMap<String, ElementRecord>,
}

impl DirectoryCanvas {
    pub fn open(root: impl Into<PathBuf>, viewport: Viewport) -> Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)
            .with_context(|| format!("failed to create canvas directory {}", root.display()))?;
        let manifest_path = root.join(MANIFEST_FILE);
        let elements = if manifest_path.exists() {
            let raw = fs::read_to_string(&manifest_path)?;
            let manifest: CanvasManifest = serde_json::from_str(&raw)
                .with_context(|| format!("invalid canvas manifest {}", manifest_path.display()))?;
            manifest.elements
        } else {
            IndexMap::new()
        };
        Ok(Self {
            root,
            viewport,
            source: None,
            shapes: Vec::new(),
            elements,
        })
    }

    /// Marks an image as the current selection. Edits write their result
    /// next to the other elements, never over the original file.
    pub fn select_image(&mut self, locator: impl Into<String>) {
        self.source = Some(locator.into());
    }

    pub fn select_shapes(&mut self, shapes: impl IntoIterator<Item = BoundingBox>) {
        self.shapes.extend(shapes);
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn elements(&self) -> &IndexMap<String, ElementRecord> {
        &self.elements
    }

    pub fn element_path(&self, id: &str) -> Option<PathBuf> {
        self.elements.get(id).map(|record| self.root.join(&record.file))
    }

    fn next_element_id(&self) -> String {
        let mut index = self.elements.len() + 1;
        loop {
            let id = format!("image_{index:03}");
            if !self.elements.contains_key(&id) {
                return id;
            }
            index += 1;
        }
    }

    fn write_manifest(&self) -> std::io::Result<()> {
        let manifest = CanvasManifest {
            viewport: self.viewport,
            elements: self.elements.clone(),
        };
        let json = serde_json::to_string_pretty(&manifest).map_err(std::io::Error::other)?;
        fs::write(self.root.join(MANIFEST_FILE), json)
    }
}

impl Document for DirectoryCanvas {
    fn selected_image_source(&self) -> Option<SelectedImage> {
        self.source.as_ref().map(|locator| SelectedImage {
            element: ElementRef::new(SOURCE_ELEMENT),
            locator: locator.clone(),
        })
    }

    fn selected_shape_bounding_boxes(&self) -> Vec<BoundingBox> {
        self.shapes.clone()
    }

    fn viewport_size(&self) -> Viewport {
        self.viewport
    }

    fn insert_image(
        &mut self,
        bytes: &[u8],
        placement: Placement,
    ) -> easel_contracts::Result<ElementRef> {
        let id = self.next_element_id();
        let file = format!("{id}.png");
        fs::write(self.root.join(&file), bytes)?;
        self.elements.insert(
            id.clone(),
            ElementRecord {
                file,
                placement: Some(placement.into()),
                replaced: false,
            },
        );
        self.write_manifest()?;
        tracing::debug!(element = %id, "inserted image");
        Ok(ElementRef::new(id))
    }

    fn replace_image(
        &mut self,
        element: &ElementRef,
        bytes: &[u8],
    ) -> easel_contracts::Result<()> {
        let id = element.as_str();
        let known = self.elements.contains_key(id) || id == SOURCE_ELEMENT;
        if !known {
            return Err(EaselError::Validation(format!("unknown canvas element '{id}'")));
        }
        let file = self
            .elements
            .get(id)
            .map(|record| record.file.clone())
            .unwrap_or_else(|| format!("{id}.png"));
        fs::write(self.root.join(&file), bytes)?;
        let record = self.elements.entry(id.to_string()).or_insert(ElementRecord {
            file,
            placement: None,
            replaced: false,
        });
        record.replaced = true;
        self.write_manifest()?;
        Ok(())
    }
}

/// Parses `left,top,right,bottom`.
pub fn parse_bounding_box(raw: &str) -> Result<BoundingBox, String> {
    let values = raw
        .split(',')
        .map(|part| part.trim().parse::<f64>())
        .collect::<Result<Vec<_>, _>>()
        .map_err(|err| format!("invalid bounding box '{raw}': {err}"))?;
    match values.as_slice() {
        [left, top, right, bottom] if right > left && bottom > top => {
            Ok(BoundingBox::new(*left, *top, *right, *bottom))
        }
        [_, _, _, _] => Err(format!("bounding box '{raw}' has no area")),
        _ => Err(format!(
            "bounding box '{raw}' must be left,top,right,bottom"
        )),
    }
}

/// Parses `WIDTHxHEIGHT` into a viewport.
pub fn parse_viewport(raw: &str) -> Result<Viewport, String> {
    let (width, height) = raw
        .trim()
        .to_ascii_lowercase()
        .split_once('x')
        .map(|(w, h)| (w.trim().parse::<f64>(), h.trim().parse::<f64>()))
        .ok_or_else(|| format!("viewport '{raw}' must look like 800x600"))?;
    match (width, height) {
        (Ok(width), Ok(height)) if width > 0.0 && height > 0.0 => Ok(Viewport::new(width, height)),
        _ => Err(format!("invalid viewport '{raw}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placement() -> Placement {
        Placement {
            x: 100.0,
            y: 0.0,
            width: 600.0,
            height: 600.0,
        }
    }

    #[test]
    fn insert_writes_file_and_manifest() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut canvas = DirectoryCanvas::open(temp.path(), Viewport::new(800.0, 600.0))?;
        let first = canvas.insert_image(b"one", placement())?;
        let second = canvas.insert_image(b"two", placement().offset(50.0))?;
        assert_eq!(first.as_str(), "image_001");
        assert_eq!(second.as_str(), "image_002");
        assert_eq!(fs::read(temp.path().join("image_002.png"))?, b"two");

        let raw = fs::read_to_string(temp.path().join(MANIFEST_FILE))?;
        let manifest: CanvasManifest = serde_json::from_str(&raw)?;
        let keys: Vec<_> = manifest.elements.keys().cloned().collect();
        assert_eq!(keys, vec!["image_001", "image_002"]);
        assert_eq!(
            manifest.elements["image_002"].placement.map(|p| (p.x, p.y)),
            Some((150.0, 50.0))
        );
        Ok(())
    }

    #[test]
    fn reopening_continues_numbering() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let viewport = Viewport::new(800.0, 600.0);
        {
            let mut canvas = DirectoryCanvas::open(temp.path(), viewport)?;
            canvas.insert_image(b"one", placement())?;
        }
        let mut canvas = DirectoryCanvas::open(temp.path(), viewport)?;
        let next = canvas.insert_image(b"two", placement())?;
        assert_eq!(next.as_str(), "image_002");
        assert_eq!(canvas.elements().len(), 2);
        Ok(())
    }

    #[test]
    fn replacing_the_selection_keeps_the_original_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let original = temp.path().join("photo.png");
        fs::write(&original, b"original")?;
        let mut canvas = DirectoryCanvas::open(temp.path().join("out"), Viewport::new(800.0, 600.0))?;
        canvas.select_image(original.display().to_string());

        let selected = canvas.selected_image_source().unwrap();
        canvas.replace_image(&selected.element, b"edited")?;

        assert_eq!(fs::read(&original)?, b"original");
        let edited = canvas.element_path("source").unwrap();
        assert_eq!(fs::read(edited)?, b"edited");
        assert!(canvas.elements()["source"].replaced);
        Ok(())
    }

    #[test]
    fn replacing_an_unknown_element_fails() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let mut canvas = DirectoryCanvas::open(temp.path(), Viewport::new(800.0, 600.0))?;
        let err = canvas
            .replace_image(&ElementRef::new("ghost"), b"x")
            .unwrap_err();
        assert!(matches!(err, EaselError::Validation(_)));
        Ok(())
    }

    #[test]
    fn parses_boxes_and_viewports() {
        let parsed = parse_bounding_box("10, 20, 110, 220").unwrap();
        assert_eq!(parsed, BoundingBox::new(10.0, 20.0, 110.0, 220.0));
        assert!(parse_bounding_box("10,20,5,220").is_err());
        assert!(parse_bounding_box("10,20").is_err());

        assert_eq!(parse_viewport("1280X720").unwrap(), Viewport::new(1280.0, 720.0));
        assert!(parse_viewport("wide").is_err());
        assert!(parse_viewport("0x10").is_err());
    }
}
