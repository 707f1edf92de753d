use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EaselError;

pub const MIN_PROMPT_CHARS: usize = 3;
pub const MAX_BATCH_COUNT: u32 = 4;
pub const SQUARE_EDGES: [u32; 3] = [256, 512, 1024];
pub const DEFAULT_SQUARE_EDGE: u32 = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Generate,
    Edit,
    Variation,
    Img2Img,
}

impl Capability {
    pub const ALL: [Capability; 4] = [
        Capability::Generate,
        Capability::Edit,
        Capability::Variation,
        Capability::Img2Img,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Generate => "generate",
            Self::Edit => "edit",
            Self::Variation => "variation",
            Self::Img2Img => "img2img",
        }
    }

    pub fn needs_source_image(&self) -> bool {
        !matches!(self, Self::Generate)
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Capability {
    type Err = EaselError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "generate" => Ok(Self::Generate),
            "edit" => Ok(Self::Edit),
            "variation" => Ok(Self::Variation),
            "img2img" => Ok(Self::Img2Img),
            other => Err(EaselError::Validation(format!(
                "unknown operation '{other}'"
            ))),
        }
    }
}

/// Pixel dimensions written as `WxH` on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageSize {
    pub width: u32,
    pub height: u32,
}

impl ImageSize {
    pub const fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn square(edge: u32) -> Self {
        Self::new(edge, edge)
    }

    pub fn is_square(&self) -> bool {
        self.width == self.height
    }
}

impl fmt::Display for ImageSize {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for ImageSize {
    type Err = EaselError;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase();
        let parsed = normalized.split_once('x').and_then(|(w, h)| {
            let width = w.trim().parse::<u32>().ok()?;
            let height = h.trim().parse::<u32>().ok()?;
            (width > 0 && height > 0).then_some(Self::new(width, height))
        });
        parsed.ok_or_else(|| EaselError::Validation(format!("invalid image size '{raw}'")))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskMode {
    Full,
    Center,
    Edges,
    TopHalf,
    BottomHalf,
    LeftHalf,
    RightHalf,
    ShapeDerived,
}

impl MaskMode {
    /// Unknown names regenerate the whole image.
    pub fn from_name(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "center" => Self::Center,
            "edges" => Self::Edges,
            "top_half" => Self::TopHalf,
            "bottom_half" => Self::BottomHalf,
            "left_half" => Self::LeftHalf,
            "right_half" => Self::RightHalf,
            "shape" | "shapes" | "shape_derived" | "selection" => Self::ShapeDerived,
            _ => Self::Full,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MaskSpec {
    pub mode: MaskMode,
    pub feather_radius: u32,
    pub opacity: f64,
}

impl Default for MaskSpec {
    fn default() -> Self {
        Self {
            mode: MaskMode::Full,
            feather_radius: 0,
            opacity: 0.5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PositionMode {
    TopLeft,
    TopCenter,
    TopRight,
    MiddleLeft,
    Center,
    MiddleRight,
    BottomLeft,
    BottomCenter,
    BottomRight,
    Cursor,
}

impl PositionMode {
    pub fn from_name(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "top_left" => Self::TopLeft,
            "top_center" => Self::TopCenter,
            "top_right" => Self::TopRight,
            "middle_left" | "center_left" => Self::MiddleLeft,
            "middle_right" | "center_right" => Self::MiddleRight,
            "bottom_left" => Self::BottomLeft,
            "bottom_center" => Self::BottomCenter,
            "bottom_right" => Self::BottomRight,
            "cursor" => Self::Cursor,
            _ => Self::Center,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleMode {
    Original,
    FitWidth,
    FitHeight,
    FitCanvas,
    Custom,
}

impl ScaleMode {
    pub fn from_name(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "fit_width" => Self::FitWidth,
            "fit_height" => Self::FitHeight,
            "fit_canvas" => Self::FitCanvas,
            "custom" => Self::Custom,
            _ => Self::Original,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PlacementSpec {
    pub position: PositionMode,
    pub scale: ScaleMode,
    pub custom_width: f64,
    pub custom_height: f64,
}

impl Default for PlacementSpec {
    fn default() -> Self {
        Self {
            position: PositionMode::Center,
            scale: ScaleMode::Original,
            custom_width: 800.0,
            custom_height: 600.0,
        }
    }
}

/// Axis-aligned box in document coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub left: f64,
    pub top: f64,
    pub right: f64,
    pub bottom: f64,
}

impl BoundingBox {
    pub fn new(left: f64, top: f64, right: f64, bottom: f64) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn center_x(&self) -> f64 {
        (self.left + self.right) / 2.0
    }

    pub fn center_y(&self) -> f64 {
        (self.top + self.bottom) / 2.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// One normalized generation intent, independent of the provider that will
/// serve it.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub operation: Capability,
    pub prompt: String,
    pub negative_prompt: String,
    pub edit_instruction: String,
    pub model: String,
    pub size: String,
    pub custom_size: Option<ImageSize>,
    pub seed: i64,
    pub batch_count: u32,
    pub guidance_scale: f64,
    pub steps: u32,
    pub strength: f64,
    pub quality: String,
    pub style: String,
    pub mask: MaskSpec,
    pub use_selection_as_mask: bool,
    pub placement: PlacementSpec,
}

impl GenerationRequest {
    pub fn new(operation: Capability, prompt: impl Into<String>) -> Self {
        Self {
            operation,
            prompt: prompt.into(),
            negative_prompt: String::new(),
            edit_instruction: String::new(),
            model: "dall-e-3".to_string(),
            size: "1024x1024".to_string(),
            custom_size: None,
            seed: -1,
            batch_count: 1,
            guidance_scale: 7.0,
            steps: 30,
            strength: 0.75,
            quality: "standard".to_string(),
            style: "vivid".to_string(),
            mask: MaskSpec::default(),
            use_selection_as_mask: false,
            placement: PlacementSpec::default(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_size(mut self, size: impl Into<String>) -> Self {
        self.size = size.into();
        self
    }

    pub fn with_negative_prompt(mut self, negative_prompt: impl Into<String>) -> Self {
        self.negative_prompt = negative_prompt.into();
        self
    }

    pub fn with_edit_instruction(mut self, instruction: impl Into<String>) -> Self {
        self.edit_instruction = instruction.into();
        self
    }

    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_batch_count(mut self, batch_count: u32) -> Self {
        self.batch_count = batch_count;
        self
    }

    pub fn with_strength(mut self, strength: f64) -> Self {
        self.strength = strength;
        self
    }

    pub fn with_mask(mut self, mask: MaskSpec) -> Self {
        self.mask = mask;
        self
    }

    pub fn with_placement(mut self, placement: PlacementSpec) -> Self {
        self.placement = placement;
        self
    }

    /// `None` asks the provider to pick a random seed.
    pub fn seed(&self) -> Option<i64> {
        (self.seed >= 0).then_some(self.seed)
    }

    pub fn batch_count(&self) -> u32 {
        self.batch_count.clamp(1, MAX_BATCH_COUNT)
    }

    pub fn requested_size(&self) -> Result<ImageSize, EaselError> {
        match self.custom_size {
            Some(size) => Ok(size),
            None => self.size.parse(),
        }
    }

    /// Edge of the square canvas that source images are normalized onto.
    pub fn normalization_edge(&self) -> u32 {
        let width = self
            .requested_size()
            .map(|size| size.width)
            .unwrap_or(DEFAULT_SQUARE_EDGE);
        if SQUARE_EDGES.contains(&width) {
            width
        } else {
            DEFAULT_SQUARE_EDGE
        }
    }

    pub fn validate(&self) -> Result<(), EaselError> {
        match self.operation {
            Capability::Generate if !long_enough(&self.prompt) => Err(EaselError::Validation(
                "Please provide a description for image generation.".to_string(),
            )),
            Capability::Img2Img if !long_enough(&self.prompt) => Err(EaselError::Validation(
                "Please provide a prompt for img2img transformation.".to_string(),
            )),
            Capability::Edit if !long_enough(&self.edit_instruction) => Err(
                EaselError::Validation("Please provide edit instructions.".to_string()),
            ),
            _ => Ok(()),
        }
    }
}

fn long_enough(text: &str) -> bool {
    text.trim().chars().count() >= MIN_PROMPT_CHARS
}
