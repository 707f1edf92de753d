//! Edit masks. Transparent pixels (alpha 0) mark the region the provider is
//! allowed to repaint; opaque black pixels are preserved.

use easel_contracts::request::{BoundingBox, MaskMode, MaskSpec, Viewport};
use easel_contracts::{EaselError, Result};
use image::{imageops, GrayImage, Luma, Rgba, RgbaImage};

use crate::codec::encode_png;

const KEEP: Rgba<u8> = Rgba([0, 0, 0, 255]);
const REPAINT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Shapes selected alongside the image, with the viewport they live in.
#[derive(Debug, Clone, Copy)]
pub struct ShapeSelection<'a> {
    pub boxes: &'a [BoundingBox],
    pub viewport: Viewport,
}

/// Builds the PNG mask for an `edge`x`edge` normalized source image.
pub fn generate_mask(
    spec: &MaskSpec,
    edge: u32,
    shapes: Option<ShapeSelection<'_>>,
) -> Result<Vec<u8>> {
    let mask = match spec.mode {
        MaskMode::ShapeDerived => {
            let selection = shapes.ok_or_else(|| {
                EaselError::Validation(
                    "Shape-derived mask requires selected shapes.".to_string(),
                )
            })?;
            shape_mask(selection.boxes, selection.viewport, edge)?
        }
        mode => procedural_mask(mode, edge),
    };
    encode_png(feather_alpha(&mask, spec.feather_radius))
}

pub fn procedural_mask(mode: MaskMode, edge: u32) -> RgbaImage {
    let half = edge / 2;
    let margin = edge / 4;
    let inner = margin..edge.saturating_sub(margin);
    RgbaImage::from_fn(edge, edge, |x, y| {
        let repaint = match mode {
            MaskMode::Full | MaskMode::ShapeDerived => true,
            MaskMode::Center => inner.contains(&x) && inner.contains(&y),
            MaskMode::Edges => !(inner.contains(&x) && inner.contains(&y)),
            MaskMode::TopHalf => y < half,
            MaskMode::BottomHalf => y >= half,
            MaskMode::LeftHalf => x < half,
            MaskMode::RightHalf => x >= half,
        };
        if repaint {
            REPAINT
        } else {
            KEEP
        }
    })
}

/// Opaque mask with one transparent hole per bounding box, scaled from
/// viewport coordinates to mask pixels on each axis.
pub fn shape_mask(boxes: &[BoundingBox], viewport: Viewport, edge: u32) -> Result<RgbaImage> {
    if boxes.is_empty() {
        return Err(EaselError::Validation(
            "Shape-derived mask requires selected shapes.".to_string(),
        ));
    }
    let scale_x = axis_scale(edge, viewport.width);
    let scale_y = axis_scale(edge, viewport.height);

    let mut mask = RgbaImage::from_pixel(edge, edge, KEEP);
    for bbox in boxes {
        let x0 = to_pixel(bbox.left.min(bbox.right) * scale_x, edge, f64::floor);
        let x1 = to_pixel(bbox.left.max(bbox.right) * scale_x, edge, f64::ceil);
        let y0 = to_pixel(bbox.top.min(bbox.bottom) * scale_y, edge, f64::floor);
        let y1 = to_pixel(bbox.top.max(bbox.bottom) * scale_y, edge, f64::ceil);
        for y in y0..y1 {
            for x in x0..x1 {
                mask.put_pixel(x, y, REPAINT);
            }
        }
    }
    Ok(mask)
}

fn axis_scale(edge: u32, extent: f64) -> f64 {
    if extent.is_finite() && extent > 0.0 {
        edge as f64 / extent
    } else {
        1.0
    }
}

fn to_pixel(value: f64, edge: u32, round: fn(f64) -> f64) -> u32 {
    if !value.is_finite() {
        return 0;
    }
    round(value).clamp(0.0, edge as f64) as u32
}

/// Gaussian blur on the alpha channel only; colour channels are untouched.
pub fn feather_alpha(mask: &RgbaImage, radius: u32) -> RgbaImage {
    if radius == 0 {
        return mask.clone();
    }
    let (width, height) = mask.dimensions();
    let alpha = GrayImage::from_fn(width, height, |x, y| Luma([mask.get_pixel(x, y)[3]]));
    let blurred = imageops::blur(&alpha, radius as f32);
    let mut out = mask.clone();
    for (x, y, pixel) in out.enumerate_pixels_mut() {
        pixel[3] = blurred.get_pixel(x, y)[0];
    }
    out
}
