use easel_contracts::request::{BoundingBox, ImageSize, PlacementSpec, PositionMode, ScaleMode, Viewport};

/// Where an inserted image lands, in document units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Placement {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Placement {
    pub fn offset(self, delta: f64) -> Self {
        Self {
            x: self.x + delta,
            y: self.y + delta,
            ..self
        }
    }
}

pub fn size(spec: &PlacementSpec, image: ImageSize, canvas: Viewport) -> (f64, f64) {
    let width = f64::from(image.width.max(1));
    let height = f64::from(image.height.max(1));
    match spec.scale {
        ScaleMode::Original => (width, height),
        ScaleMode::FitWidth => (canvas.width, height * canvas.width / width),
        ScaleMode::FitHeight => (width * canvas.height / height, canvas.height),
        ScaleMode::FitCanvas => {
            let scale = (canvas.width / width).min(canvas.height / height);
            (width * scale, height * scale)
        }
        ScaleMode::Custom => (spec.custom_width, spec.custom_height),
    }
}

/// Top-left corner for an image of `extent` on `canvas`. `Cursor` centres
/// the image on the first selected box, or on the canvas when nothing is
/// selected.
pub fn position(
    mode: PositionMode,
    extent: (f64, f64),
    canvas: Viewport,
    selection: &[BoundingBox],
) -> (f64, f64) {
    let (width, height) = extent;
    let left = 0.0;
    let center_x = (canvas.width - width) / 2.0;
    let right = canvas.width - width;
    let top = 0.0;
    let middle_y = (canvas.height - height) / 2.0;
    let bottom = canvas.height - height;
    match mode {
        PositionMode::TopLeft => (left, top),
        PositionMode::TopCenter => (center_x, top),
        PositionMode::TopRight => (right, top),
        PositionMode::MiddleLeft => (left, middle_y),
        PositionMode::Center => (center_x, middle_y),
        PositionMode::MiddleRight => (right, middle_y),
        PositionMode::BottomLeft => (left, bottom),
        PositionMode::BottomCenter => (center_x, bottom),
        PositionMode::BottomRight => (right, bottom),
        PositionMode::Cursor => match selection.first() {
            Some(bbox) => (bbox.center_x() - width / 2.0, bbox.center_y() - height / 2.0),
            None => (center_x, middle_y),
        },
    }
}

pub fn place(
    spec: &PlacementSpec,
    image: ImageSize,
    canvas: Viewport,
    selection: &[BoundingBox],
) -> Placement {
    let (width, height) = size(spec, image, canvas);
    let (x, y) = position(spec.position, (width, height), canvas, selection);
    Placement {
        x,
        y,
        width,
        height,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(position: PositionMode, scale: ScaleMode) -> PlacementSpec {
        PlacementSpec {
            position,
            scale,
            ..PlacementSpec::default()
        }
    }

    #[test]
    fn fit_canvas_keeps_aspect_inside_canvas() {
        let canvas = Viewport::new(800.0, 600.0);
        let placed = place(
            &spec(PositionMode::Center, ScaleMode::FitCanvas),
            ImageSize::square(1024),
            canvas,
            &[],
        );
        assert_eq!((placed.width, placed.height), (600.0, 600.0));
        assert_eq!((placed.x, placed.y), (100.0, 0.0));
    }

    #[test]
    fn scale_modes() {
        let canvas = Viewport::new(800.0, 600.0);
        let image = ImageSize::new(1600, 800);
        assert_eq!(size(&spec(PositionMode::Center, ScaleMode::Original), image, canvas), (1600.0, 800.0));
        assert_eq!(size(&spec(PositionMode::Center, ScaleMode::FitWidth), image, canvas), (800.0, 400.0));
        assert_eq!(size(&spec(PositionMode::Center, ScaleMode::FitHeight), image, canvas), (1200.0, 600.0));
        let custom = PlacementSpec {
            scale: ScaleMode::Custom,
            custom_width: 320.0,
            custom_height: 200.0,
            ..PlacementSpec::default()
        };
        assert_eq!(size(&custom, image, canvas), (320.0, 200.0));
    }

    #[test]
    fn anchors_cover_corners_edges_and_center() {
        let canvas = Viewport::new(1000.0, 500.0);
        let extent = (200.0, 100.0);
        let cases = [
            (PositionMode::TopLeft, (0.0, 0.0)),
            (PositionMode::TopCenter, (400.0, 0.0)),
            (PositionMode::TopRight, (800.0, 0.0)),
            (PositionMode::MiddleLeft, (0.0, 200.0)),
            (PositionMode::Center, (400.0, 200.0)),
            (PositionMode::MiddleRight, (800.0, 200.0)),
            (PositionMode::BottomLeft, (0.0, 400.0)),
            (PositionMode::BottomCenter, (400.0, 400.0)),
            (PositionMode::BottomRight, (800.0, 400.0)),
        ];
        for (mode, expected) in cases {
            assert_eq!(position(mode, extent, canvas, &[]), expected, "{mode:?}");
        }
    }

    #[test]
    fn cursor_centres_on_first_selection_or_canvas() {
        let canvas = Viewport::new(1000.0, 500.0);
        let selection = [
            BoundingBox::new(100.0, 100.0, 300.0, 200.0),
            BoundingBox::new(900.0, 400.0, 950.0, 450.0),
        ];
        assert_eq!(
            position(PositionMode::Cursor, (100.0, 50.0), canvas, &selection),
            (150.0, 125.0)
        );
        assert_eq!(
            position(PositionMode::Cursor, (100.0, 50.0), canvas, &[]),
            (450.0, 225.0)
        );
    }

    #[test]
    fn batch_offset_shifts_both_axes() {
        let placed = Placement {
            x: 10.0,
            y: 20.0,
            width: 5.0,
            height: 5.0,
        }
        .offset(100.0);
        assert_eq!((placed.x, placed.y, placed.width), (110.0, 120.0, 5.0));
    }
}
