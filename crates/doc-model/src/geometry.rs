use crate::InvalidRegionReason;
use serde::{Deserialize, Serialize};

/// A point in page-image pixels, origin at the top-left corner.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned box in page-image pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

impl Rect {
    pub fn new(x: f32, y: f32, width: f32, height: f32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> f32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f32 {
        self.y + self.height
    }

    pub fn area(&self) -> f32 {
        (self.width * self.height).max(0.0)
    }

    pub fn intersection_area(&self, other: &Rect) -> f32 {
        let width = self.right().min(other.right()) - self.x.max(other.x);
        let height = self.bottom().min(other.bottom()) - self.y.max(other.y);
        if width <= 0.0 || height <= 0.0 {
            return 0.0;
        }
        width * height
    }

    /// Intersection over union of two boxes, in `0.0..=1.0`.
    pub fn iou(&self, other: &Rect) -> f32 {
        let intersection = self.intersection_area(other);
        if intersection <= 0.0 {
            return 0.0;
        }
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            return 0.0;
        }
        intersection / union
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Geometry {
    Rect(Rect),
    Polygon(Vec<Point>),
}

impl Geometry {
    pub fn rect(x: f32, y: f32, width: f32, height: f32) -> Self {
        Geometry::Rect(Rect::new(x, y, width, height))
    }

    pub fn bounding_box(&self) -> Rect {
        match self {
            Geometry::Rect(rect) => *rect,
            Geometry::Polygon(points) => {
                let Some(first) = points.first() else {
                    return Rect::new(0.0, 0.0, 0.0, 0.0);
                };
                let (mut min_x, mut min_y, mut max_x, mut max_y) =
                    (first.x, first.y, first.x, first.y);
                for point in &points[1..] {
                    min_x = min_x.min(point.x);
                    min_y = min_y.min(point.y);
                    max_x = max_x.max(point.x);
                    max_y = max_y.max(point.y);
                }
                Rect::new(min_x, min_y, max_x - min_x, max_y - min_y)
            }
        }
    }

    /// The same shape moved by `dx`, `dy`.
    pub fn translated(&self, dx: f32, dy: f32) -> Geometry {
        match self {
            Geometry::Rect(rect) => {
                Geometry::Rect(Rect::new(rect.x + dx, rect.y + dy, rect.width, rect.height))
            }
            Geometry::Polygon(points) => Geometry::Polygon(
                points.iter().map(|point| Point::new(point.x + dx, point.y + dy)).collect(),
            ),
        }
    }

    pub fn area(&self) -> f32 {
        match self {
            Geometry::Rect(rect) => rect.area(),
            Geometry::Polygon(points) => {
                if points.len() < 3 {
                    return 0.0;
                }
                // Shoelace formula.
                let mut twice_area = 0.0;
                for (index, current) in points.iter().enumerate() {
                    let next = &points[(index + 1) % points.len()];
                    twice_area += current.x * next.y - next.x * current.y;
                }
                (twice_area / 2.0).abs()
            }
        }
    }

    pub fn validate(&self) -> Result<(), InvalidRegionReason> {
        let finite = match self {
            Geometry::Rect(rect) => [rect.x, rect.y, rect.width, rect.height]
                .iter()
                .all(|value| value.is_finite()),
            Geometry::Polygon(points) => {
                points.iter().all(|point| point.x.is_finite() && point.y.is_finite())
            }
        };
        if !finite {
            return Err(InvalidRegionReason::NonFiniteCoordinate);
        }

        let non_degenerate = match self {
            Geometry::Rect(rect) => rect.width > 0.0 && rect.height > 0.0,
            Geometry::Polygon(_) => self.area() > 0.0,
        };
        if !non_degenerate {
            return Err(InvalidRegionReason::DegenerateGeometry);
        }
        Ok(())
    }
}
