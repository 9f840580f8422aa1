use geo::{Coord, Polygon};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{PlotError, Result};
use crate::geometry;
use crate::sizing::{self, Dimensions};

/// Number of vertices used to trace circles and ellipses
pub const ELLIPSE_NUM_POINTS: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ShapeKind {
    Square,
    Circle,
    Rectangle,
    Ellipse,
}

/// Rule choosing the plot's initial center
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Anchor {
    Centroid,
    #[serde(rename = "bbox")]
    BoundingBox,
    #[serde(rename = "meanxy")]
    MeanXY,
}

/// Per-shape behaviour, looked up by [`ShapeKind::ops`]
pub struct ShapeOps {
    /// (area, perimeter, side_ratio_max) -> dimensions
    pub size: fn(f64, f64, Option<f64>) -> Dimensions,
    /// Unrotated outline centered at the anchor
    pub outline: fn(Coord<f64>, Dimensions) -> Polygon<f64>,
    /// Rotation changes the geometry
    pub rotates: bool,
    /// Resizing changes the geometry; equal-sided shapes are pinned by their area
    pub resizes: bool,
}

static SQUARE_OPS: ShapeOps = ShapeOps {
    size: |area, _, _| sizing::square(area),
    outline: |center, dims| geometry::rectangle(center, dims.a, dims.b),
    rotates: true,
    resizes: false,
};

static CIRCLE_OPS: ShapeOps = ShapeOps {
    size: |area, _, _| sizing::circle(area),
    outline: |center, dims| geometry::ellipse(center, dims.a / 2.0, dims.b / 2.0, ELLIPSE_NUM_POINTS),
    rotates: false,
    resizes: false,
};

static RECTANGLE_OPS: ShapeOps = ShapeOps {
    size: sizing::rectangle,
    outline: |center, dims| geometry::rectangle(center, dims.a, dims.b),
    rotates: true,
    resizes: true,
};

static ELLIPSE_OPS: ShapeOps = ShapeOps {
    size: sizing::ellipse,
    outline: |center, dims| geometry::ellipse(center, dims.a / 2.0, dims.b / 2.0, ELLIPSE_NUM_POINTS),
    rotates: true,
    resizes: true,
};

impl ShapeKind {
    pub const ALL: [ShapeKind; 4] = [
        ShapeKind::Square,
        ShapeKind::Circle,
        ShapeKind::Rectangle,
        ShapeKind::Ellipse,
    ];

    pub fn ops(self) -> &'static ShapeOps {
        match self {
            ShapeKind::Square => &SQUARE_OPS,
            ShapeKind::Circle => &CIRCLE_OPS,
            ShapeKind::Rectangle => &RECTANGLE_OPS,
            ShapeKind::Ellipse => &ELLIPSE_OPS,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            ShapeKind::Square => "square",
            ShapeKind::Circle => "circle",
            ShapeKind::Rectangle => "rectangle",
            ShapeKind::Ellipse => "ellipse",
        }
    }
}

impl Anchor {
    /// Enumeration order of the best-of-family search
    pub const ALL: [Anchor; 3] = [Anchor::BoundingBox, Anchor::Centroid, Anchor::MeanXY];

    pub fn locate(self, polygon: &Polygon<f64>) -> Option<Coord<f64>> {
        match self {
            Anchor::Centroid => geometry::centroid(polygon),
            Anchor::BoundingBox => geometry::bounding_box_center(polygon),
            Anchor::MeanXY => geometry::mean_vertex_xy(polygon),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Anchor::Centroid => "centroid",
            Anchor::BoundingBox => "bbox",
            Anchor::MeanXY => "meanxy",
        }
    }
}

impl fmt::Display for ShapeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One of the twelve shape x anchor combinations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlotVariant {
    pub kind: ShapeKind,
    pub anchor: Anchor,
}

impl PlotVariant {
    pub fn new(kind: ShapeKind, anchor: Anchor) -> Self {
        Self { kind, anchor }
    }

    /// All variants, shape-major, starting with square by bounding box
    pub fn all() -> impl Iterator<Item = PlotVariant> {
        ShapeKind::ALL
            .into_iter()
            .flat_map(|kind| Anchor::ALL.into_iter().map(move |anchor| PlotVariant { kind, anchor }))
    }

    /// Build the initial, untransformed plot for `polygon`
    pub fn create_plot(
        self,
        polygon: &Polygon<f64>,
        side_ratio_max: Option<f64>,
    ) -> Result<SimulationPlot> {
        let source_area = geometry::area(polygon);
        let source_perimeter = geometry::perimeter(polygon);
        let label = format!("{}/{}", self.kind, self.anchor);
        if polygon.exterior().0.is_empty() {
            return Err(PlotError::degenerate(label, "polygon has no vertices"));
        }
        if !(source_area > 0.0) {
            return Err(PlotError::degenerate(label, "polygon has zero area"));
        }
        let anchor = self
            .anchor
            .locate(polygon)
            .ok_or_else(|| PlotError::degenerate(&label, format!("{} is undefined", self.anchor)))?;

        let ops = self.kind.ops();
        let dims = (ops.size)(source_area, source_perimeter, side_ratio_max);
        Ok(SimulationPlot {
            variant: self,
            original_anchor: anchor,
            current_anchor: anchor,
            a: dims.a,
            b: dims.b,
            alpha: 0.0,
            tx: 0.0,
            ty: 0.0,
            geometry: (ops.outline)(anchor, dims),
            source_area,
            source_perimeter,
        })
    }
}

impl fmt::Display for PlotVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} by {}", self.kind, self.anchor)
    }
}

/// A fitted plot and its accumulated transform.
///
/// Transforms never touch `self`; each returns a fresh plot.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationPlot {
    pub variant: PlotVariant,
    pub original_anchor: Coord<f64>,
    /// `original_anchor` shifted by `(tx, ty)`
    pub current_anchor: Coord<f64>,
    pub a: f64,
    pub b: f64,
    /// Accumulated clockwise rotation in degrees, not normalized
    pub alpha: f64,
    pub tx: f64,
    pub ty: f64,
    pub geometry: Polygon<f64>,
    pub source_area: f64,
    pub source_perimeter: f64,
}

impl SimulationPlot {
    pub fn dimensions(&self) -> Dimensions {
        Dimensions { a: self.a, b: self.b }
    }

    /// Regenerate the geometry from anchor, dimensions, rotation and translation
    pub fn create_geometry(&self) -> Polygon<f64> {
        let outline = (self.variant.kind.ops().outline)(self.original_anchor, self.dimensions());
        let moved = geometry::translate(&outline, self.tx, self.ty);
        geometry::rotate(&moved, self.alpha, self.current_anchor)
    }

    pub fn translate(&self, dx: f64, dy: f64) -> SimulationPlot {
        let mut plot = self.clone();
        plot.geometry = geometry::translate(&self.geometry, dx, dy);
        plot.current_anchor = Coord {
            x: self.current_anchor.x + dx,
            y: self.current_anchor.y + dy,
        };
        plot.tx += dx;
        plot.ty += dy;
        plot
    }

    /// Rotate clockwise about the current anchor
    pub fn rotate(&self, degrees: f64) -> SimulationPlot {
        if !self.variant.kind.ops().rotates {
            return self.clone();
        }
        let mut plot = self.clone();
        plot.geometry = geometry::rotate(&self.geometry, degrees, self.current_anchor);
        plot.alpha += degrees;
        plot
    }

    pub fn resize(&self, perc: f64, side_ratio_max: Option<f64>) -> SimulationPlot {
        if !self.variant.kind.ops().resizes {
            return self.clone();
        }
        let dims = sizing::reshape(self.dimensions(), perc, side_ratio_max);
        let mut plot = self.clone();
        plot.a = dims.a;
        plot.b = dims.b;
        plot.geometry = plot.create_geometry();
        plot
    }

    /// Random shift bounded by `max_perc` of the plot's footprint along each axis
    pub fn random_translate<R: Rng + ?Sized>(&self, max_perc: f64, rng: &mut R) -> SimulationPlot {
        let (sin, cos) = self.alpha.to_radians().sin_cos();
        let span_x = self.a * sin + self.b * cos;
        let span_y = self.a * cos + self.b * sin;
        let dx = max_perc * span_x * symmetric_unit(rng);
        let dy = max_perc * span_y * symmetric_unit(rng);
        self.translate(dx, dy)
    }

    pub fn random_rotate<R: Rng + ?Sized>(&self, max_angle: f64, rng: &mut R) -> SimulationPlot {
        self.rotate(max_angle * symmetric_unit(rng))
    }

    pub fn random_resize<R: Rng + ?Sized>(
        &self,
        max_perc: f64,
        side_ratio_max: Option<f64>,
        rng: &mut R,
    ) -> SimulationPlot {
        self.resize(max_perc * symmetric_unit(rng), side_ratio_max)
    }

    /// Area shared with `polygon`
    pub fn overlap(&self, polygon: &Polygon<f64>) -> f64 {
        geometry::intersection_area(polygon, &self.geometry)
    }
}

/// Uniform draw in [-1, 1)
fn symmetric_unit<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    2.0 * rng.random::<f64>() - 1.0
}
