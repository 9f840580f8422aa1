use geo::{Coord, Polygon};
use std::path::Path;
use svg::node::element::path::Data;
use svg::node::element::{Circle, Group, Path as SvgPath};
use svg::Document;

use crate::error::{PlotError, Result};

const STROKE_WIDTH: f64 = 1.0;
const MARGIN: f64 = 20.0;
/// Width of the drawing area in pixels; height follows the aspect ratio
const TARGET_WIDTH: f64 = 1000.0;
const POINT_RADIUS: f64 = 1.5;

/// What a preview shows: source polygons, fitted plots and grid points
#[derive(Debug, Default)]
pub struct Preview<'a> {
    pub sources: Vec<&'a Polygon<f64>>,
    pub plots: Vec<&'a Polygon<f64>>,
    pub points: Vec<Coord<f64>>,
}

struct Frame {
    min_x: f64,
    max_y: f64,
    scale: f64,
}

impl Frame {
    /// Map coordinates to pixels; y grows downward in SVG
    fn project(&self, c: &Coord<f64>) -> (f64, f64) {
        (
            (c.x - self.min_x) * self.scale + MARGIN,
            (self.max_y - c.y) * self.scale + MARGIN,
        )
    }
}

impl Preview<'_> {
    fn all_coords(&self) -> impl Iterator<Item = Coord<f64>> + '_ {
        self.sources
            .iter()
            .chain(self.plots.iter())
            .flat_map(|p| p.exterior().coords().copied())
            .chain(self.points.iter().copied())
    }

    /// Export the preview as an SVG file
    pub fn save(&self, output_path: &Path) -> Result<()> {
        let mut min_x = f64::INFINITY;
        let mut max_x = f64::NEG_INFINITY;
        let mut min_y = f64::INFINITY;
        let mut max_y = f64::NEG_INFINITY;
        for c in self.all_coords() {
            min_x = min_x.min(c.x);
            max_x = max_x.max(c.x);
            min_y = min_y.min(c.y);
            max_y = max_y.max(c.y);
        }
        if !min_x.is_finite() {
            log::warn!("nothing to draw in {}", output_path.display());
            min_x = 0.0;
            max_x = 1.0;
            min_y = 0.0;
            max_y = 1.0;
        }

        let extent = (max_x - min_x).max(max_y - min_y).max(f64::EPSILON);
        let frame = Frame {
            min_x,
            max_y,
            scale: TARGET_WIDTH / extent,
        };
        let width = (max_x - min_x) * frame.scale + 2.0 * MARGIN;
        let height = (max_y - min_y) * frame.scale + 2.0 * MARGIN;

        let mut document = Document::new()
            .set("viewBox", (0, 0, width as i32, height as i32))
            .set("width", format!("{}px", width as i32))
            .set("height", format!("{}px", height as i32));

        let mut sources = Group::new()
            .set("fill", "#e8f0e0")
            .set("stroke", "darkgreen")
            .set("stroke-width", STROKE_WIDTH);
        for polygon in &self.sources {
            sources = sources.add(polygon_path(polygon, &frame));
        }
        document = document.add(sources);

        let mut plots = Group::new()
            .set("fill", "none")
            .set("stroke", "red")
            .set("stroke-width", STROKE_WIDTH * 1.5);
        for polygon in &self.plots {
            plots = plots.add(polygon_path(polygon, &frame));
        }
        document = document.add(plots);

        let mut points = Group::new().set("fill", "blue");
        for c in &self.points {
            let (cx, cy) = frame.project(c);
            points = points.add(Circle::new().set("cx", cx).set("cy", cy).set("r", POINT_RADIUS));
        }
        document = document.add(points);

        svg::save(output_path, &document).map_err(|source| PlotError::OutputWrite {
            path: output_path.to_path_buf(),
            source,
        })?;
        log::info!("preview written to {}", output_path.display());
        Ok(())
    }
}

fn polygon_path(polygon: &Polygon<f64>, frame: &Frame) -> SvgPath {
    let mut data = Data::new();
    for (i, coord) in polygon.exterior().coords().enumerate() {
        let xy = frame.project(coord);
        data = if i == 0 { data.move_to(xy) } else { data.line_to(xy) };
    }
    SvgPath::new().set("d", data.close())
}

#[cfg(test)]
mod tests {
    use super::*;
    use geo::LineString;

    #[test]
    fn test_preview_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("preview.svg");
        let stand = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (40.0, 0.0), (40.0, 20.0), (0.0, 20.0), (0.0, 0.0)]),
            vec![],
        );
        let plot = crate::geometry::rectangle(Coord { x: 20.0, y: 10.0 }, 30.0, 15.0);

        let preview = Preview {
            sources: vec![&stand],
            plots: vec![&plot],
            points: vec![Coord { x: 20.0, y: 10.0 }],
        };
        preview.save(&path).unwrap();

        let svg = std::fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert_eq!(svg.matches("<path").count(), 2);
        assert_eq!(svg.matches("<circle").count(), 1);
    }

    #[test]
    fn test_empty_preview_still_saves() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty.svg");
        Preview::default().save(&path).unwrap();
        assert!(path.exists());
    }
}
