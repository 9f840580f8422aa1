use dxf::entities::*;
use dxf::enums::AcadVersion;
use dxf::{Drawing, LwPolylineVertex};
use geo::{Coord, Polygon};
use std::path::{Path, PathBuf};

use crate::error::{PlotError, Result};
use crate::features::{Feature, FeatureGeometry, FeatureSink};

pub const PLOTS_LAYER: &str = "PLOTS";
pub const POINTS_LAYER: &str = "POINTS";

/// Collects plots and grid points into a drawing, saved on [`FeatureSink::finish`]
///
/// Polygons go to layer `PLOTS` as closed LWPOLYLINEs, points to `POINTS`.
pub struct DxfWriter {
    path: PathBuf,
    drawing: Drawing,
    polygons: usize,
    points: usize,
}

impl DxfWriter {
    pub fn new(path: &Path) -> Self {
        let mut drawing = Drawing::new();
        // LWPOLYLINE needs R14 or later
        drawing.header.version = AcadVersion::R2000;
        Self {
            path: path.to_path_buf(),
            drawing,
            polygons: 0,
            points: 0,
        }
    }

    /// Add a reference outline (source polygon) on its own layer
    pub fn add_outline(&mut self, polygon: &Polygon<f64>, layer: &str) {
        add_polygon_to_drawing(&mut self.drawing, polygon, layer);
    }
}

impl FeatureSink for DxfWriter {
    fn write_feature(&mut self, feature: &Feature) -> Result<()> {
        match &feature.geometry {
            FeatureGeometry::Polygon(polygon) => {
                add_polygon_to_drawing(&mut self.drawing, polygon, PLOTS_LAYER);
                self.polygons += 1;
            }
            FeatureGeometry::Point(coord) => {
                add_point_to_drawing(&mut self.drawing, *coord, POINTS_LAYER);
                self.points += 1;
            }
        }
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        self.drawing
            .save_file(&self.path)
            .map_err(|e| PlotError::OutputWrite {
                path: self.path.clone(),
                source: std::io::Error::other(e.to_string()),
            })?;
        log::info!(
            "wrote {} plots and {} points to {}",
            self.polygons,
            self.points,
            self.path.display()
        );
        Ok(())
    }
}

/// Add polygon exterior to drawing as closed LWPOLYLINE
fn add_polygon_to_drawing(drawing: &mut Drawing, polygon: &Polygon<f64>, layer: &str) {
    let vertices: Vec<LwPolylineVertex> = polygon
        .exterior()
        .coords()
        .map(|coord| LwPolylineVertex {
            x: coord.x,
            y: coord.y,
            id: 0,
            starting_width: 0.0,
            ending_width: 0.0,
            bulge: 0.0,
        })
        .collect();

    if vertices.is_empty() {
        return;
    }

    let mut polyline = LwPolyline::default();
    polyline.vertices = vertices;
    polyline.flags = 1; // Closed polyline

    let mut entity = Entity::new(EntityType::LwPolyline(polyline));
    entity.common.layer = layer.to_string();
    drawing.add_entity(entity);
}

fn add_point_to_drawing(drawing: &mut Drawing, coord: Coord<f64>, layer: &str) {
    let mut point = ModelPoint::default();
    point.location = dxf::Point::new(coord.x, coord.y, 0.0);
    let mut entity = Entity::new(EntityType::ModelPoint(point));
    entity.common.layer = layer.to_string();
    drawing.add_entity(entity);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::Layer;
    use geo::LineString;

    #[test]
    fn test_plots_read_back_from_dxf() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plots.dxf");

        let plot = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (10.0, 0.0), (10.0, 10.0), (0.0, 10.0), (0.0, 0.0)]),
            vec![],
        );

        let mut writer = DxfWriter::new(&path);
        writer
            .write_feature(&Feature::new(FeatureGeometry::Polygon(plot)))
            .unwrap();
        writer
            .write_feature(&Feature::new(FeatureGeometry::Point(Coord { x: 5.0, y: 5.0 })))
            .unwrap();
        writer.finish().unwrap();

        let layer = Layer::read(&path).unwrap();
        assert_eq!(layer.features.len(), 1);
        let feature = &layer.features[0];
        assert_eq!(feature.property("layer").and_then(|v| v.as_str()), Some(PLOTS_LAYER));
        assert_eq!(feature.property_f64("ID"), Some(1.0));
        assert_eq!(crate::geometry::area(feature.polygon().unwrap()), 100.0);
    }
}
