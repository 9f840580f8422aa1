//! Vector layers in and out.
//!
//! Layers are read from GeoJSON, or from DXF where each closed polyline is one
//! polygon feature. Output goes through [`FeatureSink`], implemented by the
//! streaming [`GeoJsonWriter`], by [`crate::dxf_output::DxfWriter`] and by
//! `Vec<Feature>` for in-memory runs.

use dxf::entities::EntityType;
use dxf::Drawing;
use geo::{Coord, LineString, Polygon};
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::error::{PlotError, Result};

pub type Properties = Map<String, Value>;

#[derive(Debug, Clone, PartialEq)]
pub enum FeatureGeometry {
    Polygon(Polygon<f64>),
    Point(Coord<f64>),
}

impl FeatureGeometry {
    pub fn type_name(&self) -> &'static str {
        match self {
            FeatureGeometry::Polygon(_) => "polygon",
            FeatureGeometry::Point(_) => "point",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Feature {
    pub properties: Properties,
    pub geometry: FeatureGeometry,
}

impl Feature {
    pub fn new(geometry: FeatureGeometry) -> Self {
        Self {
            properties: Properties::new(),
            geometry,
        }
    }

    pub fn with_property(mut self, name: &str, value: impl Into<Value>) -> Self {
        self.properties.insert(name.to_string(), value.into());
        self
    }

    pub fn polygon(&self) -> Option<&Polygon<f64>> {
        match &self.geometry {
            FeatureGeometry::Polygon(polygon) => Some(polygon),
            FeatureGeometry::Point(_) => None,
        }
    }

    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    pub fn property_f64(&self, name: &str) -> Option<f64> {
        match self.properties.get(name)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        }
    }
}

/// A layer loaded from disk
#[derive(Debug, Clone)]
pub struct Layer {
    pub path: PathBuf,
    /// GeoJSON `crs` member, carried to outputs untouched
    pub crs: Option<Value>,
    pub features: Vec<Feature>,
}

impl Layer {
    /// Read a layer, choosing the format by file extension
    pub fn read(path: &Path) -> Result<Layer> {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "dxf" => read_dxf(path),
            _ => read_geojson(path),
        }
    }

    /// Fail unless every feature is a polygon
    pub fn require_polygons(&self) -> Result<()> {
        self.require_geometry("polygon")
    }

    pub fn require_points(&self) -> Result<()> {
        self.require_geometry("point")
    }

    fn require_geometry(&self, expected: &'static str) -> Result<()> {
        match self
            .features
            .iter()
            .find(|f| f.geometry.type_name() != expected)
        {
            Some(feature) => Err(PlotError::InputGeometryType {
                path: self.path.clone(),
                expected,
                found: feature.geometry.type_name().to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Fail unless every feature carries `field`
    pub fn require_field(&self, field: &str) -> Result<()> {
        if self.features.iter().all(|f| f.properties.contains_key(field)) {
            Ok(())
        } else {
            Err(PlotError::MissingField {
                path: self.path.clone(),
                field: field.to_string(),
            })
        }
    }

    pub fn polygons(&self) -> impl Iterator<Item = &Polygon<f64>> {
        self.features.iter().filter_map(Feature::polygon)
    }
}

/// Destination for output features
pub trait FeatureSink {
    fn write_feature(&mut self, feature: &Feature) -> Result<()>;

    /// Flush and close. Features written before this call must survive
    /// even when the batch ends early.
    fn finish(&mut self) -> Result<()> {
        Ok(())
    }
}

impl FeatureSink for Vec<Feature> {
    fn write_feature(&mut self, feature: &Feature) -> Result<()> {
        self.push(feature.clone());
        Ok(())
    }
}

/// Fans every feature out to several sinks
pub struct Tee<'a> {
    sinks: Vec<&'a mut dyn FeatureSink>,
}

impl<'a> Tee<'a> {
    pub fn new(sinks: Vec<&'a mut dyn FeatureSink>) -> Self {
        Self { sinks }
    }
}

impl FeatureSink for Tee<'_> {
    fn write_feature(&mut self, feature: &Feature) -> Result<()> {
        for sink in self.sinks.iter_mut() {
            sink.write_feature(feature)?;
        }
        Ok(())
    }

    /// Finishes every sink, returning the first error
    fn finish(&mut self) -> Result<()> {
        let mut outcome = Ok(());
        for sink in self.sinks.iter_mut() {
            let finished = sink.finish();
            if outcome.is_ok() {
                outcome = finished;
            }
        }
        outcome
    }
}

// --- GeoJSON ---

#[derive(Deserialize)]
struct RawCollection {
    #[serde(default)]
    crs: Option<Value>,
    #[serde(default)]
    features: Vec<RawFeature>,
}

#[derive(Deserialize)]
struct RawFeature {
    #[serde(default)]
    properties: Option<Properties>,
    geometry: Option<RawGeometry>,
}

#[derive(Deserialize)]
struct RawGeometry {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    coordinates: Value,
}

type Ring = Vec<Vec<f64>>;

pub fn read_geojson(path: &Path) -> Result<Layer> {
    let file = File::open(path).map_err(|source| PlotError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let raw: RawCollection =
        serde_json::from_reader(BufReader::new(file)).map_err(|e| invalid_layer(path, e))?;

    let mut features = Vec::with_capacity(raw.features.len());
    for feature in raw.features {
        let geometry = match feature.geometry {
            Some(geometry) => convert_geometry(path, geometry)?,
            None => {
                return Err(PlotError::InputGeometryType {
                    path: path.to_path_buf(),
                    expected: "polygon or point",
                    found: "null".to_string(),
                })
            }
        };
        features.push(Feature {
            properties: feature.properties.unwrap_or_default(),
            geometry,
        });
    }

    log::debug!("read {} features from {}", features.len(), path.display());
    Ok(Layer {
        path: path.to_path_buf(),
        crs: raw.crs,
        features,
    })
}

fn convert_geometry(path: &Path, raw: RawGeometry) -> Result<FeatureGeometry> {
    match raw.kind.as_str() {
        "Polygon" => {
            let rings: Vec<Ring> =
                serde_json::from_value(raw.coordinates).map_err(|e| invalid_layer(path, e))?;
            Ok(FeatureGeometry::Polygon(polygon_from_rings(rings)))
        }
        "MultiPolygon" => {
            let parts: Vec<Vec<Ring>> =
                serde_json::from_value(raw.coordinates).map_err(|e| invalid_layer(path, e))?;
            if parts.len() > 1 {
                log::warn!(
                    "{}: multipart polygon, only the first of {} parts is used",
                    path.display(),
                    parts.len()
                );
            }
            let rings = parts.into_iter().next().unwrap_or_default();
            Ok(FeatureGeometry::Polygon(polygon_from_rings(rings)))
        }
        "Point" => {
            let position: Vec<f64> =
                serde_json::from_value(raw.coordinates).map_err(|e| invalid_layer(path, e))?;
            match position.as_slice() {
                [x, y, ..] => Ok(FeatureGeometry::Point(Coord { x: *x, y: *y })),
                _ => Err(PlotError::degenerate(
                    path.display(),
                    "point with fewer than two coordinates",
                )),
            }
        }
        other => Err(PlotError::InputGeometryType {
            path: path.to_path_buf(),
            expected: "polygon or point",
            found: other.to_string(),
        }),
    }
}

fn polygon_from_rings(rings: Vec<Ring>) -> Polygon<f64> {
    let mut rings = rings.into_iter().map(|ring| {
        LineString::new(
            ring.into_iter()
                .filter(|p| p.len() >= 2)
                .map(|p| Coord { x: p[0], y: p[1] })
                .collect(),
        )
    });
    let exterior = rings.next().unwrap_or_else(|| LineString::new(vec![]));
    Polygon::new(exterior, rings.collect())
}

fn invalid_layer(path: &Path, e: serde_json::Error) -> PlotError {
    PlotError::Read {
        path: path.to_path_buf(),
        source: std::io::Error::new(std::io::ErrorKind::InvalidData, e),
    }
}

fn geometry_json(geometry: &FeatureGeometry) -> Value {
    match geometry {
        FeatureGeometry::Point(c) => json!({
            "type": "Point",
            "coordinates": [c.x, c.y],
        }),
        FeatureGeometry::Polygon(polygon) => {
            let ring = |ls: &LineString<f64>| -> Vec<[f64; 2]> {
                ls.coords().map(|c| [c.x, c.y]).collect()
            };
            let rings: Vec<Vec<[f64; 2]>> = std::iter::once(polygon.exterior())
                .chain(polygon.interiors())
                .map(ring)
                .collect();
            json!({
                "type": "Polygon",
                "coordinates": rings,
            })
        }
    }
}

/// Streams a FeatureCollection to disk one feature at a time
pub struct GeoJsonWriter {
    path: PathBuf,
    out: Option<BufWriter<File>>,
    count: usize,
}

impl GeoJsonWriter {
    pub fn create(path: &Path, crs: Option<&Value>) -> Result<Self> {
        let file = File::create(path).map_err(|source| PlotError::OutputWrite {
            path: path.to_path_buf(),
            source,
        })?;
        let mut writer = Self {
            path: path.to_path_buf(),
            out: Some(BufWriter::new(file)),
            count: 0,
        };

        let mut header = String::from("{\"type\":\"FeatureCollection\",");
        if let Some(crs) = crs {
            header.push_str("\"crs\":");
            header.push_str(&crs.to_string());
            header.push(',');
        }
        header.push_str("\"features\":[\n");
        writer.write_raw(header.as_bytes())?;
        Ok(writer)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn count(&self) -> usize {
        self.count
    }

    fn write_raw(&mut self, bytes: &[u8]) -> Result<()> {
        let Some(out) = self.out.as_mut() else {
            return Err(PlotError::OutputWrite {
                path: self.path.clone(),
                source: std::io::Error::other("writer already finished"),
            });
        };
        out.write_all(bytes).map_err(|source| PlotError::OutputWrite {
            path: self.path.clone(),
            source,
        })
    }
}

impl FeatureSink for GeoJsonWriter {
    fn write_feature(&mut self, feature: &Feature) -> Result<()> {
        let value = json!({
            "type": "Feature",
            "properties": feature.properties,
            "geometry": geometry_json(&feature.geometry),
        });
        let separator = if self.count == 0 { "" } else { ",\n" };
        let line = format!("{separator}{value}");
        self.write_raw(line.as_bytes())?;
        self.count += 1;
        Ok(())
    }

    fn finish(&mut self) -> Result<()> {
        if self.out.is_none() {
            return Ok(());
        }
        self.write_raw(b"\n]}\n")?;
        if let Some(mut out) = self.out.take() {
            out.flush().map_err(|source| PlotError::OutputWrite {
                path: self.path.clone(),
                source,
            })?;
        }
        Ok(())
    }
}

// --- DXF ---

/// Read every closed polyline as a polygon feature with `id` and `layer`.
///
/// Open polylines and splines are chained into one extra closed feature.
pub fn read_dxf(path: &Path) -> Result<Layer> {
    let drawing = Drawing::load_file(path).map_err(|e| PlotError::Read {
        path: path.to_path_buf(),
        source: std::io::Error::other(e.to_string()),
    })?;

    let mut closed: Vec<(String, Vec<Coord<f64>>)> = Vec::new();
    let mut open_segments: Vec<Vec<Coord<f64>>> = Vec::new();
    let mut open_layer: Option<String> = None;

    for entity in drawing.entities() {
        let (is_closed, coords): (bool, Vec<Coord<f64>>) = match &entity.specific {
            EntityType::LwPolyline(polyline) => (
                polyline.flags & 1 != 0,
                polyline
                    .vertices
                    .iter()
                    .map(|v| Coord { x: v.x, y: v.y })
                    .collect(),
            ),
            EntityType::Polyline(polyline) => (
                polyline.flags & 1 != 0,
                polyline
                    .vertices()
                    .map(|v| Coord {
                        x: v.location.x,
                        y: v.location.y,
                    })
                    .collect(),
            ),
            EntityType::Spline(spline) => {
                let points = if spline.fit_points.is_empty() {
                    &spline.control_points
                } else {
                    &spline.fit_points
                };
                (false, points.iter().map(|p| Coord { x: p.x, y: p.y }).collect())
            }
            other => {
                log::debug!("{}: skipping entity {:?}", path.display(), other);
                continue;
            }
        };

        if is_closed && coords.len() >= 3 {
            closed.push((entity.common.layer.clone(), close_ring(coords)));
        } else if coords.len() >= 2 {
            open_layer.get_or_insert_with(|| entity.common.layer.clone());
            open_segments.push(coords);
        }
    }

    if !open_segments.is_empty() {
        let layer = open_layer.unwrap_or_default();
        closed.push((layer, close_ring(assemble_segments(open_segments))));
    }

    let features = closed
        .into_iter()
        .enumerate()
        .map(|(i, (layer, ring))| {
            Feature::new(FeatureGeometry::Polygon(Polygon::new(LineString::new(ring), vec![])))
                .with_property("ID", i as u64 + 1)
                .with_property("layer", layer)
        })
        .collect::<Vec<_>>();

    log::debug!("read {} polygons from {}", features.len(), path.display());
    Ok(Layer {
        path: path.to_path_buf(),
        crs: None,
        features,
    })
}

fn close_ring(mut coords: Vec<Coord<f64>>) -> Vec<Coord<f64>> {
    if let (Some(&first), Some(&last)) = (coords.first(), coords.last()) {
        if first != last {
            coords.push(first);
        }
    }
    coords
}

/// Greedily chain open segments end to end into a single ring
fn assemble_segments(mut segments: Vec<Vec<Coord<f64>>>) -> Vec<Coord<f64>> {
    if segments.is_empty() {
        return Vec::new();
    }
    let mut chain = segments.remove(0);

    while !segments.is_empty() {
        let (Some(&chain_start), Some(&chain_end)) = (chain.first(), chain.last()) else {
            break;
        };

        let mut best: Option<(usize, Join, f64)> = None;
        for (i, seg) in segments.iter().enumerate() {
            let (Some(&seg_start), Some(&seg_end)) = (seg.first(), seg.last()) else {
                continue;
            };
            let candidates = [
                (distance(chain_end, seg_start), Join::Append),
                (distance(chain_end, seg_end), Join::AppendReversed),
                (distance(seg_end, chain_start), Join::Prepend),
                (distance(seg_start, chain_start), Join::PrependReversed),
            ];
            for (dist, join) in candidates {
                if best.map_or(true, |(_, _, nearest)| dist < nearest) {
                    best = Some((i, join, dist));
                }
            }
        }

        let Some((idx, join, _)) = best else {
            break;
        };
        let seg = segments.remove(idx);
        chain = match join {
            Join::Append => {
                chain.extend(seg.into_iter().skip(1));
                chain
            }
            Join::AppendReversed => {
                chain.extend(seg.into_iter().rev().skip(1));
                chain
            }
            Join::Prepend => {
                let mut joined = seg;
                joined.extend(chain.into_iter().skip(1));
                joined
            }
            Join::PrependReversed => {
                let mut joined: Vec<_> = seg.into_iter().rev().collect();
                joined.extend(chain.into_iter().skip(1));
                joined
            }
        };
    }

    chain
}

#[derive(Debug, Clone, Copy)]
enum Join {
    Append,
    AppendReversed,
    Prepend,
    PrependReversed,
}

fn distance(p1: Coord<f64>, p2: Coord<f64>) -> f64 {
    ((p2.x - p1.x).powi(2) + (p2.y - p1.y).powi(2)).sqrt()
}
