//! Layer-level drivers: fit a plot to every stand, lay grids into every plot.

use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use rayon::prelude::*;
use serde_json::Value;

use crate::cancel::CancelFlag;
use crate::config::PlotConfig;
use crate::error::{PlotError, Result};
use crate::features::{Feature, FeatureGeometry, FeatureSink, Layer};
use crate::geometry;
use crate::grid::{self, GridFrame};
use crate::optimizer::{LocalSearch, SearchResult, Strategy};
use crate::plot::PlotVariant;
use crate::search;

/// Which plots to fit
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fit {
    /// One shape and anchor with the given strategy
    Variant(PlotVariant, Strategy),
    /// Optimized search over all twelve variants, best overlap wins
    BestOfFamily,
}

impl Fit {
    pub fn shape_name(&self) -> String {
        match self {
            Fit::Variant(variant, _) => variant.kind.to_string(),
            Fit::BestOfFamily => "best".to_string(),
        }
    }

    pub fn anchor_name(&self) -> String {
        match self {
            Fit::Variant(variant, _) => variant.anchor.to_string(),
            Fit::BestOfFamily => "best".to_string(),
        }
    }

    pub fn strategy(&self) -> Strategy {
        match self {
            Fit::Variant(_, strategy) => *strategy,
            Fit::BestOfFamily => Strategy::Optimized,
        }
    }
}

/// One fitted stand, ready to be written
#[derive(Debug, Clone)]
pub struct PlotRecord {
    pub id: Value,
    pub source_area: f64,
    /// perimeter / sqrt(area) of the source polygon
    pub shape_index: f64,
    pub result: SearchResult,
}

impl PlotRecord {
    pub fn overlap_perc(&self) -> f64 {
        100.0 * self.result.overlap_area / self.source_area
    }

    pub fn to_feature(&self, id_field: &str) -> Feature {
        let plot = &self.result.plot;
        Feature::new(FeatureGeometry::Polygon(plot.geometry.clone()))
            .with_property(id_field, self.id.clone())
            .with_property("a", plot.a)
            .with_property("b", plot.b)
            .with_property("alpha", plot.alpha)
            .with_property("perc", self.overlap_perc())
            .with_property("ishp", self.shape_index)
            .with_property("shape", plot.variant.kind.name())
            .with_property("anchor", plot.variant.anchor.name())
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchSummary {
    pub seed: u64,
    /// Overlap percentage of every written record, in input order
    pub overlap_percs: Vec<f64>,
}

/// Logs progress at every tenth of the layer
struct Progress {
    label: &'static str,
    total: usize,
    done: usize,
    next_decile: usize,
}

impl Progress {
    fn new(label: &'static str, total: usize) -> Self {
        Self {
            label,
            total,
            done: 0,
            next_decile: 1,
        }
    }

    fn advance(&mut self) {
        self.done += 1;
        while self.next_decile <= 10 && self.done * 10 >= self.total * self.next_decile {
            log::info!("{}: {}% ({}/{})", self.label, self.next_decile * 10, self.done, self.total);
            self.next_decile += 1;
        }
    }
}

/// Generator for one feature, independent of which thread fits it
fn feature_rng(seed: u64, index: usize) -> Pcg64 {
    Pcg64::seed_from_u64(seed ^ (index as u64).wrapping_mul(0x9E37_79B9_7F4A_7C15))
}

fn id_label(id: &Value) -> String {
    match id {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn fit_feature(
    index: usize,
    feature: &Feature,
    id_field: &str,
    fit: Fit,
    config: &PlotConfig,
    cancel: &CancelFlag,
    seed: u64,
) -> Result<PlotRecord> {
    cancel.check()?;

    let id = feature.property(id_field).cloned().unwrap_or(Value::Null);
    let label = id_label(&id);
    let polygon = feature
        .polygon()
        .ok_or_else(|| PlotError::degenerate(&label, "feature is not a polygon"))?;

    let mut rng = feature_rng(seed, index);
    let result = match fit {
        Fit::Variant(variant, strategy) => {
            LocalSearch::new(config, cancel).run(polygon, variant, strategy, &mut rng)
        }
        Fit::BestOfFamily => search::best_of_family(polygon, config, cancel, &mut rng),
    }
    .map_err(|e| match e {
        PlotError::DegenerateGeometry { reason, .. } => PlotError::degenerate(&label, reason),
        other => other,
    })?;

    let record = PlotRecord {
        id,
        source_area: result.plot.source_area,
        shape_index: result.plot.source_perimeter / result.plot.source_area.sqrt(),
        result,
    };
    log::debug!(
        "feature {label}: {} a={:.3} b={:.3} alpha={:.3} overlap={:.2}%",
        record.result.plot.variant,
        record.result.plot.a,
        record.result.plot.b,
        record.result.plot.alpha,
        record.overlap_perc()
    );
    Ok(record)
}

/// Fit a plot to every polygon in `layer` and write one record per polygon.
///
/// Features are fitted in parallel chunks and written in input order. On any
/// error, including validation failures and cancellation, the records already
/// written are kept and the sink is finished before the error is returned.
pub fn run_plots(
    layer: &Layer,
    id_field: &str,
    fit: Fit,
    config: &PlotConfig,
    cancel: &CancelFlag,
    sink: &mut dyn FeatureSink,
) -> Result<BatchSummary> {
    let mut summary = BatchSummary::default();
    let outcome = fit_layer(layer, id_field, fit, config, cancel, sink, &mut summary);
    let finished = sink.finish();
    outcome?;
    finished?;
    Ok(summary)
}

fn fit_layer(
    layer: &Layer,
    id_field: &str,
    fit: Fit,
    config: &PlotConfig,
    cancel: &CancelFlag,
    sink: &mut dyn FeatureSink,
    summary: &mut BatchSummary,
) -> Result<()> {
    layer.require_polygons()?;
    layer.require_field(id_field)?;
    config.validate()?;

    let seed = config.seed.unwrap_or_else(|| rand::rng().random());
    log::info!(
        "fitting {} plots ({}, {}, {}) with seed {seed}",
        layer.features.len(),
        fit.shape_name(),
        fit.anchor_name(),
        fit.strategy()
    );

    summary.seed = seed;
    summary.overlap_percs.reserve(layer.features.len());
    fit_all(layer, id_field, fit, config, cancel, seed, sink, summary)
}

#[allow(clippy::too_many_arguments)]
fn fit_all(
    layer: &Layer,
    id_field: &str,
    fit: Fit,
    config: &PlotConfig,
    cancel: &CancelFlag,
    seed: u64,
    sink: &mut dyn FeatureSink,
    summary: &mut BatchSummary,
) -> Result<()> {
    let chunk_size = (rayon::current_num_threads() * 4).max(1);
    let indexed: Vec<(usize, &Feature)> = layer.features.iter().enumerate().collect();
    let mut progress = Progress::new("plots", indexed.len());

    for chunk in indexed.chunks(chunk_size) {
        let records: Vec<Result<PlotRecord>> = chunk
            .par_iter()
            .map(|&(index, feature)| fit_feature(index, feature, id_field, fit, config, cancel, seed))
            .collect();

        for record in records {
            // a chunk already fitted is not written past an interrupt
            cancel.check()?;
            let record = record?;
            sink.write_feature(&record.to_feature(id_field))?;
            summary.overlap_percs.push(record.overlap_perc());
            progress.advance();
        }
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PointsSummary {
    pub plots: usize,
    pub points: usize,
}

/// Lay a grid of `n_points` per short side into every plot of `layer`.
///
/// `layer` is a plots layer as written by [`run_plots`]: polygons carrying
/// the id field plus `a`, `b` and `alpha`. Each grid is centered on the plot
/// polygon's centroid. With `clip` only points inside the slightly buffered
/// plot polygon are kept.
pub fn run_points(
    layer: &Layer,
    id_field: &str,
    n_points: usize,
    clip: bool,
    cancel: &CancelFlag,
    sink: &mut dyn FeatureSink,
) -> Result<PointsSummary> {
    let mut summary = PointsSummary::default();
    let outcome = grid_layer(layer, id_field, n_points, clip, cancel, sink, &mut summary);
    let finished = sink.finish();
    outcome?;
    finished?;
    Ok(summary)
}

fn grid_layer(
    layer: &Layer,
    id_field: &str,
    n_points: usize,
    clip: bool,
    cancel: &CancelFlag,
    sink: &mut dyn FeatureSink,
    summary: &mut PointsSummary,
) -> Result<()> {
    layer.require_polygons()?;
    for field in [id_field, "a", "b", "alpha"] {
        layer.require_field(field)?;
    }
    if n_points < 2 {
        return Err(PlotError::InvalidParameter(format!(
            "number of points must be at least 2, got {n_points}"
        )));
    }

    log::info!(
        "generating {n_points}-point grids for {} plots{}",
        layer.features.len(),
        if clip { ", clipped" } else { "" }
    );
    grid_all(layer, id_field, n_points, clip, cancel, sink, summary)
}

fn grid_all(
    layer: &Layer,
    id_field: &str,
    n_points: usize,
    clip: bool,
    cancel: &CancelFlag,
    sink: &mut dyn FeatureSink,
    summary: &mut PointsSummary,
) -> Result<()> {
    let mut progress = Progress::new("points", layer.features.len());

    for feature in &layer.features {
        cancel.check()?;

        let id = feature.property(id_field).cloned().unwrap_or(Value::Null);
        let label = id_label(&id);
        let polygon = feature
            .polygon()
            .ok_or_else(|| PlotError::degenerate(&label, "feature is not a polygon"))?;
        let number = |field: &str| {
            feature.property_f64(field).ok_or_else(|| PlotError::MissingField {
                path: layer.path.clone(),
                field: field.to_string(),
            })
        };

        let frame = GridFrame {
            center: geometry::centroid(polygon)
                .ok_or_else(|| PlotError::degenerate(&label, "centroid is undefined"))?,
            a: number("a")?,
            b: number("b")?,
            alpha: number("alpha")?,
        };
        let region = clip.then(|| grid::clip_region(polygon, frame.a));
        let points = grid::generate_grid(&frame, n_points, region.as_ref())?;

        for point in &points {
            let record = Feature::new(FeatureGeometry::Point(point.coord))
                .with_property(id_field, id.clone())
                .with_property("row", point.row)
                .with_property("column", point.column);
            sink.write_feature(&record)?;
        }
        log::debug!("plot {label}: {} points", points.len());

        summary.plots += 1;
        summary.points += points.len();
        progress.advance();
    }
    Ok(())
}
