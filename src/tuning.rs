//! Random-search hyperparameter tuning.
//!
//! Each trial draws search parameters uniformly from [`TuningRanges`], fits
//! the whole layer in memory, and appends the timing and overlap statistics
//! as one row of a `;`-separated CSV file.

use rand::Rng;
use serde::Serialize;
use std::fs::OpenOptions;
use std::path::Path;
use std::time::Instant;

use crate::batch::{self, Fit};
use crate::cancel::CancelFlag;
use crate::config::PlotConfig;
use crate::error::{PlotError, Result};
use crate::features::{Feature, Layer};

/// Inclusive ranges the trial parameters are drawn from
#[derive(Debug, Clone, PartialEq)]
pub struct TuningRanges {
    pub min_iterations: usize,
    pub max_iterations: usize,
    pub min_translate_perc: f64,
    pub max_translate_perc: f64,
    pub min_angle_limit: f64,
    pub max_angle_limit: f64,
    pub min_resize_perc: f64,
    pub max_resize_perc: f64,
}

impl Default for TuningRanges {
    fn default() -> Self {
        Self {
            min_iterations: 25,
            max_iterations: 1000,
            min_translate_perc: 0.01,
            max_translate_perc: 0.25,
            min_angle_limit: 1.0,
            max_angle_limit: 45.0,
            min_resize_perc: 0.01,
            max_resize_perc: 0.33,
        }
    }
}

impl TuningRanges {
    pub fn validate(&self) -> Result<()> {
        let ranges = [
            ("iterations", self.min_iterations as f64, self.max_iterations as f64),
            ("translate", self.min_translate_perc, self.max_translate_perc),
            ("angle", self.min_angle_limit, self.max_angle_limit),
            ("resize", self.min_resize_perc, self.max_resize_perc),
        ];
        for (name, min, max) in ranges {
            if !(min.is_finite() && max.is_finite() && 0.0 <= min && min <= max) {
                return Err(PlotError::InvalidParameter(format!(
                    "{name} range [{min}, {max}] is empty or negative"
                )));
            }
        }
        if self.max_resize_perc >= 1.0 {
            return Err(PlotError::InvalidParameter(format!(
                "resize range must stay below 1, got {}",
                self.max_resize_perc
            )));
        }
        Ok(())
    }

    /// Draw one trial configuration; the side-ratio limit is kept from `base`
    pub fn sample<R: Rng + ?Sized>(&self, base: &PlotConfig, rng: &mut R) -> PlotConfig {
        let mut uniform = |min: f64, max: f64| min + rng.random::<f64>() * (max - min);
        let perc_translate = uniform(self.min_translate_perc, self.max_translate_perc);
        let max_alpha = uniform(self.min_angle_limit, self.max_angle_limit);
        let max_resize_perc = uniform(self.min_resize_perc, self.max_resize_perc);
        PlotConfig {
            random_iterations: rng.random_range(self.min_iterations..=self.max_iterations),
            perc_translate,
            max_alpha,
            max_resize_perc,
            side_ratio_max: base.side_ratio_max,
            seed: Some(rng.random()),
        }
    }
}

/// Descriptive statistics of overlap percentages
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PercStats {
    pub n: usize,
    pub min: f64,
    pub max: f64,
    pub mean: f64,
    /// Population standard deviation
    pub std_dev: f64,
}

pub fn perc_statistics(values: &[f64]) -> Option<PercStats> {
    if values.is_empty() {
        return None;
    }
    let n = values.len();
    let mean = values.iter().sum::<f64>() / n as f64;
    let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n as f64;
    Some(PercStats {
        n,
        min: values.iter().copied().fold(f64::INFINITY, f64::min),
        max: values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        mean,
        std_dev: variance.sqrt(),
    })
}

/// One line of the statistics file
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TrialRow {
    #[serde(rename = "shpFN")]
    pub shp_fn: String,
    pub n_polygons: usize,
    pub shape: String,
    pub anchor: String,
    pub placement: String,
    pub random_iterations: usize,
    pub perc_translate: f64,
    pub max_alpha: f64,
    pub max_resize_perc: f64,
    /// Seconds
    pub duration: f64,
    pub min_perc: f64,
    pub max_perc: f64,
    pub avg_perc: f64,
    pub std_dev_perc: f64,
}

/// Appends trial rows, writing the header only when the file is new
pub struct StatisticsFile {
    writer: csv::Writer<std::fs::File>,
    path: std::path::PathBuf,
}

impl StatisticsFile {
    pub fn open(path: &Path) -> Result<Self> {
        let is_new = !path.exists() || std::fs::metadata(path).map(|m| m.len() == 0).unwrap_or(true);
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|source| PlotError::OutputWrite {
                path: path.to_path_buf(),
                source,
            })?;
        let writer = csv::WriterBuilder::new()
            .delimiter(b';')
            .has_headers(is_new)
            .from_writer(file);
        Ok(Self {
            writer,
            path: path.to_path_buf(),
        })
    }

    pub fn append(&mut self, row: &TrialRow) -> Result<()> {
        self.writer
            .serialize(row)
            .map_err(|e| self.write_error(e.to_string()))?;
        // every trial is persisted as soon as it completes
        self.writer
            .flush()
            .map_err(|source| PlotError::OutputWrite {
                path: self.path.clone(),
                source,
            })
    }

    fn write_error(&self, message: String) -> PlotError {
        PlotError::OutputWrite {
            path: self.path.clone(),
            source: std::io::Error::other(message),
        }
    }
}

/// Run `tests` random trials over `layer`, appending one row per trial to `stats_path`
#[allow(clippy::too_many_arguments)]
pub fn run_tuning<R: Rng + ?Sized>(
    layer: &Layer,
    id_field: &str,
    fit: Fit,
    base: &PlotConfig,
    ranges: &TuningRanges,
    tests: usize,
    stats_path: &Path,
    cancel: &CancelFlag,
    rng: &mut R,
) -> Result<Vec<TrialRow>> {
    ranges.validate()?;
    let mut stats_file = StatisticsFile::open(stats_path)?;
    let mut rows = Vec::with_capacity(tests);

    for test in 0..tests {
        cancel.check()?;
        let config = ranges.sample(base, rng);
        log::info!(
            "test {}/{tests}: iterations={} translate={:.3} alpha={:.2} resize={:.3}",
            test + 1,
            config.random_iterations,
            config.perc_translate,
            config.max_alpha,
            config.max_resize_perc
        );

        let started = Instant::now();
        let mut plots: Vec<Feature> = Vec::with_capacity(layer.features.len());
        let summary = batch::run_plots(layer, id_field, fit, &config, cancel, &mut plots)?;
        let duration = started.elapsed().as_secs_f64();

        let Some(stats) = perc_statistics(&summary.overlap_percs) else {
            log::warn!("{}: no polygons, nothing to tune", layer.path.display());
            break;
        };

        let row = TrialRow {
            shp_fn: layer.path.display().to_string(),
            n_polygons: stats.n,
            shape: fit.shape_name(),
            anchor: fit.anchor_name(),
            placement: fit.strategy().to_string(),
            random_iterations: config.random_iterations,
            perc_translate: config.perc_translate,
            max_alpha: config.max_alpha,
            max_resize_perc: config.max_resize_perc,
            duration,
            min_perc: stats.min,
            max_perc: stats.max,
            avg_perc: stats.mean,
            std_dev_perc: stats.std_dev,
        };
        stats_file.append(&row)?;
        log::info!(
            "test {}/{tests}: mean overlap {:.2}% (sd {:.2}) in {duration:.2}s",
            test + 1,
            stats.mean,
            stats.std_dev
        );
        rows.push(row);
    }

    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::FeatureGeometry;
    use crate::optimizer::Strategy;
    use crate::plot::{Anchor, PlotVariant, ShapeKind};
    use approx::assert_relative_eq;
    use geo::{LineString, Polygon};
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    #[test]
    fn test_statistics() {
        let stats = perc_statistics(&[90.0, 95.0, 100.0, 95.0]).unwrap();
        assert_eq!(stats.n, 4);
        assert_eq!(stats.min, 90.0);
        assert_eq!(stats.max, 100.0);
        assert_relative_eq!(stats.mean, 95.0);
        assert_relative_eq!(stats.std_dev, 12.5_f64.sqrt());

        assert!(perc_statistics(&[]).is_none());
        assert_eq!(perc_statistics(&[42.0]).unwrap().std_dev, 0.0);
    }

    #[test]
    fn test_samples_stay_in_range() {
        let ranges = TuningRanges::default();
        let base = PlotConfig {
            side_ratio_max: None,
            ..PlotConfig::default()
        };
        let mut rng = Pcg64::seed_from_u64(8);
        for _ in 0..200 {
            let config = ranges.sample(&base, &mut rng);
            assert!((25..=1000).contains(&config.random_iterations));
            assert!((0.01..=0.25).contains(&config.perc_translate));
            assert!((1.0..=45.0).contains(&config.max_alpha));
            assert!((0.01..=0.33).contains(&config.max_resize_perc));
            assert_eq!(config.side_ratio_max, None);
            config.validate().unwrap();
        }
    }

    #[test]
    fn test_invalid_ranges() {
        let ranges = TuningRanges {
            min_iterations: 10,
            max_iterations: 5,
            ..TuningRanges::default()
        };
        assert!(ranges.validate().is_err());
    }

    #[test]
    fn test_trials_append_to_csv() {
        let dir = tempfile::tempdir().unwrap();
        let stats_path = dir.path().join("stats.csv");
        let stand = Polygon::new(
            LineString::from(vec![(0.0, 0.0), (30.0, 0.0), (35.0, 12.0), (0.0, 15.0), (0.0, 0.0)]),
            vec![],
        );
        let layer = Layer {
            path: "stands.geojson".into(),
            crs: None,
            features: vec![Feature::new(FeatureGeometry::Polygon(stand)).with_property("ID", 1)],
        };
        let ranges = TuningRanges {
            min_iterations: 2,
            max_iterations: 10,
            ..TuningRanges::default()
        };
        let fit = Fit::Variant(
            PlotVariant::new(ShapeKind::Rectangle, Anchor::Centroid),
            Strategy::Optimized,
        );
        let cancel = CancelFlag::default();
        let mut rng = Pcg64::seed_from_u64(1);

        let rows = run_tuning(&layer, "ID", fit, &PlotConfig::default(), &ranges, 2, &stats_path, &cancel, &mut rng)
            .unwrap();
        assert_eq!(rows.len(), 2);
        run_tuning(&layer, "ID", fit, &PlotConfig::default(), &ranges, 1, &stats_path, &cancel, &mut rng)
            .unwrap();

        let text = std::fs::read_to_string(&stats_path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(
            lines[0],
            "shpFN;nPolygons;shape;anchor;placement;randomIterations;percTranslate;maxAlpha;\
             maxResizePerc;duration;minPerc;maxPerc;avgPerc;stdDevPerc"
        );
        assert!(lines[1].starts_with("stands.geojson;1;rectangle;centroid;optimized;"));
    }
}
