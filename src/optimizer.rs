use geo::Polygon;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::cancel::CancelFlag;
use crate::config::PlotConfig;
use crate::error::Result;
use crate::plot::{PlotVariant, SimulationPlot};

/// Which perturbations the local search may apply
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Base plot only, no search
    Fixed,
    Translated,
    Rotated,
    Resized,
    /// Resize, translate and rotate composed on every iteration
    Optimized,
}

impl Strategy {
    pub fn name(self) -> &'static str {
        match self {
            Strategy::Fixed => "fixed",
            Strategy::Translated => "translated",
            Strategy::Rotated => "rotated",
            Strategy::Resized => "resized",
            Strategy::Optimized => "optimized",
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A plot and its overlap with the source polygon
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub plot: SimulationPlot,
    pub overlap_area: f64,
}

/// Greedy stochastic hill climbing over plot transforms.
///
/// Each iteration perturbs the best plot found so far and keeps the
/// candidate only if it strictly increases the overlap, so the result never
/// falls below the unperturbed base plot.
pub struct LocalSearch<'a> {
    config: &'a PlotConfig,
    cancel: &'a CancelFlag,
}

impl<'a> LocalSearch<'a> {
    pub fn new(config: &'a PlotConfig, cancel: &'a CancelFlag) -> Self {
        Self { config, cancel }
    }

    pub fn run<R: Rng + ?Sized>(
        &self,
        polygon: &Polygon<f64>,
        variant: PlotVariant,
        strategy: Strategy,
        rng: &mut R,
    ) -> Result<SearchResult> {
        let mut best = variant.create_plot(polygon, self.config.side_ratio_max)?;
        let mut best_area = best.overlap(polygon);

        if strategy == Strategy::Fixed {
            return Ok(SearchResult {
                plot: best,
                overlap_area: best_area,
            });
        }

        let mut accepted = 0usize;
        for _ in 0..self.config.random_iterations {
            self.cancel.check_inner()?;

            let candidate = self.perturb(&best, strategy, rng);
            let candidate_area = candidate.overlap(polygon);
            if best_area < candidate_area {
                best = candidate;
                best_area = candidate_area;
                accepted += 1;
            }
        }

        log::trace!(
            "{variant} {strategy}: accepted {accepted}/{} candidates, overlap {best_area:.3}",
            self.config.random_iterations
        );

        Ok(SearchResult {
            plot: best,
            overlap_area: best_area,
        })
    }

    fn perturb<R: Rng + ?Sized>(
        &self,
        plot: &SimulationPlot,
        strategy: Strategy,
        rng: &mut R,
    ) -> SimulationPlot {
        let cfg = self.config;
        match strategy {
            Strategy::Fixed => plot.clone(),
            Strategy::Translated => plot.random_translate(cfg.perc_translate, rng),
            Strategy::Rotated => plot.random_rotate(cfg.max_alpha, rng),
            Strategy::Resized => plot.random_resize(cfg.max_resize_perc, cfg.side_ratio_max, rng),
            Strategy::Optimized => plot
                .random_resize(cfg.max_resize_perc, cfg.side_ratio_max, rng)
                .random_translate(cfg.perc_translate, rng)
                .random_rotate(cfg.max_alpha, rng),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plot::{Anchor, ShapeKind};
    use approx::assert_relative_eq;
    use geo::LineString;
    use rand::SeedableRng;
    use rand_pcg::Pcg64;

    const STRATEGIES: [Strategy; 5] = [
        Strategy::Fixed,
        Strategy::Translated,
        Strategy::Rotated,
        Strategy::Resized,
        Strategy::Optimized,
    ];

    /// L-shaped stand, where the centroid sits off the bulk of the area
    fn l_shape() -> Polygon<f64> {
        Polygon::new(
            LineString::from(vec![
                (0.0, 0.0),
                (60.0, 0.0),
                (60.0, 15.0),
                (15.0, 15.0),
                (15.0, 40.0),
                (0.0, 40.0),
                (0.0, 0.0),
            ]),
            vec![],
        )
    }

    fn config(iterations: usize) -> PlotConfig {
        PlotConfig {
            random_iterations: iterations,
            ..PlotConfig::default()
        }
    }

    #[test]
    fn test_zero_iterations_returns_base_plot() {
        let polygon = l_shape();
        let cancel = CancelFlag::default();
        let cfg = config(0);
        let search = LocalSearch::new(&cfg, &cancel);
        for variant in PlotVariant::all() {
            let base = variant.create_plot(&polygon, cfg.side_ratio_max).unwrap();
            for strategy in STRATEGIES {
                let mut rng = Pcg64::seed_from_u64(3);
                let result = search.run(&polygon, variant, strategy, &mut rng).unwrap();
                assert_eq!(result.plot, base);
                assert_eq!(result.overlap_area, base.overlap(&polygon));
            }
        }
    }

    #[test]
    fn test_optimized_is_monotone_in_iterations() {
        let polygon = l_shape();
        let cancel = CancelFlag::default();
        let variant = PlotVariant::new(ShapeKind::Rectangle, Anchor::Centroid);

        let mut previous = 0.0;
        for iterations in [0, 10, 50, 150] {
            let cfg = config(iterations);
            let mut rng = Pcg64::seed_from_u64(42);
            let result = LocalSearch::new(&cfg, &cancel)
                .run(&polygon, variant, Strategy::Optimized, &mut rng)
                .unwrap();
            assert!(result.overlap_area >= previous);
            previous = result.overlap_area;
        }
    }

    #[test]
    fn test_search_never_loses_to_base_plot() {
        let polygon = l_shape();
        let cancel = CancelFlag::default();
        let cfg = config(60);
        let search = LocalSearch::new(&cfg, &cancel);
        for variant in PlotVariant::all() {
            let base_area = variant
                .create_plot(&polygon, cfg.side_ratio_max)
                .unwrap()
                .overlap(&polygon);
            for strategy in STRATEGIES {
                let mut rng = Pcg64::seed_from_u64(9);
                let result = search.run(&polygon, variant, strategy, &mut rng).unwrap();
                assert!(result.overlap_area >= base_area);
                assert_relative_eq!(
                    result.overlap_area,
                    result.plot.overlap(&polygon),
                    max_relative = 1e-12
                );
                let ratio = result.plot.a / result.plot.b;
                assert!(ratio <= 4.0 + 1e-9, "{variant} {strategy}: ratio {ratio}");
            }
        }
    }

    #[test]
    fn test_same_seed_same_result() {
        let polygon = l_shape();
        let cancel = CancelFlag::default();
        let cfg = config(40);
        let variant = PlotVariant::new(ShapeKind::Ellipse, Anchor::MeanXY);
        let search = LocalSearch::new(&cfg, &cancel);

        let first = search
            .run(&polygon, variant, Strategy::Optimized, &mut Pcg64::seed_from_u64(5))
            .unwrap();
        let second = search
            .run(&polygon, variant, Strategy::Optimized, &mut Pcg64::seed_from_u64(5))
            .unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn test_circle_rotation_search_keeps_base() {
        let polygon = l_shape();
        let cancel = CancelFlag::default();
        let cfg = config(30);
        let variant = PlotVariant::new(ShapeKind::Circle, Anchor::Centroid);
        let mut rng = Pcg64::seed_from_u64(1);
        let result = LocalSearch::new(&cfg, &cancel)
            .run(&polygon, variant, Strategy::Rotated, &mut rng)
            .unwrap();
        assert_eq!(result.plot, variant.create_plot(&polygon, cfg.side_ratio_max).unwrap());
    }

    #[test]
    fn test_inner_cancellation() {
        let polygon = l_shape();
        let cancel = CancelFlag::default().with_inner_polling(true);
        cancel.cancel();
        let cfg = config(10);
        let mut rng = Pcg64::seed_from_u64(1);
        let variant = PlotVariant::new(ShapeKind::Square, Anchor::Centroid);
        let search = LocalSearch::new(&cfg, &cancel);
        assert!(search.run(&polygon, variant, Strategy::Optimized, &mut rng).is_err());
        // a fixed plot never enters the loop
        assert!(search.run(&polygon, variant, Strategy::Fixed, &mut rng).is_ok());
    }
}
