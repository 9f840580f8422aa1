//! Simulation plots for forest stands.
//!
//! Fits a square, circle, rectangle or ellipse of equal area to each source
//! polygon, maximizing their overlap by stochastic hill climbing, and lays
//! regular sample grids into the fitted plots.

pub mod batch;
pub mod cancel;
pub mod config;
pub mod dxf_output;
pub mod error;
pub mod features;
pub mod geometry;
pub mod grid;
pub mod optimizer;
pub mod plot;
pub mod search;
pub mod sizing;
pub mod svg_output;
pub mod tuning;

pub use batch::{run_plots, run_points, Fit};
pub use cancel::CancelFlag;
pub use config::PlotConfig;
pub use error::{PlotError, Result};
pub use optimizer::{LocalSearch, SearchResult, Strategy};
pub use plot::{Anchor, PlotVariant, ShapeKind, SimulationPlot};
