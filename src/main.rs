use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use env_logger::Env;
use geo::Coord;
use rand::{Rng, SeedableRng};
use rand_pcg::Pcg64;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use gensimplot::config::DEFAULT_CONFIG_FILE;
use gensimplot::dxf_output::DxfWriter;
use gensimplot::features::{Feature, FeatureGeometry, FeatureSink, GeoJsonWriter, Layer, Tee};
use gensimplot::svg_output::Preview;
use gensimplot::tuning::{self, TuningRanges};
use gensimplot::{
    run_plots, run_points, Anchor, CancelFlag, Fit, PlotConfig, PlotError, PlotVariant, ShapeKind,
    Strategy,
};

/// Layer name for source outlines in DXF output
const STANDS_LAYER: &str = "STANDS";

/// Simulation plot generator
///
/// Fits equal-area squares, circles, rectangles or ellipses to forest-stand
/// polygons and generates sampling grids inside the fitted plots.
#[derive(Parser, Debug)]
#[command(name = "gensimplot")]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Number of worker threads (default: all available cores)
    #[arg(short, long, global = true)]
    threads: Option<usize>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fit a simulation plot to every polygon of a layer
    Plots {
        #[command(flatten)]
        io: IoArgs,

        #[command(flatten)]
        fit: FitArgs,

        #[command(flatten)]
        search: SearchArgs,

        /// Optional SVG preview path
        #[arg(long)]
        svg: Option<PathBuf>,

        /// Optional DXF output path
        #[arg(long)]
        dxf: Option<PathBuf>,

        /// Check for Ctrl-C inside each plot's search, not only between plots
        #[arg(long)]
        poll_inner: bool,
    },

    /// Generate sampling grids inside previously fitted plots
    Points {
        #[command(flatten)]
        io: IoArgs,

        /// Number of points along the short side of each plot
        #[arg(short, long, default_value_t = 5)]
        n_points: usize,

        /// Keep only points inside the plot polygon
        #[arg(long)]
        clip: bool,

        /// Optional SVG preview path
        #[arg(long)]
        svg: Option<PathBuf>,

        /// Optional DXF output path
        #[arg(long)]
        dxf: Option<PathBuf>,
    },

    /// Random search over the search hyperparameters
    Tune {
        /// Input polygon layer (GeoJSON or DXF)
        input: PathBuf,

        /// Name of the identifier field
        #[arg(long, default_value = "ID")]
        id_field: String,

        /// CSV file the trial statistics are appended to
        #[arg(short, long, default_value = "htuning.csv")]
        stats: PathBuf,

        /// Number of trials
        #[arg(long, default_value_t = 100)]
        tests: usize,

        #[command(flatten)]
        fit: FitArgs,

        #[command(flatten)]
        ranges: RangeArgs,

        #[command(flatten)]
        search: SearchArgs,
    },

    /// Write the effective configuration to a file
    Config {
        /// Output configuration path
        #[arg(default_value = DEFAULT_CONFIG_FILE)]
        output: PathBuf,

        #[command(flatten)]
        search: SearchArgs,
    },
}

#[derive(Args, Debug)]
struct IoArgs {
    /// Input layer (GeoJSON or DXF)
    input: PathBuf,

    /// Output GeoJSON path
    output: PathBuf,

    /// Name of the identifier field, copied to every output record
    #[arg(long, default_value = "ID")]
    id_field: String,
}

#[derive(Args, Debug)]
struct FitArgs {
    /// Plot shape, or `best` to search all shapes and anchors
    #[arg(long, value_enum, default_value_t = ShapeArg::Best)]
    shape: ShapeArg,

    /// Initial plot position
    #[arg(long, value_enum, default_value_t = AnchorArg::Bbox)]
    anchor: AnchorArg,

    /// Perturbations the search may apply
    #[arg(long, value_enum, default_value_t = PlacementArg::Optimized)]
    placement: PlacementArg,
}

#[derive(Args, Debug)]
struct SearchArgs {
    /// Configuration file (defaults used when it does not exist)
    #[arg(short, long, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,

    /// Random seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Random iterations per plot
    #[arg(short, long)]
    iterations: Option<usize>,

    /// Maximum translation as a fraction of the plot footprint
    #[arg(long)]
    perc_translate: Option<f64>,

    /// Maximum rotation per step in degrees
    #[arg(long)]
    max_alpha: Option<f64>,

    /// Maximum relative resize per step
    #[arg(long)]
    max_resize_perc: Option<f64>,

    /// Upper bound on the long/short side ratio
    #[arg(long, conflicts_with = "no_side_ratio_max")]
    side_ratio_max: Option<f64>,

    /// Disable the side ratio bound
    #[arg(long)]
    no_side_ratio_max: bool,
}

/// Ranges the tuning trials draw their parameters from
#[derive(Args, Debug)]
struct RangeArgs {
    #[arg(long, default_value_t = 25)]
    min_iterations: usize,
    #[arg(long, default_value_t = 1000)]
    max_iterations: usize,
    #[arg(long, default_value_t = 0.01)]
    min_translate: f64,
    #[arg(long, default_value_t = 0.25)]
    max_translate: f64,
    #[arg(long, default_value_t = 1.0)]
    min_angle_limit: f64,
    #[arg(long, default_value_t = 45.0)]
    max_angle_limit: f64,
    #[arg(long, default_value_t = 0.01)]
    min_resize: f64,
    #[arg(long, default_value_t = 0.33)]
    max_resize: f64,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum ShapeArg {
    Square,
    Circle,
    Rectangle,
    Ellipse,
    Best,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum AnchorArg {
    Centroid,
    Bbox,
    Meanxy,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum PlacementArg {
    Fixed,
    Translated,
    Rotated,
    Resized,
    Optimized,
}

impl FitArgs {
    fn to_fit(&self) -> Fit {
        let kind = match self.shape {
            ShapeArg::Square => ShapeKind::Square,
            ShapeArg::Circle => ShapeKind::Circle,
            ShapeArg::Rectangle => ShapeKind::Rectangle,
            ShapeArg::Ellipse => ShapeKind::Ellipse,
            ShapeArg::Best => return Fit::BestOfFamily,
        };
        let anchor = match self.anchor {
            AnchorArg::Centroid => Anchor::Centroid,
            AnchorArg::Bbox => Anchor::BoundingBox,
            AnchorArg::Meanxy => Anchor::MeanXY,
        };
        let strategy = match self.placement {
            PlacementArg::Fixed => Strategy::Fixed,
            PlacementArg::Translated => Strategy::Translated,
            PlacementArg::Rotated => Strategy::Rotated,
            PlacementArg::Resized => Strategy::Resized,
            PlacementArg::Optimized => Strategy::Optimized,
        };
        Fit::Variant(PlotVariant::new(kind, anchor), strategy)
    }
}

impl SearchArgs {
    /// Configuration file values overridden by command-line flags
    fn load(&self) -> Result<PlotConfig> {
        let mut config = PlotConfig::load_or_default(&self.config)
            .with_context(|| format!("Failed to load configuration {}", self.config.display()))?;
        if let Some(seed) = self.seed {
            config.seed = Some(seed);
        }
        if let Some(iterations) = self.iterations {
            config.random_iterations = iterations;
        }
        if let Some(perc) = self.perc_translate {
            config.perc_translate = perc;
        }
        if let Some(alpha) = self.max_alpha {
            config.max_alpha = alpha;
        }
        if let Some(perc) = self.max_resize_perc {
            config.max_resize_perc = perc;
        }
        if let Some(ratio) = self.side_ratio_max {
            config.side_ratio_max = Some(ratio);
        }
        if self.no_side_ratio_max {
            config.side_ratio_max = None;
        }
        config.validate()?;
        Ok(config)
    }
}

impl From<&RangeArgs> for TuningRanges {
    fn from(args: &RangeArgs) -> Self {
        TuningRanges {
            min_iterations: args.min_iterations,
            max_iterations: args.max_iterations,
            min_translate_perc: args.min_translate,
            max_translate_perc: args.max_translate,
            min_angle_limit: args.min_angle_limit,
            max_angle_limit: args.max_angle_limit,
            min_resize_perc: args.min_resize,
            max_resize_perc: args.max_resize,
        }
    }
}

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();

    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(Env::default().default_filter_or(log_level)).init();

    if let Some(threads) = cli.threads {
        rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .build_global()
            .context("Failed to set thread pool size")?;
        log::info!("Using {} threads", threads);
    }

    // Set up interrupt handler
    let interrupted = Arc::new(AtomicBool::new(false));
    let interrupted_clone = interrupted.clone();
    ctrlc::set_handler(move || {
        if interrupted_clone.load(Ordering::SeqCst) {
            eprintln!("\nSecond interrupt received, exiting immediately!");
            std::process::exit(130); // 128 + SIGINT(2)
        }
        interrupted_clone.store(true, Ordering::SeqCst);
        eprintln!("\nInterrupt received, finishing current plot... (press Ctrl-C again to force exit)");
    })
    .context("Error setting Ctrl-C handler")?;
    let cancel = CancelFlag::new(interrupted);

    println!("GenSimPlot - Simulation Plot Generator");
    println!("======================================\n");

    let outcome = match cli.command {
        Command::Plots {
            io,
            fit,
            search,
            svg,
            dxf,
            poll_inner,
        } => {
            let config = search.load()?;
            let cancel = cancel.with_inner_polling(poll_inner);
            plots(&io, fit.to_fit(), &config, &cancel, svg.as_deref(), dxf.as_deref(), start_time)
        }
        Command::Points {
            io,
            n_points,
            clip,
            svg,
            dxf,
        } => points(&io, n_points, clip, &cancel, svg.as_deref(), dxf.as_deref(), start_time),
        Command::Tune {
            input,
            id_field,
            stats,
            tests,
            fit,
            ranges,
            search,
        } => {
            let config = search.load()?;
            tune(&input, &id_field, &stats, tests, fit.to_fit(), &(&ranges).into(), &config, &cancel)
        }
        Command::Config { output, search } => {
            let config = search.load()?;
            config
                .save(&output)
                .with_context(|| format!("Failed to write {}", output.display()))?;
            println!("Configuration written to {}", output.display());
            Ok(())
        }
    };

    match outcome {
        Err(err) if matches!(err.downcast_ref::<PlotError>(), Some(PlotError::Cancelled)) => {
            eprintln!("\nUser cancelled operation, records written so far are kept.");
            std::process::exit(130);
        }
        other => other?,
    }

    println!("\nDone! [{:.2}s]", start_time.elapsed().as_secs_f64());
    Ok(())
}

fn print_header(io: &IoArgs) {
    println!("Input:    {}", io.input.display());
    println!("Output:   {}", io.output.display());
    println!("ID field: {}", io.id_field);
}

fn plots(
    io: &IoArgs,
    fit: Fit,
    config: &PlotConfig,
    cancel: &CancelFlag,
    svg: Option<&Path>,
    dxf: Option<&Path>,
    start_time: Instant,
) -> Result<()> {
    print_header(io);
    println!("\nParameters:");
    println!("  Shape:          {}", fit.shape_name());
    println!("  Anchor:         {}", fit.anchor_name());
    println!("  Placement:      {}", fit.strategy());
    println!("  Iterations:     {}", config.random_iterations);
    println!("  Translate:      {:.3}", config.perc_translate);
    println!("  Max alpha:      {:.2} deg", config.max_alpha);
    println!("  Max resize:     {:.3}", config.max_resize_perc);
    match config.side_ratio_max {
        Some(ratio) => println!("  Side ratio max: {:.2}", ratio),
        None => println!("  Side ratio max: none"),
    }

    println!("\n[1/2] Loading input layer... [{:.2}s]", start_time.elapsed().as_secs_f64());
    let layer = Layer::read(&io.input)
        .with_context(|| format!("Failed to load {}", io.input.display()))?;
    println!("      Loaded {} features", layer.features.len());

    println!("\n[2/2] Fitting simulation plots... [{:.2}s]", start_time.elapsed().as_secs_f64());
    let mut geojson = GeoJsonWriter::create(&io.output, layer.crs.as_ref())?;
    let mut dxf_writer = dxf.map(DxfWriter::new);
    if let Some(writer) = dxf_writer.as_mut() {
        for polygon in layer.polygons() {
            writer.add_outline(polygon, STANDS_LAYER);
        }
    }
    let mut preview: Vec<Feature> = Vec::new();

    let summary = {
        let mut sinks: Vec<&mut dyn FeatureSink> = vec![&mut geojson];
        if let Some(writer) = dxf_writer.as_mut() {
            sinks.push(writer);
        }
        if svg.is_some() {
            sinks.push(&mut preview);
        }
        run_plots(&layer, &io.id_field, fit, config, cancel, &mut Tee::new(sinks))?
    };

    println!("      Wrote {} plots (seed {})", geojson.count(), summary.seed);
    if let Some(stats) = tuning::perc_statistics(&summary.overlap_percs) {
        println!(
            "      Overlap: min {:.2}%, mean {:.2}%, max {:.2}%",
            stats.min, stats.mean, stats.max
        );
    }
    println!("      GeoJSON: {}", io.output.display());
    if let Some(path) = dxf {
        println!("      DXF: {}", path.display());
    }

    if let Some(path) = svg {
        Preview {
            sources: layer.polygons().collect(),
            plots: preview.iter().filter_map(Feature::polygon).collect(),
            points: Vec::new(),
        }
        .save(path)?;
        println!("      SVG: {}", path.display());
    }
    Ok(())
}

fn points(
    io: &IoArgs,
    n_points: usize,
    clip: bool,
    cancel: &CancelFlag,
    svg: Option<&Path>,
    dxf: Option<&Path>,
    start_time: Instant,
) -> Result<()> {
    print_header(io);
    println!("\nParameters:");
    println!("  Points per short side: {}", n_points);
    println!("  Clip to plot:          {}", clip);

    println!("\n[1/2] Loading plots layer... [{:.2}s]", start_time.elapsed().as_secs_f64());
    let layer = Layer::read(&io.input)
        .with_context(|| format!("Failed to load {}", io.input.display()))?;
    println!("      Loaded {} plots", layer.features.len());

    println!("\n[2/2] Generating grid points... [{:.2}s]", start_time.elapsed().as_secs_f64());
    let mut geojson = GeoJsonWriter::create(&io.output, layer.crs.as_ref())?;
    let mut dxf_writer = dxf.map(DxfWriter::new);
    let mut preview: Vec<Feature> = Vec::new();

    let summary = {
        let mut sinks: Vec<&mut dyn FeatureSink> = vec![&mut geojson];
        if let Some(writer) = dxf_writer.as_mut() {
            sinks.push(writer);
        }
        if svg.is_some() {
            sinks.push(&mut preview);
        }
        run_points(&layer, &io.id_field, n_points, clip, cancel, &mut Tee::new(sinks))?
    };

    println!("      Wrote {} points for {} plots", summary.points, summary.plots);
    println!("      GeoJSON: {}", io.output.display());
    if let Some(path) = dxf {
        println!("      DXF: {}", path.display());
    }

    if let Some(path) = svg {
        let points: Vec<Coord<f64>> = preview
            .iter()
            .filter_map(|f| match f.geometry {
                FeatureGeometry::Point(c) => Some(c),
                _ => None,
            })
            .collect();
        Preview {
            sources: Vec::new(),
            plots: layer.polygons().collect(),
            points,
        }
        .save(path)?;
        println!("      SVG: {}", path.display());
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
fn tune(
    input: &Path,
    id_field: &str,
    stats: &Path,
    tests: usize,
    fit: Fit,
    ranges: &TuningRanges,
    config: &PlotConfig,
    cancel: &CancelFlag,
) -> Result<()> {
    println!("Input:      {}", input.display());
    println!("Statistics: {}", stats.display());
    println!("Tests:      {}", tests);

    let layer = Layer::read(input).with_context(|| format!("Failed to load {}", input.display()))?;
    let seed = config.seed.unwrap_or_else(|| rand::rng().random());
    log::info!("tuning seed {seed}");
    let mut rng = Pcg64::seed_from_u64(seed);

    let rows = tuning::run_tuning(&layer, id_field, fit, config, ranges, tests, stats, cancel, &mut rng)?;
    if let Some(best) = rows
        .iter()
        .max_by(|a, b| a.avg_perc.total_cmp(&b.avg_perc))
    {
        println!(
            "\nBest mean overlap {:.2}% with iterations={}, translate={:.3}, alpha={:.2}, resize={:.3}",
            best.avg_perc, best.random_iterations, best.perc_translate, best.max_alpha, best.max_resize_perc
        );
    }
    Ok(())
}
