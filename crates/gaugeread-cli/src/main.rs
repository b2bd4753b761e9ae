//! gaugeread CLI: read analog gauges from images.

use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use gaugeread::geometry::{degrees_to_hours, parse_clock_degrees, to_clock_convention};
use gaugeread::{
    AnalogGaugeProcessor, CropRect, DebugSink, DirectoryDebugSink, FileImageSource,
    GaugeCalibration, ImageSource, OutOfRangePolicy, ProcessorConfig, ReferenceVector,
    SyntheticGauge,
};

type CliError = Box<dyn std::error::Error>;
type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "gaugeread")]
#[command(about = "Read the value of an analog needle gauge from a photo")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Read one gauge image.
    Read(CliReadArgs),

    /// Print the math/clock angle conversion table.
    Angles,

    /// Evaluate a reference-vector JSON file.
    Vectors(CliVectorsArgs),

    /// Render a synthetic gauge image.
    Synth(CliSynthArgs),
}

#[derive(Debug, Clone, Args)]
struct CliReadArgs {
    /// Path to the input image.
    #[arg(long)]
    image: PathBuf,

    /// Calibration JSON file; individual flags below override it.
    #[arg(long)]
    calibration: Option<PathBuf>,

    /// Clock position of the minimum value (e.g. 7, 7:30, 210deg).
    #[arg(long)]
    min_angle: Option<String>,

    /// Clock position of the maximum value.
    #[arg(long)]
    max_angle: Option<String>,

    #[arg(long)]
    min_value: Option<f64>,

    #[arg(long)]
    max_value: Option<f64>,

    #[arg(long)]
    units: Option<String>,

    /// Processor configuration JSON file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Crop rectangle applied before detection: x,y,width,height.
    #[arg(long)]
    crop: Option<String>,

    /// Histogram-equalize the grayscale image.
    #[arg(long)]
    equalize: bool,

    /// Override the "too bright" needle score threshold.
    #[arg(long)]
    too_bright: Option<f32>,

    /// Clamp readings in the dead sector to the nearer end of the scale.
    #[arg(long)]
    clamp: bool,

    /// Directory for debug images (grayscale, cropped, overlay).
    #[arg(long)]
    debug_dir: Option<PathBuf>,

    /// Sensor name used to prefix debug image files.
    #[arg(long, default_value = "gauge")]
    sensor_name: String,

    /// Path to write a versioned debug dump (JSON).
    #[arg(long)]
    debug_json: Option<PathBuf>,

    /// Path to write the reading (JSON). Printed to stdout when omitted.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct CliVectorsArgs {
    /// JSON array of reference vectors.
    #[arg(long)]
    file: PathBuf,

    /// Directory holding the images (defaults to the vector file's directory).
    #[arg(long)]
    images: Option<PathBuf>,

    /// Processor configuration JSON file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Only check the vectors for labelling mistakes.
    #[arg(long)]
    validate_only: bool,

    /// Path to write the full report (JSON).
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Debug, Clone, Args)]
struct CliSynthArgs {
    /// Output image path (PNG).
    #[arg(long)]
    out: PathBuf,

    #[arg(long, default_value = "300")]
    width: u32,

    #[arg(long, default_value = "300")]
    height: u32,

    /// Face center x (defaults to the image center).
    #[arg(long)]
    cx: Option<f32>,

    /// Face center y (defaults to the image center).
    #[arg(long)]
    cy: Option<f32>,

    /// Face radius in pixels (defaults to 40% of the smaller dimension).
    #[arg(long)]
    radius: Option<f32>,

    /// Needle angle, math convention (0° = 3 o'clock, counter-clockwise).
    #[arg(long, default_value = "90.0")]
    angle: f64,

    /// Gaussian noise sigma.
    #[arg(long, default_value = "0.0")]
    noise: f64,

    #[arg(long, default_value = "7")]
    seed: u64,
}

fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Read(args) => run_read(&args),
        Commands::Angles => run_angles(),
        Commands::Vectors(args) => run_vectors(&args),
        Commands::Synth(args) => run_synth(&args),
    }
}

// ── read ───────────────────────────────────────────────────────────────

fn clock_hours(s: &str) -> CliResult<f64> {
    Ok(degrees_to_hours(parse_clock_degrees(s)?))
}

fn build_calibration(args: &CliReadArgs) -> CliResult<GaugeCalibration> {
    let base = match &args.calibration {
        Some(path) => GaugeCalibration::from_json_file(path)?,
        None => GaugeCalibration::default(),
    };
    let min_hours = match &args.min_angle {
        Some(s) => clock_hours(s)?,
        None => base.min_angle_hours(),
    };
    let max_hours = match &args.max_angle {
        Some(s) => clock_hours(s)?,
        None => base.max_angle_hours(),
    };
    Ok(GaugeCalibration::new(
        min_hours,
        max_hours,
        args.min_value.unwrap_or(base.min_value()),
        args.max_value.unwrap_or(base.max_value()),
        args.units.clone().unwrap_or_else(|| base.units().to_string()),
    )?)
}

fn build_config(path: Option<&Path>) -> CliResult<ProcessorConfig> {
    match path {
        Some(p) => ProcessorConfig::from_json_file(p),
        None => Ok(ProcessorConfig::default()),
    }
}

fn run_read(args: &CliReadArgs) -> CliResult<()> {
    let calibration = build_calibration(args)?;
    let mut config = build_config(args.config.as_deref())?;
    if let Some(crop) = &args.crop {
        let rect = CropRect::parse(crop)
            .ok_or_else(|| format!("invalid --crop {crop:?}; expected x,y,width,height"))?;
        config.crop = Some(rect);
    }
    if args.equalize {
        config.preprocess.equalize_histogram = true;
    }
    if let Some(t) = args.too_bright {
        config.needle.too_bright_score = t;
    }
    if args.clamp {
        config.out_of_range = OutOfRangePolicy::Clamp;
    }
    if args.debug_dir.is_some() {
        config.diagnostics_enabled = true;
    }

    let source = FileImageSource::new(&args.image);
    tracing::info!("Loading image: {}", source.describe());
    let image = source.acquire()?;
    tracing::info!("Image size: {}x{}", image.width(), image.height());

    let mut dir_sink = args.debug_dir.as_ref().map(|dir| {
        let label = args
            .image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        DirectoryDebugSink::new(dir, &args.sensor_name).with_label(&label)
    });
    let sink = dir_sink.as_mut().map(|s| s as &mut dyn DebugSink);

    let processor = AnalogGaugeProcessor::new(config);
    let (result, mut dump) = processor.process_with_dump(&image, &calibration, sink);
    dump.image.source = Some(args.image.display().to_string());
    if let Some(path) = &args.debug_json {
        dump.write_json(path)?;
        tracing::info!("Debug dump written to {}", path.display());
    }

    let reading = result?;
    let json = serde_json::to_string_pretty(&reading)?;
    match &args.out {
        Some(path) => {
            std::fs::write(path, json)?;
            tracing::info!("Reading written to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

// ── angles ─────────────────────────────────────────────────────────────

fn run_angles() -> CliResult<()> {
    println!("math°   clock°  clock position");
    for step in 0..12 {
        let math = step as f64 * 30.0;
        let clock = to_clock_convention(math);
        let hour = degrees_to_hours(clock);
        let label = if hour == 0.0 { 12.0 } else { hour };
        println!("{math:>5.0}   {clock:>6.0}  {label:>2.0} o'clock");
    }

    println!();
    println!("common calibrations (value at 12 o'clock on a 0..100 scale)");
    for (min_h, max_h) in [(7.0, 5.0), (8.0, 4.0), (9.0, 3.0), (10.0, 2.0)] {
        let Ok(cal) = GaugeCalibration::new(min_h, max_h, 0.0, 100.0, "") else {
            continue;
        };
        let mid = gaugeread::map_angle(90.0, &cal, OutOfRangePolicy::Report)?;
        println!(
            "  {:>4.1}h → {:>4.1}h  sweep {:>5.1}°  12 o'clock = {:.1}",
            min_h,
            max_h,
            cal.sweep_degrees(),
            mid.value
        );
    }
    Ok(())
}

// ── vectors ────────────────────────────────────────────────────────────

fn run_vectors(args: &CliVectorsArgs) -> CliResult<()> {
    let vectors = ReferenceVector::load_all(&args.file)?;
    tracing::info!("Loaded {} reference vectors from {}", vectors.len(), args.file.display());

    let mut invalid = 0usize;
    for v in &vectors {
        let problems = v.validate();
        if !problems.is_empty() {
            invalid += 1;
            for p in problems {
                tracing::warn!("{}: {}", v.file, p);
            }
        }
    }
    if args.validate_only {
        println!("{} of {} vectors valid", vectors.len() - invalid, vectors.len());
        return if invalid == 0 {
            Ok(())
        } else {
            Err(format!("{invalid} invalid vectors").into())
        };
    }

    let dir = match &args.images {
        Some(d) => d.clone(),
        None => args
            .file
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from(".")),
    };
    let processor = AnalogGaugeProcessor::new(build_config(args.config.as_deref())?);
    let report = gaugeread::evaluate_vectors(&dir, &vectors, &processor);

    for o in &report.outcomes {
        let status = if o.passed {
            "PASS"
        } else if o.error.is_some() {
            "ERROR"
        } else {
            "FAIL"
        };
        match (o.detected_value, &o.error) {
            (Some(v), _) => println!(
                "{status:<5} {}  detected {:.3}  expected {:.3}  error {:.3}",
                o.file,
                v,
                o.expected_value,
                o.value_error.unwrap_or(f64::NAN)
            ),
            (None, Some(e)) => println!("{status:<5} {}  {}", o.file, e),
            (None, None) => println!("{status:<5} {}", o.file),
        }
    }
    let s = &report.summary;
    println!(
        "\n{} total, {} passed, {} failed, {} errored",
        s.total, s.passed, s.failed, s.errored
    );
    if let (Some(mean), Some(max)) = (s.mean_value_error, s.max_value_error) {
        println!("mean value error {mean:.3}, max {max:.3}");
    }

    if let Some(path) = &args.out {
        std::fs::write(path, serde_json::to_string_pretty(&report)?)?;
        tracing::info!("Report written to {}", path.display());
    }
    if s.passed == s.total {
        Ok(())
    } else {
        Err(format!("{} of {} vectors did not pass", s.total - s.passed, s.total).into())
    }
}

// ── synth ──────────────────────────────────────────────────────────────

fn run_synth(args: &CliSynthArgs) -> CliResult<()> {
    let min_dim = args.width.min(args.height) as f32;
    let gauge = SyntheticGauge {
        width: args.width,
        height: args.height,
        center: [
            args.cx.unwrap_or(args.width as f32 / 2.0),
            args.cy.unwrap_or(args.height as f32 / 2.0),
        ],
        radius: args.radius.unwrap_or(0.4 * min_dim),
        needle_math_deg: args.angle,
        noise_sigma: args.noise,
        seed: args.seed,
        ..SyntheticGauge::default()
    };
    gauge.render().save(&args.out)?;
    tracing::info!(
        "Synthetic gauge written to {} (needle {:.1}° math, {:.1}° clock)",
        args.out.display(),
        args.angle,
        to_clock_convention(args.angle)
    );
    Ok(())
}
