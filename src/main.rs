use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use clap::{Args, Parser, Subcommand};
use gamma_index::{
    DoseGrid, Execution, GammaConfig, GammaEngine, GammaMap, GammaSummary, GridLoader,
    Normalization,
};
use log::info;
use serde::Serialize;

#[derive(Parser, Debug)]
#[command(name = "gamma-index")]
#[command(about = "Gamma index comparison of a reference and a target dose distribution")]
struct Cli {
    #[command(subcommand)]
    input: Input,

    #[command(flatten)]
    options: Options,
}

#[derive(Subcommand, Debug)]
enum Input {
    /// Plain text doses: one value per line (1D) or whitespace rows (2D)
    Text {
        reference: PathBuf,
        target: PathBuf,

        /// Grid dimensionality (1 or 2)
        #[arg(long, default_value_t = 1)]
        dims: usize,

        /// Voxel spacing per axis in mm (comma-separated, axis 0 first)
        #[arg(long, value_delimiter = ',', required = true)]
        spacing: Vec<f32>,
    },
    /// DICOM RT Dose files
    Dicom { reference: PathBuf, target: PathBuf },
}

#[derive(Args, Debug)]
struct Options {
    /// JSON config file used as the base for the options below
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Dose criterion in percent
    #[arg(long, global = true)]
    dose_tolerance: Option<f32>,

    /// Distance criterion in mm
    #[arg(long, global = true)]
    distance_tolerance: Option<f32>,

    /// Low-dose cutoff as a fraction of the maximum reference dose
    #[arg(long, global = true)]
    cutoff: Option<f32>,

    /// Gamma ceiling, also scales the search radius
    #[arg(long, global = true)]
    limit: Option<f32>,

    /// Search step is the axis 0 spacing divided by this number
    #[arg(long, global = true)]
    subdivisions: Option<u32>,

    /// Use the local dose instead of the maximum dose for the dose criterion
    #[arg(long, global = true)]
    local: bool,

    /// Divide each grid by its own maximum before comparing
    #[arg(long, global = true)]
    normalize: bool,

    /// Stop searching a voxel once it passes (faster pass/fail)
    #[arg(long, global = true)]
    stop_at_pass: bool,

    /// Evaluate voxels on a single thread
    #[arg(long, global = true)]
    sequential: bool,

    /// Write one gamma value per line to this file
    #[arg(long, global = true)]
    gamma_out: Option<PathBuf>,

    /// Write the config and summary as JSON to this file
    #[arg(long, global = true)]
    json_out: Option<PathBuf>,
}

#[derive(Serialize)]
struct Report<'a> {
    config: &'a GammaConfig,
    max_dose: f32,
    summary: &'a GammaSummary,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(err) = run(Cli::parse()) {
        eprintln!("Error: {err}");
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), String> {
    let config = build_config(&cli.options)?;
    let (reference, target) = load_grids(&cli.input)?;
    info!(
        "Loaded {}D grids of shape {:?}, spacing {:?}",
        reference.dims(),
        reference.shape(),
        reference.spacing()
    );

    let engine = GammaEngine::new(reference, target, config).map_err(|e| e.to_string())?;
    info!(
        "Max reference dose {}, cutoff {}, {} search offsets",
        engine.max_dose(),
        engine.cutoff_dose(),
        engine.neighborhood().len()
    );

    let gamma = engine.run().map_err(|e| e.to_string())?;
    let summary = engine.summarize(&gamma);
    println!("{summary}");

    if let Some(path) = &cli.options.gamma_out {
        write_gamma(path, &gamma)?;
        info!("Gamma values written to {}", path.display());
    }
    if let Some(path) = &cli.options.json_out {
        let report = Report {
            config: engine.config(),
            max_dose: engine.max_dose(),
            summary: &summary,
        };
        let json = serde_json::to_string_pretty(&report)
            .map_err(|e| format!("Failed to serialize report: {e}"))?;
        fs::write(path, json)
            .map_err(|e| format!("Failed to write {}: {e}", path.display()))?;
        info!("Summary written to {}", path.display());
    }
    Ok(())
}

fn build_config(options: &Options) -> Result<GammaConfig, String> {
    let mut config = match &options.config {
        Some(path) => GammaConfig::load(path).map_err(|e| e.to_string())?,
        None => GammaConfig::default(),
    };

    if let Some(value) = options.dose_tolerance {
        config.dose_tolerance_percent = value;
    }
    if let Some(value) = options.distance_tolerance {
        config.distance_tolerance = value;
    }
    if let Some(value) = options.cutoff {
        config.cutoff_fraction = value;
    }
    if let Some(value) = options.limit {
        config.gamma_limit = value;
    }
    if options.subdivisions.is_some() {
        config.search_subdivisions = options.subdivisions;
    }
    if options.local {
        config.normalization = Normalization::Local;
    }
    if options.normalize {
        config.normalize_inputs = true;
    }
    if options.stop_at_pass {
        config.stop_at_pass = true;
    }
    if options.sequential {
        config.execution = Execution::Sequential;
    }

    config.validate().map_err(|e| e.to_string())?;
    Ok(config)
}

fn load_grids(input: &Input) -> Result<(DoseGrid, DoseGrid), String> {
    let loaded = match input {
        Input::Text {
            reference,
            target,
            dims,
            spacing,
        } => GridLoader::load_text(reference, *dims, spacing.clone()).and_then(|reference| {
            Ok((reference, GridLoader::load_text(target, *dims, spacing.clone())?))
        }),
        Input::Dicom { reference, target } => GridLoader::load_dicom(reference)
            .and_then(|reference| Ok((reference, GridLoader::load_dicom(target)?))),
    };
    loaded.map_err(|e| e.to_string())
}

fn write_gamma(path: &Path, gamma: &GammaMap) -> Result<(), String> {
    let file =
        File::create(path).map_err(|e| format!("Failed to create {}: {e}", path.display()))?;
    let mut writer = BufWriter::new(file);
    for value in gamma.values() {
        writeln!(writer, "{value}").map_err(|e| format!("Failed to write {}: {e}", path.display()))?;
    }
    writer
        .flush()
        .map_err(|e| format!("Failed to write {}: {e}", path.display()))
}
