use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;

use anyhow::{bail, Context};
use clap::Parser;
use log::{error, info};
use rayon::prelude::*;

use contact_angle_rust_lib::image_io::get_image_files_in_dir;
use contact_angle_rust_lib::output::MeasurementOutcome;
use contact_angle_rust_lib::{
    load_image, measure_image, render_overlay, save_image, write_result_json, write_summary_csv,
    Config, MeasurementRecord,
};

/// Command-line arguments
#[derive(Parser, Debug)]
#[clap(author, version, about = "Automatic sessile-drop contact angle measurement")]
struct Args {
    /// Path to input image or directory
    #[clap(short, long)]
    input: String,

    /// Path to output directory
    #[clap(short, long, default_value = "results")]
    output: String,

    /// Path to configuration file (defaults are used when omitted)
    #[clap(short, long)]
    config: Option<String>,

    /// RANSAC seed (overrides config)
    #[clap(short, long)]
    seed: Option<u64>,

    /// Save an annotated PNG next to each result
    #[clap(long)]
    overlay: bool,

    /// Verbose logging and intermediate diagnostics in the JSON output
    #[clap(short, long)]
    debug: bool,

    /// Measure directory inputs in parallel
    #[clap(short, long)]
    parallel: bool,
}

fn measure_file(path: &Path, config: &Config, output_dir: &Path, overlay: bool) -> MeasurementRecord {
    let fallback_name = path.display().to_string();
    let input = match load_image(path) {
        Ok(input) => input,
        Err(e) => {
            error!("{}: {}", fallback_name, e);
            return MeasurementRecord::new(fallback_name, Err(e));
        }
    };

    info!("Processing: {}", path.display());
    let outcome = measure_image(&input.image, config).and_then(|result| {
        write_result_json(&result, output_dir, &input.filename)?;
        if overlay {
            let annotated = render_overlay(&input.image, &result);
            save_image(&annotated, output_dir.join("overlay").join(format!("{}.png", input.filename)))?;
        }
        Ok(result)
    });

    match &outcome {
        Ok(result) => info!(
            "{}: left {:.2}°, right {:.2}°, mean {:.2}° ({:?})",
            input.filename,
            result.left_angle_deg,
            result.right_angle_deg,
            result.mean_angle_deg,
            result.confidence_label
        ),
        Err(e) => error!("{}: {:?}: {}", input.filename, e.kind(), e),
    }
    MeasurementRecord::new(input.filename, outcome)
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let default_filter = if args.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter)).init();

    let mut config = match &args.config {
        Some(path) => Config::from_file(path).with_context(|| format!("loading config {}", path))?,
        None => Config::default(),
    };
    if let Some(seed) = args.seed {
        config.seed = seed;
    }
    if args.debug {
        config.collect_debug = true;
    }
    config.validate()?;

    let start_time = Instant::now();

    let output_dir = PathBuf::from(&args.output);
    fs::create_dir_all(&output_dir)
        .with_context(|| format!("creating output directory {}", output_dir.display()))?;

    let input_path = PathBuf::from(&args.input);
    let files = if input_path.is_file() {
        vec![input_path]
    } else if input_path.is_dir() {
        let files = get_image_files_in_dir(&input_path)?;
        info!("Found {} image files in {}", files.len(), input_path.display());
        files
    } else {
        bail!("input path {} does not exist", input_path.display());
    };

    let records: Vec<MeasurementRecord> = if args.parallel {
        files
            .par_iter()
            .map(|path| measure_file(path, &config, &output_dir, args.overlay))
            .collect()
    } else {
        files
            .iter()
            .map(|path| measure_file(path, &config, &output_dir, args.overlay))
            .collect()
    };

    let summary_path = output_dir.join("summary.csv");
    write_summary_csv(&records, &summary_path)
        .with_context(|| format!("writing {}", summary_path.display()))?;

    let failed = records
        .iter()
        .filter(|r| matches!(r.outcome, MeasurementOutcome::Failed(_)))
        .count();
    info!(
        "Measured {} of {} images in {:.2} seconds",
        records.len() - failed,
        records.len(),
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}
