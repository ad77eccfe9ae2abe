use std::{error::Error, path::Path};

use clap::Parser;
use tubecal::{io, CalibrationInput, CalibrationParams, TubeCalibrator};

/// Strip-scan position calibration of a detector bank.
#[derive(Debug, Parser)]
#[command(author, version, about = "Calibrate detector tube positions from strip scans")]
struct Args {
    /// Path to JSON file containing the bank geometry and strip measurements.
    #[arg(long)]
    input: String,

    /// Optional path to JSON calibration parameters. Defaults are used if omitted.
    #[arg(long)]
    config: Option<String>,

    /// Write per-tube diagnostics to this JSON file.
    #[arg(long)]
    diagnostics: Option<String>,

    /// Log level (off, error, warn, info, debug, trace).
    #[arg(long, default_value = "warn")]
    log_level: String,

    /// Emit structured JSON logs (requires the `tracing` feature).
    #[arg(long)]
    json_log: bool,
}

#[cfg(feature = "tracing")]
fn init_json_logging() -> Result<(), Box<dyn Error>> {
    tubecal::core::init_tracing(true);
    Ok(())
}

#[cfg(not(feature = "tracing"))]
fn init_json_logging() -> Result<(), Box<dyn Error>> {
    Err("--json-log needs a build with the `tracing` feature".into())
}

fn init_logging(args: &Args) -> Result<(), Box<dyn Error>> {
    if args.json_log {
        return init_json_logging();
    }
    tubecal::core::init_with_level(tubecal::core::parse_level(&args.log_level))?;
    Ok(())
}

fn run_from_files(
    input_path: &str,
    config_path: Option<&str>,
    diagnostics_path: Option<&str>,
) -> Result<String, Box<dyn Error>> {
    let mut input = CalibrationInput::load_json(input_path)?;
    let params = match config_path {
        Some(path) => CalibrationParams::load_json(path)?,
        None => CalibrationParams::default(),
    };

    let result = TubeCalibrator::new(params).calibrate(&mut input.bank, &input.measurements)?;
    if let Some(path) = diagnostics_path {
        io::write_json(&result.diagnostics, Path::new(path))?;
    }
    Ok(serde_json::to_string_pretty(&result.summary())?)
}

fn main() {
    if let Err(err) = try_main() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

fn try_main() -> Result<(), Box<dyn Error>> {
    let args = Args::parse();
    init_logging(&args)?;
    let json = run_from_files(
        &args.input,
        args.config.as_deref(),
        args.diagnostics.as_deref(),
    )?;
    println!("{json}");
    Ok(())
}
