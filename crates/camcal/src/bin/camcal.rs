use std::error::Error;
use std::path::{Path, PathBuf};

use camcal::chessboard::ChessboardSpec;
use camcal::core::ImageSize;
use camcal::pipeline::{calibrate_files, save_rgb, undistort_file, CalibrateConfig};
use clap::{Parser, Subcommand};

/// Chessboard camera calibration and lens-distortion correction.
#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// More log output (-v debug, -vv trace).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Emit tracing events as JSON (builds with the `tracing` feature).
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Solve intrinsics and distortion from chessboard photographs.
    Calibrate {
        /// Calibration photographs.
        #[arg(long, num_args = 1.., required = true)]
        images: Vec<PathBuf>,
        /// Inner corners per row.
        #[arg(long)]
        cols: usize,
        /// Inner corners per column.
        #[arg(long)]
        rows: usize,
        /// Square edge length in board units.
        #[arg(long, default_value_t = 1.0)]
        square_size: f64,
        /// JSON `CalibrateConfig` overriding detector and solver defaults.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Where `mtx.csv`, `dist.csv` and `report.json` are written.
        #[arg(long)]
        out_dir: PathBuf,
    },
    /// Remove lens distortion from one photograph.
    Undistort {
        /// Directory holding `mtx.csv` and `dist.csv`.
        #[arg(long)]
        params: PathBuf,
        #[arg(long)]
        input: PathBuf,
        /// Full-frame corrected output.
        #[arg(long)]
        corrected: PathBuf,
        /// Output cropped to the valid region.
        #[arg(long)]
        cropped: Option<PathBuf>,
        /// Resolution the parameters were solved at, `WIDTHxHEIGHT`.
        /// Defaults to the size in `report.json` next to the parameters.
        #[arg(long, value_parser = parse_size)]
        calib_size: Option<ImageSize>,
        /// JSON `CalibrateConfig`; only its `undistort` section is used.
        #[arg(long)]
        config: Option<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose, cli.log_json);
    if let Err(err) = run(cli.command) {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}

#[cfg(feature = "tracing")]
fn init_logging(verbose: u8, json: bool) {
    let _ = tracing_log::LogTracer::init();
    camcal::core::init_tracing(json, camcal::core::level_from_verbosity(verbose));
}

#[cfg(not(feature = "tracing"))]
fn init_logging(verbose: u8, _json: bool) {
    if let Err(err) = camcal::core::init_with_level(camcal::core::level_from_verbosity(verbose)) {
        eprintln!("warning: logger not installed: {err}");
    }
}

/// `WIDTHxHEIGHT`, e.g. `4032x2268`.
fn parse_size(s: &str) -> Result<ImageSize, String> {
    let (w, h) = s
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WIDTHxHEIGHT, got {s:?}"))?;
    let parse = |v: &str| {
        v.trim()
            .parse::<usize>()
            .ok()
            .filter(|&n| n > 0)
            .ok_or_else(|| format!("invalid dimension {v:?} in {s:?}"))
    };
    Ok(ImageSize::new(parse(w)?, parse(h)?))
}

fn load_config(path: Option<&Path>) -> Result<CalibrateConfig, Box<dyn Error>> {
    Ok(match path {
        Some(p) => CalibrateConfig::from_json_file(p)?,
        None => CalibrateConfig::default(),
    })
}

fn run(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Calibrate {
            images,
            cols,
            rows,
            square_size,
            config,
            out_dir,
        } => {
            let config = load_config(config.as_deref())?;
            let spec = ChessboardSpec::new(cols, rows)?.with_square_size(square_size)?;
            let report = calibrate_files(&images, spec, &config)?;
            camcal::io::save_parameters(&out_dir, &report.parameters)?;
            camcal::io::save_report(&out_dir, &report)?;
            println!(
                "rms {:.4} px, mean {:.4} px over {} views",
                report.rms_error,
                report.mean_error,
                report.per_view_errors.len()
            );
        }
        Command::Undistort {
            params,
            input,
            corrected,
            cropped,
            calib_size,
            config,
        } => {
            let config = load_config(config.as_deref())?;
            let result = undistort_file(&input, &params, calib_size, &config.undistort)?;
            let roi = result.roi;
            save_rgb(&corrected, result.corrected)?;
            if let Some(path) = cropped {
                if roi.is_empty() {
                    log::warn!("valid region is empty, {} not written", path.display());
                } else {
                    save_rgb(&path, result.cropped)?;
                }
            }
            println!("roi {} {} {} {}", roi.x, roi.y, roi.width, roi.height);
        }
    }
    Ok(())
}
