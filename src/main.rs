//! mrc-pyramid - Convert stitched EM montages into calibrated pyramids.
//!
//! This binary parses the command line and runs the batch converter or the
//! OME-TIFF inspector.

use clap::Parser;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mrc_pyramid::{
    config::{Cli, Command, ConvertConfig, InspectConfig},
    inspect_ome_tiff, BatchRunner, InspectReport, TracingSink,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Convert(config) => run_convert(config).await,
        Command::Inspect(config) => run_inspect(config).await,
    }
}

// =============================================================================
// Convert Command
// =============================================================================

async fn run_convert(config: ConvertConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let options = config.to_options();
    info!("Configuration:");
    info!("  Folder: {}", config.folder.display());
    info!("  Recursive: {}", config.is_recursive());
    info!(
        "  Pyramid: min size {}, {}px tiles, {:?}",
        options.min_size, options.ome.tile_size, options.ome.compression
    );
    info!(
        "  Large images (> {} px): {}",
        options.large_threshold,
        if options.create_h5 {
            "HDF5 + BDV XML".to_string()
        } else {
            format!("reduced OME-TIFF (<= {} px)", options.reduction_target)
        }
    );
    info!(
        "  Stitcher: {} / {}",
        config.extractpieces.display(),
        config.blendmont.display()
    );
    if options.keep_intermediates {
        warn!("  Intermediates will be kept");
    }

    let runner = BatchRunner::new(
        Arc::new(config.stitcher()),
        options,
        Arc::new(TracingSink),
    );

    let summary = match runner.run_folder(&config.folder, config.is_recursive()).await {
        Ok(summary) => summary,
        Err(e) => {
            error!("{}", e);
            return ExitCode::FAILURE;
        }
    };

    if summary.total == 0 {
        warn!("No .mrc files found in {}", config.folder.display());
    }
    for failure in &summary.failures {
        error!("  {}: {}", failure.path.display(), failure.message);
    }

    if let Some(ref path) = config.summary_json {
        match summary.write_json(path) {
            Ok(()) => info!("Summary written to {}", path.display()),
            Err(e) => {
                error!("Failed to write summary: {}", e);
                return ExitCode::FAILURE;
            }
        }
    }

    if summary.is_success() {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "mrc_pyramid=debug"
    } else {
        "mrc_pyramid=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

// =============================================================================
// Inspect Command
// =============================================================================

async fn run_inspect(config: InspectConfig) -> ExitCode {
    if config.verbose {
        init_logging(true);
    }

    if let Err(e) = config.validate() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    let report = match inspect_ome_tiff(&config.file).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}: {}", config.file.display(), e);
            return ExitCode::FAILURE;
        }
    };

    if config.json {
        match serde_json::to_string_pretty(&report) {
            Ok(json) => println!("{}", json),
            Err(e) => {
                eprintln!("Error: {}", e);
                return ExitCode::FAILURE;
            }
        }
    } else {
        print_report(&report);
    }

    if report.is_valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

fn print_report(report: &InspectReport) {
    println!("{}", report.path.display());
    println!("═════════════════════════════════");
    println!(
        "  Size: {:.2} MB ({})",
        report.bytes as f64 / (1024.0 * 1024.0),
        if report.big_tiff { "BigTIFF" } else { "TIFF" }
    );
    if let Some(ref software) = report.software {
        println!("  Software: {}", software);
    }
    if let Some(ref name) = report.image_name {
        println!("  Image: {}", name);
    }
    match (report.physical_size_x, report.physical_size_y) {
        (Some(x), Some(y)) => println!(
            "  Pixel size: {} x {} {}",
            x,
            y,
            report.physical_size_unit.as_deref().unwrap_or("")
        ),
        _ => println!("  Pixel size: (not recorded)"),
    }

    println!();
    println!("  Level  Width x Height   Tile      Type     Compression  Downsample");
    println!("  ─────────────────────────────────────────────────────────────────");
    for level in &report.levels {
        println!(
            "  {:<6} {:>7} x {:<7} {:>3}x{:<5} {:<8} {:<12} {:.2}",
            level.index,
            level.width,
            level.height,
            level.tile_width,
            level.tile_height,
            level.pixel_type.unwrap_or("?"),
            level.compression,
            level.downsample
        );
    }

    println!();
    for warning in &report.warnings {
        println!("⚠ {}", warning);
    }
    if report.is_valid {
        println!("✓ Valid pyramid");
    } else {
        for error in &report.errors {
            println!("✗ {}", error);
        }
    }
}
