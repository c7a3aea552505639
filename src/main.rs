use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use log::info;

use montage::compositor::compose;
use montage::error_codes::{find_coded_error, ErrorEnvelope, ErrorEnvelopeBody};
use montage::fonts::{FontResolver, SystemFonts, TrueTypeFace};
use montage::grid::plan_grid;
use montage::manifest::load_and_validate_manifest;
use montage::overlay::apply_overlay;
use montage::schema::Manifest;
use montage::selection::compute_selection;
use montage::source;
use montage::writer::write_montage;

const GIT_HASH: Option<&str> = option_env!("MONTAGE_GIT_HASH");

#[derive(Debug, Parser)]
#[command(name = "montage")]
#[command(about = "Montage compiler: image sequences to one grid image")]
#[command(version, long_version = long_version())]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Print failures as a machine-readable JSON envelope on stderr.
    #[arg(long, value_enum, default_value_t = ErrorFormat::Text, global = true)]
    error_format: ErrorFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum ErrorFormat {
    Text,
    Json,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compose the montage described by a manifest.
    Build {
        manifest: PathBuf,
        /// Output file; overrides the manifest's `output`.
        #[arg(short = 'o', long = "output")]
        output: Option<PathBuf>,
    },
    /// Validate a manifest and report what would be composed.
    Check { manifest: PathBuf },
}

fn long_version() -> String {
    match GIT_HASH {
        Some(hash) => format!("{} ({hash})", env!("CARGO_PKG_VERSION")),
        None => env!("CARGO_PKG_VERSION").to_owned(),
    }
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();

    let result = match &cli.command {
        Commands::Build { manifest, output } => run_build(manifest, output.as_deref()),
        Commands::Check { manifest } => run_check(manifest),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            report_failure(&error, cli.error_format);
            ExitCode::FAILURE
        }
    }
}

fn report_failure(error: &anyhow::Error, format: ErrorFormat) {
    match format {
        ErrorFormat::Text => eprintln!("error: {error:#}"),
        ErrorFormat::Json => {
            let envelope = match find_coded_error(error) {
                Some(coded) => coded.envelope(),
                None => ErrorEnvelope {
                    ok: false,
                    error: ErrorEnvelopeBody {
                        code: "UNEXPECTED".to_owned(),
                        message: format!("{error:#}"),
                    },
                },
            };
            match serde_json::to_string(&envelope) {
                Ok(json) => eprintln!("{json}"),
                Err(_) => eprintln!("error: {error:#}"),
            }
        }
    }
}

fn run_check(manifest_path: &Path) -> Result<()> {
    let manifest = load_and_validate_manifest(manifest_path)?;
    let sequence = source::load(&manifest.source)?;
    let selection = selection_of(&manifest, sequence.len());
    let layout = plan_grid(
        selection.len(),
        sequence.height(),
        sequence.width(),
        manifest.grid.columns,
        manifest.grid.rows,
        manifest.grid.margin,
        manifest.grid.black_margin,
    )?;

    println!(
        "OK: {} ({} frames, {}x{} {}, {} selected)",
        manifest_path.display(),
        sequence.len(),
        sequence.width(),
        sequence.height(),
        sequence.kind().label(),
        selection.len()
    );
    println!(
        "Grid: {} rows x {} columns, canvas {}x{}",
        layout.rows, layout.columns, layout.canvas_width, layout.canvas_height
    );
    Ok(())
}

fn run_build(manifest_path: &Path, output_override: Option<&Path>) -> Result<()> {
    let manifest = load_and_validate_manifest(manifest_path)?;
    let output = output_override
        .map(Path::to_path_buf)
        .or_else(|| manifest.output.clone())
        .context("no output path: pass --output or set `output` in the manifest")?;

    let mut sequence = source::load(&manifest.source)?;
    if let Some(factor) = manifest.scale {
        sequence.scale_intensity(factor);
    }
    sequence.set_time_scale(manifest.time.scale, &manifest.time.unit);

    let selection = selection_of(&manifest, sequence.len());
    info!("selected {} of {} frames", selection.len(), sequence.len());

    if let Some(overlay) = &manifest.overlay {
        let font_path = SystemFonts::new().resolve(&overlay.font)?;
        let mut face = TrueTypeFace::load(&font_path)?;
        apply_overlay(&mut sequence, &selection, &mut face, overlay)?;
    }

    let layout = plan_grid(
        selection.len(),
        sequence.height(),
        sequence.width(),
        manifest.grid.columns,
        manifest.grid.rows,
        manifest.grid.margin,
        manifest.grid.black_margin,
    )?;
    let canvas = compose(&layout, &sequence, &selection)?;
    write_montage(&canvas, &output)?;

    println!("Wrote {}", output.display());
    Ok(())
}

fn selection_of(manifest: &Manifest, total_frames: usize) -> Vec<usize> {
    compute_selection(
        total_frames,
        manifest.selection.begin,
        manifest.selection.end,
        manifest.selection.skip,
        manifest.selection.max_frames,
    )
}
