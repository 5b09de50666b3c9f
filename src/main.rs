//! maskcell - merge per-slice organelle masks inside a whole-cell model
//!
//! ```text
//! maskcell [OPTIONS] <VOLUME> <MODEL> <SEGMENTATION_DIR>
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{ArgAction, CommandFactory, Parser};
use tracing_subscriber::EnvFilter;

use maskcellrs::{run_mask_whole_cell, Color, PipelineError, PipelineInputs, PipelineOptions};

#[derive(Parser, Debug)]
#[command(name = "maskcell", version)]
#[command(
    about = "Intersect per-slice organelle segmentations with a whole-cell model and mesh the result",
    long_about = None
)]
struct Cli {
    /// Volume (MRC) file the boundary model was drawn on
    volume: PathBuf,

    /// Whole-cell boundary model
    model: PathBuf,

    /// Directory with one organelle mask per slice; file names sort in slice order
    segmentation_dir: PathBuf,

    /// Point reduction during contour tracing, 0-1 (1 removes every point)
    #[arg(short = 'R', long = "reduction", value_name = "VALUE")]
    point_reduction: Option<f64>,

    /// Passes through empty slices during meshing (default 0)
    #[arg(short = 'P', long = "passes", value_name = "VALUE")]
    passes: Option<u32>,

    /// Output object color R,G,B with each channel 0-1; automatic colors if omitted
    #[arg(long, value_name = "R,G,B")]
    color: Option<Color>,

    /// Output object name; nameless if omitted
    #[arg(long, value_name = "STRING")]
    name: Option<String>,

    /// Remove objects with this many contours or fewer (default 2)
    #[arg(long, value_name = "VALUE")]
    rmbycont: Option<u32>,

    /// Output directory (default: current directory)
    #[arg(long, value_name = "PATH")]
    output: Option<PathBuf>,

    /// Interpolate missing contours across skipped slices
    #[arg(long)]
    fill: bool,

    /// Largest number of skipped slices that gap filling bridges (default 10)
    #[arg(long = "fill-skip", value_name = "VALUE")]
    fill_skip: Option<u32>,

    /// Kill any external tool that runs longer than this
    #[arg(long, value_name = "SECONDS")]
    timeout: Option<u64>,

    /// Remove the tmp workspace after a successful run
    #[arg(long)]
    cleanup: bool,

    /// TOML file with default options; flags given here take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Write a JSON run report
    #[arg(long, value_name = "FILE")]
    report: Option<PathBuf>,

    /// More logging (-v debug, -vv trace); RUST_LOG overrides
    #[arg(short, long, action = ArgAction::Count)]
    verbose: u8,
}

impl Cli {
    fn options(&self) -> Result<PipelineOptions> {
        let mut opts = match &self.config {
            Some(path) => PipelineOptions::from_toml_file(path)?,
            None => PipelineOptions::default(),
        };
        if let Some(r) = self.point_reduction {
            opts.point_reduction = r;
        }
        if let Some(p) = self.passes {
            opts.mesh_passes = p;
        }
        if self.color.is_some() {
            opts.color = self.color;
        }
        if self.name.is_some() {
            opts.name = self.name.clone();
        }
        if let Some(n) = self.rmbycont {
            opts.rm_by_contours = n;
        }
        if self.output.is_some() {
            opts.output_dir = self.output.clone();
        }
        if self.fill {
            opts.fill_gaps = true;
        }
        if let Some(k) = self.fill_skip {
            opts.fill_skip = k;
        }
        if self.timeout.is_some() {
            opts.tool_timeout_secs = self.timeout;
        }
        if self.cleanup {
            opts.cleanup = true;
        }
        Ok(opts)
    }

    fn inputs(&self) -> PipelineInputs {
        PipelineInputs {
            volume: self.volume.clone(),
            boundary_model: self.model.clone(),
            segmentation_dir: self.segmentation_dir.clone(),
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn run(cli: &Cli) -> Result<()> {
    let options = cli.options()?;
    let report = run_mask_whole_cell(&cli.inputs(), &options)?;

    println!("Final model: {}", report.final_model.display());
    println!(
        "Contours: {} accumulated, {} objects / {} contours before pruning, {} objects / {} contours after",
        report.total_contours,
        report.before_prune.objects.len(),
        report.before_prune.total_contours(),
        report.after_prune.objects.len(),
        report.after_prune.total_contours()
    );
    if !report.warnings.is_empty() {
        println!("{} warning(s) were raised", report.warnings.len());
    }
    if let Some(path) = &cli.report {
        report.write_json(path)?;
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!();
            eprintln!("ERROR: {:#}", e);
            eprintln!();
            let usage = e
                .downcast_ref::<PipelineError>()
                .map(PipelineError::is_usage)
                .unwrap_or(false);
            let mut cmd = Cli::command();
            if usage {
                eprintln!("{}", cmd.render_help());
            } else {
                eprintln!("{}", cmd.render_usage());
            }
            ExitCode::FAILURE
        }
    }
}
