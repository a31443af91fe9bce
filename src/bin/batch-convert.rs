//! CLI binary for batch-convert.
//!
//! A thin shim over the library crate: reads the given files into a
//! `Session`, runs one batch, and saves the download into a directory.

use anyhow::{bail, Context, Result};
use batch_convert::{
    upload, BatchConfig, BatchOrchestrator, BatchProgressCallback, BatchReport, DirectorySink,
    ObjectUrls, ProgressCallback, Session, ENGINE_LIB_ENV,
};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers ──────────────────────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Live progress bar with one log line per record. Records may finish out of
/// order; the bar only counts.
struct CliProgressCallback {
    bar: ProgressBar,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"]);
        bar.set_style(style);
        bar.set_prefix("Starting");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self { bar })
    }

    /// Clear the bar when the batch fails before `on_batch_complete`.
    fn abandon(&self) {
        if !self.bar.is_finished() {
            self.bar.finish_and_clear();
        }
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total: usize) {
        self.bar.set_length(total as u64);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    fn on_record_start(&self, _index: usize, _total: usize, name: &str) {
        self.bar.set_message(name.to_string());
    }

    fn on_record_converted(&self, index: usize, total: usize, name: &str, size: usize) {
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            green("✓"),
            index + 1,
            total,
            name,
            dim(&format!("{size} bytes")),
        ));
        self.bar.inc(1);
    }

    fn on_record_passthrough(&self, index: usize, total: usize, name: &str, error: &str) {
        let msg = if error.chars().count() > 80 {
            let cut: String = error.chars().take(79).collect();
            format!("{cut}\u{2026}")
        } else {
            error.to_string()
        };
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}",
            red("✗"),
            index + 1,
            total,
            name,
            red(&msg),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total: usize, converted: usize) {
        self.bar.finish_and_clear();
        let failed = total.saturating_sub(converted);
        if failed == 0 {
            eprintln!("{} {} files converted", green("✔"), bold(&converted.to_string()));
        } else {
            eprintln!(
                "{} {}/{} files converted  ({} kept unchanged)",
                if converted == 0 { red("✘") } else { cyan("⚠") },
                bold(&converted.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Convert a folder of photos to WebP
  batch-convert --format webp photos/*.jpg -o out/

  # A single file downloads directly
  batch-convert --format png scan.pdf

  # Machine-readable report
  batch-convert --format jpeg --json a.png b.gif > report.json

ACCEPTED INPUTS:
  png, jpeg, gif, tiff, webp, bmp, avif, pdf (first page)
  Other files are skipped.

OUTPUT FORMATS:
  png, jpeg (jpg), gif, tiff (tif), webp, bmp, avif

  Two or more inputs are bundled as converted_files.zip. Files that cannot
  be converted are left out of the archive and reported.

ENVIRONMENT VARIABLES:
  BATCH_CONVERT_FORMAT    Default output format
  BATCH_CONVERT_OUTPUT    Default output directory
  PDFIUM_LIB_PATH         Path to libpdfium, needed for PDF inputs
"#;

/// Convert a batch of images and PDFs to one image format.
#[derive(Parser, Debug)]
#[command(
    name = "batch-convert",
    version,
    about = "Convert a batch of images and PDFs to one image format",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Input files.
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Target format: png, jpeg, gif, tiff, webp, bmp, avif.
    #[arg(short, long, env = "BATCH_CONVERT_FORMAT")]
    format: String,

    /// Directory to save the download into.
    #[arg(short, long, env = "BATCH_CONVERT_OUTPUT", default_value = ".")]
    output: PathBuf,

    /// Path to the pdfium shared library.
    #[arg(long, env = ENGINE_LIB_ENV)]
    engine_lib: Option<PathBuf>,

    /// Files converted at once.
    #[arg(short, long, env = "BATCH_CONVERT_CONCURRENCY", default_value_t = 4)]
    concurrency: usize,

    /// Whole-batch timeout in seconds.
    #[arg(long, env = "BATCH_CONVERT_TIMEOUT", default_value_t = 300)]
    timeout: u64,

    /// Print a JSON report (BatchReport) on stdout.
    #[arg(long)]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "BATCH_CONVERT_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "BATCH_CONVERT_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "BATCH_CONVERT_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs unless --verbose.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Upload ───────────────────────────────────────────────────────────
    let session = Session::new(Arc::new(ObjectUrls::new()));
    let mut sources = Vec::with_capacity(cli.files.len());
    for path in &cli.files {
        sources.push(upload::read_source(path).await?);
    }
    let offered = sources.len();
    let accepted = session.add_files(sources)?;
    if accepted < offered && !cli.quiet {
        eprintln!(
            "{} skipped {} file(s) of an unsupported type",
            cyan("⚠"),
            offered - accepted
        );
    }
    if accepted == 0 {
        bail!("None of the given files can be converted");
    }

    // ── Build config ─────────────────────────────────────────────────────
    let cli_progress = show_progress.then(CliProgressCallback::new);
    let mut builder = BatchConfig::builder()
        .concurrency(cli.concurrency)
        .batch_timeout_secs(cli.timeout);
    if let Some(ref lib) = cli.engine_lib {
        builder = builder.binary_location(lib);
    }
    if let Some(ref cb) = cli_progress {
        builder = builder.progress_callback(Arc::clone(cb) as ProgressCallback);
    }
    let config = builder.build().context("Invalid options")?;

    // ── Convert ──────────────────────────────────────────────────────────
    let orchestrator = BatchOrchestrator::with_pdfium(config);
    let summary = match orchestrator.convert(&session, &cli.format).await {
        Ok(summary) => summary,
        Err(e) => {
            if let Some(ref cb) = cli_progress {
                cb.abandon();
            }
            return Err(anyhow::Error::new(e).context("Conversion failed"));
        }
    };

    // ── Export ───────────────────────────────────────────────────────────
    let sink = DirectorySink::new(&cli.output);
    let receipt = session.export(&sink).await.context("Export failed")?;

    if cli.json {
        let report = BatchReport {
            summary,
            export: receipt,
        };
        println!(
            "{}",
            serde_json::to_string_pretty(&report).context("Failed to serialise report")?
        );
        return Ok(());
    }

    if !cli.quiet {
        if !show_progress {
            eprintln!(
                "Converted {}/{} files in {}ms",
                summary.converted, summary.total, summary.duration_ms
            );
        }
        for failure in &summary.failures {
            eprintln!("  {} {}", red("✗"), failure);
        }
        match receipt {
            Some(r) => eprintln!(
                "{}  {}  {}",
                green("→"),
                bold(&sink.dir().join(&r.file_name).display().to_string()),
                dim(&format!("{} bytes", r.size_bytes)),
            ),
            None => eprintln!("{} nothing to save", cyan("⚠")),
        }
    }

    Ok(())
}
