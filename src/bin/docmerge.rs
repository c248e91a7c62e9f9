//! CLI binary for docmerge.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `AssemblyConfig` and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use docmerge::{
    prepare_source, AssemblyConfig, AssemblyProgressCallback, BackendKind, DocumentSource,
    ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

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

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: a live bar plus one log line per document.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Name and start time of the document being converted.
    current: Mutex<Option<(String, Instant)>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    /// Spinner until the document count is known.
    fn new_dynamic() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Collecting documents…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            current: Mutex::new(None),
            errors: AtomicUsize::new(0),
        })
    }

    fn activate_bar(&self, total: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total as u64);
        self.bar.set_style(progress_style);
        self.bar.set_prefix("Converting");
        self.bar.reset_eta();
    }

    /// Take the running document's name and elapsed seconds.
    fn finish_current(&self) -> (String, f64) {
        self.current
            .lock()
            .ok()
            .and_then(|mut c| c.take())
            .map(|(name, t)| (name, t.elapsed().as_secs_f64()))
            .unwrap_or_default()
    }
}

impl AssemblyProgressCallback for CliProgressCallback {
    fn on_documents_found(&self, total: usize) {
        self.activate_bar(total);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Converting {total} documents…"))
        ));
    }

    fn on_document_start(&self, _index: usize, _total: usize, name: &str) {
        if let Ok(mut current) = self.current.lock() {
            *current = Some((name.to_string(), Instant::now()));
        }
        self.bar.set_message(name.to_string());
    }

    fn on_document_complete(&self, index: usize, total: usize, backend: BackendKind) {
        let (name, secs) = self.finish_current();
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            green("✓"),
            index,
            total,
            name,
            dim(backend.name()),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_document_error(&self, index: usize, total: usize, error: &str) {
        let (name, secs) = self.finish_current();
        self.errors.fetch_add(1, Ordering::SeqCst);

        let msg: String = if error.chars().count() > 80 {
            error.chars().take(79).chain(std::iter::once('…')).collect()
        } else {
            error.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {}  {}  {}",
            red("✗"),
            index,
            total,
            name,
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_merge_start(&self, _total: usize) {
        self.bar.set_prefix("Merging");
        self.bar.set_message("");
    }

    fn on_assembly_complete(&self, total_pages: usize, converted: usize, failed: usize) {
        self.bar.finish_and_clear();
        if failed == 0 {
            eprintln!(
                "{} {} documents merged into {} pages",
                green("✔"),
                bold(&converted.to_string()),
                total_pages
            );
        } else {
            eprintln!(
                "{} {}/{} documents merged  ({} not converted)",
                cyan("⚠"),
                bold(&converted.to_string()),
                converted + failed,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Merge a zip of Word files into reports.pdf (name taken from the archive)
  docmerge reports.zip

  # Merge a folder into a chosen file
  docmerge ./pages -o book.pdf

  # Show the inferred order without converting
  docmerge --preview reports.zip

  # Convert in a custom order (indices from --preview)
  docmerge reports.zip --order 2,0,1 -o custom.pdf

  # Use a specific LibreOffice binary
  docmerge --office-path /opt/libreoffice/program/soffice reports.zip

ORDERING:
  Page positions come from filenames: "стр 5", "page 12-14", "3-5 Intro",
  "Титульный лист" / "Title" (page 1), "005_Report". Files without a
  position go last.

ENVIRONMENT VARIABLES:
  MS_GRAPH_CLIENT_ID        Cloud conversion app id
  MS_GRAPH_CLIENT_SECRET    Cloud conversion app secret
  MS_GRAPH_REFRESH_TOKEN    Personal-account flow
  MS_GRAPH_TENANT_ID        Work-account flow (with MS_GRAPH_USER_ID)
  MS_GRAPH_USER_ID          Work-account drive owner
  DOCMERGE_OFFICE_PATH      LibreOffice executable
  DOCMERGE_FORCE_OFFICE     Skip native Word automation
  RUST_LOG                  Log filter (overrides --verbose/--quiet)
"#;

/// Merge Word documents from a zip archive or folder into one ordered PDF.
#[derive(Parser, Debug)]
#[command(
    name = "docmerge",
    version,
    about = "Merge Word documents from a zip archive or folder into one ordered PDF",
    long_about = "Collect .doc/.docx files from a zip archive or folder, order them by the page \
numbers found in their filenames, convert each to PDF (Word automation, a cloud conversion \
service, or headless LibreOffice) and merge the results into a single PDF.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Zip archive or folder containing Word documents.
    input: PathBuf,

    /// Write the PDF here. Default: the archive name, or merged.pdf.
    #[arg(short, long, env = "DOCMERGE_OUTPUT")]
    output: Option<PathBuf>,

    /// Print the resolved order and exit without converting.
    #[arg(long)]
    preview: bool,

    /// Comma-separated indices from --preview, in the desired order.
    #[arg(long, value_delimiter = ',', allow_negative_numbers = true)]
    order: Option<Vec<i64>>,

    /// LibreOffice executable used by the office-suite engine.
    #[arg(long, env = "DOCMERGE_OFFICE_PATH")]
    office_path: Option<PathBuf>,

    /// Skip native Word automation even where it is available.
    #[arg(long, env = "DOCMERGE_FORCE_OFFICE")]
    force_office: bool,

    /// Disable progress bar.
    #[arg(long, env = "DOCMERGE_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DOCMERGE_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "DOCMERGE_QUIET")]
    quiet: bool,

    /// Print a JSON summary on stdout.
    #[arg(long, env = "DOCMERGE_JSON")]
    json: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs; --verbose always wins.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json && !cli.preview;
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

    let progress_cb: Option<ProgressCallback> = if show_progress {
        let cb = CliProgressCallback::new_dynamic();
        Some(cb as Arc<dyn AssemblyProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;

    // ── Discover ─────────────────────────────────────────────────────────
    let source = DocumentSource::from_path(&cli.input).context("Cannot use input")?;
    let mut run = prepare_source(source, &config)
        .await
        .context("Failed to collect documents")?;

    if let Some(order) = &cli.order {
        run.reorder(order).context("Invalid --order")?;
    }

    if cli.preview {
        let entries = run.preview();
        if cli.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&entries).context("Failed to serialise preview")?
            );
        } else {
            for e in &entries {
                let page = if e.inferred_page == 0 {
                    "?".to_string()
                } else {
                    e.inferred_page.to_string()
                };
                println!("{:>4}  {:>5}  {}", e.index, page, e.name);
            }
        }
        return Ok(());
    }

    // ── Assemble ─────────────────────────────────────────────────────────
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(run.artifact_name()));
    let start = Instant::now();
    let result = run
        .assemble(&output, &config)
        .await
        .context("Assembly failed")?;

    if cli.json {
        let summary = serde_json::json!({
            "output": output,
            "success": result.success,
            "total_pages": result.total_pages,
            "converted": result.converted_count(),
            "failed": result.failed,
        });
        println!(
            "{}",
            serde_json::to_string_pretty(&summary).context("Failed to serialise summary")?
        );
    } else if !cli.quiet {
        eprintln!(
            "{}  {} pages  {}ms  →  {}",
            if result.failed.is_empty() {
                green("✔")
            } else {
                cyan("⚠")
            },
            result.total_pages,
            start.elapsed().as_millis(),
            bold(&output.display().to_string()),
        );
        if !result.failed.is_empty() {
            eprintln!(
                "   {} {}",
                dim("not converted:"),
                red(&docmerge::error::summarize_names(&result.failed))
            );
        }
    }

    Ok(())
}

/// Map CLI args onto the environment-derived `AssemblyConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<AssemblyConfig> {
    let mut config = AssemblyConfig::from_env().context("Invalid configuration")?;

    if let Some(path) = &cli.office_path {
        config.backends.office_command = Some(path.clone());
    }
    if cli.force_office {
        config.backends.force_office_suite = true;
    }
    config.progress_callback = progress;

    Ok(config)
}
