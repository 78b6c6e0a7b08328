//! CLI binary for smart-extract.
//!
//! A thin shim over the library crate that maps CLI flags to
//! `ExtractorConfig`, walks the inputs, and prints results.

use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use smart_extract::{
    CancellationSignal, ContentExtractor, DocumentSource, ExtractionResult, ExtractorConfig,
    Metadata,
};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
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

const AFTER_HELP: &str = r#"EXAMPLES:
  # One document, pretty JSON on stdout
  smart-extract invoice.pdf

  # Render an XSL-FO document and extract from the result
  smart-extract statement.fo -o statement.json

  # Everything under a directory, one JSON line per document
  smart-extract ./archive > results.jsonl

  # Read from stdin (buffered to a temp file first)
  cat report.pdf | smart-extract -

  # Encrypted PDF
  smart-extract --password 's3cret' locked.pdf

OUTPUT:
  A single input prints {"metadata":{...},"content":"..."}.
  Several inputs print one line per document:
    {"source":..., "doc_type":..., "size_bytes":..., "metadata":{...}, "content":...}
  doc_type is application/xslfo for .fo files and application/pdf otherwise.

ENVIRONMENT VARIABLES:
  SMART_EXTRACT_EXTRACTION_URL  Extraction service base address
  SMART_EXTRACT_RENDERING_URL   Rendering service base address
  SMART_EXTRACT_PASSWORD        Password for encrypted documents
  RUST_LOG                      Override the log filter (e.g. smart_extract=debug)

Press Ctrl-C to cancel the document in flight; its temp file is removed and
the remaining documents are skipped.
"#;

/// Extract metadata and text from documents via remote services.
#[derive(Parser, Debug)]
#[command(
    name = "smart-extract",
    version,
    about = "Extract metadata and text from documents via remote services",
    long_about = "Extract metadata and text content from documents through an extraction \
service (Tika-compatible rmeta/text endpoint). XSL-FO documents are detected automatically \
and rendered to PDF through a rendering service first.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Files, directories (walked recursively), or "-" for stdin.
    #[arg(required = true)]
    inputs: Vec<String>,

    /// Extraction service base address.
    #[arg(
        long,
        env = "SMART_EXTRACT_EXTRACTION_URL",
        default_value = smart_extract::config::DEFAULT_EXTRACTION_URL
    )]
    extraction_url: String,

    /// Rendering service base address.
    #[arg(
        long,
        env = "SMART_EXTRACT_RENDERING_URL",
        default_value = smart_extract::config::DEFAULT_RENDERING_URL
    )]
    rendering_url: String,

    /// Password for encrypted documents.
    #[arg(long, env = "SMART_EXTRACT_PASSWORD")]
    password: Option<String>,

    /// Comma-separated extensions collected from directories.
    #[arg(long, default_value = "fo,pdf")]
    extensions: String,

    /// Write the JSON result to this file instead of stdout (single input only).
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Accept documents whose extracted content is empty.
    #[arg(long)]
    allow_empty: bool,

    /// Stop at the first failed document.
    #[arg(long)]
    fail_fast: bool,

    /// Bytes inspected when looking for XSL-FO markers.
    #[arg(long, default_value_t = 16 * 1024)]
    sniff_window: usize,

    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 300)]
    timeout: u64,

    /// Directory for buffering stdin (defaults to the system temp dir).
    #[arg(long)]
    temp_dir: Option<PathBuf>,

    /// Disable progress bar.
    #[arg(long)]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long)]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Input {
    Stdin,
    File(PathBuf),
}

impl Input {
    fn label(&self) -> String {
        match self {
            Input::Stdin => "<stdin>".to_string(),
            Input::File(path) => path.display().to_string(),
        }
    }

    fn doc_type(&self) -> &'static str {
        match self {
            Input::File(path) if has_extension(path, "fo") => "application/xslfo",
            _ => "application/pdf",
        }
    }
}

/// One line of batch output.
#[derive(Serialize)]
struct BatchRecord<'a> {
    source: String,
    doc_type: &'static str,
    size_bytes: Option<u64>,
    metadata: &'a Metadata,
    content: &'a str,
}

#[derive(Debug, Default)]
struct Summary {
    succeeded: usize,
    failed: usize,
    stopped: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // INFO-level library logs are hidden while the progress bar is drawn.
    let show_progress = !cli.quiet && !cli.no_progress;
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

    // ── Resolve inputs ───────────────────────────────────────────────────
    let extensions = parse_extensions(&cli.extensions);
    let inputs = collect_inputs(&cli.inputs, &extensions)?;
    if inputs.is_empty() {
        anyhow::bail!("No documents found (extensions: {})", cli.extensions);
    }
    if cli.output.is_some() && inputs.len() > 1 {
        anyhow::bail!(
            "--output needs exactly one input document ({} found)",
            inputs.len()
        );
    }

    let config = build_config(&cli)?;
    let extractor = ContentExtractor::new(config).context("Failed to initialise extractor")?;

    // ── Ctrl-C → cancellation ────────────────────────────────────────────
    let cancel = CancellationSignal::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    if let [input] = inputs.as_slice() {
        run_single(&cli, &extractor, input, &cancel, show_progress).await
    } else {
        run_batch(&cli, &extractor, &inputs, &cancel, show_progress).await
    }
}

async fn run_single(
    cli: &Cli,
    extractor: &ContentExtractor,
    input: &Input,
    cancel: &CancellationSignal,
    show_progress: bool,
) -> Result<()> {
    let spinner = show_progress.then(|| {
        let bar = ProgressBar::new_spinner();
        bar.set_style(
            ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner())
                .tick_strings(TICKS),
        );
        bar.set_prefix("Extracting");
        bar.set_message(input.label());
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });

    let started = Instant::now();
    let outcome = process(cli, extractor, input, cancel).await;
    if let Some(bar) = &spinner {
        bar.finish_and_clear();
    }
    let result = outcome.with_context(|| format!("Extraction failed for {}", input.label()))?;

    if let Some(ref output_path) = cli.output {
        result
            .write_to_file(output_path)
            .await
            .with_context(|| format!("Failed to write {}", output_path.display()))?;
        if !cli.quiet {
            eprintln!(
                "{}  {} metadata fields, {} chars  {}ms  →  {}",
                green("✔"),
                result.metadata.len(),
                result.content.chars().count(),
                started.elapsed().as_millis(),
                bold(&output_path.display().to_string()),
            );
        }
    } else {
        let stdout = io::stdout();
        let mut handle = stdout.lock();
        writeln!(handle, "{}", result.to_json_pretty()).context("Failed to write to stdout")?;
    }
    Ok(())
}

async fn run_batch(
    cli: &Cli,
    extractor: &ContentExtractor,
    inputs: &[Input],
    cancel: &CancellationSignal,
    show_progress: bool,
) -> Result<()> {
    let bar = show_progress.then(|| {
        let bar = ProgressBar::new(inputs.len() as u64);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {pos:>3}/{len} docs  \
                 ⏱ {elapsed_precise}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  ")
            .tick_strings(TICKS),
        );
        bar.set_prefix("Extracting");
        bar.enable_steady_tick(Duration::from_millis(80));
        bar
    });
    let report = |line: String| match &bar {
        Some(bar) => bar.println(line),
        None if !cli.quiet => eprintln!("{line}"),
        None => {}
    };

    report(format!(
        "{} {}",
        cyan("◆"),
        bold(&format!("Extracting {} documents…", inputs.len()))
    ));

    let started = Instant::now();
    let mut summary = Summary::default();

    for input in inputs {
        if cancel.is_cancelled() {
            summary.stopped = true;
            break;
        }
        let doc_started = Instant::now();

        match process(cli, extractor, input, cancel).await {
            Ok(result) => {
                let size_bytes = match input {
                    Input::File(path) => tokio::fs::metadata(path).await.ok().map(|m| m.len()),
                    Input::Stdin => None,
                };
                let record = BatchRecord {
                    source: input.label(),
                    doc_type: input.doc_type(),
                    size_bytes,
                    metadata: &result.metadata,
                    content: &result.content,
                };
                let line = serde_json::to_string(&record).context("Failed to serialise result")?;
                writeln!(io::stdout().lock(), "{line}").context("Failed to write to stdout")?;

                summary.succeeded += 1;
                report(format!(
                    "  {} {:<48}  {:<12}  {}",
                    green("✓"),
                    input.label(),
                    dim(&format!("{:>7} chars", result.content.chars().count())),
                    dim(&format!("{:.1}s", doc_started.elapsed().as_secs_f64())),
                ));
            }
            Err(_) if cancel.is_cancelled() => {
                summary.stopped = true;
                report(format!("  {} {}  {}", red("✗"), input.label(), red("cancelled")));
                break;
            }
            Err(e) => {
                summary.failed += 1;
                report(format!(
                    "  {} {}  {}",
                    red("✗"),
                    input.label(),
                    red(&shorten(&format!("{e:#}"), 120)),
                ));
                if cli.fail_fast {
                    summary.stopped = true;
                    break;
                }
            }
        }

        if let Some(bar) = &bar {
            bar.inc(1);
        }
    }

    if let Some(bar) = &bar {
        bar.finish_and_clear();
    }

    let skipped = inputs.len() - summary.succeeded - summary.failed;
    if !cli.quiet {
        let mark = if summary.failed == 0 && !summary.stopped {
            green("✔")
        } else if summary.succeeded == 0 {
            red("✘")
        } else {
            cyan("⚠")
        };
        eprintln!(
            "{}  {}/{} documents extracted  ({} failed, {} skipped)  {}ms",
            mark,
            bold(&summary.succeeded.to_string()),
            inputs.len(),
            summary.failed,
            skipped,
            started.elapsed().as_millis(),
        );
        if summary.stopped && cancel.is_cancelled() {
            eprintln!("   {}", dim("stopped by Ctrl-C"));
        }
    }

    if summary.failed > 0 || summary.stopped {
        anyhow::bail!(
            "{} of {} documents failed, {} skipped",
            summary.failed,
            inputs.len(),
            skipped
        );
    }
    Ok(())
}

/// Run one document and apply the empty-content rule.
async fn process(
    cli: &Cli,
    extractor: &ContentExtractor,
    input: &Input,
    cancel: &CancellationSignal,
) -> Result<ExtractionResult> {
    let password = cli.password.as_deref();
    let result = match input {
        Input::Stdin => {
            let mut stdin = tokio::io::stdin();
            extractor
                .extract_cancellable(DocumentSource::stream(&mut stdin), password, cancel)
                .await?
        }
        Input::File(path) => {
            extractor
                .extract_file_cancellable(path, password, cancel)
                .await?
        }
    };

    if !cli.allow_empty && result.content.trim().is_empty() {
        anyhow::bail!("No text content was extracted (pass --allow-empty to accept)");
    }
    Ok(result)
}

/// Map CLI args to `ExtractorConfig`.
fn build_config(cli: &Cli) -> Result<ExtractorConfig> {
    let mut builder = ExtractorConfig::builder()
        .extraction_url(cli.extraction_url.as_str())
        .rendering_url(cli.rendering_url.as_str())
        .sniff_window(cli.sniff_window)
        .request_timeout_secs(cli.timeout);
    if let Some(ref dir) = cli.temp_dir {
        builder = builder.temp_dir(dir.clone());
    }
    builder.build().context("Invalid configuration")
}

/// Expand the positional arguments into a document list.
fn collect_inputs(raw: &[String], extensions: &[String]) -> Result<Vec<Input>> {
    let mut inputs = Vec::new();
    for arg in raw {
        if arg == "-" {
            if inputs.contains(&Input::Stdin) {
                anyhow::bail!("stdin (\"-\") can only be given once");
            }
            inputs.push(Input::Stdin);
            continue;
        }

        let path = PathBuf::from(arg);
        if path.is_dir() {
            walk_dir(&path, extensions, &mut inputs)
                .with_context(|| format!("Failed to read directory {}", path.display()))?;
        } else {
            // Missing files surface as per-document errors.
            inputs.push(Input::File(path));
        }
    }
    Ok(inputs)
}

fn walk_dir(dir: &Path, extensions: &[String], out: &mut Vec<Input>) -> io::Result<()> {
    let mut entries = std::fs::read_dir(dir)?.collect::<io::Result<Vec<_>>>()?;
    entries.sort_by_key(|e| e.path());

    for entry in entries {
        let path = entry.path();
        let file_type = entry.file_type()?;
        if file_type.is_dir() {
            walk_dir(&path, extensions, out)?;
        } else if file_type.is_file() && extensions.iter().any(|ext| has_extension(&path, ext)) {
            out.push(Input::File(path));
        }
    }
    Ok(())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

/// Parse `--extensions` ("fo, .PDF") into bare extensions.
fn parse_extensions(s: &str) -> Vec<String> {
    s.split(',')
        .map(|e| e.trim().trim_start_matches('.').to_string())
        .filter(|e| !e.is_empty())
        .collect()
}

fn shorten(message: &str, max_chars: usize) -> String {
    if message.chars().count() <= max_chars {
        return message.to_string();
    }
    let mut out: String = message.chars().take(max_chars - 1).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_are_normalised() {
        assert_eq!(parse_extensions("fo, .PDF,,"), vec!["fo", "PDF"]);
    }

    #[test]
    fn doc_type_follows_extension() {
        assert_eq!(Input::File("a/b.FO".into()).doc_type(), "application/xslfo");
        assert_eq!(Input::File("a/b.pdf".into()).doc_type(), "application/pdf");
        assert_eq!(Input::File("a/b".into()).doc_type(), "application/pdf");
        assert_eq!(Input::Stdin.doc_type(), "application/pdf");
    }

    #[test]
    fn directories_are_walked_recursively_and_filtered() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("nested")).unwrap();
        for name in ["b.pdf", "a.fo", "notes.txt", "nested/c.PDF"] {
            std::fs::write(dir.path().join(name), b"x").unwrap();
        }

        let raw = vec![dir.path().display().to_string()];
        let inputs = collect_inputs(&raw, &parse_extensions("fo,pdf")).unwrap();
        let names: Vec<_> = inputs
            .iter()
            .map(|i| match i {
                Input::File(p) => p.strip_prefix(dir.path()).unwrap().to_path_buf(),
                Input::Stdin => unreachable!(),
            })
            .collect();
        assert_eq!(
            names,
            vec![
                PathBuf::from("a.fo"),
                PathBuf::from("b.pdf"),
                PathBuf::from("nested/c.PDF"),
            ]
        );
    }

    #[test]
    fn stdin_only_once() {
        let raw = vec!["-".to_string(), "-".to_string()];
        assert!(collect_inputs(&raw, &[]).is_err());
    }

    #[test]
    fn shorten_respects_char_boundaries() {
        assert_eq!(shorten("ééééé", 3), "éé…");
        assert_eq!(shorten("short", 10), "short");
    }
}
