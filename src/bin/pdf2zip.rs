//! CLI binary for pdf2zip.
//!
//! `serve` runs the HTTP service; `convert` renders a local PDF straight to
//! a ZIP with no quota, token or payment involved.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use pdf2zip::pipeline::{self, range, render};
use pdf2zip::{
    ConversionService, GatewayConfig, ImageEncoding, PdfiumRasterizer, ProgressCallback,
    RenderOptions, RenderProgress, ServiceConfig, ARCHIVE_FILE_NAME,
};
use std::io;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::signal;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress bar for offline conversion.
struct CliProgress {
    bar: ProgressBar,
}

impl CliProgress {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner());
        bar.set_style(spinner_style);
        bar.set_prefix("Preparing");
        bar.set_message("Opening PDF…");
        bar.enable_steady_tick(Duration::from_millis(80));
        Arc::new(Self { bar })
    }
}

impl RenderProgress for CliProgress {
    fn on_render_start(&self, total: usize) {
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ");
        self.bar.set_length(total as u64);
        self.bar.set_style(style);
        self.bar.set_prefix("Rendering");
        self.bar.reset_eta();
    }

    fn on_page_rendered(&self, ordinal: usize, total: usize, bytes: usize) {
        self.bar.println(format!(
            "  {} Page {:>3}/{:<3}  {}",
            green("✓"),
            ordinal,
            total,
            dim(&format!("{:>8} bytes", bytes)),
        ));
        self.bar.inc(1);
    }

    fn on_render_complete(&self, _total: usize) {
        self.bar.finish_and_clear();
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Run the service on port 5000 with payments enabled
  RAZORPAY_KEY_ID=rzp_live_xxx RAZORPAY_KEY_SECRET=... pdf2zip serve

  # Offline: every page as JPEG at 150 DPI
  pdf2zip convert document.pdf

  # Pages 1-3 and 7 as PNG at 300 DPI
  pdf2zip convert --range 1-3,7 --format png --dpi 300 paper.pdf -o paper.zip

ENVIRONMENT VARIABLES:
  PORT                    Listen port for `serve` (default 5000)
  RAZORPAY_KEY_ID         Gateway public key id
  RAZORPAY_KEY_SECRET     Gateway secret (signs and verifies payments)
  PDFIUM_LIB_PATH         Path to libpdfium, or the directory holding it
  PDFIUM_AUTO_CACHE_DIR   Where a downloaded libpdfium is cached
  RUST_LOG                Log filter, e.g. pdf2zip=debug,tower_http=info
"#;

/// Convert PDFs to ZIP archives of page images.
#[derive(Parser, Debug)]
#[command(
    name = "pdf2zip",
    version,
    about = "Convert PDF pages to JPEG/PNG images packaged as a ZIP",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, global = true, env = "PDF2ZIP_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, global = true, env = "PDF2ZIP_QUIET")]
    quiet: bool,

    /// Path to libpdfium or the directory containing it.
    #[arg(long, global = true, env = "PDFIUM_LIB_PATH")]
    pdfium_lib: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the HTTP service.
    Serve(ServeArgs),
    /// Convert a local PDF without quota or payment.
    Convert(ConvertArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// Address to bind.
    #[arg(long, env = "PDF2ZIP_HOST", default_value = "0.0.0.0")]
    host: String,

    /// Port to listen on.
    #[arg(long, env = "PORT", default_value_t = 5000)]
    port: u16,

    /// Documents with more pages than this are chargeable.
    #[arg(long, env = "PDF2ZIP_FREE_MAX_PAGES", default_value_t = 25)]
    free_max_pages: usize,

    /// Documents larger than this many MiB are chargeable.
    #[arg(long, env = "PDF2ZIP_FREE_MAX_MB", default_value_t = 25)]
    free_max_mb: u64,

    /// Charge for a chargeable conversion, in minor units (paise).
    #[arg(long, env = "PDF2ZIP_CHARGE_AMOUNT", default_value_t = 1000)]
    charge_amount: u64,

    /// ISO currency code of the charge.
    #[arg(long, env = "PDF2ZIP_CURRENCY", default_value = "INR")]
    currency: String,

    /// DPI used when a request names none.
    #[arg(long, env = "PDF2ZIP_DEFAULT_DPI", default_value_t = 150)]
    default_dpi: u32,

    /// Highest DPI a request may ask for.
    #[arg(long, env = "PDF2ZIP_MAX_DPI", default_value_t = 600)]
    max_dpi: u32,

    /// Seconds a checked document waits for its conversion.
    #[arg(long, env = "PDF2ZIP_ENTRY_TTL", default_value_t = 900)]
    entry_ttl: u64,

    /// Seconds between expiry sweeps.
    #[arg(long, env = "PDF2ZIP_SWEEP_INTERVAL", default_value_t = 30)]
    sweep_interval: u64,

    /// Largest accepted upload in MiB.
    #[arg(long, env = "PDF2ZIP_MAX_UPLOAD_MB", default_value_t = 200)]
    max_upload_mb: u64,

    /// Directory uploads are spooled into.
    #[arg(long, env = "PDF2ZIP_SPOOL_DIR")]
    spool_dir: Option<PathBuf>,

    /// Gateway public key id.
    #[arg(long, env = "RAZORPAY_KEY_ID")]
    razorpay_key_id: Option<String>,

    /// Gateway secret.
    #[arg(long, env = "RAZORPAY_KEY_SECRET", hide_env_values = true)]
    razorpay_key_secret: Option<String>,

    /// Gateway API base URL.
    #[arg(long, env = "RAZORPAY_API_BASE")]
    razorpay_api_base: Option<String>,
}

#[derive(Args, Debug)]
struct ConvertArgs {
    /// Local PDF file.
    input: PathBuf,

    /// Where to write the archive.
    #[arg(short, long, default_value = ARCHIVE_FILE_NAME)]
    output: PathBuf,

    /// Page range, e.g. 1-3,5,7. Empty selects every page.
    #[arg(long, default_value = "")]
    range: String,

    /// Fail instead of ignoring range tokens that select nothing.
    #[arg(long)]
    strict_range: bool,

    /// Image format: jpeg or png.
    #[arg(long, default_value = "jpeg")]
    format: ImageEncoding,

    /// Rendering DPI.
    #[arg(long, default_value_t = 150, value_parser = clap::value_parser!(u32).range(1..=1200))]
    dpi: u32,

    /// Password for encrypted documents.
    #[arg(long, env = "PDF2ZIP_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Longest rendered edge in pixels.
    #[arg(long, default_value_t = 10_000)]
    max_pixels: u32,

    /// Disable the progress bar.
    #[arg(long)]
    no_progress: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO logs during offline conversion.
    let bar_active = matches!(&cli.command, Command::Convert(a) if !a.no_progress) && !cli.quiet;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || bar_active {
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

    let rasterizer = Arc::new(match cli.pdfium_lib.clone() {
        Some(path) => PdfiumRasterizer::new(Some(path)),
        None => {
            ensure_pdfium(cli.quiet)?;
            PdfiumRasterizer::from_env()
        }
    });

    match cli.command {
        Command::Serve(args) => serve(args, rasterizer).await,
        Command::Convert(args) => convert(args, rasterizer, cli.quiet).await,
    }
}

/// Make the pdfium engine available before the first request needs it.
///
/// With `bundled` the embedded library is extracted; otherwise the first run
/// downloads it (~30 MB) into the pdfium-auto cache. Later runs only stat a
/// path.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    #[cfg(feature = "bundled")]
    {
        let _ = quiet;
        tokio::task::block_in_place(pdfium_auto::ensure_pdfium_bundled)
            .context("Failed to extract bundled PDFium engine")?;
    }

    #[cfg(not(feature = "bundled"))]
    if !pdfium_auto::is_pdfium_cached() {
        if quiet {
            tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
                .context("Failed to download PDFium engine")?;
            return Ok(());
        }

        let bar = ProgressBar::new(0);
        bar.set_style(
            ProgressStyle::with_template(
                "{spinner:.cyan} {prefix:.bold}  \
                 [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
            )
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("█▉▊▋▌▍▎▏  "),
        );
        bar.set_prefix("PDF engine");
        bar.enable_steady_tick(Duration::from_millis(80));

        let progress = bar.clone();
        tokio::task::block_in_place(|| {
            pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
                if let Some(t) = total {
                    if progress.length() != Some(t) {
                        progress.set_length(t);
                    }
                }
                progress.set_position(downloaded);
            }))
        })
        .context("Failed to download PDFium engine")?;
        bar.finish_and_clear();
    }
    Ok(())
}

async fn serve(args: ServeArgs, rasterizer: Arc<PdfiumRasterizer>) -> Result<()> {
    let mut builder = ServiceConfig::builder()
        .free_max_pages(args.free_max_pages)
        .free_max_mb(args.free_max_mb)
        .charge_amount(args.charge_amount)
        .currency(args.currency)
        .max_dpi(args.max_dpi)
        .default_dpi(args.default_dpi)
        .entry_ttl(Duration::from_secs(args.entry_ttl))
        .sweep_interval(Duration::from_secs(args.sweep_interval))
        .max_upload_bytes(args.max_upload_mb * pdf2zip::config::MIB);

    if let Some(dir) = args.spool_dir {
        builder = builder.spool_dir(dir);
    }

    match (args.razorpay_key_id, args.razorpay_key_secret) {
        (Some(id), Some(secret)) if !id.is_empty() && !secret.is_empty() => {
            let mut gateway = GatewayConfig::new(id, secret);
            if let Some(base) = args.razorpay_api_base {
                gateway = gateway.with_api_base(base);
            }
            builder = builder.gateway(gateway);
        }
        _ => tracing::warn!("Razorpay credentials not set; chargeable documents will be refused"),
    }

    let config = builder.build().context("Invalid configuration")?;
    tracing::debug!(?config, "Service configuration");

    let service = ConversionService::new(config, rasterizer)
        .context("Failed to initialise conversion service")?;

    let addr: SocketAddr = format!("{}:{}", args.host, args.port)
        .parse()
        .with_context(|| format!("Invalid listen address {}:{}", args.host, args.port))?;

    pdf2zip::server::serve(Arc::new(service), addr, shutdown_signal())
        .await
        .context("Server failed")
}

async fn convert(args: ConvertArgs, rasterizer: Arc<PdfiumRasterizer>, quiet: bool) -> Result<()> {
    let start = Instant::now();
    let info = render::inspect_document(rasterizer.clone(), &args.input, args.password.as_deref())
        .await
        .with_context(|| format!("Failed to open {}", args.input.display()))?;

    let report = range::resolve_with_report(&args.range, info.page_count);
    if !report.rejected.is_empty() {
        if args.strict_range {
            anyhow::bail!("Invalid page range: rejected {}", report.rejected_summary());
        }
        tracing::warn!(rejected = %report.rejected_summary(), "Ignoring range tokens");
    }

    let options = RenderOptions::new(args.dpi, args.format, report.pages);
    let progress: Option<ProgressCallback> = if args.no_progress || quiet {
        None
    } else {
        Some(CliProgress::new())
    };

    let archive = pipeline::render_to_archive(
        rasterizer,
        &args.input,
        args.password.as_deref(),
        &options,
        args.max_pixels,
        progress,
    )
    .await
    .context("Conversion failed")?;

    tokio::fs::write(&args.output, &archive.bytes)
        .await
        .with_context(|| format!("Failed to write {}", args.output.display()))?;

    if !quiet {
        eprintln!(
            "{} {} pages → {}  {}",
            green("✔"),
            bold(&archive.members.len().to_string()),
            args.output.display(),
            dim(&format!(
                "{} bytes, {:.1}s",
                archive.bytes.len(),
                start.elapsed().as_secs_f64()
            )),
        );
    }
    Ok(())
}

/// Resolves on Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("Received Ctrl+C, starting graceful shutdown..."),
        _ = terminate => tracing::info!("Received SIGTERM, starting graceful shutdown..."),
    }
}
