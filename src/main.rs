//! # CWD to WebP - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing`
//! - Risoluzione della directory di lavoro (con conferma dell'operatore)
//! - Creazione della configurazione e dispatch della modalità richiesta
//!
//! ## Modalità:
//! - default: converte tutte le immagini della directory di lavoro
//! - `--single <IMAGE>`: converte una sola immagine ed esce
//! - `--list` / `--list-md`: elenca i file da convertire ed esce
//! - `--mdtest <IMAGE>`: mostra quali righe di metadata sono di base
//!
//! ## Esempio di utilizzo:
//! ```bash
//! cwd-to-webp -t 8 --recover --auto-replace -d ~/Pictures/scans
//! ```

use anyhow::Result;
use clap::Parser;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use cwd_webp_converter::{Config, SystemRunner, WebpConverter};

#[derive(Parser)]
#[command(name = "cwd-to-webp")]
#[command(about = "Convert the images of a directory to lossless WebP, keeping their metadata")]
struct Args {
    /// Number of parallel workers (0 = default of 6)
    #[arg(short, long)]
    threads: Option<usize>,

    /// Convert only this image, next to the original, and exit
    #[arg(short, long, value_name = "IMAGE")]
    single: Option<PathBuf>,

    /// Show which metadata lines of an image are baseline tags and exit
    #[arg(long, value_name = "IMAGE")]
    mdtest: Option<PathBuf>,

    /// Always transfer metadata, skipping the check
    #[arg(long, conflicts_with = "no_force_metadata")]
    force_metadata: bool,

    /// Never transfer metadata
    #[arg(long)]
    no_force_metadata: bool,

    /// Also convert existing WebP files
    #[arg(long)]
    no_ignore_webp: bool,

    /// List the files to be converted and exit
    #[arg(long)]
    list: bool,

    /// Same as --list, also checking each file for extra metadata
    #[arg(long)]
    list_md: bool,

    /// Resume an interrupted run: skip converted images, recover lost metadata
    #[arg(long)]
    recover: bool,

    /// Replace originals with their WebP when no error was logged for them
    #[arg(long)]
    auto_replace: bool,

    /// With --single, delete the original after conversion
    #[arg(long)]
    remove_original: bool,

    /// Do not write log files
    #[arg(long)]
    nolog: bool,

    /// Working directory (default: current directory)
    #[arg(short, long, value_name = "DIR")]
    directory: Option<PathBuf>,

    /// JSON configuration file; command line flags take precedence
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Args {
    fn force_metadata(&self) -> Option<bool> {
        if self.force_metadata {
            Some(true)
        } else if self.no_force_metadata {
            Some(false)
        } else {
            None
        }
    }

    /// Apply command line flags on top of a loaded configuration
    fn apply_to(&self, config: &mut Config) {
        if let Some(threads) = self.threads {
            config.workers = Config::resolve_workers(Some(threads));
        }
        if let Some(forced) = self.force_metadata() {
            config.force_metadata = Some(forced);
        }
        config.include_webp |= self.no_ignore_webp;
        config.recover |= self.recover;
        config.auto_replace |= self.auto_replace;
        if self.nolog {
            config.logging = false;
        }
    }
}

/// Ask the operator whether to continue in `fallback` when `requested` cannot be used
fn confirm_fallback(requested: &Path, fallback: &Path) -> Result<bool> {
    warn!("Could not enter/find directory {}", requested.display());
    print!("Could not enter/find directory, proceed in {}? (y/n): ", fallback.display());
    io::stdout().flush()?;

    let mut answer = String::new();
    io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}

fn resolve_work_dir(requested: Option<&Path>) -> Result<Option<PathBuf>> {
    let cwd = std::env::current_dir()?;
    match requested {
        None => Ok(Some(cwd)),
        Some(dir) if dir.is_dir() => Ok(Some(dir.to_path_buf())),
        Some(dir) => Ok(confirm_fallback(dir, &cwd)?.then_some(cwd)),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_target(false)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let mut config = match args.config {
        Some(ref path) => Config::from_file(path).await?,
        None => Config::default(),
    };
    args.apply_to(&mut config);
    config.validate()?;

    let runner = Arc::new(SystemRunner::new(config.tools_dir.clone()));

    if let Some(ref image) = args.mdtest {
        let cwd = std::env::current_dir()?;
        let converter = WebpConverter::new(cwd, config, runner)?;
        for line in converter.mdtest(image).await? {
            println!("{}", line);
        }
        return Ok(());
    }

    let Some(work_dir) = resolve_work_dir(args.directory.as_deref())? else {
        return Ok(());
    };
    let converter = WebpConverter::new(work_dir, config, runner.clone())?;

    if args.list || args.list_md {
        for image in converter.list(args.list_md).await? {
            println!("{}", image.to_line());
        }
        return Ok(());
    }

    runner.check_dependencies()?;

    if let Some(ref image) = args.single {
        let placed = converter.convert_single(image, args.remove_original).await?;
        info!("Saved {}", placed.display());
        return Ok(());
    }

    let summary = converter.run().await?;
    println!("{}", summary.format_summary());

    Ok(())
}
