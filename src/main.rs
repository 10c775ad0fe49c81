//! # HEIC Batch Converter - Main Entry Point
//!
//! Questo è il punto di ingresso principale dell'applicazione.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del sistema di logging con `tracing` (su stderr)
//! - Caricamento della configurazione e override da CLI
//! - Richiesta di consenso se `ConvertedFiles` esiste già
//! - Rendering del report finale (log oppure JSON) e exit code
//!
//! ## Flusso di esecuzione:
//! 1. Parsa gli argomenti CLI (directory, quality, workers, etc.)
//! 2. Configura il logging (INFO o DEBUG a seconda del flag verbose, `RUST_LOG` vince)
//! 3. Carica il file di configurazione e applica gli override
//! 4. Decide cosa fare di un `ConvertedFiles` esistente (prompt sul blocking pool)
//! 5. Solo dopo installa il gestore di Ctrl-C (stop dei task non ancora iniziati)
//! 6. Avvia la conversione con BatchConverter
//!
//! ## Exit code:
//! - `0`: batch completato senza errori, oppure niente da fare
//! - `1`: errore di pre-flight (directory invalida, consenso negato, I/O)
//! - `2`: almeno un file non è stato convertito
//!
//! ## Esempio di utilizzo:
//! ```bash
//! heic-batch ~/Pictures/iPhone --quality 80 --workers 8 --on-existing keep
//! ```

use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use heic_batch::{
    converter::ProgressTracker,
    json_output::{JsonMessage, NoWorkReason},
    BatchConverter, BatchReport, BatchRequest, Config, ExistingDestination, HeicToJpeg, PlanError,
};

/// What to do when the output folder is already there
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OnExisting {
    /// Ask on the terminal
    Ask,
    /// Delete it and convert everything again
    Recreate,
    /// Reuse it and convert only what is missing
    Keep,
    /// Stop without touching anything
    Abort,
}

#[derive(Parser)]
#[command(name = "heic-batch")]
#[command(about = "Convert every HEIC file in a directory to JPEG")]
struct Args {
    /// Directory containing the HEIC files
    directory: PathBuf,

    /// JPEG quality (1-100) [default: 50]
    #[arg(short, long, value_parser = clap::value_parser!(u8).range(1..=100))]
    quality: Option<u8>,

    /// Number of parallel workers, values below 1 become 1 [default: 4]
    #[arg(short, long, allow_negative_numbers = true)]
    workers: Option<i64>,

    /// Policy for an existing ConvertedFiles folder
    #[arg(long, value_enum, default_value = "ask")]
    on_existing: OnExisting,

    /// Extra attempts for transient write failures [default: 0]
    #[arg(long)]
    retries: Option<u32>,

    /// Delete the JPEG when copying the timestamps fails
    #[arg(long)]
    remove_failed_output: bool,

    /// Config file (default: <config dir>/heic-batch/config.json)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Write the effective configuration back to the config file
    #[arg(long)]
    save_config: bool,

    /// Output progress and results as JSON lines on stdout
    #[arg(long)]
    json: bool,

    /// Show a progress bar
    #[arg(long)]
    progress: bool,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    let default_level = if args.verbose { "debug" } else { "info" };
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to initialize logging: {}", e);
    }

    match run(args).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(1)
        }
    }
}

async fn run(args: Args) -> Result<ExitCode> {
    let config_path = args.config.clone().or_else(Config::default_path);
    let mut config = match config_path {
        Some(ref path) => Config::from_file(path).await?,
        None => Config::default(),
    };

    if let Some(quality) = args.quality {
        config.quality = quality;
    }
    if let Some(workers) = args.workers {
        if workers < 1 {
            warn!("Invalid worker count {}, using 1", workers);
        }
        config.workers = usize::try_from(workers.max(1)).unwrap_or(usize::MAX);
    }
    if let Some(retries) = args.retries {
        config.retries = retries;
    }
    config.remove_failed_output |= args.remove_failed_output;
    config.json_output |= args.json;
    config.validate()?;

    if args.save_config {
        if let Some(ref path) = config_path {
            config.save_to_file(path).await?;
            info!("Configuration saved to {}", path.display());
        }
    }

    let json_output = config.json_output;
    let tracker = ProgressTracker::new(
        args.directory.clone(),
        config.quality,
        config.workers,
        json_output,
        args.progress && !json_output,
    );
    let request = BatchRequest::new(&args.directory, config.quality).with_pool_size(config.workers);
    let (stop_tx, stop_rx) = watch::channel(false);
    let converter = BatchConverter::new(config, Arc::new(HeicToJpeg))
        .with_observer(Arc::new(tracker))
        .with_cancellation(stop_rx);

    // settled before Ctrl-C is taken over, so an interrupt at the prompt still exits
    let decision = decide_existing(&converter, &request, args.on_existing, ask_to_recreate).await?;

    // Ctrl-C stops workers from starting new files
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, finishing files in progress");
            let _ = stop_tx.send(true);
        }
    });

    let start = Instant::now();
    let report = converter.run_batch(&request, move |_| decision).await;

    Ok(render(report, json_output, start.elapsed().as_secs_f64()))
}

/// Turn the `--on-existing` policy into a decision, prompting on the blocking
/// pool only when the policy is `ask` and the output folder is really there
async fn decide_existing<P>(
    converter: &BatchConverter,
    request: &BatchRequest,
    policy: OnExisting,
    prompt: P,
) -> Result<ExistingDestination>
where
    P: FnOnce(PathBuf) -> bool + Send + 'static,
{
    let decision = match policy {
        OnExisting::Recreate => ExistingDestination::Recreate,
        OnExisting::Keep => ExistingDestination::Keep,
        OnExisting::Abort => ExistingDestination::Abort,
        OnExisting::Ask => {
            let destination = match converter.planner(request.quality).preflight(&request.source_dir) {
                Ok(preflight) if preflight.destination_exists() => preflight.destination_dir().to_path_buf(),
                // nothing to ask; run_batch reports the same outcome
                _ => return Ok(ExistingDestination::Keep),
            };
            if tokio::task::spawn_blocking(move || prompt(destination)).await? {
                ExistingDestination::Recreate
            } else {
                ExistingDestination::Abort
            }
        }
    };
    Ok(decision)
}

fn ask_to_recreate(destination: PathBuf) -> bool {
    let folder = destination
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| destination.display().to_string());

    eprint!("Existing '{}' folder detected. Delete and proceed? [y/N] ", folder);
    let _ = std::io::stderr().flush();

    let mut answer = String::new();
    if std::io::stdin().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_lowercase().as_str(), "y" | "yes")
}

fn render(report: Result<BatchReport, PlanError>, json_output: bool, duration_seconds: f64) -> ExitCode {
    match report {
        Ok(BatchReport::NoEligibleFiles) => {
            if json_output {
                JsonMessage::no_work(NoWorkReason::NoEligibleFiles, 0).emit();
            } else {
                info!("Nothing to convert: no HEIC files found");
            }
            ExitCode::SUCCESS
        }
        Ok(BatchReport::AllAlreadyConverted { skipped }) => {
            if json_output {
                JsonMessage::no_work(NoWorkReason::AllAlreadyConverted, skipped).emit();
            } else {
                info!("Nothing to convert: all {} files already converted", skipped);
            }
            ExitCode::SUCCESS
        }
        Ok(BatchReport::Completed { result, skipped }) => {
            if json_output {
                JsonMessage::complete(&result, skipped, duration_seconds).emit();
            } else {
                info!("{}", result.format_summary());
                if skipped > 0 {
                    info!("Skipped {} files already converted", skipped);
                }
                for failure in result.failures() {
                    warn!("Failed: {} ({})", failure.path.display(), failure.detail);
                }
                info!("Finished in {:.1}s", duration_seconds);
            }
            if result.is_clean() {
                ExitCode::SUCCESS
            } else {
                ExitCode::from(2)
            }
        }
        Err(e) => {
            if json_output {
                let details = match e {
                    PlanError::Io { ref source, .. } => Some(source.to_string()),
                    _ => None,
                };
                JsonMessage::error(e.to_string(), details).emit();
            } else {
                error!("{}", e);
            }
            ExitCode::from(1)
        }
    }
}
