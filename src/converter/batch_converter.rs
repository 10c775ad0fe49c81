//! # Batch Converter Main Orchestrator
//!
//! Orchestratore principale: pianifica la worklist e la fa drenare da un
//! pool fisso di worker.
//!
//! ## Architettura del pool:
//! - **Coda**: `VecDeque<ConversionTask>` dietro un `tokio::sync::Mutex`
//! - **Worker**: `pool_size` task tokio, ognuno preleva il prossimo task
//!   libero e lo converte su `spawn_blocking` (decode/encode sono CPU + I/O)
//! - **Sink**: canale mpsc verso un unico consumer che possiede il tally
//!   (`ResultCollector`), quindi nessun contatore condiviso
//!
//! ## Isolamento errori:
//! - Errori del codec: già convertiti in outcome da `TaskConverter`
//! - Panic del codec: il `JoinError` diventa un outcome fallito per quel task
//!
//! ## Cancellazione:
//! - Stop signal opzionale (`watch::Receiver<bool>`) controllato da ogni
//!   worker PRIMA di iniziare un task; i task in corso finiscono comunque
//! - I task mai iniziati vengono contati come falliti (`Cancelled`), così
//!   `succeeded + failures == attempted` resta vero
//!
//! ## Esempio:
//! ```rust,ignore
//! let converter = BatchConverter::new(Config::default(), Arc::new(HeicToJpeg));
//! let request = BatchRequest::new("/photos", 50);
//! let report = converter.run_batch(&request, |_| ExistingDestination::Keep).await?;
//! ```

use crate::{
    codec::Codec,
    config::Config,
    converter::{
        planner::{ExistingDestination, Planner},
        progress_tracker::{NoopObserver, ProgressObserver},
        task_converter::TaskConverter,
    },
    error::{ConvertError, PlanError},
    outcome::{BatchResult, ConversionOutcome, ConversionTask, ResultCollector},
};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex};
use tracing::{debug, error, info, warn};

/// Explicit inputs of one batch run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub source_dir: PathBuf,
    pub quality: u8,
    pub pool_size: usize,
}

impl BatchRequest {
    pub fn new(source_dir: impl Into<PathBuf>, quality: u8) -> Self {
        Self {
            source_dir: source_dir.into(),
            quality,
            pool_size: Config::default().workers,
        }
    }

    pub fn with_pool_size(mut self, pool_size: usize) -> Self {
        self.pool_size = pool_size;
        self
    }
}

/// User-visible result of a batch run that passed pre-flight
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchReport {
    /// The directory holds no source files at all
    NoEligibleFiles,
    /// Every source already has an output; nothing was run
    AllAlreadyConverted { skipped: usize },
    /// Workers ran; `skipped` sources already had an output
    Completed { result: BatchResult, skipped: usize },
}

/// Orchestratore principale
pub struct BatchConverter {
    config: Config,
    codec: Arc<dyn Codec>,
    observer: Arc<dyn ProgressObserver>,
    stop_receiver: Option<watch::Receiver<bool>>,
}

impl BatchConverter {
    pub fn new(config: Config, codec: Arc<dyn Codec>) -> Self {
        Self {
            config,
            codec,
            observer: Arc::new(NoopObserver),
            stop_receiver: None,
        }
    }

    /// Attach a progress observer
    pub fn with_observer(mut self, observer: Arc<dyn ProgressObserver>) -> Self {
        self.observer = observer;
        self
    }

    /// Stop starting new tasks once `true` is sent on the channel
    pub fn with_cancellation(mut self, stop_receiver: watch::Receiver<bool>) -> Self {
        self.stop_receiver = Some(stop_receiver);
        self
    }

    pub fn planner(&self, quality: u8) -> Planner {
        Planner::new(self.codec.as_ref(), quality)
    }

    /// Plan and run a whole batch.
    ///
    /// `consent` is asked only when the destination directory already exists.
    pub async fn run_batch<F>(&self, request: &BatchRequest, consent: F) -> Result<BatchReport, PlanError>
    where
        F: FnOnce(&Path) -> ExistingDestination,
    {
        let planner = self.planner(request.quality);

        let preflight = match planner.preflight(&request.source_dir) {
            Ok(preflight) => preflight,
            Err(PlanError::NoEligibleFiles(dir)) => {
                info!("No {} files found in {}", self.codec.source_extension(), dir.display());
                return Ok(BatchReport::NoEligibleFiles);
            }
            Err(e) => return Err(e),
        };

        let decision = if preflight.destination_exists() {
            consent(preflight.destination_dir())
        } else {
            ExistingDestination::Keep
        };

        let plan = planner.plan(preflight, decision)?;
        let skipped = plan.already_converted().len();

        if plan.tasks().is_empty() {
            info!("All {} files already converted", skipped);
            return Ok(BatchReport::AllAlreadyConverted { skipped });
        }

        let result = self.run(plan.into_tasks(), request.pool_size).await;
        Ok(BatchReport::Completed { result, skipped })
    }

    /// Drain `tasks` through a pool of `pool_size` workers
    pub async fn run(&self, tasks: Vec<ConversionTask>, pool_size: usize) -> BatchResult {
        let total = tasks.len();
        let workers = effective_pool_size(pool_size, total);
        if workers != pool_size {
            debug!("Pool size {} adjusted to {} for {} tasks", pool_size, workers, total);
        }

        info!("Converting {} files with {} workers", total, workers);
        self.observer.on_start(total);

        let queue = Arc::new(Mutex::new(VecDeque::from(tasks)));
        let converter = Arc::new(TaskConverter::new(self.codec.clone(), &self.config));
        let (outcome_tx, mut outcome_rx) = mpsc::channel::<ConversionOutcome>(workers.max(1) * 2);

        let mut handles = Vec::with_capacity(workers);
        for worker_id in 0..workers {
            let queue = queue.clone();
            let converter = converter.clone();
            let outcome_tx = outcome_tx.clone();
            let stop_receiver = self.stop_receiver.clone();

            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, converter, outcome_tx, stop_receiver).await
            }));
        }
        // only the workers hold senders now; the channel closes when they exit
        drop(outcome_tx);

        let mut collector = ResultCollector::new();
        while let Some(outcome) = outcome_rx.recv().await {
            self.observer.on_outcome(&outcome);
            collector.record(outcome);
        }

        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                error!("Worker terminated abnormally: {}", e);
            }
        }

        // a worker that died outside a conversion leaves tasks in the queue
        let leftovers: Vec<ConversionTask> = queue.lock().await.drain(..).collect();
        for task in leftovers {
            let outcome = ConversionOutcome::failure(
                task.source_path().to_path_buf(),
                ConvertError::Panicked("worker exited before reaching this task".to_string()),
            );
            self.observer.on_outcome(&outcome);
            collector.record(outcome);
        }

        debug_assert_eq!(collector.recorded(), total);
        let result = collector.finish();
        info!("{}", result.format_summary());
        self.observer.on_finish(&result);
        result
    }
}

/// Clamp the requested pool size to `1..=task_count` (at least 1)
pub fn effective_pool_size(requested: usize, task_count: usize) -> usize {
    requested.max(1).min(task_count.max(1))
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<VecDeque<ConversionTask>>>,
    converter: Arc<TaskConverter>,
    outcome_tx: mpsc::Sender<ConversionOutcome>,
    stop_receiver: Option<watch::Receiver<bool>>,
) {
    loop {
        let next = queue.lock().await.pop_front();
        let Some(task) = next else {
            debug!("Worker {} idle, queue drained", worker_id);
            break;
        };

        let outcome = if is_stopped(&stop_receiver) {
            debug!("Worker {} skipping {} (stop requested)", worker_id, task.source_path().display());
            ConversionOutcome::failure(task.source_path().to_path_buf(), ConvertError::Cancelled)
        } else {
            convert_isolated(worker_id, task, converter.clone()).await
        };

        if outcome_tx.send(outcome).await.is_err() {
            warn!("Worker {}: result sink closed", worker_id);
            break;
        }
    }
}

/// Run one conversion on the blocking pool, turning a panic into a failed outcome
async fn convert_isolated(
    worker_id: usize,
    task: ConversionTask,
    converter: Arc<TaskConverter>,
) -> ConversionOutcome {
    let source = task.source_path().to_path_buf();
    debug!("Worker {} converting {}", worker_id, source.display());

    match tokio::task::spawn_blocking(move || converter.convert(&task)).await {
        Ok(outcome) => outcome,
        Err(join_error) => {
            let reason = if join_error.is_panic() {
                panic_message(join_error.into_panic())
            } else {
                join_error.to_string()
            };
            error!("Conversion of '{}' panicked: {}", source.display(), reason);
            ConversionOutcome::failure(source, ConvertError::Panicked(reason))
        }
    }
}

fn is_stopped(stop_receiver: &Option<watch::Receiver<bool>>) -> bool {
    stop_receiver.as_ref().map(|rx| *rx.borrow()).unwrap_or(false)
}

fn panic_message(payload: Box<dyn std::any::Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
