//! # Converter Module
//!
//! Il core della conversione batch, separato in sottomoduli:
//! - `batch_converter`: Orchestratore e pool di worker
//! - `task_converter`: Worker per singoli file (errori → outcome)
//! - `planner`: Pre-flight e calcolo della worklist
//! - `progress_tracker`: Hook di progresso

pub mod batch_converter;
pub mod planner;
pub mod progress_tracker;
pub mod task_converter;

pub use batch_converter::{BatchConverter, BatchReport, BatchRequest};
pub use planner::{ExistingDestination, Plan, Planner, Preflight};
pub use progress_tracker::{NoopObserver, ProgressObserver, ProgressTracker};
pub use task_converter::TaskConverter;
