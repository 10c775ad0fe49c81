//! # Progress Tracking Module
//!
//! Hook di progresso del coordinatore. Il coordinatore chiama l'observer
//! dall'unico consumer dei risultati, quindi le implementazioni non vedono
//! mai chiamate concorrenti a `on_outcome`.
//!
//! `ProgressTracker` unifica progress bar e output JSON per il binario.

use crate::{
    json_output::JsonMessage,
    outcome::{BatchResult, ConversionOutcome},
    progress::ProgressManager,
};
use std::path::PathBuf;
use std::sync::Mutex;

/// Receives batch lifecycle events from the coordinator
pub trait ProgressObserver: Send + Sync {
    fn on_start(&self, _total: usize) {}
    fn on_outcome(&self, _outcome: &ConversionOutcome) {}
    fn on_finish(&self, _result: &BatchResult) {}
}

/// Observer that ignores everything
#[derive(Debug, Default)]
pub struct NoopObserver;

impl ProgressObserver for NoopObserver {}

/// Tracker per il binario: progress bar e/o eventi JSON
pub struct ProgressTracker {
    input_dir: PathBuf,
    quality: u8,
    workers: usize,
    json_output: bool,
    show_bar: bool,
    bar: Mutex<Option<ProgressManager>>,
}

impl ProgressTracker {
    pub fn new(input_dir: PathBuf, quality: u8, workers: usize, json_output: bool, show_bar: bool) -> Self {
        Self {
            input_dir,
            quality,
            workers,
            json_output,
            show_bar,
            bar: Mutex::new(None),
        }
    }

    fn with_bar(&self, f: impl FnOnce(&ProgressManager)) {
        if let Ok(guard) = self.bar.lock() {
            if let Some(ref bar) = *guard {
                f(bar);
            }
        }
    }
}

impl ProgressObserver for ProgressTracker {
    fn on_start(&self, total: usize) {
        if self.json_output {
            JsonMessage::start(self.input_dir.clone(), total, self.quality, self.workers).emit();
        }
        if self.show_bar {
            if let Ok(mut guard) = self.bar.lock() {
                *guard = Some(ProgressManager::new(total as u64));
            }
        }
    }

    fn on_outcome(&self, outcome: &ConversionOutcome) {
        if self.json_output {
            JsonMessage::file_complete(outcome).emit();
        }

        let name = outcome
            .source_path()
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .into_owned();
        let message = if outcome.succeeded() {
            format!("✅ {}", name)
        } else {
            format!("❌ {}", name)
        };
        self.with_bar(|bar| bar.update(&message));
    }

    fn on_finish(&self, result: &BatchResult) {
        self.with_bar(|bar| bar.finish(&result.format_summary()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Counting {
        outcomes: AtomicUsize,
    }

    impl ProgressObserver for Counting {
        fn on_outcome(&self, _outcome: &ConversionOutcome) {
            self.outcomes.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_default_methods_are_optional() {
        let counting = Counting::default();
        counting.on_start(2);
        counting.on_outcome(&ConversionOutcome::success(PathBuf::from("a.heic")));
        counting.on_finish(&BatchResult::default());
        assert_eq!(counting.outcomes.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_tracker_without_bar_is_silent() {
        let tracker = ProgressTracker::new(PathBuf::from("/photos"), 50, 4, false, false);
        tracker.on_start(1);
        tracker.on_outcome(&ConversionOutcome::success(PathBuf::from("a.heic")));
        tracker.on_finish(&BatchResult::default());
        assert!(tracker.bar.lock().unwrap().is_none());
    }
}
