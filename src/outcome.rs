//! # Conversion Data Model
//!
//! Tipi valore che attraversano la pipeline:
//! - `ConversionTask`: creato dal planner, consumato una volta da un worker
//! - `ConversionOutcome`: prodotto una volta per task dal codec adapter
//! - `BatchResult`: tally finale, immutabile dopo `ResultCollector::finish`
//!
//! Tutti i tipi vivono per una sola invocazione; l'unico stato persistente è
//! la directory di destinazione.

use crate::error::ConvertError;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One unit of work: convert a single source into a single destination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionTask {
    source_path: PathBuf,
    destination_path: PathBuf,
    quality: u8,
}

impl ConversionTask {
    pub fn new(source_path: PathBuf, destination_path: PathBuf, quality: u8) -> Self {
        Self {
            source_path,
            destination_path,
            quality,
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn destination_path(&self) -> &Path {
        &self.destination_path
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }
}

/// Result of attempting one task
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionOutcome {
    source_path: PathBuf,
    error: Option<ConvertError>,
}

impl ConversionOutcome {
    pub fn success(source_path: PathBuf) -> Self {
        Self {
            source_path,
            error: None,
        }
    }

    pub fn failure(source_path: PathBuf, error: ConvertError) -> Self {
        Self {
            source_path,
            error: Some(error),
        }
    }

    pub fn source_path(&self) -> &Path {
        &self.source_path
    }

    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }

    pub fn error(&self) -> Option<&ConvertError> {
        self.error.as_ref()
    }

    /// Human-readable failure reason
    pub fn error_detail(&self) -> Option<String> {
        self.error.as_ref().map(|e| e.to_string())
    }
}

/// A failed source file and why it failed
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Failure {
    pub path: PathBuf,
    pub detail: String,
}

/// Aggregate of one batch run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BatchResult {
    attempted: usize,
    succeeded: usize,
    failures: Vec<Failure>,
}

impl BatchResult {
    pub fn attempted(&self) -> usize {
        self.attempted
    }

    pub fn succeeded(&self) -> usize {
        self.succeeded
    }

    pub fn failed(&self) -> usize {
        self.failures.len()
    }

    pub fn failures(&self) -> &[Failure] {
        &self.failures
    }

    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn format_summary(&self) -> String {
        format!(
            "Attempted: {} | Converted: {} | Failed: {}",
            self.attempted,
            self.succeeded,
            self.failures.len()
        )
    }
}

/// Single-owner accumulator; only the aggregating consumer holds one
#[derive(Debug, Default)]
pub struct ResultCollector {
    result: BatchResult,
}

impl ResultCollector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, outcome: ConversionOutcome) {
        self.result.attempted += 1;
        match outcome.error {
            None => self.result.succeeded += 1,
            Some(error) => self.result.failures.push(Failure {
                path: outcome.source_path,
                detail: error.to_string(),
            }),
        }
    }

    pub fn recorded(&self) -> usize {
        self.result.attempted
    }

    /// Freeze the tally. Failures are ordered by path so identical inputs
    /// give identical results whatever the completion order was.
    pub fn finish(mut self) -> BatchResult {
        self.result.failures.sort_by(|a, b| a.path.cmp(&b.path));
        self.result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_detail() {
        let ok = ConversionOutcome::success(PathBuf::from("a.heic"));
        assert!(ok.succeeded());
        assert_eq!(ok.error_detail(), None);

        let failed = ConversionOutcome::failure(
            PathBuf::from("b.heic"),
            ConvertError::Decode("not a HEIF file".into()),
        );
        assert!(!failed.succeeded());
        assert_eq!(failed.error_detail().unwrap(), "Decode error: not a HEIF file");
    }

    #[test]
    fn test_collector_accounting_and_order() {
        let mut collector = ResultCollector::new();
        collector.record(ConversionOutcome::failure(
            PathBuf::from("z.heic"),
            ConvertError::Encode("disk full".into()),
        ));
        collector.record(ConversionOutcome::success(PathBuf::from("m.heic")));
        collector.record(ConversionOutcome::failure(
            PathBuf::from("a.heic"),
            ConvertError::Cancelled,
        ));
        assert_eq!(collector.recorded(), 3);

        let result = collector.finish();
        assert_eq!(result.attempted(), 3);
        assert_eq!(result.succeeded(), 1);
        assert_eq!(result.succeeded() + result.failed(), result.attempted());
        assert_eq!(result.failures()[0].path, PathBuf::from("a.heic"));
        assert_eq!(result.failures()[1].path, PathBuf::from("z.heic"));
        assert_eq!(result.format_summary(), "Attempted: 3 | Converted: 1 | Failed: 2");
    }
}
