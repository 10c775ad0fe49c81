//! # JSON Output Module
//!
//! Questo modulo gestisce l'output strutturato in JSON per l'uso programmatico
//! (un oggetto per riga su stdout, i log restano su stderr).
//!
//! ## Tipi di messaggi:
//! - `start`: Inizio conversione (numero di file in worklist)
//! - `file_complete`: Fine elaborazione di un file (successo o errore)
//! - `complete`: Fine batch con conteggi e motivi dei fallimenti
//! - `no_work`: Niente da fare (nessun HEIC, oppure già tutto convertito)
//! - `error`: Errore di pre-flight

use crate::outcome::{BatchResult, ConversionOutcome, Failure};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Why a run had nothing to convert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoWorkReason {
    NoEligibleFiles,
    AllAlreadyConverted,
}

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum JsonMessage {
    /// Inizio della conversione
    #[serde(rename = "start")]
    Start {
        input_dir: PathBuf,
        total_files: usize,
        quality: u8,
        workers: usize,
    },

    /// Fine elaborazione di un file specifico
    #[serde(rename = "file_complete")]
    FileComplete {
        path: PathBuf,
        succeeded: bool,
        error: Option<String>,
    },

    /// Batch completato
    #[serde(rename = "complete")]
    Complete {
        attempted: usize,
        succeeded: usize,
        failed: usize,
        skipped: usize,
        failures: Vec<Failure>,
        duration_seconds: f64,
    },

    /// Nessun lavoro da fare
    #[serde(rename = "no_work")]
    NoWork { reason: NoWorkReason, skipped: usize },

    /// Errore generale
    #[serde(rename = "error")]
    Error {
        message: String,
        details: Option<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(input_dir: PathBuf, total_files: usize, quality: u8, workers: usize) -> Self {
        Self::Start {
            input_dir,
            total_files,
            quality,
            workers,
        }
    }

    pub fn file_complete(outcome: &ConversionOutcome) -> Self {
        Self::FileComplete {
            path: outcome.source_path().to_path_buf(),
            succeeded: outcome.succeeded(),
            error: outcome.error_detail(),
        }
    }

    pub fn complete(result: &BatchResult, skipped: usize, duration_seconds: f64) -> Self {
        Self::Complete {
            attempted: result.attempted(),
            succeeded: result.succeeded(),
            failed: result.failed(),
            skipped,
            failures: result.failures().to_vec(),
            duration_seconds,
        }
    }

    pub fn no_work(reason: NoWorkReason, skipped: usize) -> Self {
        Self::NoWork { reason, skipped }
    }

    pub fn error(message: String, details: Option<String>) -> Self {
        Self::Error { message, details }
    }
}
