//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore custom dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce `PlanError` per gli errori di pre-flight (terminali, nessun worker avviato)
//! - Definisce `ConvertError` per gli errori del singolo file (mai terminali)
//! - Integra con `thiserror` per messaggi descrittivi e automatic conversion
//!
//! ## Categorie di errori di pre-flight:
//! - `InvalidDirectory`: La directory sorgente non esiste o non è una directory
//! - `NoEligibleFiles`: Nessun file HEIC trovato
//! - `ConsentDenied`: L'utente ha rifiutato di sovrascrivere `ConvertedFiles`
//! - `Io`: Impossibile preparare la directory di destinazione
//!
//! ## Categorie di errori per file:
//! - `Decode`: Sorgente illeggibile, corrotta o formato non supportato
//! - `Encode`: Scrittura JPEG fallita (disco pieno, permessi, etc.)
//! - `Metadata`: Copia EXIF o timestamp fallita
//! - `Cancelled`: Task non avviato perché è arrivato uno stop signal
//! - `Panicked`: Il worker è andato in panic durante la conversione
//!
//! ## Esempio:
//! ```rust,ignore
//! if !source_dir.is_dir() {
//!     return Err(PlanError::InvalidDirectory(source_dir.to_path_buf()));
//! }
//! ```

use std::path::PathBuf;

/// Errors that abort a batch before any worker starts
#[derive(thiserror::Error, Debug)]
pub enum PlanError {
    #[error("Directory '{}' does not exist or is not a directory", .0.display())]
    InvalidDirectory(PathBuf),

    #[error("No HEIC files found in '{}'", .0.display())]
    NoEligibleFiles(PathBuf),

    #[error("Existing output folder '{}' kept, conversion aborted", .0.display())]
    ConsentDenied(PathBuf),

    #[error("IO error preparing '{}': {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Per-file conversion errors, always folded into a `ConversionOutcome`
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ConvertError {
    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Encode error: {0}")]
    Encode(String),

    #[error("Metadata error: {0}")]
    Metadata(String),

    #[error("Cancelled before start")]
    Cancelled,

    #[error("Worker panicked: {0}")]
    Panicked(String),
}

impl ConvertError {
    /// Whether a retry could plausibly succeed.
    /// Corrupt sources stay corrupt, cancellations and panics are final.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Encode(_) | Self::Metadata(_))
    }

    /// Short machine-friendly name of the error kind
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::Encode(_) => "encode",
            Self::Metadata(_) => "metadata",
            Self::Cancelled => "cancelled",
            Self::Panicked(_) => "panicked",
        }
    }
}
