//! # HEIC Batch Converter Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Gestione configurazione e validazione parametri
//! - `error`: Errori di pre-flight e errori per singolo file
//! - `outcome`: Task, outcome e risultato aggregato del batch
//! - `file_manager`: Discovery dei file HEIC e naming delle destinazioni
//! - `codec`: Conversione HEIC → JPEG di un singolo file
//! - `metadata`: EXIF e timestamp dalla sorgente alla destinazione
//! - `converter`: Planner, worker pool e orchestratore
//! - `progress` / `json_output`: Output per il binario
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use heic_batch::{BatchConverter, BatchRequest, Config, ExistingDestination, HeicToJpeg};
//!
//! let converter = BatchConverter::new(Config::default(), Arc::new(HeicToJpeg));
//! let report = converter
//!     .run_batch(&BatchRequest::new(&path, 50), |_| ExistingDestination::Keep)
//!     .await?;
//! ```

pub mod codec;
pub mod config;
pub mod converter;
pub mod error;
pub mod file_manager;
pub mod json_output;
pub mod metadata;
pub mod outcome;
pub mod progress;

pub use codec::{Codec, HeicToJpeg};
pub use config::Config;
pub use converter::{BatchConverter, BatchReport, BatchRequest, ExistingDestination};
pub use error::{ConvertError, PlanError};
pub use outcome::{BatchResult, ConversionOutcome, ConversionTask};
