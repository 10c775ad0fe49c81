//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con tutti i parametri di conversione
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Fornisce valori di default sensati per tutti i parametri
//!
//! ## Parametri di configurazione:
//! - `quality`: Qualità JPEG (1-100, default: 50)
//! - `workers`: Numero di worker paralleli (default: 4, 0 viene portato a 1)
//! - `retries`: Tentativi extra per errori transitori (default: 0 = nessun retry)
//! - `retry_backoff_ms`: Attesa lineare tra i tentativi (default: 250ms)
//! - `remove_failed_output`: Cancella il JPEG se la copia dei timestamp fallisce (default: false)
//! - `json_output`: Output JSON line-based per uso programmatico (default: false)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     quality: 85,
//!     workers: 8,
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Name of the folder created inside the source directory
pub const DESTINATION_DIR_NAME: &str = "ConvertedFiles";

/// Configuration for batch conversion
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JPEG quality (1-100)
    pub quality: u8,
    /// Number of parallel workers (0 is clamped to 1 by the coordinator)
    pub workers: usize,
    /// Extra attempts for transient failures (0 = attempt once)
    pub retries: u32,
    /// Linear backoff between attempts, in milliseconds
    pub retry_backoff_ms: u64,
    /// Delete the written JPEG when the timestamp copy fails
    pub remove_failed_output: bool,
    /// Output progress and status as JSON for programmatic use
    pub json_output: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            quality: 50,
            workers: 4,
            retries: 0,
            retry_backoff_ms: 250,
            remove_failed_output: false,
            json_output: false,
        }
    }
}

impl Config {
    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.quality == 0 || self.quality > 100 {
            return Err(anyhow::anyhow!("JPEG quality must be between 1 and 100"));
        }

        Ok(())
    }

    /// Backoff before attempt `attempt` (1-based retry counter)
    pub fn retry_backoff(&self, attempt: u32) -> Duration {
        Duration::from_millis(self.retry_backoff_ms.saturating_mul(u64::from(attempt)))
    }

    /// Default config file location (`<config_dir>/heic-batch/config.json`)
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("heic-batch").join("config.json"))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}
