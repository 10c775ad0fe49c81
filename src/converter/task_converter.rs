//! # Task Converter Module
//!
//! Worker per la conversione di singoli file.
//! Separato dal coordinatore per maggiore modularità: qui ogni errore del
//! singolo file diventa un `ConversionOutcome`, niente risale al pool.

use crate::{
    codec::Codec,
    config::Config,
    error::ConvertError,
    metadata,
    outcome::{ConversionOutcome, ConversionTask},
};
use std::sync::Arc;
use tracing::{debug, error, warn};

/// Converts one task at a time; shared by every worker of a batch
pub struct TaskConverter {
    pub config: Config,
    codec: Arc<dyn Codec>,
}

impl TaskConverter {
    pub fn new(codec: Arc<dyn Codec>, config: &Config) -> Self {
        Self {
            config: config.clone(),
            codec,
        }
    }

    /// Convert a single task. Blocking; never returns an error.
    pub fn convert(&self, task: &ConversionTask) -> ConversionOutcome {
        let source = task.source_path();
        let mut attempt = 0;

        loop {
            match self.try_convert(task) {
                Ok(()) => {
                    debug!("[OK] {} -> {}", source.display(), task.destination_path().display());
                    return ConversionOutcome::success(source.to_path_buf());
                }
                Err(e) if e.is_transient() && attempt < self.config.retries => {
                    attempt += 1;
                    let backoff = self.config.retry_backoff(attempt);
                    warn!(
                        "Retrying '{}' in {:?} (attempt {} of {}): {}",
                        source.display(),
                        backoff,
                        attempt,
                        self.config.retries,
                        e
                    );
                    std::thread::sleep(backoff);
                }
                Err(e) => {
                    error!("Error converting '{}': {}", source.display(), e);
                    return ConversionOutcome::failure(source.to_path_buf(), e);
                }
            }
        }
    }

    fn try_convert(&self, task: &ConversionTask) -> Result<(), ConvertError> {
        let source = task.source_path();
        let destination = task.destination_path();

        self.codec.transcode(source, destination, task.quality())?;

        if let Err(e) = metadata::copy_timestamps(source, destination) {
            if self.config.remove_failed_output {
                match std::fs::remove_file(destination) {
                    Ok(()) => debug!("Removed {} after timestamp failure", destination.display()),
                    Err(rm) => warn!("Could not remove {}: {}", destination.display(), rm),
                }
            }
            return Err(e);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use filetime::FileTime;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tempfile::TempDir;

    /// Copies the source bytes; fails on sources containing "corrupt"
    struct CopyCodec;

    impl Codec for CopyCodec {
        fn source_extension(&self) -> &str {
            "heic"
        }

        fn destination_extension(&self) -> &str {
            "jpg"
        }

        fn transcode(&self, source: &Path, destination: &Path, _quality: u8) -> Result<(), ConvertError> {
            let bytes = std::fs::read(source).map_err(|e| ConvertError::Decode(e.to_string()))?;
            if bytes.starts_with(b"corrupt") {
                return Err(ConvertError::Decode("corrupt source".into()));
            }
            std::fs::write(destination, bytes).map_err(|e| ConvertError::Encode(e.to_string()))
        }
    }

    /// Fails with an encode error a fixed number of times, then succeeds
    struct FlakyCodec {
        failures_left: AtomicU32,
        calls: AtomicU32,
    }

    impl Codec for FlakyCodec {
        fn source_extension(&self) -> &str {
            "heic"
        }

        fn destination_extension(&self) -> &str {
            "jpg"
        }

        fn transcode(&self, source: &Path, destination: &Path, q: u8) -> Result<(), ConvertError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.failures_left.load(Ordering::SeqCst) > 0 {
                self.failures_left.fetch_sub(1, Ordering::SeqCst);
                return Err(ConvertError::Encode("disk busy".into()));
            }
            CopyCodec.transcode(source, destination, q)
        }
    }

    fn task_in(dir: &TempDir, name: &str, content: &[u8]) -> ConversionTask {
        let source = dir.path().join(format!("{}.heic", name));
        std::fs::write(&source, content).unwrap();
        ConversionTask::new(source, dir.path().join(format!("{}.jpg", name)), 50)
    }

    #[test]
    fn test_success_copies_timestamps() {
        let dir = TempDir::new().unwrap();
        let task = task_in(&dir, "a", b"pixels");
        let mtime = FileTime::from_unix_time(1_400_000_000, 0);
        filetime::set_file_times(task.source_path(), mtime, mtime).unwrap();

        let converter = TaskConverter::new(Arc::new(CopyCodec), &Config::default());
        let outcome = converter.convert(&task);

        assert!(outcome.succeeded());
        let meta = std::fs::metadata(task.destination_path()).unwrap();
        assert_eq!(FileTime::from_last_modification_time(&meta), mtime);
    }

    #[test]
    fn test_decode_failure_becomes_outcome() {
        let dir = TempDir::new().unwrap();
        let task = task_in(&dir, "bad", b"corrupt data");

        let converter = TaskConverter::new(Arc::new(CopyCodec), &Config::default());
        let outcome = converter.convert(&task);

        assert!(!outcome.succeeded());
        assert!(matches!(outcome.error(), Some(ConvertError::Decode(_))));
        assert!(!task.destination_path().exists());
    }

    #[test]
    fn test_no_retry_by_default() {
        let dir = TempDir::new().unwrap();
        let task = task_in(&dir, "a", b"pixels");
        let codec = Arc::new(FlakyCodec {
            failures_left: AtomicU32::new(1),
            calls: AtomicU32::new(0),
        });

        let converter = TaskConverter::new(codec.clone(), &Config::default());
        assert!(!converter.convert(&task).succeeded());
        assert_eq!(codec.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_bounded_retry_recovers_transient_errors() {
        let dir = TempDir::new().unwrap();
        let task = task_in(&dir, "a", b"pixels");
        let codec = Arc::new(FlakyCodec {
            failures_left: AtomicU32::new(2),
            calls: AtomicU32::new(0),
        });
        let config = Config {
            retries: 2,
            retry_backoff_ms: 1,
            ..Default::default()
        };

        let converter = TaskConverter::new(codec.clone(), &config);
        assert!(converter.convert(&task).succeeded());
        assert_eq!(codec.calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_decode_errors_are_not_retried() {
        let dir = TempDir::new().unwrap();
        let task = task_in(&dir, "bad", b"corrupt");
        let config = Config {
            retries: 5,
            retry_backoff_ms: 1,
            ..Default::default()
        };

        let converter = TaskConverter::new(Arc::new(CopyCodec), &config);
        let outcome = converter.convert(&task);
        assert!(matches!(outcome.error(), Some(ConvertError::Decode(_))));
    }

    /// Writes the destination, then deletes the source so the stat fails
    struct VanishingSourceCodec;

    impl Codec for VanishingSourceCodec {
        fn source_extension(&self) -> &str {
            "heic"
        }

        fn destination_extension(&self) -> &str {
            "jpg"
        }

        fn transcode(&self, source: &Path, destination: &Path, _q: u8) -> Result<(), ConvertError> {
            std::fs::write(destination, b"jpeg").map_err(|e| ConvertError::Encode(e.to_string()))?;
            std::fs::remove_file(source).map_err(|e| ConvertError::Encode(e.to_string()))
        }
    }

    #[test]
    fn test_timestamp_failure_keeps_output_by_default() {
        let dir = TempDir::new().unwrap();
        let task = task_in(&dir, "a", b"pixels");

        let converter = TaskConverter::new(Arc::new(VanishingSourceCodec), &Config::default());
        let outcome = converter.convert(&task);

        assert!(matches!(outcome.error(), Some(ConvertError::Metadata(_))));
        assert!(task.destination_path().exists());
    }

    #[test]
    fn test_timestamp_failure_can_remove_output() {
        let dir = TempDir::new().unwrap();
        let task = task_in(&dir, "a", b"pixels");
        let config = Config {
            remove_failed_output: true,
            ..Default::default()
        };

        let converter = TaskConverter::new(Arc::new(VanishingSourceCodec), &config);
        let outcome = converter.convert(&task);

        assert!(matches!(outcome.error(), Some(ConvertError::Metadata(_))));
        assert!(!task.destination_path().exists());
    }
}
