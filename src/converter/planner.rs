//! # Batch Planner Module
//!
//! Centralizza la logica di pre-flight e il calcolo dei path di output.
//!
//! ## Fasi:
//! 1. **Pre-flight** (`preflight`): valida la directory, trova le sorgenti,
//!    segnala se `ConvertedFiles` esiste già. Nessuna modifica al filesystem.
//! 2. **Plan** (`plan`): applica la decisione del chiamante sulla directory
//!    esistente, crea la directory di destinazione (una volta sola, prima dei
//!    worker), costruisce la worklist.
//!
//! ## Regole della worklist:
//! - Destinazione = `<source_dir>/ConvertedFiles/<stem>.jpg`
//! - Se la destinazione esiste già il file viene saltato (run idempotente)
//! - Un output esistente resta alla sorgente da cui è stato prodotto
//!   (stesso mtime, copiato in conversione), anche se nel frattempo è
//!   comparsa una sorgente con nome in collisione
//! - Collisioni di nome (case-insensitive) risolte con `<stem>_N.jpg`,
//!   nell'ordine alfabetico delle sorgenti, quindi stabile tra un run e l'altro

use crate::{
    codec::Codec,
    config::DESTINATION_DIR_NAME,
    error::PlanError,
    file_manager::FileManager,
    outcome::ConversionTask,
};
use filetime::FileTime;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What to do when the destination directory is already there
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExistingDestination {
    /// Consent granted: delete it and start from an empty directory
    Recreate,
    /// Reuse it; sources whose output exists are skipped
    Keep,
    /// Consent denied: abort without touching anything
    Abort,
}

/// Result of the read-only pre-flight check
#[derive(Debug, Clone)]
pub struct Preflight {
    source_dir: PathBuf,
    destination_dir: PathBuf,
    sources: Vec<PathBuf>,
    destination_exists: bool,
}

impl Preflight {
    pub fn source_dir(&self) -> &Path {
        &self.source_dir
    }

    pub fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    /// Eligible sources, sorted by file name
    pub fn sources(&self) -> &[PathBuf] {
        &self.sources
    }

    /// True when a previous run left a destination directory behind;
    /// the caller must decide what happens to it before planning.
    pub fn destination_exists(&self) -> bool {
        self.destination_exists
    }
}

/// The worklist of one batch run
#[derive(Debug, Clone)]
pub struct Plan {
    destination_dir: PathBuf,
    tasks: Vec<ConversionTask>,
    already_converted: Vec<PathBuf>,
    renamed: Vec<(PathBuf, PathBuf)>,
}

impl Plan {
    pub fn destination_dir(&self) -> &Path {
        &self.destination_dir
    }

    pub fn tasks(&self) -> &[ConversionTask] {
        &self.tasks
    }

    pub fn into_tasks(self) -> Vec<ConversionTask> {
        self.tasks
    }

    /// Sources skipped because their output already exists
    pub fn already_converted(&self) -> &[PathBuf] {
        &self.already_converted
    }

    /// (source, destination) pairs that got a disambiguating suffix
    pub fn renamed(&self) -> &[(PathBuf, PathBuf)] {
        &self.renamed
    }
}

/// Builds worklists for one codec at one quality
pub struct Planner {
    source_extension: String,
    destination_extension: String,
    quality: u8,
}

impl Planner {
    pub fn new(codec: &dyn Codec, quality: u8) -> Self {
        Self {
            source_extension: codec.source_extension().to_string(),
            destination_extension: codec.destination_extension().to_string(),
            quality,
        }
    }

    /// Validate `source_dir` and enumerate its sources without modifying anything
    pub fn preflight(&self, source_dir: &Path) -> Result<Preflight, PlanError> {
        if !source_dir.is_dir() {
            return Err(PlanError::InvalidDirectory(source_dir.to_path_buf()));
        }

        let sources = FileManager::find_source_files(source_dir, &self.source_extension)
            .map_err(|source| PlanError::Io {
                path: source_dir.to_path_buf(),
                source,
            })?;

        if sources.is_empty() {
            return Err(PlanError::NoEligibleFiles(source_dir.to_path_buf()));
        }

        let destination_dir = source_dir.join(DESTINATION_DIR_NAME);
        let destination_exists = destination_dir.exists();

        debug!(
            "Preflight {}: {} sources, destination exists: {}",
            source_dir.display(),
            sources.len(),
            destination_exists
        );

        Ok(Preflight {
            source_dir: source_dir.to_path_buf(),
            destination_dir,
            sources,
            destination_exists,
        })
    }

    /// Prepare the destination directory and build the worklist
    pub fn plan(&self, preflight: Preflight, decision: ExistingDestination) -> Result<Plan, PlanError> {
        let Preflight {
            destination_dir,
            sources,
            destination_exists,
            ..
        } = preflight;

        if destination_exists {
            match decision {
                ExistingDestination::Abort => {
                    info!("Keeping existing {}, nothing converted", destination_dir.display());
                    return Err(PlanError::ConsentDenied(destination_dir));
                }
                ExistingDestination::Recreate => {
                    info!("Deleting existing {}", destination_dir.display());
                    remove_existing(&destination_dir)?;
                }
                ExistingDestination::Keep => {
                    info!("Reusing existing {}", destination_dir.display());
                }
            }
        }

        std::fs::create_dir_all(&destination_dir).map_err(|source| PlanError::Io {
            path: destination_dir.clone(),
            source,
        })?;

        let mut used_names = HashSet::new();
        let mut tasks = Vec::with_capacity(sources.len());
        let mut already_converted = Vec::new();
        let mut renamed = Vec::new();

        // existing outputs go back to the source they were made from first
        let owned: Vec<Option<(usize, PathBuf)>> = sources
            .iter()
            .map(|source| {
                let found = self.find_own_output(source, &destination_dir, &used_names);
                if let Some((_, ref destination)) = found {
                    used_names.insert(name_key(destination));
                }
                found
            })
            .collect();

        for (source, own) in sources.into_iter().zip(owned) {
            let (suffix, destination, is_own) = match own {
                Some((suffix, destination)) => (suffix, destination, true),
                None => {
                    let mut suffix = 0;
                    let destination = loop {
                        let candidate = destination_dir.join(FileManager::destination_file_name(
                            &source,
                            &self.destination_extension,
                            suffix,
                        ));
                        if used_names.insert(name_key(&candidate)) {
                            break candidate;
                        }
                        suffix += 1;
                    };
                    (suffix, destination, false)
                }
            };

            if suffix > 0 {
                warn!(
                    "Name collision: {} -> {}",
                    source.display(),
                    destination.display()
                );
                renamed.push((source.clone(), destination.clone()));
            }

            if is_own || destination.exists() {
                debug!("[SKIP] Output already exists: {} -> {}", source.display(), destination.display());
                already_converted.push(source);
                continue;
            }

            tasks.push(ConversionTask::new(source, destination, self.quality));
        }

        info!(
            "Planned {} conversions ({} already converted)",
            tasks.len(),
            already_converted.len()
        );

        Ok(Plan {
            destination_dir,
            tasks,
            already_converted,
            renamed,
        })
    }
}

impl Planner {
    /// Walk `<stem>.jpg`, `<stem>_1.jpg`, ... while they exist and return the
    /// first unclaimed one carrying the source's mtime (copied at conversion)
    fn find_own_output(
        &self,
        source: &Path,
        destination_dir: &Path,
        used_names: &HashSet<String>,
    ) -> Option<(usize, PathBuf)> {
        let source_mtime = modification_time(source)?;

        for suffix in 0.. {
            let candidate = destination_dir.join(FileManager::destination_file_name(
                source,
                &self.destination_extension,
                suffix,
            ));
            if !candidate.exists() {
                return None;
            }
            if !used_names.contains(&name_key(&candidate))
                && modification_time(&candidate) == Some(source_mtime)
            {
                return Some((suffix, candidate));
            }
        }
        None
    }
}

/// Collisions are case-insensitive
fn name_key(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().to_lowercase())
        .unwrap_or_default()
}

fn modification_time(path: &Path) -> Option<FileTime> {
    std::fs::metadata(path)
        .ok()
        .map(|meta| FileTime::from_last_modification_time(&meta))
}

fn remove_existing(path: &Path) -> Result<(), PlanError> {
    let result = if path.is_dir() {
        std::fs::remove_dir_all(path)
    } else {
        std::fs::remove_file(path)
    };
    result.map_err(|source| PlanError::Io {
        path: path.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::HeicToJpeg;
    use filetime::FileTime;
    use tempfile::TempDir;

    fn planner() -> Planner {
        Planner::new(&HeicToJpeg, 50)
    }

    fn touch(path: &Path) {
        std::fs::write(path, b"x").unwrap();
    }

    #[test]
    fn test_invalid_directory() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("missing");
        assert!(matches!(
            planner().preflight(&missing),
            Err(PlanError::InvalidDirectory(_))
        ));

        let file = dir.path().join("file.heic");
        touch(&file);
        assert!(matches!(
            planner().preflight(&file),
            Err(PlanError::InvalidDirectory(_))
        ));
    }

    #[test]
    fn test_no_eligible_files_creates_nothing() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("photo.jpg"));

        assert!(matches!(
            planner().preflight(dir.path()),
            Err(PlanError::NoEligibleFiles(_))
        ));
        assert!(!dir.path().join(DESTINATION_DIR_NAME).exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_directory_is_io_error() {
        use std::os::unix::fs::PermissionsExt;

        let dir = TempDir::new().unwrap();
        let locked = dir.path().join("locked");
        std::fs::create_dir(&locked).unwrap();
        touch(&locked.join("a.heic"));
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o000)).unwrap();

        // root ignores directory permissions
        let readable = std::fs::read_dir(&locked).is_ok();
        let result = planner().preflight(&locked);
        std::fs::set_permissions(&locked, std::fs::Permissions::from_mode(0o755)).unwrap();
        if readable {
            return;
        }

        assert!(matches!(result, Err(PlanError::Io { .. })));
        assert!(!locked.join(DESTINATION_DIR_NAME).exists());
    }

    #[test]
    fn test_fresh_directory_plans_every_source() {
        let dir = TempDir::new().unwrap();
        for name in ["a.heic", "b.HEIC", "c.Heic"] {
            touch(&dir.path().join(name));
        }

        let preflight = planner().preflight(dir.path()).unwrap();
        assert!(!preflight.destination_exists());
        assert!(!preflight.destination_dir().exists());

        let plan = planner().plan(preflight, ExistingDestination::Abort).unwrap();
        assert!(plan.destination_dir().is_dir());
        assert_eq!(plan.tasks().len(), 3);
        assert_eq!(
            plan.tasks()[1].destination_path(),
            dir.path().join(DESTINATION_DIR_NAME).join("b.jpg")
        );
        assert_eq!(plan.tasks()[0].quality(), 50);
    }

    #[test]
    fn test_existing_output_is_skipped() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.heic"));
        touch(&dir.path().join("b.heic"));
        let out = dir.path().join(DESTINATION_DIR_NAME);
        std::fs::create_dir(&out).unwrap();
        touch(&out.join("a.jpg"));

        let preflight = planner().preflight(dir.path()).unwrap();
        assert!(preflight.destination_exists());

        let plan = planner().plan(preflight, ExistingDestination::Keep).unwrap();
        assert_eq!(plan.tasks().len(), 1);
        assert_eq!(plan.tasks()[0].source_path(), dir.path().join("b.heic"));
        assert_eq!(plan.already_converted(), &[dir.path().join("a.heic")]);
    }

    #[test]
    fn test_consent_denied_leaves_directory_untouched() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.heic"));
        let out = dir.path().join(DESTINATION_DIR_NAME);
        std::fs::create_dir(&out).unwrap();
        touch(&out.join("keep.me"));

        let preflight = planner().preflight(dir.path()).unwrap();
        let err = planner().plan(preflight, ExistingDestination::Abort).unwrap_err();
        assert!(matches!(err, PlanError::ConsentDenied(_)));
        assert!(out.join("keep.me").exists());
    }

    #[test]
    fn test_recreate_wipes_previous_output() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("a.heic"));
        let out = dir.path().join(DESTINATION_DIR_NAME);
        std::fs::create_dir(&out).unwrap();
        touch(&out.join("a.jpg"));
        touch(&out.join("stale.jpg"));

        let preflight = planner().preflight(dir.path()).unwrap();
        let plan = planner().plan(preflight, ExistingDestination::Recreate).unwrap();
        assert_eq!(plan.tasks().len(), 1);
        assert!(out.is_dir());
        assert!(!out.join("stale.jpg").exists());
    }

    #[test]
    fn test_colliding_names_get_unique_destinations() {
        let dir = TempDir::new().unwrap();
        for name in ["IMG.HEIC", "IMG.heic", "IMG_1.heic"] {
            touch(&dir.path().join(name));
        }
        // on case-insensitive filesystems only one of the first two exists
        let sources = planner().preflight(dir.path()).unwrap().sources().len();

        let preflight = planner().preflight(dir.path()).unwrap();
        let plan = planner().plan(preflight, ExistingDestination::Keep).unwrap();
        assert_eq!(plan.tasks().len(), sources);

        let destinations: HashSet<String> = plan
            .tasks()
            .iter()
            .map(|t| t.destination_path().to_string_lossy().to_lowercase())
            .collect();
        assert_eq!(destinations.len(), plan.tasks().len());

        let sources: HashSet<_> = plan.tasks().iter().map(|t| t.source_path().to_path_buf()).collect();
        assert_eq!(sources.len(), plan.tasks().len());
    }

    #[test]
    fn test_collision_names_are_stable_across_runs() {
        let dir = TempDir::new().unwrap();
        touch(&dir.path().join("x.HEIC"));
        touch(&dir.path().join("x.heic"));

        let first = planner()
            .plan(planner().preflight(dir.path()).unwrap(), ExistingDestination::Keep)
            .unwrap();
        for task in first.tasks() {
            touch(task.destination_path());
        }

        let second = planner()
            .plan(planner().preflight(dir.path()).unwrap(), ExistingDestination::Keep)
            .unwrap();
        assert!(second.tasks().is_empty());
        assert_eq!(second.already_converted().len(), first.tasks().len());
    }

    #[test]
    fn test_kept_output_stays_with_its_source() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("x.heic");
        touch(&original);
        let taken = FileTime::from_unix_time(1_600_000_000, 0);
        filetime::set_file_times(&original, taken, taken).unwrap();

        let first = planner()
            .plan(planner().preflight(dir.path()).unwrap(), ExistingDestination::Keep)
            .unwrap();
        let output = first.tasks()[0].destination_path().to_path_buf();
        touch(&output);
        filetime::set_file_times(&output, taken, taken).unwrap();

        let added = dir.path().join("x.HEIC");
        touch(&added);
        let later = FileTime::from_unix_time(1_700_000_000, 0);
        filetime::set_file_times(&added, later, later).unwrap();
        // case-insensitive filesystems have a single source here
        if planner().preflight(dir.path()).unwrap().sources().len() < 2 {
            return;
        }

        let second = planner()
            .plan(planner().preflight(dir.path()).unwrap(), ExistingDestination::Keep)
            .unwrap();
        assert_eq!(second.already_converted(), &[original]);
        assert_eq!(second.tasks().len(), 1);
        assert_eq!(second.tasks()[0].source_path(), added);
        assert_eq!(
            second.tasks()[0].destination_path(),
            dir.path().join(DESTINATION_DIR_NAME).join("x_1.jpg")
        );
        assert_eq!(output, dir.path().join(DESTINATION_DIR_NAME).join("x.jpg"));
    }

    #[test]
    fn test_owned_outputs_survive_a_third_run() {
        let dir = TempDir::new().unwrap();
        let stamps = [
            ("x.HEIC", FileTime::from_unix_time(1_700_000_000, 0)),
            ("x.heic", FileTime::from_unix_time(1_600_000_000, 0)),
        ];
        for (name, time) in stamps {
            let path = dir.path().join(name);
            touch(&path);
            filetime::set_file_times(&path, time, time).unwrap();
        }
        if planner().preflight(dir.path()).unwrap().sources().len() < 2 {
            return;
        }

        let first = planner()
            .plan(planner().preflight(dir.path()).unwrap(), ExistingDestination::Keep)
            .unwrap();
        for task in first.tasks() {
            touch(task.destination_path());
            let meta = std::fs::metadata(task.source_path()).unwrap();
            let time = FileTime::from_last_modification_time(&meta);
            filetime::set_file_times(task.destination_path(), time, time).unwrap();
        }

        let second = planner()
            .plan(planner().preflight(dir.path()).unwrap(), ExistingDestination::Keep)
            .unwrap();
        assert!(second.tasks().is_empty());
        assert_eq!(second.already_converted().len(), 2);
    }
}
