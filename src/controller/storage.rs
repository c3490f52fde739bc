//! Private storage for imported model files.
//!
//! Files are keyed by their original filename under the models directory.
//! Copies are staged in the temp directory and renamed into place so a
//! failed copy never leaves a truncated model behind.

use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::error::FileSystemError;

#[derive(Debug, Clone)]
pub struct ModelStorage {
    models_dir: PathBuf,
    temp_dir: PathBuf,
}

impl ModelStorage {
    pub fn new(models_dir: PathBuf, temp_dir: PathBuf) -> Self {
        Self {
            models_dir,
            temp_dir,
        }
    }

    pub fn models_dir(&self) -> &Path {
        &self.models_dir
    }

    pub fn temp_dir(&self) -> &Path {
        &self.temp_dir
    }

    /// Location a model with this filename lives at
    pub fn path_for(&self, filename: &str) -> Result<PathBuf, FileSystemError> {
        check_filename(filename)?;
        Ok(self.models_dir.join(filename))
    }

    pub fn contains(&self, filename: &str) -> bool {
        self.path_for(filename).map(|p| p.is_file()).unwrap_or(false)
    }

    /// Copy `source` into storage as `filename`, replacing any existing file
    pub fn store(&self, source: &Path, filename: &str) -> Result<PathBuf, FileSystemError> {
        let destination = self.path_for(filename)?;
        create_dir(&self.models_dir)?;
        create_dir(&self.temp_dir).map_err(|e| match e {
            FileSystemError::AccessDenied { .. } => e,
            _ => FileSystemError::TempFileCreationFailed {
                reason: format!("cannot create {}", self.temp_dir.display()),
            },
        })?;

        let staged = self.temp_dir.join(format!("{}.part", Uuid::new_v4()));
        let copy_failed = |e: io::Error| FileSystemError::CopyFailed {
            source_path: source.display().to_string(),
            destination: destination.display().to_string(),
            reason: e.to_string(),
        };

        if let Err(e) = fs::copy(source, &staged) {
            discard_staged(&staged);
            return Err(match e.kind() {
                ErrorKind::NotFound => FileSystemError::PathDoesNotExist {
                    path: source.display().to_string(),
                },
                ErrorKind::PermissionDenied => FileSystemError::AccessDenied {
                    path: source.display().to_string(),
                },
                _ => copy_failed(e),
            });
        }

        // rename does not replace an existing file on every platform
        if destination.exists() {
            if let Err(e) = fs::remove_file(&destination) {
                discard_staged(&staged);
                return Err(copy_failed(e));
            }
        }

        if let Err(e) = fs::rename(&staged, &destination) {
            discard_staged(&staged);
            return Err(copy_failed(e));
        }

        debug!(file = %destination.display(), "model stored");
        Ok(destination)
    }

    /// Remove one model file. Returns false if it was already gone.
    pub fn remove(&self, filename: &str) -> Result<bool, FileSystemError> {
        let path = self.path_for(filename)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(false),
            Err(e) if e.kind() == ErrorKind::PermissionDenied => {
                Err(FileSystemError::AccessDenied {
                    path: path.display().to_string(),
                })
            }
            Err(e) => Err(FileSystemError::DeleteFailed {
                path: path.display().to_string(),
                reason: e.to_string(),
            }),
        }
    }

    /// Remove every file in the models directory, returning how many went
    pub fn remove_all(&self) -> Result<usize, FileSystemError> {
        clear_files(&self.models_dir)
    }

    /// Discard staged copies left behind by interrupted imports
    pub fn clear_temp(&self) -> Result<usize, FileSystemError> {
        clear_files(&self.temp_dir)
    }
}

fn check_filename(filename: &str) -> Result<(), FileSystemError> {
    let invalid = filename.is_empty()
        || filename == "."
        || filename == ".."
        || filename.contains(['/', '\\', '\0']);
    if invalid {
        return Err(FileSystemError::InvalidPath {
            path: filename.to_string(),
        });
    }
    Ok(())
}

/// Remove a partial copy; a missing file is already clean
fn discard_staged(staged: &Path) {
    match fs::remove_file(staged) {
        Ok(()) => {}
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => warn!(file = %staged.display(), "could not remove partial copy: {}", e),
    }
}

fn create_dir(dir: &Path) -> Result<(), FileSystemError> {
    fs::create_dir_all(dir).map_err(|e| match e.kind() {
        ErrorKind::PermissionDenied => FileSystemError::AccessDenied {
            path: dir.display().to_string(),
        },
        _ => FileSystemError::InvalidPath {
            path: dir.display().to_string(),
        },
    })
}

fn clear_files(dir: &Path) -> Result<usize, FileSystemError> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
        Err(e) => {
            return Err(FileSystemError::DeleteFailed {
                path: dir.display().to_string(),
                reason: e.to_string(),
            })
        }
    };

    let mut removed = 0;
    let mut first_error = None;
    for entry in entries.flatten() {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        match fs::remove_file(&path) {
            Ok(()) => removed += 1,
            Err(e) => {
                warn!(file = %path.display(), "could not remove: {}", e);
                first_error.get_or_insert(FileSystemError::DeleteFailed {
                    path: path.display().to_string(),
                    reason: e.to_string(),
                });
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(removed),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn storage(dir: &TempDir) -> ModelStorage {
        ModelStorage::new(dir.path().join("models"), dir.path().join("tmp"))
    }

    #[test]
    fn test_store_and_replace() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let first = dir.path().join("first.bin");
        let second = dir.path().join("second.bin");
        fs::write(&first, b"GGUF one").unwrap();
        fs::write(&second, b"GGUF two").unwrap();

        let path = storage.store(&first, "m.gguf").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"GGUF one");

        storage.store(&second, "m.gguf").unwrap();
        assert_eq!(fs::read(&path).unwrap(), b"GGUF two");
        assert!(storage.contains("m.gguf"));

        // Nothing left staged
        assert_eq!(storage.clear_temp().unwrap(), 0);
    }

    #[test]
    fn test_store_missing_source() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        let err = storage
            .store(&dir.path().join("nope.gguf"), "nope.gguf")
            .unwrap_err();
        assert!(matches!(err, FileSystemError::PathDoesNotExist { .. }));
        assert!(!storage.contains("nope.gguf"));
        assert_eq!(storage.clear_temp().unwrap(), 0);
    }

    #[test]
    fn test_rejects_path_like_filenames() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);

        for bad in ["", "..", "a/b.gguf", "..\\x.gguf"] {
            assert!(matches!(
                storage.path_for(bad),
                Err(FileSystemError::InvalidPath { .. })
            ));
        }
    }

    #[test]
    fn test_remove() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        let source = dir.path().join("src.gguf");
        fs::write(&source, b"GGUF").unwrap();
        storage.store(&source, "a.gguf").unwrap();

        assert!(storage.remove("a.gguf").unwrap());
        assert!(!storage.remove("a.gguf").unwrap());
    }

    #[test]
    fn test_remove_all_and_clear_temp() {
        let dir = TempDir::new().unwrap();
        let storage = storage(&dir);
        assert_eq!(storage.remove_all().unwrap(), 0);

        let source = dir.path().join("src.gguf");
        fs::write(&source, b"GGUF").unwrap();
        storage.store(&source, "a.gguf").unwrap();
        storage.store(&source, "b.gguf").unwrap();
        fs::write(storage.temp_dir().join("stale.part"), b"x").unwrap();

        assert_eq!(storage.remove_all().unwrap(), 2);
        assert_eq!(storage.clear_temp().unwrap(), 1);
        assert!(!storage.contains("a.gguf"));
    }
}
