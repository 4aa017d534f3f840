//! Binary resource directory.
//!
//! Binary documents are stored as plain files under a root directory,
//! mirroring their database path:
//!
//! ```text
//! <data_dir>/
//! ├─ fs/                 # live blobs: /db/test/LICENSE -> fs/db/test/LICENSE
//! └─ fs.journal/         # backups moved aside by replace and delete
//! ```
//!
//! A blob is never overwritten in place. Replace and delete first move the
//! old file into the backup area under a unique name; the backup area is
//! emptied once a checkpoint has made those moves unnecessary to undo.

use crate::error::{StorageError, StorageResult};
use std::fs::{self, File, OpenOptions};
use std::io::{self, Write};
use std::path::{Component, Path, PathBuf};
use uuid::Uuid;

/// Extension given to generated backup names.
const BACKUP_EXT: &str = "bak";

/// A directory of binary blobs plus its backup area.
#[derive(Debug, Clone)]
pub struct BlobDir {
    root: PathBuf,
    backups: PathBuf,
}

impl BlobDir {
    /// Opens a blob directory, creating both areas if needed.
    ///
    /// # Errors
    ///
    /// Returns an error if the directories cannot be created.
    pub fn open(root: &Path, backups: &Path) -> StorageResult<Self> {
        fs::create_dir_all(root)?;
        fs::create_dir_all(backups)?;
        Ok(Self {
            root: root.to_path_buf(),
            backups: backups.to_path_buf(),
        })
    }

    /// Returns the root of the live area.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Returns the backup area.
    #[must_use]
    pub fn backup_root(&self) -> &Path {
        &self.backups
    }

    /// Generates a backup name that is not in use.
    #[must_use]
    pub fn new_backup_name() -> String {
        format!("{}.{BACKUP_EXT}", Uuid::new_v4().simple())
    }

    /// Maps a database path such as `/db/test/LICENSE` onto the live area.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::InvalidPath`] for empty paths and for paths
    /// containing `.` or `..` segments.
    pub fn resolve(&self, path: &str) -> StorageResult<PathBuf> {
        let mut resolved = self.root.clone();
        let mut segments = 0usize;
        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if segment == "." || segment == ".." || segment.contains('\\') {
                return Err(StorageError::InvalidPath(path.to_string()));
            }
            resolved.push(segment);
            segments += 1;
        }
        if segments == 0 {
            return Err(StorageError::InvalidPath(path.to_string()));
        }
        Ok(resolved)
    }

    fn backup_path(&self, name: &str) -> StorageResult<PathBuf> {
        let mut components = Path::new(name).components();
        match (components.next(), components.next()) {
            (Some(Component::Normal(_)), None) => Ok(self.backups.join(name)),
            _ => Err(StorageError::InvalidPath(name.to_string())),
        }
    }

    /// Returns true if a blob exists at `path`.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid.
    pub fn exists(&self, path: &str) -> StorageResult<bool> {
        Ok(self.resolve(path)?.is_file())
    }

    /// Returns true if the named backup exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the name is not a single file name.
    pub fn backup_exists(&self, name: &str) -> StorageResult<bool> {
        Ok(self.backup_path(name)?.is_file())
    }

    /// Writes a new blob and syncs it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::AlreadyExists`] if a blob is already present;
    /// callers move the old one aside first.
    pub fn write(&self, path: &str, data: &[u8]) -> StorageResult<()> {
        let target = self.resolve(path)?;
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)
            .map_err(|e| match e.kind() {
                io::ErrorKind::AlreadyExists => StorageError::AlreadyExists(target.clone()),
                _ => StorageError::Io(e),
            })?;
        file.write_all(data)?;
        file.sync_all()?;
        drop(file);
        sync_parent(&target)
    }

    /// Reads a blob.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if there is no blob at `path`.
    pub fn read(&self, path: &str) -> StorageResult<Vec<u8>> {
        let target = self.resolve(path)?;
        fs::read(&target).map_err(|e| match e.kind() {
            io::ErrorKind::NotFound => StorageError::NotFound(target),
            _ => StorageError::Io(e),
        })
    }

    /// Removes a blob, returning whether one was there.
    ///
    /// # Errors
    ///
    /// Returns an error if the path is invalid or removal fails.
    pub fn remove(&self, path: &str) -> StorageResult<bool> {
        let target = self.resolve(path)?;
        match fs::remove_file(&target) {
            Ok(()) => {
                sync_parent(&target)?;
                Ok(true)
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Moves the blob at `path` into the backup area as `name`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the blob is missing and
    /// [`StorageError::AlreadyExists`] if the backup name is taken.
    pub fn move_to_backup(&self, path: &str, name: &str) -> StorageResult<()> {
        let source = self.resolve(path)?;
        let target = self.backup_path(name)?;
        if !source.is_file() {
            return Err(StorageError::NotFound(source));
        }
        if target.exists() {
            return Err(StorageError::AlreadyExists(target));
        }
        fs::rename(&source, &target)?;
        sync_parent(&source)?;
        sync_parent(&target)
    }

    /// Moves the named backup back to `path`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::NotFound`] if the backup is missing and
    /// [`StorageError::AlreadyExists`] if a blob occupies `path`.
    pub fn restore_backup(&self, name: &str, path: &str) -> StorageResult<()> {
        let source = self.backup_path(name)?;
        let target = self.resolve(path)?;
        if !source.is_file() {
            return Err(StorageError::NotFound(source));
        }
        if target.exists() {
            return Err(StorageError::AlreadyExists(target));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::rename(&source, &target)?;
        sync_parent(&source)?;
        sync_parent(&target)
    }

    /// Lists the names currently held in the backup area.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory cannot be read.
    pub fn backups(&self) -> StorageResult<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.backups)? {
            let entry = entry?;
            if entry.file_type()?.is_file() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Deletes every backup and returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns an error if a backup cannot be removed.
    pub fn clear_backups(&self) -> StorageResult<usize> {
        let names = self.backups()?;
        for name in &names {
            fs::remove_file(self.backups.join(name))?;
        }
        if !names.is_empty() {
            sync_dir(&self.backups)?;
        }
        Ok(names.len())
    }
}

fn sync_parent(path: &Path) -> StorageResult<()> {
    match path.parent() {
        Some(parent) => sync_dir(parent),
        None => Ok(()),
    }
}

#[cfg(unix)]
fn sync_dir(dir: &Path) -> StorageResult<()> {
    File::open(dir)?.sync_all()?;
    Ok(())
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> StorageResult<()> {
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::{tempdir, TempDir};

    fn blob_dir() -> (TempDir, BlobDir) {
        let dir = tempdir().unwrap();
        let blobs = BlobDir::open(&dir.path().join("fs"), &dir.path().join("fs.journal")).unwrap();
        (dir, blobs)
    }

    #[test]
    fn resolve_maps_database_paths() {
        let (_dir, blobs) = blob_dir();
        let resolved = blobs.resolve("/db/test/LICENSE").unwrap();
        assert_eq!(resolved, blobs.root().join("db").join("test").join("LICENSE"));
    }

    #[test]
    fn resolve_rejects_escapes() {
        let (_dir, blobs) = blob_dir();
        for bad in ["", "/", "/db/../etc", "/db/./x", "a\\b"] {
            assert!(matches!(blobs.resolve(bad), Err(StorageError::InvalidPath(_))), "{bad}");
        }
        assert!(blobs.backup_exists("../x").is_err());
    }

    #[test]
    fn write_never_overwrites() {
        let (_dir, blobs) = blob_dir();
        blobs.write("/db/a.bin", b"one").unwrap();
        assert!(matches!(
            blobs.write("/db/a.bin", b"two"),
            Err(StorageError::AlreadyExists(_))
        ));
        assert_eq!(blobs.read("/db/a.bin").unwrap(), b"one");
    }

    #[test]
    fn backup_and_restore() {
        let (_dir, blobs) = blob_dir();
        blobs.write("/db/test/LICENSE", b"text").unwrap();

        let name = BlobDir::new_backup_name();
        blobs.move_to_backup("/db/test/LICENSE", &name).unwrap();
        assert!(!blobs.exists("/db/test/LICENSE").unwrap());
        assert!(blobs.backup_exists(&name).unwrap());
        assert!(blobs.move_to_backup("/db/test/LICENSE", &name).unwrap_err().is_not_found());

        blobs.restore_backup(&name, "/db/test/LICENSE").unwrap();
        assert_eq!(blobs.read("/db/test/LICENSE").unwrap(), b"text");
        assert!(!blobs.backup_exists(&name).unwrap());
    }

    #[test]
    fn restore_refuses_occupied_path() {
        let (_dir, blobs) = blob_dir();
        blobs.write("/db/x", b"old").unwrap();
        blobs.move_to_backup("/db/x", "b1.bak").unwrap();
        blobs.write("/db/x", b"new").unwrap();

        assert!(matches!(
            blobs.restore_backup("b1.bak", "/db/x"),
            Err(StorageError::AlreadyExists(_))
        ));
    }

    #[test]
    fn clear_backups_empties_area() {
        let (_dir, blobs) = blob_dir();
        blobs.write("/db/a", b"1").unwrap();
        blobs.write("/db/b", b"2").unwrap();
        blobs.move_to_backup("/db/a", "a.bak").unwrap();
        blobs.move_to_backup("/db/b", "b.bak").unwrap();

        assert_eq!(blobs.backups().unwrap(), vec!["a.bak", "b.bak"]);
        assert_eq!(blobs.clear_backups().unwrap(), 2);
        assert!(blobs.backups().unwrap().is_empty());
    }

    #[test]
    fn remove_reports_presence() {
        let (_dir, blobs) = blob_dir();
        blobs.write("/db/a", b"1").unwrap();
        assert!(blobs.remove("/db/a").unwrap());
        assert!(!blobs.remove("/db/a").unwrap());
    }
}
