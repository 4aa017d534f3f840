//! Journal and recovery configuration.

use std::path::{Path, PathBuf};

/// Default minimum journal size before a checkpoint rotates files.
pub const DEFAULT_JOURNAL_SIZE_MIN: u64 = 1024 * 1024;

/// Default journal size that triggers a checkpoint on its own.
pub const DEFAULT_JOURNAL_SIZE_LIMIT: u64 = 100 * 1024 * 1024;

/// Default size of the in-memory write buffer.
pub const DEFAULT_BUFFER_SIZE: usize = 1024 * 1024;

/// Configuration for opening a journal and running recovery.
#[derive(Debug, Clone)]
pub struct Config {
    /// Main data directory.
    pub data_dir: PathBuf,

    /// Dedicated journal directory. Relative paths resolve against
    /// `data_dir`; `None` puts the journal in `data_dir` itself.
    pub journal_dir: Option<PathBuf>,

    /// A checkpoint only rotates files once the current one is larger
    /// than this. Zero rotates on every checkpoint.
    pub journal_size_min: u64,

    /// File size at which a checkpoint is requested.
    pub journal_size_limit: u64,

    /// Whether to fsync the journal on every commit.
    pub sync_on_commit: bool,

    /// Whether the journal and recovery are enabled at all.
    pub recovery_enabled: bool,

    /// Size of the in-memory write buffer.
    pub buffer_size: usize,
}

impl Config {
    /// Creates a configuration with default values for `data_dir`.
    #[must_use]
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            journal_dir: None,
            journal_size_min: DEFAULT_JOURNAL_SIZE_MIN,
            journal_size_limit: DEFAULT_JOURNAL_SIZE_LIMIT,
            sync_on_commit: true,
            recovery_enabled: true,
            buffer_size: DEFAULT_BUFFER_SIZE,
        }
    }

    /// Sets a dedicated journal directory.
    #[must_use]
    pub fn journal_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.journal_dir = Some(dir.into());
        self
    }

    /// Sets the minimum file size for rotation at checkpoint.
    #[must_use]
    pub const fn journal_size_min(mut self, bytes: u64) -> Self {
        self.journal_size_min = bytes;
        self
    }

    /// Sets the file size that requests a checkpoint.
    #[must_use]
    pub const fn journal_size_limit(mut self, bytes: u64) -> Self {
        self.journal_size_limit = bytes;
        self
    }

    /// Sets whether to sync on every commit.
    #[must_use]
    pub const fn sync_on_commit(mut self, value: bool) -> Self {
        self.sync_on_commit = value;
        self
    }

    /// Enables or disables journaling and recovery.
    #[must_use]
    pub const fn recovery_enabled(mut self, value: bool) -> Self {
        self.recovery_enabled = value;
        self
    }

    /// Sets the write buffer size.
    #[must_use]
    pub const fn buffer_size(mut self, bytes: usize) -> Self {
        self.buffer_size = bytes;
        self
    }

    /// Returns the directory the journal lives in.
    #[must_use]
    pub fn resolved_journal_dir(&self) -> PathBuf {
        match &self.journal_dir {
            Some(dir) if dir.is_absolute() => dir.clone(),
            Some(dir) => self.data_dir.join(dir),
            None => self.data_dir.clone(),
        }
    }

    /// Returns the main data directory.
    #[must_use]
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}
