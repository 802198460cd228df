#![cfg_attr(feature = "fail-on-warnings", deny(warnings))]
#![warn(clippy::all, clippy::pedantic, clippy::nursery, clippy::cargo)]
#![allow(clippy::multiple_crate_versions, clippy::cargo_common_metadata)]

//! Durable state for the media atlas stages.
//!
//! Every stage owns three documents (checkpoint, fixed item list,
//! accumulated records) and the augment stage additionally owns the
//! geocode cache. All of them go through the [`StateStore`] trait so the
//! batch engine never touches the filesystem directly; tests swap in
//! [`MemoryStore`].

pub mod geocode_cache;
pub mod paths;

use std::io::ErrorKind;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

/// Errors from reading or writing state documents.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Filesystem failure.
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        /// File being read or written.
        path: PathBuf,
        /// Underlying error.
        source: std::io::Error,
    },

    /// Serialization failure.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Failure injected by [`MemoryStore::failing_after`].
    #[error("Store '{name}' rejected write #{attempt}")]
    Injected {
        /// Name given to the store.
        name: String,
        /// 1-based index of the rejected save.
        attempt: usize,
    },
}

/// A single persisted document.
///
/// `load` returns `Ok(None)` when there is no usable prior state (missing
/// or unparseable document). Only failures that make the document
/// unreachable are errors.
pub trait StateStore<T>: Send {
    /// Reads the document.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the document exists but cannot be read.
    fn load(&self) -> Result<Option<T>, StoreError>;

    /// Replaces the document with `value`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the write fails.
    fn save(&mut self, value: &T) -> Result<(), StoreError>;

    /// Removes the document so the next `load` returns `None`.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] if the document exists but cannot be removed.
    fn clear(&mut self) -> Result<(), StoreError>;
}

/// A pretty-printed JSON document on disk.
///
/// Writes go to a sibling `.tmp` file which is then renamed over the
/// target.
pub struct JsonFileStore<T> {
    path: PathBuf,
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonFileStore<T> {
    /// Creates a store backed by `path`. Nothing is read until [`StateStore::load`].
    #[must_use]
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _marker: PhantomData,
        }
    }

    /// The backing file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }

    fn io_error(&self, source: std::io::Error) -> StoreError {
        StoreError::Io {
            path: self.path.clone(),
            source,
        }
    }
}

impl<T> StateStore<T> for JsonFileStore<T>
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Option<T>, StoreError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(self.io_error(e)),
        };

        match serde_json::from_str(&content) {
            Ok(value) => Ok(Some(value)),
            Err(e) => {
                log::warn!(
                    "Ignoring unreadable state file {}: {e}",
                    self.path.display()
                );
                Ok(None)
            }
        }
    }

    fn save(&mut self, value: &T) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            paths::ensure_dir(parent).map_err(|e| self.io_error(e))?;
        }

        let mut body = serde_json::to_string_pretty(value)?;
        body.push('\n');

        let tmp = self.tmp_path();
        std::fs::write(&tmp, body).map_err(|e| self.io_error(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.io_error(e))?;
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(self.io_error(e)),
        }
    }
}

/// An in-memory document, used by tests and dry runs.
#[derive(Debug, Clone)]
pub struct MemoryStore<T> {
    name: String,
    value: Option<T>,
    saves: usize,
    fail_on: Option<usize>,
}

impl<T> Default for MemoryStore<T> {
    fn default() -> Self {
        Self::new("memory")
    }
}

impl<T> MemoryStore<T> {
    /// Creates an empty store.
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            value: None,
            saves: 0,
            fail_on: None,
        }
    }

    /// Creates a store already holding `value`.
    #[must_use]
    pub fn with_value(name: &str, value: T) -> Self {
        Self {
            value: Some(value),
            ..Self::new(name)
        }
    }

    /// Creates an empty store whose save number `successful + 1` fails.
    #[must_use]
    pub fn failing_after(name: &str, successful: usize) -> Self {
        Self {
            fail_on: Some(successful + 1),
            ..Self::new(name)
        }
    }

    /// Stops injecting failures.
    pub const fn heal(&mut self) {
        self.fail_on = None;
    }

    /// The current document.
    #[must_use]
    pub const fn value(&self) -> Option<&T> {
        self.value.as_ref()
    }

    /// Number of save attempts so far, including rejected ones.
    #[must_use]
    pub const fn save_count(&self) -> usize {
        self.saves
    }
}

impl<T> StateStore<T> for MemoryStore<T>
where
    T: Clone + Send,
{
    fn load(&self) -> Result<Option<T>, StoreError> {
        Ok(self.value.clone())
    }

    fn save(&mut self, value: &T) -> Result<(), StoreError> {
        self.saves += 1;
        if self.fail_on == Some(self.saves) {
            return Err(StoreError::Injected {
                name: self.name.clone(),
                attempt: self.saves,
            });
        }
        self.value = Some(value.clone());
        Ok(())
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        self.value = None;
        Ok(())
    }
}

impl<T, S> StateStore<T> for Box<S>
where
    S: StateStore<T> + ?Sized,
{
    fn load(&self) -> Result<Option<T>, StoreError> {
        (**self).load()
    }

    fn save(&mut self, value: &T) -> Result<(), StoreError> {
        (**self).save(value)
    }

    fn clear(&mut self) -> Result<(), StoreError> {
        (**self).clear()
    }
}
