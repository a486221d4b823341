// SPDX-FileCopyrightText: Copyright (c) 2017-2025 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! File slots shared between channel monitors and register handlers.
//!
//! Every slot is a small text file inside the store directory. A slot
//! has at most one [`SlotWriter`] per store, any number of [`SlotReader`]s
//! and is replaced as a whole by writing a hidden sibling file that is
//! renamed into place afterwards.

use std::{
    collections::HashSet,
    fmt, fs, io,
    path::{Path, PathBuf},
    sync::{Arc, Mutex, PoisonError},
};

use thiserror::Error;

mod watch;

pub use self::watch::SlotWatcher;

/// Number of digits of a published counter value.
pub const COUNTER_WIDTH: usize = 10;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("slot '{0}' is already owned by another writer")]
    WriterClaimed(String),

    #[error("invalid slot name '{0}'")]
    InvalidName(String),

    #[error("slot '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("slot '{name}' contains no valid value: {content:?}")]
    Parse { name: String, content: String },
}

/// Format a counter value as published in counter slots.
#[must_use]
pub fn format_counter(value: u64) -> String {
    format!("{value:0width$}\n", width = COUNTER_WIDTH)
}

/// Format a single digit value as published in status, selector and
/// command slots.
#[must_use]
pub fn format_digit(value: u8) -> String {
    format!("{value}\n")
}

/// Check that `name` denotes a plain file inside the store directory.
///
/// Names starting with a dot are reserved for temporary files.
pub fn validate_name(name: &str) -> Result<(), StoreError> {
    if name.is_empty() || name.starts_with('.') || name.contains(|c: char| c == '/' || c == '\0') {
        return Err(StoreError::InvalidName(name.to_owned()));
    }
    Ok(())
}

/// A directory of named slots.
#[derive(Clone)]
pub struct SlotStore {
    root: Arc<PathBuf>,
    claims: Arc<Mutex<HashSet<String>>>,
}

impl fmt::Debug for SlotStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlotStore")
            .field("root", &self.root)
            .finish_non_exhaustive()
    }
}

impl SlotStore {
    /// Open the store rooted at `root`, creating the directory if needed.
    pub fn open(root: impl Into<PathBuf>) -> io::Result<Self> {
        let root = root.into();
        fs::create_dir_all(&root)?;
        Ok(Self {
            root: Arc::new(root),
            claims: Default::default(),
        })
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    /// Claim the single writer role of slot `name`.
    ///
    /// The claim is released when the returned writer is dropped.
    pub fn writer(&self, name: &str) -> Result<SlotWriter, StoreError> {
        validate_name(name)?;
        let claimed = self
            .claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.to_owned());
        if !claimed {
            return Err(StoreError::WriterClaimed(name.to_owned()));
        }
        Ok(SlotWriter {
            name: name.to_owned(),
            path: self.path(name),
            tmp_path: self.path(&format!(".{name}.tmp")),
            claims: Arc::clone(&self.claims),
        })
    }

    #[must_use]
    pub fn reader(&self, name: &str) -> SlotReader {
        SlotReader {
            name: name.to_owned(),
            path: self.path(name),
        }
    }

    /// Watch the store directory for replaced slots.
    pub fn watcher(&self) -> io::Result<SlotWatcher> {
        SlotWatcher::new(&self.root)
    }
}

/// The exclusive writer of a single slot.
#[derive(Debug)]
pub struct SlotWriter {
    name: String,
    path: PathBuf,
    tmp_path: PathBuf,
    claims: Arc<Mutex<HashSet<String>>>,
}

impl SlotWriter {
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Replace the whole content of the slot.
    pub fn store(&self, value: &str) -> Result<(), StoreError> {
        self.replace(value).map_err(|source| StoreError::Io {
            name: self.name.clone(),
            source,
        })
    }

    fn replace(&self, value: &str) -> io::Result<()> {
        fs::write(&self.tmp_path, value)?;
        fs::rename(&self.tmp_path, &self.path)
    }

    #[must_use]
    pub fn reader(&self) -> SlotReader {
        SlotReader {
            name: self.name.clone(),
            path: self.path.clone(),
        }
    }
}

impl Drop for SlotWriter {
    fn drop(&mut self) {
        self.claims
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&self.name);
    }
}

/// Read access to a single slot.
#[derive(Debug, Clone)]
pub struct SlotReader {
    name: String,
    path: PathBuf,
}

impl SlotReader {
    /// Read a file that lives outside of any store, e.g. a selector
    /// maintained by another program.
    #[must_use]
    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path.display().to_string();
        Self { name, path }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn load(&self) -> Result<String, StoreError> {
        fs::read_to_string(&self.path).map_err(|source| StoreError::Io {
            name: self.name.clone(),
            source,
        })
    }

    /// Load the value of a single digit slot.
    ///
    /// Only the first character is considered, a trailing newline is optional.
    pub fn load_digit(&self) -> Result<u8, StoreError> {
        let content = self.load()?;
        content
            .chars()
            .next()
            .and_then(|c| c.to_digit(10))
            .and_then(|d| u8::try_from(d).ok())
            .ok_or_else(|| StoreError::Parse {
                name: self.name.clone(),
                content,
            })
    }

    /// Load the value of a counter slot.
    pub fn load_counter(&self) -> Result<u64, StoreError> {
        let content = self.load()?;
        let digits: String = content
            .chars()
            .take_while(char::is_ascii_digit)
            .collect();
        digits.parse().map_err(|_| StoreError::Parse {
            name: self.name.clone(),
            content,
        })
    }
}
