//! Persistence of the opaque Roon authentication token.
//!
//! The token is read once at startup and written once at shutdown. Its
//! contents are never interpreted.

use std::io;
use std::path::{Path, PathBuf};

use crate::protocol_constants::TOKEN_FILE;

/// File-backed store for one opaque token.
#[derive(Debug, Clone)]
pub struct TokenStore {
    path: PathBuf,
}

impl TokenStore {
    /// Creates a store for the token file inside `data_dir`.
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(TOKEN_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Loads the token.
    ///
    /// Returns `Ok(None)` if no token has been saved yet or the file is empty.
    pub fn load(&self) -> io::Result<Option<String>> {
        match std::fs::read_to_string(&self.path) {
            Ok(contents) => {
                let token = contents.trim();
                Ok((!token.is_empty()).then(|| token.to_string()))
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Saves the token.
    ///
    /// Uses atomic write (temp file + rename) to prevent corruption on crash.
    /// Creates the directory if it doesn't exist.
    pub fn save(&self, token: &str) -> io::Result<()> {
        if let Some(dir) = self.path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let temp_path = self.path.with_extension("tmp");

        // Write to temp file first
        std::fs::write(&temp_path, token)?;
        // Atomic rename (on most filesystems)
        std::fs::rename(&temp_path, &self.path)
    }
}
