//! Persisted selection indices, one ASCII integer per file

use std::fs;
use std::path::{Path, PathBuf};

use log::debug;

use crate::StoreError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    /// which beacon profile (station identity) is active
    Callsign,
    /// which LoRa frequency profile is active
    Frequency,
}

impl IndexKind {
    pub fn file_name(&self) -> &'static str {
        match self {
            IndexKind::Callsign => "callsignIndex.txt",
            IndexKind::Frequency => "freqIndex.txt",
        }
    }
}

#[derive(Debug, Clone)]
pub struct IndexStore {
    root: PathBuf,
}

impl IndexStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path(&self, kind: IndexKind) -> PathBuf {
        self.root.join(kind.file_name())
    }

    pub fn save(&self, kind: IndexKind, index: u8) -> Result<(), StoreError> {
        fs::write(self.path(kind), format!("{}\n", index))?;
        debug!("Saved {:?} index {}", kind, index);
        Ok(())
    }

    /// `Ok(None)` when nothing has been saved yet
    pub fn load(&self, kind: IndexKind) -> Result<Option<u8>, StoreError> {
        let contents = match fs::read_to_string(self.path(kind)) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let line = contents.lines().next().unwrap_or("").trim();
        let index = line
            .parse::<u8>()
            .map_err(|_| StoreError::Malformed(line.to_string()))?;
        debug!("Loaded {:?} index {}", kind, index);
        Ok(Some(index))
    }
}
