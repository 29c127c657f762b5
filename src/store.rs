use std::collections::HashSet;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::Result;

/// Identity of a schedule entry. Two entries sharing a timestamp are
/// distinct when they sit at different positions in the schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntryId {
    pub timestamp: DateTime<Utc>,
    pub index: usize,
}

impl EntryId {
    pub fn new(timestamp: DateTime<Utc>, index: usize) -> Self {
        Self { timestamp, index }
    }
}

/// Where executed entry ids survive a process restart, if anywhere.
pub trait ExecutionStore: Send {
    fn load(&mut self) -> Result<HashSet<EntryId>>;
    fn record(&mut self, id: &EntryId) -> Result<()>;
}

/// Keeps nothing. At-most-once then only holds for one process lifetime.
#[derive(Debug, Default)]
pub struct MemoryStore;

impl ExecutionStore for MemoryStore {
    fn load(&mut self) -> Result<HashSet<EntryId>> {
        Ok(HashSet::new())
    }

    fn record(&mut self, _id: &EntryId) -> Result<()> {
        Ok(())
    }
}

/// Executed ids as a JSON array, rewritten on every record.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    ids: HashSet<EntryId>,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ids: HashSet::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ExecutionStore for JsonFileStore {
    fn load(&mut self) -> Result<HashSet<EntryId>> {
        self.ids = match std::fs::read_to_string(&self.path) {
            Ok(text) => serde_json::from_str::<Vec<EntryId>>(&text)?
                .into_iter()
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => HashSet::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(self.ids.clone())
    }

    fn record(&mut self, id: &EntryId) -> Result<()> {
        if !self.ids.insert(*id) {
            return Ok(());
        }
        let mut sorted: Vec<&EntryId> = self.ids.iter().collect();
        sorted.sort();
        std::fs::write(&self.path, serde_json::to_string_pretty(&sorted)?)?;
        Ok(())
    }
}
