//! Session table storage. Callers hand a store to the pipeline explicitly;
//! everything works without one.

use crate::data::RawLapTable;
use crate::error::Result;
use csv::Writer;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SessionKey {
    pub season: u16,
    pub event: String,
}

impl SessionKey {
    pub fn new(season: u16, event: &str) -> Self {
        SessionKey {
            season,
            event: event.to_string(),
        }
    }

    /// File-system safe form of the event name.
    fn slug(&self) -> String {
        self.event
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_lowercase() } else { '_' })
            .collect()
    }
}

/// Raw lap tables keyed by session.
pub trait SessionStore: Send + Sync {
    fn get(&self, key: &SessionKey) -> Result<Option<RawLapTable>>;
    fn put(&mut self, key: &SessionKey, table: &RawLapTable) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: HashMap<SessionKey, RawLapTable>,
}

impl MemoryStore {
    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl SessionStore for MemoryStore {
    fn get(&self, key: &SessionKey) -> Result<Option<RawLapTable>> {
        Ok(self.tables.get(key).cloned())
    }

    fn put(&mut self, key: &SessionKey, table: &RawLapTable) -> Result<()> {
        self.tables.insert(key.clone(), table.clone());
        Ok(())
    }
}

/// CSV files under `<root>/<season>/<event>.csv`.
#[derive(Debug, Clone)]
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        DirStore {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &SessionKey) -> PathBuf {
        self.root
            .join(key.season.to_string())
            .join(format!("{}.csv", key.slug()))
    }
}

impl SessionStore for DirStore {
    fn get(&self, key: &SessionKey) -> Result<Option<RawLapTable>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        debug!(path = %path.display(), "session store hit");
        RawLapTable::from_path(&path).map(Some)
    }

    fn put(&mut self, key: &SessionKey, table: &RawLapTable) -> Result<()> {
        let path = self.path_for(key);
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir)?;
        }
        let mut wtr = Writer::from_path(&path)?;
        wtr.write_record(&table.headers)?;
        for row in &table.rows {
            wtr.write_record(row)?;
        }
        wtr.flush()?;
        debug!(path = %path.display(), rows = table.rows.len(), "stored session");
        Ok(())
    }
}
