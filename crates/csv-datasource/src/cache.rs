//! Shared cache of loaded tables, invalidated by file modification time

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::SystemTime;

use indexmap::IndexMap;

use crate::error::CsvError;
use crate::table::Table;

struct CachedTable {
    modified: SystemTime,
    table: Arc<Table>,
}

/// Recently loaded tables keyed by canonical path.
///
/// An entry is only served while the file's mtime matches the one seen at load
/// time. Oldest entries are evicted first once `capacity` is reached. The lock
/// is never held while a file is being read.
pub struct TableCache {
    capacity: usize,
    entries: Mutex<IndexMap<PathBuf, CachedTable>>,
}

impl TableCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: Mutex::new(IndexMap::new()),
        }
    }

    pub fn get_or_load(&self, path: &Path) -> Result<Arc<Table>, CsvError> {
        let key = std::fs::canonicalize(path).map_err(|e| CsvError::resource(path, e))?;
        let modified = std::fs::metadata(&key)
            .and_then(|m| m.modified())
            .map_err(|e| CsvError::resource(path, e))?;

        if let Some(table) = self.lookup(&key, modified) {
            log::debug!("Table cache hit: {}", key.display());
            return Ok(table);
        }

        let table = Arc::new(Table::load(&key)?);
        self.insert(key, modified, table.clone());
        Ok(table)
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lookup(&self, key: &Path, modified: SystemTime) -> Option<Arc<Table>> {
        let entries = self.lock();
        entries
            .get(key)
            .filter(|entry| entry.modified == modified)
            .map(|entry| entry.table.clone())
    }

    fn insert(&self, key: PathBuf, modified: SystemTime, table: Arc<Table>) {
        let mut entries = self.lock();
        entries.shift_remove(&key);
        while entries.len() >= self.capacity {
            entries.shift_remove_index(0);
        }
        entries.insert(key, CachedTable { modified, table });
    }

    fn lock(&self) -> MutexGuard<'_, IndexMap<PathBuf, CachedTable>> {
        // entries are replaced whole, so a poisoned map is still consistent
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
