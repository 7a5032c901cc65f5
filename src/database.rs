//! Database Module
//!
//! A named collection of tables sharing one configuration.
//!
//! ## Layout
//! ```text
//! {data_dir}/
//!   └── {database}/
//!       ├── {table A}/   (store.log, index_*.idx)
//!       └── {table B}/
//! ```

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};

use crate::config::Config;
use crate::engine::Table;
use crate::error::{ChainError, Result};

/// Handle to a table shared between callers
pub type SharedTable = Arc<Mutex<Table>>;

/// Lazily opened tables of one database
///
/// ## Concurrency:
/// - `tables`: Protected by RwLock (lookups share, first open is exclusive)
/// - Each table sits behind its own Mutex; a table is never used by two
///   callers at once
pub struct Database {
    config: Config,

    /// Tables opened so far, by name
    tables: RwLock<HashMap<String, SharedTable>>,
}

impl Database {
    /// Open or create the database directory named by `config`
    pub fn open(config: Config) -> Result<Self> {
        config.validate()?;
        fs::create_dir_all(config.database_dir())?;

        tracing::info!("Opened database {}", config.database_dir().display());

        Ok(Self {
            config,
            tables: RwLock::new(HashMap::new()),
        })
    }

    /// The table `name`, opened (or created) on first use
    pub fn table(&self, name: &str) -> Result<SharedTable> {
        Self::check_table_name(name)?;

        if let Some(table) = self.tables.read().get(name) {
            return Ok(Arc::clone(table));
        }

        let mut tables = self.tables.write();
        // Another caller may have opened it between the two locks.
        if let Some(table) = tables.get(name) {
            return Ok(Arc::clone(table));
        }

        let table = Arc::new(Mutex::new(Table::open(&self.config, name)?));
        tables.insert(name.to_string(), Arc::clone(&table));
        Ok(table)
    }

    /// Names of every table on disk, sorted
    pub fn list_tables(&self) -> Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.config.database_dir())? {
            let entry = entry?;
            if entry.file_type()?.is_dir() {
                names.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        names.sort();
        Ok(names)
    }

    /// Close every open table
    ///
    /// Fails if a table handle is still held elsewhere; every other table is
    /// still closed.
    pub fn close(self) -> Result<()> {
        let tables = self.tables.into_inner();
        let mut first_error = None;

        for (name, table) in tables {
            let result = match Arc::try_unwrap(table) {
                Ok(table) => table.into_inner().close(),
                Err(_) => Err(ChainError::Config(format!(
                    "table {} is still in use",
                    name
                ))),
            };
            if let Err(e) = result {
                tracing::error!("Failed to close table {}: {}", name, e);
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    pub fn name(&self) -> &str {
        &self.config.database
    }

    pub fn dir(&self) -> std::path::PathBuf {
        self.config.database_dir()
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Number of tables opened through this handle
    pub fn open_table_count(&self) -> usize {
        self.tables.read().len()
    }

    /// Table names become directory names
    fn check_table_name(name: &str) -> Result<()> {
        let valid = !name.is_empty()
            && name != "."
            && name != ".."
            && Path::new(name).components().count() == 1
            && !name.contains(['/', '\\']);
        if !valid {
            return Err(ChainError::Config(format!("invalid table name {:?}", name)));
        }
        Ok(())
    }
}
