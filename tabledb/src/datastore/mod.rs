use crate::document::Document;
use crate::error::{Result, TableDbError};
use crate::placeholder::{IdSource, UuidV4};
use crate::schema::{check_schema, SchemaDefinition};
use crate::storage;
use parking_lot::{Mutex, MutexGuard, RwLock};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Construction options for a [`Datastore`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DatastoreOptions {
    /// Read the file on every `read()` instead of keeping the parsed document.
    pub no_cache: bool,
}

/// Owns the store file, its schema and the parsed-document cache.
///
/// All table mutations go through [`Datastore::transaction`], which holds a
/// fair mutex for the whole read-modify-write. Plain reads only touch the
/// cache lock.
pub struct Datastore {
    path: PathBuf,
    schema: SchemaDefinition,
    options: DatastoreOptions,
    lock: Mutex<()>,
    cache: RwLock<Option<Document>>,
    ids: Box<dyn IdSource>,
}

/// Held for the duration of a transaction. Dropping it hands the lock to the
/// longest-waiting thread.
struct TransactionGuard<'a> {
    guard: Option<MutexGuard<'a, ()>>,
}

impl Drop for TransactionGuard<'_> {
    fn drop(&mut self) {
        if let Some(guard) = self.guard.take() {
            MutexGuard::unlock_fair(guard);
        }
    }
}

impl Datastore {
    /// Create a datastore for the file at `path`. The file is not touched
    /// until the first read or write.
    pub fn new(
        path: impl Into<PathBuf>,
        schema: SchemaDefinition,
        options: DatastoreOptions,
    ) -> Result<Self> {
        check_schema(&schema)?;
        Ok(Datastore {
            path: path.into(),
            schema,
            options,
            lock: Mutex::new(()),
            cache: RwLock::new(None),
            ids: Box::new(UuidV4),
        })
    }

    /// Replace the generator used for `UUID` placeholders.
    pub fn with_id_source(mut self, ids: impl IdSource + 'static) -> Self {
        self.ids = Box::new(ids);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn schema(&self) -> &SchemaDefinition {
        &self.schema
    }

    pub fn id_source(&self) -> &dyn IdSource {
        self.ids.as_ref()
    }

    /// Schema table names in declaration order.
    pub fn tables(&self) -> Vec<String> {
        self.schema.table_names()
    }

    /// The current document. Never fails: an unreadable file yields empty
    /// tables and a malformed table yields that table's empty default.
    pub fn read(&self) -> Document {
        if self.options.no_cache {
            return self.load();
        }
        if let Some(document) = self.cache.read().as_ref() {
            return document.clone();
        }

        // The slot stays write-locked from the disk read until the install,
        // so a concurrent `write` cannot be overwritten by an older file.
        let mut cache = self.cache.write();
        if let Some(document) = cache.as_ref() {
            return document.clone();
        }
        let document = self.load();
        *cache = Some(document.clone());
        document
    }

    fn load(&self) -> Document {
        log::debug!("Reading {}", self.path.display());
        match storage::read_json(&self.path) {
            Some(raw) => Document::from_disk(raw, &self.schema),
            None => Document::empty(&self.schema),
        }
    }

    /// Persist the whole document. On failure the cache keeps its previous
    /// contents.
    pub fn write(&self, document: &Document) -> Result<()> {
        log::debug!("Writing {}", self.path.display());
        storage::write_json(&self.path, &document.to_value()).map_err(|source| {
            TableDbError::Write {
                path: self.path.clone(),
                source,
            }
        })?;

        if !self.options.no_cache {
            *self.cache.write() = Some(document.clone());
        }
        Ok(())
    }

    /// The document's migration version, 0 when unset.
    pub fn version(&self) -> u64 {
        self.read().version()
    }

    fn lock(&self) -> TransactionGuard<'_> {
        TransactionGuard {
            guard: Some(self.lock.lock()),
        }
    }

    /// Run `f` while holding the exclusion lock.
    ///
    /// The lock is released however `f` exits, including by panic. Calling
    /// `transaction` again from inside `f` deadlocks.
    pub fn transaction<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce() -> Result<T>,
    {
        let _guard = self.lock();
        f()
    }

    /// Read, mutate and write back the document inside one transaction.
    /// Nothing is written when `f` fails.
    pub fn update<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Document) -> Result<T>,
    {
        self.transaction(|| {
            let mut document = self.read();
            let output = f(&mut document)?;
            self.write(&document)?;
            Ok(output)
        })
    }

    /// Forget the cached document so the next read goes to disk.
    pub fn flush(&self) {
        *self.cache.write() = None;
    }

    /// Replace the file with an empty document.
    pub fn drop(&self) -> Result<()> {
        self.transaction(|| {
            self.write(&Document::new())?;
            self.flush();
            log::info!("Dropped all tables in {}", self.path.display());
            Ok(())
        })
    }

    /// Delete the file.
    pub fn erase(&self) -> Result<()> {
        self.transaction(|| {
            storage::remove_file(&self.path)?;
            self.flush();
            log::info!("Erased {}", self.path.display());
            Ok(())
        })
    }
}
