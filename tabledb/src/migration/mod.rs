use crate::datastore::Datastore;
use crate::document::Document;
use crate::error::{Result, TableDbError};
use std::collections::BTreeMap;
use std::fmt;

/// Transforms the whole document from the previous version to this one.
pub type MigrationFn = Box<dyn FnOnce(Document) -> Result<Document> + Send>;

/// Version-tagged document migrations, kept in ascending version order.
#[derive(Default)]
pub struct Migrations {
    steps: BTreeMap<u64, MigrationFn>,
}

impl Migrations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the migration that produces `version`. A later registration
    /// for the same version replaces the earlier one.
    pub fn add<F>(mut self, version: u64, migration: F) -> Self
    where
        F: FnOnce(Document) -> Result<Document> + Send + 'static,
    {
        self.steps.insert(version, Box::new(migration));
        self
    }

    /// All registered versions, ascending.
    pub fn versions(&self) -> Vec<u64> {
        self.steps.keys().copied().collect()
    }

    /// Versions that would run to go from `current` to `target`.
    pub fn plan(&self, current: u64, target: u64) -> Vec<u64> {
        if target <= current {
            return Vec::new();
        }
        self.steps
            .range(current + 1..=target)
            .map(|(version, _)| *version)
            .collect()
    }
}

impl fmt::Debug for Migrations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migrations")
            .field("versions", &self.versions())
            .finish()
    }
}

/// Bring the stored document up to `target`, one transaction per version.
///
/// Each applied version is written before the next one starts, so a failure
/// leaves the store at the last version that succeeded. Returns the version
/// the store ends at.
pub fn migrate(datastore: &Datastore, target: u64, migrations: Migrations) -> Result<u64> {
    let current = datastore.version();
    let pending = migrations.plan(current, target);
    if pending.is_empty() {
        log::debug!("No migrations pending (version {current}, target {target})");
        return Ok(current);
    }

    let mut reached = current;
    let mut steps = migrations.steps;
    for version in pending {
        let Some(step) = steps.remove(&version) else {
            continue;
        };
        reached = datastore.transaction(|| {
            let document = datastore.read();
            // Another handle may have moved the store forward in the meantime.
            if document.version() >= version {
                return Ok(document.version());
            }
            let mut migrated = step(document).map_err(|e| {
                TableDbError::Migration(format!("Migration to version {version} failed: {e}"))
            })?;
            migrated.version = Some(version);
            datastore.write(&migrated)?;
            log::info!("Migrated {} to version {version}", datastore.path().display());
            Ok(version)
        })?;
    }

    Ok(reached)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datastore::DatastoreOptions;
    use crate::schema::{SchemaDefinition, TableDefinition};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    fn datastore(tmp: &TempDir) -> Datastore {
        let schema = SchemaDefinition::new().table("posts", TableDefinition::array());
        Datastore::new(tmp.path().join("db.json"), schema, DatastoreOptions::default()).unwrap()
    }

    fn set_posts(posts: serde_json::Value) -> impl FnOnce(Document) -> Result<Document> + Send {
        move |mut document| {
            document.set_table("posts", posts);
            Ok(document)
        }
    }

    #[test]
    fn test_plan() {
        let migrations = Migrations::new()
            .add(3, set_posts(json!([3])))
            .add(1, set_posts(json!([1])))
            .add(2, set_posts(json!([2])));
        assert_eq!(migrations.versions(), vec![1, 2, 3]);
        assert_eq!(migrations.plan(0, 2), vec![1, 2]);
        assert_eq!(migrations.plan(1, 3), vec![2, 3]);
        assert_eq!(migrations.plan(3, 3), Vec::<u64>::new());
        assert_eq!(migrations.plan(2, 1), Vec::<u64>::new());
    }

    #[test]
    fn test_migrate_up_to_target() {
        let tmp = TempDir::new().unwrap();
        let ds = datastore(&tmp);
        let migrations = Migrations::new()
            .add(1, set_posts(json!([1])))
            .add(2, set_posts(json!([2])))
            .add(3, set_posts(json!([3])));

        assert_eq!(migrate(&ds, 2, migrations).unwrap(), 2);
        assert_eq!(ds.version(), 2);
        assert_eq!(ds.read().table("posts"), Some(&json!([2])));

        ds.flush();
        assert_eq!(ds.version(), 2);
    }

    #[test]
    fn test_migrate_skips_applied_versions() {
        let tmp = TempDir::new().unwrap();
        let ds = datastore(&tmp);
        migrate(&ds, 1, Migrations::new().add(1, set_posts(json!([1])))).unwrap();

        let migrations = Migrations::new()
            .add(1, |_| Err(TableDbError::Other("must not run".into())))
            .add(2, set_posts(json!([2])));
        assert_eq!(migrate(&ds, 5, migrations).unwrap(), 2);
        assert_eq!(ds.read().table("posts"), Some(&json!([2])));
    }

    #[test]
    fn test_failed_migration_keeps_earlier_versions() {
        let tmp = TempDir::new().unwrap();
        let ds = datastore(&tmp);
        let migrations = Migrations::new()
            .add(1, set_posts(json!([1])))
            .add(2, |_| Err(TableDbError::Other("bad data".into())))
            .add(3, set_posts(json!([3])));

        let err = migrate(&ds, 3, migrations).unwrap_err();
        assert!(matches!(err, TableDbError::Migration(_)));
        assert_eq!(ds.version(), 1);
        assert_eq!(ds.read().table("posts"), Some(&json!([1])));
    }

    #[test]
    fn test_no_pending_migrations() {
        let tmp = TempDir::new().unwrap();
        let ds = datastore(&tmp);
        assert_eq!(migrate(&ds, 4, Migrations::new()).unwrap(), 0);
        assert!(!ds.path().exists());
    }
}
