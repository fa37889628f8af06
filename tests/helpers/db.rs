use std::collections::BTreeMap;

use policy_replicator::entities::kv_entry;
use policy_replicator::store::{SqlStore, StoredValue};
use sea_orm::{Database, DatabaseConnection, EntityTrait};
use sea_orm_migration::MigratorTrait;
use tempfile::NamedTempFile;

/// Test database with automatic cleanup
pub struct TestDb {
    connection: DatabaseConnection,
    _temp_file: NamedTempFile,
}

impl TestDb {
    /// Create a new test database with migrations applied
    pub async fn new() -> Self {
        // Create temporary SQLite database file
        let temp_file = NamedTempFile::new().expect("Failed to create temp file");
        let db_path = temp_file.path().to_str().expect("Invalid temp file path");
        let db_url = format!("sqlite://{}?mode=rwc", db_path);

        let connection = Database::connect(&db_url)
            .await
            .expect("Failed to connect to test database");

        migration::Migrator::up(&connection, None)
            .await
            .expect("Failed to run migrations");

        Self {
            connection,
            _temp_file: temp_file,
        }
    }

    pub fn connection(&self) -> &DatabaseConnection {
        &self.connection
    }

    /// A store sharing this database's connection pool
    pub fn store(&self) -> SqlStore {
        SqlStore::new(self.connection.clone())
    }

    /// Every key in the database, decoded the way the store reads it
    pub async fn snapshot(&self) -> BTreeMap<String, StoredValue> {
        kv_entry::Entity::find()
            .all(self.connection())
            .await
            .expect("Failed to list kv entries")
            .into_iter()
            .map(|row| {
                let value = if row.kind == "set" {
                    StoredValue::Set(serde_json::from_str(&row.value).expect("Invalid set"))
                } else {
                    StoredValue::Value(serde_json::from_str(&row.value).expect("Invalid record"))
                };
                (row.key, value)
            })
            .collect()
    }
}
