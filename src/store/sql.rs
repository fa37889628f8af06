use async_trait::async_trait;
use chrono::Utc;
use migration::MigratorTrait;
use sea_orm::sea_query::OnConflict;
use sea_orm::{ConnectionTrait, Database, DatabaseConnection, EntityTrait, Set, TransactionTrait};

use super::{apply_mutation, KeyValueStore, StoreError, StoredValue};
use crate::batch::{Batch, StoreKey};
use crate::entities::kv_entry;
use crate::settings::Database as DbCfg;

const KIND_VALUE: &str = "value";
const KIND_SET: &str = "set";

/// Key-value store over a single sea-orm table.
///
/// Each batch runs in one database transaction. Field operations on role
/// records are emulated by read-modify-write inside that transaction.
#[derive(Debug, Clone)]
pub struct SqlStore {
    db: DatabaseConnection,
}

impl SqlStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }

    /// Connect and bring the schema up to date.
    pub async fn connect(cfg: &DbCfg) -> Result<Self, StoreError> {
        let db = Database::connect(&cfg.url).await?;
        migration::Migrator::up(&db, None).await?;
        tracing::debug!(url = %cfg.url, "Connected key-value store");
        Ok(Self::new(db))
    }
}

#[async_trait]
impl KeyValueStore for SqlStore {
    async fn get(&self, key: &StoreKey) -> Result<Option<StoredValue>, StoreError> {
        load(&self.db, &key.to_string()).await
    }

    async fn submit_batch(&self, batch: &Batch) -> Result<usize, StoreError> {
        let now = Utc::now().timestamp();
        let txn = self.db.begin().await?;

        if let Err(e) = apply_batch(&txn, batch, now).await {
            txn.rollback().await?;
            return Err(e);
        }

        txn.commit().await?;
        Ok(batch.len())
    }
}

async fn apply_batch<C: ConnectionTrait>(conn: &C, batch: &Batch, now: i64) -> Result<(), StoreError> {
    for mutation in batch {
        let key = mutation.key().to_string();
        let current = load(conn, &key).await?;
        let next = apply_mutation(current, mutation)?;
        save(conn, &key, next, now).await?;
    }
    Ok(())
}

async fn load<C: ConnectionTrait>(conn: &C, key: &str) -> Result<Option<StoredValue>, StoreError> {
    let model = kv_entry::Entity::find_by_id(key.to_string()).one(conn).await?;
    model.map(decode).transpose()
}

async fn save<C: ConnectionTrait>(
    conn: &C,
    key: &str,
    value: Option<StoredValue>,
    now: i64,
) -> Result<(), StoreError> {
    let Some(value) = value else {
        kv_entry::Entity::delete_by_id(key.to_string())
            .exec(conn)
            .await?;
        return Ok(());
    };

    let (kind, json) = match &value {
        StoredValue::Value(v) => (KIND_VALUE, serde_json::to_string(v)?),
        StoredValue::Set(s) => (KIND_SET, serde_json::to_string(s)?),
    };

    let entry = kv_entry::ActiveModel {
        key: Set(key.to_string()),
        kind: Set(kind.to_string()),
        value: Set(json),
        updated_at: Set(now),
    };

    kv_entry::Entity::insert(entry)
        .on_conflict(
            OnConflict::column(kv_entry::Column::Key)
                .update_columns([
                    kv_entry::Column::Kind,
                    kv_entry::Column::Value,
                    kv_entry::Column::UpdatedAt,
                ])
                .to_owned(),
        )
        .exec(conn)
        .await?;

    Ok(())
}

fn decode(model: kv_entry::Model) -> Result<StoredValue, StoreError> {
    if model.kind == KIND_SET {
        Ok(StoredValue::Set(serde_json::from_str(&model.value)?))
    } else {
        Ok(StoredValue::Value(serde_json::from_str(&model.value)?))
    }
}
