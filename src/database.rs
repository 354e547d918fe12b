use async_trait::async_trait;
use sqlx::{
    sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow},
    QueryBuilder, Row,
};
use std::collections::HashMap;
use std::str::FromStr;

use crate::core::filter::{FilterValue, RecordFilter};
use crate::core::strong_types::{AttributeId, DataType, EntityId, EntityTypeId};
use crate::error::{AppError, AppResult};
use crate::models::{Attribute, EntityType, NewAttribute, RecordRow, StoredValue};

/// Storage interface for entity types, attributes and records
#[async_trait]
pub trait EavStore: Send + Sync {
    // Entity types
    async fn list_entity_types(&self) -> AppResult<Vec<EntityType>>;
    async fn get_entity_type(&self, id: EntityTypeId) -> AppResult<Option<EntityType>>;
    /// Fails with `AppError::Conflict` when the name is taken.
    async fn create_entity_type(&self, name: &str) -> AppResult<EntityType>;
    async fn delete_entity_type(&self, id: EntityTypeId) -> AppResult<bool>;

    // Attributes, always in ascending id order
    async fn list_attributes(&self, entity_type_id: EntityTypeId) -> AppResult<Vec<Attribute>>;
    async fn create_attribute(&self, attribute: NewAttribute) -> AppResult<Attribute>;
    async fn delete_attribute(&self, id: AttributeId, entity_type_id: EntityTypeId)
        -> AppResult<bool>;

    // Records
    async fn entity_type_of(&self, entity_id: EntityId) -> AppResult<Option<EntityTypeId>>;
    async fn create_record(
        &self,
        entity_type_id: EntityTypeId,
        values: &[StoredValue],
    ) -> AppResult<EntityId>;
    async fn update_record(&self, entity_id: EntityId, values: &[StoredValue]) -> AppResult<()>;
    async fn record_values(&self, entity_id: EntityId)
        -> AppResult<HashMap<AttributeId, Option<String>>>;
    async fn list_records(
        &self,
        entity_type_id: EntityTypeId,
        filter: Option<&RecordFilter>,
    ) -> AppResult<Vec<RecordRow>>;
    async fn delete_record(&self, entity_id: EntityId) -> AppResult<bool>;
}

// SQLite-backed EAV store with an SQLx connection pool
pub struct EavDatabase {
    pub pool: SqlitePool,
}

impl EavDatabase {
    pub async fn new(database_url: &str, max_connections: u32) -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::DatabaseError(format!("Invalid database URL: {}", e)))?
            .create_if_missing(true)
            .foreign_keys(true)
            .pragma("case_sensitive_like", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to connect to {}: {}", database_url, e))
            })?;

        Ok(Self { pool })
    }

    /// Single-connection in-memory store; the pool never recycles the connection
    /// so the database lives as long as the store.
    pub async fn new_in_memory() -> AppResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| AppError::DatabaseError(format!("Invalid database URL: {}", e)))?
            .foreign_keys(true)
            .pragma("case_sensitive_like", "ON");

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to connect to in-memory SQLite: {}", e))
            })?;

        let db = Self { pool };
        db.init().await?;
        Ok(db)
    }

    /// Create the four EAV tables. Safe to run against an existing database.
    pub async fn init(&self) -> AppResult<()> {
        let statements = [
            (
                "entity_types table",
                "CREATE TABLE IF NOT EXISTS entity_types (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    name TEXT NOT NULL UNIQUE
                )",
            ),
            (
                "attributes table",
                "CREATE TABLE IF NOT EXISTS attributes (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    entity_type_id INTEGER NOT NULL
                        REFERENCES entity_types(id) ON DELETE CASCADE,
                    name TEXT NOT NULL,
                    data_type TEXT NOT NULL DEFAULT 'text',
                    is_calculated INTEGER NOT NULL DEFAULT 0,
                    formula TEXT
                )",
            ),
            (
                "entities table",
                "CREATE TABLE IF NOT EXISTS entities (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    entity_type_id INTEGER NOT NULL
                        REFERENCES entity_types(id) ON DELETE CASCADE
                )",
            ),
            (
                "entity_values table",
                "CREATE TABLE IF NOT EXISTS entity_values (
                    entity_id INTEGER NOT NULL REFERENCES entities(id) ON DELETE CASCADE,
                    attribute_id INTEGER NOT NULL REFERENCES attributes(id) ON DELETE CASCADE,
                    value TEXT,
                    PRIMARY KEY (entity_id, attribute_id)
                )",
            ),
            (
                "attributes index",
                "CREATE INDEX IF NOT EXISTS idx_attributes_type ON attributes(entity_type_id)",
            ),
            (
                "entities index",
                "CREATE INDEX IF NOT EXISTS idx_entities_type ON entities(entity_type_id)",
            ),
            (
                "entity_values index",
                "CREATE INDEX IF NOT EXISTS idx_entity_values_attr ON entity_values(attribute_id, value)",
            ),
        ];

        for (what, sql) in statements {
            sqlx::query(sql)
                .execute(&self.pool)
                .await
                .map_err(|e| AppError::DatabaseError(format!("Failed to create {}: {}", what, e)))?;
        }

        Ok(())
    }
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

fn attribute_from_row(row: &SqliteRow) -> Attribute {
    Attribute {
        id: AttributeId(row.get("id")),
        entity_type_id: EntityTypeId(row.get("entity_type_id")),
        name: row.get("name"),
        data_type: DataType::from_tag(&row.get::<String, _>("data_type")),
        is_calculated: row.get("is_calculated"),
        formula: row.get("formula"),
    }
}

#[async_trait]
impl EavStore for EavDatabase {
    async fn list_entity_types(&self) -> AppResult<Vec<EntityType>> {
        let rows = sqlx::query("SELECT id, name FROM entity_types ORDER BY id")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to list entity types: {}", e)))?;

        Ok(rows
            .into_iter()
            .map(|row| EntityType {
                id: EntityTypeId(row.get("id")),
                name: row.get("name"),
            })
            .collect())
    }

    async fn get_entity_type(&self, id: EntityTypeId) -> AppResult<Option<EntityType>> {
        let row = sqlx::query("SELECT id, name FROM entity_types WHERE id = ?")
            .bind(id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to get entity type {}: {}", id, e))
            })?;

        Ok(row.map(|row| EntityType {
            id: EntityTypeId(row.get("id")),
            name: row.get("name"),
        }))
    }

    async fn create_entity_type(&self, name: &str) -> AppResult<EntityType> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to begin transaction: {}", e))
        })?;

        let result = sqlx::query("INSERT INTO entity_types (name) VALUES (?)")
            .bind(name)
            .execute(&mut *tx)
            .await;

        let result = match result {
            Ok(result) => result,
            Err(e) => {
                tx.rollback().await.ok();
                return Err(if is_unique_violation(&e) {
                    AppError::Conflict("Entity type already exists.".to_string())
                } else {
                    AppError::DatabaseError(format!("Failed to create entity type: {}", e))
                });
            }
        };

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(EntityType {
            id: EntityTypeId(result.last_insert_rowid()),
            name: name.to_string(),
        })
    }

    async fn delete_entity_type(&self, id: EntityTypeId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM entity_types WHERE id = ?")
            .bind(id.value())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to delete entity type {}: {}", id, e))
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn list_attributes(&self, entity_type_id: EntityTypeId) -> AppResult<Vec<Attribute>> {
        let rows = sqlx::query(
            "SELECT id, entity_type_id, name, data_type, is_calculated, formula
             FROM attributes WHERE entity_type_id = ? ORDER BY id",
        )
        .bind(entity_type_id.value())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| {
            AppError::DatabaseError(format!(
                "Failed to list attributes of entity type {}: {}",
                entity_type_id, e
            ))
        })?;

        Ok(rows.iter().map(attribute_from_row).collect())
    }

    async fn create_attribute(&self, attribute: NewAttribute) -> AppResult<Attribute> {
        let result = sqlx::query(
            "INSERT INTO attributes (entity_type_id, name, data_type, is_calculated, formula)
             VALUES (?, ?, ?, ?, ?)",
        )
        .bind(attribute.entity_type_id.value())
        .bind(&attribute.name)
        .bind(attribute.data_type.as_str())
        .bind(attribute.is_calculated)
        .bind(&attribute.formula)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::DatabaseError(format!("Failed to create attribute: {}", e)))?;

        Ok(Attribute {
            id: AttributeId(result.last_insert_rowid()),
            entity_type_id: attribute.entity_type_id,
            name: attribute.name,
            data_type: attribute.data_type,
            is_calculated: attribute.is_calculated,
            formula: attribute.formula,
        })
    }

    async fn delete_attribute(
        &self,
        id: AttributeId,
        entity_type_id: EntityTypeId,
    ) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM attributes WHERE id = ? AND entity_type_id = ?")
            .bind(id.value())
            .bind(entity_type_id.value())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to delete attribute {}: {}", id, e))
            })?;
        Ok(result.rows_affected() > 0)
    }

    async fn entity_type_of(&self, entity_id: EntityId) -> AppResult<Option<EntityTypeId>> {
        let row = sqlx::query("SELECT entity_type_id FROM entities WHERE id = ?")
            .bind(entity_id.value())
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to get entity {}: {}", entity_id, e))
            })?;
        Ok(row.map(|row| EntityTypeId(row.get("entity_type_id"))))
    }

    async fn create_record(
        &self,
        entity_type_id: EntityTypeId,
        values: &[StoredValue],
    ) -> AppResult<EntityId> {
        // Dropping `tx` on any early return rolls the whole record back.
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to begin transaction: {}", e))
        })?;

        let entity_id = sqlx::query("INSERT INTO entities (entity_type_id) VALUES (?)")
            .bind(entity_type_id.value())
            .execute(&mut *tx)
            .await
            .map_err(|e| AppError::DatabaseError(format!("Failed to create entity: {}", e)))?
            .last_insert_rowid();

        for stored in values {
            sqlx::query("INSERT INTO entity_values (entity_id, attribute_id, value) VALUES (?, ?, ?)")
                .bind(entity_id)
                .bind(stored.attribute_id.value())
                .bind(&stored.value)
                .execute(&mut *tx)
                .await
                .map_err(|e| {
                    AppError::DatabaseError(format!(
                        "Failed to store value of attribute {}: {}",
                        stored.attribute_id, e
                    ))
                })?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to commit transaction: {}", e))
        })?;

        Ok(EntityId(entity_id))
    }

    async fn update_record(&self, entity_id: EntityId, values: &[StoredValue]) -> AppResult<()> {
        let mut tx = self.pool.begin().await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to begin transaction: {}", e))
        })?;

        for stored in values {
            sqlx::query(
                "INSERT INTO entity_values (entity_id, attribute_id, value) VALUES (?, ?, ?)
                 ON CONFLICT(entity_id, attribute_id) DO UPDATE SET value = excluded.value",
            )
            .bind(entity_id.value())
            .bind(stored.attribute_id.value())
            .bind(&stored.value)
            .execute(&mut *tx)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!(
                    "Failed to update value of attribute {} on entity {}: {}",
                    stored.attribute_id, entity_id, e
                ))
            })?;
        }

        tx.commit().await.map_err(|e| {
            AppError::DatabaseError(format!("Failed to commit transaction: {}", e))
        })
    }

    async fn record_values(
        &self,
        entity_id: EntityId,
    ) -> AppResult<HashMap<AttributeId, Option<String>>> {
        let rows = sqlx::query("SELECT attribute_id, value FROM entity_values WHERE entity_id = ?")
            .bind(entity_id.value())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!(
                    "Failed to load values of entity {}: {}",
                    entity_id, e
                ))
            })?;

        Ok(rows
            .into_iter()
            .map(|row| (AttributeId(row.get("attribute_id")), row.get("value")))
            .collect())
    }

    async fn list_records(
        &self,
        entity_type_id: EntityTypeId,
        filter: Option<&RecordFilter>,
    ) -> AppResult<Vec<RecordRow>> {
        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT e.id AS entity_id, a.name AS attribute_name, ev.value AS value
             FROM entities e
             LEFT JOIN entity_values ev ON ev.entity_id = e.id
             LEFT JOIN attributes a ON a.id = ev.attribute_id
             WHERE e.entity_type_id = ",
        );
        qb.push_bind(entity_type_id.value());

        if let Some(filter) = filter {
            qb.push(" AND e.id IN (SELECT entity_id FROM entity_values WHERE attribute_id = ");
            qb.push_bind(filter.attribute_id.value());
            qb.push(" AND ");
            qb.push(filter.column_expr());
            qb.push(" ");
            qb.push(filter.operator.sql_symbol());
            qb.push(" ");
            match &filter.value {
                FilterValue::Number(n) => qb.push_bind(*n),
                FilterValue::Text(s) => qb.push_bind(s.clone()),
            };
            qb.push(")");
        }

        qb.push(" ORDER BY e.id, a.id");
        tracing::debug!(sql = qb.sql(), "listing records");

        let rows = qb.build().fetch_all(&self.pool).await.map_err(|e| {
            AppError::DatabaseError(format!(
                "Failed to list records of entity type {}: {}",
                entity_type_id, e
            ))
        })?;

        let mut records: Vec<RecordRow> = Vec::new();
        for row in rows {
            let id = EntityId(row.get("entity_id"));
            if records.last().map(|r| r.id) != Some(id) {
                records.push(RecordRow {
                    id,
                    values: Default::default(),
                });
            }
            let name: Option<String> = row.get("attribute_name");
            if let (Some(name), Some(record)) = (name, records.last_mut()) {
                record.values.insert(name, row.get("value"));
            }
        }

        Ok(records)
    }

    async fn delete_record(&self, entity_id: EntityId) -> AppResult<bool> {
        let result = sqlx::query("DELETE FROM entities WHERE id = ?")
            .bind(entity_id.value())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                AppError::DatabaseError(format!("Failed to delete entity {}: {}", entity_id, e))
            })?;
        Ok(result.rows_affected() > 0)
    }
}
