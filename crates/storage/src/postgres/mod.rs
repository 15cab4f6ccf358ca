//! Postgres implementation of `validator_processor::{Store, Tx}`
//! (SPEC_FULL.md §6, §6.2).
//!
//! Grounded on the teacher's `postgres/mod.rs` connection-pool setup
//! (`PgPoolOptions`, `sqlx::query`/`query_as` without compile-time
//! verification so the crate builds without a live database at build time)
//! and its savepoint-per-repository-call style, generalized here to the
//! registry/system_acl/table-data shape this node actually needs.

use async_trait::async_trait;
use sqlx::postgres::PgPoolOptions;
use sqlx::{Pool, Postgres, Row, Transaction};

use validator_common::Error;
use validator_core::{Address, Privilege, PrivilegeSet, TableId};
use validator_processor::{CommandTag, RegistryRow, Store, Tx};

use crate::query::QueryStore;

/// Connection settings for the Postgres-backed store.
#[derive(Debug, Clone)]
pub struct PgConfig {
    pub url: String,
    pub max_connections: u32,
    pub connect_timeout_secs: u64,
}

impl Default for PgConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/validator".to_string(),
            max_connections: 10,
            connect_timeout_secs: 10,
        }
    }
}

/// Owns the connection pool and bootstraps the two tables this node's core
/// depends on. The relation-per-table data itself (`_<hex>`) is created by
/// the Processor's `InsertTable` step (SPEC_FULL.md §4.2.a), never here.
pub struct PostgresStore {
    pool: Pool<Postgres>,
}

impl PostgresStore {
    pub async fn connect(config: PgConfig) -> validator_common::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(std::time::Duration::from_secs(config.connect_timeout_secs))
            .connect(&config.url)
            .await
            .map_err(|e| Error::storage(format!("failed to connect to postgres: {e}")))?;

        let store = Self { pool };
        store.ensure_schema().await?;
        Ok(store)
    }

    /// A clone of the underlying pool, handed to collaborators (e.g.
    /// [`crate::receipts::PostgresReceiptStore`]) that persist their own
    /// tables against the same database without going through the
    /// `Store`/`Tx` port.
    pub fn pool(&self) -> Pool<Postgres> {
        self.pool.clone()
    }

    /// Run a read-only statement and return its rows as JSON objects, for
    /// the API's `POST /query` route (SPEC_FULL.md §6.3). The Validator has
    /// already restricted the statement to a single `SELECT` with no
    /// write-path hazards; this only needs to turn whatever columns come
    /// back into JSON, so it decodes by the Postgres type name rather than
    /// requiring a fixed schema.
    pub async fn query_json(&self, sql: &str) -> validator_common::Result<Vec<serde_json::Map<String, serde_json::Value>>> {
        let rows = sqlx::query(sql)
            .fetch_all(&self.pool)
            .await
            .map_err(|e| Error::storage(format!("failed to execute query: {e}")))?;

        Ok(rows.iter().map(row_to_json).collect())
    }

    /// Creates `registry` and `system_acl` if they don't already exist.
    /// Long-term schema migration of the materialized store is a non-goal
    /// (SPEC_FULL.md §1); this is bootstrap DDL for the two tables the core
    /// itself owns, not a migration framework.
    async fn ensure_schema(&self) -> validator_common::Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS registry (
                id BIGINT PRIMARY KEY,
                controller TEXT NOT NULL,
                name TEXT NOT NULL,
                structure TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::storage(format!("failed to create registry table: {e}")))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS system_acl (
                table_id BIGINT NOT NULL,
                controller TEXT NOT NULL,
                privileges TEXT[] NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                updated_at TIMESTAMPTZ NOT NULL DEFAULT now(),
                PRIMARY KEY (table_id, controller)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .map_err(|e| Error::storage(format!("failed to create system_acl table: {e}")))?;

        Ok(())
    }
}

#[async_trait]
impl QueryStore for PostgresStore {
    async fn query_json(&self, sql: &str) -> validator_common::Result<Vec<serde_json::Map<String, serde_json::Value>>> {
        PostgresStore::query_json(self, sql).await
    }
}

#[async_trait]
impl Store for PostgresStore {
    async fn begin_serializable(&self) -> validator_common::Result<Box<dyn Tx>> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| Error::storage(format!("failed to open transaction: {e}")))?;

        sqlx::query("SET TRANSACTION ISOLATION LEVEL SERIALIZABLE")
            .execute(&mut *tx)
            .await
            .map_err(|e| Error::storage(format!("failed to set isolation level: {e}")))?;

        Ok(Box::new(PgTx { tx: Some(tx) }))
    }
}

/// A SERIALIZABLE transaction. `tx` is `None` only between `commit`/
/// `rollback` consuming `self` and the `Box<dyn Tx>` being dropped.
struct PgTx {
    tx: Option<Transaction<'static, Postgres>>,
}

impl PgTx {
    fn conn(&mut self) -> &mut Transaction<'static, Postgres> {
        self.tx.as_mut().expect("PgTx used after commit/rollback")
    }
}

fn table_id_to_i64(id: TableId) -> validator_common::Result<i64> {
    i64::try_from(id.0).map_err(|_| Error::storage(format!("table id {id} overflows i64")))
}

/// Decode one `PgRow` into a JSON object, column by column, dispatching on
/// the Postgres type name since `/query` has no fixed result schema.
/// Falls back to the column's text representation for types without an
/// explicit case, rather than failing the whole query over one odd column.
fn row_to_json(row: &sqlx::postgres::PgRow) -> serde_json::Map<String, serde_json::Value> {
    use sqlx::{Column, TypeInfo, ValueRef};

    let mut object = serde_json::Map::with_capacity(row.columns().len());
    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        let raw = row.try_get_raw(i);
        let is_null = raw.map(|v| v.is_null()).unwrap_or(true);
        let value = if is_null {
            serde_json::Value::Null
        } else {
            match column.type_info().name() {
                "INT2" => row.try_get::<i16, _>(i).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null),
                "INT4" => row.try_get::<i32, _>(i).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null),
                "INT8" => row.try_get::<i64, _>(i).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null),
                "FLOAT4" => row.try_get::<f32, _>(i).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null),
                "FLOAT8" | "NUMERIC" => {
                    row.try_get::<f64, _>(i).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null)
                }
                "BOOL" => row.try_get::<bool, _>(i).map(|v| serde_json::json!(v)).unwrap_or(serde_json::Value::Null),
                "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => row
                    .try_get::<String, _>(i)
                    .map(serde_json::Value::String)
                    .unwrap_or(serde_json::Value::Null),
                "UUID" => row
                    .try_get::<uuid::Uuid, _>(i)
                    .map(|v| serde_json::Value::String(v.to_string()))
                    .unwrap_or(serde_json::Value::Null),
                "DATE" => row
                    .try_get::<chrono::NaiveDate, _>(i)
                    .map(|v| serde_json::Value::String(v.to_string()))
                    .unwrap_or(serde_json::Value::Null),
                "TIMESTAMP" => row
                    .try_get::<chrono::NaiveDateTime, _>(i)
                    .map(|v| serde_json::Value::String(v.to_string()))
                    .unwrap_or(serde_json::Value::Null),
                "TIMESTAMPTZ" => row
                    .try_get::<chrono::DateTime<chrono::Utc>, _>(i)
                    .map(|v| serde_json::Value::String(v.to_rfc3339()))
                    .unwrap_or(serde_json::Value::Null),
                _ => row
                    .try_get::<String, _>(i)
                    .map(serde_json::Value::String)
                    .unwrap_or(serde_json::Value::Null),
            }
        };
        object.insert(name, value);
    }
    object
}

#[async_trait]
impl Tx for PgTx {
    async fn savepoint(&mut self, name: &str) -> validator_common::Result<()> {
        sqlx::query(&format!("SAVEPOINT {name}"))
            .execute(self.conn())
            .await
            .map_err(|e| Error::storage(format!("failed to create savepoint {name}: {e}")))?;
        Ok(())
    }

    async fn release_savepoint(&mut self, name: &str) -> validator_common::Result<()> {
        sqlx::query(&format!("RELEASE SAVEPOINT {name}"))
            .execute(self.conn())
            .await
            .map_err(|e| Error::storage(format!("failed to release savepoint {name}: {e}")))?;
        Ok(())
    }

    async fn rollback_to_savepoint(&mut self, name: &str) -> validator_common::Result<()> {
        sqlx::query(&format!("ROLLBACK TO SAVEPOINT {name}"))
            .execute(self.conn())
            .await
            .map_err(|e| Error::storage(format!("failed to roll back to savepoint {name}: {e}")))?;
        Ok(())
    }

    async fn execute(&mut self, sql: &str) -> validator_common::Result<CommandTag> {
        let is_insert = sql.trim_start().get(..6).map(|s| s.eq_ignore_ascii_case("insert")).unwrap_or(false);
        let result = sqlx::query(sql)
            .execute(self.conn())
            .await
            .map_err(|e| Error::storage(format!("failed to execute statement: {e}")))?;
        Ok(CommandTag {
            is_insert,
            rows_affected: result.rows_affected(),
        })
    }

    async fn row_count(&mut self, stored_table_name: &str) -> validator_common::Result<i64> {
        // `stored_table_name` is always `_<16 hex>`, minted by `TableId::stored_name`,
        // never derived from user input, so interpolation here is safe.
        let row = sqlx::query(&format!("SELECT COUNT(*) AS n FROM {stored_table_name}"))
            .fetch_one(self.conn())
            .await
            .map_err(|e| Error::storage(format!("failed to count rows in {stored_table_name}: {e}")))?;
        Ok(row.try_get::<i64, _>("n").unwrap_or(0))
    }

    async fn registry_insert(
        &mut self,
        id: TableId,
        controller: Address,
        name_prefix: &str,
        structure_hash: &str,
        description: &str,
    ) -> validator_common::Result<()> {
        let id = table_id_to_i64(id)?;
        sqlx::query(
            "INSERT INTO registry (id, controller, name, structure, description) VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id)
        .bind(controller.to_string())
        .bind(name_prefix)
        .bind(structure_hash)
        .bind(description)
        .execute(self.conn())
        .await
        .map_err(|e| Error::storage(format!("failed to insert registry row: {e}")))?;
        Ok(())
    }

    async fn registry_lookup(&mut self, id: TableId) -> validator_common::Result<Option<RegistryRow>> {
        let id_i64 = table_id_to_i64(id)?;
        let row = sqlx::query("SELECT controller, name, structure FROM registry WHERE id = $1")
            .bind(id_i64)
            .fetch_optional(self.conn())
            .await
            .map_err(|e| Error::storage(format!("failed to look up registry row for {id}: {e}")))?;

        let Some(row) = row else { return Ok(None) };
        let controller: String = row.try_get("controller").map_err(|e| Error::storage(e.to_string()))?;
        let name: String = row.try_get("name").map_err(|e| Error::storage(e.to_string()))?;
        let structure: String = row.try_get("structure").map_err(|e| Error::storage(e.to_string()))?;

        Ok(Some(RegistryRow {
            name_prefix: name,
            structure_hash: structure,
            controller: Address::from_hex(&controller).map_err(|e| Error::storage(e.to_string()))?,
        }))
    }

    async fn acl_insert_owner(
        &mut self,
        id: TableId,
        controller: Address,
        privileges: PrivilegeSet,
    ) -> validator_common::Result<()> {
        let id = table_id_to_i64(id)?;
        let abbrevs = privileges.to_abbrevs();
        sqlx::query(
            "INSERT INTO system_acl (table_id, controller, privileges) VALUES ($1, $2, $3)
             ON CONFLICT (table_id, controller) DO UPDATE SET privileges = EXCLUDED.privileges, updated_at = now()",
        )
        .bind(id)
        .bind(controller.to_string())
        .bind(&abbrevs)
        .execute(self.conn())
        .await
        .map_err(|e| Error::storage(format!("failed to seed system_acl owner row: {e}")))?;
        Ok(())
    }

    async fn acl_grant(
        &mut self,
        id: TableId,
        grantee: Address,
        privileges: PrivilegeSet,
    ) -> validator_common::Result<()> {
        let existing = self.read_acl_row(id, grantee).await?.unwrap_or_default();
        let merged = existing.union(privileges);
        let id_i64 = table_id_to_i64(id)?;
        sqlx::query(
            "INSERT INTO system_acl (table_id, controller, privileges) VALUES ($1, $2, $3)
             ON CONFLICT (table_id, controller) DO UPDATE SET privileges = EXCLUDED.privileges, updated_at = now()",
        )
        .bind(id_i64)
        .bind(grantee.to_string())
        .bind(merged.to_abbrevs())
        .execute(self.conn())
        .await
        .map_err(|e| Error::storage(format!("failed to grant privileges: {e}")))?;
        Ok(())
    }

    async fn acl_revoke(
        &mut self,
        id: TableId,
        grantee: Address,
        privileges: PrivilegeSet,
    ) -> validator_common::Result<()> {
        let Some(existing) = self.read_acl_row(id, grantee).await? else {
            return Ok(());
        };
        let mut remaining = existing;
        for p in Privilege::ALL {
            if privileges.contains(p) {
                remaining.remove(p);
            }
        }
        let id_i64 = table_id_to_i64(id)?;
        sqlx::query("UPDATE system_acl SET privileges = $1, updated_at = now() WHERE table_id = $2 AND controller = $3")
            .bind(remaining.to_abbrevs())
            .bind(id_i64)
            .bind(grantee.to_string())
            .execute(self.conn())
            .await
            .map_err(|e| Error::storage(format!("failed to revoke privileges: {e}")))?;
        Ok(())
    }

    async fn acl_check(&mut self, caller: Address, id: TableId, privilege: Privilege) -> validator_common::Result<bool> {
        let set = self.read_acl_row(id, caller).await?.unwrap_or_default();
        Ok(set.contains(privilege))
    }

    async fn acl_is_owner(&mut self, caller: Address, id: TableId) -> validator_common::Result<bool> {
        let id_i64 = table_id_to_i64(id)?;
        let row = sqlx::query("SELECT controller FROM registry WHERE id = $1")
            .bind(id_i64)
            .fetch_optional(self.conn())
            .await
            .map_err(|e| Error::storage(format!("failed to look up owner for {id}: {e}")))?;
        let Some(row) = row else { return Ok(false) };
        let controller: String = row.try_get("controller").map_err(|e| Error::storage(e.to_string()))?;
        Ok(controller.eq_ignore_ascii_case(&caller.to_string()))
    }

    async fn commit(mut self: Box<Self>) -> validator_common::Result<()> {
        let tx = self.tx.take().expect("PgTx used after commit/rollback");
        tx.commit().await.map_err(|e| Error::storage(format!("failed to commit transaction: {e}")))
    }

    async fn rollback(mut self: Box<Self>) -> validator_common::Result<()> {
        let Some(tx) = self.tx.take() else { return Ok(()) };
        tx.rollback().await.map_err(|e| Error::storage(format!("failed to roll back transaction: {e}")))
    }
}

impl PgTx {
    async fn read_acl_row(&mut self, id: TableId, controller: Address) -> validator_common::Result<Option<PrivilegeSet>> {
        let id_i64 = table_id_to_i64(id)?;
        let row = sqlx::query("SELECT privileges FROM system_acl WHERE table_id = $1 AND controller = $2")
            .bind(id_i64)
            .bind(controller.to_string())
            .fetch_optional(self.conn())
            .await
            .map_err(|e| Error::storage(format!("failed to read system_acl row: {e}")))?;
        let Some(row) = row else { return Ok(None) };
        let abbrevs: Vec<String> = row.try_get("privileges").map_err(|e| Error::storage(e.to_string()))?;
        let chars = abbrevs.into_iter().filter_map(|s| s.chars().next());
        Ok(Some(PrivilegeSet::from_abbrevs(chars)))
    }
}
