//! The store/transaction port the Processor is built against
//! (SPEC_FULL.md §6/§6.2). `validator-storage` implements these traits
//! against PostgreSQL; the Processor never depends on a concrete backend.

use async_trait::async_trait;

use validator_core::{Address, Privilege, PrivilegeSet, TableId};

/// Result of executing a single SQL statement inside a transaction.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandTag {
    pub is_insert: bool,
    pub rows_affected: u64,
}

/// The `registry` row for a table, as read by `ExecWriteQueries` (§4.2.b.2).
#[derive(Debug, Clone)]
pub struct RegistryRow {
    pub name_prefix: String,
    pub structure_hash: String,
    pub controller: Address,
}

/// A SERIALIZABLE read-write transaction, opened by [`Store::begin_serializable`].
///
/// Every method observes the effects of prior calls on the same `Tx` (single
/// store transaction, §5 "Ordering guarantees"). `commit`/`rollback` consume
/// the transaction, mirroring `Rollback()` being idempotent after `Commit()`
/// only insofar as the type system makes a second call impossible.
#[async_trait]
pub trait Tx: Send + Sync {
    async fn savepoint(&mut self, name: &str) -> validator_common::Result<()>;
    async fn release_savepoint(&mut self, name: &str) -> validator_common::Result<()>;
    async fn rollback_to_savepoint(&mut self, name: &str) -> validator_common::Result<()>;

    /// Execute one statement, returning its command tag.
    async fn execute(&mut self, sql: &str) -> validator_common::Result<CommandTag>;

    /// `SELECT COUNT(*)` on a stored table, named in its on-disk `_<hex>` form.
    async fn row_count(&mut self, stored_table_name: &str) -> validator_common::Result<i64>;

    /// Insert a new `registry` row.
    async fn registry_insert(
        &mut self,
        id: TableId,
        controller: Address,
        name_prefix: &str,
        structure_hash: &str,
        description: &str,
    ) -> validator_common::Result<()>;

    /// Look up a `registry` row by id.
    async fn registry_lookup(&mut self, id: TableId) -> validator_common::Result<Option<RegistryRow>>;

    /// Seed `system_acl` with the owner's full privilege set (§4.2.a.2).
    async fn acl_insert_owner(
        &mut self,
        id: TableId,
        controller: Address,
        privileges: PrivilegeSet,
    ) -> validator_common::Result<()>;

    /// Upsert `grantee`'s privileges on `id` with set union (§4.2.b).
    async fn acl_grant(
        &mut self,
        id: TableId,
        grantee: Address,
        privileges: PrivilegeSet,
    ) -> validator_common::Result<()>;

    /// Remove the listed privileges from `grantee`'s row on `id` (§4.2.b).
    async fn acl_revoke(
        &mut self,
        id: TableId,
        grantee: Address,
        privileges: PrivilegeSet,
    ) -> validator_common::Result<()>;

    /// `CheckPrivileges(tx, caller, table_id, op) → ok|denied` (§6).
    async fn acl_check(&mut self, caller: Address, id: TableId, privilege: Privilege) -> validator_common::Result<bool>;

    /// `IsOwner(tx, caller, table_id) → bool` (§6).
    async fn acl_is_owner(&mut self, caller: Address, id: TableId) -> validator_common::Result<bool>;

    async fn commit(self: Box<Self>) -> validator_common::Result<()>;
    async fn rollback(self: Box<Self>) -> validator_common::Result<()>;
}

/// Opens SERIALIZABLE transactions for the Processor. Shared across
/// validator instances and chain workers (§5 "Shared resources").
#[async_trait]
pub trait Store: Send + Sync {
    async fn begin_serializable(&self) -> validator_common::Result<Box<dyn Tx>>;
}
