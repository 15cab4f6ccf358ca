//! The Batch state machine (SPEC_FULL.md §4.2, §9 "Batch token").

use tokio::sync::OwnedSemaphorePermit;

use validator_core::{Address, Operation, PrivilegeSet, TableId};
use validator_sql::{CreateStmt, WriteStmt};

use crate::error::{ProcessorError, Result};
use crate::store::{RegistryRow, Tx};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BatchState {
    Open,
    Aborted,
    Committed,
    Closed,
}

/// A transient handle owning a SERIALIZABLE store transaction plus the
/// Processor's single-batch slot (§3 "Batch").
///
/// `_permit` is held for the Batch's entire lifetime and is never taken out
/// early: whichever way `Batch` stops being used — `close()`, a dropped
/// `Result` from a failed call followed by going out of scope, or a panic
/// unwinding through a caller's `.await` — `OwnedSemaphorePermit`'s own
/// `Drop` returns the token exactly once (§9 "scoped-release discipline").
pub struct Batch {
    tx: Option<Box<dyn Tx>>,
    _permit: OwnedSemaphorePermit,
    state: BatchState,
    max_row_count: u64,
}

impl Batch {
    pub(crate) fn new(tx: Box<dyn Tx>, permit: OwnedSemaphorePermit, max_row_count: u64) -> Self {
        Self {
            tx: Some(tx),
            _permit: permit,
            state: BatchState::Open,
            max_row_count,
        }
    }

    fn require_open(&self) -> Result<()> {
        match self.state {
            BatchState::Open => Ok(()),
            _ => Err(ProcessorError::BatchNotOpen),
        }
    }

    fn tx_mut(&mut self) -> &mut dyn Tx {
        self.tx
            .as_deref_mut()
            .expect("a Batch in the Open state always owns its transaction")
    }

    /// `Batch.insert_table` (§4.2.a), under its own savepoint.
    pub async fn insert_table(
        &mut self,
        id: TableId,
        controller: Address,
        description: &str,
        create: &CreateStmt,
    ) -> Result<()> {
        self.require_open()?;
        let tx = self.tx_mut();
        tx.savepoint("insert_table").await?;

        match insert_table_body(tx, id, controller, description, create).await {
            Ok(()) => {
                tx.release_savepoint("insert_table").await?;
                Ok(())
            }
            Err(e) => {
                let _ = tx.rollback_to_savepoint("insert_table").await;
                self.state = BatchState::Aborted;
                Err(e)
            }
        }
    }

    /// `Batch.exec_write_queries` (§4.2.b), under its own savepoint.
    pub async fn exec_write_queries(
        &mut self,
        caller: Address,
        table_id: TableId,
        stmts: Vec<WriteStmt>,
    ) -> Result<()> {
        self.require_open()?;
        if stmts.is_empty() {
            tracing::warn!(%table_id, "exec_write_queries called with no statements; no-op");
            return Ok(());
        }

        let max_row_count = self.max_row_count;
        let tx = self.tx_mut();
        tx.savepoint("exec_write_queries").await?;

        match exec_write_body(tx, caller, table_id, max_row_count, &stmts).await {
            Ok(()) => {
                tx.release_savepoint("exec_write_queries").await?;
                Ok(())
            }
            Err(e) => {
                let _ = tx.rollback_to_savepoint("exec_write_queries").await;
                self.state = BatchState::Aborted;
                Err(e)
            }
        }
    }

    /// The `Grant` half of §4.2.b's "If mq is a Grant/Revoke" step, applied
    /// directly against a decoded `GrantPrivileges` event (see
    /// `validator_core::event::RegistryPayload`, and the note there on why
    /// Grant/Revoke never go through the SQL Validator).
    pub async fn grant_privileges(
        &mut self,
        caller: Address,
        table_id: TableId,
        grantee: Address,
        privileges: PrivilegeSet,
    ) -> Result<()> {
        self.require_open()?;
        let tx = self.tx_mut();
        tx.savepoint("grant_privileges").await?;

        match acl_mutate_body(tx, caller, table_id, grantee, privileges, true).await {
            Ok(()) => {
                tx.release_savepoint("grant_privileges").await?;
                Ok(())
            }
            Err(e) => {
                let _ = tx.rollback_to_savepoint("grant_privileges").await;
                self.state = BatchState::Aborted;
                Err(e)
            }
        }
    }

    /// The `Revoke` half of §4.2.b's "If mq is a Grant/Revoke" step.
    pub async fn revoke_privileges(
        &mut self,
        caller: Address,
        table_id: TableId,
        grantee: Address,
        privileges: PrivilegeSet,
    ) -> Result<()> {
        self.require_open()?;
        let tx = self.tx_mut();
        tx.savepoint("revoke_privileges").await?;

        match acl_mutate_body(tx, caller, table_id, grantee, privileges, false).await {
            Ok(()) => {
                tx.release_savepoint("revoke_privileges").await?;
                Ok(())
            }
            Err(e) => {
                let _ = tx.rollback_to_savepoint("revoke_privileges").await;
                self.state = BatchState::Aborted;
                Err(e)
            }
        }
    }

    /// `Batch.commit(ctx)`. Does not consume `self`: per §4.2's state
    /// diagram, a committed batch must still be `close`d to return the
    /// token, so the caller always follows `commit()` with `close()`.
    pub async fn commit(&mut self) -> Result<()> {
        self.require_open()?;
        let tx = self.tx.take().expect("open batch owns a transaction");
        tx.commit().await?;
        self.state = BatchState::Committed;
        Ok(())
    }

    /// `Batch.close(ctx)`. Rolls back unless already committed, then
    /// returns the token by dropping `self`. Consuming `self` makes
    /// double-close a compile error rather than a runtime concern.
    pub async fn close(mut self) -> Result<()> {
        if let Some(tx) = self.tx.take() {
            tx.rollback().await?;
        }
        self.state = BatchState::Closed;
        Ok(())
    }
}

impl Drop for Batch {
    fn drop(&mut self) {
        if self.tx.is_some() {
            tracing::warn!(
                "batch dropped without calling close(); its transaction will be abandoned \
                 by the pool, the single-batch token is still returned"
            );
        }
    }
}

async fn insert_table_body(
    tx: &mut dyn Tx,
    id: TableId,
    controller: Address,
    description: &str,
    create: &CreateStmt,
) -> Result<()> {
    tx.registry_insert(id, controller, &create.name_prefix, &create.structure_hash, description)
        .await?;
    tx.acl_insert_owner(id, controller, PrivilegeSet::all()).await?;

    // `create.bind` emits `CREATE TABLE t0x<hex>(...)` — the leading-`t` form
    // is the canonical SQL the spec says appears "at CREATE time" (SPEC_FULL.md
    // §6, "On-the-wire SQL naming"). Invariant 1 (§3) requires the relation's
    // actual on-disk name to be the underscore-prefixed `_<hex>` form, so the
    // table is renamed immediately after creation; every later write
    // statement (`exec_write_body`, below) addresses it by that stored name.
    let sql = create.bind(id);
    tx.execute(&sql).await?;
    tx.execute(&format!("ALTER TABLE {} RENAME TO {}", id.sql_name(), id.stored_name()))
        .await?;
    Ok(())
}

async fn exec_write_body(
    tx: &mut dyn Tx,
    caller: Address,
    table_id: TableId,
    max_row_count: u64,
    stmts: &[WriteStmt],
) -> Result<()> {
    let registry: RegistryRow = tx
        .registry_lookup(table_id)
        .await?
        .ok_or(ProcessorError::TableNotFound(table_id))?;
    let stored_name = table_id.stored_name();

    for stmt in stmts {
        if !stmt.table_name.eq_ignore_ascii_case(&registry.name_prefix) {
            return Err(ProcessorError::TableMismatch {
                expected: registry.name_prefix.clone(),
                found: stmt.table_name.clone(),
            });
        }

        let op = stmt.operation();
        if let Some(required) = op.required_privilege() {
            if !tx.acl_check(caller, table_id, required).await? {
                return Err(ProcessorError::AclDenied { table_id, required });
            }
        }

        let before = tx.row_count(&stored_name).await?;
        let bound_sql = stmt.bind(&stored_name);
        let tag = tx.execute(&bound_sql).await?;

        if max_row_count > 0 && op == Operation::Insert {
            let after = before + tag.rows_affected as i64;
            if after > max_row_count as i64 {
                return Err(ProcessorError::RowCountExceeded { before, after });
            }
        }
    }

    Ok(())
}

async fn acl_mutate_body(
    tx: &mut dyn Tx,
    caller: Address,
    table_id: TableId,
    grantee: Address,
    privileges: PrivilegeSet,
    is_grant: bool,
) -> Result<()> {
    if !tx.acl_is_owner(caller, table_id).await? {
        return Err(ProcessorError::NotOwner(table_id));
    }
    if is_grant {
        tx.acl_grant(table_id, grantee, privileges).await?;
    } else {
        tx.acl_revoke(table_id, grantee, privileges).await?;
    }
    Ok(())
}
