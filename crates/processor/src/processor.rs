//! The Processor: a serialized batch engine holding the single-slot token
//! (SPEC_FULL.md §4.2, §5).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;

use crate::batch::Batch;
use crate::error::{ProcessorError, Result};
use crate::store::Store;

/// Owns exactly one token (§5 "Scheduling"): `open_batch` consumes it,
/// terminating the returned `Batch` returns it. Multiple chain workers that
/// must interleave run separate `Processor` instances over the same `Store`.
pub struct Processor {
    store: Arc<dyn Store>,
    max_row_count: u64,
    token: Arc<Semaphore>,
    closed: AtomicBool,
}

impl Processor {
    pub fn new(store: Arc<dyn Store>, max_row_count: u64) -> Self {
        Self {
            store,
            max_row_count,
            token: Arc::new(Semaphore::new(1)),
            closed: AtomicBool::new(false),
        }
    }

    /// `open_batch(ctx) → Batch`. Blocks until the single-slot token is
    /// available, then opens a SERIALIZABLE read-write store transaction.
    pub async fn open_batch(&self, ctx: &CancellationToken) -> Result<Batch> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(ProcessorError::Closed);
        }

        let permit = tokio::select! {
            biased;
            _ = ctx.cancelled() => return Err(ProcessorError::Cancelled),
            res = self.token.clone().acquire_owned() => {
                res.expect("the processor's token semaphore is never closed")
            }
        };

        // Closed between the first check and acquiring the token: hand the
        // permit straight back rather than opening a transaction.
        if self.closed.load(Ordering::SeqCst) {
            drop(permit);
            return Err(ProcessorError::Closed);
        }

        let tx = self.store.begin_serializable().await?;
        Ok(Batch::new(tx, permit, self.max_row_count))
    }

    /// `close(ctx)`: wait for the in-flight batch (if any) to finish, then
    /// decline to hand out new batches (§9 "Processor close": closing races
    /// a cancellation against token acquisition).
    pub async fn close(&self, ctx: &CancellationToken) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        tokio::select! {
            biased;
            _ = ctx.cancelled() => Err(ProcessorError::Cancelled),
            res = self.token.clone().acquire_owned() => {
                // Hold the permit forever: no batch will ever be opened again.
                std::mem::forget(res.expect("the processor's token semaphore is never closed"));
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;
    use std::sync::Mutex;

    use async_trait::async_trait;

    use validator_core::{Address, Privilege, PrivilegeSet, TableId};

    use super::*;
    use crate::store::{CommandTag, RegistryRow, Tx};

    #[derive(Default)]
    struct TableData {
        rows: i64,
        acl: HashMap<Address, PrivilegeSet>,
        owner: Option<Address>,
    }

    #[derive(Default)]
    struct Inner {
        registry: HashMap<TableId, (String, String, Address)>,
        tables: HashMap<TableId, TableData>,
    }

    // An in-memory `Store`/`Tx` pair, standing in for `validator-storage`'s
    // Postgres implementation in tests that don't need a real database.
    // Savepoints are modeled as snapshot/restore over the whole `Inner`
    // state, which is sufficient for the single-batch-at-a-time contract
    // this test suite exercises. `store_with`/`fresh_store` below build the
    // `Arc<dyn Store>` wrapper (`Backed`) that owns the shared `Inner`.

    struct MockTx {
        store: Arc<Mutex<Inner>>,
        snapshots: Vec<Inner>,
    }

    fn clone_inner(inner: &Inner) -> Inner {
        Inner {
            registry: inner.registry.clone(),
            tables: inner
                .tables
                .iter()
                .map(|(k, v)| {
                    (
                        *k,
                        TableData {
                            rows: v.rows,
                            acl: v.acl.clone(),
                            owner: v.owner,
                        },
                    )
                })
                .collect(),
        }
    }

    impl Clone for Inner {
        fn clone(&self) -> Self {
            clone_inner(self)
        }
    }

    #[async_trait]
    impl Tx for MockTx {
        async fn savepoint(&mut self, _name: &str) -> validator_common::Result<()> {
            let snap = clone_inner(&self.store.lock().unwrap());
            self.snapshots.push(snap);
            Ok(())
        }

        async fn release_savepoint(&mut self, _name: &str) -> validator_common::Result<()> {
            self.snapshots.pop();
            Ok(())
        }

        async fn rollback_to_savepoint(&mut self, _name: &str) -> validator_common::Result<()> {
            if let Some(snap) = self.snapshots.pop() {
                *self.store.lock().unwrap() = snap;
            }
            Ok(())
        }

        async fn execute(&mut self, sql: &str) -> validator_common::Result<CommandTag> {
            // The mock only needs to recognize the shapes this test suite
            // feeds it: INSERT adds one row per VALUES tuple to the
            // statement's stored table.
            let lower = sql.to_lowercase();
            if lower.starts_with("insert") {
                if let Some(name) = extract_stored_name(&lower) {
                    let id = parse_stored_name(&name);
                    let rows_affected = count_values_tuples(&lower);
                    let mut inner = self.store.lock().unwrap();
                    inner.tables.entry(id).or_default().rows += rows_affected as i64;
                    return Ok(CommandTag { is_insert: true, rows_affected });
                }
            }
            Ok(CommandTag { is_insert: false, rows_affected: 1 })
        }

        async fn row_count(&mut self, stored_table_name: &str) -> validator_common::Result<i64> {
            let id = parse_stored_name(stored_table_name);
            Ok(self.store.lock().unwrap().tables.get(&id).map(|t| t.rows).unwrap_or(0))
        }

        async fn registry_insert(
            &mut self,
            id: TableId,
            controller: Address,
            name_prefix: &str,
            structure_hash: &str,
            _description: &str,
        ) -> validator_common::Result<()> {
            self.store
                .lock()
                .unwrap()
                .registry
                .insert(id, (name_prefix.to_string(), structure_hash.to_string(), controller));
            Ok(())
        }

        async fn registry_lookup(&mut self, id: TableId) -> validator_common::Result<Option<RegistryRow>> {
            Ok(self.store.lock().unwrap().registry.get(&id).map(|(name, hash, controller)| RegistryRow {
                name_prefix: name.clone(),
                structure_hash: hash.clone(),
                controller: *controller,
            }))
        }

        async fn acl_insert_owner(
            &mut self,
            id: TableId,
            controller: Address,
            privileges: PrivilegeSet,
        ) -> validator_common::Result<()> {
            let mut inner = self.store.lock().unwrap();
            let table = inner.tables.entry(id).or_default();
            table.owner = Some(controller);
            table.acl.insert(controller, privileges);
            Ok(())
        }

        async fn acl_grant(
            &mut self,
            id: TableId,
            grantee: Address,
            privileges: PrivilegeSet,
        ) -> validator_common::Result<()> {
            let mut inner = self.store.lock().unwrap();
            let table = inner.tables.entry(id).or_default();
            let existing = table.acl.get(&grantee).copied().unwrap_or_default();
            table.acl.insert(grantee, existing.union(privileges));
            Ok(())
        }

        async fn acl_revoke(
            &mut self,
            id: TableId,
            grantee: Address,
            privileges: PrivilegeSet,
        ) -> validator_common::Result<()> {
            let mut inner = self.store.lock().unwrap();
            if let Some(table) = inner.tables.get_mut(&id) {
                if let Some(existing) = table.acl.get_mut(&grantee) {
                    for p in Privilege::ALL {
                        if privileges.contains(p) {
                            existing.remove(p);
                        }
                    }
                }
            }
            Ok(())
        }

        async fn acl_check(&mut self, caller: Address, id: TableId, privilege: Privilege) -> validator_common::Result<bool> {
            let inner = self.store.lock().unwrap();
            Ok(inner
                .tables
                .get(&id)
                .and_then(|t| t.acl.get(&caller))
                .map(|set| set.contains(privilege))
                .unwrap_or(false))
        }

        async fn acl_is_owner(&mut self, caller: Address, id: TableId) -> validator_common::Result<bool> {
            let inner = self.store.lock().unwrap();
            Ok(inner.tables.get(&id).and_then(|t| t.owner).map(|o| o == caller).unwrap_or(false))
        }

        async fn commit(self: Box<Self>) -> validator_common::Result<()> {
            Ok(())
        }

        async fn rollback(self: Box<Self>) -> validator_common::Result<()> {
            if let Some(snap) = self.snapshots.into_iter().next() {
                *self.store.lock().unwrap() = snap;
            }
            Ok(())
        }
    }

    fn extract_stored_name(lower_sql: &str) -> Option<String> {
        let after = lower_sql.strip_prefix("insert into ")?;
        let name = after.split_whitespace().next()?;
        Some(name.trim_matches(|c: char| !c.is_ascii_alphanumeric() && c != '_').to_string())
    }

    fn parse_stored_name(name: &str) -> TableId {
        let hex = name.trim_start_matches('_').trim_start_matches('t');
        TableId(u64::from_str_radix(hex, 16).unwrap_or(0))
    }

    /// Counts the row tuples in an `INSERT ... VALUES (...), (...)` statement,
    /// so the mock can report an accurate `rows_affected` for both
    /// single-row and multi-row inserts.
    fn count_values_tuples(lower_sql: &str) -> u64 {
        match lower_sql.find("values") {
            Some(idx) if lower_sql[idx..].contains('(') => {
                lower_sql[idx..].matches("),(").count() as u64 + 1
            }
            _ => 1,
        }
    }

    fn addr(byte: u8) -> Address {
        Address([byte; 20])
    }

    fn store_with(inner: Inner) -> Arc<dyn Store> {
        struct Backed(Arc<Mutex<Inner>>);

        #[async_trait]
        impl Store for Backed {
            async fn begin_serializable(&self) -> validator_common::Result<Box<dyn Tx>> {
                Ok(Box::new(MockTx { store: self.0.clone(), snapshots: Vec::new() }))
            }
        }

        Arc::new(Backed(Arc::new(Mutex::new(inner))))
    }

    fn fresh_store() -> Arc<dyn Store> {
        store_with(Inner::default())
    }

    #[tokio::test]
    async fn at_most_one_batch_open_at_a_time() {
        let processor = Processor::new(fresh_store(), 0);
        let ctx = CancellationToken::new();
        let batch = processor.open_batch(&ctx).await.unwrap();

        let second = tokio::time::timeout(std::time::Duration::from_millis(50), processor.open_batch(&ctx)).await;
        assert!(second.is_err(), "a second open_batch must block while the first is outstanding");

        batch.close().await.unwrap();
        let third = processor.open_batch(&ctx).await;
        assert!(third.is_ok(), "closing the first batch must return the token");
        third.unwrap().close().await.unwrap();
    }

    #[tokio::test]
    async fn close_then_open_batch_is_rejected() {
        let processor = Processor::new(fresh_store(), 0);
        let ctx = CancellationToken::new();
        processor.close(&ctx).await.unwrap();

        let err = processor.open_batch(&ctx).await.unwrap_err();
        assert!(matches!(err, ProcessorError::Closed));
    }

    #[tokio::test]
    async fn row_cap_breach_leaves_table_unchanged() {
        let controller = addr(1);
        let table_id = TableId(7);
        let mut inner = Inner::default();
        inner
            .registry
            .insert(table_id, ("widgets".to_string(), "hash".to_string(), controller));
        let mut table = TableData::default();
        table.rows = 9;
        table.owner = Some(controller);
        table.acl.insert(controller, PrivilegeSet::all());
        inner.tables.insert(table_id, table);

        let processor = Processor::new(store_with(inner), 10);
        let ctx = CancellationToken::new();
        let mut batch = processor.open_batch(&ctx).await.unwrap();

        let validator = validator_sql::Validator::new("system_", ["int8".to_string()].into_iter().collect());
        let (_, _, writes) = validator
            .validate_run("INSERT INTO widgets (id) VALUES (1); INSERT INTO widgets (id) VALUES (2);")
            .unwrap();

        // `exec_write_body` recomputes `before` per statement, not once per
        // batch: the first INSERT (before=9) succeeds, taking the table to
        // 10, and only the second INSERT (before=10) breaches the cap.
        let err = batch.exec_write_queries(controller, table_id, writes).await.unwrap_err();
        assert!(matches!(
            err,
            ProcessorError::RowCountExceeded { before: 10, after: 11 }
        ));
        batch.close().await.unwrap();

        // The rejected batch rolled back: the table is still at 9, so a
        // single-row insert (after=10, within the cap) succeeds.
        let mut accepted = processor.open_batch(&ctx).await.unwrap();
        let validator2 = validator_sql::Validator::new("system_", ["int8".to_string()].into_iter().collect());
        let (_, _, one_row) = validator2.validate_run("INSERT INTO widgets (id) VALUES (3);").unwrap();
        accepted.exec_write_queries(controller, table_id, one_row).await.unwrap();
        accepted.commit().await.unwrap();
        accepted.close().await.unwrap();

        // Now at exactly 10: one more row breaches the cap again, confirming
        // the committed count is 10 and not some other value.
        let mut over = processor.open_batch(&ctx).await.unwrap();
        let validator3 = validator_sql::Validator::new("system_", ["int8".to_string()].into_iter().collect());
        let (_, _, another_row) = validator3.validate_run("INSERT INTO widgets (id) VALUES (4);").unwrap();
        let err3 = over.exec_write_queries(controller, table_id, another_row).await.unwrap_err();
        assert!(matches!(err3, ProcessorError::RowCountExceeded { before: 10, after: 11 }));
        over.close().await.unwrap();
    }

    /// SPEC_FULL.md §8 scenario 5, verbatim: a single statement inserting
    /// two rows against a table already at 9 with `MaxRowCount=10` fails
    /// with `before:9, after:11` and leaves the table at 9.
    #[tokio::test]
    async fn row_cap_breach_single_multi_row_insert_matches_spec_scenario() {
        let controller = addr(1);
        let table_id = TableId(8);
        let mut inner = Inner::default();
        inner
            .registry
            .insert(table_id, ("widgets".to_string(), "hash".to_string(), controller));
        let mut table = TableData::default();
        table.rows = 9;
        table.owner = Some(controller);
        table.acl.insert(controller, PrivilegeSet::all());
        inner.tables.insert(table_id, table);

        let processor = Processor::new(store_with(inner), 10);
        let ctx = CancellationToken::new();
        let mut batch = processor.open_batch(&ctx).await.unwrap();

        let validator = validator_sql::Validator::new("system_", ["int8".to_string()].into_iter().collect());
        let (_, _, writes) = validator
            .validate_run("INSERT INTO widgets (id) VALUES (1), (2);")
            .unwrap();

        let err = batch.exec_write_queries(controller, table_id, writes).await.unwrap_err();
        assert!(matches!(
            err,
            ProcessorError::RowCountExceeded { before: 9, after: 11 }
        ));
        batch.close().await.unwrap();

        // The rejected batch rolled back: the table is still at 9, so a
        // single-row insert (after=10, within the cap) succeeds.
        let mut reopened = processor.open_batch(&ctx).await.unwrap();
        let validator2 = validator_sql::Validator::new("system_", ["int8".to_string()].into_iter().collect());
        let (_, _, one_row) = validator2.validate_run("INSERT INTO widgets (id) VALUES (3);").unwrap();
        reopened.exec_write_queries(controller, table_id, one_row).await.unwrap();
        reopened.commit().await.unwrap();
        reopened.close().await.unwrap();
    }

    #[tokio::test]
    async fn acl_denies_writer_without_privilege() {
        let owner = addr(1);
        let stranger = addr(2);
        let table_id = TableId(3);
        let mut inner = Inner::default();
        inner
            .registry
            .insert(table_id, ("widgets".to_string(), "hash".to_string(), owner));
        let mut table = TableData::default();
        table.owner = Some(owner);
        table.acl.insert(owner, PrivilegeSet::all());
        inner.tables.insert(table_id, table);

        let processor = Processor::new(store_with(inner), 0);
        let ctx = CancellationToken::new();
        let mut batch = processor.open_batch(&ctx).await.unwrap();

        let validator = validator_sql::Validator::new("system_", ["int8".to_string()].into_iter().collect());
        let (_, _, writes) = validator.validate_run("INSERT INTO widgets (id) VALUES (1);").unwrap();

        let err = batch.exec_write_queries(stranger, table_id, writes).await.unwrap_err();
        assert!(matches!(
            err,
            ProcessorError::AclDenied { required: Privilege::Insert, .. }
        ));
        batch.close().await.unwrap();
    }

    #[tokio::test]
    async fn grant_requires_owner() {
        let owner = addr(1);
        let stranger = addr(2);
        let grantee = addr(3);
        let table_id = TableId(9);
        let mut inner = Inner::default();
        let mut table = TableData::default();
        table.owner = Some(owner);
        inner.tables.insert(table_id, table);

        let processor = Processor::new(store_with(inner), 0);
        let ctx = CancellationToken::new();
        let mut batch = processor.open_batch(&ctx).await.unwrap();

        let err = batch
            .grant_privileges(stranger, table_id, grantee, PrivilegeSet::all())
            .await
            .unwrap_err();
        assert!(matches!(err, ProcessorError::NotOwner(_)));

        batch
            .grant_privileges(owner, table_id, grantee, PrivilegeSet::all())
            .await
            .unwrap();
        batch.commit().await.unwrap();
        batch.close().await.unwrap();
    }
}
