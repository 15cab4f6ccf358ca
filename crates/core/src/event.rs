//! Event trait implemented by chain-specific events (the chain feed's
//! `RegistryEvent` in `validator-chain`), and the registry-contract payload
//! shapes the Processor consumes.

use std::fmt::Debug;
use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::ids::{Address, ChainId, TableId};
use crate::privilege::PrivilegeSet;

/// Common trait for every chain-specific event delivered to the Processor.
pub trait Event: Debug + Send + Sync {
    fn id(&self) -> &str;
    fn chain(&self) -> &str;
    fn block_number(&self) -> u64;
    fn block_hash(&self) -> &str;
    fn tx_hash(&self) -> &str;
    fn timestamp(&self) -> SystemTime;
    fn event_type(&self) -> &str;
    fn raw_data(&self) -> &[u8];
}

/// The decoded payload of a registry-contract log, independent of which
/// chain emitted it. This is what the chain feed hands to the Processor.
///
/// `GrantPrivileges`/`RevokePrivileges` are their own variants, not SQL text:
/// the Validator's top-level classification table (SPEC_FULL.md §4.1) only
/// admits `SELECT`/`INSERT`/`UPDATE`/`DELETE` on the `validate_run` path, so a
/// `GRANT`/`REVOKE` intent never goes through `validate_run` at all — it is
/// decoded directly from its own registry-contract event and applied by the
/// Processor's ACL step (§4.2.b) without touching the SQL Validator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum RegistryPayload {
    /// A table-creation intent: the minted id, the controller, the create
    /// statement, and a human-readable description.
    TableCreated {
        table_id: TableId,
        controller: Address,
        description: String,
        statement: String,
    },
    /// A row-mutation intent against an existing table.
    RunSql {
        caller: Address,
        table_id: TableId,
        statement: String,
    },
    /// A grant of privileges, issued by the table's owner.
    GrantPrivileges {
        caller: Address,
        table_id: TableId,
        grantee: Address,
        privileges: PrivilegeSet,
    },
    /// A revocation of privileges, issued by the table's owner.
    RevokePrivileges {
        caller: Address,
        table_id: TableId,
        grantee: Address,
        privileges: PrivilegeSet,
    },
}

/// A registry-contract event, ready for the Processor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegistryEvent {
    pub chain_id: ChainId,
    pub block_number: u64,
    pub tx_hash: String,
    pub event_index: u32,
    pub payload: RegistryPayload,
}
