//! The Processor's error taxonomy (SPEC_FULL.md §7).

use thiserror::Error;

use validator_core::{Privilege, TableId};
use validator_sql::ValidationError;

pub type Result<T> = std::result::Result<T, ProcessorError>;

/// Batch-level failures. Every variant is surfaced verbatim to the receipt
/// emitter (§7): none of these are retried inside the Processor.
#[derive(Debug, Error)]
pub enum ProcessorError {
    /// The Validator rejected the statement before it reached the store.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Ambient/storage-layer failure; causes rollback (§7 "Store errors").
    #[error(transparent)]
    Store(#[from] validator_common::Error),

    /// `ExecWriteQueries` step 2: the table id has no `registry` row.
    #[error("table {0} does not exist")]
    TableNotFound(TableId),

    /// A statement's name-prefix hint disagrees with the registry name
    /// (§4.2.b.3, "If mq exposes a name-prefix hint and it disagrees...").
    #[error("statement references table `{found}`, but batch is bound to `{expected}`")]
    TableMismatch { expected: String, found: String },

    /// `CheckPrivileges` denial (§6, §7 "ACL errors").
    #[error("caller lacks required privilege `{required}` on table {table_id}")]
    AclDenied { table_id: TableId, required: Privilege },

    /// Non-owner attempted a `Grant`/`Revoke` (§4.2.b, §7 "non-owner cannot grant").
    #[error("caller is not the owner of table {0}")]
    NotOwner(TableId),

    /// §7 "Integrity errors": the one kind that must be surfaced identifiably,
    /// unwrapped, to the receipt layer.
    #[error("row count would exceed cap: before={before} after={after}")]
    RowCountExceeded { before: i64, after: i64 },

    /// `open_batch`/`close` called after `close` already completed.
    #[error("processor is closed")]
    Closed,

    /// The caller's cancellation context fired before the operation completed
    /// (§5 "Cancellation").
    #[error("operation cancelled")]
    Cancelled,

    /// A `Batch` method was called outside the `Open` state.
    #[error("batch is not open")]
    BatchNotOpen,
}

impl ProcessorError {
    /// `true` for the one error kind §7 says must reach the receipt layer
    /// unwrapped rather than as a generic validation/store failure.
    pub fn is_row_count_exceeded(&self) -> bool {
        matches!(self, ProcessorError::RowCountExceeded { .. })
    }
}
