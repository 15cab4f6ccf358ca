//! The Transaction Processor: a serialized batch engine that atomically
//! applies one on-chain event's mutations under a SERIALIZABLE store
//! transaction, enforcing ACL privileges and a per-table row-count cap
//! (SPEC_FULL.md §4.2).

pub mod batch;
pub mod dispatch;
pub mod error;
pub mod processor;
pub mod store;

pub use batch::Batch;
pub use dispatch::process_event;
pub use error::{ProcessorError, Result};
pub use processor::Processor;
pub use store::{CommandTag, RegistryRow, Store, Tx};
