//! Domain model (TableId, ChainId, Address, Privilege, Receipt) and the
//! event/service traits the chain feed is built against.

pub mod block;
pub mod event;
pub mod ids;
pub mod privilege;
pub mod receipt;
pub mod security;
pub mod service;

pub use block::BlockStatus;
pub use event::{Event, RegistryEvent, RegistryPayload};
pub use ids::{Address, ChainId, TableId};
pub use privilege::{Operation, Privilege, PrivilegeSet};
pub use receipt::Receipt;
pub use service::{ChainWatcher, EventSubscription};
