//! SQL Validator: parses, classifies, enforces the restricted SQL subset,
//! and canonicalizes statements before they reach the Processor.

pub mod error;
pub mod hash;
pub mod types;
pub mod validate;

pub use error::{Result, ValidationError};
pub use types::{CreateStmt, QueryType, ReadStmt, WriteStmt};
pub use validate::Validator;
