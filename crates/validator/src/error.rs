//! The twelve named validation error kinds (SPEC_FULL.md §4.1).

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ValidationError>;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid syntax: {inner}")]
    InvalidSyntax { inner: String },

    #[error("statement is empty")]
    EmptyStatement,

    #[error("expected exactly one statement")]
    NoSingleStatement,

    #[error("top-level statement must be INSERT, UPDATE or DELETE")]
    NoTopLevelUpdateInsertDelete,

    #[error("top-level statement must be CREATE TABLE")]
    NoTopLevelCreate,

    #[error("joins and subqueries are not allowed")]
    JoinOrSubquery,

    #[error("RETURNING clauses are not allowed")]
    ReturningClause,

    #[error("statement references a system table")]
    SystemTableReferencing,

    #[error("non-deterministic functions are not allowed")]
    NonDeterministicFunction,

    #[error("FOR UPDATE / FOR SHARE locking clauses are not allowed")]
    NoForUpdateOrShare,

    #[error("column `{name}` has a type that is not in the accepted-type allow-list")]
    InvalidColumnType { name: String },

    #[error("statement batch references more than one table: `{ref1}` and `{ref2}`")]
    MultiTableReference { ref1: String, ref2: String },
}
