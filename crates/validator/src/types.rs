//! Validated statement types (SPEC_FULL.md §3).

use sqlparser::ast::{FromTable, Ident, ObjectName, Statement, TableFactor};

use validator_core::{Operation, TableId};

/// Which branch a `validate_run` payload was classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryType {
    Read,
    Write,
}

/// A validated `CREATE TABLE`.
///
/// Per the "mutate-and-deparse" design note (SPEC_FULL.md §9): the AST is a
/// one-shot mutable value consumed by [`CreateStmt::bind`]. The structure
/// hash is computed once, at validation time, from the column list as it was
/// then — `bind` only ever rewrites the relation name, never a column, so the
/// hash stays valid for every future `bind` call despite being stored
/// alongside a mutable AST.
#[derive(Debug, Clone)]
pub struct CreateStmt {
    ast: Statement,
    /// Hex SHA-256 over `col:type` pairs in declaration order.
    pub structure_hash: String,
    /// The user-supplied relation name (never reaches the store).
    pub name_prefix: String,
}

impl CreateStmt {
    pub(crate) fn new(ast: Statement, structure_hash: String, name_prefix: String) -> Self {
        Self {
            ast,
            structure_hash,
            name_prefix,
        }
    }

    /// Rewrite the stored AST's relation name to `t<16-hex table id>` and
    /// deparse. Binding the same id twice yields identical SQL (invariant 2
    /// in SPEC_FULL.md §8); binding to a different id changes only the
    /// relation identifier.
    pub fn bind(&self, table_id: TableId) -> String {
        let mut ast = self.ast.clone();
        if let Statement::CreateTable { name, .. } = &mut ast {
            *name = ObjectName(vec![Ident::new(table_id.sql_name())]);
        }
        ast.to_string()
    }
}

/// A validated row mutation (`INSERT`/`UPDATE`/`DELETE`).
///
/// Carries its own AST, symmetrically with [`CreateStmt`]: invariant 1
/// (SPEC_FULL.md §8 — "every table's on-disk relation name is exactly
/// `_<hex>`; user-chosen names never reach the store") applies to row
/// mutations just as much as to `CREATE TABLE`, so [`WriteStmt::bind`]
/// rewrites the single referenced relation to its stored name before the
/// Processor executes it.
#[derive(Debug, Clone)]
pub struct WriteStmt {
    ast: Statement,
    canonical_sql: String,
    /// The single user table this statement references.
    pub table_name: String,
    /// Which of the three mutation kinds this statement is, so the Processor
    /// can pick the required privilege and the row-cap check without
    /// re-parsing `canonical_sql`.
    operation: Operation,
}

impl WriteStmt {
    pub(crate) fn new(ast: Statement, canonical_sql: String, table_name: String, operation: Operation) -> Self {
        Self {
            ast,
            canonical_sql,
            table_name,
            operation,
        }
    }

    /// The pre-deparsed canonical form, stored at validation time. Still
    /// references the user-chosen table name; callers that execute against
    /// the store must use [`WriteStmt::bind`] instead.
    pub fn canonical_sql(&self) -> &str {
        &self.canonical_sql
    }

    pub fn operation(&self) -> Operation {
        self.operation
    }

    /// Rewrite the statement's single table reference to `stored_name`
    /// (the table's on-disk `_<hex>` form) and deparse.
    pub fn bind(&self, stored_name: &str) -> String {
        let mut ast = self.ast.clone();
        let new_name = ObjectName(vec![Ident::new(stored_name)]);
        match &mut ast {
            Statement::Insert { table_name, .. } => *table_name = new_name,
            Statement::Update { table, .. } => {
                if let TableFactor::Table { name, .. } = &mut table.relation {
                    *name = new_name;
                }
            }
            Statement::Delete { from, .. } => {
                let tables = match from {
                    FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
                };
                if let Some(first) = tables.first_mut() {
                    if let TableFactor::Table { name, .. } = &mut first.relation {
                        *name = new_name;
                    }
                }
            }
            _ => {}
        }
        ast.to_string()
    }
}

/// A validated `SELECT`. No rewrite is needed; it is executed verbatim
/// (SPEC_FULL.md §9, Open Question: read-path object kept minimal).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadStmt {
    sql: String,
}

impl ReadStmt {
    pub(crate) fn new(sql: String) -> Self {
        Self { sql }
    }

    pub fn canonical_sql(&self) -> &str {
        &self.sql
    }
}
