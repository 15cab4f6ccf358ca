//! The Validator: parses, classifies, enforces the restricted SQL subset,
//! and canonicalizes (SPEC_FULL.md §4.1).
//!
//! Deep structural recursion is replaced with an explicit [`Visit`]/[`Visitor`]
//! walk (§9, "AST traversal without open recursion"): [`PolicyVisitor`] catches
//! non-deterministic function calls, subqueries, and system-table references
//! anywhere in a statement's tree, while top-level shape (joins, RETURNING,
//! FOR UPDATE/SHARE, the single-table-per-batch rule) is checked directly
//! against the statement's own fields at each call site.

use std::collections::HashSet;
use std::ops::ControlFlow;

use sqlparser::ast::{
    Expr, FromTable, ObjectName, SetExpr, Statement, TableFactor, TableWithJoins, Visit, Visitor,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;

use validator_core::Operation;

use crate::error::{Result, ValidationError};
use crate::hash::structure_hash;
use crate::types::{CreateStmt, QueryType, ReadStmt, WriteStmt};

/// AST-identity, case-insensitive: these are matched by function name, never
/// by lexical form, so `current_TiMeSTamP` is caught the same as
/// `CURRENT_TIMESTAMP` (SPEC_FULL.md §4.1.b.5).
const NON_DETERMINISTIC_FUNCTIONS: &[&str] = &[
    "current_timestamp",
    "current_date",
    "current_time",
    "localtime",
    "localtimestamp",
    "now",
    "current_user",
    "session_user",
    "random",
    "clock_timestamp",
    "statement_timestamp",
    "transaction_timestamp",
];

/// A parser-driven policy filter over the restricted SQL subset.
///
/// Pure and reentrant (SPEC_FULL.md §5): holds only configuration, no
/// mutable state, so any number of concurrent callers are safe.
pub struct Validator {
    system_table_prefix: String,
    accepted_column_types: HashSet<String>,
}

impl Validator {
    pub fn new(system_table_prefix: impl Into<String>, accepted_column_types: HashSet<String>) -> Self {
        Self {
            system_table_prefix: system_table_prefix.into().to_lowercase(),
            accepted_column_types: accepted_column_types.into_iter().map(|s| s.to_lowercase()).collect(),
        }
    }

    fn is_system_table(&self, name: &str) -> bool {
        name.to_lowercase().starts_with(&self.system_table_prefix)
    }

    /// `validate_create(query) → CreateStmt | Error`
    pub fn validate_create(&self, sql: &str) -> Result<CreateStmt> {
        let mut statements = parse(sql)?;
        if statements.is_empty() {
            return Err(ValidationError::EmptyStatement);
        }
        if statements.len() != 1 {
            return Err(ValidationError::NoSingleStatement);
        }
        let stmt = statements.remove(0);

        let (name, columns) = match &stmt {
            Statement::CreateTable { name, columns, .. } => (name.clone(), columns.clone()),
            _ => return Err(ValidationError::NoTopLevelCreate),
        };

        let mut pairs = Vec::with_capacity(columns.len());
        for col in &columns {
            let type_name = normalize_type_name(&col.data_type.to_string());
            if !self.accepted_column_types.contains(&type_name) {
                return Err(ValidationError::InvalidColumnType { name: type_name });
            }
            pairs.push((col.name.value.clone(), type_name));
        }

        let hash = structure_hash(pairs.iter().map(|(n, t)| (n.as_str(), t.as_str())));
        let name_prefix = name.to_string();
        Ok(CreateStmt::new(stmt, hash, name_prefix))
    }

    /// `validate_run(query) → (QueryType, Option<ReadStmt>, Vec<WriteStmt>) | Error`
    pub fn validate_run(&self, sql: &str) -> Result<(QueryType, Option<ReadStmt>, Vec<WriteStmt>)> {
        let statements = parse(sql)?;
        if statements.is_empty() {
            return Err(ValidationError::EmptyStatement);
        }

        match &statements[0] {
            Statement::Query(_) => {
                if statements.len() != 1 {
                    return Err(ValidationError::NoSingleStatement);
                }
                let read = self.validate_read(&statements[0])?;
                Ok((QueryType::Read, Some(read), Vec::new()))
            }
            Statement::Insert { .. } | Statement::Update { .. } | Statement::Delete { .. } => {
                let mut writes = Vec::with_capacity(statements.len());
                let mut first_table: Option<String> = None;

                for stmt in &statements {
                    if !matches!(stmt, Statement::Insert { .. } | Statement::Update { .. } | Statement::Delete { .. }) {
                        return Err(ValidationError::NoTopLevelUpdateInsertDelete);
                    }
                    let w = self.validate_write(stmt)?;
                    match &first_table {
                        None => first_table = Some(w.table_name.clone()),
                        Some(t) if *t != w.table_name => {
                            return Err(ValidationError::MultiTableReference {
                                ref1: t.clone(),
                                ref2: w.table_name.clone(),
                            });
                        }
                        _ => {}
                    }
                    writes.push(w);
                }
                Ok((QueryType::Write, None, writes))
            }
            _ => Err(ValidationError::NoTopLevelUpdateInsertDelete),
        }
    }

    /// §4.1.a: read validation.
    fn validate_read(&self, stmt: &Statement) -> Result<ReadStmt> {
        let Statement::Query(query) = stmt else {
            return Err(ValidationError::NoTopLevelUpdateInsertDelete);
        };

        let select = match query.body.as_ref() {
            SetExpr::Select(select) => select.as_ref(),
            // UNION/INTERSECT/EXCEPT/VALUES-as-top-level/etc: conservatively
            // rejected, per §9's "other kinds are conservatively rejected".
            _ => return Err(ValidationError::JoinOrSubquery),
        };

        for item in &select.from {
            reject_join(item)?;
        }

        if !query.locks.is_empty() {
            return Err(ValidationError::NoForUpdateOrShare);
        }

        self.scan_for_policy_violations(stmt)?;

        Ok(ReadStmt::new(stmt.to_string()))
    }

    /// §4.1.b: write validation, one statement at a time.
    fn validate_write(&self, stmt: &Statement) -> Result<WriteStmt> {
        match stmt {
            Statement::Insert { table_name, source, returning, .. } => {
                if returning.is_some() {
                    return Err(ValidationError::ReturningClause);
                }
                if self.is_system_table(&table_name.to_string()) {
                    return Err(ValidationError::SystemTableReferencing);
                }
                if let Some(source) = source {
                    // Only an explicit VALUES list is allowed; anything else
                    // (a SELECT, a set operation) is a subquery.
                    if !matches!(source.body.as_ref(), SetExpr::Values(_)) {
                        return Err(ValidationError::JoinOrSubquery);
                    }
                }

                self.scan_for_policy_violations(stmt)?;
                Ok(WriteStmt::new(stmt.clone(), stmt.to_string(), table_name.to_string(), Operation::Insert))
            }

            Statement::Update { table, assignments: _, from, returning, .. } => {
                if returning.is_some() {
                    return Err(ValidationError::ReturningClause);
                }
                if from.is_some() {
                    return Err(ValidationError::JoinOrSubquery);
                }
                reject_join(table)?;
                let name = table_factor_name(&table.relation)
                    .ok_or(ValidationError::NoTopLevelUpdateInsertDelete)?;
                if self.is_system_table(&name) {
                    return Err(ValidationError::SystemTableReferencing);
                }

                self.scan_for_policy_violations(stmt)?;
                Ok(WriteStmt::new(stmt.clone(), stmt.to_string(), name, Operation::Update))
            }

            Statement::Delete { from, using, returning, .. } => {
                if returning.is_some() {
                    return Err(ValidationError::ReturningClause);
                }
                if using.is_some() {
                    return Err(ValidationError::JoinOrSubquery);
                }
                let tables = match from {
                    FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
                };
                if tables.len() != 1 {
                    return Err(ValidationError::JoinOrSubquery);
                }
                reject_join(&tables[0])?;
                let name = table_factor_name(&tables[0].relation)
                    .ok_or(ValidationError::NoTopLevelUpdateInsertDelete)?;
                if self.is_system_table(&name) {
                    return Err(ValidationError::SystemTableReferencing);
                }

                self.scan_for_policy_violations(stmt)?;
                Ok(WriteStmt::new(stmt.clone(), stmt.to_string(), name, Operation::Delete))
            }

            _ => Err(ValidationError::NoTopLevelUpdateInsertDelete),
        }
    }

    /// Deep walk for non-deterministic functions, subqueries and
    /// system-table references anywhere in the tree (§4.1.b.3-5).
    fn scan_for_policy_violations(&self, stmt: &Statement) -> Result<()> {
        let mut visitor = PolicyVisitor {
            system_table_prefix: &self.system_table_prefix,
            violation: None,
        };
        let _ = stmt.visit(&mut visitor);
        match visitor.violation {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

struct PolicyVisitor<'a> {
    system_table_prefix: &'a str,
    violation: Option<ValidationError>,
}

impl Visitor for PolicyVisitor<'_> {
    type Break = ();

    fn pre_visit_expr(&mut self, expr: &Expr) -> ControlFlow<()> {
        if self.violation.is_some() {
            return ControlFlow::Break(());
        }
        match expr {
            Expr::Function(f) => {
                if let Some(last) = f.name.0.last() {
                    if NON_DETERMINISTIC_FUNCTIONS.contains(&last.to_string().to_lowercase().as_str()) {
                        self.violation = Some(ValidationError::NonDeterministicFunction);
                        return ControlFlow::Break(());
                    }
                }
            }
            Expr::Subquery(_) | Expr::InSubquery { .. } | Expr::Exists { .. } => {
                self.violation = Some(ValidationError::JoinOrSubquery);
                return ControlFlow::Break(());
            }
            _ => {}
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_relation(&mut self, relation: &ObjectName) -> ControlFlow<()> {
        if self.violation.is_some() {
            return ControlFlow::Break(());
        }
        if let Some(last) = relation.0.last() {
            if last.to_string().to_lowercase().starts_with(self.system_table_prefix) {
                self.violation = Some(ValidationError::SystemTableReferencing);
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    fn pre_visit_table_factor(&mut self, table_factor: &TableFactor) -> ControlFlow<()> {
        if self.violation.is_some() {
            return ControlFlow::Break(());
        }
        if matches!(table_factor, TableFactor::Derived { .. } | TableFactor::NestedJoin { .. }) {
            self.violation = Some(ValidationError::JoinOrSubquery);
            return ControlFlow::Break(());
        }
        ControlFlow::Continue(())
    }
}

fn reject_join(item: &TableWithJoins) -> Result<()> {
    if !item.joins.is_empty() {
        return Err(ValidationError::JoinOrSubquery);
    }
    if matches!(item.relation, TableFactor::Derived { .. } | TableFactor::NestedJoin { .. }) {
        return Err(ValidationError::JoinOrSubquery);
    }
    Ok(())
}

fn table_factor_name(factor: &TableFactor) -> Option<String> {
    match factor {
        TableFactor::Table { name, .. } => Some(name.to_string()),
        _ => None,
    }
}

/// Strip a `pg_catalog.` namespace prefix and lower-case, so `pg_catalog.int4`
/// and `int4` match the same allow-list entry.
fn normalize_type_name(type_name: &str) -> String {
    let lower = type_name.to_lowercase();
    lower
        .strip_prefix("pg_catalog.")
        .unwrap_or(&lower)
        .to_string()
}

fn parse(sql: &str) -> Result<Vec<Statement>> {
    Parser::parse_sql(&GenericDialect {}, sql).map_err(|e| ValidationError::InvalidSyntax {
        inner: e.to_string(),
    })
}
