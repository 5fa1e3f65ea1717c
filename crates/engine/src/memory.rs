//! In-memory SQL backend.
//!
//! Stands in for the native per-partition engine when the delegated path
//! is active: statements arrive as raw SQL and run against tables held in
//! process memory. DML returns the usual single-cell modified-row count;
//! simple SELECTs are answered so tests can observe mutations.

use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;

use arrow::array::{ArrayRef, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use sqlparser::ast::{
    AssignmentTarget, BinaryOperator, Delete, Expr, FromTable, Insert, Query, SelectItem, SetExpr,
    Statement, TableFactor, TableObject, UnaryOperator, Value,
};
use sqlparser::dialect::GenericDialect;
use sqlparser::parser::Parser;
use tokio::sync::RwLock;
use tracing::debug;

use floe_common::table::modified_count_table;
use floe_common::{Error, Result};

use crate::SqlBackend;

/// Declared type of a backend column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    BigInt,
    Text,
}

/// One stored value.
#[derive(Debug, Clone, PartialEq)]
pub enum Cell {
    BigInt(i64),
    Text(String),
    Null,
}

impl Cell {
    fn coerce(self, ty: ColumnType) -> Result<Cell> {
        match (&self, ty) {
            (Cell::Null, _)
            | (Cell::BigInt(_), ColumnType::BigInt)
            | (Cell::Text(_), ColumnType::Text) => Ok(self),
            _ => Err(Error::Execution(format!(
                "value {self:?} does not fit column type {ty:?}"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
struct Column {
    name: String,
    ty: ColumnType,
}

#[derive(Debug)]
struct MemTable {
    columns: Vec<Column>,
    rows: Vec<Vec<Cell>>,
}

impl MemTable {
    fn column_index(&self, name: &str) -> Result<usize> {
        self.columns
            .iter()
            .position(|column| column.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::Execution(format!("unknown column {name}")))
    }
}

/// Thread-safe in-memory table store answering `run_dml`.
#[derive(Default)]
pub struct MemoryBackend {
    tables: RwLock<HashMap<String, MemTable>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            tables: RwLock::new(HashMap::new()),
        }
    }

    /// Registers an empty table. Replaces any table with the same name.
    pub async fn create_table(&self, name: &str, columns: &[(&str, ColumnType)]) {
        let table = MemTable {
            columns: columns
                .iter()
                .map(|(name, ty)| Column {
                    name: (*name).to_string(),
                    ty: *ty,
                })
                .collect(),
            rows: Vec::new(),
        };
        let mut tables = self.tables.write().await;
        tables.insert(normalize(name), table);
    }

    /// Number of rows currently stored in a table.
    pub async fn row_count(&self, name: &str) -> Result<usize> {
        let tables = self.tables.read().await;
        let table = tables
            .get(&normalize(name))
            .ok_or_else(|| Error::Execution(format!("unknown table {name}")))?;
        Ok(table.rows.len())
    }

    async fn execute(&self, sql: &str) -> Result<RecordBatch> {
        let dialect = GenericDialect {};
        let mut statements = Parser::parse_sql(&dialect, sql)?;
        if statements.len() != 1 {
            return Err(Error::NotSupported(format!(
                "expected exactly one statement, got {}",
                statements.len()
            )));
        }
        match statements.remove(0) {
            Statement::Insert(insert) => self.run_insert(insert).await,
            Statement::Update {
                table,
                assignments,
                selection,
                ..
            } => self.run_update(&table.relation, &assignments, selection.as_ref()).await,
            Statement::Delete(delete) => self.run_delete(delete).await,
            Statement::Query(query) => self.run_select(*query).await,
            other => Err(Error::NotSupported(format!(
                "statement is not supported: {other}"
            ))),
        }
    }

    async fn run_insert(&self, insert: Insert) -> Result<RecordBatch> {
        let table_name = match &insert.table {
            TableObject::TableName(name) => name.to_string(),
            other => {
                return Err(Error::NotSupported(format!(
                    "INSERT target is not a plain table: {other}"
                )))
            }
        };
        let source = insert.source.ok_or_else(|| {
            Error::NotSupported("INSERT without a VALUES list is not supported".to_string())
        })?;
        let value_rows = match *source.body {
            SetExpr::Values(values) => values.rows,
            _ => {
                return Err(Error::NotSupported(
                    "INSERT source must be a VALUES list".to_string(),
                ))
            }
        };

        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&normalize(&table_name))
            .ok_or_else(|| Error::Execution(format!("unknown table {table_name}")))?;

        let targets: Vec<usize> = if insert.columns.is_empty() {
            (0..table.columns.len()).collect()
        } else {
            insert
                .columns
                .iter()
                .map(|ident| table.column_index(&ident.value))
                .collect::<Result<_>>()?
        };

        // Stage every row before touching the table so a bad row leaves it
        // unmodified.
        let mut staged = Vec::with_capacity(value_rows.len());
        for exprs in &value_rows {
            if exprs.len() != targets.len() {
                return Err(Error::Execution(format!(
                    "INSERT row has {} values for {} target columns",
                    exprs.len(),
                    targets.len()
                )));
            }
            let mut row = vec![Cell::Null; table.columns.len()];
            for (expr, &idx) in exprs.iter().zip(&targets) {
                row[idx] = literal_cell(expr)?.coerce(table.columns[idx].ty)?;
            }
            staged.push(row);
        }

        let inserted = staged.len() as i64;
        table.rows.extend(staged);
        debug!(table = %table_name, inserted, "applied INSERT");
        modified_count_table(inserted)
    }

    async fn run_update(
        &self,
        relation: &TableFactor,
        assignments: &[sqlparser::ast::Assignment],
        selection: Option<&Expr>,
    ) -> Result<RecordBatch> {
        let table_name = table_factor_name(relation)?;
        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&normalize(&table_name))
            .ok_or_else(|| Error::Execution(format!("unknown table {table_name}")))?;

        let mut sets = Vec::with_capacity(assignments.len());
        for assignment in assignments {
            let column = match &assignment.target {
                AssignmentTarget::ColumnName(name) => name.to_string(),
                other => {
                    return Err(Error::NotSupported(format!(
                        "assignment target is not a column: {other}"
                    )))
                }
            };
            let idx = table.column_index(&column)?;
            let cell = literal_cell(&assignment.value)?.coerce(table.columns[idx].ty)?;
            sets.push((idx, cell));
        }

        let predicate = selection
            .map(|expr| Predicate::compile(expr, &table.columns))
            .transpose()?;

        let mut changed = 0i64;
        for row in &mut table.rows {
            if predicate.as_ref().map_or(true, |p| p.matches(row)) {
                for (idx, cell) in &sets {
                    row[*idx] = cell.clone();
                }
                changed += 1;
            }
        }
        debug!(table = %table_name, changed, "applied UPDATE");
        modified_count_table(changed)
    }

    async fn run_delete(&self, delete: Delete) -> Result<RecordBatch> {
        let from = match &delete.from {
            FromTable::WithFromKeyword(tables) | FromTable::WithoutKeyword(tables) => tables,
        };
        if from.len() != 1 {
            return Err(Error::NotSupported(
                "DELETE must target exactly one table".to_string(),
            ));
        }
        let table_name = table_factor_name(&from[0].relation)?;

        let mut tables = self.tables.write().await;
        let table = tables
            .get_mut(&normalize(&table_name))
            .ok_or_else(|| Error::Execution(format!("unknown table {table_name}")))?;

        let predicate = delete
            .selection
            .as_ref()
            .map(|expr| Predicate::compile(expr, &table.columns))
            .transpose()?;

        let before = table.rows.len();
        match predicate {
            Some(predicate) => table.rows.retain(|row| !predicate.matches(row)),
            None => table.rows.clear(),
        }
        let removed = (before - table.rows.len()) as i64;
        debug!(table = %table_name, removed, "applied DELETE");
        modified_count_table(removed)
    }

    async fn run_select(&self, query: Query) -> Result<RecordBatch> {
        let select = match *query.body {
            SetExpr::Select(select) => select,
            _ => {
                return Err(Error::NotSupported(
                    "only plain SELECT queries are supported".to_string(),
                ))
            }
        };
        if select.from.len() != 1 {
            return Err(Error::NotSupported(
                "SELECT must read exactly one table".to_string(),
            ));
        }
        let table_name = table_factor_name(&select.from[0].relation)?;

        let tables = self.tables.read().await;
        let table = tables
            .get(&normalize(&table_name))
            .ok_or_else(|| Error::Execution(format!("unknown table {table_name}")))?;

        let mut projected = Vec::new();
        for item in &select.projection {
            match item {
                SelectItem::Wildcard(_) => projected.extend(0..table.columns.len()),
                SelectItem::UnnamedExpr(Expr::Identifier(ident)) => {
                    projected.push(table.column_index(&ident.value)?)
                }
                other => {
                    return Err(Error::NotSupported(format!(
                        "projection is not supported: {other}"
                    )))
                }
            }
        }

        let predicate = select
            .selection
            .as_ref()
            .map(|expr| Predicate::compile(expr, &table.columns))
            .transpose()?;
        let rows: Vec<&Vec<Cell>> = table
            .rows
            .iter()
            .filter(|row| predicate.as_ref().map_or(true, |p| p.matches(row)))
            .collect();

        let mut fields = Vec::with_capacity(projected.len());
        let mut arrays: Vec<ArrayRef> = Vec::with_capacity(projected.len());
        for &idx in &projected {
            let column = &table.columns[idx];
            match column.ty {
                ColumnType::BigInt => {
                    let values: Vec<Option<i64>> = rows
                        .iter()
                        .map(|row| match &row[idx] {
                            Cell::BigInt(n) => Some(*n),
                            _ => None,
                        })
                        .collect();
                    fields.push(Field::new(&column.name, DataType::Int64, true));
                    arrays.push(Arc::new(Int64Array::from(values)));
                }
                ColumnType::Text => {
                    let values: Vec<Option<String>> = rows
                        .iter()
                        .map(|row| match &row[idx] {
                            Cell::Text(text) => Some(text.clone()),
                            _ => None,
                        })
                        .collect();
                    fields.push(Field::new(&column.name, DataType::Utf8, true));
                    arrays.push(Arc::new(StringArray::from(values)));
                }
            }
        }

        Ok(RecordBatch::try_new(Arc::new(Schema::new(fields)), arrays)?)
    }
}

#[async_trait]
impl SqlBackend for MemoryBackend {
    async fn run_dml(&self, sql: &str) -> Result<RecordBatch> {
        self.execute(sql).await
    }
}

fn normalize(name: &str) -> String {
    name.to_ascii_lowercase()
}

fn table_factor_name(relation: &TableFactor) -> Result<String> {
    match relation {
        TableFactor::Table { name, .. } => Ok(name.to_string()),
        other => Err(Error::NotSupported(format!(
            "table expression is not supported: {other}"
        ))),
    }
}

fn literal_cell(expr: &Expr) -> Result<Cell> {
    match expr {
        Expr::Value(value) => match &value.value {
            Value::Number(text, _) => text
                .parse::<i64>()
                .map(Cell::BigInt)
                .map_err(|_| Error::NotSupported(format!("non-integer numeric literal {text}"))),
            Value::SingleQuotedString(text) => Ok(Cell::Text(text.clone())),
            Value::Null => Ok(Cell::Null),
            other => Err(Error::NotSupported(format!(
                "literal is not supported: {other}"
            ))),
        },
        Expr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match literal_cell(expr)? {
            Cell::BigInt(n) => Ok(Cell::BigInt(-n)),
            other => Err(Error::NotSupported(format!("cannot negate {other:?}"))),
        },
        Expr::Nested(inner) => literal_cell(inner),
        other => Err(Error::NotSupported(format!(
            "expression is not a literal: {other}"
        ))),
    }
}

#[derive(Debug, Clone, Copy)]
enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// WHERE clause compiled against a table's columns: conjunctions of
/// column-to-literal comparisons.
#[derive(Debug)]
enum Predicate {
    Compare {
        column: usize,
        op: CompareOp,
        value: Cell,
    },
    And(Box<Predicate>, Box<Predicate>),
}

impl Predicate {
    fn compile(expr: &Expr, columns: &[Column]) -> Result<Self> {
        match expr {
            Expr::Nested(inner) => Self::compile(inner, columns),
            Expr::BinaryOp {
                left,
                op: BinaryOperator::And,
                right,
            } => Ok(Predicate::And(
                Box::new(Self::compile(left, columns)?),
                Box::new(Self::compile(right, columns)?),
            )),
            Expr::BinaryOp { left, op, right } => {
                let column = match left.as_ref() {
                    Expr::Identifier(ident) => columns
                        .iter()
                        .position(|column| column.name.eq_ignore_ascii_case(&ident.value))
                        .ok_or_else(|| Error::Execution(format!("unknown column {ident}")))?,
                    other => {
                        return Err(Error::NotSupported(format!(
                            "predicate left side must be a column, got {other}"
                        )))
                    }
                };
                let op = match op {
                    BinaryOperator::Eq => CompareOp::Eq,
                    BinaryOperator::NotEq => CompareOp::NotEq,
                    BinaryOperator::Lt => CompareOp::Lt,
                    BinaryOperator::LtEq => CompareOp::LtEq,
                    BinaryOperator::Gt => CompareOp::Gt,
                    BinaryOperator::GtEq => CompareOp::GtEq,
                    other => {
                        return Err(Error::NotSupported(format!(
                            "operator is not supported in predicates: {other}"
                        )))
                    }
                };
                let value = literal_cell(right)?;
                Ok(Predicate::Compare { column, op, value })
            }
            other => Err(Error::NotSupported(format!(
                "predicate is not supported: {other}"
            ))),
        }
    }

    fn matches(&self, row: &[Cell]) -> bool {
        match self {
            Predicate::And(left, right) => left.matches(row) && right.matches(row),
            Predicate::Compare { column, op, value } => {
                // NULLs and mismatched types never match.
                let ordering = match (&row[*column], value) {
                    (Cell::BigInt(a), Cell::BigInt(b)) => a.cmp(b),
                    (Cell::Text(a), Cell::Text(b)) => a.cmp(b),
                    _ => return false,
                };
                match op {
                    CompareOp::Eq => ordering == Ordering::Equal,
                    CompareOp::NotEq => ordering != Ordering::Equal,
                    CompareOp::Lt => ordering == Ordering::Less,
                    CompareOp::LtEq => ordering != Ordering::Greater,
                    CompareOp::Gt => ordering == Ordering::Greater,
                    CompareOp::GtEq => ordering != Ordering::Less,
                }
            }
        }
    }
}
