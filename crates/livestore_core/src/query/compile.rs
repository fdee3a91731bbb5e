//! Predicate and ordering compilation into SQLite statements.
//!
//! # Responsibility
//! - Validate field references against `Identifiable::FIELDS` on the caller
//!   thread, before anything is scheduled.
//! - Produce a self-contained, `Send` statement the worker can materialise.
//!
//! # Invariants
//! - Field paths reach SQL only after matching the field-path grammar.
//! - Every literal is bound as a parameter, never inlined.
//! - Sorted queries always end with `id ASC`, so ordering is total.
//! - Unsorted queries follow rowid, which upserts preserve.

use super::predicate::{Comparison, FieldValue, Predicate, SortDescriptor, SortDirection, TextMatch};
use crate::db::entity_table_name;
use crate::model::entity::{is_valid_collection_name, is_valid_field_path, Identifiable};
use rusqlite::types::Value;
use std::error::Error;
use std::fmt::{Display, Formatter};

pub type QueryResult<T> = Result<T, QueryError>;

/// Caller programming errors detected while compiling a query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryError {
    InvalidCollection(String),
    MalformedField(String),
    UnknownField { collection: String, field: String },
    InvalidValue { field: String, reason: String },
}

impl Display for QueryError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::InvalidCollection(name) => write!(f, "invalid collection name `{name}`"),
            Self::MalformedField(field) => write!(f, "malformed field path `{field}`"),
            Self::UnknownField { collection, field } => {
                write!(f, "field `{field}` is not queryable on `{collection}`")
            }
            Self::InvalidValue { field, reason } => {
                write!(f, "invalid value for field `{field}`: {reason}")
            }
        }
    }
}

impl Error for QueryError {}

/// Compiled, store-independent form of a query over one collection.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledQuery {
    collection: &'static str,
    filter_sql: String,
    order_sql: String,
    params: Vec<Value>,
}

impl CompiledQuery {
    pub fn collection(&self) -> &'static str {
        self.collection
    }

    pub fn filter_sql(&self) -> &str {
        &self.filter_sql
    }

    pub fn order_sql(&self) -> &str {
        &self.order_sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }

    /// Full `SELECT id, body` statement.
    pub fn sql(&self) -> String {
        format!(
            "SELECT id, body FROM \"{}\" WHERE {} ORDER BY {};",
            entity_table_name(self.collection),
            self.filter_sql,
            self.order_sql
        )
    }
}

/// Validates and compiles a query against `T`'s collection.
pub fn compile<T: Identifiable>(
    predicate: &Predicate,
    ordering: &[SortDescriptor],
) -> QueryResult<CompiledQuery> {
    validate_collection::<T>()?;

    let mut field_error = None;
    predicate.for_each_field(&mut |field| {
        if field_error.is_none() {
            field_error = check_field::<T>(field).err();
        }
    });
    if let Some(err) = field_error {
        return Err(err);
    }
    for descriptor in ordering {
        check_field::<T>(&descriptor.field)?;
    }

    let mut params = Vec::new();
    let filter_sql = compile_predicate(predicate, &mut params)?;
    let order_sql = compile_ordering(ordering);

    Ok(CompiledQuery {
        collection: T::COLLECTION,
        filter_sql,
        order_sql,
        params,
    })
}

pub(crate) fn validate_collection<T: Identifiable>() -> QueryResult<()> {
    if is_valid_collection_name(T::COLLECTION) {
        Ok(())
    } else {
        Err(QueryError::InvalidCollection(T::COLLECTION.to_string()))
    }
}

fn check_field<T: Identifiable>(field: &str) -> QueryResult<()> {
    if !is_valid_field_path(field) {
        return Err(QueryError::MalformedField(field.to_string()));
    }
    if !T::FIELDS.contains(&field) {
        return Err(QueryError::UnknownField {
            collection: T::COLLECTION.to_string(),
            field: field.to_string(),
        });
    }
    Ok(())
}

fn field_expr(field: &str) -> String {
    format!("json_extract(body, '$.{field}')")
}

/// Range comparisons only match stored values of the literal's JSON type.
///
/// SQLite orders every TEXT above every number, so without this `name > 1000`
/// would match all text names.
fn range_type_guard(field: &str, op: Comparison, value: &FieldValue) -> Option<String> {
    if matches!(op, Comparison::Eq | Comparison::Ne) {
        return None;
    }
    let types = match value {
        FieldValue::Int(_) | FieldValue::Real(_) => "'integer', 'real'",
        FieldValue::Text(_) => "'text'",
        FieldValue::Bool(_) => "'true', 'false'",
        FieldValue::Null => return None,
    };
    Some(format!("json_type(body, '$.{field}') IN ({types})"))
}

fn bind(params: &mut Vec<Value>, value: Value) -> String {
    params.push(value);
    format!("?{}", params.len())
}

fn compile_predicate(predicate: &Predicate, params: &mut Vec<Value>) -> QueryResult<String> {
    let sql = match predicate {
        Predicate::True => "1".to_string(),
        Predicate::Compare { field, op, value } => {
            let guard = range_type_guard(field, *op, value);
            let value = to_sql_value(field, value)?;
            let placeholder = bind(params, value);
            let operator = match op {
                Comparison::Eq => "IS",
                Comparison::Ne => "IS NOT",
                Comparison::Lt => "<",
                Comparison::Le => "<=",
                Comparison::Gt => ">",
                Comparison::Ge => ">=",
            };
            let comparison = format!("{} {operator} {placeholder}", field_expr(field));
            match guard {
                Some(guard) => format!("{guard} AND {comparison}"),
                None => comparison,
            }
        }
        Predicate::Text {
            field,
            op,
            needle,
            case_insensitive,
        } => {
            let placeholder = bind(params, Value::Text(needle.clone()));
            let (subject, needle) = if *case_insensitive {
                (
                    format!("lower({})", field_expr(field)),
                    format!("lower({placeholder})"),
                )
            } else {
                (field_expr(field), placeholder)
            };
            match op {
                TextMatch::Contains => format!("instr({subject}, {needle}) > 0"),
                TextMatch::BeginsWith => format!("instr({subject}, {needle}) = 1"),
                TextMatch::EndsWith => format!(
                    "({subject} IS NOT NULL AND (length({needle}) = 0 OR substr({subject}, -length({needle})) = {needle}))"
                ),
            }
        }
        Predicate::And { all } => join(all, " AND ", "1", params)?,
        Predicate::Or { any } => join(any, " OR ", "0", params)?,
        Predicate::Not { inner } => {
            // NULL sub-results count as "no match" before negation.
            format!("NOT coalesce(({}), 0)", compile_predicate(inner, params)?)
        }
    };
    Ok(sql)
}

fn join(
    parts: &[Predicate],
    separator: &str,
    empty: &str,
    params: &mut Vec<Value>,
) -> QueryResult<String> {
    if parts.is_empty() {
        return Ok(empty.to_string());
    }
    let compiled = parts
        .iter()
        .map(|part| compile_predicate(part, params).map(|sql| format!("({sql})")))
        .collect::<QueryResult<Vec<_>>>()?;
    Ok(compiled.join(separator))
}

fn compile_ordering(ordering: &[SortDescriptor]) -> String {
    if ordering.is_empty() {
        return "rowid ASC".to_string();
    }
    let mut terms = ordering
        .iter()
        .map(|descriptor| {
            let direction = match descriptor.direction {
                SortDirection::Ascending => "ASC",
                SortDirection::Descending => "DESC",
            };
            format!("{} {direction}", field_expr(&descriptor.field))
        })
        .collect::<Vec<_>>();
    terms.push("id ASC".to_string());
    terms.join(", ")
}

fn to_sql_value(field: &str, value: &FieldValue) -> QueryResult<Value> {
    let value = match value {
        FieldValue::Null => Value::Null,
        FieldValue::Bool(flag) => Value::Integer(i64::from(*flag)),
        FieldValue::Int(number) => Value::Integer(*number),
        FieldValue::Real(number) if number.is_finite() => Value::Real(*number),
        FieldValue::Real(number) => {
            return Err(QueryError::InvalidValue {
                field: field.to_string(),
                reason: format!("{number} is not a finite number"),
            })
        }
        FieldValue::Text(text) => Value::Text(text.clone()),
    };
    Ok(value)
}
