//! Builds parameterized SELECT, INSERT, UPDATE, DELETE from a registered
//! schema and the serializer's naming conventions.

use crate::processor::filter::{parse_filter_value, FilterOp, FilterRhs};
use crate::schema::{AttributeKind, ResourceRegistry, ResourceSchema};
use crate::serializer::{foreign_key_column, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

/// Quote identifier for PostgreSQL (safe: only from registered schemas).
fn quoted(s: &str) -> String {
    format!("\"{}\"", s.replace('"', "\"\""))
}

pub struct QueryBuf {
    pub sql: String,
    pub params: Vec<Value>,
}

impl QueryBuf {
    fn new() -> Self {
        QueryBuf {
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push_param(&mut self, v: Value) -> usize {
        self.params.push(v);
        self.params.len()
    }
}

/// One resource type's storage coordinates, derived from its schema and the
/// serializer conventions.
pub struct SqlTarget<'a> {
    pub resource_type: &'a str,
    pub schema: &'a ResourceSchema,
    pub serializer: &'a dyn Serializer,
    pub registry: &'a ResourceRegistry,
}

impl<'a> SqlTarget<'a> {
    pub fn table(&self) -> String {
        self.serializer.resource_type_to_table_name(self.resource_type)
    }

    pub fn primary_key(&self) -> &str {
        &self.schema.primary_key
    }

    /// Foreign-key columns of every belongs-to relationship, selected so
    /// serialization can fold them into linkage.
    pub fn foreign_key_columns(&self) -> Vec<String> {
        self.schema
            .relationships
            .iter()
            .filter(|(_, d)| d.is_belongs_to())
            .map(|(name, d)| foreign_key_column(self.serializer, name, d, self.registry))
            .collect()
    }

    /// SELECT list: declared attributes aliased to their attribute names
    /// (narrowed by a sparse fieldset when given), plus foreign keys and the
    /// primary key.
    pub fn select_columns(&self, fields: Option<&[String]>) -> String {
        let attribute_names: Vec<&String> = match fields {
            Some(requested) => self
                .schema
                .attributes
                .keys()
                .filter(|name| requested.iter().any(|f| f == *name))
                .collect(),
            None => self.schema.attributes.keys().collect(),
        };
        let mut parts: Vec<String> = attribute_names
            .into_iter()
            .map(|name| {
                let column = self.serializer.attribute_to_column(name);
                if column == *name {
                    quoted(&column)
                } else {
                    format!("{} AS {}", quoted(&column), quoted(name))
                }
            })
            .collect();
        for fk in self.foreign_key_columns() {
            parts.push(quoted(&fk));
        }
        parts.push(quoted(self.primary_key()));
        parts.join(", ")
    }

    /// Column a filter key addresses: the primary key passes through, other
    /// keys map through the attribute naming convention.
    fn filter_column(&self, key: &str) -> String {
        if key == self.primary_key() {
            key.to_string()
        } else {
            self.serializer.attribute_to_column(key)
        }
    }

    /// Coerce a bound value to the declared attribute kind so text filter
    /// values bind correctly against numeric and boolean columns. Primary and
    /// foreign keys parse numerically when they look numeric; UUID-shaped
    /// text binds as UUID downstream.
    fn coerce(&self, key: &str, value: Value) -> Value {
        let is_key = key == self.primary_key()
            || self.foreign_key_columns().iter().any(|c| c == key);
        if is_key {
            if let Value::String(s) = &value {
                if let Ok(n) = s.parse::<i64>() {
                    return Value::from(n);
                }
            }
            return value;
        }
        match (self.schema.attributes.get(key).copied(), &value) {
            (Some(AttributeKind::Number), Value::String(s)) => s
                .parse::<i64>()
                .map(Value::from)
                .or_else(|_| s.parse::<f64>().map(Value::from))
                .unwrap_or(value),
            (Some(AttributeKind::Boolean), Value::String(s)) => match s.as_str() {
                "true" => Value::Bool(true),
                "false" => Value::Bool(false),
                _ => value,
            },
            _ => value,
        }
    }
}

fn where_clause(target: &SqlTarget<'_>, filters: &HashMap<String, Value>, q: &mut QueryBuf) -> String {
    let ordered: BTreeMap<_, _> = filters.iter().collect();
    let mut parts = Vec::new();
    for (key, raw) in ordered {
        let column = quoted(&target.filter_column(key));
        let parsed = parse_filter_value(raw);
        match parsed.rhs {
            FilterRhs::Null => match parsed.op {
                FilterOp::Ne => parts.push(format!("{} IS NOT NULL", column)),
                _ => parts.push(format!("{} IS NULL", column)),
            },
            FilterRhs::List(values) => {
                let placeholders: Vec<String> = values
                    .into_iter()
                    .map(|v| format!("${}", q.push_param(target.coerce(key, v))))
                    .collect();
                parts.push(format!(
                    "{} {} ({})",
                    column,
                    parsed.op.sql(),
                    placeholders.join(", ")
                ));
            }
            FilterRhs::Scalar(value) => {
                let n = q.push_param(target.coerce(key, value));
                parts.push(format!("{} {} ${}", column, parsed.op.sql(), n));
            }
        }
    }
    if parts.is_empty() {
        String::new()
    } else {
        format!(" WHERE {}", parts.join(" AND "))
    }
}

fn order_clause(target: &SqlTarget<'_>, sort: &[String]) -> String {
    if sort.is_empty() {
        return format!(" ORDER BY {}", quoted(target.primary_key()));
    }
    let parts: Vec<String> = sort
        .iter()
        .map(|criteria| match criteria.strip_prefix('-') {
            Some(field) => format!("{} DESC", quoted(&target.serializer.attribute_to_column(field))),
            None => format!("{} ASC", quoted(&target.serializer.attribute_to_column(criteria))),
        })
        .collect();
    format!(" ORDER BY {}", parts.join(", "))
}

/// SELECT with filters, sort, and an optional row window.
pub fn select(
    target: &SqlTarget<'_>,
    filters: &HashMap<String, Value>,
    sort: &[String],
    window: Option<(u64, u64)>,
    fields: Option<&[String]>,
) -> QueryBuf {
    let mut q = QueryBuf::new();
    let where_sql = where_clause(target, filters, &mut q);
    let order_sql = order_clause(target, sort);
    let page_sql = window
        .map(|(offset, limit)| format!(" LIMIT {} OFFSET {}", limit, offset))
        .unwrap_or_default();
    q.sql = format!(
        "SELECT {} FROM {}{}{}{}",
        target.select_columns(fields),
        quoted(&target.table()),
        where_sql,
        order_sql,
        page_sql
    );
    q
}

/// SELECT rows where `column IN (values)`, for batch-loading related rows.
pub fn select_where_in(target: &SqlTarget<'_>, column: &str, values: &[Value]) -> QueryBuf {
    let mut q = QueryBuf::new();
    if values.is_empty() {
        q.sql = format!(
            "SELECT {} FROM {} WHERE 1 = 0",
            target.select_columns(None),
            quoted(&target.table())
        );
        return q;
    }
    let placeholders: Vec<String> = values
        .iter()
        .map(|v| format!("${}", q.push_param(v.clone())))
        .collect();
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} IN ({}) ORDER BY {}",
        target.select_columns(None),
        quoted(&target.table()),
        quoted(column),
        placeholders.join(", "),
        quoted(target.primary_key())
    );
    q
}

/// SELECT just the primary key, for existence checks ahead of a mutation.
pub fn select_pk(target: &SqlTarget<'_>, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    let pk = quoted(target.primary_key());
    q.push_param(target.coerce(target.primary_key(), id.clone()));
    q.sql = format!(
        "SELECT {} FROM {} WHERE {} = $1",
        pk,
        quoted(&target.table()),
        pk
    );
    q
}

/// INSERT from attribute values (attribute names or foreign-key columns),
/// RETURNING the full select list.
pub fn insert(target: &SqlTarget<'_>, attributes: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ordered: BTreeMap<_, _> = attributes.iter().collect();
    let mut columns = Vec::new();
    let mut placeholders = Vec::new();
    for (name, value) in ordered {
        let column = target.filter_column(name);
        let n = q.push_param(target.coerce(name, value.clone()));
        columns.push(quoted(&column));
        placeholders.push(format!("${}", n));
    }
    q.sql = format!(
        "INSERT INTO {} ({}) VALUES ({}) RETURNING {}",
        quoted(&target.table()),
        columns.join(", "),
        placeholders.join(", "),
        target.select_columns(None)
    );
    q
}

/// UPDATE by primary key, SET only the supplied attributes, RETURNING the
/// full select list.
pub fn update(target: &SqlTarget<'_>, id: &Value, attributes: &HashMap<String, Value>) -> QueryBuf {
    let mut q = QueryBuf::new();
    let ordered: BTreeMap<_, _> = attributes.iter().collect();
    let mut sets = Vec::new();
    for (name, value) in ordered {
        if *name == target.primary_key() {
            continue;
        }
        let column = target.filter_column(name);
        let n = q.push_param(target.coerce(name, value.clone()));
        sets.push(format!("{} = ${}", quoted(&column), n));
    }
    let id_param = q.push_param(target.coerce(target.primary_key(), id.clone()));
    q.sql = format!(
        "UPDATE {} SET {} WHERE {} = ${} RETURNING {}",
        quoted(&target.table()),
        sets.join(", "),
        quoted(target.primary_key()),
        id_param,
        target.select_columns(None)
    );
    q
}

/// DELETE by primary key.
pub fn delete(target: &SqlTarget<'_>, id: &Value) -> QueryBuf {
    let mut q = QueryBuf::new();
    q.push_param(target.coerce(target.primary_key(), id.clone()));
    q.sql = format!(
        "DELETE FROM {} WHERE {} = $1",
        quoted(&target.table()),
        quoted(target.primary_key())
    );
    q
}
