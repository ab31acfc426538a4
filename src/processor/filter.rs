//! Filter value grammar shared by storage backends.
//!
//! A filter value may carry an operator tag prefix (`ne:`, `lt:`, `in:`, ...)
//! separated by a colon; without one the operator is equality. The literal
//! value `"null"` selects IS NULL / IS NOT NULL semantics instead of a
//! string comparison.

use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    Like,
    In,
    NotIn,
}

impl FilterOp {
    pub fn tag(self) -> &'static str {
        match self {
            FilterOp::Eq => "eq",
            FilterOp::Ne => "ne",
            FilterOp::Lt => "lt",
            FilterOp::Gt => "gt",
            FilterOp::Le => "le",
            FilterOp::Ge => "ge",
            FilterOp::Like => "like",
            FilterOp::In => "in",
            FilterOp::NotIn => "nin",
        }
    }

    pub fn sql(self) -> &'static str {
        match self {
            FilterOp::Eq => "=",
            FilterOp::Ne => "!=",
            FilterOp::Lt => "<",
            FilterOp::Gt => ">",
            FilterOp::Le => "<=",
            FilterOp::Ge => ">=",
            FilterOp::Like => "LIKE",
            FilterOp::In => "IN",
            FilterOp::NotIn => "NOT IN",
        }
    }

    const ALL: [FilterOp; 9] = [
        FilterOp::Eq,
        FilterOp::Ne,
        FilterOp::Lt,
        FilterOp::Gt,
        FilterOp::Le,
        FilterOp::Ge,
        FilterOp::Like,
        FilterOp::In,
        FilterOp::NotIn,
    ];
}

/// Right-hand side of a parsed filter.
#[derive(Clone, Debug, PartialEq)]
pub enum FilterRhs {
    /// `IS NULL` when the operator is Eq, `IS NOT NULL` when Ne.
    Null,
    Scalar(Value),
    List(Vec<Value>),
}

#[derive(Clone, Debug, PartialEq)]
pub struct ParsedFilter {
    pub op: FilterOp,
    pub rhs: FilterRhs,
}

/// Parses one filter value. Non-string values are equality scalars.
pub fn parse_filter_value(value: &Value) -> ParsedFilter {
    let Value::String(text) = value else {
        return ParsedFilter {
            op: FilterOp::Eq,
            rhs: FilterRhs::Scalar(value.clone()),
        };
    };

    let (op, rest) = FilterOp::ALL
        .iter()
        .find_map(|op| {
            text.strip_prefix(&format!("{}:", op.tag()))
                .map(|rest| (*op, rest))
        })
        .unwrap_or((FilterOp::Eq, text.as_str()));

    let rhs = match op {
        FilterOp::In | FilterOp::NotIn => FilterRhs::List(
            rest.split(',')
                .map(|part| Value::String(part.trim().to_string()))
                .collect(),
        ),
        _ if rest == "null" => FilterRhs::Null,
        _ => FilterRhs::Scalar(Value::String(rest.to_string())),
    };
    ParsedFilter { op, rhs }
}

/// In-memory evaluation of a parsed filter against an attribute value.
/// Numeric-looking strings compare as numbers so wire filters match stored
/// numbers; `Like` treats `%` as a wildcard at either end.
pub fn filter_matches(filter: &ParsedFilter, actual: Option<&Value>) -> bool {
    let actual = actual.unwrap_or(&Value::Null);
    match (&filter.rhs, filter.op) {
        (FilterRhs::Null, FilterOp::Eq) => actual.is_null(),
        (FilterRhs::Null, FilterOp::Ne) => !actual.is_null(),
        (FilterRhs::Null, _) => false,
        (FilterRhs::List(values), FilterOp::In) => values.iter().any(|v| loosely_equal(v, actual)),
        (FilterRhs::List(values), FilterOp::NotIn) => {
            !values.iter().any(|v| loosely_equal(v, actual))
        }
        (FilterRhs::List(_), _) => false,
        (FilterRhs::Scalar(expected), op) => match op {
            FilterOp::Eq => loosely_equal(expected, actual),
            FilterOp::Ne => !loosely_equal(expected, actual),
            FilterOp::Like => like_matches(expected, actual),
            FilterOp::Lt | FilterOp::Gt | FilterOp::Le | FilterOp::Ge => {
                match compare_values(actual, expected) {
                    Some(ord) => match op {
                        FilterOp::Lt => ord.is_lt(),
                        FilterOp::Gt => ord.is_gt(),
                        FilterOp::Le => ord.is_le(),
                        FilterOp::Ge => ord.is_ge(),
                        _ => unreachable!(),
                    },
                    None => false,
                }
            }
            FilterOp::In | FilterOp::NotIn => false,
        },
    }
}

fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

pub(crate) fn loosely_equal(a: &Value, b: &Value) -> bool {
    if a == b {
        return true;
    }
    match (as_number(a), as_number(b)) {
        (Some(x), Some(y)) => x == y,
        _ => match (a, b) {
            (Value::String(s), Value::Bool(t)) | (Value::Bool(t), Value::String(s)) => {
                s.eq_ignore_ascii_case(if *t { "true" } else { "false" })
            }
            _ => false,
        },
    }
}

/// Ordering across JSON scalars: numbers numerically (including numeric
/// strings), strings lexicographically.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    if let (Some(x), Some(y)) = (as_number(a), as_number(b)) {
        return x.partial_cmp(&y);
    }
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn like_matches(pattern: &Value, actual: &Value) -> bool {
    let (Value::String(pattern), Value::String(actual)) = (pattern, actual) else {
        return false;
    };
    let starts = pattern.starts_with('%');
    let ends = pattern.ends_with('%');
    let needle = pattern.trim_matches('%');
    match (starts, ends) {
        (true, true) => actual.contains(needle),
        (false, true) => actual.starts_with(needle),
        (true, false) => actual.ends_with(needle),
        (false, false) => actual == needle,
    }
}
