//! Document predicates: a small query matcher over BSON documents.
//!
//! Supports dotted field paths, implicit equality, the comparison operators
//! `$eq $ne $gt $gte $lt $lte $in $nin $exists`, and the logical operators
//! `$and $or $nor` at the top level of a predicate.

use crate::error::RestoreError;
use bson::{Bson, Document};
use std::cmp::Ordering;

/// A compiled match predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    source: Document,
    clauses: Vec<Clause>,
}

#[derive(Debug, Clone, PartialEq)]
enum Clause {
    Field {
        path: String,
        conditions: Vec<Condition>,
    },
    And(Vec<Predicate>),
    Or(Vec<Predicate>),
    Nor(Vec<Predicate>),
}

#[derive(Debug, Clone, PartialEq)]
enum Condition {
    Eq(Bson),
    Ne(Bson),
    Gt(Bson),
    Gte(Bson),
    Lt(Bson),
    Lte(Bson),
    In(Vec<Bson>),
    Nin(Vec<Bson>),
    Exists(bool),
}

impl Predicate {
    /// Compile a predicate from its document form
    pub fn parse(source: &Document) -> Result<Self, RestoreError> {
        let mut clauses = Vec::with_capacity(source.len());
        for (key, value) in source {
            let clause = match key.as_str() {
                "$and" => Clause::And(parse_branches(key, value)?),
                "$or" => Clause::Or(parse_branches(key, value)?),
                "$nor" => Clause::Nor(parse_branches(key, value)?),
                op if op.starts_with('$') => {
                    return Err(RestoreError::InvalidFilter(format!(
                        "unknown top-level operator {}",
                        op
                    )))
                }
                path => Clause::Field {
                    path: path.to_string(),
                    conditions: parse_conditions(path, value)?,
                },
            };
            clauses.push(clause);
        }
        Ok(Self {
            source: source.clone(),
            clauses,
        })
    }

    /// The document this predicate was compiled from
    pub fn source(&self) -> &Document {
        &self.source
    }

    pub fn matches(&self, doc: &Document) -> bool {
        self.clauses.iter().all(|clause| match clause {
            Clause::Field { path, conditions } => {
                let value = lookup(doc, path);
                conditions.iter().all(|c| c.holds(value))
            }
            Clause::And(branches) => branches.iter().all(|p| p.matches(doc)),
            Clause::Or(branches) => branches.iter().any(|p| p.matches(doc)),
            Clause::Nor(branches) => !branches.iter().any(|p| p.matches(doc)),
        })
    }
}

fn parse_branches(op: &str, value: &Bson) -> Result<Vec<Predicate>, RestoreError> {
    let items = match value {
        Bson::Array(items) if !items.is_empty() => items,
        _ => {
            return Err(RestoreError::InvalidFilter(format!(
                "{} expects a non-empty array",
                op
            )))
        }
    };
    items
        .iter()
        .map(|item| match item {
            Bson::Document(doc) => Predicate::parse(doc),
            _ => Err(RestoreError::InvalidFilter(format!(
                "{} entries must be documents",
                op
            ))),
        })
        .collect()
}

fn parse_conditions(path: &str, value: &Bson) -> Result<Vec<Condition>, RestoreError> {
    let operators = match value {
        Bson::Document(doc) if doc.keys().next().is_some_and(|k| k.starts_with('$')) => doc,
        other => return Ok(vec![Condition::Eq(other.clone())]),
    };

    let mut conditions = Vec::with_capacity(operators.len());
    for (op, operand) in operators {
        let condition = match op.as_str() {
            "$eq" => Condition::Eq(operand.clone()),
            "$ne" => Condition::Ne(operand.clone()),
            "$gt" => Condition::Gt(operand.clone()),
            "$gte" => Condition::Gte(operand.clone()),
            "$lt" => Condition::Lt(operand.clone()),
            "$lte" => Condition::Lte(operand.clone()),
            "$in" | "$nin" => {
                let list = match operand {
                    Bson::Array(list) => list.clone(),
                    _ => {
                        return Err(RestoreError::InvalidFilter(format!(
                            "{} on '{}' expects an array",
                            op, path
                        )))
                    }
                };
                if op == "$in" {
                    Condition::In(list)
                } else {
                    Condition::Nin(list)
                }
            }
            "$exists" => Condition::Exists(truthy(operand)),
            other => {
                return Err(RestoreError::InvalidFilter(format!(
                    "unsupported operator {} on '{}'",
                    other, path
                )))
            }
        };
        conditions.push(condition);
    }
    Ok(conditions)
}

impl Condition {
    fn holds(&self, value: Option<&Bson>) -> bool {
        match self {
            Condition::Eq(expected) => equals_or_missing(value, expected),
            Condition::Ne(expected) => !equals_or_missing(value, expected),
            Condition::Gt(bound) => ordered(value, bound, |o| o == Ordering::Greater),
            Condition::Gte(bound) => ordered(value, bound, |o| o != Ordering::Less),
            Condition::Lt(bound) => ordered(value, bound, |o| o == Ordering::Less),
            Condition::Lte(bound) => ordered(value, bound, |o| o != Ordering::Greater),
            Condition::In(list) => list.iter().any(|e| equals_or_missing(value, e)),
            Condition::Nin(list) => !list.iter().any(|e| equals_or_missing(value, e)),
            Condition::Exists(expected) => value.is_some() == *expected,
        }
    }
}

/// Equality with query semantics: `null` matches a missing field, and an array
/// field matches when the whole array or any element is equal.
fn equals_or_missing(value: Option<&Bson>, expected: &Bson) -> bool {
    match value {
        None => matches!(expected, Bson::Null),
        Some(Bson::Array(items)) if !matches!(expected, Bson::Array(_)) => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(actual) => values_equal(actual, expected),
    }
}

fn ordered(value: Option<&Bson>, bound: &Bson, accept: impl Fn(Ordering) -> bool) -> bool {
    match value {
        None => false,
        Some(Bson::Array(items)) => items
            .iter()
            .any(|item| compare_values(item, bound).is_some_and(&accept)),
        Some(actual) => compare_values(actual, bound).is_some_and(accept),
    }
}

/// Resolve a dotted path; numeric components index into arrays
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut parts = path.split('.');
    let mut current = doc.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Bson::Document(inner) => inner.get(part)?,
            Bson::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Type-aware ordering. `None` when the two values are not comparable.
pub fn compare_values(a: &Bson, b: &Bson) -> Option<Ordering> {
    match (a, b) {
        (Bson::Int32(x), Bson::Int32(y)) => Some(x.cmp(y)),
        (Bson::Int64(x), Bson::Int64(y)) => Some(x.cmp(y)),
        (Bson::Int32(x), Bson::Int64(y)) => Some(i64::from(*x).cmp(y)),
        (Bson::Int64(x), Bson::Int32(y)) => Some(x.cmp(&i64::from(*y))),
        (a, b) if is_number(a) && is_number(b) => as_f64(a)?.partial_cmp(&as_f64(b)?),
        (Bson::String(x), Bson::String(y)) => Some(x.cmp(y)),
        (Bson::Symbol(x), Bson::Symbol(y)) => Some(x.cmp(y)),
        (Bson::Boolean(x), Bson::Boolean(y)) => Some(x.cmp(y)),
        (Bson::DateTime(x), Bson::DateTime(y)) => Some(x.cmp(y)),
        (Bson::Timestamp(x), Bson::Timestamp(y)) => {
            Some((x.time, x.increment).cmp(&(y.time, y.increment)))
        }
        (Bson::ObjectId(x), Bson::ObjectId(y)) => Some(x.bytes().cmp(&y.bytes())),
        (Bson::Null, Bson::Null) | (Bson::Undefined, Bson::Undefined) => Some(Ordering::Equal),
        (Bson::MinKey, Bson::MinKey) | (Bson::MaxKey, Bson::MaxKey) => Some(Ordering::Equal),
        (a, b) if values_equal(a, b) => Some(Ordering::Equal),
        _ => None,
    }
}

/// Structural equality in which numbers compare by value
pub fn values_equal(a: &Bson, b: &Bson) -> bool {
    match (a, b) {
        (Bson::Document(x), Bson::Document(y)) => documents_equal(x, y),
        (Bson::Array(x), Bson::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| values_equal(l, r))
        }
        (a, b) if is_number(a) && is_number(b) => {
            compare_values(a, b) == Some(Ordering::Equal)
        }
        (a, b) => a == b,
    }
}

/// Field-for-field document equality, order-sensitive like the server's
pub fn documents_equal(a: &Document, b: &Document) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b.iter())
            .all(|((ka, va), (kb, vb))| ka == kb && values_equal(va, vb))
}

fn is_number(value: &Bson) -> bool {
    matches!(value, Bson::Int32(_) | Bson::Int64(_) | Bson::Double(_))
}

fn as_f64(value: &Bson) -> Option<f64> {
    match value {
        Bson::Int32(v) => Some(f64::from(*v)),
        Bson::Int64(v) => Some(*v as f64),
        Bson::Double(v) => Some(*v),
        _ => None,
    }
}

/// Truthiness the way the server reads flags such as `ok` and `$exists`
pub fn truthy(value: &Bson) -> bool {
    match value {
        Bson::Boolean(b) => *b,
        Bson::Null | Bson::Undefined => false,
        v if is_number(v) => as_f64(v).is_some_and(|n| n != 0.0),
        _ => true,
    }
}
