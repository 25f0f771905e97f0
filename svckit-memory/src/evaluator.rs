//! Query expression evaluation for in-memory document filtering.
//!
//! This module provides the evaluation engine for filter expressions plus the
//! sort, projection and path helpers the in-memory store builds on.

use std::{cmp::Ordering, collections::HashMap};

use bson::{Bson, Document, datetime::DateTime, oid::ObjectId};

use svckit_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, Projection, QueryVisitor, Sort, SortDirection},
};

/// Type-erased, comparable representation of BSON values.
///
/// Integers and floats are normalized to `f64` so that `Int32(1)`, `Int64(1)`
/// and `Double(1.0)` compare equal, as they do on the server.
#[derive(Debug)]
pub(crate) enum Comparable<'a> {
    Null,
    Bool(bool),
    Number(f64),
    DateTime(DateTime),
    String(&'a str),
    ObjectId(ObjectId),
    Array(Vec<Comparable<'a>>),
    Map(HashMap<&'a str, Comparable<'a>>),
}

impl<'a> From<&'a Bson> for Comparable<'a> {
    fn from(bson: &'a Bson) -> Self {
        match bson {
            Bson::Boolean(value) => Comparable::Bool(*value),
            Bson::Int32(value) => Comparable::Number(*value as f64),
            Bson::Int64(value) => Comparable::Number(*value as f64),
            Bson::Double(value) => Comparable::Number(*value),
            Bson::DateTime(value) => Comparable::DateTime(*value),
            Bson::String(value) => Comparable::String(value),
            Bson::ObjectId(value) => Comparable::ObjectId(*value),
            Bson::Array(arr) => Comparable::Array(arr.iter().map(Comparable::from).collect()),
            Bson::Document(doc) => Comparable::Map(
                doc.iter()
                    .map(|(k, v)| (k.as_str(), Comparable::from(v)))
                    .collect(),
            ),
            _ => Comparable::Null,
        }
    }
}

impl Comparable<'_> {
    /// Position of the value's type in the server's cross-type sort order.
    fn rank(&self) -> u8 {
        match self {
            Comparable::Null => 0,
            Comparable::Number(_) => 1,
            Comparable::String(_) => 2,
            Comparable::Map(_) => 3,
            Comparable::Array(_) => 4,
            Comparable::ObjectId(_) => 5,
            Comparable::Bool(_) => 6,
            Comparable::DateTime(_) => 7,
        }
    }

    /// Total order used for sorting: by type first, then by value.
    pub(crate) fn sort_cmp(&self, other: &Self) -> Ordering {
        self.rank()
            .cmp(&other.rank())
            .then_with(|| self.partial_cmp(other).unwrap_or(Ordering::Equal))
    }
}

impl PartialEq for Comparable<'_> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Comparable::Null, Comparable::Null) => true,
            (Comparable::Bool(a), Comparable::Bool(b)) => a == b,
            (Comparable::Number(a), Comparable::Number(b)) => a == b,
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a == b,
            (Comparable::String(a), Comparable::String(b)) => a == b,
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a == b,
            (Comparable::Array(a), Comparable::Array(b)) => a == b,
            (Comparable::Map(a), Comparable::Map(b)) => a == b,
            _ => false,
        }
    }
}

impl PartialOrd for Comparable<'_> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Comparable::Bool(a), Comparable::Bool(b)) => a.partial_cmp(b),
            (Comparable::Number(a), Comparable::Number(b)) => a.partial_cmp(b),
            (Comparable::DateTime(a), Comparable::DateTime(b)) => a.partial_cmp(b),
            (Comparable::String(a), Comparable::String(b)) => a.partial_cmp(b),
            (Comparable::ObjectId(a), Comparable::ObjectId(b)) => a.bytes().partial_cmp(&b.bytes()),
            _ => None,
        }
    }
}

/// Resolves a dotted path (`address.city`) inside a document.
pub(crate) fn lookup<'a>(document: &'a Document, path: &str) -> Option<&'a Bson> {
    let mut segments = path.split('.');
    let mut current = document.get(segments.next()?)?;

    for segment in segments {
        current = current.as_document()?.get(segment)?;
    }

    Some(current)
}

/// Sets a dotted path, creating intermediate documents as needed.
pub(crate) fn assign(document: &mut Document, path: &str, value: Bson) {
    match path.split_once('.') {
        None => {
            document.insert(path, value);
        }
        Some((head, rest)) => {
            if !matches!(document.get(head), Some(Bson::Document(_))) {
                document.insert(head, Document::new());
            }
            if let Some(Bson::Document(child)) = document.get_mut(head) {
                assign(child, rest, value);
            }
        }
    }
}

/// Orders two documents by a list of sort keys.
pub(crate) fn compare_by(left: &Document, right: &Document, keys: &[Sort]) -> Ordering {
    for key in keys {
        let l = lookup(left, &key.field).map(Comparable::from).unwrap_or(Comparable::Null);
        let r = lookup(right, &key.field).map(Comparable::from).unwrap_or(Comparable::Null);

        let ordering = match key.direction {
            SortDirection::Asc => l.sort_cmp(&r),
            SortDirection::Desc => r.sort_cmp(&l),
        };
        if ordering.is_ne() {
            return ordering;
        }
    }

    Ordering::Equal
}

/// Applies an inclusion or exclusion projection.
///
/// With at least one inclusion only included fields and `_id` (unless
/// excluded) survive; otherwise excluded fields are removed.
pub(crate) fn project(document: Document, projection: &Projection) -> Document {
    let fields = projection.fields();
    let excluded = |key: &str| fields.iter().any(|(field, included)| !included && field == key);

    if fields.iter().any(|(_, included)| *included) {
        document
            .into_iter()
            .filter(|(key, _)| {
                let included = fields.iter().any(|(field, included)| *included && field == key);
                (included || key == "_id") && !excluded(key)
            })
            .collect()
    } else {
        document
            .into_iter()
            .filter(|(key, _)| !excluded(key))
            .collect()
    }
}

pub(crate) struct DocumentEvaluator<'a> {
    document: &'a Document,
}

impl<'a> DocumentEvaluator<'a> {
    pub fn new(document: &'a Document) -> Self {
        Self { document }
    }

    pub fn evaluate(&mut self, expr: &Expr) -> DocumentStoreResult<bool> {
        self.visit_expr(expr)
    }

    /// Returns `true` when `document` satisfies the optional filter.
    pub fn matches(document: &'a Document, filter: Option<&Expr>) -> DocumentStoreResult<bool> {
        match filter {
            Some(expr) => DocumentEvaluator::new(document).evaluate(expr),
            None => Ok(true),
        }
    }
}

fn any_of(field: Comparable<'_>, value: Comparable<'_>) -> bool {
    match (field, value) {
        (Comparable::Array(array), Comparable::Array(values)) => {
            values.iter().any(|val| array.iter().any(|item| item == val))
        }
        (Comparable::Array(array), single_value) => array.iter().any(|item| item == &single_value),
        (single_value, Comparable::Array(values)) => values.iter().any(|val| val == &single_value),
        (left, right) => left == right,
    }
}

/// Equality with array fields matching any of their elements.
fn equals(field: &Comparable<'_>, value: &Comparable<'_>) -> bool {
    field == value || matches!(field, Comparable::Array(items) if items.contains(value))
}

fn satisfies(op: &FieldOp, ordering: Ordering) -> bool {
    match op {
        FieldOp::Gt => ordering.is_gt(),
        FieldOp::Gte => ordering.is_ge(),
        FieldOp::Lt => ordering.is_lt(),
        FieldOp::Lte => ordering.is_le(),
        _ => false,
    }
}

fn contains(field: Comparable<'_>, value: Comparable<'_>) -> bool {
    match (field, value) {
        (Comparable::Array(array), value) => array.iter().any(|item| item == &value),
        (Comparable::String(left), Comparable::String(right)) => left.contains(right),
        _ => false,
    }
}

impl QueryVisitor for DocumentEvaluator<'_> {
    type Output = bool;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        for expr in exprs {
            if !self.visit_expr(expr)? {
                return Ok(false);
            }
        }

        Ok(true)
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.is_empty() {
            return Ok(true);
        }

        for expr in exprs {
            if self.visit_expr(expr)? {
                return Ok(true);
            }
        }

        Ok(false)
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(!self.visit_expr(expr)?)
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(lookup(self.document, field).is_some() == should_exist)
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        let Some(field_value) = lookup(self.document, field) else {
            // A missing field only satisfies negative operators.
            return Ok(matches!(op, FieldOp::Ne | FieldOp::NotContains | FieldOp::NoneOf));
        };

        let left = Comparable::from(field_value);
        let right = Comparable::from(value);

        Ok(match op {
            FieldOp::Eq => equals(&left, &right),
            FieldOp::Ne => !equals(&left, &right),
            FieldOp::Gt | FieldOp::Gte | FieldOp::Lt | FieldOp::Lte => left
                .partial_cmp(&right)
                .is_some_and(|ordering| satisfies(op, ordering)),
            FieldOp::Contains => contains(left, right),
            FieldOp::NotContains => !contains(left, right),
            FieldOp::StartsWith => match (left, right) {
                (Comparable::String(left), Comparable::String(right)) => left.starts_with(right),
                _ => false,
            },
            FieldOp::EndsWith => match (left, right) {
                (Comparable::String(left), Comparable::String(right)) => left.ends_with(right),
                _ => false,
            },
            FieldOp::AnyOf => any_of(left, right),
            FieldOp::NoneOf => !any_of(left, right),
        })
    }

    fn visit_raw(&mut self, _document: &Document) -> Result<Self::Output, Self::Error> {
        Err(DocumentStoreError::UnsupportedQuery(
            "raw filter documents need a database backend".to_string(),
        ))
    }
}
