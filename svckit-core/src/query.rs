//! Filter expressions, sort keys, projections and aggregation stages.
//!
//! This module provides the backend-agnostic query state accumulated by a
//! [`CollectionHandle`](crate::collection::CollectionHandle), and a visitor
//! pattern that lets each backend translate or evaluate filter expressions.
//!
//! # Filter Expression API
//!
//! The [`Filter`] struct provides a collection of static methods for building filter expressions:
//!
//! - Comparison: `eq`, `ne`, `gt`, `gte`, `lt`, `lte`
//! - String: `starts_with`, `ends_with`, `contains`, `not_contains`
//! - Existence: `exists`, `not_exists`
//! - Array: `any_of`, `none_of`
//! - Logical: `and`, `or`
//! - Escape hatch: `raw` passes a driver filter document through untouched
//!
//! ```ignore
//! use svckit::query::Filter;
//!
//! let expr = Filter::eq("status", 1).and(Filter::gt("level", 3));
//! ```

use bson::{Bson, Document};

use crate::{document::ID_KEY, error::DocumentStoreError};

/// Sort direction for query results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    /// Ascending order (A to Z, 0 to 9, earliest to latest).
    Asc,
    /// Descending order (Z to A, 9 to 0, latest to earliest).
    Desc,
}

/// One sort key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sort {
    /// The field name to sort by.
    pub field: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl Sort {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Asc }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Desc }
    }
}

/// Field comparison operators for filter expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldOp {
    /// Equal to (exact match).
    Eq,
    /// Not equal to.
    Ne,
    /// Greater than.
    Gt,
    /// Greater than or equal to.
    Gte,
    /// Less than.
    Lt,
    /// Less than or equal to.
    Lte,
    /// String or array contains value.
    Contains,
    /// String or array does not contain value.
    NotContains,
    /// String starts with value.
    StartsWith,
    /// String ends with value.
    EndsWith,
    /// Field matches any of the values.
    AnyOf,
    /// Field matches none of the values.
    NoneOf,
}

/// A filter expression for querying documents.
///
/// Expressions can be combined using logical operators (`And`, `Or`, `Not`)
/// to build complex filter predicates.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Logical AND of multiple expressions (all must match).
    And(Vec<Expr>),
    /// Logical OR of multiple expressions (any must match).
    Or(Vec<Expr>),
    /// Logical NOT of an expression (inverts the result).
    Not(Box<Expr>),
    /// Checks if a field exists or doesn't exist.
    Exists(String, bool),
    /// Field comparison expression.
    Field {
        /// The field name to compare.
        field: String,
        /// The comparison operator.
        op: FieldOp,
        /// The value to compare against.
        value: Bson,
    },
    /// A filter document in the driver's native syntax.
    Raw(Document),
}

impl Expr {
    /// Creates a field comparison expression.
    pub fn field(field: String, op: FieldOp, value: Bson) -> Self {
        Expr::Field { field, op, value }
    }

    /// Combines this expression with another using logical AND.
    ///
    /// If this expression is already an AND, the other expression is appended
    /// to the list. Otherwise, a new AND expression is created.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut list) => {
                list.push(other);
                Expr::And(list)
            }
            _ => Expr::And(vec![self, other]),
        }
    }

    /// Combines this expression with another using logical OR.
    ///
    /// If this expression is already an OR, the other expression is appended
    /// to the list. Otherwise, a new OR expression is created.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut list) => {
                list.push(other);
                Expr::Or(list)
            }
            _ => Expr::Or(vec![self, other]),
        }
    }

    /// Negates this expression (logical NOT).
    pub fn not(self) -> Self {
        Expr::Not(Box::new(self))
    }

    /// Returns `true` when the expression constrains nothing, i.e. it would
    /// match every document in a collection.
    ///
    /// An `Or` with one unconstrained branch matches everything, as does the
    /// negation of an expression that matches nothing.
    pub fn is_empty(&self) -> bool {
        match self {
            Expr::And(exprs) => exprs.iter().all(Expr::is_empty),
            Expr::Or(exprs) => exprs.is_empty() || exprs.iter().any(Expr::is_empty),
            Expr::Not(expr) => expr.matches_nothing(),
            Expr::Raw(document) => document.is_empty(),
            Expr::Exists(..) | Expr::Field { .. } => false,
        }
    }

    /// Returns `true` when the expression provably matches no document.
    fn matches_nothing(&self) -> bool {
        match self {
            Expr::And(exprs) => exprs.iter().any(Expr::matches_nothing),
            Expr::Or(exprs) => !exprs.is_empty() && exprs.iter().all(Expr::matches_nothing),
            Expr::Not(expr) => expr.is_empty(),
            Expr::Raw(_) | Expr::Exists(..) | Expr::Field { .. } => false,
        }
    }

    /// Collects top-level equality constraints (`field == value`).
    ///
    /// Upserts seed newly created documents with these values.
    pub fn equalities(&self) -> Vec<(&str, &Bson)> {
        match self {
            Expr::Field { field, op: FieldOp::Eq, value } => vec![(field.as_str(), value)],
            Expr::And(exprs) => exprs.iter().flat_map(Expr::equalities).collect(),
            Expr::Raw(document) => document
                .iter()
                .filter(|(key, value)| !key.starts_with('$') && !is_operator_document(value))
                .map(|(key, value)| (key.as_str(), value))
                .collect(),
            _ => Vec::new(),
        }
    }
}

fn is_operator_document(value: &Bson) -> bool {
    value
        .as_document()
        .and_then(|document| document.keys().next())
        .is_some_and(|key| key.starts_with('$'))
}

impl From<Document> for Expr {
    fn from(document: Document) -> Self {
        Expr::Raw(document)
    }
}

/// Helper struct for constructing filter expressions.
///
/// All methods accept field names and values as `Into<String>` and `Into<Bson>` for ergonomics.
pub struct Filter;

impl Filter {
    /// Matches documents where the field equals the specified value.
    pub fn eq(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Eq, value.into())
    }

    /// Matches the document with the given identifier.
    pub fn id(value: impl Into<Bson>) -> Expr {
        Self::eq(ID_KEY, value)
    }

    /// Matches documents where the field does not equal the specified value.
    pub fn ne(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Ne, value.into())
    }

    pub fn gt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gt, value.into())
    }

    pub fn gte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Gte, value.into())
    }

    pub fn lt(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lt, value.into())
    }

    pub fn lte(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Lte, value.into())
    }

    /// Matches documents where the string field starts with the specified value.
    pub fn starts_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::StartsWith, value.into())
    }

    /// Matches documents where the string field ends with the specified value.
    pub fn ends_with(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::EndsWith, value.into())
    }

    /// Matches documents where the field (string or array) contains the specified value.
    pub fn contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::Contains, value.into())
    }

    /// Matches documents where the field (string or array) does not contain the specified value.
    pub fn not_contains(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NotContains, value.into())
    }

    pub fn exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), true)
    }

    pub fn not_exists(field: impl Into<String>) -> Expr {
        Expr::Exists(field.into(), false)
    }

    pub fn and(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::And(exprs.into_iter().collect())
    }

    pub fn or(exprs: impl IntoIterator<Item = Expr>) -> Expr {
        Expr::Or(exprs.into_iter().collect())
    }

    /// Matches documents where the field equals any of the specified values.
    pub fn any_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::AnyOf, value.into())
    }

    /// Matches documents where the field equals none of the specified values.
    pub fn none_of(field: impl Into<String>, value: impl Into<Bson>) -> Expr {
        Expr::field(field.into(), FieldOp::NoneOf, value.into())
    }

    /// Wraps a filter document written in the driver's native syntax.
    ///
    /// Only backends that speak that syntax can evaluate it.
    pub fn raw(document: Document) -> Expr {
        Expr::Raw(document)
    }
}

/// Field projection: which fields a read returns.
///
/// Inclusions and exclusions follow the driver's rules: as soon as one field is
/// included, only included fields (plus `_id` unless excluded) are returned.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Projection {
    fields: Vec<(String, bool)>,
}

impl Projection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a comma-separated list of included fields, ignoring blanks and spaces.
    pub fn from_csv(fields: &str) -> Self {
        Self {
            fields: fields
                .split(',')
                .map(|field| field.replace(' ', ""))
                .filter(|field| !field.is_empty())
                .map(|field| (field, true))
                .collect(),
        }
    }

    pub fn include(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), true));
        self
    }

    pub fn exclude(mut self, field: impl Into<String>) -> Self {
        self.fields.push((field.into(), false));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Returns the `(field, included)` pairs in declaration order.
    pub fn fields(&self) -> &[(String, bool)] {
        &self.fields
    }

    /// Returns the projection in the driver's document form (`{ field: 1 | 0 }`).
    pub fn to_document(&self) -> Document {
        self.fields
            .iter()
            .map(|(field, included)| (field.clone(), Bson::Int32(i32::from(*included))))
            .collect()
    }
}

impl From<&str> for Projection {
    fn from(fields: &str) -> Self {
        Projection::from_csv(fields)
    }
}

impl From<Document> for Projection {
    fn from(document: Document) -> Self {
        Self {
            fields: document
                .into_iter()
                .map(|(field, value)| {
                    let included = match value {
                        Bson::Boolean(flag) => flag,
                        Bson::Int32(n) => n != 0,
                        Bson::Int64(n) => n != 0,
                        Bson::Double(n) => n != 0.0,
                        _ => true,
                    };
                    (field, included)
                })
                .collect(),
        }
    }
}

/// Replica-set read preference for a handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    #[default]
    Primary,
    PrimaryPreferred,
    Secondary,
    SecondaryPreferred,
    Nearest,
}

/// Query state accumulated by a collection handle.
#[derive(Debug, Clone, Default)]
pub struct Query {
    /// Optional filter expression to match documents.
    pub filter: Option<Expr>,
    /// Maximum number of documents to return.
    pub limit: Option<u64>,
    /// Number of documents to skip.
    pub skip: Option<u64>,
    /// Sort keys, applied in order.
    pub sort: Vec<Sort>,
    /// Fields to return.
    pub projection: Option<Projection>,
    /// Read preference, honoured by replica-set aware backends.
    pub read_mode: Option<ReadMode>,
}

impl Query {
    /// Creates a new empty query with no filters or limits.
    pub fn new() -> Self {
        Query::default()
    }

    /// Creates a query matching a single identifier.
    pub fn by_id(id: impl Into<Bson>) -> Self {
        Query {
            filter: Some(Filter::id(id)),
            ..Query::default()
        }
    }

    /// Returns `true` when the filter would match every document.
    pub fn is_unfiltered(&self) -> bool {
        self.filter.as_ref().is_none_or(Expr::is_empty)
    }
}

/// One stage of an aggregation pipeline.
#[derive(Debug, Clone, PartialEq)]
pub enum Stage {
    Match(Expr),
    Sort(Vec<Sort>),
    Skip(u64),
    Limit(u64),
    Project(Projection),
    /// A stage document in the driver's native syntax.
    Raw(Document),
}

pub trait QueryVisitor {
    type Output;
    type Error: Into<DocumentStoreError>;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error>;
    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error>;
    fn visit_exists(
        &mut self,
        field: &str,
        should_exist: bool,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_field(
        &mut self,
        field: &str,
        op: &FieldOp,
        value: &Bson,
    ) -> Result<Self::Output, Self::Error>;
    fn visit_raw(&mut self, document: &Document) -> Result<Self::Output, Self::Error>;

    fn visit_expr(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        match expr {
            Expr::And(exprs) => self.visit_and(exprs),
            Expr::Or(exprs) => self.visit_or(exprs),
            Expr::Not(expr) => self.visit_not(expr),
            Expr::Exists(field, should_exist) => self.visit_exists(field, *should_exist),
            Expr::Field { field, op, value } => self.visit_field(field, op, value),
            Expr::Raw(document) => self.visit_raw(document),
        }
    }
}

#[cfg(test)]
mod tests {
    use bson::doc;

    use super::*;

    #[test]
    fn empty_filters_are_detected() {
        assert!(Query::new().is_unfiltered());
        assert!(Filter::and(Vec::new()).is_empty());
        assert!(Filter::raw(doc! {}).is_empty());
        assert!(Filter::and([Filter::raw(doc! {})]).is_empty());
        assert!(!Filter::eq("name", "neo").is_empty());
        assert!(!Filter::exists("name").not().is_empty());
    }

    #[test]
    fn any_unconstrained_branch_empties_an_or() {
        let widened = Filter::or([Filter::eq("level", 999), Filter::and(Vec::new())]);

        assert!(widened.is_empty());
        assert!(Filter::or(Vec::new()).is_empty());
        assert!(!Filter::or([Filter::eq("level", 1), Filter::eq("level", 2)]).is_empty());
    }

    #[test]
    fn negations_follow_what_they_exclude() {
        let nothing = Filter::and(Vec::new()).not();

        assert!(!nothing.is_empty());
        assert!(nothing.clone().not().is_empty());
        assert!(Filter::and([Filter::eq("level", 1), nothing]).not().is_empty());
    }

    #[test]
    fn csv_projection_ignores_spaces_and_blanks() {
        let projection = Projection::from_csv(" name, level ,,tags");

        assert_eq!(
            projection.to_document(),
            doc! { "name": 1, "level": 1, "tags": 1 }
        );
    }

    #[test]
    fn equalities_collect_top_level_constraints() {
        let expr = Filter::eq("uid", 7).and(Filter::gt("level", 2)).and(Filter::eq("lang", "en"));
        let raw = Filter::raw(doc! { "uid": 7, "level": { "$gt": 2 } });

        assert_eq!(
            expr.equalities(),
            vec![("uid", &Bson::Int32(7)), ("lang", &Bson::String("en".into()))]
        );
        assert_eq!(raw.equalities(), vec![("uid", &Bson::Int32(7))]);
    }
}
