//! Query translation from svckit expressions to MongoDB query syntax.
//!
//! This module translates filter expressions, sort keys and pipeline stages
//! into BSON documents for execution by the MongoDB query engine.

use bson::{Bson, Document, doc};

use svckit_core::{
    error::{DocumentStoreError, DocumentStoreResult},
    query::{Expr, FieldOp, Query, QueryVisitor, Sort, SortDirection, Stage},
};

/// Translates svckit query expressions into MongoDB query documents.
///
/// This struct implements the [`QueryVisitor`] trait to convert abstract
/// query expressions into MongoDB's native BSON query syntax.
pub(crate) struct MongoQueryTranslator;

impl MongoQueryTranslator {
    /// Returns the filter document of a query, `{}` when it has none.
    pub fn filter(query: &Query) -> DocumentStoreResult<Document> {
        match &query.filter {
            Some(expr) => MongoQueryTranslator.visit_expr(expr),
            None => Ok(Document::new()),
        }
    }

    fn visit_all(&mut self, exprs: &[Expr]) -> DocumentStoreResult<Vec<Document>> {
        exprs
            .iter()
            .filter(|expr| !expr.is_empty())
            .map(|expr| self.visit_expr(expr))
            .collect()
    }
}

/// Escapes regex metacharacters so a value matches literally.
fn literal(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        if "\\^$.|?*+()[]{}".contains(ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

fn as_array(value: &Bson) -> Bson {
    match value {
        Bson::Array(_) => value.clone(),
        other => Bson::Array(vec![other.clone()]),
    }
}

fn string_operand<'a>(op: &str, value: &'a Bson) -> DocumentStoreResult<&'a str> {
    value.as_str().ok_or_else(|| {
        DocumentStoreError::UnsupportedQuery(format!("{op} operator requires a string value"))
    })
}

impl QueryVisitor for MongoQueryTranslator {
    type Output = Document;
    type Error = DocumentStoreError;

    fn visit_and(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        let exprs = self.visit_all(exprs)?;

        Ok(match exprs.len() {
            0 => Document::new(),
            1 => exprs.into_iter().next().unwrap_or_default(),
            _ => doc! { "$and": exprs },
        })
    }

    fn visit_or(&mut self, exprs: &[Expr]) -> Result<Self::Output, Self::Error> {
        if exprs.iter().any(Expr::is_empty) {
            return Ok(Document::new());
        }

        let exprs = self.visit_all(exprs)?;

        Ok(match exprs.len() {
            0 => Document::new(),
            _ => doc! { "$or": exprs },
        })
    }

    fn visit_not(&mut self, expr: &Expr) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            "$nor": [self.visit_expr(expr)?],
        })
    }

    fn visit_exists(&mut self, field: &str, should_exist: bool) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: { "$exists": should_exist },
        })
    }

    fn visit_field(&mut self, field: &str, op: &FieldOp, value: &Bson) -> Result<Self::Output, Self::Error> {
        Ok(doc! {
            field: match op {
                FieldOp::Eq => doc! { "$eq": value },
                FieldOp::Ne => doc! { "$ne": value },
                FieldOp::Gt => doc! { "$gt": value },
                FieldOp::Gte => doc! { "$gte": value },
                FieldOp::Lt => doc! { "$lt": value },
                FieldOp::Lte => doc! { "$lte": value },
                FieldOp::Contains => match value {
                    Bson::String(s) => doc! { "$regex": literal(s) },
                    other => doc! { "$all": as_array(other) },
                },
                FieldOp::NotContains => match value {
                    Bson::String(s) => doc! { "$not": { "$regex": literal(s) } },
                    other => doc! { "$nin": as_array(other) },
                },
                FieldOp::StartsWith => {
                    doc! { "$regex": format!("^{}", literal(string_operand("StartsWith", value)?)) }
                }
                FieldOp::EndsWith => {
                    doc! { "$regex": format!("{}$", literal(string_operand("EndsWith", value)?)) }
                }
                FieldOp::AnyOf => doc! { "$in": as_array(value) },
                FieldOp::NoneOf => doc! { "$nin": as_array(value) },
            }
        })
    }

    fn visit_raw(&mut self, document: &Document) -> Result<Self::Output, Self::Error> {
        Ok(document.clone())
    }
}

/// Converts sort keys to a `{ field: 1 | -1 }` document, `None` when there are none.
pub(crate) fn sort_document(keys: &[Sort]) -> Option<Document> {
    (!keys.is_empty()).then(|| {
        keys.iter()
            .map(|key| {
                let direction = match key.direction {
                    SortDirection::Asc => 1,
                    SortDirection::Desc => -1,
                };
                (key.field.clone(), Bson::Int32(direction))
            })
            .collect()
    })
}

/// Converts a pipeline stage to its driver document.
pub(crate) fn stage_document(stage: &Stage) -> DocumentStoreResult<Document> {
    Ok(match stage {
        Stage::Match(expr) => doc! { "$match": MongoQueryTranslator.visit_expr(expr)? },
        Stage::Sort(keys) => doc! { "$sort": sort_document(keys).unwrap_or_default() },
        Stage::Skip(n) => doc! { "$skip": to_i64(*n)? },
        Stage::Limit(n) => doc! { "$limit": to_i64(*n)? },
        Stage::Project(projection) => doc! { "$project": projection.to_document() },
        Stage::Raw(document) => document.clone(),
    })
}

pub(crate) fn to_i64(n: u64) -> DocumentStoreResult<i64> {
    i64::try_from(n).map_err(|_| DocumentStoreError::UnsupportedQuery(format!("{n} is out of range")))
}

#[cfg(test)]
mod tests {
    use svckit_core::query::{Filter, Projection};

    use super::*;

    fn translate(expr: Expr) -> Document {
        MongoQueryTranslator.visit_expr(&expr).unwrap()
    }

    #[test]
    fn comparisons_become_operator_documents() {
        assert_eq!(translate(Filter::eq("uid", 7)), doc! { "uid": { "$eq": 7 } });
        assert_eq!(
            translate(Filter::gt("level", 2).and(Filter::ne("lang", "en"))),
            doc! { "$and": [{ "level": { "$gt": 2 } }, { "lang": { "$ne": "en" } }] }
        );
    }

    #[test]
    fn string_matches_are_literal() {
        assert_eq!(
            translate(Filter::starts_with("name", "a.b")),
            doc! { "name": { "$regex": "^a\\.b" } }
        );
        assert_eq!(
            translate(Filter::contains("tags", "x")),
            doc! { "tags": { "$regex": "x" } }
        );
        assert!(MongoQueryTranslator.visit_expr(&Filter::ends_with("name", 3)).is_err());
    }

    #[test]
    fn set_membership_always_uses_arrays() {
        assert_eq!(
            translate(Filter::any_of("_id", vec!["a", "b"])),
            doc! { "_id": { "$in": ["a", "b"] } }
        );
        assert_eq!(translate(Filter::none_of("_id", "a")), doc! { "_id": { "$nin": ["a"] } });
    }

    #[test]
    fn negation_and_empty_groups() {
        assert_eq!(
            translate(Filter::exists("email").not()),
            doc! { "$nor": [{ "email": { "$exists": true } }] }
        );
        assert_eq!(translate(Filter::and(Vec::new())), doc! {});
        assert_eq!(translate(Filter::or(Vec::new())), doc! {});
    }

    #[test]
    fn raw_filters_pass_through() {
        let raw = doc! { "_id": { "$in": ["a"] } };

        assert_eq!(translate(Filter::raw(raw.clone())), raw);
    }

    #[test]
    fn stages_translate_to_pipeline_documents() {
        let stages = [
            Stage::Match(Filter::eq("status", 1)),
            Stage::Sort(vec![Sort::desc("update_time"), Sort::asc("_id")]),
            Stage::Skip(10),
            Stage::Limit(5),
            Stage::Project(Projection::from_csv("name")),
        ];
        let pipeline = stages
            .iter()
            .map(stage_document)
            .collect::<DocumentStoreResult<Vec<_>>>()
            .unwrap();

        assert_eq!(
            pipeline,
            vec![
                doc! { "$match": { "status": { "$eq": 1 } } },
                doc! { "$sort": { "update_time": -1, "_id": 1 } },
                doc! { "$skip": 10_i64 },
                doc! { "$limit": 5_i64 },
                doc! { "$project": { "name": 1 } },
            ]
        );
        assert_eq!(sort_document(&[]), None);
    }
}
