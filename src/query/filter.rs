//! Filter evaluation and validation

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::schema::{FieldType, Schema};
use crate::storage::document::{like_regex, Document, Value};
use crate::validation::validate_field_name;
use shelfql::{FieldPredicate, Filter, Literal};

/// True if every clause of the filter holds for the document
pub fn matches(filter: &Filter, doc: &Document) -> bool {
    filter
        .clauses
        .iter()
        .all(|(field, predicate)| predicate_holds(predicate, doc.lookup(field).as_ref()))
}

/// Evaluate one predicate against a field value (`None` when the field is missing)
pub fn predicate_holds(predicate: &FieldPredicate, value: Option<&Value>) -> bool {
    match predicate {
        FieldPredicate::Equals(lit) => equals(value, lit),
        FieldPredicate::NotEquals(lit) => !equals(value, lit),
        FieldPredicate::GreaterThan(lit) => compare(value, lit) == Some(Ordering::Greater),
        FieldPredicate::GreaterOrEqual(lit) => {
            matches!(compare(value, lit), Some(Ordering::Greater | Ordering::Equal))
        }
        FieldPredicate::LessThan(lit) => compare(value, lit) == Some(Ordering::Less),
        FieldPredicate::LessOrEqual(lit) => {
            matches!(compare(value, lit), Some(Ordering::Less | Ordering::Equal))
        }
        FieldPredicate::In(options) => options.iter().any(|lit| equals(value, lit)),
        FieldPredicate::Like(pattern) => value.map(|v| v.matches_pattern(pattern)).unwrap_or(false),
        FieldPredicate::And(inner) => inner.iter().all(|p| predicate_holds(p, value)),
    }
}

/// Equality; a null literal also matches a missing field, and a scalar
/// matches an array field that contains it
fn equals(value: Option<&Value>, lit: &Literal) -> bool {
    let expected = Value::from(lit);
    match value {
        None => expected == Value::Null,
        Some(Value::Array(items)) if !matches!(expected, Value::Array(_)) => {
            items.iter().any(|item| item.loosely_equals(&expected))
        }
        Some(v) => v.loosely_equals(&expected),
    }
}

/// Ordering of a value against a literal; only numbers compare with
/// numbers and strings with strings
fn compare(value: Option<&Value>, lit: &Literal) -> Option<Ordering> {
    let value = value?;
    let expected = Value::from(lit);
    let comparable = (value.is_numeric() && expected.is_numeric())
        || (matches!(value, Value::String(_)) && matches!(expected, Value::String(_)));
    comparable.then(|| value.total_cmp(&expected))
}

// =============================================================================
// Validation
// =============================================================================

/// Reject a filter that is malformed or contradicts the schema
pub fn validate(filter: &Filter, schema: &Schema) -> Result<()> {
    for (field, predicate) in &filter.clauses {
        check_field_name(field)?;
        validate_predicate(field, predicate, schema.field_type(field))?;
    }
    Ok(())
}

pub(crate) fn check_field_name(field: &str) -> Result<()> {
    validate_field_name(field)
        .map_err(|e| Error::invalid_query(format!("bad field name '{}': {}", field, e)))
}

fn validate_predicate(field: &str, predicate: &FieldPredicate, declared: Option<&FieldType>) -> Result<()> {
    match predicate {
        FieldPredicate::Equals(lit) | FieldPredicate::NotEquals(lit) => {
            check_literal_type(field, lit, declared)
        }
        FieldPredicate::In(options) => options
            .iter()
            .try_for_each(|lit| check_literal_type(field, lit, declared)),
        FieldPredicate::GreaterThan(lit)
        | FieldPredicate::GreaterOrEqual(lit)
        | FieldPredicate::LessThan(lit)
        | FieldPredicate::LessOrEqual(lit) => {
            if !lit.is_orderable() {
                return Err(Error::invalid_query(format!(
                    "{} on '{}' needs a number or string, got {}",
                    predicate.op_name(),
                    field,
                    lit.type_name()
                )));
            }
            if let Some(t) = declared {
                if !t.is_numeric() {
                    return Err(Error::invalid_query(format!(
                        "{} on '{}' is a range comparison, but '{}' is declared {}",
                        predicate.op_name(),
                        field,
                        field,
                        t.as_str()
                    )));
                }
            }
            check_literal_type(field, lit, declared)
        }
        FieldPredicate::Like(pattern) => {
            if let Some(t) = declared {
                if *t != FieldType::String {
                    return Err(Error::invalid_query(format!(
                        "LIKE on '{}' needs a string field, but it is declared {}",
                        field,
                        t.as_str()
                    )));
                }
            }
            like_regex(pattern)
                .map(|_| ())
                .map_err(|e| Error::invalid_query(format!("bad LIKE pattern '{}': {}", pattern, e)))
        }
        FieldPredicate::And(inner) => {
            if inner.is_empty() {
                return Err(Error::invalid_query(format!("empty $and on '{}'", field)));
            }
            inner
                .iter()
                .try_for_each(|p| validate_predicate(field, p, declared))
        }
    }
}

/// A literal must fit the declared type of the field it is compared with
pub(crate) fn check_literal_type(field: &str, lit: &Literal, declared: Option<&FieldType>) -> Result<()> {
    let Some(t) = declared else {
        return Ok(());
    };
    let fits = match lit {
        Literal::Null => true,
        Literal::Int(_) | Literal::Float(_) => t.is_numeric(),
        Literal::String(_) => *t == FieldType::String,
        Literal::Bool(_) => *t == FieldType::Bool,
        Literal::Array(_) => *t == FieldType::Array,
    };
    if fits {
        Ok(())
    } else {
        Err(Error::invalid_query(format!(
            "field '{}' is declared {} and cannot be compared with {}",
            field,
            t.as_str(),
            lit.type_name()
        )))
    }
}
