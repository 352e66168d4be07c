//! Aggregation pipeline execution
//!
//! Stages run left to right over records (fields plus `_id`). A `GroupBy`
//! replaces the record set with one record per distinct key, in the order
//! keys are first seen.

use std::cmp::Ordering;

use crate::error::{Error, Result};
use crate::schema::Schema;
use crate::storage::document::{Fields, Value};
use shelfql::{Accumulator, GroupKey, KeyExpr, SortDirection, SortKey, Stage};

use super::filter::check_field_name;

/// Run a pipeline over records
pub fn run(mut records: Vec<Fields>, stages: &[Stage]) -> Vec<Fields> {
    for stage in stages {
        records = match stage {
            Stage::GroupBy { key, accumulators } => group(&records, key, accumulators),
            Stage::Sort(key) => {
                sort_records(&mut records, key);
                records
            }
            Stage::Limit(n) => {
                records.truncate(*n);
                records
            }
        };
    }
    records
}

/// Field value by name, following dots into nested objects
pub fn field_value<'a>(record: &'a Fields, key: &str) -> Option<&'a Value> {
    if let Some(v) = record.get(key) {
        return Some(v);
    }
    let mut parts = key.split('.');
    let mut current = record.get(parts.next()?)?;
    for part in parts {
        match current {
            Value::Object(obj) => current = obj.get(part)?,
            _ => return None,
        }
    }
    Some(current)
}

/// Missing sorts before every value, then the value order
pub fn compare_optional(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => a.total_cmp(b),
    }
}

fn sort_records(records: &mut [Fields], key: &SortKey) {
    records.sort_by(|a, b| {
        let cmp = compare_optional(field_value(a, &key.field), field_value(b, &key.field));
        match key.direction {
            SortDirection::Ascending => cmp,
            SortDirection::Descending => cmp.reverse(),
        }
    });
}

fn key_value(record: &Fields, expr: &KeyExpr) -> Value {
    match expr {
        KeyExpr::Field(field) => field_value(record, field).cloned().unwrap_or(Value::Null),
        KeyExpr::FloorDiv { field, divisor } => match field_value(record, field) {
            Some(Value::Int(i)) => floor_div(*i, *divisor).map_or(Value::Null, Value::Int),
            Some(Value::Float(f)) if *divisor != 0 => {
                let q = (f / *divisor as f64).floor();
                if q.is_finite() {
                    Value::Int(q as i64)
                } else {
                    Value::Null
                }
            }
            _ => Value::Null,
        },
    }
}

/// Floor division; `None` on a zero divisor or overflow
fn floor_div(value: i64, divisor: i64) -> Option<i64> {
    let quotient = value.checked_div(divisor)?;
    let remainder = value.checked_rem(divisor)?;
    if remainder != 0 && ((value < 0) != (divisor < 0)) {
        quotient.checked_sub(1)
    } else {
        Some(quotient)
    }
}

/// Running state of one accumulator within one group
#[derive(Debug)]
enum AccState {
    Count(i64),
    Sum { int: i64, float: f64, all_int: bool },
    Average { total: f64, count: usize },
    Min(Option<Value>),
    Max(Option<Value>),
}

impl AccState {
    fn new(acc: &Accumulator) -> Self {
        match acc {
            Accumulator::Count => AccState::Count(0),
            Accumulator::Sum(_) => AccState::Sum { int: 0, float: 0.0, all_int: true },
            Accumulator::Average(_) => AccState::Average { total: 0.0, count: 0 },
            Accumulator::Min(_) => AccState::Min(None),
            Accumulator::Max(_) => AccState::Max(None),
        }
    }

    fn add(&mut self, value: Option<&Value>) {
        match self {
            AccState::Count(n) => *n += 1,
            AccState::Sum { int, float, all_int } => match value {
                Some(Value::Int(i)) => {
                    *float += *i as f64;
                    match int.checked_add(*i) {
                        Some(next) => *int = next,
                        None => *all_int = false,
                    }
                }
                Some(Value::Float(f)) => {
                    *float += f;
                    *all_int = false;
                }
                _ => {}
            },
            AccState::Average { total, count } => {
                if let Some(x) = value.and_then(Value::as_f64) {
                    *total += x;
                    *count += 1;
                }
            }
            AccState::Min(current) => {
                if let Some(v) = value.filter(|v| **v != Value::Null) {
                    if current.as_ref().map(|c| v.total_cmp(c) == Ordering::Less).unwrap_or(true) {
                        *current = Some(v.clone());
                    }
                }
            }
            AccState::Max(current) => {
                if let Some(v) = value.filter(|v| **v != Value::Null) {
                    if current.as_ref().map(|c| v.total_cmp(c) == Ordering::Greater).unwrap_or(true) {
                        *current = Some(v.clone());
                    }
                }
            }
        }
    }

    fn finish(self) -> Value {
        match self {
            AccState::Count(n) => Value::Int(n),
            AccState::Sum { int, float, all_int } => {
                if all_int {
                    Value::Int(int)
                } else {
                    Value::Float(float)
                }
            }
            AccState::Average { total, count } => {
                if count == 0 {
                    Value::Null
                } else {
                    Value::Float(total / count as f64)
                }
            }
            AccState::Min(v) | AccState::Max(v) => v.unwrap_or(Value::Null),
        }
    }
}

struct Group {
    key: Value,
    states: Vec<AccState>,
}

fn group(records: &[Fields], key: &GroupKey, accumulators: &[(String, Accumulator)]) -> Vec<Fields> {
    let mut groups: Vec<Group> = Vec::new();

    for record in records {
        let k = key_value(record, &key.expr);
        let idx = match groups.iter().position(|g| g.key.loosely_equals(&k)) {
            Some(idx) => idx,
            None => {
                groups.push(Group {
                    key: k,
                    states: accumulators.iter().map(|(_, acc)| AccState::new(acc)).collect(),
                });
                groups.len() - 1
            }
        };

        for ((_, acc), state) in accumulators.iter().zip(groups[idx].states.iter_mut()) {
            state.add(acc.field().and_then(|f| field_value(record, f)));
        }
    }

    groups
        .into_iter()
        .map(|g| {
            let mut out = Fields::new();
            out.insert(key.name.clone(), g.key);
            for ((name, _), state) in accumulators.iter().zip(g.states) {
                out.insert(name.clone(), state.finish());
            }
            out
        })
        .collect()
}

// =============================================================================
// Validation
// =============================================================================

/// Reject a malformed pipeline before any record is read
///
/// Declared field types only apply until the first `GroupBy`; after it the
/// records are group outputs.
pub fn validate(stages: &[Stage], schema: &Schema) -> Result<()> {
    let mut typed = true;

    for stage in stages {
        match stage {
            Stage::GroupBy { key, accumulators } => {
                check_field_name(&key.name)?;
                check_field_name(key.expr.field())?;

                if let KeyExpr::FloorDiv { field, divisor } = &key.expr {
                    if *divisor == 0 {
                        return Err(Error::invalid_query(format!("FLOOR({} / 0) divides by zero", field)));
                    }
                    if typed {
                        require_numeric(schema, field, "FLOOR")?;
                    }
                }

                for (i, (name, acc)) in accumulators.iter().enumerate() {
                    check_field_name(name)?;
                    if *name == key.name || accumulators[..i].iter().any(|(n, _)| n == name) {
                        return Err(Error::invalid_query(format!(
                            "output field '{}' is defined twice in GROUP BY",
                            name
                        )));
                    }
                    if let Some(field) = acc.field() {
                        check_field_name(field)?;
                        if typed {
                            require_numeric(schema, field, accumulator_name(acc))?;
                        }
                    }
                }

                typed = false;
            }
            Stage::Sort(key) => check_field_name(&key.field)?,
            Stage::Limit(_) => {}
        }
    }

    Ok(())
}

fn accumulator_name(acc: &Accumulator) -> &'static str {
    match acc {
        Accumulator::Count => "COUNT",
        Accumulator::Sum(_) => "SUM",
        Accumulator::Average(_) => "AVG",
        Accumulator::Min(_) => "MIN",
        Accumulator::Max(_) => "MAX",
    }
}

fn require_numeric(schema: &Schema, field: &str, op: &str) -> Result<()> {
    match schema.field_type(field) {
        Some(t) if !t.is_numeric() => Err(Error::invalid_query(format!(
            "{} needs a numeric field, but '{}' is declared {}",
            op,
            field,
            t.as_str()
        ))),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(genre: &str, author: &str, year: i64, price: Value) -> Fields {
        let mut f = Fields::new();
        f.insert("genre".into(), genre.into());
        f.insert("author".into(), author.into());
        f.insert("published_year".into(), Value::Int(year));
        f.insert("price".into(), price);
        f
    }

    fn shelf() -> Vec<Fields> {
        vec![
            record("Fiction", "Harper Lee", 1960, Value::Float(10.0)),
            record("Dystopian", "George Orwell", 1949, Value::Int(9)),
            record("Fiction", "F. Scott Fitzgerald", 1925, Value::Float(20.0)),
            record("Dystopian", "George Orwell", 1945, Value::Int(7)),
        ]
    }

    #[test]
    fn test_average_by_genre() {
        let two_fiction = vec![
            record("Fiction", "A", 2001, Value::Int(10)),
            record("Fiction", "B", 2002, Value::Int(20)),
        ];
        let stages = vec![Stage::group_by(GroupKey::field("genre"))
            .accumulate("avgPrice", Accumulator::Average("price".into()))];

        let out = run(two_fiction, &stages);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].len(), 2);
        assert_eq!(out[0]["genre"], Value::from("Fiction"));
        assert_eq!(out[0]["avgPrice"], Value::Float(15.0));
    }

    #[test]
    fn test_groups_in_first_seen_order() {
        let stages = vec![Stage::group_by(GroupKey::field("genre")).accumulate("count", Accumulator::Count)];
        let out = run(shelf(), &stages);
        let genres: Vec<_> = out.iter().map(|r| r["genre"].clone()).collect();
        assert_eq!(genres, vec![Value::from("Fiction"), Value::from("Dystopian")]);
        assert_eq!(out[0]["count"], Value::Int(2));
    }

    #[test]
    fn test_sum_types() {
        let stages = vec![Stage::group_by(GroupKey::field("genre"))
            .accumulate("total", Accumulator::Sum("price".into()))
            .accumulate("none", Accumulator::Sum("pages".into()))
            .accumulate("avg_pages", Accumulator::Average("pages".into()))];
        let out = run(shelf(), &stages);

        assert_eq!(out[0]["total"], Value::Float(30.0));
        assert_eq!(out[1]["total"], Value::Int(16));
        assert_eq!(out[0]["none"], Value::Int(0));
        assert_eq!(out[0]["avg_pages"], Value::Null);
    }

    #[test]
    fn test_top_author() {
        let stages = vec![
            Stage::group_by(GroupKey::field("author")).accumulate("count", Accumulator::Count),
            Stage::sort(SortKey::desc("count")),
            Stage::limit(1),
        ];
        let out = run(shelf(), &stages);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0]["author"], Value::from("George Orwell"));
        assert_eq!(out[0]["count"], Value::Int(2));
    }

    #[test]
    fn test_decades_with_min_max() {
        let stages = vec![
            Stage::group_by(GroupKey::floor_div("published_year", 10, "decade"))
                .accumulate("count", Accumulator::Count)
                .accumulate("oldest", Accumulator::Min("published_year".into()))
                .accumulate("newest", Accumulator::Max("published_year".into())),
            Stage::sort(SortKey::asc("decade")),
        ];
        let out = run(shelf(), &stages);
        let decades: Vec<_> = out.iter().map(|r| r["decade"].clone()).collect();
        assert_eq!(decades, vec![Value::Int(192), Value::Int(194), Value::Int(196)]);
        assert_eq!(out[1]["count"], Value::Int(2));
        assert_eq!(out[1]["oldest"], Value::Int(1945));
        assert_eq!(out[1]["newest"], Value::Int(1949));
    }

    #[test]
    fn test_missing_key_groups_under_null() {
        let mut loose = Fields::new();
        loose.insert("title".into(), "Untitled".into());
        let mut records = shelf();
        records.push(loose);

        let stages = vec![Stage::group_by(GroupKey::field("genre")).accumulate("n", Accumulator::Count)];
        let out = run(records, &stages);
        assert_eq!(out.last().map(|r| r["genre"].clone()), Some(Value::Null));
    }

    #[test]
    fn test_empty_pipeline_and_limit() {
        assert_eq!(run(shelf(), &[]).len(), 4);
        assert!(run(shelf(), &[Stage::limit(0)]).is_empty());
    }

    #[test]
    fn test_floor_div_negative() {
        assert_eq!(floor_div(-5, 10), Some(-1));
        assert_eq!(floor_div(1999, 10), Some(199));
        assert_eq!(floor_div(-20, 10), Some(-2));
        assert_eq!(floor_div(7, -2), Some(-4));
        assert_eq!(floor_div(i64::MIN, -1), None);
        assert_eq!(floor_div(5, 0), None);
    }

    #[test]
    fn test_floor_overflow_groups_under_null() {
        let mut extreme = Fields::new();
        extreme.insert("published_year".into(), Value::Int(i64::MIN));
        let records = vec![extreme, record("Fiction", "Harper Lee", 1960, Value::Int(10))];

        let stages = vec![Stage::group_by(GroupKey::floor_div("published_year", -1, "d"))
            .accumulate("n", Accumulator::Count)];
        let out = run(records, &stages);

        assert_eq!(out.len(), 2);
        assert_eq!(out[0]["d"], Value::Null);
        assert_eq!(out[1]["d"], Value::Int(-1960));
    }

    #[test]
    fn test_validate_pipeline() {
        let schema = Schema::books("books");

        let good = vec![
            Stage::group_by(GroupKey::field("genre")).accumulate("avgPrice", Accumulator::Average("price".into())),
            Stage::sort(SortKey::desc("avgPrice")),
        ];
        assert!(validate(&good, &schema).is_ok());

        let bad = [
            vec![Stage::group_by(GroupKey::field("genre")).accumulate("t", Accumulator::Sum("title".into()))],
            vec![Stage::group_by(GroupKey::floor_div("published_year", 0, "decade"))],
            vec![Stage::group_by(GroupKey::floor_div("author", 10, "decade"))],
            vec![Stage::group_by(GroupKey::field("genre"))
                .accumulate("n", Accumulator::Count)
                .accumulate("n", Accumulator::Count)],
            vec![Stage::sort(SortKey::asc("bad field"))],
        ];
        for stages in bad {
            assert!(matches!(validate(&stages, &schema), Err(Error::InvalidQuery { .. })), "{:?}", stages);
        }
    }
}
