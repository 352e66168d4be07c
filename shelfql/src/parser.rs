//! Query text parser using nom
//!
//! Turns the textual forms of filters, changes, sorts, projections,
//! pipelines and index declarations into AST values.

use nom::{
    IResult,
    branch::alt,
    bytes::complete::{tag, tag_no_case, take_while1},
    character::complete::{char, digit1, multispace0, multispace1, none_of},
    combinator::{map, map_res, opt, recognize, value},
    multi::{many0, separated_list0, separated_list1},
    sequence::{delimited, pair, preceded, tuple},
};

use crate::ast::*;
use crate::error::ParseError;

/// Run `parser` over the whole input, rejecting trailing content
fn complete<'a, T, F>(input: &'a str, context: &'static str, mut parser: F) -> Result<T, ParseError>
where
    F: FnMut(&'a str) -> IResult<&'a str, T>,
{
    let (remaining, out) = parser(input)
        .map_err(|e| ParseError::from_nom(input, e).in_context(context))?;

    let remaining = remaining.trim_start();
    if !remaining.is_empty() {
        return Err(ParseError::new(format!("unexpected trailing input: {}", remaining))
            .with_position(input.len() - remaining.len())
            .in_context(context));
    }

    Ok(out)
}

/// Parse a filter; empty input or `*` matches everything
pub fn parse_filter(input: &str) -> Result<Filter, ParseError> {
    let input = input.trim();
    if input.is_empty() || input == "*" {
        return Ok(Filter::all());
    }

    let clauses = complete(input, "filter", filter_clauses)?;
    Ok(clauses
        .into_iter()
        .fold(Filter::all(), |filter, (field, predicate)| filter.with(field, predicate)))
}

pub fn parse_changes(input: &str) -> Result<Changes, ParseError> {
    let set = complete(input.trim(), "changes", separated_list1(comma, assignment))?;
    Ok(Changes { set })
}

pub fn parse_sort(input: &str) -> Result<SortKey, ParseError> {
    complete(input.trim(), "sort key", sort_key)
}

pub fn parse_projection(input: &str) -> Result<Projection, ParseError> {
    let items = complete(input.trim(), "projection", separated_list1(comma, projection_item))?;

    let mut projection = Projection::new(Vec::<String>::new());
    for item in items {
        match item {
            ProjectionItem::ExcludeId => projection.include_id = false,
            ProjectionItem::Field(name) if name == ID_FIELD => projection.include_id = true,
            ProjectionItem::Field(name) => {
                if !projection.fields.contains(&name) {
                    projection.fields.push(name);
                }
            }
        }
    }
    Ok(projection)
}

/// Parse a pipeline of `|`-separated stages; empty input is the empty pipeline
pub fn parse_pipeline(input: &str) -> Result<Vec<Stage>, ParseError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(Vec::new());
    }

    complete(
        input,
        "pipeline",
        separated_list1(tuple((multispace0, char('|'), multispace0)), stage),
    )
}

pub fn parse_index_fields(input: &str) -> Result<Vec<IndexField>, ParseError> {
    let keys = complete(input.trim(), "index fields", separated_list1(comma, sort_key))?;
    Ok(keys
        .into_iter()
        .map(|k| IndexField { field: k.field, direction: k.direction })
        .collect())
}

// ============================================================================
// Filters
// ============================================================================

fn filter_clauses(input: &str) -> IResult<&str, Vec<(String, FieldPredicate)>> {
    separated_list1(tuple((multispace1, tag_no_case("AND"), multispace1)), clause)(input)
}

fn clause(input: &str) -> IResult<&str, (String, FieldPredicate)> {
    let (input, field) = field_name(input)?;
    let (input, predicate) = alt((
        in_predicate,
        like_predicate,
        between_predicate,
        comparison_predicate,
    ))(input)?;

    Ok((input, (field.to_string(), predicate)))
}

fn comparison_predicate(input: &str) -> IResult<&str, FieldPredicate> {
    let (input, _) = multispace0(input)?;
    let (input, op) = alt((
        value(CompareOp::Eq, tag("=")),
        value(CompareOp::Ne, alt((tag("!="), tag("<>")))),
        value(CompareOp::Le, tag("<=")),
        value(CompareOp::Lt, tag("<")),
        value(CompareOp::Ge, tag(">=")),
        value(CompareOp::Gt, tag(">")),
    ))(input)?;
    let (input, _) = multispace0(input)?;
    let (input, lit) = literal(input)?;

    let predicate = match op {
        CompareOp::Eq => FieldPredicate::Equals(lit),
        CompareOp::Ne => FieldPredicate::NotEquals(lit),
        CompareOp::Lt => FieldPredicate::LessThan(lit),
        CompareOp::Le => FieldPredicate::LessOrEqual(lit),
        CompareOp::Gt => FieldPredicate::GreaterThan(lit),
        CompareOp::Ge => FieldPredicate::GreaterOrEqual(lit),
    };
    Ok((input, predicate))
}

#[derive(Debug, Clone, Copy)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

fn in_predicate(input: &str) -> IResult<&str, FieldPredicate> {
    let (input, _) = tuple((multispace1, tag_no_case("IN"), multispace0))(input)?;
    let (input, values) = delimited(
        pair(char('('), multispace0),
        separated_list1(comma, literal),
        pair(multispace0, char(')')),
    )(input)?;

    Ok((input, FieldPredicate::In(values)))
}

fn like_predicate(input: &str) -> IResult<&str, FieldPredicate> {
    let (input, _) = tuple((multispace1, tag_no_case("LIKE"), multispace1))(input)?;
    let (input, pattern) = string_literal(input)?;
    Ok((input, FieldPredicate::Like(pattern)))
}

fn between_predicate(input: &str) -> IResult<&str, FieldPredicate> {
    let (input, _) = tuple((multispace1, tag_no_case("BETWEEN"), multispace1))(input)?;
    let (input, low) = literal(input)?;
    let (input, _) = tuple((multispace1, tag_no_case("AND"), multispace1))(input)?;
    let (input, high) = literal(input)?;

    Ok((input, FieldPredicate::And(vec![
        FieldPredicate::GreaterOrEqual(low),
        FieldPredicate::LessOrEqual(high),
    ])))
}

// ============================================================================
// Changes, sort keys, projections
// ============================================================================

fn assignment(input: &str) -> IResult<&str, (String, Literal)> {
    let (input, field) = field_name(input)?;
    let (input, _) = tuple((multispace0, char('='), multispace0))(input)?;
    let (input, lit) = literal(input)?;
    Ok((input, (field.to_string(), lit)))
}

fn sort_key(input: &str) -> IResult<&str, SortKey> {
    let (input, field) = field_name(input)?;
    let (input, direction) = opt(preceded(multispace1, direction))(input)?;

    Ok((input, SortKey {
        field: field.to_string(),
        direction: direction.unwrap_or_default(),
    }))
}

fn direction(input: &str) -> IResult<&str, SortDirection> {
    alt((
        value(SortDirection::Descending, alt((tag_no_case("DESC"), tag("-1")))),
        value(SortDirection::Ascending, alt((tag_no_case("ASC"), tag("1")))),
    ))(input)
}

#[derive(Debug, Clone)]
enum ProjectionItem {
    Field(String),
    ExcludeId,
}

fn projection_item(input: &str) -> IResult<&str, ProjectionItem> {
    alt((
        value(ProjectionItem::ExcludeId, pair(char('-'), tag(ID_FIELD))),
        map(field_name, |f| ProjectionItem::Field(f.to_string())),
    ))(input)
}

// ============================================================================
// Pipeline stages
// ============================================================================

fn stage(input: &str) -> IResult<&str, Stage> {
    alt((group_stage, sort_stage, limit_stage))(input)
}

fn group_stage(input: &str) -> IResult<&str, Stage> {
    let (input, _) = tuple((tag_no_case("GROUP"), multispace1, tag_no_case("BY"), multispace1))(input)?;
    let (input, expr) = alt((floor_div_key, map(field_name, |f| KeyExpr::Field(f.to_string()))))(input)?;
    let (input, alias) = opt(preceded(
        tuple((multispace1, tag_no_case("AS"), multispace1)),
        field_name,
    ))(input)?;
    let (input, accumulators) = many0(preceded(list_sep, accumulator_item))(input)?;

    let name = match (&expr, alias) {
        (_, Some(alias)) => alias.to_string(),
        (KeyExpr::Field(f), None) => f.clone(),
        (KeyExpr::FloorDiv { .. }, None) => ID_FIELD.to_string(),
    };

    Ok((input, Stage::GroupBy {
        key: GroupKey { name, expr },
        accumulators,
    }))
}

fn floor_div_key(input: &str) -> IResult<&str, KeyExpr> {
    let (input, _) = tuple((tag_no_case("FLOOR"), multispace0, char('('), multispace0))(input)?;
    let (input, field) = field_name(input)?;
    let (input, _) = tuple((multispace0, char('/'), multispace0))(input)?;
    let (input, divisor) = integer(input)?;
    let (input, _) = pair(multispace0, char(')'))(input)?;

    Ok((input, KeyExpr::FloorDiv {
        field: field.to_string(),
        divisor,
    }))
}

fn accumulator_item(input: &str) -> IResult<&str, (String, Accumulator)> {
    let (input, acc) = accumulator(input)?;
    let (input, alias) = opt(preceded(
        tuple((multispace1, tag_no_case("AS"), multispace1)),
        field_name,
    ))(input)?;

    let name = match alias {
        Some(alias) => alias.to_string(),
        None => default_accumulator_name(&acc),
    };
    Ok((input, (name, acc)))
}

fn default_accumulator_name(acc: &Accumulator) -> String {
    match acc {
        Accumulator::Count => "count".to_string(),
        Accumulator::Sum(f) => format!("sum_{}", f),
        Accumulator::Average(f) => format!("avg_{}", f),
        Accumulator::Min(f) => format!("min_{}", f),
        Accumulator::Max(f) => format!("max_{}", f),
    }
}

fn accumulator(input: &str) -> IResult<&str, Accumulator> {
    alt((
        map(
            tuple((tag_no_case("COUNT"), multispace0, char('('), multispace0, opt(char('*')), multispace0, char(')'))),
            |_| Accumulator::Count,
        ),
        map(|i| call("SUM", i), |f| Accumulator::Sum(f.to_string())),
        map(|i| call("AVERAGE", i), |f| Accumulator::Average(f.to_string())),
        map(|i| call("AVG", i), |f| Accumulator::Average(f.to_string())),
        map(|i| call("MIN", i), |f| Accumulator::Min(f.to_string())),
        map(|i| call("MAX", i), |f| Accumulator::Max(f.to_string())),
    ))(input)
}

/// `NAME(field)` with optional inner whitespace
fn call<'a>(name: &'static str, input: &'a str) -> IResult<&'a str, &'a str> {
    let (input, _) = tuple((tag_no_case(name), multispace0, char('('), multispace0))(input)?;
    let (input, field) = field_name(input)?;
    let (input, _) = pair(multispace0, char(')'))(input)?;
    Ok((input, field))
}

fn sort_stage(input: &str) -> IResult<&str, Stage> {
    let (input, _) = pair(tag_no_case("SORT"), multispace1)(input)?;
    let (input, _) = opt(pair(tag_no_case("BY"), multispace1))(input)?;
    let (input, key) = sort_key(input)?;
    Ok((input, Stage::Sort(key)))
}

fn limit_stage(input: &str) -> IResult<&str, Stage> {
    let (input, _) = pair(tag_no_case("LIMIT"), multispace1)(input)?;
    let (input, n) = map_res(digit1, str::parse::<usize>)(input)?;
    Ok((input, Stage::Limit(n)))
}

// ============================================================================
// Primitives
// ============================================================================

fn comma(input: &str) -> IResult<&str, ()> {
    value((), tuple((multispace0, char(','), multispace0)))(input)
}

/// A comma or plain whitespace between list items
fn list_sep(input: &str) -> IResult<&str, ()> {
    alt((comma, value((), multispace1)))(input)
}

fn field_name(input: &str) -> IResult<&str, &str> {
    take_while1(|c: char| c.is_alphanumeric() || c == '_' || c == '.')(input)
}

fn literal(input: &str) -> IResult<&str, Literal> {
    alt((
        value(Literal::Null, tag_no_case("NULL")),
        value(Literal::Bool(true), tag_no_case("true")),
        value(Literal::Bool(false), tag_no_case("false")),
        map(float, Literal::Float),
        map(integer, Literal::Int),
        map(string_literal, Literal::String),
        map(array_literal, Literal::Array),
    ))(input)
}

fn integer(input: &str) -> IResult<&str, i64> {
    map_res(recognize(pair(opt(char('-')), digit1)), str::parse::<i64>)(input)
}

fn float(input: &str) -> IResult<&str, f64> {
    map_res(
        recognize(tuple((opt(char('-')), digit1, char('.'), digit1))),
        str::parse::<f64>,
    )(input)
}

fn string_literal(input: &str) -> IResult<&str, String> {
    alt((
        delimited(
            char('\''),
            map(
                many0(alt((
                    map(tag("''"), |_| "'".to_string()),
                    map(none_of("'"), |c| c.to_string()),
                ))),
                |v| v.join(""),
            ),
            char('\''),
        ),
        delimited(
            char('"'),
            map(
                many0(alt((
                    map(tag("\\\""), |_| "\"".to_string()),
                    map(tag("\\\\"), |_| "\\".to_string()),
                    map(none_of("\"\\"), |c| c.to_string()),
                ))),
                |v| v.join(""),
            ),
            char('"'),
        ),
    ))(input)
}

fn array_literal(input: &str) -> IResult<&str, Vec<Literal>> {
    delimited(
        pair(char('['), multispace0),
        separated_list0(comma, literal),
        pair(multispace0, char(']')),
    )(input)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_equality_filter() {
        let filter = parse_filter("genre = 'Fiction'").unwrap();
        assert_eq!(filter, Filter::all().eq("genre", "Fiction"));
    }

    #[test]
    fn test_parse_conjunction() {
        let filter = parse_filter("in_stock = true AND published_year > 2010").unwrap();
        assert_eq!(filter.clauses.len(), 2);
        assert_eq!(
            filter.predicate("published_year"),
            Some(&FieldPredicate::GreaterThan(Literal::Int(2010)))
        );
    }

    #[test]
    fn test_parse_between_in_and_like() {
        let filter = parse_filter(
            "published_year BETWEEN 1900 AND 1950 AND genre IN ('Fiction', 'Dystopian') AND title LIKE 'The%'",
        )
        .unwrap();
        assert_eq!(filter.clauses.len(), 3);
        assert!(matches!(filter.predicate("published_year"), Some(FieldPredicate::And(v)) if v.len() == 2));
        assert!(matches!(filter.predicate("genre"), Some(FieldPredicate::In(v)) if v.len() == 2));
        assert_eq!(filter.predicate("title"), Some(&FieldPredicate::Like("The%".into())));
    }

    #[test]
    fn test_parse_empty_filter() {
        assert!(parse_filter("").unwrap().is_empty());
        assert!(parse_filter(" * ").unwrap().is_empty());
    }

    #[test]
    fn test_filter_trailing_input_rejected() {
        let err = parse_filter("genre = 'Fiction' OR genre = 'Fantasy'").unwrap_err();
        assert_eq!(err.context, Some("filter"));
        assert!(err.message.contains("trailing"));
    }

    #[test]
    fn test_parse_changes() {
        let changes = parse_changes("price = 15.99, in_stock = false").unwrap();
        assert_eq!(changes, Changes::new().set("price", 15.99).set("in_stock", false));
    }

    #[test]
    fn test_parse_sort_and_projection() {
        assert_eq!(parse_sort("price DESC").unwrap(), SortKey::desc("price"));
        assert_eq!(parse_sort("price").unwrap(), SortKey::asc("price"));

        let projection = parse_projection("title, author, price, -_id").unwrap();
        assert_eq!(projection.fields, vec!["title", "author", "price"]);
        assert!(!projection.include_id);
    }

    #[test]
    fn test_parse_group_pipeline() {
        let stages = parse_pipeline("GROUP BY author COUNT() AS count | SORT count DESC | LIMIT 1").unwrap();
        assert_eq!(stages, vec![
            Stage::group_by(GroupKey::field("author")).accumulate("count", Accumulator::Count),
            Stage::Sort(SortKey::desc("count")),
            Stage::Limit(1),
        ]);
    }

    #[test]
    fn test_parse_decade_bucket() {
        let stages = parse_pipeline("GROUP BY FLOOR(published_year / 10) AS decade COUNT(*) | SORT decade").unwrap();
        assert_eq!(stages[0], Stage::group_by(GroupKey::floor_div("published_year", 10, "decade"))
            .accumulate("count", Accumulator::Count));
    }

    #[test]
    fn test_parse_multiple_accumulators() {
        let stages = parse_pipeline("GROUP BY genre AVG(price) AS avgPrice, SUM(price), MAX(published_year)").unwrap();
        if let Stage::GroupBy { accumulators, .. } = &stages[0] {
            let names: Vec<_> = accumulators.iter().map(|(n, _)| n.as_str()).collect();
            assert_eq!(names, vec!["avgPrice", "sum_price", "max_published_year"]);
        } else {
            panic!("Expected GroupBy");
        }
    }

    #[test]
    fn test_parse_unknown_stage_rejected() {
        assert!(parse_pipeline("UNWIND tags").is_err());
        assert!(parse_pipeline("").unwrap().is_empty());
    }

    #[test]
    fn test_parse_index_fields() {
        let fields = parse_index_fields("author ASC, published_year -1").unwrap();
        assert_eq!(fields, vec![IndexField::asc("author"), IndexField::desc("published_year")]);
    }
}
