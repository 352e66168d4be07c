//! Query descriptions understood by the shelfdb query runner

use serde::{Deserialize, Serialize};

/// Name of the identity field every stored record carries
pub const ID_FIELD: &str = "_id";

/// Literal values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Array(Vec<Literal>),
}

impl Literal {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Literal::Int(_) | Literal::Float(_))
    }

    /// True for literals that have a meaningful ordering (numbers and strings)
    pub fn is_orderable(&self) -> bool {
        matches!(self, Literal::Int(_) | Literal::Float(_) | Literal::String(_))
    }

    /// Short type name for error messages
    pub fn type_name(&self) -> &'static str {
        match self {
            Literal::Null => "null",
            Literal::Bool(_) => "bool",
            Literal::Int(_) => "int",
            Literal::Float(_) => "float",
            Literal::String(_) => "string",
            Literal::Array(_) => "array",
        }
    }
}

impl From<&str> for Literal {
    fn from(s: &str) -> Self {
        Literal::String(s.to_string())
    }
}

impl From<String> for Literal {
    fn from(s: String) -> Self {
        Literal::String(s)
    }
}

impl From<i64> for Literal {
    fn from(i: i64) -> Self {
        Literal::Int(i)
    }
}

impl From<i32> for Literal {
    fn from(i: i32) -> Self {
        Literal::Int(i as i64)
    }
}

impl From<f64> for Literal {
    fn from(f: f64) -> Self {
        Literal::Float(f)
    }
}

impl From<bool> for Literal {
    fn from(b: bool) -> Self {
        Literal::Bool(b)
    }
}

impl From<&Literal> for serde_json::Value {
    fn from(lit: &Literal) -> Self {
        match lit {
            Literal::Null => serde_json::Value::Null,
            Literal::Bool(b) => serde_json::Value::Bool(*b),
            Literal::Int(i) => serde_json::Value::Number((*i).into()),
            Literal::Float(f) => serde_json::Number::from_f64(*f)
                .map(serde_json::Value::Number)
                .unwrap_or(serde_json::Value::Null),
            Literal::String(s) => serde_json::Value::String(s.clone()),
            Literal::Array(arr) => serde_json::Value::Array(arr.iter().map(Into::into).collect()),
        }
    }
}

/// A condition on a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FieldPredicate {
    Equals(Literal),
    NotEquals(Literal),
    GreaterThan(Literal),
    GreaterOrEqual(Literal),
    LessThan(Literal),
    LessOrEqual(Literal),
    /// Field value equals one of the listed values
    In(Vec<Literal>),
    /// Anchored pattern match: `%` is any run, `_` is one character
    Like(String),
    /// Every inner predicate must hold
    And(Vec<FieldPredicate>),
}

impl FieldPredicate {
    /// Operator name used in explain output
    pub fn op_name(&self) -> &'static str {
        match self {
            FieldPredicate::Equals(_) => "$eq",
            FieldPredicate::NotEquals(_) => "$ne",
            FieldPredicate::GreaterThan(_) => "$gt",
            FieldPredicate::GreaterOrEqual(_) => "$gte",
            FieldPredicate::LessThan(_) => "$lt",
            FieldPredicate::LessOrEqual(_) => "$lte",
            FieldPredicate::In(_) => "$in",
            FieldPredicate::Like(_) => "$regex",
            FieldPredicate::And(_) => "$and",
        }
    }

    /// True for predicates an ordered index can answer by a key range
    pub fn is_index_bounded(&self) -> bool {
        match self {
            FieldPredicate::Equals(_)
            | FieldPredicate::GreaterThan(_)
            | FieldPredicate::GreaterOrEqual(_)
            | FieldPredicate::LessThan(_)
            | FieldPredicate::LessOrEqual(_)
            | FieldPredicate::In(_) => true,
            FieldPredicate::And(inner) => inner.iter().any(FieldPredicate::is_index_bounded),
            FieldPredicate::NotEquals(_) | FieldPredicate::Like(_) => false,
        }
    }

    /// True if the predicate pins the field to a single value
    pub fn is_equality(&self) -> bool {
        match self {
            FieldPredicate::Equals(_) => true,
            FieldPredicate::And(inner) => inner.iter().any(FieldPredicate::is_equality),
            _ => false,
        }
    }

    /// Combine two predicates on the same field
    pub fn and(self, other: FieldPredicate) -> FieldPredicate {
        match self {
            FieldPredicate::And(mut inner) => {
                inner.push(other);
                FieldPredicate::And(inner)
            }
            first => FieldPredicate::And(vec![first, other]),
        }
    }
}

/// A conjunction of field predicates
///
/// The empty filter matches every record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub clauses: Vec<(String, FieldPredicate)>,
}

impl Filter {
    /// Filter matching every record
    pub fn all() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.clauses.is_empty()
    }

    /// Add a clause. A second clause on the same field is folded into `And`.
    pub fn with(mut self, field: impl Into<String>, predicate: FieldPredicate) -> Self {
        let field = field.into();
        if let Some(pos) = self.clauses.iter().position(|(f, _)| *f == field) {
            let (_, existing) = self.clauses.remove(pos);
            self.clauses.insert(pos, (field, existing.and(predicate)));
        } else {
            self.clauses.push((field, predicate));
        }
        self
    }

    pub fn eq(self, field: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.with(field, FieldPredicate::Equals(value.into()))
    }

    pub fn ne(self, field: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.with(field, FieldPredicate::NotEquals(value.into()))
    }

    pub fn gt(self, field: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.with(field, FieldPredicate::GreaterThan(value.into()))
    }

    pub fn gte(self, field: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.with(field, FieldPredicate::GreaterOrEqual(value.into()))
    }

    pub fn lt(self, field: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.with(field, FieldPredicate::LessThan(value.into()))
    }

    pub fn lte(self, field: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.with(field, FieldPredicate::LessOrEqual(value.into()))
    }

    pub fn is_in<I, L>(self, field: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: Into<Literal>,
    {
        self.with(field, FieldPredicate::In(values.into_iter().map(Into::into).collect()))
    }

    pub fn like(self, field: impl Into<String>, pattern: impl Into<String>) -> Self {
        self.with(field, FieldPredicate::Like(pattern.into()))
    }

    /// Predicate on a field, if the filter constrains it
    pub fn predicate(&self, field: &str) -> Option<&FieldPredicate> {
        self.clauses.iter().find(|(f, _)| f == field).map(|(_, p)| p)
    }
}

/// Field assignments applied as a partial merge
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Changes {
    pub set: Vec<(String, Literal)>,
}

impl Changes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(mut self, field: impl Into<String>, value: impl Into<Literal>) -> Self {
        self.set.push((field.into(), value.into()));
        self
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl Default for SortDirection {
    fn default() -> Self {
        Self::Ascending
    }
}

impl SortDirection {
    /// Index key pattern value (`1` / `-1`)
    pub fn as_index_value(&self) -> i32 {
        match self {
            SortDirection::Ascending => 1,
            SortDirection::Descending => -1,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "ASC",
            SortDirection::Descending => "DESC",
        }
    }
}

/// Sort by a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SortKey {
    pub field: String,
    pub direction: SortDirection,
}

impl SortKey {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Ascending }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Descending }
    }
}

/// Field subset returned by a projection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Projection {
    pub fields: Vec<String>,
    /// Whether `_id` is included (defaults to true)
    pub include_id: bool,
}

impl Projection {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            fields: fields.into_iter().map(Into::into).collect(),
            include_id: true,
        }
    }

    pub fn without_id(mut self) -> Self {
        self.include_id = false;
        self
    }
}

/// Grouping key expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum KeyExpr {
    /// Direct field reference
    Field(String),
    /// `floor(field / divisor)`, e.g. decade bucketing of a year
    FloorDiv { field: String, divisor: i64 },
}

impl KeyExpr {
    pub fn field(&self) -> &str {
        match self {
            KeyExpr::Field(f) => f,
            KeyExpr::FloorDiv { field, .. } => field,
        }
    }
}

/// Grouping key with the name it gets in output records
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupKey {
    pub name: String,
    pub expr: KeyExpr,
}

impl GroupKey {
    /// Group by a field; the output key keeps the field's name
    pub fn field(field: impl Into<String>) -> Self {
        let field = field.into();
        Self { name: field.clone(), expr: KeyExpr::Field(field) }
    }

    pub fn floor_div(field: impl Into<String>, divisor: i64, name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            expr: KeyExpr::FloorDiv { field: field.into(), divisor },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Accumulator {
    Count,
    Sum(String),
    Average(String),
    Min(String),
    Max(String),
}

impl Accumulator {
    /// Field the accumulator reads, if any
    pub fn field(&self) -> Option<&str> {
        match self {
            Accumulator::Count => None,
            Accumulator::Sum(f) | Accumulator::Average(f) | Accumulator::Min(f) | Accumulator::Max(f) => Some(f),
        }
    }
}

/// One aggregation pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Stage {
    GroupBy {
        key: GroupKey,
        accumulators: Vec<(String, Accumulator)>,
    },
    Sort(SortKey),
    Limit(usize),
}

impl Stage {
    pub fn group_by(key: GroupKey) -> Self {
        Stage::GroupBy { key, accumulators: Vec::new() }
    }

    /// Add an accumulator to a `GroupBy` stage; other stages are returned unchanged
    pub fn accumulate(self, name: impl Into<String>, acc: Accumulator) -> Self {
        match self {
            Stage::GroupBy { key, mut accumulators } => {
                accumulators.push((name.into(), acc));
                Stage::GroupBy { key, accumulators }
            }
            other => other,
        }
    }

    pub fn sort(key: SortKey) -> Self {
        Stage::Sort(key)
    }

    pub fn limit(n: usize) -> Self {
        Stage::Limit(n)
    }
}

/// One field of an index declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexField {
    pub field: String,
    pub direction: SortDirection,
}

impl IndexField {
    pub fn asc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Ascending }
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self { field: field.into(), direction: SortDirection::Descending }
    }
}
