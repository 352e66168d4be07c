//! Explain output for filters
//!
//! Index selection is deterministic: an index is a candidate when the
//! filter bounds its leading field. Candidates are ranked by an equality on
//! the leading field, then by how many key fields in a row the filter
//! bounds, then by name. The winner becomes an `IXSCAN`; with no candidate
//! the plan is a `COLLSCAN`.

use std::fmt;

use serde::Serialize;
use shelfql::{FieldPredicate, Filter};

use super::IndexSpec;
use crate::query::filter::{matches, predicate_holds};
use crate::storage::document::Document;

/// Scan stage of the winning plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScanStage {
    #[serde(rename = "IXSCAN")]
    IndexScan,
    #[serde(rename = "COLLSCAN")]
    CollectionScan,
}

impl ScanStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStage::IndexScan => "IXSCAN",
            ScanStage::CollectionScan => "COLLSCAN",
        }
    }
}

/// An index that was considered and not used
#[derive(Debug, Clone, Serialize)]
pub struct RejectedPlan {
    pub index: String,
    pub key_pattern: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionStats {
    pub keys_examined: usize,
    pub documents_examined: usize,
    pub returned: usize,
}

/// Result of `explain_filter`
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionPlan {
    pub collection: String,
    /// One line per filter clause, e.g. `title $eq "Dune"`
    pub filter: Vec<String>,
    pub stage: ScanStage,
    pub index: Option<String>,
    pub key_pattern: Option<String>,
    pub rejected_plans: Vec<RejectedPlan>,
    pub stats: ExecutionStats,
}

/// Rank used to pick among candidate indexes; higher wins
fn score(filter: &Filter, index: &IndexSpec) -> Option<(bool, usize)> {
    let leading = filter.predicate(index.leading_field()?)?;
    if !leading.is_index_bounded() {
        return None;
    }
    let bounded_prefix = index
        .fields
        .iter()
        .take_while(|f| {
            filter
                .predicate(&f.field)
                .map(FieldPredicate::is_index_bounded)
                .unwrap_or(false)
        })
        .count();
    Some((leading.is_equality(), bounded_prefix))
}

/// Pick the index a filter would use
pub fn choose_index<'a>(filter: &Filter, indexes: &'a [IndexSpec]) -> (Option<&'a IndexSpec>, Vec<RejectedPlan>) {
    let mut candidates: Vec<(&IndexSpec, (bool, usize))> = indexes
        .iter()
        .filter_map(|index| score(filter, index).map(|s| (index, s)))
        .collect();
    candidates.sort_by(|(a, sa), (b, sb)| sb.cmp(sa).then_with(|| a.name.cmp(&b.name)));

    let winner = candidates.first().map(|(index, _)| *index);

    let rejected = indexes
        .iter()
        .filter(|index| Some(index.name.as_str()) != winner.map(|w| w.name.as_str()))
        .map(|index| {
            let reason = match (score(filter, index), winner) {
                (Some(_), Some(w)) => format!("outranked by {}", w.name),
                _ => format!(
                    "leading field '{}' is not bounded by the filter",
                    index.leading_field().unwrap_or_default()
                ),
            };
            RejectedPlan {
                index: index.name.clone(),
                key_pattern: index.key_pattern().to_string(),
                reason,
            }
        })
        .collect();

    (winner, rejected)
}

impl ExecutionPlan {
    /// Plan a filter and run it over `docs` to collect statistics
    pub fn build(collection: &str, filter: &Filter, indexes: &[IndexSpec], docs: &[Document]) -> Self {
        let (winner, rejected_plans) = choose_index(filter, indexes);
        let returned = docs.iter().filter(|doc| matches(filter, doc)).count();

        let stats = match winner.and_then(|index| {
            let field = index.leading_field()?;
            Some((field, filter.predicate(field)?))
        }) {
            Some((field, leading)) => {
                // Keys in range for the leading field; each one fetches its record
                let keys = docs
                    .iter()
                    .filter(|doc| predicate_holds(leading, doc.lookup(field).as_ref()))
                    .count();
                ExecutionStats {
                    keys_examined: keys,
                    documents_examined: keys,
                    returned,
                }
            }
            None => ExecutionStats {
                keys_examined: 0,
                documents_examined: docs.len(),
                returned,
            },
        };

        Self {
            collection: collection.to_string(),
            filter: filter
                .clauses
                .iter()
                .map(|(field, predicate)| describe(field, predicate))
                .collect(),
            stage: if winner.is_some() {
                ScanStage::IndexScan
            } else {
                ScanStage::CollectionScan
            },
            index: winner.map(|w| w.name.clone()),
            key_pattern: winner.map(|w| w.key_pattern().to_string()),
            rejected_plans,
            stats,
        }
    }
}

fn describe(field: &str, predicate: &FieldPredicate) -> String {
    match predicate {
        FieldPredicate::Equals(lit)
        | FieldPredicate::NotEquals(lit)
        | FieldPredicate::GreaterThan(lit)
        | FieldPredicate::GreaterOrEqual(lit)
        | FieldPredicate::LessThan(lit)
        | FieldPredicate::LessOrEqual(lit) => {
            format!("{} {} {}", field, predicate.op_name(), serde_json::Value::from(lit))
        }
        FieldPredicate::In(options) => {
            let list: Vec<serde_json::Value> = options.iter().map(Into::into).collect();
            format!("{} $in {}", field, serde_json::Value::Array(list))
        }
        FieldPredicate::Like(pattern) => format!("{} $regex {:?}", field, pattern),
        FieldPredicate::And(inner) => inner
            .iter()
            .map(|p| describe(field, p))
            .collect::<Vec<_>>()
            .join(" AND "),
    }
}

impl fmt::Display for ExecutionPlan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== EXPLAIN: {} ===", self.collection)?;

        if self.filter.is_empty() {
            writeln!(f, "Filter: (all records)")?;
        } else {
            writeln!(f, "Filter:")?;
            for clause in &self.filter {
                writeln!(f, "  - {}", clause)?;
            }
        }

        match (&self.index, &self.key_pattern) {
            (Some(index), Some(pattern)) => {
                writeln!(f, "Winning plan: FETCH <- {} {} {}", self.stage.as_str(), index, pattern)?
            }
            _ => writeln!(f, "Winning plan: {}", self.stage.as_str())?,
        }

        if !self.rejected_plans.is_empty() {
            writeln!(f, "Rejected plans:")?;
            for plan in &self.rejected_plans {
                writeln!(f, "  - {} {}: {}", plan.index, plan.key_pattern, plan.reason)?;
            }
        }

        writeln!(f, "Execution stats:")?;
        writeln!(f, "  keys examined: {}", self.stats.keys_examined)?;
        writeln!(f, "  documents examined: {}", self.stats.documents_examined)?;
        writeln!(f, "  returned: {}", self.stats.returned)?;

        Ok(())
    }
}
