//! shelfql - query descriptions for the shelfdb record store
//!
//! The AST types describe filters, projections, sorts, aggregation
//! pipelines and index declarations. The parser reads their textual form,
//! which is what the `shelf` CLI accepts.
//!
//! # Syntax Overview
//!
//! ```text
//! -- Filters: a conjunction of field clauses
//! genre = 'Fiction'
//! in_stock = true AND published_year > 2010
//! published_year BETWEEN 1900 AND 1950 AND title LIKE 'The%'
//! genre IN ('Fiction', 'Dystopian')
//!
//! -- Changes applied by an update
//! price = 15.99, in_stock = false
//!
//! -- Projection (drop the identity field with -_id)
//! title, author, price, -_id
//!
//! -- Aggregation pipelines
//! GROUP BY genre AVG(price) AS avgPrice
//! GROUP BY author COUNT() AS count | SORT count DESC | LIMIT 1
//! GROUP BY FLOOR(published_year / 10) AS decade COUNT() | SORT decade ASC
//!
//! -- Index declarations
//! author ASC, published_year ASC
//! ```

mod ast;
mod error;
mod parser;

pub use ast::*;
pub use error::ParseError;
pub use parser::{
    parse_changes, parse_filter, parse_index_fields, parse_pipeline, parse_projection, parse_sort,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_filter_entry_point() {
        let filter = parse_filter("author = 'Harper Lee'").unwrap();
        assert_eq!(filter.predicate("author"), Some(&FieldPredicate::Equals("Harper Lee".into())));
    }

    #[test]
    fn test_parse_error_display() {
        let err = parse_filter("published_year >").unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("invalid filter"));
    }

    #[test]
    fn test_pipeline_serializes() {
        let stages = parse_pipeline("GROUP BY genre AVG(price) AS avgPrice | LIMIT 3").unwrap();
        let json = serde_json::to_string(&stages).unwrap();
        let back: Vec<Stage> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, stages);
    }
}
