//! QueryRunner - queries, updates, aggregations and index declarations
//! against one record store
//!
//! The runner holds no state between calls. Every operation validates its
//! description first, then reads the store, and returns a fully
//! materialized result.

use serde::Serialize;
use shelfql::{Changes, Filter, IndexField, Projection, SortDirection, SortKey, Stage, ID_FIELD};

use super::{aggregate, filter};
use crate::error::{Error, Result};
use crate::index::explain::ExecutionPlan;
use crate::index::{self, IndexHandle, IndexOutcome, IndexSpec};
use crate::schema::{FieldType, Schema};
use crate::storage::document::{Document, Fields, Value};
use crate::storage::RecordStore;

/// Result of `update_one`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UpdateOutcome {
    pub matched: bool,
    pub modified: bool,
    /// Id of the matched record
    pub id: Option<String>,
}

/// Result of `delete_one`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeleteOutcome {
    /// 0 or 1
    pub deleted: usize,
    pub id: Option<String>,
}

pub struct QueryRunner<'a, S: RecordStore> {
    store: &'a S,
    schema: Schema,
}

impl<'a, S: RecordStore> QueryRunner<'a, S> {
    pub fn new(store: &'a S, schema: Schema) -> Self {
        Self { store, schema }
    }

    /// Runner with no declared field types
    pub fn untyped(store: &'a S) -> Self {
        let schema = Schema::new(store.name());
        Self { store, schema }
    }

    pub fn store(&self) -> &S {
        self.store
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn matching(&self, filter: &Filter) -> Result<Vec<Document>> {
        filter::validate(filter, &self.schema)?;
        let mut docs = self.store.scan().await?;
        docs.retain(|doc| filter::matches(filter, doc));
        Ok(docs)
    }

    /// All matching records in store order
    pub async fn find_by_filter(&self, filter: &Filter) -> Result<Vec<Document>> {
        let docs = self.matching(filter).await?;
        tracing::debug!("find on '{}' matched {} record(s)", self.store.name(), docs.len());
        Ok(docs)
    }

    /// Number of matching records
    pub async fn count(&self, filter: &Filter) -> Result<usize> {
        Ok(self.matching(filter).await?.len())
    }

    /// Matching records reduced to the requested fields
    pub async fn project(&self, filter: &Filter, projection: &Projection) -> Result<Vec<Fields>> {
        for field in &projection.fields {
            filter::check_field_name(field)?;
        }

        let docs = self.matching(filter).await?;
        let projected = docs
            .iter()
            .map(|doc| {
                let mut out = Fields::new();
                for field in &projection.fields {
                    if field == ID_FIELD && !projection.include_id {
                        continue;
                    }
                    if let Some(value) = doc.lookup(field) {
                        out.insert(field.clone(), value);
                    }
                }
                if projection.include_id {
                    out.insert(ID_FIELD.to_string(), Value::String(doc.id.clone()));
                }
                out
            })
            .collect::<Vec<_>>();

        tracing::debug!(
            "project on '{}' returned {} record(s) with {} field(s)",
            self.store.name(),
            projected.len(),
            projection.fields.len()
        );
        Ok(projected)
    }

    /// Matching records ordered by one field
    pub async fn sort(&self, filter: &Filter, key: &str, direction: SortDirection) -> Result<Vec<Document>> {
        filter::check_field_name(key)?;
        let mut docs = self.matching(filter).await?;
        sort_documents(&mut docs, key, direction);
        Ok(docs)
    }

    /// One page of matches in store order; pages start at 1
    pub async fn paginate(&self, filter: &Filter, page: usize, page_size: usize) -> Result<Vec<Document>> {
        check_page(page, page_size)?;
        let docs = self.matching(filter).await?;
        Ok(take_page(docs, page, page_size))
    }

    /// One page of matches after sorting
    pub async fn paginate_sorted(
        &self,
        filter: &Filter,
        sort: &SortKey,
        page: usize,
        page_size: usize,
    ) -> Result<Vec<Document>> {
        check_page(page, page_size)?;
        let docs = self.sort(filter, &sort.field, sort.direction).await?;
        Ok(take_page(docs, page, page_size))
    }

    /// Merge changes into the first matching record
    pub async fn update_one(&self, match_filter: &Filter, changes: &Changes) -> Result<UpdateOutcome> {
        for (field, lit) in &changes.set {
            filter::check_field_name(field)?;
            if field == ID_FIELD {
                return Err(Error::invalid_query("the _id field cannot be changed"));
            }
            filter::check_literal_type(field, lit, self.schema.field_type(field))?;
            self.check_parent_paths(field)?;
        }

        let Some(mut doc) = self.matching(match_filter).await?.into_iter().next() else {
            tracing::debug!("update on '{}' matched nothing", self.store.name());
            return Ok(UpdateOutcome {
                matched: false,
                modified: false,
                id: None,
            });
        };

        let mut modified = false;
        for (field, lit) in &changes.set {
            modified |= set_path(&mut doc.fields, field, Value::from(lit))?;
        }

        if modified {
            self.store.replace(&doc).await?;
            self.store
                .commit(&format!("UPDATE {}: {}", self.store.name(), doc.id))
                .await?;
        }

        tracing::debug!(
            "update on '{}' matched {} (modified: {})",
            self.store.name(),
            doc.id,
            modified
        );

        Ok(UpdateOutcome {
            matched: true,
            modified,
            id: Some(doc.id),
        })
    }

    /// A dotted change may only descend through fields declared as objects
    fn check_parent_paths(&self, path: &str) -> Result<()> {
        for (i, _) in path.match_indices('.') {
            let parent = &path[..i];
            if let Some(declared) = self.schema.field_type(parent) {
                if *declared != FieldType::Object {
                    return Err(Error::invalid_query(format!(
                        "cannot set '{}': field '{}' is declared {}",
                        path,
                        parent,
                        declared.as_str()
                    )));
                }
            }
        }
        Ok(())
    }

    /// Remove the first matching record
    pub async fn delete_one(&self, match_filter: &Filter) -> Result<DeleteOutcome> {
        let Some(doc) = self.matching(match_filter).await?.into_iter().next() else {
            return Ok(DeleteOutcome { deleted: 0, id: None });
        };

        let deleted = if self.store.remove(&doc.id).await? {
            self.store
                .commit(&format!("DELETE from {}: {}", self.store.name(), doc.id))
                .await?;
            1
        } else {
            0
        };

        tracing::debug!("delete on '{}' removed {} record(s)", self.store.name(), deleted);
        Ok(DeleteOutcome {
            deleted,
            id: Some(doc.id),
        })
    }

    /// Run an aggregation pipeline over every record
    pub async fn aggregate(&self, stages: &[Stage]) -> Result<Vec<Fields>> {
        aggregate::validate(stages, &self.schema)?;
        let records = self
            .store
            .scan()
            .await?
            .iter()
            .map(Document::to_record)
            .collect();
        let out = aggregate::run(records, stages);
        tracing::debug!(
            "aggregate on '{}' ran {} stage(s), {} result(s)",
            self.store.name(),
            stages.len(),
            out.len()
        );
        Ok(out)
    }

    /// Declare an index; declaring the same index again returns the existing one
    pub async fn create_index(&self, fields: Vec<IndexField>) -> Result<IndexOutcome> {
        let mut catalog = self.store.indexes().await?;
        let outcome = index::register(&mut catalog, fields)?;
        let name = &outcome.handle.name;

        if outcome.created {
            self.store.save_indexes(&catalog).await?;
            self.store
                .commit(&format!("CREATE INDEX {} on {}", name, self.store.name()))
                .await?;
            tracing::debug!("Created index {} on '{}'", name, self.store.name());
        } else {
            tracing::debug!("Index {} already exists on '{}'", name, self.store.name());
        }

        Ok(outcome)
    }

    pub async fn list_indexes(&self) -> Result<Vec<IndexHandle>> {
        Ok(self
            .store
            .indexes()
            .await?
            .iter()
            .map(IndexSpec::handle)
            .collect())
    }

    /// Remove an index by name, returning whether it existed
    pub async fn drop_index(&self, name: &str) -> Result<bool> {
        let mut catalog = self.store.indexes().await?;
        let before = catalog.len();
        catalog.retain(|spec| spec.name != name);
        if catalog.len() == before {
            return Ok(false);
        }

        self.store.save_indexes(&catalog).await?;
        self.store
            .commit(&format!("DROP INDEX {} on {}", name, self.store.name()))
            .await?;
        Ok(true)
    }

    /// Describe how a filter would be executed, with statistics from a real run
    pub async fn explain_filter(&self, filter: &Filter) -> Result<ExecutionPlan> {
        filter::validate(filter, &self.schema)?;
        let indexes = self.store.indexes().await?;
        let docs = self.store.scan().await?;
        Ok(ExecutionPlan::build(self.store.name(), filter, &indexes, &docs))
    }
}

fn check_page(page: usize, page_size: usize) -> Result<()> {
    if page == 0 {
        return Err(Error::invalid_query("page numbers start at 1"));
    }
    if page_size == 0 {
        return Err(Error::invalid_query("page size must be at least 1"));
    }
    Ok(())
}

fn take_page(docs: Vec<Document>, page: usize, page_size: usize) -> Vec<Document> {
    let skip = (page - 1).saturating_mul(page_size);
    docs.into_iter().skip(skip).take(page_size).collect()
}

fn sort_documents(docs: &mut [Document], key: &str, direction: SortDirection) {
    docs.sort_by(|a, b| {
        let cmp = aggregate::compare_optional(a.lookup(key).as_ref(), b.lookup(key).as_ref());
        match direction {
            SortDirection::Ascending => cmp,
            SortDirection::Descending => cmp.reverse(),
        }
    });
}

/// Assign a value at a (possibly dotted) path, returning whether anything changed
///
/// Missing parents are created as objects; an existing parent that holds
/// anything other than an object is left alone and the change is rejected.
fn set_path(fields: &mut Fields, path: &str, value: Value) -> Result<bool> {
    match path.split_once('.') {
        None => {
            if fields.get(path) == Some(&value) {
                return Ok(false);
            }
            fields.insert(path.to_string(), value);
            Ok(true)
        }
        Some((head, rest)) => {
            let entry = fields
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
            match entry {
                Value::Object(inner) => set_path(inner, rest, value),
                other => Err(Error::invalid_query(format!(
                    "cannot set '{}' inside '{}', which holds {}",
                    rest,
                    head,
                    other.type_name()
                ))),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStore;

    fn book(id: &str, title: &str, genre: &str, year: i64, price: f64) -> Document {
        let mut doc = Document::new(id);
        doc.set("title", title)
            .set("author", "Someone")
            .set("genre", genre)
            .set("published_year", year)
            .set("price", price)
            .set("in_stock", true);
        doc
    }

    fn store() -> MemoryStore {
        MemoryStore::from_documents(
            "books",
            vec![
                book("a", "Alpha", "Fiction", 1990, 12.0),
                book("b", "Beta", "Fiction", 2005, 8.5),
                book("c", "Gamma", "History", 2012, 30.0),
                book("d", "Delta", "Fiction", 2020, 15.0),
                book("e", "Epsilon", "History", 1970, 22.0),
            ],
        )
    }

    fn ids(docs: &[Document]) -> Vec<&str> {
        docs.iter().map(|d| d.id.as_str()).collect()
    }

    #[tokio::test]
    async fn test_find_and_zero_matches() {
        let store = store();
        let runner = QueryRunner::new(&store, Schema::books("books"));

        let fiction = runner.find_by_filter(&Filter::all().eq("genre", "Fiction")).await.unwrap();
        assert_eq!(ids(&fiction), vec!["a", "b", "d"]);

        let none = runner.find_by_filter(&Filter::all().eq("genre", "Poetry")).await.unwrap();
        assert!(none.is_empty());

        assert_eq!(runner.count(&Filter::all().eq("genre", "Fiction")).await.unwrap(), 3);
        assert_eq!(runner.count(&Filter::all().eq("genre", "Poetry")).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_projection() {
        let store = store();
        let runner = QueryRunner::new(&store, Schema::books("books"));

        let rows = runner
            .project(&Filter::all().eq("_id", "a"), &Projection::new(["title", "price", "isbn"]).without_id())
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].keys().collect::<Vec<_>>(), vec!["price", "title"]);

        let with_id = runner
            .project(&Filter::all().eq("_id", "a"), &Projection::new(["title"]))
            .await
            .unwrap();
        assert_eq!(with_id[0].get("_id"), Some(&Value::from("a")));
    }

    #[tokio::test]
    async fn test_sort_directions_mirror() {
        let store = store();
        let runner = QueryRunner::untyped(&store);

        let asc = runner.sort(&Filter::all(), "price", SortDirection::Ascending).await.unwrap();
        let mut desc = runner.sort(&Filter::all(), "price", SortDirection::Descending).await.unwrap();
        assert_eq!(ids(&asc), vec!["b", "a", "d", "e", "c"]);
        desc.reverse();
        assert_eq!(ids(&asc), ids(&desc));
    }

    #[tokio::test]
    async fn test_pages_are_disjoint() {
        let store = store();
        let runner = QueryRunner::untyped(&store);

        let first = runner.paginate(&Filter::all(), 1, 2).await.unwrap();
        let second = runner.paginate(&Filter::all(), 2, 2).await.unwrap();
        let third = runner.paginate(&Filter::all(), 3, 2).await.unwrap();
        let past = runner.paginate(&Filter::all(), 9, 2).await.unwrap();

        assert_eq!(ids(&first), vec!["a", "b"]);
        assert_eq!(ids(&second), vec!["c", "d"]);
        assert_eq!(ids(&third), vec!["e"]);
        assert!(past.is_empty());

        let sorted = runner
            .paginate_sorted(&Filter::all(), &SortKey::desc("price"), 1, 2)
            .await
            .unwrap();
        assert_eq!(ids(&sorted), vec!["c", "e"]);
    }

    #[tokio::test]
    async fn test_bad_pages_rejected() {
        let store = store();
        let runner = QueryRunner::untyped(&store);
        assert!(matches!(runner.paginate(&Filter::all(), 0, 5).await, Err(Error::InvalidQuery { .. })));
        assert!(matches!(runner.paginate(&Filter::all(), 1, 0).await, Err(Error::InvalidQuery { .. })));
    }

    #[tokio::test]
    async fn test_update_one() {
        let store = store();
        let runner = QueryRunner::new(&store, Schema::books("books"));

        let outcome = runner
            .update_one(&Filter::all().eq("title", "Beta"), &Changes::new().set("price", 9.99))
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome { matched: true, modified: true, id: Some("b".into()) });
        let b = store.get("b").await.unwrap().unwrap();
        assert_eq!(b.get("price"), Some(&Value::Float(9.99)));

        let again = runner
            .update_one(&Filter::all().eq("title", "Beta"), &Changes::new().set("price", 9.99))
            .await
            .unwrap();
        assert!(again.matched && !again.modified);

        let missing = runner
            .update_one(&Filter::all().eq("title", "Omega"), &Changes::new().set("price", 1.0))
            .await
            .unwrap();
        assert_eq!(missing, UpdateOutcome { matched: false, modified: false, id: None });
    }

    #[tokio::test]
    async fn test_update_rejects_bad_changes() {
        let store = store();
        let runner = QueryRunner::new(&store, Schema::books("books"));
        let by_title = Filter::all().eq("title", "Beta");

        for changes in [
            Changes::new().set("_id", "z"),
            Changes::new().set("price", "cheap"),
            Changes::new().set("bad field", 1),
        ] {
            let result = runner.update_one(&by_title, &changes).await;
            assert!(matches!(result, Err(Error::InvalidQuery { .. })), "{:?}", changes);
        }
    }

    #[tokio::test]
    async fn test_update_nested_path() {
        let store = store();
        let runner = QueryRunner::untyped(&store);
        runner
            .update_one(&Filter::all().eq("_id", "a"), &Changes::new().set("publisher.city", "London"))
            .await
            .unwrap();
        let a = store.get("a").await.unwrap().unwrap();
        assert_eq!(a.lookup("publisher.city"), Some(Value::from("London")));
    }

    #[tokio::test]
    async fn test_update_cannot_descend_into_scalars() {
        let store = store();
        let typed = QueryRunner::new(&store, Schema::books("books"));
        let by_id = Filter::all().eq("_id", "a");

        let declared = typed.update_one(&by_id, &Changes::new().set("price.x", 1)).await;
        assert!(matches!(declared, Err(Error::InvalidQuery { .. })));

        let untyped = QueryRunner::untyped(&store);
        let stored = untyped.update_one(&by_id, &Changes::new().set("title.x", 1)).await;
        assert!(matches!(stored, Err(Error::InvalidQuery { .. })));

        let a = store.get("a").await.unwrap().unwrap();
        assert_eq!(a.get("price"), Some(&Value::Float(12.0)));
        assert_eq!(a.get("title"), Some(&Value::from("Alpha")));
    }

    #[tokio::test]
    async fn test_delete_one() {
        let store = store();
        let runner = QueryRunner::untyped(&store);

        let outcome = runner.delete_one(&Filter::all().eq("genre", "History")).await.unwrap();
        assert_eq!(outcome, DeleteOutcome { deleted: 1, id: Some("c".into()) });
        assert_eq!(store.len(), 4);

        let none = runner.delete_one(&Filter::all().eq("genre", "Poetry")).await.unwrap();
        assert_eq!(none.deleted, 0);
    }

    #[tokio::test]
    async fn test_indexes() {
        let store = store();
        let runner = QueryRunner::untyped(&store);

        let first = runner.create_index(vec![IndexField::asc("title")]).await.unwrap();
        let second = runner.create_index(vec![IndexField::asc("title")]).await.unwrap();
        assert_eq!(first.handle.name, "title_1");
        assert_eq!(first.handle, second.handle);
        assert!(first.created && !second.created);
        assert_eq!(runner.list_indexes().await.unwrap(), vec![first.handle]);

        assert!(runner.drop_index("title_1").await.unwrap());
        assert!(!runner.drop_index("title_1").await.unwrap());
        assert!(runner.list_indexes().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_explain_uses_index() {
        let store = store();
        let runner = QueryRunner::untyped(&store);
        runner.create_index(vec![IndexField::asc("title")]).await.unwrap();

        let plan = runner.explain_filter(&Filter::all().eq("title", "Gamma")).await.unwrap();
        assert_eq!(plan.index.as_deref(), Some("title_1"));
        assert_eq!(plan.stats.returned, 1);
        assert_eq!(plan.stats.documents_examined, 1);
    }

    #[tokio::test]
    async fn test_unavailable_store() {
        let store = store();
        let runner = QueryRunner::untyped(&store);
        store.disconnect();

        assert!(matches!(
            runner.find_by_filter(&Filter::all()).await,
            Err(Error::StoreUnavailable { .. })
        ));
        assert!(matches!(runner.aggregate(&[]).await, Err(Error::StoreUnavailable { .. })));
        assert!(matches!(runner.list_indexes().await, Err(Error::StoreUnavailable { .. })));
    }

    #[tokio::test]
    async fn test_invalid_query_before_read() {
        let store = store();
        store.disconnect();
        let runner = QueryRunner::new(&store, Schema::books("books"));

        let result = runner.find_by_filter(&Filter::all().gt("title", "M")).await;
        assert!(matches!(result, Err(Error::InvalidQuery { .. })));
    }
}
