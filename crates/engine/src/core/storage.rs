//! Storage collaborator traits.
//!
//! The engine never touches the document store directly. Searches go through
//! [`StorageQuery`], which executes [`QueryPlan`]s against the store's
//! structured secondary index and full-text index; writes go through
//! [`StorageCrud`].

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use serde_json::Value;

use crate::error::StorageResult;
use crate::search::QueryPlan;
use crate::types::{PageInfo, PageRequest, ResourceRef, StoredDocument, WriteOutcome};

/// The matches of one search page.
///
/// Owned by one request and discarded once the Bundle is assembled.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SearchResult {
    /// Primary matches of this page, in sort order.
    pub primary_ids: Vec<ResourceRef>,

    /// Resources added by `_include` / `_revinclude`, by type.
    pub included_by_type: BTreeMap<String, BTreeSet<ResourceRef>>,

    /// Total number of primary matches across all pages.
    pub total: u64,

    /// Cursors for the neighbouring pages.
    pub page: PageInfo,
}

impl SearchResult {
    /// Number of included resources across all types.
    pub fn included_count(&self) -> usize {
        self.included_by_type.values().map(BTreeSet::len).sum()
    }
}

/// Resource bodies fetched for one request, keyed by reference.
#[derive(Debug, Clone, Default)]
pub struct DocumentSet {
    documents: BTreeMap<ResourceRef, StoredDocument>,
}

impl DocumentSet {
    /// Creates an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a document, replacing any body already held for it.
    pub fn insert(&mut self, document: StoredDocument) {
        self.documents.insert(document.reference(), document);
    }

    /// Returns the body for a reference.
    pub fn get(&self, reference: &ResourceRef) -> Option<&StoredDocument> {
        self.documents.get(reference)
    }

    /// Returns true if the set holds a body for the reference.
    pub fn contains(&self, reference: &ResourceRef) -> bool {
        self.documents.contains_key(reference)
    }

    /// Returns the number of documents.
    pub fn len(&self) -> usize {
        self.documents.len()
    }

    /// Returns true if the set is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Iterates over the documents in reference order.
    pub fn iter(&self) -> impl Iterator<Item = &StoredDocument> {
        self.documents.values()
    }
}

impl Extend<StoredDocument> for DocumentSet {
    fn extend<T: IntoIterator<Item = StoredDocument>>(&mut self, iter: T) {
        for document in iter {
            self.insert(document);
        }
    }
}

impl FromIterator<StoredDocument> for DocumentSet {
    fn from_iter<T: IntoIterator<Item = StoredDocument>>(iter: T) -> Self {
        let mut set = DocumentSet::new();
        set.extend(iter);
        set
    }
}

/// Query side of the document store.
///
/// Every method receives a fully bound plan: chained sub-plans have already
/// been replaced by membership predicates (see [`QueryPlan::bind_chains`]).
/// Implementations evaluate structured predicates on the secondary index and
/// full-text clauses on the text index, and combine them with AND.
#[async_trait]
pub trait StorageQuery: Send + Sync {
    /// Returns a human-readable name for this backend.
    fn backend_name(&self) -> &'static str;

    /// Executes a plan and returns one page of primary matches.
    ///
    /// Ordering follows `plan.sort`. When `page.cursor` is set the page starts
    /// strictly after (or ends strictly before) the cursor position, and
    /// `page.offset` is ignored.
    async fn execute(&self, plan: &QueryPlan, page: &PageRequest) -> StorageResult<SearchResult>;

    /// Counts the matches of a plan without reading any bodies.
    async fn count(&self, plan: &QueryPlan) -> StorageResult<u64>;

    /// Returns up to `limit` references matching a plan, in any order.
    async fn collect_refs(&self, plan: &QueryPlan, limit: usize)
    -> StorageResult<Vec<ResourceRef>>;

    /// Runs a plan and returns the `target_type` resources that matching
    /// documents reference at `paths`, up to `limit`.
    ///
    /// Used to answer `_has` reverse chains.
    async fn collect_referenced(
        &self,
        plan: &QueryPlan,
        paths: &[String],
        target_type: &str,
        limit: usize,
    ) -> StorageResult<Vec<ResourceRef>>;

    /// Fetches bodies of one type by id in a single round trip. Missing ids
    /// are skipped.
    async fn fetch_batch(
        &self,
        resource_type: &str,
        ids: &[String],
    ) -> StorageResult<Vec<StoredDocument>>;

    /// Runs a plan and returns up to `limit` matching bodies.
    async fn search_documents(
        &self,
        plan: &QueryPlan,
        limit: usize,
    ) -> StorageResult<Vec<StoredDocument>>;
}

/// Write side of the document store.
///
/// Each call is atomic on its own; the store offers nothing across calls.
#[async_trait]
pub trait StorageCrud: Send + Sync {
    /// Creates a resource. With `id` the resource is created under that id,
    /// failing with `Conflict` if it exists.
    async fn create(
        &self,
        resource_type: &str,
        id: Option<&str>,
        document: Value,
    ) -> StorageResult<WriteOutcome>;

    /// Reads the current version of a resource.
    async fn read(&self, resource_type: &str, id: &str) -> StorageResult<StoredDocument>;

    /// Replaces a resource, creating it if it does not exist
    /// (`WriteOutcome::created` tells which).
    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        document: Value,
    ) -> StorageResult<WriteOutcome>;

    /// Deletes a resource.
    async fn delete(&self, resource_type: &str, id: &str) -> StorageResult<()>;
}
