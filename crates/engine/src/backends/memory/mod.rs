//! In-memory reference store.
//!
//! [`MemoryStore`] implements both [`StorageQuery`] and [`StorageCrud`] over a
//! `parking_lot::RwLock`-guarded map. Plans are evaluated the way a document
//! store with a secondary index and a full-text index would answer them, so
//! the engine can be exercised end to end without a database.
//!
//! The store also supports fault injection (per resource type and operation)
//! and artificial latency, and counts body reads so tests can observe that a
//! request never fetched documents.
//!
//! ```
//! use helios_engine::backends::memory::MemoryStore;
//! use serde_json::json;
//!
//! let store = MemoryStore::new();
//! store
//!     .insert_json(json!({"resourceType": "Patient", "id": "p1", "gender": "female"}))
//!     .unwrap();
//! assert_eq!(store.len(), 1);
//! ```

mod eval;

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::core::{SearchResult, StorageCrud, StorageQuery, values_at};
use crate::error::{StorageError, StorageResult};
use crate::search::QueryPlan;
use crate::types::{
    CursorDirection, CursorValue, PageCursor, PageInfo, PageRequest, ResourceRef, StoredDocument,
    WriteOutcome, format_instant,
};

/// Operations a fault can be injected into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// `execute`, `count`, `collect_refs`, `collect_referenced`.
    Query,
    /// `fetch_batch`, `search_documents`, `read`.
    Fetch,
    /// `create`.
    Create,
    /// `update`.
    Update,
    /// `delete`.
    Delete,
}

/// In-memory document store.
#[derive(Debug, Default)]
pub struct MemoryStore {
    documents: RwLock<BTreeMap<ResourceRef, StoredDocument>>,
    faults: RwLock<HashSet<(Operation, String)>>,
    latency: RwLock<Option<Duration>>,
    body_reads: AtomicU64,
    queries: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads resources from JSON (an array, a Bundle, or a single resource)
    /// or NDJSON text.
    pub fn load_str(&self, text: &str) -> StorageResult<usize> {
        let trimmed = text.trim_start();
        let resources: Vec<Value> = if trimmed.starts_with('[') || trimmed.starts_with('{') {
            match serde_json::from_str::<Value>(text) {
                Ok(value) => flatten_resources(value),
                Err(_) => parse_ndjson(text)?,
            }
        } else {
            parse_ndjson(text)?
        };

        let count = resources.len();
        for resource in resources {
            self.insert_json(resource)?;
        }
        tracing::debug!(count, "Loaded resources into memory store");
        Ok(count)
    }

    /// Inserts or replaces a resource, keeping its `id`. A resource without an
    /// id gets a fresh one.
    pub fn insert_json(&self, resource: Value) -> StorageResult<ResourceRef> {
        let resource_type = resource_type_of(&resource)?;
        let id = resource
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let last_updated = resource
            .get("meta")
            .and_then(|m| m.get("lastUpdated"))
            .and_then(Value::as_str)
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc))
            .unwrap_or_else(Utc::now);
        let version = resource
            .get("meta")
            .and_then(|m| m.get("versionId"))
            .and_then(Value::as_str)
            .unwrap_or("1")
            .to_string();

        let document = stamp(&resource_type, &id, &version, last_updated, resource);
        let reference = document.reference();
        self.documents.write().insert(reference.clone(), document);
        Ok(reference)
    }

    /// Returns the current body of a resource without counting a read.
    pub fn get(&self, resource_type: &str, id: &str) -> Option<StoredDocument> {
        self.documents
            .read()
            .get(&ResourceRef::new(resource_type, id))
            .cloned()
    }

    /// Returns true if the resource exists.
    pub fn contains(&self, resource_type: &str, id: &str) -> bool {
        self.documents
            .read()
            .contains_key(&ResourceRef::new(resource_type, id))
    }

    /// Returns the number of stored resources.
    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    /// Returns true if the store is empty.
    pub fn is_empty(&self) -> bool {
        self.documents.read().is_empty()
    }

    /// Returns the number of stored resources of one type.
    pub fn count_type(&self, resource_type: &str) -> usize {
        self.documents
            .read()
            .keys()
            .filter(|r| r.resource_type == resource_type)
            .count()
    }

    /// Makes every `operation` on `resource_type` fail with `Unavailable`.
    pub fn inject_fault(&self, operation: Operation, resource_type: &str) {
        self.faults
            .write()
            .insert((operation, resource_type.to_string()));
    }

    /// Removes all injected faults.
    pub fn clear_faults(&self) {
        self.faults.write().clear();
    }

    /// Delays every storage call by `latency`.
    pub fn set_latency(&self, latency: Option<Duration>) {
        *self.latency.write() = latency;
    }

    /// Number of resource bodies handed out by `fetch_batch`,
    /// `search_documents`, `execute`-free reads, and `read`.
    pub fn body_reads(&self) -> u64 {
        self.body_reads.load(Ordering::Relaxed)
    }

    /// Number of query round trips served.
    pub fn query_count(&self) -> u64 {
        self.queries.load(Ordering::Relaxed)
    }

    async fn enter(&self, operation: Operation, resource_type: &str) -> StorageResult<()> {
        let latency = *self.latency.read();
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        if self
            .faults
            .read()
            .contains(&(operation, resource_type.to_string()))
        {
            return Err(StorageError::unavailable(format!(
                "injected {:?} fault for {}",
                operation, resource_type
            )));
        }
        Ok(())
    }

    /// Matching documents with their sort values, in plan order.
    fn matching(&self, plan: &QueryPlan) -> Vec<(Vec<CursorValue>, StoredDocument)> {
        let documents = self.documents.read();
        let mut rows: Vec<(Vec<CursorValue>, StoredDocument)> = documents
            .values()
            .filter(|d| d.resource_type() == plan.resource_type)
            .filter(|d| eval::matches_plan(plan, d.content()))
            .map(|d| (eval::sort_values(&plan.sort, d.content()), d.clone()))
            .collect();
        rows.sort_by(|a, b| eval::compare_rows(&plan.sort, &a.0, &b.0));
        rows
    }
}

#[async_trait]
impl StorageQuery for MemoryStore {
    fn backend_name(&self) -> &'static str {
        "memory"
    }

    async fn execute(&self, plan: &QueryPlan, page: &PageRequest) -> StorageResult<SearchResult> {
        self.enter(Operation::Query, &plan.resource_type).await?;
        self.queries.fetch_add(1, Ordering::Relaxed);

        let rows = self.matching(plan);
        let total = rows.len() as u64;
        let count = page.count as usize;

        let (start, end) = match &page.cursor {
            Some(cursor) => {
                if cursor.sort_values().len() != plan.sort.len() {
                    return Err(StorageError::InvalidDocument {
                        message: "page cursor does not match the sort order".to_string(),
                    });
                }
                let position = |row: &(Vec<CursorValue>, StoredDocument)| {
                    eval::compare_rows(&plan.sort, &row.0, cursor.sort_values())
                };
                match cursor.direction() {
                    CursorDirection::Next => {
                        let start = rows.partition_point(|r| position(r).is_le());
                        (start, (start + count).min(rows.len()))
                    }
                    CursorDirection::Previous => {
                        let end = rows.partition_point(|r| position(r).is_lt());
                        (end.saturating_sub(count), end)
                    }
                }
            }
            None => {
                let start = (page.offset as usize).min(rows.len());
                (start, (start + count).min(rows.len()))
            }
        };

        let slice = &rows[start..end];
        let mut info = PageInfo::end();
        if let Some((values, last)) = slice.last() {
            if end < rows.len() {
                info = info.with_next(PageCursor::new(values.clone(), last.id()));
            }
        }
        if let Some((values, first)) = slice.first() {
            if start > 0 {
                info = info.with_previous(PageCursor::previous(values.clone(), first.id()));
            }
        }

        Ok(SearchResult {
            primary_ids: slice.iter().map(|(_, d)| d.reference()).collect(),
            included_by_type: BTreeMap::new(),
            total,
            page: info,
        })
    }

    async fn count(&self, plan: &QueryPlan) -> StorageResult<u64> {
        self.enter(Operation::Query, &plan.resource_type).await?;
        self.queries.fetch_add(1, Ordering::Relaxed);
        let documents = self.documents.read();
        Ok(documents
            .values()
            .filter(|d| d.resource_type() == plan.resource_type)
            .filter(|d| eval::matches_plan(plan, d.content()))
            .count() as u64)
    }

    async fn collect_refs(
        &self,
        plan: &QueryPlan,
        limit: usize,
    ) -> StorageResult<Vec<ResourceRef>> {
        self.enter(Operation::Query, &plan.resource_type).await?;
        self.queries.fetch_add(1, Ordering::Relaxed);
        let documents = self.documents.read();
        Ok(documents
            .values()
            .filter(|d| d.resource_type() == plan.resource_type)
            .filter(|d| eval::matches_plan(plan, d.content()))
            .take(limit)
            .map(StoredDocument::reference)
            .collect())
    }

    async fn collect_referenced(
        &self,
        plan: &QueryPlan,
        paths: &[String],
        target_type: &str,
        limit: usize,
    ) -> StorageResult<Vec<ResourceRef>> {
        self.enter(Operation::Query, &plan.resource_type).await?;
        self.queries.fetch_add(1, Ordering::Relaxed);
        let documents = self.documents.read();

        let mut found = BTreeSet::new();
        for document in documents
            .values()
            .filter(|d| d.resource_type() == plan.resource_type)
            .filter(|d| eval::matches_plan(plan, d.content()))
        {
            for path in paths {
                for value in values_at(document.content(), path) {
                    let target = value
                        .get("reference")
                        .and_then(Value::as_str)
                        .and_then(ResourceRef::parse)
                        .filter(|r| r.resource_type == target_type);
                    if let Some(target) = target {
                        found.insert(target);
                        if found.len() >= limit {
                            return Ok(found.into_iter().collect());
                        }
                    }
                }
            }
        }
        Ok(found.into_iter().collect())
    }

    async fn fetch_batch(
        &self,
        resource_type: &str,
        ids: &[String],
    ) -> StorageResult<Vec<StoredDocument>> {
        self.enter(Operation::Fetch, resource_type).await?;
        let documents = self.documents.read();
        let found: Vec<StoredDocument> = ids
            .iter()
            .filter_map(|id| documents.get(&ResourceRef::new(resource_type, id)).cloned())
            .collect();
        self.body_reads
            .fetch_add(found.len() as u64, Ordering::Relaxed);
        Ok(found)
    }

    async fn search_documents(
        &self,
        plan: &QueryPlan,
        limit: usize,
    ) -> StorageResult<Vec<StoredDocument>> {
        self.enter(Operation::Fetch, &plan.resource_type).await?;
        self.queries.fetch_add(1, Ordering::Relaxed);
        let found: Vec<StoredDocument> = self
            .matching(plan)
            .into_iter()
            .take(limit)
            .map(|(_, d)| d)
            .collect();
        self.body_reads
            .fetch_add(found.len() as u64, Ordering::Relaxed);
        Ok(found)
    }
}

#[async_trait]
impl StorageCrud for MemoryStore {
    async fn create(
        &self,
        resource_type: &str,
        id: Option<&str>,
        document: Value,
    ) -> StorageResult<WriteOutcome> {
        self.enter(Operation::Create, resource_type).await?;
        check_type(resource_type, &document)?;

        let id = id
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        let reference = ResourceRef::new(resource_type, &id);

        let mut documents = self.documents.write();
        if documents.contains_key(&reference) {
            return Err(StorageError::Conflict {
                resource_type: resource_type.to_string(),
                id,
                message: "resource already exists".to_string(),
            });
        }
        let now = Utc::now();
        documents.insert(reference, stamp(resource_type, &id, "1", now, document));
        Ok(WriteOutcome {
            id,
            version_id: "1".to_string(),
            last_updated: now,
            created: true,
        })
    }

    async fn read(&self, resource_type: &str, id: &str) -> StorageResult<StoredDocument> {
        self.enter(Operation::Fetch, resource_type).await?;
        let document = self
            .get(resource_type, id)
            .ok_or_else(|| StorageError::NotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            })?;
        self.body_reads.fetch_add(1, Ordering::Relaxed);
        Ok(document)
    }

    async fn update(
        &self,
        resource_type: &str,
        id: &str,
        document: Value,
    ) -> StorageResult<WriteOutcome> {
        self.enter(Operation::Update, resource_type).await?;
        check_type(resource_type, &document)?;

        let reference = ResourceRef::new(resource_type, id);
        let mut documents = self.documents.write();
        let (version, created) = match documents.get(&reference) {
            Some(current) => {
                let previous: u64 = current.version_id().parse().unwrap_or(0);
                ((previous + 1).to_string(), false)
            }
            None => ("1".to_string(), true),
        };
        let now = Utc::now();
        documents.insert(reference, stamp(resource_type, id, &version, now, document));
        Ok(WriteOutcome {
            id: id.to_string(),
            version_id: version,
            last_updated: now,
            created,
        })
    }

    async fn delete(&self, resource_type: &str, id: &str) -> StorageResult<()> {
        self.enter(Operation::Delete, resource_type).await?;
        match self
            .documents
            .write()
            .remove(&ResourceRef::new(resource_type, id))
        {
            Some(_) => Ok(()),
            None => Err(StorageError::NotFound {
                resource_type: resource_type.to_string(),
                id: id.to_string(),
            }),
        }
    }
}

/// Sets `resourceType`, `id`, `meta.versionId` and `meta.lastUpdated`.
fn stamp(
    resource_type: &str,
    id: &str,
    version: &str,
    last_updated: DateTime<Utc>,
    mut content: Value,
) -> StoredDocument {
    if let Value::Object(map) = &mut content {
        map.insert("resourceType".to_string(), json!(resource_type));
        map.insert("id".to_string(), json!(id));
        let meta = map
            .entry("meta")
            .or_insert_with(|| Value::Object(Default::default()));
        if let Value::Object(meta) = meta {
            meta.insert("versionId".to_string(), json!(version));
            meta.insert("lastUpdated".to_string(), json!(format_instant(last_updated)));
        }
    }
    StoredDocument::new(resource_type, id, version, last_updated, content)
}

fn resource_type_of(resource: &Value) -> StorageResult<String> {
    resource
        .get("resourceType")
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| StorageError::InvalidDocument {
            message: "resource has no resourceType".to_string(),
        })
}

fn check_type(resource_type: &str, document: &Value) -> StorageResult<()> {
    if !document.is_object() {
        return Err(StorageError::InvalidDocument {
            message: "resource body must be a JSON object".to_string(),
        });
    }
    match document.get("resourceType").and_then(Value::as_str) {
        Some(t) if t != resource_type => Err(StorageError::InvalidDocument {
            message: format!("body is a {}, expected {}", t, resource_type),
        }),
        _ => Ok(()),
    }
}

fn flatten_resources(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(ref map)
            if map.get("resourceType").and_then(Value::as_str) == Some("Bundle") =>
        {
            map.get("entry")
                .and_then(Value::as_array)
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|e| e.get("resource").cloned())
                        .collect()
                })
                .unwrap_or_default()
        }
        other => vec![other],
    }
}

fn parse_ndjson(text: &str) -> StorageResult<Vec<Value>> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| serde_json::from_str(line).map_err(StorageError::from))
        .collect()
}
