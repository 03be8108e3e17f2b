//! Transaction and batch planning.
//!
//! [`TransactionPlan::build`] parses the request Bundle, binds `urn:uuid:`
//! placeholders to server ids, rewrites references, and computes a
//! dependency-safe execution order. Nothing is written while planning, so
//! every fatal problem surfaces before the first storage call.

use std::cmp::Reverse;
use std::collections::{BTreeMap, BTreeSet, BinaryHeap};

use serde_json::Value;
use tracing::debug;

use crate::error::{StorageError, TransactionError, TransactionResult};
use crate::types::{
    BundleType, HttpVerb, Issue, IssueType, OperationOutcome, ResourceRef, is_logical_id,
    is_resource_type,
};

use super::references::{self, UrnBindings};

/// Whether a Bundle is atomic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    /// All or nothing: any failure compensates every applied entry.
    Transaction,
    /// Independent entries.
    Batch,
}

impl TransactionKind {
    /// Bundle type of the response.
    pub fn response_type(&self) -> BundleType {
        match self {
            TransactionKind::Transaction => BundleType::TransactionResponse,
            TransactionKind::Batch => BundleType::BatchResponse,
        }
    }

    /// Returns true for transactions.
    pub fn is_atomic(&self) -> bool {
        matches!(self, TransactionKind::Transaction)
    }
}

/// The storage call an entry makes.
#[derive(Debug, Clone, PartialEq)]
pub enum EntryOperation {
    /// `POST Type`. `id` is set when the entry's `urn:uuid:` was bound.
    Create {
        resource_type: String,
        id: Option<String>,
        resource: Value,
    },
    /// `PUT Type/id`, create-or-replace.
    Update {
        resource_type: String,
        id: String,
        resource: Value,
    },
    /// `DELETE Type/id`.
    Delete { resource_type: String, id: String },
    /// `GET Type/id`.
    Read { resource_type: String, id: String },
}

impl EntryOperation {
    /// HTTP verb of the request.
    pub fn verb(&self) -> HttpVerb {
        match self {
            EntryOperation::Create { .. } => HttpVerb::Post,
            EntryOperation::Update { .. } => HttpVerb::Put,
            EntryOperation::Delete { .. } => HttpVerb::Delete,
            EntryOperation::Read { .. } => HttpVerb::Get,
        }
    }

    /// Resource type the entry targets.
    pub fn resource_type(&self) -> &str {
        match self {
            EntryOperation::Create { resource_type, .. }
            | EntryOperation::Update { resource_type, .. }
            | EntryOperation::Delete { resource_type, .. }
            | EntryOperation::Read { resource_type, .. } => resource_type,
        }
    }

    /// Body carried by creates and updates.
    pub fn resource(&self) -> Option<&Value> {
        match self {
            EntryOperation::Create { resource, .. } | EntryOperation::Update { resource, .. } => {
                Some(resource)
            }
            _ => None,
        }
    }

    fn resource_mut(&mut self) -> Option<&mut Value> {
        match self {
            EntryOperation::Create { resource, .. } | EntryOperation::Update { resource, .. } => {
                Some(resource)
            }
            _ => None,
        }
    }
}

/// Lifecycle of one entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryStatus {
    /// Not executed yet.
    Pending,
    /// Written (or read) successfully.
    Applied,
    /// The storage call, validation, or parsing failed.
    Failed,
    /// Applied, then undone because the transaction failed.
    Compensated,
    /// Never executed because the transaction failed first.
    Skipped,
}

/// What an applied entry changed, with what compensation needs to undo it.
#[derive(Debug, Clone, PartialEq)]
pub enum AppliedChange {
    /// A resource was created.
    Created { reference: ResourceRef },
    /// A resource was replaced; `previous` is `None` when the update created it.
    Updated {
        reference: ResourceRef,
        previous: Option<Value>,
    },
    /// A resource was deleted.
    Deleted {
        reference: ResourceRef,
        previous: Value,
    },
    /// A read; nothing to undo.
    Read,
}

/// Why an entry was rejected during planning.
#[derive(Debug, Clone, PartialEq)]
pub struct EntryRejection {
    /// HTTP status to report.
    pub status: u16,
    /// Outcome to report.
    pub outcome: OperationOutcome,
}

impl EntryRejection {
    pub(crate) fn new(status: u16, code: IssueType, message: impl Into<String>) -> Self {
        Self {
            status,
            outcome: OperationOutcome::single(Issue::error(code, message)),
        }
    }

    /// Wraps an existing outcome.
    pub fn with_outcome(status: u16, outcome: OperationOutcome) -> Self {
        Self { status, outcome }
    }

    fn message(&self) -> String {
        self.outcome
            .issue
            .first()
            .map(|i| i.diagnostics.clone())
            .unwrap_or_default()
    }
}

impl From<StorageError> for EntryRejection {
    fn from(err: StorageError) -> Self {
        Self {
            status: err.http_status(),
            outcome: OperationOutcome::single(err.to_issue()),
        }
    }
}

/// One entry of the request Bundle.
#[derive(Debug, Clone)]
pub struct PlannedEntry {
    /// Position in the request Bundle.
    pub index: usize,
    /// `entry.fullUrl` as sent.
    pub full_url: Option<String>,
    /// Parsed request, or why it could not be parsed (batch only).
    pub operation: Result<EntryOperation, EntryRejection>,
    /// Indexes of entries whose created ids this entry references.
    pub dependencies: BTreeSet<usize>,
    /// Execution state.
    pub status: EntryStatus,
    /// Set once the entry is applied.
    pub applied: Option<AppliedChange>,
}

/// The executable form of a transaction or batch Bundle.
#[derive(Debug, Clone)]
pub struct TransactionPlan {
    /// Transaction or batch.
    pub kind: TransactionKind,
    /// Entries in request order.
    pub entries: Vec<PlannedEntry>,
    /// `urn:uuid:` placeholder to the resource it was bound to.
    pub id_bindings: BTreeMap<String, ResourceRef>,
    /// Execution order: indexes into `entries`.
    pub order: Vec<usize>,
}

impl TransactionPlan {
    /// Plans a request Bundle.
    ///
    /// Fails on anything that is not a transaction or batch Bundle, on
    /// circular `urn:uuid:` references, and (for transactions) on any entry
    /// that cannot be parsed or references an undeclared placeholder.
    pub fn build(bundle: &Value) -> TransactionResult<Self> {
        let kind = bundle_kind(bundle)?;
        let raw_entries = match bundle.get("entry") {
            None => Vec::new(),
            Some(Value::Array(entries)) => entries.iter().collect(),
            Some(_) => return Err(TransactionError::invalid("entry must be an array")),
        };

        let mut entries = Vec::with_capacity(raw_entries.len());
        for (index, raw) in raw_entries.into_iter().enumerate() {
            let operation = parse_entry(raw);
            if let (TransactionKind::Transaction, Err(rejection)) = (kind, &operation) {
                return Err(TransactionError::invalid(format!(
                    "entry {}: {}",
                    index,
                    rejection.message()
                )));
            }
            entries.push(PlannedEntry {
                index,
                full_url: raw.get("fullUrl").and_then(Value::as_str).map(str::to_string),
                operation,
                dependencies: BTreeSet::new(),
                status: EntryStatus::Pending,
                applied: None,
            });
        }

        let bindings = bind_placeholders(&mut entries);
        resolve_references(kind, &mut entries, &bindings)?;
        let order = execution_order(&entries)?;

        for entry in entries.iter_mut().filter(|e| e.operation.is_err()) {
            entry.status = EntryStatus::Failed;
        }

        debug!(
            kind = ?kind,
            entries = entries.len(),
            bindings = bindings.len(),
            "Planned bundle"
        );

        Ok(Self {
            kind,
            entries,
            id_bindings: bindings.into_references(),
            order,
        })
    }
}

fn bundle_kind(bundle: &Value) -> TransactionResult<TransactionKind> {
    match bundle.get("resourceType").and_then(Value::as_str) {
        Some("Bundle") => {}
        Some(other) => {
            return Err(TransactionError::invalid(format!(
                "expected a Bundle, got {}",
                other
            )));
        }
        None => return Err(TransactionError::invalid("request is not a FHIR resource")),
    }
    match bundle.get("type").and_then(Value::as_str) {
        Some("transaction") => Ok(TransactionKind::Transaction),
        Some("batch") => Ok(TransactionKind::Batch),
        Some(other) => Err(TransactionError::invalid(format!(
            "Bundle type must be 'transaction' or 'batch', got '{}'",
            other
        ))),
        None => Err(TransactionError::invalid("Bundle has no type")),
    }
}

/// Parses `entry.request` and `entry.resource` into an operation.
fn parse_entry(entry: &Value) -> Result<EntryOperation, EntryRejection> {
    let request = entry
        .get("request")
        .ok_or_else(|| EntryRejection::new(400, IssueType::Structure, "entry has no request"))?;
    let method = request
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default();
    let verb = HttpVerb::parse(method).ok_or_else(|| {
        EntryRejection::new(
            405,
            IssueType::NotSupported,
            format!("unsupported method '{}'", method),
        )
    })?;
    let url = request
        .get("url")
        .and_then(Value::as_str)
        .ok_or_else(|| EntryRejection::new(400, IssueType::Structure, "request has no url"))?;
    let (resource_type, id) = parse_request_url(url)?;

    let body = || -> Result<Value, EntryRejection> {
        let resource = entry.get("resource").cloned().ok_or_else(|| {
            EntryRejection::new(
                400,
                IssueType::Structure,
                format!("{} entry has no resource", verb),
            )
        })?;
        match resource.get("resourceType").and_then(Value::as_str) {
            Some(t) if t == resource_type => Ok(resource),
            Some(t) => Err(EntryRejection::new(
                400,
                IssueType::Invalid,
                format!("resource is a {} but the request targets {}", t, resource_type),
            )),
            None => Err(EntryRejection::new(
                400,
                IssueType::Invalid,
                "resource has no resourceType",
            )),
        }
    };
    let require_id = |id: Option<String>| {
        id.ok_or_else(|| {
            EntryRejection::new(
                400,
                IssueType::Structure,
                format!("{} requires Type/id, got '{}'", verb, url),
            )
        })
    };

    match verb {
        HttpVerb::Post => {
            if id.is_some() {
                return Err(EntryRejection::new(
                    400,
                    IssueType::Invalid,
                    format!("POST url must name a type only, got '{}'", url),
                ));
            }
            let resource = body()?;
            Ok(EntryOperation::Create {
                resource_type,
                id: None,
                resource,
            })
        }
        HttpVerb::Put => {
            let id = require_id(id)?;
            let resource = body()?;
            match resource.get("id").and_then(Value::as_str) {
                Some(body_id) if body_id != id => Err(EntryRejection::new(
                    400,
                    IssueType::Invalid,
                    format!("resource id '{}' does not match url id '{}'", body_id, id),
                )),
                _ => Ok(EntryOperation::Update {
                    resource_type,
                    id,
                    resource,
                }),
            }
        }
        HttpVerb::Delete => Ok(EntryOperation::Delete {
            resource_type,
            id: require_id(id)?,
        }),
        HttpVerb::Get => Ok(EntryOperation::Read {
            resource_type,
            id: require_id(id)?,
        }),
    }
}

/// Splits `Type` or `Type/id` (optionally with a leading slash). Searches,
/// history, and conditional urls are not supported.
fn parse_request_url(url: &str) -> Result<(String, Option<String>), EntryRejection> {
    let unsupported = || {
        EntryRejection::new(
            400,
            IssueType::NotSupported,
            format!("unsupported request url '{}'", url),
        )
    };
    if url.contains('?') {
        return Err(unsupported());
    }
    let mut parts = url.trim_start_matches('/').split('/');
    let resource_type = parts.next().filter(|t| is_resource_type(t)).ok_or_else(unsupported)?;
    let id = match parts.next() {
        None => None,
        Some(id) if is_logical_id(id) => Some(id.to_string()),
        Some(_) => return Err(unsupported()),
    };
    if parts.next().is_some() {
        return Err(unsupported());
    }
    Ok((resource_type.to_string(), id))
}

/// Binds every `urn:uuid:` fullUrl. A POST gets a fresh server id, a PUT
/// keeps the id from its url. Bound creates are planned with that id.
fn bind_placeholders(entries: &mut [PlannedEntry]) -> UrnBindings {
    let mut bindings = UrnBindings::default();
    for entry in entries.iter_mut() {
        let Some(urn) = entry.full_url.as_deref().filter(|u| references::is_urn(u)) else {
            continue;
        };
        match &mut entry.operation {
            Ok(EntryOperation::Create {
                resource_type, id, ..
            }) => {
                let fresh = uuid::Uuid::new_v4().to_string();
                *id = Some(fresh.clone());
                bindings.bind(urn, ResourceRef::new(resource_type.clone(), fresh), entry.index);
            }
            Ok(EntryOperation::Update {
                resource_type, id, ..
            }) => {
                let reference = ResourceRef::new(resource_type.clone(), id.clone());
                bindings.bind(urn, reference, entry.index);
            }
            _ => {}
        }
    }
    bindings
}

/// Rewrites placeholder references and records dependencies.
fn resolve_references(
    kind: TransactionKind,
    entries: &mut [PlannedEntry],
    bindings: &UrnBindings,
) -> TransactionResult<()> {
    for entry in entries.iter_mut() {
        let index = entry.index;
        let Ok(operation) = &mut entry.operation else {
            continue;
        };
        let Some(resource) = operation.resource_mut() else {
            continue;
        };

        match references::rewrite(resource, bindings) {
            Ok(depends_on) => {
                entry.dependencies = depends_on.into_iter().filter(|d| *d != index).collect();
            }
            Err(urn) => {
                if kind.is_atomic() {
                    return Err(TransactionError::UnresolvedReference {
                        index,
                        reference: urn,
                    });
                }
                entry.operation = Err(EntryRejection::new(
                    400,
                    IssueType::NotFound,
                    format!("reference {} is not declared by any entry", urn),
                ));
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm over entry dependencies; among ready entries the lowest
/// index runs first, so independent entries keep request order.
fn execution_order(entries: &[PlannedEntry]) -> TransactionResult<Vec<usize>> {
    let mut remaining: Vec<usize> = entries.iter().map(|e| e.dependencies.len()).collect();
    let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); entries.len()];
    for entry in entries {
        for &dependency in &entry.dependencies {
            dependents[dependency].push(entry.index);
        }
    }

    let mut ready: BinaryHeap<Reverse<usize>> = remaining
        .iter()
        .enumerate()
        .filter(|(_, count)| **count == 0)
        .map(|(index, _)| Reverse(index))
        .collect();

    let mut order = Vec::with_capacity(entries.len());
    while let Some(Reverse(index)) = ready.pop() {
        order.push(index);
        for &dependent in &dependents[index] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.push(Reverse(dependent));
            }
        }
    }

    if order.len() < entries.len() {
        let stuck: BTreeSet<usize> = (0..entries.len()).filter(|i| remaining[*i] > 0).collect();
        return Err(TransactionError::CircularReference {
            cycle: find_cycle(entries, &stuck),
        });
    }
    Ok(order)
}

/// Follows dependencies among `stuck` entries until one repeats, and names
/// the cycle by fullUrl.
fn find_cycle(entries: &[PlannedEntry], stuck: &BTreeSet<usize>) -> Vec<String> {
    let Some(&start) = stuck.iter().next() else {
        return Vec::new();
    };
    let mut path = vec![start];
    let mut current = start;
    loop {
        let next = entries[current]
            .dependencies
            .iter()
            .copied()
            .find(|d| stuck.contains(d));
        let Some(next) = next else {
            break;
        };
        if let Some(position) = path.iter().position(|p| *p == next) {
            let mut cycle: Vec<usize> = path[position..].to_vec();
            cycle.push(next);
            return cycle.into_iter().map(|i| entry_name(&entries[i])).collect();
        }
        path.push(next);
        current = next;
    }
    path.into_iter().map(|i| entry_name(&entries[i])).collect()
}

fn entry_name(entry: &PlannedEntry) -> String {
    entry
        .full_url
        .clone()
        .unwrap_or_else(|| format!("entry {}", entry.index))
}
