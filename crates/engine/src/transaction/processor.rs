//! Transaction and batch execution.
//!
//! Entries run one at a time in plan order. A batch keeps going past
//! failures; a transaction stops at the first failure and undoes what it
//! already applied, newest first. The store offers no multi-document
//! transactions, so the undo is a sequence of compensating writes.

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{debug, error, info, warn};

use crate::core::{NoopProfileValidator, ProfileValidator, StorageCrud};
use crate::error::{StorageError, TransactionResult};
use crate::types::{
    Bundle, BundleEntry, EntryResponse, Issue, IssueType, OperationOutcome, ResourceRef,
    format_instant,
};

use super::plan::{
    AppliedChange, EntryOperation, EntryRejection, EntryStatus, TransactionKind, TransactionPlan,
};

/// A successfully applied entry.
struct Applied {
    change: AppliedChange,
    response: EntryResponse,
    reference: Option<ResourceRef>,
    resource: Option<Value>,
}

/// Per-entry result collected while executing.
#[derive(Default)]
struct EntryReport {
    response: Option<EntryResponse>,
    reference: Option<ResourceRef>,
    resource: Option<Value>,
}

/// Executes `transaction` and `batch` Bundles against the CRUD collaborator.
#[derive(Clone)]
pub struct TransactionProcessor {
    storage: Arc<dyn StorageCrud>,
    validator: Arc<dyn ProfileValidator>,
    base_url: Option<String>,
}

impl std::fmt::Debug for TransactionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TransactionProcessor")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TransactionProcessor {
    /// Creates a processor that accepts every resource body.
    pub fn new(storage: Arc<dyn StorageCrud>) -> Self {
        Self {
            storage,
            validator: Arc::new(NoopProfileValidator),
            base_url: None,
        }
    }

    /// Validates create and update bodies with `validator`.
    pub fn with_validator(mut self, validator: Arc<dyn ProfileValidator>) -> Self {
        self.validator = validator;
        self
    }

    /// Makes response `fullUrl`s absolute.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = Some(base_url.into().trim_end_matches('/').to_string());
        self
    }

    /// Processes a `transaction` or `batch` Bundle.
    ///
    /// Returns `Err` only for problems found while planning, before any
    /// write. Entry failures are reported in the response Bundle.
    pub async fn process(&self, bundle: &Value) -> TransactionResult<Bundle> {
        let started = Instant::now();
        let mut plan = TransactionPlan::build(bundle).inspect_err(|e| {
            warn!(error = %e, "Rejected bundle");
        })?;

        let mut reports: Vec<EntryReport> = plan
            .entries
            .iter()
            .map(|entry| EntryReport {
                response: entry
                    .operation
                    .as_ref()
                    .err()
                    .map(|rejection| failure(rejection.status, rejection.outcome.clone())),
                ..Default::default()
            })
            .collect();

        let mut applied_order = Vec::new();
        let mut failed_at = None;

        for index in plan.order.clone() {
            if plan.entries[index].status != EntryStatus::Pending {
                continue;
            }
            let blocked_by = plan.entries[index]
                .dependencies
                .iter()
                .copied()
                .find(|d| plan.entries[*d].status == EntryStatus::Failed);
            if let Some(dependency) = blocked_by {
                debug!(index, dependency, "Skipping entry with a failed dependency");
                plan.entries[index].status = EntryStatus::Failed;
                reports[index].response = Some(failure(
                    424,
                    OperationOutcome::single(Issue::error(
                        IssueType::Processing,
                        format!("not executed: entry {} it depends on failed", dependency),
                    )),
                ));
                continue;
            }

            let entry = &mut plan.entries[index];
            let Ok(operation) = &entry.operation else {
                continue;
            };
            debug!(
                index,
                method = %operation.verb(),
                resource_type = operation.resource_type(),
                "Executing entry"
            );

            match self.apply(operation).await {
                Ok(applied) => {
                    entry.status = EntryStatus::Applied;
                    entry.applied = Some(applied.change);
                    reports[index] = EntryReport {
                        response: Some(applied.response),
                        reference: applied.reference,
                        resource: applied.resource,
                    };
                    applied_order.push(index);
                }
                Err(rejection) => {
                    debug!(index, status = rejection.status, "Entry failed");
                    entry.status = EntryStatus::Failed;
                    reports[index].response = Some(failure(rejection.status, rejection.outcome));
                    if plan.kind.is_atomic() {
                        failed_at = Some(index);
                        break;
                    }
                }
            }
        }

        if let Some(failed) = failed_at {
            warn!(
                failed_entry = failed,
                applied = applied_order.len(),
                "Transaction failed, compensating applied entries"
            );
            self.compensate(&mut plan, &applied_order, failed, &mut reports)
                .await;
            for entry in plan.entries.iter_mut() {
                if entry.status == EntryStatus::Pending {
                    entry.status = EntryStatus::Skipped;
                    reports[entry.index].response = Some(failure(
                        424,
                        OperationOutcome::single(Issue::error(
                            IssueType::Processing,
                            format!("not executed: transaction failed at entry {}", failed),
                        )),
                    ));
                }
            }
        }

        let failed = plan
            .entries
            .iter()
            .filter(|e| e.status == EntryStatus::Failed)
            .count();
        info!(
            kind = ?plan.kind,
            entries = plan.entries.len(),
            failed,
            rolled_back = failed_at.is_some(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Processed bundle"
        );

        Ok(self.respond(&plan, reports))
    }

    async fn apply(&self, operation: &EntryOperation) -> Result<Applied, EntryRejection> {
        match operation {
            EntryOperation::Create {
                resource_type,
                id,
                resource,
            } => {
                self.check_profile(resource_type, resource).await?;
                let outcome = self
                    .storage
                    .create(resource_type, id.as_deref(), resource.clone())
                    .await?;
                let reference = ResourceRef::new(resource_type, &outcome.id);
                Ok(Applied {
                    change: AppliedChange::Created {
                        reference: reference.clone(),
                    },
                    response: EntryResponse {
                        location: Some(outcome.location(resource_type)),
                        etag: Some(outcome.etag()),
                        last_modified: Some(format_instant(outcome.last_updated)),
                        ..EntryResponse::status(201)
                    },
                    reference: Some(reference),
                    resource: None,
                })
            }
            EntryOperation::Update {
                resource_type,
                id,
                resource,
            } => {
                self.check_profile(resource_type, resource).await?;
                let previous = match self.storage.read(resource_type, id).await {
                    Ok(current) => Some(current.into_content()),
                    Err(StorageError::NotFound { .. }) => None,
                    Err(err) => return Err(err.into()),
                };
                let outcome = self
                    .storage
                    .update(resource_type, id, resource.clone())
                    .await?;
                let reference = ResourceRef::new(resource_type, id);
                let status = if outcome.created { 201 } else { 200 };
                Ok(Applied {
                    change: AppliedChange::Updated {
                        reference: reference.clone(),
                        previous: if outcome.created { None } else { previous },
                    },
                    response: EntryResponse {
                        location: Some(outcome.location(resource_type)),
                        etag: Some(outcome.etag()),
                        last_modified: Some(format_instant(outcome.last_updated)),
                        ..EntryResponse::status(status)
                    },
                    reference: Some(reference),
                    resource: None,
                })
            }
            EntryOperation::Delete { resource_type, id } => {
                let previous = self.storage.read(resource_type, id).await?;
                self.storage.delete(resource_type, id).await?;
                Ok(Applied {
                    change: AppliedChange::Deleted {
                        reference: ResourceRef::new(resource_type, id),
                        previous: previous.into_content(),
                    },
                    response: EntryResponse::status(204),
                    reference: None,
                    resource: None,
                })
            }
            EntryOperation::Read { resource_type, id } => {
                let document = self.storage.read(resource_type, id).await?;
                Ok(Applied {
                    change: AppliedChange::Read,
                    response: EntryResponse {
                        etag: Some(document.etag()),
                        last_modified: Some(format_instant(document.last_updated())),
                        ..EntryResponse::status(200)
                    },
                    reference: Some(document.reference()),
                    resource: Some(document.into_content()),
                })
            }
        }
    }

    async fn check_profile(
        &self,
        resource_type: &str,
        resource: &Value,
    ) -> Result<(), EntryRejection> {
        let validation = self.validator.validate_profile(resource_type, resource).await;
        if validation.is_valid() {
            Ok(())
        } else {
            Err(EntryRejection::with_outcome(
                422,
                validation.to_operation_outcome(),
            ))
        }
    }

    /// Undoes applied entries in reverse apply order. A failed undo is
    /// logged and reported on the entry; the remaining undos still run.
    async fn compensate(
        &self,
        plan: &mut TransactionPlan,
        applied_order: &[usize],
        failed: usize,
        reports: &mut [EntryReport],
    ) {
        for &index in applied_order.iter().rev() {
            let entry = &mut plan.entries[index];
            let Some(change) = entry.applied.take() else {
                continue;
            };

            let mut outcome = OperationOutcome::single(Issue::error(
                IssueType::Processing,
                format!("rolled back: transaction failed at entry {}", failed),
            ));
            match self.undo(&change).await {
                Ok(()) => {
                    debug!(index, "Compensated entry");
                    entry.status = EntryStatus::Compensated;
                }
                Err(err) => {
                    error!(
                        index,
                        error = %err,
                        "Compensation failed, entry remains applied"
                    );
                    outcome.issue.push(Issue::error(
                        IssueType::Exception,
                        format!("rollback of this entry failed: {}", err),
                    ));
                    entry.applied = Some(change);
                }
            }
            reports[index] = EntryReport {
                response: Some(failure(424, outcome)),
                ..Default::default()
            };
        }
    }

    async fn undo(&self, change: &AppliedChange) -> Result<(), StorageError> {
        match change {
            AppliedChange::Created { reference }
            | AppliedChange::Updated {
                reference,
                previous: None,
            } => {
                self.storage
                    .delete(&reference.resource_type, &reference.id)
                    .await
            }
            AppliedChange::Updated {
                reference,
                previous: Some(previous),
            } => self
                .storage
                .update(&reference.resource_type, &reference.id, previous.clone())
                .await
                .map(|_| ()),
            AppliedChange::Deleted {
                reference,
                previous,
            } => self
                .storage
                .create(
                    &reference.resource_type,
                    Some(&reference.id),
                    previous.clone(),
                )
                .await
                .map(|_| ()),
            AppliedChange::Read => Ok(()),
        }
    }

    fn respond(&self, plan: &TransactionPlan, reports: Vec<EntryReport>) -> Bundle {
        let mut bundle = Bundle::new(plan.kind.response_type());
        for (entry, report) in plan.entries.iter().zip(reports) {
            let full_url = match &report.reference {
                Some(reference) => Some(self.full_url(reference)),
                None => entry.full_url.clone(),
            };
            bundle.entry.push(BundleEntry {
                full_url,
                resource: report.resource,
                response: Some(report.response.unwrap_or_else(|| {
                    failure(
                        500,
                        OperationOutcome::single(Issue::error(
                            IssueType::Exception,
                            "entry produced no response",
                        )),
                    )
                })),
                ..Default::default()
            });
        }
        bundle
    }

    fn full_url(&self, reference: &ResourceRef) -> String {
        match &self.base_url {
            Some(base) => format!("{}/{}", base, reference),
            None => reference.to_string(),
        }
    }
}

fn failure(status: u16, outcome: OperationOutcome) -> EntryResponse {
    EntryResponse {
        outcome: Some(outcome),
        ..EntryResponse::status(status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::{MemoryStore, Operation};
    use crate::core::ProfileValidation;
    use crate::error::TransactionError;
    use crate::types::BundleType;
    use async_trait::async_trait;
    use serde_json::json;

    struct RequireName;

    #[async_trait]
    impl ProfileValidator for RequireName {
        async fn validate_profile(
            &self,
            resource_type: &str,
            document: &Value,
        ) -> ProfileValidation {
            if resource_type == "Patient" && document.get("name").is_none() {
                ProfileValidation::with_issues(vec![Issue::error(
                    IssueType::Invalid,
                    "Patient.name: minimum required = 1",
                )])
            } else {
                ProfileValidation::valid()
            }
        }
    }

    fn statuses(bundle: &Bundle) -> Vec<u16> {
        bundle
            .entry
            .iter()
            .filter_map(|e| e.response.as_ref()?.status_code())
            .collect()
    }

    fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        store
            .insert_json(json!({"resourceType": "Patient", "id": "existing", "name": [{"family": "Old"}]}))
            .unwrap();
        store
    }

    #[tokio::test]
    async fn test_transaction_commits_all_entries() {
        let store = store();
        let processor = TransactionProcessor::new(store.clone()).with_base_url("http://h/fhir/");
        let bundle = processor
            .process(&json!({
                "resourceType": "Bundle",
                "type": "transaction",
                "entry": [
                    {"fullUrl": "urn:uuid:pat", "resource": {"resourceType": "Patient", "name": [{"family": "New"}]},
                     "request": {"method": "POST", "url": "Patient"}},
                    {"resource": {"resourceType": "Patient", "id": "existing", "name": [{"family": "Updated"}]},
                     "request": {"method": "PUT", "url": "Patient/existing"}},
                    {"request": {"method": "GET", "url": "Patient/existing"}}
                ]
            }))
            .await
            .unwrap();

        assert_eq!(bundle.bundle_type, BundleType::TransactionResponse);
        assert_eq!(statuses(&bundle), vec![201, 200, 200]);
        let created = bundle.entry[0].full_url.as_deref().unwrap();
        assert!(created.starts_with("http://h/fhir/Patient/"));
        let location = bundle.entry[0].response.as_ref().unwrap().location.as_deref();
        assert!(location.unwrap().ends_with("/_history/1"));
        assert_eq!(
            bundle.entry[2].resource.as_ref().unwrap()["name"][0]["family"],
            "Updated"
        );
        assert_eq!(store.count_type("Patient"), 2);
    }

    #[tokio::test]
    async fn test_failed_transaction_compensates() {
        let store = store();
        store.inject_fault(Operation::Create, "Observation");
        let processor = TransactionProcessor::new(store.clone());
        let bundle = processor
            .process(&json!({
                "resourceType": "Bundle",
                "type": "transaction",
                "entry": [
                    {"fullUrl": "urn:uuid:pat", "resource": {"resourceType": "Patient", "name": [{"family": "New"}]},
                     "request": {"method": "POST", "url": "Patient"}},
                    {"resource": {"resourceType": "Patient", "id": "existing", "name": [{"family": "Updated"}]},
                     "request": {"method": "PUT", "url": "Patient/existing"}},
                    {"resource": {"resourceType": "Observation", "subject": {"reference": "urn:uuid:pat"}},
                     "request": {"method": "POST", "url": "Observation"}},
                    {"request": {"method": "DELETE", "url": "Patient/existing"}}
                ]
            }))
            .await
            .unwrap();

        assert_eq!(statuses(&bundle), vec![424, 424, 500, 424]);
        assert_eq!(store.count_type("Patient"), 1);
        let restored = store.get("Patient", "existing").unwrap();
        assert_eq!(restored.content()["name"][0]["family"], "Old");

        let skipped = bundle.entry[3].response.as_ref().unwrap().outcome.as_ref().unwrap();
        assert!(skipped.issue[0].diagnostics.starts_with("not executed"));
        let rolled_back = bundle.entry[0].response.as_ref().unwrap().outcome.as_ref().unwrap();
        assert!(rolled_back.issue[0].diagnostics.starts_with("rolled back"));
    }

    #[tokio::test]
    async fn test_compensation_failure_is_reported() {
        let store = store();
        store.inject_fault(Operation::Create, "Observation");
        store.inject_fault(Operation::Delete, "Patient");
        let processor = TransactionProcessor::new(store.clone());
        let bundle = processor
            .process(&json!({
                "resourceType": "Bundle",
                "type": "transaction",
                "entry": [
                    {"resource": {"resourceType": "Patient", "name": [{"family": "New"}]},
                     "request": {"method": "POST", "url": "Patient"}},
                    {"resource": {"resourceType": "Observation"},
                     "request": {"method": "POST", "url": "Observation"}}
                ]
            }))
            .await
            .unwrap();

        assert_eq!(statuses(&bundle), vec![424, 500]);
        let outcome = bundle.entry[0].response.as_ref().unwrap().outcome.as_ref().unwrap();
        assert_eq!(outcome.issue.len(), 2);
        assert_eq!(outcome.issue[1].code, IssueType::Exception);
        assert_eq!(store.count_type("Patient"), 2);
    }

    #[tokio::test]
    async fn test_batch_entries_are_independent() {
        let store = store();
        let processor =
            TransactionProcessor::new(store.clone()).with_validator(Arc::new(RequireName));
        let bundle = processor
            .process(&json!({
                "resourceType": "Bundle",
                "type": "batch",
                "entry": [
                    {"fullUrl": "urn:uuid:bad", "resource": {"resourceType": "Patient"},
                     "request": {"method": "POST", "url": "Patient"}},
                    {"resource": {"resourceType": "Observation", "subject": {"reference": "urn:uuid:bad"}},
                     "request": {"method": "POST", "url": "Observation"}},
                    {"request": {"method": "DELETE", "url": "Patient/missing"}},
                    {"request": {"method": "DELETE", "url": "Patient/existing"}}
                ]
            }))
            .await
            .unwrap();

        assert_eq!(bundle.bundle_type, BundleType::BatchResponse);
        assert_eq!(statuses(&bundle), vec![422, 424, 404, 204]);
        assert!(!store.contains("Patient", "existing"));
        assert_eq!(store.count_type("Observation"), 0);
    }

    #[tokio::test]
    async fn test_update_as_create_is_deleted_on_rollback() {
        let store = store();
        store.inject_fault(Operation::Create, "Observation");
        let processor = TransactionProcessor::new(store.clone());
        let bundle = processor
            .process(&json!({
                "resourceType": "Bundle",
                "type": "transaction",
                "entry": [
                    {"resource": {"resourceType": "Patient", "id": "fresh"},
                     "request": {"method": "PUT", "url": "Patient/fresh"}},
                    {"resource": {"resourceType": "Observation"},
                     "request": {"method": "POST", "url": "Observation"}}
                ]
            }))
            .await
            .unwrap();
        assert_eq!(statuses(&bundle), vec![424, 500]);
        assert!(!store.contains("Patient", "fresh"));
    }

    #[tokio::test]
    async fn test_planning_errors_write_nothing() {
        let store = store();
        let processor = TransactionProcessor::new(store.clone());
        let result = processor
            .process(&json!({
                "resourceType": "Bundle",
                "type": "transaction",
                "entry": [
                    {"resource": {"resourceType": "Patient"}, "request": {"method": "POST", "url": "Patient"}},
                    {"request": {"method": "DELETE", "url": "Patient"}}
                ]
            }))
            .await;
        assert!(matches!(result, Err(TransactionError::InvalidBundle { .. })));
        assert_eq!(store.count_type("Patient"), 1);
    }
}
