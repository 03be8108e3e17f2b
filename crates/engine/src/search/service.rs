//! Search orchestration.
//!
//! [`SearchService::search`] runs one request end to end:
//!
//! ```text
//! raw params ─► validate ─► translate ─► resolve chains ─► execute / count
//!                                         (fan-out)            │
//!            Bundle ◄─ assemble ◄─ resolve includes ◄─ fetch bodies
//! ```
//!
//! The whole request runs under the configured timeout. When it expires the
//! request's [`CancellationToken`] is cancelled, in-flight sub-queries are
//! abandoned, and nothing partial is returned.

use std::collections::BTreeSet;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::catalog::ParameterCatalog;
use crate::config::EngineConfig;
use crate::core::{DocumentSet, SearchResult, StorageQuery};
use crate::error::{SearchError, ValidationErrors};
use crate::types::{Bundle, Issue, IssueType, PageRequest, ResourceRef};

use super::assembler::{AssemblyRequest, assemble};
use super::constraint::{ChainDirection, ValidatedSearch};
use super::fanout::{CancellationToken, FanOut};
use super::include::IncludeResolver;
use super::plan::QueryPlan;
use super::projection::Projection;
use super::raw::RawParams;
use super::translator::QueryTranslator;
use super::validator::{ParameterValidator, ValidationPolicy};

/// A bound plan plus warnings for chains that hit the result cap.
type Bound = (QueryPlan, Vec<Issue>);

type BindFuture<'a> = Pin<Box<dyn Future<Output = Result<Bound, SearchError>> + Send + 'a>>;

/// Executes FHIR searches against a storage collaborator.
#[derive(Clone)]
pub struct SearchService {
    config: EngineConfig,
    validator: ParameterValidator,
    translator: QueryTranslator,
    includes: IncludeResolver,
    storage: Arc<dyn StorageQuery>,
}

impl std::fmt::Debug for SearchService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SearchService")
            .field("backend", &self.storage.backend_name())
            .field("config", &self.config)
            .finish()
    }
}

impl SearchService {
    /// Creates a service over a catalog and a storage backend.
    pub fn new(
        config: EngineConfig,
        catalog: Arc<ParameterCatalog>,
        storage: Arc<dyn StorageQuery>,
    ) -> Self {
        Self {
            validator: ParameterValidator::new(
                Arc::clone(&catalog),
                ValidationPolicy::from(&config),
            ),
            translator: QueryTranslator::new(Arc::clone(&catalog)),
            includes: IncludeResolver::new(
                Arc::clone(&storage),
                catalog,
                config.max_include_results,
            ),
            storage,
            config,
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Validates a search without running it.
    pub fn validate(
        &self,
        resource_type: &str,
        raw: &RawParams,
    ) -> Result<ValidatedSearch, ValidationErrors> {
        self.validator.validate(resource_type, raw)
    }

    /// Returns the plan a search would execute, chained sub-plans unresolved.
    pub fn explain(&self, resource_type: &str, raw: &RawParams) -> Result<QueryPlan, SearchError> {
        let search = self.validate(resource_type, raw)?;
        Ok(self.translator.translate(&search))
    }

    /// Runs a search and returns its searchset Bundle.
    ///
    /// `cancel` lets the caller abandon the request; it is also cancelled
    /// when the request times out.
    pub async fn search(
        &self,
        resource_type: &str,
        raw: &RawParams,
        cancel: CancellationToken,
    ) -> Result<Bundle, SearchError> {
        let started = Instant::now();
        let search = self.validate(resource_type, raw).inspect_err(|e| {
            debug!(resource_type, issues = e.len(), "Search rejected");
        })?;

        let timeout = self.config.request_timeout;
        let bundle = match tokio::time::timeout(timeout, self.run(&search, &cancel)).await {
            Ok(result) => result?,
            Err(_) => {
                cancel.cancel();
                warn!(
                    resource_type,
                    timeout_ms = timeout.as_millis() as u64,
                    "Search timed out"
                );
                return Err(SearchError::Timeout {
                    timeout_ms: timeout.as_millis() as u64,
                });
            }
        };

        info!(
            resource_type,
            total = bundle.total.unwrap_or_default(),
            entries = bundle.entry.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Search completed"
        );
        Ok(bundle)
    }

    async fn run(
        &self,
        search: &ValidatedSearch,
        cancel: &CancellationToken,
    ) -> Result<Bundle, SearchError> {
        let fan_out = FanOut::new(self.config.max_fan_out, cancel.clone());
        let plan = self.translator.translate(search);
        let (plan, chain_warnings) = self.bind(plan, &fan_out).await?;

        let mut request = AssemblyRequest {
            base_url: self.config.base().to_string(),
            resource_type: search.resource_type.clone(),
            link_params: search.link_params.clone(),
            projection: Projection::new(search.result.summary, search.result.elements.clone()),
            count_only: search.result.is_count_only(),
            omit_total: !search.result.wants_total(),
            warnings: chain_warnings,
        };

        if request.count_only {
            cancel.check()?;
            let total = self.storage.count(&plan).await?;
            let result = SearchResult {
                total,
                ..Default::default()
            };
            return Ok(assemble(&result, &DocumentSet::new(), &request));
        }

        let mut page = PageRequest::new(search.result.count).with_offset(search.result.offset);
        if let Some(cursor) = &search.result.cursor {
            page = page.with_cursor(cursor.clone());
        }

        cancel.check()?;
        let mut result = self.storage.execute(&plan, &page).await?;
        debug!(
            matched = result.total,
            page = result.primary_ids.len(),
            "Executed primary query"
        );

        cancel.check()?;
        let ids: Vec<String> = result.primary_ids.iter().map(|r| r.id.clone()).collect();
        let mut documents: DocumentSet = if ids.is_empty() {
            DocumentSet::new()
        } else {
            self.storage
                .fetch_batch(&search.resource_type, &ids)
                .await?
                .into_iter()
                .collect()
        };

        let resolution = self
            .includes
            .resolve(
                &documents,
                &search.result.includes,
                &search.result.revincludes,
                &fan_out,
            )
            .await?;
        result.included_by_type = resolution.by_type;
        documents.extend(resolution.documents.iter().cloned());
        request.warnings.extend(resolution.warnings);

        Ok(assemble(&result, &documents, &request))
    }

    /// Resolves every chained sub-plan, innermost first, and returns the
    /// bound plan. Sub-plans of one level run concurrently.
    ///
    /// A sub-query is asked for one more id than `max_chain_results`; when it
    /// returns that many the set is cut to the cap and a warning is returned
    /// alongside the plan.
    fn bind<'a>(&'a self, plan: QueryPlan, fan_out: &'a FanOut) -> BindFuture<'a> {
        Box::pin(async move {
            if plan.is_bound() {
                return Ok((plan, Vec::new()));
            }

            let mut warnings = Vec::new();
            let mut branches = Vec::with_capacity(plan.chained.len());
            for sub in &plan.chained {
                let (inner, inner_warnings) = self.bind(sub.plan.clone(), fan_out).await?;
                warnings.extend(inner_warnings);
                let storage = Arc::clone(&self.storage);
                let token = fan_out.token().clone();
                let limit = self.config.max_chain_results;
                let direction = sub.direction;
                let join_paths = sub.join_paths.clone();
                let outer_type = plan.resource_type.clone();
                let parameter = sub.parameter.clone();

                branches.push(move || async move {
                    token.check()?;
                    let mut refs = match direction {
                        ChainDirection::Forward => storage.collect_refs(&inner, limit + 1).await?,
                        ChainDirection::Reverse => {
                            storage
                                .collect_referenced(&inner, &join_paths, &outer_type, limit + 1)
                                .await?
                        }
                    };
                    let capped = refs.len() > limit;
                    let warning = capped.then(|| {
                        refs.truncate(limit);
                        warn!(
                            parameter = %parameter,
                            limit,
                            "Chained sub-query hit the result cap"
                        );
                        Issue::warning(
                            IssueType::Incomplete,
                            format!(
                                "Chained parameter '{}' matched more than {} resources; \
                                 only the first {} were used",
                                parameter, limit, limit
                            ),
                        )
                        .with_expression(parameter.clone())
                    });
                    let refs: BTreeSet<ResourceRef> = refs.into_iter().collect();
                    Ok::<_, SearchError>((refs, warning))
                });
            }

            let resolved = fan_out.try_run(branches).await?;
            let mut sets = Vec::with_capacity(resolved.len());
            for (refs, warning) in resolved {
                sets.push(refs);
                warnings.extend(warning);
            }
            debug!(
                resource_type = %plan.resource_type,
                chains = sets.len(),
                matched = sets.iter().map(BTreeSet::len).sum::<usize>(),
                capped = warnings.len(),
                "Resolved chained sub-plans"
            );
            Ok((plan.bind_chains(sets), warnings))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::memory::MemoryStore;
    use serde_json::json;
    use std::time::Duration;

    fn service(store: Arc<MemoryStore>) -> SearchService {
        let catalog = Arc::new(ParameterCatalog::builtin().unwrap());
        SearchService::new(EngineConfig::for_testing(), catalog, store)
    }

    fn store() -> Arc<MemoryStore> {
        let store = Arc::new(MemoryStore::new());
        for resource in [
            json!({"resourceType": "Patient", "id": "p1", "name": [{"family": "Chalmers", "given": ["Peter"]}]}),
            json!({"resourceType": "Patient", "id": "p2", "name": [{"family": "Windsor"}]}),
            json!({"resourceType": "Observation", "id": "o1", "status": "final",
                   "code": {"coding": [{"system": "http://loinc.org", "code": "1234-5"}]},
                   "subject": {"reference": "Patient/p1"}}),
            json!({"resourceType": "Observation", "id": "o2", "status": "final",
                   "code": {"coding": [{"system": "http://loinc.org", "code": "9999-9"}]},
                   "subject": {"reference": "Patient/p2"}}),
        ] {
            store.insert_json(resource).unwrap();
        }
        store
    }

    #[tokio::test]
    async fn test_forward_chain() {
        let service = service(store());
        let raw = RawParams::parse_query("subject:Patient.name=peter");
        let bundle = service
            .search("Observation", &raw, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(bundle.total, Some(1));
        assert_eq!(bundle.entry[0].resource.as_ref().unwrap()["id"], "o1");
    }

    #[tokio::test]
    async fn test_reverse_chain() {
        let service = service(store());
        let raw = RawParams::parse_query("_has:Observation:patient:code=9999-9");
        let bundle = service
            .search("Patient", &raw, CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(bundle.total, Some(1));
        assert_eq!(bundle.entry[0].resource.as_ref().unwrap()["id"], "p2");
    }

    #[tokio::test]
    async fn test_explain_keeps_chains_unbound() {
        let service = service(store());
        let raw = RawParams::parse_query("subject:Patient.name=peter");
        let plan = service.explain("Observation", &raw).unwrap();
        assert_eq!(plan.chain_count(), 1);
    }

    #[tokio::test]
    async fn test_validation_errors_surface() {
        let service = service(store());
        let raw = RawParams::parse_query("shoe-size=12");
        let result = service
            .search("Patient", &raw, CancellationToken::new())
            .await;
        assert!(matches!(result, Err(SearchError::Validation(_))));
    }

    #[tokio::test]
    async fn test_timeout_cancels_request() {
        let store = store();
        store.set_latency(Some(Duration::from_secs(10)));
        let catalog = Arc::new(ParameterCatalog::builtin().unwrap());
        let config = EngineConfig {
            request_timeout: Duration::from_millis(50),
            ..EngineConfig::for_testing()
        };
        let service = SearchService::new(config, catalog, store);

        let token = CancellationToken::new();
        let result = service
            .search("Patient", &RawParams::new(), token.clone())
            .await;
        assert!(matches!(result, Err(SearchError::Timeout { timeout_ms: 50 })));
        assert!(token.is_cancelled());
    }
}
