//! `_include` and `_revinclude` resolution.
//!
//! Resolution is single-level: only references held by the primary matches
//! (forward) or pointing at them (reverse) are followed. Forward includes
//! issue one batched fetch per target type; every reverse include issues one
//! membership query. All round trips share the request's [`FanOut`].
//!
//! A failed fetch does not fail the search. The resources of that type are
//! left out and a `PARTIAL_INCLUDE_FAILURE` warning is reported instead. An
//! include cut short by the result cap is reported the same way.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, warn};

use crate::catalog::{ParameterCatalog, ParameterDefinition};
use crate::core::{DocumentSet, StorageQuery, values_at};
use crate::error::{ErrorCode, SearchError};
use crate::types::{IncludeDirective, Issue, IssueType, ResourceRef, StoredDocument};

use super::fanout::FanOut;
use super::plan::{Predicate, PredicateTest, QueryPlan};

/// Included resources of one search page.
#[derive(Debug, Clone, Default)]
pub struct IncludeResolution {
    /// Included references, by resource type. Never contains a primary match.
    pub by_type: BTreeMap<String, BTreeSet<ResourceRef>>,
    /// Bodies of the included resources.
    pub documents: DocumentSet,
    /// Warnings for include fetches that failed or were capped.
    pub warnings: Vec<Issue>,
}

impl IncludeResolution {
    /// Number of included resources.
    pub fn len(&self) -> usize {
        self.by_type.values().map(BTreeSet::len).sum()
    }

    /// Returns true if nothing was included.
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }

    fn add(&mut self, document: StoredDocument, primaries: &BTreeSet<ResourceRef>) {
        let reference = document.reference();
        if primaries.contains(&reference) || self.documents.contains(&reference) {
            return;
        }
        self.by_type
            .entry(reference.resource_type.clone())
            .or_default()
            .insert(reference);
        self.documents.insert(document);
    }
}

/// Resolves include directives against storage.
#[derive(Clone)]
pub struct IncludeResolver {
    storage: Arc<dyn StorageQuery>,
    catalog: Arc<ParameterCatalog>,
    max_results: usize,
}

impl std::fmt::Debug for IncludeResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IncludeResolver")
            .field("backend", &self.storage.backend_name())
            .field("max_results", &self.max_results)
            .finish()
    }
}

/// Outcome of one fetch branch, tagged with what it was fetching.
type Branch = (String, Result<Vec<StoredDocument>, SearchError>);

impl IncludeResolver {
    /// Creates a resolver. `max_results` caps each forward type batch and each
    /// reverse query.
    pub fn new(
        storage: Arc<dyn StorageQuery>,
        catalog: Arc<ParameterCatalog>,
        max_results: usize,
    ) -> Self {
        Self {
            storage,
            catalog,
            max_results,
        }
    }

    /// Resolves `includes` and `revincludes` for the primary matches of a page.
    ///
    /// Only cancellation aborts resolution; storage failures become warnings.
    pub async fn resolve(
        &self,
        primaries: &DocumentSet,
        includes: &[IncludeDirective],
        revincludes: &[IncludeDirective],
        fan_out: &FanOut,
    ) -> Result<IncludeResolution, SearchError> {
        let mut resolution = IncludeResolution::default();
        if primaries.is_empty() || (includes.is_empty() && revincludes.is_empty()) {
            return Ok(resolution);
        }
        fan_out.token().check()?;

        let primary_refs: BTreeSet<ResourceRef> =
            primaries.iter().map(StoredDocument::reference).collect();

        let mut branches = Vec::new();
        for (target_type, ids) in self.forward_targets(primaries, includes, &primary_refs) {
            let storage = Arc::clone(&self.storage);
            let token = fan_out.token().clone();
            let label = format!("_include -> {}", target_type);
            if ids.len() > self.max_results {
                resolution
                    .warnings
                    .push(capped(&label, self.max_results, Some(ids.len())));
            }
            let ids: Vec<String> = ids.into_iter().take(self.max_results).collect();
            branches.push(boxed(label, async move {
                token.check()?;
                Ok::<_, SearchError>(storage.fetch_batch(&target_type, &ids).await?)
            }));
        }

        for directive in revincludes {
            let Some(plan) = self.reverse_plan(directive, &primary_refs) else {
                continue;
            };
            let storage = Arc::clone(&self.storage);
            let token = fan_out.token().clone();
            let limit = self.max_results;
            branches.push(boxed(
                format!("_revinclude={}", directive),
                async move {
                    token.check()?;
                    Ok::<_, SearchError>(storage.search_documents(&plan, limit + 1).await?)
                },
            ));
        }

        let results = fan_out
            .run_all(branches.into_iter().map(|b| move || b).collect())
            .await;

        for result in results {
            let (label, outcome) = result?;
            match outcome {
                Ok(mut documents) => {
                    if documents.len() > self.max_results {
                        documents.truncate(self.max_results);
                        resolution
                            .warnings
                            .push(capped(&label, self.max_results, None));
                    }
                    for document in documents {
                        resolution.add(document, &primary_refs);
                    }
                }
                Err(SearchError::Storage(e)) => {
                    warn!(include = %label, error = %e, "Include fetch failed");
                    resolution.warnings.push(
                        Issue::warning(
                            IssueType::Incomplete,
                            format!(
                                "{}: {} resources could not be fetched: {}",
                                ErrorCode::PartialIncludeFailure,
                                label,
                                e
                            ),
                        )
                        .with_expression(label),
                    );
                }
                Err(e) => return Err(e),
            }
        }

        debug!(
            included = resolution.len(),
            warnings = resolution.warnings.len(),
            "Resolved includes"
        );
        Ok(resolution)
    }

    /// Groups the references held by primaries by target type, minus the
    /// primaries themselves.
    fn forward_targets(
        &self,
        primaries: &DocumentSet,
        includes: &[IncludeDirective],
        primary_refs: &BTreeSet<ResourceRef>,
    ) -> BTreeMap<String, BTreeSet<String>> {
        let mut targets: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for directive in includes {
            for definition in self.followed_params(directive) {
                for document in primaries
                    .iter()
                    .filter(|d| d.resource_type() == directive.source_type)
                {
                    for reference in references_at(document.content(), &definition.paths) {
                        let allowed = directive
                            .target_type
                            .as_deref()
                            .is_none_or(|t| t == reference.resource_type)
                            && (definition.target_types.is_empty()
                                || definition.target_types.contains(&reference.resource_type));
                        if allowed && !primary_refs.contains(&reference) {
                            targets
                                .entry(reference.resource_type)
                                .or_default()
                                .insert(reference.id);
                        }
                    }
                }
            }
        }
        targets
    }

    /// The reference parameters a directive follows.
    fn followed_params(&self, directive: &IncludeDirective) -> Vec<&Arc<ParameterDefinition>> {
        if directive.is_wildcard() {
            return self.catalog.reference_params(&directive.source_type);
        }
        self.catalog
            .get(&directive.source_type, &directive.search_param)
            .into_iter()
            .collect()
    }

    /// Plan selecting `Source` resources whose reference parameter points at
    /// any primary match.
    fn reverse_plan(
        &self,
        directive: &IncludeDirective,
        primary_refs: &BTreeSet<ResourceRef>,
    ) -> Option<QueryPlan> {
        let definition = self
            .catalog
            .get(&directive.source_type, &directive.search_param)?;
        let refs: BTreeSet<ResourceRef> = primary_refs
            .iter()
            .filter(|r| {
                directive
                    .target_type
                    .as_deref()
                    .is_none_or(|t| t == r.resource_type)
            })
            .cloned()
            .collect();
        if refs.is_empty() {
            return None;
        }
        Some(
            QueryPlan::new(&directive.source_type).with_predicate(Predicate {
                parameter: definition.name.clone(),
                paths: definition.paths.clone(),
                tests: vec![PredicateTest::ReferenceIn { refs }],
                negated: false,
            }),
        )
    }
}

type BranchFuture =
    std::pin::Pin<Box<dyn std::future::Future<Output = Result<Branch, SearchError>> + Send>>;

/// Warning for an include that reached `limit`. `found` is the number of
/// candidates when it is known.
fn capped(label: &str, limit: usize, found: Option<usize>) -> Issue {
    let found = match found {
        Some(found) => format!("{} matched", found),
        None => format!("more than {} matched", limit),
    };
    warn!(include = %label, limit, "Include hit the result cap");
    Issue::warning(
        IssueType::Incomplete,
        format!(
            "{}: {} resources capped at {} ({})",
            ErrorCode::PartialIncludeFailure,
            label,
            limit,
            found
        ),
    )
    .with_expression(label)
}

/// Boxes a fetch so forward and reverse branches share one type. The branch
/// itself never fails; the fetch result travels inside it.
fn boxed<F>(label: String, fetch: F) -> BranchFuture
where
    F: std::future::Future<Output = Result<Vec<StoredDocument>, SearchError>> + Send + 'static,
{
    Box::pin(async move {
        match fetch.await {
            Err(SearchError::Cancelled) => Err(SearchError::Cancelled),
            other => Ok((label, other)),
        }
    })
}

/// Local references found at the given paths.
fn references_at(document: &Value, paths: &[String]) -> Vec<ResourceRef> {
    paths
        .iter()
        .flat_map(|path| values_at(document, path))
        .filter_map(|value| value.get("reference").and_then(Value::as_str))
        .filter_map(ResourceRef::parse)
        .collect()
}
