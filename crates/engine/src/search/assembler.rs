//! Searchset Bundle assembly.
//!
//! Takes the matches of one page plus the fetched bodies and produces the
//! FHIR `searchset` Bundle: primaries first in sort order with
//! `search.mode = match`, then included resources with `search.mode =
//! include`, navigation links, and any include or chain warnings as an
//! extension.

use url::form_urlencoded;

use crate::core::{DocumentSet, SearchResult};
use crate::types::{
    Bundle, BundleEntry, BundleLink, BundleType, EntrySearch, Extension, Issue, OperationOutcome,
    ResourceRef, SEARCH_WARNING_EXTENSION, SearchEntryMode,
};

use super::projection::Projection;

/// Everything assembly needs besides the result itself.
#[derive(Debug, Clone, Default)]
pub struct AssemblyRequest {
    /// Server base URL, without a trailing slash.
    pub base_url: String,
    /// The searched resource type.
    pub resource_type: String,
    /// Query parameters to repeat on navigation links, in request order.
    pub link_params: Vec<(String, String)>,
    /// Projection applied to every entry.
    pub projection: Projection,
    /// `_summary=count`: total only, no entries.
    pub count_only: bool,
    /// `_total=none`: leave `Bundle.total` out.
    pub omit_total: bool,
    /// Non-fatal issues to report on the Bundle.
    pub warnings: Vec<Issue>,
}

impl AssemblyRequest {
    /// URL of the search with the given extra parameters appended.
    fn search_url(&self, extra: Option<(&str, &str)>) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.link_params {
            query.append_pair(key, value);
        }
        if let Some((key, value)) = extra {
            query.append_pair(key, value);
        }
        let query = query.finish();
        let path = format!("{}/{}", self.base_url, self.resource_type);
        if query.is_empty() {
            path
        } else {
            format!("{}?{}", path, query)
        }
    }

    fn full_url(&self, reference: &ResourceRef) -> String {
        format!(
            "{}/{}/{}",
            self.base_url, reference.resource_type, reference.id
        )
    }
}

/// Builds the searchset Bundle for one page.
///
/// `documents` holds the bodies of primaries and includes. A reference whose
/// body is missing (deleted between query and fetch) is left out.
pub fn assemble(
    result: &SearchResult,
    documents: &DocumentSet,
    request: &AssemblyRequest,
) -> Bundle {
    let mut bundle = Bundle::new(BundleType::Searchset);
    if !request.omit_total {
        bundle.total = Some(result.total);
    }
    bundle.link.push(BundleLink::new("self", request.search_url(None)));

    if !request.count_only {
        if let Some(cursor) = &result.page.next_cursor {
            bundle
                .link
                .push(BundleLink::new("next", request.search_url(Some(("_cursor", cursor)))));
        }
        if let Some(cursor) = &result.page.previous_cursor {
            bundle.link.push(BundleLink::new(
                "previous",
                request.search_url(Some(("_cursor", cursor))),
            ));
        }

        let included = result.included_by_type.values().flatten();
        let entries = result
            .primary_ids
            .iter()
            .map(|r| (r, SearchEntryMode::Match))
            .chain(included.map(|r| (r, SearchEntryMode::Include)));

        for (reference, mode) in entries {
            let Some(document) = documents.get(reference) else {
                tracing::debug!(reference = %reference, "Skipping entry without a body");
                continue;
            };
            bundle.entry.push(BundleEntry {
                full_url: Some(request.full_url(reference)),
                resource: Some(request.projection.apply(document.content())),
                search: Some(EntrySearch { mode }),
                ..Default::default()
            });
        }
    }

    if !request.warnings.is_empty() {
        bundle.extension.push(Extension {
            url: SEARCH_WARNING_EXTENSION.to_string(),
            value_resource: OperationOutcome::new(request.warnings.clone()),
        });
    }

    bundle
}
