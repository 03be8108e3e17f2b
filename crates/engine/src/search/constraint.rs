//! Validated search constraints.

use std::sync::Arc;

use crate::catalog::ParameterDefinition;
use crate::types::{
    IncludeDirective, PageCursor, SearchModifier, SortDirective, SummaryMode, TotalMode,
};

use super::values::ConstraintValue;

/// A raw parameter bound to its definition, with typed values.
///
/// When `chain` is set the values live on the innermost constraint of the
/// chain and `values` here is empty.
#[derive(Debug, Clone)]
pub struct ParsedConstraint {
    /// The query-string key the constraint came from.
    pub key: String,

    /// The bound definition. For a reverse chain this is the reference
    /// parameter on the referencing type.
    pub definition: Arc<ParameterDefinition>,

    /// The accepted modifier.
    pub modifier: Option<SearchModifier>,

    /// OR-joined values.
    pub values: Vec<ConstraintValue>,

    /// The chained constraint, for forward chains and `_has`.
    pub chain: Option<ChainLink>,
}

impl ParsedConstraint {
    /// Returns the parameter name.
    pub fn name(&self) -> &str {
        &self.definition.name
    }

    /// Returns true for `:missing` constraints.
    pub fn is_missing_test(&self) -> bool {
        self.modifier == Some(SearchModifier::Missing)
    }

    /// Returns the number of hops below this constraint.
    pub fn chain_depth(&self) -> usize {
        match &self.chain {
            Some(link) => 1 + link.inner.chain_depth(),
            None => 0,
        }
    }
}

/// Direction of a chain hop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainDirection {
    /// `subject:Patient.name` - the searched type holds the reference.
    Forward,
    /// `_has:Observation:subject:code` - the other type holds the reference.
    Reverse,
}

/// One hop of a chained constraint.
#[derive(Debug, Clone)]
pub struct ChainLink {
    /// Forward or reverse.
    pub direction: ChainDirection,
    /// The resource type the inner constraint is evaluated on.
    pub target_type: String,
    /// The constraint on `target_type`.
    pub inner: Box<ParsedConstraint>,
}

/// Result-shaping parameters of a search.
#[derive(Debug, Clone, Default)]
pub struct ResultParameters {
    /// Page size after clamping.
    pub count: u32,
    /// Offset for offset paging.
    pub offset: u32,
    /// Keyset cursor.
    pub cursor: Option<PageCursor>,
    /// `_summary`.
    pub summary: Option<SummaryMode>,
    /// `_total`.
    pub total: Option<TotalMode>,
    /// `_elements`.
    pub elements: Vec<String>,
    /// `_include`.
    pub includes: Vec<IncludeDirective>,
    /// `_revinclude`.
    pub revincludes: Vec<IncludeDirective>,
    /// `_sort`.
    pub sort: Vec<SortDirective>,
}

impl ResultParameters {
    /// Returns true for `_summary=count`.
    pub fn is_count_only(&self) -> bool {
        self.summary == Some(SummaryMode::Count)
    }

    /// Returns true unless `_total=none` was requested.
    pub fn wants_total(&self) -> bool {
        self.total != Some(TotalMode::None)
    }
}

/// The output of validation: everything needed to plan and shape a search.
#[derive(Debug, Clone)]
pub struct ValidatedSearch {
    /// The searched type.
    pub resource_type: String,
    /// Filter constraints, AND-combined.
    pub constraints: Vec<ParsedConstraint>,
    /// Result-shaping parameters.
    pub result: ResultParameters,
    /// `(key, value)` pairs of the request without paging state, for links.
    pub link_params: Vec<(String, String)>,
}
