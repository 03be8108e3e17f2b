//! Executable query plans.
//!
//! A [`QueryPlan`] is what the storage collaborator executes: structured
//! predicates for the secondary index, full-text clauses for the text index,
//! and chained sub-plans whose results feed a reference or id membership
//! predicate. Plans are immutable once built; [`QueryPlan::bind_chains`]
//! returns a new plan instead of editing one in place.

use std::collections::BTreeSet;

use serde::Serialize;

use crate::types::{ResourceRef, SearchParamType, SearchPrefix, SortDirection};

use super::constraint::ChainDirection;
use super::values::{DateRange, NumberValue, ReferenceValue, TokenSystem};

/// How the parts of a plan combine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Combinator {
    /// Every predicate, clause, and sub-plan must match.
    #[default]
    And,
}

/// A query against one resource type.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryPlan {
    /// The type the plan selects.
    pub resource_type: String,
    /// Structured-index predicates.
    pub predicates: Vec<Predicate>,
    /// Full-text clauses.
    pub full_text: Vec<FtsClause>,
    /// Sub-plans resolved before this plan executes.
    pub chained: Vec<ChainedSubPlan>,
    /// Always AND.
    pub combinator: Combinator,
    /// Result ordering; the last key is always the id tie-break.
    pub sort: Vec<SortKey>,
}

impl QueryPlan {
    /// Creates a plan that matches every resource of a type.
    pub fn new(resource_type: impl Into<String>) -> Self {
        Self {
            resource_type: resource_type.into(),
            predicates: Vec::new(),
            full_text: Vec::new(),
            chained: Vec::new(),
            combinator: Combinator::And,
            sort: SortKey::default_order(),
        }
    }

    /// Adds a predicate.
    pub fn with_predicate(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Returns true if no chained sub-plans remain.
    pub fn is_bound(&self) -> bool {
        self.chained.is_empty()
    }

    /// Total number of chained sub-plans, nested ones included.
    pub fn chain_count(&self) -> usize {
        self.chained
            .iter()
            .map(|c| 1 + c.plan.chain_count())
            .sum()
    }

    /// Replaces every chained sub-plan with a membership predicate over the
    /// references its execution produced.
    ///
    /// `resolved[i]` holds the result of `self.chained[i]`: for forward chains
    /// the matching target resources; for reverse chains the resources of this
    /// plan's type that the matching sources reference.
    pub fn bind_chains(&self, resolved: Vec<BTreeSet<ResourceRef>>) -> QueryPlan {
        debug_assert_eq!(resolved.len(), self.chained.len());

        let mut bound = QueryPlan {
            resource_type: self.resource_type.clone(),
            predicates: self.predicates.clone(),
            full_text: self.full_text.clone(),
            chained: Vec::new(),
            combinator: self.combinator,
            sort: self.sort.clone(),
        };

        for (sub, refs) in self.chained.iter().zip(resolved) {
            let predicate = match sub.direction {
                ChainDirection::Forward => Predicate {
                    parameter: sub.parameter.clone(),
                    paths: sub.join_paths.clone(),
                    tests: vec![PredicateTest::ReferenceIn { refs }],
                    negated: false,
                },
                ChainDirection::Reverse => Predicate {
                    parameter: sub.parameter.clone(),
                    paths: vec!["id".to_string()],
                    tests: vec![PredicateTest::IdIn {
                        ids: refs.into_iter().map(|r| r.id).collect(),
                    }],
                    negated: false,
                },
            };
            bound.predicates.push(predicate);
        }
        bound
    }
}

/// One structured predicate: any test on any path matches (OR); the
/// predicate as a whole is negated for `:not`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Predicate {
    /// The query key the predicate came from.
    pub parameter: String,
    /// Element paths the tests apply to.
    pub paths: Vec<String>,
    /// OR-combined tests.
    pub tests: Vec<PredicateTest>,
    /// Inverts the match.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub negated: bool,
}

/// A test against one element value.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum PredicateTest {
    /// Case- and accent-insensitive prefix match.
    StartsWith { value: String },
    /// Exact, case-sensitive match.
    Equals { value: String },
    /// Coding / Identifier / code match.
    Token {
        system: TokenSystem,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// Ordered comparison.
    Range {
        prefix: SearchPrefix,
        value: RangeValue,
    },
    /// The reference points at the literal value.
    Reference { reference: ReferenceValue },
    /// The reference points at any of the resources.
    ReferenceIn { refs: BTreeSet<ResourceRef> },
    /// The resource id is one of the values.
    IdIn { ids: BTreeSet<String> },
    /// The element is absent (`true`) or present (`false`).
    Missing { missing: bool },
    /// Exact URI.
    UriEquals { value: String },
    /// The stored URI is a prefix of the value.
    UriAbove { value: String },
    /// The stored URI starts with the value.
    UriBelow { value: String },
    /// All component tests match on the same occurrence of the element.
    ElementMatch { components: Vec<ComponentTest> },
}

/// The comparable side of a range test.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum RangeValue {
    /// Date, dateTime, instant, or Period.
    Date { range: DateRange },
    /// Decimal or integer.
    Number { number: NumberValue },
    /// Quantity with optional unit constraint.
    Quantity {
        number: NumberValue,
        #[serde(skip_serializing_if = "Option::is_none")]
        system: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
}

/// One component of an element-scoped composite match.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ComponentTest {
    /// Paths relative to the repeating element.
    pub paths: Vec<String>,
    /// The test the component must pass.
    pub test: PredicateTest,
}

/// A full-text clause. `terms` are OR-combined.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FtsClause {
    /// The query key the clause came from.
    pub parameter: String,
    /// Element paths to search; empty means the whole document.
    pub paths: Vec<String>,
    /// How terms match.
    pub mode: FtsMode,
    /// OR-combined terms.
    pub terms: Vec<String>,
}

/// Full-text matching mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FtsMode {
    /// Substring anywhere in the text.
    Contains,
    /// Every word of the term appears as a word prefix.
    Text,
}

/// A nested plan whose results constrain the outer plan.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainedSubPlan {
    /// The query key the sub-plan came from.
    pub parameter: String,
    /// Forward: reference paths on the outer type. Reverse: reference paths
    /// on the sub-plan's type that point back at the outer type.
    pub join_paths: Vec<String>,
    /// Forward or reverse.
    pub direction: ChainDirection,
    /// The sub-plan's resource type.
    pub target_type: String,
    /// The nested plan.
    pub plan: QueryPlan,
}

/// One ordering key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SortKey {
    /// Parameter name (`_id`, `_lastUpdated`, or a catalog parameter).
    pub parameter: String,
    /// Element paths the key reads.
    pub paths: Vec<String>,
    /// How values compare.
    pub param_type: SearchParamType,
    /// Direction.
    pub direction: SortDirection,
}

impl SortKey {
    /// The id tie-break key.
    pub fn id(direction: SortDirection) -> Self {
        Self {
            parameter: "_id".to_string(),
            paths: vec!["id".to_string()],
            param_type: SearchParamType::Token,
            direction,
        }
    }

    /// `_lastUpdated` descending, then id.
    pub fn default_order() -> Vec<SortKey> {
        vec![
            SortKey {
                parameter: "_lastUpdated".to_string(),
                paths: vec!["meta.lastUpdated".to_string()],
                param_type: SearchParamType::Date,
                direction: SortDirection::Descending,
            },
            SortKey::id(SortDirection::Descending),
        ]
    }
}
