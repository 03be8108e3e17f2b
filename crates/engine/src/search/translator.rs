//! Query translation.
//!
//! Turns a [`ValidatedSearch`] into a [`QueryPlan`], choosing for every
//! constraint between the structured secondary index and the full-text index.
//!
//! | constraint                          | index       | plan element               |
//! |-------------------------------------|-------------|----------------------------|
//! | string (default / `:exact`)         | structured  | `StartsWith` / `Equals`    |
//! | string `:contains` / `:text`        | full-text   | `FtsClause`                |
//! | token (`:not` negates)              | structured  | `Token`                    |
//! | token `:text`                       | full-text   | `FtsClause` on display text|
//! | date / number / quantity            | structured  | `Range`                    |
//! | reference                           | structured  | `Reference`                |
//! | uri (`:above` / `:below`)           | structured  | `UriEquals/Above/Below`    |
//! | composite                           | structured  | one `ElementMatch`         |
//! | `_text` / `_content`                | full-text   | `FtsClause`                |
//! | chain / `_has`                      | nested plan | `ChainedSubPlan`           |

use std::sync::Arc;

use crate::catalog::ParameterCatalog;
use crate::types::{SearchModifier, SearchParamType, SortDirection};

use super::constraint::{ParsedConstraint, ValidatedSearch};
use super::plan::{
    ChainedSubPlan, ComponentTest, FtsClause, FtsMode, Predicate, PredicateTest, QueryPlan,
    RangeValue, SortKey,
};
use super::values::{ConstraintValue, TypedValue};

/// Builds query plans from validated searches.
#[derive(Debug, Clone)]
pub struct QueryTranslator {
    catalog: Arc<ParameterCatalog>,
}

impl QueryTranslator {
    /// Creates a translator over the catalog the searches were validated against.
    pub fn new(catalog: Arc<ParameterCatalog>) -> Self {
        Self { catalog }
    }

    /// Translates a validated search.
    ///
    /// Validated input always translates. A constraint that cannot be
    /// translated is a contract violation: it is logged and skipped in release
    /// builds and panics in debug builds.
    pub fn translate(&self, search: &ValidatedSearch) -> QueryPlan {
        let mut plan = self.translate_constraints(&search.resource_type, &search.constraints);
        plan.sort = self.sort_keys(search);

        tracing::debug!(
            resource_type = %plan.resource_type,
            predicates = plan.predicates.len(),
            full_text = plan.full_text.len(),
            chained = plan.chain_count(),
            "Built query plan"
        );
        plan
    }

    fn translate_constraints(
        &self,
        resource_type: &str,
        constraints: &[ParsedConstraint],
    ) -> QueryPlan {
        let mut plan = QueryPlan::new(resource_type);
        for constraint in constraints {
            self.add_constraint(&mut plan, constraint);
        }
        plan
    }

    fn add_constraint(&self, plan: &mut QueryPlan, constraint: &ParsedConstraint) {
        if let Some(link) = &constraint.chain {
            let inner =
                self.translate_constraints(&link.target_type, std::slice::from_ref(&*link.inner));
            plan.chained.push(ChainedSubPlan {
                parameter: constraint.key.clone(),
                join_paths: constraint.definition.paths.clone(),
                direction: link.direction,
                target_type: link.target_type.clone(),
                plan: inner,
            });
            return;
        }

        let definition = &constraint.definition;

        if constraint.is_missing_test() {
            plan.predicates.push(Predicate {
                parameter: constraint.key.clone(),
                paths: definition.paths.clone(),
                tests: constraint
                    .values
                    .iter()
                    .filter_map(|v| match v.value {
                        TypedValue::Missing { missing } => Some(PredicateTest::Missing { missing }),
                        _ => None,
                    })
                    .collect(),
                negated: false,
            });
            return;
        }

        if let Some(clause) = full_text_clause(constraint) {
            plan.full_text.push(clause);
            return;
        }

        if definition.is_composite() {
            let tests = constraint
                .values
                .iter()
                .filter_map(|value| composite_test(constraint, value))
                .collect::<Vec<_>>();
            self.push_checked(plan, constraint, definition.paths.clone(), tests, false);
            return;
        }

        let tests = constraint
            .values
            .iter()
            .filter_map(|value| {
                scalar_test(definition.param_type, constraint.modifier.as_ref(), value)
            })
            .collect::<Vec<_>>();
        let negated = constraint.modifier == Some(SearchModifier::Not);
        self.push_checked(plan, constraint, definition.paths.clone(), tests, negated);
    }

    fn push_checked(
        &self,
        plan: &mut QueryPlan,
        constraint: &ParsedConstraint,
        paths: Vec<String>,
        tests: Vec<PredicateTest>,
        negated: bool,
    ) {
        if tests.len() != constraint.values.len() {
            tracing::error!(
                parameter = %constraint.key,
                values = constraint.values.len(),
                translated = tests.len(),
                "Validated constraint has values that cannot be translated"
            );
            debug_assert!(false, "untranslatable constraint '{}'", constraint.key);
            if tests.is_empty() {
                return;
            }
        }
        plan.predicates.push(Predicate {
            parameter: constraint.key.clone(),
            paths,
            tests,
            negated,
        });
    }

    fn sort_keys(&self, search: &ValidatedSearch) -> Vec<SortKey> {
        if search.result.sort.is_empty() {
            return SortKey::default_order();
        }

        let mut keys = Vec::with_capacity(search.result.sort.len() + 1);
        for directive in &search.result.sort {
            match self.catalog.get(&search.resource_type, &directive.parameter) {
                Some(definition) => keys.push(SortKey {
                    parameter: directive.parameter.clone(),
                    paths: definition.paths.clone(),
                    param_type: definition.param_type,
                    direction: directive.direction,
                }),
                None => {
                    tracing::error!(
                        parameter = %directive.parameter,
                        "Validated sort key is not in the catalog"
                    );
                    debug_assert!(false, "unknown sort key '{}'", directive.parameter);
                }
            }
        }

        if !keys.iter().any(|k| k.parameter == "_id") {
            let direction = keys
                .first()
                .map(|k| k.direction)
                .unwrap_or(SortDirection::Ascending);
            keys.push(SortKey::id(direction));
        }
        keys
    }
}

/// Routes full-text modifiers and the special parameters to the text index.
fn full_text_clause(constraint: &ParsedConstraint) -> Option<FtsClause> {
    let definition = &constraint.definition;
    let mode = match (&constraint.modifier, definition.param_type) {
        (_, SearchParamType::Special) => {
            if definition.name == "_content" {
                FtsMode::Contains
            } else {
                FtsMode::Text
            }
        }
        (Some(SearchModifier::Contains), _) => FtsMode::Contains,
        (Some(SearchModifier::Text), _) => FtsMode::Text,
        _ => return None,
    };

    let paths = match definition.param_type {
        SearchParamType::Token => definition
            .paths
            .iter()
            .flat_map(|p| {
                [
                    format!("{}.text", p),
                    format!("{}.coding.display", p),
                    format!("{}.display", p),
                ]
            })
            .collect(),
        _ => definition
            .paths
            .iter()
            .filter(|p| !p.is_empty())
            .cloned()
            .collect(),
    };

    let terms = constraint
        .values
        .iter()
        .filter_map(|v| v.value.as_text().map(str::to_string))
        .collect();

    Some(FtsClause {
        parameter: constraint.key.clone(),
        paths,
        mode,
        terms,
    })
}

fn scalar_test(
    param_type: SearchParamType,
    modifier: Option<&SearchModifier>,
    value: &ConstraintValue,
) -> Option<PredicateTest> {
    let prefix = value.effective_prefix();
    let test = match (&value.value, param_type) {
        (TypedValue::String { text }, _) => match modifier {
            Some(SearchModifier::Exact) => PredicateTest::Equals {
                value: text.clone(),
            },
            _ => PredicateTest::StartsWith {
                value: text.clone(),
            },
        },
        (TypedValue::Token { system, code }, _) => PredicateTest::Token {
            system: system.clone(),
            code: code.clone(),
        },
        (TypedValue::Date { range }, _) => PredicateTest::Range {
            prefix,
            value: RangeValue::Date { range: *range },
        },
        (TypedValue::Number { number }, _) => PredicateTest::Range {
            prefix,
            value: RangeValue::Number { number: *number },
        },
        (
            TypedValue::Quantity {
                number,
                system,
                code,
            },
            _,
        ) => PredicateTest::Range {
            prefix,
            value: RangeValue::Quantity {
                number: *number,
                system: system.clone(),
                code: code.clone(),
            },
        },
        (TypedValue::Reference { reference }, _) => PredicateTest::Reference {
            reference: reference.clone(),
        },
        (TypedValue::Uri { uri }, _) => match modifier {
            Some(SearchModifier::Above) => PredicateTest::UriAbove { value: uri.clone() },
            Some(SearchModifier::Below) => PredicateTest::UriBelow { value: uri.clone() },
            _ => PredicateTest::UriEquals { value: uri.clone() },
        },
        (TypedValue::Missing { missing }, _) => PredicateTest::Missing { missing: *missing },
        (TypedValue::Composite { .. }, _) => return None,
    };
    Some(test)
}

/// One composite value becomes one element-scoped match over all components.
fn composite_test(constraint: &ParsedConstraint, value: &ConstraintValue) -> Option<PredicateTest> {
    let TypedValue::Composite { components } = &value.value else {
        return None;
    };
    let definitions = &constraint.definition.components;
    if definitions.len() != components.len() {
        return None;
    }

    let tests = definitions
        .iter()
        .zip(components)
        .map(|(definition, component)| {
            scalar_test(definition.param_type, None, component).map(|test| ComponentTest {
                paths: definition.paths.clone(),
                test,
            })
        })
        .collect::<Option<Vec<_>>>()?;
    Some(PredicateTest::ElementMatch { components: tests })
}
