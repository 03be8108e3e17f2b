//! Plan evaluation over in-memory JSON documents.
//!
//! Mirrors what a document store does with its two indexes: predicates are
//! checked against element values, full-text clauses against the string
//! content of the document.

use std::cmp::Ordering;

use rust_decimal::prelude::ToPrimitive;
use serde_json::Value;
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::core::values_at;
use crate::search::{
    ComponentTest, DateRange, FtsClause, FtsMode, NumberValue, Predicate, PredicateTest,
    QueryPlan, RangeValue, SortKey, TokenSystem,
};
use crate::types::{CursorValue, ResourceRef, SearchParamType, SortDirection};

/// Case-folded, accent-stripped form used by string matching.
pub(crate) fn normalize(text: &str) -> String {
    text.nfkd()
        .filter(|c| !is_combining_mark(*c))
        .flat_map(char::to_lowercase)
        .collect()
}

fn string_leaves<'a>(value: &'a Value, out: &mut Vec<&'a str>) {
    match value {
        Value::String(s) => out.push(s),
        Value::Array(items) => items.iter().for_each(|v| string_leaves(v, out)),
        Value::Object(map) => map.values().for_each(|v| string_leaves(v, out)),
        _ => {}
    }
}

/// Returns true if a document satisfies a bound plan.
pub(crate) fn matches_plan(plan: &QueryPlan, document: &Value) -> bool {
    if !plan.is_bound() {
        tracing::error!(
            resource_type = %plan.resource_type,
            "Plan reached storage with unresolved chains"
        );
        return false;
    }
    plan.predicates.iter().all(|p| matches_predicate(p, document))
        && plan.full_text.iter().all(|c| matches_clause(c, document))
}

fn matches_predicate(predicate: &Predicate, document: &Value) -> bool {
    let values: Vec<&Value> = predicate
        .paths
        .iter()
        .flat_map(|path| values_at(document, path))
        .collect();

    let hit = predicate.tests.iter().any(|test| match test {
        PredicateTest::Missing { missing } => values.is_empty() == *missing,
        PredicateTest::IdIn { ids } => document
            .get("id")
            .and_then(Value::as_str)
            .is_some_and(|id| ids.contains(id)),
        _ => values.iter().any(|value| matches_test(test, value)),
    });
    hit != predicate.negated
}

fn matches_test(test: &PredicateTest, value: &Value) -> bool {
    match test {
        PredicateTest::StartsWith { value: wanted } => {
            let wanted = normalize(wanted);
            let mut leaves = Vec::new();
            string_leaves(value, &mut leaves);
            leaves.iter().any(|s| normalize(s).starts_with(&wanted))
        }
        PredicateTest::Equals { value: wanted } => {
            let mut leaves = Vec::new();
            string_leaves(value, &mut leaves);
            leaves.iter().any(|s| s == wanted)
        }
        PredicateTest::Token { system, code } => matches_token(system, code.as_deref(), value),
        PredicateTest::Range { prefix, value: range } => match range {
            RangeValue::Date { range } => {
                date_range_of(value).is_some_and(|target| range.matches(*prefix, &target))
            }
            RangeValue::Number { number } => NumberValue::from_json(value)
                .is_some_and(|d| number.matches(*prefix, d)),
            RangeValue::Quantity {
                number,
                system,
                code,
            } => {
                let unit_ok = system
                    .as_deref()
                    .is_none_or(|s| value.get("system").and_then(Value::as_str) == Some(s))
                    && code.as_deref().is_none_or(|c| {
                        value.get("code").and_then(Value::as_str) == Some(c)
                            || value.get("unit").and_then(Value::as_str) == Some(c)
                    });
                unit_ok
                    && value
                        .get("value")
                        .and_then(NumberValue::from_json)
                        .is_some_and(|d| number.matches(*prefix, d))
            }
        },
        PredicateTest::Reference { reference } => {
            reference_string(value).is_some_and(|r| reference.matches(r))
        }
        PredicateTest::ReferenceIn { refs } => reference_string(value)
            .and_then(ResourceRef::parse)
            .is_some_and(|r| refs.contains(&r)),
        PredicateTest::IdIn { ids } => value.as_str().is_some_and(|id| ids.contains(id)),
        PredicateTest::Missing { .. } => false,
        PredicateTest::UriEquals { value: wanted } => value.as_str() == Some(wanted.as_str()),
        PredicateTest::UriAbove { value: wanted } => value
            .as_str()
            .is_some_and(|stored| wanted.starts_with(stored)),
        PredicateTest::UriBelow { value: wanted } => value
            .as_str()
            .is_some_and(|stored| stored.starts_with(wanted.as_str())),
        PredicateTest::ElementMatch { components } => {
            components.iter().all(|c| matches_component(c, value))
        }
    }
}

/// Every component is checked inside the same element occurrence.
fn matches_component(component: &ComponentTest, element: &Value) -> bool {
    component.paths.iter().any(|path| {
        values_at(element, path)
            .iter()
            .any(|v| matches_test(&component.test, v))
    })
}

fn matches_token(system: &TokenSystem, code: Option<&str>, value: &Value) -> bool {
    let check = |coded_system: Option<&str>, coded: Option<&str>| {
        system.accepts(coded_system) && code.is_none_or(|c| coded == Some(c))
    };
    match value {
        Value::String(s) => check(None, Some(s.as_str())),
        Value::Bool(b) => check(None, Some(if *b { "true" } else { "false" })),
        Value::Object(map) => {
            if let Some(codings) = map.get("coding") {
                return values_at(codings, "")
                    .iter()
                    .any(|coding| matches_token(system, code, coding));
            }
            let coded_system = map.get("system").and_then(Value::as_str);
            let coded = map
                .get("code")
                .or_else(|| map.get("value"))
                .and_then(Value::as_str);
            check(coded_system, coded)
        }
        _ => false,
    }
}

fn reference_string(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) => map.get("reference").and_then(Value::as_str),
        Value::String(s) => Some(s.as_str()),
        _ => None,
    }
}

fn date_range_of(value: &Value) -> Option<DateRange> {
    match value {
        Value::String(s) => DateRange::parse_lenient(s),
        Value::Object(map) => DateRange::from_period(
            map.get("start").and_then(Value::as_str),
            map.get("end").and_then(Value::as_str),
        ),
        _ => None,
    }
}

// ============================================================================
// Full text
// ============================================================================

fn matches_clause(clause: &FtsClause, document: &Value) -> bool {
    let mut leaves = Vec::new();
    if clause.paths.is_empty() {
        string_leaves(document, &mut leaves);
    } else {
        for path in &clause.paths {
            for value in values_at(document, path) {
                string_leaves(value, &mut leaves);
            }
        }
    }
    let texts: Vec<String> = leaves.iter().map(|s| normalize(s)).collect();

    clause.terms.iter().any(|term| {
        let term = normalize(term);
        match clause.mode {
            FtsMode::Contains => texts.iter().any(|t| t.contains(&term)),
            FtsMode::Text => {
                let words: Vec<&str> = texts.iter().flat_map(|t| words(t)).collect();
                words_of(&term)
                    .iter()
                    .all(|w| words.iter().any(|candidate| candidate.starts_with(w)))
            }
        }
    })
}

fn words(text: &str) -> impl Iterator<Item = &str> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
}

fn words_of(text: &str) -> Vec<&str> {
    words(text).collect()
}

// ============================================================================
// Ordering
// ============================================================================

/// Computes the sort values of a document, one per key.
pub(crate) fn sort_values(keys: &[SortKey], document: &Value) -> Vec<CursorValue> {
    keys.iter().map(|key| sort_value(key, document)).collect()
}

fn sort_value(key: &SortKey, document: &Value) -> CursorValue {
    let candidates: Vec<CursorValue> = key
        .paths
        .iter()
        .flat_map(|path| values_at(document, path))
        .filter_map(|v| cursor_value(key.param_type, v))
        .collect();

    let pick = match key.direction {
        SortDirection::Ascending => candidates.into_iter().min_by(|a, b| a.compare(b)),
        SortDirection::Descending => candidates.into_iter().max_by(|a, b| a.compare(b)),
    };
    pick.unwrap_or(CursorValue::Null)
}

fn cursor_value(param_type: SearchParamType, value: &Value) -> Option<CursorValue> {
    match param_type {
        SearchParamType::Date => date_range_of(value).map(|r| {
            CursorValue::String(r.start.format("%Y-%m-%dT%H:%M:%S%.9fZ").to_string())
        }),
        SearchParamType::Number => NumberValue::from_json(value)
            .and_then(|d| d.to_f64())
            .map(CursorValue::Decimal),
        SearchParamType::Quantity => value
            .get("value")
            .and_then(NumberValue::from_json)
            .and_then(|d| d.to_f64())
            .map(CursorValue::Decimal),
        SearchParamType::Token => match value {
            Value::Bool(b) => Some(CursorValue::Boolean(*b)),
            Value::String(s) => Some(CursorValue::String(s.clone())),
            Value::Object(map) => map
                .get("coding")
                .and_then(|codings| values_at(codings, "code").into_iter().next())
                .or_else(|| map.get("code"))
                .or_else(|| map.get("value"))
                .and_then(Value::as_str)
                .map(|s| CursorValue::String(s.to_string())),
            _ => None,
        },
        _ => {
            let mut leaves = Vec::new();
            string_leaves(value, &mut leaves);
            leaves
                .first()
                .map(|s| CursorValue::String(normalize(s)))
        }
    }
}

/// Orders two rows by their sort values; the values already end with the id.
pub(crate) fn compare_rows(keys: &[SortKey], a: &[CursorValue], b: &[CursorValue]) -> Ordering {
    for ((key, x), y) in keys.iter().zip(a).zip(b) {
        let ordering = match key.direction {
            SortDirection::Ascending => x.compare(y),
            SortDirection::Descending => y.compare(x),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}
