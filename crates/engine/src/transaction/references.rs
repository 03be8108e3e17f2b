//! `urn:uuid:` placeholder bindings and reference rewriting.

use std::collections::{BTreeMap, BTreeSet};

use serde_json::Value;

use crate::types::ResourceRef;

const URN_UUID: &str = "urn:uuid:";

/// Returns true for `urn:uuid:` placeholders.
pub fn is_urn(value: &str) -> bool {
    value.starts_with(URN_UUID) && value.len() > URN_UUID.len()
}

/// Extracts the placeholder from `urn:uuid:x` or `Type/urn:uuid:x`.
fn placeholder(reference: &str) -> Option<&str> {
    if is_urn(reference) {
        return Some(reference);
    }
    let (_, tail) = reference.split_once('/')?;
    is_urn(tail).then_some(tail)
}

/// Placeholders bound to server ids, with the entry that declared each.
#[derive(Debug, Clone, Default)]
pub struct UrnBindings {
    bound: BTreeMap<String, (ResourceRef, usize)>,
}

impl UrnBindings {
    /// Binds a placeholder. The first declaration wins.
    pub fn bind(&mut self, urn: &str, reference: ResourceRef, declared_by: usize) {
        self.bound
            .entry(urn.to_string())
            .or_insert((reference, declared_by));
    }

    /// Looks up a placeholder.
    pub fn get(&self, urn: &str) -> Option<(&ResourceRef, usize)> {
        self.bound.get(urn).map(|(r, i)| (r, *i))
    }

    /// Number of bound placeholders.
    pub fn len(&self) -> usize {
        self.bound.len()
    }

    /// True when nothing is bound.
    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }

    /// Drops the declaring entries.
    pub fn into_references(self) -> BTreeMap<String, ResourceRef> {
        self.bound.into_iter().map(|(k, (r, _))| (k, r)).collect()
    }
}

/// Rewrites every placeholder `reference` in `resource` to `Type/id`.
///
/// Returns the indexes of the entries that declared the rewritten
/// placeholders, or the first placeholder that nothing declares. On error
/// the resource may be partially rewritten.
pub fn rewrite(resource: &mut Value, bindings: &UrnBindings) -> Result<BTreeSet<usize>, String> {
    let mut depends_on = BTreeSet::new();
    rewrite_value(resource, bindings, &mut depends_on)?;
    Ok(depends_on)
}

fn rewrite_value(
    value: &mut Value,
    bindings: &UrnBindings,
    depends_on: &mut BTreeSet<usize>,
) -> Result<(), String> {
    match value {
        Value::Object(map) => {
            for (key, child) in map.iter_mut() {
                if key == "reference" {
                    if let Value::String(reference) = child {
                        if let Some(urn) = placeholder(reference) {
                            let (bound, declared_by) =
                                bindings.get(urn).ok_or_else(|| urn.to_string())?;
                            depends_on.insert(declared_by);
                            *reference = bound.to_string();
                        }
                        continue;
                    }
                }
                rewrite_value(child, bindings, depends_on)?;
            }
            Ok(())
        }
        Value::Array(items) => items
            .iter_mut()
            .try_for_each(|item| rewrite_value(item, bindings, depends_on)),
        _ => Ok(()),
    }
}
