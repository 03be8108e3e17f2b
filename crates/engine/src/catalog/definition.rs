//! Search parameter definitions.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::types::{SearchModifier, SearchParamType, SearchPrefix};

/// Definition of one search parameter on one resource type.
///
/// `paths` are dotted element paths into the resource JSON. Arrays are
/// traversed implicitly, and `name` on a Patient reaches every `HumanName`.
/// For composite parameters `paths` holds the single repeating element the
/// components must co-occur on (empty string for the resource root), and each
/// component's paths are relative to that element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParameterDefinition {
    /// The parameter code as used in query strings.
    pub name: String,

    /// The FHIR search type.
    pub param_type: SearchParamType,

    /// Element paths the parameter indexes.
    pub paths: Vec<String>,

    /// Modifiers the parameter accepts.
    pub allowed_modifiers: BTreeSet<SearchModifier>,

    /// Prefixes the parameter accepts.
    pub allowed_prefixes: BTreeSet<SearchPrefix>,

    /// Resource types a reference parameter may point to.
    pub target_types: BTreeSet<String>,

    /// Ordered components of a composite parameter.
    pub components: Vec<ParameterDefinition>,

    /// False when the element is single-valued, so repeating the key is a conflict.
    pub repeatable: bool,
}

impl ParameterDefinition {
    /// Creates a definition with the default modifiers and prefixes of its type.
    pub fn new<I, S>(name: impl Into<String>, param_type: SearchParamType, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            param_type,
            paths: paths.into_iter().map(Into::into).collect(),
            allowed_modifiers: SearchModifier::defaults_for(param_type)
                .into_iter()
                .collect(),
            allowed_prefixes: SearchPrefix::defaults_for(param_type).into_iter().collect(),
            target_types: BTreeSet::new(),
            components: Vec::new(),
            repeatable: true,
        }
    }

    /// Creates a composite definition over the given repeating element.
    pub fn composite(
        name: impl Into<String>,
        element_path: impl Into<String>,
        components: Vec<ParameterDefinition>,
    ) -> Self {
        let mut def = Self::new(name, SearchParamType::Composite, [element_path.into()]);
        def.components = components;
        def
    }

    /// Sets target types for reference parameters, enabling one `:Type`
    /// modifier per target.
    pub fn with_targets<I, S>(mut self, targets: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.target_types = targets.into_iter().map(Into::into).collect();
        for target in &self.target_types {
            self.allowed_modifiers
                .insert(SearchModifier::Type(target.clone()));
        }
        self
    }

    /// Replaces the accepted modifiers.
    pub fn with_modifiers<I>(mut self, modifiers: I) -> Self
    where
        I: IntoIterator<Item = SearchModifier>,
    {
        self.allowed_modifiers = modifiers.into_iter().collect();
        self
    }

    /// Marks the element as single-valued.
    pub fn single_valued(mut self) -> Self {
        self.repeatable = false;
        self
    }

    /// Returns whether this is a composite parameter.
    pub fn is_composite(&self) -> bool {
        self.param_type == SearchParamType::Composite && !self.components.is_empty()
    }

    /// Returns whether this parameter is answered by the full-text index.
    pub fn is_full_text(&self) -> bool {
        self.param_type == SearchParamType::Special
    }

    /// Returns the repeating element of a composite parameter.
    pub fn element_path(&self) -> &str {
        self.paths.first().map(String::as_str).unwrap_or("")
    }

    /// Returns true if the modifier is declared for this parameter.
    pub fn supports_modifier(&self, modifier: &SearchModifier) -> bool {
        self.allowed_modifiers.contains(modifier)
    }

    /// Returns true if the prefix is declared for this parameter.
    pub fn supports_prefix(&self, prefix: SearchPrefix) -> bool {
        self.allowed_prefixes.contains(&prefix)
    }

    /// Returns the only target type, if exactly one is declared.
    pub fn single_target(&self) -> Option<&str> {
        if self.target_types.len() == 1 {
            self.target_types.iter().next().map(String::as_str)
        } else {
            None
        }
    }
}
