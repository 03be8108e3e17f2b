//! The parameter catalog.
//!
//! An immutable index of [`ParameterDefinition`]s keyed by resource type and
//! parameter name. Built once at startup through [`CatalogBuilder`] and shared
//! behind an `Arc`; nothing mutates it afterwards.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::types::{SearchModifier, SearchParamType};

use super::definition::ParameterDefinition;

/// Error while building a catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// A parameter name appears twice for one resource type.
    DuplicateParameter {
        /// The resource type.
        resource_type: String,
        /// The repeated name.
        name: String,
    },

    /// A definition is internally inconsistent.
    InvalidDefinition {
        /// The resource type.
        resource_type: String,
        /// The parameter name.
        name: String,
        /// What is wrong.
        message: String,
    },
}

impl fmt::Display for CatalogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CatalogError::DuplicateParameter {
                resource_type,
                name,
            } => write!(
                f,
                "Search parameter '{}' registered twice for {}",
                name, resource_type
            ),
            CatalogError::InvalidDefinition {
                resource_type,
                name,
                message,
            } => write!(
                f,
                "Invalid search parameter '{}' on {}: {}",
                name, resource_type, message
            ),
        }
    }
}

impl std::error::Error for CatalogError {}

/// Immutable registry of search parameters per resource type.
pub struct ParameterCatalog {
    /// Parameters indexed by (resource_type, name).
    params_by_type: HashMap<String, HashMap<String, Arc<ParameterDefinition>>>,
}

impl ParameterCatalog {
    /// Starts building a catalog.
    pub fn builder() -> CatalogBuilder {
        CatalogBuilder::default()
    }

    /// Returns the catalog of built-in definitions.
    pub fn builtin() -> Result<Self, CatalogError> {
        super::builtin::register_all(Self::builder())?.build()
    }

    /// Gets a parameter by resource type and name.
    pub fn get(&self, resource_type: &str, name: &str) -> Option<&Arc<ParameterDefinition>> {
        self.params_by_type
            .get(resource_type)
            .and_then(|params| params.get(name))
    }

    /// Returns true if the resource type is searchable.
    pub fn contains_type(&self, resource_type: &str) -> bool {
        self.params_by_type.contains_key(resource_type)
    }

    /// Returns all searchable resource types, sorted.
    pub fn resource_types(&self) -> Vec<&str> {
        let mut types: Vec<&str> = self.params_by_type.keys().map(String::as_str).collect();
        types.sort_unstable();
        types
    }

    /// Returns all parameters of a resource type, sorted by name.
    pub fn params_for(&self, resource_type: &str) -> Vec<&Arc<ParameterDefinition>> {
        let mut params: Vec<&Arc<ParameterDefinition>> = self
            .params_by_type
            .get(resource_type)
            .map(|params| params.values().collect())
            .unwrap_or_default();
        params.sort_by(|a, b| a.name.cmp(&b.name));
        params
    }

    /// Returns the reference parameters of a resource type, sorted by name.
    pub fn reference_params(&self, resource_type: &str) -> Vec<&Arc<ParameterDefinition>> {
        self.params_for(resource_type)
            .into_iter()
            .filter(|p| p.param_type == SearchParamType::Reference)
            .collect()
    }

    /// Returns the number of registered definitions across all types.
    pub fn len(&self) -> usize {
        self.params_by_type.values().map(HashMap::len).sum()
    }

    /// Returns true if the catalog is empty.
    pub fn is_empty(&self) -> bool {
        self.params_by_type.is_empty()
    }
}

impl fmt::Debug for ParameterCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterCatalog")
            .field("resource_types", &self.params_by_type.len())
            .field("params", &self.len())
            .finish()
    }
}

/// Builder for [`ParameterCatalog`].
#[derive(Debug, Default)]
pub struct CatalogBuilder {
    params_by_type: HashMap<String, HashMap<String, Arc<ParameterDefinition>>>,
}

impl CatalogBuilder {
    /// Registers a parameter for a resource type.
    pub fn register(
        mut self,
        resource_type: &str,
        param: ParameterDefinition,
    ) -> Result<Self, CatalogError> {
        check_definition(resource_type, &param)?;

        let params = self
            .params_by_type
            .entry(resource_type.to_string())
            .or_default();
        if params.contains_key(&param.name) {
            return Err(CatalogError::DuplicateParameter {
                resource_type: resource_type.to_string(),
                name: param.name,
            });
        }
        params.insert(param.name.clone(), Arc::new(param));
        Ok(self)
    }

    /// Registers several parameters for one resource type.
    pub fn register_all<I>(mut self, resource_type: &str, params: I) -> Result<Self, CatalogError>
    where
        I: IntoIterator<Item = ParameterDefinition>,
    {
        for param in params {
            self = self.register(resource_type, param)?;
        }
        Ok(self)
    }

    /// Adds the resource-level parameters to every registered type and freezes
    /// the catalog.
    pub fn build(mut self) -> Result<ParameterCatalog, CatalogError> {
        let types: Vec<String> = self.params_by_type.keys().cloned().collect();
        for resource_type in types {
            for param in resource_level_params() {
                self = self.register(&resource_type, param)?;
            }
        }
        Ok(ParameterCatalog {
            params_by_type: self.params_by_type,
        })
    }
}

/// Parameters every resource type supports.
fn resource_level_params() -> Vec<ParameterDefinition> {
    vec![
        ParameterDefinition::new("_id", SearchParamType::Token, ["id"])
            .with_modifiers([SearchModifier::Not])
            .single_valued(),
        ParameterDefinition::new("_lastUpdated", SearchParamType::Date, ["meta.lastUpdated"])
            .with_modifiers([]),
        ParameterDefinition::new("_profile", SearchParamType::Uri, ["meta.profile"]),
        ParameterDefinition::new("_text", SearchParamType::Special, ["text.div"]),
        ParameterDefinition::new("_content", SearchParamType::Special, [""]),
    ]
}

fn check_definition(resource_type: &str, param: &ParameterDefinition) -> Result<(), CatalogError> {
    let invalid = |message: &str| CatalogError::InvalidDefinition {
        resource_type: resource_type.to_string(),
        name: param.name.clone(),
        message: message.to_string(),
    };

    if param.name.is_empty() {
        return Err(invalid("empty name"));
    }
    match param.param_type {
        SearchParamType::Reference if param.target_types.is_empty() => {
            Err(invalid("reference parameter without target types"))
        }
        SearchParamType::Composite if param.components.len() < 2 => {
            Err(invalid("composite parameter needs at least two components"))
        }
        SearchParamType::Composite
            if param
                .components
                .iter()
                .any(|c| c.param_type == SearchParamType::Composite) =>
        {
            Err(invalid("composite components cannot be composite"))
        }
        _ if param.paths.is_empty() => Err(invalid("no element paths")),
        _ => Ok(()),
    }
}
