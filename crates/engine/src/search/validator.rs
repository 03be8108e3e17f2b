//! Search parameter validation.
//!
//! [`ParameterValidator::validate`] binds every raw parameter to its catalog
//! definition, parses its values, and checks cross-parameter rules. It never
//! stops at the first problem: every issue found is returned together so a
//! client gets one complete OperationOutcome.

use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;

use crate::catalog::{ParameterCatalog, ParameterDefinition};
use crate::config::EngineConfig;
use crate::error::{ValidationCode, ValidationErrors};
use crate::types::{
    IncludeDirective, IncludeType, PageCursor, SearchModifier, SearchParamType, SearchPrefix,
    SortDirective, SummaryMode, TotalMode, is_logical_id,
};

use super::constraint::{
    ChainDirection, ChainLink, ParsedConstraint, ResultParameters, ValidatedSearch,
};
use super::raw::{RawParameter, RawParams, split_key};
use super::values::{ConstraintValue, ReferenceValue, TokenSystem, TypedValue, split_composite};

static ELEMENT_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z][A-Za-z0-9_]*$").expect("static regex"));

/// Server policy applied during validation.
#[derive(Debug, Clone)]
pub struct ValidationPolicy {
    /// `_count` when absent.
    pub default_page_size: u32,
    /// Upper clamp for `_count`.
    pub max_page_size: u32,
    /// Maximum chain hops (forward or `_has`).
    pub max_chain_depth: usize,
    /// Whether `_id` may be combined with other filters.
    pub allow_id_with_filters: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self::from(&EngineConfig::default())
    }
}

impl From<&EngineConfig> for ValidationPolicy {
    fn from(config: &EngineConfig) -> Self {
        Self {
            default_page_size: config.default_page_size,
            max_page_size: config.max_page_size,
            max_chain_depth: config.max_chain_depth,
            allow_id_with_filters: config.allow_id_with_filters,
        }
    }
}

/// Validates raw search parameters against the catalog.
#[derive(Debug, Clone)]
pub struct ParameterValidator {
    catalog: Arc<ParameterCatalog>,
    policy: ValidationPolicy,
}

type ValueError = (ValidationCode, String);

impl ParameterValidator {
    /// Creates a validator.
    pub fn new(catalog: Arc<ParameterCatalog>, policy: ValidationPolicy) -> Self {
        Self { catalog, policy }
    }

    /// Returns the catalog.
    pub fn catalog(&self) -> &Arc<ParameterCatalog> {
        &self.catalog
    }

    /// Validates the parameters of a search on `resource_type`.
    pub fn validate(
        &self,
        resource_type: &str,
        raw: &RawParams,
    ) -> Result<ValidatedSearch, ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if !self.catalog.contains_type(resource_type) {
            errors.push(
                ValidationCode::UnknownParameter,
                "resourceType",
                format!("Resource type '{}' is not searchable", resource_type),
            );
            return Err(errors);
        }

        let mut result = ResultParameters {
            count: self.policy.default_page_size,
            ..Default::default()
        };
        let mut constraints = Vec::new();
        let mut link_params = Vec::new();
        let mut seen: HashMap<&str, usize> = HashMap::new();

        for param in raw.iter() {
            if !matches!(param.name.as_str(), "_cursor" | "_offset") {
                link_params.push((param.key.clone(), param.joined_values()));
            }

            match param.name.as_str() {
                "_count" | "_offset" | "_summary" | "_elements" | "_sort" | "_cursor"
                | "_total" => {
                    let occurrences = seen.entry(param.name.as_str()).or_default();
                    *occurrences += 1;
                    if *occurrences == 2 {
                        errors.push(
                            ValidationCode::ParameterConflict,
                            &param.key,
                            format!("'{}' may only be given once", param.name),
                        );
                    }
                    self.result_parameter(resource_type, param, &mut result, &mut errors);
                }
                "_include" | "_revinclude" => {
                    self.include_parameter(resource_type, param, &mut result, &mut errors);
                }
                _ => {
                    let bound = self.bind(
                        &param.key,
                        resource_type,
                        &param.name,
                        param.modifier.as_deref(),
                        param.chain.as_deref(),
                        &param.values,
                        0,
                        &mut errors,
                    );
                    if let Some(constraint) = bound {
                        constraints.push(constraint);
                    }
                }
            }
        }

        self.check_conflicts(&constraints, &result, &mut errors);

        tracing::debug!(
            resource_type = %resource_type,
            constraints = constraints.len(),
            issues = errors.len(),
            "Validated search parameters"
        );

        errors.into_result(ValidatedSearch {
            resource_type: resource_type.to_string(),
            constraints,
            result,
            link_params,
        })
    }

    // ========================================================================
    // Filter parameters
    // ========================================================================

    #[allow(clippy::too_many_arguments)]
    fn bind(
        &self,
        key: &str,
        resource_type: &str,
        name: &str,
        modifier: Option<&str>,
        chain: Option<&str>,
        values: &[String],
        depth: usize,
        errors: &mut ValidationErrors,
    ) -> Option<ParsedConstraint> {
        if name == "_has" {
            return self.bind_reverse_chain(key, resource_type, chain, values, depth, errors);
        }

        let Some(definition) = self.catalog.get(resource_type, name) else {
            errors.push(
                ValidationCode::UnknownParameter,
                key,
                format!("Unknown search parameter '{}' for {}", name, resource_type),
            );
            return None;
        };

        let modifier = match modifier {
            None => None,
            Some(text) => match SearchModifier::parse(text) {
                Some(m) if definition.supports_modifier(&m) => Some(m),
                Some(m) => {
                    errors.push(
                        ValidationCode::UnsupportedModifier,
                        key,
                        format!(
                            "Modifier ':{}' is not supported by {} parameter '{}'",
                            m, definition.param_type, name
                        ),
                    );
                    return None;
                }
                None => {
                    errors.push(
                        ValidationCode::UnsupportedModifier,
                        key,
                        format!("Unknown modifier ':{}'", text),
                    );
                    return None;
                }
            },
        };

        if let Some(chain) = chain {
            return self.bind_forward_chain(
                key,
                resource_type,
                definition,
                modifier,
                chain,
                values,
                depth,
                errors,
            );
        }

        let before = errors.len();
        let mut parsed = Vec::with_capacity(values.len());
        for value in values {
            let result = if modifier == Some(SearchModifier::Missing) {
                parse_missing(value)
            } else {
                parse_value(definition, modifier.as_ref(), value)
            };
            match result {
                Ok(v) => parsed.push(v),
                Err((code, message)) => errors.push(code, key, message),
            }
        }
        if errors.len() > before {
            return None;
        }

        Some(ParsedConstraint {
            key: key.to_string(),
            definition: Arc::clone(definition),
            modifier,
            values: parsed,
            chain: None,
        })
    }

    #[allow(clippy::too_many_arguments)]
    fn bind_forward_chain(
        &self,
        key: &str,
        resource_type: &str,
        definition: &Arc<ParameterDefinition>,
        modifier: Option<SearchModifier>,
        chain: &str,
        values: &[String],
        depth: usize,
        errors: &mut ValidationErrors,
    ) -> Option<ParsedConstraint> {
        if definition.param_type != SearchParamType::Reference {
            errors.push(
                ValidationCode::FormatInvalid,
                key,
                format!(
                    "Cannot chain through '{}': it is a {} parameter, not a reference",
                    definition.name, definition.param_type
                ),
            );
            return None;
        }

        if depth + 1 > self.policy.max_chain_depth {
            errors.push(
                ValidationCode::ChainTooDeep,
                key,
                format!(
                    "Chain exceeds the maximum depth of {}",
                    self.policy.max_chain_depth
                ),
            );
            return None;
        }

        let target_type = match (&modifier, definition.single_target()) {
            (Some(SearchModifier::Type(t)), _) => t.clone(),
            (None, Some(t)) => t.to_string(),
            (None, None) => {
                errors.push(
                    ValidationCode::FormatInvalid,
                    key,
                    format!(
                        "Chain through '{}' is ambiguous ({}); add a :Type modifier",
                        definition.name,
                        definition
                            .target_types
                            .iter()
                            .cloned()
                            .collect::<Vec<_>>()
                            .join(", ")
                    ),
                );
                return None;
            }
            (Some(m), _) => {
                errors.push(
                    ValidationCode::UnsupportedModifier,
                    key,
                    format!("Modifier ':{}' cannot be used on a chained parameter", m),
                );
                return None;
            }
        };

        if !self.catalog.contains_type(&target_type) {
            errors.push(
                ValidationCode::UnknownParameter,
                key,
                format!("Resource type '{}' is not searchable", target_type),
            );
            return None;
        }

        let (name, inner_modifier, inner_chain) = split_key(chain);
        let inner = self.bind(
            key,
            &target_type,
            &name,
            inner_modifier.as_deref(),
            inner_chain.as_deref(),
            values,
            depth + 1,
            errors,
        )?;

        Some(ParsedConstraint {
            key: key.to_string(),
            definition: Arc::clone(definition),
            modifier,
            values: Vec::new(),
            chain: Some(ChainLink {
                direction: ChainDirection::Forward,
                target_type,
                inner: Box::new(inner),
            }),
        })
    }

    fn bind_reverse_chain(
        &self,
        key: &str,
        resource_type: &str,
        chain: Option<&str>,
        values: &[String],
        depth: usize,
        errors: &mut ValidationErrors,
    ) -> Option<ParsedConstraint> {
        if depth + 1 > self.policy.max_chain_depth {
            errors.push(
                ValidationCode::ChainTooDeep,
                key,
                format!(
                    "Chain exceeds the maximum depth of {}",
                    self.policy.max_chain_depth
                ),
            );
            return None;
        }

        let parts: Vec<&str> = chain.unwrap_or("").splitn(3, ':').collect();
        let [source_type, reference, rest] = parts.as_slice() else {
            errors.push(
                ValidationCode::FormatInvalid,
                key,
                "Expected _has:Type:reference:parameter",
            );
            return None;
        };
        if source_type.is_empty() || reference.is_empty() || rest.is_empty() {
            errors.push(
                ValidationCode::FormatInvalid,
                key,
                "Expected _has:Type:reference:parameter",
            );
            return None;
        }

        if !self.catalog.contains_type(source_type) {
            errors.push(
                ValidationCode::UnknownParameter,
                key,
                format!("Resource type '{}' is not searchable", source_type),
            );
            return None;
        }
        let Some(definition) = self.catalog.get(source_type, reference) else {
            errors.push(
                ValidationCode::UnknownParameter,
                key,
                format!(
                    "Unknown search parameter '{}' for {}",
                    reference, source_type
                ),
            );
            return None;
        };
        if definition.param_type != SearchParamType::Reference
            || !definition.target_types.contains(resource_type)
        {
            errors.push(
                ValidationCode::FormatInvalid,
                key,
                format!(
                    "{}.{} is not a reference to {}",
                    source_type, reference, resource_type
                ),
            );
            return None;
        }

        let (name, inner_modifier, inner_chain) = split_key(rest);
        let inner = self.bind(
            key,
            source_type,
            &name,
            inner_modifier.as_deref(),
            inner_chain.as_deref(),
            values,
            depth + 1,
            errors,
        )?;

        Some(ParsedConstraint {
            key: key.to_string(),
            definition: Arc::clone(definition),
            modifier: None,
            values: Vec::new(),
            chain: Some(ChainLink {
                direction: ChainDirection::Reverse,
                target_type: source_type.to_string(),
                inner: Box::new(inner),
            }),
        })
    }

    // ========================================================================
    // Result parameters
    // ========================================================================

    fn result_parameter(
        &self,
        resource_type: &str,
        param: &RawParameter,
        result: &mut ResultParameters,
        errors: &mut ValidationErrors,
    ) {
        if param.modifier.is_some() || param.chain.is_some() {
            errors.push(
                ValidationCode::UnsupportedModifier,
                &param.key,
                format!("'{}' does not accept modifiers", param.name),
            );
            return;
        }

        let single = || -> Result<&str, String> {
            match param.values.as_slice() {
                [value] if !value.is_empty() => Ok(value.as_str()),
                _ => Err(format!("'{}' takes exactly one value", param.name)),
            }
        };

        match param.name.as_str() {
            "_count" => match single().and_then(|v| {
                v.parse::<u32>()
                    .map_err(|_| format!("_count must be a non-negative integer, got '{}'", v))
            }) {
                Ok(count) => result.count = count.min(self.policy.max_page_size),
                Err(message) => errors.push(ValidationCode::FormatInvalid, &param.key, message),
            },
            "_offset" => match single().and_then(|v| {
                v.parse::<u32>()
                    .map_err(|_| format!("_offset must be a non-negative integer, got '{}'", v))
            }) {
                Ok(offset) => result.offset = offset,
                Err(message) => errors.push(ValidationCode::FormatInvalid, &param.key, message),
            },
            "_cursor" => match single().and_then(|v| {
                PageCursor::decode(v).map_err(|_| "_cursor is not a valid page cursor".to_string())
            }) {
                Ok(cursor) => result.cursor = Some(cursor),
                Err(message) => errors.push(ValidationCode::FormatInvalid, &param.key, message),
            },
            "_summary" => match single().and_then(|v| {
                SummaryMode::parse(v).ok_or_else(|| {
                    format!(
                        "_summary must be one of true, false, text, data, count; got '{}'",
                        v
                    )
                })
            }) {
                Ok(mode) => result.summary = Some(mode),
                Err(message) => errors.push(ValidationCode::FormatInvalid, &param.key, message),
            },
            "_total" => match single().and_then(|v| {
                TotalMode::parse(v).ok_or_else(|| {
                    format!("_total must be one of none, estimate, accurate; got '{}'", v)
                })
            }) {
                Ok(mode) => result.total = Some(mode),
                Err(message) => errors.push(ValidationCode::FormatInvalid, &param.key, message),
            },
            "_elements" => {
                for element in &param.values {
                    if ELEMENT_NAME.is_match(element) {
                        result.elements.push(element.clone());
                    } else {
                        errors.push(
                            ValidationCode::FormatInvalid,
                            &param.key,
                            format!("'{}' is not an element name", element),
                        );
                    }
                }
            }
            "_sort" => {
                for value in &param.values {
                    let directive = SortDirective::parse(value);
                    if directive.parameter.is_empty() {
                        errors.push(
                            ValidationCode::FormatInvalid,
                            &param.key,
                            "_sort contains an empty key",
                        );
                        continue;
                    }
                    match self.catalog.get(resource_type, &directive.parameter) {
                        None => errors.push(
                            ValidationCode::UnknownParameter,
                            &param.key,
                            format!(
                                "Cannot sort by unknown parameter '{}'",
                                directive.parameter
                            ),
                        ),
                        Some(def)
                            if matches!(
                                def.param_type,
                                SearchParamType::Composite
                                    | SearchParamType::Special
                                    | SearchParamType::Reference
                            ) =>
                        {
                            errors.push(
                                ValidationCode::FormatInvalid,
                                &param.key,
                                format!(
                                    "Cannot sort by {} parameter '{}'",
                                    def.param_type, directive.parameter
                                ),
                            )
                        }
                        Some(_) => result.sort.push(directive),
                    }
                }
            }
            _ => {}
        }
    }

    fn include_parameter(
        &self,
        resource_type: &str,
        param: &RawParameter,
        result: &mut ResultParameters,
        errors: &mut ValidationErrors,
    ) {
        if let Some(modifier) = &param.modifier {
            let message = if modifier == "iterate" {
                format!(
                    "{}:iterate is not supported; includes are resolved one level deep",
                    param.name
                )
            } else {
                format!("Unknown modifier ':{}' on {}", modifier, param.name)
            };
            errors.push(ValidationCode::UnsupportedModifier, &param.key, message);
            return;
        }

        let include_type = if param.name == "_include" {
            IncludeType::Include
        } else {
            IncludeType::Revinclude
        };

        for value in &param.values {
            let Some(directive) = IncludeDirective::parse(include_type, value) else {
                errors.push(
                    ValidationCode::FormatInvalid,
                    &param.key,
                    format!("'{}' is not Type:parameter[:Target]", value),
                );
                continue;
            };
            if let Err((code, message)) = self.check_include(resource_type, &directive) {
                errors.push(code, &param.key, message);
                continue;
            }
            match include_type {
                IncludeType::Include => result.includes.push(directive),
                IncludeType::Revinclude => result.revincludes.push(directive),
            }
        }
    }

    fn check_include(
        &self,
        resource_type: &str,
        directive: &IncludeDirective,
    ) -> Result<(), ValueError> {
        let source = directive.source_type.as_str();
        if !self.catalog.contains_type(source) {
            return Err((
                ValidationCode::UnknownParameter,
                format!("Resource type '{}' is not searchable", source),
            ));
        }
        if directive.include_type == IncludeType::Include && source != resource_type {
            return Err((
                ValidationCode::FormatInvalid,
                format!(
                    "_include must start with the searched type {}, got '{}'",
                    resource_type, directive
                ),
            ));
        }
        if let Some(target) = &directive.target_type {
            if !self.catalog.contains_type(target) {
                return Err((
                    ValidationCode::UnknownParameter,
                    format!("Resource type '{}' is not searchable", target),
                ));
            }
        }

        if directive.is_wildcard() {
            return Ok(());
        }

        let Some(definition) = self.catalog.get(source, &directive.search_param) else {
            return Err((
                ValidationCode::UnknownParameter,
                format!(
                    "Unknown search parameter '{}' for {}",
                    directive.search_param, source
                ),
            ));
        };
        if definition.param_type != SearchParamType::Reference {
            return Err((
                ValidationCode::FormatInvalid,
                format!("'{}' is not a reference parameter", directive.search_param),
            ));
        }
        if let Some(target) = &directive.target_type {
            if !definition.target_types.contains(target) {
                return Err((
                    ValidationCode::FormatInvalid,
                    format!("{} cannot reference {}", directive, target),
                ));
            }
        }
        if directive.include_type == IncludeType::Revinclude
            && !definition.target_types.contains(resource_type)
        {
            return Err((
                ValidationCode::FormatInvalid,
                format!("{} never references {}", directive, resource_type),
            ));
        }
        Ok(())
    }

    // ========================================================================
    // Cross-parameter rules
    // ========================================================================

    fn check_conflicts(
        &self,
        constraints: &[ParsedConstraint],
        result: &ResultParameters,
        errors: &mut ValidationErrors,
    ) {
        if !self.policy.allow_id_with_filters
            && constraints.iter().any(|c| c.name() == "_id" && c.chain.is_none())
            && constraints.iter().any(|c| c.name() != "_id" || c.chain.is_some())
        {
            errors.push(
                ValidationCode::ParameterConflict,
                "_id",
                "_id cannot be combined with other search parameters",
            );
        }

        if result.summary.is_some() && !result.elements.is_empty() {
            errors.push(
                ValidationCode::ParameterConflict,
                "_summary",
                "_summary and _elements cannot be used together",
            );
        }

        if result.is_count_only() && (!result.includes.is_empty() || !result.revincludes.is_empty())
        {
            errors.push(
                ValidationCode::ParameterConflict,
                "_summary",
                "_summary=count cannot be combined with _include or _revinclude",
            );
        }

        if result.is_count_only() && !result.wants_total() {
            errors.push(
                ValidationCode::ParameterConflict,
                "_total",
                "_summary=count cannot be combined with _total=none",
            );
        }

        let mut repeats: HashMap<&str, Vec<&ParsedConstraint>> = HashMap::new();
        for constraint in constraints.iter().filter(|c| c.chain.is_none()) {
            repeats.entry(constraint.name()).or_default().push(constraint);
        }

        let mut names: Vec<&&str> = repeats.keys().collect();
        names.sort();
        for name in names {
            let group = &repeats[*name];
            let definition = &group[0].definition;

            if !definition.repeatable && group.len() > 1 {
                errors.push(
                    ValidationCode::ParameterConflict,
                    &group[1].key,
                    format!("'{}' is single-valued and may only be given once", name),
                );
            }

            if definition.param_type == SearchParamType::Date {
                check_date_repeats(group, errors);
            }
        }
    }
}

fn check_date_repeats(group: &[&ParsedConstraint], errors: &mut ValidationErrors) {
    let mut implicit_eq = 0;
    for constraint in group.iter().filter(|c| !c.is_missing_test()) {
        let prefixes: Vec<Option<SearchPrefix>> =
            constraint.values.iter().map(|v| v.prefix).collect();
        let unprefixed = prefixes.iter().any(Option::is_none);
        let prefixed = prefixes.iter().any(Option::is_some);

        if unprefixed && prefixed {
            errors.push(
                ValidationCode::ParameterConflict,
                &constraint.key,
                "Cannot mix prefixed and unprefixed dates in one value list",
            );
        }

        let lower = prefixes.iter().any(|p| {
            matches!(
                p,
                Some(SearchPrefix::Gt | SearchPrefix::Ge | SearchPrefix::Sa)
            )
        });
        let upper = prefixes.iter().any(|p| {
            matches!(
                p,
                Some(SearchPrefix::Lt | SearchPrefix::Le | SearchPrefix::Eb)
            )
        });
        if lower && upper {
            errors.push(
                ValidationCode::ParameterConflict,
                &constraint.key,
                "Comma-separated dates are alternatives; repeat the parameter to express a range",
            );
        }

        if unprefixed {
            implicit_eq += 1;
            if implicit_eq == 2 {
                errors.push(
                    ValidationCode::ParameterConflict,
                    &constraint.key,
                    "More than one exact date given for the same parameter",
                );
            }
        }
    }
}

// ============================================================================
// Values
// ============================================================================

fn parse_missing(value: &str) -> Result<ConstraintValue, ValueError> {
    match value {
        "true" => Ok(ConstraintValue::new(TypedValue::Missing { missing: true })),
        "false" => Ok(ConstraintValue::new(TypedValue::Missing { missing: false })),
        other => Err((
            ValidationCode::FormatInvalid,
            format!(":missing takes true or false, got '{}'", other),
        )),
    }
}

fn parse_value(
    definition: &ParameterDefinition,
    modifier: Option<&SearchModifier>,
    raw: &str,
) -> Result<ConstraintValue, ValueError> {
    if !definition.is_composite() {
        return parse_scalar(definition, modifier, raw);
    }

    let parts = split_composite(raw);
    if parts.len() != definition.components.len() {
        return Err((
            ValidationCode::FormatInvalid,
            format!(
                "'{}' needs {} '$'-separated components, got {}",
                definition.name,
                definition.components.len(),
                parts.len()
            ),
        ));
    }
    let components = definition
        .components
        .iter()
        .zip(&parts)
        .map(|(component, part)| parse_scalar(component, None, part))
        .collect::<Result<Vec<_>, _>>()?;
    Ok(ConstraintValue::new(TypedValue::Composite { components }))
}

fn parse_scalar(
    definition: &ParameterDefinition,
    modifier: Option<&SearchModifier>,
    raw: &str,
) -> Result<ConstraintValue, ValueError> {
    let format = |message: String| (ValidationCode::FormatInvalid, message);

    if raw.trim().is_empty() {
        return Err(format(format!(
            "Empty value for parameter '{}'",
            definition.name
        )));
    }

    if modifier.is_some_and(SearchModifier::is_full_text) || definition.is_full_text() {
        return Ok(ConstraintValue::new(TypedValue::String {
            text: raw.to_string(),
        }));
    }

    let param_type = definition.param_type;
    if param_type.is_ordinal() {
        let (prefix, rest) = SearchPrefix::split(raw);
        if let Some(p) = prefix {
            if !definition.supports_prefix(p) {
                return Err((
                    ValidationCode::UnsupportedPrefix,
                    format!(
                        "Prefix '{}' is not supported by {} parameter '{}'",
                        p, param_type, definition.name
                    ),
                ));
            }
        }
        let value = TypedValue::parse(param_type, rest).map_err(format)?;
        return Ok(ConstraintValue { prefix, value });
    }

    if let (Some(p), _) = SearchPrefix::split_numeric(raw) {
        return Err((
            ValidationCode::UnsupportedPrefix,
            format!(
                "Prefix '{}' is not allowed on {} parameter '{}'",
                p, param_type, definition.name
            ),
        ));
    }

    if definition.name == "_id" {
        if !is_logical_id(raw) {
            return Err(format(format!("'{}' is not a logical id", raw)));
        }
        return Ok(ConstraintValue::new(TypedValue::Token {
            system: TokenSystem::Any,
            code: Some(raw.to_string()),
        }));
    }

    let value = TypedValue::parse(param_type, raw).map_err(format)?;
    match value {
        TypedValue::Reference { reference } => {
            resolve_reference(definition, modifier, reference).map(|reference| {
                ConstraintValue::new(TypedValue::Reference { reference })
            })
        }
        other => Ok(ConstraintValue::new(other)),
    }
}

/// Fills in the type of a bare id and checks the type against the targets.
fn resolve_reference(
    definition: &ParameterDefinition,
    modifier: Option<&SearchModifier>,
    reference: ReferenceValue,
) -> Result<ReferenceValue, ValueError> {
    let format = |message: String| (ValidationCode::FormatInvalid, message);
    let explicit = match modifier {
        Some(SearchModifier::Type(t)) => Some(t.as_str()),
        _ => None,
    };

    let reference = match &reference {
        ReferenceValue::Local {
            resource_type: None,
            id,
        } => match explicit.or(definition.single_target()) {
            Some(default) => reference.clone().with_default_type(default),
            None => {
                return Err(format(format!(
                    "Bare id '{}' is ambiguous for '{}'; use Type/id or a :Type modifier",
                    id, definition.name
                )));
            }
        },
        _ => reference,
    };

    if let ReferenceValue::Local {
        resource_type: Some(t),
        ..
    } = &reference
    {
        if !definition.target_types.contains(t) || explicit.is_some_and(|e| e != t) {
            return Err(format(format!(
                "'{}' cannot reference a {}",
                definition.name, t
            )));
        }
    }
    Ok(reference)
}
