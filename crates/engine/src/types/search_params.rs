//! FHIR search parameter vocabulary.
//!
//! Parameter types, modifiers, prefixes, and the result-shaping directives
//! (`_include`, `_revinclude`, `_sort`, `_summary`) understood by the engine.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// FHIR search parameter types.
///
/// See: https://build.fhir.org/search.html#ptypes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchParamType {
    /// A simple string, like a name or description.
    String,
    /// A search against a URI.
    Uri,
    /// A search for a number.
    Number,
    /// A search for a date, dateTime, or period.
    Date,
    /// A quantity, with a number and units.
    Quantity,
    /// A code from a code system or value set.
    Token,
    /// A reference to another resource.
    Reference,
    /// A composite search parameter that combines others.
    Composite,
    /// Narrative or whole-document text (`_text`, `_content`).
    Special,
}

impl SearchParamType {
    /// Returns true for types whose values may carry a comparison prefix.
    pub fn is_ordinal(&self) -> bool {
        matches!(
            self,
            SearchParamType::Number | SearchParamType::Date | SearchParamType::Quantity
        )
    }
}

impl fmt::Display for SearchParamType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchParamType::String => write!(f, "string"),
            SearchParamType::Uri => write!(f, "uri"),
            SearchParamType::Number => write!(f, "number"),
            SearchParamType::Date => write!(f, "date"),
            SearchParamType::Quantity => write!(f, "quantity"),
            SearchParamType::Token => write!(f, "token"),
            SearchParamType::Reference => write!(f, "reference"),
            SearchParamType::Composite => write!(f, "composite"),
            SearchParamType::Special => write!(f, "special"),
        }
    }
}

impl FromStr for SearchParamType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "string" => Ok(SearchParamType::String),
            "uri" => Ok(SearchParamType::Uri),
            "number" => Ok(SearchParamType::Number),
            "date" => Ok(SearchParamType::Date),
            "quantity" => Ok(SearchParamType::Quantity),
            "token" => Ok(SearchParamType::Token),
            "reference" => Ok(SearchParamType::Reference),
            "composite" => Ok(SearchParamType::Composite),
            "special" => Ok(SearchParamType::Special),
            _ => Err(format!("unknown search parameter type: {}", s)),
        }
    }
}

/// Search modifiers that can be applied to search parameters.
///
/// See: https://build.fhir.org/search.html#modifiers
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchModifier {
    /// Exact string match (string parameters).
    Exact,
    /// Substring match, routed to the full-text index.
    Contains,
    /// Text search, routed to the full-text index.
    Text,
    /// Negation - exclude matches.
    Not,
    /// Match if the element is absent (`true`) or present (`false`).
    Missing,
    /// Match URIs that are a prefix of the value.
    Above,
    /// Match URIs that start with the value.
    Below,
    /// Restrict a reference to one target type (`subject:Patient`).
    Type(String),
    /// Follow includes of included resources (not supported, single level only).
    Iterate,
}

impl fmt::Display for SearchModifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchModifier::Exact => write!(f, "exact"),
            SearchModifier::Contains => write!(f, "contains"),
            SearchModifier::Text => write!(f, "text"),
            SearchModifier::Not => write!(f, "not"),
            SearchModifier::Missing => write!(f, "missing"),
            SearchModifier::Above => write!(f, "above"),
            SearchModifier::Below => write!(f, "below"),
            SearchModifier::Type(t) => write!(f, "{}", t),
            SearchModifier::Iterate => write!(f, "iterate"),
        }
    }
}

impl SearchModifier {
    /// Parses a modifier string, returning None for unknown modifiers.
    ///
    /// Anything starting with an uppercase letter is taken as a resource type.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "exact" => Some(SearchModifier::Exact),
            "contains" => Some(SearchModifier::Contains),
            "text" => Some(SearchModifier::Text),
            "not" => Some(SearchModifier::Not),
            "missing" => Some(SearchModifier::Missing),
            "above" => Some(SearchModifier::Above),
            "below" => Some(SearchModifier::Below),
            "iterate" => Some(SearchModifier::Iterate),
            _ => {
                if s.chars().next().is_some_and(|c| c.is_ascii_uppercase()) {
                    Some(SearchModifier::Type(s.to_string()))
                } else {
                    None
                }
            }
        }
    }

    /// Returns the modifiers a parameter of the given type accepts by default.
    ///
    /// `:Type` modifiers for references depend on declared targets and are
    /// added by the catalog.
    pub fn defaults_for(param_type: SearchParamType) -> Vec<SearchModifier> {
        match param_type {
            SearchParamType::String => vec![
                SearchModifier::Exact,
                SearchModifier::Contains,
                SearchModifier::Text,
                SearchModifier::Missing,
            ],
            SearchParamType::Token => vec![
                SearchModifier::Text,
                SearchModifier::Not,
                SearchModifier::Missing,
            ],
            SearchParamType::Uri => vec![
                SearchModifier::Above,
                SearchModifier::Below,
                SearchModifier::Missing,
            ],
            SearchParamType::Reference
            | SearchParamType::Date
            | SearchParamType::Number
            | SearchParamType::Quantity
            | SearchParamType::Composite => vec![SearchModifier::Missing],
            SearchParamType::Special => Vec::new(),
        }
    }

    /// Returns true if this modifier routes the constraint to the full-text index.
    pub fn is_full_text(&self) -> bool {
        matches!(self, SearchModifier::Contains | SearchModifier::Text)
    }
}

/// Comparison prefixes for search parameters.
///
/// See: https://build.fhir.org/search.html#prefix
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Default,
)]
#[serde(rename_all = "lowercase")]
pub enum SearchPrefix {
    /// Equal (default).
    #[default]
    Eq,
    /// Not equal.
    Ne,
    /// Greater than.
    Gt,
    /// Less than.
    Lt,
    /// Greater than or equal.
    Ge,
    /// Less than or equal.
    Le,
    /// Starts after.
    Sa,
    /// Ends before.
    Eb,
    /// Approximately equal.
    Ap,
}

impl fmt::Display for SearchPrefix {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SearchPrefix::Eq => write!(f, "eq"),
            SearchPrefix::Ne => write!(f, "ne"),
            SearchPrefix::Gt => write!(f, "gt"),
            SearchPrefix::Lt => write!(f, "lt"),
            SearchPrefix::Ge => write!(f, "ge"),
            SearchPrefix::Le => write!(f, "le"),
            SearchPrefix::Sa => write!(f, "sa"),
            SearchPrefix::Eb => write!(f, "eb"),
            SearchPrefix::Ap => write!(f, "ap"),
        }
    }
}

impl FromStr for SearchPrefix {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "eq" => Ok(SearchPrefix::Eq),
            "ne" => Ok(SearchPrefix::Ne),
            "gt" => Ok(SearchPrefix::Gt),
            "lt" => Ok(SearchPrefix::Lt),
            "ge" => Ok(SearchPrefix::Ge),
            "le" => Ok(SearchPrefix::Le),
            "sa" => Ok(SearchPrefix::Sa),
            "eb" => Ok(SearchPrefix::Eb),
            "ap" => Ok(SearchPrefix::Ap),
            _ => Err(format!("unknown search prefix: {}", s)),
        }
    }
}

impl SearchPrefix {
    /// Splits a leading prefix off a value string.
    ///
    /// Returns `None` for the prefix when the value has none. Only the
    /// lowercase form is recognized, and only when something follows it.
    pub fn split(value: &str) -> (Option<Self>, &str) {
        if value.len() > 2 && value.is_char_boundary(2) {
            let (head, rest) = value.split_at(2);
            if head.chars().all(|c| c.is_ascii_lowercase()) {
                if let Ok(p) = head.parse() {
                    return (Some(p), rest);
                }
            }
        }
        (None, value)
    }

    /// Like [`split`](Self::split) but only when the remainder starts like a
    /// number or a date. Used on non-ordinal types where `gerald` is a name,
    /// not `ge` + `rald`.
    pub fn split_numeric(value: &str) -> (Option<Self>, &str) {
        match Self::split(value) {
            (Some(p), rest)
                if rest
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_digit() || c == '-' || c == '.') =>
            {
                (Some(p), rest)
            }
            _ => (None, value),
        }
    }

    /// Returns the prefixes a parameter of the given type accepts.
    pub fn defaults_for(param_type: SearchParamType) -> Vec<SearchPrefix> {
        use SearchPrefix::*;
        match param_type {
            SearchParamType::Date => vec![Eq, Ne, Gt, Lt, Ge, Le, Sa, Eb, Ap],
            SearchParamType::Number | SearchParamType::Quantity => {
                vec![Eq, Ne, Gt, Lt, Ge, Le, Ap]
            }
            _ => Vec::new(),
        }
    }
}

/// Include directive for `_include` and `_revinclude`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IncludeDirective {
    /// The type of include.
    pub include_type: IncludeType,

    /// The resource type that holds the reference.
    pub source_type: String,

    /// The reference parameter to follow (`*` for every reference parameter).
    pub search_param: String,

    /// Optional target resource type filter.
    pub target_type: Option<String>,
}

impl IncludeDirective {
    /// Parses `Source:param[:Target]`.
    pub fn parse(include_type: IncludeType, value: &str) -> Option<Self> {
        let mut parts = value.split(':');
        let source_type = parts.next().filter(|s| !s.is_empty())?;
        let search_param = parts.next().filter(|s| !s.is_empty())?;
        let target_type = parts.next().map(str::to_string);
        if parts.next().is_some() || target_type.as_deref() == Some("") {
            return None;
        }
        Some(Self {
            include_type,
            source_type: source_type.to_string(),
            search_param: search_param.to_string(),
            target_type,
        })
    }

    /// Returns true for the `Source:*` wildcard form.
    pub fn is_wildcard(&self) -> bool {
        self.search_param == "*"
    }
}

impl fmt::Display for IncludeDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.source_type, self.search_param)?;
        if let Some(target) = &self.target_type {
            write!(f, ":{}", target)?;
        }
        Ok(())
    }
}

/// Type of include operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IncludeType {
    /// Forward include (`_include`).
    Include,
    /// Reverse include (`_revinclude`).
    Revinclude,
}

/// Sort direction for `_sort`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum SortDirection {
    /// Ascending order.
    #[default]
    Ascending,
    /// Descending order.
    Descending,
}

/// A sort directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SortDirective {
    /// The parameter to sort by.
    pub parameter: String,
    /// The sort direction.
    pub direction: SortDirection,
}

impl SortDirective {
    /// Parses a sort parameter value (e.g., "-date" for descending).
    pub fn parse(s: &str) -> Self {
        if let Some(stripped) = s.strip_prefix('-') {
            Self {
                parameter: stripped.to_string(),
                direction: SortDirection::Descending,
            }
        } else {
            Self {
                parameter: s.to_string(),
                direction: SortDirection::Ascending,
            }
        }
    }
}

impl fmt::Display for SortDirective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.direction {
            SortDirection::Ascending => write!(f, "{}", self.parameter),
            SortDirection::Descending => write!(f, "-{}", self.parameter),
        }
    }
}

/// Mode for `_summary`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SummaryMode {
    /// Return summary elements only.
    True,
    /// Return full resource.
    False,
    /// Return text narrative and mandatory elements only.
    Text,
    /// Return everything except the text narrative.
    Data,
    /// Return count only.
    Count,
}

impl SummaryMode {
    /// Parses a summary mode from a string value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "true" => Some(SummaryMode::True),
            "false" => Some(SummaryMode::False),
            "text" => Some(SummaryMode::Text),
            "data" => Some(SummaryMode::Data),
            "count" => Some(SummaryMode::Count),
            _ => None,
        }
    }

    /// Returns the query-string form.
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryMode::True => "true",
            SummaryMode::False => "false",
            SummaryMode::Text => "text",
            SummaryMode::Data => "data",
            SummaryMode::Count => "count",
        }
    }
}

/// Mode for `_total`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TotalMode {
    /// No total; `Bundle.total` is left out.
    None,
    /// Estimated total. Served as the exact count.
    Estimate,
    /// Accurate total.
    Accurate,
}

impl TotalMode {
    /// Parses a total mode from a string value.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(TotalMode::None),
            "estimate" => Some(TotalMode::Estimate),
            "accurate" => Some(TotalMode::Accurate),
            _ => None,
        }
    }
}
