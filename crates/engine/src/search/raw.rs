//! Raw query-string parameters.
//!
//! Splits a query string into [`RawParameter`]s without consulting the
//! catalog. Each key occurrence becomes one parameter (repeats combine with
//! AND); values are split on unescaped commas (OR).

use std::fmt;

use serde::{Deserialize, Serialize};

/// One query-string key occurrence.
///
/// Key grammar:
/// - `name` / `name:modifier`
/// - `name.chain` / `name:Type.chain` (forward chain, `chain` is the rest of the key)
/// - `_has:Type:ref:key` (reverse chain, `chain` is everything after `_has:`)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawParameter {
    /// The key exactly as received.
    pub key: String,

    /// Parameter name without modifier or chain.
    pub name: String,

    /// Text after the first `:` of the head segment.
    pub modifier: Option<String>,

    /// Text after the first `.` (or after `_has:`).
    pub chain: Option<String>,

    /// OR-joined values, unescaped.
    pub values: Vec<String>,
}

impl RawParameter {
    /// Parses one `key=value` pair.
    pub fn parse(key: &str, value: &str) -> Self {
        let (name, modifier, chain) = split_key(key);
        Self {
            key: key.to_string(),
            name,
            modifier,
            chain,
            values: split_values(value),
        }
    }

    /// Creates a parameter from an already split key with the given values.
    pub fn with_values(key: &str, values: Vec<String>) -> Self {
        let (name, modifier, chain) = split_key(key);
        Self {
            key: key.to_string(),
            name,
            modifier,
            chain,
            values,
        }
    }

    /// Returns true for the reverse-chain form.
    pub fn is_reverse_chain(&self) -> bool {
        self.name == "_has"
    }

    /// Returns the values joined back into query-string form.
    pub fn joined_values(&self) -> String {
        self.values
            .iter()
            .map(|v| v.replace(',', "\\,"))
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// Splits a key into (name, modifier, chain).
pub(crate) fn split_key(key: &str) -> (String, Option<String>, Option<String>) {
    if let Some(rest) = key.strip_prefix("_has:") {
        return ("_has".to_string(), None, Some(rest.to_string()));
    }

    let (head, chain) = match key.split_once('.') {
        Some((head, chain)) => (head, Some(chain.to_string())),
        None => (key, None),
    };
    match head.split_once(':') {
        Some((name, modifier)) => (name.to_string(), Some(modifier.to_string()), chain),
        None => (head.to_string(), None, chain),
    }
}

/// Splits a value on unescaped commas. `\,` yields a literal comma; other
/// escapes are kept for later stages (composite `\$`).
pub(crate) fn split_values(value: &str) -> Vec<String> {
    let mut values = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&',') => {
                current.push(',');
                chars.next();
            }
            '\\' => {
                current.push('\\');
                if let Some(next) = chars.next() {
                    current.push(next);
                }
            }
            ',' => values.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    values.push(current);
    values
}

/// An ordered list of raw parameters for one request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RawParams {
    params: Vec<RawParameter>,
}

impl RawParams {
    /// Creates an empty parameter list.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a URL query string (without the leading `?`).
    pub fn parse_query(query: &str) -> Self {
        let query = query.strip_prefix('?').unwrap_or(query);
        url::form_urlencoded::parse(query.as_bytes())
            .map(|(k, v)| RawParameter::parse(&k, &v))
            .collect()
    }

    /// Builds from `(key, value)` pairs; each pair is one key occurrence.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        pairs
            .into_iter()
            .map(|(k, v)| RawParameter::parse(k.as_ref(), v.as_ref()))
            .collect()
    }

    /// Appends a parameter.
    pub fn push(&mut self, param: RawParameter) {
        self.params.push(param);
    }

    /// Returns the parameters in request order.
    pub fn iter(&self) -> impl Iterator<Item = &RawParameter> {
        self.params.iter()
    }

    /// Returns every occurrence of a name.
    pub fn get_all<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a RawParameter> {
        self.params.iter().filter(move |p| p.name == name)
    }

    /// Returns the number of key occurrences.
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Returns true if there are no parameters.
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }
}

impl FromIterator<RawParameter> for RawParams {
    fn from_iter<T: IntoIterator<Item = RawParameter>>(iter: T) -> Self {
        Self {
            params: iter.into_iter().collect(),
        }
    }
}

impl fmt::Display for RawParams {
    /// Renders the parameters as a URL-encoded query string.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for param in &self.params {
            serializer.append_pair(&param.key, &param.joined_values());
        }
        f.write_str(&serializer.finish())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_key_forms() {
        assert_eq!(split_key("name"), ("name".to_string(), None, None));
        assert_eq!(
            split_key("name:exact"),
            ("name".to_string(), Some("exact".to_string()), None)
        );
        assert_eq!(
            split_key("subject:Patient.name"),
            (
                "subject".to_string(),
                Some("Patient".to_string()),
                Some("name".to_string())
            )
        );
        assert_eq!(
            split_key("subject.organization.name:exact"),
            (
                "subject".to_string(),
                None,
                Some("organization.name:exact".to_string())
            )
        );
        assert_eq!(
            split_key("_has:Observation:subject:code"),
            (
                "_has".to_string(),
                None,
                Some("Observation:subject:code".to_string())
            )
        );
    }

    #[test]
    fn test_split_values_escapes() {
        assert_eq!(split_values("a,b"), vec!["a", "b"]);
        assert_eq!(split_values("a\\,b"), vec!["a,b"]);
        assert_eq!(split_values("8480-6$ge140"), vec!["8480-6$ge140"]);
        assert_eq!(split_values("a\\$b"), vec!["a\\$b"]);
        assert_eq!(split_values(""), vec![""]);
    }

    #[test]
    fn test_parse_query_keeps_repeats() {
        let params = RawParams::parse_query("date=ge2020-01-01&date=lt2021-01-01&name=Smith,Jones");
        assert_eq!(params.len(), 3);
        assert_eq!(params.get_all("date").count(), 2);
        let name = params.get_all("name").next().unwrap();
        assert_eq!(name.values, vec!["Smith", "Jones"]);
    }

    #[test]
    fn test_parse_query_decodes() {
        let params = RawParams::parse_query("?identifier=http%3A%2F%2Fx.org%7C123");
        let id = params.iter().next().unwrap();
        assert_eq!(id.values, vec!["http://x.org|123"]);
    }

    #[test]
    fn test_display_round_trip() {
        let params = RawParams::from_pairs([("name", "a\\,b"), ("_count", "10")]);
        let rendered = params.to_string();
        assert_eq!(RawParams::parse_query(&rendered), params);
    }
}
