//! Typed search values and their matching rules.
//!
//! Every value in a validated constraint is parsed into a [`TypedValue`]
//! according to the definition's search type. The range types ([`DateRange`],
//! [`NumberValue`]) also carry the FHIR prefix comparison semantics so that any
//! storage implementation evaluates them identically.

use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{DateTime, Duration, FixedOffset, NaiveDate, NaiveDateTime, TimeZone, Utc};
use regex::Regex;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::types::{ResourceRef, SearchParamType, SearchPrefix, is_logical_id};

static DATE_VALUE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(\d{4})(?:-(\d{2})(?:-(\d{2})(?:T(\d{2}):(\d{2})(?::(\d{2})(?:\.(\d{1,9}))?)?(Z|[+-]\d{2}:\d{2})?)?)?)?$",
    )
    .expect("static regex")
});

/// A value of a validated constraint, with its comparison prefix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintValue {
    /// Explicit prefix, if the value carried one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prefix: Option<SearchPrefix>,
    /// The parsed value.
    pub value: TypedValue,
}

impl ConstraintValue {
    /// Creates an unprefixed value.
    pub fn new(value: TypedValue) -> Self {
        Self {
            prefix: None,
            value,
        }
    }

    /// Creates a prefixed value.
    pub fn prefixed(prefix: SearchPrefix, value: TypedValue) -> Self {
        Self {
            prefix: Some(prefix),
            value,
        }
    }

    /// Returns the prefix, defaulting to `eq`.
    pub fn effective_prefix(&self) -> SearchPrefix {
        self.prefix.unwrap_or_default()
    }
}

/// A parsed search value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum TypedValue {
    /// String search text.
    String { text: String },
    /// `[system|]code`.
    Token {
        system: TokenSystem,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// A date, dateTime, or instant with its implicit range.
    Date { range: DateRange },
    /// A decimal with its implicit precision range.
    Number { number: NumberValue },
    /// `number[|system|code]`.
    Quantity {
        number: NumberValue,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        system: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        code: Option<String>,
    },
    /// A resource reference.
    Reference { reference: ReferenceValue },
    /// A URI.
    Uri { uri: String },
    /// Ordered component values of a composite parameter.
    Composite { components: Vec<ConstraintValue> },
    /// `:missing=true|false`.
    Missing { missing: bool },
}

impl TypedValue {
    /// Parses a value (prefix already removed) for a non-composite type.
    pub fn parse(param_type: SearchParamType, text: &str) -> Result<Self, String> {
        if text.is_empty() {
            return Err("empty value".to_string());
        }
        match param_type {
            SearchParamType::String | SearchParamType::Special => Ok(TypedValue::String {
                text: text.to_string(),
            }),
            SearchParamType::Token => parse_token(text),
            SearchParamType::Date => DateRange::parse(text)
                .map(|range| TypedValue::Date { range })
                .ok_or_else(|| format!("'{}' is not an ISO-8601 date", text)),
            SearchParamType::Number => NumberValue::parse(text)
                .map(|number| TypedValue::Number { number })
                .ok_or_else(|| format!("'{}' is not a decimal number", text)),
            SearchParamType::Quantity => parse_quantity(text),
            SearchParamType::Reference => ReferenceValue::parse(text)
                .map(|reference| TypedValue::Reference { reference })
                .ok_or_else(|| {
                    format!(
                        "'{}' is not a Type/id reference, a logical id, or an absolute URL",
                        text
                    )
                }),
            SearchParamType::Uri => Ok(TypedValue::Uri {
                uri: text.to_string(),
            }),
            SearchParamType::Composite => {
                Err("composite values need component definitions".to_string())
            }
        }
    }

    /// Returns the plain text of string and uri values.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            TypedValue::String { text } => Some(text),
            TypedValue::Uri { uri } => Some(uri),
            _ => None,
        }
    }
}

fn parse_token(text: &str) -> Result<TypedValue, String> {
    match text.split_once('|') {
        Some(("", "")) => Err("token needs a system or a code around '|'".to_string()),
        Some(("", code)) => Ok(TypedValue::Token {
            system: TokenSystem::NoSystem,
            code: Some(code.to_string()),
        }),
        Some((system, code)) => Ok(TypedValue::Token {
            system: TokenSystem::Exact(system.to_string()),
            code: (!code.is_empty()).then(|| code.to_string()),
        }),
        None => Ok(TypedValue::Token {
            system: TokenSystem::Any,
            code: Some(text.to_string()),
        }),
    }
}

fn parse_quantity(text: &str) -> Result<TypedValue, String> {
    let parts: Vec<&str> = text.split('|').collect();
    let (number, system, code) = match parts.as_slice() {
        [number] => (*number, None, None),
        [number, system, code] => (
            *number,
            (!system.is_empty()).then(|| system.to_string()),
            (!code.is_empty()).then(|| code.to_string()),
        ),
        _ => return Err(format!("'{}' is not number[|system|code]", text)),
    };
    let number =
        NumberValue::parse(number).ok_or_else(|| format!("'{}' is not a decimal number", number))?;
    Ok(TypedValue::Quantity {
        number,
        system,
        code,
    })
}

/// Splits a composite value on unescaped `$`, unescaping `\$`.
pub(crate) fn split_composite(value: &str) -> Vec<String> {
    let mut parts = Vec::new();
    let mut current = String::new();
    let mut chars = value.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'$') => {
                current.push('$');
                chars.next();
            }
            '$' => parts.push(std::mem::take(&mut current)),
            _ => current.push(c),
        }
    }
    parts.push(current);
    parts
}

// ============================================================================
// Tokens
// ============================================================================

/// System part of a token value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TokenSystem {
    /// `code` - any system.
    Any,
    /// `|code` - the coding must have no system.
    NoSystem,
    /// `system|code` or `system|`.
    Exact(String),
}

impl TokenSystem {
    /// Returns true if a coding's system satisfies this constraint.
    pub fn accepts(&self, system: Option<&str>) -> bool {
        match self {
            TokenSystem::Any => true,
            TokenSystem::NoSystem => system.is_none_or(str::is_empty),
            TokenSystem::Exact(s) => system == Some(s.as_str()),
        }
    }
}

// ============================================================================
// Dates
// ============================================================================

/// How precisely a date value was written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatePrecision {
    /// `YYYY`
    Year,
    /// `YYYY-MM`
    Month,
    /// `YYYY-MM-DD`
    Day,
    /// `THH:MM`
    Minute,
    /// `THH:MM:SS`
    Second,
    /// Fractional seconds, or a Period.
    Fraction,
}

/// The half-open instant range `[start, end)` a date value denotes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    /// Inclusive start.
    pub start: DateTime<Utc>,
    /// Exclusive end.
    pub end: DateTime<Utc>,
    /// Written precision.
    pub precision: DatePrecision,
}

impl DateRange {
    /// Parses a query value. Times must carry a zone.
    pub fn parse(text: &str) -> Option<Self> {
        Self::parse_with(text, true)
    }

    /// Parses a stored element value. Times without a zone are read as UTC.
    pub fn parse_lenient(text: &str) -> Option<Self> {
        Self::parse_with(text, false)
    }

    /// Builds the range of a Period element. Missing bounds are open.
    pub fn from_period(start: Option<&str>, end: Option<&str>) -> Option<Self> {
        if start.is_none() && end.is_none() {
            return None;
        }
        let start = match start {
            Some(s) => Self::parse_lenient(s)?.start,
            None => DateTime::<Utc>::MIN_UTC,
        };
        let end = match end {
            Some(e) => Self::parse_lenient(e)?.end,
            None => DateTime::<Utc>::MAX_UTC,
        };
        Some(Self {
            start,
            end,
            precision: DatePrecision::Fraction,
        })
    }

    fn parse_with(text: &str, require_zone: bool) -> Option<Self> {
        let caps = DATE_VALUE.captures(text)?;
        let num = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());

        let year = caps.get(1)?.as_str().parse::<i32>().ok()?;
        let Some(month) = num(2) else {
            let start = NaiveDate::from_ymd_opt(year, 1, 1)?;
            let end = NaiveDate::from_ymd_opt(year + 1, 1, 1)?;
            return Some(Self::from_dates(start, end, DatePrecision::Year));
        };
        let Some(day) = num(3) else {
            let start = NaiveDate::from_ymd_opt(year, month, 1)?;
            let end = if month == 12 {
                NaiveDate::from_ymd_opt(year + 1, 1, 1)?
            } else {
                NaiveDate::from_ymd_opt(year, month + 1, 1)?
            };
            return Some(Self::from_dates(start, end, DatePrecision::Month));
        };
        let date = NaiveDate::from_ymd_opt(year, month, day)?;
        let Some(hour) = num(4) else {
            let end = date.succ_opt()?;
            return Some(Self::from_dates(date, end, DatePrecision::Day));
        };

        let minute = num(5)?;
        let second = num(6);
        let fraction = caps.get(7).map(|m| m.as_str());
        let zone = caps.get(8).map(|m| m.as_str());
        if require_zone && zone.is_none() {
            return None;
        }

        let nanos = match fraction {
            Some(f) => format!("{:0<9}", f).parse::<u32>().ok()?,
            None => 0,
        };
        let naive = date.and_hms_nano_opt(hour, minute, second.unwrap_or(0), nanos)?;
        let start = to_utc(naive, zone)?;

        let (width, precision) = match (second, fraction) {
            (None, _) => (Duration::minutes(1), DatePrecision::Minute),
            (Some(_), None) => (Duration::seconds(1), DatePrecision::Second),
            (Some(_), Some(f)) => (
                Duration::nanoseconds(10_i64.pow(9 - f.len() as u32)),
                DatePrecision::Fraction,
            ),
        };
        Some(Self {
            start,
            end: start + width,
            precision,
        })
    }

    fn from_dates(start: NaiveDate, end: NaiveDate, precision: DatePrecision) -> Self {
        Self {
            start: start.and_time(chrono::NaiveTime::MIN).and_utc(),
            end: end.and_time(chrono::NaiveTime::MIN).and_utc(),
            precision,
        }
    }

    /// Returns true if a stored range satisfies this search value under the prefix.
    pub fn matches(&self, prefix: SearchPrefix, target: &DateRange) -> bool {
        match prefix {
            SearchPrefix::Eq => self.start <= target.start && target.end <= self.end,
            SearchPrefix::Ne => !(self.start <= target.start && target.end <= self.end),
            SearchPrefix::Gt => target.end > self.end,
            SearchPrefix::Lt => target.start < self.start,
            SearchPrefix::Ge => target.end > self.start,
            SearchPrefix::Le => target.start < self.end,
            SearchPrefix::Sa => target.start >= self.end,
            SearchPrefix::Eb => target.end <= self.start,
            SearchPrefix::Ap => {
                let gap = (Utc::now() - self.start).abs() / 10;
                let widen = gap.max(self.end - self.start);
                let low = self
                    .start
                    .checked_sub_signed(widen)
                    .unwrap_or(DateTime::<Utc>::MIN_UTC);
                let high = self
                    .end
                    .checked_add_signed(widen)
                    .unwrap_or(DateTime::<Utc>::MAX_UTC);
                target.start < high && target.end > low
            }
        }
    }
}

fn to_utc(naive: NaiveDateTime, zone: Option<&str>) -> Option<DateTime<Utc>> {
    let offset = match zone {
        None | Some("Z") => FixedOffset::east_opt(0)?,
        Some(z) => {
            let sign = if z.starts_with('-') { -1 } else { 1 };
            let hours: i32 = z.get(1..3)?.parse().ok()?;
            let minutes: i32 = z.get(4..6)?.parse().ok()?;
            FixedOffset::east_opt(sign * (hours * 3600 + minutes * 60))?
        }
    };
    offset
        .from_local_datetime(&naive)
        .single()
        .map(|dt| dt.with_timezone(&Utc))
}

// ============================================================================
// Numbers
// ============================================================================

/// A decimal search value with the precision it was written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NumberValue {
    /// The value.
    pub value: Decimal,
}

impl NumberValue {
    /// Parses a plain or exponent-form decimal.
    pub fn parse(text: &str) -> Option<Self> {
        if text.is_empty() || text.contains(char::is_whitespace) {
            return None;
        }
        Decimal::from_str(text)
            .or_else(|_| Decimal::from_scientific(text))
            .ok()
            .map(|value| Self { value })
    }

    /// Reads a JSON number as a decimal.
    pub fn from_json(value: &serde_json::Value) -> Option<Decimal> {
        match value {
            serde_json::Value::Number(n) => {
                let text = n.to_string();
                Decimal::from_str(&text)
                    .or_else(|_| Decimal::from_scientific(&text))
                    .ok()
            }
            _ => None,
        }
    }

    /// The implicit range `[low, high)` of an unprefixed value, half a unit
    /// of the last written digit either side.
    pub fn bounds(&self) -> (Decimal, Decimal) {
        let scale = self.value.scale().min(27);
        let half = Decimal::new(5, scale + 1);
        (self.value - half, self.value + half)
    }

    /// Returns true if a stored number satisfies this search value under the prefix.
    pub fn matches(&self, prefix: SearchPrefix, target: Decimal) -> bool {
        let (low, high) = self.bounds();
        match prefix {
            SearchPrefix::Eq => low <= target && target < high,
            SearchPrefix::Ne => !(low <= target && target < high),
            SearchPrefix::Gt | SearchPrefix::Sa => target > self.value,
            SearchPrefix::Lt | SearchPrefix::Eb => target < self.value,
            SearchPrefix::Ge => target >= self.value,
            SearchPrefix::Le => target <= self.value,
            SearchPrefix::Ap => {
                let tolerance = (self.value.abs() / Decimal::TEN).max(high - self.value);
                (target - self.value).abs() <= tolerance
            }
        }
    }
}

// ============================================================================
// References
// ============================================================================

/// A reference search value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReferenceValue {
    /// `Type/id`, or a bare id whose type is not (yet) known.
    Local {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        resource_type: Option<String>,
        id: String,
    },
    /// An absolute URL.
    Absolute(String),
}

impl ReferenceValue {
    /// Parses `Type/id`, a bare logical id, or an absolute URL.
    pub fn parse(text: &str) -> Option<Self> {
        if text.contains("://") {
            return url::Url::parse(text)
                .ok()
                .map(|_| ReferenceValue::Absolute(text.to_string()));
        }
        if text.contains('/') {
            return ResourceRef::parse(text).map(|r| ReferenceValue::Local {
                resource_type: Some(r.resource_type),
                id: r.id,
            });
        }
        is_logical_id(text).then(|| ReferenceValue::Local {
            resource_type: None,
            id: text.to_string(),
        })
    }

    /// Returns the type named by the value, if any.
    pub fn resource_type(&self) -> Option<&str> {
        match self {
            ReferenceValue::Local { resource_type, .. } => resource_type.as_deref(),
            ReferenceValue::Absolute(url) => url.rsplit('/').nth(1),
        }
    }

    /// Fills in the type of a bare id.
    pub fn with_default_type(self, default: &str) -> Self {
        match self {
            ReferenceValue::Local {
                resource_type: None,
                id,
            } => ReferenceValue::Local {
                resource_type: Some(default.to_string()),
                id,
            },
            other => other,
        }
    }

    /// Returns true if a stored `reference` string points at this value.
    pub fn matches(&self, reference: &str) -> bool {
        match self {
            ReferenceValue::Local { resource_type, id } => match ResourceRef::parse(reference) {
                Some(r) => {
                    r.id == *id && resource_type.as_ref().is_none_or(|t| *t == r.resource_type)
                }
                None => false,
            },
            ReferenceValue::Absolute(url) => {
                reference == url
                    || (!reference.contains("://")
                        && url.ends_with(reference)
                        && url[..url.len() - reference.len()].ends_with('/'))
            }
        }
    }
}
