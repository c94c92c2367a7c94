//! Core types for sitecheck
//!
//! Extraction records, verdicts and results. Every map is ordered so the
//! serialized form of a value is stable across runs.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// A leaf value read from the page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Value {
    /// Normalized element text or attribute value
    Text(String),
    /// Canonicalized computed style value
    Style(String),
    /// Geometry or match count
    Number(f64),
    /// Nothing was found
    Absent,
}

static ABSENT: Value = Value::Absent;

impl Value {
    pub fn is_absent(&self) -> bool {
        matches!(self, Value::Absent)
    }

    /// String view used for comparisons; `None` when absent
    pub fn as_string(&self) -> Option<String> {
        match self {
            Value::Text(s) | Value::Style(s) => Some(s.clone()),
            Value::Number(n) => Some(format_number(*n)),
            Value::Absent => None,
        }
    }

    /// Numeric view: numbers as-is, strings by their leading number ("48px" -> 48)
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            Value::Text(s) | Value::Style(s) => leading_number(s),
            Value::Absent => None,
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Absent
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) | Value::Style(s) => write!(f, "{}", s),
            Value::Number(n) => write!(f, "{}", format_number(*n)),
            Value::Absent => write!(f, "<absent>"),
        }
    }
}

/// Parse the number a string starts with, ignoring a trailing unit.
pub fn leading_number(s: &str) -> Option<f64> {
    let s = s.trim();
    let end = s
        .char_indices()
        .find(|&(i, c)| !(c.is_ascii_digit() || c == '.' || (i == 0 && (c == '-' || c == '+'))))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s[..end].parse().ok()
}

/// Canonical decimal form: at most three fractional digits, no trailing zeros.
pub fn format_number(n: f64) -> String {
    let rounded = (n * 1000.0).round() / 1000.0;
    if rounded == 0.0 {
        return "0".to_string();
    }
    format!("{}", rounded)
}

/// A field value together with the descriptor's `required` flag
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractedField {
    pub value: Value,
    #[serde(default)]
    pub required: bool,
}

/// An outbound URL found while extracting, before normalization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HarvestedLink {
    pub label: String,
    pub url: String,
}

/// What the orchestrator saw for one component or repeated child
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractionRecord {
    pub kind: String,
    pub found: bool,
    #[serde(default)]
    pub fields: BTreeMap<String, ExtractedField>,
    #[serde(default)]
    pub children: Vec<ExtractionRecord>,
    #[serde(default)]
    pub links: Vec<HarvestedLink>,
    /// Why the record was degraded to `found = false`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ExtractionRecord {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            found: true,
            fields: BTreeMap::new(),
            children: Vec::new(),
            links: Vec::new(),
            note: None,
        }
    }

    pub fn not_found(kind: impl Into<String>) -> Self {
        Self {
            found: false,
            ..Self::new(kind)
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    /// Value of a field, `Absent` when the record has no such field
    pub fn value(&self, name: &str) -> &Value {
        self.fields.get(name).map(|f| &f.value).unwrap_or(&ABSENT)
    }

    /// Links of this record and all of its descendants, in DOM order
    pub fn all_links(&self) -> Vec<HarvestedLink> {
        let mut links = self.links.clone();
        for child in &self.children {
            links.extend(child.all_links());
        }
        links
    }
}

/// Outcome of one leaf comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FieldStatus {
    Pass,
    Fail,
    MissingExpected,
    UnexpectedExtra,
    NotApplicable,
}

impl FieldStatus {
    /// Statuses that fail a component regardless of strictness
    pub fn is_failure(&self) -> bool {
        matches!(self, FieldStatus::Fail | FieldStatus::MissingExpected)
    }
}

impl fmt::Display for FieldStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldStatus::Pass => write!(f, "PASS"),
            FieldStatus::Fail => write!(f, "FAIL"),
            FieldStatus::MissingExpected => write!(f, "MISSING_EXPECTED"),
            FieldStatus::UnexpectedExtra => write!(f, "UNEXPECTED_EXTRA"),
            FieldStatus::NotApplicable => write!(f, "NOT_APPLICABLE"),
        }
    }
}

/// Component-level judgment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Pass,
    Fail,
    NotApplicable,
}

impl Verdict {
    /// Optional components that are absent do not fail anything
    pub fn is_pass(&self) -> bool {
        !matches!(self, Verdict::Fail)
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verdict::Pass => write!(f, "PASS"),
            Verdict::Fail => write!(f, "FAIL"),
            Verdict::NotApplicable => write!(f, "NOT_APPLICABLE"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldVerdict {
    pub name: String,
    pub status: FieldStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected: Option<String>,
    pub actual: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentVerdict {
    pub kind: String,
    /// Matching key, set on child verdicts
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,
    pub found: bool,
    pub status: Verdict,
    #[serde(default)]
    pub field_verdicts: Vec<FieldVerdict>,
    /// Paired children, in the DOM order of the actual children
    #[serde(default)]
    pub child_verdicts: Vec<ComponentVerdict>,
    #[serde(default)]
    pub missing_children: BTreeSet<String>,
    #[serde(default)]
    pub extra_children: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ComponentVerdict {
    pub fn passed(&self) -> bool {
        self.status.is_pass()
    }

    pub fn failing_fields(&self) -> impl Iterator<Item = &FieldVerdict> {
        self.field_verdicts.iter().filter(|v| v.status.is_failure())
    }
}

/// How a link check ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LinkClassification {
    Valid,
    Invalid,
    Unreachable,
    /// Non-HTTP scheme, never requested
    Skipped,
}

impl LinkClassification {
    pub fn is_ok(&self) -> bool {
        matches!(self, LinkClassification::Valid | LinkClassification::Skipped)
    }

    /// Classify a final HTTP status
    pub fn from_status(status: u16) -> Self {
        if (200..400).contains(&status) {
            LinkClassification::Valid
        } else {
            LinkClassification::Invalid
        }
    }
}

impl fmt::Display for LinkClassification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkClassification::Valid => write!(f, "VALID"),
            LinkClassification::Invalid => write!(f, "INVALID"),
            LinkClassification::Unreachable => write!(f, "UNREACHABLE"),
            LinkClassification::Skipped => write!(f, "SKIPPED"),
        }
    }
}

/// Why a link produced no HTTP status
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum LinkErrorKind {
    Timeout,
    Dns,
    ConnectionRefused,
    Transport(String),
    InvalidUrl(String),
    UnsupportedScheme(String),
    /// The worker running the check went away
    Aborted,
}

impl fmt::Display for LinkErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkErrorKind::Timeout => write!(f, "timeout"),
            LinkErrorKind::Dns => write!(f, "dns failure"),
            LinkErrorKind::ConnectionRefused => write!(f, "connection refused"),
            LinkErrorKind::Transport(msg) => write!(f, "transport error: {}", msg),
            LinkErrorKind::InvalidUrl(msg) => write!(f, "invalid url: {}", msg),
            LinkErrorKind::UnsupportedScheme(scheme) => write!(f, "skipped {} link", scheme),
            LinkErrorKind::Aborted => write!(f, "check aborted"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinkVerdict {
    /// Normalized URL (resolved, fragment stripped)
    pub url: String,
    /// Label of the first occurrence
    pub source_label: String,
    pub occurrences: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub http_status: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<LinkErrorKind>,
    pub classification: LinkClassification,
    pub attempts: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageCounts {
    pub components_passed: usize,
    pub components_failed: usize,
    pub components_not_applicable: usize,
    pub links_valid: usize,
    pub links_invalid: usize,
    pub links_unreachable: usize,
    pub links_skipped: usize,
}

impl PageCounts {
    pub fn links_checked(&self) -> usize {
        self.links_valid + self.links_invalid + self.links_unreachable + self.links_skipped
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageResult {
    pub url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub locale: Option<String>,
    pub component_verdicts: BTreeMap<String, ComponentVerdict>,
    pub link_verdicts: Vec<LinkVerdict>,
    pub counts: PageCounts,
    pub all_pass: bool,
    /// Set when the page could not be opened at all
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub pages_total: usize,
    pub pages_passed: usize,
    pub pages_failed: usize,
    pub components_passed: usize,
    pub components_failed: usize,
    pub components_not_applicable: usize,
    pub links_checked: usize,
    pub links_valid: usize,
    pub links_invalid: usize,
    pub links_unreachable: usize,
    pub links_skipped: usize,
    /// Passed pages over total pages (1.0 for an empty run)
    pub pass_ratio: f64,
    pub all_pass: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunResult {
    pub pages: Vec<PageResult>,
    pub summary: RunSummary,
}
