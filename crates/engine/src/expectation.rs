//! Expectation records and the expectation catalog

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::path::Path;

use serde::{Deserialize, Serialize};
use sitecheck_common::{format_number, Error, Result, Value};

use crate::descriptor::ComponentDescriptor;
use crate::extract::{normalize_text, parse_color};
use crate::pattern;
use crate::registry::ComponentRegistry;

/// Expected value of one field
///
/// A bare string is an exact match, a bare number an exact numeric match,
/// anything else a predicate map with an `op` tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Expect {
    Exact(String),
    Number(f64),
    Rule(Predicate),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Predicate {
    Equals {
        value: String,
    },
    Contains {
        value: String,
    },
    Matches {
        pattern: String,
    },
    OneOf {
        values: Vec<String>,
    },
    /// Present with any value
    Any,
    Absent,
    /// Numeric comparison; tolerance falls back to the match options
    Approx {
        value: f64,
        #[serde(default)]
        tolerance: Option<f64>,
    },
    /// RGB comparison, tolerance per channel
    Color {
        value: String,
        #[serde(default)]
        tolerance: u8,
    },
}

impl Expect {
    /// The literal a matching key can be derived from
    fn literal(&self) -> Option<String> {
        match self {
            Expect::Exact(s) | Expect::Rule(Predicate::Equals { value: s }) => Some(s.clone()),
            Expect::Number(n) => Some(format_number(*n)),
            _ => None,
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Expect::Rule(Predicate::Matches { pattern }) => {
                pattern::compile(pattern)?;
            }
            Expect::Rule(Predicate::Color { value, .. }) if parse_color(value).is_none() => {
                return Err(Error::InvalidConfig(format!("unrecognized color '{}'", value)));
            }
            _ => {}
        }
        Ok(())
    }
}

impl fmt::Display for Expect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expect::Exact(s) => write!(f, "{}", s),
            Expect::Number(n) => write!(f, "{}", format_number(*n)),
            Expect::Rule(p) => match p {
                Predicate::Equals { value } => write!(f, "{}", value),
                Predicate::Contains { value } => write!(f, "contains '{}'", value),
                Predicate::Matches { pattern } => write!(f, "matches /{}/", pattern),
                Predicate::OneOf { values } => write!(f, "one of [{}]", values.join(", ")),
                Predicate::Any => write!(f, "<any>"),
                Predicate::Absent => write!(f, "<absent>"),
                Predicate::Approx { value, tolerance } => match tolerance {
                    Some(t) => write!(f, "{} ± {}", format_number(*value), format_number(*t)),
                    None => write!(f, "{}", format_number(*value)),
                },
                Predicate::Color { value, tolerance } => write!(f, "color {} ± {}", value, tolerance),
            },
        }
    }
}

/// How to derive a matching key from a child's field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyRule {
    pub field: String,
    /// Optional capture; default group as in field transforms
    #[serde(default)]
    pub pattern: Option<String>,
}

impl KeyRule {
    /// Key of a raw string, `None` when it yields nothing
    pub fn apply(&self, raw: &str) -> Result<Option<String>> {
        let normalized = normalize_text(raw);
        let key = match &self.pattern {
            Some(p) => pattern::capture(&pattern::compile(p)?, None, &normalized),
            None => Some(normalized),
        };
        Ok(key.filter(|k| !k.is_empty()))
    }

    /// Key of an extracted value
    pub fn key_of(&self, value: &Value) -> Result<Option<String>> {
        match value.as_string() {
            Some(raw) => self.apply(&raw),
            None => Ok(None),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChildExpectations {
    pub key: KeyRule,
    #[serde(default)]
    pub items: Vec<ExpectationRecord>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ExpectationRecord {
    /// Descriptor kind; defaults to the component name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,

    #[serde(default)]
    pub optional: bool,

    /// Explicit matching key for a child item
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    #[serde(default)]
    pub fields: BTreeMap<String, Expect>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub children: Option<ChildExpectations>,
}

impl ExpectationRecord {
    pub fn kind_or<'a>(&'a self, name: &'a str) -> &'a str {
        self.kind.as_deref().unwrap_or(name)
    }

    pub fn with_field(mut self, name: &str, expect: Expect) -> Self {
        self.fields.insert(name.to_string(), expect);
        self
    }

    /// Matching key of this record as a child item
    pub fn expected_key(&self, rule: &KeyRule) -> Result<Option<String>> {
        if let Some(key) = &self.key {
            let key = normalize_text(key);
            return Ok(Some(key).filter(|k| !k.is_empty()));
        }
        match self.fields.get(&rule.field).and_then(Expect::literal) {
            Some(literal) => rule.apply(&literal),
            None => Ok(None),
        }
    }

    /// Check this record against the descriptor it will be matched with
    pub fn validate(&self, name: &str, descriptor: &ComponentDescriptor) -> Result<()> {
        self.validate_at(name, descriptor, 0)
    }

    fn validate_at(&self, label: &str, descriptor: &ComponentDescriptor, depth: usize) -> Result<()> {
        let names = descriptor
            .field_names_at(depth)
            .ok_or_else(|| Error::NoRepeat {
                component: label.to_string(),
            })?;

        for (field, expect) in &self.fields {
            if !names.contains(&field.as_str()) {
                return Err(Error::UnknownField {
                    component: label.to_string(),
                    field: field.clone(),
                });
            }
            expect.validate()?;
        }

        let Some(children) = &self.children else {
            return Ok(());
        };

        let child_names = descriptor
            .field_names_at(depth + 1)
            .ok_or_else(|| Error::NoRepeat {
                component: label.to_string(),
            })?;
        if !child_names.contains(&children.key.field.as_str()) {
            return Err(Error::UnknownKeyField {
                component: label.to_string(),
                field: children.key.field.clone(),
            });
        }
        if let Some(p) = &children.key.pattern {
            pattern::compile(p)?;
        }

        let mut seen = HashSet::new();
        for (index, item) in children.items.iter().enumerate() {
            let key = item
                .expected_key(&children.key)?
                .ok_or_else(|| Error::MissingChildKey {
                    component: label.to_string(),
                    index,
                })?;
            if !seen.insert(key.clone()) {
                return Err(Error::DuplicateExpectedKey {
                    component: label.to_string(),
                    key,
                });
            }
            item.validate_at(&format!("{}[{}]", label, key), descriptor, depth + 1)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CatalogDefaults {
    #[serde(default)]
    pub components: BTreeMap<String, ExpectationRecord>,
}

/// Expectations for the pages matching an exact URL or a URL pattern
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PageExpectation {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub url_pattern: Option<String>,
    #[serde(default)]
    pub components: BTreeMap<String, ExpectationRecord>,
}

impl PageExpectation {
    fn applies_to(&self, url: &str) -> Result<bool> {
        if let Some(exact) = &self.url {
            if exact.trim_end_matches('/') == url.trim_end_matches('/') {
                return Ok(true);
            }
        }
        if let Some(p) = &self.url_pattern {
            return Ok(pattern::compile(p)?.is_match(url));
        }
        Ok(false)
    }
}

/// Component expectations by page
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpectationCatalog {
    #[serde(default)]
    pub defaults: CatalogDefaults,
    #[serde(default)]
    pub pages: Vec<PageExpectation>,
}

impl ExpectationCatalog {
    pub fn from_yaml(content: &str) -> Result<Self> {
        Ok(serde_yaml::from_str(content)?)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Defaults overlaid with every matching page entry, later entries winning
    pub fn for_url(&self, url: &str) -> Result<BTreeMap<String, ExpectationRecord>> {
        let mut components = self.defaults.components.clone();
        for page in &self.pages {
            if page.applies_to(url)? {
                components.extend(page.components.clone());
            }
        }
        Ok(components)
    }

    /// Validate every record against the registry
    pub fn validate(&self, registry: &ComponentRegistry) -> Result<()> {
        let pages = self.pages.iter().map(|p| &p.components);
        for components in std::iter::once(&self.defaults.components).chain(pages) {
            for (name, record) in components {
                record.validate(name, registry.get(record.kind_or(name))?)?;
            }
        }
        for page in &self.pages {
            if let Some(p) = &page.url_pattern {
                pattern::compile(p)?;
            }
            if page.url.is_none() && page.url_pattern.is_none() {
                return Err(Error::InvalidConfig(
                    "catalog page entry needs a url or url_pattern".into(),
                ));
            }
        }
        Ok(())
    }
}
