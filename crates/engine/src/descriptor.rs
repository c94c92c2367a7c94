//! Declarative component descriptors
//!
//! A descriptor says where a component lives, which fields to read from it,
//! which repeated children to walk and, optionally, the interaction steps
//! to perform first. Descriptors are plain data; the orchestrator interprets
//! them the same way for every component kind.

use std::collections::HashSet;

use serde::{Deserialize, Deserializer, Serialize};
use sitecheck_common::{Error, Result};

use crate::dom::DomAction;
use crate::pattern;

/// One CSS selector or an ordered list of fallbacks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SelectorSpec {
    One(String),
    Fallbacks(Vec<String>),
}

impl SelectorSpec {
    /// Candidates in the order they are tried
    pub fn candidates(&self) -> Vec<&str> {
        match self {
            SelectorSpec::One(s) => vec![s.as_str()],
            SelectorSpec::Fallbacks(list) => list.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for SelectorSpec {
    fn from(s: &str) -> Self {
        SelectorSpec::One(s.to_string())
    }
}

impl std::fmt::Display for SelectorSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.candidates().join(" | "))
    }
}

/// What to read from a located element
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Read {
    #[default]
    Text,
    Attribute {
        name: String,
    },
    Style {
        property: String,
    },
    Width,
    Height,
    /// Number of matching elements
    Count,
}

/// Regex capture applied to the raw read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transform {
    pub pattern: String,

    /// Capture group; defaults to 1 when the pattern has one, else 0
    #[serde(default)]
    pub group: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,

    /// Omitted means the scope element itself
    #[serde(default)]
    pub locate: Option<SelectorSpec>,

    #[serde(default)]
    pub read: Read,

    #[serde(default)]
    pub transform: Option<Transform>,

    #[serde(default)]
    pub required: bool,

    /// Harvest the value as an outbound URL
    #[serde(default)]
    pub link: bool,
}

impl FieldDescriptor {
    pub fn text(name: &str, locate: &str) -> Self {
        Self {
            name: name.to_string(),
            locate: Some(locate.into()),
            read: Read::Text,
            transform: None,
            required: false,
            link: false,
        }
    }

    pub fn attribute(name: &str, locate: &str, attribute: &str) -> Self {
        Self {
            read: Read::Attribute {
                name: attribute.to_string(),
            },
            ..Self::text(name, locate)
        }
    }

    pub fn style(name: &str, locate: &str, property: &str) -> Self {
        Self {
            read: Read::Style {
                property: property.to_string(),
            },
            ..Self::text(name, locate)
        }
    }

    pub fn href(name: &str, locate: &str) -> Self {
        Self {
            link: true,
            ..Self::attribute(name, locate, "href")
        }
    }

    /// Image source, checked like any other link
    pub fn image(name: &str, locate: &str) -> Self {
        Self {
            link: true,
            ..Self::attribute(name, locate, "src")
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn with_transform(mut self, pattern: &str) -> Self {
        self.transform = Some(Transform {
            pattern: pattern.to_string(),
            group: None,
        });
        self
    }

    pub fn with_read(mut self, read: Read) -> Self {
        self.read = read;
        self
    }
}

/// Zero or more child records located inside the parent scope
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepeatDescriptor {
    pub name: String,
    pub locate: SelectorSpec,
    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,
    #[serde(default)]
    pub repeat: Option<Box<RepeatDescriptor>>,
    /// Extract at most this many children
    #[serde(default)]
    pub limit: Option<usize>,
}

/// One step performed before a component is extracted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub target: SelectorSpec,
    pub action: DomAction,
}

impl Interaction {
    pub fn new(target: impl Into<SelectorSpec>, action: DomAction) -> Self {
        Self {
            target: target.into(),
            action,
        }
    }
}

impl std::fmt::Display for Interaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.action, self.target)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

/// A single step or a list of steps
fn one_or_many<'de, D, T>(deserializer: D) -> std::result::Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::Many(steps) => steps,
        OneOrMany::One(step) => vec![step],
    })
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComponentDescriptor {
    pub kind: String,

    #[serde(default)]
    pub description: String,

    pub root: SelectorSpec,

    #[serde(default)]
    pub fields: Vec<FieldDescriptor>,

    #[serde(default)]
    pub repeat: Option<RepeatDescriptor>,

    /// Performed in order; `interaction` with a single step also works
    #[serde(
        default,
        alias = "interaction",
        deserialize_with = "one_or_many",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub interactions: Vec<Interaction>,
}

impl ComponentDescriptor {
    /// Check names and patterns before the descriptor is used on a page
    pub fn validate(&self) -> Result<()> {
        check_node(&self.kind, &self.fields)?;
        if let Some(repeat) = &self.repeat {
            validate_repeat(&self.kind, repeat)?;
        }
        Ok(())
    }

    /// Field names of the repeat at `depth` (0 = component level)
    pub fn field_names_at(&self, depth: usize) -> Option<Vec<&str>> {
        if depth == 0 {
            return Some(self.fields.iter().map(|f| f.name.as_str()).collect());
        }
        let mut repeat = self.repeat.as_ref()?;
        for _ in 1..depth {
            repeat = repeat.repeat.as_deref()?;
        }
        Some(repeat.fields.iter().map(|f| f.name.as_str()).collect())
    }
}

fn validate_repeat(owner: &str, repeat: &RepeatDescriptor) -> Result<()> {
    let owner = format!("{}.{}", owner, repeat.name);
    check_node(&owner, &repeat.fields)?;
    if let Some(inner) = &repeat.repeat {
        validate_repeat(&owner, inner)?;
    }
    Ok(())
}

fn check_node(owner: &str, fields: &[FieldDescriptor]) -> Result<()> {
    let mut seen = HashSet::new();
    for field in fields {
        if !seen.insert(field.name.as_str()) {
            return Err(Error::DuplicateField {
                owner: owner.to_string(),
                field: field.name.clone(),
            });
        }
        if let Some(transform) = &field.transform {
            pattern::compile(&transform.pattern)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_descriptor_yaml() {
        let yaml = r#"
kind: product_cards
root: [".product-list", "[class*='products']"]
fields:
  - name: heading
    locate: h2
    required: true
  - name: card_count
    locate: .card
    read: { kind: count }
repeat:
  name: card
  locate: .card
  limit: 5
  fields:
    - name: model
      locate: .model
      transform: { pattern: "(D\\d-S\\d{4})" }
    - name: link
      locate: a
      read: { kind: attribute, name: href }
      link: true
interaction:
  target: select.interface
  action: { type: select_index, index: 2 }
"#;
        let descriptor: ComponentDescriptor = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(descriptor.kind, "product_cards");
        assert_eq!(descriptor.root.candidates(), vec![".product-list", "[class*='products']"]);
        assert_eq!(descriptor.fields[1].read, Read::Count);
        assert!(descriptor.fields[0].required);

        let repeat = descriptor.repeat.as_ref().unwrap();
        assert_eq!(repeat.limit, Some(5));
        assert!(repeat.fields[1].link);
        assert_eq!(
            descriptor.interactions,
            vec![Interaction::new("select.interface", DomAction::SelectIndex { index: 2 })]
        );
        descriptor.validate().unwrap();
    }

    #[test]
    fn test_interaction_steps_keep_order() {
        let yaml = r#"
kind: filter_controls
root: .model-list
interactions:
  - target: .cmp-custom-select__input
    action: { type: click }
  - target: [".cmp-custom-select__option--pcie", ".cmp-custom-select__option"]
    action: { type: click }
"#;
        let descriptor: ComponentDescriptor = serde_yaml::from_str(yaml).unwrap();
        let steps: Vec<String> = descriptor.interactions.iter().map(|s| s.to_string()).collect();
        assert_eq!(
            steps,
            vec![
                "click .cmp-custom-select__input",
                "click .cmp-custom-select__option--pcie | .cmp-custom-select__option"
            ]
        );

        let text = serde_yaml::to_string(&descriptor).unwrap();
        let reparsed: ComponentDescriptor = serde_yaml::from_str(&text).unwrap();
        assert_eq!(reparsed, descriptor);

        let plain: ComponentDescriptor = serde_yaml::from_str("kind: x\nroot: .x\n").unwrap();
        assert!(plain.interactions.is_empty());
        assert!(!serde_yaml::to_string(&plain).unwrap().contains("interactions"));
    }

    #[test]
    fn test_duplicate_field_names_are_rejected() {
        let descriptor = ComponentDescriptor {
            kind: "hero_banner".into(),
            description: String::new(),
            root: ".hero".into(),
            fields: vec![
                FieldDescriptor::text("title", "h1"),
                FieldDescriptor::text("title", "h2"),
            ],
            repeat: None,
            interactions: vec![],
        };
        match descriptor.validate() {
            Err(Error::DuplicateField { owner, field }) => {
                assert_eq!(owner, "hero_banner");
                assert_eq!(field, "title");
            }
            other => panic!("expected duplicate field error, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_transform_is_rejected() {
        let descriptor = ComponentDescriptor {
            kind: "hero_banner".into(),
            description: String::new(),
            root: ".hero".into(),
            fields: vec![FieldDescriptor::text("title", "h1").with_transform("(unclosed")],
            repeat: None,
            interactions: vec![],
        };
        assert!(matches!(descriptor.validate(), Err(Error::InvalidPattern { .. })));
    }

    #[test]
    fn test_field_names_at_depth() {
        let descriptor = ComponentDescriptor {
            kind: "navigation_menu".into(),
            description: String::new(),
            root: "nav".into(),
            fields: vec![FieldDescriptor::text("label", "h2")],
            repeat: Some(RepeatDescriptor {
                name: "item".into(),
                locate: "li".into(),
                fields: vec![FieldDescriptor::text("name", "a")],
                repeat: None,
                limit: None,
            }),
            interactions: vec![],
        };
        assert_eq!(descriptor.field_names_at(0), Some(vec!["label"]));
        assert_eq!(descriptor.field_names_at(1), Some(vec!["name"]));
        assert_eq!(descriptor.field_names_at(2), None);
    }
}
