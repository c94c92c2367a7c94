//! Field extraction
//!
//! Turns a field descriptor plus a scope into a [`Value`]. Structural absence
//! is never an error here: a selector that matches nothing, a transform that
//! does not match and a flaky accessor read all end up as `Value::Absent`.
//! Only contract violations (bad selector, bad regex) propagate.

use futures::future::{FutureExt, LocalBoxFuture};
use sitecheck_common::{format_number, ExtractedField, ExtractionRecord, HarvestedLink, Result, Value};
use tracing::{debug, warn};

use crate::descriptor::{FieldDescriptor, Read, RepeatDescriptor, SelectorSpec};
use crate::dom::{DomAccessor, Scope};
use crate::error::DomError;
use crate::pattern;

/// Trim and collapse every whitespace run to a single space
pub fn normalize_text(raw: &str) -> String {
    raw.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// An RGB color with alpha in `0.0..=1.0`
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f64,
}

impl Rgba {
    /// Largest per-channel difference
    pub fn distance(&self, other: &Rgba) -> u8 {
        [
            self.r.abs_diff(other.r),
            self.g.abs_diff(other.g),
            self.b.abs_diff(other.b),
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

impl std::fmt::Display for Rgba {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.a >= 1.0 {
            write!(f, "rgb({}, {}, {})", self.r, self.g, self.b)
        } else {
            write!(f, "rgba({}, {}, {}, {})", self.r, self.g, self.b, format_number(self.a))
        }
    }
}

const NAMED_COLORS: &[(&str, (u8, u8, u8))] = &[
    ("black", (0, 0, 0)),
    ("white", (255, 255, 255)),
    ("red", (255, 0, 0)),
    ("green", (0, 128, 0)),
    ("blue", (0, 0, 255)),
    ("yellow", (255, 255, 0)),
    ("orange", (255, 165, 0)),
    ("purple", (128, 0, 128)),
    ("gray", (128, 128, 128)),
    ("grey", (128, 128, 128)),
    ("silver", (192, 192, 192)),
    ("navy", (0, 0, 128)),
];

/// Parse hex, `rgb()`/`rgba()` and a few named colors
pub fn parse_color(raw: &str) -> Option<Rgba> {
    let s = raw.trim().to_ascii_lowercase();

    if s == "transparent" {
        return Some(Rgba { r: 0, g: 0, b: 0, a: 0.0 });
    }
    if let Some(&(_, (r, g, b))) = NAMED_COLORS.iter().find(|(name, _)| *name == s) {
        return Some(Rgba { r, g, b, a: 1.0 });
    }

    if let Some(hex) = s.strip_prefix('#') {
        let expand = |c: char| c.to_digit(16).map(|d| (d * 17) as u8);
        let pair = |i: usize| u8::from_str_radix(hex.get(i..i + 2)?, 16).ok();
        let chars: Vec<char> = hex.chars().collect();
        return match chars.len() {
            3 => Some(Rgba {
                r: expand(chars[0])?,
                g: expand(chars[1])?,
                b: expand(chars[2])?,
                a: 1.0,
            }),
            6 => Some(Rgba { r: pair(0)?, g: pair(2)?, b: pair(4)?, a: 1.0 }),
            8 => Some(Rgba {
                r: pair(0)?,
                g: pair(2)?,
                b: pair(4)?,
                a: f64::from(pair(6)?) / 255.0,
            }),
            _ => None,
        };
    }

    let inner = s
        .strip_prefix("rgba(")
        .or_else(|| s.strip_prefix("rgb("))?
        .strip_suffix(')')?;
    let parts: Vec<&str> = inner
        .split(|c: char| c == ',' || c == '/' || c.is_whitespace())
        .filter(|p| !p.is_empty())
        .collect();
    if parts.len() != 3 && parts.len() != 4 {
        return None;
    }
    let channel = |p: &str| p.parse::<f64>().ok().map(|v| v.round().clamp(0.0, 255.0) as u8);
    let alpha = match parts.get(3) {
        Some(p) => p.parse::<f64>().ok()?.clamp(0.0, 1.0),
        None => 1.0,
    };
    Some(Rgba {
        r: channel(parts[0])?,
        g: channel(parts[1])?,
        b: channel(parts[2])?,
        a: alpha,
    })
}

fn canonical_length(token: &str) -> Option<String> {
    let number: f64 = token.strip_suffix("px")?.parse().ok()?;
    Some(format!("{}px", format_number(number)))
}

/// Canonical form of a computed style value
///
/// Colors become `rgb(r, g, b)` (or `rgba` when translucent), pixel lengths
/// lose trailing zeros, everything else is whitespace-normalized.
pub fn normalize_style(raw: &str) -> String {
    let value = normalize_text(raw);
    if let Some(color) = parse_color(&value) {
        return color.to_string();
    }
    if value.contains('(') {
        return value;
    }
    value
        .split(' ')
        .map(|token| {
            canonical_length(token)
                .or_else(|| parse_color(token).map(|c| c.to_string()))
                .unwrap_or_else(|| token.to_string())
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Escalate contract violations, swallow everything else with a warning
fn recover<T>(result: std::result::Result<T, DomError>, context: &str) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(e) => match e.contract_violation() {
            Some(violation) => Err(violation),
            None => {
                warn!("{}: {}", context, e);
                Ok(None)
            }
        },
    }
}

/// Handles of the first candidate selector that matches anything
pub async fn locate_first<D: DomAccessor>(
    dom: &D,
    scope: &Scope<D::Handle>,
    spec: &SelectorSpec,
) -> Result<Vec<D::Handle>> {
    for candidate in spec.candidates() {
        let found = recover(dom.locate(scope, candidate).await, candidate)?.unwrap_or_default();
        if !found.is_empty() {
            return Ok(found);
        }
    }
    Ok(Vec::new())
}

async fn scope_element<D: DomAccessor>(dom: &D, scope: &Scope<D::Handle>) -> Result<Option<D::Handle>> {
    match scope {
        Scope::Element(handle) => Ok(Some(handle.clone())),
        Scope::Page => Ok(locate_first(dom, scope, &SelectorSpec::One("html".into()))
            .await?
            .into_iter()
            .next()),
    }
}

async fn read_raw<D: DomAccessor>(dom: &D, handle: &D::Handle, read: &Read, field: &str) -> Result<Value> {
    let value = match read {
        Read::Text => recover(dom.text(handle).await, field)?.map(|t| Value::Text(normalize_text(&t))),
        Read::Attribute { name } => recover(dom.attribute(handle, name).await, field)?
            .flatten()
            .map(|a| Value::Text(a.trim().to_string())),
        Read::Style { property } => recover(dom.computed_style(handle, property).await, field)?
            .flatten()
            .map(|s| Value::Style(normalize_style(&s))),
        Read::Width => recover(dom.bounding_box(handle).await, field)?
            .flatten()
            .map(|b| Value::Number(b.width)),
        Read::Height => recover(dom.bounding_box(handle).await, field)?
            .flatten()
            .map(|b| Value::Number(b.height)),
        // handled before a single handle is picked
        Read::Count => None,
    };
    Ok(value.unwrap_or(Value::Absent))
}

/// Extract one field inside `scope`
pub async fn extract_field<D: DomAccessor>(
    dom: &D,
    scope: &Scope<D::Handle>,
    field: &FieldDescriptor,
) -> Result<Value> {
    if field.read == Read::Count {
        let count = match &field.locate {
            Some(spec) => locate_first(dom, scope, spec).await?.len(),
            None => 1,
        };
        return apply_transform(Value::Number(count as f64), field);
    }

    let handle = match &field.locate {
        Some(spec) => locate_first(dom, scope, spec).await?.into_iter().next(),
        None => scope_element(dom, scope).await?,
    };
    let Some(handle) = handle else {
        debug!("Field {} not present", field.name);
        return Ok(Value::Absent);
    };

    let value = read_raw(dom, &handle, &field.read, &field.name).await?;
    apply_transform(value, field)
}

fn apply_transform(value: Value, field: &FieldDescriptor) -> Result<Value> {
    let Some(transform) = &field.transform else {
        return Ok(value);
    };
    let Some(raw) = value.as_string() else {
        return Ok(Value::Absent);
    };
    let re = pattern::compile(&transform.pattern)?;
    Ok(match pattern::capture(&re, transform.group, &raw) {
        Some(captured) => match value {
            Value::Style(_) => Value::Style(captured),
            _ => Value::Text(normalize_text(&captured)),
        },
        None => {
            debug!("Transform for {} did not match '{}'", field.name, raw);
            Value::Absent
        }
    })
}

/// Extract a node (component or repeated child) and everything below it
///
/// `label` prefixes the source labels of harvested links, e.g.
/// `product_cards.card[2]`.
pub fn extract_node<'a, D: DomAccessor + 'a>(
    dom: &'a D,
    scope: Scope<D::Handle>,
    kind: &'a str,
    label: String,
    fields: &'a [FieldDescriptor],
    repeat: Option<&'a RepeatDescriptor>,
) -> LocalBoxFuture<'a, Result<ExtractionRecord>> {
    async move {
        let mut record = ExtractionRecord::new(kind);

        for field in fields {
            let value = extract_field(dom, &scope, field).await?;
            if field.link {
                if let Some(url) = value.as_string().filter(|u| !u.is_empty()) {
                    record.links.push(HarvestedLink {
                        label: format!("{}.{}", label, field.name),
                        url,
                    });
                }
            }
            record.fields.insert(
                field.name.clone(),
                ExtractedField {
                    value,
                    required: field.required,
                },
            );
        }

        if let Some(repeat) = repeat {
            record.children = extract_repeat(dom, &scope, repeat, &label).await?;
        }

        Ok(record)
    }
    .boxed_local()
}

/// One child record per located handle, in DOM order
pub async fn extract_repeat<D: DomAccessor>(
    dom: &D,
    scope: &Scope<D::Handle>,
    repeat: &RepeatDescriptor,
    parent_label: &str,
) -> Result<Vec<ExtractionRecord>> {
    let mut handles = locate_first(dom, scope, &repeat.locate).await?;
    if let Some(limit) = repeat.limit {
        handles.truncate(limit);
    }
    debug!("{}: {} {} element(s)", parent_label, handles.len(), repeat.name);

    let mut children = Vec::with_capacity(handles.len());
    for (index, handle) in handles.into_iter().enumerate() {
        let label = format!("{}.{}[{}]", parent_label, repeat.name, index);
        let child = extract_node(
            dom,
            Scope::Element(handle),
            &repeat.name,
            label,
            &repeat.fields,
            repeat.repeat.as_deref(),
        )
        .await?;
        children.push(child);
    }
    Ok(children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::snapshot::HtmlSnapshot;
    use proptest::prelude::*;
    use sitecheck_common::Error;
    use test_case::test_case;

    const HERO: &str = r#"
        <html><body>
          <div class="cmp-hero">
            <h1 class="cmp-hero__title" style="font-size: 48.0px; color: #FFF">
              Data   Center
              SSDs
            </h1>
            <img class="banner" src=" /img/hero.png " width="1920" height="600">
            <span class="model">Model: D7-P5520 (U.2)</span>
          </div>
          <ul class="crumbs">
            <li><a href="/">Home</a></li>
            <li><a href="/products">Products</a></li>
            <li><span>Current</span></li>
          </ul>
        </body></html>
    "#;

    async fn hero_scope(dom: &HtmlSnapshot) -> Scope<crate::snapshot::NodePath> {
        let root = dom.locate(&Scope::Page, ".cmp-hero").await.unwrap().remove(0);
        Scope::Element(root)
    }

    #[test_case("  Data   Center\n SSDs ", "Data Center SSDs" ; "collapse runs")]
    #[test_case("\tTabbed\u{a0}text", "Tabbed text" ; "tabs and nbsp")]
    #[test_case("", "" ; "empty")]
    fn test_normalize_text(raw: &str, expected: &str) {
        assert_eq!(normalize_text(raw), expected);
    }

    #[test_case("48.0px", "48px" ; "trailing zero")]
    #[test_case("#FFF", "rgb(255, 255, 255)" ; "short hex")]
    #[test_case("#0071c5", "rgb(0, 113, 197)" ; "long hex")]
    #[test_case("rgba(0, 113, 197, 1)", "rgb(0, 113, 197)" ; "opaque rgba")]
    #[test_case("rgba(0,0,0,0.5)", "rgba(0, 0, 0, 0.5)" ; "translucent")]
    #[test_case("white", "rgb(255, 255, 255)" ; "named")]
    #[test_case("0px 16.50px", "0px 16.5px" ; "length list")]
    #[test_case("1px solid #000", "1px solid rgb(0, 0, 0)" ; "border shorthand")]
    #[test_case("bold", "bold" ; "keyword")]
    fn test_normalize_style(raw: &str, expected: &str) {
        assert_eq!(normalize_style(raw), expected);
    }

    #[test]
    fn test_color_distance() {
        let a = parse_color("rgb(10, 20, 30)").unwrap();
        let b = parse_color("#0f1e14").unwrap();
        assert_eq!(a.distance(&b), 10);
        assert_eq!(parse_color("not-a-color"), None);
        assert_eq!(parse_color("#12"), None);
    }

    #[tokio::test]
    async fn test_extract_text_style_and_geometry() {
        let dom = HtmlSnapshot::parse(HERO);
        let scope = hero_scope(&dom).await;

        let title = FieldDescriptor::text("title", "h1");
        assert_eq!(
            extract_field(&dom, &scope, &title).await.unwrap(),
            Value::Text("Data Center SSDs".into())
        );

        let size = FieldDescriptor::style("size", "h1", "font-size");
        assert_eq!(extract_field(&dom, &scope, &size).await.unwrap(), Value::Style("48px".into()));

        let color = FieldDescriptor::style("color", "h1", "color");
        assert_eq!(
            extract_field(&dom, &scope, &color).await.unwrap(),
            Value::Style("rgb(255, 255, 255)".into())
        );

        let src = FieldDescriptor::attribute("image", "img", "src");
        assert_eq!(
            extract_field(&dom, &scope, &src).await.unwrap(),
            Value::Text("/img/hero.png".into())
        );

        let width = FieldDescriptor::text("width", "img").with_read(Read::Width);
        assert_eq!(extract_field(&dom, &scope, &width).await.unwrap(), Value::Number(1920.0));
    }

    #[tokio::test]
    async fn test_missing_and_fallback_selectors() {
        let dom = HtmlSnapshot::parse(HERO);
        let scope = hero_scope(&dom).await;

        let missing = FieldDescriptor::text("subtitle", ".cmp-hero__subtitle").required();
        assert_eq!(extract_field(&dom, &scope, &missing).await.unwrap(), Value::Absent);

        let fallback = FieldDescriptor {
            locate: Some(SelectorSpec::Fallbacks(vec![".cmp-hero__subtitle".into(), "h1".into()])),
            ..FieldDescriptor::text("title", "unused")
        };
        assert_eq!(
            extract_field(&dom, &scope, &fallback).await.unwrap(),
            Value::Text("Data Center SSDs".into())
        );

        // scoped: the breadcrumb anchors are outside the hero
        let count = FieldDescriptor::text("links", "a").with_read(Read::Count);
        assert_eq!(extract_field(&dom, &scope, &count).await.unwrap(), Value::Number(0.0));
        assert_eq!(
            extract_field(&dom, &Scope::Page, &count).await.unwrap(),
            Value::Number(2.0)
        );
    }

    #[tokio::test]
    async fn test_transform() {
        let dom = HtmlSnapshot::parse(HERO);
        let scope = hero_scope(&dom).await;

        let model = FieldDescriptor::text("model", ".model").with_transform(r"Model: (\S+)");
        assert_eq!(
            extract_field(&dom, &scope, &model).await.unwrap(),
            Value::Text("D7-P5520".into())
        );

        let no_match = FieldDescriptor::text("model", ".model").with_transform(r"SKU (\d+)");
        assert_eq!(extract_field(&dom, &scope, &no_match).await.unwrap(), Value::Absent);

        let invalid = FieldDescriptor::text("model", ".model").with_transform("(");
        assert!(matches!(
            extract_field(&dom, &scope, &invalid).await,
            Err(Error::InvalidPattern { .. })
        ));
    }

    #[tokio::test]
    async fn test_invalid_selector_is_contract_violation() {
        let dom = HtmlSnapshot::parse(HERO);
        let field = FieldDescriptor::text("title", "h1[[");
        assert!(matches!(
            extract_field(&dom, &Scope::Page, &field).await,
            Err(Error::InvalidSelector { .. })
        ));
    }

    #[tokio::test]
    async fn test_extract_repeat_harvests_links_in_dom_order() {
        let dom = HtmlSnapshot::parse(HERO);
        let repeat = RepeatDescriptor {
            name: "crumb".into(),
            locate: "ul.crumbs li".into(),
            fields: vec![
                FieldDescriptor::text("label", "a, span"),
                FieldDescriptor::href("link", "a"),
            ],
            repeat: None,
            limit: None,
        };

        let record = extract_node(&dom, Scope::Page, "breadcrumb", "breadcrumb".into(), &[], Some(&repeat))
            .await
            .unwrap();

        let labels: Vec<_> = record.children.iter().map(|c| c.value("label").clone()).collect();
        assert_eq!(
            labels,
            vec![
                Value::Text("Home".into()),
                Value::Text("Products".into()),
                Value::Text("Current".into())
            ]
        );
        assert_eq!(record.children[2].value("link"), &Value::Absent);

        let links = record.all_links();
        assert_eq!(links.len(), 2);
        assert_eq!(links[0].label, "breadcrumb.crumb[0].link");
        assert_eq!(links[1].url, "/products");

        let limited = RepeatDescriptor {
            limit: Some(1),
            ..repeat
        };
        let children = extract_repeat(&dom, &Scope::Page, &limited, "breadcrumb").await.unwrap();
        assert_eq!(children.len(), 1);
    }

    proptest! {
        #[test]
        fn prop_whitespace_is_collapsed(
            words in prop::collection::vec("[A-Za-z0-9]{1,8}", 1..6),
            gaps in prop::collection::vec("[ \t\n]{1,4}", 6),
            lead in "[ \t\n]{0,3}",
            trail in "[ \t\n]{0,3}",
        ) {
            let mut raw = lead.clone();
            for (i, word) in words.iter().enumerate() {
                if i > 0 {
                    raw.push_str(&gaps[i]);
                }
                raw.push_str(word);
            }
            raw.push_str(&trail);
            prop_assert_eq!(normalize_text(&raw), words.join(" "));
        }
    }
}
