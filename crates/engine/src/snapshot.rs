//! Static HTML snapshot accessor
//!
//! Serves DOM reads from a parsed document. Computed styles come from inline
//! `style` declarations and geometry from `width`/`height` attributes, which
//! is all a document without a layout engine can offer. Actions are not
//! supported; descriptors with an interaction step degrade to not-found.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use scraper::{ElementRef, Html, Selector};
use sitecheck_common::leading_number;
use tracing::debug;
use url::Url;

use crate::dom::{BoundingBox, DomAccessor, DomAction, PageLoader, Scope};
use crate::error::{DomError, DomResult};

/// Child-index path from the document root to an element
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodePath(Vec<usize>);

/// A parsed page
pub struct HtmlSnapshot {
    url: Option<Url>,
    document: Html,
}

impl HtmlSnapshot {
    pub fn parse(html: &str) -> Self {
        Self {
            url: None,
            document: Html::parse_document(html),
        }
    }

    pub fn with_url(mut self, url: Url) -> Self {
        self.url = Some(url);
        self
    }

    /// URL the snapshot was fetched from, if any
    pub fn url(&self) -> Option<&Url> {
        self.url.as_ref()
    }

    /// First `<base href>`; an unparsable one is ignored like a browser does
    fn document_base(&self) -> DomResult<Option<Url>> {
        let selector = parse_selector("base[href]")?;
        let Some(href) = self.document.select(&selector).find_map(|e| e.value().attr("href")) else {
            return Ok(self.url.clone());
        };
        let base = match &self.url {
            Some(url) => url.join(href.trim()).ok(),
            None => Url::parse(href.trim()).ok(),
        };
        Ok(base.or_else(|| self.url.clone()))
    }

    fn resolve(&self, path: &NodePath) -> DomResult<ElementRef<'_>> {
        let mut node = self.document.tree.root();
        for &index in &path.0 {
            node = node
                .children()
                .nth(index)
                .ok_or_else(|| DomError::StaleHandle(format!("{:?}", path)))?;
        }
        ElementRef::wrap(node).ok_or_else(|| DomError::StaleHandle(format!("{:?}", path)))
    }

    fn path_of(element: ElementRef<'_>) -> NodePath {
        let mut indices = Vec::new();
        let mut node = *element;
        while let Some(parent) = node.parent() {
            indices.push(node.prev_siblings().count());
            node = parent;
        }
        indices.reverse();
        NodePath(indices)
    }
}

fn parse_selector(selector: &str) -> DomResult<Selector> {
    Selector::parse(selector).map_err(|e| DomError::InvalidSelector {
        selector: selector.to_string(),
        reason: e.to_string(),
    })
}

/// Last declaration of `property` in an inline style attribute
fn inline_style(style: &str, property: &str) -> Option<String> {
    style
        .split(';')
        .filter_map(|decl| decl.split_once(':'))
        .filter(|(name, _)| name.trim().eq_ignore_ascii_case(property))
        .map(|(_, value)| value.trim().trim_end_matches("!important").trim().to_string())
        .last()
}

#[async_trait(?Send)]
impl DomAccessor for HtmlSnapshot {
    type Handle = NodePath;

    async fn locate(&self, scope: &Scope<NodePath>, selector: &str) -> DomResult<Vec<NodePath>> {
        let selector = parse_selector(selector)?;
        let handles: Vec<NodePath> = match scope {
            Scope::Page => self.document.select(&selector).map(Self::path_of).collect(),
            Scope::Element(path) => self.resolve(path)?.select(&selector).map(Self::path_of).collect(),
        };
        Ok(handles)
    }

    async fn text(&self, handle: &NodePath) -> DomResult<String> {
        Ok(self.resolve(handle)?.text().collect())
    }

    async fn attribute(&self, handle: &NodePath, name: &str) -> DomResult<Option<String>> {
        Ok(self.resolve(handle)?.value().attr(name).map(String::from))
    }

    async fn computed_style(&self, handle: &NodePath, property: &str) -> DomResult<Option<String>> {
        let element = self.resolve(handle)?;
        Ok(element
            .value()
            .attr("style")
            .and_then(|style| inline_style(style, property)))
    }

    async fn bounding_box(&self, handle: &NodePath) -> DomResult<Option<BoundingBox>> {
        let element = self.resolve(handle)?.value();
        let width = element.attr("width").and_then(leading_number);
        let height = element.attr("height").and_then(leading_number);
        Ok(match (width, height) {
            (Some(width), Some(height)) => Some(BoundingBox { width, height }),
            _ => None,
        })
    }

    async fn act(&self, _handle: &NodePath, action: &DomAction) -> DomResult<()> {
        Err(DomError::Unsupported(format!("{} on a static snapshot", action)))
    }

    async fn wait_for_stable(&self, _scope: &Scope<NodePath>, _timeout: Duration) -> DomResult<()> {
        Ok(())
    }

    async fn base_url(&self) -> DomResult<Option<Url>> {
        self.document_base()
    }
}

/// Fetches pages over plain HTTP and parses them into snapshots
pub struct StaticLoader {
    client: reqwest::Client,
}

impl StaticLoader {
    pub fn new(timeout: Duration, user_agent: &str) -> DomResult<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| DomError::Driver(format!("invalid user agent: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()?;

        Ok(Self { client })
    }
}

#[async_trait(?Send)]
impl PageLoader for StaticLoader {
    type Page = HtmlSnapshot;

    async fn open(&self, url: &Url) -> DomResult<HtmlSnapshot> {
        debug!("Fetching {}", url);

        let response = self.client.get(url.as_str()).send().await.map_err(|e| DomError::Load {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(DomError::Load {
                url: url.to_string(),
                reason: format!("HTTP {}", status),
            });
        }

        let final_url = response.url().clone();
        let body = response.text().await?;
        debug!("Fetched {} ({} bytes)", final_url, body.len());

        Ok(HtmlSnapshot::parse(&body).with_url(final_url))
    }
}
