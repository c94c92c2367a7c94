//! DOM accessor seam
//!
//! The engine never talks to a browser directly. Everything it reads goes
//! through a [`DomAccessor`] with an explicit [`Scope`], and pages are opened
//! through a [`PageLoader`]. Accessors are single-page sessions and are not
//! required to be `Send`.

use std::fmt::Debug;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::DomResult;

/// Where a lookup starts
#[derive(Debug, Clone, PartialEq)]
pub enum Scope<H> {
    /// The whole document
    Page,
    /// Descendants of one element
    Element(H),
}

impl<H> Scope<H> {
    pub fn element(&self) -> Option<&H> {
        match self {
            Scope::Page => None,
            Scope::Element(h) => Some(h),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub width: f64,
    pub height: f64,
}

/// A page-mutating step a descriptor may ask for before extraction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DomAction {
    Click,
    Hover,
    /// Select the nth option (0-based) of a `<select>`
    SelectIndex { index: usize },
    /// Select the option with this value
    SelectValue { value: String },
}

impl std::fmt::Display for DomAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DomAction::Click => write!(f, "click"),
            DomAction::Hover => write!(f, "hover"),
            DomAction::SelectIndex { index } => write!(f, "select option #{}", index),
            DomAction::SelectValue { value } => write!(f, "select '{}'", value),
        }
    }
}

/// Read access (plus the occasional action) to one loaded page
#[async_trait(?Send)]
pub trait DomAccessor {
    /// Opaque element reference, only meaningful to the accessor that made it
    type Handle: Clone + Debug + 'static;

    /// All elements matching a CSS selector inside the scope, in DOM order
    async fn locate(&self, scope: &Scope<Self::Handle>, selector: &str) -> DomResult<Vec<Self::Handle>>;

    /// Raw text content
    async fn text(&self, handle: &Self::Handle) -> DomResult<String>;

    async fn attribute(&self, handle: &Self::Handle, name: &str) -> DomResult<Option<String>>;

    /// Computed style property, `None` when the accessor cannot know it
    async fn computed_style(&self, handle: &Self::Handle, property: &str) -> DomResult<Option<String>>;

    async fn bounding_box(&self, handle: &Self::Handle) -> DomResult<Option<BoundingBox>>;

    async fn act(&self, handle: &Self::Handle, action: &DomAction) -> DomResult<()>;

    /// Wait until no navigation or loading indicator is pending
    async fn wait_for_stable(&self, scope: &Scope<Self::Handle>, timeout: Duration) -> DomResult<()>;

    /// Base for relative links: the document's `<base href>` resolved
    /// against the URL the page ended up on after redirects
    async fn base_url(&self) -> DomResult<Option<Url>>;
}

/// Opens pages and hands out an accessor per page
#[async_trait(?Send)]
pub trait PageLoader {
    type Page: DomAccessor;

    async fn open(&self, url: &Url) -> DomResult<Self::Page>;
}
