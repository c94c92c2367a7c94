//! End-to-end page checks over fixture pages
//!
//! Pages are served from static HTML through the snapshot accessor and link
//! checks go to a scripted transport, so nothing here touches the network.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use url::Url;

use sitecheck_common::{FieldStatus, LinkClassification, LinkErrorKind, PageResult, Verdict};
use sitecheck_engine::links::Method;
use sitecheck_engine::{
    write_results, ComponentRegistry, DomError, DomResult, ExpectationCatalog, ExpectationRecord, HtmlSnapshot,
    LinkTransport, LinkValidatorConfig, PageCheck, PageLoader, PageRunner, RunnerConfig,
};

const SSD_PAGE: &str = r#"
<html><body>
  <section class="cmp-hero">
    <h1 class="cmp-hero__title">Data Center SSDs</h1>
    <ol>
      <li class="cmp-breadcrumb__item"><a class="cmp-breadcrumb__item-link" href="/">Home</a></li>
      <li class="cmp-breadcrumb__item"><a class="cmp-breadcrumb__item-link" href="/ssd/">SSD</a></li>
    </ol>
  </section>
  <div class="featured-products">
    <h2>Featured SSDs</h2>
    <div class="product-card">
      <h3>D3-S4520</h3><p>SATA 3.0 6Gb/s</p><a href="/ssd/d3-s4520#specs">Details</a>
    </div>
    <div class="product-card">
      <h3>D3-S4620</h3><p>SATA 3.0 6Gb/s</p><a href="/ssd/d3-s4620">Details</a>
    </div>
  </div>
  <footer><a href="mailto:sales@shop.test">Contact</a><a href="/b">Old page</a></footer>
</body></html>
"#;

const MODEL_PAGE: &str = r#"
<html><body>
  <section class="cmp-hero"><h1>Client SSDs</h1></section>
  <div class="model-list">
    <h3>Models</h3>
    <div class="cmp-custom-select">
      <span class="cmp-custom-select__input">Interface</span>
      <div class="cmp-custom-select__option">NVMe</div>
    </div>
    <div class="cmp-product-cards__item"><h3>P44 Pro</h3></div>
  </div>
</body></html>
"#;

const CAROUSEL_PAGE: &str = r#"
<html><body>
  <div class="cmp-carousel">
    <button class="cmp-carousel__action--prev" aria-label="previous">&lt;</button>
    <div class="cmp-carousel__slide">
      <h2>Up to 122TB</h2><p>High density storage</p>
      <img src="/img/d5-p5336.png" alt="D5-P5336"><a href="/ssd/d5-p5336">Learn more</a>
    </div>
    <div class="cmp-carousel__slide">
      <h2>PCIe 5.0</h2><p>Fast</p>
      <img src="/img/missing.png" alt=""><a href="/ssd/d7-ps1010">Learn more</a>
    </div>
    <button class="cmp-carousel__action--next" aria-label="next">&gt;</button>
    <ol class="cmp-carousel__indicators" role="tablist"><li></li><li></li></ol>
  </div>
  <img src="/img/logo.svg" alt="logo">
</body></html>
"#;

const RELATIVE_PAGE: &str = r#"
<html><body>
  <a href="d3-s4520">D3-S4520</a>
</body></html>
"#;

const BASE_PAGE: &str = r#"
<html><head><base href="https://cdn.shop.test/x/"></head><body>
  <a href="d3-s4520">D3-S4520</a>
</body></html>
"#;

const LINK_PAGE: &str = r#"
<html><body>
  <a href="/a">A</a>
  <a href="/b">B</a>
  <a href="/a">A again</a>
</body></html>
"#;

/// Serves fixture HTML by path, following scripted redirects
#[derive(Default)]
struct FixtureLoader {
    pages: HashMap<String, &'static str>,
    redirects: HashMap<String, String>,
}

impl FixtureLoader {
    fn page(mut self, path: &str, html: &'static str) -> Self {
        self.pages.insert(path.to_string(), html);
        self
    }

    fn redirect(mut self, from: &str, to: &str) -> Self {
        self.redirects.insert(from.to_string(), to.to_string());
        self
    }
}

#[async_trait(?Send)]
impl PageLoader for FixtureLoader {
    type Page = HtmlSnapshot;

    async fn open(&self, url: &Url) -> DomResult<HtmlSnapshot> {
        let landed = match self.redirects.get(url.path()) {
            Some(to) => url.join(to).map_err(|e| DomError::Load {
                url: url.to_string(),
                reason: e.to_string(),
            })?,
            None => url.clone(),
        };
        match self.pages.get(landed.path()) {
            Some(html) => Ok(HtmlSnapshot::parse(html).with_url(landed)),
            None => Err(DomError::Load {
                url: url.to_string(),
                reason: "HTTP 404 Not Found".to_string(),
            }),
        }
    }
}

/// Fixed status per path; anything else is refused
#[derive(Default)]
struct StatusTransport {
    statuses: HashMap<String, u16>,
    calls: Arc<Mutex<Vec<String>>>,
}

impl StatusTransport {
    fn status(mut self, path: &str, status: u16) -> Self {
        self.statuses.insert(path.to_string(), status);
        self
    }
}

#[async_trait]
impl LinkTransport for StatusTransport {
    async fn request(&self, _method: Method, url: &Url, _timeout: Duration) -> Result<u16, LinkErrorKind> {
        self.calls.lock().push(url.path().to_string());
        self.statuses
            .get(url.path())
            .copied()
            .ok_or(LinkErrorKind::ConnectionRefused)
    }
}

fn config() -> RunnerConfig {
    RunnerConfig {
        links: LinkValidatorConfig {
            retries: 0,
            requests_per_second: None,
            ..Default::default()
        },
        ..Default::default()
    }
}

fn checked_urls(page: &PageResult) -> Vec<&str> {
    page.link_verdicts.iter().map(|v| v.url.as_str()).collect()
}

fn runner(transport: StatusTransport) -> PageRunner<StatusTransport> {
    PageRunner::new(ComponentRegistry::builtin().unwrap(), transport, config())
}

#[tokio::test]
async fn test_broken_link_fails_page() {
    let loader = FixtureLoader::default().page("/links", LINK_PAGE);
    let transport = StatusTransport::default().status("/a", 200).status("/b", 404);
    let runner = runner(transport);

    let page = PageCheck::new("https://shop.test/links", Some("US/EN"))
        .unwrap()
        .expect("page_links", ExpectationRecord::default());
    let run = runner.run(&loader, &[page]).await.unwrap();

    let result = &run.pages[0];
    assert!(!result.all_pass);
    assert!(!run.summary.all_pass);

    let by_url: HashMap<_, _> = result
        .link_verdicts
        .iter()
        .map(|v| (v.url.as_str(), v))
        .collect();
    assert_eq!(by_url.len(), 2);
    assert_eq!(by_url["https://shop.test/a"].classification, LinkClassification::Valid);
    assert_eq!(by_url["https://shop.test/a"].occurrences, 2);
    assert_eq!(by_url["https://shop.test/b"].classification, LinkClassification::Invalid);
    assert_eq!(by_url["https://shop.test/b"].http_status, Some(404));
    assert_eq!(by_url["https://shop.test/a"].source_label, "page_links.anchor[0].href");

    assert_eq!(result.counts.links_valid, 1);
    assert_eq!(result.counts.links_invalid, 1);
    assert_eq!(result.component_verdicts["page_links"].status, Verdict::Pass);
}

#[tokio::test]
async fn test_duplicate_links_requested_once() {
    let loader = FixtureLoader::default().page("/links", LINK_PAGE);
    let transport = StatusTransport::default().status("/a", 200).status("/b", 200);
    let calls = Arc::clone(&transport.calls);
    let runner = PageRunner::new(ComponentRegistry::builtin().unwrap(), transport, config());

    let page = PageCheck::new("https://shop.test/links", None)
        .unwrap()
        .expect("page_links", ExpectationRecord::default());
    let run = runner.run(&loader, &[page]).await.unwrap();

    assert!(run.summary.all_pass);
    assert_eq!(run.summary.links_checked, 2);
    let mut requested = calls.lock().clone();
    requested.sort();
    assert_eq!(requested, vec!["/a", "/b"]);
}

#[tokio::test]
async fn test_links_resolve_against_landed_url_and_base() {
    let loader = FixtureLoader::default()
        .redirect("/ssd", "/ssd/")
        .page("/ssd/", RELATIVE_PAGE)
        .redirect("/cdn", "/cdn/")
        .page("/cdn/", BASE_PAGE);
    let transport = StatusTransport::default()
        .status("/ssd/d3-s4520", 200)
        .status("/x/d3-s4520", 200);
    let runner = runner(transport);

    let pages = vec![
        PageCheck::new("https://shop.test/ssd", None)
            .unwrap()
            .expect("page_links", ExpectationRecord::default()),
        PageCheck::new("https://shop.test/cdn", None)
            .unwrap()
            .expect("page_links", ExpectationRecord::default()),
    ];
    let run = runner.run(&loader, &pages).await.unwrap();

    assert_eq!(checked_urls(&run.pages[0]), vec!["https://shop.test/ssd/d3-s4520"]);
    assert_eq!(checked_urls(&run.pages[1]), vec!["https://cdn.shop.test/x/d3-s4520"]);
    assert!(run.summary.all_pass, "{:#?}", run.pages);
    // verdicts keep the requested page URL
    assert_eq!(run.pages[0].url, "https://shop.test/ssd");
}

#[tokio::test]
async fn test_carousel_and_image_sources() {
    let loader = FixtureLoader::default().page("/", CAROUSEL_PAGE);
    let transport = StatusTransport::default()
        .status("/img/d5-p5336.png", 200)
        .status("/img/missing.png", 404)
        .status("/img/logo.svg", 200)
        .status("/ssd/d5-p5336", 200)
        .status("/ssd/d7-ps1010", 200);
    let runner = runner(transport);

    let catalog = ExpectationCatalog::from_yaml(
        r#"
pages:
  - url: https://shop.test/
    components:
      carousel:
        fields:
          slide_count: 2
          previous_control: 1
          next_control: 1
        children:
          key: { field: title }
          items:
            - fields: { title: Up to 122TB, description: High density storage }
            - fields: { title: PCIe 5.0 }
      page_images: {}
"#,
    )
    .unwrap();
    let page = PageCheck::from_catalog("https://shop.test/", None, &catalog).unwrap();
    let run = runner.run(&loader, &[page]).await.unwrap();
    let result = &run.pages[0];

    let carousel = &result.component_verdicts["carousel"];
    assert_eq!(carousel.status, Verdict::Pass, "{:#?}", carousel);

    let by_url: HashMap<_, _> = result
        .link_verdicts
        .iter()
        .map(|v| (v.url.as_str(), v))
        .collect();
    assert_eq!(by_url.len(), 5);
    assert_eq!(
        by_url["https://shop.test/img/missing.png"].classification,
        LinkClassification::Invalid
    );
    assert_eq!(by_url["https://shop.test/img/d5-p5336.png"].occurrences, 2);
    assert_eq!(by_url["https://shop.test/img/logo.svg"].source_label, "page_images.image[2].src");
    assert!(!result.all_pass);
}

#[tokio::test]
async fn test_catalog_driven_run() {
    let catalog = ExpectationCatalog::from_yaml(
        r#"
defaults:
  components:
    hero_banner:
      fields:
        title: Data Center SSDs
pages:
  - url_pattern: "/ssd/"
    components:
      product_cards:
        fields:
          title: Featured SSDs
          card_count: 2
        children:
          key: { field: title }
          items:
            - fields:
                title: D3-S4620
                description: { op: equals, value: "SATA 3.0 6Gb/s" }
            - fields:
                title: D3-S4520
                description: { op: contains, value: SATA }
"#,
    )
    .unwrap();
    catalog.validate(&ComponentRegistry::builtin().unwrap()).unwrap();

    let loader = FixtureLoader::default().page("/ssd/", SSD_PAGE);
    let transport = StatusTransport::default()
        .status("/", 200)
        .status("/ssd/", 200)
        .status("/ssd/d3-s4520", 200)
        .status("/ssd/d3-s4620", 200);
    let runner = runner(transport);

    let page = PageCheck::from_catalog("https://shop.test/ssd/", None, &catalog).unwrap();
    assert_eq!(page.components.len(), 2);
    let run = runner.run(&loader, &[page]).await.unwrap();

    let result = &run.pages[0];
    let cards = &result.component_verdicts["product_cards"];
    assert_eq!(cards.status, Verdict::Pass, "{:#?}", cards);
    assert!(cards.missing_children.is_empty());
    assert!(cards.extra_children.is_empty());
    // DOM order, not expectation order
    let keys: Vec<_> = cards.child_verdicts.iter().filter_map(|c| c.key.as_deref()).collect();
    assert_eq!(keys, vec!["D3-S4520", "D3-S4620"]);

    assert_eq!(result.component_verdicts["hero_banner"].status, Verdict::Pass);

    // the fragment is stripped before checking
    assert!(result
        .link_verdicts
        .iter()
        .any(|v| v.url == "https://shop.test/ssd/d3-s4520" && v.classification == LinkClassification::Valid));
    assert!(result.all_pass, "{:#?}", result);
    assert_eq!(run.summary.pass_ratio, 1.0);
}

#[tokio::test]
async fn test_missing_and_extra_children() {
    let catalog = ExpectationCatalog::from_yaml(
        r#"
pages:
  - url: https://shop.test/ssd
    components:
      product_cards:
        children:
          key: { field: title }
          items:
            - fields: { title: D3-S4620 }
            - fields: { title: D3-P5620 }
      article_list:
        optional: true
"#,
    )
    .unwrap();
    let page = PageCheck::from_catalog("https://shop.test/ssd/", None, &catalog).unwrap();

    let loader = FixtureLoader::default().page("/ssd/", SSD_PAGE);
    let mut config = config();
    config.check_links = false;
    let runner = PageRunner::new(ComponentRegistry::builtin().unwrap(), StatusTransport::default(), config);

    let run = runner.run(&loader, &[page]).await.unwrap();
    let result = &run.pages[0];

    let cards = &result.component_verdicts["product_cards"];
    assert_eq!(cards.status, Verdict::Fail);
    assert!(cards.missing_children.contains("D3-P5620"));
    assert!(cards.extra_children.contains("D3-S4520"));

    assert_eq!(result.component_verdicts["article_list"].status, Verdict::NotApplicable);
    assert!(result.link_verdicts.is_empty());
    assert!(!result.all_pass);
}

#[tokio::test]
async fn test_required_field_with_no_match() {
    let html = r#"<html><body><section class="cmp-hero"><p>no title</p></section></body></html>"#;
    let loader = FixtureLoader::default().page("/", html);
    let runner = runner(StatusTransport::default());

    let page = PageCheck::new("https://shop.test/", None)
        .unwrap()
        .expect("hero_banner", ExpectationRecord::default());
    let run = runner.run(&loader, &[page]).await.unwrap();

    let hero = &run.pages[0].component_verdicts["hero_banner"];
    assert!(hero.found);
    let title = hero.field_verdicts.iter().find(|f| f.name == "title").unwrap();
    assert_eq!(title.status, FieldStatus::MissingExpected);
    assert_eq!(hero.status, Verdict::Fail);
}

#[tokio::test]
async fn test_interaction_degrades_on_static_page() {
    let loader = FixtureLoader::default().page("/models", MODEL_PAGE);
    let mut config = config();
    config.check_links = false;
    let runner = PageRunner::new(ComponentRegistry::builtin().unwrap(), StatusTransport::default(), config);

    let page = PageCheck::new("https://shop.test/models", None)
        .unwrap()
        .expect("filter_controls", ExpectationRecord::default())
        .expect("hero_banner", ExpectationRecord::default());
    let run = runner.run(&loader, &[page]).await.unwrap();

    let result = &run.pages[0];
    let filter = &result.component_verdicts["filter_controls"];
    assert!(!filter.found);
    assert_eq!(filter.status, Verdict::Fail);
    // static pages cannot even open the dropdown
    assert!(filter.note.as_deref().unwrap_or_default().starts_with("step 1/2"), "{:?}", filter.note);
    assert_eq!(result.component_verdicts["hero_banner"].status, Verdict::Pass);
}

#[tokio::test]
async fn test_unloadable_page_does_not_stop_run() {
    let loader = FixtureLoader::default().page("/links", LINK_PAGE);
    let transport = StatusTransport::default().status("/a", 200).status("/b", 200);
    let runner = runner(transport);

    let pages = vec![
        PageCheck::new("https://shop.test/gone", None).unwrap(),
        PageCheck::new("https://shop.test/links", None)
            .unwrap()
            .expect("page_links", ExpectationRecord::default()),
    ];
    let run = runner.run(&loader, &pages).await.unwrap();

    assert_eq!(run.summary.pages_total, 2);
    assert_eq!(run.summary.pages_failed, 1);
    assert_eq!(run.summary.pages_passed, 1);
    assert!(run.pages[0].error.as_deref().unwrap_or_default().contains("404"));
    assert!(run.pages[1].all_pass);
    assert_eq!(run.pages[1].url, "https://shop.test/links");
}

#[tokio::test]
async fn test_invalid_expectation_rejected_before_loading() {
    let loader = FixtureLoader::default();
    let runner = runner(StatusTransport::default());

    let page = PageCheck::new("https://shop.test/", None).unwrap().expect(
        "hero_banner",
        ExpectationRecord::default().with_field("subtitle", sitecheck_engine::Expect::Exact("x".into())),
    );
    let err = runner.run(&loader, &[page]).await.unwrap_err();
    assert!(matches!(err, sitecheck_common::Error::UnknownField { ref field, .. } if field == "subtitle"));
}

#[tokio::test]
async fn test_write_results() {
    let loader = FixtureLoader::default().page("/links", LINK_PAGE);
    let runner = runner(StatusTransport::default().status("/a", 200).status("/b", 200));
    let page = PageCheck::new("https://shop.test/links", None)
        .unwrap()
        .expect("page_links", ExpectationRecord::default());
    let run = runner.run(&loader, &[page]).await.unwrap();

    let dir = tempfile::tempdir().unwrap();
    let path = write_results(&run, dir.path()).unwrap();
    let json: serde_json::Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
    assert_eq!(json["summary"]["pages_total"], 1);
    assert_eq!(json["pages"][0]["link_verdicts"][0]["classification"], "VALID");
}
