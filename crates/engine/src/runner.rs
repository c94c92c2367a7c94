//! Page runner: load, extract, match, check links, aggregate

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use sitecheck_common::{Error, PageResult, Result, RunResult};
use tracing::{debug, error, info, warn};
use url::Url;

use crate::aggregate::{aggregate_page, aggregate_run, failed_page};
use crate::descriptor::ComponentDescriptor;
use crate::dom::{DomAccessor, PageLoader};
use crate::expectation::{ExpectationCatalog, ExpectationRecord};
use crate::links::{LinkTransport, LinkValidator, LinkValidatorConfig};
use crate::matcher::{match_component, MatchOptions};
use crate::orchestrator::{Orchestrator, DEFAULT_STABLE_TIMEOUT};
use crate::registry::ComponentRegistry;

/// One page to check and the components expected on it
#[derive(Debug, Clone)]
pub struct PageCheck {
    pub url: Url,
    pub locale: Option<String>,
    pub components: BTreeMap<String, ExpectationRecord>,
}

impl PageCheck {
    pub fn new(url: &str, locale: Option<&str>) -> Result<Self> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self {
            url,
            locale: locale.map(String::from),
            components: BTreeMap::new(),
        })
    }

    /// Page with the catalog's expectations for its URL
    pub fn from_catalog(url: &str, locale: Option<&str>, catalog: &ExpectationCatalog) -> Result<Self> {
        let mut page = Self::new(url, locale)?;
        page.components = catalog.for_url(page.url.as_str())?;
        Ok(page)
    }

    pub fn expect(mut self, name: &str, expectation: ExpectationRecord) -> Self {
        self.components.insert(name.to_string(), expectation);
        self
    }
}

/// Configuration for the page runner
#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub matching: MatchOptions,
    pub links: LinkValidatorConfig,
    /// Validate harvested links
    pub check_links: bool,
    /// Wait for the page to settle after an interaction
    pub stable_timeout: Duration,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            matching: MatchOptions::default(),
            links: LinkValidatorConfig::default(),
            check_links: true,
            stable_timeout: DEFAULT_STABLE_TIMEOUT,
        }
    }
}

pub struct PageRunner<T> {
    registry: ComponentRegistry,
    validator: LinkValidator<T>,
    config: RunnerConfig,
}

impl<T: LinkTransport + 'static> PageRunner<T> {
    pub fn new(registry: ComponentRegistry, transport: T, config: RunnerConfig) -> Self {
        Self {
            registry,
            validator: LinkValidator::new(transport, config.links.clone()),
            config,
        }
    }

    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Check every expectation against the registry before any page is loaded
    pub fn validate(&self, pages: &[PageCheck]) -> Result<()> {
        for page in pages {
            for (name, expectation) in &page.components {
                let descriptor = self.registry.get(expectation.kind_or(name))?;
                expectation.validate(name, descriptor)?;
            }
        }
        Ok(())
    }

    /// Run every page in order
    pub async fn run<L: PageLoader>(&self, loader: &L, pages: &[PageCheck]) -> Result<RunResult> {
        self.validate(pages)?;

        let start = Instant::now();
        info!("Checking {} page(s)...", pages.len());

        let mut results = Vec::with_capacity(pages.len());
        for page in pages {
            results.push(self.check_page(loader, page).await?);
        }

        let run = aggregate_run(results);
        info!(
            "Run results: {} passed, {} failed ({} ms)",
            run.summary.pages_passed,
            run.summary.pages_failed,
            start.elapsed().as_millis()
        );
        Ok(run)
    }

    /// Check one page
    pub async fn check_page<L: PageLoader>(&self, loader: &L, page: &PageCheck) -> Result<PageResult> {
        let start = Instant::now();
        let locale = page.locale.as_deref();
        debug!("Opening {}", page.url);

        let dom = match loader.open(&page.url).await {
            Ok(dom) => dom,
            Err(e) => {
                error!("✗ {} - {}", page.url, e);
                return Ok(failed_page(page.url.as_str(), locale, e));
            }
        };

        let components: Vec<(&str, &ComponentDescriptor)> = page
            .components
            .iter()
            .map(|(name, expectation)| {
                self.registry
                    .get(expectation.kind_or(name))
                    .map(|descriptor| (name.as_str(), descriptor))
            })
            .collect::<Result<_>>()?;

        let records = Orchestrator::new(&dom)
            .with_stable_timeout(self.config.stable_timeout)
            .run_all(&components)
            .await?;

        let mut verdicts = BTreeMap::new();
        let mut links = Vec::new();
        for (name, record) in &records {
            if let Some(expectation) = page.components.get(name) {
                verdicts.insert(name.clone(), match_component(record, expectation, &self.config.matching)?);
            }
            links.extend(record.all_links());
        }

        let link_verdicts = if self.config.check_links {
            let base = match dom.base_url().await {
                Ok(base) => base.unwrap_or_else(|| page.url.clone()),
                Err(e) => {
                    warn!("{}: cannot read base URL, resolving links against it: {}", page.url, e);
                    page.url.clone()
                }
            };
            self.validator
                .validate(&base, &links)
                .await
                .into_values()
                .collect()
        } else {
            Vec::new()
        };

        let result = aggregate_page(page.url.as_str(), locale, verdicts, link_verdicts);
        let duration_ms = start.elapsed().as_millis();
        if result.all_pass {
            info!("✓ {} ({} ms)", result.url, duration_ms);
        } else {
            error!(
                "✗ {} - {} component(s) failed, {} broken link(s) ({} ms)",
                result.url,
                result.counts.components_failed,
                result.counts.links_invalid + result.counts.links_unreachable,
                duration_ms
            );
        }
        Ok(result)
    }
}

/// Write run results as pretty JSON into `output_dir`
pub fn write_results(results: &RunResult, output_dir: &Path) -> Result<PathBuf> {
    std::fs::create_dir_all(output_dir)?;

    let path = output_dir.join("sitecheck-results.json");
    let json = serde_json::to_string_pretty(results)?;
    std::fs::write(&path, json)?;

    info!("Results written to: {}", path.display());
    Ok(path)
}
