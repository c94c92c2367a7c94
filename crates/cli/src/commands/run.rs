//! Run Command

use std::path::PathBuf;
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use tracing::{info, warn};

use sitecheck_common::RunResult;
use sitecheck_engine::{
    write_results, ExpectationCatalog, ExpectationRecord, PageCheck, PageLoader, PageRunner,
    PlaywrightBrowser, ReqwestTransport, StaticLoader,
};

use crate::config::{Driver, Settings};
use crate::input::load_url_list;
use crate::output::{print_run, print_success, print_warning, OutputFormat};

/// Component checked on pages the catalog says nothing about
const FALLBACK_COMPONENT: &str = "page_links";

#[derive(Args, Debug)]
pub struct RunArgs {
    /// URL list file (`URL | locale` per line)
    #[arg(short, long)]
    pub urls: PathBuf,

    /// Expectation catalog (YAML)
    #[arg(short, long)]
    pub catalog: Option<PathBuf>,

    /// Directory of extra component descriptors (YAML)
    #[arg(long)]
    pub components: Option<PathBuf>,

    /// Page driver
    #[arg(long, value_enum)]
    pub driver: Option<Driver>,

    /// Fail components on unexpected children and fields
    #[arg(long)]
    pub strict: bool,

    /// Skip link validation
    #[arg(long)]
    pub no_links: bool,

    /// Link checker pool size
    #[arg(long)]
    pub concurrency: Option<usize>,

    /// Directory for sitecheck-results.json
    #[arg(short, long)]
    pub output: Option<PathBuf>,
}

impl RunArgs {
    fn apply(&self, settings: &mut Settings) {
        if let Some(driver) = self.driver {
            settings.run.driver = driver;
        }
        if self.strict {
            settings.matching.strict = true;
        }
        if self.no_links {
            settings.links.enabled = false;
        }
        if let Some(concurrency) = self.concurrency {
            settings.links.concurrency = concurrency;
        }
        if let Some(dir) = &self.components {
            settings.run.components_dir = Some(dir.clone());
        }
        if let Some(dir) = &self.output {
            settings.run.output_dir = Some(dir.clone());
        }
    }
}

/// Build the page list from the URL file and catalog
fn plan_pages(args: &RunArgs, catalog: &ExpectationCatalog) -> anyhow::Result<Vec<PageCheck>> {
    let entries = load_url_list(&args.urls)?;
    entries
        .iter()
        .map(|entry| {
            let mut page = PageCheck::from_catalog(&entry.url, Some(&entry.locale), catalog)
                .with_context(|| format!("{}:{}", args.urls.display(), entry.line))?;
            if page.components.is_empty() {
                warn!("No expectations for {}, checking links only", entry.url);
                page = page.expect(FALLBACK_COMPONENT, ExpectationRecord::default());
            }
            Ok(page)
        })
        .collect()
}

/// Returns whether every page passed
pub async fn execute(args: RunArgs, mut settings: Settings, format: OutputFormat) -> anyhow::Result<bool> {
    args.apply(&mut settings);

    let registry = super::load_registry(settings.run.components_dir.as_deref())?;

    let catalog = match &args.catalog {
        Some(path) => ExpectationCatalog::from_file(path)
            .with_context(|| format!("loading catalog {}", path.display()))?,
        None => ExpectationCatalog::default(),
    };
    catalog.validate(&registry)?;

    let pages = plan_pages(&args, &catalog)?;
    info!(
        "{} page(s), {} component kind(s), driver: {:?}",
        pages.len(),
        registry.len(),
        settings.run.driver
    );

    let transport = ReqwestTransport::new(&settings.run.user_agent)?;
    let runner = PageRunner::new(registry, transport, settings.runner_config());
    runner.validate(&pages)?;

    let run = match settings.run.driver {
        Driver::Static => {
            let loader = StaticLoader::new(
                Duration::from_secs(settings.run.page_timeout_secs),
                &settings.run.user_agent,
            )?;
            run_with(&runner, &loader, &pages).await?
        }
        Driver::Playwright => {
            let browser = PlaywrightBrowser::launch(settings.playwright_config()).await?;
            let run = run_with(&runner, &browser, &pages).await;
            if let Err(e) = browser.close().await {
                warn!("Browser did not shut down cleanly: {}", e);
            }
            run?
        }
    };

    print_run(&run, format);

    if let Some(dir) = &settings.run.output_dir {
        let path = write_results(&run, dir)?;
        print_success(&format!("Results written to {}", path.display()));
    }
    if !run.summary.all_pass {
        print_warning(&format!("{} of {} page(s) failed", run.summary.pages_failed, run.summary.pages_total));
    }

    Ok(run.summary.all_pass)
}

async fn run_with<L: PageLoader>(
    runner: &PageRunner<ReqwestTransport>,
    loader: &L,
    pages: &[PageCheck],
) -> anyhow::Result<RunResult> {
    Ok(runner.run(loader, pages).await?)
}
