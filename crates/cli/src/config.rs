//! CLI settings
//!
//! Loaded from a TOML file; every section has defaults so a partial file (or
//! none at all) is valid. Command-line flags override file values.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use sitecheck_engine::links::LinkValidatorConfig;
use sitecheck_engine::{Browser, MatchOptions, PlaywrightConfig, RunnerConfig};

/// How pages are loaded
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    /// Plain HTTP fetch, no JavaScript or interactions
    #[default]
    Static,
    /// Live browser through Playwright
    Playwright,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub run: RunSettings,
    pub browser: BrowserSettings,
    pub links: LinkSettings,
    pub matching: MatchOptions,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunSettings {
    pub driver: Driver,

    /// Page load timeout
    pub page_timeout_secs: u64,

    /// Settle time after a component interaction
    pub stable_timeout_secs: u64,

    pub user_agent: String,

    /// Extra descriptor directory loaded over the built-ins
    pub components_dir: Option<PathBuf>,

    /// Where sitecheck-results.json is written
    pub output_dir: Option<PathBuf>,
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            driver: Driver::Static,
            page_timeout_secs: 60,
            stable_timeout_secs: 10,
            user_agent: format!("sitecheck/{}", sitecheck_common::VERSION),
            components_dir: None,
            output_dir: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub node_path: PathBuf,
    pub node_modules: Option<PathBuf>,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            node_path: PathBuf::from("node"),
            node_modules: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LinkSettings {
    pub enabled: bool,
    pub concurrency: usize,
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_backoff_ms: u64,
    /// 0 disables rate limiting
    pub requests_per_second: u32,
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: 8,
            timeout_secs: 10,
            retries: 1,
            retry_backoff_ms: 500,
            requests_per_second: 10,
        }
    }
}

impl Settings {
    /// Load settings; a missing default file means defaults, a missing
    /// explicit file is an error
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let (path, explicit) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => (PathBuf::from("sitecheck.toml"), false),
        };

        if !path.exists() {
            if explicit {
                anyhow::bail!("settings file not found: {}", path.display());
            }
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let settings: Self =
            toml::from_str(&content).with_context(|| format!("parsing {}", path.display()))?;
        Ok(settings)
    }

    pub fn link_config(&self) -> LinkValidatorConfig {
        LinkValidatorConfig {
            concurrency: self.links.concurrency.max(1),
            timeout: Duration::from_secs(self.links.timeout_secs),
            retries: self.links.retries,
            retry_backoff: Duration::from_millis(self.links.retry_backoff_ms),
            requests_per_second: Some(self.links.requests_per_second).filter(|&r| r > 0),
        }
    }

    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            matching: self.matching,
            links: self.link_config(),
            check_links: self.links.enabled,
            stable_timeout: Duration::from_secs(self.run.stable_timeout_secs),
        }
    }

    pub fn playwright_config(&self) -> PlaywrightConfig {
        PlaywrightConfig {
            browser: self.browser.browser,
            headless: self.browser.headless,
            viewport_width: self.browser.viewport_width,
            viewport_height: self.browser.viewport_height,
            navigation_timeout: Duration::from_secs(self.run.page_timeout_secs),
            node_path: self.browser.node_path.clone(),
            node_modules: self.browser.node_modules.clone(),
            ..Default::default()
        }
    }
}
