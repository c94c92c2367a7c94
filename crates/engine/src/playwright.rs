//! Playwright-backed DOM accessor
//!
//! One long-lived Node.js process drives the browser. Requests and replies
//! are single JSON lines over the child's stdin/stdout; element handles live
//! in the driver and are referenced by id. Only one page is open at a time:
//! opening a page closes the previous one and invalidates its handles.

use std::cell::Cell;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::rc::Rc;
use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tempfile::TempDir;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command as TokioCommand};
use tokio::sync::Mutex;
use tracing::{debug, info};
use url::Url;

use crate::dom::{BoundingBox, DomAccessor, DomAction, PageLoader, Scope};
use crate::error::{DomError, DomResult};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chromium,
    Firefox,
    Webkit,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chromium => "chromium",
            Browser::Firefox => "firefox",
            Browser::Webkit => "webkit",
        }
    }
}

impl FromStr for Browser {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chromium" | "chrome" => Ok(Browser::Chromium),
            "firefox" => Ok(Browser::Firefox),
            "webkit" | "safari" => Ok(Browser::Webkit),
            other => Err(format!("unknown browser '{}'", other)),
        }
    }
}

/// Configuration for Playwright
#[derive(Debug, Clone)]
pub struct PlaywrightConfig {
    pub browser: Browser,
    pub headless: bool,
    pub viewport_width: u32,
    pub viewport_height: u32,
    pub navigation_timeout: Duration,
    /// Timeout for a single click/hover/select
    pub action_timeout: Duration,
    pub node_path: PathBuf,
    /// Where `require('playwright')` resolves from
    pub node_modules: Option<PathBuf>,
}

impl Default for PlaywrightConfig {
    fn default() -> Self {
        Self {
            browser: Browser::Chromium,
            headless: true,
            viewport_width: 1920,
            viewport_height: 1080,
            navigation_timeout: Duration::from_secs(60),
            action_timeout: Duration::from_secs(5),
            node_path: PathBuf::from("node"),
            node_modules: None,
        }
    }
}

/// Check if Playwright is installed
pub fn check_playwright_installed() -> DomResult<()> {
    let output = Command::new("npx")
        .args(["playwright", "--version"])
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status();

    match output {
        Ok(status) if status.success() => Ok(()),
        _ => Err(DomError::PlaywrightNotFound),
    }
}

#[derive(Debug, Deserialize)]
struct Reply {
    id: i64,
    ok: bool,
    #[serde(default)]
    result: serde_json::Value,
    #[serde(default)]
    kind: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl Reply {
    /// `selector` names the selector of a `locate` request for error reports
    fn into_result(self, selector: Option<&str>) -> DomResult<serde_json::Value> {
        if self.ok {
            return Ok(self.result);
        }
        let reason = self.error.unwrap_or_else(|| "unknown driver error".to_string());
        Err(match (self.kind.as_deref(), selector) {
            (Some("selector"), Some(selector)) => DomError::InvalidSelector {
                selector: selector.to_string(),
                reason,
            },
            (Some("stale"), _) => DomError::StaleHandle(reason),
            (Some("timeout"), _) => DomError::Timeout(reason),
            _ => DomError::Driver(reason),
        })
    }
}

struct DriverIo {
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
}

struct Driver {
    io: Mutex<DriverIo>,
    next_id: Cell<i64>,
    reply_timeout: Duration,
    _child: Child,
    _script_dir: TempDir,
}

impl Driver {
    async fn call(&self, mut request: serde_json::Value) -> DomResult<Reply> {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        request["id"] = json!(id);
        let line = serde_json::to_string(&request)?;

        let mut io = self.io.lock().await;
        io.stdin.write_all(line.as_bytes()).await?;
        io.stdin.write_all(b"\n").await?;
        io.stdin.flush().await?;

        loop {
            let next = tokio::time::timeout(self.reply_timeout, io.stdout.next_line())
                .await
                .map_err(|_| DomError::Timeout(format!("driver reply to {}", request["op"])))??;
            let Some(line) = next else {
                return Err(DomError::Driver("driver process exited".to_string()));
            };
            match serde_json::from_str::<Reply>(&line) {
                Ok(reply) if reply.id == id => return Ok(reply),
                Ok(reply) => debug!("Dropping stale driver reply {}", reply.id),
                Err(_) => debug!("driver: {}", line),
            }
        }
    }
}

/// A running browser; opens one page at a time
pub struct PlaywrightBrowser {
    driver: Rc<Driver>,
    config: PlaywrightConfig,
}

impl PlaywrightBrowser {
    /// Spawn the driver process and wait for the browser to come up
    pub async fn launch(config: PlaywrightConfig) -> DomResult<Self> {
        check_playwright_installed()?;

        let script_dir = tempfile::tempdir()?;
        let script_path = script_dir.path().join("sitecheck-driver.js");
        std::fs::write(&script_path, DRIVER_SCRIPT)?;

        let node_modules = match &config.node_modules {
            Some(path) => path.clone(),
            None => std::env::current_dir()?.join("node_modules"),
        };

        debug!("Starting Playwright driver: {}", script_path.display());
        let mut child = TokioCommand::new(&config.node_path)
            .arg(&script_path)
            .env("NODE_PATH", &node_modules)
            .env("SITECHECK_BROWSER", config.browser.as_str())
            .env("SITECHECK_HEADLESS", config.headless.to_string())
            .env("SITECHECK_VIEWPORT_WIDTH", config.viewport_width.to_string())
            .env("SITECHECK_VIEWPORT_HEIGHT", config.viewport_height.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| DomError::Driver("driver stdin unavailable".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| DomError::Driver("driver stdout unavailable".to_string()))?;
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("driver stderr: {}", line);
                }
            });
        }

        let mut io = DriverIo {
            stdin,
            stdout: BufReader::new(stdout).lines(),
        };

        // the driver announces itself with id 0 once the browser is up
        let ready = tokio::time::timeout(config.navigation_timeout, io.stdout.next_line())
            .await
            .map_err(|_| DomError::Timeout("browser launch".to_string()))??
            .ok_or_else(|| DomError::Driver("driver exited during launch".to_string()))?;
        let ready: Reply = serde_json::from_str(&ready)?;
        ready.into_result(None)?;

        info!("Launched {} (headless: {})", config.browser.as_str(), config.headless);

        Ok(Self {
            driver: Rc::new(Driver {
                io: Mutex::new(io),
                next_id: Cell::new(1),
                reply_timeout: config.navigation_timeout + Duration::from_secs(5),
                _child: child,
                _script_dir: script_dir,
            }),
            config,
        })
    }

    /// Close the browser and let the driver exit
    pub async fn close(self) -> DomResult<()> {
        self.driver.call(json!({ "op": "close" })).await?.into_result(None)?;
        Ok(())
    }
}

#[async_trait(?Send)]
impl PageLoader for PlaywrightBrowser {
    type Page = PlaywrightPage;

    async fn open(&self, url: &Url) -> DomResult<PlaywrightPage> {
        let reply = self
            .driver
            .call(json!({
                "op": "goto",
                "url": url.as_str(),
                "timeout": self.config.navigation_timeout.as_millis() as u64,
            }))
            .await?;
        let landed = reply.into_result(None).map_err(|e| DomError::Load {
            url: url.to_string(),
            reason: e.to_string(),
        })?;
        if let Some(landed) = landed["url"].as_str().filter(|&l| l != url.as_str()) {
            debug!("{} landed on {}", url, landed);
        }

        Ok(PlaywrightPage {
            driver: Rc::clone(&self.driver),
            action_timeout: self.config.action_timeout,
        })
    }
}

/// The page most recently opened by a [`PlaywrightBrowser`]
pub struct PlaywrightPage {
    driver: Rc<Driver>,
    action_timeout: Duration,
}

impl PlaywrightPage {
    async fn request(&self, request: serde_json::Value) -> DomResult<serde_json::Value> {
        self.driver.call(request).await?.into_result(None)
    }
}

#[async_trait(?Send)]
impl DomAccessor for PlaywrightPage {
    type Handle = String;

    async fn locate(&self, scope: &Scope<String>, selector: &str) -> DomResult<Vec<String>> {
        let reply = self
            .driver
            .call(json!({ "op": "locate", "scope": scope.element(), "selector": selector }))
            .await?;
        let ids = reply.into_result(Some(selector))?;
        Ok(serde_json::from_value(ids)?)
    }

    async fn text(&self, handle: &String) -> DomResult<String> {
        let value = self.request(json!({ "op": "text", "handle": handle })).await?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn attribute(&self, handle: &String, name: &str) -> DomResult<Option<String>> {
        let value = self
            .request(json!({ "op": "attribute", "handle": handle, "name": name }))
            .await?;
        Ok(value.as_str().map(String::from))
    }

    async fn computed_style(&self, handle: &String, property: &str) -> DomResult<Option<String>> {
        let value = self
            .request(json!({ "op": "style", "handle": handle, "property": property }))
            .await?;
        Ok(value.as_str().map(String::from))
    }

    async fn bounding_box(&self, handle: &String) -> DomResult<Option<BoundingBox>> {
        let value = self.request(json!({ "op": "box", "handle": handle })).await?;
        Ok(serde_json::from_value(value)?)
    }

    async fn act(&self, handle: &String, action: &DomAction) -> DomResult<()> {
        self.request(json!({
            "op": "act",
            "handle": handle,
            "action": action,
            "timeout": self.action_timeout.as_millis() as u64,
        }))
        .await?;
        Ok(())
    }

    async fn wait_for_stable(&self, _scope: &Scope<String>, timeout: Duration) -> DomResult<()> {
        self.request(json!({ "op": "stable", "timeout": timeout.as_millis() as u64 }))
            .await?;
        Ok(())
    }
    async fn base_url(&self) -> DomResult<Option<Url>> {
        let value = self.request(json!({ "op": "base" })).await?;
        Ok(value.as_str().and_then(|base| Url::parse(base).ok()))
    }
}

const DRIVER_SCRIPT: &str = r##"
const readline = require('readline');
const playwright = require('playwright');

const BUSY = '[aria-busy="true"], .loading, .spinner';
const browserName = process.env.SITECHECK_BROWSER || 'chromium';
const headless = process.env.SITECHECK_HEADLESS !== 'false';
const viewport = {
  width: Number(process.env.SITECHECK_VIEWPORT_WIDTH || 1920),
  height: Number(process.env.SITECHECK_VIEWPORT_HEIGHT || 1080),
};

let browser, context, page;
const handles = new Map();
let nextHandle = 0;

function reply(msg) {
  process.stdout.write(JSON.stringify(msg) + '\n');
}

function message(err) {
  return String((err && err.message) || err);
}

function classify(err) {
  const m = message(err);
  if (/while parsing selector|not a valid selector/i.test(m)) return 'selector';
  if (/not attached|detached|unknown handle/i.test(m)) return 'stale';
  if (/timeout/i.test(m)) return 'timeout';
  return 'driver';
}

function element(id) {
  const el = handles.get(id);
  if (!el) throw new Error('unknown handle ' + id);
  return el;
}

const ops = {
  async goto(req) {
    if (page) {
      await page.close();
      handles.clear();
    }
    page = await context.newPage();
    const response = await page.goto(req.url, { timeout: req.timeout, waitUntil: 'domcontentloaded' });
    if (response && response.status() >= 400) throw new Error('HTTP ' + response.status());
    return { url: page.url() };
  },
  async locate(req) {
    const root = req.scope ? element(req.scope) : page;
    const found = await root.$$(req.selector);
    return found.map((el) => {
      const id = 'e' + nextHandle++;
      handles.set(id, el);
      return id;
    });
  },
  async text(req) {
    return (await element(req.handle).textContent()) || '';
  },
  async attribute(req) {
    return await element(req.handle).getAttribute(req.name);
  },
  async style(req) {
    const value = await element(req.handle).evaluate(
      (e, p) => getComputedStyle(e).getPropertyValue(p),
      req.property,
    );
    return value === '' ? null : value;
  },
  async box(req) {
    const b = await element(req.handle).boundingBox();
    return b ? { width: b.width, height: b.height } : null;
  },
  async act(req) {
    const el = element(req.handle);
    const action = req.action;
    const options = { timeout: req.timeout };
    switch (action.type) {
      case 'click': await el.click(options); break;
      case 'hover': await el.hover(options); break;
      case 'select_index': await el.selectOption({ index: action.index }, options); break;
      case 'select_value': await el.selectOption(action.value, options); break;
      default: throw new Error('unknown action ' + action.type);
    }
    return null;
  },
  async stable(req) {
    await page.waitForLoadState('networkidle', { timeout: req.timeout });
    await page.waitForFunction((sel) => !document.querySelector(sel), BUSY, { timeout: req.timeout });
    return null;
  },
  async base() {
    return await page.evaluate(() => document.baseURI);
  },
  async close() {
    await browser.close();
    setImmediate(() => process.exit(0));
    return null;
  },
};

(async () => {
  browser = await playwright[browserName].launch({ headless });
  context = await browser.newContext({ viewport });
  reply({ id: 0, ok: true, result: null });

  const lines = readline.createInterface({ input: process.stdin });
  for await (const line of lines) {
    if (!line.trim()) continue;
    let req;
    try {
      req = JSON.parse(line);
    } catch (err) {
      reply({ id: -1, ok: false, kind: 'driver', error: 'malformed request' });
      continue;
    }
    try {
      const op = ops[req.op];
      if (!op) throw new Error('unknown op ' + req.op);
      reply({ id: req.id, ok: true, result: await op(req) });
    } catch (err) {
      reply({ id: req.id, ok: false, kind: classify(err), error: message(err) });
    }
  }
  await browser.close();
})().catch((err) => {
  reply({ id: 0, ok: false, kind: 'driver', error: message(err) });
  process.exit(1);
});
"##;

#[cfg(test)]
mod tests {
    use super::*;

    fn reply(json: &str) -> Reply {
        serde_json::from_str(json).unwrap()
    }

    #[test]
    fn test_browser_from_str() {
        assert_eq!("Chromium".parse::<Browser>().unwrap(), Browser::Chromium);
        assert_eq!("safari".parse::<Browser>().unwrap(), Browser::Webkit);
        assert!("netscape".parse::<Browser>().is_err());
    }

    #[test]
    fn test_reply_success() {
        let value = reply(r#"{"id":3,"ok":true,"result":["e1","e2"]}"#)
            .into_result(None)
            .unwrap();
        let ids: Vec<String> = serde_json::from_value(value).unwrap();
        assert_eq!(ids, vec!["e1", "e2"]);
    }

    #[test]
    fn test_reply_error_kinds() {
        let selector = reply(r#"{"id":1,"ok":false,"kind":"selector","error":"Unexpected token while parsing selector"}"#)
            .into_result(Some("a[["))
            .unwrap_err();
        assert!(matches!(selector, DomError::InvalidSelector { ref selector, .. } if selector == "a[["));
        assert!(selector.contract_violation().is_some());

        let stale = reply(r#"{"id":1,"ok":false,"kind":"stale","error":"Element is not attached"}"#)
            .into_result(None)
            .unwrap_err();
        assert!(matches!(stale, DomError::StaleHandle(_)));

        let timeout = reply(r#"{"id":1,"ok":false,"kind":"timeout","error":"Timeout 5000ms exceeded"}"#)
            .into_result(None)
            .unwrap_err();
        assert!(matches!(timeout, DomError::Timeout(_)));

        let other = reply(r#"{"id":1,"ok":false,"error":"boom"}"#).into_result(None).unwrap_err();
        assert!(matches!(other, DomError::Driver(ref m) if m == "boom"));
    }

    #[test]
    fn test_action_wire_format() {
        let action = serde_json::to_value(DomAction::SelectIndex { index: 2 }).unwrap();
        assert_eq!(action, json!({ "type": "select_index", "index": 2 }));
        assert!(DRIVER_SCRIPT.contains("case 'select_index'"));
        for op in ["goto", "locate", "text", "attribute", "style", "box", "act", "stable", "base", "close"] {
            assert!(DRIVER_SCRIPT.contains(&format!("async {}(", op)), "missing op {}", op);
        }
    }
}
