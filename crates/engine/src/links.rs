//! Concurrent link validator
//!
//! Harvested links are normalized and deduplicated first, so the number of
//! requests is bounded by the number of distinct URLs. A fixed pool of
//! workers drains a shared work index; each worker owns the result slot of
//! the URL it took, so the result map needs no lock.

use std::collections::{BTreeMap, HashMap};
use std::num::NonZeroU32;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

use async_trait::async_trait;
use governor::clock::DefaultClock;
use governor::state::{direct::NotKeyed, InMemoryState};
use governor::{Quota, RateLimiter};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use sitecheck_common::{Error, HarvestedLink, LinkClassification, LinkErrorKind, LinkVerdict, Result};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};
use url::Url;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Head,
    Get,
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::Head => write!(f, "HEAD"),
            Method::Get => write!(f, "GET"),
        }
    }
}

/// Performs one link-check request and reports the final status
#[async_trait]
pub trait LinkTransport: Send + Sync {
    async fn request(
        &self,
        method: Method,
        url: &Url,
        timeout: Duration,
    ) -> std::result::Result<u16, LinkErrorKind>;
}

/// HTTP transport; redirects are followed up to 10 hops
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(user_agent: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(user_agent)
                .map_err(|e| Error::InvalidConfig(format!("invalid user agent: {}", e)))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .redirect(reqwest::redirect::Policy::limited(10))
            .build()
            .map_err(|e| Error::InvalidConfig(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { client })
    }
}

fn classify_error(err: &reqwest::Error) -> LinkErrorKind {
    if err.is_timeout() {
        return LinkErrorKind::Timeout;
    }

    let mut chain = String::new();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        chain.push_str(&cause.to_string().to_lowercase());
        chain.push(' ');
        source = cause.source();
    }

    if chain.contains("dns") || chain.contains("lookup address") || chain.contains("not known") {
        LinkErrorKind::Dns
    } else if chain.contains("connection refused") {
        LinkErrorKind::ConnectionRefused
    } else {
        LinkErrorKind::Transport(err.to_string())
    }
}

#[async_trait]
impl LinkTransport for ReqwestTransport {
    async fn request(
        &self,
        method: Method,
        url: &Url,
        timeout: Duration,
    ) -> std::result::Result<u16, LinkErrorKind> {
        let builder = match method {
            Method::Head => self.client.head(url.as_str()),
            Method::Get => self.client.get(url.as_str()),
        };
        let response = builder
            .timeout(timeout)
            .send()
            .await
            .map_err(|e| classify_error(&e))?;
        Ok(response.status().as_u16())
    }
}

/// Result of normalizing one harvested URL
#[derive(Debug, Clone, PartialEq)]
pub enum Normalized {
    Http(Url),
    /// Never requested: non-HTTP scheme or unparseable
    Skipped { key: String, reason: LinkErrorKind },
}

/// Resolve against the page URL and drop the fragment
pub fn normalize(base: &Url, raw: &str) -> Normalized {
    let raw = raw.trim();
    match base.join(raw) {
        Ok(mut url) => match url.scheme() {
            "http" | "https" => {
                url.set_fragment(None);
                Normalized::Http(url)
            }
            scheme => Normalized::Skipped {
                reason: LinkErrorKind::UnsupportedScheme(scheme.to_string()),
                key: url.to_string(),
            },
        },
        Err(e) => Normalized::Skipped {
            key: raw.to_string(),
            reason: LinkErrorKind::InvalidUrl(e.to_string()),
        },
    }
}

#[derive(Debug, Clone)]
pub struct LinkValidatorConfig {
    /// Worker pool size
    pub concurrency: usize,
    /// Per-request timeout
    pub timeout: Duration,
    /// Extra attempts for unreachable links
    pub retries: u32,
    pub retry_backoff: Duration,
    /// Global request rate; `None` disables rate limiting
    pub requests_per_second: Option<u32>,
}

impl Default for LinkValidatorConfig {
    fn default() -> Self {
        Self {
            concurrency: 8,
            timeout: Duration::from_secs(10),
            retries: 1,
            retry_backoff: Duration::from_millis(500),
            requests_per_second: Some(10),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
struct CheckOutcome {
    http_status: Option<u16>,
    error_kind: Option<LinkErrorKind>,
    classification: LinkClassification,
    attempts: u32,
}

enum CheckState {
    Attempt { attempt: u32, method: Method },
    Backoff { attempt: u32, method: Method },
    Final(CheckOutcome),
}

type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

struct Shared<T> {
    transport: Arc<T>,
    config: LinkValidatorConfig,
    limiter: Option<Limiter>,
    work: Vec<Url>,
    next: AtomicUsize,
    slots: Vec<OnceLock<CheckOutcome>>,
}

impl<T: LinkTransport> Shared<T> {
    async fn check(&self, url: &Url) -> CheckOutcome {
        let mut state = CheckState::Attempt {
            attempt: 1,
            method: Method::Head,
        };

        loop {
            state = match state {
                CheckState::Attempt { attempt, method } => {
                    if let Some(limiter) = &self.limiter {
                        limiter.until_ready().await;
                    }
                    let result = self.transport.request(method, url, self.config.timeout).await;
                    debug!("{} {} (attempt {}): {:?}", method, url, attempt, result);

                    match result {
                        Ok(405) | Ok(501) if method == Method::Head => CheckState::Attempt {
                            attempt,
                            method: Method::Get,
                        },
                        Ok(status) => CheckState::Final(CheckOutcome {
                            http_status: Some(status),
                            error_kind: None,
                            classification: LinkClassification::from_status(status),
                            attempts: attempt,
                        }),
                        Err(kind) if attempt <= self.config.retries => {
                            debug!("{} unreachable ({}), retrying", url, kind);
                            CheckState::Backoff { attempt, method }
                        }
                        Err(kind) => CheckState::Final(CheckOutcome {
                            http_status: None,
                            error_kind: Some(kind),
                            classification: LinkClassification::Unreachable,
                            attempts: attempt,
                        }),
                    }
                }
                CheckState::Backoff { attempt, method } => {
                    tokio::time::sleep(self.config.retry_backoff).await;
                    CheckState::Attempt {
                        attempt: attempt + 1,
                        method,
                    }
                }
                CheckState::Final(outcome) => return outcome,
            };
        }
    }

    async fn worker(self: Arc<Self>) {
        loop {
            let index = self.next.fetch_add(1, Ordering::SeqCst);
            let Some(url) = self.work.get(index) else {
                return;
            };
            let outcome = self.check(url).await;
            // each index is taken by exactly one worker
            let _ = self.slots[index].set(outcome);
        }
    }
}

struct Occurrence {
    key: String,
    label: String,
    count: usize,
    target: Normalized,
}

/// Validates the links of one page
pub struct LinkValidator<T> {
    transport: Arc<T>,
    config: LinkValidatorConfig,
}

impl<T: LinkTransport + 'static> LinkValidator<T> {
    pub fn new(transport: T, config: LinkValidatorConfig) -> Self {
        Self {
            transport: Arc::new(transport),
            config,
        }
    }

    pub fn config(&self) -> &LinkValidatorConfig {
        &self.config
    }

    /// One verdict per distinct normalized URL, keyed by that URL
    pub async fn validate(&self, base: &Url, links: &[HarvestedLink]) -> BTreeMap<String, LinkVerdict> {
        let mut occurrences: Vec<Occurrence> = Vec::new();
        let mut index_of: HashMap<String, usize> = HashMap::new();
        for link in links {
            let target = normalize(base, &link.url);
            let key = match &target {
                Normalized::Http(url) => url.to_string(),
                Normalized::Skipped { key, .. } => key.clone(),
            };
            match index_of.get(&key) {
                Some(&i) => occurrences[i].count += 1,
                None => {
                    index_of.insert(key.clone(), occurrences.len());
                    occurrences.push(Occurrence {
                        key,
                        label: link.label.clone(),
                        count: 1,
                        target,
                    });
                }
            }
        }

        let work: Vec<Url> = occurrences
            .iter()
            .filter_map(|o| match &o.target {
                Normalized::Http(url) => Some(url.clone()),
                Normalized::Skipped { .. } => None,
            })
            .collect();
        info!(
            "Checking {} distinct link(s) from {} occurrence(s) on {}",
            work.len(),
            links.len(),
            base
        );

        let outcomes = self.run_pool(work).await;
        let mut outcomes = outcomes.into_iter();

        let mut verdicts = BTreeMap::new();
        for occurrence in occurrences {
            let verdict = match occurrence.target {
                Normalized::Http(_) => {
                    let outcome = outcomes.next().unwrap_or(CheckOutcome {
                        http_status: None,
                        error_kind: Some(LinkErrorKind::Aborted),
                        classification: LinkClassification::Unreachable,
                        attempts: 0,
                    });
                    LinkVerdict {
                        url: occurrence.key.clone(),
                        source_label: occurrence.label,
                        occurrences: occurrence.count,
                        http_status: outcome.http_status,
                        error_kind: outcome.error_kind,
                        classification: outcome.classification,
                        attempts: outcome.attempts,
                    }
                }
                Normalized::Skipped { reason, .. } => LinkVerdict {
                    url: occurrence.key.clone(),
                    source_label: occurrence.label,
                    occurrences: occurrence.count,
                    http_status: None,
                    error_kind: Some(reason),
                    classification: LinkClassification::Skipped,
                    attempts: 0,
                },
            };
            if !verdict.classification.is_ok() {
                warn!(
                    "{} link {} ({})",
                    verdict.classification,
                    verdict.url,
                    verdict
                        .http_status
                        .map(|s| s.to_string())
                        .or_else(|| verdict.error_kind.as_ref().map(|e| e.to_string()))
                        .unwrap_or_default()
                );
            }
            verdicts.insert(occurrence.key, verdict);
        }
        verdicts
    }

    /// Check every URL, returning outcomes in input order
    async fn run_pool(&self, work: Vec<Url>) -> Vec<CheckOutcome> {
        let total = work.len();
        if total == 0 {
            return Vec::new();
        }

        let limiter = self
            .config
            .requests_per_second
            .and_then(NonZeroU32::new)
            .map(|rate| RateLimiter::direct(Quota::per_second(rate)));

        let shared = Arc::new(Shared {
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
            limiter,
            slots: (0..total).map(|_| OnceLock::new()).collect(),
            work,
            next: AtomicUsize::new(0),
        });

        let workers = self.config.concurrency.max(1).min(total);
        let mut set = JoinSet::new();
        for _ in 0..workers {
            set.spawn(Arc::clone(&shared).worker());
        }
        while let Some(joined) = set.join_next().await {
            if let Err(e) = joined {
                warn!("Link check worker failed: {}", e);
            }
        }

        shared
            .slots
            .iter()
            .zip(&shared.work)
            .map(|(slot, url)| {
                slot.get().cloned().unwrap_or_else(|| {
                    warn!("No outcome recorded for {}", url);
                    CheckOutcome {
                        http_status: None,
                        error_kind: Some(LinkErrorKind::Aborted),
                        classification: LinkClassification::Unreachable,
                        attempts: 0,
                    }
                })
            })
            .collect()
    }
}
