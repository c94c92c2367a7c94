//! Result aggregation
//!
//! Pure functions from verdicts to page and run results. Derived metrics go
//! here and nowhere else.

use std::collections::BTreeMap;

use sitecheck_common::{
    ComponentVerdict, LinkClassification, LinkVerdict, PageCounts, PageResult, RunResult, RunSummary,
    Verdict,
};

/// Fold one page's verdicts into a [`PageResult`]
pub fn aggregate_page(
    url: &str,
    locale: Option<&str>,
    component_verdicts: BTreeMap<String, ComponentVerdict>,
    link_verdicts: Vec<LinkVerdict>,
) -> PageResult {
    let mut counts = PageCounts::default();
    for verdict in component_verdicts.values() {
        match verdict.status {
            Verdict::Pass => counts.components_passed += 1,
            Verdict::Fail => counts.components_failed += 1,
            Verdict::NotApplicable => counts.components_not_applicable += 1,
        }
    }
    for verdict in &link_verdicts {
        match verdict.classification {
            LinkClassification::Valid => counts.links_valid += 1,
            LinkClassification::Invalid => counts.links_invalid += 1,
            LinkClassification::Unreachable => counts.links_unreachable += 1,
            LinkClassification::Skipped => counts.links_skipped += 1,
        }
    }

    let all_pass = component_verdicts.values().all(ComponentVerdict::passed)
        && link_verdicts.iter().all(|v| v.classification.is_ok());

    PageResult {
        url: url.to_string(),
        locale: locale.map(String::from),
        component_verdicts,
        link_verdicts,
        counts,
        all_pass,
        error: None,
    }
}

/// A page that could not be opened
pub fn failed_page(url: &str, locale: Option<&str>, error: impl ToString) -> PageResult {
    PageResult {
        error: Some(error.to_string()),
        all_pass: false,
        ..aggregate_page(url, locale, BTreeMap::new(), Vec::new())
    }
}

/// Fold page results, in order, into a [`RunResult`]
pub fn aggregate_run(pages: Vec<PageResult>) -> RunResult {
    let mut summary = RunSummary {
        pages_total: pages.len(),
        ..Default::default()
    };

    for page in &pages {
        if page.all_pass && page.error.is_none() {
            summary.pages_passed += 1;
        } else {
            summary.pages_failed += 1;
        }
        summary.components_passed += page.counts.components_passed;
        summary.components_failed += page.counts.components_failed;
        summary.components_not_applicable += page.counts.components_not_applicable;
        summary.links_checked += page.counts.links_checked();
        summary.links_valid += page.counts.links_valid;
        summary.links_invalid += page.counts.links_invalid;
        summary.links_unreachable += page.counts.links_unreachable;
        summary.links_skipped += page.counts.links_skipped;
    }

    summary.pass_ratio = if summary.pages_total == 0 {
        1.0
    } else {
        summary.pages_passed as f64 / summary.pages_total as f64
    };
    summary.all_pass = summary.pages_failed == 0;

    RunResult { pages, summary }
}
