//! Links Command

use clap::Args;
use url::Url;

use sitecheck_common::HarvestedLink;
use sitecheck_engine::{LinkValidator, ReqwestTransport};

use crate::config::Settings;
use crate::output::{print_list, LinkRow, OutputFormat};

#[derive(Args, Debug)]
pub struct LinksArgs {
    /// URLs to check
    #[arg(required = true)]
    pub urls: Vec<String>,

    /// Base for relative URLs
    #[arg(long)]
    pub base: Option<Url>,

    /// Pool size
    #[arg(long)]
    pub concurrency: Option<usize>,
}

fn harvest(urls: &[String]) -> Vec<HarvestedLink> {
    urls.iter()
        .enumerate()
        .map(|(i, url)| HarvestedLink {
            label: format!("arg[{}]", i),
            url: url.clone(),
        })
        .collect()
}

/// Returns whether every link is valid or skipped
pub async fn execute(args: LinksArgs, mut settings: Settings, format: OutputFormat) -> anyhow::Result<bool> {
    if let Some(concurrency) = args.concurrency {
        settings.links.concurrency = concurrency;
    }

    let base = match args.base {
        Some(base) => base,
        None => Url::parse("about:blank")?,
    };

    let transport = ReqwestTransport::new(&settings.run.user_agent)?;
    let validator = LinkValidator::new(transport, settings.link_config());
    let verdicts = validator.validate(&base, &harvest(&args.urls)).await;

    let rows: Vec<LinkRow> = verdicts.values().map(LinkRow::from).collect();
    print_list(&rows, format);

    Ok(verdicts.values().all(|v| v.classification.is_ok()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_harvest_labels() {
        let links = harvest(&["https://a.test/".to_string(), "/b".to_string()]);
        assert_eq!(links[1].label, "arg[1]");
        assert_eq!(links[1].url, "/b");
    }
}
