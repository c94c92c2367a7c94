//! URL list files
//!
//! One page per line as `URL` or `URL | locale`. Blank lines and lines
//! starting with `#` are ignored.

use std::path::Path;

use anyhow::Context;
use sitecheck_common::DEFAULT_LOCALE;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlEntry {
    pub url: String,
    pub locale: String,
    /// 1-based line in the source file
    pub line: usize,
}

pub fn parse_url_list(content: &str) -> Vec<UrlEntry> {
    content
        .lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }

            let (url, locale) = match line.split_once('|') {
                Some((url, rest)) => (url.trim(), rest.split('|').next().unwrap_or_default().trim()),
                None => (line, ""),
            };
            if url.is_empty() {
                return None;
            }

            Some(UrlEntry {
                url: url.to_string(),
                locale: if locale.is_empty() { DEFAULT_LOCALE } else { locale }.to_string(),
                line: index + 1,
            })
        })
        .collect()
}

pub fn load_url_list(path: &Path) -> anyhow::Result<Vec<UrlEntry>> {
    let content =
        std::fs::read_to_string(path).with_context(|| format!("reading URL list {}", path.display()))?;
    let entries = parse_url_list(&content);
    if entries.is_empty() {
        anyhow::bail!("no URLs found in {}", path.display());
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("https://a.test/", "https://a.test/", "US/EN" ; "bare url")]
    #[test_case("https://a.test/ | JP/JA", "https://a.test/", "JP/JA" ; "with locale")]
    #[test_case("  https://a.test/x|DE/DE  ", "https://a.test/x", "DE/DE" ; "tight separator")]
    #[test_case("https://a.test/ |", "https://a.test/", "US/EN" ; "empty locale")]
    #[test_case("https://a.test/ | FR/FR | extra", "https://a.test/", "FR/FR" ; "extra columns")]
    fn test_parse_line(line: &str, url: &str, locale: &str) {
        let entries = parse_url_list(line);
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url, url);
        assert_eq!(entries[0].locale, locale);
    }

    #[test]
    fn test_comments_and_blank_lines() {
        let content = "# pages to check\n\nhttps://a.test/\n   # indented comment\n | US/EN\nhttps://a.test/b | KO/KO\n";
        let entries = parse_url_list(content);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].line, 3);
        assert_eq!(entries[1].url, "https://a.test/b");
        assert_eq!(entries[1].line, 6);
    }

    #[test]
    fn test_load_empty_list_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("urls.txt");
        std::fs::write(&path, "# nothing yet\n").unwrap();
        assert!(load_url_list(&path).is_err());
    }
}
