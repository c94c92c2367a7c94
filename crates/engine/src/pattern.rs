//! Compiled regex cache shared by transforms and predicates

use std::collections::HashMap;

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use regex::Regex;
use sitecheck_common::{Error, Result};

static CACHE: Lazy<Mutex<HashMap<String, Regex>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Compile `pattern`, reusing an earlier compilation when there is one.
pub fn compile(pattern: &str) -> Result<Regex> {
    let mut cache = CACHE.lock();
    if let Some(re) = cache.get(pattern) {
        return Ok(re.clone());
    }
    let re = Regex::new(pattern).map_err(|e| Error::invalid_pattern(pattern, e))?;
    cache.insert(pattern.to_string(), re.clone());
    Ok(re)
}

/// Apply a capture transform. `None` when the pattern does not match.
///
/// The default group is 1 when the pattern has a capture group, else the
/// whole match.
pub fn capture(re: &Regex, group: Option<usize>, input: &str) -> Option<String> {
    let group = group.unwrap_or(if re.captures_len() > 1 { 1 } else { 0 });
    re.captures(input)
        .and_then(|caps| caps.get(group))
        .map(|m| m.as_str().to_string())
}
