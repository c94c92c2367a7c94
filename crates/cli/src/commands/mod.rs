//! CLI Commands

pub mod components;
pub mod links;
pub mod run;

use std::path::Path;

use anyhow::Context;
use sitecheck_engine::ComponentRegistry;
use tracing::info;

/// Built-in descriptors, overlaid with any found under `dir`
pub fn load_registry(dir: Option<&Path>) -> anyhow::Result<ComponentRegistry> {
    let mut registry = ComponentRegistry::builtin().context("registering built-in components")?;
    if let Some(dir) = dir {
        let loaded = registry
            .load_dir(dir)
            .with_context(|| format!("loading descriptors from {}", dir.display()))?;
        info!("Loaded {} descriptor(s) from {}", loaded, dir.display());
    }
    Ok(registry)
}
