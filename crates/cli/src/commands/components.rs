//! Components Command

use std::path::PathBuf;

use clap::Args;
use serde::Serialize;

use sitecheck_engine::ComponentDescriptor;

use crate::output::{print_list, OutputFormat, TableDisplay};

#[derive(Args, Debug)]
pub struct ComponentsArgs {
    /// Directory of extra component descriptors (YAML)
    #[arg(long)]
    pub components: Option<PathBuf>,
}

/// Descriptor summary for listing
#[derive(Serialize)]
pub struct ComponentDisplay {
    pub kind: String,
    pub description: String,
    pub root: String,
    pub fields: Vec<String>,
    pub repeat: Option<String>,
    pub interactions: Vec<String>,
}

impl From<&ComponentDescriptor> for ComponentDisplay {
    fn from(descriptor: &ComponentDescriptor) -> Self {
        let mut repeat = Vec::new();
        let mut next = descriptor.repeat.as_ref();
        while let Some(r) = next {
            repeat.push(format!("{}({})", r.name, r.fields.len()));
            next = r.repeat.as_deref();
        }

        Self {
            kind: descriptor.kind.clone(),
            description: descriptor.description.clone(),
            root: descriptor.root.to_string(),
            fields: descriptor.fields.iter().map(|f| f.name.clone()).collect(),
            repeat: (!repeat.is_empty()).then(|| repeat.join(" > ")),
            interactions: descriptor.interactions.iter().map(|i| i.to_string()).collect(),
        }
    }
}

impl TableDisplay for ComponentDisplay {
    fn headers() -> Vec<&'static str> {
        vec!["Kind", "Root", "Fields", "Repeat", "Interaction"]
    }

    fn row(&self) -> Vec<String> {
        vec![
            self.kind.clone(),
            self.root.clone(),
            self.fields.join(", "),
            self.repeat.clone().unwrap_or_else(|| "-".to_string()),
            if self.interactions.is_empty() {
                "-".to_string()
            } else {
                self.interactions.join(", then ")
            },
        ]
    }
}

pub fn execute(args: ComponentsArgs, format: OutputFormat) -> anyhow::Result<()> {
    let registry = super::load_registry(args.components.as_deref())?;
    let displays: Vec<ComponentDisplay> = registry.descriptors().map(ComponentDisplay::from).collect();
    print_list(&displays, format);
    Ok(())
}
