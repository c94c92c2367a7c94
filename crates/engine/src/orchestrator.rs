//! Extraction orchestrator
//!
//! Walks a component descriptor against one page: find the root, run any
//! interaction steps, extract fields and repeats.

use std::time::Duration;

use sitecheck_common::{ExtractionRecord, Result};
use tracing::{debug, info, warn};

use crate::descriptor::{ComponentDescriptor, Interaction};
use crate::dom::{DomAccessor, Scope};
use crate::extract::{extract_node, locate_first};

/// Default wait for the page to settle after an interaction
pub const DEFAULT_STABLE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct Orchestrator<'a, D: DomAccessor> {
    dom: &'a D,
    stable_timeout: Duration,
}

impl<'a, D: DomAccessor> Orchestrator<'a, D> {
    pub fn new(dom: &'a D) -> Self {
        Self {
            dom,
            stable_timeout: DEFAULT_STABLE_TIMEOUT,
        }
    }

    pub fn with_stable_timeout(mut self, timeout: Duration) -> Self {
        self.stable_timeout = timeout;
        self
    }

    /// Extract one component, labelled by its kind
    pub async fn run(&self, descriptor: &ComponentDescriptor) -> Result<ExtractionRecord> {
        self.extract(&descriptor.kind, descriptor).await
    }

    /// Extract several named components
    ///
    /// Components without an interaction go first so that no interaction
    /// disturbs a component that expects the page as loaded. Results keep the
    /// caller's order.
    pub async fn run_all(
        &self,
        components: &[(&str, &ComponentDescriptor)],
    ) -> Result<Vec<(String, ExtractionRecord)>> {
        let mut order: Vec<usize> = (0..components.len()).collect();
        order.sort_by_key(|&i| !components[i].1.interactions.is_empty());

        let mut records: Vec<Option<ExtractionRecord>> = vec![None; components.len()];
        for i in order {
            let (name, descriptor) = components[i];
            records[i] = Some(self.extract(name, descriptor).await?);
        }

        Ok(components
            .iter()
            .zip(records)
            .filter_map(|((name, _), record)| record.map(|r| (name.to_string(), r)))
            .collect())
    }

    async fn extract(&self, label: &str, descriptor: &ComponentDescriptor) -> Result<ExtractionRecord> {
        let Some(root) = self.find_root(descriptor).await? else {
            debug!("{}: root {} not found", label, descriptor.root);
            return Ok(ExtractionRecord::not_found(&descriptor.kind));
        };

        let mut root = root;
        let steps = descriptor.interactions.len();
        for (i, step) in descriptor.interactions.iter().enumerate() {
            if let Err(reason) = self.interact(&root, step).await? {
                let reason = format!("step {}/{}: {}", i + 1, steps, reason);
                warn!("{}: interaction failed: {}", label, reason);
                return Ok(ExtractionRecord::not_found(&descriptor.kind).with_note(reason));
            }
            // the step may have re-rendered the component
            root = match self.find_root(descriptor).await? {
                Some(root) => root,
                None => {
                    let reason = format!("root {} disappeared after {}", descriptor.root, step);
                    warn!("{}: {}", label, reason);
                    return Ok(ExtractionRecord::not_found(&descriptor.kind).with_note(reason));
                }
            };
        }

        let record = extract_node(
            self.dom,
            Scope::Element(root),
            &descriptor.kind,
            label.to_string(),
            &descriptor.fields,
            descriptor.repeat.as_ref(),
        )
        .await?;

        info!(
            "{}: extracted {} field(s), {} child record(s)",
            label,
            record.fields.len(),
            record.children.len()
        );
        Ok(record)
    }

    async fn find_root(&self, descriptor: &ComponentDescriptor) -> Result<Option<D::Handle>> {
        Ok(locate_first(self.dom, &Scope::Page, &descriptor.root)
            .await?
            .into_iter()
            .next())
    }

    /// Outer `Err` is a contract violation, inner `Err` a degraded interaction
    async fn interact(
        &self,
        root: &D::Handle,
        interaction: &Interaction,
    ) -> Result<std::result::Result<(), String>> {
        let scoped = Scope::Element(root.clone());
        let mut targets = locate_first(self.dom, &scoped, &interaction.target).await?;
        if targets.is_empty() {
            targets = locate_first(self.dom, &Scope::Page, &interaction.target).await?;
        }
        let Some(target) = targets.into_iter().next() else {
            return Ok(Err(format!("interaction target {} not found", interaction.target)));
        };

        debug!("Performing {}", interaction);
        if let Err(e) = self.dom.act(&target, &interaction.action).await {
            if let Some(violation) = e.contract_violation() {
                return Err(violation);
            }
            return Ok(Err(format!("{} failed: {}", interaction.action, e)));
        }

        if let Err(e) = self.dom.wait_for_stable(&scoped, self.stable_timeout).await {
            return Ok(Err(format!("page did not settle: {}", e)));
        }
        Ok(Ok(()))
    }
}
